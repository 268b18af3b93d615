//! The DataCleaner (C3): turns raw tool output into typed intelligence.

use crate::error::Result;
use crate::intelligence::{DiscoveredService, VulnerabilityInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The tagged-variant payload a cleaned result carries — a sum type, not a
/// subtype hierarchy, per spec.md §9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CleanedPayload {
    ScanResult { raw: String },
    ServiceList { services: Vec<DiscoveredService> },
    Unknown { raw: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedData {
    pub r#type: String,
    pub data: CleanedPayload,
    pub summary: String,
}

impl CleanedData {
    pub fn services(&self) -> Option<&[DiscoveredService]> {
        match &self.data {
            CleanedPayload::ServiceList { services } => Some(services),
            _ => None,
        }
    }
}

/// Rule-based-first, LLM-fallback raw-output parser.
#[async_trait]
pub trait DataCleaner: Send + Sync {
    async fn clean(&self, raw_output: &str, tool_name: &str) -> Result<CleanedData>;
    async fn parse_vulnerability_report(&self, text: &str) -> Result<Vec<VulnerabilityInfo>>;
}

/// A filename is treated as vulnerability-report content when it contains
/// this substring, case-insensitively (spec.md §4.5, P3 step 4).
pub fn looks_like_vulnerability_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().contains("vuln")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_vulnerability_filenames_case_insensitively() {
        assert!(looks_like_vulnerability_filename("scan_VULN_report.txt"));
        assert!(looks_like_vulnerability_filename("vulnerabilities.json"));
        assert!(!looks_like_vulnerability_filename("services.json"));
    }

    #[test]
    fn services_accessor_only_returns_service_list_payload() {
        let unknown = CleanedData {
            r#type: "unknown".into(),
            data: CleanedPayload::Unknown { raw: "garbage".into() },
            summary: "no match".into(),
        };
        assert!(unknown.services().is_none());

        let svc = CleanedData {
            r#type: "service-list".into(),
            data: CleanedPayload::ServiceList {
                services: vec![DiscoveredService::new("10.0.0.5", 80, "tcp", "http")],
            },
            summary: "1 service".into(),
        };
        assert_eq!(svc.services().unwrap().len(), 1);
    }
}
