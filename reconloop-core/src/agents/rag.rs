//! RAGMemory (C3, optional): enabled iff a memory server path is configured.

use crate::error::Result;
use crate::intelligence::DiscoveredService;
use async_trait::async_trait;

/// Result of `RecallInternalWarnings` (P0).
#[derive(Debug, Clone, Default)]
pub struct WarningRecall {
    pub anti_patterns: Vec<String>,
    pub formatted_text: String,
}

/// Result of `SearchHandbook` (P4b).
#[derive(Debug, Clone, Default)]
pub struct PlaybookRecall {
    pub playbooks: Vec<String>,
    pub formatted_text: String,
}

/// Query parameters for `SearchHandbook`.
#[derive(Debug, Clone, Default)]
pub struct HandbookQuery {
    pub services: Vec<String>,
    pub os_family: Option<String>,
}

#[async_trait]
pub trait RagMemory: Send + Sync {
    async fn recall_internal_warnings(&self, observation: &str) -> Result<WarningRecall>;
    async fn search_handbook(&self, query: &HandbookQuery) -> Result<PlaybookRecall>;
}

/// Build the `HandbookQuery` P4b sends: distinct product-or-service names
/// excluding "unknown", plus the profiled OS family.
pub fn handbook_query(services: &[DiscoveredService], os_family: Option<String>) -> HandbookQuery {
    let mut names: Vec<String> = Vec::new();
    for svc in services {
        let name = svc.product.clone().unwrap_or_else(|| svc.service.clone());
        if name.eq_ignore_ascii_case("unknown") {
            continue;
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    HandbookQuery {
        services: names,
        os_family,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handbook_query_excludes_unknown_and_dedupes() {
        let services = vec![
            DiscoveredService::new("h", 1, "tcp", "unknown"),
            DiscoveredService::new("h", 2, "tcp", "http").with_product("lighttpd"),
            DiscoveredService::new("h", 3, "tcp", "http").with_product("lighttpd"),
        ];
        let query = handbook_query(&services, Some("Linux".into()));
        assert_eq!(query.services, vec!["lighttpd".to_string()]);
        assert_eq!(query.os_family.as_deref(), Some("Linux"));
    }
}
