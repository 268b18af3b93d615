//! Intelligence model (C2): pure data types and merge rules.
//!
//! Nothing in this module touches I/O or an agent contract; every function
//! here is a deterministic transformation over plain data, which is what
//! makes the round-trip laws in the test suite checkable without mocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Criticality bucket attached to an enriched service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    High,
    Medium,
    Low,
}

/// A service discovered on the target, identified by `(host, port)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub service: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub banner: Option<String>,
    pub category: Option<String>,
    pub criticality: Option<Criticality>,
    pub confidence: Option<f64>,
}

impl DiscoveredService {
    pub fn new(host: impl Into<String>, port: u16, protocol: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: protocol.into(),
            service: service.into(),
            product: None,
            version: None,
            banner: None,
            category: None,
            criticality: None,
            confidence: None,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Identity key: `(host, port)`.
    pub fn identity(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// "Richer" means it carries a non-empty `product` where the comparison
    /// target does not.
    fn is_richer_than(&self, other: &DiscoveredService) -> bool {
        self.product.is_some() && other.product.is_none()
    }
}

/// Security posture classification for a `TargetProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityPosture {
    Hardened,
    Standard,
    Weak,
}

/// Risk level classification for a `TargetProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    HighValue,
    Medium,
    Low,
}

/// Target-level profile produced by the Profiler agent from a set of
/// services. Mutable only by whole-value replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub os_family: Option<String>,
    pub os_version: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub security_posture: SecurityPosture,
    pub risk_level: RiskLevel,
    pub evidence: Vec<String>,
}

/// Severity classification for a `VulnerabilityInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// A vulnerability record, identified by `cve_id` (a `CVE-YYYY-N` id or a
/// fallback `EDB-<id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
    pub cve_id: String,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub description: String,
    pub affected_service: String,
    pub poc_available: bool,
    pub poc_url: Option<String>,
    pub exploitdb_id: Option<String>,
}

/// A single proof-of-concept finding surfaced from vulnerabilities with a
/// non-empty `poc_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PocFinding {
    pub tool: String,
    pub url: String,
}

/// The merged snapshot injected into the Reasoner before each reasoning call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceContext {
    pub services: Vec<DiscoveredService>,
    pub target_profile: Option<TargetProfile>,
    pub vulnerabilities: Vec<VulnerabilityInfo>,
    pub poc_findings: Vec<PocFinding>,
}

impl IntelligenceContext {
    /// Derive `poc_findings` from `vulnerabilities` carrying a `poc_url`.
    pub fn derive_poc_findings(&mut self) {
        self.poc_findings = self
            .vulnerabilities
            .iter()
            .filter_map(|v| {
                v.poc_url.as_ref().map(|url| PocFinding {
                    tool: v.affected_service.clone(),
                    url: url.clone(),
                })
            })
            .collect();
    }

    /// Deterministic hash of this context, used as `TacticalPlanObject::context_hash`.
    pub fn content_hash(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&serialized);
        format!("{:x}", hasher.finalize())
    }
}

/// One concrete, executable attack attempt within a tactical plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackVector {
    pub vector_id: String,
    pub priority: u32,
    pub action: AttackAction,
    pub prediction_metrics: PredictionMetrics,
    pub rag_context: Option<String>,
}

/// The concrete tool call an `AttackVector` drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackAction {
    pub tool_name: String,
    pub command_template: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub timeout_seconds: u64,
}

/// The Reasoner's prediction for an attack vector, checked against the
/// Evaluator's observed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    pub classification: String,
    pub hypothesis: String,
    pub success_criteria: String,
}

/// A structured, target-scoped collection of attack vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalPlanObject {
    pub plan_id: String,
    pub target_ip: String,
    pub context_hash: String,
    pub attack_vectors: Vec<AttackVector>,
    pub created_at: DateTime<Utc>,
}

/// Ground-truth label assigned to an `EvaluationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationLabel {
    TruePositive,
    FalsePositive,
    FalseNegative,
    TrueNegative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub vector_id: String,
    pub prediction: PredictionMetrics,
    pub actual_output: String,
    pub label: EvaluationLabel,
    pub reasoning: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// A single labelled (plan, execution, evaluation) bundle retained for
/// offline training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub session_id: String,
    pub iteration: u32,
    pub intelligence_snapshot: IntelligenceContext,
    pub reasoner_prompt_synopsis: String,
    pub tactical_plan: TacticalPlanObject,
    pub execution_output: String,
    pub execution_success: bool,
    pub evaluation: Option<EvaluationResult>,
    pub created_at: DateTime<Utc>,
    pub model_version: String,
}

/// Per-iteration outcome label for a `SessionStep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failed,
    Partial,
}

/// One JSONL record for the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStep {
    pub session_id: String,
    pub iteration: u32,
    pub step_index: u32,
    pub timestamp: DateTime<Utc>,
    pub observation: String,
    pub thought: String,
    pub action: String,
    pub result_summary: String,
    pub outcome: StepOutcome,
}

/// Result of `merge_services`: the merged set plus bookkeeping about which
/// entries were new or were upgraded to a richer duplicate.
pub struct ServiceMergeResult {
    pub merged: Vec<DiscoveredService>,
    pub newly_added: Vec<DiscoveredService>,
    pub replaced_with_richer: Vec<DiscoveredService>,
}

/// Dedupe `existing ++ new` by `(host, port)`. On collision, keep whichever
/// entry has a non-empty `product`, preferring the existing entry if both
/// or neither do.
pub fn merge_services(existing: &[DiscoveredService], new: &[DiscoveredService]) -> ServiceMergeResult {
    let mut merged: Vec<DiscoveredService> = existing.to_vec();
    let mut newly_added = Vec::new();
    let mut replaced_with_richer = Vec::new();

    for candidate in new {
        let identity = candidate.identity();
        if let Some(pos) = merged.iter().position(|s| s.identity() == identity) {
            if candidate.is_richer_than(&merged[pos]) {
                merged[pos] = candidate.clone();
                replaced_with_richer.push(candidate.clone());
            }
        } else {
            merged.push(candidate.clone());
            newly_added.push(candidate.clone());
        }
    }

    ServiceMergeResult {
        merged,
        newly_added,
        replaced_with_richer,
    }
}

/// Dedupe `existing ++ new` by `cve_id`; first-seen wins.
pub fn merge_vulnerabilities(existing: &[VulnerabilityInfo], new: &[VulnerabilityInfo]) -> Vec<VulnerabilityInfo> {
    let mut merged = existing.to_vec();
    for candidate in new {
        if !merged.iter().any(|v| v.cve_id == candidate.cve_id) {
            merged.push(candidate.clone());
        }
    }
    merged
}

/// The stable key by which enrichment work is deduplicated:
/// `host:port:service:product:version`.
pub fn analysis_fingerprint(service: &DiscoveredService) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        service.host,
        service.port,
        service.service,
        service.product.as_deref().unwrap_or(""),
        service.version.as_deref().unwrap_or(""),
    )
}

/// Deterministic serialisation of `(tool, arguments)` used for loop
/// detection. Arguments are sorted by key so that insertion order never
/// affects the signature.
pub fn command_signature(tool: &str, args: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort();
    let canonical: Vec<String> = keys
        .into_iter()
        .map(|k| format!("{}={}", k, args[k]))
        .collect();
    format!("{}({})", tool, canonical.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(host: &str, port: u16) -> DiscoveredService {
        DiscoveredService::new(host, port, "tcp", "http")
    }

    #[test]
    fn merge_services_dedupes_by_host_port() {
        let existing = vec![svc("10.0.0.5", 80)];
        let new = vec![svc("10.0.0.5", 80), svc("10.0.0.5", 443)];
        let result = merge_services(&existing, &new);
        assert_eq!(result.merged.len(), 2);
        assert_eq!(result.newly_added.len(), 1);
        assert!(result.replaced_with_richer.is_empty());
    }

    #[test]
    fn merge_services_prefers_richer_product() {
        let existing = vec![svc("10.0.0.5", 80)];
        let richer = vec![svc("10.0.0.5", 80).with_product("lighttpd").with_version("1.4.59")];
        let result = merge_services(&existing, &richer);
        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].product.as_deref(), Some("lighttpd"));
        assert_eq!(result.replaced_with_richer.len(), 1);
    }

    #[test]
    fn merge_services_empty_existing_is_identity() {
        let new = vec![svc("a", 1), svc("a", 1), svc("b", 2)];
        let result = merge_services(&[], &new);
        assert_eq!(result.merged.len(), 2);
    }

    #[test]
    fn merge_services_is_commutative_up_to_richer_replacement() {
        let a = vec![svc("10.0.0.5", 80)];
        let b = vec![svc("10.0.0.5", 80).with_product("lighttpd")];
        let ab = merge_services(&a, &b).merged;
        let ba = merge_services(&b, &a).merged;
        assert_eq!(ab.len(), ba.len());
        assert_eq!(ab[0].product, ba[0].product);
    }

    #[test]
    fn merge_vulnerabilities_first_seen_wins() {
        let v1 = VulnerabilityInfo {
            cve_id: "CVE-2021-1234".into(),
            severity: Severity::High,
            cvss_score: Some(7.0),
            description: "first".into(),
            affected_service: "http".into(),
            poc_available: false,
            poc_url: None,
            exploitdb_id: None,
        };
        let mut v2 = v1.clone();
        v2.description = "second".into();
        let merged = merge_vulnerabilities(&[v1], &[v2]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, "first");
    }

    #[test]
    fn merge_vulnerabilities_is_idempotent() {
        let v = VulnerabilityInfo {
            cve_id: "CVE-2021-1234".into(),
            severity: Severity::High,
            cvss_score: None,
            description: "d".into(),
            affected_service: "http".into(),
            poc_available: false,
            poc_url: None,
            exploitdb_id: None,
        };
        let once = merge_vulnerabilities(&[v.clone()], &[]);
        let twice = merge_vulnerabilities(&once, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn analysis_fingerprint_is_deterministic_and_changes_with_richer_data() {
        let plain = svc("10.0.0.5", 80);
        let richer = svc("10.0.0.5", 80).with_product("lighttpd").with_version("1.4.59");
        assert_ne!(analysis_fingerprint(&plain), analysis_fingerprint(&richer));
        assert_eq!(analysis_fingerprint(&plain), analysis_fingerprint(&plain));
    }

    #[test]
    fn command_signature_ignores_key_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("query".into(), "lighttpd".into());
        a.insert("limit".into(), 5.into());
        let mut b = serde_json::Map::new();
        b.insert("limit".into(), 5.into());
        b.insert("query".into(), "lighttpd".into());
        assert_eq!(command_signature("searchsploit_search", &a), command_signature("searchsploit_search", &b));
    }
}
