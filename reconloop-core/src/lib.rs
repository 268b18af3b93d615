//! # reconloop-core
//!
//! A reconnaissance-orchestration library driving a single autonomous agent
//! loop: reason about a target, plan and execute tool calls against it,
//! enrich the findings with target profiling and vulnerability lookup, and
//! persist everything needed to resume or audit the mission.
//!
//! ## Core Components
//!
//! - **Intelligence**: Pure data model and merge rules for discovered
//!   services, target profiles, and vulnerabilities
//! - **Agents**: Narrow trait contracts (Reasoner, Executor, DataCleaner,
//!   Profiler, VulnLookup, RagMemory, Evaluator)
//! - **Transport**: The dual-endpoint tool-call facade
//! - **Retry**: Differentiated backoff classified by error shape
//! - **Persistence**: Filesystem JSON/JSONL artefact writer
//! - **Orchestrator**: The driving P0-P6 iteration loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use reconloop_core::{Config, Orchestrator, OrchestratorBuilder};
//!
//! let config = Config::new("sk-ant-...", "/skills");
//! // let orchestrator = OrchestratorBuilder::new(config)
//! //     .with_transport(transport)
//! //     .with_reasoner(reasoner)
//! //     .with_executor(executor)
//! //     .with_cleaner(cleaner)
//! //     .with_profiler(profiler)
//! //     .with_vuln_lookup(vuln_lookup)
//! //     .build()?;
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod intelligence;
pub mod orchestrator;
pub mod persistence;
pub mod retry;
pub mod trajectory;
pub mod transport;

// Re-exports for convenience
pub use agents::{
    handbook_query, looks_like_vulnerability_filename, synthesize_steps_from_tactical_plan,
    CleanedData, CleanedPayload, DataCleaner, Evaluator, ExecutionContext, Executor, ExecutorPlan,
    ExecutorStatus, HandbookQuery, PlaybookRecall, Profiler, RagMemory, Reasoner, ReasonerOutput,
    VulnLookup, WarningRecall,
};
pub use config::Config;
pub use error::{Error, Result};
pub use intelligence::{
    analysis_fingerprint, command_signature, merge_services, merge_vulnerabilities, AttackAction,
    AttackVector, Criticality, DiscoveredService, EvaluationLabel, EvaluationResult,
    IntelligenceContext, PocFinding, PredictionMetrics, RiskLevel, SecurityPosture,
    ServiceMergeResult, Severity, SessionStep, StepOutcome, TacticalPlanObject, TargetProfile,
    TrainingPair, VulnerabilityInfo,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, ReconResult, Session};
pub use persistence::{ArtefactPaths, ArtefactWriter, FinalProfileFile, IterationIntelligenceFile};
pub use retry::{classify, retry_with_backoff, AgentCallError, ClassifiableError, ErrorClass, RetryOutcome};
pub use trajectory::{LogEntry, LogLevel, LogSink, Phase};
pub use transport::{
    HttpMcpEndpoint, McpEndpoint, ToolResult, ToolStep, ToolTransport, RAG_RECALL_WARNINGS_TOOL,
    RAG_SEARCH_HANDBOOK_TOOL, RAG_TOOL_PREFIX,
};
