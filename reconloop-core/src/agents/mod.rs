//! Agent interfaces (C3): narrow, single-purpose contracts.
//!
//! Every agent is a trait with one primary operation (plus, for the
//! Reasoner, a handful of state-mutating setters) rather than a class
//! hierarchy — polymorphism here is by capability, the way the teacher
//! models its `LLMClient` trait, not by inheritance.

mod cleaner;
mod evaluator;
mod executor;
mod profiler;
mod rag;
mod reasoner;
mod vulnlookup;

pub use cleaner::{looks_like_vulnerability_filename, CleanedData, CleanedPayload, DataCleaner};
pub use evaluator::Evaluator;
pub use executor::{
    filter_allow_listed, synthesize_steps_from_tactical_plan, ExecutionContext, Executor,
    ExecutorPlan, ExecutorStatus,
};
pub use profiler::Profiler;
pub use rag::{handbook_query, HandbookQuery, PlaybookRecall, RagMemory, WarningRecall};
pub use reasoner::{Reasoner, ReasonerOutput};
pub use vulnlookup::VulnLookup;
