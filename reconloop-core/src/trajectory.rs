//! Structured log entries emitted by the orchestrator and its agents.
//!
//! Every phase of the reconnaissance loop reports through the same
//! `{level, phase, message}` shape, regardless of whether a consumer is
//! watching via `Config::on_log` or via a `tracing` subscriber — this module
//! pairs both the same way the teacher's trajectory events pair a structured
//! type with log-line rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity/category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Step,
    Result,
    Vuln,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Step => "STEP",
            Self::Result => "RESULT",
            Self::Vuln => "VULN",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// The named phases that can emit log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Orchestrator,
    Reasoner,
    Executor,
    McpAgent,
    DataCleaner,
    Intelligence,
    Profiler,
    VulnLookup,
    RagMemory,
    EvaluationLoop,
    TrainingData,
    SessionLogging,
    TacticalPlan,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Orchestrator => "Orchestrator",
            Self::Reasoner => "Reasoner",
            Self::Executor => "Executor",
            Self::McpAgent => "MCP Agent",
            Self::DataCleaner => "Data Cleaner",
            Self::Intelligence => "Intelligence",
            Self::Profiler => "Profiler",
            Self::VulnLookup => "VulnLookup",
            Self::RagMemory => "RAG Memory",
            Self::EvaluationLoop => "Evaluation Loop",
            Self::TrainingData => "Training Data",
            Self::SessionLogging => "Session Logging",
            Self::TacticalPlan => "Tactical Plan",
        };
        write!(f, "{}", s)
    }
}

/// One structured log entry, as emitted via `Config::on_log` and stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub phase: Phase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            level,
            phase,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, phase, message)
    }

    pub fn step(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Step, phase, message)
    }

    pub fn result(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Result, phase, message)
    }

    pub fn vuln(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Vuln, phase, message)
    }

    pub fn warn(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, phase, message)
    }

    pub fn error(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, phase, message)
    }

    /// Emit this entry to the `tracing` subscriber at the matching level.
    pub fn emit_tracing(&self) {
        match self.level {
            LogLevel::Info | LogLevel::Step | LogLevel::Result | LogLevel::Vuln => {
                tracing::info!(phase = %self.phase, "{}", self.message)
            }
            LogLevel::Warn => tracing::warn!(phase = %self.phase, "{}", self.message),
            LogLevel::Error => tracing::error!(phase = %self.phase, "{}", self.message),
        }
    }

    pub fn as_log_line(&self) -> String {
        format!(
            "[{}] {:<6} {:<16} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.phase.to_string(),
            self.message
        )
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_log_line())
    }
}

/// Sink for structured log entries, mirroring `Config::on_log`.
pub type LogSink = std::sync::Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_line_contains_level_and_phase() {
        let entry = LogEntry::warn(Phase::Profiler, "degraded: no profile");
        let line = entry.as_log_line();
        assert!(line.contains("WARN"));
        assert!(line.contains("Profiler"));
        assert!(line.contains("degraded: no profile"));
    }

    #[test]
    fn phase_display_matches_spec_names() {
        assert_eq!(Phase::McpAgent.to_string(), "MCP Agent");
        assert_eq!(Phase::DataCleaner.to_string(), "Data Cleaner");
        assert_eq!(Phase::RagMemory.to_string(), "RAG Memory");
    }
}
