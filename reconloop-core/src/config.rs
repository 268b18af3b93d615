//! Orchestrator configuration, built with the teacher's chained `with_*` style.

use crate::error::{Error, Result};
use crate::trajectory::LogSink;
use std::path::PathBuf;

/// Configuration passed at orchestrator construction.
#[derive(Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub skills_dir: PathBuf,
    pub kali_mcp_url: Option<String>,
    pub rag_memory_server_path: Option<PathBuf>,
    pub enable_evaluation: bool,
    pub enable_rag_memory: bool,
    pub training_data_path: Option<PathBuf>,
    pub session_logs_path: Option<PathBuf>,
    pub on_log: Option<LogSink>,
    /// Threshold at which a repeated command signature is warned about.
    /// Open Question 2 resolution: commands are always executed regardless
    /// of this threshold; it only gates when the loop-detected intervention
    /// is injected into the next observation.
    pub duplicate_command_warn_threshold: usize,
    pub max_iterations: u32,
    /// Hard cap on injected RAG playbook text, in characters (P4b).
    pub playbook_char_cap: usize,
    /// If set, P0's anti-pattern recall is still fetched but never injected.
    pub debug_skip_rag_recall_injection: bool,
}

impl Config {
    pub fn new(anthropic_api_key: impl Into<String>, skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            anthropic_api_key: anthropic_api_key.into(),
            skills_dir: skills_dir.into(),
            kali_mcp_url: None,
            rag_memory_server_path: None,
            enable_evaluation: false,
            enable_rag_memory: false,
            training_data_path: None,
            session_logs_path: None,
            on_log: None,
            duplicate_command_warn_threshold: 2,
            max_iterations: 15,
            playbook_char_cap: 40_000,
            debug_skip_rag_recall_injection: false,
        }
    }

    pub fn with_kali_mcp_url(mut self, url: impl Into<String>) -> Self {
        self.kali_mcp_url = Some(url.into());
        self
    }

    pub fn with_rag_memory_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rag_memory_server_path = Some(path.into());
        self.enable_rag_memory = true;
        self
    }

    pub fn with_evaluation_enabled(mut self, enabled: bool) -> Self {
        self.enable_evaluation = enabled;
        self
    }

    pub fn with_training_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.training_data_path = Some(path.into());
        self
    }

    pub fn with_session_logs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_logs_path = Some(path.into());
        self
    }

    pub fn with_on_log(mut self, sink: LogSink) -> Self {
        self.on_log = Some(sink);
        self
    }

    pub fn with_duplicate_command_warn_threshold(mut self, threshold: usize) -> Self {
        self.duplicate_command_warn_threshold = threshold.max(1);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.anthropic_api_key.trim().is_empty() {
            return Err(Error::config("anthropic_api_key must not be empty"));
        }
        if self.skills_dir.as_os_str().is_empty() {
            return Err(Error::config("skills_dir must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let cfg = Config::new("", "/skills");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_skills_dir() {
        let cfg = Config::new("key", "");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_sets_rag_memory_enabled() {
        let cfg = Config::new("key", "/skills").with_rag_memory_server_path("/mem.sock");
        assert!(cfg.enable_rag_memory);
        assert!(cfg.rag_memory_server_path.is_some());
    }
}
