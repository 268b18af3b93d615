//! Session artefact writer (C5): filesystem JSON/JSONL persistence.
//!
//! Grounded on the teacher's own direct-filesystem-write idiom
//! (`topos::index`'s `fs::write(path, json).map_err(...)` /
//! `fs::read_to_string` pair, and `adapters::cli`'s
//! `fs::create_dir_all(parent).map_err(...)` directory-creation-on-demand) —
//! not on its SQLite-backed stores (`memory::store`, `reasoning::store`),
//! which are the wrong persistence mechanism for this spec.
//!
//! Every writer here returns `Result<()>`; per spec.md §4.6/§7, the
//! orchestrator is responsible for catching and WARN-logging a write
//! failure rather than letting it abort the mission — these functions
//! themselves stay honest about failure instead of swallowing it.

use crate::error::{Error, Result};
use crate::intelligence::{
    DiscoveredService, IntelligenceContext, SessionStep, TacticalPlanObject, TargetProfile,
    TrainingPair, VulnerabilityInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Per-iteration intelligence snapshot, written whenever P4 analysed new
/// services. `logs/Intelligence/<sessionId>_iter<NN>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationIntelligenceFile {
    pub session_id: String,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub new_services: Vec<DiscoveredService>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_profile: Option<TargetProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vulnerabilities: Vec<VulnerabilityInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rag_playbooks: Vec<String>,
}

/// Final merged profile, one per mission. `logs/Intelligence/<sessionId>_final.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalProfileFile {
    pub session_id: String,
    pub iterations: u32,
    pub results_count: usize,
    pub services: Vec<DiscoveredService>,
    pub target_profile: Option<TargetProfile>,
    pub vulnerabilities: Vec<VulnerabilityInfo>,
    pub last_tactical_plan: Option<TacticalPlanObject>,
}

/// Root directory layout the writer operates under.
#[derive(Debug, Clone)]
pub struct ArtefactPaths {
    pub logs_root: PathBuf,
    pub tactical_root: PathBuf,
    pub training_data_path: Option<PathBuf>,
    pub session_logs_path: Option<PathBuf>,
}

impl Default for ArtefactPaths {
    fn default() -> Self {
        Self {
            logs_root: PathBuf::from("logs"),
            tactical_root: PathBuf::from("Tactical"),
            training_data_path: None,
            session_logs_path: None,
        }
    }
}

async fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Io(e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await.map_err(Error::Io)?;
    Ok(())
}

/// Writes all C5 artefacts. Stateless beyond the path layout: every method
/// is namespaced by `session_id` so no cross-mission locking is needed.
pub struct ArtefactWriter {
    paths: ArtefactPaths,
}

impl ArtefactWriter {
    pub fn new(paths: ArtefactPaths) -> Self {
        Self { paths }
    }

    fn intelligence_dir(&self) -> PathBuf {
        self.paths.logs_root.join("Intelligence")
    }

    fn sessions_dir(&self) -> PathBuf {
        self.paths
            .session_logs_path
            .clone()
            .unwrap_or_else(|| self.paths.logs_root.join("sessions"))
    }

    pub async fn write_iteration_intelligence(&self, file: &IterationIntelligenceFile) -> Result<PathBuf> {
        let path = self
            .intelligence_dir()
            .join(format!("{}_iter{:02}.json", file.session_id, file.iteration));
        write_json_file(&path, file).await?;
        Ok(path)
    }

    pub async fn write_final_profile(&self, file: &FinalProfileFile) -> Result<PathBuf> {
        let path = self.intelligence_dir().join(format!("{}_final.json", file.session_id));
        write_json_file(&path, file).await?;
        Ok(path)
    }

    pub async fn write_tactical_plan(&self, session_id: &str, plan: &TacticalPlanObject) -> Result<PathBuf> {
        let path = self
            .paths
            .tactical_root
            .join(format!("{}_{}.json", session_id, plan.plan_id));
        write_json_file(&path, plan).await?;
        Ok(path)
    }

    /// Append one JSONL line to the session log, if `session_logs_path` is configured.
    pub async fn append_session_step(&self, step: &SessionStep) -> Result<Option<PathBuf>> {
        let path = self.sessions_dir().join(format!("{}.jsonl", step.session_id));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(Error::Io)?;
        }
        let mut line = serde_json::to_string(step)?;
        line.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).await.map_err(Error::Io)?;
        Ok(Some(path))
    }

    /// Flush a training-pair buffer to a batch file, if `training_data_path`
    /// is configured. Returns `None` (no-op) otherwise.
    pub async fn flush_training_pairs(&self, session_id: &str, pairs: &[TrainingPair], unix_ms: u64) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.paths.training_data_path else {
            return Ok(None);
        };
        if pairs.is_empty() {
            return Ok(None);
        }
        let path = dir.join(format!("{}_batch_{}.json", session_id, unix_ms));
        write_json_file(&path, &pairs).await?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(dir: &TempDir) -> ArtefactWriter {
        ArtefactWriter::new(ArtefactPaths {
            logs_root: dir.path().join("logs"),
            tactical_root: dir.path().join("Tactical"),
            training_data_path: Some(dir.path().join("training")),
            session_logs_path: None,
        })
    }

    #[tokio::test]
    async fn writes_iteration_intelligence_with_zero_padded_iteration() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        let file = IterationIntelligenceFile {
            session_id: "session_1_abc".into(),
            iteration: 1,
            timestamp: Utc::now(),
            new_services: vec![],
            target_profile: None,
            vulnerabilities: vec![],
            rag_playbooks: vec![],
        };
        let path = w.write_iteration_intelligence(&file).await.unwrap();
        assert!(path.ends_with("session_1_abc_iter01.json"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn omits_null_and_empty_optional_fields() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir);
        let file = IterationIntelligenceFile {
            session_id: "s".into(),
            iteration: 1,
            timestamp: Utc::now(),
            new_services: vec![],
            target_profile: None,
            vulnerabilities: vec![],
            rag_playbooks: vec![],
        };
        let path = w.write_iteration_intelligence(&file).await.unwrap();
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        assert!(!contents.contains("target_profile"));
        assert!(!contents.contains("vulnerabilities"));
        assert!(!contents.contains("rag_playbooks"));
    }

    #[tokio::test]
    async fn session_step_lines_are_appended_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let w = ArtefactWriter::new(ArtefactPaths {
            logs_root: dir.path().join("logs"),
            tactical_root: dir.path().join("Tactical"),
            training_data_path: None,
            session_logs_path: Some(dir.path().join("sessions")),
        });
        let step = |iteration: u32| SessionStep {
            session_id: "s1".into(),
            iteration,
            step_index: 0,
            timestamp: Utc::now(),
            observation: "obs".into(),
            thought: "thought".into(),
            action: "action".into(),
            result_summary: "ok".into(),
            outcome: crate::intelligence::StepOutcome::Success,
        };
        w.append_session_step(&step(1)).await.unwrap();
        w.append_session_step(&step(2)).await.unwrap();
        let path = dir.path().join("sessions").join("s1.jsonl");
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn flush_training_pairs_is_noop_without_configured_path() {
        let dir = TempDir::new().unwrap();
        let w = ArtefactWriter::new(ArtefactPaths {
            logs_root: dir.path().join("logs"),
            tactical_root: dir.path().join("Tactical"),
            training_data_path: None,
            session_logs_path: None,
        });
        let result = w.flush_training_pairs("s1", &[], 12345).await.unwrap();
        assert!(result.is_none());
    }
}
