//! The Executor (C3): turns a Reasoner turn into a concrete tool-step plan.

use crate::agents::reasoner::ReasonerOutput;
use crate::error::Result;
use crate::transport::ToolStep;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Target context the Executor plans against.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub target: String,
    pub open_ports: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorStatus {
    Pending,
    InProgress,
    Complete,
}

/// The ordered set of steps to run this iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorPlan {
    pub steps: Vec<ToolStep>,
    pub current_step: usize,
    pub status: Option<ExecutorStatus>,
}

impl ExecutorPlan {
    pub fn empty() -> Self {
        Self {
            steps: Vec::new(),
            current_step: 0,
            status: Some(ExecutorStatus::Complete),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn next_step(&self) -> Option<&ToolStep> {
        self.steps.get(self.current_step)
    }

    pub fn advance(&mut self) {
        self.current_step += 1;
        if self.current_step >= self.steps.len() {
            self.status = Some(ExecutorStatus::Complete);
        }
    }
}

/// Turns reasoning output into an executable plan, bypassing the LLM when
/// the Reasoner already supplied a tactical plan with a-priori tools.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn plan_execution(&self, reasoner_output: &ReasonerOutput, context: &ExecutionContext) -> Result<ExecutorPlan>;
}

/// Build steps directly from a tactical plan's attack vectors, sorted by
/// priority ascending — the "bypass the LLM" path from spec.md §4.3.
pub fn synthesize_steps_from_tactical_plan(output: &ReasonerOutput) -> Option<Vec<ToolStep>> {
    let plan = output.tactical_plan.as_ref()?;
    if plan.attack_vectors.is_empty() {
        return None;
    }
    let mut vectors = plan.attack_vectors.clone();
    vectors.sort_by_key(|v| v.priority);
    Some(
        vectors
            .into_iter()
            .map(|v| ToolStep {
                tool: v.action.tool_name,
                arguments: v.action.parameters,
                description: v.prediction_metrics.hypothesis,
            })
            .collect(),
    )
}

/// Drop any proposed step whose tool name is not in the allow-list,
/// returning the filtered steps and the names that were dropped (to be
/// logged at WARN by the caller).
pub fn filter_allow_listed(steps: Vec<ToolStep>, allow_list: &[String]) -> (Vec<ToolStep>, Vec<String>) {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for step in steps {
        if allow_list.iter().any(|name| name == &step.tool) {
            kept.push(step);
        } else {
            dropped.push(step.tool);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::{AttackAction, AttackVector, PredictionMetrics, TacticalPlanObject};
    use chrono::Utc;

    fn vector(id: &str, priority: u32, tool: &str) -> AttackVector {
        AttackVector {
            vector_id: id.into(),
            priority,
            action: AttackAction {
                tool_name: tool.into(),
                command_template: String::new(),
                parameters: serde_json::Map::new(),
                timeout_seconds: 30,
            },
            prediction_metrics: PredictionMetrics {
                classification: "c".into(),
                hypothesis: "h".into(),
                success_criteria: "s".into(),
            },
            rag_context: None,
        }
    }

    #[test]
    fn synthesizes_steps_sorted_by_priority_ascending() {
        let plan = TacticalPlanObject {
            plan_id: "p1".into(),
            target_ip: "10.0.0.5".into(),
            context_hash: "h".into(),
            attack_vectors: vec![vector("v2", 2, "tool-b"), vector("v1", 1, "tool-a")],
            created_at: Utc::now(),
        };
        let output = ReasonerOutput {
            thought: "t".into(),
            action: "a".into(),
            is_complete: false,
            tactical_plan: Some(plan),
        };
        let steps = synthesize_steps_from_tactical_plan(&output).unwrap();
        assert_eq!(steps[0].tool, "tool-a");
        assert_eq!(steps[1].tool, "tool-b");
    }

    #[test]
    fn no_tactical_plan_returns_none() {
        let output = ReasonerOutput {
            thought: "t".into(),
            action: "a".into(),
            is_complete: false,
            tactical_plan: None,
        };
        assert!(synthesize_steps_from_tactical_plan(&output).is_none());
    }

    #[test]
    fn filters_out_hallucinated_tool_names() {
        let steps = vec![
            ToolStep {
                tool: "nmap".into(),
                arguments: serde_json::Map::new(),
                description: String::new(),
            },
            ToolStep {
                tool: "made_up_tool".into(),
                arguments: serde_json::Map::new(),
                description: String::new(),
            },
        ];
        let (kept, dropped) = filter_allow_listed(steps, &["nmap".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, vec!["made_up_tool".to_string()]);
    }
}
