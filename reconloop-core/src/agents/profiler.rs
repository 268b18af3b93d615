//! The Profiler (C3): services[] -> TargetProfile?, always run in parallel
//! with VulnLookup (P4) and independently retried.

use crate::intelligence::{DiscoveredService, TargetProfile};
use crate::retry::AgentCallError;
use async_trait::async_trait;

#[async_trait]
pub trait Profiler: Send + Sync {
    async fn profile(&self, services: &[DiscoveredService]) -> std::result::Result<Option<TargetProfile>, AgentCallError>;
}
