//! VulnLookup (C3): services[] -> VulnerabilityInfo[], the Profiler's
//! parallel sibling in P4.

use crate::intelligence::{DiscoveredService, VulnerabilityInfo};
use crate::retry::AgentCallError;
use async_trait::async_trait;

#[async_trait]
pub trait VulnLookup: Send + Sync {
    async fn lookup(&self, services: &[DiscoveredService]) -> std::result::Result<Vec<VulnerabilityInfo>, AgentCallError>;
}
