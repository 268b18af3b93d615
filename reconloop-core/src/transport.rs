//! Tool transport (C1): the dual RPC facade the orchestrator drives.
//!
//! The wire protocol for either endpoint (one HTTP-streaming channel for
//! shell-tool execution, one stdio channel for memory queries) is out of
//! scope here — only the facade the orchestrator actually calls is
//! specified. `McpEndpoint` is the narrow interface an endpoint must expose;
//! `HttpMcpEndpoint` is a thin concrete implementation for the remote
//! shell-tool case, grounded on the teacher's `reqwest`-based HTTP usage.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use std::collections::HashMap;

/// One step the Executor wants run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStep {
    pub tool: String,
    pub arguments: JsonMap<String, serde_json::Value>,
    pub description: String,
}

/// Outcome of a single tool call. Transport/tool failures are represented
/// here, never as a propagated `Error` — per spec.md §4.1 a failed tool call
/// is data, not an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A remote tool-call endpoint: one discoverable set of named tools plus a
/// channel to invoke them. Both the shell-tool (HTTP-streaming) and memory
/// (stdio) endpoints implement this.
#[async_trait]
pub trait McpEndpoint: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<String>>;
    async fn call_tool(&self, step: &ToolStep) -> ToolResult;
}

/// Tools whose name begins with this prefix are routed to the memory
/// endpoint; every other tool is routed to the shell-tool endpoint.
pub const RAG_TOOL_PREFIX: &str = "rag_";

/// The two well-known memory tool names the Executor's allow-list must
/// accept alongside whatever the transport discovered at init time — they
/// back `RagMemory::recall_internal_warnings`/`search_handbook` and are
/// never returned by `list_tools`, since the memory endpoint is queried
/// directly rather than enumerated.
pub const RAG_RECALL_WARNINGS_TOOL: &str = "rag_recall_warnings";
pub const RAG_SEARCH_HANDBOOK_TOOL: &str = "rag_search_handbook";

/// The dual-endpoint facade exposed to the orchestrator.
pub struct ToolTransport {
    shell_tool_endpoint: Box<dyn McpEndpoint>,
    memory_endpoint: Option<Box<dyn McpEndpoint>>,
    discovered_tools: Vec<String>,
}

impl ToolTransport {
    pub fn new(shell_tool_endpoint: Box<dyn McpEndpoint>, memory_endpoint: Option<Box<dyn McpEndpoint>>) -> Self {
        Self {
            shell_tool_endpoint,
            memory_endpoint,
            discovered_tools: Vec::new(),
        }
    }

    /// Consulted once during orchestrator initialisation.
    pub async fn list_kali_tools(&mut self) -> Result<Vec<String>> {
        let tools = self.shell_tool_endpoint.list_tools().await?;
        self.discovered_tools = tools.clone();
        Ok(tools)
    }

    pub fn discovered_tools(&self) -> &[String] {
        &self.discovered_tools
    }

    /// Route by tool-name prefix and execute.
    pub async fn execute_tool(&self, step: &ToolStep) -> ToolResult {
        if step.tool.starts_with(RAG_TOOL_PREFIX) {
            match &self.memory_endpoint {
                Some(endpoint) => endpoint.call_tool(step).await,
                None => ToolResult::failed("memory endpoint not configured"),
            }
        } else {
            self.shell_tool_endpoint.call_tool(step).await
        }
    }

    pub async fn shutdown(&self) {
        // Connection lifecycle is bound to the orchestrator; endpoints own
        // their own cleanup (closing sockets/processes) on drop.
    }
}

/// Concrete `McpEndpoint` backed by an HTTP-streaming JSON-RPC-ish base URL.
pub struct HttpMcpEndpoint {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMcpEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl McpEndpoint for HttpMcpEndpoint {
    async fn list_tools(&self) -> Result<Vec<String>> {
        let url = format!("{}/tools", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(format!("list_tools failed: {e}")))?;
        let names: Vec<String> = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("list_tools response malformed: {e}")))?;
        Ok(names)
    }

    async fn call_tool(&self, step: &ToolStep) -> ToolResult {
        let url = format!("{}/tools/{}", self.base_url.trim_end_matches('/'), step.tool);
        let mut body = HashMap::new();
        body.insert("arguments", serde_json::Value::Object(step.arguments.clone()));
        match self.client.post(&url).json(&body).send().await {
            Ok(response) => match response.text().await {
                Ok(text) => ToolResult::ok(text),
                Err(e) => ToolResult::failed(format!("failed reading response body: {e}")),
            },
            Err(e) => ToolResult::failed(format!("request failed: {e}")),
        }
    }
}
