use async_trait::async_trait;
use serde_json::Value;

use crate::{CallToolResult, ToolDescriptor, TransportError};

/// Something that can list and call tools.
///
/// [`StdioTransport`](crate::StdioTransport) is the production
/// implementation. Tests substitute in-memory endpoints.
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    /// Lists every tool the endpoint exposes, following pagination.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError>;

    /// Calls a tool by name.
    ///
    /// A tool that ran and failed is an `Ok` result with `is_error` set.
    /// `Err` is reserved for failures of the channel itself.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, TransportError>;

    /// Releases the endpoint. Calling it more than once is a no-op.
    async fn close(&self);
}
