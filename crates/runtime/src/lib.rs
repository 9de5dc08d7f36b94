//! The bridge between the agent and the external code-execution runtime.
//!
//! The runtime is a child process speaking the Model Context Protocol
//! (JSON-RPC 2.0, one message per line) over its standard streams. This
//! crate owns that process: it launches it lazily, restarts it when the
//! channel breaks, frames requests and responses, and shuts it down when
//! the session ends. Everything above this crate only sees the
//! [`ToolEndpoint`] trait.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod endpoint;
mod error;
pub mod proto;
mod return_value;
mod transport;

pub use config::{LaunchSpec, TransportConfig};
pub use endpoint::ToolEndpoint;
pub use error::TransportError;
pub use proto::{CallToolResult, Content, ToolDescriptor};
pub use return_value::extract_return_value;
pub use transport::{ConnectionState, StdioTransport};
