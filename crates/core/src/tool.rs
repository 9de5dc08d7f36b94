//! Tool call supports.
//!
//! Tools are not implemented here. They are discovered from the execution
//! runtime and invoked through it, see [`Registry`].

mod error;
mod registry;

pub use error::{Error, ErrorKind};
pub use registry::{DiscoveryError, Registry};

/// Output of a tool that ran successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    /// The text payload produced by the tool.
    pub content: String,
}

/// The result of a tool call.
pub type ToolResult = Result<ToolOutput, Error>;
