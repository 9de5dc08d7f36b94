use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use analyst_model::ModelTool;
use analyst_runtime::proto::INVALID_PARAMS;
use analyst_runtime::{ToolDescriptor, ToolEndpoint, TransportError};
use serde_json::Value;
use tracing::Instrument;

use super::{Error, ToolOutput, ToolResult};

/// Why tools could not be discovered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The runtime could not be reached.
    #[error("tool discovery failed: {0}")]
    Transport(#[from] TransportError),
    /// The runtime listed a tool that cannot be offered to the model.
    #[error("tool discovery failed: invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

/// The set of tools discovered from one execution runtime connection.
///
/// The descriptor set is fixed once discovered. Invoking a tool forwards
/// the call to the runtime and maps every failure into a tool [`Error`],
/// so a misbehaving runtime never takes the caller down.
#[derive(Clone)]
pub struct Registry {
    endpoint: Arc<dyn ToolEndpoint>,
    descriptors: Vec<ToolDescriptor>,
}

impl Registry {
    /// Lists the tools of `endpoint` and validates them.
    pub async fn discover(
        endpoint: Arc<dyn ToolEndpoint>,
    ) -> Result<Self, DiscoveryError> {
        let descriptors = endpoint.list_tools().await?;
        validate(&descriptors)?;
        info!(
            tools = ?descriptors.iter().map(|d| &d.name).collect::<Vec<_>>(),
            "discovered tools"
        );
        Ok(Self {
            endpoint,
            descriptors,
        })
    }

    /// Returns the discovered descriptors, in the order the runtime listed
    /// them.
    #[inline]
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Returns the descriptor of the named tool.
    #[inline]
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Returns the tool definitions to offer to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.descriptors
            .iter()
            .map(|d| ModelTool {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.input_schema.clone(),
            })
            .collect()
    }

    /// Invokes a tool by name.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        if self.descriptor(name).is_none() {
            let available: Vec<_> =
                self.descriptors.iter().map(|d| d.name.as_str()).collect();
            return Err(Error::unknown_tool().with_reason(format!(
                "no tool named `{name}`, available tools: {}",
                available.join(", ")
            )));
        }
        if !arguments.is_object() {
            return Err(Error::invalid_input().with_reason(format!(
                "arguments must be a JSON object, got {arguments}"
            )));
        }

        let result = self
            .endpoint
            .call_tool(name, arguments)
            .instrument(debug_span!("tool", name))
            .await;
        match result {
            Ok(result) if result.is_error => {
                Err(Error::execution_error().with_reason(result.text()))
            }
            Ok(result) => Ok(ToolOutput {
                content: result.text(),
            }),
            Err(err) if err.is_terminal() => {
                Err(Error::transport_unavailable().with_reason(err.to_string()))
            }
            Err(TransportError::Rpc { code, message })
                if code == INVALID_PARAMS =>
            {
                Err(Error::invalid_input().with_reason(message))
            }
            Err(err) => {
                Err(Error::execution_error().with_reason(err.to_string()))
            }
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

fn validate(descriptors: &[ToolDescriptor]) -> Result<(), DiscoveryError> {
    let mut names = HashSet::new();
    for descriptor in descriptors {
        if descriptor.name.trim().is_empty() {
            return Err(DiscoveryError::InvalidDescriptor(
                "tool with an empty name".to_owned(),
            ));
        }
        if !names.insert(descriptor.name.as_str()) {
            return Err(DiscoveryError::InvalidDescriptor(format!(
                "duplicate tool `{}`",
                descriptor.name
            )));
        }
        if !descriptor.input_schema.is_object() {
            return Err(DiscoveryError::InvalidDescriptor(format!(
                "input schema of `{}` is not an object",
                descriptor.name
            )));
        }
    }
    Ok(())
}
