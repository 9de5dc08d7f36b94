use analyst_model::ErrorKind as ModelErrorKind;

use crate::tool;

/// Errors that end an agent run.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The model could not be reached, or its response broke off.
    #[error("model unavailable ({kind}): {message}")]
    ModelUnavailable {
        /// What went wrong, as classified by the provider.
        kind: ModelErrorKind,
        /// The provider's message.
        message: String,
    },
    /// A tool failure that cannot be handed back to the model.
    #[error("tool execution failed: {0}")]
    ToolExecution(tool::Error),
    /// The model kept requesting tools past the iteration bound.
    #[error("agent loop exceeded {limit} model calls")]
    LoopExceeded {
        /// The configured bound.
        limit: usize,
    },
}

impl AgentError {
    /// Returns `true` if the execution runtime must be replaced before the
    /// next run can use tools.
    #[inline]
    pub fn is_transport_unavailable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolExecution(err)
                if err.kind() == tool::ErrorKind::TransportUnavailable
        )
    }
}
