use analyst_model::ModelProvider;

use super::{Agent, DEFAULT_MAX_ITERATIONS};
use crate::model_client::ModelClient;
use crate::tool::Registry;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) registry: Option<Registry>,
    pub(crate) system_prompt: String,
    pub(crate) max_iterations: usize,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            registry: None,
            system_prompt: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Offers the tools of `registry` to the model.
    #[inline]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the system directive that opens every conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets how many model calls one run may make. Values below 1 are
    /// raised to 1.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::from_builder(self)
    }
}
