use std::sync::Arc;

use analyst_core::tool::{DiscoveryError, Error as ToolError, Registry};
use analyst_core::{
    Agent, AgentBuilder, AgentError, Conversation, DEFAULT_MAX_ITERATIONS,
};
use analyst_model::ModelProvider;
use analyst_runtime::{
    LaunchSpec, StdioTransport, ToolDescriptor, ToolEndpoint, TransportConfig,
};

use crate::{Config, SYSTEM_PROMPT};

type Connector = Box<dyn Fn() -> Arc<dyn ToolEndpoint> + Send + Sync>;

/// Why a session could not be started.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The execution runtime did not list its tools.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder<P> {
    provider: P,
    system_prompt: String,
    max_iterations: usize,
    connector: Connector,
}

impl<P: ModelProvider + Clone + 'static> SessionBuilder<P> {
    /// Creates a session builder with a specified model provider.
    ///
    /// Tools come from the Python runtime launched with default settings
    /// unless [`with_runtime`](Self::with_runtime) says otherwise.
    pub fn with_model_provider(provider: P) -> Self {
        Self {
            provider,
            system_prompt: SYSTEM_PROMPT.to_owned(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            connector: stdio_connector(
                LaunchSpec::run_python(),
                TransportConfig::default(),
            ),
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets how many model calls one question may take.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Runs tools in the runtime launched by `launch`.
    #[inline]
    pub fn with_runtime(
        mut self,
        launch: LaunchSpec,
        config: TransportConfig,
    ) -> Self {
        self.connector = stdio_connector(launch, config);
        self
    }

    /// Runs tools in endpoints made by `connector`. It is called once on
    /// connect and again each time the session has to reconnect.
    pub fn with_endpoint_factory(
        mut self,
        connector: impl Fn() -> Arc<dyn ToolEndpoint> + Send + Sync + 'static,
    ) -> Self {
        self.connector = Box::new(connector);
        self
    }

    /// Connects to the runtime and discovers its tools.
    pub async fn connect(self) -> Result<Session<P>, SessionError> {
        let mut session = Session {
            provider: self.provider,
            system_prompt: self.system_prompt,
            max_iterations: self.max_iterations,
            connector: self.connector,
            attachment: None,
            stale: false,
            closed: false,
        };
        session.attach().await?;
        Ok(session)
    }
}

struct Attachment {
    endpoint: Arc<dyn ToolEndpoint>,
    agent: Agent,
    tools: Vec<ToolDescriptor>,
}

/// A conversation window onto the agent: questions go in one at a time,
/// each answered in a fresh conversation.
///
/// The session owns the execution runtime. When a question fails because
/// the runtime is gone for good, the next question first replaces it.
pub struct Session<P> {
    provider: P,
    system_prompt: String,
    max_iterations: usize,
    connector: Connector,
    attachment: Option<Attachment>,
    stale: bool,
    closed: bool,
}

impl<P: ModelProvider + Clone + 'static> Session<P> {
    /// Connects a session configured by `config`.
    pub async fn connect(
        config: &Config,
        provider: P,
    ) -> Result<Self, SessionError> {
        SessionBuilder::with_model_provider(provider)
            .with_max_iterations(config.max_iterations)
            .with_runtime(config.launch_spec(), config.transport_config())
            .connect()
            .await
    }

    /// Returns the tools of the current runtime.
    #[inline]
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.attachment
            .as_ref()
            .map(|attachment| attachment.tools.as_slice())
            .unwrap_or_default()
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Answers `query`.
    pub async fn ask(
        &mut self,
        query: &str,
    ) -> Result<Conversation, AgentError> {
        if self.closed {
            return Err(AgentError::ToolExecution(
                ToolError::transport_unavailable()
                    .with_reason("session is closed"),
            ));
        }
        if self.stale {
            self.reconnect().await?;
        }
        let Some(attachment) = &self.attachment else {
            return Err(AgentError::ToolExecution(
                ToolError::transport_unavailable()
                    .with_reason("no execution runtime attached"),
            ));
        };

        let result = attachment.agent.run(query).await;
        if matches!(&result, Err(err) if err.is_transport_unavailable()) {
            warn!("execution runtime lost, reconnecting before next question");
            self.stale = true;
        }
        result
    }

    /// Closes the execution runtime. Calls after the first do nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(attachment) = self.attachment.take() {
            attachment.endpoint.close().await;
        }
        info!("session closed");
    }

    async fn attach(&mut self) -> Result<(), DiscoveryError> {
        let endpoint = (self.connector)();
        let registry = match Registry::discover(endpoint.clone()).await {
            Ok(registry) => registry,
            Err(err) => {
                endpoint.close().await;
                return Err(err);
            }
        };
        let tools = registry.descriptors().to_vec();
        for tool in &tools {
            debug!(name = %tool.name, "loaded tool");
        }

        let agent = AgentBuilder::with_model_provider(self.provider.clone())
            .with_registry(registry)
            .with_system_prompt(self.system_prompt.clone())
            .with_max_iterations(self.max_iterations)
            .build();
        self.attachment = Some(Attachment {
            endpoint,
            agent,
            tools,
        });
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), AgentError> {
        if let Some(attachment) = self.attachment.take() {
            attachment.endpoint.close().await;
        }
        self.attach().await.map_err(|err| {
            error!("reconnecting to execution runtime failed: {err}");
            AgentError::ToolExecution(
                ToolError::transport_unavailable().with_reason(err.to_string()),
            )
        })?;
        info!("reconnected to execution runtime");
        self.stale = false;
        Ok(())
    }
}

fn stdio_connector(launch: LaunchSpec, config: TransportConfig) -> Connector {
    Box::new(move || {
        Arc::new(StdioTransport::new(launch.clone(), config.clone()))
    })
}
