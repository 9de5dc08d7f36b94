mod builder;
mod state;

use analyst_model::{
    AssistantMessage, ModelReply, ModelRequest, ModelTool, ToolCallRequest,
    ToolCallResult,
};
use futures_util::future::join_all;
use tracing::Instrument;

use crate::conversation::Conversation;
use crate::error::AgentError;
use crate::model_client::ModelClient;
use crate::tool::{
    Error as ToolError, ErrorKind as ToolErrorKind, Registry, ToolResult,
};
pub use builder::AgentBuilder;
use state::{CallIds, TurnStage};

/// Model calls one run may make unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// An agent that answers a query by alternating between the model and the
/// tools of a [`Registry`].
///
/// Every [`run`](Agent::run) starts a fresh conversation from the system
/// directive and the query. The model is called; if it requests tools, all
/// of them run concurrently, their results are appended in request order,
/// and the model is called again. The run ends when a response requests no
/// tools.
///
/// Tool failures are handed back to the model as error results, so it can
/// correct itself. Only failures that make further progress impossible end
/// the run: the model being unavailable, the execution runtime being gone,
/// or the model still requesting tools after `max_iterations` calls.
pub struct Agent {
    model_client: ModelClient,
    registry: Option<Registry>,
    system_prompt: String,
    max_iterations: usize,
}

impl Agent {
    fn from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            registry,
            system_prompt,
            max_iterations,
        } = builder;
        Self {
            model_client,
            registry,
            system_prompt,
            max_iterations,
        }
    }

    /// Returns the iteration bound.
    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Answers `query`, returning the whole conversation.
    pub async fn run(&self, query: &str) -> Result<Conversation, AgentError> {
        let span = info_span!("agent run", max_iterations = self.max_iterations);
        self.run_loop(query).instrument(span).await
    }

    async fn run_loop(&self, query: &str) -> Result<Conversation, AgentError> {
        let mut conversation = Conversation::new(&self.system_prompt, query);
        let tools = self
            .registry
            .as_ref()
            .map(Registry::definitions)
            .unwrap_or_default();
        let mut call_ids = CallIds::default();
        let mut stage = TurnStage::default();
        let mut iterations = 0;

        loop {
            trace!(stage = stage.name(), iterations, "next stage");
            stage = match stage {
                TurnStage::AwaitingModel => {
                    iterations += 1;
                    let resp = self.request_model(&conversation, &tools).await?;
                    debug!(
                        iteration = iterations,
                        tool_calls = resp.tool_calls.len(),
                        finish_reason = ?resp.finish_reason,
                        "model responded"
                    );
                    if resp.has_tool_calls()
                        && iterations >= self.max_iterations
                    {
                        warn!(
                            "model still requests tools after {iterations} \
                             calls, giving up"
                        );
                        return Err(AgentError::LoopExceeded {
                            limit: self.max_iterations,
                        });
                    }

                    let tool_calls = call_ids.assign(resp.tool_calls);
                    let next = TurnStage::after_response(&tool_calls);
                    conversation.push_assistant(AssistantMessage {
                        content: resp.content,
                        tool_calls,
                    });
                    next
                }
                TurnStage::ExecutingTools(calls) => {
                    for result in self.execute_tools(&calls).await? {
                        conversation.push_tool_result(result);
                    }
                    TurnStage::AwaitingModel
                }
                TurnStage::Done => return Ok(conversation),
            };
        }
    }

    async fn request_model(
        &self,
        conversation: &Conversation,
        tools: &[ModelTool],
    ) -> Result<ModelReply, AgentError> {
        let req = ModelRequest {
            messages: conversation.messages().to_vec(),
            tools: tools.to_vec(),
        };
        self.model_client.send_request(req).await.map_err(|err| {
            AgentError::ModelUnavailable {
                kind: err.kind(),
                message: err.to_string(),
            }
        })
    }

    /// Runs all calls concurrently and returns their results in call order.
    async fn execute_tools(
        &self,
        calls: &[ToolCallRequest],
    ) -> Result<Vec<ToolCallResult>, AgentError> {
        let outcomes =
            join_all(calls.iter().map(|call| self.invoke(call))).await;

        let mut results = Vec::with_capacity(calls.len());
        for (call, outcome) in calls.iter().zip(outcomes) {
            let result = match outcome {
                Ok(output) => ToolCallResult {
                    id: call.id.clone(),
                    content: output.content,
                    is_error: false,
                },
                Err(err)
                    if err.kind() == ToolErrorKind::TransportUnavailable =>
                {
                    error!("execution runtime unavailable: {err}");
                    return Err(AgentError::ToolExecution(err));
                }
                Err(err) => {
                    debug!(id = %call.id, "tool failed: {err}");
                    ToolCallResult {
                        id: call.id.clone(),
                        content: format!("Error: {}", err.reason()),
                        is_error: true,
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn invoke(&self, call: &ToolCallRequest) -> ToolResult {
        debug!(id = %call.id, name = %call.name, "invoking tool");
        match &self.registry {
            Some(registry) => {
                registry.invoke(&call.name, call.arguments.clone()).await
            }
            None => Err(ToolError::unknown_tool()
                .with_reason(format!("no tool named `{}`", call.name))),
        }
    }
}
