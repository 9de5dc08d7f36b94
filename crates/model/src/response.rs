use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// A streamed model response.
///
/// The stream yields text deltas and tool call requests as they arrive and
/// ends with [`ModelResponseEvent::Completed`]. Implementations wake the
/// task when another event may be ready, like a `Stream` would.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// `Ready(Ok(None))` marks the end of the stream and is returned again
    /// on every later call. An `Err` means the stream broke off; events
    /// delivered before it are still valid but the reply is incomplete.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Async helpers for every [`ModelResponse`].
pub trait ModelResponseExt: ModelResponse {
    /// Waits for the whole response and folds its events into a
    /// [`ModelReply`].
    ///
    /// Dropping the future stops the stream.
    fn collect_reply(
        self,
    ) -> impl Future<Output = Result<ModelReply, Self::Error>> + Send {
        async move {
            let mut stream = pin!(self);
            let mut reply = ModelReply::default();
            while let Some(event) =
                poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await?
            {
                reply.push(event);
            }
            Ok::<_, Self::Error>(reply)
        }
    }
}

impl<R: ModelResponse> ModelResponseExt for R {}

/// A completely received model response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// Concatenated text deltas.
    pub content: String,
    /// Requested tool calls, in emission order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Why generation stopped, if the provider said so.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelReply {
    /// Folds one event into the reply.
    pub fn push(&mut self, event: ModelResponseEvent) {
        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                self.content.push_str(&delta)
            }
            ModelResponseEvent::ToolCall(req) => self.tool_calls.push(req),
            ModelResponseEvent::Completed(reason) => {
                self.finish_reason = Some(reason)
            }
        }
    }

    /// Returns `true` if the model asked for at least one tool.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// Waiting for the results of the requested tool calls.
    ToolCalls,
    /// The answer is complete.
    Stop,
    /// Cut off by the token limit.
    Length,
}

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates the request with its result. May be empty if the
    /// provider did not assign one.
    pub id: String,
    /// Name of the requested tool.
    pub name: String,
    /// The decoded arguments, usually a JSON object.
    pub arguments: Value,
}

/// An item of a streamed [`ModelResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The stream is over.
    Completed(ModelFinishReason),
    /// A piece of the assistant text.
    MessageDelta(String),
    /// A complete tool call request.
    ToolCall(ToolCallRequest),
}
