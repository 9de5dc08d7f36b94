//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use analyst_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Replays the events of a preset, one per `delay`, then completes.
pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn new(preset: &PresetResponse, delay: Duration) -> Self {
        let mut finish_reason = ModelFinishReason::Stop;
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(delta) => {
                    ModelResponseEvent::MessageDelta(delta.clone())
                }
                PresetEvent::ToolCall(req) => {
                    finish_reason = ModelFinishReason::ToolCalls;
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(finish_reason));
        Self {
            events,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        loop {
            if let Some(sleep) = &mut this.sleep {
                ready!(sleep.as_mut().poll(cx));
                this.sleep = None;
                return Poll::Ready(Ok(this.events.pop_front()));
            }
            if this.events.is_empty() {
                return Poll::Ready(Ok(None));
            }
            this.sleep = Some(Box::pin(sleep(this.delay)));
        }
    }
}

#[derive(Clone, Debug)]
enum ScriptStep {
    Respond(PresetResponse),
    Fail(ErrorKind),
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to a request. The step is selected by the number of
/// assistant messages already present in the request, so the first request
/// of a conversation gets the first step, the request after one round of
/// tool calls gets the second, and so on. If there are no enough steps in
/// the script, an error will be returned, unless [`repeat_last_step`] is
/// enabled.
///
/// Clones share the request log, which makes it possible to inspect what the
/// agent sent after moving the provider into it.
///
/// [`repeat_last_step`]: TestModelProvider::repeat_last_step
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Vec<ScriptStep>,
    repeat_last: bool,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    request_count: Arc<AtomicUsize>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.script.push(ScriptStep::Respond(preset));
    }

    /// Adds a step that fails the request with the given error kind.
    #[inline]
    pub fn add_failure_step(&mut self, kind: ErrorKind) {
        self.script.push(ScriptStep::Fail(kind));
    }

    /// Keeps answering with the last step once the script runs out.
    #[inline]
    pub fn repeat_last_step(&mut self) {
        self.repeat_last = true;
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns how many requests have been sent to this provider.
    #[inline]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Returns a copy of every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn select_step(&self, req: &ModelRequest) -> Option<&ScriptStep> {
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::Assistant(_)))
            .count();
        match self.script.get(step_idx) {
            Some(step) => Some(step),
            None if self.repeat_last => self.script.last(),
            None => None,
        }
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let result = match self.select_step(req) {
            Some(ScriptStep::Respond(preset)) => Ok(TestModelResponse::new(
                preset,
                self.delay.unwrap_or(Duration::from_millis(1)),
            )),
            Some(ScriptStep::Fail(kind)) => Err(Error {
                message: "scripted failure",
                kind: *kind,
            }),
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::RateLimitExceeded,
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use analyst_model::{
        AssistantMessage, ModelMessage, ModelRequest, ModelResponseExt,
        ModelTool, ToolCallRequest,
    };
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>) {
        let reply = resp.collect_reply().await.unwrap();
        (reply.content, reply.tool_calls.into_iter().next())
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, ".to_owned()),
            PresetEvent::MessageDelta("let me run it.".to_owned()),
            PresetEvent::tool_call(
                "call_1",
                "run_python_code",
                json!({ "python_code": "print(2+2)" }),
            ),
        ]));
        provider.add_assistant_response_step(PresetResponse::text("4"));

        let mut req = ModelRequest {
            messages: vec![
                ModelMessage::system("Always run code."),
                ModelMessage::user("what is 2+2"),
            ],
            tools: vec![ModelTool {
                name: "run_python_code".to_owned(),
                description: "Runs Python".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "python_code": { "type": "string" }
                    }
                }),
            }],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me run it.");
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "run_python_code");

        req.messages.push(ModelMessage::Assistant(AssistantMessage {
            content: msg,
            tool_calls: vec![tool_call],
        }));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call) = collect_response(resp).await;
        assert_eq!(msg, "4");
        assert!(tool_call.is_none());

        assert_eq!(provider.request_count(), 2);
        assert_eq!(provider.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_script_exhausted() {
        let mut provider = TestModelProvider::default();
        provider.add_failure_step(ErrorKind::Network);

        let req = ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        };
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Network);

        let mut req = req;
        req.messages.push(ModelMessage::assistant("Hello"));
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);

        provider.repeat_last_step();
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
