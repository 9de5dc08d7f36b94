use std::pin::Pin;
use std::sync::Arc;

use analyst_model::{
    ModelProvider, ModelProviderError, ModelReply, ModelRequest,
    ModelResponseExt,
};
use tracing::Instrument;

pub(crate) type ModelClientError = Box<dyn ModelProviderError>;

type ReplyFuture =
    Pin<Box<dyn Future<Output = Result<ModelReply, ModelClientError>> + Send>>;

/// Lets the agent hold any [`ModelProvider`] without a type parameter.
#[derive(Clone)]
pub struct ModelClient {
    send: Arc<dyn Fn(ModelRequest) -> ReplyFuture + Send + Sync>,
}

impl ModelClient {
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        Self {
            send: Arc::new(move |req| {
                let span =
                    trace_span!("model request", messages = req.messages.len());
                trace!(parent: &span, "sending request: {req:?}");
                Box::pin(
                    exchange::<P>(provider.send_request(&req)).instrument(span),
                )
            }),
        }
    }

    /// Sends a request and waits for the complete reply.
    ///
    /// Cancel safe: dropping the future stops the stream.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelReply, ModelClientError> {
        (self.send)(req).await
    }
}

async fn exchange<P: ModelProvider>(
    sent: impl Future<Output = Result<P::Response, P::Error>>,
) -> Result<ModelReply, ModelClientError> {
    let resp = sent.await.map_err(|err| {
        error!("model request failed: {err}");
        Box::new(err) as ModelClientError
    })?;
    let reply = resp.collect_reply().await.map_err(|err| {
        error!("model response broke off: {err}");
        Box::new(err) as ModelClientError
    })?;
    trace!(
        content_len = reply.content.len(),
        tool_calls = reply.tool_calls.len(),
        "received reply"
    );
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use analyst_model::{ErrorKind, ModelFinishReason, ModelMessage};
    use analyst_test_model::{PresetEvent, PresetResponse, TestModelProvider};
    use serde_json::json;

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_response_step(
            PresetResponse::with_events([
                PresetEvent::MessageDelta("Let me ".to_owned()),
                PresetEvent::MessageDelta("check.".to_owned()),
                PresetEvent::tool_call(
                    "call_1",
                    "run_python_code",
                    json!({ "python_code": "print(1)" }),
                ),
            ]),
        );
        let model_client = ModelClient::new(model_provider);

        // The same script step answers every request with no assistant
        // message in it.
        for _ in 0..3 {
            let reply = model_client.send_request(request()).await.unwrap();
            assert_eq!(reply.content, "Let me check.");
            assert!(reply.has_tool_calls());
            assert_eq!(reply.tool_calls[0].id, "call_1");
            assert_eq!(reply.finish_reason, Some(ModelFinishReason::ToolCalls));
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_failure_step(ErrorKind::Unauthorized);
        let model_client = ModelClient::new(model_provider);
        let err = model_client.send_request(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
