use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// Errors a [`ModelProvider`] reports, classified by [`ErrorKind`].
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns how the failure is classified.
    fn kind(&self) -> ErrorKind;
}

/// A chat model that answers a [`ModelRequest`] with text, tool calls, or
/// both.
///
/// Model id and temperature belong to the provider's own configuration;
/// requests only carry messages and tool definitions. Providers are cheap
/// to share and hold no per-conversation state, so the same instance can
/// serve any number of runs.
pub trait ModelProvider: Send + Sync {
    /// Error of both the request and the streamed response.
    type Error: ModelProviderError;

    /// The streamed response.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a request. The returned future resolves once the response
    /// starts streaming.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
