mod connection;
mod driver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::Instrument;

use crate::proto::ListToolsResult;
use crate::{
    CallToolResult, LaunchSpec, ToolDescriptor, ToolEndpoint, TransportConfig,
    TransportError,
};
use driver::{Command, Driver};

/// Lifecycle state of a [`StdioTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No process is running. The next request launches one.
    Idle,
    /// A process is running and has completed the handshake.
    Ready,
    /// The restart budget is exhausted.
    Unavailable,
    /// The transport has been closed.
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Unavailable,
            _ => ConnectionState::Closed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    restarts: AtomicU32,
}

impl Shared {
    #[inline]
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }
}

/// A [`ToolEndpoint`] backed by a child process speaking JSON-RPC over its
/// standard streams.
///
/// The process is owned by a driver task. Handles talk to the driver over a
/// channel, so a transport can be shared freely between concurrent tool
/// calls. Responses are matched to requests by id, in whatever order the
/// runtime produces them.
///
/// When the channel breaks (the process exits, writes fail, or a line is
/// not valid framing), the driver relaunches the process after
/// [`TransportConfig::restart_delay`], up to
/// [`TransportConfig::max_restarts`] times. Requests that were in flight
/// are sent once more on the new process; a request that is interrupted a
/// second time fails with [`TransportError::ConnectionLost`]. Once the
/// budget is exhausted every request fails with
/// [`TransportError::Unavailable`]. The budget is restored once a relaunched
/// process answers a request; completing the handshake is not enough.
///
/// A request whose caller gave up, for example after
/// [`TransportConfig::request_timeout`], is forgotten and announced to the
/// runtime with `notifications/cancelled`.
#[derive(Debug)]
pub struct StdioTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Creates a transport. No process is launched until [`Self::start`] or
    /// the first request.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(launch: LaunchSpec, config: TransportConfig) -> Self {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ConnectionState::Idle as u8),
            restarts: AtomicU32::new(0),
        });
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let request_timeout = config.request_timeout;
        let span = debug_span!("runtime", command = %launch);
        let driver = Driver::new(launch, config, Arc::clone(&shared));
        tokio::spawn(driver.run(cmd_rx).instrument(span));

        Self {
            cmd_tx,
            shared,
            request_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Launches the process and completes the handshake, if not done yet.
    pub async fn start(&self) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { reply })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    /// Sends a request and waits for its result.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                method: method.to_owned(),
                params,
                reply,
            })
            .map_err(|_| TransportError::Closed)?;

        match time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout {
                method: method.to_owned(),
                timeout: self.request_timeout,
            }),
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Restarts attempted since the runtime last answered a request.
    #[inline]
    pub fn restart_count(&self) -> u32 {
        self.shared.restarts()
    }

    async fn list_all_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let value = self.request("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(value).map_err(|err| {
                    TransportError::Protocol(format!(
                        "malformed tools/list result: {err}"
                    ))
                })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if cursor.as_ref() != Some(&next) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { done }).is_ok() {
            _ = rx.await;
        }
    }
}

#[async_trait]
impl ToolEndpoint for StdioTransport {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.list_all_tools().await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, TransportError> {
        let value = self
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
            )
            .await?;
        serde_json::from_value(value).map_err(|err| {
            TransportError::Protocol(format!("malformed tools/call result: {err}"))
        })
    }

    async fn close(&self) {
        self.shutdown().await
    }
}
