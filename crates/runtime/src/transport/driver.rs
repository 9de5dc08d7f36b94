use std::collections::BTreeMap;
use std::future;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use backoff::backoff::{Backoff, Constant};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use super::connection::Connection;
use super::{ConnectionState, Shared};
use crate::proto::{self, Incoming, METHOD_NOT_FOUND, RpcError};
use crate::{LaunchSpec, TransportConfig, TransportError};

type Reply = oneshot::Sender<Result<Value, TransportError>>;

pub(super) enum Command {
    Start {
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Request {
        method: String,
        params: Value,
        reply: Reply,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

struct Pending {
    method: String,
    params: Value,
    reply: Reply,
    retried: bool,
}

impl Pending {
    #[inline]
    fn resolve(self, result: Result<Value, TransportError>) {
        _ = self.reply.send(result);
    }
}

/// Owns the runtime process and every request in flight on it.
pub(super) struct Driver {
    launch: LaunchSpec,
    config: TransportConfig,
    shared: Arc<Shared>,
    conn: Option<Connection>,
    next_id: u64,
    // Keyed by request id, so iteration follows submission order.
    pending: BTreeMap<u64, Pending>,
    // Latched once the restart budget is exhausted.
    failure: Option<TransportError>,
}

impl Driver {
    pub fn new(
        launch: LaunchSpec,
        config: TransportConfig,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            launch,
            config,
            shared,
            conn: None,
            next_id: 1,
            pending: BTreeMap::new(),
            failure: None,
        }
    }

    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Start { reply }) => {
                        _ = reply.send(self.ensure_connected().await);
                    }
                    Some(Command::Request { method, params, reply }) => {
                        self.submit(method, params, reply).await;
                    }
                    Some(Command::Close { done }) => {
                        self.close(&mut cmd_rx).await;
                        _ = done.send(());
                        break;
                    }
                    None => {
                        // Every handle is gone without closing.
                        self.close(&mut cmd_rx).await;
                        break;
                    }
                },
                line = next_line(&mut self.conn) => {
                    let outcome = match line {
                        Ok(Some(line)) => self.process_line(&line).await,
                        Ok(None) => Err("runtime closed its output".to_owned()),
                        Err(err) => Err(format!("failed to read from runtime: {err}")),
                    };
                    if let Err(reason) = outcome {
                        self.recover(reason).await;
                    }
                }
            }
        }
        debug!("transport driver stopped");
    }

    async fn ensure_connected(&mut self) -> Result<(), TransportError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.conn.is_some() {
            return Ok(());
        }
        self.connect(None).await
    }

    /// Launches a process, restarting on failure until the budget runs out.
    ///
    /// `after_failure` carries the reason when this is a reconnect, in which
    /// case even the first launch counts as a restart.
    async fn connect(
        &mut self,
        after_failure: Option<String>,
    ) -> Result<(), TransportError> {
        let mut backoff = Constant::new(self.config.restart_delay);
        let mut last_error = after_failure;
        loop {
            if let Some(reason) = last_error.take() {
                let restarts = self.shared.restarts();
                if restarts >= self.config.max_restarts {
                    let err = TransportError::Unavailable {
                        attempts: restarts,
                        reason,
                    };
                    error!("giving up on execution runtime: {err}");
                    self.shared.set_state(ConnectionState::Unavailable);
                    self.failure = Some(err.clone());
                    for (_, pending) in std::mem::take(&mut self.pending) {
                        pending.resolve(Err(err.clone()));
                    }
                    return Err(err);
                }

                let delay = backoff
                    .next_backoff()
                    .unwrap_or(self.config.restart_delay);
                self.shared.restarts.fetch_add(1, Ordering::AcqRel);
                warn!(
                    attempt = restarts + 1,
                    max = self.config.max_restarts,
                    "restarting execution runtime in {delay:?}: {reason}"
                );
                time::sleep(delay).await;
            }

            match Connection::establish(
                &self.launch,
                &self.config,
                &mut self.next_id,
            )
            .await
            {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.shared.set_state(ConnectionState::Ready);
                    return Ok(());
                }
                Err(err) => last_error = Some(err.to_string()),
            }
        }
    }

    async fn submit(&mut self, method: String, params: Value, reply: Reply) {
        if let Err(err) = self.ensure_connected().await {
            _ = reply.send(Err(err));
            return;
        }
        let id = self.alloc_id();
        let line = proto::encode_request(id, &method, &params);
        trace!(id, %method, "sending request");
        self.pending.insert(
            id,
            Pending {
                method,
                params,
                reply,
                retried: false,
            },
        );
        let written = match self.cancel_abandoned().await {
            Ok(()) => self.write(&line).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            self.recover(format!("failed to write to runtime: {err}"))
                .await;
        }
    }

    /// Replaces a broken process and resends what was in flight on it.
    async fn recover(&mut self, mut reason: String) {
        loop {
            warn!("execution runtime channel broke: {reason}");
            if let Some(mut conn) = self.conn.take() {
                conn.kill().await;
            }
            self.shared.set_state(ConnectionState::Idle);

            let mut retry = vec![];
            for (_, mut pending) in std::mem::take(&mut self.pending) {
                if pending.reply.is_closed() {
                    continue;
                }
                if pending.retried {
                    pending.resolve(Err(TransportError::ConnectionLost(
                        reason.clone(),
                    )));
                } else {
                    pending.retried = true;
                    retry.push(pending);
                }
            }

            if let Err(err) = self.connect(Some(reason)).await {
                for pending in retry {
                    pending.resolve(Err(err.clone()));
                }
                return;
            }

            let mut lines = Vec::with_capacity(retry.len());
            for pending in retry {
                let id = self.alloc_id();
                debug!(id, method = %pending.method, "resending request");
                lines.push(proto::encode_request(
                    id,
                    &pending.method,
                    &pending.params,
                ));
                self.pending.insert(id, pending);
            }
            let mut broken = None;
            for line in &lines {
                if let Err(err) = self.write(line).await {
                    broken = Some(format!("failed to write to runtime: {err}"));
                    break;
                }
            }
            match broken {
                Some(next_reason) => reason = next_reason,
                None => return,
            }
        }
    }

    /// Handles one line from the runtime. `Err` means the channel is broken.
    async fn process_line(&mut self, line: &str) -> Result<(), String> {
        match proto::decode_incoming(line).map_err(|err| err.to_string())? {
            Incoming::Response { id, outcome } => {
                match self.pending.remove(&id) {
                    Some(pending) => {
                        trace!(id, "received response");
                        // The process is serving requests, so it has
                        // recovered from whatever made it restart.
                        self.shared.restarts.store(0, Ordering::Release);
                        pending.resolve(outcome.map_err(Into::into));
                    }
                    None => debug!(id, "dropping response to unknown request"),
                }
                self.cancel_abandoned()
                    .await
                    .map_err(|err| format!("failed to write to runtime: {err}"))
            }
            Incoming::Unattributed(err) => {
                warn!(
                    code = err.code,
                    "runtime reported an error without a request id: {}",
                    err.message
                );
                Ok(())
            }
            Incoming::Request { id, method } => {
                let outcome = if method == "ping" {
                    Ok(json!({}))
                } else {
                    debug!(%method, "rejecting request from runtime");
                    Err(RpcError {
                        code: METHOD_NOT_FOUND,
                        message: format!("Method not found: {method}"),
                    })
                };
                let line = proto::encode_response(&id, outcome);
                self.write(&line)
                    .await
                    .map_err(|err| format!("failed to write to runtime: {err}"))
            }
            Incoming::Notification { method } => {
                trace!(%method, "ignoring notification");
                Ok(())
            }
        }
    }

    /// Lets in-flight requests finish for a bounded time, then stops the
    /// process. Queued and late requests fail with `Closed`.
    async fn close(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) {
        self.shared.set_state(ConnectionState::Closed);
        cmd_rx.close();
        while let Ok(cmd) = cmd_rx.try_recv() {
            reject(cmd);
        }

        self.pending.retain(|_, pending| !pending.reply.is_closed());
        if self.conn.is_some() && !self.pending.is_empty() {
            info!(
                in_flight = self.pending.len(),
                "waiting for in-flight requests before shutdown"
            );
            let mut deadline = pin!(time::sleep(self.config.drain_timeout));
            while !self.pending.is_empty() {
                tokio::select! {
                    _ = &mut deadline => {
                        warn!(
                            in_flight = self.pending.len(),
                            "drain timed out, terminating execution runtime"
                        );
                        break;
                    }
                    line = next_line(&mut self.conn) => {
                        let Ok(Some(line)) = line else { break };
                        if self.process_line(&line).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        for (_, pending) in std::mem::take(&mut self.pending) {
            pending.resolve(Err(TransportError::Closed));
        }
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown(self.config.exit_grace).await;
        }
        info!("execution runtime closed");
    }

    /// Forgets requests whose caller stopped waiting, usually after a
    /// timeout, and tells the runtime it may stop working on them.
    async fn cancel_abandoned(&mut self) -> io::Result<()> {
        let abandoned: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.reply.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in abandoned {
            self.pending.remove(&id);
            debug!(id, "cancelling abandoned request");
            self.write(&proto::encode_cancelled(id, "request abandoned"))
                .await?;
        }
        Ok(())
    }

    #[inline]
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn write(&mut self, line: &[u8]) -> io::Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.send_line(line).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no runtime process",
            )),
        }
    }
}

fn reject(cmd: Command) {
    match cmd {
        Command::Start { reply } => {
            _ = reply.send(Err(TransportError::Closed));
        }
        Command::Request { reply, .. } => {
            _ = reply.send(Err(TransportError::Closed));
        }
        Command::Close { done } => {
            _ = done.send(());
        }
    }
}

async fn next_line(conn: &mut Option<Connection>) -> io::Result<Option<String>> {
    match conn {
        Some(conn) => conn.next_line().await,
        None => future::pending().await,
    }
}
