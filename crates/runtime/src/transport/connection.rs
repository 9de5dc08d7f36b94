use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time;

use crate::proto::{self, Incoming};
use crate::{LaunchSpec, TransportConfig, TransportError};

/// One launched runtime process that has completed the handshake.
pub(super) struct Connection {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: JoinHandle<()>,
}

impl Connection {
    /// Launches the process and performs the `initialize` handshake.
    ///
    /// Output lines that are not the handshake response are skipped, since
    /// some runtimes print banners while booting.
    pub async fn establish(
        launch: &LaunchSpec,
        config: &TransportConfig,
        next_id: &mut u64,
    ) -> Result<Self, TransportError> {
        debug!("launching execution runtime");
        let mut child = launch
            .command()
            .spawn()
            .map_err(|err| TransportError::Launch(format!("{launch}: {err}")))?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Launch(
                "standard streams are not captured".to_owned(),
            ));
        };

        let mut conn = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task: tokio::spawn(forward_stderr(stderr)),
        };

        let id = *next_id;
        *next_id += 1;
        let handshake = time::timeout(
            config.handshake_timeout,
            conn.initialize(id),
        )
        .await;
        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                conn.kill().await;
                return Err(err);
            }
            Err(_) => {
                conn.kill().await;
                return Err(TransportError::Timeout {
                    method: "initialize".to_owned(),
                    timeout: config.handshake_timeout,
                });
            }
        }

        let initialized =
            proto::encode_notification("notifications/initialized", None);
        conn.send_line(&initialized).await.map_err(lost)?;
        Ok(conn)
    }

    async fn initialize(&mut self, id: u64) -> Result<(), TransportError> {
        let request =
            proto::encode_request(id, "initialize", &proto::initialize_params());
        self.send_line(&request).await.map_err(lost)?;

        loop {
            let Some(line) = self.next_line().await.map_err(lost)? else {
                return Err(TransportError::ConnectionLost(
                    "runtime exited during handshake".to_owned(),
                ));
            };
            match proto::decode_incoming(&line) {
                Ok(Incoming::Response {
                    id: resp_id,
                    outcome,
                }) if resp_id == id => {
                    let result = outcome?;
                    let server = &result["serverInfo"]["name"];
                    let protocol = &result["protocolVersion"];
                    info!(%server, %protocol, "execution runtime ready");
                    return Ok(());
                }
                Ok(other) => trace!("skipping {other:?} during handshake"),
                Err(err) => debug!("skipping output during handshake: {err}"),
            }
        }
    }

    /// Writes one encoded line.
    pub async fn send_line(&mut self, line: &[u8]) -> io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdin is closed",
            ));
        };
        stdin.write_all(line).await?;
        stdin.flush().await
    }

    /// Reads the next line. Cancel safe.
    #[inline]
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.stdout.next_line().await
    }

    /// Closes stdin and waits up to `grace` for the process to exit on its
    /// own, then kills it.
    pub async fn shutdown(&mut self, grace: Duration) {
        drop(self.stdin.take());
        match time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("execution runtime exited with {status}"),
            Ok(Err(err)) => warn!("failed to wait for execution runtime: {err}"),
            Err(_) => {
                warn!("execution runtime did not exit within {grace:?}");
                self.kill().await;
            }
        }
    }

    /// Kills the process and reaps it.
    pub async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!("failed to kill execution runtime: {err}");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stderr_task.abort();
    }
}

#[inline]
fn lost(err: io::Error) -> TransportError {
    TransportError::ConnectionLost(err.to_string())
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "analyst_runtime::stderr", "{line}");
    }
}
