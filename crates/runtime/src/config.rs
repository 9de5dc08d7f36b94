use std::ffi::OsString;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// How to launch the execution runtime.
///
/// The standard streams of the launched process are reserved for protocol
/// framing, so the spec only carries the program, its arguments, the
/// working directory and extra environment variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl LaunchSpec {
    /// Creates a spec running `program` without arguments.
    #[inline]
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            current_dir: None,
            envs: vec![],
        }
    }

    /// The sandboxed Python runner published as `jsr:@pydantic/mcp-run-python`.
    ///
    /// Deno is granted network access, and read/write access to the local
    /// `node_modules` directory where Pyodide packages are cached.
    pub fn run_python() -> Self {
        Self::new("deno").args([
            "run",
            "-N",
            "-R=node_modules",
            "-W=node_modules",
            "--node-modules-dir=auto",
            "jsr:@pydantic/mcp-run-python",
            "stdio",
        ])
    }

    /// Parses a whitespace-separated command line.
    ///
    /// Returns `None` for a blank line. Quoting is not supported.
    pub fn from_command_line(cmdline: &str) -> Option<Self> {
        let mut parts = cmdline.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Appends an argument.
    #[inline]
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    #[inline]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the runtime.
    #[inline]
    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets an extra environment variable for the runtime.
    #[inline]
    pub fn env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Tunables of [`StdioTransport`](crate::StdioTransport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Restarts attempted after a channel failure before giving up.
    pub max_restarts: u32,
    /// Fixed delay before each restart.
    pub restart_delay: Duration,
    /// Upper bound for the `initialize` handshake of one launch.
    pub handshake_timeout: Duration,
    /// Upper bound for a single request, including queueing behind restarts.
    pub request_timeout: Duration,
    /// How long in-flight requests may keep running once close is requested.
    pub drain_timeout: Duration,
    /// How long to wait for the process to exit after its stdin is closed,
    /// before killing it.
    pub exit_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_delay: Duration::from_millis(1000),
            // The first launch downloads Pyodide, which can be slow.
            handshake_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(5),
            exit_grace: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_python_cmdline() {
        assert_eq!(
            LaunchSpec::run_python().to_string(),
            "deno run -N -R=node_modules -W=node_modules \
             --node-modules-dir=auto jsr:@pydantic/mcp-run-python stdio"
        );
    }

    #[test]
    fn test_from_command_line() {
        let spec = LaunchSpec::from_command_line("  python3 -m runner  ")
            .unwrap();
        assert_eq!(spec, LaunchSpec::new("python3").args(["-m", "runner"]));
        assert!(LaunchSpec::from_command_line("   ").is_none());
    }
}
