use std::fmt::{self, Debug};
use std::time::Duration;

use analyst_core::DEFAULT_MAX_ITERATIONS;
use analyst_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use analyst_runtime::{LaunchSpec, TransportConfig};
use clap::Parser;
use clap::builder::TypedValueParser as _;

/// Command line options, each falling back to an environment variable.
#[derive(Clone, PartialEq, Parser)]
#[command(
    name = "analyst",
    version,
    about = "Answer data analysis questions by running Python in a sandbox"
)]
pub struct Config {
    /// API key of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    /// Model identifier.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1-nano-2025-04-14")]
    pub model: String,

    /// Sampling temperature used for every request.
    #[arg(long, env = "ANALYST_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    /// Model calls one question may take.
    #[arg(
        long,
        env = "ANALYST_MAX_ITERATIONS",
        default_value_t = DEFAULT_MAX_ITERATIONS,
        value_parser = clap::value_parser!(u64).range(1..).map(|n: u64| n as usize)
    )]
    pub max_iterations: usize,

    /// Restarts of the Python runtime before giving up.
    #[arg(long, env = "ANALYST_RESTART_ATTEMPTS", default_value_t = 3)]
    pub restart_attempts: u32,

    /// Delay before each restart, in milliseconds.
    #[arg(long, env = "ANALYST_RESTART_DELAY_MS", default_value_t = 1000)]
    pub restart_delay_ms: u64,

    /// How long running code may finish on exit, in milliseconds.
    #[arg(long, env = "ANALYST_DRAIN_TIMEOUT_MS", default_value_t = 5000)]
    pub drain_timeout_ms: u64,

    /// Command that launches the Python runtime, split on whitespace.
    #[arg(long, env = "ANALYST_RUNTIME_COMMAND")]
    pub runtime_command: Option<String>,

    /// Answer a single question and exit.
    #[arg(short, long)]
    pub query: Option<String>,
}

impl Config {
    /// Returns the model provider configuration.
    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(&self.api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
            .with_temperature(self.temperature)
            .build()
    }

    /// Returns how to launch the Python runtime.
    pub fn launch_spec(&self) -> LaunchSpec {
        self.runtime_command
            .as_deref()
            .and_then(LaunchSpec::from_command_line)
            .unwrap_or_else(LaunchSpec::run_python)
    }

    /// Returns the transport tunables.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            max_restarts: self.restart_attempts,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            ..TransportConfig::default()
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_iterations", &self.max_iterations)
            .field("restart_attempts", &self.restart_attempts)
            .field("restart_delay_ms", &self.restart_delay_ms)
            .field("drain_timeout_ms", &self.drain_timeout_ms)
            .field("runtime_command", &self.runtime_command)
            .field("query", &self.query)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(["analyst"].iter().chain(args)).unwrap()
    }

    #[test]
    fn test_explicit_options() {
        let config = parse(&[
            "--api-key",
            "sk-test",
            "--base-url",
            "http://localhost:8080/v1",
            "--model",
            "local-model",
            "--max-iterations",
            "4",
            "--restart-attempts",
            "5",
            "--restart-delay-ms",
            "250",
            "--drain-timeout-ms",
            "100",
            "--runtime-command",
            "python3 -m runner",
            "-q",
            "What is 2+2?",
        ]);

        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.query.as_deref(), Some("What is 2+2?"));
        assert_eq!(config.openai_config().model(), "local-model");
        assert_eq!(
            config.launch_spec(),
            LaunchSpec::new("python3").args(["-m", "runner"])
        );

        let transport = config.transport_config();
        assert_eq!(transport.max_restarts, 5);
        assert_eq!(transport.restart_delay, Duration::from_millis(250));
        assert_eq!(transport.drain_timeout, Duration::from_millis(100));
        assert_eq!(
            transport.handshake_timeout,
            TransportConfig::default().handshake_timeout
        );

        assert!(!format!("{config:?}").contains("sk-test"));
    }

    #[test]
    fn test_blank_runtime_command() {
        let config =
            parse(&["--api-key", "sk-test", "--runtime-command", "   "]);
        assert_eq!(config.launch_spec(), LaunchSpec::run_python());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let result = Config::try_parse_from([
            "analyst",
            "--api-key",
            "sk-test",
            "--max-iterations",
            "0",
        ]);
        assert!(result.is_err());
    }
}
