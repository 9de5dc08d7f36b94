//! Interactive data analysis in the terminal.

#[macro_use]
extern crate tracing;

use std::process::ExitCode;

use analyst::{Config, Repl, Session};
use analyst_openai_model::OpenAIProvider;
use clap::Parser;
use owo_colors::OwoColorize;
use tokio::io::{self, BufReader};
use tokio::{select, signal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    debug!(?config, "starting");

    println!("Starting Python Data Analysis Agent...");
    let model_provider = OpenAIProvider::new(config.openai_config());

    println!("Connecting to the Python runtime...");
    let mut session = match Session::connect(&config, model_provider).await {
        Ok(session) => session,
        Err(err) => {
            error!("initialization failed: {err}");
            eprintln!("Initialization error: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("Connected! Loaded {} tools", session.tools().len());
    for tool in session.tools() {
        let summary = tool.description.lines().next().unwrap_or_default();
        println!("- {}: {summary}", tool.name.bright_white().bold());
    }

    let mut repl = Repl::new(BufReader::new(io::stdin()), std::io::stdout())
        .with_spinner(true);

    if let Some(query) = config.query.as_deref() {
        let answered = repl.answer(&mut session, query).await;
        session.close().await;
        return match answered {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(err) => {
                error!("error writing output: {err}");
                ExitCode::FAILURE
            }
        };
    }

    println!("\n== Python Data Analysis Agent Ready ==");
    println!("Type your data analysis questions. Type 'exit' to quit.\n");

    let outcome = select! {
        outcome = repl.run(&mut session) => outcome,
        _ = signal::ctrl_c() => {
            println!();
            Ok(())
        }
    };
    // The loop closes on `exit` or end of input, but not when interrupted.
    session.close().await;

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("error reading input: {err}");
            ExitCode::FAILURE
        }
    }
}
