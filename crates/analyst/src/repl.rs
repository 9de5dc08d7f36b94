use std::io::{self, Write};
use std::time::Duration;

use analyst_core::trace;
use analyst_model::ModelProvider;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::select;
use tokio::time::sleep;

use crate::Session;
use crate::render::render_trace;

/// Printed before reading each question.
pub const PROMPT: &str = "Your question: ";

/// The question/answer loop over a line-based input.
pub struct Repl<R, W> {
    input: Lines<R>,
    output: W,
    spinner: bool,
}

enum Line<'a> {
    Exit,
    Blank,
    Query(&'a str),
}

impl<'a> Line<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            Line::Exit
        } else if line.is_empty() {
            Line::Blank
        } else {
            Line::Query(line)
        }
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Repl<R, W> {
    /// Creates a loop reading questions from `input` and writing traces to
    /// `output`.
    #[inline]
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: input.lines(),
            output,
            spinner: false,
        }
    }

    /// Shows a spinner on stderr while a question is being answered.
    #[inline]
    pub fn with_spinner(mut self, spinner: bool) -> Self {
        self.spinner = spinner;
        self
    }

    /// Prompts for questions until `exit` or end of input, then closes the
    /// session.
    ///
    /// A failed question is reported and the loop goes on.
    pub async fn run<P: ModelProvider + Clone + 'static>(
        &mut self,
        session: &mut Session<P>,
    ) -> io::Result<()> {
        loop {
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;

            let Some(line) = self.input.next_line().await? else {
                writeln!(self.output)?;
                break;
            };
            match Line::parse(&line) {
                Line::Exit => break,
                Line::Blank => continue,
                Line::Query(query) => {
                    self.answer(session, query).await?;
                }
            }
        }
        session.close().await;
        Ok(())
    }

    /// Answers one question and renders its trace.
    ///
    /// Returns `false` if the question failed.
    pub async fn answer<P: ModelProvider + Clone + 'static>(
        &mut self,
        session: &mut Session<P>,
        query: &str,
    ) -> io::Result<bool> {
        writeln!(self.output, "\nProcessing your request...")?;
        let result = if self.spinner {
            with_spinner(session.ask(query)).await
        } else {
            session.ask(query).await
        };

        match result {
            Ok(conversation) => {
                render_trace(&mut self.output, &trace::classify(&conversation))?;
                Ok(true)
            }
            Err(err) => {
                error!("error processing request: {err}");
                writeln!(self.output, "Error processing your request: {err}")?;
                Ok(false)
            }
        }
    }
}

async fn with_spinner<F: Future>(fut: F) -> F::Output {
    let style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style);
    progress_bar.set_message("🤔 Thinking...");

    tokio::pin!(fut);
    let output = loop {
        progress_bar.inc(1);
        select! {
            output = &mut fut => break output,
            _ = sleep(Duration::from_millis(100)) => {}
        }
    };
    // Clear the spinner before anything else is printed.
    progress_bar.finish_and_clear();
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionBuilder;
    use crate::testing::{MockEndpoint, factory, two_plus_two_model};

    #[test]
    fn test_parse_line() {
        assert!(matches!(Line::parse("  EXIT \n"), Line::Exit));
        assert!(matches!(Line::parse("Exit"), Line::Exit));
        assert!(matches!(Line::parse("   \n"), Line::Blank));
        assert!(matches!(Line::parse(" exit now "), Line::Query("exit now")));
    }

    #[tokio::test]
    async fn test_exit_closes_once() {
        let model_provider = two_plus_two_model();
        let (connector, made) = factory(vec![]);
        let mut session =
            SessionBuilder::with_model_provider(model_provider.clone())
                .with_endpoint_factory(connector)
                .connect()
                .await
                .unwrap();

        let input: &[u8] = b"What is 2+2?\n\n  Exit \nWhat else?\n";
        let mut output = vec![];
        Repl::new(input, &mut output)
            .run(&mut session)
            .await
            .unwrap();
        // Closing again after the loop, as the binary does, is harmless.
        session.close().await;

        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches(PROMPT).count(), 3);
        assert!(output.contains("✅ CONCLUSION:"));
        assert!(!output.contains("What else?"));
        assert_eq!(model_provider.request_count(), 2);
        assert_eq!(made.lock().unwrap().len(), 1);
        assert_eq!(made.lock().unwrap()[0].close_count(), 1);
    }

    #[tokio::test]
    async fn test_end_of_input_closes() {
        let (connector, made) = factory(vec![]);
        let mut session =
            SessionBuilder::with_model_provider(two_plus_two_model())
                .with_endpoint_factory(connector)
                .connect()
                .await
                .unwrap();

        let input: &[u8] = b"";
        let mut output = vec![];
        Repl::new(input, &mut output)
            .run(&mut session)
            .await
            .unwrap();

        assert!(session.is_closed());
        assert_eq!(made.lock().unwrap()[0].close_count(), 1);
    }

    #[tokio::test]
    async fn test_error_resumes_loop() {
        let broken = MockEndpoint::broken();
        let (connector, made) = factory(vec![broken]);
        let mut session =
            SessionBuilder::with_model_provider(two_plus_two_model())
                .with_endpoint_factory(connector)
                .connect()
                .await
                .unwrap();

        let input: &[u8] = b"What is 2+2?\nWhat is 2+2?\nexit\n";
        let mut output = vec![];
        Repl::new(input, &mut output)
            .run(&mut session)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Error processing your request:"));
        assert!(output.contains("✅ CONCLUSION:"));
        assert_eq!(output.matches(PROMPT).count(), 3);
        // The second question ran on a replacement runtime.
        assert_eq!(made.lock().unwrap().len(), 2);
    }
}
