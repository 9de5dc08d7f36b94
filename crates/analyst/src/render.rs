//! Terminal rendering of trace records.

use std::io::{self, Write};

use analyst_core::trace::{PlannedCall, TraceRecord};
use owo_colors::OwoColorize;

const BAR_CHAR: &str = "▎";

/// Writes every record of a run, numbered, between a header and a footer.
///
/// Only write failures of `out` are reported; any record can be rendered.
pub fn render_trace<W: Write>(
    out: &mut W,
    records: &[TraceRecord],
) -> io::Result<()> {
    writeln!(out, "\n{}", "=== Agent Execution Steps ===".bold())?;
    writeln!(out, "Total agent steps: {}", records.len())?;
    for (idx, record) in records.iter().enumerate() {
        writeln!(out, "\n{}", format!("--- Step {} ---", idx + 1).dimmed())?;
        render_record(out, record)?;
    }
    writeln!(out, "\n{}", "=== End of Agent Execution ===".bold())
}

/// Writes a single record.
pub fn render_record<W: Write>(
    out: &mut W,
    record: &TraceRecord,
) -> io::Result<()> {
    match record {
        TraceRecord::Planning { calls, thought } => {
            let bar = BAR_CHAR.bright_magenta();
            writeln!(out, "{bar}📝 AGENT PLANNING:")?;
            if calls.iter().any(|call| call.code.is_some()) {
                writeln!(
                    out,
                    "{bar}The agent decided to execute Python code to solve \
                     this problem."
                )?;
            } else {
                writeln!(out, "{bar}The agent decided to call tools.")?;
            }
            for line in thought.lines() {
                writeln!(out, "{bar}{}", line.italic())?;
            }
            for call in calls {
                render_call(out, call)?;
            }
        }
        TraceRecord::ExecutionResult {
            output, is_error, ..
        } => {
            if *is_error {
                let bar = BAR_CHAR.bright_red();
                writeln!(out, "{bar}🔍 EXECUTION RESULT (failed):")?;
                writeln!(out, "{}", output.bright_red())?;
            } else {
                let bar = BAR_CHAR.bright_yellow();
                writeln!(out, "{bar}🔍 EXECUTION RESULT:")?;
                writeln!(out, "{output}")?;
            }
        }
        TraceRecord::Conclusion(text) => {
            let bar = BAR_CHAR.bright_green();
            writeln!(out, "{bar}✅ CONCLUSION:")?;
            writeln!(out, "{}", text.bright_white())?;
        }
        TraceRecord::Unknown { raw } => {
            writeln!(out, "Message type: unknown")?;
            writeln!(out, "Content: {}", raw.dimmed())?;
        }
    }
    Ok(())
}

fn render_call<W: Write>(out: &mut W, call: &PlannedCall) -> io::Result<()> {
    match &call.code {
        Some(code) => {
            writeln!(out, "\n{}💻 PYTHON CODE GENERATED:", BAR_CHAR.bright_cyan())?;
            writeln!(out, "```python")?;
            writeln!(out, "{}", code.trim_end())?;
            writeln!(out, "```")
        }
        None => writeln!(
            out,
            "\n{}🔧 {} {}",
            BAR_CHAR.bright_cyan(),
            call.name.bold(),
            call.arguments
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(records: &[TraceRecord]) -> String {
        let mut out = vec![];
        render_trace(&mut out, records).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_render_two_plus_two() {
        let text = render(&[
            TraceRecord::Planning {
                calls: vec![PlannedCall {
                    name: "run_python_code".to_owned(),
                    arguments: json!({ "python_code": "print(2+2)\n" }),
                    code: Some("print(2+2)\n".to_owned()),
                }],
                thought: "Thought: compute it.".to_owned(),
            },
            TraceRecord::ExecutionResult {
                id: "call_1".to_owned(),
                output: "4".to_owned(),
                is_error: false,
            },
            TraceRecord::Conclusion("Final Answer: 4".to_owned()),
        ]);

        assert!(text.contains("Total agent steps: 3"));
        assert!(text.contains("--- Step 3 ---"));
        assert!(text.contains("📝 AGENT PLANNING:"));
        assert!(text.contains("Thought: compute it."));
        assert!(text.contains(
            "💻 PYTHON CODE GENERATED:\n```python\nprint(2+2)\n```\n"
        ));
        assert!(text.contains("🔍 EXECUTION RESULT:\n4\n"));
        assert!(text.contains("✅ CONCLUSION:"));
        assert!(text.contains("Final Answer: 4"));

        let planning = text.find("AGENT PLANNING").unwrap();
        let result = text.find("EXECUTION RESULT").unwrap();
        let conclusion = text.find("CONCLUSION").unwrap();
        assert!(planning < result && result < conclusion);
    }

    #[test]
    fn test_render_other_shapes() {
        let text = render(&[
            TraceRecord::Planning {
                calls: vec![PlannedCall {
                    name: "echo".to_owned(),
                    arguments: json!({ "text": "hi" }),
                    code: None,
                }],
                thought: String::new(),
            },
            TraceRecord::ExecutionResult {
                id: "call_1".to_owned(),
                output: "Error: no tool named `echo`".to_owned(),
                is_error: true,
            },
            TraceRecord::Unknown {
                raw: r#"{"role":"user"}"#.to_owned(),
            },
        ]);

        assert!(text.contains("The agent decided to call tools."));
        assert!(!text.contains("PYTHON CODE GENERATED"));
        assert!(text.contains(r#"{"text":"hi"}"#));
        assert!(text.contains("EXECUTION RESULT (failed)"));
        assert!(text.contains("no tool named `echo`"));
        assert!(text.contains("Message type: unknown"));
        assert!(text.contains(r#"{"role":"user"}"#));
    }

    #[test]
    fn test_render_empty_trace() {
        let text = render(&[]);
        assert!(text.contains("Total agent steps: 0"));
        assert!(!text.contains("--- Step"));
    }
}
