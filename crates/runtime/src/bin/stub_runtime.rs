//! A stand-in execution runtime for integration tests.
//!
//! It speaks the same line protocol as the real Python runner but does not
//! run Python. The `python_code` argument selects a canned behavior:
//!
//! - `print(<a>+<b>)` prints the sum of two integers.
//! - `fail` reports a failed run.
//! - `sleep:<ms>` blocks for the given time, then succeeds.
//! - `exit` terminates the process without answering.
//! - `garbage` writes a line that is not JSON.
//! - `ping_client` pings the client and reports whether it answered.
//! - `unattributed_error` first sends an error response with a `null` id.
//! - `pid` reports the process id.
//! - `cancelled` reports how many `notifications/cancelled` arrived.
//! - anything else is echoed back as the return value.
//!
//! With `ANALYST_STUB_LAUNCH_LOG` set, every launch appends a line to that
//! file. With `ANALYST_STUB_EXIT_AFTER_HANDSHAKE` set, the process exits as
//! soon as the client confirms initialization.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use analyst_runtime::proto::{
    self, CallToolResult, INVALID_PARAMS, METHOD_NOT_FOUND, PROTOCOL_VERSION,
    RpcError,
};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize, JsonSchema)]
struct RunPythonCodeParameters {
    #[schemars(description = "Python code to run.")]
    python_code: String,
}

#[derive(Deserialize, JsonSchema)]
struct EchoParameters {
    #[schemars(description = "The message to send back.")]
    message: String,
}

static CANCELLED: AtomicUsize = AtomicUsize::new(0);

fn main() -> io::Result<()> {
    eprintln!("stub runtime booting");
    if let Some(path) = env::var_os("ANALYST_STUB_LAUNCH_LOG") {
        let mut log = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(log, "launch {}", process::id())?;
    }
    let exit_after_handshake =
        env::var_os("ANALYST_STUB_EXIT_AFTER_HANDSHAKE").is_some();
    let mut lines = io::stdin().lock().lines();
    let mut stdout = io::stdout().lock();

    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            eprintln!("unparsable input: {line}");
            continue;
        };
        let method = msg.get("method").and_then(Value::as_str);
        match method {
            Some("notifications/initialized") if exit_after_handshake => {
                process::exit(1);
            }
            Some("notifications/cancelled") => {
                CANCELLED.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        // Notifications and stray responses need no answer.
        let (Some(id), Some(method)) = (msg.get("id"), method) else {
            continue;
        };

        let outcome = match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "analyst-stub-runtime",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(list_tools(&msg["params"])),
            "tools/call" => {
                call_tool(&msg["params"], &mut lines, &mut stdout)?
            }
            _ => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
            }),
        };
        stdout.write_all(&proto::encode_response(id, outcome))?;
        stdout.flush()?;
    }
    Ok(())
}

fn list_tools(params: &Value) -> Value {
    match params["cursor"].as_str() {
        None => json!({
            "tools": [{
                "name": "run_python_code",
                "description": "Tool to execute Python code and return stdout, \
                                stderr, and return value.",
                "inputSchema": schema_for!(RunPythonCodeParameters).to_value(),
            }],
            "nextCursor": "page-2",
        }),
        Some(_) => json!({
            "tools": [{
                "name": "echo",
                "description": "Sends the message back.",
                "inputSchema": schema_for!(EchoParameters).to_value(),
            }],
        }),
    }
}

fn call_tool(
    params: &Value,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    stdout: &mut impl Write,
) -> io::Result<Result<Value, RpcError>> {
    let invalid = |message: String| {
        Ok(Err(RpcError {
            code: INVALID_PARAMS,
            message,
        }))
    };
    let arguments = params["arguments"].clone();
    let result = match params["name"].as_str().unwrap_or_default() {
        "run_python_code" => {
            let args: RunPythonCodeParameters =
                match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(err) => return invalid(format!("Invalid arguments: {err}")),
                };
            run_python_code(args.python_code.trim(), lines, stdout)?
        }
        "echo" => match serde_json::from_value::<EchoParameters>(arguments) {
            Ok(args) => CallToolResult::success(args.message),
            Err(err) => return invalid(format!("Invalid arguments: {err}")),
        },
        name => return invalid(format!("Unknown tool: {name}")),
    };
    Ok(Ok(json!(result)))
}

fn run_python_code(
    code: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
    stdout: &mut impl Write,
) -> io::Result<CallToolResult> {
    if code == "exit" {
        process::exit(1);
    }
    if code == "garbage" {
        writeln!(stdout, "this is not a protocol message")?;
        stdout.flush()?;
    }
    if code == "fail" {
        return Ok(CallToolResult::error(
            "<status>run-error</status>\n<error>\nTraceback (most recent call \
             last):\nRuntimeError: fail\n</error>",
        ));
    }
    if code == "ping_client" {
        let ping = json!({ "jsonrpc": "2.0", "id": "stub-ping", "method": "ping" });
        writeln!(stdout, "{ping}")?;
        stdout.flush()?;
        let answered = match lines.next() {
            Some(line) => serde_json::from_str::<Value>(&line?)
                .map(|msg| msg["id"] == "stub-ping" && msg.get("result").is_some())
                .unwrap_or(false),
            None => false,
        };
        return Ok(success(&format!("pong: {answered}"), None));
    }
    if code == "unattributed_error" {
        let error = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32700, "message": "Parse error" },
        });
        writeln!(stdout, "{error}")?;
        stdout.flush()?;
    }
    if code == "pid" {
        return Ok(success(&process::id().to_string(), None));
    }
    if code == "cancelled" {
        let count = CANCELLED.load(Ordering::Relaxed);
        return Ok(success(&format!("cancelled requests: {count}"), None));
    }
    if let Some(ms) = code.strip_prefix("sleep:") {
        let ms = ms.parse().unwrap_or(0);
        thread::sleep(Duration::from_millis(ms));
        return Ok(success(&format!("slept {ms}ms"), None));
    }
    if let Some(sum) = parse_sum(code) {
        return Ok(success(&sum.to_string(), None));
    }
    Ok(success("", Some(code)))
}

fn parse_sum(code: &str) -> Option<i64> {
    let expr = code.strip_prefix("print(")?.strip_suffix(')')?;
    let (a, b) = expr.split_once('+')?;
    Some(a.trim().parse::<i64>().ok()? + b.trim().parse::<i64>().ok()?)
}

fn success(output: &str, return_value: Option<&str>) -> CallToolResult {
    let mut text = "<status>success</status>\n<dependencies>[]</dependencies>"
        .to_owned();
    if !output.is_empty() {
        text.push_str(&format!("\n<output>\n{output}\n</output>"));
    }
    if let Some(value) = return_value {
        text.push_str(&format!("\n<return_value>\n{value}\n</return_value>"));
    }
    CallToolResult::success(text)
}
