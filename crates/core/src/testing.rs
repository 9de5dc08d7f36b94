//! In-memory tool endpoint shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use analyst_runtime::{
    CallToolResult, ToolDescriptor, ToolEndpoint, TransportError,
};
use async_trait::async_trait;
use serde_json::{Value, json};

type Handler = Box<
    dyn Fn(&str, &Value) -> Result<CallToolResult, TransportError>
        + Send
        + Sync,
>;

/// Answers `run_python_code` by evaluating `a+b` or `print(a+b)` sums,
/// echoes everything else. A `delay_ms` argument delays the answer.
pub struct FakeEndpoint {
    tools: Vec<ToolDescriptor>,
    handler: Handler,
    list_count: AtomicUsize,
    close_count: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeEndpoint {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            handler: Box::new(|_, arguments| Ok(run_python(arguments))),
            list_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&str, &Value) -> Result<CallToolResult, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolEndpoint for FakeEndpoint {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), arguments.clone()));
        if let Some(delay) = arguments["delay_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        (self.handler)(name, &arguments)
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_owned(),
        description: format!("The {name} tool."),
        input_schema: json!({ "type": "object" }),
    }
}

pub fn python_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "run_python_code".to_owned(),
        description: "Runs Python code.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": { "python_code": { "type": "string" } },
            "required": ["python_code"],
        }),
    }
}

fn run_python(arguments: &Value) -> CallToolResult {
    let code = arguments["python_code"].as_str().unwrap_or_default();
    let expr = code
        .strip_prefix("print(")
        .and_then(|expr| expr.strip_suffix(')'))
        .unwrap_or(code);
    let value = expr
        .split_once('+')
        .and_then(|(a, b)| {
            Some(a.trim().parse::<i64>().ok()? + b.trim().parse::<i64>().ok()?)
        })
        .map(|sum| sum.to_string())
        .unwrap_or_else(|| arguments.to_string());
    CallToolResult::success(format!(
        "<status>success</status>\n<return_value>\n{value}\n</return_value>"
    ))
}
