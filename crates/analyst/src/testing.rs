//! Test doubles for the session and the prompt loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use analyst_runtime::{
    CallToolResult, ToolDescriptor, ToolEndpoint, TransportError,
};
use analyst_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Serves `run_python_code`, always answering 4.
#[derive(Default)]
pub struct MockEndpoint {
    broken: bool,
    undiscoverable: bool,
    close_count: AtomicUsize,
}

impl MockEndpoint {
    /// Every call fails as if the restart budget were exhausted.
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            broken: true,
            ..Default::default()
        })
    }

    /// Listing tools fails as if the runtime could not be launched.
    pub fn undiscoverable() -> Arc<Self> {
        Arc::new(Self {
            undiscoverable: true,
            ..Default::default()
        })
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolEndpoint for MockEndpoint {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        if self.undiscoverable {
            return Err(TransportError::Launch("no such program".to_owned()));
        }
        Ok(vec![ToolDescriptor {
            name: "run_python_code".to_owned(),
            description: "Runs Python code.".to_owned(),
            input_schema: json!({ "type": "object" }),
        }])
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: Value,
    ) -> Result<CallToolResult, TransportError> {
        if self.broken {
            return Err(TransportError::Unavailable {
                attempts: 3,
                reason: "process exited".to_owned(),
            });
        }
        Ok(CallToolResult::success(
            "<status>success</status>\n<return_value>\n4\n</return_value>",
        ))
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every endpoint a factory has made, in order.
pub type Made = Arc<Mutex<Vec<Arc<MockEndpoint>>>>;

/// Hands out `endpoints` in order, then healthy ones.
pub fn factory(
    endpoints: Vec<Arc<MockEndpoint>>,
) -> (impl Fn() -> Arc<dyn ToolEndpoint> + Send + Sync + 'static, Made) {
    let queue = Mutex::new(endpoints);
    let made: Made = Arc::default();
    let connector = {
        let made = made.clone();
        move || {
            let mut queue = queue.lock().unwrap();
            let endpoint = if queue.is_empty() {
                Arc::new(MockEndpoint::default())
            } else {
                queue.remove(0)
            };
            made.lock().unwrap().push(endpoint.clone());
            endpoint as Arc<dyn ToolEndpoint>
        }
    };
    (connector, made)
}

/// Runs `print(2+2)` once, then concludes.
pub fn two_plus_two_model() -> TestModelProvider {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "run_python_code",
            json!({ "python_code": "print(2+2)" }),
        ),
    ]));
    model_provider
        .add_assistant_response_step(PresetResponse::text("Final Answer: 4"));
    model_provider
}
