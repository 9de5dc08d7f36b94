//! Classification of a finished conversation into displayable steps.

use analyst_model::{AssistantMessage, ModelMessage, ToolCallRequest};
use analyst_runtime::extract_return_value;
use serde_json::Value;

use crate::Conversation;

/// Argument keys that carry source code, in lookup order.
const CODE_KEYS: [&str; 2] = ["python_code", "code"];

/// One step of an agent run, as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceRecord {
    /// The model decided to call tools.
    Planning {
        /// The requested calls, in order.
        calls: Vec<PlannedCall>,
        /// Text the model produced alongside the calls.
        thought: String,
    },
    /// A tool returned.
    ExecutionResult {
        /// Id of the call this result answers.
        id: String,
        /// The return value if the payload delimits one, else the payload.
        output: String,
        /// Whether the tool reported a failure.
        is_error: bool,
    },
    /// The final answer.
    Conclusion(String),
    /// A message that fits none of the shapes above.
    Unknown {
        /// Whatever content the message had.
        raw: String,
    },
}

/// A tool call as planned by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedCall {
    /// Tool name.
    pub name: String,
    /// Decoded arguments.
    pub arguments: Value,
    /// The source code argument, if the call carries one.
    pub code: Option<String>,
}

/// Classifies every message after the system directive and user query.
///
/// Never fails: messages of unexpected shape become
/// [`TraceRecord::Unknown`].
pub fn classify(conversation: &Conversation) -> Vec<TraceRecord> {
    classify_messages(conversation.messages())
}

/// Like [`classify`], over a raw message slice.
pub fn classify_messages(messages: &[ModelMessage]) -> Vec<TraceRecord> {
    let mut rest = messages;
    if let [ModelMessage::System(_), tail @ ..] = rest {
        rest = tail;
    }
    if let [ModelMessage::User(_), tail @ ..] = rest {
        rest = tail;
    }
    rest.iter().map(classify_message).collect()
}

fn classify_message(msg: &ModelMessage) -> TraceRecord {
    match msg {
        ModelMessage::Assistant(assistant) if assistant.has_tool_calls() => {
            planning(assistant)
        }
        ModelMessage::Assistant(assistant)
            if !assistant.content.trim().is_empty() =>
        {
            TraceRecord::Conclusion(assistant.content.trim().to_owned())
        }
        ModelMessage::Tool(result) => TraceRecord::ExecutionResult {
            id: result.id.clone(),
            output: extract_return_value(&result.content).to_owned(),
            is_error: result.is_error,
        },
        other => TraceRecord::Unknown {
            raw: serde_json::to_string(other)
                .unwrap_or_else(|_| format!("{other:?}")),
        },
    }
}

fn planning(assistant: &AssistantMessage) -> TraceRecord {
    TraceRecord::Planning {
        calls: assistant.tool_calls.iter().map(planned_call).collect(),
        thought: assistant.content.trim().to_owned(),
    }
}

fn planned_call(call: &ToolCallRequest) -> PlannedCall {
    // Arguments the model encoded badly are kept as a raw string.
    let arguments = match &call.arguments {
        Value::String(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| call.arguments.clone()),
        arguments => arguments.clone(),
    };
    let code = CODE_KEYS
        .iter()
        .find_map(|key| arguments.get(key).and_then(Value::as_str))
        .map(ToOwned::to_owned);
    PlannedCall {
        name: call.name.clone(),
        arguments,
        code,
    }
}
