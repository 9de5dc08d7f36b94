//! Conversation-related types.

use analyst_model::{AssistantMessage, ModelMessage, ToolCallResult};

/// The ordered message history of one agent run.
///
/// A conversation only grows. It starts with the system directive and the
/// user query, then alternates between assistant messages and the tool
/// results they requested. A tool result always follows the assistant
/// message carrying its request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Creates a conversation seeded with a system directive and a query.
    pub fn new<S1, S2>(system_prompt: S1, query: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            messages: vec![
                ModelMessage::system(system_prompt),
                ModelMessage::user(query),
            ],
        }
    }

    /// Returns all messages in order.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the text of the last assistant message without tool calls.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::Assistant(assistant)
                if !assistant.has_tool_calls() =>
            {
                Some(assistant.content.as_str())
            }
            _ => None,
        })
    }

    #[inline]
    pub(crate) fn push_assistant(&mut self, msg: AssistantMessage) {
        self.messages.push(ModelMessage::Assistant(msg));
    }

    #[inline]
    pub(crate) fn push_tool_result(&mut self, result: ToolCallResult) {
        self.messages.push(ModelMessage::Tool(result));
    }
}

impl From<Vec<ModelMessage>> for Conversation {
    #[inline]
    fn from(messages: Vec<ModelMessage>) -> Self {
        Self { messages }
    }
}
