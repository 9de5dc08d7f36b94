use std::collections::HashSet;

use analyst_model::ToolCallRequest;

/// Where a run currently is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TurnStage {
    /// Waiting for the next model response.
    #[default]
    AwaitingModel,
    /// Running the tool calls of the last response.
    ExecutingTools(Vec<ToolCallRequest>),
    /// The model answered without requesting tools.
    Done,
}

impl TurnStage {
    /// The stage following a model response with the given tool calls.
    #[inline]
    pub fn after_response(tool_calls: &[ToolCallRequest]) -> Self {
        if tool_calls.is_empty() {
            TurnStage::Done
        } else {
            TurnStage::ExecutingTools(tool_calls.to_vec())
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            TurnStage::AwaitingModel => "awaiting model",
            TurnStage::ExecutingTools(_) => "executing tools",
            TurnStage::Done => "done",
        }
    }
}

/// Keeps tool call ids unique within one conversation.
#[derive(Debug, Default)]
pub struct CallIds {
    seen: HashSet<String>,
    next: usize,
}

impl CallIds {
    /// Replaces empty or already used ids with fresh `call_<n>` ids.
    pub fn assign(
        &mut self,
        calls: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallRequest> {
        calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() || self.seen.contains(&call.id) {
                    let fresh = self.fresh();
                    warn!(
                        original = %call.id,
                        assigned = %fresh,
                        "reassigning tool call id"
                    );
                    call.id = fresh;
                }
                self.seen.insert(call.id.clone());
                call
            })
            .collect()
    }

    fn fresh(&mut self) -> String {
        loop {
            self.next += 1;
            let id = format!("call_{}", self.next);
            if !self.seen.contains(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: "run_python_code".to_owned(),
            arguments: json!({}),
        }
    }

    #[test]
    fn test_assign_ids() {
        let mut ids = CallIds::default();
        let first = ids.assign(vec![call("call_1"), call(""), call("call_1")]);
        let first: Vec<_> = first.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first, ["call_1", "call_2", "call_3"]);

        // Ids stay unique across responses.
        let second = ids.assign(vec![call("call_2"), call("x")]);
        let second: Vec<_> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(second, ["call_4", "x"]);
    }

    #[test]
    fn test_after_response() {
        assert_eq!(TurnStage::after_response(&[]), TurnStage::Done);
        assert_eq!(
            TurnStage::after_response(&[call("a")]),
            TurnStage::ExecutingTools(vec![call("a")])
        );
    }
}
