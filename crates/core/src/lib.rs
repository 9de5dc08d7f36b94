//! Core logic of the analyst: the agent loop, the tool registry bound to an
//! execution runtime, and the classifier that turns a finished conversation
//! into trace records.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod error;
mod model_client;
#[cfg(test)]
mod testing;
pub mod tool;
pub mod trace;

pub use agent::{Agent, AgentBuilder, DEFAULT_MAX_ITERATIONS};
pub use conversation::Conversation;
pub use error::AgentError;
