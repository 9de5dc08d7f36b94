//! An abstraction layer for different LLMs.
//!
//! This crate establishes an unified protocol for the agent to talk to a
//! chat model that can request tool calls, so that the agent loop does not
//! depend on any particular vendor API.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Every message in a
//! conversation is one variant of the closed [`ModelMessage`] union, and the
//! variant is chosen by whoever produces the message.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
