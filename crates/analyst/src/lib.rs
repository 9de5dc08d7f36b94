//! A data-analysis agent that answers questions by writing Python and
//! running it in a sandboxed runtime.
//!
//! The crate includes a CLI tool for using in the terminal. It can also be
//! used as a library: build a [`Session`], then [`ask`](Session::ask) it
//! questions and [`render`] the resulting traces wherever you like.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
pub mod render;
mod repl;
mod session;
#[cfg(test)]
mod testing;

pub use config::Config;
pub use repl::{PROMPT, Repl};
pub use session::{Session, SessionBuilder, SessionError};

/// The directive that opens every conversation.
pub const SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// Re-exports of [`analyst_core`] crate.
pub mod core {
    pub use analyst_core::*;
}
