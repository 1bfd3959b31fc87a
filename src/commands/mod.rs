//! Command Module
//!
//! This module implements the command layer for DuraKV. It turns tokenized
//! request lines into a closed set of commands, executes them against the
//! store, and returns replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<String>
//!          ▼
//! ┌─────────────────┐
//! │ COMMAND_TABLE   │  (command.rs)
//! │  name → arity   │
//! │       → builder │
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler.rs)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `set key value [ex seconds]`, `get key`, `delete key` / `del key`
//! - `append key value`, `keys`, `flushall`
//! - `expire key seconds`, `ttl key`, `persist key`, `exists key`
//! - `ping [message]`, `quit` / `exit`

pub mod command;
pub mod handler;

// Re-export the main types
pub use command::{Command, CommandError, COMMAND_TABLE};
pub use handler::CommandHandler;
