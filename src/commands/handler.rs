//! Command Handler
//!
//! Executes parsed [`Command`]s against the shared [`Store`] and turns the
//! outcome into a [`Reply`].
//!
//! ## Reply Mapping
//!
//! - `set` → `OK`
//! - `get`, `delete` → the value (string or integer), or `(nil)`
//! - `append` → new length, or an error reply for a missing key or a
//!   non-string value
//! - `keys` → array of keys
//! - `flushall` → `OK`
//! - `expire`, `persist`, `exists` → boolean
//! - `ttl` → remaining seconds, or a status line for the two sentinels
//! - `ping` → `PONG` or the echoed message
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────────┐    ┌─────────────┐                    │
//! │  │ Command::parse() │───>│  execute()  │───> Reply          │
//! │  └──────────────────┘    └──────┬──────┘                    │
//! │                                 │                           │
//! │                                 ▼                           │
//! │                               Store                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::command::Command;
use crate::protocol::Reply;
use crate::storage::{Store, Ttl};
use std::sync::Arc;
use tracing::debug;

/// Status line for a `ttl` on a key that does not exist.
pub const TTL_MISSING_MESSAGE: &str = "Key does not exist.";

/// Status line for a `ttl` on a key without expiry.
pub const TTL_PERSISTENT_MESSAGE: &str = "Key exists but has no expiration.";

/// Executes commands against the store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The shared store
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Parses and executes a tokenized request.
    ///
    /// Parse failures become error replies.
    pub fn execute_args(&self, args: &[String]) -> Reply {
        match Command::parse(args) {
            Ok(command) => self.execute(command),
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// Executes a command and returns the reply.
    pub fn execute(&self, command: Command) -> Reply {
        debug!(command = command.name(), "Executing command");

        match command {
            Command::Set { key, value, ttl } => {
                match ttl {
                    Some(ttl) => self.store.set_with_ttl(key, value, ttl),
                    None => self.store.set(key, value),
                };
                Reply::ok()
            }
            Command::Get { key } => self.store.get(&key).into(),
            Command::Delete { key } => self.store.delete(&key).into(),
            Command::Append { key, value } => match self.store.append(&key, &value) {
                Ok(len) => Reply::Integer(len as i64),
                Err(e) => Reply::error(e.to_string()),
            },
            Command::Keys => Reply::Array(self.store.keys()),
            Command::FlushAll => {
                self.store.flushall();
                Reply::ok()
            }
            Command::Expire { key, ttl } => Reply::Boolean(self.store.expire(&key, ttl)),
            Command::Ttl { key } => match self.store.ttl(&key) {
                ttl @ Ttl::Remaining(_) => Reply::Integer(ttl.code()),
                Ttl::Persistent => Reply::simple(TTL_PERSISTENT_MESSAGE),
                Ttl::Missing => Reply::simple(TTL_MISSING_MESSAGE),
            },
            Command::Persist { key } => Reply::Boolean(self.store.persist(&key)),
            Command::Exists { key } => Reply::Boolean(self.store.exists(&key)),
            Command::Ping { message: None } => Reply::simple("PONG"),
            Command::Ping {
                message: Some(message),
            } => Reply::Bulk(message),
            Command::Quit => Reply::ok(),
        }
    }
}
