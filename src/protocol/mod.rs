//! Line Protocol Implementation
//!
//! DuraKV speaks a small line-oriented text protocol: one request per line,
//! one reply per request. It is meant to be typed by hand (`nc`, `telnet`) as
//! much as driven by programs.
//!
//! ## Modules
//!
//! - `parser`: frames request lines out of the connection buffer and splits
//!   them into arguments
//! - `types`: the `Reply` enum and its wire rendering
//!
//! ## Example
//!
//! ```
//! use durakv::protocol::{LineParser, Reply};
//!
//! let parser = LineParser::new();
//! let (args, consumed) = parser.parse(b"set name \"dura kv\"\n").unwrap().unwrap();
//! assert_eq!(args.unwrap(), vec!["set", "name", "dura kv"]);
//! assert_eq!(consumed, 19);
//!
//! assert_eq!(&Reply::ok().serialize()[..], b"OK\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{tokenize, LineParser, ParseError, ParsedLine};
pub use types::Reply;
