//! Request Line Parser
//!
//! A request is one line of text terminated by `\n` (a trailing `\r` is
//! dropped). The line is split into arguments on whitespace; double quotes
//! group an argument that contains spaces, and inside quotes `\"`, `\\`, `\n`,
//! `\r` and `\t` are escapes.
//!
//! ```text
//! set greeting "hello world" ex 10
//! └┬┘ └──┬───┘ └─────┬─────┘ └┬┘ └┬┘
//!  │     │           │        │   └ "10"
//!  │     │           │        └──── "ex"
//!  │     │           └───────────── "hello world"
//!  │     └───────────────────────── "greeting"
//!  └─────────────────────────────── "set"
//! ```
//!
//! ## How the Parser Works
//!
//! [`LineParser::parse`] looks at the connection buffer and returns either:
//! - `Ok(Some((request, consumed)))` - a whole line was found; `consumed` bytes
//!   (terminator included) should be dropped from the buffer. `request` holds
//!   the arguments or the reason the line could not be tokenized.
//! - `Ok(None)` - no complete line yet, read more data
//! - `Err(ParseError::LineTooLong)` - the client sent more than the limit
//!   without a newline; the connection should be closed
//!
//! A malformed line only costs the client an error reply; the stream stays in
//! sync because the line is consumed either way.

use crate::protocol::types::LF;
use thiserror::Error;

/// Default upper bound on a single request line (64 KB).
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line is not valid UTF-8
    #[error("invalid UTF-8 in request")]
    InvalidUtf8,

    /// A quoted argument was not closed before the end of the line
    #[error("unbalanced quotes in request")]
    UnterminatedQuote,

    /// The buffer exceeded the line limit without a terminator
    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// The outcome of parsing one complete line.
pub type ParsedLine = Result<Vec<String>, ParseError>;

/// Incremental line framer and tokenizer.
#[derive(Debug, Clone)]
pub struct LineParser {
    max_line: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    /// Creates a parser with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Creates a parser that rejects lines longer than `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        Self { max_line }
    }

    /// Attempts to take one line from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> Result<Option<(ParsedLine, usize)>, ParseError> {
        let Some(end) = buf.iter().position(|&b| b == LF) else {
            if buf.len() > self.max_line {
                return Err(ParseError::LineTooLong(self.max_line));
            }
            return Ok(None);
        };

        if end > self.max_line {
            return Err(ParseError::LineTooLong(self.max_line));
        }

        let mut line = &buf[..end];
        if let Some((&b'\r', rest)) = line.split_last() {
            line = rest;
        }

        let parsed = std::str::from_utf8(line)
            .map_err(|_| ParseError::InvalidUtf8)
            .and_then(tokenize);

        Ok(Some((parsed, end + 1)))
    }
}

/// Splits a request line into arguments.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let Some(&first) = chars.peek() else {
            return Ok(args);
        };

        let mut arg = String::new();
        if first == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => arg.push('\n'),
                        Some('r') => arg.push('\r'),
                        Some('t') => arg.push('\t'),
                        Some(c) => arg.push(c),
                        None => return Err(ParseError::UnterminatedQuote),
                    },
                    Some(c) => arg.push(c),
                    None => return Err(ParseError::UnterminatedQuote),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                arg.push(c);
            }
        }
        args.push(arg);
    }
}
