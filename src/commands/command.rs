//! Command Parsing
//!
//! Turns a tokenized request into a [`Command`]. The set of commands is closed:
//! the command word is looked up in [`COMMAND_TABLE`], which fixes its arity
//! and the function that builds the variant. Command words are
//! case-insensitive.

use std::time::Duration;
use thiserror::Error;

/// Largest TTL a command may request: 100 years.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Every request the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `set key value [ex seconds]` or `set key value seconds`
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// `get key`
    Get { key: String },
    /// `delete key` (alias `del`)
    Delete { key: String },
    /// `append key value`
    Append { key: String, value: String },
    /// `keys`
    Keys,
    /// `flushall`
    FlushAll,
    /// `expire key seconds`
    Expire { key: String, ttl: Duration },
    /// `ttl key`
    Ttl { key: String },
    /// `persist key`
    Persist { key: String },
    /// `exists key`
    Exists { key: String },
    /// `ping [message]`
    Ping { message: Option<String> },
    /// `quit` (alias `exit`)
    Quit,
}

/// Errors that can occur while turning arguments into a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No arguments at all
    #[error("empty command")]
    Empty,

    /// The command word is not in the table
    #[error("unknown command '{0}'")]
    Unknown(String),

    /// Too many or too few arguments
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// An argument that must be a non-negative integer is not one
    #[error("value is not a non-negative integer: '{0}'")]
    InvalidInteger(String),

    /// A TTL larger than [`MAX_TTL_SECS`]
    #[error("invalid expire time '{0}'")]
    TtlOutOfRange(String),

    /// Arguments are present but not in a recognized form
    #[error("syntax error near '{0}'")]
    Syntax(String),
}

type Builder = fn(&[String]) -> Result<Command, CommandError>;

/// One row of the command table.
#[derive(Debug)]
pub struct CommandSpec {
    /// Lowercase command word
    pub name: &'static str,
    /// Minimum number of arguments after the command word
    pub min_args: usize,
    /// Maximum number of arguments after the command word
    pub max_args: usize,
    build: Builder,
}

/// The fixed command lookup table.
pub static COMMAND_TABLE: &[CommandSpec] = &[
    CommandSpec { name: "set", min_args: 2, max_args: 4, build: build_set },
    CommandSpec { name: "get", min_args: 1, max_args: 1, build: build_get },
    CommandSpec { name: "delete", min_args: 1, max_args: 1, build: build_delete },
    CommandSpec { name: "del", min_args: 1, max_args: 1, build: build_delete },
    CommandSpec { name: "append", min_args: 2, max_args: 2, build: build_append },
    CommandSpec { name: "keys", min_args: 0, max_args: 0, build: build_keys },
    CommandSpec { name: "flushall", min_args: 0, max_args: 0, build: build_flushall },
    CommandSpec { name: "expire", min_args: 2, max_args: 2, build: build_expire },
    CommandSpec { name: "ttl", min_args: 1, max_args: 1, build: build_ttl },
    CommandSpec { name: "persist", min_args: 1, max_args: 1, build: build_persist },
    CommandSpec { name: "exists", min_args: 1, max_args: 1, build: build_exists },
    CommandSpec { name: "ping", min_args: 0, max_args: 1, build: build_ping },
    CommandSpec { name: "quit", min_args: 0, max_args: 0, build: build_quit },
    CommandSpec { name: "exit", min_args: 0, max_args: 0, build: build_quit },
];

/// Finds the table row for a command word.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

impl Command {
    /// Parses a full request: command word followed by its arguments.
    pub fn parse(args: &[String]) -> Result<Self, CommandError> {
        let (name, rest) = args.split_first().ok_or(CommandError::Empty)?;

        let spec = lookup(name).ok_or_else(|| CommandError::Unknown(name.clone()))?;
        if rest.len() < spec.min_args || rest.len() > spec.max_args {
            return Err(CommandError::WrongArity(spec.name));
        }

        (spec.build)(rest)
    }

    /// The canonical command word, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::Append { .. } => "append",
            Command::Keys => "keys",
            Command::FlushAll => "flushall",
            Command::Expire { .. } => "expire",
            Command::Ttl { .. } => "ttl",
            Command::Persist { .. } => "persist",
            Command::Exists { .. } => "exists",
            Command::Ping { .. } => "ping",
            Command::Quit => "quit",
        }
    }
}

// ============================================================================
// Builders (arity already checked)
// ============================================================================

fn parse_seconds(arg: &str) -> Result<Duration, CommandError> {
    let secs = arg
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidInteger(arg.to_string()))?;
    if secs > MAX_TTL_SECS {
        return Err(CommandError::TtlOutOfRange(arg.to_string()));
    }
    Ok(Duration::from_secs(secs))
}

fn build_set(args: &[String]) -> Result<Command, CommandError> {
    let ttl = match &args[2..] {
        [] => None,
        [seconds] => Some(parse_seconds(seconds)?),
        [flag, seconds] if flag.eq_ignore_ascii_case("ex") => Some(parse_seconds(seconds)?),
        [flag, _] => return Err(CommandError::Syntax(flag.clone())),
        _ => return Err(CommandError::WrongArity("set")),
    };

    Ok(Command::Set {
        key: args[0].clone(),
        value: args[1].clone(),
        ttl,
    })
}

fn build_get(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Get {
        key: args[0].clone(),
    })
}

fn build_delete(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Delete {
        key: args[0].clone(),
    })
}

fn build_append(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Append {
        key: args[0].clone(),
        value: args[1].clone(),
    })
}

fn build_keys(_: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Keys)
}

fn build_flushall(_: &[String]) -> Result<Command, CommandError> {
    Ok(Command::FlushAll)
}

fn build_expire(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Expire {
        key: args[0].clone(),
        ttl: parse_seconds(&args[1])?,
    })
}

fn build_ttl(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Ttl {
        key: args[0].clone(),
    })
}

fn build_persist(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Persist {
        key: args[0].clone(),
    })
}

fn build_exists(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Exists {
        key: args[0].clone(),
    })
}

fn build_ping(args: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Ping {
        message: args.first().cloned(),
    })
}

fn build_quit(_: &[String]) -> Result<Command, CommandError> {
    Ok(Command::Quit)
}
