//! Chat command parsing and dispatch for the ciops operations console.
//!
//! The parser turns a mention-stripped chat line into a verb plus arguments,
//! and the router maps verbs onto registered handlers behind a single error
//! firewall that always produces a reply string.

pub mod command_error;
pub mod command_parser;
pub mod command_router;

pub use command_error::CommandError;
pub use command_parser::{
    merge_structured_arguments, normalize_command_text, parse_command_line, CommandLine,
};
pub use command_router::{
    command_fn, CommandArity, CommandHandler, CommandRegistry, CommandRouter, CommandSpec,
    COMMAND_NOT_RECOGNIZED_REPLY, GENERIC_FAILURE_REPLY,
};
