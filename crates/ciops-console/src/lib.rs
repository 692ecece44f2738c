//! The ciops operations console: built-in chat commands over the Jenkins
//! client plus the CI notification reactor, behind one facade.

pub mod builtin_commands;
pub mod ops_console;
pub mod trigger_locks;

pub use builtin_commands::{
    builtin_registry, parse_job_parameters, BuiltinCommand, ConsoleContext, BUILTIN_COMMANDS,
};
pub use ops_console::{ConsoleConfig, OpsConsole, USAGE_REPLY};
pub use trigger_locks::TriggerLocks;
