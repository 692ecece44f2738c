//! Command-line configuration and startup for the `ciops` binary.

pub mod cli_args;
pub mod startup;

pub use cli_args::{parse_name_value, Cli};
pub use startup::{
    api_token_env_var, build_console_config, init_tracing, resolve_jenkins_instances, run_cli,
};
