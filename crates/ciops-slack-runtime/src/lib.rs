//! Slack Socket Mode transport for the ciops console.

mod slack_helpers;
pub mod slack_runtime;

pub use slack_runtime::{run_slack_bridge, SlackBridgeConfig};
