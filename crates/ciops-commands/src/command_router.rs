//! Verb registry and the dispatch firewall that turns every outcome into a reply.

use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::FutureExt;

use crate::{command_parser::parse_command_line, CommandError};

pub const COMMAND_NOT_RECOGNIZED_REPLY: &str = "command not recognized. :thisisfine:";
pub const GENERIC_FAILURE_REPLY: &str = "Something went wrong. Contact the QA team";
const TRANSPORT_FAILURE_PREFIX: &str = "Something wrong happened :facepalm:. Deets:";

#[async_trait]
/// A command implementation. Receives the positional arguments after the verb.
pub trait CommandHandler: Send + Sync {
    async fn run(&self, args: Vec<String>) -> Result<String, CommandError>;
}

struct FnCommandHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, CommandError>> + Send,
{
    async fn run(&self, args: Vec<String>) -> Result<String, CommandError> {
        (self.0)(args).await
    }
}

/// Wraps an async closure as a [`CommandHandler`].
pub fn command_fn<F, Fut>(handler: F) -> Arc<dyn CommandHandler>
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, CommandError>> + Send + 'static,
{
    Arc::new(FnCommandHandler(handler))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Accepted positional argument count, inclusive on both ends.
pub struct CommandArity {
    pub min: usize,
    pub max: usize,
}

impl CommandArity {
    pub const fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }

    fn describe(&self) -> String {
        let plural = |count: usize| if count == 1 { "argument" } else { "arguments" };
        if self.min == self.max {
            format!("{} {}", self.min, plural(self.min))
        } else {
            format!("{} to {} {}", self.min, self.max, plural(self.max))
        }
    }
}

#[derive(Clone)]
/// Registration record for one verb.
pub struct CommandSpec {
    pub verb: String,
    pub args_help: String,
    pub example: String,
    pub arity: CommandArity,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new(
        verb: impl Into<String>,
        args_help: impl Into<String>,
        example: impl Into<String>,
        arity: CommandArity,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            verb: verb.into(),
            args_help: args_help.into(),
            example: example.into(),
            arity,
            handler,
        }
    }

    pub fn help_text(&self) -> String {
        format!(
            "instructions for {}: \nargs:  {}\nexample:  {}",
            self.verb, self.args_help, self.example
        )
    }

    fn check_arity(&self, received: usize) -> Result<(), CommandError> {
        if self.arity.accepts(received) {
            return Ok(());
        }
        Err(CommandError::Arity {
            verb: self.verb.clone(),
            expected: self.arity.describe(),
            received,
        })
    }
}

#[derive(Clone, Default)]
/// Verbs in registration order. Built once at startup, then shared read-only.
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec) -> Result<()> {
        if spec.verb.trim().is_empty() || spec.verb.chars().any(char::is_whitespace) {
            bail!("command verb '{}' must be a single non-empty token", spec.verb);
        }
        if self.get(&spec.verb).is_some() {
            bail!("command verb '{}' is already registered", spec.verb);
        }
        if spec.arity.min > spec.arity.max {
            bail!("command verb '{}' has an empty arity range", spec.verb);
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn get(&self, verb: &str) -> Option<&CommandSpec> {
        self.specs.iter().find(|spec| spec.verb == verb)
    }

    pub fn verbs(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.verb.as_str())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[derive(Clone)]
/// Dispatches verbs to handlers. No failure escapes [`CommandRouter::dispatch`].
pub struct CommandRouter {
    registry: Arc<CommandRegistry>,
    usage: String,
}

impl CommandRouter {
    pub fn new(registry: CommandRegistry, usage: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(registry),
            usage: usage.into(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Parses a mention-stripped chat line and dispatches it.
    pub async fn dispatch_line(&self, raw: &str) -> String {
        match parse_command_line(raw) {
            Some(line) => self.dispatch(&line.verb, line.args).await,
            None => self.usage.clone(),
        }
    }

    pub async fn dispatch(&self, verb: &str, args: Vec<String>) -> String {
        let Some(spec) = self.registry.get(verb) else {
            tracing::info!(verb, "command not recognized");
            return COMMAND_NOT_RECOGNIZED_REPLY.to_string();
        };
        if args.first().map(String::as_str) == Some("help") {
            return spec.help_text();
        }
        if let Err(error) = spec.check_arity(args.len()) {
            return render_command_error(verb, error);
        }

        tracing::info!(verb, args = ?args, "dispatching command");
        let outcome = AssertUnwindSafe(spec.handler.run(args))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => render_command_error(verb, error),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|value| value.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(verb, panic = %detail, "command handler panicked");
                GENERIC_FAILURE_REPLY.to_string()
            }
        }
    }
}

fn render_command_error(verb: &str, error: CommandError) -> String {
    match error {
        CommandError::Arity { .. } | CommandError::UserInput(_) => {
            tracing::info!(verb, error = %error, "command rejected");
            error.to_string()
        }
        CommandError::NotYetAvailable(message) => message,
        CommandError::RetryBudgetExhausted(_) => {
            tracing::warn!(verb, error = %error, "command gave up waiting");
            error.to_string()
        }
        CommandError::Transport(detail) => {
            tracing::warn!(verb, detail = %detail, "command transport failure");
            format!("{TRANSPORT_FAILURE_PREFIX} {detail}")
        }
        CommandError::Internal(error) => {
            tracing::error!(verb, error = ?error, "command handler failed");
            GENERIC_FAILURE_REPLY.to_string()
        }
    }
}
