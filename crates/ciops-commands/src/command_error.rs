use ciops_jobs::JobError;
use thiserror::Error;

#[derive(Debug, Error)]
/// Failure kinds a command handler may return to the router.
///
/// The router renders each kind differently: input and arity problems are
/// echoed back verbatim, transport problems are reported with their redacted
/// detail, and internal failures collapse into a generic reply after logging.
pub enum CommandError {
    #[error("{verb} expects {expected} but received {received}")]
    Arity {
        verb: String,
        expected: String,
        received: usize,
    },
    #[error("{0}")]
    UserInput(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    NotYetAvailable(String),
    #[error("could not determine status: {0}")]
    RetryBudgetExhausted(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CommandError {
    pub fn user_input(message: impl Into<String>) -> Self {
        Self::UserInput(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns true for failures caused by what the user typed.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Arity { .. } | Self::UserInput(_))
    }
}

impl From<JobError> for CommandError {
    fn from(error: JobError) -> Self {
        match error {
            JobError::UnknownInstance(_) => Self::UserInput(error.to_string()),
            JobError::BuildNotFound { .. } => Self::NotYetAvailable(error.to_string()),
            JobError::TriggerRejected { .. }
            | JobError::Transport { .. }
            | JobError::NextBuildNumberUnavailable
            | JobError::MalformedResponse { .. } => Self::Transport(error.to_string()),
        }
    }
}
