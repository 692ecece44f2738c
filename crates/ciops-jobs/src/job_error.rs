use thiserror::Error;

#[derive(Debug, Error)]
/// Failures talking to a remote job endpoint.
///
/// Messages never include request URLs with query strings or credentials, so
/// they are safe to relay to chat users.
pub enum JobError {
    #[error("unknown jenkins instance `{0}`")]
    UnknownInstance(String),
    #[error("The job was not invoked successfully. Details: status {status} {reason}")]
    TriggerRejected { status: u16, reason: String },
    #[error("{operation} failed: {reason}")]
    Transport { operation: String, reason: String },
    #[error("could not determine the next build number")]
    NextBuildNumberUnavailable,
    #[error("{operation} returned an unexpected payload: {reason}")]
    MalformedResponse { operation: String, reason: String },
    #[error("build {build_number} of {job_name} does not exist yet")]
    BuildNotFound { job_name: String, build_number: u64 },
}

impl JobError {
    pub(crate) fn transport(operation: &str, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(operation: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the remote side simply has not caught up yet.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, Self::BuildNotFound { .. })
    }
}
