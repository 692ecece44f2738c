//! Bounded, fixed-interval polling for the outcome of a remote build.
//!
//! The interval is constant across attempts (no backoff) and the worst-case
//! wait is `interval * max_attempts`.

use std::time::Duration;

use async_trait::async_trait;

use crate::JobError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_MAX_ATTEMPTS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Observed state of a build.
///
/// `GivenUp` means the retry budget ran out; it says nothing about whether the
/// build failed.
pub enum PollResult {
    Pending,
    Succeeded,
    Failed(String),
    NotFound,
    GivenUp,
}

impl PollResult {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::GivenUp)
    }

    fn from_remote_result(result: Option<&str>) -> Self {
        match result.map(str::trim).filter(|value| !value.is_empty()) {
            None => Self::Pending,
            Some(value) if value.eq_ignore_ascii_case("SUCCESS") => Self::Succeeded,
            Some(value) => Self::Failed(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Raw answer from one build-record fetch.
pub enum BuildLookup {
    NotFound,
    Found { result: Option<String> },
}

#[async_trait]
/// Something that can report the record of a specific build.
pub trait BuildStatusSource: Send + Sync {
    async fn fetch_build_result(
        &self,
        instance: &str,
        job_name: &str,
        build_number: u64,
    ) -> Result<BuildLookup, JobError>;
}

/// Fetches a build record once and classifies it.
pub async fn probe_build<S>(
    source: &S,
    instance: &str,
    job_name: &str,
    build_number: u64,
) -> Result<PollResult, JobError>
where
    S: BuildStatusSource + ?Sized,
{
    let lookup = source
        .fetch_build_result(instance, job_name, build_number)
        .await?;
    Ok(match lookup {
        BuildLookup::NotFound => PollResult::NotFound,
        BuildLookup::Found { result } => PollResult::from_remote_result(result.as_deref()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Retries after the first fetch; at most `max_attempts + 1` fetches happen.
    pub max_attempts: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Upper bound on time spent sleeping between fetches.
    pub fn max_wait(&self) -> Duration {
        self.interval
            .saturating_mul(u32::try_from(self.max_attempts).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobStatusPoller {
    policy: PollPolicy,
}

impl JobStatusPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Polls until the build reports a result or the attempt budget runs out.
    ///
    /// Missing and still-running builds are retried after a fixed sleep.
    /// Transport failures end polling immediately with an error.
    pub async fn poll<S>(
        &self,
        source: &S,
        job_name: &str,
        build_number: u64,
        instance: &str,
    ) -> Result<PollResult, JobError>
    where
        S: BuildStatusSource + ?Sized,
    {
        for attempt in 0..=self.policy.max_attempts {
            let observed = probe_build(source, instance, job_name, build_number).await?;
            if observed.is_terminal() {
                tracing::debug!(job_name, build_number, attempt, result = ?observed, "build reached a result");
                return Ok(observed);
            }
            tracing::debug!(
                job_name,
                build_number,
                attempt,
                state = ?observed,
                "build has no result yet"
            );
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        tracing::warn!(
            job_name,
            build_number,
            instance,
            max_attempts = self.policy.max_attempts,
            "gave up waiting for build result"
        );
        Ok(PollResult::GivenUp)
    }
}
