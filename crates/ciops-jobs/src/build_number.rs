//! Discovery of the build number a trigger request just created.
//!
//! Jenkins queues the build asynchronously and the trigger response carries
//! no build number, so the number has to be inferred after the fact.

use std::time::Duration;

use async_trait::async_trait;

use crate::{JenkinsInstance, JobError, RemoteJobClient};

pub const DEFAULT_TRIGGER_SETTLE_DELAY: Duration = Duration::from_secs(10);

#[async_trait]
pub trait BuildNumberResolver: Send + Sync {
    async fn resolve_triggered_build(
        &self,
        client: &RemoteJobClient,
        instance: &JenkinsInstance,
        job_name: &str,
    ) -> Result<u64, JobError>;
}

#[derive(Debug, Clone, Copy)]
/// Reads the job's latest build id and assumes the new build is the next one.
///
/// Races when two triggers of the same job on the same instance overlap: both
/// may resolve to the same number. Callers that need exact identity must
/// serialize triggers per `(job, instance)`.
pub struct LastBuildPlusOne {
    settle_delay: Duration,
}

impl LastBuildPlusOne {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }
}

impl Default for LastBuildPlusOne {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_SETTLE_DELAY)
    }
}

#[async_trait]
impl BuildNumberResolver for LastBuildPlusOne {
    async fn resolve_triggered_build(
        &self,
        client: &RemoteJobClient,
        instance: &JenkinsInstance,
        job_name: &str,
    ) -> Result<u64, JobError> {
        let metadata = client
            .fetch_last_build_metadata(instance, job_name)
            .await
            .map_err(|error| match error {
                JobError::MalformedResponse { .. } => JobError::NextBuildNumberUnavailable,
                other => other,
            })?;
        // give the scheduler time to register the queued build
        tokio::time::sleep(self.settle_delay).await;

        let Some(metadata) = metadata else {
            tracing::warn!(job_name, instance = %instance.name, "job has no last build metadata");
            return Err(JobError::NextBuildNumberUnavailable);
        };
        let latest = metadata
            .get("id")
            .and_then(crate::transport_helpers::parse_build_number)
            .ok_or_else(|| {
                tracing::warn!(
                    job_name,
                    instance = %instance.name,
                    "last build metadata has no usable id"
                );
                JobError::NextBuildNumberUnavailable
            })?;
        Ok(latest.saturating_add(1))
    }
}
