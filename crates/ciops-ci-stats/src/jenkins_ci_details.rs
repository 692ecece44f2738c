use std::time::Duration;

use async_trait::async_trait;
use ciops_jobs::{pr_job_name, JobError, JobStatusPoller, PollResult, RemoteJobClient};

use crate::notification_reactor::{CiDetailSource, PrTestReport};

#[derive(Clone)]
/// Reads pull request check details from the Jenkins organization folder.
pub struct JenkinsCiDetails {
    client: RemoteJobClient,
    poller: JobStatusPoller,
    instance: String,
    org_folder: String,
}

impl JenkinsCiDetails {
    pub fn new(
        client: RemoteJobClient,
        poller: JobStatusPoller,
        instance: impl Into<String>,
        org_folder: impl Into<String>,
    ) -> Self {
        Self {
            client,
            poller,
            instance: instance.into(),
            org_folder: org_folder.into(),
        }
    }
}

#[async_trait]
impl CiDetailSource for JenkinsCiDetails {
    async fn stage_duration(
        &self,
        repo_name: &str,
        change_request_id: &str,
        stage_name: &str,
    ) -> Result<Duration, JobError> {
        let job_name = pr_job_name(&self.org_folder, repo_name, change_request_id);
        self.client
            .stage_duration(&self.instance, &job_name, stage_name)
            .await
    }

    /// Waits (bounded by the poll policy) for the latest run to finish, then
    /// lists its tests.
    async fn latest_test_report(
        &self,
        repo_name: &str,
        change_request_id: &str,
    ) -> Result<PrTestReport, JobError> {
        let job_name = pr_job_name(&self.org_folder, repo_name, change_request_id);
        let Some(run_number) = self
            .client
            .last_build_number(&self.instance, &job_name)
            .await?
        else {
            return Ok(PrTestReport::WorkspaceGone);
        };

        let state = self
            .poller
            .poll(&self.client, &job_name, run_number, &self.instance)
            .await?;
        if state == PollResult::GivenUp {
            return Ok(PrTestReport::StatusUnknown);
        }

        let summary = self
            .client
            .test_summary(
                &self.instance,
                &self.org_folder,
                repo_name,
                change_request_id,
                run_number,
            )
            .await?;
        Ok(summary.map_or(PrTestReport::InFlight, PrTestReport::Completed))
    }
}
