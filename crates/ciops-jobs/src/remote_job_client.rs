//! Jenkins REST client used to trigger jobs and read build metadata.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    build_number::{BuildNumberResolver, LastBuildPlusOne, DEFAULT_TRIGGER_SETTLE_DELAY},
    job_status_poller::{BuildLookup, BuildStatusSource},
    transport_helpers::{
        job_path, parse_build_number, redact_query, status_reason, strip_chat_url_decoration,
        truncate_for_error,
    },
    JobError,
};

const BLUE_OCEAN_PIPELINES_PATH: &str = "blue/rest/organizations/jenkins/pipelines";

#[derive(Clone)]
/// One Jenkins server and the credential used against it.
pub struct JenkinsInstance {
    pub name: String,
    pub base_url: String,
    pub user: String,
    pub api_token: String,
}

impl std::fmt::Debug for JenkinsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsInstance")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTrigger {
    pub job_name: String,
    pub instance: String,
    pub parameters: BTreeMap<String, String>,
}

impl JobTrigger {
    pub fn new(job_name: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            instance: instance.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Address of the build a trigger created.
pub struct JobHandle {
    pub job_name: String,
    pub instance: String,
    pub build_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteJobClientConfig {
    pub instances: Vec<JenkinsInstance>,
    /// Remote build token sent as the `token` query parameter on triggers.
    pub job_token: String,
    pub request_timeout_ms: u64,
    pub trigger_settle_delay: Duration,
}

impl Default for RemoteJobClientConfig {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            job_token: String::new(),
            request_timeout_ms: 30_000,
            trigger_settle_delay: DEFAULT_TRIGGER_SETTLE_DELAY,
        }
    }
}

/// Builds the folder-qualified job name of a pull request's CI pipeline.
pub fn pr_job_name(org_folder: &str, repo_name: &str, pr_number: &str) -> String {
    format!("{org_folder}/{repo_name}/PR-{pr_number}")
}

#[derive(Clone)]
pub struct RemoteJobClient {
    http: reqwest::Client,
    instances: BTreeMap<String, JenkinsInstance>,
    job_token: String,
    resolver: Arc<dyn BuildNumberResolver>,
}

impl RemoteJobClient {
    pub fn new(config: RemoteJobClientConfig) -> Result<Self, JobError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("ciops-jenkins-client"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| JobError::transport("create jenkins client", error.to_string()))?;

        let instances = config
            .instances
            .into_iter()
            .map(|mut instance| {
                instance.base_url = instance.base_url.trim_end_matches('/').to_string();
                instance.api_token = instance.api_token.trim().to_string();
                (instance.name.clone(), instance)
            })
            .collect();

        Ok(Self {
            http,
            instances,
            job_token: config.job_token.trim().to_string(),
            resolver: Arc::new(LastBuildPlusOne::new(config.trigger_settle_delay)),
        })
    }

    /// Replaces the build-number discovery strategy.
    pub fn with_resolver(mut self, resolver: Arc<dyn BuildNumberResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn instance(&self, name: &str) -> Result<&JenkinsInstance, JobError> {
        self.instances
            .get(name)
            .ok_or_else(|| JobError::UnknownInstance(name.to_string()))
    }

    pub fn instance_names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn console_url(
        &self,
        instance: &str,
        job_name: &str,
        build_number: u64,
    ) -> Result<String, JobError> {
        let instance = self.instance(instance)?;
        Ok(format!(
            "{}/{}/{build_number}/console",
            instance.base_url,
            job_path(job_name)
        ))
    }

    /// Triggers a job and resolves the number of the build it queued.
    ///
    /// A rejected trigger is returned immediately without retry. The client
    /// takes no lock; see [`LastBuildPlusOne`] for the race this implies.
    pub async fn trigger(&self, trigger: &JobTrigger) -> Result<JobHandle, JobError> {
        let instance = self.instance(&trigger.instance)?;
        let endpoint = if trigger.parameters.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let url = format!(
            "{}/{}/{endpoint}",
            instance.base_url,
            job_path(&trigger.job_name)
        );
        let mut query = vec![("token".to_string(), self.job_token.clone())];
        for (key, value) in &trigger.parameters {
            let cleaned = strip_chat_url_decoration(value);
            if cleaned != *value {
                tracing::warn!(parameter = %key, "stripped chat link decoration from url parameter");
            }
            query.push((key.clone(), cleaned));
        }

        tracing::info!(
            job_name = %trigger.job_name,
            instance = %instance.name,
            url = %redact_query(&url),
            parameters = ?trigger.parameters.keys().collect::<Vec<_>>(),
            "triggering remote job"
        );
        let response = self
            .send(
                "trigger job",
                self.http
                    .post(&url)
                    .basic_auth(&instance.user, Some(&instance.api_token))
                    .query(&query),
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                job_name = %trigger.job_name,
                instance = %instance.name,
                status = status.as_u16(),
                "remote job trigger rejected"
            );
            return Err(JobError::TriggerRejected {
                status: status.as_u16(),
                reason: status_reason(status),
            });
        }

        let build_number = self
            .resolver
            .resolve_triggered_build(self, instance, &trigger.job_name)
            .await?;
        tracing::info!(
            job_name = %trigger.job_name,
            instance = %instance.name,
            build_number,
            "remote job triggered"
        );
        Ok(JobHandle {
            job_name: trigger.job_name.clone(),
            instance: instance.name.clone(),
            build_number,
        })
    }

    /// Reads `lastBuild` metadata. `None` when the job has no builds or is gone.
    pub async fn fetch_last_build_metadata(
        &self,
        instance: &JenkinsInstance,
        job_name: &str,
    ) -> Result<Option<Value>, JobError> {
        let url = format!(
            "{}/{}/lastBuild/api/json",
            instance.base_url,
            job_path(job_name)
        );
        self.get_json_or_missing("fetch last build metadata", instance, &url)
            .await
    }

    pub async fn last_build_number(
        &self,
        instance: &str,
        job_name: &str,
    ) -> Result<Option<u64>, JobError> {
        let instance = self.instance(instance)?;
        let Some(metadata) = self.fetch_last_build_metadata(instance, job_name).await? else {
            tracing::warn!(job_name, "job is no longer available");
            return Ok(None);
        };
        metadata
            .get("number")
            .or_else(|| metadata.get("id"))
            .and_then(parse_build_number)
            .map(Some)
            .ok_or_else(|| JobError::malformed("fetch last build metadata", "missing build number"))
    }

    /// Fetches a named artifact from the job's last successful build.
    pub async fn fetch_archived_artifact(
        &self,
        instance: &str,
        job_name: &str,
        file_name: &str,
    ) -> Result<String, JobError> {
        let operation = "fetch archived artifact";
        let instance = self.instance(instance)?;
        let url = format!(
            "{}/{}/lastSuccessfulBuild/artifact/{file_name}",
            instance.base_url,
            job_path(job_name)
        );
        let response = self
            .send(
                operation,
                self.http
                    .get(&url)
                    .basic_auth(&instance.user, Some(&instance.api_token))
                    .query(&[("token", self.job_token.as_str())]),
            )
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::error!(job_name, file_name, status = status.as_u16(), "artifact request failed");
            return Err(JobError::transport(
                operation,
                format!("The request failed. Details: {}", status_reason(status)),
            ));
        }
        response
            .text()
            .await
            .map_err(|error| JobError::transport(operation, error.without_url().to_string()))
    }

    /// Duration of a named stage in the most recent pipeline run.
    pub async fn stage_duration(
        &self,
        instance: &str,
        job_name: &str,
        stage_name: &str,
    ) -> Result<Duration, JobError> {
        let operation = "fetch pipeline stages";
        let instance = self.instance(instance)?;
        let url = format!("{}/{}/wfapi/runs", instance.base_url, job_path(job_name));
        let Some(runs) = self.get_json_or_missing(operation, instance, &url).await? else {
            return Err(JobError::transport(operation, "status 404 Not Found"));
        };

        // the first run is always the latest
        let stages = runs
            .get(0)
            .and_then(|run| run.get("stages"))
            .and_then(Value::as_array)
            .ok_or_else(|| JobError::malformed(operation, "no runs with stages"))?;
        stages
            .iter()
            .find(|stage| stage.get("name").and_then(Value::as_str) == Some(stage_name))
            .and_then(|stage| stage.get("durationMillis"))
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                JobError::malformed(
                    operation,
                    format!("no stage named `{stage_name}` in job {job_name}"),
                )
            })
    }

    /// Lists passed and failed tests of a PR run. `None` while the run is in flight.
    pub async fn test_summary(
        &self,
        instance: &str,
        org_folder: &str,
        repo_name: &str,
        pr_number: &str,
        run_number: u64,
    ) -> Result<Option<TestSummary>, JobError> {
        let operation = "fetch pull request test results";
        let instance = self.instance(instance)?;
        let url = format!(
            "{}/{BLUE_OCEAN_PIPELINES_PATH}/{org_folder}/{repo_name}/PR-{pr_number}/runs/{run_number}/tests/",
            instance.base_url
        );
        let Some(tests) = self.get_json_or_missing(operation, instance, &url).await? else {
            return Ok(None);
        };
        let tests = tests
            .as_array()
            .ok_or_else(|| JobError::malformed(operation, "expected a list of tests"))?;

        let mut summary = TestSummary::default();
        for test in tests {
            let Some(name) = test.get("name").and_then(Value::as_str) else {
                continue;
            };
            if test.get("status").and_then(Value::as_str) == Some("PASSED") {
                summary.passed.push(name.to_string());
            } else {
                summary.failed.push(name.to_string());
            }
        }
        tracing::info!(
            repo_name,
            pr_number,
            run_number,
            passed = summary.passed.len(),
            failed = summary.failed.len(),
            "pull request check test summary"
        );
        Ok(Some(summary))
    }

    /// Replays a PR pipeline run and returns the URL of the replayed run.
    pub async fn replay_pr_run(
        &self,
        instance: &str,
        org_folder: &str,
        repo_name: &str,
        pr_number: &str,
        run_number: u64,
    ) -> Result<String, JobError> {
        let operation = "replay pull request run";
        let instance = self.instance(instance)?;
        let url = format!(
            "{}/{BLUE_OCEAN_PIPELINES_PATH}/{org_folder}/{repo_name}/PR-{pr_number}/runs/{run_number}/replay",
            instance.base_url
        );
        tracing::info!(repo_name, pr_number, run_number, "replaying pull request run");
        let response = self
            .send(
                operation,
                self.http
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .basic_auth(&instance.user, Some(&instance.api_token)),
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|payload| {
                    payload
                        .get("message")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned)
                })
                .unwrap_or_else(|| status_reason(status));
            tracing::error!(repo_name, pr_number, status = status.as_u16(), "replay rejected");
            return Err(JobError::transport(
                operation,
                format!(
                    "The replay operation failed. Details: {}",
                    truncate_for_error(&detail, 400)
                ),
            ));
        }

        Ok(format!(
            "{}/blue/organizations/jenkins/{org_folder}%2F{repo_name}/detail/PR-{pr_number}/{}/pipeline",
            instance.base_url,
            run_number.saturating_add(1)
        ))
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, JobError> {
        request
            .send()
            .await
            .map_err(|error| JobError::transport(operation, error.without_url().to_string()))
    }

    async fn get_json_or_missing(
        &self,
        operation: &str,
        instance: &JenkinsInstance,
        url: &str,
    ) -> Result<Option<Value>, JobError> {
        tracing::debug!(operation, url = %redact_query(url), "jenkins request");
        let response = self
            .send(
                operation,
                self.http
                    .get(url)
                    .basic_auth(&instance.user, Some(&instance.api_token)),
            )
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(JobError::transport(
                operation,
                format!("status {} {}", status.as_u16(), status_reason(status)),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|error| JobError::transport(operation, error.without_url().to_string()))?;
        serde_json::from_str::<Value>(&body)
            .map(Some)
            .map_err(|error| JobError::malformed(operation, error.to_string()))
    }
}

#[async_trait]
impl BuildStatusSource for RemoteJobClient {
    async fn fetch_build_result(
        &self,
        instance: &str,
        job_name: &str,
        build_number: u64,
    ) -> Result<BuildLookup, JobError> {
        let instance = self.instance(instance)?;
        let url = format!(
            "{}/{}/{build_number}/api/json",
            instance.base_url,
            job_path(job_name)
        );
        let Some(record) = self
            .get_json_or_missing("fetch build status", instance, &url)
            .await?
        else {
            return Ok(BuildLookup::NotFound);
        };
        let result = record
            .get("result")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        Ok(BuildLookup::Found { result })
    }
}
