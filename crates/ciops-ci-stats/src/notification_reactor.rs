//! Folds inbound CI notifications into the stats table and renders digests
//! for verbose channels.

use std::{collections::BTreeSet, sync::Arc, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ciops_jobs::{JobError, TestSummary};
use regex::Regex;

use crate::{CiOutcome, CiStatsAggregator};

pub const DIGEST_HEADER: &str = "Additional nightly-build stats :moon: \n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub channel_id: String,
    /// Chat event timestamp, e.g. `1633005588.151600`.
    pub event_ts: String,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequestIdentity {
    pub repo_name: String,
    pub change_request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Test outcome of the latest run of a pull request check.
pub enum PrTestReport {
    WorkspaceGone,
    InFlight,
    /// The run never reported a result within the poll budget.
    StatusUnknown,
    Completed(TestSummary),
}

#[async_trait]
/// Remote lookups used to enrich verbose-channel digests.
pub trait CiDetailSource: Send + Sync {
    async fn stage_duration(
        &self,
        repo_name: &str,
        change_request_id: &str,
        stage_name: &str,
    ) -> Result<Duration, JobError>;

    async fn latest_test_report(
        &self,
        repo_name: &str,
        change_request_id: &str,
    ) -> Result<PrTestReport, JobError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactorConfig {
    pub verbose_channels: BTreeSet<String>,
    pub benchmark_stages: Vec<String>,
}

fn pull_request_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https://github\.com/[^/\s>|]+/([^/\s>|]+)/pull/(\d+)[>|]")
            .expect("valid pull request link regex")
    })
}

/// Finds the repository and pull request number in a chat-formatted link.
pub fn extract_change_request(text: &str) -> Option<ChangeRequestIdentity> {
    let captures = pull_request_link_pattern().captures(text)?;
    Some(ChangeRequestIdentity {
        repo_name: captures.get(1)?.as_str().to_string(),
        change_request_id: captures.get(2)?.as_str().to_string(),
    })
}

/// Any mention of a failure outside the pull request link marks the run as
/// failed, so repository names like `failover-proxy` do not count.
pub fn classify_notification(text: &str) -> CiOutcome {
    let prose = pull_request_link_pattern().replace_all(text, " ");
    if prose.to_ascii_lowercase().contains("fail") {
        CiOutcome::Failed
    } else {
        CiOutcome::Successful
    }
}

/// Whole seconds before the dot of a chat event timestamp.
pub fn parse_event_timestamp(event_ts: &str) -> Option<DateTime<Utc>> {
    let seconds = event_ts.trim().split('.').next()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0)
}

/// `1h 02m 03s`, truncated to whole seconds.
pub fn format_stage_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{}h {:02}m {:02}s",
        total / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}

pub struct NotificationReactor {
    aggregator: Arc<CiStatsAggregator>,
    details: Arc<dyn CiDetailSource>,
    config: ReactorConfig,
}

impl NotificationReactor {
    pub fn new(
        aggregator: Arc<CiStatsAggregator>,
        details: Arc<dyn CiDetailSource>,
        config: ReactorConfig,
    ) -> Self {
        Self {
            aggregator,
            details,
            config,
        }
    }

    pub fn aggregator(&self) -> &Arc<CiStatsAggregator> {
        &self.aggregator
    }

    pub fn is_verbose_channel(&self, channel_id: &str) -> bool {
        self.config.verbose_channels.contains(channel_id)
    }

    /// Classifies and records one notification.
    ///
    /// Returns a digest only for verbose channels. Events without a pull
    /// request link or a usable timestamp are dropped without touching state.
    pub async fn react(&self, event: &NotificationEvent) -> Option<String> {
        let Some(identity) = extract_change_request(&event.raw_text) else {
            tracing::debug!(
                channel_id = %event.channel_id,
                "notification has no pull request link; dropped"
            );
            return None;
        };
        let Some(timestamp) = parse_event_timestamp(&event.event_ts) else {
            tracing::debug!(
                channel_id = %event.channel_id,
                event_ts = %event.event_ts,
                "notification timestamp is not parsable; dropped"
            );
            return None;
        };

        let mut outcome = classify_notification(&event.raw_text);
        if !self.is_verbose_channel(&event.channel_id) {
            self.aggregator.record(
                timestamp,
                &identity.repo_name,
                &identity.change_request_id,
                outcome,
            );
            return None;
        }

        tracing::info!(
            channel_id = %event.channel_id,
            repo_name = %identity.repo_name,
            change_request_id = %identity.change_request_id,
            "enriching notification from verbose channel"
        );
        let mut digest = String::from(DIGEST_HEADER);
        for stage_name in &self.config.benchmark_stages {
            digest.push_str(&self.render_benchmark(&identity, stage_name).await);
        }
        match self
            .details
            .latest_test_report(&identity.repo_name, &identity.change_request_id)
            .await
        {
            Ok(report) => {
                if matches!(&report, PrTestReport::Completed(summary) if !summary.failed.is_empty())
                {
                    outcome = CiOutcome::Failed;
                }
                digest.push_str(&render_test_report(&report));
            }
            Err(error) => {
                tracing::error!(
                    repo_name = %identity.repo_name,
                    change_request_id = %identity.change_request_id,
                    %error,
                    "could not fetch test results"
                );
                digest.push_str(&metadata_error_line(&error));
            }
        }

        self.aggregator.record(
            timestamp,
            &identity.repo_name,
            &identity.change_request_id,
            outcome,
        );
        Some(digest)
    }

    async fn render_benchmark(&self, identity: &ChangeRequestIdentity, stage_name: &str) -> String {
        match self
            .details
            .stage_duration(&identity.repo_name, &identity.change_request_id, stage_name)
            .await
        {
            Ok(duration) => format!(
                "the {stage_name} stage from repo `{}` PR `#{}` took `{}` to run... :clock1:\n",
                identity.repo_name,
                identity.change_request_id,
                format_stage_duration(duration)
            ),
            Err(error) => {
                tracing::error!(
                    repo_name = %identity.repo_name,
                    stage_name,
                    %error,
                    "could not fetch stage duration"
                );
                metadata_error_line(&error)
            }
        }
    }
}

fn metadata_error_line(error: &JobError) -> String {
    format!("Could not fetch jenkins job metadata. Details: {error}\n")
}

fn render_test_report(report: &PrTestReport) -> String {
    let summary = match report {
        PrTestReport::WorkspaceGone => {
            return "Could not fetch test results from this PR check. The Blue Ocean workspace is no longer available.\n".to_string();
        }
        PrTestReport::InFlight => {
            return "The latest PR build is still in flight... keep an eye on the notifications channel :eye: \n".to_string();
        }
        PrTestReport::StatusUnknown => {
            return "Could not determine the status of the latest PR build; gave up polling Jenkins.\n".to_string();
        }
        PrTestReport::Completed(summary) => summary,
    };

    let passed = summary.passed.len();
    let noun = if passed == 1 { "test" } else { "tests" };
    let mut rendered = format!("The last build from this PR check contains \n `{passed} successful {noun}` \n");
    if !summary.failed.is_empty() {
        rendered.push_str(&format!(
            "and the following {} tests failed: \n```",
            summary.failed.len()
        ));
        for failed_test in &summary.failed {
            rendered.push_str(&format!("- {failed_test} \n"));
        }
        rendered.push_str("```\n");
    }
    rendered
}
