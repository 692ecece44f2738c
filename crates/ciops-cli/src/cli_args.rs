use clap::{ArgAction, Parser};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

/// Splits `NAME=VALUE` on the first `=`; both sides must be non-empty.
pub fn parse_name_value(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return Err(format!("expected NAME=VALUE, got `{raw}`"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[derive(Debug, Parser)]
#[command(
    name = "ciops",
    about = "Chat-driven CI operations console for Slack and Jenkins",
    version
)]
pub struct Cli {
    #[arg(
        long = "slack-app-token",
        env = "CIOPS_SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack Socket Mode app token (xapp-...)"
    )]
    pub slack_app_token: Option<String>,

    #[arg(
        long = "slack-bot-token",
        env = "CIOPS_SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for Web API (xoxb-...)"
    )]
    pub slack_bot_token: Option<String>,

    #[arg(
        long = "slack-bot-user-id",
        env = "CIOPS_SLACK_BOT_USER_ID",
        help = "Bot user id; resolved through auth.test when omitted"
    )]
    pub slack_bot_user_id: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "CIOPS_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base URL"
    )]
    pub slack_api_base: String,

    #[arg(
        long = "slack-request-timeout-ms",
        env = "CIOPS_SLACK_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for Slack Web API calls in milliseconds"
    )]
    pub slack_request_timeout_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "CIOPS_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable Slack Web API failures (429/5xx/transport)"
    )]
    pub slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "CIOPS_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base backoff delay in milliseconds for Slack Web API retries"
    )]
    pub slack_retry_base_delay_ms: u64,

    #[arg(
        long = "slack-reconnect-delay-ms",
        env = "CIOPS_SLACK_RECONNECT_DELAY_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Delay before reconnecting a closed Socket Mode session"
    )]
    pub slack_reconnect_delay_ms: u64,

    #[arg(
        long = "processed-event-cap",
        env = "CIOPS_PROCESSED_EVENT_CAP",
        default_value_t = 10_000,
        value_parser = parse_positive_usize,
        help = "Maximum remembered Slack event keys for duplicate suppression"
    )]
    pub processed_event_cap: usize,

    #[arg(
        long = "jenkins-instance",
        env = "CIOPS_JENKINS_INSTANCES",
        value_delimiter = ',',
        action = ArgAction::Append,
        value_parser = parse_name_value,
        value_name = "NAME=URL",
        help = "Jenkins instance; its API token is read from <NAME>_USER_API_TOKEN"
    )]
    pub jenkins_instances: Vec<(String, String)>,

    #[arg(
        long = "jenkins-user",
        env = "CIOPS_JENKINS_USER",
        default_value = "ciops",
        help = "User name sent with every Jenkins request"
    )]
    pub jenkins_user: String,

    #[arg(
        long = "jenkins-job-token",
        env = "CIOPS_JENKINS_JOB_TOKEN",
        hide_env_values = true,
        help = "Remote build token sent with job triggers"
    )]
    pub jenkins_job_token: Option<String>,

    #[arg(
        long = "jenkins-request-timeout-ms",
        env = "CIOPS_JENKINS_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for Jenkins HTTP calls in milliseconds"
    )]
    pub jenkins_request_timeout_ms: u64,

    #[arg(
        long = "poll-interval-ms",
        env = "CIOPS_POLL_INTERVAL_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay between build status checks"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "poll-max-attempts",
        env = "CIOPS_POLL_MAX_ATTEMPTS",
        default_value_t = 15,
        help = "Retries after the first build status check"
    )]
    pub poll_max_attempts: usize,

    #[arg(
        long = "trigger-settle-ms",
        env = "CIOPS_TRIGGER_SETTLE_MS",
        default_value_t = 10_000,
        help = "Wait after a trigger before reading the last build number"
    )]
    pub trigger_settle_ms: u64,

    #[arg(
        long = "ci-instance",
        env = "CIOPS_CI_INSTANCE",
        default_value = "jenkins",
        help = "Jenkins instance hosting pull request checks"
    )]
    pub ci_instance: String,

    #[arg(
        long = "ci-org-folder",
        env = "CIOPS_CI_ORG_FOLDER",
        default_value = "CDIS_GitHub_Org",
        help = "GitHub organization folder holding pull request jobs"
    )]
    pub ci_org_folder: String,

    #[arg(
        long = "roll-job",
        env = "CIOPS_ROLL_JOB",
        default_value = "self-service-qa-gen3-roll",
        help = "Jenkins job the roll command triggers"
    )]
    pub roll_job: String,

    #[arg(
        long = "roll-instance",
        env = "CIOPS_ROLL_INSTANCE",
        default_value = "jenkins2",
        help = "Jenkins instance running the roll job"
    )]
    pub roll_instance: String,

    #[arg(
        long = "notification-channel",
        env = "CIOPS_NOTIFICATION_CHANNELS",
        value_delimiter = ',',
        action = ArgAction::Append,
        help = "Channel id whose bot messages are CI notifications"
    )]
    pub notification_channels: Vec<String>,

    #[arg(
        long = "verbose-notification-channel",
        env = "CIOPS_VERBOSE_NOTIFICATION_CHANNELS",
        value_delimiter = ',',
        action = ArgAction::Append,
        help = "Notification channel that also receives an enriched digest"
    )]
    pub verbose_notification_channels: Vec<String>,

    #[arg(
        long = "benchmark-stage",
        env = "CIOPS_BENCHMARK_STAGES",
        value_delimiter = ',',
        action = ArgAction::Append,
        default_values = ["K8sReset", "RunTests"],
        help = "Pipeline stage whose duration is reported in digests"
    )]
    pub benchmark_stages: Vec<String>,

    #[arg(
        long = "cluster",
        env = "CIOPS_CLUSTERS",
        value_delimiter = ',',
        action = ArgAction::Append,
        value_parser = parse_name_value,
        value_name = "NAME=INSTANCE",
        help = "Kubernetes cluster and the Jenkins instance that lists its environments"
    )]
    pub clusters: Vec<(String, String)>,
}
