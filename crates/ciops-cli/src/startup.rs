use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use ciops_ci_stats::ReactorConfig;
use ciops_console::{ConsoleConfig, OpsConsole};
use ciops_jobs::{JenkinsInstance, PollPolicy, RemoteJobClient, RemoteJobClientConfig};
use ciops_slack_runtime::{run_slack_bridge, SlackBridgeConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::Cli;

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Environment variable holding the API token of the named Jenkins instance.
pub fn api_token_env_var(instance_name: &str) -> String {
    format!(
        "{}_USER_API_TOKEN",
        instance_name.to_uppercase().replace('-', "_")
    )
}

pub fn resolve_jenkins_instances<F>(
    cli: &Cli,
    lookup_env: F,
) -> Result<Vec<JenkinsInstance>>
where
    F: Fn(&str) -> Option<String>,
{
    if cli.jenkins_instances.is_empty() {
        bail!("at least one --jenkins-instance NAME=URL is required");
    }
    let mut seen = BTreeSet::new();
    let mut instances = Vec::with_capacity(cli.jenkins_instances.len());
    for (name, base_url) in &cli.jenkins_instances {
        if !seen.insert(name.as_str()) {
            bail!("jenkins instance `{name}` is configured more than once");
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("jenkins instance `{name}` must use an http(s) URL, got `{base_url}`");
        }
        let env_var = api_token_env_var(name);
        let api_token = lookup_env(&env_var)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("{env_var} is required for jenkins instance `{name}`"))?;
        instances.push(JenkinsInstance {
            name: name.clone(),
            base_url: base_url.clone(),
            user: cli.jenkins_user.clone(),
            api_token,
        });
    }
    Ok(instances)
}

pub fn build_console_config(cli: &Cli, instances: &[JenkinsInstance]) -> Result<ConsoleConfig> {
    let known = instances
        .iter()
        .map(|instance| instance.name.as_str())
        .collect::<BTreeSet<_>>();
    let mut clusters = BTreeMap::new();
    for (cluster, instance) in &cli.clusters {
        if !known.contains(instance.as_str()) {
            bail!("cluster `{cluster}` refers to unknown jenkins instance `{instance}`");
        }
        clusters.insert(cluster.clone(), instance.clone());
    }

    let notification_channels = collect_channels(&cli.notification_channels);
    let verbose_channels = collect_channels(&cli.verbose_notification_channels);
    if let Some(channel) = verbose_channels.difference(&notification_channels).next() {
        bail!("verbose notification channel `{channel}` is not a --notification-channel");
    }

    Ok(ConsoleConfig {
        poll_policy: PollPolicy {
            interval: Duration::from_millis(cli.poll_interval_ms),
            max_attempts: cli.poll_max_attempts,
        },
        clusters,
        ci_instance: cli.ci_instance.trim().to_string(),
        ci_org_folder: cli.ci_org_folder.trim().to_string(),
        roll_job: cli.roll_job.trim().to_string(),
        roll_instance: cli.roll_instance.trim().to_string(),
        reactor: ReactorConfig {
            verbose_channels,
            benchmark_stages: cli
                .benchmark_stages
                .iter()
                .map(|stage| stage.trim())
                .filter(|stage| !stage.is_empty())
                .map(str::to_string)
                .collect(),
        },
    })
}

fn collect_channels(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|channel| channel.trim())
        .filter(|channel| !channel.is_empty())
        .map(str::to_string)
        .collect()
}

fn required_secret(value: Option<&str>, flag: &str) -> Result<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{flag} is required"))
}

/// Validates the whole configuration, then runs the Slack bridge until ctrl-c.
pub async fn run_cli(cli: Cli) -> Result<()> {
    let app_token = required_secret(cli.slack_app_token.as_deref(), "--slack-app-token")?;
    let bot_token = required_secret(cli.slack_bot_token.as_deref(), "--slack-bot-token")?;
    let job_token = required_secret(cli.jenkins_job_token.as_deref(), "--jenkins-job-token")?;
    let instances = resolve_jenkins_instances(&cli, |name| std::env::var(name).ok())?;
    let console_config = build_console_config(&cli, &instances)?;

    tracing::info!(
        instances = instances.len(),
        clusters = console_config.clusters.len(),
        ci_instance = %console_config.ci_instance,
        "starting ciops console"
    );
    let client = RemoteJobClient::new(RemoteJobClientConfig {
        instances,
        job_token,
        request_timeout_ms: cli.jenkins_request_timeout_ms,
        trigger_settle_delay: Duration::from_millis(cli.trigger_settle_ms),
    })?;
    let console = OpsConsole::new(client, console_config)?;

    run_slack_bridge(SlackBridgeConfig {
        console: Arc::new(console),
        api_base: cli.slack_api_base.clone(),
        app_token,
        bot_token,
        bot_user_id: cli.slack_bot_user_id.clone(),
        notification_channels: collect_channels(&cli.notification_channels),
        request_timeout_ms: cli.slack_request_timeout_ms,
        retry_max_attempts: cli.slack_retry_max_attempts,
        retry_base_delay_ms: cli.slack_retry_base_delay_ms,
        reconnect_delay: Duration::from_millis(cli.slack_reconnect_delay_ms),
        processed_event_cap: cli.processed_event_cap,
    })
    .await
}
