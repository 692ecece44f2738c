use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use ciops_ci_stats::{
    CiDetailSource, CiStatsAggregator, JenkinsCiDetails, NotificationEvent, NotificationReactor,
    ReactorConfig,
};
use ciops_commands::CommandRouter;
use ciops_jobs::{JobStatusPoller, PollPolicy, RemoteJobClient};

use crate::{
    builtin_commands::{builtin_registry, ROLL_JOB},
    ConsoleContext, TriggerLocks,
};

pub const USAGE_REPLY: &str =
    "Usage instructions: *@ciops <command>* \ne.g., @ciops help\n_mention me with `<command> help` to learn about a command_";

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub poll_policy: PollPolicy,
    pub clusters: BTreeMap<String, String>,
    /// Jenkins instance hosting pull request checks.
    pub ci_instance: String,
    pub ci_org_folder: String,
    /// Jenkins job that restarts a service deployment in one environment.
    pub roll_job: String,
    pub roll_instance: String,
    pub reactor: ReactorConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            poll_policy: PollPolicy::default(),
            clusters: BTreeMap::new(),
            ci_instance: "jenkins".to_string(),
            ci_org_folder: "CDIS_GitHub_Org".to_string(),
            roll_job: ROLL_JOB.to_string(),
            roll_instance: "jenkins2".to_string(),
            reactor: ReactorConfig::default(),
        }
    }
}

/// Entry point for both chat paths: user commands and CI notifications.
///
/// One instance per process. It owns the single stats table that the
/// `ci-summary` command reads and the reactor writes.
pub struct OpsConsole {
    router: CommandRouter,
    reactor: NotificationReactor,
    aggregator: Arc<CiStatsAggregator>,
}

impl OpsConsole {
    pub fn new(client: RemoteJobClient, config: ConsoleConfig) -> Result<Self> {
        let poller = JobStatusPoller::new(config.poll_policy);
        let details = Arc::new(JenkinsCiDetails::new(
            client.clone(),
            poller,
            config.ci_instance.clone(),
            config.ci_org_folder.clone(),
        ));
        Self::with_detail_source(client, config, details)
    }

    /// Like [`OpsConsole::new`] with a caller-supplied enrichment source.
    pub fn with_detail_source(
        client: RemoteJobClient,
        config: ConsoleConfig,
        details: Arc<dyn CiDetailSource>,
    ) -> Result<Self> {
        let aggregator = Arc::new(CiStatsAggregator::new());
        let context = Arc::new(ConsoleContext {
            client,
            poller: JobStatusPoller::new(config.poll_policy),
            aggregator: Arc::clone(&aggregator),
            trigger_locks: TriggerLocks::new(),
            clusters: config.clusters,
            ci_instance: config.ci_instance,
            ci_org_folder: config.ci_org_folder,
            roll_job: config.roll_job,
            roll_instance: config.roll_instance,
        });
        let router = CommandRouter::new(builtin_registry(context)?, USAGE_REPLY);
        let reactor = NotificationReactor::new(Arc::clone(&aggregator), details, config.reactor);
        Ok(Self {
            router,
            reactor,
            aggregator,
        })
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn aggregator(&self) -> &Arc<CiStatsAggregator> {
        &self.aggregator
    }

    /// Parses and dispatches a mention-stripped command. Always yields a reply.
    pub async fn handle_command_text(&self, text: &str) -> String {
        self.router.dispatch_line(text).await
    }

    pub async fn handle_notification(&self, event: &NotificationEvent) -> Option<String> {
        self.reactor.react(event).await
    }
}
