//! The static table of chat commands and their handlers.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use ciops_ci_stats::CiStatsAggregator;
use ciops_commands::{command_fn, CommandArity, CommandError, CommandRegistry, CommandSpec};
use ciops_jobs::{pr_job_name, JobStatusPoller, JobTrigger, PollResult, RemoteJobClient};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::TriggerLocks;

pub const RUN_TESTS_JOB: &str = "run-tests-on-environment";
pub const LIST_NAMESPACES_JOB: &str = "list-namespaces-in-this-cluster";
pub const ENVIRONMENTS_ARTIFACT: &str = "ls_environments.txt";
pub const ROLL_JOB: &str = "self-service-qa-gen3-roll";

type HandlerFuture = BoxFuture<'static, Result<String, CommandError>>;

/// Shared state every built-in handler runs against.
pub struct ConsoleContext {
    pub client: RemoteJobClient,
    pub poller: JobStatusPoller,
    pub aggregator: Arc<CiStatsAggregator>,
    pub trigger_locks: TriggerLocks,
    /// K8s cluster name to the Jenkins instance that lists its namespaces.
    pub clusters: BTreeMap<String, String>,
    pub ci_instance: String,
    pub ci_org_folder: String,
    pub roll_job: String,
    pub roll_instance: String,
}

pub struct BuiltinCommand {
    pub verb: &'static str,
    pub args_help: &'static str,
    pub example: &'static str,
    pub arity: CommandArity,
    pub handler: fn(Arc<ConsoleContext>, Vec<String>) -> HandlerFuture,
}

pub const BUILTIN_COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand {
        verb: "help",
        args_help: "list all commands",
        example: "@ciops help",
        arity: CommandArity::exactly(0),
        handler: list_commands,
    },
    BuiltinCommand {
        verb: "run-test",
        args_help: "jenkins instance, target environment and test suite to be executed",
        example: "@ciops run-test jenkins2 ci-env-1 test-portal-homepageTest",
        arity: CommandArity::exactly(3),
        handler: run_test,
    },
    BuiltinCommand {
        verb: "run-jenkins-job",
        args_help: "job name, jenkins instance and optional parameters as a JSON object",
        example: r#"@ciops run-jenkins-job self-service-qa-gen3-roll jenkins2 {"SERVICE_NAME":"all","TARGET_ENVIRONMENT":"ci-env-1"}"#,
        arity: CommandArity::between(2, 3),
        handler: run_jenkins_job,
    },
    BuiltinCommand {
        verb: "roll",
        args_help: "service to roll (or `all`) and target environment",
        example: "@ciops roll guppy ci-env-1",
        arity: CommandArity::exactly(2),
        handler: roll_service,
    },
    BuiltinCommand {
        verb: "check-result",
        args_help: "job name, build number and jenkins instance",
        example: "@ciops check-result run-tests-on-environment 21 jenkins2",
        arity: CommandArity::exactly(3),
        handler: check_result,
    },
    BuiltinCommand {
        verb: "list-environments",
        args_help: "selected K8s cluster (e.g., qaplanetv1, qaplanetv2)",
        example: "@ciops list-environments qaplanetv1",
        arity: CommandArity::exactly(1),
        handler: list_environments,
    },
    BuiltinCommand {
        verb: "replay-pr",
        args_help: "repo name and pr number",
        example: "@ciops replay-pr gen3-qa 549",
        arity: CommandArity::exactly(2),
        handler: replay_pr,
    },
    BuiltinCommand {
        verb: "ci-summary",
        args_help: "no arguments; pass/fail counts of today's PR checks",
        example: "@ciops ci-summary",
        arity: CommandArity::exactly(0),
        handler: ci_summary,
    },
];

/// Registers every built-in command against `context`.
pub fn builtin_registry(context: Arc<ConsoleContext>) -> Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();
    for command in BUILTIN_COMMANDS {
        let context = Arc::clone(&context);
        let handler = command.handler;
        registry.register(CommandSpec::new(
            command.verb,
            command.args_help,
            command.example,
            command.arity,
            command_fn(move |args| handler(Arc::clone(&context), args)),
        ))?;
    }
    Ok(registry)
}

fn positional<const N: usize>(verb: &str, args: Vec<String>) -> Result<[String; N], CommandError> {
    let received = args.len();
    <[String; N]>::try_from(args).map_err(|_| CommandError::Arity {
        verb: verb.to_string(),
        expected: format!("{N} arguments"),
        received,
    })
}

fn list_commands(_context: Arc<ConsoleContext>, _args: Vec<String>) -> HandlerFuture {
    let verbs = BUILTIN_COMMANDS
        .iter()
        .map(|command| command.verb)
        .collect::<Vec<_>>()
        .join(",");
    async move { Ok(format!("here are all the commands available in ciops:\n {verbs}")) }.boxed()
}

fn run_test(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let [instance, target_environment, test_suite] = positional::<3>("run-test", args)?;
        let trigger = JobTrigger::new(RUN_TESTS_JOB, instance)
            .with_parameter("TARGET_ENVIRONMENT", target_environment)
            .with_parameter("TEST_SUITE", test_suite);
        trigger_and_link(&context, &trigger).await
    }
    .boxed()
}

fn run_jenkins_job(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let (job_name, instance, raw_parameters) = match args.as_slice() {
            [job_name, instance] => (job_name.clone(), instance.clone(), None),
            [job_name, instance, parameters] => {
                (job_name.clone(), instance.clone(), Some(parameters.as_str()))
            }
            _ => {
                return Err(CommandError::Arity {
                    verb: "run-jenkins-job".to_string(),
                    expected: "2 to 3 arguments".to_string(),
                    received: args.len(),
                })
            }
        };

        let mut trigger = JobTrigger::new(job_name, instance);
        if let Some(raw) = raw_parameters {
            trigger.parameters = parse_job_parameters(raw)?;
        }
        trigger_and_link(&context, &trigger).await
    }
    .boxed()
}

fn roll_service(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let [service_name, target_environment] = positional::<2>("roll", args)?;
        let trigger = JobTrigger::new(context.roll_job.clone(), context.roll_instance.clone())
            .with_parameter("SERVICE_NAME", service_name)
            .with_parameter("TARGET_ENVIRONMENT", target_environment);
        trigger_and_link(&context, &trigger).await
    }
    .boxed()
}

/// Reads a JSON object of job parameters. Non-string values keep their JSON text.
pub fn parse_job_parameters(raw: &str) -> Result<BTreeMap<String, String>, CommandError> {
    let parsed = serde_json::from_str::<serde_json::Map<String, Value>>(raw).map_err(|error| {
        CommandError::user_input(format!("parameters must be a JSON object: {error}"))
    })?;
    Ok(parsed
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

async fn trigger_and_link(
    context: &ConsoleContext,
    trigger: &JobTrigger,
) -> Result<String, CommandError> {
    let handle = {
        let _serialized = context
            .trigger_locks
            .acquire(&trigger.job_name, &trigger.instance)
            .await;
        context.client.trigger(trigger).await?
    };
    tracing::info!(
        job_name = %handle.job_name,
        instance = %handle.instance,
        build_number = handle.build_number,
        "jenkins job triggered"
    );
    let console_url = context
        .client
        .console_url(&handle.instance, &handle.job_name, handle.build_number)?;
    Ok(format!("The job has been triggered, here's its URL: \n {console_url}"))
}

fn check_result(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let [job_name, raw_build_number, instance] = positional::<3>("check-result", args)?;
        let build_number = raw_build_number.parse::<u64>().map_err(|_| {
            CommandError::user_input(format!("`{raw_build_number}` is not a build number"))
        })?;
        let result = context
            .poller
            .poll(&context.client, &job_name, build_number, &instance)
            .await?;
        render_poll_result(&context, &job_name, build_number, &instance, result)
    }
    .boxed()
}

fn render_poll_result(
    context: &ConsoleContext,
    job_name: &str,
    build_number: u64,
    instance: &str,
    result: PollResult,
) -> Result<String, CommandError> {
    match result {
        PollResult::Succeeded => Ok(format!(
            "Build #{build_number} of {job_name} on {instance} succeeded :white_check_mark:"
        )),
        PollResult::Failed(remote_result) => Ok(format!(
            "Build #{build_number} of {job_name} on {instance} finished with result {remote_result} :x:"
        )),
        PollResult::GivenUp => Err(CommandError::RetryBudgetExhausted(given_up_detail(
            job_name,
            build_number,
            instance,
            context.poller.policy().max_attempts,
        ))),
        PollResult::Pending | PollResult::NotFound => Err(CommandError::NotYetAvailable(format!(
            "build #{build_number} of {job_name} on {instance} has no result yet"
        ))),
    }
}

fn given_up_detail(job_name: &str, build_number: u64, instance: &str, max_attempts: usize) -> String {
    format!(
        "build #{build_number} of {job_name} on {instance} reported no result after {} checks",
        max_attempts.saturating_add(1)
    )
}

fn list_environments(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let [cluster] = positional::<1>("list-environments", args)?;
        let Some(instance) = context.clusters.get(&cluster) else {
            return Err(CommandError::user_input("This cluster does not exist :wat:"));
        };
        let listing = context
            .client
            .fetch_archived_artifact(instance, LIST_NAMESPACES_JOB, ENVIRONMENTS_ARTIFACT)
            .await?;
        Ok(format!(
            "Here is the list of environments in this cluster: \n```{listing}```"
        ))
    }
    .boxed()
}

fn replay_pr(context: Arc<ConsoleContext>, args: Vec<String>) -> HandlerFuture {
    async move {
        let [repo_name, pr_number] = positional::<2>("replay-pr", args)?;
        let job_name = pr_job_name(&context.ci_org_folder, &repo_name, &pr_number);
        let Some(run_number) = context
            .client
            .last_build_number(&context.ci_instance, &job_name)
            .await?
        else {
            return Err(CommandError::user_input(format!(
                "PR #{pr_number} of {repo_name} has no runs to replay"
            )));
        };
        let url = context
            .client
            .replay_pr_run(
                &context.ci_instance,
                &context.ci_org_folder,
                &repo_name,
                &pr_number,
                run_number,
            )
            .await?;
        Ok(format!(
            "The PR has been replayed successfully :tada: follow it here: {url}"
        ))
    }
    .boxed()
}

fn ci_summary(context: Arc<ConsoleContext>, _args: Vec<String>) -> HandlerFuture {
    async move { Ok(context.aggregator.summary()) }.boxed()
}

#[cfg(test)]
mod tests;
