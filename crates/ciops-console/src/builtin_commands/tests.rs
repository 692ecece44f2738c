use std::{collections::BTreeMap, time::Duration};

use ciops_ci_stats::{CiOutcome, NotificationEvent};
use ciops_commands::COMMAND_NOT_RECOGNIZED_REPLY;
use ciops_jobs::{JenkinsInstance, PollPolicy, RemoteJobClient, RemoteJobClientConfig};
use httpmock::prelude::*;
use serde_json::json;

use super::{given_up_detail, parse_job_parameters};
use crate::{ConsoleConfig, OpsConsole, USAGE_REPLY};

fn console(server: &MockServer) -> OpsConsole {
    let client = RemoteJobClient::new(RemoteJobClientConfig {
        instances: vec![JenkinsInstance {
            name: "jenkins2".to_string(),
            base_url: server.base_url(),
            user: "ci-bot".to_string(),
            api_token: "api-token".to_string(),
        }],
        job_token: "job-token".to_string(),
        request_timeout_ms: 2_000,
        trigger_settle_delay: Duration::from_millis(1),
    })
    .expect("client");
    OpsConsole::new(
        client,
        ConsoleConfig {
            poll_policy: PollPolicy {
                interval: Duration::from_millis(1),
                max_attempts: 2,
            },
            clusters: BTreeMap::from([("qaplanetv2".to_string(), "jenkins2".to_string())]),
            ci_instance: "jenkins2".to_string(),
            ci_org_folder: "Org".to_string(),
            ..ConsoleConfig::default()
        },
    )
    .expect("console")
}

fn mock_last_build(server: &MockServer, job_path: &str, id: u64) {
    let path = format!("{job_path}/lastBuild/api/json");
    server.mock(move |when, then| {
        when.method(GET).path(path.as_str());
        then.status(200).json_body(json!({"id": id.to_string(), "number": id}));
    });
}

#[tokio::test]
async fn functional_help_lists_every_builtin_verb() {
    let server = MockServer::start();
    let reply = console(&server).handle_command_text("help").await;
    assert_eq!(
        reply,
        "here are all the commands available in ciops:\n help,run-test,run-jenkins-job,roll,check-result,list-environments,replay-pr,ci-summary"
    );
}

#[tokio::test]
async fn functional_verb_help_does_not_touch_jenkins() {
    let server = MockServer::start();
    let trigger = server.mock(|when, then| {
        when.method(POST);
        then.status(201);
    });

    let reply = console(&server).handle_command_text("run-test help").await;
    assert!(reply.starts_with("instructions for run-test: \nargs:  jenkins instance"));
    assert!(reply.contains("example:  @ciops run-test jenkins2 ci-env-1"));
    assert_eq!(trigger.calls(), 0);
}

#[tokio::test]
async fn unit_blank_and_unknown_commands_have_fixed_replies() {
    let server = MockServer::start();
    let console = console(&server);
    assert_eq!(console.handle_command_text("   ").await, USAGE_REPLY);
    assert_eq!(
        console.handle_command_text("scaleup qa-dcp").await,
        COMMAND_NOT_RECOGNIZED_REPLY
    );
    assert_eq!(
        console.handle_command_text("run-test jenkins2").await,
        "run-test expects 3 arguments but received 1"
    );
}

#[tokio::test]
async fn integration_run_test_triggers_job_and_links_console() {
    let server = MockServer::start();
    let trigger = server.mock(|when, then| {
        when.method(POST)
            .path("/job/run-tests-on-environment/buildWithParameters")
            .query_param("token", "job-token")
            .query_param("TARGET_ENVIRONMENT", "ci-env-1")
            .query_param("TEST_SUITE", "test-portal-homepageTest");
        then.status(201);
    });
    mock_last_build(&server, "/job/run-tests-on-environment", 41);

    let reply = console(&server)
        .handle_command_text("run-test jenkins2 ci-env-1 test-portal-homepageTest")
        .await;
    assert_eq!(
        reply,
        format!(
            "The job has been triggered, here's its URL: \n {}/job/run-tests-on-environment/42/console",
            server.base_url()
        )
    );
    assert_eq!(trigger.calls(), 1);
}

#[tokio::test]
async fn integration_run_jenkins_job_reassembles_json_parameters() {
    let server = MockServer::start();
    let trigger = server.mock(|when, then| {
        when.method(POST)
            .path("/job/self-service-qa-gen3-roll/buildWithParameters")
            .query_param("SERVICE_NAME", "all services")
            .query_param("RETRIES", "2");
        then.status(201);
    });
    mock_last_build(&server, "/job/self-service-qa-gen3-roll", 9);

    let reply = console(&server)
        .handle_command_text(
            "run-jenkins-job self-service-qa-gen3-roll jenkins2 {\u{201c}SERVICE_NAME\u{201d}:\u{a0}\"all services\", \"RETRIES\": 2} ignored",
        )
        .await;
    assert!(reply.ends_with("/job/self-service-qa-gen3-roll/10/console"), "reply: {reply}");
    assert_eq!(trigger.calls(), 1);
}

#[tokio::test]
async fn integration_roll_triggers_roll_job_for_service_and_environment() {
    let server = MockServer::start();
    let trigger = server.mock(|when, then| {
        when.method(POST)
            .path("/job/self-service-qa-gen3-roll/buildWithParameters")
            .query_param("token", "job-token")
            .query_param("SERVICE_NAME", "guppy")
            .query_param("TARGET_ENVIRONMENT", "ci-env-1");
        then.status(201);
    });
    mock_last_build(&server, "/job/self-service-qa-gen3-roll", 17);

    let console = console(&server);
    let reply = console.handle_command_text("roll guppy ci-env-1").await;
    assert_eq!(
        reply,
        format!(
            "The job has been triggered, here's its URL: \n {}/job/self-service-qa-gen3-roll/18/console",
            server.base_url()
        )
    );
    assert_eq!(trigger.calls(), 1);
    assert_eq!(
        console.handle_command_text("roll guppy").await,
        "roll expects 2 arguments but received 1"
    );
    assert_eq!(trigger.calls(), 1);
}

#[test]
fn regression_given_up_detail_saturates_unbounded_poll_budget() {
    assert_eq!(
        given_up_detail("nightly", 7, "jenkins2", usize::MAX),
        format!("build #7 of nightly on jenkins2 reported no result after {} checks", usize::MAX)
    );
    assert_eq!(
        given_up_detail("nightly", 7, "jenkins2", 2),
        "build #7 of nightly on jenkins2 reported no result after 3 checks"
    );
}

#[tokio::test]
async fn regression_invalid_json_parameters_are_user_errors() {
    let server = MockServer::start();
    let trigger = server.mock(|when, then| {
        when.method(POST);
        then.status(201);
    });

    let reply = console(&server)
        .handle_command_text("run-jenkins-job deploy jenkins2 {not-json}")
        .await;
    assert!(reply.starts_with("parameters must be a JSON object"), "reply: {reply}");
    assert_eq!(trigger.calls(), 0);
}

#[tokio::test]
async fn regression_rejected_trigger_is_reported_as_transport_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/job/deploy/build");
        then.status(403);
    });

    let reply = console(&server)
        .handle_command_text("run-jenkins-job deploy jenkins2")
        .await;
    assert_eq!(
        reply,
        "Something wrong happened :facepalm:. Deets: The job was not invoked successfully. Details: status 403 Forbidden"
    );
}

#[tokio::test]
async fn regression_unknown_instance_is_echoed_to_the_user() {
    let server = MockServer::start();
    let reply = console(&server)
        .handle_command_text("run-test jenkins9 ci-env-1 suite")
        .await;
    assert_eq!(reply, "unknown jenkins instance `jenkins9`");
}

#[tokio::test]
async fn integration_check_result_renders_each_terminal_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/job/nightly/21/api/json");
        then.status(200).json_body(json!({"result": "SUCCESS"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/job/nightly/22/api/json");
        then.status(200).json_body(json!({"result": "FAILURE"}));
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path("/job/nightly/23/api/json");
        then.status(404);
    });

    let console = console(&server);
    assert_eq!(
        console.handle_command_text("check-result nightly 21 jenkins2").await,
        "Build #21 of nightly on jenkins2 succeeded :white_check_mark:"
    );
    assert_eq!(
        console.handle_command_text("check-result nightly 22 jenkins2").await,
        "Build #22 of nightly on jenkins2 finished with result FAILURE :x:"
    );
    assert_eq!(
        console.handle_command_text("check-result nightly 23 jenkins2").await,
        "could not determine status: build #23 of nightly on jenkins2 reported no result after 3 checks"
    );
    assert_eq!(missing.calls(), 3);
    assert_eq!(
        console.handle_command_text("check-result nightly latest jenkins2").await,
        "`latest` is not a build number"
    );
}

#[tokio::test]
async fn integration_list_environments_reads_cluster_artifact() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/job/list-namespaces-in-this-cluster/lastSuccessfulBuild/artifact/ls_environments.txt");
        then.status(200).body("ci-env-1\nci-env-2");
    });

    let console = console(&server);
    assert_eq!(
        console.handle_command_text("list-environments qaplanetv2").await,
        "Here is the list of environments in this cluster: \n```ci-env-1\nci-env-2```"
    );
    assert_eq!(
        console.handle_command_text("list-environments qaplanetv9").await,
        "This cluster does not exist :wat:"
    );
}

#[tokio::test]
async fn integration_replay_pr_replays_latest_run() {
    let server = MockServer::start();
    mock_last_build(&server, "/job/Org/job/gen3-qa/job/PR-549", 4);
    let replay = server.mock(|when, then| {
        when.method(POST)
            .path("/blue/rest/organizations/jenkins/pipelines/Org/gen3-qa/PR-549/runs/4/replay");
        then.status(200).json_body(json!({}));
    });

    let reply = console(&server)
        .handle_command_text("replay-pr gen3-qa 549")
        .await;
    assert_eq!(
        reply,
        format!(
            "The PR has been replayed successfully :tada: follow it here: {}/blue/organizations/jenkins/Org%2Fgen3-qa/detail/PR-549/5/pipeline",
            server.base_url()
        )
    );
    assert_eq!(replay.calls(), 1);
}

#[tokio::test]
async fn functional_ci_summary_reflects_folded_notifications() {
    let server = MockServer::start();
    let console = console(&server);
    let digest = console
        .handle_notification(&NotificationEvent {
            channel_id: "C-QUIET".to_string(),
            event_ts: "1633005588.151600".to_string(),
            raw_text: "CI Failure on <https://github.com/org/repoX/pull/42> ...".to_string(),
        })
        .await;
    assert_eq!(digest, None);
    assert_eq!(
        console
            .aggregator()
            .snapshot()
            .count("repoX", CiOutcome::Failed, "42"),
        1
    );

    let summary = console.handle_command_text("ci-summary").await;
    assert!(summary.starts_with("CI Summary:```Failed PR checks:\n"));
    assert!(summary.contains("  1  repoX\n"));
}

#[test]
fn unit_parse_job_parameters_stringifies_non_string_values() {
    let parameters =
        parse_job_parameters(r#"{"NAME":"all","COUNT":2,"DRY_RUN":true}"#).expect("parameters");
    assert_eq!(parameters.get("NAME").map(String::as_str), Some("all"));
    assert_eq!(parameters.get("COUNT").map(String::as_str), Some("2"));
    assert_eq!(parameters.get("DRY_RUN").map(String::as_str), Some("true"));
    assert!(parse_job_parameters("[1,2]").is_err());
}
