use std::{collections::BTreeSet, time::Duration};

use ciops_ci_stats::{CiOutcome, NotificationEvent, ReactorConfig};
use ciops_console::{ConsoleConfig, OpsConsole};
use ciops_jobs::{JenkinsInstance, RemoteJobClient, RemoteJobClientConfig};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{
    normalize_socket_envelope, parse_socket_envelope, process_inbound, SlackApiClient,
    SlackInbound, SocketEnvelope,
};

const BOT: &str = "UBOT";
const NOTIFY_CHANNEL: &str = "C-NOTIFY";
const NIGHTLY_CHANNEL: &str = "C-NIGHTLY";

fn slack_client(server: &MockServer) -> SlackApiClient {
    SlackApiClient::new(&server.base_url(), "xapp-1", "xoxb-1", 2_000, 3, 1).expect("slack client")
}

fn ops_console(jenkins: &MockServer) -> OpsConsole {
    let client = RemoteJobClient::new(RemoteJobClientConfig {
        instances: vec![JenkinsInstance {
            name: "jenkins".to_string(),
            base_url: jenkins.base_url(),
            user: "ci-bot".to_string(),
            api_token: "api-token".to_string(),
        }],
        job_token: "job-token".to_string(),
        request_timeout_ms: 2_000,
        trigger_settle_delay: Duration::from_millis(1),
    })
    .expect("jenkins client");
    OpsConsole::new(
        client,
        ConsoleConfig {
            ci_org_folder: "Org".to_string(),
            reactor: ReactorConfig {
                verbose_channels: BTreeSet::from([NIGHTLY_CHANNEL.to_string()]),
                benchmark_stages: Vec::new(),
            },
            ..ConsoleConfig::default()
        },
    )
    .expect("console")
}

fn notification_channels() -> BTreeSet<String> {
    BTreeSet::from([NOTIFY_CHANNEL.to_string(), NIGHTLY_CHANNEL.to_string()])
}

fn envelope(event: Value) -> SocketEnvelope {
    SocketEnvelope {
        envelope_id: "env-1".to_string(),
        envelope_type: "events_api".to_string(),
        payload: json!({
            "type": "event_callback",
            "event_id": "Ev1",
            "event": event,
        }),
    }
}

#[test]
fn unit_parse_socket_envelope_skips_control_frames() {
    assert!(parse_socket_envelope(WsMessage::Ping(vec![].into()))
        .expect("ping")
        .is_none());

    let hello = parse_socket_envelope(WsMessage::Text(r#"{"type":"hello"}"#.to_string().into()))
        .expect("hello")
        .expect("envelope");
    assert_eq!(hello.envelope_type, "hello");
    assert!(hello.envelope_id.is_empty());

    assert!(parse_socket_envelope(WsMessage::Text("not json".to_string().into())).is_err());
}

#[test]
fn functional_app_mention_becomes_threaded_command() {
    let inbound = normalize_socket_envelope(
        &envelope(json!({
            "type": "app_mention",
            "user": "U1",
            "text": "<@UBOT> check-result nightly 21 jenkins",
            "channel": "C-OPS",
            "ts": "1700000000.000100",
        })),
        BOT,
        &notification_channels(),
    )
    .expect("normalize")
    .expect("inbound");

    assert_eq!(
        inbound,
        SlackInbound::Command {
            key: "Ev1:C-OPS:1700000000.000100".to_string(),
            channel_id: "C-OPS".to_string(),
            user_id: "U1".to_string(),
            text: "check-result nightly 21 jenkins".to_string(),
            thread_ts: "1700000000.000100".to_string(),
        }
    );
}

#[test]
fn unit_reply_thread_follows_existing_thread() {
    let inbound = normalize_socket_envelope(
        &envelope(json!({
            "type": "app_mention",
            "user": "U1",
            "text": "<@UBOT> help",
            "channel": "C-OPS",
            "ts": "1700000000.000200",
            "thread_ts": "1700000000.000001",
        })),
        BOT,
        &notification_channels(),
    )
    .expect("normalize")
    .expect("inbound");

    let SlackInbound::Command { thread_ts, .. } = inbound else {
        panic!("expected command");
    };
    assert_eq!(thread_ts, "1700000000.000001");
}

#[test]
fn regression_bot_authored_mentions_and_foreign_envelopes_are_ignored() {
    let channels = notification_channels();
    let own_mention = envelope(json!({
        "type": "app_mention",
        "user": BOT,
        "text": "<@UBOT> help",
        "channel": "C-OPS",
        "ts": "1.0",
    }));
    assert!(normalize_socket_envelope(&own_mention, BOT, &channels)
        .expect("normalize")
        .is_none());

    let slash = SocketEnvelope {
        envelope_id: "env-2".to_string(),
        envelope_type: "slash_commands".to_string(),
        payload: json!({}),
    };
    assert!(normalize_socket_envelope(&slash, BOT, &channels)
        .expect("normalize")
        .is_none());

    let human_message = envelope(json!({
        "type": "message",
        "user": "U1",
        "text": "CI Failure on <https://github.com/org/repo/pull/1>",
        "channel": NOTIFY_CHANNEL,
        "ts": "1.0",
    }));
    assert!(normalize_socket_envelope(&human_message, BOT, &channels)
        .expect("normalize")
        .is_none());
}

#[test]
fn functional_bot_message_on_notification_channel_reads_attachment_field() {
    let inbound = normalize_socket_envelope(
        &envelope(json!({
            "type": "message",
            "subtype": "bot_message",
            "text": "",
            "channel": NOTIFY_CHANNEL,
            "ts": "1633005588.151600",
            "event_ts": "1633005588.151600",
            "attachments": [{
                "fallback": "fallback text",
                "fields": [{"value": "CI Failure on <https://github.com/org/repoX/pull/42|#42>"}],
            }],
        })),
        BOT,
        &notification_channels(),
    )
    .expect("normalize")
    .expect("inbound");

    let SlackInbound::Notification { key, event } = inbound else {
        panic!("expected notification");
    };
    assert_eq!(key, "Ev1:C-NOTIFY:1633005588.151600");
    assert_eq!(event.channel_id, NOTIFY_CHANNEL);
    assert_eq!(event.event_ts, "1633005588.151600");
    assert_eq!(
        event.raw_text,
        "CI Failure on <https://github.com/org/repoX/pull/42|#42>"
    );
}

#[test]
fn unit_bot_message_outside_notification_channels_is_ignored() {
    let inbound = normalize_socket_envelope(
        &envelope(json!({
            "type": "message",
            "subtype": "bot_message",
            "text": "CI Failure on <https://github.com/org/repoX/pull/42>",
            "channel": "C-RANDOM",
            "ts": "1.0",
        })),
        BOT,
        &notification_channels(),
    )
    .expect("normalize");
    assert!(inbound.is_none());
}

#[tokio::test]
async fn integration_command_reply_is_posted_in_thread() {
    let slack = MockServer::start();
    let jenkins = MockServer::start();
    let post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("authorization", "Bearer xoxb-1")
            .body_includes("\"channel\":\"C-OPS\"")
            .body_includes("\"thread_ts\":\"1700000000.000100\"")
            .body_includes("<@U1> command not recognized. :thisisfine:");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C-OPS", "ts": "1700000000.000200"}));
    });

    process_inbound(
        &ops_console(&jenkins),
        &slack_client(&slack),
        SlackInbound::Command {
            key: "Ev1:C-OPS:1700000000.000100".to_string(),
            channel_id: "C-OPS".to_string(),
            user_id: "U1".to_string(),
            text: "scaleup qa-dcp".to_string(),
            thread_ts: "1700000000.000100".to_string(),
        },
    )
    .await
    .expect("process");
    assert_eq!(post.calls(), 1);
}

#[tokio::test]
async fn integration_quiet_notification_records_without_posting() {
    let slack = MockServer::start();
    let jenkins = MockServer::start();
    let post = slack.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200).json_body(json!({"ok": true, "ts": "1.0"}));
    });
    let console = ops_console(&jenkins);

    process_inbound(
        &console,
        &slack_client(&slack),
        SlackInbound::Notification {
            key: "Ev1:C-NOTIFY:1633005588.151600".to_string(),
            event: NotificationEvent {
                channel_id: NOTIFY_CHANNEL.to_string(),
                event_ts: "1633005588.151600".to_string(),
                raw_text: "CI Successful on <https://github.com/org/repoX/pull/42>".to_string(),
            },
        },
    )
    .await
    .expect("process");

    assert_eq!(post.calls(), 0);
    assert_eq!(
        console
            .aggregator()
            .snapshot()
            .count("repoX", CiOutcome::Successful, "42"),
        1
    );
}

#[tokio::test]
async fn integration_verbose_notification_posts_digest_to_channel() {
    let slack = MockServer::start();
    let jenkins = MockServer::start();
    let post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"channel\":\"C-NIGHTLY\"")
            .body_includes("Additional nightly-build stats :moon:")
            .body_includes("The Blue Ocean workspace is no longer available.");
        then.status(200)
            .json_body(json!({"ok": true, "channel": NIGHTLY_CHANNEL, "ts": "2.0"}));
    });
    let console = ops_console(&jenkins);

    process_inbound(
        &console,
        &slack_client(&slack),
        SlackInbound::Notification {
            key: "Ev2:C-NIGHTLY:1633005588.151600".to_string(),
            event: NotificationEvent {
                channel_id: NIGHTLY_CHANNEL.to_string(),
                event_ts: "1633005588.151600".to_string(),
                raw_text: "CI Failure on <https://github.com/org/repoX/pull/42>".to_string(),
            },
        },
    )
    .await
    .expect("process");

    assert_eq!(post.calls(), 1);
    assert_eq!(
        console
            .aggregator()
            .snapshot()
            .count("repoX", CiOutcome::Failed, "42"),
        1
    );
}

#[tokio::test]
async fn regression_rate_limited_post_is_retried() {
    let slack = MockServer::start();
    let limited = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-ciops-retry-attempt", "0");
        then.status(429).header("retry-after", "0");
    });
    let accepted = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("x-ciops-retry-attempt", "1");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "3.0"}));
    });

    let posted = slack_client(&slack)
        .post_message("C1", "hello", None)
        .await
        .expect("post");
    assert_eq!(posted.ts, "3.0");
    assert_eq!(posted.channel, "C1");
    assert_eq!(limited.calls(), 1);
    assert_eq!(accepted.calls(), 1);
}

#[tokio::test]
async fn functional_bot_identity_comes_from_auth_test() {
    let slack = MockServer::start();
    slack.mock(|when, then| {
        when.method(POST)
            .path("/auth.test")
            .header("authorization", "Bearer xoxb-1");
        then.status(200).json_body(json!({"ok": true, "user_id": BOT}));
    });
    let connections = slack.mock(|when, then| {
        when.method(POST)
            .path("/apps.connections.open")
            .header("authorization", "Bearer xapp-1");
        then.status(200)
            .json_body(json!({"ok": false, "error": "invalid_auth"}));
    });

    let client = slack_client(&slack);
    assert_eq!(client.resolve_bot_user_id().await.expect("auth"), BOT);
    let error = client
        .open_socket_connection()
        .await
        .expect_err("invalid auth");
    assert!(error.to_string().contains("invalid_auth"));
    assert_eq!(connections.calls(), 1);
}
