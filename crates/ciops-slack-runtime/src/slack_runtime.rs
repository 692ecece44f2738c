//! Slack Socket Mode bridge feeding chat commands and CI notifications into
//! the ops console.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use ciops_ci_stats::NotificationEvent;
use ciops_console::OpsConsole;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::slack_helpers::{render_command_reply, strip_bot_mention};

mod processed_events;
mod slack_api_client;

use processed_events::ProcessedEventHistory;
use slack_api_client::SlackApiClient;

#[derive(Clone)]
/// Runtime configuration for the Slack bridge loop.
pub struct SlackBridgeConfig {
    pub console: Arc<OpsConsole>,
    pub api_base: String,
    pub app_token: String,
    pub bot_token: String,
    pub bot_user_id: Option<String>,
    /// Channels whose bot messages are CI notifications.
    pub notification_channels: BTreeSet<String>,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay: Duration,
    pub processed_event_cap: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: String,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    event_id: String,
    event: SlackEvent,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    event_ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Deserialize)]
struct SlackAttachment {
    #[serde(default)]
    fallback: Option<String>,
    #[serde(default)]
    fields: Vec<SlackAttachmentField>,
}

#[derive(Debug, Deserialize)]
struct SlackAttachmentField {
    #[serde(default)]
    value: Option<String>,
}

impl SlackEvent {
    /// CI bots put the interesting text in the first attachment field.
    fn notification_text(&self) -> String {
        let attachment = self.attachments.first();
        attachment
            .and_then(|attachment| attachment.fields.first())
            .and_then(|field| field.value.clone())
            .or_else(|| attachment.and_then(|attachment| attachment.fallback.clone()))
            .or_else(|| self.text.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlackInbound {
    Command {
        key: String,
        channel_id: String,
        user_id: String,
        text: String,
        thread_ts: String,
    },
    Notification {
        key: String,
        event: NotificationEvent,
    },
}

impl SlackInbound {
    fn key(&self) -> &str {
        match self {
            Self::Command { key, .. } | Self::Notification { key, .. } => key,
        }
    }
}

pub async fn run_slack_bridge(config: SlackBridgeConfig) -> Result<()> {
    let mut runtime = SocketModeBridge::new(config).await?;
    runtime.run().await
}

struct SocketModeBridge {
    config: SlackBridgeConfig,
    slack_client: SlackApiClient,
    bot_user_id: String,
    processed: ProcessedEventHistory,
}

impl SocketModeBridge {
    async fn new(config: SlackBridgeConfig) -> Result<Self> {
        let slack_client = SlackApiClient::new(
            &config.api_base,
            &config.app_token,
            &config.bot_token,
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;
        let bot_user_id = match config.bot_user_id.as_deref().map(str::trim) {
            Some(user_id) if !user_id.is_empty() => user_id.to_string(),
            _ => slack_client.resolve_bot_user_id().await?,
        };
        tracing::info!(%bot_user_id, "slack bridge identity resolved");

        Ok(Self {
            processed: ProcessedEventHistory::new(config.processed_event_cap),
            config,
            slack_client,
            bot_user_id,
        })
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            match self.slack_client.open_socket_connection().await {
                Ok(socket_url) => {
                    tracing::info!("slack bridge socket connected");
                    match self.run_socket_session(&socket_url).await {
                        Ok(SessionEnd::Shutdown) => {
                            tracing::info!("slack bridge shutdown requested");
                            return Ok(());
                        }
                        Ok(SessionEnd::Reconnect) => {
                            tracing::info!("slack bridge socket closed; reconnecting");
                        }
                        Err(error) => {
                            tracing::warn!(error = ?error, "slack bridge socket session error");
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(error = ?error, "slack bridge failed to open socket connection");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("slack bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("could not open the socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(SessionEnd::Shutdown),
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(SessionEnd::Reconnect);
                    };
                    let message = message_result.context("socket mode stream errored")?;
                    let Some(envelope) = parse_socket_envelope(message)? else {
                        continue;
                    };
                    if !envelope.envelope_id.is_empty() {
                        ack_envelope(&mut sink, &envelope.envelope_id).await?;
                    }
                    if envelope.envelope_type == "disconnect" {
                        return Ok(SessionEnd::Reconnect);
                    }
                    self.handle_envelope(&envelope);
                }
            }
        }
    }

    fn handle_envelope(&mut self, envelope: &SocketEnvelope) {
        let inbound = match normalize_socket_envelope(
            envelope,
            &self.bot_user_id,
            &self.config.notification_channels,
        ) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(error = ?error, "ignoring undecodable slack envelope");
                return;
            }
        };
        if !self.processed.mark_processed(inbound.key()) {
            tracing::debug!(key = inbound.key(), "skipping duplicate slack event");
            return;
        }
        tracing::debug!(
            key = inbound.key(),
            remembered = self.processed.len(),
            "accepted slack event"
        );

        let console = Arc::clone(&self.config.console);
        let slack_client = self.slack_client.clone();
        tokio::spawn(async move {
            let key = inbound.key().to_string();
            if let Err(error) = process_inbound(&console, &slack_client, inbound).await {
                tracing::error!(%key, error = ?error, "failed to deliver slack reply");
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("could not acknowledge socket envelope")
}

/// Runs one inbound event through the console and posts any reply.
async fn process_inbound(
    console: &OpsConsole,
    slack_client: &SlackApiClient,
    inbound: SlackInbound,
) -> Result<()> {
    match inbound {
        SlackInbound::Command {
            channel_id,
            user_id,
            text,
            thread_ts,
            ..
        } => {
            let reply = console.handle_command_text(&text).await;
            let posted = slack_client
                .post_message(
                    &channel_id,
                    &render_command_reply(&user_id, &reply),
                    Some(&thread_ts),
                )
                .await?;
            tracing::info!(channel = %posted.channel, ts = %posted.ts, "posted command reply");
        }
        SlackInbound::Notification { event, .. } => {
            if let Some(digest) = console.handle_notification(&event).await {
                let posted = slack_client
                    .post_message(&event.channel_id, &digest, None)
                    .await?;
                tracing::info!(channel = %posted.channel, ts = %posted.ts, "posted ci digest");
            }
        }
    }
    Ok(())
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    let text = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => {
            String::from_utf8(bytes.to_vec()).context("socket frame is not utf-8")?
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            return Ok(None)
        }
    };
    serde_json::from_str::<SocketEnvelope>(&text)
        .map(Some)
        .context("socket frame is not a json envelope")
}

/// Classifies an envelope as a user command, a CI notification, or noise.
fn normalize_socket_envelope(
    envelope: &SocketEnvelope,
    bot_user_id: &str,
    notification_channels: &BTreeSet<String>,
) -> Result<Option<SlackInbound>> {
    if envelope.envelope_type != "events_api" {
        return Ok(None);
    }
    let callback = serde_json::from_value::<EventCallback>(envelope.payload.clone())
        .context("events_api payload is not an event callback")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }

    let event = callback.event;
    let channel_id = match event.channel.as_deref().map(str::trim) {
        Some(channel) if !channel.is_empty() => channel.to_string(),
        _ => return Ok(None),
    };
    let Some(message_ts) = event
        .ts
        .clone()
        .or_else(|| event.event_ts.clone())
        .filter(|ts| !ts.trim().is_empty())
    else {
        return Ok(None);
    };
    let key = format!("{}:{}:{}", callback.event_id, channel_id, message_ts);

    match event.event_type.as_str() {
        "app_mention" => {
            let user_id = match event.user.as_deref().map(str::trim) {
                Some(user) if !user.is_empty() && user != bot_user_id => user.to_string(),
                _ => return Ok(None),
            };
            let text = strip_bot_mention(event.text.as_deref().unwrap_or_default(), bot_user_id);
            Ok(Some(SlackInbound::Command {
                key,
                channel_id,
                user_id,
                text,
                thread_ts: event.thread_ts.clone().unwrap_or(message_ts),
            }))
        }
        "message"
            if event.subtype.as_deref() == Some("bot_message")
                && notification_channels.contains(&channel_id) =>
        {
            let raw_text = event.notification_text();
            Ok(Some(SlackInbound::Notification {
                key,
                event: NotificationEvent {
                    channel_id,
                    event_ts: event.event_ts.clone().unwrap_or(message_ts),
                    raw_text,
                },
            }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests;
