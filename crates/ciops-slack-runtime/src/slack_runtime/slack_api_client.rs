//! Slack Web API calls the console needs: identity, socket URL, and posting.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::slack_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

const RETRY_ATTEMPT_HEADER: &str = "x-ciops-retry-attempt";

/// Every Web API answer carries `ok` and, on failure, an `error` code.
#[derive(Debug, Deserialize)]
struct SlackReply<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct AuthTestBody {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenBody {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlackPostedMessage {
    pub(crate) channel: String,
    pub(crate) ts: String,
}

#[derive(Debug, Clone, Copy)]
enum SlackToken {
    /// `xapp-` token; only opens Socket Mode connections.
    App,
    Bot,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Clone)]
pub(crate) struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub(crate) fn new(
        api_base: &str,
        app_token: &str,
        bot_token: &str,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("ciops-slack-bridge")
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("could not build the slack http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub(crate) async fn resolve_bot_user_id(&self) -> Result<String> {
        let body: AuthTestBody = self.call("auth.test", SlackToken::Bot, None).await?;
        non_empty(body.user_id).ok_or_else(|| anyhow!("auth.test answered without a user_id"))
    }

    /// Returns the single-use websocket URL for a Socket Mode session.
    pub(crate) async fn open_socket_connection(&self) -> Result<String> {
        let body: ConnectionsOpenBody = self
            .call("apps.connections.open", SlackToken::App, None)
            .await?;
        non_empty(body.url).ok_or_else(|| anyhow!("apps.connections.open answered without a url"))
    }

    /// Posts `text` to `channel`, in the thread rooted at `thread_ts` when given.
    pub(crate) async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackPostedMessage> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(root) = non_empty(thread_ts.map(|ts| ts.trim().to_string())) {
            payload["thread_ts"] = Value::String(root);
        }

        let body: PostMessageBody = self
            .call("chat.postMessage", SlackToken::Bot, Some(&payload))
            .await?;
        let ts = non_empty(body.ts)
            .ok_or_else(|| anyhow!("chat.postMessage answered without a message ts"))?;
        Ok(SlackPostedMessage {
            channel: non_empty(body.channel).unwrap_or_else(|| channel.to_string()),
            ts,
        })
    }

    async fn call<T>(&self, method: &str, token: SlackToken, payload: Option<&Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send_with_retry(method, token, payload).await?;
        let reply = response
            .json::<SlackReply<T>>()
            .await
            .with_context(|| format!("could not decode the {method} response"))?;
        if !reply.ok {
            return Err(anyhow!(
                "{method} was refused by slack: {}",
                reply.error.as_deref().unwrap_or("no error code")
            ));
        }
        Ok(reply.body)
    }

    /// Sends one Web API request, retrying rate limits, 5xx and transport hiccups.
    async fn send_with_retry(
        &self,
        method: &str,
        token: SlackToken,
        payload: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{method}", self.api_base);
        let bearer = match token {
            SlackToken::App => &self.app_token,
            SlackToken::Bot => &self.bot_token,
        };

        for attempt in 1..=self.retry_max_attempts {
            let mut request = self
                .http
                .post(&url)
                .bearer_auth(bearer)
                .header(reqwest::header::ACCEPT, "application/json")
                .header(RETRY_ATTEMPT_HEADER, (attempt - 1).to_string());
            if let Some(payload) = payload {
                request = request.json(payload);
            }
            let last_attempt = attempt == self.retry_max_attempts;

            let response = match request.send().await {
                Ok(response) => response,
                Err(error) if !last_attempt && is_retryable_transport_error(&error) => {
                    tracing::warn!(
                        method,
                        attempt,
                        error = %error.without_url(),
                        "slack request failed; retrying"
                    );
                    tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None)).await;
                    continue;
                }
                Err(error) => {
                    return Err(error.without_url())
                        .with_context(|| format!("{method} request could not be sent"));
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if !last_attempt && is_retryable_slack_status(status.as_u16()) {
                let delay = retry_delay(
                    self.retry_base_delay_ms,
                    attempt,
                    parse_retry_after(response.headers()),
                );
                tracing::warn!(
                    method,
                    status = status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "slack throttled or failed; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{method} answered status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 800)
            ));
        }

        Err(anyhow!("{method} was not attempted"))
    }
}
