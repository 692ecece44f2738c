use std::time::Duration;

/// Whole seconds from a `Retry-After` header; HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    raw.trim().parse().ok()
}

/// Honors `Retry-After` when present, otherwise doubles from the base delay.
pub(crate) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after_secs: Option<u64>,
) -> Duration {
    match retry_after_secs {
        Some(seconds) => Duration::from_secs(seconds),
        None => {
            let doublings = attempt.saturating_sub(1).min(6);
            Duration::from_millis(base_delay_ms.max(1) << doublings)
        }
    }
}

/// Rate limits and server errors are worth another attempt.
pub(crate) fn is_retryable_slack_status(status: u16) -> bool {
    matches!(status, 429 | 500..=599)
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request() || error.is_body()
}

pub(crate) fn truncate_for_error(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

/// Removes every mention of the bot and trims what is left.
pub(crate) fn strip_bot_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&format!("<@{bot_user_id}>"), " ")
        .trim()
        .to_string()
}

/// Addresses a threaded reply to the user who issued the command.
pub(crate) fn render_command_reply(user_id: &str, reply: &str) -> String {
    format!("<@{user_id}> {reply}")
}
