//! Small URL and payload helpers shared by the Jenkins client.

use serde_json::Value;

/// Expands a slash-separated job name into the Jenkins folder path.
///
/// `org/repo/PR-7` becomes `job/org/job/repo/job/PR-7`.
pub fn job_path(job_name: &str) -> String {
    job_name
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("job/{segment}"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Removes the link decoration chat clients wrap around pasted URLs.
///
/// `<https://host/path|host/path>` becomes `https://host/path`. Values that do
/// not look like URLs pass through unchanged.
pub fn strip_chat_url_decoration(value: &str) -> String {
    if !value.contains("http") {
        return value.to_string();
    }
    let unwrapped = value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>');
    match unwrapped.split_once('|') {
        Some((url, _display)) => url.to_string(),
        None => unwrapped.to_string(),
    }
}

/// Drops the query string so remote-build tokens never reach logs.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Reads a build number that Jenkins may encode as a string or an integer.
pub fn parse_build_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(raw) => raw.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub(crate) fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

pub(crate) fn status_reason(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}
