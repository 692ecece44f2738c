//! Rolling CI health statistics fed by chat notifications.
//!
//! [`CiStatsAggregator`] keeps per-repository pass/fail counters for the
//! current UTC day. [`NotificationReactor`] extracts the pull request behind a
//! CI notification, optionally enriches it through a [`CiDetailSource`], and
//! folds the outcome into the aggregator.

pub mod bar_chart;
pub mod ci_stats_table;
pub mod jenkins_ci_details;
pub mod notification_reactor;

pub use bar_chart::{render_bar_chart, DEFAULT_LINE_LENGTH};
pub use ci_stats_table::{CiOutcome, CiStatsAggregator, CiStatsTable, RepoCiStats};
pub use jenkins_ci_details::JenkinsCiDetails;
pub use notification_reactor::{
    classify_notification, extract_change_request, format_stage_duration,
    parse_event_timestamp, ChangeRequestIdentity, CiDetailSource, NotificationEvent,
    NotificationReactor, PrTestReport, ReactorConfig, DIGEST_HEADER,
};
