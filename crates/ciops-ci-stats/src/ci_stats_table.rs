//! Per-repository CI outcome counters holding at most one UTC day of history.

use std::{collections::BTreeMap, sync::Mutex};

use chrono::{DateTime, Utc};

use crate::bar_chart::{render_bar_chart, DEFAULT_LINE_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CiOutcome {
    Failed,
    Successful,
}

impl CiOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Successful => "successful",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoCiStats {
    pub failed: BTreeMap<String, u64>,
    pub successful: BTreeMap<String, u64>,
}

impl RepoCiStats {
    fn counters(&self, outcome: CiOutcome) -> &BTreeMap<String, u64> {
        match outcome {
            CiOutcome::Failed => &self.failed,
            CiOutcome::Successful => &self.successful,
        }
    }

    fn counters_mut(&mut self, outcome: CiOutcome) -> &mut BTreeMap<String, u64> {
        match outcome {
            CiOutcome::Failed => &mut self.failed,
            CiOutcome::Successful => &mut self.successful,
        }
    }

    pub fn total(&self, outcome: CiOutcome) -> u64 {
        self.counters(outcome).values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiStatsTable {
    latest_entry: Option<DateTime<Utc>>,
    repos: BTreeMap<String, RepoCiStats>,
}

impl CiStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_entry(&self) -> Option<DateTime<Utc>> {
        self.latest_entry
    }

    pub fn repos(&self) -> &BTreeMap<String, RepoCiStats> {
        &self.repos
    }

    /// Counts one classified event. Returns `true` when the table rolled over.
    ///
    /// An event on a strictly later UTC day than the newest stored event
    /// clears every repository first. Events from earlier days are still
    /// counted and do not move `latest_entry` backwards.
    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        repo_name: &str,
        change_request_id: &str,
        outcome: CiOutcome,
    ) -> bool {
        let mut rolled_over = false;
        match self.latest_entry {
            Some(latest) if timestamp.date_naive() > latest.date_naive() => {
                tracing::warn!(
                    previous_day = %latest.date_naive(),
                    event_day = %timestamp.date_naive(),
                    repos = self.repos.len(),
                    "resetting ci stats for a new day"
                );
                self.repos.clear();
                self.latest_entry = Some(timestamp);
                rolled_over = true;
            }
            Some(latest) if timestamp > latest => self.latest_entry = Some(timestamp),
            Some(_) => {}
            None => self.latest_entry = Some(timestamp),
        }

        let counter = self
            .repos
            .entry(repo_name.to_string())
            .or_default()
            .counters_mut(outcome)
            .entry(change_request_id.to_string())
            .or_insert(0);
        *counter = counter.saturating_add(1);
        rolled_over
    }

    pub fn count(&self, repo_name: &str, outcome: CiOutcome, change_request_id: &str) -> u64 {
        self.repos
            .get(repo_name)
            .and_then(|stats| stats.counters(outcome).get(change_request_id))
            .copied()
            .unwrap_or(0)
    }

    /// One `(repo, total)` pair per known repository, zero totals included.
    pub fn totals(&self, outcome: CiOutcome) -> Vec<(String, u64)> {
        self.repos
            .iter()
            .map(|(repo_name, stats)| (repo_name.clone(), stats.total(outcome)))
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut output = String::from("CI Summary:```");
        for line in render_bar_chart(
            "Failed PR checks:",
            &self.totals(CiOutcome::Failed),
            DEFAULT_LINE_LENGTH,
        ) {
            output.push_str(&line);
            output.push('\n');
        }
        output.push('\n');
        for line in render_bar_chart(
            "Successful PR checks:",
            &self.totals(CiOutcome::Successful),
            DEFAULT_LINE_LENGTH,
        ) {
            output.push_str(&line);
            output.push('\n');
        }
        output.push_str("```");
        output
    }
}

#[derive(Debug, Default)]
/// The process-wide stats table behind a mutex.
///
/// Constructed once at startup and shared by reference; every fold is a
/// single critical section.
pub struct CiStatsAggregator {
    table: Mutex<CiStatsTable>,
}

impl CiStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        timestamp: DateTime<Utc>,
        repo_name: &str,
        change_request_id: &str,
        outcome: CiOutcome,
    ) -> bool {
        let rolled_over =
            lock_unpoisoned(&self.table).record(timestamp, repo_name, change_request_id, outcome);
        tracing::info!(
            repo_name,
            change_request_id,
            outcome = outcome.as_str(),
            rolled_over,
            "recorded ci outcome"
        );
        rolled_over
    }

    pub fn summary(&self) -> String {
        lock_unpoisoned(&self.table).summary()
    }

    pub fn snapshot(&self) -> CiStatsTable {
        lock_unpoisoned(&self.table).clone()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
