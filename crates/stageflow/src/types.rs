//! Core types for stage execution

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle status of a stage or flow
///
/// `Queued → InProgress → {Succeeded, Failed}`; a succeeded stage with a
/// compensating action may move on to `Cancelled` or `CancellationFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
    CancellationFailed,
}

impl StageStatus {
    /// Aggregation priority, worst first
    pub const PRIORITY: [StageStatus; 6] = [
        StageStatus::Failed,
        StageStatus::CancellationFailed,
        StageStatus::Cancelled,
        StageStatus::InProgress,
        StageStatus::Queued,
        StageStatus::Succeeded,
    ];

    /// Whether the stage will not change status any more
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress)
    }

    /// Whether the status represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::CancellationFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::CancellationFailed => "CANCELLATION_FAILED",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduce a set of statuses to the worst one
///
/// Scans [`StageStatus::PRIORITY`] in order and returns the first status
/// present. An empty input is `Succeeded`.
pub fn aggregate_status<I>(statuses: I) -> StageStatus
where
    I: IntoIterator<Item = StageStatus>,
{
    let seen: Vec<StageStatus> = statuses.into_iter().collect();
    StageStatus::PRIORITY
        .into_iter()
        .find(|candidate| seen.contains(candidate))
        .unwrap_or(StageStatus::Succeeded)
}

/// What to do with the rest of a flow when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Stop scheduling new stages and compensate the ones that succeeded
    #[default]
    CancelOnError,
    /// Let independent branches continue; nothing is compensated
    IgnoreOnError,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CancelOnError => f.write_str("cancel-on-error"),
            Self::IgnoreOnError => f.write_str("ignore-on-error"),
        }
    }
}

/// Retry diagnostics for one stage
///
/// Filled in by the retry policy through the stage's context and persisted
/// with the stage record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInformation {
    pub retries_count: u32,
    pub errors: Vec<String>,
}

impl RetryInformation {
    /// Record a failed attempt that is about to be retried
    pub fn record(&mut self, error: &dyn fmt::Display) {
        self.retries_count += 1;
        self.errors
            .push(format!("{}: {}", Utc::now().to_rfc3339(), error));
    }

    /// Whether any retry happened
    pub fn is_empty(&self) -> bool {
        self.retries_count == 0
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub cancellation_failed: usize,
    /// Stages that never started
    pub not_started: usize,
    pub in_progress: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful (no failures, nothing left behind)
    pub fn is_success(&self) -> bool {
        self.failed == 0
            && self.cancellation_failed == 0
            && self.cancelled == 0
            && self.not_started == 0
            && self.in_progress == 0
    }

    /// Total number of stages
    pub fn total(&self) -> usize {
        self.succeeded
            + self.failed
            + self.cancelled
            + self.cancellation_failed
            + self.not_started
            + self.in_progress
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.cancellation_failed += other.cancellation_failed;
        self.not_started += other.not_started;
        self.in_progress += other.in_progress;
    }

    /// Count a stage status
    pub fn add_status(&mut self, status: StageStatus) {
        match status {
            StageStatus::Queued => self.not_started += 1,
            StageStatus::InProgress => self.in_progress += 1,
            StageStatus::Succeeded => self.succeeded += 1,
            StageStatus::Failed => self.failed += 1,
            StageStatus::Cancelled => self.cancelled += 1,
            StageStatus::CancellationFailed => self.cancellation_failed += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Worker threads; parallel nodes run children in order when this is 1
    pub jobs: usize,
    pub strategy: ExecutionStrategy,
    /// Wall-clock limit for the whole flow
    pub timeout: Option<Duration>,
    /// How long to wait for in-flight stages after the timeout fires
    pub in_flight_grace: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            strategy: ExecutionStrategy::default(),
            timeout: None,
            in_flight_grace: Duration::from_secs(30),
        }
    }
}

impl ExecuteOptions {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, in_flight_grace: Duration) -> Self {
        self.timeout = Some(timeout);
        self.in_flight_grace = in_flight_grace;
        self
    }
}

/// Worker count sized to the machine
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}
