use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::classifier::{FieldUpdate, LineOutcome};

/// Accumulated view of the clamscan report being tailed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportState {
    pub file_path: String,
    pub lines_read: u64,
    pub lines_parsed: u64,
    pub lines_ignored: u64,
    pub lines_unknown: u64,
    pub report_status: bool,
    pub infected_files: u64,
    pub total_errors: u64,
    pub scan_duration: Duration,
    pub scan_start_time: DateTime<Utc>,
    pub scan_end_time: DateTime<Utc>,
    pub last_file_error: Option<String>,
}

impl ReportState {
    pub fn new(file_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            file_path: file_path.into(),
            lines_read: 0,
            lines_parsed: 0,
            lines_ignored: 0,
            lines_unknown: 0,
            report_status: false,
            infected_files: 0,
            total_errors: 0,
            scan_duration: Duration::ZERO,
            scan_start_time: now,
            scan_end_time: now,
            last_file_error: None,
        }
    }

    /// Counts the line and applies its update. `lines_read` and exactly one
    /// category counter move together.
    pub fn apply(&mut self, outcome: &LineOutcome) {
        self.lines_read += 1;
        match outcome {
            LineOutcome::Ignored => self.lines_ignored += 1,
            LineOutcome::Unknown => self.lines_unknown += 1,
            LineOutcome::Parsed(update) => {
                self.lines_parsed += 1;
                if let Ok(update) = update {
                    self.set_field(update);
                }
            }
        }
    }

    fn set_field(&mut self, update: &FieldUpdate) {
        match *update {
            FieldUpdate::ReportStatus(ok) => self.report_status = ok,
            FieldUpdate::InfectedFiles(count) => self.infected_files = count,
            FieldUpdate::TotalErrors(count) => self.total_errors = count,
            FieldUpdate::ScanDuration(duration) => self.scan_duration = duration,
            FieldUpdate::ScanStartTime(at) => self.scan_start_time = at,
            FieldUpdate::ScanEndTime(at) => self.scan_end_time = at,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.file_path.is_empty() && self.last_file_error.is_none()
    }
}

/// Shared handle to the report state. The tailer writes through it, scrapes
/// read whole snapshots.
#[derive(Debug, Clone)]
pub struct ScanReport {
    state: Arc<RwLock<ReportState>>,
}

impl ScanReport {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ReportState::new(file_path))),
        }
    }

    pub async fn apply(&self, outcome: &LineOutcome) {
        self.state.write().await.apply(outcome);
    }

    pub async fn record_file_error(&self, error: impl std::fmt::Display) {
        self.state.write().await.last_file_error = Some(error.to_string());
    }

    pub async fn snapshot(&self) -> ReportState {
        self.state.read().await.clone()
    }
}
