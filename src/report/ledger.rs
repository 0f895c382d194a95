//! Append-only ledger of finished builds.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::BuildStatusReport;

/// All build reports completed by this process, in completion order.
///
/// Shared between every build task (writers) and the `/report` handler
/// (reader). The lock is held only to push or to clone out a snapshot.
#[derive(Debug, Default)]
pub struct StatsLedger {
    reports: Mutex<Vec<BuildStatusReport>>,
}

impl StatsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finished report. The report is immutable from here on.
    pub fn append(&self, report: BuildStatusReport) {
        debug!(
            owner = %report.owner,
            repo = %report.repo_name,
            tag = %report.tag,
            status = %report.status(),
            "Recording build report"
        );
        self.lock().push(report);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of every report recorded so far.
    pub fn reports(&self) -> Vec<BuildStatusReport> {
        self.lock().clone()
    }

    /// Renders the ledger as newline-delimited JSON, one report per line.
    pub fn render(&self) -> String {
        let reports = self.reports();
        let mut out = String::new();
        for report in &reports {
            match serde_json::to_string(report) {
                Ok(line) => {
                    out.push_str(&line);
                    out.push('\n');
                }
                Err(e) => {
                    warn!(error = %e, "Failed to serialize build report");
                    break;
                }
            }
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BuildStatusReport>> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
