//! Build status state machine.
//!
//! ```text
//! Unknown ──▶ Running ──▶ Passed ──▶ Error
//!                │
//!                ├──────▶ Failed
//!                └──────▶ Error
//! ```
//!
//! `Passed`, `Failed` and `Error` are terminal, except that a read error on the
//! output stream overrides an earlier `Passed`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStatus {
    #[default]
    Unknown,
    Passed,
    Running,
    Failed,
    Error,
}

impl BuildStatus {
    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        use BuildStatus::*;
        matches!(
            (self, next),
            (Unknown, Running)
                | (Running, Passed)
                | (Running, Failed)
                | (Running, Error)
                | (Passed, Error)
        )
    }

    /// Returns true once no further classification is expected.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Passed | BuildStatus::Failed | BuildStatus::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Unknown => "Unknown",
            BuildStatus::Passed => "Passed",
            BuildStatus::Running => "Running",
            BuildStatus::Failed => "Failed",
            BuildStatus::Error => "Error",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
