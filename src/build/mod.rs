//! Build orchestration.
//!
//! [`BuildCoordinator`] runs one build end to end: optional one-time registry
//! login, image build from the remote git context, classification through the
//! notifier, then tag and push of both image tags.

mod coordinator;
mod error;

pub use coordinator::{BuildCoordinator, BuildParams};
pub use error::BuildError;
