//! Core domain types for microci.
//!
//! Newtypes for the identifiers that flow from webhook payloads through the
//! build pipeline, so a branch name is never mistaken for a commit or an
//! image reference.

pub mod ids;
pub mod image;

pub use ids::{GitRef, RepoId};
pub use image::{ImageRef, ImageTarget};
