//! Docker image naming.
//!
//! Every build produces one image name and up to two tags. The name is derived
//! from the repository plus the optional registry/repository overrides given
//! at startup.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RepoId;

/// A fully qualified image reference, `<name>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Image name including any registry host and namespace.
    pub name: String,
    /// Tag within the image name.
    pub tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        ImageRef {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Where built images are named and pushed.
///
/// Fixed at startup and shared read-only by every build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTarget {
    /// Registry host prefix, e.g. `registry.example.com:5000`.
    pub registry: Option<String>,
    /// Namespace that replaces the repository owner, e.g. `team`.
    pub repository: Option<String>,
}

impl ImageTarget {
    pub fn new(registry: Option<String>, repository: Option<String>) -> Self {
        ImageTarget {
            registry: registry.filter(|s| !s.is_empty()),
            repository: repository.filter(|s| !s.is_empty()),
        }
    }

    /// Returns the image name for a repository.
    ///
    /// With a repository override the name is `<repository>/<repo>`, otherwise
    /// the GitHub full name. Docker rejects upper-case references, so the
    /// result is lowercased.
    pub fn image_name(&self, repo: &RepoId) -> String {
        let mut name = String::new();
        if let Some(registry) = &self.registry {
            name.push_str(registry.trim_end_matches('/'));
            name.push('/');
        }
        match &self.repository {
            Some(repository) => {
                name.push_str(repository.trim_matches('/'));
                name.push('/');
                name.push_str(&repo.repo);
            }
            None => name.push_str(&repo.full_name()),
        }
        name.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widgets() -> RepoId {
        RepoId::new("acme", "widgets")
    }

    #[test]
    fn image_ref_display() {
        let image = ImageRef::new("acme/widgets", "main");
        assert_eq!(image.to_string(), "acme/widgets:main");
    }

    #[test]
    fn default_target_uses_full_name() {
        let target = ImageTarget::default();
        assert_eq!(target.image_name(&widgets()), "acme/widgets");
    }

    #[test]
    fn registry_is_prefixed() {
        let target = ImageTarget::new(Some("registry.local:5000".into()), None);
        assert_eq!(
            target.image_name(&widgets()),
            "registry.local:5000/acme/widgets"
        );
    }

    #[test]
    fn repository_override_replaces_owner() {
        let target = ImageTarget::new(Some("registry.local".into()), Some("team".into()));
        assert_eq!(target.image_name(&widgets()), "registry.local/team/widgets");
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let target = ImageTarget::new(Some(String::new()), Some(String::new()));
        assert_eq!(target, ImageTarget::default());
    }

    #[test]
    fn image_name_is_lowercased() {
        let target = ImageTarget::default();
        let repo = RepoId::new("Acme", "Widgets");
        assert_eq!(target.image_name(&repo), "acme/widgets");
    }
}
