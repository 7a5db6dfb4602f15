//! Build artifact domain types
//!
//! An artifact is a container image produced from one source snapshot. It is
//! addressed by an immutable tag derived from the commit and aliased by the
//! mutable `latest` tag. Both tags are applied by the same build, so they
//! always name the same image id.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mutable alias pushed alongside every immutable tag
pub const LATEST_TAG: &str = "latest";

/// Longest tag a registry accepts
const MAX_TAG_LEN: usize = 128;

/// A source checkout the pipeline builds from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Directory containing the application source
    pub path: PathBuf,

    /// Commit the snapshot was taken at
    pub commit: String,
}

impl SourceSnapshot {
    pub fn new(path: impl Into<PathBuf>, commit: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            commit: commit.into(),
        }
    }

    /// Derives the immutable image tag for this snapshot
    ///
    /// The commit is lowercased and any character a registry would reject is
    /// replaced by `-`. Returns `None` when nothing usable remains.
    pub fn immutable_tag(&self) -> Option<String> {
        let tag: String = self
            .commit
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .take(MAX_TAG_LEN)
            .collect();

        if is_valid_tag(&tag) { Some(tag) } else { None }
    }
}

/// Checks a tag against the registry tag grammar `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }

    tag.len() <= MAX_TAG_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Fully qualified image reference (`registry/namespace/name:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Returns the same repository under a different tag
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self::new(self.repository.clone(), tag)
    }

    /// Registry host of the reference, if the repository names one
    ///
    /// Follows the docker convention: the first path component is a host only
    /// when it contains a `.` or `:` or is `localhost`.
    pub fn registry(&self) -> Option<&str> {
        let (first, rest) = self.repository.split_once('/')?;
        if rest.is_empty() {
            return None;
        }
        if first.contains('.') || first.contains(':') || first == "localhost" {
            Some(first)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// A built container image
///
/// Created by the builder from a source snapshot and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Content-addressed image id reported by the container engine
    pub image_id: String,

    /// Repository both tags live in
    pub repository: String,

    /// Tag derived from the commit; never reused for other content
    pub immutable_tag: String,

    /// Mutable alias (normally `latest`)
    pub alias_tag: String,

    /// Platform the image was built for, e.g. `linux/amd64`
    pub platform: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl BuildArtifact {
    pub fn immutable_ref(&self) -> ImageRef {
        ImageRef::new(self.repository.clone(), self.immutable_tag.clone())
    }

    pub fn alias_ref(&self) -> ImageRef {
        ImageRef::new(self.repository.clone(), self.alias_tag.clone())
    }

    /// Both references in push order: immutable first, then the alias
    pub fn refs(&self) -> [ImageRef; 2] {
        [self.immutable_ref(), self.alias_ref()]
    }
}

/// An artifact after both of its tags reached the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub image_id: String,
    pub immutable: ImageRef,
    pub alias: ImageRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> BuildArtifact {
        BuildArtifact {
            image_id: "sha256:abc".to_string(),
            repository: "docker.io/dhaval/node-app".to_string(),
            immutable_tag: "3f2a9c1".to_string(),
            alias_tag: LATEST_TAG.to_string(),
            platform: "linux/amd64".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_immutable_tag_from_commit() {
        let snapshot = SourceSnapshot::new("/src", "3F2A9C1E");
        assert_eq!(snapshot.immutable_tag().as_deref(), Some("3f2a9c1e"));
    }

    #[test]
    fn test_immutable_tag_replaces_invalid_characters() {
        let snapshot = SourceSnapshot::new("/src", "feature/foo bar");
        assert_eq!(snapshot.immutable_tag().as_deref(), Some("feature-foo-bar"));
    }

    #[test]
    fn test_immutable_tag_rejects_empty_and_leading_dash() {
        assert!(SourceSnapshot::new("/src", "   ").immutable_tag().is_none());
        assert!(SourceSnapshot::new("/src", "/abc").immutable_tag().is_none());
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("latest"));
        assert!(is_valid_tag("_v1.2-rc"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag(".hidden"));
        assert!(!is_valid_tag("has:colon"));
        assert!(!is_valid_tag(&"a".repeat(129)));
    }

    #[test]
    fn test_artifact_refs_share_repository() {
        let artifact = artifact();
        let [immutable, alias] = artifact.refs();
        assert_eq!(immutable.to_string(), "docker.io/dhaval/node-app:3f2a9c1");
        assert_eq!(alias.to_string(), "docker.io/dhaval/node-app:latest");
        assert_eq!(immutable.repository, alias.repository);
    }

    #[test]
    fn test_registry_detection() {
        assert_eq!(
            ImageRef::new("docker.io/dhaval/app", "x").registry(),
            Some("docker.io")
        );
        assert_eq!(
            ImageRef::new("localhost:5000/app", "x").registry(),
            Some("localhost:5000")
        );
        assert_eq!(ImageRef::new("dhaval/app", "x").registry(), None);
        assert_eq!(ImageRef::new("app", "x").registry(), None);
    }
}
