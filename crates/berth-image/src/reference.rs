//! Image reference and repo digest parsing.

use std::str::FromStr;

use berth_common::{BerthError, BerthResult};

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname.
    pub registry: String,
    /// Repository name.
    pub repository: String,
    /// Tag or digest.
    pub reference: ImageTag,
}

/// Image tag or digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTag {
    /// A tag (e.g., "latest").
    Tag(String),
    /// A digest (e.g., "sha256:abc123...").
    Digest(String),
}

impl ImageReference {
    /// Default registry.
    pub const DEFAULT_REGISTRY: &'static str = "docker.io";
    /// Default tag.
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Parse an image reference string.
    ///
    /// Examples:
    /// - `alpine` -> docker.io/library/alpine:latest
    /// - `alpine:3.19` -> docker.io/library/alpine:3.19
    /// - `myuser/myapp` -> docker.io/myuser/myapp:latest
    /// - `ghcr.io/org/app:v1.0` -> ghcr.io/org/app:v1.0
    /// - `localhost:5000/app@sha256:ab..` -> localhost:5000/app@sha256:ab..
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::InvalidSpecification`] for empty references or
    /// references containing whitespace.
    pub fn parse(reference: &str) -> BerthResult<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains(char::is_whitespace) {
            return Err(BerthError::invalid_spec(format!(
                "invalid image reference '{reference}'"
            )));
        }

        let (name, tag) = if let Some((name, digest)) = reference.split_once('@') {
            // A tag before the digest is informational only
            (Self::strip_tag(name), ImageTag::Digest(digest.to_string()))
        } else {
            let stripped = Self::strip_tag(reference);
            if stripped.len() == reference.len() {
                (reference, ImageTag::Tag(Self::DEFAULT_TAG.to_string()))
            } else {
                (
                    stripped,
                    ImageTag::Tag(reference[stripped.len() + 1..].to_string()),
                )
            }
        };

        if name.is_empty() {
            return Err(BerthError::invalid_spec(format!(
                "invalid image reference '{reference}'"
            )));
        }

        // Parse registry and repository
        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            // Docker Hub user/repo
            Some(_) => (Self::DEFAULT_REGISTRY.to_string(), name.to_string()),
            // Official image (e.g., "alpine" -> "library/alpine")
            None => (
                Self::DEFAULT_REGISTRY.to_string(),
                format!("library/{name}"),
            ),
        };

        Ok(Self {
            registry,
            repository,
            reference: tag,
        })
    }

    /// Drop a trailing `:tag`, leaving a `host:port/` prefix alone.
    fn strip_tag(name: &str) -> &str {
        match name.rfind(':') {
            Some(idx) if !name[idx + 1..].contains('/') => &name[..idx],
            _ => name,
        }
    }

    /// `registry/repository`, without tag or digest.
    #[must_use]
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Get the full reference string.
    #[must_use]
    pub fn full_reference(&self) -> String {
        let tag = match &self.reference {
            ImageTag::Tag(t) => format!(":{t}"),
            ImageTag::Digest(d) => format!("@{d}"),
        };
        format!("{}{}", self.repository_path(), tag)
    }

    /// Whether two references name the same repository.
    #[must_use]
    pub fn same_repository(&self, other: &Self) -> bool {
        self.registry == other.registry && self.repository == other.repository
    }
}

impl FromStr for ImageReference {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Pick the repo digest to record for an image named `name`.
///
/// Engines report one `repo@sha256:...` entry per repository the image was
/// pulled from or pushed to. The entry for `name`'s repository wins; otherwise
/// the first entry; otherwise there is nothing to record.
#[must_use]
pub fn select_repo_digest<'a>(name: &str, repo_digests: &'a [String]) -> Option<&'a str> {
    let wanted = ImageReference::parse(name).ok();

    let matching = wanted.as_ref().and_then(|wanted| {
        repo_digests.iter().find(|candidate| {
            ImageReference::parse(candidate)
                .map(|parsed| parsed.same_repository(wanted))
                .unwrap_or(false)
        })
    });

    matching.or_else(|| repo_digests.first()).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let ref_ = ImageReference::parse("alpine").unwrap();
        assert_eq!(ref_.registry, "docker.io");
        assert_eq!(ref_.repository, "library/alpine");
        assert!(matches!(ref_.reference, ImageTag::Tag(t) if t == "latest"));
    }

    #[test]
    fn parse_with_tag() {
        let ref_ = ImageReference::parse("alpine:3.18").unwrap();
        assert_eq!(ref_.repository, "library/alpine");
        assert!(matches!(ref_.reference, ImageTag::Tag(t) if t == "3.18"));
    }

    #[test]
    fn parse_registry_with_port() {
        let ref_ = ImageReference::parse("localhost:5000/team/app").unwrap();
        assert_eq!(ref_.registry, "localhost:5000");
        assert_eq!(ref_.repository, "team/app");
        assert!(matches!(ref_.reference, ImageTag::Tag(t) if t == "latest"));

        let ref_ = ImageReference::parse("registry.local:5000/app:v2").unwrap();
        assert_eq!(ref_.registry, "registry.local:5000");
        assert!(matches!(ref_.reference, ImageTag::Tag(t) if t == "v2"));
    }

    #[test]
    fn parse_digest() {
        let ref_ = ImageReference::parse("ghcr.io/org/app:v1@sha256:abc").unwrap();
        assert_eq!(ref_.registry, "ghcr.io");
        assert_eq!(ref_.repository, "org/app");
        assert!(matches!(ref_.reference, ImageTag::Digest(ref d) if d == "sha256:abc"));
        assert_eq!(ref_.full_reference(), "ghcr.io/org/app@sha256:abc");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("  ").is_err());
        assert!(ImageReference::parse("two words").is_err());
        assert!(ImageReference::parse(":tag").is_err());
    }

    #[test]
    fn repo_digest_prefers_matching_repository() {
        let digests = vec![
            "mirror.local/library/alpine@sha256:111".to_string(),
            "alpine@sha256:222".to_string(),
        ];
        assert_eq!(
            select_repo_digest("alpine:3.18", &digests),
            Some("alpine@sha256:222")
        );
        assert_eq!(
            select_repo_digest("docker.io/library/alpine", &digests),
            Some("alpine@sha256:222")
        );
    }

    #[test]
    fn repo_digest_falls_back_to_first() {
        let digests = vec!["other/app@sha256:333".to_string()];
        assert_eq!(
            select_repo_digest("app:v1", &digests),
            Some("other/app@sha256:333")
        );
        assert_eq!(select_repo_digest("app:v1", &[]), None);
    }
}
