//! Recorded reconciliation state.
//!
//! Each resource address owns one directory under the state root holding a
//! `state.json` with the applied spec and the image record. Writes go through
//! a temporary file in the same directory and are renamed into place, so a
//! crash never leaves a half-written record behind.

use std::io::Write;

use berth_common::{BerthError, BerthPaths, BerthResult, ResourceId};
use berth_image::{ImageSpec, select_repo_digest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ImageInspect;

/// The persisted observation of one managed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Opaque resource ID, stable across in-place updates.
    pub id: ResourceId,
    /// Engine image ID.
    pub image_id: String,
    /// Content-addressed reference, empty when the engine reports none.
    #[serde(default)]
    pub repo_digest: String,
}

impl ImageRecord {
    /// Build a fresh record from an engine inspect result.
    #[must_use]
    pub fn from_inspect(id: ResourceId, name: &str, inspect: &ImageInspect) -> Self {
        Self {
            id,
            image_id: inspect.id.clone(),
            repo_digest: select_repo_digest(name, &inspect.repo_digests)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// The same record with engine-observed attributes replaced.
    #[must_use]
    pub fn refreshed(&self, name: &str, inspect: &ImageInspect) -> Self {
        Self::from_inspect(self.id.clone(), name, inspect)
    }
}

/// Everything recorded about one resource address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResource {
    /// Resource address in the manifest.
    pub address: ResourceId,
    /// The `ImageSpec` last applied.
    pub spec: ImageSpec,
    /// What the engine reported for it.
    pub record: ImageRecord,
    /// When this entry was last written.
    pub recorded_at: DateTime<Utc>,
}

impl StoredResource {
    /// Stamp a new entry with the current time.
    #[must_use]
    pub fn new(address: ResourceId, spec: ImageSpec, record: ImageRecord) -> Self {
        Self {
            address,
            spec,
            record,
            recorded_at: Utc::now(),
        }
    }
}

/// File-backed store of [`StoredResource`] entries.
#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: BerthPaths,
}

impl RecordStore {
    /// Open a store rooted at `paths`. Nothing is created until the first save.
    #[must_use]
    pub const fn new(paths: BerthPaths) -> Self {
        Self { paths }
    }

    /// The paths this store writes to.
    #[must_use]
    pub const fn paths(&self) -> &BerthPaths {
        &self.paths
    }

    /// Persist an entry, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, resource: &StoredResource) -> BerthResult<()> {
        let dir = self.paths.resource(resource.address.as_str());
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(resource)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;

        let path = self.paths.resource_state(resource.address.as_str());
        tmp.persist(&path).map_err(|e| BerthError::Io(e.error))?;

        tracing::debug!(
            address = %resource.address,
            path = %path.display(),
            "Saved resource state"
        );

        Ok(())
    }

    /// Load an entry.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::ResourceNotFound`] if nothing is recorded for
    /// `address`.
    pub fn load(&self, address: &ResourceId) -> BerthResult<StoredResource> {
        self.get(address)?
            .ok_or_else(|| BerthError::ResourceNotFound {
                id: address.to_string(),
            })
    }

    /// Load an entry if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn get(&self, address: &ResourceId) -> BerthResult<Option<StoredResource>> {
        let path = self.paths.resource_state(address.as_str());
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let resource: StoredResource = serde_json::from_str(&json)?;

        tracing::debug!(
            address = %address,
            path = %path.display(),
            "Loaded resource state"
        );

        Ok(Some(resource))
    }

    /// Forget an entry. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn delete(&self, address: &ResourceId) -> BerthResult<()> {
        let dir = self.paths.resource(address.as_str());

        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::debug!(
                address = %address,
                path = %dir.display(),
                "Deleted resource state"
            );
        }

        Ok(())
    }

    /// All recorded addresses, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be read.
    pub fn list(&self) -> BerthResult<Vec<ResourceId>> {
        let mut addresses = Vec::new();
        let root = self.paths.resources();

        if !root.exists() {
            return Ok(addresses);
        }

        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.path().join("state.json").is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match ResourceId::new(name) {
                Ok(address) => addresses.push(address),
                Err(e) => tracing::warn!(error = %e, "Skipping unrecognised state entry"),
            }
        }

        addresses.sort();
        Ok(addresses)
    }

    /// Whether anything is recorded for `address`.
    #[must_use]
    pub fn exists(&self, address: &ResourceId) -> bool {
        self.paths.resource_state(address.as_str()).exists()
    }
}
