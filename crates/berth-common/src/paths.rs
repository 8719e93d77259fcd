//! Standard filesystem paths for Berth.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default state directory, relative to the working directory.
pub static BERTH_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BERTH_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".berth"))
});

/// Standard paths used for recorded reconciliation state.
#[derive(Debug, Clone)]
pub struct BerthPaths {
    /// Root state directory (default: .berth).
    pub root: PathBuf,
}

impl Default for BerthPaths {
    fn default() -> Self {
        Self {
            root: BERTH_STATE_DIR.clone(),
        }
    }
}

impl BerthPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one subdirectory per resource.
    #[must_use]
    pub fn resources(&self) -> PathBuf {
        self.root.join("resources")
    }

    /// Directory for a specific resource.
    #[must_use]
    pub fn resource(&self, address: &str) -> PathBuf {
        self.resources().join(address)
    }

    /// Resource state file.
    #[must_use]
    pub fn resource_state(&self, address: &str) -> PathBuf {
        self.resource(address).join("state.json")
    }
}
