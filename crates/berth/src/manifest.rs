//! Manifest loading.
//!
//! A manifest maps resource addresses to declared image specs:
//!
//! ```yaml
//! images:
//!   base:
//!     name: alpine:3.18
//!   app:
//!     name: registry.local/app:v1
//!     build:
//!       context: ./app
//! ```
//!
//! The format follows the file extension: `.yaml`/`.yml`, `.toml` or `.json`.

use std::collections::BTreeMap;
use std::path::Path;

use berth_common::{BerthError, BerthResult, ResourceId};
use berth_image::{ImageSpec, RawImageSpec, normalize};
use serde::{Deserialize, Serialize};

/// Manifest document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl Format {
    /// Pick the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Config`] for unknown or missing extensions.
    pub fn from_path(path: &Path) -> BerthResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(BerthError::Config {
                message: format!(
                    "cannot tell manifest format of '{}', use .yaml, .toml or .json",
                    path.display()
                ),
            }),
        }
    }
}

/// Declared image resources by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Image resources.
    #[serde(default)]
    pub images: BTreeMap<ResourceId, RawImageSpec>,
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Config`] if the file cannot be read or its format
    /// is unknown, and [`BerthError::InvalidSpecification`] if it does not
    /// match the schema.
    pub fn load(path: &Path) -> BerthResult<Self> {
        let format = Format::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| BerthError::Config {
            message: format!("failed to read '{}': {e}", path.display()),
        })?;

        let manifest = Self::parse(&text, format)?;
        tracing::debug!(
            path = %path.display(),
            images = manifest.images.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::InvalidSpecification`] for malformed documents,
    /// wrong field types, missing required fields and unknown fields.
    pub fn parse(text: &str, format: Format) -> BerthResult<Self> {
        let parsed = match format {
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(BerthError::invalid_spec)
    }

    /// Normalize every declared resource.
    ///
    /// # Errors
    ///
    /// Returns the first normalization failure, prefixed with its address.
    pub fn normalize(&self) -> BerthResult<BTreeMap<ResourceId, ImageSpec>> {
        self.images
            .iter()
            .map(|(address, raw)| {
                normalize(raw.clone())
                    .map(|spec| (address.clone(), spec))
                    .map_err(|e| at_address(address, e))
            })
            .collect()
    }
}

fn at_address(address: &ResourceId, error: BerthError) -> BerthError {
    match error {
        BerthError::InvalidSpecification { message } => {
            BerthError::invalid_spec(format!("images.{address}: {message}"))
        }
        BerthError::UnsupportedOption { option, reason } => BerthError::UnsupportedOption {
            option: format!("images.{address}.{option}"),
            reason,
        },
        other => other,
    }
}
