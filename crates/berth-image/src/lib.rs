//! # berth-image
//!
//! Engine-free image resource logic for Berth.
//!
//! This crate provides:
//! - The declared specification schema and its normalized form
//! - Order-independent trigger fingerprints
//! - Translation of build specs into engine build requests
//! - Image reference and repo digest parsing

#![warn(missing_docs)]

/// Registry credentials.
pub mod auth;
pub mod fingerprint;
pub mod normalize;
pub mod reference;
pub mod spec;
pub mod translate;

pub use auth::{DockerConfigFile, RegistryAuth};
pub use fingerprint::{Fingerprint, fingerprint_map, fingerprint_set};
pub use normalize::normalize;
pub use reference::{ImageReference, select_repo_digest};
pub use spec::{BuildSpec, ImageSpec, RawBuildSpec, RawImageSpec, SecretSource, Timeouts};
pub use translate::{BuildBackend, BuildContext, EngineBuildRequest, translate};
