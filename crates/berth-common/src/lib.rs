//! # berth-common
//!
//! Shared utilities and types for the Berth image reconciler.
//!
//! This crate provides common functionality used across all Berth crates:
//! - Resource identifier generation and validation
//! - Standard filesystem paths for recorded state
//! - Duration parsing for operation timeouts
//! - The common error taxonomy

#![warn(missing_docs)]

pub mod duration;
pub mod error;
pub mod id;
pub mod paths;

pub use duration::parse_duration;
pub use error::{BerthError, BerthResult, ErrorKind};
pub use id::ResourceId;
pub use paths::BerthPaths;
