//! # Berth
//!
//! Declarative image reconciliation against a local container engine.
//!
//! Berth keeps a set of declared images present in the engine: it pulls or
//! builds what is missing, replaces images whose immutable inputs changed,
//! updates delete-time bookkeeping in place, and removes images that are no
//! longer declared.
//!
//! ## Usage
//!
//! ```no_run
//! use berth::docker::DockerCli;
//! use berth::reconciler::Reconciler;
//! use berth_image::ImageSpec;
//!
//! # async fn example() -> berth_common::BerthResult<()> {
//! let docker = DockerCli::default();
//! let reconciler = Reconciler::new(&docker);
//!
//! // Pull alpine and record what the engine reports
//! let spec = ImageSpec::pull("alpine:3.18");
//! let record = reconciler.create(&spec).await?;
//!
//! // Later: remove it again
//! reconciler.delete(&spec, &record).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod build_log;
pub mod cli;
pub mod docker;
pub mod engine;
pub mod manifest;
pub mod plan;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod supervisor;

pub use engine::{EngineClient, ImageInspect};
pub use plan::{Field, FieldClass, Plan};
pub use reconciler::{ApplyError, Reconciler};
pub use state::{ImageRecord, RecordStore, StoredResource};
