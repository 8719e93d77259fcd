//! The container engine seam.
//!
//! The reconciler only talks to the engine through [`EngineClient`]. A client
//! is borrowed for the duration of a reconciliation; the core never closes or
//! reconfigures it.

use async_trait::async_trait;
use berth_common::BerthResult;
use berth_image::EngineBuildRequest;
use serde::{Deserialize, Serialize};

/// What the engine knows locally about one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInspect {
    /// Engine-assigned image ID.
    pub id: String,
    /// `repo[:tag]@sha256:<hash>` entries, possibly empty.
    pub repo_digests: Vec<String>,
}

/// Image operations consumed by the reconciler.
///
/// Engine-side failures are reported as
/// [`BerthError::EngineOperationFailed`](berth_common::BerthError::EngineOperationFailed)
/// carrying the engine's message verbatim.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Pull `name` for `platform` (empty for the engine default).
    async fn pull_image(&self, name: &str, platform: &str) -> BerthResult<ImageInspect>;

    /// Build an image. Long-running; dropping the future must abort the build.
    async fn build_image(&self, request: &EngineBuildRequest) -> BerthResult<ImageInspect>;

    /// Look up an image by ID or name. `None` if the engine does not have it.
    async fn inspect_image(&self, reference: &str) -> BerthResult<Option<ImageInspect>>;

    /// Remove an image. Fails if it is in use and `force` is false.
    async fn remove_image(&self, reference: &str, force: bool) -> BerthResult<()>;

    /// Ask the engine to abort the build started with `build_id`.
    async fn cancel_build(&self, build_id: &str) -> BerthResult<()>;
}
