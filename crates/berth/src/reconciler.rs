//! The per-resource state machine.
//!
//! `Absent -> Building/Pulling -> Present -> (Updating in place) -> Present -> Absent`
//!
//! Every step either fully succeeds and yields the new record, or fails and
//! yields nothing; callers persist only on success. A replacement that fails
//! after removing the old image says so through [`ApplyError::prior_deleted`].

use berth_common::{BerthError, BerthResult, ResourceId};
use berth_image::spec::DEFAULT_TIMEOUT;
use berth_image::{ImageSpec, translate};

use crate::engine::{EngineClient, ImageInspect};
use crate::plan::{Field, Plan};
use crate::state::ImageRecord;
use crate::supervisor::{Operation, Supervisor};

/// A failed [`Reconciler::apply`].
#[derive(Debug)]
pub struct ApplyError {
    /// The failing step's error.
    pub error: BerthError,
    /// The recorded image was already deleted when the failure happened.
    pub prior_deleted: bool,
}

impl From<BerthError> for ApplyError {
    fn from(error: BerthError) -> Self {
        Self {
            error,
            prior_deleted: false,
        }
    }
}

/// Drives create, read, update and delete against a borrowed engine client.
pub struct Reconciler<'a, E: EngineClient + ?Sized> {
    engine: &'a E,
    supervisor: Supervisor<'a, E>,
}

impl<'a, E: EngineClient + ?Sized> Reconciler<'a, E> {
    /// Create a reconciler over `engine`.
    pub const fn new(engine: &'a E) -> Self {
        Self {
            engine,
            supervisor: Supervisor::new(engine),
        }
    }

    /// Acquire the image by building or pulling it.
    ///
    /// # Errors
    ///
    /// - [`BerthError::UnsupportedOption`] if the build directive cannot be
    ///   expressed, before any engine call
    /// - [`BerthError::EngineOperationFailed`] if the engine rejects the build
    ///   or pull, or reports no image ID
    /// - [`BerthError::Timeout`] if the create deadline passes
    pub async fn create(&self, spec: &ImageSpec) -> BerthResult<ImageRecord> {
        let deadline = spec.timeouts.create;

        let inspect = if let Some(build) = &spec.build {
            let mut request = translate(build)?;
            request.ensure_tag(&spec.name);

            tracing::info!(
                name = %spec.name,
                builder = request.builder_name().unwrap_or("legacy"),
                tags = ?request.tags,
                "Building image"
            );

            self.supervisor
                .run(
                    Operation::Create,
                    deadline,
                    request.build_id.as_deref(),
                    self.engine.build_image(&request),
                )
                .await?
        } else {
            tracing::info!(name = %spec.name, platform = %spec.platform, "Pulling image");

            self.supervisor
                .run(
                    Operation::Create,
                    deadline,
                    None,
                    self.engine.pull_image(&spec.name, &spec.platform),
                )
                .await?
        };

        if inspect.id.is_empty() {
            return Err(BerthError::engine(
                Operation::Create.as_str(),
                format!("engine reported no image ID for '{}'", spec.name),
            ));
        }

        let record = ImageRecord::from_inspect(ResourceId::generate(), &spec.name, &inspect);

        tracing::info!(
            name = %spec.name,
            image_id = %record.image_id,
            repo_digest = %record.repo_digest,
            "Image present"
        );

        Ok(record)
    }

    /// Refresh a record from the engine.
    ///
    /// Looks the image up by recorded ID, then by name. Returns `None` if
    /// neither resolves. Never builds or pulls.
    ///
    /// # Errors
    ///
    /// Returns an error if an inspect call fails or times out.
    pub async fn read(
        &self,
        spec: &ImageSpec,
        record: &ImageRecord,
    ) -> BerthResult<Option<ImageRecord>> {
        let found = self
            .supervisor
            .run(Operation::Read, DEFAULT_TIMEOUT, None, self.locate(spec, record))
            .await?;

        match found {
            Some(inspect) => Ok(Some(record.refreshed(&spec.name, &inspect))),
            None => {
                tracing::info!(
                    name = %spec.name,
                    image_id = %record.image_id,
                    "Image no longer present"
                );
                Ok(None)
            }
        }
    }

    async fn locate(
        &self,
        spec: &ImageSpec,
        record: &ImageRecord,
    ) -> BerthResult<Option<ImageInspect>> {
        if !record.image_id.is_empty() {
            if let Some(inspect) = self.engine.inspect_image(&record.image_id).await? {
                return Ok(Some(inspect));
            }
        }

        let by_name = self.engine.inspect_image(&spec.name).await?;
        if let Some(inspect) = &by_name {
            tracing::debug!(
                name = %spec.name,
                recorded = %record.image_id,
                current = %inspect.id,
                "Recorded image ID gone, found image by name"
            );
        }
        Ok(by_name)
    }

    /// Apply a change confined to mutable fields.
    ///
    /// The engine is not called; the record carries over unchanged and the
    /// caller stores it alongside the new spec.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::Timeout`] only if bookkeeping exceeds the update
    /// deadline.
    pub async fn update(
        &self,
        spec: &ImageSpec,
        record: &ImageRecord,
        changed: &[Field],
    ) -> BerthResult<ImageRecord> {
        self.supervisor
            .run(Operation::Update, spec.timeouts.update, None, async {
                tracing::info!(
                    name = %spec.name,
                    changed = ?changed,
                    "Updating in place"
                );
                Ok(record.clone())
            })
            .await
    }

    /// Remove the image, or just forget it when `keep_locally` is set.
    ///
    /// An image that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// - [`BerthError::EngineOperationFailed`] if the engine refuses, e.g.
    ///   the image is in use and `force_remove` is false
    /// - [`BerthError::Timeout`] if the delete deadline passes
    pub async fn delete(&self, spec: &ImageSpec, record: &ImageRecord) -> BerthResult<()> {
        if spec.keep_locally {
            tracing::info!(
                name = %spec.name,
                image_id = %record.image_id,
                "Keeping image locally"
            );
            return Ok(());
        }

        self.supervisor
            .run(
                Operation::Delete,
                spec.timeouts.delete,
                None,
                self.remove(spec, record),
            )
            .await
    }

    async fn remove(&self, spec: &ImageSpec, record: &ImageRecord) -> BerthResult<()> {
        let by_name = self.engine.inspect_image(&spec.name).await?;
        let target = match by_name {
            Some(inspect) if record.image_id.is_empty() || inspect.id == record.image_id => {
                spec.name.as_str()
            }
            _ if record.image_id.is_empty() => {
                tracing::debug!(name = %spec.name, "Image already absent");
                return Ok(());
            }
            _ => {
                if self.engine.inspect_image(&record.image_id).await?.is_none() {
                    tracing::debug!(image_id = %record.image_id, "Image already absent");
                    return Ok(());
                }
                record.image_id.as_str()
            }
        };

        tracing::info!(
            reference = target,
            force = spec.force_remove,
            "Removing image"
        );
        self.engine.remove_image(target, spec.force_remove).await
    }

    /// Execute a plan.
    ///
    /// `prior` is the recorded spec and record, `desired` the new spec.
    /// Returns the record to store, or `None` when the resource is gone.
    /// Replacement deletes first; if that fails nothing is created. If the
    /// create fails instead, the error is marked `prior_deleted`.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error, or [`BerthError::Internal`] if the
    /// plan does not fit the inputs.
    pub async fn apply(
        &self,
        plan: &Plan,
        prior: Option<(&ImageSpec, &ImageRecord)>,
        desired: Option<&ImageSpec>,
    ) -> Result<Option<ImageRecord>, ApplyError> {
        match (plan, prior, desired) {
            (Plan::NoOp, prior, _) => Ok(prior.map(|(_, record)| record.clone())),
            (Plan::Create, _, Some(desired)) => Ok(Some(self.create(desired).await?)),
            (Plan::UpdateInPlace { changed }, Some((_, record)), Some(desired)) => {
                Ok(Some(self.update(desired, record, changed).await?))
            }
            (Plan::Replace { reasons }, Some((old, record)), Some(desired)) => {
                tracing::info!(name = %desired.name, reasons = ?reasons, "Replacing image");
                self.delete(old, record).await?;
                self.create(desired)
                    .await
                    .map(Some)
                    .map_err(|error| ApplyError {
                        error,
                        prior_deleted: true,
                    })
            }
            (Plan::Delete, Some((old, record)), _) => {
                self.delete(old, record).await?;
                Ok(None)
            }
            (plan, prior, desired) => Err(BerthError::Internal {
                message: format!(
                    "cannot {plan} with recorded={} desired={}",
                    prior.is_some(),
                    desired.is_some()
                ),
            }
            .into()),
        }
    }
}
