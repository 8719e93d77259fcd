//! Whole-manifest reconciliation over the record store.

use std::collections::{BTreeMap, BTreeSet};

use berth_common::{BerthError, BerthResult, ResourceId};
use berth_image::ImageSpec;
use serde::Serialize;

use crate::engine::EngineClient;
use crate::plan::{Plan, plan};
use crate::reconciler::Reconciler;
use crate::state::{RecordStore, StoredResource};

/// Result of refreshing one recorded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refreshed {
    /// The engine still reports the recorded attributes.
    Unchanged,
    /// Image ID or repo digest changed and the record was rewritten.
    Updated,
    /// The image is gone and the record was dropped.
    Drifted,
}

/// Result of [`Session::refresh`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Resources the engine answered for.
    pub refreshed: Vec<(ResourceId, Refreshed)>,
    /// Resources whose read failed; their records are untouched.
    pub failed: Vec<(ResourceId, BerthError)>,
}

/// Planned action for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Resource address.
    pub address: ResourceId,
    /// What will happen.
    pub plan: Plan,
}

/// Result of applying one change.
#[derive(Debug)]
pub struct Outcome {
    /// Resource address.
    pub address: ResourceId,
    /// What was attempted.
    pub plan: Plan,
    /// Why it failed, if it did. The record is untouched on failure unless
    /// the old image was already removed.
    pub error: Option<BerthError>,
}

/// Reconciles a set of desired specs against recorded state.
pub struct Session<'a, E: EngineClient + ?Sized> {
    store: RecordStore,
    reconciler: Reconciler<'a, E>,
}

impl<'a, E: EngineClient + ?Sized> Session<'a, E> {
    /// Create a session over `engine` and `store`.
    pub const fn new(engine: &'a E, store: RecordStore) -> Self {
        Self {
            store,
            reconciler: Reconciler::new(engine),
        }
    }

    /// The record store.
    pub const fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Read every recorded resource back from the engine.
    ///
    /// A failing read is reported for its address and does not stop the
    /// others.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub async fn refresh(&self) -> BerthResult<RefreshReport> {
        let mut report = RefreshReport::default();

        for address in self.store.list()? {
            let stored = self.store.load(&address)?;
            let read = match self.reconciler.read(&stored.spec, &stored.record).await {
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Refresh failed, keeping record");
                    report.failed.push((address, e));
                    continue;
                }
            };
            let refreshed = match read {
                Some(record) if record == stored.record => Refreshed::Unchanged,
                Some(record) => {
                    self.store
                        .save(&StoredResource::new(address.clone(), stored.spec, record))?;
                    Refreshed::Updated
                }
                None => {
                    tracing::warn!(address = %address, "Recorded image is gone, dropping record");
                    self.store.delete(&address)?;
                    Refreshed::Drifted
                }
            };
            report.refreshed.push((address, refreshed));
        }

        Ok(report)
    }

    /// Plan every address that is recorded, desired, or both.
    ///
    /// # Errors
    ///
    /// Returns an error if recorded state cannot be read.
    pub fn plan(&self, desired: &BTreeMap<ResourceId, ImageSpec>) -> BerthResult<Vec<Change>> {
        let addresses: BTreeSet<ResourceId> = self
            .store
            .list()?
            .into_iter()
            .chain(desired.keys().cloned())
            .collect();

        addresses
            .into_iter()
            .map(|address| {
                let prior = self.store.get(&address)?;
                let plan = plan(prior.as_ref().map(|p| &p.spec), desired.get(&address));
                Ok(Change { address, plan })
            })
            .collect()
    }

    /// Refresh, plan and execute. Recorded resources missing from `desired`
    /// are deleted.
    ///
    /// A failing resource does not stop the others; its error is reported in
    /// its [`Outcome`]. A resource whose refresh failed is not executed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn apply(&self, desired: &BTreeMap<ResourceId, ImageSpec>) -> BerthResult<Vec<Outcome>> {
        let mut unread: BTreeMap<ResourceId, BerthError> =
            self.refresh().await?.failed.into_iter().collect();

        let mut outcomes = Vec::new();
        for change in self.plan(desired)? {
            if let Some(error) = unread.remove(&change.address) {
                outcomes.push(Outcome {
                    address: change.address,
                    plan: change.plan,
                    error: Some(error),
                });
                continue;
            }
            if change.plan == Plan::NoOp {
                continue;
            }
            let error = self
                .execute(&change.address, &change.plan, desired.get(&change.address))
                .await?;
            outcomes.push(Outcome {
                address: change.address,
                plan: change.plan,
                error,
            });
        }

        Ok(outcomes)
    }

    /// Delete every recorded resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn destroy(&self) -> BerthResult<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        for address in self.store.list()? {
            let error = self.execute(&address, &Plan::Delete, None).await?;
            outcomes.push(Outcome {
                address,
                plan: Plan::Delete,
                error,
            });
        }
        Ok(outcomes)
    }

    /// Run one change. Step failures are returned as `Ok(Some(error))` with
    /// the record untouched, or dropped if the old image is already gone;
    /// store failures abort.
    async fn execute(
        &self,
        address: &ResourceId,
        plan: &Plan,
        desired: Option<&ImageSpec>,
    ) -> BerthResult<Option<BerthError>> {
        let prior = self.store.get(address)?;
        let result = self
            .reconciler
            .apply(plan, prior.as_ref().map(|p| (&p.spec, &p.record)), desired)
            .await;

        match (result, desired) {
            (Ok(Some(record)), Some(spec)) => {
                self.store
                    .save(&StoredResource::new(address.clone(), spec.clone(), record))?;
                tracing::info!(address = %address, action = %plan, "Applied");
                Ok(None)
            }
            (Ok(_), _) => {
                self.store.delete(address)?;
                tracing::info!(address = %address, action = %plan, "Applied");
                Ok(None)
            }
            (Err(failure), _) => {
                tracing::error!(address = %address, action = %plan, error = %failure.error, "Failed");
                if failure.prior_deleted {
                    tracing::warn!(address = %address, "Old image already removed, dropping record");
                    self.store.delete(address)?;
                }
                Ok(Some(failure.error))
            }
        }
    }
}
