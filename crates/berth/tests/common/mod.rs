//! In-memory engine that records every call.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use berth::{EngineClient, ImageInspect};
use berth_common::{BerthError, BerthResult};
use berth_image::EngineBuildRequest;
use parking_lot::Mutex;

/// One engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull { name: String, platform: String },
    Build { tags: Vec<String>, build_id: Option<String> },
    Inspect(String),
    Remove { reference: String, force: bool },
    Cancel(String),
}

impl Call {
    /// Whether this call changes engine state.
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Pull { .. } | Self::Build { .. } | Self::Remove { .. })
    }
}

#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<BTreeMap<String, ImageInspect>>,
    in_use: Mutex<BTreeSet<String>>,
    unreadable: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<Call>>,
    build_delay: Mutex<Option<Duration>>,
    next_id: Mutex<u32>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls that would change engine state.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make the next builds take `delay`.
    pub fn delay_builds(&self, delay: Duration) {
        *self.build_delay.lock() = Some(delay);
    }

    /// Put an image in the engine without recording a call.
    pub fn seed(&self, name: &str) -> ImageInspect {
        let inspect = ImageInspect {
            id: self.fresh_id(),
            repo_digests: vec![format!("{}@sha256:{:0>64}", repository(name), 7)],
        };
        let mut images = self.images.lock();
        images.insert(name.to_string(), inspect.clone());
        images.insert(inspect.id.clone(), inspect.clone());
        inspect
    }

    /// Pretend a running container uses `image_id`.
    pub fn mark_in_use(&self, image_id: &str) {
        self.in_use.lock().insert(image_id.to_string());
    }

    /// Make every inspect of `reference` fail.
    pub fn fail_inspect(&self, reference: &str) {
        self.unreadable.lock().insert(reference.to_string());
    }

    /// Remove an image behind the reconciler's back.
    pub fn forget(&self, image_id: &str) {
        self.images.lock().retain(|_, inspect| inspect.id != image_id);
    }

    pub fn has(&self, reference: &str) -> bool {
        self.images.lock().contains_key(reference)
    }

    fn fresh_id(&self) -> String {
        let mut next = self.next_id.lock();
        *next += 1;
        format!("sha256:{:0>64x}", *next)
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

fn repository(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) if !name[i..].contains('/') => &name[..i],
        _ => name,
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn pull_image(&self, name: &str, platform: &str) -> BerthResult<ImageInspect> {
        self.record(Call::Pull {
            name: name.to_string(),
            platform: platform.to_string(),
        });
        if name.starts_with("missing/") {
            return Err(BerthError::engine(
                "pull",
                format!("pull access denied for {name}, repository does not exist"),
            ));
        }
        Ok(self.seed(name))
    }

    async fn build_image(&self, request: &EngineBuildRequest) -> BerthResult<ImageInspect> {
        self.record(Call::Build {
            tags: request.tags.clone(),
            build_id: request.build_id.clone(),
        });

        let delay = *self.build_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inspect = ImageInspect {
            id: self.fresh_id(),
            repo_digests: Vec::new(),
        };
        let mut images = self.images.lock();
        for tag in &request.tags {
            images.insert(tag.clone(), inspect.clone());
        }
        images.insert(inspect.id.clone(), inspect.clone());
        Ok(inspect)
    }

    async fn inspect_image(&self, reference: &str) -> BerthResult<Option<ImageInspect>> {
        self.record(Call::Inspect(reference.to_string()));
        if self.unreadable.lock().contains(reference) {
            return Err(BerthError::engine(
                "inspect",
                "Error response from daemon: i/o timeout",
            ));
        }
        Ok(self.images.lock().get(reference).cloned())
    }

    async fn remove_image(&self, reference: &str, force: bool) -> BerthResult<()> {
        self.record(Call::Remove {
            reference: reference.to_string(),
            force,
        });

        let Some(inspect) = self.images.lock().get(reference).cloned() else {
            return Err(BerthError::engine(
                "remove",
                format!("Error: No such image: {reference}"),
            ));
        };
        if !force && self.in_use.lock().contains(&inspect.id) {
            return Err(BerthError::engine(
                "remove",
                format!(
                    "conflict: unable to remove repository reference \"{reference}\" (must force) - image is being used by running container"
                ),
            ));
        }

        self.forget(&inspect.id);
        Ok(())
    }

    async fn cancel_build(&self, build_id: &str) -> BerthResult<()> {
        self.record(Call::Cancel(build_id.to_string()));
        Ok(())
    }
}
