//! Deadlines and cancellation for reconciliation steps.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use berth_common::{BerthError, BerthResult};

use crate::engine::EngineClient;

/// How long a best-effort cancel request may take after a timeout.
pub const CANCEL_GRACE: Duration = Duration::from_secs(30);

/// A reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Build or pull.
    Create,
    /// Refresh from the engine.
    Read,
    /// In-place bookkeeping update.
    Update,
    /// Remove or forget.
    Delete,
}

impl Operation {
    /// Lowercase name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one step inside a bounded-duration scope.
///
/// On expiry the step's future is dropped, which aborts the in-flight engine
/// call, and the step fails with [`BerthError::Timeout`]. The supervisor never
/// generates build IDs; it only forwards a caller-supplied one to
/// [`EngineClient::cancel_build`].
pub struct Supervisor<'a, E: EngineClient + ?Sized> {
    engine: &'a E,
}

impl<'a, E: EngineClient + ?Sized> Supervisor<'a, E> {
    /// Create a supervisor borrowing `engine` for cancel requests.
    pub const fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Run `step` with `deadline`.
    ///
    /// # Errors
    ///
    /// Returns the step's own error, or [`BerthError::Timeout`] if it did not
    /// finish in time.
    pub async fn run<T, F>(
        &self,
        operation: Operation,
        deadline: Duration,
        build_id: Option<&str>,
        step: F,
    ) -> BerthResult<T>
    where
        F: Future<Output = BerthResult<T>>,
    {
        if let Ok(result) = tokio::time::timeout(deadline, step).await {
            return result;
        }

        tracing::warn!(
            operation = %operation,
            timeout_secs = deadline.as_secs(),
            "Operation timed out, cancelling"
        );

        if let Some(build_id) = build_id {
            self.cancel(build_id).await;
        }

        Err(BerthError::Timeout {
            operation: operation.to_string(),
            after: deadline,
        })
    }

    async fn cancel(&self, build_id: &str) {
        match tokio::time::timeout(CANCEL_GRACE, self.engine.cancel_build(build_id)).await {
            Ok(Ok(())) => tracing::info!(build_id, "Cancelled build"),
            Ok(Err(e)) => tracing::warn!(build_id, error = %e, "Failed to cancel build"),
            Err(_) => tracing::warn!(build_id, "Cancel request timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use berth_common::ErrorKind;
    use berth_image::EngineBuildRequest;

    use super::*;
    use crate::engine::ImageInspect;

    #[derive(Default)]
    struct CancelRecorder {
        cancelled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EngineClient for CancelRecorder {
        async fn pull_image(&self, _: &str, _: &str) -> BerthResult<ImageInspect> {
            unreachable!()
        }
        async fn build_image(&self, _: &EngineBuildRequest) -> BerthResult<ImageInspect> {
            unreachable!()
        }
        async fn inspect_image(&self, _: &str) -> BerthResult<Option<ImageInspect>> {
            unreachable!()
        }
        async fn remove_image(&self, _: &str, _: bool) -> BerthResult<()> {
            unreachable!()
        }
        async fn cancel_build(&self, build_id: &str) -> BerthResult<()> {
            self.cancelled.lock().unwrap().push(build_id.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_deadline() {
        let engine = CancelRecorder::default();
        let supervisor = Supervisor::new(&engine);

        let value = supervisor
            .run(Operation::Create, Duration::from_secs(5), None, async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn step_error_passes_through() {
        let engine = CancelRecorder::default();
        let supervisor = Supervisor::new(&engine);

        let err = supervisor
            .run::<(), _>(Operation::Delete, Duration::from_secs(5), None, async {
                Err(BerthError::engine("remove", "conflict"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineOperationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_build() {
        let engine = CancelRecorder::default();
        let supervisor = Supervisor::new(&engine);

        let err = supervisor
            .run::<(), _>(
                Operation::Create,
                Duration::from_secs(60),
                Some("build-42"),
                std::future::pending(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BerthError::Timeout { ref operation, after } if operation == "create" && after == Duration::from_secs(60)
        ));
        assert_eq!(*engine.cancelled.lock().unwrap(), vec!["build-42".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_build_id_skips_cancel() {
        let engine = CancelRecorder::default();
        let supervisor = Supervisor::new(&engine);

        let err = supervisor
            .run::<(), _>(
                Operation::Delete,
                Duration::from_secs(1),
                None,
                std::future::pending(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(engine.cancelled.lock().unwrap().is_empty());
    }
}
