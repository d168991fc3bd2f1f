// Ordered deletion sagas - no compensation, every step idempotent
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;

use crate::error::{EngineError, EngineResult};
use crate::store::StoreError;

type StepFn = Box<dyn FnOnce() -> BoxFuture<'static, EngineResult<()>> + Send>;

/// A named sequence of dependent writes, children before parents.
///
/// Step N+1 starts only after step N's completion is observed. A failing step
/// stops the cascade and nothing after it runs; because each step is a no-op
/// on an empty target set, the whole cascade can be re-run from the start.
pub struct Cascade {
    name: String,
    steps: Vec<(&'static str, StepFn)>,
}

impl Cascade {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step<F, Fut>(mut self, name: &'static str, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = EngineResult<()>> + Send + 'static,
    {
        self.steps.push((name, Box::new(move || f().boxed())));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the steps in order on the current task.
    pub async fn run(self) -> EngineResult<()> {
        let Cascade { name, steps } = self;
        let total = steps.len();

        for (completed, (step, f)) in steps.into_iter().enumerate() {
            tracing::debug!("{}: step {}/{} '{}'", name, completed + 1, total, step);
            if let Err(e) = f().await {
                tracing::error!("{}: step '{}' failed: {}", name, step, e);
                return Err(EngineError::PartialCascadeFailure {
                    cascade: name,
                    step,
                    completed,
                    source: Box::new(e),
                });
            }
        }

        tracing::info!("{}: completed {} step(s)", name, total);
        Ok(())
    }

    /// Run as a detached task so a started cascade finishes even if the
    /// caller stops waiting for it.
    pub async fn run_to_completion(self) -> EngineResult<()> {
        tokio::spawn(self.run())
            .await
            .map_err(StoreError::from)?
    }
}
