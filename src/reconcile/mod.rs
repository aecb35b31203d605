//! Per-backend reconcilers.
//!
//! A reconciler walks the fixed step sequence for one backend (check, create
//! principals, create resources, grant, attach) and records every step in a
//! [`Report`]. The first failing step stops the walk; its error is wrapped with the
//! backend, scope, resource kind and name.

pub mod database;
pub mod gis;
pub mod storage;

use std::future::Future;

use tracing::{debug, info, warn};

use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::outcome::{Applied, Report, ResourceState};

pub use database::DatabaseReconciler;
pub use gis::GisReconciler;
pub use storage::StorageReconciler;

/// Records step outcomes for one (backend, scope) pair.
pub struct StepRecorder<'r> {
    backend: Backend,
    scope: String,
    report: &'r mut Report,
}

impl<'r> StepRecorder<'r> {
    pub fn new(backend: Backend, scope: impl Into<String>, report: &'r mut Report) -> Self {
        StepRecorder { backend, scope: scope.into(), report }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn step<F>(&mut self, kind: &str, name: &str, fut: F) -> BootstrapResult<Applied>
    where
        F: Future<Output = BootstrapResult<Applied>>,
    {
        match fut.await {
            Ok(applied) => {
                let state = ResourceState::begin(!applied.is_mutation()).finish(true);
                match applied {
                    Applied::Created => {
                        info!(target: "dominode::reconcile", "[{}/{}] created {kind} {name}", self.backend, self.scope)
                    }
                    Applied::Skipped => info!(
                        target: "dominode::reconcile",
                        "[{}/{}] {kind} {name} already present, skipping", self.backend, self.scope
                    ),
                    Applied::Ensured => {
                        info!(target: "dominode::reconcile", "[{}/{}] ensured {kind} {name}", self.backend, self.scope)
                    }
                }
                debug!(target: "dominode::reconcile", "{kind} {name} -> {state:?}");
                self.report.record(self.backend, &self.scope, kind, name, applied);
                Ok(applied)
            }
            Err(e) => {
                let state = ResourceState::Absent.finish(false);
                warn!(target: "dominode::reconcile", "[{}/{}] {kind} {name} -> {state:?}: {e}", self.backend, self.scope);
                Err(e.in_step(self.backend, &self.scope, kind, name))
            }
        }
    }

    /// Wrap a failure that happened outside of any `ensure_*` call.
    pub fn fail(&self, kind: &str, name: &str, err: BootstrapError) -> BootstrapError {
        err.in_step(self.backend, &self.scope, kind, name)
    }
}
