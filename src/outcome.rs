//! Structured results of provisioning steps.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::error::Backend;

/// What an adapter did for one `ensure_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    /// State was missing and has been written (created, granted, revoked, attached).
    Created,
    /// State was already present; nothing was sent to the backend.
    Skipped,
    /// The backend call is idempotent on its own and was issued unconditionally.
    Ensured,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Created => "created",
            Applied::Skipped => "skipped",
            Applied::Ensured => "ensured",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Applied::Created)
    }
}

impl Display for Applied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one provisioned resource during a run.
///
/// `Absent -> Creating -> Present` or `Absent -> Failed`. There is no update state:
/// a present resource is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Creating,
    Present,
    Failed,
}

impl ResourceState {
    pub fn begin(exists: bool) -> Self {
        if exists { ResourceState::Present } else { ResourceState::Creating }
    }

    pub fn finish(self, ok: bool) -> Self {
        match (self, ok) {
            (ResourceState::Creating, true) => ResourceState::Present,
            (ResourceState::Creating, false) | (ResourceState::Absent, false) => ResourceState::Failed,
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceState::Present | ResourceState::Failed)
    }
}

/// One reported step of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub backend: Backend,
    /// Department name, the account name for user additions, or `system` for
    /// deployment-wide resources.
    pub scope: String,
    pub kind: String,
    pub name: String,
    pub applied: Applied,
}

impl Serialize for Backend {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub const SYSTEM_SCOPE: &str = "system";

/// Ordered list of step outcomes for one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, backend: Backend, scope: &str, kind: &str, name: &str, applied: Applied) {
        self.steps.push(StepOutcome {
            backend,
            scope: scope.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            applied,
        });
    }

    pub fn extend(&mut self, other: Report) {
        self.steps.extend(other.steps);
    }

    pub fn count(&self, applied: Applied) -> usize {
        self.steps.iter().filter(|s| s.applied == applied).count()
    }

    pub fn mutations(&self) -> usize {
        self.count(Applied::Created)
    }

    pub fn scoped<'a>(&'a self, backend: Backend, scope: &'a str) -> impl Iterator<Item = &'a StepOutcome> + 'a {
        self.steps.iter().filter(move |s| s.backend == backend && s.scope == scope)
    }

    /// True when every recorded step for the pair found its state already present.
    pub fn fully_provisioned(&self, backend: Backend, scope: &str) -> bool {
        let mut any = false;
        for step in self.scoped(backend, scope) {
            any = true;
            if step.applied.is_mutation() {
                return false;
            }
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        assert_eq!(ResourceState::begin(true), ResourceState::Present);
        assert_eq!(ResourceState::begin(false).finish(true), ResourceState::Present);
        assert_eq!(ResourceState::begin(false).finish(false), ResourceState::Failed);
        assert_eq!(ResourceState::Absent.finish(false), ResourceState::Failed);
        assert_eq!(ResourceState::Present.finish(false), ResourceState::Present);
        assert!(!ResourceState::Creating.is_terminal());
        assert!(ResourceState::Failed.is_terminal());
    }

    #[test]
    fn report_counts_and_scopes() {
        let mut r = Report::new();
        r.record(Backend::Database, "lsd", "role", "lsd_user", Applied::Skipped);
        r.record(Backend::Database, "lsd", "schema", "lsd_staging", Applied::Skipped);
        r.record(Backend::Storage, "lsd", "bucket", "lsd-staging", Applied::Ensured);
        r.record(Backend::Database, "ppd", "role", "ppd_user", Applied::Created);
        assert_eq!(r.mutations(), 1);
        assert_eq!(r.count(Applied::Skipped), 2);
        assert!(r.fully_provisioned(Backend::Database, "lsd"));
        assert!(r.fully_provisioned(Backend::Storage, "lsd"));
        assert!(!r.fully_provisioned(Backend::Database, "ppd"));
        assert!(!r.fully_provisioned(Backend::Gis, "ppd"));
    }

    #[test]
    fn report_serializes_to_json() {
        let mut r = Report::new();
        r.record(Backend::Gis, "system", "category", "dominode-editor", Applied::Created);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["steps"][0]["backend"], "gis");
        assert_eq!(v["steps"][0]["applied"], "created");
    }
}
