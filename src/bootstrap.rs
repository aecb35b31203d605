//! Whole-deployment orchestration across the three backends.

use tracing::{error, info};

use crate::config::Settings;
use crate::db::DatabaseAdmin;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::gis::{GeoNodeAdmin, GeoServerAdmin};
use crate::minio::StorageAdmin;
use crate::naming::Department;
use crate::outcome::Report;
use crate::reconcile::{DatabaseReconciler, GisReconciler, StorageReconciler};

/// Report of a run plus the error that stopped it, if any.
#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,
    pub error: Option<BootstrapError>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> BootstrapResult<Report> {
        match self.error {
            None => Ok(self.report),
            Some(e) => Err(e),
        }
    }
}

/// Runs the per-backend reconcilers in the fixed order database, storage, GIS.
pub struct Bootstrapper<'a, A, S, N, G> {
    settings: &'a Settings,
    db: &'a A,
    storage: &'a S,
    geonode: &'a N,
    geoserver: &'a G,
}

impl<'a, A, S, N, G> Bootstrapper<'a, A, S, N, G>
where
    A: DatabaseAdmin,
    S: StorageAdmin,
    N: GeoNodeAdmin,
    G: GeoServerAdmin,
{
    pub fn new(settings: &'a Settings, db: &'a A, storage: &'a S, geonode: &'a N, geoserver: &'a G) -> Self {
        Bootstrapper { settings, db, storage, geonode, geoserver }
    }

    /// Bootstrap every configured department on every backend.
    pub async fn bootstrap(&self) -> RunSummary {
        let mut report = Report::new();
        let departments = match self.settings.departments() {
            Ok(d) => d,
            Err(e) => return RunSummary { report, error: Some(e) },
        };
        info!(
            target: "dominode::bootstrap",
            "bootstrapping departments: {}",
            departments.iter().map(Department::as_str).collect::<Vec<_>>().join(", ")
        );
        for backend in Backend::ORDERED {
            let result = match backend {
                Backend::Database => {
                    DatabaseReconciler::new(self.db, self.settings).bootstrap(&departments, &mut report).await
                }
                Backend::Storage => StorageReconciler::new(self.storage).bootstrap(&departments, &mut report).await,
                Backend::Gis => {
                    GisReconciler::new(self.geonode, self.geoserver, self.settings)
                        .bootstrap(&departments, &mut report)
                        .await
                }
            };
            if let Err(e) = result {
                error!(target: "dominode::bootstrap", "{backend} bootstrap failed: {e}");
                return RunSummary { report, error: Some(e) };
            }
            log_already_bootstrapped(backend, &departments, &report);
        }
        info!(
            target: "dominode::bootstrap",
            "bootstrap finished: {} steps, {} created", report.steps.len(), report.mutations()
        );
        RunSummary { report, error: None }
    }

    /// Bootstrap one department on every backend.
    pub async fn add_department(&self, department: &Department) -> RunSummary {
        let mut report = Report::new();
        let single = std::slice::from_ref(department);
        for backend in Backend::ORDERED {
            let result = match backend {
                Backend::Database => {
                    DatabaseReconciler::new(self.db, self.settings).add_department(department, &mut report).await
                }
                Backend::Storage => StorageReconciler::new(self.storage).add_department(department, &mut report).await,
                Backend::Gis => {
                    GisReconciler::new(self.geonode, self.geoserver, self.settings)
                        .add_department(department, &mut report)
                        .await
                }
            };
            if let Err(e) = result {
                error!(target: "dominode::bootstrap", "{backend} failed for department {department}: {e}");
                return RunSummary { report, error: Some(e) };
            }
            log_already_bootstrapped(backend, single, &report);
        }
        RunSummary { report, error: None }
    }
}

pub fn log_already_bootstrapped(backend: Backend, departments: &[Department], report: &Report) {
    for d in departments {
        if report.fully_provisioned(backend, d.as_str()) {
            info!(target: "dominode::bootstrap", "department {d} has already been bootstrapped in {backend}");
        }
    }
}
