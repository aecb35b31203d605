//! Provisioning for a DomiNode deployment.
//!
//! Every department gets the same set of resources in PostgreSQL, MinIO, GeoServer and
//! GeoNode. Each backend is reached through an adapter trait ([`db::DatabaseAdmin`],
//! [`minio::StorageAdmin`], [`gis::GeoServerAdmin`], [`gis::GeoNodeAdmin`]) whose
//! `ensure_*` methods check before they create, so every command can be re-run.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod gis;
pub mod ident;
pub mod minio;
pub mod naming;
pub mod outcome;
pub mod policy;
pub mod reconcile;

pub use bootstrap::{Bootstrapper, RunSummary};
pub use config::Settings;
pub use error::{Backend, BootstrapError, BootstrapResult};
pub use naming::Department;
pub use outcome::{Applied, Report};
pub use policy::UserRole;
