//! Canonical names for everything the bootstrapper provisions.
//!
//! Every existence check in the reconcilers compares against names produced here, so
//! these functions must stay pure: the same department and role always map to the
//! same role, schema, bucket, workspace, policy and group names.

use std::fmt::{Display, Formatter};

use crate::error::BootstrapResult;
use crate::ident;
use crate::policy::UserRole;

pub const DOMINODE_STAGING_SCHEMA: &str = "dominode_staging";
pub const PUBLIC_SCHEMA: &str = "public";
pub const DOMINODE_STAGING_BUCKET: &str = "dominode-staging";
pub const PUBLIC_BUCKET: &str = "public";

pub const ADMIN_ROLE: &str = "admin";
pub const REPLICATOR_ROLE: &str = "replicator";

pub const QGIS_PROJECTS_TABLE: &str = "qgis_projects";

pub const TOPOMAP_DEPARTMENT: &str = "lsd";
pub const TOPOMAP_EDITOR_ROLE: &str = "lsd_topomap_editor";
pub const TOPOMAP_SCHEMA: &str = "lsd_topomaps";

pub const INTERNAL_GEONODE_GROUP: &str = "dominode-internal";
pub const EDITOR_GROUP_CATEGORY: &str = "dominode-editor";

/// Stem used when a policy covers no department at all.
const EMPTY_SET_STEM: &str = "dominode";

/// A validated department token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Department(String);

impl Department {
    pub fn parse(raw: &str) -> BootstrapResult<Self> {
        let name = ident::normalize_token(raw);
        ident::validate_department(&name)?;
        Ok(Department(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_topomap_owner(&self) -> bool {
        self.0 == TOPOMAP_DEPARTMENT
    }
}

impl Display for Department {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Department {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sort and de-duplicate a department list.
pub fn canonical_departments(departments: &[Department]) -> Vec<Department> {
    let mut out = departments.to_vec();
    out.sort();
    out.dedup();
    out
}

pub fn parse_departments<S: AsRef<str>>(raw: &[S]) -> BootstrapResult<Vec<Department>> {
    raw.iter().map(|d| Department::parse(d.as_ref())).collect()
}

// ---- database ----

pub fn user_role_name(d: &Department) -> String {
    format!("{d}_user")
}

pub fn editor_role_name(d: &Department) -> String {
    format!("{d}_editor")
}

pub fn department_role_name(d: &Department, role: UserRole) -> String {
    match role {
        UserRole::RegularUser => user_role_name(d),
        UserRole::Editor => editor_role_name(d),
    }
}

pub fn staging_schema(d: &Department) -> String {
    format!("{d}_staging")
}

pub fn geoserver_db_user(d: &Department) -> String {
    format!("{d}_geoserver")
}

// ---- object storage ----

pub fn staging_bucket(d: &Department) -> String {
    format!("{d}-staging")
}

pub fn staging_root_dir(d: &Department) -> String {
    format!("{DOMINODE_STAGING_BUCKET}/{d}/")
}

pub fn public_root_dir(d: &Department) -> String {
    format!("{PUBLIC_BUCKET}/{d}/")
}

fn department_stem(departments: &[Department]) -> String {
    let canonical = canonical_departments(departments);
    if canonical.is_empty() {
        return EMPTY_SET_STEM.to_string();
    }
    canonical.iter().map(Department::as_str).collect::<Vec<_>>().join("-")
}

pub fn policy_name(role: UserRole, departments: &[Department]) -> String {
    format!("{}-{}-group-policy", department_stem(departments), role.suffix())
}

pub fn group_name(role: UserRole, departments: &[Department]) -> String {
    format!("{}-{}-group", department_stem(departments), role.suffix())
}

/// Prefix for statement ids inside a storage policy document.
pub fn policy_sid_prefix(role: UserRole, departments: &[Department]) -> String {
    format!("{}-{}", department_stem(departments), role.suffix())
}

// ---- GIS ----

pub fn workspace_name(d: &Department) -> String {
    d.to_string()
}

pub fn datastore_name(d: &Department) -> String {
    format!("dominode_db_{d}")
}

pub fn geonode_group_name(d: &Department) -> String {
    format!("{d}-editor")
}

pub fn geoserver_group_name(d: &Department) -> String {
    geonode_group_name(d).to_uppercase()
}

pub fn geofence_role_name(d: &Department) -> String {
    format!("ROLE_{}", geoserver_group_name(d))
}
