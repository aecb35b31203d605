//! Access-control documents derived from a role and a set of departments.
//! No I/O here; adapters ship these documents and reconcilers compare by name.

use serde::{Deserialize, Serialize};

use crate::naming::{self, Department};

pub const POLICY_VERSION: &str = "2012-10-17";

const READ_ONLY_ACTIONS: &[&str] = &["s3:GetBucketLocation", "s3:ListBucket", "s3:GetObject"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum UserRole {
    #[value(name = "user", alias = "regular")]
    RegularUser,
    #[value(name = "editor")]
    Editor,
}

impl UserRole {
    pub const ALL: [UserRole; 2] = [UserRole::RegularUser, UserRole::Editor];

    pub fn suffix(&self) -> &'static str {
        match self {
            UserRole::RegularUser => "user",
            UserRole::Editor => "editor",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: String,
    pub action: Vec<String>,
    pub effect: Effect,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoragePolicy {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl StoragePolicy {
    /// Canonical JSON rendering; stable for identical inputs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A named policy as shipped to the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPolicy {
    pub name: String,
    pub document: StoragePolicy,
}

fn arn(path: &str) -> String {
    format!("arn:aws:s3:::{path}")
}

/// Storage policy for `role` over every department in `departments`.
///
/// Departments are sorted and de-duplicated first, so any permutation of the same
/// set produces an identical document.
pub fn storage_policy(role: UserRole, departments: &[Department]) -> NamedPolicy {
    let departments = naming::canonical_departments(departments);
    let sid = naming::policy_sid_prefix(role, &departments);

    let mut deny_delete = vec![arn(naming::DOMINODE_STAGING_BUCKET)];
    let mut full_access = Vec::new();
    for d in &departments {
        deny_delete.push(arn(&naming::staging_bucket(d)));
        full_access.push(arn(&format!("{}/*", naming::staging_bucket(d))));
        full_access.push(arn(&format!("{}*", naming::staging_root_dir(d))));
        match role {
            UserRole::RegularUser => {}
            UserRole::Editor => full_access.push(arn(&format!("{}*", naming::public_root_dir(d)))),
        }
    }

    let document = StoragePolicy {
        version: POLICY_VERSION.to_string(),
        statement: vec![
            Statement {
                sid: format!("{sid}-deny-bucket-delete"),
                action: vec!["s3:DeleteBucket".to_string()],
                effect: Effect::Deny,
                resource: deny_delete,
            },
            Statement {
                sid: format!("{sid}-full-access"),
                action: vec!["s3:*".to_string()],
                effect: Effect::Allow,
                resource: full_access,
            },
            Statement {
                sid: format!("{sid}-read-only"),
                action: READ_ONLY_ACTIONS.iter().map(|a| a.to_string()).collect(),
                effect: Effect::Allow,
                resource: vec![
                    arn(&format!("{}/*", naming::DOMINODE_STAGING_BUCKET)),
                    arn(&format!("{}/*", naming::PUBLIC_BUCKET)),
                ],
            },
        ],
    };
    NamedPolicy { name: naming::policy_name(role, &departments), document }
}

// ---- GeoFence rules ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdminAccess {
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRule {
    pub priority: i64,
    pub role_name: String,
    pub workspace: String,
    pub access: AdminAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRule {
    pub role_name: String,
    pub workspace: String,
    pub access: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GisRules {
    pub admin: AdminRule,
    pub data: Option<DataRule>,
}

/// GeoFence rules granting `role` access to the department workspace.
pub fn gis_rules(department: &Department, role: UserRole) -> GisRules {
    let role_name = naming::geofence_role_name(department);
    let workspace = naming::workspace_name(department);
    let access = match role {
        UserRole::Editor => AdminAccess::Admin,
        UserRole::RegularUser => AdminAccess::User,
    };
    let data = match role {
        UserRole::Editor => Some(DataRule {
            role_name: role_name.clone(),
            workspace: workspace.clone(),
            access: "ALLOW".to_string(),
        }),
        UserRole::RegularUser => None,
    };
    GisRules { admin: AdminRule { priority: 0, role_name, workspace, access }, data }
}
