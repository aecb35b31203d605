//! GIS adapters: GeoServer over its REST API and GeoNode through a browser-like session.

pub mod geonode;
pub mod geoserver;

use serde::Deserialize;
use tracing::debug;

use crate::db::Password;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::outcome::Applied;
use crate::policy::{AdminRule, DataRule};

pub use geonode::GeoNodeSession;
pub use geoserver::GeoServerClient;

/// A GeoFence rule as listed by GeoServer; only the fields used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
}

impl RuleSummary {
    pub fn matches(&self, role_name: &str, workspace: &str) -> bool {
        self.role_name.as_deref() == Some(role_name) && self.workspace.as_deref() == Some(workspace)
    }
}

/// Connection parameters of a PostGIS datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgisStore {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Password,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupCategory {
    pub id: i64,
    pub name: String,
}

#[allow(async_fn_in_trait)]
pub trait GeoServerAdmin {
    async fn list_workspaces(&self) -> BootstrapResult<Vec<String>>;

    async fn create_workspace(&self, name: &str) -> BootstrapResult<()>;

    async fn list_datastores(&self, workspace: &str) -> BootstrapResult<Vec<String>>;

    async fn create_postgis_datastore(&self, workspace: &str, store: &PostgisStore) -> BootstrapResult<()>;

    async fn list_admin_rules(&self) -> BootstrapResult<Vec<RuleSummary>>;

    async fn create_admin_rule(&self, rule: &AdminRule) -> BootstrapResult<()>;

    async fn list_data_rules(&self) -> BootstrapResult<Vec<RuleSummary>>;

    async fn create_data_rule(&self, rule: &DataRule) -> BootstrapResult<()>;

    async fn ensure_workspace(&self, name: &str) -> BootstrapResult<Applied> {
        if self.list_workspaces().await?.iter().any(|w| w == name) {
            debug!(target: "dominode::gis", "workspace {name} already exists");
            return Ok(Applied::Skipped);
        }
        self.create_workspace(name).await?;
        Ok(Applied::Created)
    }

    async fn ensure_datastore(&self, workspace: &str, store: &PostgisStore) -> BootstrapResult<Applied> {
        if self.list_datastores(workspace).await?.iter().any(|s| *s == store.name) {
            debug!(target: "dominode::gis", "datastore {workspace}:{} already exists", store.name);
            return Ok(Applied::Skipped);
        }
        self.create_postgis_datastore(workspace, store).await?;
        Ok(Applied::Created)
    }

    async fn ensure_admin_rule(&self, rule: &AdminRule) -> BootstrapResult<Applied> {
        if self.list_admin_rules().await?.iter().any(|r| r.matches(&rule.role_name, &rule.workspace)) {
            return Ok(Applied::Skipped);
        }
        self.create_admin_rule(rule).await?;
        Ok(Applied::Created)
    }

    async fn ensure_data_rule(&self, rule: &DataRule) -> BootstrapResult<Applied> {
        if self.list_data_rules().await?.iter().any(|r| r.matches(&rule.role_name, &rule.workspace)) {
            return Ok(Applied::Skipped);
        }
        self.create_data_rule(rule).await?;
        Ok(Applied::Created)
    }
}

#[allow(async_fn_in_trait)]
pub trait GeoNodeAdmin {
    async fn login(&self) -> BootstrapResult<()>;

    async fn logout(&self) -> BootstrapResult<()>;

    async fn list_group_profiles(&self) -> BootstrapResult<Vec<GroupProfile>>;

    async fn group_profile(&self, title: &str) -> BootstrapResult<Option<GroupProfile>>;

    async fn list_group_categories(&self) -> BootstrapResult<Vec<GroupCategory>>;

    async fn create_group_category(&self, name: &str, description: &str) -> BootstrapResult<()>;

    async fn create_group_profile(&self, title: &str, description: &str, category: Option<i64>)
        -> BootstrapResult<()>;

    async fn user_exists(&self, username: &str) -> BootstrapResult<bool>;

    async fn add_user(&self, username: &str, password: &str) -> BootstrapResult<()>;

    async fn add_user_to_group(&self, username: &str, group_slug: &str) -> BootstrapResult<()>;

    async fn find_group_category(&self, name: &str) -> BootstrapResult<Option<GroupCategory>> {
        Ok(self.list_group_categories().await?.into_iter().find(|c| c.name == name))
    }

    /// Ensure the category exists and return it with its primary key.
    async fn ensure_group_category(&self, name: &str, description: &str) -> BootstrapResult<(Applied, GroupCategory)> {
        if let Some(existing) = self.find_group_category(name).await? {
            return Ok((Applied::Skipped, existing));
        }
        self.create_group_category(name, description).await?;
        match self.find_group_category(name).await? {
            Some(created) => Ok((Applied::Created, created)),
            None => Err(BootstrapError::rejected(
                Backend::Gis,
                "create group category",
                None,
                format!("category {name:?} is still missing after creation"),
            )),
        }
    }

    async fn ensure_group_profile(
        &self,
        title: &str,
        description: &str,
        category: Option<i64>,
    ) -> BootstrapResult<Applied> {
        if self.list_group_profiles().await?.iter().any(|g| g.title == title) {
            debug!(target: "dominode::gis", "group {title} already exists");
            return Ok(Applied::Skipped);
        }
        self.create_group_profile(title, description, category).await?;
        if self.group_profile(title).await?.is_none() {
            return Err(BootstrapError::rejected(
                Backend::Gis,
                "create group",
                None,
                format!("group {title:?} is still missing after creation"),
            ));
        }
        Ok(Applied::Created)
    }

    /// Existing users keep their password.
    async fn ensure_user(&self, username: &str, password: &str) -> BootstrapResult<Applied> {
        if self.user_exists(username).await? {
            debug!(target: "dominode::gis", "user {username} already exists");
            return Ok(Applied::Skipped);
        }
        self.add_user(username, password).await?;
        if !self.user_exists(username).await? {
            return Err(BootstrapError::rejected(
                Backend::Gis,
                "add user",
                None,
                format!("user {username:?} is still missing after creation"),
            ));
        }
        Ok(Applied::Created)
    }

    /// GeoNode ignores members that are already in the group.
    async fn ensure_group_member(&self, username: &str, group: &GroupProfile) -> BootstrapResult<Applied> {
        self.add_user_to_group(username, &group.slug).await?;
        Ok(Applied::Ensured)
    }
}
