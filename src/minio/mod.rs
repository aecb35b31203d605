//! Object-storage adapter.
//!
//! `StorageAdmin` is the narrow surface the reconcilers talk to; `McClient` implements
//! it by driving the MinIO `mc` client in JSON mode.

pub mod mc;

use tracing::{debug, warn};

use crate::error::{BootstrapError, BootstrapResult};
use crate::outcome::Applied;
use crate::policy::NamedPolicy;

pub use mc::{McClient, PolicyTarget};

pub const MIN_SECRET_KEY_LEN: usize = 8;
pub const DOWNLOAD_PERMISSION: &str = "download";

const TEMP_USER_PREFIX: &str = "dominode-tmp-";

/// Members and attached policies of a storage group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub members: Vec<String>,
    pub policies: Vec<String>,
}

impl GroupInfo {
    pub fn has_member(&self, access_key: &str) -> bool {
        self.members.iter().any(|m| m == access_key)
    }

    pub fn has_policy(&self, policy: &str) -> bool {
        self.policies.iter().any(|p| p == policy)
    }
}

/// Throwaway credentials used to seed a group, which cannot be created empty.
#[derive(Clone)]
pub struct TempCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl TempCredentials {
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        TempCredentials {
            access_key: format!("{TEMP_USER_PREFIX}{}", &id[..12]),
            secret_key: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

impl std::fmt::Debug for TempCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempCredentials").field("access_key", &self.access_key).finish_non_exhaustive()
    }
}

pub fn validate_secret_key(secret_key: &str) -> BootstrapResult<()> {
    if secret_key.chars().count() < MIN_SECRET_KEY_LEN {
        return Err(BootstrapError::invalid(
            "secret key",
            "***",
            format!("must have at least {MIN_SECRET_KEY_LEN} characters"),
        ));
    }
    Ok(())
}

#[allow(async_fn_in_trait)]
pub trait StorageAdmin {
    /// Create a bucket or prefix; an existing one is not an error.
    async fn make_bucket(&self, path: &str) -> BootstrapResult<()>;

    async fn list_users(&self) -> BootstrapResult<Vec<String>>;

    async fn add_user(&self, access_key: &str, secret_key: &str) -> BootstrapResult<()>;

    async fn remove_user(&self, access_key: &str) -> BootstrapResult<()>;

    async fn list_groups(&self) -> BootstrapResult<Vec<String>>;

    async fn group_info(&self, group: &str) -> BootstrapResult<GroupInfo>;

    async fn add_group_members(&self, group: &str, members: &[String]) -> BootstrapResult<()>;

    async fn list_policies(&self) -> BootstrapResult<Vec<String>>;

    async fn add_policy(&self, policy: &NamedPolicy) -> BootstrapResult<()>;

    async fn set_group_policy(&self, policy: &str, group: &str) -> BootstrapResult<()>;

    async fn set_user_policy(&self, policy: &str, access_key: &str) -> BootstrapResult<()>;

    /// Anonymous access level on `path`, `None` when nothing is set.
    async fn anonymous_permission(&self, path: &str) -> BootstrapResult<Option<String>>;

    async fn set_anonymous_download(&self, path: &str) -> BootstrapResult<()>;

    async fn ensure_bucket(&self, path: &str) -> BootstrapResult<Applied> {
        self.make_bucket(path).await?;
        Ok(Applied::Ensured)
    }

    /// Create the user unless its access key is taken; an existing user keeps its secret.
    async fn ensure_user(&self, access_key: &str, secret_key: &str) -> BootstrapResult<Applied> {
        validate_secret_key(secret_key)?;
        if self.list_users().await?.iter().any(|u| u == access_key) {
            debug!(target: "dominode::minio", "user {access_key} already exists, not recreating");
            return Ok(Applied::Skipped);
        }
        self.add_user(access_key, secret_key).await?;
        Ok(Applied::Created)
    }

    async fn ensure_policy(&self, policy: &NamedPolicy) -> BootstrapResult<Applied> {
        if self.list_policies().await?.iter().any(|p| *p == policy.name) {
            debug!(target: "dominode::minio", "policy {} already exists", policy.name);
            return Ok(Applied::Skipped);
        }
        self.add_policy(policy).await?;
        Ok(Applied::Created)
    }

    /// Create `group` by adding a temporary member, which is removed again on every path.
    async fn ensure_group(&self, group: &str) -> BootstrapResult<Applied> {
        if self.list_groups().await?.iter().any(|g| g == group) {
            debug!(target: "dominode::minio", "group {group} already exists");
            return Ok(Applied::Skipped);
        }
        let temp = TempCredentials::generate();
        self.add_user(&temp.access_key, &temp.secret_key).await?;
        let added = self.add_group_members(group, std::slice::from_ref(&temp.access_key)).await;
        let removed = self.remove_user(&temp.access_key).await;
        if let Err(e) = &removed {
            warn!(target: "dominode::minio", "could not remove temporary user {}: {e}", temp.access_key);
        }
        added?;
        removed?;
        Ok(Applied::Created)
    }

    async fn ensure_group_policy(&self, policy: &str, group: &str) -> BootstrapResult<Applied> {
        if self.group_info(group).await?.has_policy(policy) {
            return Ok(Applied::Skipped);
        }
        self.set_group_policy(policy, group).await?;
        Ok(Applied::Created)
    }

    async fn ensure_group_member(&self, group: &str, access_key: &str) -> BootstrapResult<Applied> {
        if self.group_info(group).await?.has_member(access_key) {
            return Ok(Applied::Skipped);
        }
        self.add_group_members(group, &[access_key.to_string()]).await?;
        Ok(Applied::Created)
    }

    async fn ensure_anonymous_download(&self, path: &str) -> BootstrapResult<Applied> {
        if self.anonymous_permission(path).await?.as_deref() == Some(DOWNLOAD_PERMISSION) {
            return Ok(Applied::Skipped);
        }
        self.set_anonymous_download(path).await?;
        Ok(Applied::Created)
    }
}
