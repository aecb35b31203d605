//! Buckets, policies, groups and users in object storage.

use tracing::info;

use super::StepRecorder;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::ident;
use crate::minio::{validate_secret_key, StorageAdmin};
use crate::naming::{self, Department};
use crate::outcome::{Report, SYSTEM_SCOPE};
use crate::policy::{storage_policy, UserRole};

pub struct StorageReconciler<'a, S> {
    admin: &'a S,
}

impl<'a, S: StorageAdmin> StorageReconciler<'a, S> {
    pub fn new(admin: &'a S) -> Self {
        StorageReconciler { admin }
    }

    pub async fn bootstrap(&self, departments: &[Department], report: &mut Report) -> BootstrapResult<()> {
        {
            let mut rec = StepRecorder::new(Backend::Storage, SYSTEM_SCOPE, report);
            for bucket in [naming::DOMINODE_STAGING_BUCKET, naming::PUBLIC_BUCKET] {
                rec.step("bucket", bucket, self.admin.ensure_bucket(bucket)).await?;
            }
        }
        for d in departments {
            self.add_department(d, report).await?;
        }
        Ok(())
    }

    pub async fn add_department(&self, d: &Department, report: &mut Report) -> BootstrapResult<()> {
        info!(target: "dominode::reconcile", "bootstrapping department {d} in object storage");
        let mut rec = StepRecorder::new(Backend::Storage, d.as_str(), report);
        for path in [naming::staging_bucket(d), naming::staging_root_dir(d), naming::public_root_dir(d)] {
            rec.step("bucket", &path, self.admin.ensure_bucket(&path)).await?;
        }

        let single = std::slice::from_ref(d);
        for role in UserRole::ALL {
            let policy = storage_policy(role, single);
            let group = naming::group_name(role, single);
            rec.step("policy", &policy.name, self.admin.ensure_policy(&policy)).await?;
            rec.step("group", &group, self.admin.ensure_group(&group)).await?;
            rec.step(
                "group policy",
                &format!("{} -> {group}", policy.name),
                self.admin.ensure_group_policy(&policy.name, &group),
            )
            .await?;
        }

        let public = format!("{}*", naming::public_root_dir(d));
        rec.step("anonymous access", &public, self.admin.ensure_anonymous_download(&public)).await?;
        Ok(())
    }

    /// Create the account and put it in the group for `role` over all of `departments`.
    pub async fn add_department_user(
        &self,
        access_key: &str,
        secret_key: &str,
        departments: &[Department],
        role: UserRole,
        report: &mut Report,
    ) -> BootstrapResult<()> {
        ident::validate_account_name(access_key)?;
        validate_secret_key(secret_key)?;
        if departments.is_empty() {
            return Err(BootstrapError::invalid("department list", "", "at least one department is required"));
        }
        let departments = naming::canonical_departments(departments);
        let policy = storage_policy(role, &departments);
        let group = naming::group_name(role, &departments);
        info!(target: "dominode::reconcile", "adding storage user {access_key} to group {group}");

        let mut rec = StepRecorder::new(Backend::Storage, access_key, report);
        rec.step("user", access_key, self.admin.ensure_user(access_key, secret_key)).await?;
        rec.step("policy", &policy.name, self.admin.ensure_policy(&policy)).await?;
        rec.step("group", &group, self.admin.ensure_group(&group)).await?;
        rec.step(
            "group policy",
            &format!("{} -> {group}", policy.name),
            self.admin.ensure_group_policy(&policy.name, &group),
        )
        .await?;
        rec.step("group member", &format!("{access_key} -> {group}"), self.admin.ensure_group_member(&group, access_key))
            .await?;
        Ok(())
    }
}
