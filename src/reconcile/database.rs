//! Roles, schemas, tables and grants in the DomiNode database.

use tracing::info;

use super::StepRecorder;
use crate::config::Settings;
use crate::db::{DatabaseAdmin, Grantee, Password, RoleOption, RoleSpec, SchemaPrivilege, TablePrivilege};
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::ident;
use crate::naming::{self, Department};
use crate::outcome::{Report, SYSTEM_SCOPE};
use crate::policy::UserRole;

const STAGING_PRIVILEGES: &[SchemaPrivilege] = &[SchemaPrivilege::Usage, SchemaPrivilege::Create];

pub struct DatabaseReconciler<'a, A> {
    admin: &'a A,
    settings: &'a Settings,
}

impl<'a, A: DatabaseAdmin> DatabaseReconciler<'a, A> {
    pub fn new(admin: &'a A, settings: &'a Settings) -> Self {
        DatabaseReconciler { admin, settings }
    }

    /// Deployment-wide roles and schemas, every department, then lock down `public`.
    ///
    /// CREATE on `public` is revoked from PUBLIC before it is granted to the editor
    /// role, otherwise the grant check would see the privilege inherited from PUBLIC.
    pub async fn bootstrap(&self, departments: &[Department], report: &mut Report) -> BootstrapResult<()> {
        let generic = self.settings.dominode()?;
        let user_role = generic.generic_user_name.as_str();
        let editor_role = generic.generic_editor_role_name.as_str();
        {
            let mut rec = StepRecorder::new(Backend::Database, SYSTEM_SCOPE, report);
            let admin_role =
                RoleSpec::group(naming::ADMIN_ROLE).with_options(&[RoleOption::CreateDb, RoleOption::CreateRole]);
            rec.step("role", naming::ADMIN_ROLE, self.admin.ensure_role(&admin_role)).await?;
            let replicator = RoleSpec::group(naming::REPLICATOR_ROLE).with_options(&[RoleOption::Replication]);
            rec.step("role", naming::REPLICATOR_ROLE, self.admin.ensure_role(&replicator)).await?;
            rec.step("role", user_role, self.admin.ensure_role(&RoleSpec::group(user_role))).await?;
            let editor = RoleSpec::group(editor_role).in_roles([user_role]);
            rec.step("role", editor_role, self.admin.ensure_role(&editor)).await?;

            let schema = naming::DOMINODE_STAGING_SCHEMA;
            rec.step("schema", schema, self.admin.ensure_schema(schema, editor_role)).await?;
            rec.step(
                "schema grant",
                &format!("{schema} -> {user_role}"),
                self.admin.ensure_schema_grant(schema, STAGING_PRIVILEGES, &Grantee::role(user_role)),
            )
            .await?;
        }

        for d in departments {
            self.add_department(d, report).await?;
        }

        let mut rec = StepRecorder::new(Backend::Database, SYSTEM_SCOPE, report);
        let public = naming::PUBLIC_SCHEMA;
        rec.step(
            "schema revoke",
            &format!("{public} -> PUBLIC"),
            self.admin.ensure_schema_revoke(public, &[SchemaPrivilege::Create], &Grantee::Public),
        )
        .await?;
        rec.step(
            "schema grant",
            &format!("{public} -> {editor_role}"),
            self.admin.ensure_schema_grant(public, &[SchemaPrivilege::Create], &Grantee::role(editor_role)),
        )
        .await?;
        Ok(())
    }

    pub async fn add_department(&self, d: &Department, report: &mut Report) -> BootstrapResult<()> {
        let generic = self.settings.dominode()?;
        let mut rec = StepRecorder::new(Backend::Database, d.as_str(), report);
        let geoserver_user = naming::geoserver_db_user(d);
        // resolve the secret before touching anything
        let password = self
            .settings
            .geoserver_password(d)
            .map(Password::new)
            .map_err(|e| rec.fail("login role", &geoserver_user, e))?;

        info!(target: "dominode::reconcile", "bootstrapping department {d} in the database");
        let user_role = naming::user_role_name(d);
        let editor_role = naming::editor_role_name(d);
        let user_spec = RoleSpec::group(&user_role).in_roles([generic.generic_user_name.as_str()]);
        rec.step("role", &user_role, self.admin.ensure_role(&user_spec)).await?;
        let editor_spec =
            RoleSpec::group(&editor_role).in_roles([generic.generic_editor_role_name.as_str(), user_role.as_str()]);
        rec.step("role", &editor_role, self.admin.ensure_role(&editor_spec)).await?;

        let schema = naming::staging_schema(d);
        rec.step("schema", &schema, self.admin.ensure_schema(&schema, &editor_role)).await?;
        rec.step(
            "schema grant",
            &format!("{schema} -> {user_role}"),
            self.admin.ensure_schema_grant(&schema, STAGING_PRIVILEGES, &Grantee::role(&user_role)),
        )
        .await?;

        let table = format!("{schema}.{}", naming::QGIS_PROJECTS_TABLE);
        rec.step("table", &table, self.admin.ensure_projects_table(&schema)).await?;
        rec.step(
            "table owner",
            &table,
            self.admin.ensure_table_owner(&schema, naming::QGIS_PROJECTS_TABLE, &user_role),
        )
        .await?;

        let geoserver_spec =
            RoleSpec::login(&geoserver_user, password).in_roles([generic.generic_user_name.as_str()]);
        rec.step("login role", &geoserver_user, self.admin.ensure_role(&geoserver_spec)).await?;

        if d.is_topomap_owner() {
            self.add_topomaps(&mut rec, &user_role).await?;
        }
        Ok(())
    }

    async fn add_topomaps(&self, rec: &mut StepRecorder<'_>, user_role: &str) -> BootstrapResult<()> {
        let owner = naming::TOPOMAP_EDITOR_ROLE;
        let schema = naming::TOPOMAP_SCHEMA;
        let table_name = naming::QGIS_PROJECTS_TABLE;
        let table = format!("{schema}.{table_name}");

        rec.step("role", owner, self.admin.ensure_role(&RoleSpec::group(owner).in_roles([user_role]))).await?;
        rec.step("schema", schema, self.admin.ensure_schema(schema, owner)).await?;
        rec.step(
            "schema grant",
            &format!("{schema} -> {user_role}"),
            self.admin.ensure_schema_grant(schema, &[SchemaPrivilege::Usage], &Grantee::role(user_role)),
        )
        .await?;
        rec.step("table", &table, self.admin.ensure_projects_table(schema)).await?;
        rec.step("table owner", &table, self.admin.ensure_table_owner(schema, table_name, owner)).await?;
        rec.step(
            "table revoke",
            &format!("{table} -> {owner}"),
            self.admin.ensure_table_revoke(schema, table_name, &[TablePrivilege::Update], owner),
        )
        .await?;
        rec.step(
            "table grant",
            &format!("{table} -> {user_role}"),
            self.admin.ensure_table_grant(schema, table_name, &[TablePrivilege::Select], user_role),
        )
        .await?;
        Ok(())
    }

    /// Create a login role under the department roles for `role`. An existing user is
    /// left as is, password included.
    pub async fn add_department_user(
        &self,
        username: &str,
        password: &str,
        departments: &[Department],
        role: UserRole,
        topomap_editor: bool,
        report: &mut Report,
    ) -> BootstrapResult<()> {
        ident::validate_sql_identifier(username)?;
        if departments.is_empty() {
            return Err(BootstrapError::invalid("department list", "", "at least one department is required"));
        }
        let mut parents: Vec<String> = naming::canonical_departments(departments)
            .iter()
            .map(|d| naming::department_role_name(d, role))
            .collect();
        if topomap_editor {
            parents.push(naming::TOPOMAP_EDITOR_ROLE.to_string());
        }
        info!(
            target: "dominode::reconcile",
            "adding database user {username} with parent roles {}", parents.join(", ")
        );
        let mut rec = StepRecorder::new(Backend::Database, username, report);
        let spec = RoleSpec::login(username, Password::new(password)).in_roles(parents);
        rec.step("login role", username, self.admin.ensure_role(&spec)).await?;
        Ok(())
    }
}
