//! Database adapter: existence checks plus typed DDL against the DomiNode Postgres.
//!
//! Every `ensure_*` method checks first and only issues a statement when the state is
//! missing, reporting `Applied::Created` or `Applied::Skipped`.

pub mod postgres;
pub mod sql;

use tracing::debug;

use crate::error::BootstrapResult;
use crate::outcome::Applied;

pub use postgres::PgAdmin;
pub use sql::{Grantee, Password, RoleOption, RoleSpec, SchemaPrivilege, Statement, TablePrivilege};

#[allow(async_fn_in_trait)]
pub trait DatabaseAdmin {
    async fn role_exists(&self, role: &str) -> BootstrapResult<bool>;

    async fn schema_exists(&self, schema: &str) -> BootstrapResult<bool>;

    async fn table_exists(&self, schema: &str, table: &str) -> BootstrapResult<bool>;

    async fn table_owner(&self, schema: &str, table: &str) -> BootstrapResult<Option<String>>;

    /// Effective privilege of `role` on `schema`, inherited grants included.
    async fn has_schema_privilege(&self, role: &str, schema: &str, privilege: SchemaPrivilege)
        -> BootstrapResult<bool>;

    /// Whether the ACL of `schema` carries an explicit entry for the PUBLIC pseudo-role.
    async fn public_has_schema_privilege(&self, schema: &str, privilege: SchemaPrivilege)
        -> BootstrapResult<bool>;

    async fn has_table_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: TablePrivilege,
    ) -> BootstrapResult<bool>;

    async fn execute(&self, statement: &Statement) -> BootstrapResult<()>;

    async fn grantee_has_schema_privilege(
        &self,
        grantee: &Grantee,
        schema: &str,
        privilege: SchemaPrivilege,
    ) -> BootstrapResult<bool> {
        match grantee {
            Grantee::Public => self.public_has_schema_privilege(schema, privilege).await,
            Grantee::Role(role) => self.has_schema_privilege(role, schema, privilege).await,
        }
    }

    async fn ensure_role(&self, spec: &RoleSpec) -> BootstrapResult<Applied> {
        if self.role_exists(&spec.name).await? {
            debug!(target: "dominode::db", "role {} already exists", spec.name);
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::CreateRole(spec.clone())).await?;
        Ok(Applied::Created)
    }

    async fn ensure_schema(&self, name: &str, owner: &str) -> BootstrapResult<Applied> {
        if self.schema_exists(name).await? {
            debug!(target: "dominode::db", "schema {name} already exists");
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::CreateSchema { name: name.to_string(), owner: owner.to_string() })
            .await?;
        Ok(Applied::Created)
    }

    /// Grant whichever of `privileges` the grantee does not hold yet.
    async fn ensure_schema_grant(
        &self,
        schema: &str,
        privileges: &[SchemaPrivilege],
        grantee: &Grantee,
    ) -> BootstrapResult<Applied> {
        let mut missing = Vec::new();
        for p in privileges {
            if !self.grantee_has_schema_privilege(grantee, schema, *p).await? {
                missing.push(*p);
            }
        }
        if missing.is_empty() {
            debug!(target: "dominode::db", "{} already holds {:?} on schema {schema}", grantee.label(), privileges);
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::GrantOnSchema {
            schema: schema.to_string(),
            privileges: missing,
            grantee: grantee.clone(),
        })
        .await?;
        Ok(Applied::Created)
    }

    async fn ensure_schema_revoke(
        &self,
        schema: &str,
        privileges: &[SchemaPrivilege],
        grantee: &Grantee,
    ) -> BootstrapResult<Applied> {
        let mut held = Vec::new();
        for p in privileges {
            if self.grantee_has_schema_privilege(grantee, schema, *p).await? {
                held.push(*p);
            }
        }
        if held.is_empty() {
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::RevokeOnSchema {
            schema: schema.to_string(),
            privileges: held,
            grantee: grantee.clone(),
        })
        .await?;
        Ok(Applied::Created)
    }

    async fn ensure_projects_table(&self, schema: &str) -> BootstrapResult<Applied> {
        if self.table_exists(schema, crate::naming::QGIS_PROJECTS_TABLE).await? {
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::CreateProjectsTable { schema: schema.to_string() }).await?;
        Ok(Applied::Created)
    }

    async fn ensure_table_owner(&self, schema: &str, table: &str, owner: &str) -> BootstrapResult<Applied> {
        if self.table_owner(schema, table).await?.as_deref() == Some(owner) {
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::AlterTableOwner {
            schema: schema.to_string(),
            table: table.to_string(),
            owner: owner.to_string(),
        })
        .await?;
        Ok(Applied::Created)
    }

    async fn ensure_table_grant(
        &self,
        schema: &str,
        table: &str,
        privileges: &[TablePrivilege],
        role: &str,
    ) -> BootstrapResult<Applied> {
        let mut missing = Vec::new();
        for p in privileges {
            if !self.has_table_privilege(role, schema, table, *p).await? {
                missing.push(*p);
            }
        }
        if missing.is_empty() {
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::GrantOnTable {
            schema: schema.to_string(),
            table: table.to_string(),
            privileges: missing,
            grantee: Grantee::role(role),
        })
        .await?;
        Ok(Applied::Created)
    }

    async fn ensure_table_revoke(
        &self,
        schema: &str,
        table: &str,
        privileges: &[TablePrivilege],
        role: &str,
    ) -> BootstrapResult<Applied> {
        let mut held = Vec::new();
        for p in privileges {
            if self.has_table_privilege(role, schema, table, *p).await? {
                held.push(*p);
            }
        }
        if held.is_empty() {
            return Ok(Applied::Skipped);
        }
        self.execute(&Statement::RevokeOnTable {
            schema: schema.to_string(),
            table: table.to_string(),
            privileges: held,
            grantee: Grantee::role(role),
        })
        .await?;
        Ok(Applied::Created)
    }
}
