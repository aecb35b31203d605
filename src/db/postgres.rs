//! `DatabaseAdmin` over a single tokio-postgres connection.

use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, info, warn};

use super::sql::{SchemaPrivilege, Statement, TablePrivilege};
use super::DatabaseAdmin;
use crate::config::DbSettings;
use crate::error::{Backend, BootstrapError, BootstrapResult};

/// Administrative connection. The connection task ends when the client is dropped.
pub struct PgAdmin {
    client: Client,
}

fn pg_error(err: tokio_postgres::Error, operation: &str) -> BootstrapError {
    match BootstrapError::from(err) {
        BootstrapError::Rejected { backend, status, detail, .. } => {
            BootstrapError::Rejected { backend, operation: operation.to_string(), status, detail }
        }
        other => other,
    }
}

impl PgAdmin {
    pub fn config(settings: &DbSettings) -> Config {
        let mut cfg = Config::new();
        cfg.host(&settings.host)
            .port(settings.port)
            .dbname(&settings.name)
            .user(&settings.admin_username)
            .password(&settings.admin_password)
            .application_name("dominode-bootstrapper");
        cfg
    }

    /// Connect, retrying while the server is still coming up.
    pub async fn connect_with_retry(settings: &DbSettings) -> BootstrapResult<Self> {
        let cfg = Self::config(settings);
        let attempts = settings.connect_retries.max(1);
        let mut last_err = String::new();
        for attempt in 1..=attempts {
            match cfg.connect(NoTls).await {
                Ok((client, conn)) => {
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            warn!(target: "dominode::db", "connection closed with error: {e}");
                        }
                    });
                    info!(
                        target: "dominode::db",
                        "connected to {}:{}/{} as {}",
                        settings.host, settings.port, settings.name, settings.admin_username
                    );
                    return Ok(PgAdmin { client });
                }
                Err(e) => {
                    last_err = e.to_string();
                    warn!(
                        target: "dominode::db",
                        "database not reachable (attempt {attempt}/{attempts}): {last_err}"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(settings.connect_retry_interval).await;
                    }
                }
            }
        }
        Err(BootstrapError::connectivity(
            Backend::Database,
            format!("{}:{} after {attempts} attempts: {last_err}", settings.host, settings.port),
        ))
    }

    async fn query_bool(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)]) -> BootstrapResult<bool> {
        let row = self.client.query_one(sql, params).await.map_err(|e| pg_error(e, sql))?;
        Ok(row.get::<_, bool>(0))
    }
}

impl DatabaseAdmin for PgAdmin {
    async fn role_exists(&self, role: &str) -> BootstrapResult<bool> {
        self.query_bool("SELECT EXISTS(SELECT 1 FROM pg_roles WHERE rolname = $1)", &[&role]).await
    }

    async fn schema_exists(&self, schema: &str) -> BootstrapResult<bool> {
        self.query_bool("SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1)", &[&schema]).await
    }

    async fn table_exists(&self, schema: &str, table: &str) -> BootstrapResult<bool> {
        self.query_bool(
            "SELECT EXISTS(SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)",
            &[&schema, &table],
        )
        .await
    }

    async fn table_owner(&self, schema: &str, table: &str) -> BootstrapResult<Option<String>> {
        let sql = "SELECT tableowner::text FROM pg_tables WHERE schemaname = $1 AND tablename = $2";
        let rows = self.client.query(sql, &[&schema, &table]).await.map_err(|e| pg_error(e, sql))?;
        Ok(rows.first().map(|r| r.get::<_, String>(0)))
    }

    async fn has_schema_privilege(
        &self,
        role: &str,
        schema: &str,
        privilege: SchemaPrivilege,
    ) -> BootstrapResult<bool> {
        self.query_bool(
            "SELECT has_schema_privilege($1::text, $2::text, $3::text)",
            &[&role, &schema, &privilege.keyword()],
        )
        .await
    }

    async fn public_has_schema_privilege(&self, schema: &str, privilege: SchemaPrivilege) -> BootstrapResult<bool> {
        self.query_bool(
            "SELECT EXISTS(SELECT 1 FROM pg_namespace n, \
             aclexplode(COALESCE(n.nspacl, acldefault('n', n.nspowner))) a \
             WHERE n.nspname = $1 AND a.grantee = 0 AND a.privilege_type = $2)",
            &[&schema, &privilege.keyword()],
        )
        .await
    }

    async fn has_table_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: TablePrivilege,
    ) -> BootstrapResult<bool> {
        let qualified = format!("{schema}.{table}");
        self.query_bool(
            "SELECT has_table_privilege($1::text, $2::text, $3::text)",
            &[&role, &qualified, &privilege.keyword()],
        )
        .await
    }

    async fn execute(&self, statement: &Statement) -> BootstrapResult<()> {
        let sql = statement.to_sql()?;
        let log_sql = statement.to_log_sql()?;
        debug!(target: "dominode::db", "executing: {log_sql}");
        self.client.batch_execute(&sql).await.map_err(|e| pg_error(e, &log_sql))?;
        info!(target: "dominode::db", "{log_sql}");
        Ok(())
    }
}
