//! Typed DDL/DCL statements.
//!
//! Identifiers are validated against the SQL allow-list at render time; passwords are
//! rendered as quoted literals and redacted from the log form.

use std::fmt::{Debug, Formatter};

use crate::error::BootstrapResult;
use crate::ident::{quote_literal, validate_sql_identifier};
use crate::naming::QGIS_PROJECTS_TABLE;

/// Password that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Password(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleOption {
    Login,
    CreateDb,
    CreateRole,
    Replication,
}

impl RoleOption {
    fn keyword(&self) -> &'static str {
        match self {
            RoleOption::Login => "LOGIN",
            RoleOption::CreateDb => "CREATEDB",
            RoleOption::CreateRole => "CREATEROLE",
            RoleOption::Replication => "REPLICATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaPrivilege {
    Usage,
    Create,
}

impl SchemaPrivilege {
    pub fn keyword(&self) -> &'static str {
        match self {
            SchemaPrivilege::Usage => "USAGE",
            SchemaPrivilege::Create => "CREATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TablePrivilege {
    Select,
    Update,
}

impl TablePrivilege {
    pub fn keyword(&self) -> &'static str {
        match self {
            TablePrivilege::Select => "SELECT",
            TablePrivilege::Update => "UPDATE",
        }
    }
}

/// Target of a GRANT/REVOKE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grantee {
    Public,
    Role(String),
}

impl Grantee {
    pub fn role<S: Into<String>>(name: S) -> Self {
        Grantee::Role(name.into())
    }

    fn render(&self) -> BootstrapResult<String> {
        match self {
            Grantee::Public => Ok("PUBLIC".to_string()),
            Grantee::Role(r) => Ok(validate_sql_identifier(r)?.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Grantee::Public => "PUBLIC",
            Grantee::Role(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub parents: Vec<String>,
    pub options: Vec<RoleOption>,
    pub password: Option<Password>,
}

impl RoleSpec {
    pub fn group<S: Into<String>>(name: S) -> Self {
        RoleSpec { name: name.into(), parents: Vec::new(), options: Vec::new(), password: None }
    }

    pub fn login<S: Into<String>>(name: S, password: Password) -> Self {
        RoleSpec { name: name.into(), parents: Vec::new(), options: vec![RoleOption::Login], password: Some(password) }
    }

    pub fn in_roles<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents.extend(parents.into_iter().map(Into::into));
        self
    }

    pub fn with_options(mut self, options: &[RoleOption]) -> Self {
        self.options.extend_from_slice(options);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateRole(RoleSpec),
    CreateSchema { name: String, owner: String },
    GrantOnSchema { schema: String, privileges: Vec<SchemaPrivilege>, grantee: Grantee },
    RevokeOnSchema { schema: String, privileges: Vec<SchemaPrivilege>, grantee: Grantee },
    CreateProjectsTable { schema: String },
    AlterTableOwner { schema: String, table: String, owner: String },
    GrantOnTable { schema: String, table: String, privileges: Vec<TablePrivilege>, grantee: Grantee },
    RevokeOnTable { schema: String, table: String, privileges: Vec<TablePrivilege>, grantee: Grantee },
}

fn join_keywords<I: IntoIterator<Item = &'static str>>(items: I) -> String {
    items.into_iter().collect::<Vec<_>>().join(", ")
}

fn qualified(schema: &str, table: &str) -> BootstrapResult<String> {
    Ok(format!("{}.{}", validate_sql_identifier(schema)?, validate_sql_identifier(table)?))
}

impl Statement {
    /// SQL text to execute.
    pub fn to_sql(&self) -> BootstrapResult<String> {
        self.render(false)
    }

    /// SQL text safe for logs.
    pub fn to_log_sql(&self) -> BootstrapResult<String> {
        self.render(true)
    }

    fn render(&self, redact: bool) -> BootstrapResult<String> {
        let sql = match self {
            Statement::CreateRole(spec) => {
                let mut sql = format!("CREATE ROLE {} WITH", validate_sql_identifier(&spec.name)?);
                if !spec.parents.is_empty() {
                    let parents = spec
                        .parents
                        .iter()
                        .map(|p| validate_sql_identifier(p).map(str::to_string))
                        .collect::<BootstrapResult<Vec<_>>>()?;
                    sql.push_str(&format!(" IN ROLE {}", parents.join(", ")));
                }
                for opt in &spec.options {
                    sql.push(' ');
                    sql.push_str(opt.keyword());
                }
                if let Some(pw) = &spec.password {
                    let literal = if redact { "'***'".to_string() } else { quote_literal(pw.expose()) };
                    sql.push_str(&format!(" PASSWORD {literal}"));
                }
                sql
            }
            Statement::CreateSchema { name, owner } => format!(
                "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
                validate_sql_identifier(name)?,
                validate_sql_identifier(owner)?
            ),
            Statement::GrantOnSchema { schema, privileges, grantee } => format!(
                "GRANT {} ON SCHEMA {} TO {}",
                join_keywords(privileges.iter().map(SchemaPrivilege::keyword)),
                validate_sql_identifier(schema)?,
                grantee.render()?
            ),
            Statement::RevokeOnSchema { schema, privileges, grantee } => format!(
                "REVOKE {} ON SCHEMA {} FROM {}",
                join_keywords(privileges.iter().map(SchemaPrivilege::keyword)),
                validate_sql_identifier(schema)?,
                grantee.render()?
            ),
            Statement::CreateProjectsTable { schema } => format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 name text not null constraint {QGIS_PROJECTS_TABLE}_pkey primary key, \
                 metadata jsonb, \
                 content bytea)",
                qualified(schema, QGIS_PROJECTS_TABLE)?
            ),
            Statement::AlterTableOwner { schema, table, owner } => format!(
                "ALTER TABLE {} OWNER TO {}",
                qualified(schema, table)?,
                validate_sql_identifier(owner)?
            ),
            Statement::GrantOnTable { schema, table, privileges, grantee } => format!(
                "GRANT {} ON {} TO {}",
                join_keywords(privileges.iter().map(TablePrivilege::keyword)),
                qualified(schema, table)?,
                grantee.render()?
            ),
            Statement::RevokeOnTable { schema, table, privileges, grantee } => format!(
                "REVOKE {} ON {} FROM {}",
                join_keywords(privileges.iter().map(TablePrivilege::keyword)),
                qualified(schema, table)?,
                grantee.render()?
            ),
        };
        Ok(sql)
    }
}
