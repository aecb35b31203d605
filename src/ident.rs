//! Identifier validation and quoting
//! ---------------------------------
//! Role, schema and table names cannot be bind parameters, so they are interpolated
//! into SQL text. Department names also end up in bucket paths, GeoServer URLs and
//! GeoFence rules. Everything that gets interpolated passes through one of the
//! allow-lists below first.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BootstrapError, BootstrapResult};

/// Department tokens: lowercase letter, then lowercase letters or digits.
/// No separators, so joined department lists stay unambiguous.
static DEPARTMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]{0,31}$").unwrap());

/// Unquoted postgres identifiers as this tool emits them (already lowercase).
static SQL_IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());

/// MinIO access keys and GeoNode usernames.
static ACCOUNT_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@+-]{2,127}$").unwrap());

/// Names that would collide with system-wide resources.
pub const RESERVED_DEPARTMENTS: &[&str] = &["dominode"];

/// Normalize user/config supplied text before validation: trim and lowercase.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn validate_department(name: &str) -> BootstrapResult<()> {
    if RESERVED_DEPARTMENTS.contains(&name) {
        return Err(BootstrapError::invalid("department", name, "name is reserved"));
    }
    if !DEPARTMENT_RE.is_match(name) {
        return Err(BootstrapError::invalid(
            "department",
            name,
            "expected a lowercase letter followed by up to 31 lowercase letters or digits",
        ));
    }
    Ok(())
}

pub fn validate_sql_identifier(name: &str) -> BootstrapResult<&str> {
    if SQL_IDENT_RE.is_match(name) {
        Ok(name)
    } else {
        Err(BootstrapError::invalid(
            "sql identifier",
            name,
            "expected lowercase letters, digits or underscores (max 63 chars)",
        ))
    }
}

pub fn validate_account_name(name: &str) -> BootstrapResult<&str> {
    if ACCOUNT_NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(BootstrapError::invalid("account name", name, "unsupported characters or length"))
    }
}

/// Render a SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
