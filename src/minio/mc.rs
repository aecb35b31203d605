//! `StorageAdmin` on top of the `mc` command line client.
//!
//! Every invocation runs `mc --json ...` with `MC_HOST_<alias>` set in the child
//! environment only, then parses one JSON record per stdout line. Callers only ever
//! see typed values.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::{GroupInfo, StorageAdmin, DOWNLOAD_PERMISSION};
use crate::config::MinioSettings;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::policy::NamedPolicy;

const SUCCESS: &str = "success";

/// Principal a policy is attached to.
#[derive(Debug, Clone, Copy)]
pub enum PolicyTarget<'a> {
    Group(&'a str),
    User(&'a str),
}

impl PolicyTarget<'_> {
    fn arg(&self) -> String {
        match self {
            PolicyTarget::Group(name) => format!("group={name}"),
            PolicyTarget::User(name) => format!("user={name}"),
        }
    }
}

pub struct McClient {
    binary: PathBuf,
    alias: String,
    host_url: String,
}

impl std::fmt::Debug for McClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McClient")
            .field("binary", &self.binary)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl McClient {
    pub fn new(settings: &MinioSettings) -> BootstrapResult<Self> {
        let alias_ok = !settings.alias.is_empty()
            && settings.alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !alias_ok {
            return Err(BootstrapError::config("minio.alias", "alias must be made of letters, digits or '_'"));
        }
        Ok(McClient {
            binary: settings.mc_binary.clone(),
            alias: settings.alias.clone(),
            host_url: settings.mc_host_url(),
        })
    }

    fn host_env(&self) -> String {
        format!("MC_HOST_{}", self.alias)
    }

    fn target(&self, path: &str) -> String {
        format!("{}/{}", self.alias, path.trim_start_matches('/'))
    }

    /// `mc --json admin <command..> <alias> <args..>`
    pub fn admin_args(&self, command: &[&str], args: &[&str]) -> Vec<String> {
        let mut out = vec!["--json".to_string(), "admin".to_string()];
        out.extend(command.iter().map(|s| s.to_string()));
        out.push(self.alias.clone());
        out.extend(args.iter().map(|s| s.to_string()));
        out
    }

    pub fn policy_set_args(&self, policy: &str, target: PolicyTarget<'_>) -> Vec<String> {
        let target = target.arg();
        self.admin_args(&["policy", "set"], &[policy, target.as_str()])
    }

    /// `mc --json <command..> <alias>/<path> <extra..>`
    pub fn target_args(&self, command: &[&str], path: &str, extra: &[&str]) -> Vec<String> {
        let mut out = vec!["--json".to_string()];
        out.extend(command.iter().map(|s| s.to_string()));
        out.push(self.target(path));
        out.extend(extra.iter().map(|s| s.to_string()));
        out
    }

    async fn run(&self, args: Vec<String>, secret: Option<&str>) -> BootstrapResult<Vec<Value>> {
        let shown = display_command(&args, secret);
        debug!(target: "dominode::minio", "mc {shown}");
        let output = Command::new(&self.binary)
            .args(&args)
            .env(self.host_env(), &self.host_url)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BootstrapError::connectivity(
                    Backend::Storage,
                    format!("could not run {}: {e}", self.binary.display()),
                )
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let records = parse_records(&stdout).map_err(|e| {
            BootstrapError::rejected(Backend::Storage, shown.clone(), None, e.to_string())
        })?;
        if let Some(message) = first_error(&records) {
            return Err(BootstrapError::rejected(
                Backend::Storage,
                shown,
                output.status.code().map(|c| format!("exit {c}")),
                message,
            ));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BootstrapError::rejected(
                Backend::Storage,
                shown,
                output.status.code().map(|c| format!("exit {c}")),
                stderr.trim().to_string(),
            ));
        }
        Ok(records)
    }
}

fn display_command(args: &[String], secret: Option<&str>) -> String {
    args.iter()
        .map(|a| match secret {
            Some(s) if a == s => "***",
            _ => a.as_str(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One JSON record per non-empty line.
pub fn parse_records(stdout: &str) -> serde_json::Result<Vec<Value>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Message of the first record reporting `status: error`.
pub fn first_error(records: &[Value]) -> Option<String> {
    records.iter().find(|r| r.get("status").and_then(Value::as_str).is_some_and(|s| s != SUCCESS)).map(|r| {
        let err = r.get("error");
        err.and_then(|e| e.get("message"))
            .or_else(|| err.and_then(|e| e.get("cause")).and_then(|c| c.get("message")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| r.to_string())
    })
}

fn string_field(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

pub fn parse_users(records: &[Value]) -> Vec<String> {
    records.iter().filter_map(|r| string_field(r, "accessKey")).collect()
}

/// Newer `mc` prints a single record with a `groups` array, older ones one `name` per line.
pub fn parse_groups(records: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for r in records {
        if let Some(groups) = r.get("groups").and_then(Value::as_array) {
            out.extend(groups.iter().filter_map(Value::as_str).map(str::to_string));
        } else if let Some(name) = string_field(r, "name") {
            out.push(name);
        }
    }
    out
}

pub fn parse_policies(records: &[Value]) -> Vec<String> {
    records.iter().filter_map(|r| string_field(r, "policy")).collect()
}

pub fn parse_group_info(group: &str, records: &[Value]) -> GroupInfo {
    let mut info = GroupInfo { name: group.to_string(), ..GroupInfo::default() };
    for r in records {
        if let Some(members) = r.get("members").and_then(Value::as_array) {
            info.members.extend(members.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if let Some(policy) = string_field(r, "groupPolicy") {
            info.policies.extend(policy.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string));
        }
    }
    info
}

pub fn parse_permission(records: &[Value]) -> Option<String> {
    records.iter().find_map(|r| string_field(r, "permission")).filter(|p| p != "none")
}

impl StorageAdmin for McClient {
    async fn make_bucket(&self, path: &str) -> BootstrapResult<()> {
        self.run(self.target_args(&["mb"], path, &["--ignore-existing"]), None).await?;
        info!(target: "dominode::minio", "ensured bucket {path}");
        Ok(())
    }

    async fn list_users(&self) -> BootstrapResult<Vec<String>> {
        let records = self.run(self.admin_args(&["user", "list"], &[]), None).await?;
        Ok(parse_users(&records))
    }

    async fn add_user(&self, access_key: &str, secret_key: &str) -> BootstrapResult<()> {
        self.run(self.admin_args(&["user", "add"], &[access_key, secret_key]), Some(secret_key)).await?;
        info!(target: "dominode::minio", "created user {access_key}");
        Ok(())
    }

    async fn remove_user(&self, access_key: &str) -> BootstrapResult<()> {
        self.run(self.admin_args(&["user", "remove"], &[access_key]), None).await?;
        debug!(target: "dominode::minio", "removed user {access_key}");
        Ok(())
    }

    async fn list_groups(&self) -> BootstrapResult<Vec<String>> {
        let records = self.run(self.admin_args(&["group", "list"], &[]), None).await?;
        Ok(parse_groups(&records))
    }

    async fn group_info(&self, group: &str) -> BootstrapResult<GroupInfo> {
        let records = self.run(self.admin_args(&["group", "info"], &[group]), None).await?;
        Ok(parse_group_info(group, &records))
    }

    async fn add_group_members(&self, group: &str, members: &[String]) -> BootstrapResult<()> {
        let mut args = vec![group];
        args.extend(members.iter().map(String::as_str));
        self.run(self.admin_args(&["group", "add"], &args), None).await?;
        info!(target: "dominode::minio", "added {} to group {group}", members.join(", "));
        Ok(())
    }

    async fn list_policies(&self) -> BootstrapResult<Vec<String>> {
        let records = self.run(self.admin_args(&["policy", "list"], &[]), None).await?;
        Ok(parse_policies(&records))
    }

    async fn add_policy(&self, policy: &NamedPolicy) -> BootstrapResult<()> {
        let mut file = tempfile::Builder::new().prefix("dominode-policy-").suffix(".json").tempfile()?;
        file.write_all(policy.document.to_json()?.as_bytes())?;
        file.flush()?;
        let path = file.path().to_string_lossy().to_string();
        self.run(self.admin_args(&["policy", "add"], &[policy.name.as_str(), path.as_str()]), None).await?;
        info!(target: "dominode::minio", "created policy {}", policy.name);
        Ok(())
    }

    async fn set_group_policy(&self, policy: &str, group: &str) -> BootstrapResult<()> {
        self.run(self.policy_set_args(policy, PolicyTarget::Group(group)), None).await?;
        info!(target: "dominode::minio", "attached policy {policy} to group {group}");
        Ok(())
    }

    async fn set_user_policy(&self, policy: &str, access_key: &str) -> BootstrapResult<()> {
        self.run(self.policy_set_args(policy, PolicyTarget::User(access_key)), None).await?;
        info!(target: "dominode::minio", "attached policy {policy} to user {access_key}");
        Ok(())
    }

    async fn anonymous_permission(&self, path: &str) -> BootstrapResult<Option<String>> {
        let records = self.run(self.target_args(&["policy", "get"], path, &[]), None).await?;
        Ok(parse_permission(&records))
    }

    async fn set_anonymous_download(&self, path: &str) -> BootstrapResult<()> {
        self.run(self.target_args(&["policy", "set", DOWNLOAD_PERMISSION], path, &[]), None).await?;
        info!(target: "dominode::minio", "set anonymous {DOWNLOAD_PERMISSION} on {path}");
        Ok(())
    }
}
