//! Layered configuration
//! ---------------------
//! Settings are a plain `section -> key -> value` map built once at startup and passed
//! by reference to every adapter and reconciler. Layers, later wins:
//!
//! 1. built-in defaults
//! 2. TOML files (`/etc/dominode/dominode-bootstrapper.toml`,
//!    `<config dir>/dominode-bootstrapper/config.toml`,
//!    `$DOMINODE_BOOTSTRAPPER_CONFIG_PATH`, then any `--config` paths)
//! 3. environment: `DOMINODE__{SECTION}__{KEY}` and
//!    `DOMINODE__DEPARTMENT__{DEPT}__{KEY}`
//! 4. command-line `section.key=value` overrides
//!
//! Departments are the sections named `{department}-department`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{BootstrapError, BootstrapResult};
use crate::naming::Department;

pub const ENV_PREFIX: &str = "DOMINODE";
pub const CONFIG_PATH_ENV: &str = "DOMINODE_BOOTSTRAPPER_CONFIG_PATH";
pub const DEPARTMENT_SECTION_SUFFIX: &str = "-department";
pub const GEOSERVER_PASSWORD_KEY: &str = "geoserver_password";

const DEFAULT_DEPARTMENTS: &[&str] = &["ppd", "lsd"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Settings {
    /// Settings with no layer applied.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        let mut s = Self::empty();
        for (key, value) in [
            ("name", "postgres"),
            ("host", "localhost"),
            ("port", "5432"),
            ("admin_username", "postgres"),
            ("admin_password", "postgres"),
            ("connect_retries", "30"),
            ("connect_retry_interval_secs", "2"),
        ] {
            s.set("db", key, value);
        }
        for (key, value) in [
            ("host", "localhost"),
            ("port", "9000"),
            ("protocol", "https"),
            ("admin_access_key", "admin"),
            ("admin_secret_key", "admin"),
            ("alias", "dominode_bootstrapper"),
            ("mc_binary", "mc"),
        ] {
            s.set("minio", key, value);
        }
        s.set("geonode", "base_url", "http://localhost");
        s.set("geonode", "admin_username", "admin");
        s.set("geonode", "admin_password", "admin");
        s.set("geoserver", "base_url", "http://localhost/geoserver");
        s.set("geoserver", "admin_username", "admin");
        s.set("geoserver", "admin_password", "geoserver");
        s.set("dominode", "generic_user_name", "dominode_user");
        s.set("dominode", "generic_editor_role_name", "editor");
        for d in DEFAULT_DEPARTMENTS {
            s.set(&format!("{d}{DEPARTMENT_SECTION_SUFFIX}"), GEOSERVER_PASSWORD_KEY, "dominode");
        }
        s
    }

    /// Defaults, then every existing file in `paths`, then the environment.
    pub fn load<I>(paths: &[PathBuf], env: I) -> BootstrapResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut s = Self::defaults();
        for path in paths {
            if path.is_file() {
                s.merge_file(path)?;
            } else {
                debug!(target: "dominode::config", "config file '{}' not found, skipping", path.display());
            }
        }
        s.apply_env(env);
        Ok(s)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_ascii_lowercase())
            .or_default()
            .insert(key.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section).and_then(|m| m.get(key)).map(String::as_str)
    }

    pub fn require(&self, section: &str, key: &str) -> BootstrapResult<&str> {
        self.get(section, key)
            .ok_or_else(|| BootstrapError::config(format!("{section}.{key}"), "value is missing"))
    }

    fn parse_value<T: std::str::FromStr>(&self, section: &str, key: &str) -> BootstrapResult<T> {
        let raw = self.require(section, key)?;
        raw.trim()
            .parse::<T>()
            .map_err(|_| BootstrapError::config(format!("{section}.{key}"), format!("cannot parse {raw:?}")))
    }

    pub fn merge_file(&mut self, path: &Path) -> BootstrapResult<()> {
        let text = std::fs::read_to_string(path)?;
        self.merge_toml_str(&text)
            .map_err(|e| BootstrapError::config(path.display().to_string(), e.to_string()))?;
        debug!(target: "dominode::config", "merged config file '{}'", path.display());
        Ok(())
    }

    /// Merge a TOML document made of tables of scalar values.
    pub fn merge_toml_str(&mut self, text: &str) -> BootstrapResult<()> {
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| BootstrapError::config("<toml>", e.message().to_string()))?;
        for (section, value) in table {
            let toml::Value::Table(entries) = value else {
                return Err(BootstrapError::config(section, "top-level keys must be tables"));
            };
            for (key, v) in entries {
                let rendered = match v {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => {
                        return Err(BootstrapError::config(
                            format!("{section}.{key}"),
                            "only scalar values are supported",
                        ))
                    }
                };
                self.set(&section, &key, &rendered);
            }
        }
        Ok(())
    }

    /// Overlay `DOMINODE__*` variables; malformed names are logged and ignored.
    pub fn apply_env<I>(&mut self, env: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let department_prefix = format!("{ENV_PREFIX}__DEPARTMENT__");
        let prefix = format!("{ENV_PREFIX}__");
        for (name, value) in env {
            if let Some(rest) = name.strip_prefix(&department_prefix) {
                match rest.split("__").collect::<Vec<_>>().as_slice() {
                    [dept, key] if !dept.is_empty() && !key.is_empty() => {
                        let section = format!("{}{DEPARTMENT_SECTION_SUFFIX}", dept.to_ascii_lowercase());
                        self.set(&section, key, &value);
                    }
                    _ => warn!(target: "dominode::config", "could not read variable {name}, ignoring"),
                }
            } else if let Some(rest) = name.strip_prefix(&prefix) {
                match rest.split("__").collect::<Vec<_>>().as_slice() {
                    [section, key] if !section.is_empty() && !key.is_empty() => self.set(section, key, &value),
                    _ => warn!(target: "dominode::config", "could not read variable {name}, ignoring"),
                }
            }
        }
    }

    /// Apply a `section.key=value` override.
    pub fn apply_override(&mut self, spec: &str) -> BootstrapResult<()> {
        let Some((path, value)) = spec.split_once('=') else {
            return Err(BootstrapError::config(spec, "expected section.key=value"));
        };
        let Some((section, key)) = path.trim().rsplit_once('.') else {
            return Err(BootstrapError::config(spec, "expected section.key=value"));
        };
        if section.is_empty() || key.is_empty() {
            return Err(BootstrapError::config(spec, "expected section.key=value"));
        }
        self.set(section, key, value.trim());
        Ok(())
    }

    /// Departments declared through `{department}-department` sections.
    pub fn departments(&self) -> BootstrapResult<Vec<Department>> {
        self.sections
            .keys()
            .filter_map(|section| section.strip_suffix(DEPARTMENT_SECTION_SUFFIX))
            .map(|raw| {
                Department::parse(raw).map_err(|e| {
                    BootstrapError::config(format!("{raw}{DEPARTMENT_SECTION_SUFFIX}"), e.to_string())
                })
            })
            .collect()
    }

    /// A per-department secret; missing values are configuration errors.
    pub fn department_secret(&self, department: &Department, key: &str) -> BootstrapResult<String> {
        let section = format!("{department}{DEPARTMENT_SECTION_SUFFIX}");
        match self.get(&section, key) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(BootstrapError::config(
                format!("{section}.{key}"),
                format!("no {key} configured for department {department}"),
            )),
        }
    }

    pub fn geoserver_password(&self, department: &Department) -> BootstrapResult<String> {
        self.department_secret(department, GEOSERVER_PASSWORD_KEY)
    }

    pub fn db(&self) -> BootstrapResult<DbSettings> {
        Ok(DbSettings {
            name: self.require("db", "name")?.to_string(),
            host: self.require("db", "host")?.to_string(),
            port: self.parse_value("db", "port")?,
            admin_username: self.require("db", "admin_username")?.to_string(),
            admin_password: self.require("db", "admin_password")?.to_string(),
            connect_retries: self.parse_value("db", "connect_retries")?,
            connect_retry_interval: Duration::from_secs(self.parse_value("db", "connect_retry_interval_secs")?),
        })
    }

    pub fn minio(&self) -> BootstrapResult<MinioSettings> {
        Ok(MinioSettings {
            host: self.require("minio", "host")?.to_string(),
            port: self.parse_value("minio", "port")?,
            protocol: self.require("minio", "protocol")?.to_string(),
            admin_access_key: self.require("minio", "admin_access_key")?.to_string(),
            admin_secret_key: self.require("minio", "admin_secret_key")?.to_string(),
            alias: self.require("minio", "alias")?.to_string(),
            mc_binary: PathBuf::from(self.require("minio", "mc_binary")?),
        })
    }

    pub fn geonode(&self) -> BootstrapResult<GeoNodeSettings> {
        self.web_section("geonode")
    }

    pub fn geoserver(&self) -> BootstrapResult<GeoServerSettings> {
        self.web_section("geoserver")
    }

    fn web_section(&self, section: &str) -> BootstrapResult<WebSettings> {
        Ok(WebSettings {
            base_url: self.require(section, "base_url")?.trim_end_matches('/').to_string(),
            admin_username: self.require(section, "admin_username")?.to_string(),
            admin_password: self.require(section, "admin_password")?.to_string(),
        })
    }

    pub fn dominode(&self) -> BootstrapResult<DominodeSettings> {
        Ok(DominodeSettings {
            generic_user_name: self.require("dominode", "generic_user_name")?.to_string(),
            generic_editor_role_name: self.require("dominode", "generic_editor_role_name")?.to_string(),
        })
    }
}

/// Standard config file locations, lowest precedence first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut out = vec![PathBuf::from("/etc/dominode/dominode-bootstrapper.toml")];
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join("dominode-bootstrapper").join("config.toml"));
    }
    if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
        if !p.is_empty() {
            out.push(PathBuf::from(p));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub admin_username: String,
    pub admin_password: String,
    pub connect_retries: u32,
    pub connect_retry_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinioSettings {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub admin_access_key: String,
    pub admin_secret_key: String,
    pub alias: String,
    pub mc_binary: PathBuf,
}

impl MinioSettings {
    /// Value for the `MC_HOST_<alias>` variable handed to `mc`.
    pub fn mc_host_url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}",
            self.protocol, self.admin_access_key, self.admin_secret_key, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSettings {
    pub base_url: String,
    pub admin_username: String,
    pub admin_password: String,
}

pub type GeoNodeSettings = WebSettings;
pub type GeoServerSettings = WebSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominodeSettings {
    pub generic_user_name: String,
    pub generic_editor_role_name: String,
}
