//! GeoServer REST client: workspaces, PostGIS datastores and GeoFence rules.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{GeoServerAdmin, PostgisStore, RuleSummary};
use crate::config::WebSettings;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::policy::{AdminRule, DataRule};

const JSON: &str = "application/json";

pub struct GeoServerClient {
    base: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

/// Turn a non-2xx response into a rejection carrying the response body.
pub(crate) async fn check(resp: Response, operation: &str) -> BootstrapResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BootstrapError::rejected(Backend::Gis, operation, Some(status.as_u16().to_string()), body.trim()))
}

/// Names under `{outer: {inner: [{name}]}}`; GeoServer sends `{outer: ""}` when empty.
pub fn nested_names(payload: &Value, outer: &str, inner: &str) -> Vec<String> {
    payload
        .get(outer)
        .and_then(|o| o.get(inner))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_rules(payload: &Value) -> BootstrapResult<Vec<RuleSummary>> {
    match payload.get("rules") {
        Some(rules @ Value::Array(_)) => Ok(serde_json::from_value(rules.clone())?),
        _ => Ok(Vec::new()),
    }
}

pub fn datastore_body(store: &PostgisStore) -> Value {
    json!({
        "dataStore": {
            "name": store.name,
            "connectionParameters": {
                "entry": [
                    {"@key": "host", "$": store.host},
                    {"@key": "port", "$": store.port.to_string()},
                    {"@key": "database", "$": store.database},
                    {"@key": "user", "$": store.user},
                    {"@key": "passwd", "$": store.password.expose()},
                    {"@key": "dbtype", "$": "postgis"},
                ]
            }
        }
    })
}

impl GeoServerClient {
    pub fn new(settings: &WebSettings) -> BootstrapResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(GeoServerClient {
            base: settings.base_url.clone(),
            username: settings.admin_username.clone(),
            password: settings.admin_password.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.base, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(target: "dominode::gis", "GET {url}");
        self.client.get(url).basic_auth(&self.username, Some(&self.password)).header(ACCEPT, JSON)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(target: "dominode::gis", "POST {url}");
        self.client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, JSON)
    }

    async fn get_json(&self, path: &str) -> BootstrapResult<Value> {
        let resp = check(self.get(path).send().await?, &format!("GET {path}")).await?;
        Ok(resp.json().await?)
    }
}

impl GeoServerAdmin for GeoServerClient {
    async fn list_workspaces(&self) -> BootstrapResult<Vec<String>> {
        let payload = self.get_json("workspaces").await?;
        Ok(nested_names(&payload, "workspaces", "workspace"))
    }

    async fn create_workspace(&self, name: &str) -> BootstrapResult<()> {
        let req = self.post("workspaces").header(ACCEPT, JSON).json(&json!({"workspace": {"name": name}}));
        check(req.send().await?, "POST workspaces").await?;
        info!(target: "dominode::gis", "created workspace {name}");
        Ok(())
    }

    async fn list_datastores(&self, workspace: &str) -> BootstrapResult<Vec<String>> {
        let path = format!("workspaces/{}/datastores", urlencoding::encode(workspace));
        let payload = self.get_json(&path).await?;
        Ok(nested_names(&payload, "dataStores", "dataStore"))
    }

    async fn create_postgis_datastore(&self, workspace: &str, store: &PostgisStore) -> BootstrapResult<()> {
        let path = format!("workspaces/{}/datastores", urlencoding::encode(workspace));
        let req = self.post(&path).header(ACCEPT, JSON).json(&datastore_body(store));
        check(req.send().await?, &format!("POST {path}")).await?;
        info!(target: "dominode::gis", "created datastore {workspace}:{}", store.name);
        Ok(())
    }

    async fn list_admin_rules(&self) -> BootstrapResult<Vec<RuleSummary>> {
        parse_rules(&self.get_json("geofence/adminrules").await?)
    }

    async fn create_admin_rule(&self, rule: &AdminRule) -> BootstrapResult<()> {
        let req = self.post("geofence/adminrules").header(ACCEPT, JSON).json(&json!({"AdminRule": rule}));
        check(req.send().await?, "POST geofence/adminrules").await?;
        info!(target: "dominode::gis", "created admin rule {} on {}", rule.role_name, rule.workspace);
        Ok(())
    }

    async fn list_data_rules(&self) -> BootstrapResult<Vec<RuleSummary>> {
        parse_rules(&self.get_json("geofence/rules.json").await?)
    }

    async fn create_data_rule(&self, rule: &DataRule) -> BootstrapResult<()> {
        // the rules endpoint refuses an Accept: application/json header
        let req = self.post("geofence/rules").json(&json!({"Rule": rule}));
        check(req.send().await?, "POST geofence/rules").await?;
        info!(target: "dominode::gis", "created data rule {} on {}", rule.role_name, rule.workspace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Password;

    #[test]
    fn nested_names_handles_empty_collections() {
        let empty = json!({"workspaces": ""});
        assert!(nested_names(&empty, "workspaces", "workspace").is_empty());
        let full = json!({"workspaces": {"workspace": [{"name": "lsd", "href": "x"}, {"name": "ppd"}]}});
        assert_eq!(nested_names(&full, "workspaces", "workspace"), vec!["lsd", "ppd"]);
    }

    #[test]
    fn datastore_body_lists_connection_entries() {
        let body = datastore_body(&PostgisStore {
            name: "dominode_db_lsd".into(),
            host: "db".into(),
            port: 5432,
            database: "dominode".into(),
            user: "lsd_geoserver".into(),
            password: Password::new("pw"),
        });
        let entries = body["dataStore"]["connectionParameters"]["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[1], json!({"@key": "port", "$": "5432"}));
        assert_eq!(entries[5], json!({"@key": "dbtype", "$": "postgis"}));
    }

    #[test]
    fn rules_payload_without_rules_is_empty() {
        assert!(parse_rules(&json!({"count": 0})).unwrap().is_empty());
        let rules = parse_rules(&json!({"count": 1, "rules": [{"id": 3, "roleName": "ROLE_PPD-EDITOR", "workspace": "ppd"}]})).unwrap();
        assert!(rules[0].matches("ROLE_PPD-EDITOR", "ppd"));
    }
}
