//! GeoNode admin session.
//!
//! GeoNode has no REST endpoints for most writes, so mutations go through the HTML
//! forms like a browser would: GET the form (or a related page) to obtain the
//! `csrftoken` cookie, then POST the form fields with `csrfmiddlewaretoken` and a
//! `Referer` header. Reads use the paginated `/api/` endpoints.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, REFERER, SET_COOKIE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use super::geoserver::check;
use super::{GeoNodeAdmin, GroupCategory, GroupProfile};
use crate::config::WebSettings;
use crate::error::{Backend, BootstrapError, BootstrapResult};

const CSRF_COOKIE: &str = "csrftoken";
const LOGIN_PATH: &str = "/account/login/";

pub struct GeoNodeSession {
    base: Url,
    username: String,
    password: String,
    jar: Arc<Jar>,
    client: reqwest::Client,
}

/// Value of `name` in a `Cookie`-style header (`a=1; b=2`).
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// Value of cookie `name` among the `Set-Cookie` headers of a response.
pub fn set_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get_all(SET_COOKIE).iter().find_map(|val| {
        let s = val.to_str().ok()?;
        // name=value before the first ';'
        let nv = s.split_once(';').map(|(nv, _)| nv).unwrap_or(s);
        cookie_value(nv, name)
    })
}

/// Objects of one page and the link to the next one.
pub fn page_objects(payload: &Value) -> (Vec<Value>, Option<String>) {
    let objects = payload.get("objects").and_then(Value::as_array).cloned().unwrap_or_default();
    let next = payload
        .get("meta")
        .and_then(|m| m.get("next"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    (objects, next)
}

impl GeoNodeSession {
    pub fn new(settings: &WebSettings) -> BootstrapResult<Self> {
        let base = Url::parse(&format!("{}/", settings.base_url))
            .map_err(|e| BootstrapError::config("geonode.base_url", e.to_string()))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder().cookie_provider(jar.clone()).build()?;
        Ok(GeoNodeSession {
            base,
            username: settings.admin_username.clone(),
            password: settings.admin_password.clone(),
            jar,
            client,
        })
    }

    fn url(&self, path: &str) -> BootstrapResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| BootstrapError::internal(format!("bad GeoNode path {path:?}: {e}")))
    }

    fn csrf_token(&self, url: &Url, headers: &HeaderMap) -> Option<String> {
        set_cookie_value(headers, CSRF_COOKIE).or_else(|| {
            let stored = self.jar.cookies(url)?;
            cookie_value(stored.to_str().ok()?, CSRF_COOKIE)
        })
    }

    /// GET `csrf_path` (or `path`) for a CSRF token, then POST the form to `path`.
    async fn submit_form(
        &self,
        path: &str,
        csrf_path: Option<&str>,
        fields: &[(&str, &str)],
    ) -> BootstrapResult<reqwest::Response> {
        let target = self.url(path)?;
        let token_url = match csrf_path {
            Some(p) => self.url(p)?,
            None => target.clone(),
        };
        debug!(target: "dominode::gis", "GET {token_url}");
        let page = check(self.client.get(token_url.clone()).send().await?, &format!("GET {path}")).await?;
        let token = self.csrf_token(&token_url, page.headers()).ok_or_else(|| {
            BootstrapError::rejected(Backend::Gis, format!("GET {path}"), None, "csrftoken cookie missing")
        })?;

        let mut form: Vec<(&str, &str)> = fields.to_vec();
        form.push(("csrfmiddlewaretoken", token.as_str()));
        debug!(target: "dominode::gis", "POST {target}");
        let resp = self
            .client
            .post(target.clone())
            .header(REFERER, target.as_str())
            .form(&form)
            .send()
            .await?;
        check(resp, &format!("POST {path}")).await
    }

    async fn get_json(&self, url: Url) -> BootstrapResult<Value> {
        let op = format!("GET {}", url.path());
        debug!(target: "dominode::gis", "GET {url}");
        let resp = check(self.client.get(url).send().await?, &op).await?;
        Ok(resp.json().await?)
    }

    /// Every object of a paginated API listing, following `meta.next`.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> BootstrapResult<Vec<T>> {
        let mut out = Vec::new();
        let mut next = Some(self.url(path)?);
        while let Some(url) = next.take() {
            let (objects, link) = page_objects(&self.get_json(url.clone()).await?);
            for obj in objects {
                out.push(serde_json::from_value(obj)?);
            }
            if let Some(link) = link {
                next = Some(
                    url.join(&link)
                        .map_err(|e| BootstrapError::internal(format!("bad next link {link:?}: {e}")))?,
                );
            }
        }
        Ok(out)
    }
}

impl GeoNodeAdmin for GeoNodeSession {
    async fn login(&self) -> BootstrapResult<()> {
        let resp = self
            .submit_form(LOGIN_PATH, None, &[("login", self.username.as_str()), ("password", self.password.as_str())])
            .await?;
        // a failed login re-renders the form instead of redirecting away from it
        if resp.url().path().ends_with(LOGIN_PATH) {
            return Err(BootstrapError::rejected(
                Backend::Gis,
                format!("POST {LOGIN_PATH}"),
                Some(resp.status().as_u16().to_string()),
                format!("login as {} was refused", self.username),
            ));
        }
        info!(target: "dominode::gis", "logged in to GeoNode as {}", self.username);
        Ok(())
    }

    async fn logout(&self) -> BootstrapResult<()> {
        self.submit_form("/account/logout/", None, &[]).await?;
        debug!(target: "dominode::gis", "logged out of GeoNode");
        Ok(())
    }

    async fn list_group_profiles(&self) -> BootstrapResult<Vec<GroupProfile>> {
        self.list_all("/api/group_profile/").await
    }

    async fn group_profile(&self, title: &str) -> BootstrapResult<Option<GroupProfile>> {
        let mut url = self.url("/api/group_profile/")?;
        url.query_pairs_mut().append_pair("title", title);
        let (objects, _) = page_objects(&self.get_json(url).await?);
        for obj in objects {
            let group: GroupProfile = serde_json::from_value(obj)?;
            if group.title == title {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    async fn list_group_categories(&self) -> BootstrapResult<Vec<GroupCategory>> {
        self.list_all("/api/groupcategory/").await
    }

    async fn create_group_category(&self, name: &str, description: &str) -> BootstrapResult<()> {
        self.submit_form(
            "/en/admin/groups/groupcategory/add/",
            None,
            &[("name_en", name), ("description", description), ("_save", "Save")],
        )
        .await?;
        info!(target: "dominode::gis", "created group category {name}");
        Ok(())
    }

    async fn create_group_profile(&self, title: &str, description: &str, category: Option<i64>) -> BootstrapResult<()> {
        let category = category.map(|c| c.to_string());
        let mut fields = vec![("title", title), ("description", description), ("access", "public-invite")];
        if let Some(c) = &category {
            fields.push(("categories", c.as_str()));
        }
        self.submit_form("/groups/create/", None, &fields).await?;
        info!(target: "dominode::gis", "created GeoNode group {title}");
        Ok(())
    }

    async fn user_exists(&self, username: &str) -> BootstrapResult<bool> {
        let mut url = self.url("/api/profiles/")?;
        url.query_pairs_mut().append_pair("username", username);
        let payload = self.get_json(url).await?;
        let total = payload.get("meta").and_then(|m| m.get("total_count")).and_then(Value::as_u64).unwrap_or(0);
        Ok(total > 0)
    }

    async fn add_user(&self, username: &str, password: &str) -> BootstrapResult<()> {
        self.submit_form(
            "/en/admin/people/profile/add/",
            None,
            &[("username", username), ("password1", password), ("password2", password), ("_save", "Save")],
        )
        .await?;
        info!(target: "dominode::gis", "created GeoNode user {username}");
        Ok(())
    }

    async fn add_user_to_group(&self, username: &str, group_slug: &str) -> BootstrapResult<()> {
        let slug = urlencoding::encode(group_slug);
        let members_page = format!("/groups/group/{slug}/members/");
        self.submit_form(
            &format!("/groups/group/{slug}/members_add/"),
            Some(members_page.as_str()),
            &[("user_identifiers", username)],
        )
        .await?;
        info!(target: "dominode::gis", "added {username} to GeoNode group {group_slug}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn csrf_from_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("sessionid=abc; HttpOnly; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("csrftoken=tok123; expires=Thu, 01 Jan 2099 00:00:00 GMT; Path=/"));
        assert_eq!(set_cookie_value(&headers, CSRF_COOKIE).as_deref(), Some("tok123"));
        assert_eq!(set_cookie_value(&HeaderMap::new(), CSRF_COOKIE), None);
    }

    #[test]
    fn cookie_header_lookup() {
        assert_eq!(cookie_value("sessionid=1; csrftoken=zz", "csrftoken").as_deref(), Some("zz"));
        assert_eq!(cookie_value("sessionid=1", "csrftoken"), None);
    }

    #[test]
    fn page_objects_reads_next_link() {
        let (objs, next) = page_objects(&json!({
            "meta": {"next": "/api/group_profile/?limit=20&offset=20", "total_count": 25},
            "objects": [{"title": "lsd-editor", "slug": "lsd-editor"}]
        }));
        assert_eq!(objs.len(), 1);
        assert_eq!(next.as_deref(), Some("/api/group_profile/?limit=20&offset=20"));
        let (_, last) = page_objects(&json!({"meta": {"next": null}, "objects": []}));
        assert!(last.is_none());
    }

    #[test]
    fn base_url_with_path_prefix_is_kept() {
        let settings = WebSettings {
            base_url: "http://example.org/geonode".into(),
            admin_username: "admin".into(),
            admin_password: "admin".into(),
        };
        let session = GeoNodeSession::new(&settings).unwrap();
        assert_eq!(session.url("/api/profiles/").unwrap().as_str(), "http://example.org/geonode/api/profiles/");
    }
}
