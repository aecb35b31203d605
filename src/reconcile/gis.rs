//! GeoNode groups plus GeoServer workspaces, GeoFence rules and datastores.
//!
//! Every public entry point runs inside a GeoNode login; the session is logged out
//! again whether or not the steps succeeded.

use tracing::{info, warn};

use super::StepRecorder;
use crate::config::Settings;
use crate::db::Password;
use crate::error::{Backend, BootstrapError, BootstrapResult};
use crate::gis::{GeoNodeAdmin, GeoServerAdmin, GroupProfile, PostgisStore};
use crate::ident;
use crate::naming::{self, Department};
use crate::outcome::{Report, SYSTEM_SCOPE};
use crate::policy::{gis_rules, UserRole};

const EDITOR_CATEGORY_DESCRIPTION: &str = "Groups with this category are allowed to sync GeoServer layers";
const INTERNAL_GROUP_DESCRIPTION: &str = "A group for internal DomiNode users";

pub struct GisReconciler<'a, N, G> {
    geonode: &'a N,
    geoserver: &'a G,
    settings: &'a Settings,
}

/// Body result first; a logout failure only surfaces when the body succeeded.
fn after_logout(body: BootstrapResult<()>, logout: BootstrapResult<()>) -> BootstrapResult<()> {
    match (body, logout) {
        (Err(e), Err(l)) => {
            warn!(target: "dominode::gis", "GeoNode logout failed after an earlier error: {l}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(l)) => Err(l.in_step(Backend::Gis, SYSTEM_SCOPE, "session", "logout")),
        (Ok(()), Ok(())) => Ok(()),
    }
}

impl<'a, N: GeoNodeAdmin, G: GeoServerAdmin> GisReconciler<'a, N, G> {
    pub fn new(geonode: &'a N, geoserver: &'a G, settings: &'a Settings) -> Self {
        GisReconciler { geonode, geoserver, settings }
    }

    async fn login(&self) -> BootstrapResult<()> {
        self.geonode.login().await.map_err(|e| e.in_step(Backend::Gis, SYSTEM_SCOPE, "session", "login"))
    }

    pub async fn bootstrap(&self, departments: &[Department], report: &mut Report) -> BootstrapResult<()> {
        self.login().await?;
        let body = self.bootstrap_in_session(departments, report).await;
        after_logout(body, self.geonode.logout().await)
    }

    async fn bootstrap_in_session(&self, departments: &[Department], report: &mut Report) -> BootstrapResult<()> {
        let category = self.editor_category(report).await?;
        for d in departments {
            self.department_in_session(d, category, report).await?;
        }
        let mut rec = StepRecorder::new(Backend::Gis, SYSTEM_SCOPE, report);
        let internal = naming::INTERNAL_GEONODE_GROUP;
        rec.step(
            "geonode group",
            internal,
            self.geonode.ensure_group_profile(internal, INTERNAL_GROUP_DESCRIPTION, None),
        )
        .await?;
        Ok(())
    }

    pub async fn add_department(&self, d: &Department, report: &mut Report) -> BootstrapResult<()> {
        self.login().await?;
        let body = self.single_department_in_session(d, report).await;
        after_logout(body, self.geonode.logout().await)
    }

    async fn single_department_in_session(&self, d: &Department, report: &mut Report) -> BootstrapResult<()> {
        let category = self.editor_category(report).await?;
        self.department_in_session(d, category, report).await
    }

    async fn editor_category(&self, report: &mut Report) -> BootstrapResult<i64> {
        let mut rec = StepRecorder::new(Backend::Gis, SYSTEM_SCOPE, report);
        let name = naming::EDITOR_GROUP_CATEGORY;
        let mut id = 0;
        rec.step("group category", name, async {
            let (applied, category) = self.geonode.ensure_group_category(name, EDITOR_CATEGORY_DESCRIPTION).await?;
            id = category.id;
            Ok(applied)
        })
        .await?;
        Ok(id)
    }

    async fn department_in_session(&self, d: &Department, category: i64, report: &mut Report) -> BootstrapResult<()> {
        let mut rec = StepRecorder::new(Backend::Gis, d.as_str(), report);
        let store_name = naming::datastore_name(d);
        // resolve the secret before touching anything
        let password = self.settings.geoserver_password(d).map_err(|e| rec.fail("datastore", &store_name, e))?;
        let db = self.settings.db().map_err(|e| rec.fail("datastore", &store_name, e))?;
        info!(target: "dominode::reconcile", "bootstrapping department {d} in GeoNode and GeoServer");

        let group = naming::geonode_group_name(d);
        let description = format!("A group for users that are allowed to administer {d} datasets");
        rec.step("geonode group", &group, self.geonode.ensure_group_profile(&group, &description, Some(category)))
            .await?;

        let workspace = naming::workspace_name(d);
        rec.step("workspace", &workspace, self.geoserver.ensure_workspace(&workspace)).await?;

        let rules = gis_rules(d, UserRole::Editor);
        rec.step("admin rule", &rules.admin.role_name, self.geoserver.ensure_admin_rule(&rules.admin)).await?;
        if let Some(data) = &rules.data {
            rec.step("data rule", &data.role_name, self.geoserver.ensure_data_rule(data)).await?;
        }

        let store = PostgisStore {
            name: store_name.clone(),
            host: db.host,
            port: db.port,
            database: db.name,
            user: naming::geoserver_db_user(d),
            password: Password::new(password),
        };
        rec.step("datastore", &store_name, self.geoserver.ensure_datastore(&workspace, &store)).await?;
        Ok(())
    }

    /// Create the GeoNode account and add it to the groups for `role`.
    ///
    /// Department secrets and target groups are all resolved before the account is
    /// created, so a misconfigured department leaves GeoNode untouched.
    pub async fn add_department_user(
        &self,
        username: &str,
        password: &str,
        departments: &[Department],
        role: UserRole,
        report: &mut Report,
    ) -> BootstrapResult<()> {
        ident::validate_account_name(username)?;
        if departments.is_empty() {
            return Err(BootstrapError::invalid("department list", "", "at least one department is required"));
        }
        let departments = naming::canonical_departments(departments);
        for d in &departments {
            self.settings
                .geoserver_password(d)
                .map_err(|e| e.in_step(Backend::Gis, d.as_str(), "datastore", &naming::datastore_name(d)))?;
        }

        self.login().await?;
        let body = self.user_in_session(username, password, &departments, role, report).await;
        after_logout(body, self.geonode.logout().await)
    }

    async fn user_in_session(
        &self,
        username: &str,
        password: &str,
        departments: &[Department],
        role: UserRole,
        report: &mut Report,
    ) -> BootstrapResult<()> {
        let names: Vec<String> = match role {
            UserRole::Editor => departments.iter().map(naming::geonode_group_name).collect(),
            UserRole::RegularUser => vec![naming::INTERNAL_GEONODE_GROUP.to_string()],
        };
        let mut rec = StepRecorder::new(Backend::Gis, username, report);

        let mut groups: Vec<GroupProfile> = Vec::with_capacity(names.len());
        for name in &names {
            match self.geonode.group_profile(name).await {
                Ok(Some(group)) => groups.push(group),
                Ok(None) => {
                    let missing = BootstrapError::rejected(
                        Backend::Gis,
                        "resolve group",
                        None,
                        format!("GeoNode group {name:?} does not exist, bootstrap its department first"),
                    );
                    return Err(rec.fail("geonode group", name, missing));
                }
                Err(e) => return Err(rec.fail("geonode group", name, e)),
            }
        }

        rec.step("geonode user", username, self.geonode.ensure_user(username, password)).await?;
        for group in &groups {
            rec.step(
                "group member",
                &format!("{username} -> {}", group.title),
                self.geonode.ensure_group_member(username, group),
            )
            .await?;
        }
        Ok(())
    }
}
