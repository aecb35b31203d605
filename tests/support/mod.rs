//! In-memory backends for the reconciler tests.
//!
//! Each fake keeps just enough state to answer the existence checks the `ensure_*`
//! methods make, and records every mutating call in order.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use dominode_bootstrapper::db::{DatabaseAdmin, SchemaPrivilege, Statement, TablePrivilege};
use dominode_bootstrapper::gis::{GeoNodeAdmin, GeoServerAdmin, GroupCategory, GroupProfile, PostgisStore, RuleSummary};
use dominode_bootstrapper::minio::{GroupInfo, StorageAdmin};
use dominode_bootstrapper::policy::{AdminRule, DataRule, NamedPolicy};
use dominode_bootstrapper::{Backend, BootstrapError, BootstrapResult};

fn rejected(backend: Backend, operation: &str) -> BootstrapError {
    BootstrapError::rejected(backend, operation, Some("injected".into()), "failure injected by test")
}

// ---- database ----

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub owner: String,
    pub revoked_from_owner: Vec<&'static str>,
    pub grants: Vec<(String, &'static str)>,
}

#[derive(Debug)]
pub struct DbState {
    pub roles: BTreeMap<String, Vec<String>>,
    pub login_roles: BTreeSet<String>,
    pub schemas: BTreeMap<String, String>,
    /// (grantee label, schema, privilege keyword)
    pub schema_grants: Vec<(String, String, &'static str)>,
    pub tables: BTreeMap<(String, String), FakeTable>,
    pub executed: Vec<String>,
    pub fail_on: Option<String>,
}

pub struct FakeDb {
    pub state: Mutex<DbState>,
}

impl FakeDb {
    /// A fresh cluster: `postgres` superuser and a `public` schema open to PUBLIC.
    pub fn new() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert("postgres".to_string(), Vec::new());
        let mut schemas = BTreeMap::new();
        schemas.insert("public".to_string(), "postgres".to_string());
        let schema_grants = vec![
            ("PUBLIC".to_string(), "public".to_string(), "USAGE"),
            ("PUBLIC".to_string(), "public".to_string(), "CREATE"),
        ];
        FakeDb {
            state: Mutex::new(DbState {
                roles,
                login_roles: BTreeSet::new(),
                schemas,
                schema_grants,
                tables: BTreeMap::new(),
                executed: Vec::new(),
                fail_on: None,
            }),
        }
    }

    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().fail_on = Some(fragment.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    pub fn position(&self, fragment: &str) -> Option<usize> {
        self.state.lock().executed.iter().position(|s| s.contains(fragment))
    }
}

/// `role` plus every role it is a member of, transitively.
fn ancestry(roles: &BTreeMap<String, Vec<String>>, role: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut todo = vec![role.to_string()];
    while let Some(r) = todo.pop() {
        if seen.insert(r.clone()) {
            if let Some(parents) = roles.get(&r) {
                todo.extend(parents.iter().cloned());
            }
        }
    }
    seen
}

impl DatabaseAdmin for FakeDb {
    async fn role_exists(&self, role: &str) -> BootstrapResult<bool> {
        Ok(self.state.lock().roles.contains_key(role))
    }

    async fn schema_exists(&self, schema: &str) -> BootstrapResult<bool> {
        Ok(self.state.lock().schemas.contains_key(schema))
    }

    async fn table_exists(&self, schema: &str, table: &str) -> BootstrapResult<bool> {
        Ok(self.state.lock().tables.contains_key(&(schema.to_string(), table.to_string())))
    }

    async fn table_owner(&self, schema: &str, table: &str) -> BootstrapResult<Option<String>> {
        Ok(self.state.lock().tables.get(&(schema.to_string(), table.to_string())).map(|t| t.owner.clone()))
    }

    async fn has_schema_privilege(&self, role: &str, schema: &str, privilege: SchemaPrivilege) -> BootstrapResult<bool> {
        let state = self.state.lock();
        let mut holders = ancestry(&state.roles, role);
        holders.insert("PUBLIC".to_string());
        if state.schemas.get(schema).is_some_and(|owner| holders.contains(owner)) {
            return Ok(true);
        }
        Ok(state
            .schema_grants
            .iter()
            .any(|(g, s, p)| holders.contains(g) && s == schema && *p == privilege.keyword()))
    }

    async fn public_has_schema_privilege(&self, schema: &str, privilege: SchemaPrivilege) -> BootstrapResult<bool> {
        let state = self.state.lock();
        Ok(state.schema_grants.iter().any(|(g, s, p)| g == "PUBLIC" && s == schema && *p == privilege.keyword()))
    }

    async fn has_table_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: TablePrivilege,
    ) -> BootstrapResult<bool> {
        let state = self.state.lock();
        let holders = ancestry(&state.roles, role);
        let Some(t) = state.tables.get(&(schema.to_string(), table.to_string())) else {
            return Ok(false);
        };
        let keyword = privilege.keyword();
        if holders.contains(&t.owner) && !t.revoked_from_owner.contains(&keyword) {
            return Ok(true);
        }
        Ok(t.grants.iter().any(|(g, p)| holders.contains(g) && *p == keyword))
    }

    async fn execute(&self, statement: &Statement) -> BootstrapResult<()> {
        let sql = statement.to_log_sql()?;
        let mut state = self.state.lock();
        if state.fail_on.as_deref().is_some_and(|f| sql.contains(f)) {
            return Err(rejected(Backend::Database, &sql));
        }
        state.executed.push(sql);
        match statement {
            Statement::CreateRole(spec) => {
                if spec.password.is_some() {
                    state.login_roles.insert(spec.name.clone());
                }
                state.roles.insert(spec.name.clone(), spec.parents.clone());
            }
            Statement::CreateSchema { name, owner } => {
                state.schemas.entry(name.clone()).or_insert_with(|| owner.clone());
            }
            Statement::GrantOnSchema { schema, privileges, grantee } => {
                for p in privileges {
                    state.schema_grants.push((grantee.label().to_string(), schema.clone(), p.keyword()));
                }
            }
            Statement::RevokeOnSchema { schema, privileges, grantee } => {
                let label = grantee.label().to_string();
                state
                    .schema_grants
                    .retain(|(g, s, p)| !(*g == label && s == schema && privileges.iter().any(|x| x.keyword() == *p)));
            }
            Statement::CreateProjectsTable { schema } => {
                state.tables.entry((schema.clone(), "qgis_projects".to_string())).or_insert(FakeTable {
                    owner: "postgres".to_string(),
                    revoked_from_owner: Vec::new(),
                    grants: Vec::new(),
                });
            }
            Statement::AlterTableOwner { schema, table, owner } => {
                if let Some(t) = state.tables.get_mut(&(schema.clone(), table.clone())) {
                    t.owner = owner.clone();
                }
            }
            Statement::GrantOnTable { schema, table, privileges, grantee } => {
                if let Some(t) = state.tables.get_mut(&(schema.clone(), table.clone())) {
                    for p in privileges {
                        t.grants.push((grantee.label().to_string(), p.keyword()));
                    }
                }
            }
            Statement::RevokeOnTable { schema, table, privileges, grantee } => {
                if let Some(t) = state.tables.get_mut(&(schema.clone(), table.clone())) {
                    let label = grantee.label().to_string();
                    for p in privileges {
                        if label == t.owner {
                            t.revoked_from_owner.push(p.keyword());
                        }
                        t.grants.retain(|(g, k)| !(*g == label && *k == p.keyword()));
                    }
                }
            }
        }
        Ok(())
    }
}

// ---- object storage ----

#[derive(Debug, Default)]
pub struct StorageState {
    pub buckets: BTreeSet<String>,
    pub users: BTreeMap<String, String>,
    pub groups: BTreeMap<String, GroupInfo>,
    pub policies: BTreeMap<String, NamedPolicy>,
    pub user_policies: BTreeMap<String, String>,
    pub anonymous: BTreeMap<String, String>,
    pub calls: Vec<String>,
    pub fail_group_add: bool,
}

#[derive(Default)]
pub struct FakeStorage {
    pub state: Mutex<StorageState>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

impl StorageAdmin for FakeStorage {
    async fn make_bucket(&self, path: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("mb {path}"));
        s.buckets.insert(path.to_string());
        Ok(())
    }

    async fn list_users(&self) -> BootstrapResult<Vec<String>> {
        Ok(self.state.lock().users.keys().cloned().collect())
    }

    async fn add_user(&self, access_key: &str, secret_key: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("user add {access_key}"));
        s.users.insert(access_key.to_string(), secret_key.to_string());
        Ok(())
    }

    async fn remove_user(&self, access_key: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("user remove {access_key}"));
        s.users.remove(access_key);
        for g in s.groups.values_mut() {
            g.members.retain(|m| m != access_key);
        }
        Ok(())
    }

    async fn list_groups(&self) -> BootstrapResult<Vec<String>> {
        Ok(self.state.lock().groups.keys().cloned().collect())
    }

    async fn group_info(&self, group: &str) -> BootstrapResult<GroupInfo> {
        self.state
            .lock()
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| rejected(Backend::Storage, "admin group info"))
    }

    async fn add_group_members(&self, group: &str, members: &[String]) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("group add {group} {}", members.join(" ")));
        if s.fail_group_add {
            return Err(rejected(Backend::Storage, "admin group add"));
        }
        let info = s
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupInfo { name: group.to_string(), ..GroupInfo::default() });
        for m in members {
            if !info.has_member(m) {
                info.members.push(m.clone());
            }
        }
        Ok(())
    }

    async fn list_policies(&self) -> BootstrapResult<Vec<String>> {
        Ok(self.state.lock().policies.keys().cloned().collect())
    }

    async fn add_policy(&self, policy: &NamedPolicy) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("policy add {}", policy.name));
        s.policies.insert(policy.name.clone(), policy.clone());
        Ok(())
    }

    async fn set_group_policy(&self, policy: &str, group: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("policy set {policy} group={group}"));
        let info = s.groups.get_mut(group).ok_or_else(|| rejected(Backend::Storage, "admin policy set"))?;
        info.policies = vec![policy.to_string()];
        Ok(())
    }

    async fn set_user_policy(&self, policy: &str, access_key: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("policy set {policy} user={access_key}"));
        s.user_policies.insert(access_key.to_string(), policy.to_string());
        Ok(())
    }

    async fn anonymous_permission(&self, path: &str) -> BootstrapResult<Option<String>> {
        Ok(self.state.lock().anonymous.get(path).cloned())
    }

    async fn set_anonymous_download(&self, path: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("anonymous download {path}"));
        s.anonymous.insert(path.to_string(), "download".to_string());
        Ok(())
    }
}

// ---- GeoNode ----

#[derive(Debug, Default)]
pub struct GeoNodeState {
    pub logged_in: bool,
    pub logins: usize,
    pub logouts: usize,
    pub categories: Vec<GroupCategory>,
    pub groups: Vec<(GroupProfile, Option<i64>)>,
    pub users: BTreeMap<String, String>,
    pub memberships: BTreeSet<(String, String)>,
    pub calls: Vec<String>,
    pub fail_login: bool,
    pub fail_group_create: bool,
}

#[derive(Default)]
pub struct FakeGeoNode {
    pub state: Mutex<GeoNodeState>,
}

impl FakeGeoNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn require_session(&self) -> BootstrapResult<()> {
        if self.state.lock().logged_in {
            Ok(())
        } else {
            Err(BootstrapError::rejected(Backend::Gis, "GeoNode request", Some("403".into()), "not logged in"))
        }
    }
}

impl GeoNodeAdmin for FakeGeoNode {
    async fn login(&self) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push("login".to_string());
        if s.fail_login {
            return Err(BootstrapError::rejected(Backend::Gis, "login", None, "bad credentials"));
        }
        s.logged_in = true;
        s.logins += 1;
        Ok(())
    }

    async fn logout(&self) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push("logout".to_string());
        s.logged_in = false;
        s.logouts += 1;
        Ok(())
    }

    async fn list_group_profiles(&self) -> BootstrapResult<Vec<GroupProfile>> {
        self.require_session()?;
        Ok(self.state.lock().groups.iter().map(|(g, _)| g.clone()).collect())
    }

    async fn group_profile(&self, title: &str) -> BootstrapResult<Option<GroupProfile>> {
        self.require_session()?;
        let mut s = self.state.lock();
        s.calls.push(format!("lookup group {title}"));
        Ok(s.groups.iter().map(|(g, _)| g).find(|g| g.title == title).cloned())
    }

    async fn list_group_categories(&self) -> BootstrapResult<Vec<GroupCategory>> {
        self.require_session()?;
        Ok(self.state.lock().categories.clone())
    }

    async fn create_group_category(&self, name: &str, _description: &str) -> BootstrapResult<()> {
        self.require_session()?;
        let mut s = self.state.lock();
        s.calls.push(format!("create category {name}"));
        let id = s.categories.len() as i64 + 1;
        s.categories.push(GroupCategory { id, name: name.to_string() });
        Ok(())
    }

    async fn create_group_profile(&self, title: &str, _description: &str, category: Option<i64>) -> BootstrapResult<()> {
        self.require_session()?;
        let mut s = self.state.lock();
        s.calls.push(format!("create group {title}"));
        if s.fail_group_create {
            return Err(BootstrapError::rejected(Backend::Gis, "POST /groups/create/", Some("500".into()), "boom"));
        }
        let id = s.groups.len() as i64 + 1;
        let profile = GroupProfile { id: Some(id), title: title.to_string(), slug: title.to_ascii_lowercase() };
        s.groups.push((profile, category));
        Ok(())
    }

    async fn user_exists(&self, username: &str) -> BootstrapResult<bool> {
        self.require_session()?;
        Ok(self.state.lock().users.contains_key(username))
    }

    async fn add_user(&self, username: &str, password: &str) -> BootstrapResult<()> {
        self.require_session()?;
        let mut s = self.state.lock();
        s.calls.push(format!("add user {username}"));
        s.users.insert(username.to_string(), password.to_string());
        Ok(())
    }

    async fn add_user_to_group(&self, username: &str, group_slug: &str) -> BootstrapResult<()> {
        self.require_session()?;
        let mut s = self.state.lock();
        s.calls.push(format!("add member {username} -> {group_slug}"));
        s.memberships.insert((username.to_string(), group_slug.to_string()));
        Ok(())
    }
}

// ---- GeoServer ----

#[derive(Debug, Default)]
pub struct GeoServerState {
    pub workspaces: Vec<String>,
    pub datastores: BTreeMap<String, Vec<PostgisStore>>,
    pub admin_rules: Vec<AdminRule>,
    pub data_rules: Vec<DataRule>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeGeoServer {
    pub state: Mutex<GeoServerState>,
}

impl FakeGeoServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

impl GeoServerAdmin for FakeGeoServer {
    async fn list_workspaces(&self) -> BootstrapResult<Vec<String>> {
        Ok(self.state.lock().workspaces.clone())
    }

    async fn create_workspace(&self, name: &str) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("create workspace {name}"));
        s.workspaces.push(name.to_string());
        Ok(())
    }

    async fn list_datastores(&self, workspace: &str) -> BootstrapResult<Vec<String>> {
        let s = self.state.lock();
        Ok(s.datastores.get(workspace).map(|v| v.iter().map(|d| d.name.clone()).collect()).unwrap_or_default())
    }

    async fn create_postgis_datastore(&self, workspace: &str, store: &PostgisStore) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("create datastore {workspace}:{}", store.name));
        s.datastores.entry(workspace.to_string()).or_default().push(store.clone());
        Ok(())
    }

    async fn list_admin_rules(&self) -> BootstrapResult<Vec<RuleSummary>> {
        Ok(self
            .state
            .lock()
            .admin_rules
            .iter()
            .map(|r| RuleSummary {
                role_name: Some(r.role_name.clone()),
                workspace: Some(r.workspace.clone()),
                ..RuleSummary::default()
            })
            .collect())
    }

    async fn create_admin_rule(&self, rule: &AdminRule) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("create admin rule {}@{}", rule.role_name, rule.workspace));
        s.admin_rules.push(rule.clone());
        Ok(())
    }

    async fn list_data_rules(&self) -> BootstrapResult<Vec<RuleSummary>> {
        Ok(self
            .state
            .lock()
            .data_rules
            .iter()
            .map(|r| RuleSummary {
                role_name: Some(r.role_name.clone()),
                workspace: Some(r.workspace.clone()),
                access: Some(r.access.clone()),
                ..RuleSummary::default()
            })
            .collect())
    }

    async fn create_data_rule(&self, rule: &DataRule) -> BootstrapResult<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("create data rule {}@{}", rule.role_name, rule.workspace));
        s.data_rules.push(rule.clone());
        Ok(())
    }
}
