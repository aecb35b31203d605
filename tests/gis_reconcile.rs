//! GeoNode and GeoServer reconciliation against in-memory backends.

mod support;

use pretty_assertions::assert_eq;

use dominode_bootstrapper::policy::AdminAccess;
use dominode_bootstrapper::reconcile::GisReconciler;
use dominode_bootstrapper::{Applied, Backend, Department, Report, Settings, UserRole};
use support::{FakeGeoNode, FakeGeoServer};

fn departments(raw: &[&str]) -> Vec<Department> {
    raw.iter().map(|d| Department::parse(d).unwrap()).collect()
}

#[tokio::test]
async fn bootstrap_provisions_groups_workspaces_and_rules() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let mut report = Report::new();
    GisReconciler::new(&geonode, &geoserver, &settings)
        .bootstrap(&departments(&["ppd", "lsd"]), &mut report)
        .await
        .unwrap();

    let node = geonode.state.lock();
    assert_eq!(node.categories.len(), 1);
    assert_eq!(node.categories[0].name, "dominode-editor");
    let titles: Vec<&str> = node.groups.iter().map(|(g, _)| g.title.as_str()).collect();
    assert_eq!(titles, vec!["ppd-editor", "lsd-editor", "dominode-internal"]);
    // department groups carry the editor category, the internal group does not
    assert_eq!(node.groups[0].1, Some(node.categories[0].id));
    assert_eq!(node.groups[2].1, None);
    assert_eq!((node.logins, node.logouts), (1, 1));
    assert!(!node.logged_in);

    let server = geoserver.state.lock();
    assert_eq!(server.workspaces, vec!["ppd".to_string(), "lsd".to_string()]);
    let rule = &server.admin_rules[0];
    assert_eq!(rule.role_name, "ROLE_PPD-EDITOR");
    assert_eq!(rule.access, AdminAccess::Admin);
    assert_eq!(server.data_rules.len(), 2);
    let store = &server.datastores["lsd"][0];
    assert_eq!(store.name, "dominode_db_lsd");
    assert_eq!(store.user, "lsd_geoserver");
    assert_eq!(store.password.expose(), "dominode");
}

#[tokio::test]
async fn second_run_creates_nothing() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let depts = departments(&["ppd"]);
    let reconciler = GisReconciler::new(&geonode, &geoserver, &settings);

    let mut first = Report::new();
    reconciler.bootstrap(&depts, &mut first).await.unwrap();
    let server_calls = geoserver.calls().len();

    let mut second = Report::new();
    reconciler.bootstrap(&depts, &mut second).await.unwrap();
    assert_eq!(second.mutations(), 0);
    assert_eq!(geoserver.calls().len(), server_calls);
    assert!(second.fully_provisioned(Backend::Gis, "ppd"));
}

#[tokio::test]
async fn missing_secret_fails_user_addition_before_login() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let mut report = Report::new();
    let err = GisReconciler::new(&geonode, &geoserver, &settings)
        .add_department_user("frank", "pw-frank", &departments(&["ppd", "fin"]), UserRole::Editor, &mut report)
        .await
        .unwrap_err();
    assert!(err.is_config(), "{err}");
    assert!(err.to_string().contains("fin"), "{err}");
    assert!(geonode.calls().is_empty());
    assert!(geoserver.calls().is_empty());
}

#[tokio::test]
async fn missing_group_is_reported_before_the_account_is_created() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let mut report = Report::new();
    let err = GisReconciler::new(&geonode, &geoserver, &settings)
        .add_department_user("gina", "pw-gina", &departments(&["lsd"]), UserRole::Editor, &mut report)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("lsd-editor"), "{err}");

    let node = geonode.state.lock();
    assert!(node.users.is_empty());
    assert_eq!((node.logins, node.logouts), (1, 1));
}

#[tokio::test]
async fn editor_joins_every_department_group() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let reconciler = GisReconciler::new(&geonode, &geoserver, &settings);
    let depts = departments(&["ppd", "lsd"]);
    let mut report = Report::new();
    reconciler.bootstrap(&depts, &mut report).await.unwrap();

    let mut user_report = Report::new();
    reconciler.add_department_user("hank", "pw-hank", &depts, UserRole::Editor, &mut user_report).await.unwrap();
    let node = geonode.state.lock();
    assert!(node.users.contains_key("hank"));
    assert!(node.memberships.contains(&("hank".to_string(), "lsd-editor".to_string())));
    assert!(node.memberships.contains(&("hank".to_string(), "ppd-editor".to_string())));
    assert_eq!(user_report.count(Applied::Ensured), 2);
}

#[tokio::test]
async fn regular_user_joins_internal_group_only() {
    let geonode = FakeGeoNode::new();
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let reconciler = GisReconciler::new(&geonode, &geoserver, &settings);
    let mut report = Report::new();
    reconciler.bootstrap(&departments(&["ppd"]), &mut report).await.unwrap();

    reconciler
        .add_department_user("ivy", "pw-ivy", &departments(&["ppd"]), UserRole::RegularUser, &mut report)
        .await
        .unwrap();
    let node = geonode.state.lock();
    let groups: Vec<&str> =
        node.memberships.iter().filter(|(u, _)| u == "ivy").map(|(_, g)| g.as_str()).collect();
    assert_eq!(groups, vec!["dominode-internal"]);
}

#[tokio::test]
async fn session_is_logged_out_after_a_failed_step() {
    let geonode = FakeGeoNode::new();
    geonode.state.lock().fail_group_create = true;
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let mut report = Report::new();
    let err = GisReconciler::new(&geonode, &geoserver, &settings)
        .add_department(&Department::parse("ppd").unwrap(), &mut report)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
    let calls = geonode.calls();
    assert_eq!(calls.last().map(String::as_str), Some("logout"));
    assert!(geoserver.calls().is_empty());
}

#[tokio::test]
async fn failed_login_does_not_touch_anything() {
    let geonode = FakeGeoNode::new();
    geonode.state.lock().fail_login = true;
    let geoserver = FakeGeoServer::new();
    let settings = Settings::defaults();
    let mut report = Report::new();
    let err = GisReconciler::new(&geonode, &geoserver, &settings)
        .bootstrap(&departments(&["ppd"]), &mut report)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert_eq!(geonode.calls(), vec!["login".to_string()]);
    assert!(report.steps.is_empty());
}
