mod common;

use common::FakeRunner;
use stackup::config::ServiceConfig;
use stackup::service::{compose_declares_service, parse_container_status, ContainerState};
use stackup::{BootstrapError, ManagedServiceBootstrapper, ProjectRoot, StepAction, UseDefaults};
use std::sync::Arc;

const COMPOSE: &str = r#"
services:
  neo4j:
    image: neo4j:5.15
    container_name: kosmos-neo4j
    ports:
      - "7474:7474"
      - "7687:7687"
  redis:
    image: redis:7
"#;

const STATUS_QUERY: &str = "docker ps -a --filter name=^/kosmos-neo4j$ --format {{.Status}}";

fn service_config(http_port: u16, bolt_port: u16) -> ServiceConfig {
    ServiceConfig {
        host: "127.0.0.1".to_string(),
        http_port,
        bolt_port,
        poll_interval_secs: 1,
        poll_ceiling_secs: 1,
        ..ServiceConfig::default()
    }
}

fn project_with_compose() -> (tempfile::TempDir, ProjectRoot) {
    let (dir, root) = common::temp_project();
    common::write(&root, "docker-compose.yml", COMPOSE);
    (dir, root)
}

fn bootstrapper(root: ProjectRoot, config: ServiceConfig, runner: Arc<FakeRunner>) -> ManagedServiceBootstrapper {
    ManagedServiceBootstrapper::new(root, config, "docker", runner, Arc::new(UseDefaults))
}

#[tokio::test]
async fn test_daemon_down_fails_without_starting_anything() {
    let (_dir, root) = project_with_compose();
    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));
    runner.fail("docker info", "Cannot connect to the Docker daemon at unix:///var/run/docker.sock");

    let err = bootstrapper(root, service_config(7474, 7687), runner.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::DaemonUnavailable(_)));
    assert_eq!(runner.calls(), vec!["docker info".to_string()]);
    assert!(!runner.was_called("docker compose"));
    assert!(!runner.was_called("docker start"));
}

#[tokio::test]
async fn test_missing_engine_binary() {
    let (_dir, root) = project_with_compose();
    let runner = Arc::new(FakeRunner::new());

    let err = bootstrapper(root, service_config(7474, 7687), runner)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::MissingTool { .. }));
}

#[tokio::test]
async fn test_running_service_declined_restart_is_verified() {
    let (_dir, root) = project_with_compose();
    let (http_port, _server) = common::open_port().await;
    let bolt_port = common::closed_port().await;

    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));
    runner.respond(STATUS_QUERY, 0, "Up 12 minutes (healthy)\n");

    let startup = bootstrapper(root, service_config(http_port, bolt_port), runner.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(startup.summary.step("service").unwrap().action, StepAction::Reused);
    assert_eq!(startup.summary.step("readiness").unwrap().action, StepAction::Verified);
    assert_eq!(
        startup.summary.step("secondary port").unwrap().action,
        StepAction::Warned
    );
    assert!(startup.readiness.is_ready());
    assert!(!runner.was_called("docker compose -f docker-compose.yml restart"));
    assert!(!runner.was_called("docker compose -f docker-compose.yml up"));

    // No .env: manifest defaults, and the details are still printed
    assert_eq!(startup.password_source, "manifest default");
    let info = startup.connection_info();
    assert!(info.contains(&format!("http://127.0.0.1:{}", http_port)));
    assert!(info.contains("kosmos-password"));
}

#[tokio::test]
async fn test_absent_container_is_created_via_compose() {
    let (_dir, root) = project_with_compose();
    common::write(
        &root,
        ".env",
        "NEO4J_URI=bolt://localhost:7687\nNEO4J_USER=neo4j\nNEO4J_PASSWORD=from-env\n",
    );
    let (http_port, _http) = common::open_port().await;
    let (bolt_port, _bolt) = common::open_port().await;

    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));
    runner.respond(STATUS_QUERY, 0, "");

    let startup = bootstrapper(root, service_config(http_port, bolt_port), runner.clone())
        .run()
        .await
        .unwrap();

    assert!(runner.was_called("docker compose -f docker-compose.yml up -d neo4j"));
    assert_eq!(startup.summary.step("service").unwrap().action, StepAction::Created);
    assert_eq!(
        startup.summary.step("service environment").unwrap().action,
        StepAction::Verified
    );
    assert!(startup.secondary_reachable);
    assert_eq!(startup.password, "from-env");
    assert_eq!(startup.password_source, ".env");
}

#[tokio::test]
async fn test_stopped_container_is_started_in_place() {
    let (_dir, root) = project_with_compose();
    let (http_port, _server) = common::open_port().await;

    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));
    runner.respond(STATUS_QUERY, 0, "Exited (0) 3 hours ago\n");

    let startup = bootstrapper(root, service_config(http_port, http_port), runner.clone())
        .run()
        .await
        .unwrap();

    assert!(runner.was_called("docker start kosmos-neo4j"));
    assert_eq!(startup.summary.step("service").unwrap().action, StepAction::Started);
}

#[tokio::test]
async fn test_never_ready_times_out_with_hint() {
    let (_dir, root) = project_with_compose();
    let port = common::closed_port().await;

    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));
    runner.respond(STATUS_QUERY, 0, "Up 2 seconds\n");

    let err = bootstrapper(root, service_config(port, port), runner)
        .run()
        .await
        .unwrap_err();

    match err {
        BootstrapError::Timeout(msg) => {
            assert!(msg.contains("logs neo4j"));
            // Coordinates survive the timeout so the operator can connect later
            assert!(msg.contains(&format!("bolt://127.0.0.1:{}", port)));
            assert!(msg.contains("kosmos-password"));
            assert!(msg.contains("manifest default"));
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_compose_without_service_is_config_error() {
    let (_dir, root) = common::temp_project();
    common::write(&root, "docker-compose.yml", "services:\n  redis:\n    image: redis:7\n");
    let runner = Arc::new(FakeRunner::with_tools(&["docker"]));

    let err = bootstrapper(root, service_config(7474, 7687), runner.clone())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Config(_)));
    assert!(!runner.was_called("docker compose -f"));
}

#[test]
fn test_compose_declares_service() {
    assert!(compose_declares_service(COMPOSE, "neo4j"));
    assert!(compose_declares_service(COMPOSE, "redis"));
    assert!(!compose_declares_service(COMPOSE, "postgres"));
    // Only service keys count, not nested ones
    assert!(!compose_declares_service(COMPOSE, "image"));
}

#[test]
fn test_container_status_parsing() {
    assert_eq!(parse_container_status("Up 5 minutes"), ContainerState::Running);
    assert_eq!(
        parse_container_status("Restarting (1) 2 seconds ago"),
        ContainerState::Running
    );
    assert_eq!(parse_container_status("Exited (137) 1 day ago"), ContainerState::Stopped);
    assert_eq!(parse_container_status("Created"), ContainerState::Stopped);
    assert_eq!(parse_container_status("  \n"), ContainerState::Absent);
}
