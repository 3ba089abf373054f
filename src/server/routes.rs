//! Router and shared state
//!
//! Builds the axum application: filesystem, terminal, session and process
//! routes behind the peer and token checks.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{auth, handler, terminal};
use crate::config::Settings;
use crate::files::FileExplorer;
use crate::process::ProcessManager;
use crate::shell::ShellManager;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Filesystem operations
    pub explorer: Arc<FileExplorer>,
    /// Live terminal sessions
    pub shells: Arc<ShellManager>,
    /// Supervised processes
    pub processes: Arc<ProcessManager>,
    /// Resolved settings
    pub settings: Arc<Settings>,
    /// Fired once when the server shuts down
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Build the services from resolved settings
    ///
    /// Loads persisted process definitions but does not start them.
    pub async fn new(settings: Settings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let processes = ProcessManager::load(settings.processes_file.clone()).await;

        Self {
            explorer: Arc::new(FileExplorer::new(settings.root.clone())),
            shells: Arc::new(ShellManager::new(settings.shell.clone())),
            processes: Arc::new(processes),
            settings: Arc::new(settings),
            shutdown_tx,
        }
    }
}

/// Create the application router
pub fn create_app(state: AppState) -> Router {
    // The frontend is served from elsewhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handler::health))
        // Filesystem
        .route("/files", get(handler::list_files))
        .route(
            "/file",
            get(handler::read_file)
                .post(handler::write_file)
                .delete(handler::delete_file),
        )
        .route("/mkdir", post(handler::make_dir))
        // Terminals
        .route("/terminal/{session_id}", get(terminal::terminal_handler))
        .route("/sessions", get(handler::list_sessions))
        .route("/sessions/{session_id}", delete(handler::close_session))
        .route("/sessions/{session_id}/resize", post(handler::resize_session))
        // Managed processes
        .route(
            "/processes",
            get(handler::list_processes).post(handler::create_process),
        )
        .route("/processes/{id}", get(handler::get_process))
        .route("/processes/{id}/start", post(handler::start_process))
        .route("/processes/{id}/stop", post(handler::stop_process))
        .route("/processes/{id}/input", post(handler::process_input))
        .route("/processes/{id}/logs", get(handler::process_logs))
        // Runs after the peer check
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::filter_peers,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellSettings;
    use crate::server::{ContentResponse, ErrorBody, ErrorCode, StatusResponse};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use axum::extract::ConnectInfo;
    use std::net::SocketAddr;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn test_settings(dir: &Path, token: Option<&str>) -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            port: 0,
            token: token.map(str::to_string),
            shell: ShellSettings {
                program: "/bin/sh".to_string(),
                args: Vec::new(),
                cwd: dir.to_path_buf(),
            },
            root: None,
            processes_file: dir.join("processes.json"),
            allow_public_peers: false,
        }
    }

    async fn test_state(dir: &Path, token: Option<&str>) -> AppState {
        AppState::new(test_settings(dir, token)).await
    }

    async fn test_app(token: Option<&str>) -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let app = create_app(test_state(dir.path(), token).await);
        (app, dir)
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn query_path(path: &Path) -> String {
        crate::files::to_api_path(path).replace(' ', "%20")
    }

    #[tokio::test]
    async fn test_health_check_route() {
        let (app, _dir) = test_app(None).await;
        let response = app.oneshot(request(Method::GET, "/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: StatusResponse = json_body(response).await;
        assert_eq!(body, StatusResponse::running());
    }

    #[tokio::test]
    async fn test_health_check_is_public() {
        let (app, _dir) = test_app(Some("secret")).await;
        let response = app.oneshot(request(Method::GET, "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_required() {
        let (app, _dir) = test_app(Some("secret")).await;

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/files"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.code, Some(ErrorCode::AuthRequired));

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/files?token=wrong"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/files?token=secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/files")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_roots() {
        let (app, _dir) = test_app(None).await;
        let response = app.oneshot(request(Method::GET, "/files")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let entries: Vec<serde_json::Value> = json_body(response).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["path"], "/");
        assert_eq!(entries[0]["kind"], "drive");
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let (app, dir) = test_app(None).await;
        let file = dir.path().join("notes").join("todo.txt");
        let uri = format!("/file?path={}", query_path(&file));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(&uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"content":"buy milk"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: StatusResponse = json_body(response).await;
        assert_eq!(body.status, "saved");

        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri))
            .await
            .unwrap();
        let body: ContentResponse = json_body(response).await;
        assert_eq!(body.content, "buy milk");

        // Content in the query string wins over the body
        let response = app
            .clone()
            .oneshot(request(Method::POST, &format!("{}&content=eggs", uri)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "eggs");

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, &uri))
            .await
            .unwrap();
        let body: StatusResponse = json_body(response).await;
        assert_eq!(body.status, "deleted");
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_mkdir_and_non_empty_delete() {
        let (app, dir) = test_app(None).await;
        let nested = dir.path().join("a").join("b");
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/mkdir?path={}", query_path(&nested)),
            ))
            .await
            .unwrap();
        let body: StatusResponse = json_body(response).await;
        assert_eq!(body.status, "created");
        assert!(nested.is_dir());

        let parent = dir.path().join("a");
        let response = app
            .oneshot(request(
                Method::DELETE,
                &format!("/file?path={}", query_path(&parent)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.detail, "Directory not empty (or in use)");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let (app, dir) = test_app(None).await;
        let missing = dir.path().join("missing.txt");
        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/file?path={}", query_path(&missing)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.detail, "Not found");
        assert_eq!(body.code, Some(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_relative_path_rejected() {
        let (app, _dir) = test_app(None).await;
        let response = app
            .oneshot(request(Method::GET, "/file?path=relative/file.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sessions_and_processes_routes() {
        let (app, _dir) = test_app(None).await;

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/sessions"))
            .await
            .unwrap();
        let sessions: Vec<serde_json::Value> = json_body(response).await;
        assert!(sessions.is_empty());

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/sessions/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/sessions/ghost/resize")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"cols":0,"rows":24}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/processes"))
            .await
            .unwrap();
        let processes: Vec<serde_json::Value> = json_body(response).await;
        assert!(processes.is_empty());

        let response = app
            .oneshot(request(Method::GET, "/processes/ghost/logs"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_process_route() {
        let (app, dir) = test_app(None).await;
        let body = serde_json::json!({
            "id": "worker",
            "working_dir": dir.path().join("worker"),
            "command": ["sleep", "30"],
            "autostart": false,
        });

        let create = || {
            Request::builder()
                .method(Method::POST)
                .uri("/processes")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(create()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info: serde_json::Value = json_body(response).await;
        assert_eq!(info["status"], "running");

        let response = app.clone().oneshot(create()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(request(Method::POST, "/processes/worker/stop"))
            .await
            .unwrap();
        let info: serde_json::Value = json_body(response).await;
        assert_eq!(info["status"], "stopped");
    }

    fn from_peer(uri: &str, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        let mut request = request(Method::GET, uri);
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_public_peer_rejected() {
        let (app, _dir) = test_app(None).await;

        let response = app
            .clone()
            .oneshot(from_peer("/sessions", "8.8.8.8:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.code, Some(ErrorCode::Forbidden));

        let response = app
            .clone()
            .oneshot(from_peer("/sessions", "100.64.3.7:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(from_peer("/sessions", "127.0.0.1:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_peers_allowed_when_configured() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(dir.path(), None);
        settings.allow_public_peers = true;
        let app = create_app(AppState::new(settings).await);

        let response = app
            .oneshot(from_peer("/sessions", "8.8.8.8:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_paths_outside_root_forbidden() {
        let dir = tempdir().unwrap();
        let jail = std::fs::canonicalize(dir.path()).unwrap();
        let mut settings = test_settings(dir.path(), None);
        settings.root = Some(jail.clone());
        let app = create_app(AppState::new(settings).await);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/files?path=/etc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.detail, "Path is outside the allowed root");

        let escape = format!("/file?path={}/../escape.txt&content=x", query_path(&jail));
        let response = app
            .clone()
            .oneshot(request(Method::POST, &escape))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/files?path={}", query_path(&jail)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let (app, _dir) = test_app(None).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/sessions/ghost/resize")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"cols":80}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = json_body(response).await;
        assert!(body.detail.contains("rows"), "detail: {}", body.detail);
        assert_eq!(body.code, Some(ErrorCode::InvalidRequest));

        // Missing content type
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/processes/ghost/input")
                    .body(Body::from(r#"{"input":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.code, Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test]
    async fn test_malformed_query_gets_json_error() {
        let (app, _dir) = test_app(None).await;
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/terminal/main?cols=wide"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.code, Some(ErrorCode::InvalidRequest));

        // Plain GET without upgrade headers
        let response = app
            .oneshot(request(Method::GET, "/terminal/main"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.code, Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test]
    async fn test_get_process_route() {
        let (app, _dir) = test_app(None).await;
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/processes/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request(Method::GET, "/processes/bad%20id"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
