//! HTTP bait server
//!
//! Every route is a thin wrapper: it extracts what its bait needs, calls the
//! bait function in `routes`, then records exactly one event for the request.
//! The route table is built once in `router` and never changes.

mod routes;

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Form, Multipart, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{EventSink, InteractionEvent};

pub struct AppState {
    pub sink: EventSink,
    pub port: u16,
}

impl AppState {
    /// The uniform per-request tail: resolve the client address and emit one
    /// event, whatever the bait produced.
    fn record(&self, headers: &HeaderMap, addr: SocketAddr, description: String) {
        let ip = forwarded_ip(headers).unwrap_or_else(|| addr.ip().to_string());
        self.sink
            .emit(InteractionEvent::request(ip, self.port, description));
    }
}

/// First comma-separated X-Forwarded-For value, set by the upstream
/// TLS-terminating reverse proxy
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = forwarded.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

pub async fn start(port: u16, config: Arc<Config>, sink: EventSink) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Cannot bind HTTP to {}: {} - abandoning port", addr, e);
            return Ok(());
        }
    };

    info!("HTTP honeypot running on {}", addr);

    let state = Arc::new(AppState { sink, port });
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// The immutable bait route table
pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/comment", get(comment))
        .route("/admin.php", get(admin_form).post(admin_login))
        .route("/upload", get(upload_form).post(upload_submit))
        .route("/config", get(leak_config))
        .route("/robots.txt", get(serve_robots))
        .route("/backup.zip", get(fake_download))
        .route("/shell.php", get(fake_shell))
        .fallback(any(catch_all))
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Option<Query<SearchQuery>>,
) -> Response {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    let (response, info) = routes::search_results(&params.q);
    state.record(&headers, addr, info);
    response
}

#[derive(Debug, Deserialize, Default)]
struct CommentQuery {
    #[serde(default)]
    msg: String,
}

async fn comment(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Option<Query<CommentQuery>>,
) -> Response {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    let (response, info) = routes::comment_posted(&params.msg);
    state.record(&headers, addr, info);
    response
}

async fn admin_form(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let (response, info) = routes::admin_login_form();
    state.record(&headers, addr, info);
    response
}

#[derive(Debug, Deserialize, Default)]
struct AdminLoginForm {
    #[serde(default)]
    user: String,
    #[serde(default)]
    pass: String,
}

async fn admin_login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    form: Option<Form<AdminLoginForm>>,
) -> Response {
    // An unparseable body degrades to empty credentials, like a sloppy PHP app
    let form = form.map(|Form(f)| f).unwrap_or_default();
    let (response, info) = routes::admin_login_attempt(&form.user, &form.pass);
    state.record(&headers, addr, info);
    response
}

async fn upload_form(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let (response, info) = routes::upload_page();
    state.record(&headers, addr, info);
    response
}

async fn upload_submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Option<Multipart>,
) -> Response {
    let received = match multipart {
        Some(mut multipart) => read_upload(&mut multipart).await,
        None => None,
    };
    let (response, info) = routes::upload_result(received);
    state.record(&headers, addr, info);
    response
}

/// Pull the "upload" field out of the multipart body; any parse failure
/// (truncated body, bad boundary, missing field) collapses to `None`.
async fn read_upload(multipart: &mut Multipart) -> Option<(String, usize)> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("upload") {
            let filename = field.file_name().unwrap_or("unnamed").to_string();
            let bytes = field.bytes().await.ok()?;
            return Some((filename, bytes.len()));
        }
    }
    None
}

async fn leak_config(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let (response, info) = routes::leaked_config();
    state.record(&headers, addr, info);
    response
}

async fn serve_robots(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let (response, info) = routes::robots();
    state.record(&headers, addr, info);
    response
}

async fn fake_download(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let (response, info) = routes::backup_archive();
    state.record(&headers, addr, info);
    response
}

#[derive(Debug, Deserialize, Default)]
struct ShellQuery {
    #[serde(default)]
    cmd: String,
}

async fn fake_shell(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Option<Query<ShellQuery>>,
) -> Response {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    let (response, info) = routes::shell_output(&params.cmd);
    state.record(&headers, addr, info);
    response
}

/// Anything outside the bait table: plausible 404, probe still recorded
async fn catch_all(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    method: Method,
    uri: Uri,
) -> Response {
    state.record(&headers, addr, format!("Unmapped path probed: {} {}", method, uri));
    (
        StatusCode::NOT_FOUND,
        axum::response::Html(
            "<!DOCTYPE html><html><head><title>404 Not Found</title></head><body><h1>Not Found</h1><p>The requested URL was not found on this server.</p></body></html>",
        ),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt;

    fn test_router() -> (Router, UnboundedReceiver<crate::events::InteractionEvent>) {
        let (sink, events) = EventSink::channel();
        let state = Arc::new(AppState { sink, port: 80 });
        (router(state), events)
    }

    fn with_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
        let addr: SocketAddr = format!("{}:55555", ip).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn payload_of(event: crate::events::InteractionEvent) -> String {
        match event.kind {
            EventKind::Payload(payload) => payload,
            other => panic!("unexpected event kind: {:?}", other),
        }
    }

    #[tokio::test]
    async fn search_reflects_query_and_records_it() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .uri("/search?q=%27%20OR%201%3D1")
                .body(Body::empty())
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "Results for '' OR 1=1': No results found."
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.ip, "192.0.2.5");
        assert_eq!(payload_of(event), "Search query: ' OR 1=1");
    }

    #[tokio::test]
    async fn admin_login_post_captures_credentials() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/admin.php")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("user=admin&pass=1234"))
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Access Denied.\n");

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "Admin.php login attempt: admin / 1234");
    }

    #[tokio::test]
    async fn admin_login_get_serves_form() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder().uri("/admin.php").body(Body::empty()).unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("Admin Panel"));

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "Admin.php login form served");
    }

    #[tokio::test]
    async fn forwarded_header_overrides_socket_address() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .uri("/robots.txt")
                .header("x-forwarded-for", "203.0.113.77, 10.0.0.1")
                .body(Body::empty())
                .unwrap(),
            "127.0.0.1",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("Disallow: /backup"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.ip, "203.0.113.77");
        assert_eq!(payload_of(event), "robots.txt requested");
    }

    #[tokio::test]
    async fn upload_accepts_multipart_file() {
        let (router, mut events) = test_router();
        let body = concat!(
            "--BOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"sploit.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "payload-bytes\r\n",
            "--BOUNDARY--\r\n",
        );
        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("content-type", "multipart/form-data; boundary=BOUNDARY")
                .body(Body::from(body))
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "File received.\n");

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "File uploaded: sploit.bin (13 bytes)");
    }

    #[tokio::test]
    async fn malformed_upload_degrades_to_failure_response() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header("content-type", "text/plain")
                .body(Body::from("not a multipart body"))
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Upload failed.\n");

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "Upload error");
    }

    #[tokio::test]
    async fn shell_masks_command_but_records_it() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .uri("/shell.php?cmd=id")
                .body(Body::empty())
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "Output: **");

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "Web shell command: id");
    }

    #[tokio::test]
    async fn backup_download_sets_attachment_disposition() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder().uri("/backup.zip").body(Body::empty()).unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("content-disposition")
                .and_then(|v| v.to_str().ok()),
            Some("attachment; filename=backup.zip")
        );
        assert_eq!(body_string(response).await, "FAKE_ZIP_CONTENT");

        let event = events.recv().await.unwrap();
        assert_eq!(payload_of(event), "Backup.zip requested");
    }

    #[tokio::test]
    async fn unknown_path_gets_404_and_is_recorded() {
        let (router, mut events) = test_router();
        let request = with_peer(
            Request::builder()
                .uri("/phpmyadmin/index.php")
                .body(Body::empty())
                .unwrap(),
            "192.0.2.5",
        );

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let event = events.recv().await.unwrap();
        assert_eq!(
            payload_of(event),
            "Unmapped path probed: GET /phpmyadmin/index.php"
        );
    }
}
