//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_assets::CleanError;
use tower_http::services::ServeDir;

use crate::livereload::{LiveReloadHub, LiveReloadMessage, CLIENT_SCRIPT};

const SCRIPT_TAG: &str = r#"<script src="/__livereload.js"></script>"#;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error on {addr}: {source}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid watch pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error(transparent)]
    Clean(#[from] CleanError),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: LiveReloadHub,
}

impl DevServer {
    /// Create a new development server broadcasting through `hub`.
    pub fn new(config: DevServerConfig, hub: LiveReloadHub) -> Self {
        Self { config, hub }
    }

    /// Start the development server. Runs until the listener fails.
    pub async fn start(self) -> Result<(), ServerError> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let host = self.config.host.as_str();
        let listener = tokio::net::TcpListener::bind((host, self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: bind_addr,
            source,
        })?;

        let app = router(&self.config.root, self.hub);
        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", self.config.root.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .await
            .map_err(|source| ServerError::Serve { addr, source })
    }
}

/// Routes for serving `root` with live reload.
///
/// Files under `root` are served as-is, except that HTML pages get the
/// live-reload client injected before `</body>`.
pub fn router(root: &Path, hub: LiveReloadHub) -> Router {
    Router::new()
        .route("/__livereload", get(ws_handler))
        .route("/__livereload.js", get(script_handler))
        .fallback_service(ServeDir::new(root))
        .layer(middleware::map_response(inject_client))
        .with_state(hub)
}

/// Handler for the live-reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<LiveReloadHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one browser.
async fn handle_ws(mut socket: WebSocket, hub: LiveReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, &LiveReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Live-reload client lagged by {} message(s)", skipped);
                if send(&mut socket, &LiveReloadMessage::Reload).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &LiveReloadMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Handler for the live-reload client script.
async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        CLIENT_SCRIPT,
    )
}

/// Inject the client script into HTML responses.
async fn inject_client(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&bytes);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the script tag before the last `</body>`, or append it.
///
/// Works on raw bytes so pages in any ASCII-compatible encoding pass through.
fn inject_script(html: &[u8]) -> Vec<u8> {
    const CLOSE: &[u8] = b"</body>";

    let idx = html
        .windows(CLOSE.len())
        .rposition(|w| w.eq_ignore_ascii_case(CLOSE))
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + SCRIPT_TAG.len());
    out.extend_from_slice(&html[..idx]);
    out.extend_from_slice(SCRIPT_TAG.as_bytes());
    out.extend_from_slice(&html[idx..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::fs;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn get_path(root: &Path, uri: &str) -> (StatusCode, String, Option<String>) {
        let response = router(root, LiveReloadHub::new())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    fn site() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("styles")).unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Hi</h1></body></html>",
        )
        .unwrap();
        fs::write(temp.path().join("styles/index.css"), "body{margin:0}").unwrap();
        temp
    }

    #[test]
    fn default_config_serves_dist_on_port_3000() {
        let config = DevServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.root, PathBuf::from("dist"));
    }

    #[tokio::test]
    async fn serves_html_with_client_injected() {
        let temp = site();

        let (status, body, _) = get_path(temp.path(), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            format!("<html><body><h1>Hi</h1>{}</body></html>", SCRIPT_TAG)
        );
    }

    #[tokio::test]
    async fn serves_other_files_unchanged() {
        let temp = site();

        let (status, body, content_type) = get_path(temp.path(), "/styles/index.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body{margin:0}");
        assert!(content_type.unwrap().starts_with("text/css"));
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let temp = site();

        let (status, _, _) = get_path(temp.path(), "/scripts/index.js").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_client_script() {
        let temp = site();

        let (status, body, content_type) = get_path(temp.path(), "/__livereload.js").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/__livereload"));
        assert_eq!(content_type.as_deref(), Some("application/javascript"));
    }

    #[test]
    fn injects_before_closing_body_or_appends() {
        assert_eq!(
            inject_script(b"<p>a</p></BODY>"),
            format!("<p>a</p>{}</BODY>", SCRIPT_TAG).into_bytes()
        );
        assert_eq!(
            inject_script(b"<p>a</p>"),
            format!("<p>a</p>{}", SCRIPT_TAG).into_bytes()
        );
    }

    #[test]
    fn leaves_non_utf8_bytes_intact() {
        // "café" in Latin-1
        let page = b"<html><body><p>caf\xe9</p></body></html>";

        let out = inject_script(page);

        let expected = [
            b"<html><body><p>caf\xe9</p>".as_slice(),
            SCRIPT_TAG.as_bytes(),
            b"</body></html>",
        ]
        .concat();
        assert_eq!(out, expected);
    }
}
