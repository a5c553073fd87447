//! Development server implementation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;

use crate::websocket::{hmr_client_script, HmrHub, HmrMessage};

const CLIENT_PATH: &str = "/__kiln/client.js";

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,

    /// WebSocket endpoint
    pub ws_path: String,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            host: local_network_ip().to_string(),
            port: 3000,
            open: true,
            ws_path: "/__kiln/ws".to_string(),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("File watch error: {0}")]
    Watch(String),
}

/// Address of the interface used for outbound traffic, so the site can be
/// opened from other devices on the network. Falls back to loopback.
pub fn local_network_ip() -> IpAddr {
    // Connecting a UDP socket sends nothing; it only selects a route.
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Shared server state.
struct ServerState {
    hmr: HmrHub,
    ws_path: String,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hmr: HmrHub,
}

impl DevServer {
    /// Create a new development server broadcasting through `hmr`.
    pub fn new(config: DevServerConfig, hmr: HmrHub) -> Self {
        Self { config, hmr }
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    /// Build the router: reload endpoints first, the output directory as
    /// fallback.
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            hmr: self.hmr.clone(),
            ws_path: self.config.ws_path.clone(),
        });

        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .route(CLIENT_PATH, get(client_script_handler))
            .with_state(state)
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::from_fn(inject_client))
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(self) -> Result<(), ServerError> {
        let host: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.host.clone()))?;
        let addr = SocketAddr::new(host, self.config.port);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))?;

        tracing::info!("Serving {} at http://{}", self.config.root.display(), addr);

        // Open browser if configured
        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))
    }
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hmr.subscribe();

    if send_message(&mut socket, &HmrMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_message(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            // A slow client missed messages; a reload covers all of them.
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Client lagged by {} messages", skipped);
                if send_message(&mut socket, &HmrMessage::Reload).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &HmrMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the reload client script.
async fn client_script_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        hmr_client_script(&state.ws_path),
    )
}

/// Add the reload client to every successful HTML response.
async fn inject_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = String::from_utf8_lossy(&bytes);
    let injected = inject_script_tag(&html, CLIENT_PATH);

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    Response::from_parts(parts, Body::from(injected))
}

/// Insert a script tag before the last `</body>`, or append it.
pub(crate) fn inject_script_tag(html: &str, src: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, src);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}{}", html, tag),
    }
}
