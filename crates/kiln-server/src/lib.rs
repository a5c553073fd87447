//! Development server with live reload for kiln.
//!
//! Serves the build output, pushes reload and CSS-inject messages to
//! connected browsers over a WebSocket, and watches source directories for
//! changes.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{local_network_ip, DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{HmrHub, HmrMessage};
