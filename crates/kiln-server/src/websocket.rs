//! WebSocket-based live reload.

use std::path::{Path, PathBuf};

use kiln_tasks::{ReloadSink, TaskReport};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to clients for live reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HmrMessage {
    /// Full page reload
    Reload,

    /// Swap stylesheets in place
    InjectCss {
        /// URL paths of the changed stylesheets
        paths: Vec<String>,
    },

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct HmrHub {
    sender: broadcast::Sender<HmrMessage>,
    root: PathBuf,
}

impl HmrHub {
    /// Create a hub for output served from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            root: root.into(),
        }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: HmrMessage) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Message for a finished task run: stylesheets are injected, anything
    /// else reloads the page.
    pub fn message_for(&self, written: &[PathBuf]) -> HmrMessage {
        let all_css = !written.is_empty()
            && written
                .iter()
                .all(|p| p.extension().is_some_and(|ext| ext == "css"));

        if !all_css {
            return HmrMessage::Reload;
        }

        HmrMessage::InjectCss {
            paths: written.iter().map(|p| self.url_path(p)).collect(),
        }
    }

    fn url_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/{}", segments.join("/"))
    }
}

impl ReloadSink for HmrHub {
    fn reload(&self, report: &TaskReport) {
        let msg = self.message_for(&report.written);
        tracing::debug!("'{}' finished, sending {:?}", report.task, msg);
        self.send(msg);
    }
}

/// Generate the client-side reload script.
///
/// The socket URL is derived from the page location, so the script works on
/// any host the server is reached through.
pub fn hmr_client_script(ws_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
  const ws = new WebSocket(scheme + location.host + '{}');
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  function injectCss(paths) {{
    let swapped = 0;
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const url = new URL(link.href, location.href);
      if (paths.indexOf(url.pathname) !== -1) {{
        url.searchParams.set('kiln', Date.now());
        link.href = url.toString();
        swapped++;
      }}
    }});
    if (swapped === 0) {{
      location.reload();
    }}
  }}

  ws.onopen = function() {{
    console.log('[kiln] Connected');
    reconnectAttempts = 0;
  }};

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'inject_css':
        injectCss(msg.paths);
        break;

      case 'connected':
        console.log('[kiln] Server acknowledged connection');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[kiln] Disconnected');
    if (reconnectAttempts < maxReconnectAttempts) {{
      reconnectAttempts++;
      setTimeout(function() {{
        location.reload();
      }}, 1000 * reconnectAttempts);
    }}
  }};
}})();
"#,
        ws_path
    )
}
