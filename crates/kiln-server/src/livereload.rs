//! WebSocket-based live reload.

use std::path::Path;

use kiln_assets::TaskReport;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveReloadMessage {
    /// Full page reload
    Reload,

    /// Swap stylesheets in place
    InjectCss {
        /// URL paths of the rebuilt stylesheets
        paths: Vec<String>,
    },

    /// Connection established
    Connected,
}

impl LiveReloadMessage {
    /// The message announcing a finished task run.
    ///
    /// Runs that only produced stylesheets inside `output_dir` are injected;
    /// anything else reloads the page.
    pub fn for_report(report: &TaskReport, output_dir: &Path) -> Self {
        let mut paths = Vec::with_capacity(report.files.len());

        for file in &report.files {
            let is_css = file.extension().is_some_and(|e| e == "css");
            let Some(relative) = file.strip_prefix(output_dir).ok().filter(|_| is_css) else {
                return LiveReloadMessage::Reload;
            };
            paths.push(format!("/{}", kiln_assets::paths::to_slash(relative)));
        }

        if paths.is_empty() {
            LiveReloadMessage::Reload
        } else {
            LiveReloadMessage::InjectCss { paths }
        }
    }
}

/// Hub for broadcasting live-reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct LiveReloadHub {
    sender: broadcast::Sender<LiveReloadMessage>,
}

impl LiveReloadHub {
    /// Create a new live-reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: LiveReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    /// Subscribe to live-reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side live-reload script, served at `/__livereload.js`.
pub const CLIENT_SCRIPT: &str = r#"
(function() {
  'use strict';

  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var url = protocol + location.host + '/__livereload';
  var retries = 0;

  function injectCss(paths) {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var swapped = 0;
    links.forEach(function(link) {
      var href = new URL(link.href, location.href);
      if (paths.indexOf(href.pathname) !== -1) {
        href.searchParams.set('livereload', Date.now());
        link.href = href.toString();
        swapped++;
      }
    });
    if (swapped === 0) {
      location.reload();
    }
  }

  function connect() {
    var ws = new WebSocket(url);

    ws.onopen = function() {
      if (retries > 0) {
        location.reload();
      }
      retries = 0;
    };

    ws.onmessage = function(event) {
      var msg = JSON.parse(event.data);
      switch (msg.type) {
        case 'reload':
          location.reload();
          break;
        case 'inject_css':
          injectCss(msg.paths);
          break;
        case 'connected':
          console.log('[kiln] live reload connected');
          break;
      }
    };

    ws.onclose = function() {
      retries++;
      setTimeout(connect, Math.min(1000 * retries, 5000));
    };
  }

  connect();
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_assets::AssetKind;
    use std::path::PathBuf;

    fn report(kind: AssetKind, files: &[&str]) -> TaskReport {
        TaskReport {
            kind,
            files: files.iter().map(PathBuf::from).collect(),
            duration_ms: 1,
        }
    }

    #[test]
    fn hub_broadcasts_messages() {
        let hub = LiveReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(LiveReloadMessage::Reload);

        assert_eq!(rx.try_recv().unwrap(), LiveReloadMessage::Reload);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn serializes_messages() {
        let msg = LiveReloadMessage::InjectCss {
            paths: vec!["/styles/index.css".to_string()],
        };

        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"inject_css","paths":["/styles/index.css"]}"#
        );
        assert_eq!(
            serde_json::to_string(&LiveReloadMessage::Connected).unwrap(),
            r#"{"type":"connected"}"#
        );
    }

    #[test]
    fn stylesheet_runs_are_injected() {
        let report = report(AssetKind::Css, &["/site/dist/styles/index.css"]);

        assert_eq!(
            LiveReloadMessage::for_report(&report, Path::new("/site/dist")),
            LiveReloadMessage::InjectCss {
                paths: vec!["/styles/index.css".to_string()]
            }
        );
    }

    #[test]
    fn other_runs_reload() {
        let output = Path::new("/site/dist");
        let html = report(AssetKind::Html, &["/site/dist/index.html"]);

        assert_eq!(
            LiveReloadMessage::for_report(&html, output),
            LiveReloadMessage::Reload
        );
        assert_eq!(
            LiveReloadMessage::for_report(&report(AssetKind::Css, &[]), output),
            LiveReloadMessage::Reload
        );
    }
}
