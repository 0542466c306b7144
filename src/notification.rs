//! Desktop notifications
//!
//! Error and status notifications via notify-send. Notifications are
//! best-effort: a missing notify-send binary is logged once at debug
//! level and otherwise ignored.

use std::process::Stdio;
use tokio::process::Command;

/// Trait for surfacing user-facing messages
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &str, body: &str);
}

/// notify-send backed notifier
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_name: "Pushtype".to_string(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, summary: &str, body: &str) {
        let result = Command::new("notify-send")
            .args([
                &format!("--app-name={}", self.app_name),
                "--urgency=normal",
                "--expire-time=5000",
                summary,
                body,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = result {
            tracing::debug!("notify-send unavailable: {}", e);
        }
    }
}
