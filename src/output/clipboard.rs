//! Clipboard-based text delivery
//!
//! Uses wl-copy to place recognized text on the Wayland clipboard, which
//! works on all Wayland compositors regardless of which window has focus.
//!
//! Requires: wl-clipboard package installed

use super::OutputSink;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// wl-copy backed output sink
pub struct ClipboardSink;

impl ClipboardSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClipboardSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OutputSink for ClipboardSink {
    async fn deliver(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        // Spawn wl-copy with stdin pipe
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::WlCopyNotFound
                } else {
                    OutputError::DeliveryFailed(e.to_string())
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| OutputError::DeliveryFailed(e.to_string()))?;
            // Close stdin to signal EOF
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| OutputError::DeliveryFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::DeliveryFailed(
                "wl-copy exited with error".to_string(),
            ));
        }

        tracing::info!("Text copied to clipboard ({} chars)", text.chars().count());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "clipboard (wl-copy)"
    }
}
