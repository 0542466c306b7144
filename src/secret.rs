//! API key storage
//!
//! The Azure API key lives outside the main config file so the config can
//! be shared or committed without leaking credentials. Resolution order:
//!
//! 1. `PUSHTYPE_API_KEY` environment variable
//! 2. `~/.config/pushtype/credentials` (single line, mode 0600)
//!
//! A missing key is not an error here; the daemon runs without a
//! transcription backend and tells the user to configure one.

use std::io;
use std::path::PathBuf;

const API_KEY_ENV: &str = "PUSHTYPE_API_KEY";
const CREDENTIALS_FILE: &str = "credentials";

/// Trait for API key storage backends
pub trait SecretStore: Send + Sync {
    /// Load the API key, if one is configured
    fn load_key(&self) -> Option<String>;

    /// Persist the API key
    fn save_key(&self, key: &str) -> io::Result<()>;
}

/// File-backed secret store with an environment variable override
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store rooted at the default config directory
    pub fn new() -> io::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?
            .join("pushtype");
        Ok(Self {
            path: config_dir.join(CREDENTIALS_FILE),
        })
    }

    /// Store at an explicit path (used by tests)
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SecretStore for FileSecretStore {
    fn load_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                tracing::debug!("API key loaded from {}", API_KEY_ENV);
                return Some(key);
            }
        }

        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let key = contents.trim().to_string();
                if key.is_empty() {
                    None
                } else {
                    Some(key)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save_key(&self, key: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, key.trim())?;

        // Key file must not be readable by other users
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        tracing::info!("API key saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::at_path(dir.path().join("credentials"));
        // Env override may be set in the host environment; skip if so
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(store.load_key().is_none());
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::at_path(dir.path().join("credentials"));
        store.save_key("  abc123  ").unwrap();

        if std::env::var(API_KEY_ENV).is_err() {
            assert_eq!(store.load_key().as_deref(), Some("abc123"));
        }
        // Trimmed on the way in regardless
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "abc123");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::at_path(dir.path().join("credentials"));
        store.save_key("secret").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
