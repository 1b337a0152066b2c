//! Token persistence backends.
//!
//! The credential pair lives in exactly two slots, `access_token` and
//! `refresh_token`. [`TokenStore`] is the only surface the rest of the
//! crate touches; the lifecycle manager is the sole writer.
//!
//! Three backends:
//! - [`FileTokenStore`] - JSON file under the user config directory
//! - [`KeyringTokenStore`] - OS keychain, one entry per slot
//! - [`MemoryTokenStore`] - ephemeral, for tests and short-lived hosts

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Token file name inside the config directory
const TOKEN_FILE: &str = "tokens.json";

/// Application name used for the config directory and keychain service
const APP_NAME: &str = "converse";

/// Keychain account name for the access token slot
const ACCESS_SLOT: &str = "access_token";

/// Keychain account name for the refresh token slot
const REFRESH_SLOT: &str = "refresh_token";

pub trait TokenStore: Send + Sync {
    /// Read the access token slot. Unreadable storage reads as absent.
    fn access_token(&self) -> Option<String>;

    /// Read the refresh token slot. Unreadable storage reads as absent.
    fn refresh_token(&self) -> Option<String>;

    fn store_access(&self, token: &str) -> Result<()>;

    fn store_refresh(&self, token: &str) -> Result<()>;

    /// Remove both slots. Idempotent.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// File-backed store. The file is re-read on every access so multiple
/// handles over the same path stay consistent.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store under the platform config directory (`~/.config/converse`).
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(Self::new(config_dir.join(APP_NAME).join(TOKEN_FILE)))
    }

    fn read(&self) -> TokenFile {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return TokenFile::default();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }

    fn write(&self, file: &TokenFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create token file directory")?;
        }
        let contents = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, contents).context("Failed to write token file")?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.read().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token
    }

    fn store_access(&self, token: &str) -> Result<()> {
        let mut file = self.read();
        file.access_token = Some(token.to_string());
        self.write(&file)
    }

    fn store_refresh(&self, token: &str) -> Result<()> {
        let mut file = self.read();
        file.refresh_token = Some(token.to_string());
        self.write(&file)
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

/// OS keychain store, one entry per slot under a single service name.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(APP_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, slot: &str) -> Result<Entry> {
        Entry::new(&self.service, slot).context("Failed to create keyring entry")
    }

    fn get(&self, slot: &str) -> Option<String> {
        self.entry(slot).ok()?.get_password().ok()
    }

    fn set(&self, slot: &str, token: &str) -> Result<()> {
        self.entry(slot)?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn delete(&self, slot: &str) -> Result<()> {
        match self.entry(slot)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_SLOT)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_SLOT)
    }

    fn store_access(&self, token: &str) -> Result<()> {
        self.set(ACCESS_SLOT, token)
    }

    fn store_refresh(&self, token: &str) -> Result<()> {
        self.set(REFRESH_SLOT, token)
    }

    fn clear(&self) -> Result<()> {
        self.delete(ACCESS_SLOT)?;
        self.delete(REFRESH_SLOT)
    }
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    slots: RwLock<TokenFile>,
}

impl MemoryTokenStore {
    fn read(&self) -> TokenFile {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn with_slots(&self, update: impl FnOnce(&mut TokenFile)) {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut slots);
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.read().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token
    }

    fn store_access(&self, token: &str) -> Result<()> {
        self.with_slots(|slots| slots.access_token = Some(token.to_string()));
        Ok(())
    }

    fn store_refresh(&self, token: &str) -> Result<()> {
        self.with_slots(|slots| slots.refresh_token = Some(token.to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.with_slots(|slots| *slots = TokenFile::default());
        Ok(())
    }
}
