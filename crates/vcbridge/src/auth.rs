//! The login identity the game session uses, and the persisted account
//! state the external account-login flow maintains.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the refresh token and account identity live between runs.
pub const AUTH_FILE: &str = ".auth.json";

/// Profile name used when no game account is configured.
pub const OFFLINE_NAME: &str = "VoiceChatBridge";

/// Saved account state. The login flow rewrites this file after every
/// successful refresh so the newest refresh token is always on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthDetails {
    pub id: String,
    pub name: String,
    pub refresh_token: String,
}

impl AuthDetails {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// The identity the session joins the game server with.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub uuid: Uuid,
}

impl Profile {
    /// Offline-mode profile; the server derives its own id from the name.
    pub fn offline(name: &str) -> Self {
        Self { name: name.to_owned(), uuid: offline_uuid(name) }
    }

    /// Profile for a saved account.
    pub fn from_saved(details: &AuthDetails) -> Result<Self> {
        let uuid = Uuid::parse_str(&details.id)
            .context("saved account id is not a valid UUID; log in again to refresh it")?;
        Ok(Self { name: details.name.clone(), uuid })
    }
}

/// Deterministic offline-mode UUID with the version and variant bits of a
/// name-based id.
fn offline_uuid(name: &str) -> Uuid {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let input = format!("OfflinePlayer:{name}");
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    let high = hasher.finish();
    input.hash(&mut hasher);
    let low = hasher.finish();

    let mut uuid = (u128::from(high) << 64) | u128::from(low);
    uuid = (uuid & 0xFFFFFFFF_FFFF_0FFF_FFFF_FFFFFFFFFFFF) | 0x00000000_0000_3000_0000_000000000000;
    uuid = (uuid & 0xFFFFFFFF_FFFF_FFFF_3FFF_FFFFFFFFFFFF) | 0x00000000_0000_0000_8000_000000000000;
    Uuid::from_u128(uuid)
}
