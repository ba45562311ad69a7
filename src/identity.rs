//! Privacy-preserving window identities.
//!
//! Owner names and titles are never stored. They are hashed with SHA-256
//! over a per-installation salt, so stored digests cannot be reversed with
//! a dictionary of common app names and cannot be correlated across
//! installations.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{LayoutError, Result};
use crate::store::{KeyValueStore, SALT_KEY};

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Salted digests identifying a window across captures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowIdentity {
    /// Hex digest of the owning application's name.
    pub app_name_hash: String,
    /// Hex digest of the window title, when it was accessible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_hash: Option<String>,
}

impl WindowIdentity {
    /// True when both sides carry a title digest and they agree.
    pub fn title_matches(&self, other: &Self) -> bool {
        matches!(
            (&self.title_hash, &other.title_hash),
            (Some(a), Some(b)) if a == b
        )
    }
}

/// The per-installation secret. Generated once and never regenerated,
/// since doing so would orphan every stored digest.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationSalt {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for InstallationSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationSalt")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl InstallationSalt {
    /// Generate a fresh random salt.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decode a salt from its hex form.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::EncodingFailure`] for invalid or empty hex.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| LayoutError::EncodingFailure(format!("salt is not hex: {e}")))?;
        if bytes.is_empty() {
            return Err(LayoutError::EncodingFailure("salt is empty".to_string()));
        }
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Load the stored salt, creating and persisting one on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, or if a stored salt exists but
    /// cannot be decoded. A corrupt salt is never silently replaced.
    pub fn load_or_create(kv: &mut dyn KeyValueStore) -> Result<Self> {
        if let Some(raw) = kv.get(SALT_KEY)? {
            let text = String::from_utf8(raw)
                .map_err(|e| LayoutError::EncodingFailure(format!("salt is not UTF-8: {e}")))?;
            let salt = Self::from_hex(&text).inspect_err(|e| {
                warn!(error = %e, "Stored salt is unreadable; refusing to regenerate");
            })?;
            debug!("Loaded installation salt");
            return Ok(salt);
        }

        let salt = Self::generate();
        kv.set(SALT_KEY, salt.to_hex().as_bytes())?;
        info!("Generated new installation salt");
        Ok(salt)
    }
}

/// Hashes names and titles under a fixed salt.
#[derive(Debug, Clone)]
pub struct IdentityHasher {
    salt: InstallationSalt,
}

impl IdentityHasher {
    #[must_use]
    pub const fn new(salt: InstallationSalt) -> Self {
        Self { salt }
    }

    /// Salted SHA-256 of a string, hex encoded.
    #[must_use]
    pub fn digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt.bytes);
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Build an identity. Empty titles count as absent.
    #[must_use]
    pub fn identity(&self, owner_name: &str, title: Option<&str>) -> WindowIdentity {
        WindowIdentity {
            app_name_hash: self.digest(owner_name),
            title_hash: title.filter(|t| !t.is_empty()).map(|t| self.digest(t)),
        }
    }
}
