use std::io;
use std::path::{Path, PathBuf};

use crate::auth::token::TokenSet;

/// Persists the session's token set as a small JSON record
/// (`access_token`, `refresh_token`, `expires_at` — RFC 3339 or null).
///
/// The store only serializes snapshots; the live state stays with the
/// session. Writes are best-effort overwrites.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing, unreadable, or corrupt record loads as "no stored tokens".
    pub fn load(&self) -> Option<TokenSet> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        let tokens: TokenSet = serde_json::from_str(&data).ok()?;
        if tokens.is_empty() {
            None
        } else {
            Some(tokens)
        }
    }

    pub fn save(&self, tokens: &TokenSet) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(tokens)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, data)
    }

    /// Removing an absent record is a no-op.
    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
