use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::TokenPair;

/// Token file name in the data directory
const TOKENS_FILE: &str = "tokens.json";

/// Which of the two bearer tokens to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Key the token is persisted under.
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Persistent storage for the access/refresh token pair.
///
/// Tokens are opaque: nothing here validates or decodes them, and no
/// expiry is tracked. `save` and `clear` replace or remove both tokens
/// together; a store backed by separate entries documents any window in
/// which a reader can see one without the other.
pub trait TokenStore: Send + Sync {
    fn save(&self, tokens: &TokenPair) -> Result<()>;
    fn read(&self, kind: TokenKind) -> Result<Option<String>>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn get(&self, kind: TokenKind) -> Option<String> {
        match kind {
            TokenKind::Access => self.access_token.clone(),
            TokenKind::Refresh => self.refresh_token.clone(),
        }
    }
}

impl From<&TokenPair> for StoredTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        }
    }
}

/// Tokens kept in a JSON file in the user's data directory.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENS_FILE)
    }

    fn load(&self) -> Result<StoredTokens> {
        let path = self.path();
        if !path.exists() {
            return Ok(StoredTokens::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    /// Write via a uniquely named temp file and rename, so readers see the
    /// old pair or the new one and never a torn file. Concurrent saves each
    /// use their own temp file; the last rename wins.
    fn write_atomic(path: &Path, contents: &str) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Token file has no parent directory"))?;
        std::fs::create_dir_all(dir).context("Failed to create token directory")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).context("Failed to create temp token file")?;
        tmp.write_all(contents.as_bytes()).context("Failed to write token file")?;
        tmp.persist(path).context("Failed to replace token file")?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        let contents = serde_json::to_string_pretty(&StoredTokens::from(tokens))?;
        Self::write_atomic(&self.path(), &contents)?;
        debug!(path = ?self.path(), "Tokens saved");
        Ok(())
    }

    fn read(&self, kind: TokenKind) -> Result<Option<String>> {
        Ok(self.load()?.get(kind))
    }

    fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove token file")?;
            debug!(path = ?path, "Tokens cleared");
        }
        Ok(())
    }
}

/// Process-local token storage, lost on exit.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair.
    pub fn with_tokens(tokens: &TokenPair) -> Self {
        Self {
            tokens: Mutex::new(StoredTokens::from(tokens)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoredTokens>> {
        self.tokens
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        *self.lock()? = StoredTokens::from(tokens);
        Ok(())
    }

    fn read(&self, kind: TokenKind) -> Result<Option<String>> {
        Ok(self.lock()?.get(kind))
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = StoredTokens::default();
        Ok(())
    }
}
