use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::tokens::{TokenKind, TokenStore};
use crate::models::TokenPair;

const SERVICE_NAME: &str = "kpiboard";

/// Tokens kept in the OS keychain, one entry per token kind.
///
/// The keychain has no multi-entry transaction. A failed `save` restores
/// the previous access token; a process killed between the two writes, or
/// a `clear` that fails after the refresh entry is gone, can still leave a
/// lone access token behind. Without its refresh token that session ends at
/// the next 401.
pub struct KeychainTokenStore {
    service: String,
    access: Entry,
    refresh: Entry,
}

impl KeychainTokenStore {
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a separate keychain service, e.g. one per backend.
    pub fn with_service(service: impl Into<String>) -> Result<Self> {
        let service = service.into();
        let access = Entry::new(&service, TokenKind::Access.key())
            .context("Failed to create keyring entry")?;
        let refresh = Entry::new(&service, TokenKind::Refresh.key())
            .context("Failed to create keyring entry")?;
        Ok(Self {
            service,
            access,
            refresh,
        })
    }

    fn entry(&self, kind: TokenKind) -> &Entry {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn delete(&self, kind: TokenKind) -> Result<()> {
        match self.entry(kind).delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }

    /// Put the access entry back the way it was before a failed save.
    fn restore_access(&self, previous: Option<String>) {
        let restored = match previous {
            Some(token) => self
                .access
                .set_password(&token)
                .context("Failed to restore access token"),
            None => self.delete(TokenKind::Access),
        };
        if let Err(e) = restored {
            warn!(error = %e, service = %self.service, "Keychain left with a mismatched access token");
        }
    }
}

impl TokenStore for KeychainTokenStore {
    fn save(&self, tokens: &TokenPair) -> Result<()> {
        let previous = self.read(TokenKind::Access)?;
        self.access
            .set_password(&tokens.access_token)
            .context("Failed to store access token in keychain")?;
        if let Err(e) = self.refresh.set_password(&tokens.refresh_token) {
            self.restore_access(previous);
            return Err(e).context("Failed to store refresh token in keychain");
        }
        debug!(service = %self.service, "Tokens saved to keychain");
        Ok(())
    }

    fn read(&self, kind: TokenKind) -> Result<Option<String>> {
        match self.entry(kind).get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn clear(&self) -> Result<()> {
        // Refresh first: a partial failure must not leave a usable refresh token
        self.delete(TokenKind::Refresh)?;
        self.delete(TokenKind::Access)?;
        debug!(service = %self.service, "Tokens removed from keychain");
        Ok(())
    }
}
