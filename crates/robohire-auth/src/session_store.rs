//! Durable persistence of the signed-in session.
//!
//! The token and the user record live under two keys that are always
//! written and removed together. A half-present or unreadable pair is
//! discarded on load rather than surfaced.

use crate::token::UserClaims;
use robohire_storage::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use tracing::{debug, warn};

/// What a load found in the backing store.
#[derive(Debug)]
pub enum LoadOutcome {
    Empty,
    Loaded { token: String, user: UserClaims },
    /// Stored data cannot be trusted; both keys should be discarded.
    Corrupt(String),
}

/// Persists the session token and user claims.
pub struct SessionStore {
    storage: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Load the persisted session, discarding corrupt data.
    pub fn load(&self) -> Option<(String, UserClaims)> {
        match self.inspect() {
            LoadOutcome::Empty => None,
            LoadOutcome::Loaded { token, user } => {
                debug!(subject = %user.subject, "Loaded persisted session");
                Some((token, user))
            }
            LoadOutcome::Corrupt(reason) => {
                warn!(reason = %reason, "Discarding corrupt persisted session");
                if let Err(e) = self.clear() {
                    warn!(error = %e, "Failed to discard corrupt session");
                }
                None
            }
        }
    }

    /// Classify the stored pair without modifying it.
    pub fn inspect(&self) -> LoadOutcome {
        let token = match self.storage.get(StorageKeys::TOKEN) {
            Ok(token) => token,
            Err(e) => return read_failure(e),
        };
        let user = match self.storage.get(StorageKeys::USER) {
            Ok(user) => user,
            Err(e) => return read_failure(e),
        };

        match (token, user) {
            (None, None) => LoadOutcome::Empty,
            (Some(_), None) => LoadOutcome::Corrupt("token stored without user".to_string()),
            (None, Some(_)) => LoadOutcome::Corrupt("user stored without token".to_string()),
            (Some(token), Some(_)) if token.trim().is_empty() => {
                LoadOutcome::Corrupt("stored token is empty".to_string())
            }
            (Some(token), Some(user)) => match serde_json::from_str::<UserClaims>(&user) {
                Ok(user) => LoadOutcome::Loaded { token, user },
                Err(e) => LoadOutcome::Corrupt(format!("stored user is invalid: {}", e)),
            },
        }
    }

    /// Persist the token and user as one write.
    pub fn save(&self, token: &str, user: &UserClaims) -> StorageResult<()> {
        let user_json =
            serde_json::to_string(user).map_err(|e| StorageError::Encoding(e.to_string()))?;

        self.storage.set_many(&[
            (StorageKeys::TOKEN, token),
            (StorageKeys::USER, user_json.as_str()),
        ])
    }

    /// Remove both keys.
    pub fn clear(&self) -> StorageResult<()> {
        let removed = self.storage.delete_many(&StorageKeys::SESSION)?;
        debug!(removed, "Cleared persisted session");
        Ok(())
    }
}

fn read_failure(error: StorageError) -> LoadOutcome {
    match error {
        // An undecodable backing file is corruption; anything else is an
        // unavailable backend and reads as no session.
        StorageError::Encoding(reason) => LoadOutcome::Corrupt(reason),
        other => {
            warn!(error = %other, "Session storage unavailable");
            LoadOutcome::Empty
        }
    }
}
