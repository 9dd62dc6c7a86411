//! Identity provider redirect handling.
//!
//! The provider sends the browser back to `/callback?token=...`. A
//! [`CallbackHandler`] is created once per arrival at that URL; it signs the
//! user in, scrubs the token from the visible location, and moves on.

use crate::context::SessionContext;
use crate::token::{self, UserClaims};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Query parameter carrying the token.
pub const TOKEN_PARAM: &str = "token";

/// Host navigation primitives.
pub trait Navigator {
    /// Swap the visible location without a new history entry.
    fn replace(&self, url: &Url);
    /// Go to an in-app path.
    fn navigate(&self, path: &str);
    /// Full reload of `url`, discarding in-memory state.
    fn reload(&self, url: &Url);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Sign-in link has no token")]
    MissingToken,

    #[error("Sign-in token is invalid: {0}")]
    InvalidToken(String),

    #[error("Could not save the session: {0}")]
    Session(String),
}

/// Ways out of a failed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    GoHome,
    Retry,
}

/// A failed callback with the offered recoveries.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackFailure {
    pub error: CallbackError,
    /// The callback URL as received, token included.
    pub callback_url: Url,
}

impl CallbackFailure {
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn recoveries(&self) -> [Recovery; 2] {
        [Recovery::GoHome, Recovery::Retry]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    SignedIn(UserClaims),
    Failed(CallbackFailure),
    /// This handler already ran; nothing was done.
    AlreadyProcessed,
}

/// One-shot processor for a single arrival at the callback URL.
pub struct CallbackHandler {
    home_path: String,
    has_processed: AtomicBool,
}

impl CallbackHandler {
    pub fn new(home_path: impl Into<String>) -> Self {
        Self {
            home_path: home_path.into(),
            has_processed: AtomicBool::new(false),
        }
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Process the redirect at `url`. Only the first call does anything.
    pub fn handle(
        &self,
        url: &Url,
        ctx: &SessionContext,
        navigator: &dyn Navigator,
    ) -> CallbackOutcome {
        if self.has_processed.swap(true, Ordering::SeqCst) {
            return CallbackOutcome::AlreadyProcessed;
        }

        let result = sign_in(url, ctx);
        navigator.replace(&without_token(url));

        match result {
            Ok(user) => {
                navigator.navigate(&self.home_path);
                CallbackOutcome::SignedIn(user)
            }
            Err(error) => {
                warn!(error = %error, "Sign-in callback failed");
                CallbackOutcome::Failed(CallbackFailure {
                    error,
                    callback_url: url.clone(),
                })
            }
        }
    }

    /// Carry out a recovery the user chose after a failure.
    pub fn recover(&self, failure: &CallbackFailure, recovery: Recovery, navigator: &dyn Navigator) {
        match recovery {
            Recovery::GoHome => navigator.navigate(&self.home_path),
            Recovery::Retry => navigator.reload(&failure.callback_url),
        }
    }
}

fn sign_in(url: &Url, ctx: &SessionContext) -> Result<UserClaims, CallbackError> {
    let token = url
        .query_pairs()
        .find(|(name, _)| name == TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
        .ok_or(CallbackError::MissingToken)?;

    let claims = token::decode(&token).map_err(|e| CallbackError::InvalidToken(e.to_string()))?;
    let user = UserClaims::from(&claims);

    ctx.login(&token, user.clone())
        .map_err(|e| CallbackError::Session(e.to_string()))?;

    info!(subject = %user.subject, "Sign-in callback completed");
    Ok(user)
}

/// `url` with the token parameter removed.
pub fn without_token(url: &Url) -> Url {
    let mut stripped = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != TOKEN_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_fsm::AuthState;
    use crate::refresh::TokenRefresher;
    use crate::session_store::SessionStore;
    use crate::token::encode_unsigned;
    use crate::AuthResult;
    use async_trait::async_trait;
    use robohire_storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
    use serde_json::json;
    use std::cell::RefCell;
    use std::sync::Arc;

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh_token(&self, _current: Option<&str>) -> AuthResult<Option<String>> {
            Ok(None)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Nav {
        Replace(String),
        Navigate(String),
        Reload(String),
    }

    #[derive(Default)]
    struct RecordingNavigator {
        actions: RefCell<Vec<Nav>>,
    }

    impl Navigator for RecordingNavigator {
        fn replace(&self, url: &Url) {
            self.actions.borrow_mut().push(Nav::Replace(url.to_string()));
        }

        fn navigate(&self, path: &str) {
            self.actions.borrow_mut().push(Nav::Navigate(path.to_string()));
        }

        fn reload(&self, url: &Url) {
            self.actions.borrow_mut().push(Nav::Reload(url.to_string()));
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Platform("read-only".to_string()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    fn context() -> (Arc<MemoryStore>, SessionContext) {
        let backend = Arc::new(MemoryStore::new());
        let ctx = SessionContext::new(SessionStore::new(Box::new(backend.clone())), Arc::new(NoRefresh));
        ctx.initialize();
        (backend, ctx)
    }

    fn callback_url(query: &str) -> Url {
        Url::parse(&format!("http://localhost:9876/callback{}", query)).unwrap()
    }

    #[test]
    fn test_valid_token_signs_in_and_goes_home() {
        let (backend, ctx) = context();
        let nav = RecordingNavigator::default();
        let handler = CallbackHandler::new("/");
        let token = encode_unsigned(&json!({ "sub": "u1", "role": "Staff" }));
        let url = callback_url(&format!("?token={}", token));

        let outcome = handler.handle(&url, &ctx, &nav);

        assert!(matches!(outcome, CallbackOutcome::SignedIn(ref user) if user.subject == "u1"));
        assert_eq!(ctx.token(), Some(token));
        assert_eq!(ctx.auth_state(), AuthState::SignedIn);
        assert!(backend.has("token").unwrap());
        assert_eq!(
            *nav.actions.borrow(),
            vec![
                Nav::Replace("http://localhost:9876/callback".to_string()),
                Nav::Navigate("/".to_string()),
            ]
        );
    }

    #[test]
    fn test_second_handle_is_ignored() {
        let (_, ctx) = context();
        let nav = RecordingNavigator::default();
        let handler = CallbackHandler::new("/");
        let url = callback_url(&format!("?token={}", encode_unsigned(&json!({ "sub": "u1" }))));

        handler.handle(&url, &ctx, &nav);
        ctx.logout();

        assert_eq!(handler.handle(&url, &ctx, &nav), CallbackOutcome::AlreadyProcessed);
        assert!(!ctx.is_authenticated());
        assert_eq!(nav.actions.borrow().len(), 2);
    }

    #[test]
    fn test_missing_token_fails_without_login() {
        let (backend, ctx) = context();
        let nav = RecordingNavigator::default();
        let handler = CallbackHandler::new("/");

        let outcome = handler.handle(&callback_url("?state=abc"), &ctx, &nav);

        let failure = match outcome {
            CallbackOutcome::Failed(failure) => failure,
            other => panic!("expected failure, got {:?}", other),
        };
        assert_eq!(failure.error, CallbackError::MissingToken);
        assert_eq!(failure.recoveries(), [Recovery::GoHome, Recovery::Retry]);
        assert!(!ctx.is_authenticated());
        assert!(backend.is_empty());
        assert_eq!(
            *nav.actions.borrow(),
            vec![Nav::Replace("http://localhost:9876/callback?state=abc".to_string())]
        );
    }

    #[test]
    fn test_empty_token_is_missing() {
        let (_, ctx) = context();
        let outcome = CallbackHandler::new("/").handle(
            &callback_url("?token="),
            &ctx,
            &RecordingNavigator::default(),
        );

        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { error: CallbackError::MissingToken, .. })
        ));
    }

    #[test]
    fn test_undecodable_token_fails() {
        let (_, ctx) = context();
        let outcome = CallbackHandler::new("/").handle(
            &callback_url("?token=abc.def"),
            &ctx,
            &RecordingNavigator::default(),
        );

        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { error: CallbackError::InvalidToken(_), .. })
        ));
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_persistence_failure_is_terminal() {
        let ctx = SessionContext::new(SessionStore::new(Box::new(ReadOnlyStore)), Arc::new(NoRefresh));
        ctx.initialize();
        let url = callback_url(&format!("?token={}", encode_unsigned(&json!({ "sub": "u1" }))));

        let outcome = CallbackHandler::new("/").handle(&url, &ctx, &RecordingNavigator::default());

        assert!(matches!(
            outcome,
            CallbackOutcome::Failed(CallbackFailure { error: CallbackError::Session(_), .. })
        ));
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_recoveries_navigate() {
        let (_, ctx) = context();
        let nav = RecordingNavigator::default();
        let handler = CallbackHandler::new("/home");
        let url = callback_url("?token=bad");

        let CallbackOutcome::Failed(failure) = handler.handle(&url, &ctx, &nav) else {
            panic!("expected failure");
        };
        handler.recover(&failure, Recovery::GoHome, &nav);
        handler.recover(&failure, Recovery::Retry, &nav);

        let actions = nav.actions.borrow();
        assert_eq!(actions[1], Nav::Navigate("/home".to_string()));
        assert_eq!(actions[2], Nav::Reload(url.to_string()));
    }

    #[test]
    fn test_without_token_keeps_other_params() {
        let url = callback_url("?state=xyz&token=abc&lang=en");
        assert_eq!(
            without_token(&url).as_str(),
            "http://localhost:9876/callback?state=xyz&lang=en"
        );
        assert_eq!(
            without_token(&callback_url("?token=abc")).as_str(),
            "http://localhost:9876/callback"
        );
    }
}
