//! Session context with FSM-based state tracking.
//!
//! A [`SessionContext`] owns the in-memory session for one application
//! instance. It is constructed explicitly, rehydrated once from the
//! [`SessionStore`], and shared through [`SessionContext::provide`] with
//! everything that runs inside the application scope.

use crate::auth_fsm::{AuthState, SessionMachine, SessionMachineInput, SessionMachineState};
use crate::refresh::TokenRefresher;
use crate::session_store::SessionStore;
use crate::token::{self, UserClaims};
use crate::{AuthError, AuthResult};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

tokio::task_local! {
    static CURRENT_SESSION: Arc<SessionContext>;
}

/// Point-in-time view of the session.
#[derive(Clone, PartialEq)]
pub struct SessionSnapshot {
    pub is_loading: bool,
    pub token: Option<String>,
    pub user: Option<UserClaims>,
    pub state: AuthState,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            is_loading: true,
            token: None,
            user: None,
            state: AuthState::Loading,
        }
    }

    /// A token and user are both present.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn role(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.role.as_deref())
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("is_loading", &self.is_loading)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .field("user", &self.user)
            .field("state", &self.state)
            .finish()
    }
}

struct Session {
    token: Option<String>,
    user: Option<UserClaims>,
    loading: bool,
    fsm: SessionMachine,
    /// Bumped on every login and sign-out.
    generation: u64,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_loading: self.loading,
            token: self.token.clone(),
            user: self.user.clone(),
            state: AuthState::from(self.fsm.state()),
        }
    }
}

/// Owner of the current session.
///
/// The FSM tracks transient states (loading, refreshing) that are never
/// persisted; token and user are persisted through the [`SessionStore`]
/// before they become visible in memory.
pub struct SessionContext {
    store: SessionStore,
    refresher: Arc<dyn TokenRefresher>,
    session: Mutex<Session>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionContext {
    pub fn new(store: SessionStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::loading());
        Self {
            store,
            refresher,
            session: Mutex::new(Session {
                token: None,
                user: None,
                loading: true,
                fsm: SessionMachine::new(),
                generation: 0,
            }),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transition the FSM, logging the change.
    fn transition(session: &mut Session, input: &SessionMachineInput) -> AuthResult<AuthState> {
        let old_state = AuthState::from(session.fsm.state());

        session.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                session.fsm.state()
            ))
        })?;

        let new_state = AuthState::from(session.fsm.state());
        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
        }

        Ok(new_state)
    }

    fn apply(session: &mut Session, input: &SessionMachineInput) {
        if let Err(e) = Self::transition(session, input) {
            warn!(error = %e, "Ignoring session state transition");
        }
    }

    fn publish(&self, session: &Session) {
        self.updates.send_replace(session.snapshot());
    }

    /// Rehydrate from the store. Only the first call has any effect.
    pub fn initialize(&self) {
        let mut session = self.lock();
        if !session.loading {
            debug!("Session already initialized");
            return;
        }

        // A login that landed before initialization wins over storage
        if session.token.is_none() {
            match self.store.load() {
                Some((token, user)) => {
                    info!(subject = %user.subject, "Restored persisted session");
                    session.token = Some(token);
                    session.user = Some(user);
                    Self::apply(&mut session, &SessionMachineInput::Rehydrated);
                }
                None => {
                    debug!("No persisted session");
                    Self::apply(&mut session, &SessionMachineInput::NothingStored);
                }
            }
        }

        session.loading = false;
        self.publish(&session);
    }

    /// Persist then adopt a new session.
    ///
    /// Nothing changes in memory if the write fails.
    pub fn login(&self, token: &str, user: UserClaims) -> AuthResult<()> {
        let mut session = self.lock();

        self.store.save(token, &user)?;

        info!(subject = %user.subject, role = ?user.role, "Signed in");
        session.token = Some(token.to_string());
        session.user = Some(user);
        session.generation += 1;
        Self::apply(&mut session, &SessionMachineInput::Login);
        self.publish(&session);
        Ok(())
    }

    /// Clear the session from memory and storage.
    pub fn logout(&self) {
        let mut session = self.lock();
        self.sign_out(&mut session, &SessionMachineInput::Logout);
        info!("Signed out");
    }

    fn sign_out(&self, session: &mut Session, input: &SessionMachineInput) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        session.token = None;
        session.user = None;
        session.generation += 1;
        Self::apply(session, input);
        self.publish(session);
    }

    /// Exchange the current token for a new one.
    ///
    /// Only a signed-in session can be refreshed. Any failure signs the user
    /// out and returns `false`. If the session is replaced or cleared while
    /// the request is in flight, the result is dropped.
    pub async fn refresh(&self) -> bool {
        let (current, generation) = {
            let mut session = self.lock();
            if let Err(e) = Self::transition(&mut session, &SessionMachineInput::RefreshStarted) {
                warn!(error = %e, "Refresh not possible now");
                return false;
            }
            self.publish(&session);
            (session.token.clone(), session.generation)
        };

        let outcome = self.refresher.refresh_token(current.as_deref()).await;

        let mut session = self.lock();
        if session.generation != generation
            || *session.fsm.state() != SessionMachineState::Refreshing
        {
            debug!("Session changed during refresh, discarding result");
            return false;
        }

        let new_token = match outcome {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("Server declined refresh, signing out");
                self.sign_out(&mut session, &SessionMachineInput::RefreshFailed);
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, signing out");
                self.sign_out(&mut session, &SessionMachineInput::RefreshFailed);
                return false;
            }
        };

        let user = match token::decode(&new_token) {
            Ok(claims) => UserClaims::from(&claims),
            Err(e) => {
                warn!(error = %e, "Refreshed token is unreadable, signing out");
                self.sign_out(&mut session, &SessionMachineInput::RefreshFailed);
                return false;
            }
        };

        if let Err(e) = self.store.save(&new_token, &user) {
            warn!(error = %e, "Failed to persist refreshed session, signing out");
            self.sign_out(&mut session, &SessionMachineInput::RefreshFailed);
            return false;
        }

        info!(subject = %user.subject, "Token refreshed");
        session.token = Some(new_token);
        session.user = Some(user);
        Self::apply(&mut session, &SessionMachineInput::RefreshSucceeded);
        self.publish(&session);
        true
    }

    pub fn user(&self) -> Option<UserClaims> {
        self.lock().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn is_authenticated(&self) -> bool {
        let session = self.lock();
        session.token.is_some() && session.user.is_some()
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from(self.lock().fsm.state())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Run `future` with `ctx` installed as the current session.
    pub async fn provide<F: Future>(ctx: Arc<SessionContext>, future: F) -> F::Output {
        CURRENT_SESSION.scope(ctx, future).await
    }

    /// Synchronous counterpart of [`provide`](Self::provide).
    pub fn provide_sync<R>(ctx: Arc<SessionContext>, f: impl FnOnce() -> R) -> R {
        CURRENT_SESSION.sync_scope(ctx, f)
    }

    /// The session installed by the enclosing provider, if any.
    pub fn try_current() -> AuthResult<Arc<SessionContext>> {
        CURRENT_SESSION
            .try_with(Arc::clone)
            .map_err(|_| AuthError::NoProvider)
    }

    /// The session installed by the enclosing provider.
    ///
    /// # Panics
    ///
    /// Panics when called outside [`provide`](Self::provide) or
    /// [`provide_sync`](Self::provide_sync).
    pub fn current() -> Arc<SessionContext> {
        match Self::try_current() {
            Ok(ctx) => ctx,
            Err(_) => panic!("SessionContext::current() called outside of a session provider"),
        }
    }
}
