//! Session and route authorization for the RoboHire client.
//!
//! This crate provides:
//! - Compact token decoding into user claims
//! - Durable session persistence over a key-value store
//! - A session context with refresh and FSM-based state tracking
//! - Role-based route guards and a protected route table
//! - Sign-in callback handling, including a local callback server

mod auth_fsm;
mod callback;
mod callback_server;
mod context;
mod error;
pub mod guard;
mod refresh;
mod routes;
mod session_store;
pub mod token;

pub use auth_fsm::session_machine;
pub use auth_fsm::{AuthState, SessionMachine, SessionMachineInput, SessionMachineState};
pub use callback::{
    without_token, CallbackError, CallbackFailure, CallbackHandler, CallbackOutcome, Navigator,
    Recovery, TOKEN_PARAM,
};
pub use callback_server::{CallbackServer, CALLBACK_PATH};
pub use context::{SessionContext, SessionSnapshot};
pub use error::{AuthError, AuthResult};
pub use guard::{GuardConfig, GuardDecision, GuardInput, RouteGuard};
pub use refresh::{HttpTokenRefresher, RefreshConfig, TokenRefresher};
pub use routes::{RouteRule, RouteTable};
pub use session_store::{LoadOutcome, SessionStore};
pub use token::{DecodeError, TokenClaims, UserClaims};
