//! CLI command implementations.

mod auth;
mod routes;

pub use auth::{callback, login, logout, refresh, status};
pub use routes::{check, routes};

use anyhow::Result;
use robohire_auth::{HttpTokenRefresher, SessionContext, SessionStore};
use robohire_config::{Config, Paths};
use robohire_storage::{create_storage, KeyValueStore, MemoryStore};
use std::sync::Arc;
use tracing::debug;

/// Build and rehydrate the session for this invocation.
///
/// `ephemeral` keeps the session in memory only.
pub fn open_session(paths: &Paths, config: &Config, ephemeral: bool) -> Result<Arc<SessionContext>> {
    let storage: Box<dyn KeyValueStore> = if ephemeral {
        debug!("Using in-memory session storage");
        Box::new(MemoryStore::new())
    } else {
        create_storage(paths)?
    };

    let refresher = Arc::new(HttpTokenRefresher::new(&config.api_url));
    let ctx = SessionContext::new(SessionStore::new(storage), refresher);
    ctx.initialize();

    Ok(Arc::new(ctx))
}
