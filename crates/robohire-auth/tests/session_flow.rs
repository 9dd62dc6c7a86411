//! End-to-end session flows through the public API.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use robohire_auth::{
    token, AuthResult, AuthState, CallbackHandler, CallbackOutcome, GuardDecision, Navigator,
    RouteTable, SessionContext, SessionStore, TokenRefresher,
};
use robohire_config::Config;
use robohire_storage::{FileStore, KeyValueStore, MemoryStore, StorageKeys};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use url::Url;

struct FixedRefresher(Option<String>);

#[async_trait]
impl TokenRefresher for FixedRefresher {
    async fn refresh_token(&self, _current: Option<&str>) -> AuthResult<Option<String>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct CountingNavigator {
    home_visits: AtomicUsize,
    replaced: Mutex<Vec<String>>,
}

impl Navigator for CountingNavigator {
    fn replace(&self, url: &Url) {
        self.replaced.lock().unwrap().push(url.to_string());
    }

    fn navigate(&self, path: &str) {
        if path == "/" {
            self.home_visits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reload(&self, _url: &Url) {}
}

fn unsigned_token(payload: serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

fn new_context(backend: Box<dyn KeyValueStore>, refreshed: Option<String>) -> SessionContext {
    SessionContext::new(SessionStore::new(backend), Arc::new(FixedRefresher(refreshed)))
}

#[test]
fn empty_storage_leaves_visitor_signed_out_and_redirected() {
    let ctx = new_context(Box::new(MemoryStore::new()), None);
    let routes = RouteTable::from_config(&Config::default());

    assert_eq!(
        routes.check(&ctx.snapshot(), "/contract-templates"),
        GuardDecision::Loading
    );

    ctx.initialize();

    assert!(!ctx.is_loading());
    assert!(!ctx.is_authenticated());
    assert_eq!(
        routes.check(&ctx.snapshot(), "/contract-templates"),
        GuardDecision::RedirectToLogin {
            to: "/".to_string(),
            return_to: "/contract-templates".to_string(),
        }
    );
}

#[test]
fn callback_signs_in_once_and_unlocks_staff_routes() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = new_context(Box::new(backend.clone()), None);
    ctx.initialize();

    let token = unsigned_token(json!({ "sub": "staff-1", "role": "STAFF", "email": "s@robohire.app" }));
    let url = Url::parse(&format!("http://localhost:9876/callback?token={}", token)).unwrap();
    let navigator = CountingNavigator::default();
    let handler = CallbackHandler::new("/");

    assert!(matches!(
        handler.handle(&url, &ctx, &navigator),
        CallbackOutcome::SignedIn(_)
    ));
    assert!(matches!(
        handler.handle(&url, &ctx, &navigator),
        CallbackOutcome::AlreadyProcessed
    ));

    assert_eq!(navigator.home_visits.load(Ordering::SeqCst), 1);
    assert_eq!(
        *navigator.replaced.lock().unwrap(),
        vec!["http://localhost:9876/callback".to_string()]
    );
    assert_eq!(backend.get(StorageKeys::TOKEN).unwrap(), Some(token));

    let routes = RouteTable::from_config(&Config::default());
    let snapshot = ctx.snapshot();
    assert_eq!(routes.check(&snapshot, "/contract-templates"), GuardDecision::Render);
    assert_eq!(routes.check(&snapshot, "/face-verification"), GuardDecision::Render);
    assert_eq!(
        routes.check(&snapshot, "/accounts"),
        GuardDecision::RedirectForbidden { to: "/".to_string() }
    );
}

#[test]
fn callback_without_token_never_signs_in() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = new_context(Box::new(backend.clone()), None);
    ctx.initialize();

    let url = Url::parse("http://localhost:9876/callback").unwrap();
    let navigator = CountingNavigator::default();

    let outcome = CallbackHandler::new("/").handle(&url, &ctx, &navigator);

    assert!(matches!(outcome, CallbackOutcome::Failed(_)));
    assert!(!ctx.is_authenticated());
    assert!(backend.is_empty());
    assert_eq!(navigator.home_visits.load(Ordering::SeqCst), 0);
}

#[test]
fn session_survives_restart_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let token = unsigned_token(json!({ "sub": "renter-7" }));

    {
        let ctx = new_context(Box::new(FileStore::new(&path)), None);
        ctx.initialize();
        let claims = token::decode(&token).unwrap();
        ctx.login(&token, (&claims).into()).unwrap();
    }

    let ctx = new_context(Box::new(FileStore::new(&path)), None);
    ctx.initialize();

    assert!(ctx.is_authenticated());
    assert_eq!(ctx.user().unwrap().subject, "renter-7");
    assert_eq!(ctx.auth_state(), AuthState::SignedIn);
}

#[test]
fn corrupt_persisted_user_starts_signed_out() {
    let backend = Arc::new(MemoryStore::new());
    backend.set(StorageKeys::TOKEN, "some.token.value").unwrap();
    backend.set(StorageKeys::USER, "][").unwrap();

    let ctx = new_context(Box::new(backend.clone()), None);
    ctx.initialize();

    assert!(!ctx.is_authenticated());
    assert!(backend.is_empty());
}

#[tokio::test]
async fn failed_refresh_signs_out_everywhere() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = Arc::new(new_context(Box::new(backend.clone()), None));
    ctx.initialize();
    ctx.login(
        &unsigned_token(json!({ "sub": "u1" })),
        robohire_auth::UserClaims::new("u1"),
    )
    .unwrap();

    let refreshed = SessionContext::provide(ctx.clone(), async {
        SessionContext::current().refresh().await
    })
    .await;

    assert!(!refreshed);
    assert!(!ctx.is_authenticated());
    assert!(backend.is_empty());
}

#[tokio::test]
async fn successful_refresh_keeps_session() {
    let renewed = unsigned_token(json!({ "sub": "u1", "role": "Admin" }));
    let ctx = new_context(Box::new(MemoryStore::new()), Some(renewed.clone()));
    ctx.initialize();
    ctx.login("old.token.sig", robohire_auth::UserClaims::new("u1"))
        .unwrap();

    assert!(ctx.refresh().await);
    assert_eq!(ctx.token(), Some(renewed));
    assert_eq!(ctx.snapshot().role(), Some("Admin"));
}
