//! Local listener for the identity provider redirect.
//!
//! The browser is sent to the provider's login page with a return URL
//! pointing here. Each request to `/callback` runs a fresh
//! [`CallbackHandler`]; its navigation is answered as HTTP.
//!
//! A failed attempt whose URL carried a token is answered with a redirect to
//! the scrubbed URL plus an `attempt` marker, and the error page is rendered
//! on that follow-up request so the token never stays in the address bar.

use crate::callback::{CallbackFailure, CallbackHandler, CallbackOutcome, Navigator, TOKEN_PARAM};
use crate::context::SessionContext;
use crate::token::UserClaims;
use crate::{AuthError, AuthResult};
use robohire_config::Config;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use url::Url;

/// Path the identity provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// Query parameter naming a failed attempt awaiting its error page.
pub const ATTEMPT_PARAM: &str = "attempt";

type LoginSender = Arc<tokio::sync::Mutex<Option<oneshot::Sender<UserClaims>>>>;

/// Callback server that waits for the sign-in redirect.
pub struct CallbackServer {
    port: u16,
    timeout: Duration,
    home_path: String,
}

impl CallbackServer {
    pub fn new(port: u16, timeout_secs: u64, home_path: &str) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(timeout_secs),
            home_path: home_path.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.callback_port,
            config.callback_timeout_secs,
            &config.home_path,
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URL to hand the identity provider as the return address.
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Listen on the configured port until a sign-in succeeds.
    ///
    /// The caller is responsible for sending the browser to the provider.
    pub async fn wait_for_login(&self, ctx: Arc<SessionContext>) -> AuthResult<UserClaims> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(port = self.port, "Callback server listening");
        self.serve(listener, ctx).await
    }

    /// Serve callbacks on `listener` until a sign-in succeeds or the timeout
    /// elapses. Failed attempts keep the server running so the user can retry.
    pub async fn serve(
        &self,
        listener: TcpListener,
        ctx: Arc<SessionContext>,
    ) -> AuthResult<UserClaims> {
        let (tx, rx) = oneshot::channel::<UserClaims>();
        let tx: LoginSender = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let home_path = Arc::new(self.home_path.clone());
        let failures = Arc::new(PendingFailures::default());

        let server_handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let tx = tx.clone();
                        let ctx = ctx.clone();
                        let home_path = home_path.clone();
                        let failures = failures.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(socket, &ctx, &home_path, &failures, tx).await
                            {
                                error!("Error handling callback connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        });

        let result = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(user)) => Ok(user),
            Ok(Err(_)) => Err(AuthError::Io(std::io::Error::other(
                "callback server stopped",
            ))),
            Err(_) => Err(AuthError::Timeout),
        };

        server_handle.abort();
        result
    }
}

/// Failed attempts waiting for the browser to come back for their page.
#[derive(Default)]
struct PendingFailures {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, CallbackFailure>>,
}

impl PendingFailures {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, CallbackFailure>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn park(&self, failure: CallbackFailure) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock().insert(id, failure);
        id
    }

    fn take(&self, id: u64) -> Option<CallbackFailure> {
        self.lock().remove(&id)
    }
}

/// Records where the handler asked the browser to go.
#[derive(Default)]
struct ResponseNavigator {
    replaced: Mutex<Option<Url>>,
    location: Mutex<Option<String>>,
}

impl ResponseNavigator {
    fn set(&self, location: String) {
        *self
            .location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(location);
    }

    fn location(&self) -> Option<String> {
        self.location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replaced(&self) -> Option<Url> {
        self.replaced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Navigator for ResponseNavigator {
    fn replace(&self, url: &Url) {
        debug!(path = %url.path(), "Callback location scrubbed");
        *self
            .replaced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(url.clone());
    }

    fn navigate(&self, path: &str) {
        self.set(path.to_string());
    }

    fn reload(&self, url: &Url) {
        self.set(relative(url));
    }
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn handle_connection(
    mut socket: TcpStream,
    ctx: &SessionContext,
    home_path: &str,
    failures: &PendingFailures,
    tx: LoginSender,
) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers; the body is never used
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target);

    debug!(method = %method, path = %path, "Received request");

    if method != "GET" {
        return send_response(&mut writer, 405, "Method Not Allowed", &[], "Method Not Allowed")
            .await;
    }

    if path == home_path {
        return send_response(&mut writer, 200, "OK", &[], &success_page()).await;
    }

    if path != CALLBACK_PATH {
        return send_response(&mut writer, 404, "Not Found", &[], "Not Found").await;
    }

    let url = Url::parse(&format!("http://localhost{}", target))?;

    let carried_token = query_value(&url, TOKEN_PARAM).is_some();

    if !carried_token {
        let parked = query_value(&url, ATTEMPT_PARAM)
            .and_then(|id| id.parse::<u64>().ok())
            .and_then(|id| failures.take(id));
        if let Some(failure) = parked {
            return send_error_page(&mut writer, &failure, home_path).await;
        }
    }

    let handler = CallbackHandler::new(home_path);
    let navigator = ResponseNavigator::default();

    let outcome = handler.handle(&url, ctx, &navigator);

    let failure = match outcome {
        CallbackOutcome::Failed(failure) => failure,
        other => {
            let location = navigator
                .location()
                .unwrap_or_else(|| home_path.to_string());
            send_redirect(&mut writer, &location).await?;

            if let CallbackOutcome::SignedIn(user) = other {
                if let Some(tx) = tx.lock().await.take() {
                    let _ = tx.send(user);
                }
            }
            return Ok(());
        }
    };

    match navigator.replaced() {
        Some(mut scrubbed) if carried_token => {
            let id = failures.park(failure);
            scrubbed
                .query_pairs_mut()
                .append_pair(ATTEMPT_PARAM, &id.to_string());
            debug!(attempt = id, "Redirecting failed callback to scrubbed location");
            send_redirect(&mut writer, &relative(&scrubbed)).await
        }
        _ => send_error_page(&mut writer, &failure, home_path).await,
    }
}

async fn send_redirect(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    location: &str,
) -> AuthResult<()> {
    send_response(writer, 303, "See Other", &[("Location", location)], "").await
}

async fn send_error_page(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    failure: &CallbackFailure,
    home_path: &str,
) -> AuthResult<()> {
    send_response(writer, 400, "Bad Request", &[], &error_page(failure, home_path)).await
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> AuthResult<()> {
    let mut response = format!("HTTP/1.1 {} {}\r\n", status_code, status_text);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "Content-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Path and query of `url`.
fn relative(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>RoboHire - Signed In</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px;">
<h1 style="color: #22c55e;">You're signed in</h1>
<p style="color: #666;">You can close this window and return to the terminal.</p>
</div>
</body>
</html>"#
        .to_string()
}

fn error_page(failure: &CallbackFailure, home_path: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>RoboHire - Sign-in Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px;">
<h1 style="color: #ef4444;">Sign-in failed</h1>
<p style="color: #666;">{}</p>
<p><a href="{}">Go home</a> &middot; <a href="{}">Try again</a></p>
</div>
</body>
</html>"#,
        escape_html(&failure.message()),
        escape_html(home_path),
        escape_html(&relative(&failure.callback_url)),
    )
}
