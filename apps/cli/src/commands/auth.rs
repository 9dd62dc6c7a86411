//! Authentication commands.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use robohire_auth::{
    CallbackHandler, CallbackOutcome, CallbackServer, Navigator, Recovery, SessionContext,
    SessionSnapshot,
};
use robohire_config::Config;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Sign in through the identity provider in the browser.
pub async fn login(config: &Config, no_browser: bool, format: &OutputFormat) -> Result<()> {
    let ctx = SessionContext::current();

    if let Some(user) = ctx.user() {
        let who = user.email.as_deref().unwrap_or(&user.subject);
        output::print_success(&format!("Already signed in as {}", who), format);
        return Ok(());
    }

    let server = CallbackServer::from_config(config);
    let login_url = config.login_url(&server.callback_url())?;

    if no_browser {
        println!("Open this URL to sign in:\n  {}", login_url);
    } else {
        println!("Opening browser to sign in...");
        if let Err(e) = open::that(login_url.as_str()) {
            warn!(error = %e, "Failed to open browser");
            println!("Open this URL to sign in:\n  {}", login_url);
        }
    }
    println!("Waiting for sign-in (Ctrl+C to cancel)...");

    let user = server
        .wait_for_login(ctx.clone())
        .await
        .context("Sign-in did not complete")?;

    let who = user.email.as_deref().unwrap_or(&user.subject);
    output::print_success(&format!("Signed in as {}", who), format);
    Ok(())
}

/// There is no address bar in a terminal; navigation is only traced.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn replace(&self, url: &Url) {
        debug!(path = %url.path(), "Callback location scrubbed");
    }

    fn navigate(&self, path: &str) {
        debug!(path = %path, "Continuing in app");
    }

    fn reload(&self, url: &Url) {
        debug!(path = %url.path(), "Reloading callback");
    }
}

/// Process a pasted sign-in redirect URL.
pub async fn callback(config: &Config, raw_url: &str, format: &OutputFormat) -> Result<()> {
    let ctx = SessionContext::current();
    let url = Url::parse(raw_url).context("Not a valid URL")?;

    let handler = CallbackHandler::new(config.home_path.as_str());
    let navigator = TerminalNavigator;

    match handler.handle(&url, &ctx, &navigator) {
        CallbackOutcome::SignedIn(user) => {
            let who = user.email.as_deref().unwrap_or(&user.subject);
            output::print_success(&format!("Signed in as {}", who), format);
        }
        CallbackOutcome::Failed(failure) => {
            output::print_error(&failure.message(), format);
            if *format == OutputFormat::Text {
                for recovery in failure.recoveries() {
                    match recovery {
                        Recovery::GoHome => output::print_row("Go home", handler.home_path()),
                        Recovery::Retry => output::print_row(
                            "Retry",
                            &format!("robohire callback '{}'", failure.callback_url),
                        ),
                    }
                }
            }
            anyhow::bail!("Sign-in failed");
        }
        CallbackOutcome::AlreadyProcessed => {
            output::print_success("Callback already processed", format);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusView {
    authenticated: bool,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl From<&SessionSnapshot> for StatusView {
    fn from(snapshot: &SessionSnapshot) -> Self {
        let user = snapshot.user.as_ref();
        Self {
            authenticated: snapshot.is_authenticated(),
            state: snapshot.state.as_str(),
            subject: user.map(|u| u.subject.clone()),
            email: user.and_then(|u| u.email.clone()),
            name: user.and_then(|u| u.name.clone()),
            role: user.and_then(|u| u.role.clone()),
            account_status: user.map(|u| u.account_status.clone()),
            email_confirmed: user.map(|u| u.email_confirmed),
            expires_at: user.and_then(|u| u.expires_at),
        }
    }
}

/// Show the current session.
pub async fn status(format: &OutputFormat) -> Result<()> {
    let view = StatusView::from(&SessionContext::current().snapshot());

    match format {
        OutputFormat::Json => output::print_json(&view),
        OutputFormat::Text => {
            if !view.authenticated {
                println!("Auth:     not signed in");
                return Ok(());
            }
            println!("Auth:     signed in");
            let rows = [
                ("Subject", view.subject.clone()),
                ("Email", view.email.clone()),
                ("Name", view.name.clone()),
                ("Role", view.role.clone()),
                ("Account", view.account_status.clone()),
                ("Email confirmed", view.email_confirmed.map(|c| c.to_string())),
                ("Expires", view.expires_at.map(|t| t.to_rfc3339())),
            ];
            for (label, value) in rows {
                if let Some(value) = value {
                    output::print_row(label, &value);
                }
            }
        }
    }

    Ok(())
}

/// Exchange the stored token for a fresh one.
pub async fn refresh(format: &OutputFormat) -> Result<()> {
    let ctx = SessionContext::current();

    if !ctx.is_authenticated() {
        output::print_error("Not signed in", format);
        return Ok(());
    }

    if ctx.refresh().await {
        output::print_success("Session refreshed", format);
        Ok(())
    } else {
        anyhow::bail!("Session could not be refreshed; you have been signed out")
    }
}

/// Sign out and clear the stored session.
pub async fn logout(format: &OutputFormat) -> Result<()> {
    let ctx = SessionContext::current();
    let was_signed_in = ctx.is_authenticated();
    ctx.logout();

    if was_signed_in {
        output::print_success("Signed out", format);
    } else {
        output::print_success("Not signed in", format);
    }
    Ok(())
}
