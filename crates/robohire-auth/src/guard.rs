//! Route authorization decisions.

use crate::context::SessionSnapshot;
use serde::Serialize;

/// Where the guard sends visitors it turns away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub login_path: String,
    pub forbidden_path: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: "/".to_string(),
            forbidden_path: "/".to_string(),
        }
    }
}

/// Everything a decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput<'a> {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user_role: Option<&'a str>,
    /// Empty admits any authenticated user.
    pub required_roles: &'a [String],
    pub current_location: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session not yet known; show a placeholder.
    Loading,
    RedirectToLogin { to: String, return_to: String },
    RedirectForbidden { to: String },
    Render,
}

impl GuardDecision {
    pub fn is_render(&self) -> bool {
        matches!(self, GuardDecision::Render)
    }
}

/// Decide what a protected route shows.
pub fn evaluate(input: &GuardInput<'_>, config: &GuardConfig) -> GuardDecision {
    if input.is_loading {
        return GuardDecision::Loading;
    }

    if !input.is_authenticated {
        return GuardDecision::RedirectToLogin {
            to: config.login_path.clone(),
            return_to: input.current_location.to_string(),
        };
    }

    if !input.required_roles.is_empty() && !role_matches(input.user_role, input.required_roles) {
        return GuardDecision::RedirectForbidden {
            to: config.forbidden_path.clone(),
        };
    }

    GuardDecision::Render
}

/// Case-insensitive membership; a missing role matches nothing.
pub fn role_matches(user_role: Option<&str>, required_roles: &[String]) -> bool {
    let Some(role) = user_role.map(str::trim).filter(|r| !r.is_empty()) else {
        return false;
    };
    let role = role.to_lowercase();
    required_roles
        .iter()
        .any(|required| required.trim().to_lowercase() == role)
}

/// Guard settings for one protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    config: GuardConfig,
    required_roles: Vec<String>,
}

impl RouteGuard {
    /// Admit any authenticated user.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            required_roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn required_roles(&self) -> &[String] {
        &self.required_roles
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn check(&self, session: &SessionSnapshot, current_location: &str) -> GuardDecision {
        evaluate(
            &GuardInput {
                is_loading: session.is_loading,
                is_authenticated: session.is_authenticated(),
                user_role: session.role(),
                required_roles: &self.required_roles,
                current_location,
            },
            &self.config,
        )
    }
}
