//! Protected route declarations.

use crate::context::SessionSnapshot;
use crate::guard::{GuardConfig, GuardDecision, RouteGuard};
use robohire_config::Config;

/// A path prefix and the guard protecting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub prefix: String,
    pub guard: RouteGuard,
}

impl RouteRule {
    /// `/accounts` covers `/accounts` and `/accounts/7`, not `/accountsx`.
    fn covers(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Maps request paths to route guards; unlisted paths are public.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the configured routes, applying the configured
    /// login and forbidden paths unless a route overrides them.
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::new();
        for entry in &config.routes {
            let guard_config = GuardConfig {
                login_path: entry
                    .login_path
                    .clone()
                    .unwrap_or_else(|| config.login_path.clone()),
                forbidden_path: entry
                    .forbidden_path
                    .clone()
                    .unwrap_or_else(|| config.forbidden_path.clone()),
            };
            table.protect(
                &entry.prefix,
                RouteGuard::new(guard_config).with_roles(entry.roles.iter().cloned()),
            );
        }
        table
    }

    /// Add or replace the guard for `prefix`.
    pub fn protect(&mut self, prefix: &str, guard: RouteGuard) {
        match self.rules.iter_mut().find(|rule| rule.prefix == prefix) {
            Some(rule) => rule.guard = guard,
            None => self.rules.push(RouteRule {
                prefix: prefix.to_string(),
                guard,
            }),
        }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// The most specific rule covering `location`, ignoring query and fragment.
    pub fn rule_for(&self, location: &str) -> Option<&RouteRule> {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or(location);

        self.rules
            .iter()
            .filter(|rule| rule.covers(path))
            .max_by_key(|rule| rule.prefix.trim_end_matches('/').len())
    }

    /// Decide what `location` shows for `session`.
    pub fn check(&self, session: &SessionSnapshot, location: &str) -> GuardDecision {
        match self.rule_for(location) {
            Some(rule) => rule.guard.check(session, location),
            None => GuardDecision::Render,
        }
    }
}
