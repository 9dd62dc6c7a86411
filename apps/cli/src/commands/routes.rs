//! Route access commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use robohire_auth::{GuardDecision, RouteRule, RouteTable, SessionContext};
use robohire_config::Config;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CheckView<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
    #[serde(flatten)]
    decision: &'a GuardDecision,
}

fn describe(decision: &GuardDecision) -> String {
    match decision {
        GuardDecision::Loading => "Session still loading".to_string(),
        GuardDecision::RedirectToLogin { to, return_to } => {
            format!("Sign-in required: redirect to {} (return to {})", to, return_to)
        }
        GuardDecision::RedirectForbidden { to } => {
            format!("Role not permitted: redirect to {}", to)
        }
        GuardDecision::Render => "Allowed".to_string(),
    }
}

/// Evaluate access to `path` for the current session.
pub async fn check(config: &Config, path: &str, format: &OutputFormat) -> Result<()> {
    let table = RouteTable::from_config(config);
    let snapshot = SessionContext::current().snapshot();
    let rule = table.rule_for(path);
    let decision = table.check(&snapshot, path);

    match format {
        OutputFormat::Json => output::print_json(&CheckView {
            path,
            rule: rule.map(|r| r.prefix.as_str()),
            decision: &decision,
        }),
        OutputFormat::Text => {
            output::print_row("Path", path);
            output::print_row(
                "Rule",
                rule.map(|r| r.prefix.as_str()).unwrap_or("public"),
            );
            output::print_row("Decision", &describe(&decision));
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct RouteView<'a> {
    prefix: &'a str,
    roles: &'a [String],
    login_path: &'a str,
    forbidden_path: &'a str,
}

impl<'a> From<&'a RouteRule> for RouteView<'a> {
    fn from(rule: &'a RouteRule) -> Self {
        Self {
            prefix: &rule.prefix,
            roles: rule.guard.required_roles(),
            login_path: &rule.guard.config().login_path,
            forbidden_path: &rule.guard.config().forbidden_path,
        }
    }
}

fn roles_label(roles: &[String]) -> String {
    if roles.is_empty() {
        "any signed-in user".to_string()
    } else {
        roles.join(", ")
    }
}

/// List the protected routes.
pub async fn routes(config: &Config, format: &OutputFormat) -> Result<()> {
    let table = RouteTable::from_config(config);
    let views: Vec<RouteView<'_>> = table.rules().iter().map(RouteView::from).collect();

    match format {
        OutputFormat::Json => output::print_json(&views),
        OutputFormat::Text => {
            output::print_heading("Protected routes");
            for view in &views {
                println!("{}", view.prefix);
                output::print_row("Roles", &roles_label(view.roles));
                output::print_row("Sign-in", view.login_path);
                output::print_row("Forbidden", view.forbidden_path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_decisions() {
        assert_eq!(describe(&GuardDecision::Render), "Allowed");
        assert_eq!(
            describe(&GuardDecision::RedirectToLogin {
                to: "/".to_string(),
                return_to: "/accounts".to_string(),
            }),
            "Sign-in required: redirect to / (return to /accounts)"
        );
    }

    #[test]
    fn test_roles_label() {
        assert_eq!(roles_label(&[]), "any signed-in user");
        assert_eq!(
            roles_label(&["Admin".to_string(), "Staff".to_string()]),
            "Admin, Staff"
        );
    }

    #[test]
    fn test_check_view_flattens_decision() {
        let decision = GuardDecision::RedirectForbidden { to: "/".to_string() };
        let json = serde_json::to_value(CheckView {
            path: "/accounts",
            rule: Some("/accounts"),
            decision: &decision,
        })
        .unwrap();

        assert_eq!(json["decision"], "redirect_forbidden");
        assert_eq!(json["to"], "/");
        assert_eq!(json["rule"], "/accounts");
    }

    #[test]
    fn test_route_views_from_default_config() {
        let table = RouteTable::from_config(&Config::default());
        let views: Vec<RouteView<'_>> = table.rules().iter().map(RouteView::from).collect();

        assert_eq!(views[2].prefix, "/accounts");
        assert_eq!(views[2].roles, &["Admin".to_string()][..]);
    }
}
