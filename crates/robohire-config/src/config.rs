//! Client configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API base URL (override at compile time via ROBOHIRE_API_URL).
pub const DEFAULT_API_URL: &str = match option_env!("ROBOHIRE_API_URL") {
    Some(url) => url,
    None => "https://api.robohire.app",
};

/// Default identity provider URL (override at compile time via ROBOHIRE_IDENTITY_URL).
pub const DEFAULT_IDENTITY_URL: &str = match option_env!("ROBOHIRE_IDENTITY_URL") {
    Some(url) => url,
    None => "https://id.robohire.app",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default port for the local login callback listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 9876;

/// Default time to wait for the identity provider redirect.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

/// A protected route declaration.
///
/// An empty `roles` list admits any authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Path prefix this rule applies to, e.g. `/accounts`.
    pub prefix: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Overrides [`Config::login_path`] for this route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_path: Option<String>,
    /// Overrides [`Config::forbidden_path`] for this route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_path: Option<String>,
}

impl RouteEntry {
    pub fn new(prefix: &str, roles: &[&str]) -> Self {
        Self {
            prefix: prefix.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            login_path: None,
            forbidden_path: None,
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the RoboHire API (token refresh lives here).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL of the external identity provider.
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    /// Where a successful login lands.
    #[serde(default = "default_root_path")]
    pub home_path: String,
    /// Where unauthenticated visitors of a protected route are sent.
    #[serde(default = "default_root_path")]
    pub login_path: String,
    /// Where authenticated visitors lacking a required role are sent.
    #[serde(default = "default_root_path")]
    pub forbidden_path: String,
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteEntry>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_callback_timeout_secs() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_SECS
}

fn default_root_path() -> String {
    "/".to_string()
}

fn default_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("/face-verification", &[]),
        RouteEntry::new("/contract-templates", &["Admin", "Staff"]),
        RouteEntry::new("/accounts", &["Admin"]),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            identity_url: default_identity_url(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            home_path: default_root_path(),
            login_path: default_root_path(),
            forbidden_path: default_root_path(),
            routes: default_routes(),
        }
    }
}

impl Config {
    /// Defaults overridden from the environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `paths.config_file()`, falling back to defaults
    /// when the file does not exist. Environment overrides apply last.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `paths.config_file()`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("ROBOHIRE_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_url()?;
        self.identity_url()?;

        if self.callback_port == 0 {
            return Err(CoreError::Config("callback_port must be non-zero".to_string()));
        }

        for path in [&self.home_path, &self.login_path, &self.forbidden_path] {
            if !path.starts_with('/') {
                return Err(CoreError::Config(format!(
                    "navigation path must be absolute: {}",
                    path
                )));
            }
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                return Err(CoreError::Config(format!(
                    "route prefix must start with '/': {}",
                    route.prefix
                )));
            }
        }

        Ok(())
    }

    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    pub fn identity_url(&self) -> CoreResult<Url> {
        Url::parse(&self.identity_url).map_err(CoreError::from)
    }

    /// Local URL the identity provider redirects back to.
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }

    /// Identity provider login page that returns to `callback_url`.
    pub fn login_url(&self, callback_url: &str) -> CoreResult<Url> {
        let mut url = self.identity_url()?.join("login")?;
        url.query_pairs_mut().append_pair("returnUrl", callback_url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.callback_port, DEFAULT_CALLBACK_PORT);
        assert_eq!(config.home_path, "/");
        assert_eq!(config.routes.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{
                "log_level": "debug",
                "routes": [{ "prefix": "/fleet", "roles": ["Staff"] }]
            }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.identity_url, DEFAULT_IDENTITY_URL);
        assert_eq!(config.routes, vec![RouteEntry::new("/fleet", &["Staff"])]);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.callback_port = 4000;
        config.forbidden_path = "/403".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.callback_port, 4000);
        assert_eq!(loaded.forbidden_path, "/403");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_validate_rejects_relative_route_prefix() {
        let mut config = Config::default();
        config.routes.push(RouteEntry::new("accounts", &["Admin"]));

        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_invalid_url() {
        let mut config = Config::default();
        config.api_url = "not a valid url".to_string();

        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));
    }

    #[test]
    fn test_login_url_carries_encoded_callback() {
        let mut config = Config::default();
        config.identity_url = "https://id.example.com".to_string();
        config.callback_port = 8080;

        let url = config.login_url(&config.callback_url()).unwrap();
        assert_eq!(url.path(), "/login");
        assert_eq!(
            url.as_str(),
            "https://id.example.com/login?returnUrl=http%3A%2F%2Flocalhost%3A8080%2Fcallback"
        );
    }
}
