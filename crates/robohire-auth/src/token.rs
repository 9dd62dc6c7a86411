//! Compact token decoding.
//!
//! Tokens are `header.payload.signature` strings issued by the identity
//! provider. Only the payload is read; the signature is never checked here,
//! so decoded claims are only as trustworthy as the channel that delivered
//! the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const ROLE_CLAIM_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Default `account_status` when the token carries none.
pub const DEFAULT_ACCOUNT_STATUS: &str = "Active";

/// Token decoding failure.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("expected 3 dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a JSON object: {0}")]
    Payload(String),

    #[error("payload has no subject")]
    MissingSubject,
}

/// Claims carried by a decoded token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    subject: String,
    claims: Map<String, Value>,
}

impl TokenClaims {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Raw value of any claim, including `sub`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// First non-empty string among `names`.
    fn string(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| match self.claims.get(*name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
    }

    fn flag(&self, names: &[&str]) -> Option<bool> {
        names.iter().find_map(|name| match self.claims.get(*name) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        })
    }

    fn role(&self) -> Option<String> {
        ["role", ROLE_CLAIM_URI]
            .iter()
            .find_map(|name| match self.claims.get(*name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                Some(Value::Array(values)) => values
                    .iter()
                    .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()))
                    .map(str::to_string),
                _ => None,
            })
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = match self.claims.get("exp")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
            _ => return None,
        };
        DateTime::from_timestamp(secs, 0)
    }
}

/// Decode the payload segment of a compact token.
pub fn decode(token: &str) -> Result<TokenClaims, DecodeError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Malformed(segments.len()));
    }

    let bytes = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let payload: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Payload(e.to_string()))?;

    let claims = match payload {
        Value::Object(claims) => claims,
        other => return Err(DecodeError::Payload(format!("found {}", json_kind(&other)))),
    };

    let subject = match claims.get("sub") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(DecodeError::MissingSubject),
    };

    Ok(TokenClaims { subject, claims })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The signed-in user as the session keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default = "default_account_status")]
    pub account_status: String,
    #[serde(default = "default_email_confirmed")]
    pub email_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_account_status() -> String {
    DEFAULT_ACCOUNT_STATUS.to_string()
}

fn default_email_confirmed() -> bool {
    true
}

impl UserClaims {
    /// Claims with only a subject; everything else defaulted.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            name: None,
            account_id: None,
            account_status: default_account_status(),
            email_confirmed: true,
            role: None,
            expires_at: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl From<&TokenClaims> for UserClaims {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            subject: claims.subject().to_string(),
            email: claims.string(&["email"]),
            name: claims.string(&["name", "unique_name"]),
            account_id: claims.string(&["accountId", "account_id"]),
            account_status: claims
                .string(&["accountStatus", "account_status"])
                .unwrap_or_else(default_account_status),
            email_confirmed: claims
                .flag(&["emailConfirmed", "email_confirmed"])
                .unwrap_or(true),
            role: claims.role(),
            expires_at: claims.expires_at(),
        }
    }
}

/// Test helper: build an unsigned compact token around `payload`.
#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}
