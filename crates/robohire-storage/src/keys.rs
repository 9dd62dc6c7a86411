//! Storage key constants.

/// Keys of the durable session namespace.
pub struct StorageKeys;

impl StorageKeys {
    /// Raw bearer token.
    pub const TOKEN: &'static str = "token";

    /// JSON-serialized user claims.
    pub const USER: &'static str = "user";

    /// Both session keys; they are always written and removed together.
    pub const SESSION: [&'static str; 2] = [Self::TOKEN, Self::USER];
}
