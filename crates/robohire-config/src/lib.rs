//! Configuration, filesystem layout and logging setup for the RoboHire client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RouteEntry, DEFAULT_API_URL, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT_SECS,
    DEFAULT_IDENTITY_URL, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
