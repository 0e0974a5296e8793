//! Configuration loading and management.
//!
//! This module is organized into submodules:
//! - `types`: Core configuration types (Config, ServerConfig, IdentityConfig, etc.)
//! - `defaults`: Serde default value functions
//! - `validation`: Startup checks that collect every problem at once

mod defaults;
mod types;
mod validation;

pub use types::{
    BotConfig, Config, ConfigError, ConnectionConfig, FloodConfig, IdentityConfig, LogConfig,
    SaslConfig, ServerConfig,
};
pub use validation::{ValidationError, validate};
