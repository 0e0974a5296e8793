//! Default value functions for configuration.

use crate::connection::DEFAULT_WANTED_CAPS;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Identity Defaults
// =============================================================================

pub fn default_realname() -> String {
    "tether".to_string()
}

// =============================================================================
// Connection Defaults
// =============================================================================

pub fn default_keepalive_secs() -> u64 {
    240
}

pub fn default_dial_timeout_secs() -> u64 {
    60
}

pub fn default_quit_grace_secs() -> u64 {
    2
}

pub fn default_nick_probe_secs() -> u64 {
    60
}

pub fn default_sasl_timeout_secs() -> u64 {
    5
}

pub fn default_max_retries() -> u32 {
    10
}

pub fn default_wanted_caps() -> Vec<String> {
    DEFAULT_WANTED_CAPS.iter().map(|c| c.to_string()).collect()
}

// =============================================================================
// Flood / Logging Defaults
// =============================================================================

pub fn default_flood_profile() -> String {
    "restrictive".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}
