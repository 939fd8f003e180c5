//! Core configuration, logging and error types for the insights client.

mod config;
mod error;
mod logging;

pub use config::{
    default_config_path, Config, RealtimeSettings, DEFAULT_FEATURED_LIMIT, DEFAULT_LOG_LEVEL,
    DEFAULT_PAGE_SIZE, PLACEHOLDER_ANON_KEY, PLACEHOLDER_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
