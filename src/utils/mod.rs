//! Utility modules shared by the module state layer

pub mod env;
pub mod logging;
pub mod time;
pub mod validation;

// Re-export commonly used items
pub use env::{env_int, env_opt};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use time::current_timestamp;
pub use validation::{ensure_fmt, ensure_not_empty};
