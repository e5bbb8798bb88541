//! Configuration module for loadwatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Backend settings (URL, timeout, headers)
//! - Sampling cadence (ticks, interval, window, step)
//! - Run annotations (test type, project, namespace, node)
//! - Query catalog overrides and the query include directory

mod app;
mod queries;
mod validation;

pub use app::{Annotations, AppConfig, SamplingConfig};
pub use queries::QueriesConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_INTERVAL, DEFAULT_TEST_TYPE, DEFAULT_TICKS};
