//! Backend Layer
//!
//! The scheduler talks to the metrics backend only through the [`Backend`]
//! trait. [`PrometheusClient`] is the production implementation; tests plug
//! in doubles returning canned matrices or errors.
//!
//! # Components
//!
//! - [`Backend`] / [`BackendError`]: range-query capability and its failures
//! - [`PrometheusClient`] / [`BackendConfig`]: HTTP `query_range` client
//! - [`Matrix`], [`Series`], [`Sample`], [`Timestamp`]: result model

mod model;
pub mod prometheus;
mod traits;

pub use model::{
    InvalidTimestamp, Matrix, RangeResponse, ResultType, Sample, Series, Timestamp, format_value,
    parse_value,
};
pub use prometheus::{BackendConfig, PrometheusClient};
pub use traits::{Backend, BackendError, DEFAULT_STEP};
