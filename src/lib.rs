//! loadwatch - periodic range-query sampler
//!
//! Samples a small catalog of PromQL queries on a fixed cadence for a bounded
//! number of ticks and emits the flattened results as text blocks, e.g. to
//! capture resource usage alongside a load test.
//!
//! # Architecture
//!
//! - **Catalog**: named query templates rendered once per run
//! - **Backend**: [`Backend`] trait with the HTTP [`PrometheusClient`]
//! - **Extraction**: [`flatten`] turns a matrix into label/timestamp/value records
//! - **Scheduler**: [`Scheduler`] fans out one task per query per tick and joins them
//! - **Sink**: [`ResultSink`] writes each query's result block atomically
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use loadwatch::{AppConfig, PrometheusClient, Scheduler, TextSink};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let backend = PrometheusClient::new(&config.backend)?;
//! let scheduler = Scheduler::new(
//!     Arc::new(backend),
//!     config.catalog(),
//!     Arc::new(TextSink::stdout()),
//!     config.scheduler_config(),
//! );
//! let summary = scheduler.run(CancellationToken::new()).await;
//! println!("{} results", summary.results);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod extract;
pub mod outcome;
pub mod scheduler;
pub mod sink;
pub mod timerange;

pub use backend::{
    Backend, BackendConfig, BackendError, Matrix, PrometheusClient, RangeResponse, Sample, Series,
    Timestamp,
};
pub use catalog::{Query, QueryCatalog, QueryTemplate, Target};
pub use config::{AppConfig, ConfigError};
pub use extract::{Flattened, Notice, Record, flatten};
pub use outcome::{Outcome, QueryResult};
pub use scheduler::{RunSummary, Scheduler, SchedulerConfig, SchedulerState};
pub use sink::{MemorySink, ResultSink, SinkError, TextSink};
pub use timerange::TimeRange;
