//! Per-query tick results.

use std::sync::Arc;

use crate::backend::BackendError;
use crate::catalog::Query;
use crate::extract::{Notice, Record};
use crate::timerange::TimeRange;

/// Result of one catalog query in one tick.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: Arc<Query>,
    /// 1-based tick number.
    pub tick: u64,
    pub time_range: TimeRange,
    pub outcome: Outcome,
}

/// Exactly one of records or an error.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success {
        records: Vec<Record>,
        notices: Vec<Notice>,
    },
    Failure {
        error: BackendError,
    },
}

impl QueryResult {
    pub fn query_id(&self) -> &str {
        self.query.id()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Records of a successful query; empty for failures.
    pub fn records(&self) -> &[Record] {
        match &self.outcome {
            Outcome::Success { records, .. } => records,
            Outcome::Failure { .. } => &[],
        }
    }

    /// Advisory notices of a successful query; empty for failures.
    pub fn notices(&self) -> &[Notice] {
        match &self.outcome {
            Outcome::Success { notices, .. } => notices,
            Outcome::Failure { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&BackendError> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(error),
        }
    }
}
