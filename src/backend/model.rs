//! Range-query result model.
//!
//! - [`Matrix`]: ordered list of [`Series`]
//! - [`Series`]: label set plus ascending [`Sample`]s
//! - [`Timestamp`]: millisecond-resolution instant with a lossless text form

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Milliseconds per second, the backend's sample resolution.
const MILLIS_PER_SECOND: i64 = 1_000;

/// Number of fractional digits kept when parsing textual timestamps.
const FRACTION_DIGITS: usize = 3;

/// Result type reported by a query endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResultType {
    /// Range vector, the only shape the sampler accepts.
    Matrix,
    /// Instant vector.
    Vector,
    Scalar,
    String,
}

/// Failed to parse a textual timestamp.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timestamp: '{0}'")]
pub struct InvalidTimestamp(pub String);

/// Sample timestamp in milliseconds since the Unix epoch.
///
/// Renders as decimal seconds with at most three fractional digits and no
/// trailing zeros (`1435781430.781`, `1435781430.5`, `1435781430`). Parsing
/// accepts the same form and truncates digits past the millisecond, so
/// `to_string` followed by `parse` is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Convert a JSON number of seconds without going through float arithmetic.
    pub fn from_json_number(number: &serde_json::Number) -> Result<Self, InvalidTimestamp> {
        number.to_string().parse().or_else(|err| {
            number
                .as_f64()
                .filter(|secs| secs.is_finite())
                .map(|secs| Self((secs * MILLIS_PER_SECOND as f64).round() as i64))
                .ok_or(err)
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let secs = abs / MILLIS_PER_SECOND as u64;
        let millis = abs % MILLIS_PER_SECOND as u64;

        if millis == 0 {
            return write!(f, "{sign}{secs}");
        }

        let fraction = format!("{millis:03}");
        write!(f, "{sign}{secs}.{}", fraction.trim_end_matches('0'))
    }
}

impl FromStr for Timestamp {
    type Err = InvalidTimestamp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimestamp(s.to_string());

        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let secs: i64 = whole.parse().map_err(|_| invalid())?;
        let mut digits: String = fraction.chars().take(FRACTION_DIGITS).collect();
        while digits.len() < FRACTION_DIGITS {
            digits.push('0');
        }
        let millis: i64 = digits.parse().map_err(|_| invalid())?;

        let total = secs
            .checked_mul(MILLIS_PER_SECOND)
            .and_then(|ms| ms.checked_add(millis))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -total } else { total }))
    }
}

/// Render a sample value as the shortest decimal that round-trips exactly.
///
/// Non-finite values use the Prometheus spelling: `NaN`, `+Inf`, `-Inf`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let spelled = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        spelled.to_string()
    } else {
        value.to_string()
    }
}

/// Parse a sample value in any form the backend or [`format_value`] produces.
pub fn parse_value(s: &str) -> Result<f64, std::num::ParseFloatError> {
    s.trim().parse()
}

/// One observation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One labeled series of a range result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    /// Ascending by timestamp, as delivered by the backend.
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(labels: BTreeMap<String, String>, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Append a sample.
    pub fn with_sample(mut self, timestamp: Timestamp, value: f64) -> Self {
        self.samples.push(Sample::new(timestamp, value));
        self
    }
}

/// Range-query result: series in backend order.
pub type Matrix = Vec<Series>;

/// Successful range query, with advisory warnings kept apart from the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeResponse {
    pub matrix: Matrix,
    pub warnings: Vec<String>,
}

impl RangeResponse {
    pub fn new(matrix: Matrix) -> Self {
        Self {
            matrix,
            warnings: Vec::new(),
        }
    }

    /// Attach backend warnings.
    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.warnings = warnings.into_iter().map(Into::into).collect();
        self
    }
}
