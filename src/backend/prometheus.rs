//! Prometheus `query_range` client.
//!
//! Issues `GET {url}/api/v1/query_range` and decodes the standard JSON
//! envelope. Only `matrix` results are accepted.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::model::{Matrix, RangeResponse, ResultType, Sample, Series, Timestamp, parse_value};
use super::traits::{Backend, BackendError};
use crate::config::expand_env_vars;
use crate::timerange::TimeRange;

/// Default backend address.
pub const DEFAULT_URL: &str = "http://localhost:9090";

/// Default per-query timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the range-query endpoint, relative to the base URL.
const QUERY_RANGE_PATH: &str = "api/v1/query_range";

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Connection settings for the Prometheus backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL (default: `http://localhost:9090`).
    #[serde(default = "default_url")]
    pub url: String,
    /// Per-query timeout (default: 30s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Extra request headers with `${VAR}` / `${VAR:-default}` expansion.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }

    /// Set the per-query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a single request header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// HTTP range-query client.
///
/// Cheap to share: the inner `reqwest::Client` pools connections and is safe
/// to use from concurrent tasks.
pub struct PrometheusClient {
    endpoint: Url,
    timeout: Duration,
    client: Client,
}

impl PrometheusClient {
    /// Build a client for `config.url`.
    ///
    /// # Errors
    /// Returns `BackendError::ClientConstruction` if the URL is not an
    /// absolute http(s) URL, a header is invalid, or the HTTP client cannot
    /// be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let endpoint = query_range_endpoint(&config.url)?;
        let headers = build_headers(&config.headers)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                BackendError::ClientConstruction(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            endpoint,
            timeout: config.timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl std::fmt::Debug for PrometheusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for PrometheusClient {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn execute(
        &self,
        expression: &str,
        range: &TimeRange,
        step: Duration,
    ) -> Result<RangeResponse, BackendError> {
        let start = Timestamp::from_millis(range.start().timestamp_millis()).to_string();
        let end = Timestamp::from_millis(range.end().timestamp_millis()).to_string();
        let step = step.as_secs_f64().to_string();

        let request = self.client.get(self.endpoint.clone()).query(&[
            ("query", expression),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("step", step.as_str()),
        ]);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match timeout(self.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if e.is_timeout() => {
                return Err(BackendError::Unreachable(format!(
                    "request timed out after {:?}",
                    self.timeout
                )));
            }
            Ok(Err(e)) => return Err(BackendError::Unreachable(e.to_string())),
            Err(_) => {
                return Err(BackendError::Unreachable(format!(
                    "request timed out after {:?}",
                    self.timeout
                )));
            }
        };

        tracing::trace!(
            endpoint = %self.endpoint,
            status = status.as_u16(),
            bytes = body.len(),
            "Range query answered"
        );

        decode_response(status, &body)
    }
}

/// Resolve the `query_range` endpoint below `base`.
fn query_range_endpoint(base: &str) -> Result<Url, BackendError> {
    let mut url = Url::parse(base.trim()).map_err(|e| {
        BackendError::ClientConstruction(format!("invalid backend URL '{}': {}", base, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(BackendError::ClientConstruction(format!(
            "unsupported backend URL scheme '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url.join(QUERY_RANGE_PATH).map_err(|e| {
        BackendError::ClientConstruction(format!("invalid backend URL '{}': {}", base, e))
    })
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, BackendError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            BackendError::ClientConstruction(format!("invalid header name '{}': {}", key, e))
        })?;
        let value = HeaderValue::from_str(&expand_env_vars(value)).map_err(|e| {
            BackendError::ClientConstruction(format!("invalid value for header '{}': {}", key, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

// =============================================================================
// Response decoding
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(serde_json::Number, String)>,
}

/// Decode a `query_range` body into a [`RangeResponse`].
fn decode_response(status: StatusCode, body: &str) -> Result<RangeResponse, BackendError> {
    let envelope: ApiResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(BackendError::Api {
                error_type: "http".to_string(),
                message: format!("unexpected status {}", status),
            });
        }
        Err(e) => return Err(BackendError::Decode(e.to_string())),
    };

    if envelope.status != "success" {
        return Err(BackendError::Api {
            error_type: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: envelope
                .error
                .unwrap_or_else(|| format!("query failed with status {}", status)),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| BackendError::Decode("missing data section".to_string()))?;

    if data.result_type.parse::<ResultType>().ok() != Some(ResultType::Matrix) {
        return Err(BackendError::UnexpectedResultShape(data.result_type));
    }

    let raw: Vec<RawSeries> =
        serde_json::from_value(data.result).map_err(|e| BackendError::Decode(e.to_string()))?;

    let matrix = raw
        .into_iter()
        .map(decode_series)
        .collect::<Result<Matrix, _>>()?;

    Ok(RangeResponse::new(matrix).with_warnings(envelope.warnings))
}

fn decode_series(raw: RawSeries) -> Result<Series, BackendError> {
    let samples = raw
        .values
        .iter()
        .map(|(ts, value)| {
            let timestamp =
                Timestamp::from_json_number(ts).map_err(|e| BackendError::Decode(e.to_string()))?;
            let value = parse_value(value).map_err(|e| {
                BackendError::Decode(format!("invalid sample value '{}': {}", value, e))
            })?;
            Ok(Sample::new(timestamp, value))
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    Ok(Series::new(raw.metric, samples))
}
