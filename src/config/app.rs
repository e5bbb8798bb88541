//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendConfig, DEFAULT_STEP};
use crate::catalog::{QueryCatalog, QueryTemplate, Target};
use crate::scheduler::SchedulerConfig;
use crate::timerange::DEFAULT_WINDOW;

use super::queries::QueriesConfig;
use super::validation::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default number of ticks.
pub const DEFAULT_TICKS: u64 = 15;

/// Default pause between ticks (1 minute).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default test type annotation.
pub const DEFAULT_TEST_TYPE: &str = "idle";

fn default_test_type() -> String {
    DEFAULT_TEST_TYPE.to_string()
}

// =============================================================================
// Sampling Configuration
// =============================================================================

/// Tick cadence and query window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Total number of ticks (default: 15).
    pub ticks: u64,

    /// Pause after each tick before the next one starts (default: 1m).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Width of the queried window (default: 1m).
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Range-query resolution (default: 15s).
    #[serde(with = "humantime_serde")]
    pub step: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_TICKS,
            interval: DEFAULT_INTERVAL,
            window: DEFAULT_WINDOW,
            step: DEFAULT_STEP,
        }
    }
}

// =============================================================================
// Annotations
// =============================================================================

/// Run annotations printed ahead of the results.
///
/// `namespace` and `node` also parameterize the query templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    /// Free-text label for the kind of test (default: "idle").
    #[serde(default = "default_test_type")]
    pub test_type: String,

    /// Project name.
    pub project: String,

    /// Namespace where the observed project runs.
    pub namespace: String,

    /// Node where the observed project runs.
    pub node: String,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            test_type: DEFAULT_TEST_TYPE.to_string(),
            project: String::new(),
            namespace: String::new(),
            node: String::new(),
        }
    }
}

impl Annotations {
    /// Template substitution values.
    pub fn target(&self) -> Target {
        Target::new(self.namespace.clone(), self.node.clone())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tick cadence settings.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Run annotations.
    #[serde(default)]
    pub annotations: Annotations,

    /// Query templates; empty means the built-in catalog.
    #[serde(default)]
    pub queries: Vec<QueryTemplate>,

    /// Directory with additional query files to append.
    #[serde(default)]
    pub query_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file, including `query_path`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        if let Some(ref query_dir) = config.query_path {
            let additional = QueriesConfig::load_from_dir(query_dir)?;
            config.queries = config.queries_config().merge(additional).queries;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend url cannot be empty".to_string(),
            ));
        }

        if self.backend.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "backend timeout must be positive".to_string(),
            ));
        }

        // A zero window would produce start == end.
        if self.sampling.window.is_zero() {
            return Err(ConfigError::ValidationError(
                "sampling window must be positive".to_string(),
            ));
        }

        if self.sampling.step.is_zero() {
            return Err(ConfigError::ValidationError(
                "sampling step must be positive".to_string(),
            ));
        }

        self.queries_config().validate()?;

        Ok(())
    }

    fn queries_config(&self) -> QueriesConfig {
        QueriesConfig {
            queries: self.queries.clone(),
        }
    }

    /// Render the query catalog for this run.
    pub fn catalog(&self) -> QueryCatalog {
        self.queries_config().catalog(&self.annotations.target())
    }

    /// Scheduler settings for this run.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            ticks: self.sampling.ticks,
            interval: self.sampling.interval,
            window: self.sampling.window,
            step: self.sampling.step,
            query_timeout: self.backend.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::prometheus::{DEFAULT_TIMEOUT, DEFAULT_URL};

    #[test]
    fn test_sampling_config_default() {
        let config = SamplingConfig::default();
        assert_eq!(config.ticks, 15);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.step, Duration::from_secs(15));
    }

    #[test]
    fn test_annotations_default() {
        let annotations = Annotations::default();
        assert_eq!(annotations.test_type, "idle");
        assert!(annotations.project.is_empty());
        assert_eq!(annotations.target(), Target::default());
    }

    #[test]
    fn test_app_config_default_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.url, DEFAULT_URL);
        assert_eq!(config.catalog().len(), 3);

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.ticks, DEFAULT_TICKS);
        assert_eq!(scheduler.query_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_config_validation_zero_window() {
        let mut config = AppConfig::default();
        config.sampling.window = Duration::ZERO;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("window"));
    }

    #[test]
    fn test_config_validation_zero_step_and_timeout() {
        let mut config = AppConfig::default();
        config.sampling.step = Duration::ZERO;
        assert!(config.validate().unwrap_err().to_string().contains("step"));

        let mut config = AppConfig::default();
        config.backend.timeout = Duration::ZERO;
        assert!(config.validate().unwrap_err().to_string().contains("timeout"));
    }

    #[test]
    fn test_config_validation_empty_url() {
        let mut config = AppConfig::default();
        config.backend.url = "  ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("url"));
    }

    #[test]
    fn test_config_zero_ticks_and_interval_allowed() {
        let mut config = AppConfig::default();
        config.sampling.ticks = 0;
        config.sampling.interval = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadwatch.yaml");
        std::fs::write(
            &path,
            r#"
backend:
  url: http://prometheus.monitoring:9090
  timeout: 10s
  headers:
    Authorization: "Bearer ${PROM_TOKEN:-none}"
sampling:
  ticks: 30
  interval: 30s
annotations:
  test_type: stress-test
  project: shop
  namespace: shop-prod
queries:
  - id: dram
    expr: 'kepler_container_dram_joules_total{container_namespace="{namespace}"}'
    watch_labels: [pod_name]
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.backend.url, "http://prometheus.monitoring:9090");
        assert_eq!(config.backend.timeout, Duration::from_secs(10));
        assert_eq!(config.sampling.ticks, 30);
        assert_eq!(config.sampling.interval, Duration::from_secs(30));
        // Unset fields keep their defaults.
        assert_eq!(config.sampling.window, DEFAULT_WINDOW);
        assert_eq!(config.sampling.step, DEFAULT_STEP);
        assert_eq!(config.annotations.test_type, "stress-test");
        assert!(config.annotations.node.is_empty());

        let catalog = config.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("dram").unwrap().expression(),
            r#"kepler_container_dram_joules_total{container_namespace="shop-prod"}"#
        );
    }

    #[test]
    fn test_load_with_query_path() {
        let dir = tempfile::tempdir().unwrap();
        let query_dir = dir.path().join("queries.d");
        std::fs::create_dir(&query_dir).unwrap();
        std::fs::write(
            query_dir.join("extra.yaml"),
            "queries:\n  - id: up\n    expr: up\n    watch_labels: [job]\n",
        )
        .unwrap();

        let path = dir.path().join("loadwatch.yaml");
        std::fs::write(
            &path,
            format!(
                "queries:\n  - id: base\n    expr: up\nquery_path: {}\n",
                query_dir.display()
            ),
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        let ids: Vec<_> = config.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["base", "up"]);
    }

    #[test]
    fn test_load_rejects_duplicate_query_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadwatch.yaml");
        std::fs::write(
            &path,
            "queries:\n  - id: q\n    expr: up\n  - id: q\n    expr: up\n",
        )
        .unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/loadwatch.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
