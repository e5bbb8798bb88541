//! Query catalog configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{QueryCatalog, QueryTemplate, Target, default_templates};

use super::validation::ConfigError;

/// Query templates declared in config files.
///
/// An empty list means "use the built-in catalog".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueriesConfig {
    #[serde(default)]
    pub queries: Vec<QueryTemplate>,
}

impl QueriesConfig {
    /// Merge another QueriesConfig into this one, keeping declaration order.
    #[must_use]
    pub fn merge(mut self, other: QueriesConfig) -> Self {
        self.queries.extend(other.queries);
        self
    }

    /// Templates in effect: the declared ones, or the built-in catalog.
    pub fn templates(&self) -> Vec<QueryTemplate> {
        if self.queries.is_empty() {
            default_templates()
        } else {
            self.queries.clone()
        }
    }

    /// Render the effective templates into a catalog.
    pub fn catalog(&self, target: &Target) -> QueryCatalog {
        QueryCatalog::from_templates(&self.templates(), target)
    }

    /// Validate all query declarations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_ids = HashSet::new();

        for query in &self.queries {
            if query.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "query id cannot be empty".to_string(),
                ));
            }
            if !seen_ids.insert(&query.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate query id: '{}'",
                    query.id
                )));
            }
            if query.expr.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "query '{}': expr cannot be empty",
                    query.id
                )));
            }
        }

        Ok(())
    }

    /// Load query declarations from all YAML files in a directory.
    ///
    /// Files are read in file-name order so the resulting catalog order is
    /// stable across runs.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "query_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "query_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!("Loading query config from: {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_config_merge() {
        let a = QueriesConfig {
            queries: vec![QueryTemplate::new("a", "up", ["job"])],
        };
        let b = QueriesConfig {
            queries: vec![QueryTemplate::new("b", "up", ["instance"])],
        };

        let merged = a.merge(b);
        let ids: Vec<_> = merged.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_empty_config_uses_builtin_catalog() {
        let config = QueriesConfig::default();
        assert_eq!(config.templates(), default_templates());
        assert_eq!(config.catalog(&Target::default()).len(), 3);
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let config = QueriesConfig {
            queries: vec![
                QueryTemplate::new("dup", "up", ["job"]),
                QueryTemplate::new("dup", "down", ["job"]),
            ],
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_empty_id_and_expr() {
        let config = QueriesConfig {
            queries: vec![QueryTemplate::new(" ", "up", ["job"])],
        };
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("cannot be empty")
        );

        let config = QueriesConfig {
            queries: vec![QueryTemplate::new("q", "", ["job"])],
        };
        assert!(config.validate().unwrap_err().to_string().contains("expr"));
    }

    #[test]
    fn test_query_template_serde_defaults() {
        let yaml = r#"
queries:
  - id: restarts
    expr: 'sum by (pod) (kube_pod_container_status_restarts_total{namespace="{namespace}"})'
    watch_labels: [pod]
  - id: up
    expr: up
"#;

        let config: QueriesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[0].watch_labels, ["pod".to_string()]);
        assert!(config.queries[1].watch_labels.is_empty());

        let catalog = config.catalog(&Target::new("shop", ""));
        assert!(
            catalog
                .get("restarts")
                .unwrap()
                .expression()
                .contains(r#"namespace="shop""#)
        );
    }

    #[test]
    fn test_load_from_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "queries:\n  - id: second\n    expr: up\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "queries:\n  - id: first\n    expr: up\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = QueriesConfig::load_from_dir(dir.path().to_str().unwrap()).unwrap();
        let ids: Vec<_> = config.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn test_load_from_missing_dir() {
        let result = QueriesConfig::load_from_dir("/nonexistent/loadwatch/queries");
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }
}
