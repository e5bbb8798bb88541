//! Query catalog.
//!
//! Queries are declared as [`QueryTemplate`]s whose expressions may contain
//! `{namespace}` and `{node}` placeholders. Rendering a template against the
//! run's [`Target`] yields an immutable [`Query`]. Substituted values are
//! trusted caller input and are inserted verbatim, so an empty value simply
//! produces a permissive filter such as `container_namespace=~""`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the project namespace.
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// Placeholder replaced by the target node.
pub const NODE_PLACEHOLDER: &str = "{node}";

/// Values substituted into query templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub namespace: String,
    pub node: String,
}

impl Target {
    pub fn new(namespace: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            node: node.into(),
        }
    }
}

/// Declarative query definition, as found in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Query identifier printed with every result block.
    pub id: String,
    /// PromQL expression with optional placeholders.
    pub expr: String,
    /// Label keys surfaced as record fields, in output order.
    #[serde(default)]
    pub watch_labels: Vec<String>,
}

impl QueryTemplate {
    pub fn new(
        id: impl Into<String>,
        expr: impl Into<String>,
        watch_labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            expr: expr.into(),
            watch_labels: watch_labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Substitute the target values into the expression.
    pub fn render(&self, target: &Target) -> Query {
        let expression = self
            .expr
            .replace(NAMESPACE_PLACEHOLDER, &target.namespace)
            .replace(NODE_PLACEHOLDER, &target.node);

        Query {
            id: self.id.clone(),
            expression,
            watched_labels: self.watch_labels.clone(),
        }
    }
}

/// The built-in catalog: Kepler energy counters per pod and node CPU usage.
pub fn default_templates() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate::new(
            "kepler_dram",
            r#"sum by (pod_name, container_namespace) (irate(kepler_container_dram_joules_total{container_namespace=~"{namespace}",pod_name=~".*"}[1m]))"#,
            ["container_namespace", "pod_name"],
        ),
        QueryTemplate::new(
            "kepler_package",
            r#"sum by (pod_name, container_namespace) (irate(kepler_container_package_joules_total{container_namespace=~"{namespace}",pod_name=~".*"}[1m]))"#,
            ["container_namespace", "pod_name"],
        ),
        QueryTemplate::new(
            "cpu_utilization_node",
            r#"instance:node_cpu_utilisation:rate5m{job="node-exporter", instance="{node}", cluster=""} != 0"#,
            ["instance"],
        ),
    ]
}

/// A rendered catalog entry. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    id: String,
    expression: String,
    watched_labels: Vec<String>,
}

impl Query {
    pub fn new(
        id: impl Into<String>,
        expression: impl Into<String>,
        watched_labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            expression: expression.into(),
            watched_labels: watched_labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn watched_labels(&self) -> &[String] {
        &self.watched_labels
    }
}

/// Read-only list of queries sampled on every tick.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: Vec<Arc<Query>>,
}

impl QueryCatalog {
    pub fn new(queries: impl IntoIterator<Item = Query>) -> Self {
        Self {
            queries: queries.into_iter().map(Arc::new).collect(),
        }
    }

    /// Render every template against `target`, preserving order.
    pub fn from_templates<'a>(
        templates: impl IntoIterator<Item = &'a QueryTemplate>,
        target: &Target,
    ) -> Self {
        Self::new(templates.into_iter().map(|t| t.render(target)))
    }

    pub fn queries(&self) -> &[Arc<Query>] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Query>> {
        self.queries.iter().find(|q| q.id() == id)
    }
}
