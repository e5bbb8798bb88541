//! Matrix flattening.
//!
//! Turns a range-query [`Matrix`] into [`Record`]s of the form
//! `[watched label values..., timestamp, value]`, one per sample.

use std::fmt;

use crate::backend::{Matrix, format_value};

/// One flattened output row.
///
/// Always holds `watched_labels.len() + 2` fields: the label values in watch
/// order, then the timestamp, then the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(Vec<String>);

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label values, without the trailing timestamp and value.
    pub fn labels(&self) -> &[String] {
        &self.0[..self.0.len().saturating_sub(2)]
    }

    /// Rendered timestamp field.
    pub fn timestamp(&self) -> Option<&str> {
        self.0.len().checked_sub(2).map(|i| self.0[i].as_str())
    }

    /// Rendered value field.
    pub fn value(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}

/// Advisory, non-fatal observation attached to a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Warning passed through from the backend (partial data, clock skew...).
    BackendWarning(String),
    /// A series lacked one of the watched labels; an empty value was used.
    MissingLabel { query_id: String, label: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendWarning(msg) => write!(f, "backend warning: {}", msg),
            Self::MissingLabel { query_id, label } => {
                write!(f, "label '{}' does not exist for {}", label, query_id)
            }
        }
    }
}

/// Output of [`flatten`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flattened {
    pub records: Vec<Record>,
    pub notices: Vec<Notice>,
}

/// Flatten `matrix` into records for the given watched labels.
///
/// Series order and sample order are preserved. A watched label absent from
/// a series yields an empty field and one [`Notice::MissingLabel`] for that
/// series; it never fails.
pub fn flatten(matrix: &Matrix, watched_labels: &[String], query_id: &str) -> Flattened {
    let mut out = Flattened::default();

    for series in matrix {
        let mut label_values = Vec::with_capacity(watched_labels.len());
        for label in watched_labels {
            match series.labels.get(label) {
                Some(value) => label_values.push(value.clone()),
                None => {
                    tracing::warn!(query = %query_id, label = %label, "Watched label does not exist");
                    out.notices.push(Notice::MissingLabel {
                        query_id: query_id.to_string(),
                        label: label.clone(),
                    });
                    label_values.push(String::new());
                }
            }
        }

        for sample in &series.samples {
            let mut fields = Vec::with_capacity(label_values.len() + 2);
            fields.extend(label_values.iter().cloned());
            fields.push(sample.timestamp.to_string());
            fields.push(format_value(sample.value));
            out.records.push(Record(fields));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Series, Timestamp, parse_value};

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_matrix() -> Matrix {
        vec![
            Series::default()
                .with_label("container_namespace", "shop")
                .with_label("pod_name", "cart-1")
                .with_label("job", "kepler")
                .with_sample(Timestamp::from_millis(1_714_564_800_000), 0.25)
                .with_sample(Timestamp::from_millis(1_714_564_815_000), 0.5),
            Series::default()
                .with_label("container_namespace", "shop")
                .with_label("pod_name", "api-0")
                .with_sample(Timestamp::from_millis(1_714_564_800_123), 3.0),
        ]
    }

    #[test]
    fn test_flatten_orders_series_then_samples() {
        let out = flatten(
            &sample_matrix(),
            &labels(&["container_namespace", "pod_name"]),
            "kepler_dram",
        );

        assert!(out.notices.is_empty());
        let rows: Vec<_> = out.records.iter().map(|r| r.fields().join(",")).collect();
        assert_eq!(
            rows,
            [
                "shop,cart-1,1714564800,0.25",
                "shop,cart-1,1714564815,0.5",
                "shop,api-0,1714564800.123,3",
            ]
        );
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let matrix = sample_matrix();
        let watched = labels(&["pod_name"]);
        assert_eq!(flatten(&matrix, &watched, "q"), flatten(&matrix, &watched, "q"));
    }

    #[test]
    fn test_flatten_missing_label_keeps_field() {
        let matrix = vec![
            Series::default()
                .with_label("namespace", "shop")
                .with_sample(Timestamp::from_millis(1_000), 2.0),
        ];

        let out = flatten(&matrix, &labels(&["pod"]), "q1");

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].fields(), ["", "1", "2"]);
        assert_eq!(
            out.notices,
            [Notice::MissingLabel {
                query_id: "q1".into(),
                label: "pod".into(),
            }]
        );
        assert_eq!(out.notices[0].to_string(), "label 'pod' does not exist for q1");
    }

    #[test]
    fn test_flatten_field_count() {
        let watched = labels(&["a", "b", "c"]);
        let out = flatten(&sample_matrix(), &watched, "q");
        assert_eq!(out.records.len(), 3);
        assert!(out.records.iter().all(|r| r.len() == watched.len() + 2));
        // Two series, three missing labels each.
        assert_eq!(out.notices.len(), 6);
    }

    #[test]
    fn test_flatten_no_watched_labels() {
        let out = flatten(&sample_matrix(), &[], "q");
        assert_eq!(out.records[0].fields(), ["1714564800", "0.25"]);
        assert!(out.records[0].labels().is_empty());
    }

    #[test]
    fn test_flatten_series_without_samples() {
        let matrix = vec![Series::default().with_label("pod", "a")];
        let out = flatten(&matrix, &labels(&["pod"]), "q");
        assert!(out.records.is_empty());
        assert!(out.notices.is_empty());
    }

    #[test]
    fn test_flatten_round_trip() {
        let samples = [
            (1_714_564_800_001_i64, 0.1 + 0.2),
            (1_714_564_815_999, -1e-9),
            (1_714_564_830_000, 12_345_678.901_234),
        ];
        let mut series = Series::default().with_label("pod", "web-7");
        for (ts, v) in samples {
            series = series.with_sample(Timestamp::from_millis(ts), v);
        }

        let out = flatten(&vec![series], &labels(&["pod"]), "q");

        for (record, (ts, v)) in out.records.iter().zip(samples) {
            assert_eq!(record.labels(), ["web-7"]);
            let parsed_ts: Timestamp = record.timestamp().unwrap().parse().unwrap();
            assert_eq!(parsed_ts.as_millis(), ts);
            assert_eq!(parse_value(record.value().unwrap()).unwrap(), v);
        }
    }
}
