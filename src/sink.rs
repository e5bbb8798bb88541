//! Result Sink
//!
//! Every per-query task of a tick hands its [`QueryResult`] to a shared
//! [`ResultSink`]. One `emit` call writes one whole block: blocks from
//! concurrently finishing queries may appear in any order, but never
//! interleave.
//!
//! - [`TextSink`]: renders blocks as text onto any async writer (stdout in
//!   the binary)
//! - [`MemorySink`]: keeps results in memory for embedding and tests

use std::fmt::Write as _;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::config::Annotations;
use crate::outcome::{Outcome, QueryResult};

/// Errors raised while emitting a block.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write result block: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for per-query results.
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync + 'static {
    /// Write `result` as a single, contiguous block.
    async fn emit(&self, result: &QueryResult) -> Result<(), SinkError>;
}

/// Render the run preamble.
pub fn render_preamble(annotations: &Annotations) -> String {
    format!(
        "project_name: {}\nproject_namespace: {}\nnode: {}\ntest_type: {}\n",
        annotations.project, annotations.namespace, annotations.node, annotations.test_type
    )
}

/// Render one result block.
///
/// Successful queries print a header line naming the watched labels followed
/// by `timestamp,value`, then one comma-joined line per record. Failed
/// queries print the error instead, with no header and no records.
pub fn render_block(result: &QueryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "query: {}", result.query_id());
    let _ = writeln!(out, "query_time_start: {}", result.time_range.start_unix());
    let _ = writeln!(out, "query_time_end: {}", result.time_range.end_unix());

    match &result.outcome {
        Outcome::Success { records, .. } => {
            out.push_str("results:\n");
            for label in result.query.watched_labels() {
                out.push_str(label);
                out.push(',');
            }
            out.push_str("timestamp,value\n");
            for record in records {
                out.push_str(&record.fields().join(","));
                out.push('\n');
            }
        }
        Outcome::Failure { error } => {
            let _ = writeln!(out, "error: {}", error);
        }
    }

    out
}

/// Text sink over an async writer.
///
/// Blocks are rendered before the lock is taken, so the critical section is
/// a single `write_all` plus `flush`.
pub struct TextSink<W> {
    writer: Mutex<W>,
}

impl TextSink<tokio::io::Stdout> {
    /// Sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> TextSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Write the run preamble.
    pub async fn write_preamble(&self, annotations: &Annotations) -> Result<(), SinkError> {
        self.write_block(&render_preamble(annotations)).await
    }

    async fn write_block(&self, block: &str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(block.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl TextSink<Vec<u8>> {
    /// Everything written so far.
    pub async fn contents(&self) -> String {
        String::from_utf8_lossy(&self.writer.lock().await).into_owned()
    }
}

impl<W> std::fmt::Debug for TextSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSink").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<W> ResultSink for TextSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn emit(&self, result: &QueryResult) -> Result<(), SinkError> {
        self.write_block(&render_block(result)).await
    }
}

/// In-memory sink preserving emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<QueryResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all results emitted so far.
    pub async fn results(&self) -> Vec<QueryResult> {
        self.results.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }
}

#[async_trait::async_trait]
impl ResultSink for MemorySink {
    async fn emit(&self, result: &QueryResult) -> Result<(), SinkError> {
        self.results.lock().await.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use chrono::{TimeZone, Utc};

    use crate::backend::BackendError;
    use crate::catalog::Query;
    use crate::extract::Record;
    use crate::timerange::{DEFAULT_WINDOW, TimeRange};

    fn window() -> TimeRange {
        TimeRange::generate(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            DEFAULT_WINDOW,
        )
    }

    fn success(id: &str, rows: usize) -> QueryResult {
        let records = (0..rows)
            .map(|i| {
                Record::new(vec![
                    "shop".into(),
                    format!("pod-{i}"),
                    format!("17145648{i:02}"),
                    "0.5".into(),
                ])
            })
            .collect();
        QueryResult {
            query: Arc::new(Query::new(id, "up", ["namespace", "pod"])),
            tick: 1,
            time_range: window(),
            outcome: Outcome::Success {
                records,
                notices: vec![],
            },
        }
    }

    #[test]
    fn test_render_success_block() {
        let block = render_block(&success("kepler_dram", 2));
        assert_eq!(
            block,
            "query: kepler_dram\n\
             query_time_start: 1714564740\n\
             query_time_end: 1714564800\n\
             results:\n\
             namespace,pod,timestamp,value\n\
             shop,pod-0,1714564800,0.5\n\
             shop,pod-1,1714564801,0.5\n"
        );
    }

    #[test]
    fn test_render_failure_block() {
        let result = QueryResult {
            query: Arc::new(Query::new("q1", "up", ["pod"])),
            tick: 2,
            time_range: window(),
            outcome: Outcome::Failure {
                error: BackendError::Unreachable("connection refused".into()),
            },
        };

        assert_eq!(
            render_block(&result),
            "query: q1\n\
             query_time_start: 1714564740\n\
             query_time_end: 1714564800\n\
             error: backend unreachable: connection refused\n"
        );
    }

    #[test]
    fn test_render_preamble() {
        let annotations = Annotations {
            test_type: "stress-test".into(),
            project: "shop".into(),
            namespace: "shop-prod".into(),
            node: "worker-1".into(),
        };
        assert_eq!(
            render_preamble(&annotations),
            "project_name: shop\nproject_namespace: shop-prod\nnode: worker-1\ntest_type: stress-test\n"
        );
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.emit(&success("a", 1)).await.unwrap();
        sink.emit(&success("b", 0)).await.unwrap();

        let ids: Vec<_> = sink
            .results()
            .await
            .iter()
            .map(|r| r.query_id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(sink.len().await, 2);
    }

    /// Writer that accepts one byte per poll and yields in between, so any
    /// unsynchronized concurrent writes would interleave.
    struct TrickleWriter {
        out: Arc<std::sync::Mutex<Vec<u8>>>,
        ready: bool,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if !self.ready {
                self.ready = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            self.ready = false;
            match buf.first() {
                Some(byte) => {
                    self.out.lock().unwrap().push(*byte);
                    Poll::Ready(Ok(1))
                }
                None => Poll::Ready(Ok(0)),
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_text_sink_blocks_never_interleave() {
        let out = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::new(TextSink::new(TrickleWriter {
            out: Arc::clone(&out),
            ready: false,
        }));

        let results: Vec<_> = (0..8).map(|i| success(&format!("q{i}"), 5)).collect();
        let mut handles = Vec::new();
        for result in results.clone() {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move { sink.emit(&result).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        for result in &results {
            assert!(
                text.contains(&render_block(result)),
                "block for {} is not contiguous",
                result.query_id()
            );
        }
        let total: usize = results.iter().map(|r| render_block(r).len()).sum();
        assert_eq!(text.len(), total);
    }

    #[tokio::test]
    async fn test_text_sink_contents() {
        let sink = TextSink::new(Vec::new());
        sink.write_preamble(&Annotations::default()).await.unwrap();
        sink.emit(&success("q", 1)).await.unwrap();

        let text = sink.contents().await;
        assert!(text.starts_with("project_name: \n"));
        assert!(text.ends_with("shop,pod-0,1714564800,0.5\n"));
    }
}
