//! Concurrent boolean queries with fail-closed aggregation.
//!
//! A [`QueryBatch`] runs a set of independent asynchronous yes/no questions
//! (is this device preferred? is that feature supported?) concurrently, each
//! under its own timeout. Callers read answers with [`QueryBatch::get`],
//! which never fails: a query that errors, panics, times out, or is
//! cancelled answers `false`. The precise cause stays available through
//! [`QueryBatch::outcome`].
//!
//! ```
//! use std::time::Duration;
//! use bluesync_core::query::QueryBatch;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut builder = QueryBatch::builder().timeout(Duration::from_secs(1));
//! let yes = builder.push("yes", async { Ok::<_, std::io::Error>(true) });
//! let no = builder.push("no", async { Err::<bool, _>(std::io::Error::other("boom")) });
//! let mut batch = builder.spawn();
//!
//! assert!(batch.get(yes).await);
//! assert!(!batch.get(no).await);
//! assert!(!batch.and_all().await);
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::DispatchMetrics;

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies a query within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(usize);

impl QueryId {
    /// Position of the query in the batch.
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a query ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The query produced an answer.
    Success(bool),
    /// The query returned an error or panicked.
    Failure(String),
    /// The query did not finish within its timeout.
    Timeout,
    /// The batch was closed before the query finished, or the id is unknown.
    Cancelled,
}

impl QueryOutcome {
    /// Collapse to the fail-closed boolean.
    pub fn as_bool(&self) -> bool {
        matches!(self, Self::Success(true))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => write!(f, "{}", value),
            Self::Failure(cause) => write!(f, "failed: {}", cause),
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

struct PendingQuery {
    name: String,
    timeout: Duration,
    future: BoxFuture<'static, std::result::Result<bool, String>>,
}

/// Builder for [`QueryBatch`].
#[must_use]
pub struct QueryBatchBuilder {
    timeout: Duration,
    queries: Vec<PendingQuery>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Default for QueryBatchBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            queries: Vec::new(),
            metrics: None,
        }
    }
}

impl QueryBatchBuilder {
    /// Timeout for queries added after this call without their own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record per-query latency and timeouts.
    pub fn metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add a query. Its id is its position: the first query is index 0.
    pub fn query<F, E>(mut self, name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = std::result::Result<bool, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        self.push(name, future);
        self
    }

    /// Add a query and return its id.
    pub fn push<F, E>(&mut self, name: impl Into<String>, future: F) -> QueryId
    where
        F: Future<Output = std::result::Result<bool, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let timeout = self.timeout;
        self.push_with_timeout(name, timeout, future)
    }

    /// Add a query with its own timeout and return its id.
    pub fn push_with_timeout<F, E>(
        &mut self,
        name: impl Into<String>,
        timeout: Duration,
        future: F,
    ) -> QueryId
    where
        F: Future<Output = std::result::Result<bool, E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let id = QueryId(self.queries.len());
        self.queries.push(PendingQuery {
            name: name.into(),
            timeout,
            future: future.map(|r| r.map_err(|e| e.to_string())).boxed(),
        });
        id
    }

    /// Number of queries added so far.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Start the batch.
    ///
    /// With more than one query each gets its own Tokio task. A single query
    /// runs inline on the first call that needs its answer. Must be called
    /// from within a Tokio runtime.
    pub fn spawn(self) -> QueryBatch {
        let cancel = CancellationToken::new();
        let names: Vec<String> = self.queries.iter().map(|q| q.name.clone()).collect();
        let inline = self.queries.len() == 1;

        let slots = self
            .queries
            .into_iter()
            .map(|query| {
                if inline {
                    Slot::Inline(Box::new(query))
                } else {
                    Slot::Running(tokio::spawn(run_query(
                        query,
                        cancel.child_token(),
                        self.metrics.clone(),
                    )))
                }
            })
            .collect();

        QueryBatch {
            names,
            slots,
            cancel,
            metrics: self.metrics,
            closed: false,
        }
    }
}

enum Slot {
    Inline(Box<PendingQuery>),
    Running(JoinHandle<QueryOutcome>),
    Done(QueryOutcome),
}

async fn run_query(
    query: PendingQuery,
    cancel: CancellationToken,
    metrics: Option<Arc<DispatchMetrics>>,
) -> QueryOutcome {
    let PendingQuery {
        name,
        timeout,
        future,
    } = query;
    let started = Instant::now();

    let outcome = tokio::select! {
        _ = cancel.cancelled() => QueryOutcome::Cancelled,
        result = tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()) => {
            match result {
                Err(_) => QueryOutcome::Timeout,
                Ok(Err(_)) => QueryOutcome::Failure("query panicked".to_string()),
                Ok(Ok(Err(cause))) => QueryOutcome::Failure(cause),
                Ok(Ok(Ok(value))) => QueryOutcome::Success(value),
            }
        }
    };

    debug!("Query '{}' finished: {}", name, outcome);
    if let Some(metrics) = metrics {
        if outcome == QueryOutcome::Timeout {
            metrics.record_query_timeout();
        }
        metrics
            .queries
            .record(started.elapsed(), outcome.is_success());
    }
    outcome
}

/// A running set of queries.
///
/// Closing the batch (explicitly or by dropping it) cancels outstanding
/// queries and aborts their tasks.
pub struct QueryBatch {
    names: Vec<String>,
    slots: Vec<Slot>,
    cancel: CancellationToken,
    metrics: Option<Arc<DispatchMetrics>>,
    closed: bool,
}

impl fmt::Debug for QueryBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBatch")
            .field("queries", &self.names)
            .field("closed", &self.closed)
            .finish()
    }
}

impl QueryBatch {
    pub fn builder() -> QueryBatchBuilder {
        QueryBatchBuilder::default()
    }

    /// Ids of every query, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = QueryId> + '_ {
        (0..self.slots.len()).map(QueryId)
    }

    /// Name the query was registered under.
    pub fn name(&self, id: QueryId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Answer of one query. Anything but `Success(true)` is `false`.
    pub async fn get(&mut self, id: QueryId) -> bool {
        self.outcome(id).await.as_bool()
    }

    /// Full outcome of one query, waiting for it if needed.
    ///
    /// Unknown ids and queries of a closed batch report `Cancelled`.
    pub async fn outcome(&mut self, id: QueryId) -> QueryOutcome {
        if self.closed {
            return QueryOutcome::Cancelled;
        }
        let Some(slot) = self.slots.get_mut(id.0) else {
            return QueryOutcome::Cancelled;
        };

        let outcome = match std::mem::replace(slot, Slot::Done(QueryOutcome::Cancelled)) {
            Slot::Done(outcome) => outcome,
            Slot::Inline(query) => {
                run_query(*query, self.cancel.child_token(), self.metrics.clone()).await
            }
            Slot::Running(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => QueryOutcome::Cancelled,
                Err(e) => QueryOutcome::Failure(e.to_string()),
            },
        };
        *slot = Slot::Done(outcome.clone());
        outcome
    }

    /// Wait for every query; `true` only if every one answered `true`.
    ///
    /// Nothing is cancelled early when one query answers `false`. An empty
    /// batch is vacuously `true`.
    pub async fn and_all(&mut self) -> bool {
        let mut all = true;
        for index in 0..self.slots.len() {
            all &= self.get(QueryId(index)).await;
        }
        all
    }

    /// Every outcome, in insertion order.
    pub async fn outcomes(&mut self) -> Vec<(String, QueryOutcome)> {
        let mut outcomes = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            let outcome = self.outcome(QueryId(index)).await;
            outcomes.push((self.names[index].clone(), outcome));
        }
        outcomes
    }

    /// Cancel outstanding queries and release their tasks.
    ///
    /// Running queries are interrupted at their next await point. Safe to
    /// call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        for slot in &self.slots {
            if let Slot::Running(handle) = slot {
                handle.abort();
            }
        }
    }
}

impl Drop for QueryBatch {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run `queries` concurrently and report whether all answered `true`.
pub async fn and_all<I, F, E>(timeout: Duration, queries: I) -> bool
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = std::result::Result<bool, E>> + Send + 'static,
    E: fmt::Display + 'static,
{
    let mut builder = QueryBatch::builder().timeout(timeout);
    for (name, future) in queries {
        builder.push(name, future);
    }
    builder.spawn().and_all().await
}
