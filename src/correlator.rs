//! Request correlation for queries that expect a reply.
//!
//! The device protocol carries no request ids. Replies are matched to
//! requests by [`QueryKind`]: the next reply of a kind resolves the oldest
//! pending request of that kind. Kinds are matched independently.
//!
//! Every pending request resolves exactly once: on its reply, on its
//! deadline, or when the session it was issued on goes away.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::poll_fn;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, warn};

use crate::types::{QueryKind, QueryResult};
use crate::{LinkError, Result};

/// Outcome delivered to whoever issued a query.
pub type QueryOutcome = Result<QueryResult>;

/// Unique among pending requests of one correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

struct PendingRequest {
    id: CorrelationId,
    issued_at: Instant,
    timeout: Duration,
    deadline: delay_queue::Key,
    reply: oneshot::Sender<QueryOutcome>,
}

/// Pending request table with per-request deadlines.
pub struct Correlator {
    default_timeout: Duration,
    next_id: u64,
    pending: HashMap<QueryKind, VecDeque<PendingRequest>>,
    deadlines: DelayQueue<(QueryKind, CorrelationId)>,
}

impl Correlator {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout, next_id: 0, pending: HashMap::new(), deadlines: DelayQueue::new() }
    }

    /// Register a pending request of `kind`.
    ///
    /// The caller sends the request frame; `reply` receives the outcome.
    pub fn register(
        &mut self,
        kind: QueryKind,
        timeout: Option<Duration>,
        reply: oneshot::Sender<QueryOutcome>,
    ) -> CorrelationId {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let id = CorrelationId(self.next_id);
        self.next_id += 1;

        let deadline = self.deadlines.insert((kind, id), timeout);
        self.pending.entry(kind).or_default().push_back(PendingRequest {
            id,
            issued_at: Instant::now(),
            timeout,
            deadline,
            reply,
        });

        debug!(%id, %kind, ?timeout, "Request pending");
        id
    }

    /// Resolve the oldest pending request of the reply's kind.
    ///
    /// Returns `None` when nothing of that kind is pending.
    pub fn resolve(&mut self, result: QueryResult) -> Option<CorrelationId> {
        let kind = result.kind();
        let request = self.pending.get_mut(&kind)?.pop_front()?;
        self.deadlines.remove(&request.deadline);

        debug!(id = %request.id, %kind, elapsed = ?request.issued_at.elapsed(), "Request fulfilled");
        if request.reply.send(Ok(result)).is_err() {
            debug!(id = %request.id, "Requester went away before the reply");
        }
        Some(request.id)
    }

    /// Fail one pending request, e.g. when its frame could not be sent.
    pub fn fail(&mut self, kind: QueryKind, id: CorrelationId, error: LinkError) -> bool {
        match self.take(kind, id) {
            Some(request) => {
                self.deadlines.remove(&request.deadline);
                let _ = request.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Wait for the next request to pass its deadline and resolve it as timed out.
    ///
    /// Never completes while nothing is pending.
    pub async fn next_expired(&mut self) -> CorrelationId {
        loop {
            match poll_fn(|cx| self.deadlines.poll_expired(cx)).await {
                Some(expired) => {
                    let (kind, id) = expired.into_inner();
                    if let Some(request) = self.take(kind, id) {
                        warn!(%id, %kind, timeout = ?request.timeout, "Request timed out");
                        let _ = request
                            .reply
                            .send(Err(LinkError::Timeout { kind, duration: request.timeout }));
                        return id;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Resolve every pending request as cancelled. Returns how many there were.
    pub fn cancel_all(&mut self, reason: &str) -> usize {
        self.deadlines.clear();

        let mut cancelled = 0;
        for (_, queue) in self.pending.drain() {
            for request in queue {
                let _ = request.reply.send(Err(LinkError::cancelled(reason)));
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            debug!(cancelled, reason, "Cancelled pending requests");
        }
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn pending_for(&self, kind: QueryKind) -> usize {
        self.pending.get(&kind).map_or(0, VecDeque::len)
    }

    fn take(&mut self, kind: QueryKind, id: CorrelationId) -> Option<PendingRequest> {
        let queue = self.pending.get_mut(&kind)?;
        let index = queue.iter().position(|r| r.id == id)?;
        queue.remove(index)
    }
}
