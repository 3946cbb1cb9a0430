use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::form::CompletionCallback;
use crate::transport::TransportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Queued,
    Dispatched,
    Completed,
    Aborted,
    TimedOut,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Aborted | RequestState::TimedOut
        )
    }
}

pub struct QueuedRequest<T> {
    pub id: RequestId,
    pub payload: T,
    pub transport: TransportKind,
    pub on_complete: Option<CompletionCallback>,
    pub enqueued_at: Instant,
}

impl<T> QueuedRequest<T> {
    pub fn new(id: RequestId, payload: T, transport: TransportKind) -> Self {
        Self {
            id,
            payload,
            transport,
            on_complete: None,
            enqueued_at: Instant::now(),
        }
    }

    pub fn with_callback(mut self, callback: Option<CompletionCallback>) -> Self {
        self.on_complete = callback;
        self
    }
}

impl<T> fmt::Debug for QueuedRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Result of an `enqueue`.
///
/// `dispatched` hands ownership of a request back to the caller, who must
/// send it. `dropped` is the oldest waiting request evicted by a full wait
/// list; it ends aborted.
#[derive(Debug)]
pub struct Enqueued<T> {
    pub dispatched: Option<QueuedRequest<T>>,
    pub dropped: Option<QueuedRequest<T>>,
}

#[derive(Debug)]
pub enum Aborted<T> {
    /// Removed from the wait list before it was ever sent.
    Waiting(QueuedRequest<T>),
    /// An in-flight request; its slot is free and `next` was promoted.
    InFlight { next: Option<QueuedRequest<T>> },
    Unknown,
}

/// FIFO admission gate bounding in-flight requests.
///
/// Pure bookkeeping: the queue never performs I/O and never retries.
pub struct RequestQueue<T> {
    max_concurrency: usize,
    max_waiting: Option<usize>,
    waiting: VecDeque<QueuedRequest<T>>,
    dispatched: HashMap<RequestId, TransportKind>,
}

impl<T> RequestQueue<T> {
    pub fn new(max_concurrency: usize, max_waiting: Option<usize>) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            max_waiting,
            waiting: VecDeque::new(),
            dispatched: HashMap::new(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn dispatched_len(&self) -> usize {
        self.dispatched.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty() && self.dispatched.is_empty()
    }

    fn has_free_slot(&self) -> bool {
        self.dispatched.len() < self.max_concurrency
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        if self.dispatched.contains_key(&id) {
            Some(RequestState::Dispatched)
        } else if self.waiting.iter().any(|request| request.id == id) {
            Some(RequestState::Queued)
        } else {
            None
        }
    }

    pub fn enqueue(&mut self, request: QueuedRequest<T>) -> Enqueued<T> {
        if self.waiting.is_empty() && self.has_free_slot() {
            self.dispatched.insert(request.id, request.transport);
            tracing::debug!(target: "ajax_queue", id = %request.id, "dispatched immediately");
            return Enqueued {
                dispatched: Some(request),
                dropped: None,
            };
        }

        let mut dropped = None;
        if let Some(limit) = self.max_waiting {
            if limit == 0 {
                tracing::debug!(target: "ajax_queue", id = %request.id, "wait list disabled, dropping");
                return Enqueued {
                    dispatched: None,
                    dropped: Some(request),
                };
            }
            if self.waiting.len() >= limit {
                dropped = self.waiting.pop_front();
                if let Some(evicted) = &dropped {
                    tracing::debug!(target: "ajax_queue", id = %evicted.id, "wait list full, dropping oldest");
                }
            }
        }

        tracing::debug!(
            target: "ajax_queue",
            id = %request.id,
            waiting = self.waiting.len() + 1,
            "queued"
        );
        self.waiting.push_back(request);

        Enqueued {
            dispatched: self.dequeue_next(),
            dropped,
        }
    }

    /// Promotes the head of the wait list when a slot is free.
    pub fn dequeue_next(&mut self) -> Option<QueuedRequest<T>> {
        if !self.has_free_slot() {
            return None;
        }
        let next = self.waiting.pop_front()?;
        self.dispatched.insert(next.id, next.transport);
        tracing::debug!(target: "ajax_queue", id = %next.id, "promoted");
        Some(next)
    }

    /// Frees the slot of a dispatched request and promotes the next one.
    pub fn complete(&mut self, id: RequestId, state: RequestState) -> Option<QueuedRequest<T>> {
        debug_assert!(state.is_terminal());
        if self.dispatched.remove(&id).is_none() {
            return None;
        }
        tracing::debug!(target: "ajax_queue", id = %id, ?state, "slot freed");
        self.dequeue_next()
    }

    pub fn abort(&mut self, id: RequestId) -> Aborted<T> {
        if let Some(position) = self.waiting.iter().position(|request| request.id == id) {
            if let Some(request) = self.waiting.remove(position) {
                return Aborted::Waiting(request);
            }
        }
        if self.dispatched.contains_key(&id) {
            let next = self.complete(id, RequestState::Aborted);
            return Aborted::InFlight { next };
        }
        Aborted::Unknown
    }

    /// Teardown: forgets in-flight slots and hands back every waiting request.
    pub fn clear(&mut self) -> Vec<QueuedRequest<T>> {
        self.dispatched.clear();
        self.waiting.drain(..).collect()
    }
}
