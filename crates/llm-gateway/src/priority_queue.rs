//! Priority queue sitting between request submission and the worker that
//! actually talks to a provider. Director requests always drain before agent
//! requests; within a priority, FIFO order is preserved by a monotonic
//! sequence number.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, Notify};

use crate::error::{Error, Result};
use crate::provider::{LLMRequest, LLMResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPriority {
    Director = 0,
    Agent = 1,
}

/// A request sitting in the queue, paired with the channel its eventual
/// caller is awaiting on.
pub struct QueuedRequest {
    pub request: LLMRequest,
    priority: RequestPriority,
    sequence: u64,
    responder: oneshot::Sender<Result<LLMResponse>>,
}

impl QueuedRequest {
    #[must_use]
    pub fn priority(&self) -> RequestPriority {
        self.priority
    }

    /// Deliver a successful response to whoever is awaiting this request.
    pub fn complete(self, response: LLMResponse) {
        let _ = self.responder.send(Ok(response));
    }

    /// Deliver a failure to whoever is awaiting this request.
    pub fn fail(self, error: Error) {
        let _ = self.responder.send(Err(error));
    }
}

struct HeapEntry(QueuedRequest);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.sequence == other.0.sequence
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the lowest priority value and the
        // lowest sequence to come out first, so reverse both comparisons.
        other
            .0
            .priority
            .cmp(&self.0.priority)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Counts {
    director_depth: AtomicUsize,
    agent_depth: AtomicUsize,
    director_enqueued: AtomicU64,
    agent_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
}

pub struct LLMPriorityQueue {
    heap: Mutex<BinaryHeap<HeapEntry>>,
    notify: Notify,
    sequence: AtomicU64,
    counts: Counts,
}

impl Default for LLMPriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LLMPriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            sequence: AtomicU64::new(0),
            counts: Counts::default(),
        }
    }

    pub async fn enqueue_director(&self, request: LLMRequest) -> oneshot::Receiver<Result<LLMResponse>> {
        self.enqueue(request, RequestPriority::Director).await
    }

    pub async fn enqueue_agent(&self, request: LLMRequest) -> oneshot::Receiver<Result<LLMResponse>> {
        self.enqueue(request, RequestPriority::Agent).await
    }

    async fn enqueue(&self, request: LLMRequest, priority: RequestPriority) -> oneshot::Receiver<Result<LLMResponse>> {
        let (tx, rx) = oneshot::channel();
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let entry = HeapEntry(QueuedRequest { request, priority, sequence, responder: tx });

        match priority {
            RequestPriority::Director => {
                self.counts.director_depth.fetch_add(1, AtomicOrdering::SeqCst);
                self.counts.director_enqueued.fetch_add(1, AtomicOrdering::SeqCst);
            }
            RequestPriority::Agent => {
                self.counts.agent_depth.fetch_add(1, AtomicOrdering::SeqCst);
                self.counts.agent_enqueued.fetch_add(1, AtomicOrdering::SeqCst);
            }
        }

        self.heap.lock().await.push(entry);
        self.notify.notify_one();
        rx
    }

    /// Pops the highest-priority, oldest-queued request, waiting up to
    /// `timeout` for one to arrive.
    pub async fn dequeue(&self, timeout: Duration) -> Result<QueuedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(entry) = self.heap.lock().await.pop() {
                match entry.0.priority {
                    RequestPriority::Director => self.counts.director_depth.fetch_sub(1, AtomicOrdering::SeqCst),
                    RequestPriority::Agent => self.counts.agent_depth.fetch_sub(1, AtomicOrdering::SeqCst),
                };
                self.counts.total_dequeued.fetch_add(1, AtomicOrdering::SeqCst);
                return Ok(entry.0);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout { provider: "queue".into(), timeout_secs: timeout.as_secs_f64() });
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(remaining) => {
                    return Err(Error::Timeout { provider: "queue".into(), timeout_secs: timeout.as_secs_f64() });
                }
            }
        }
    }

    #[must_use]
    pub fn director_queue_depth(&self) -> usize {
        self.counts.director_depth.load(AtomicOrdering::SeqCst)
    }

    #[must_use]
    pub fn agent_queue_depth(&self) -> usize {
        self.counts.agent_depth.load(AtomicOrdering::SeqCst)
    }

    #[must_use]
    pub fn total_queue_depth(&self) -> usize {
        self.director_queue_depth() + self.agent_queue_depth()
    }

    #[must_use]
    pub fn total_dequeued(&self) -> u64 {
        self.counts.total_dequeued.load(AtomicOrdering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LLMRequest {
        LLMRequest::new("do the thing", "mock-model").expect("valid request")
    }

    #[tokio::test]
    async fn director_requests_dequeue_before_agent_requests() {
        let queue = LLMPriorityQueue::new();
        let _agent_rx = queue.enqueue_agent(request()).await;
        let _director_rx = queue.enqueue_director(request()).await;

        let first = queue.dequeue(Duration::from_millis(50)).await.expect("has entry");
        assert_eq!(first.priority(), RequestPriority::Director);
    }

    #[tokio::test]
    async fn same_priority_dequeues_fifo() {
        let queue = LLMPriorityQueue::new();
        let first_rx = queue.enqueue_agent(request()).await;
        let _second_rx = queue.enqueue_agent(request()).await;
        drop(first_rx);

        let first = queue.dequeue(Duration::from_millis(50)).await.expect("has entry");
        // sequence 0 was enqueued first, so it must dequeue first regardless
        // of priority ties.
        assert_eq!(first.priority(), RequestPriority::Agent);
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let queue = LLMPriorityQueue::new();
        assert!(queue.dequeue(Duration::from_millis(10)).await.is_err());
    }

    #[tokio::test]
    async fn complete_delivers_response_to_caller() {
        let queue = LLMPriorityQueue::new();
        let rx = queue.enqueue_agent(request()).await;
        let queued = queue.dequeue(Duration::from_millis(50)).await.expect("has entry");

        queued.complete(LLMResponse {
            content: "ok".into(),
            model: "mock-model".into(),
            usage: crate::provider::TokenUsage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
            latency_ms: 1,
            finish_reason: None,
            request_id: None,
        });

        let response = rx.await.expect("sender not dropped").expect("completed ok");
        assert_eq!(response.content, "ok");
    }
}
