/*
 * Summary Store & Event Bus
 *
 * One topic per method, multi-producer/multi-consumer, with an
 * unbounded replay buffer so late subscribers observe the full history.
 * Delivery is at-least-once; subscribers deduplicate by edge identity,
 * so logical processing is effectively at-most-once.
 *
 * Topics are created on first touch, publish or subscribe alike, so a
 * publish racing the first subscribe is never dropped.
 *
 * Replay buffers are bounded in practice by the finite fact domain;
 * still, a capacity cap exists and overflow downgrades the run: newest
 * events are dropped and the result is flagged.
 *
 * Vulnerabilities are appended to the store directly (deduplicated
 * structurally); they never need routing.
 */

use super::events::AnalysisEvent;
use crate::features::solver::edge::Vulnerability;
use crate::shared::MethodId;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Sending half of a runner mailbox. Every send is counted against the
/// shared in-flight counter until the receiver acknowledges processing.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AnalysisEvent>,
    in_flight: Arc<AtomicUsize>,
}

impl EventSink {
    pub fn send(&self, event: AnalysisEvent) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Runner-side mailbox; acknowledges each processed event.
pub struct EventMailbox {
    rx: mpsc::UnboundedReceiver<AnalysisEvent>,
    in_flight: Arc<AtomicUsize>,
}

impl EventMailbox {
    pub async fn recv(&mut self) -> Option<AnalysisEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AnalysisEvent> {
        self.rx.try_recv().ok()
    }

    /// Mark one received event as processed.
    pub fn ack(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Create a linked sink/mailbox pair over the shared in-flight counter.
pub fn event_channel(in_flight: Arc<AtomicUsize>) -> (EventSink, EventMailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSink {
            tx,
            in_flight: in_flight.clone(),
        },
        EventMailbox { rx, in_flight },
    )
}

#[derive(Default)]
struct MethodTopic {
    history: Vec<AnalysisEvent>,
    subscribers: Vec<EventSink>,
}

/// Shared store of per-method topics plus the vulnerability log.
pub struct SummaryStore {
    topics: DashMap<MethodId, Mutex<MethodTopic>>,
    vulnerabilities: Mutex<Vec<Vulnerability>>,
    seen_vulnerabilities: Mutex<FxHashSet<Vulnerability>>,
    replay_capacity: usize,
    overflowed: AtomicBool,
}

/// Default replay-buffer capacity per topic.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1 << 20;

impl SummaryStore {
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            vulnerabilities: Mutex::new(Vec::new()),
            seen_vulnerabilities: Mutex::new(FxHashSet::default()),
            replay_capacity,
            overflowed: AtomicBool::new(false),
        }
    }

    /// Publish to a method's topic: record in the replay buffer, then
    /// fan out to current subscribers. Dead subscribers are pruned.
    pub fn publish(&self, method: MethodId, event: AnalysisEvent) {
        let topic = self.topics.entry(method).or_default();
        let mut topic = topic.lock();
        if topic.history.len() >= self.replay_capacity {
            if !self.overflowed.swap(true, Ordering::SeqCst) {
                warn!(%method, capacity = self.replay_capacity,
                    "replay buffer full, dropping newest events; result will be flagged");
            }
            return;
        }
        topic.history.push(event.clone());
        topic.subscribers.retain(|sink| sink.send(event.clone()));
    }

    /// Subscribe to a method's topic: replay the full history into the
    /// sink, then register it for future publishes.
    pub fn subscribe(&self, method: MethodId, sink: EventSink) {
        let topic = self.topics.entry(method).or_default();
        let mut topic = topic.lock();
        for event in &topic.history {
            if !sink.send(event.clone()) {
                return;
            }
        }
        topic.subscribers.push(sink);
    }

    /// Append a finding; duplicates (structural identity) are ignored.
    pub fn add_vulnerability(&self, vulnerability: Vulnerability) -> bool {
        let mut seen = self.seen_vulnerabilities.lock();
        if !seen.insert(vulnerability.clone()) {
            return false;
        }
        self.vulnerabilities.lock().push(vulnerability);
        true
    }

    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        self.vulnerabilities.lock().clone()
    }

    /// Methods with a topic (touched by publish or subscribe).
    pub fn known_methods(&self) -> Vec<MethodId> {
        let mut methods: Vec<MethodId> = self.topics.iter().map(|e| *e.key()).collect();
        methods.sort();
        methods
    }

    /// Whether any replay buffer overflowed its cap.
    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::SeqCst)
    }
}

impl Default for SummaryStore {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }
}
