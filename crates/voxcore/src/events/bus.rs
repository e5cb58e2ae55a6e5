use super::types::{EventEnvelope, RunEvent};
use crate::error::SubscribeError;
use crate::run::RunId;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// In-process event bus with per-run ordered history and live fan-out.
///
/// Every published event is appended to the run's history before it is
/// broadcast, under one lock, so replay and live delivery agree on
/// sequence numbers. History lives until the run manager evicts it after
/// the retention window; evicted runs answer further subscriptions with
/// `HistoryExpired`.
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
    buffer: usize,
}

#[derive(Debug)]
struct BusInner {
    runs: HashMap<RunId, RunChannel>,
    expired: HashSet<RunId>,
}

#[derive(Debug)]
struct RunChannel {
    history: Vec<EventEnvelope>,
    sender: broadcast::Sender<EventEnvelope>,
    next_seq: u64,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                runs: HashMap::new(),
                expired: HashSet::new(),
            })),
            buffer,
        }
    }

    /// Open the event channel for a new run and hand back its publisher.
    pub fn register_run(&self, run_id: RunId) -> RunPublisher {
        let (sender, _) = broadcast::channel(self.buffer);
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.expired.remove(&run_id);
        inner.runs.insert(
            run_id,
            RunChannel {
                history: Vec::new(),
                sender,
                next_seq: 0,
            },
        );
        RunPublisher {
            run_id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Attach to a run's event stream, replaying history from `from_seq`
    /// (or the beginning) before switching to live delivery.
    pub fn subscribe(
        &self,
        run_id: RunId,
        from_seq: Option<u64>,
    ) -> Result<EventStream, SubscribeError> {
        let inner = self.inner.lock().expect("event bus lock poisoned");
        if inner.expired.contains(&run_id) {
            return Err(SubscribeError::HistoryExpired);
        }
        let channel = inner.runs.get(&run_id).ok_or(SubscribeError::RunNotFound)?;
        let start = from_seq.unwrap_or(0);
        let pending: VecDeque<EventEnvelope> = channel
            .history
            .iter()
            .filter(|e| e.seq >= start)
            .cloned()
            .collect();
        // Subscribing under the same lock as publishing guarantees the
        // receiver sees every event not already in `pending`.
        let live = channel.sender.subscribe();
        Ok(EventStream {
            run_id,
            inner: Arc::clone(&self.inner),
            pending,
            live,
            next_seq: start,
            finished: false,
        })
    }

    /// Drop a run's history. Later subscriptions fail with `HistoryExpired`.
    pub fn evict(&self, run_id: RunId) {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        if inner.runs.remove(&run_id).is_some() {
            inner.expired.insert(run_id);
        }
    }
}

/// Publishing handle bound to one run.
#[derive(Clone)]
pub struct RunPublisher {
    run_id: RunId,
    inner: Arc<Mutex<BusInner>>,
}

impl RunPublisher {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Publish one event, assigning the next sequence number for the run.
    pub fn publish(&self, event: RunEvent) -> u64 {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let Some(channel) = inner.runs.get_mut(&self.run_id) else {
            tracing::warn!(run_id = %self.run_id, "publish after eviction dropped");
            return 0;
        };
        let envelope = EventEnvelope {
            run_id: self.run_id,
            seq: channel.next_seq,
            timestamp: Utc::now(),
            event,
        };
        channel.next_seq += 1;
        channel.history.push(envelope.clone());
        let seq = envelope.seq;
        let _ = channel.sender.send(envelope);
        seq
    }
}

/// Ordered, at-least-once event stream for one run.
///
/// Replays buffered history first, then delivers live events. A receiver
/// that lags behind the broadcast buffer refills from history, so no event
/// is dropped silently. The stream ends after a terminal run event.
#[derive(Debug)]
pub struct EventStream {
    run_id: RunId,
    inner: Arc<Mutex<BusInner>>,
    pending: VecDeque<EventEnvelope>,
    live: broadcast::Receiver<EventEnvelope>,
    next_seq: u64,
    finished: bool,
}

impl EventStream {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if self.finished {
            return None;
        }
        if let Some(envelope) = self.pending.pop_front() {
            return Some(self.deliver(envelope));
        }
        loop {
            match self.live.recv().await {
                Ok(envelope) => {
                    if envelope.seq < self.next_seq {
                        continue;
                    }
                    if envelope.seq > self.next_seq {
                        // Missed events are still in history; refill the gap.
                        self.refill_from_history();
                        if let Some(first) = self.pending.pop_front() {
                            return Some(self.deliver(first));
                        }
                        continue;
                    }
                    return Some(self.deliver(envelope));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    self.refill_from_history();
                    if let Some(first) = self.pending.pop_front() {
                        return Some(self.deliver(first));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.refill_from_history();
                    return self.pending.pop_front().map(|e| self.deliver(e));
                }
            }
        }
    }

    fn deliver(&mut self, envelope: EventEnvelope) -> EventEnvelope {
        self.next_seq = envelope.seq + 1;
        if envelope.event.is_terminal() {
            self.finished = true;
        }
        envelope
    }

    fn refill_from_history(&mut self) {
        let inner = self.inner.lock().expect("event bus lock poisoned");
        if let Some(channel) = inner.runs.get(&self.run_id) {
            for envelope in channel.history.iter().filter(|e| e.seq >= self.next_seq) {
                self.pending.push_back(envelope.clone());
            }
        }
    }
}
