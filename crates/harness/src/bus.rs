//! In-process topic pub-sub.
//!
//! Pull-based delivery: every topic keeps a monotonic sequence counter
//! and a bounded ring of recent events, and every subscriber owns a
//! bounded FIFO queue. A full queue drops its oldest non-terminal event
//! and coalesces the loss into a single lag marker; terminal run events
//! are never dropped. Late subscribers pass a cursor and receive the
//! retained snapshot before tailing live events.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use docbench_domain::{Event, EventKind, RunId, Topic};

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_RING_CAPACITY: usize = 1024;

struct Subscriber {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
    closed: AtomicBool,
    signal: watch::Sender<u64>,
}

impl Subscriber {
    fn push(&self, event: Event) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                // Drop the oldest droppable event and account for it in a
                // single lag marker. Terminal events are untouchable, so a
                // queue of nothing but terminal events is allowed to grow.
                if let Some(idx) = queue
                    .iter()
                    .position(|e| !e.is_terminal() && !e.kind.is_lag())
                {
                    let _ = queue.remove(idx);
                    let coalesced = queue.iter_mut().find_map(|e| match &mut e.kind {
                        EventKind::Lag { dropped } => {
                            *dropped += 1;
                            Some(())
                        }
                        _ => None,
                    });
                    if coalesced.is_none() {
                        queue.insert(
                            idx,
                            Event {
                                seq: 0,
                                run_id: None,
                                batch: None,
                                kind: EventKind::Lag { dropped: 1 },
                            },
                        );
                    }
                }
            }
            queue.push_back(event);
        }
        self.signal.send_modify(|v| *v += 1);
    }
}

struct TopicState {
    seq: u64,
    ring: VecDeque<Event>,
    subscribers: Vec<Arc<Subscriber>>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            seq: 0,
            ring: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }
}

/// Shared, internally synchronized event bus.
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
    queue_capacity: usize,
    ring_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize, ring_capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            queue_capacity: queue_capacity.max(2),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Publish an event, returning its sequence number on the topic.
    pub fn publish(
        &self,
        topic: &Topic,
        run_id: Option<RunId>,
        batch: Option<u32>,
        kind: EventKind,
    ) -> u64 {
        let mut topics = self.topics.lock();
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(TopicState::new);

        state.seq += 1;
        let event = Event {
            seq: state.seq,
            run_id,
            batch,
            kind,
        };

        state.ring.push_back(event.clone());
        while state.ring.len() > self.ring_capacity {
            state.ring.pop_front();
        }

        state
            .subscribers
            .retain(|s| !s.closed.load(Ordering::Acquire));
        for subscriber in &state.subscribers {
            subscriber.push(event.clone());
        }
        state.seq
    }

    /// Subscribe to a topic. With a cursor, retained events newer than it
    /// are replayed first (snapshot-then-tail); without one, delivery
    /// starts at the next published event.
    pub fn subscribe(&self, topic: &Topic, cursor: Option<u64>) -> EventStream {
        let mut topics = self.topics.lock();
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(TopicState::new);

        let (tx, rx) = watch::channel(0u64);
        let subscriber = Arc::new(Subscriber {
            queue: Mutex::new(VecDeque::new()),
            capacity: self.queue_capacity,
            closed: AtomicBool::new(false),
            signal: tx,
        });

        if let Some(cursor) = cursor {
            let mut queue = subscriber.queue.lock();
            for event in state.ring.iter().filter(|e| e.seq > cursor) {
                queue.push_back(event.clone());
            }
        }

        state.subscribers.push(subscriber.clone());
        EventStream {
            subscriber,
            signal: rx,
        }
    }

    /// Latest sequence number published on a topic.
    pub fn latest_seq(&self, topic: &Topic) -> u64 {
        self.topics
            .lock()
            .get(&topic.to_string())
            .map(|s| s.seq)
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-subscriber FIFO stream of events.
pub struct EventStream {
    subscriber: Arc<Subscriber>,
    signal: watch::Receiver<u64>,
}

impl EventStream {
    /// Await the next event. Returns `None` only once the stream is closed
    /// and drained.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.subscriber.queue.lock().pop_front() {
                return Some(event);
            }
            if self.subscriber.closed.load(Ordering::Acquire) {
                return None;
            }
            if self.signal.changed().await.is_err() {
                return self.subscriber.queue.lock().pop_front();
            }
        }
    }

    /// Pop a buffered event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        self.subscriber.queue.lock().pop_front()
    }

    /// Unsubscribe. Buffered events remain readable.
    pub fn close(&self) {
        self.subscriber.closed.store(true, Ordering::Release);
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscriber.closed.store(true, Ordering::Release);
    }
}
