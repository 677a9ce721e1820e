use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use tokio::time::timeout;

use super::event::{EventDraft, StreamEvent};

/// Default ring-buffer capacity per broker instance.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default bounded capacity of each listener channel.
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

/// Opaque identity of a registered listener, used for [`EventBroker::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    tx: flume::Sender<Arc<StreamEvent>>,
}

struct BrokerInner {
    buffer: VecDeque<Arc<StreamEvent>>,
    next_sequence: u64,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    closed: bool,
}

/// Ordered, replayable, multi-listener event log for one session.
///
/// Events are buffered in a bounded ring (oldest evicted first) and fanned
/// out to every registered listener. A reconnecting client replays missed
/// events with [`history`](Self::history) before re-subscribing.
///
/// Known limitation: replay cannot reach past the ring capacity. Once an
/// event is evicted it is gone; sequence numbers are never renumbered, so a
/// replay gap is detectable by the client but not recoverable here.
///
/// All mutating operations share one critical section, so no listener ever
/// observes sequence numbers out of publish order.
pub struct EventBroker {
    inner: Mutex<BrokerInner>,
    capacity: usize,
    listener_capacity: usize,
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTENER_CAPACITY)
    }
}

impl EventBroker {
    pub fn new(capacity: usize, listener_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BrokerInner {
                buffer: VecDeque::with_capacity(capacity.max(1)),
                next_sequence: 0,
                listeners: Vec::new(),
                next_listener_id: 0,
                closed: false,
            }),
            capacity: capacity.max(1),
            listener_capacity: listener_capacity.max(1),
        }
    }

    /// Assign the next sequence number and timestamp, append to the ring
    /// buffer, and deliver to every live listener.
    ///
    /// Delivery is best-effort and never blocks the publisher: a listener
    /// whose channel is full has that one event skipped (logged), and a
    /// listener whose receiver is gone is dropped from the set.
    pub fn publish(&self, draft: EventDraft) -> Arc<StreamEvent> {
        let mut inner = self.inner.lock().expect("broker lock poisoned");

        let sequence = inner.next_sequence;
        let event = Arc::new(StreamEvent::from_draft(draft, sequence));

        if inner.closed {
            tracing::debug!(
                kind = %event.kind,
                "publish after teardown; event dropped"
            );
            return event;
        }
        inner.next_sequence += 1;

        if inner.buffer.len() == self.capacity {
            inner.buffer.pop_front();
        }
        inner.buffer.push_back(Arc::clone(&event));

        inner.listeners.retain(|listener| {
            match listener.tx.try_send(Arc::clone(&event)) {
                Ok(()) => true,
                Err(flume::TrySendError::Full(_)) => {
                    tracing::warn!(
                        listener = ?listener.id,
                        sequence,
                        "listener channel full; skipping delivery"
                    );
                    true
                }
                Err(flume::TrySendError::Disconnected(_)) => false,
            }
        });

        tracing::debug!(kind = %event.kind, sequence, "event published");
        event
    }

    /// All buffered events in ascending sequence order, optionally filtered
    /// to `sequence > since_sequence`. No side effects; repeated calls with
    /// an unchanged buffer return identical results.
    pub fn history(&self, since_sequence: Option<u64>) -> Vec<Arc<StreamEvent>> {
        let inner = self.inner.lock().expect("broker lock poisoned");
        match since_sequence {
            Some(since) => inner
                .buffer
                .iter()
                .filter(|event| event.sequence > since)
                .cloned()
                .collect(),
            None => inner.buffer.iter().cloned().collect(),
        }
    }

    /// Register a live listener. The handle receives every event published
    /// after this call; it does not replay the buffer.
    pub fn subscribe(&self) -> ListenerHandle {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        let id = ListenerId(inner.next_listener_id);
        inner.next_listener_id += 1;
        let (tx, rx) = flume::bounded(self.listener_capacity);
        inner.listeners.push(Listener { id, tx });
        tracing::debug!(listener = ?id, "listener registered");
        ListenerHandle { id, rx }
    }

    /// Remove a listener. Unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: ListenerId) {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        inner.listeners.retain(|listener| listener.id != id);
    }

    /// Clear the buffer and sequence counter and drop all listeners,
    /// releasing any consumer blocked on a receive. Idempotent.
    ///
    /// Late publishes after teardown are dropped (not buffered, not
    /// delivered, no sequence consumed).
    pub fn teardown(&self) {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        inner.buffer.clear();
        inner.next_sequence = 0;
        inner.listeners.clear();
        inner.closed = true;
        tracing::debug!("broker torn down");
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().expect("broker lock poisoned").buffer.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .expect("broker lock poisoned")
            .listeners
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Outcome of waiting on a listener with an idle timeout.
///
/// Transports use `Idle` to emit SSE keep-alive comments while the pipeline
/// is between events.
#[derive(Debug)]
pub enum ListenerPoll {
    Event(Arc<StreamEvent>),
    Idle,
    Closed,
}

/// Receiving side of one broker subscription.
pub struct ListenerHandle {
    id: ListenerId,
    rx: flume::Receiver<Arc<StreamEvent>>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event; `None` once the broker is torn down (or this
    /// listener unsubscribed) and the channel drained.
    pub async fn recv(&self) -> Option<Arc<StreamEvent>> {
        self.rx.recv_async().await.ok()
    }

    /// Wait for the next event, giving up after `idle_after` without
    /// consuming anything.
    pub async fn poll_timeout(&self, idle_after: Duration) -> ListenerPoll {
        match timeout(idle_after, self.rx.recv_async()).await {
            Ok(Ok(event)) => ListenerPoll::Event(event),
            Ok(Err(_)) => ListenerPoll::Closed,
            Err(_) => ListenerPoll::Idle,
        }
    }

    /// Adapt the handle into an async `Stream` ending when the broker closes.
    pub fn into_stream(self) -> impl futures_util::Stream<Item = Arc<StreamEvent>> {
        stream::unfold(self, |handle| async move {
            handle.recv().await.map(|event| (event, handle))
        })
    }
}
