//! Player event tags and the subscription bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// Per-subscriber buffer size. A subscriber that falls further behind
/// than this loses events instead of stalling the emitter.
pub const SUBSCRIBER_BUFFER: usize = 16;

/// A state change on a player. Events carry no payload; consumers
/// re-read the authoritative state from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Playstate,
    Playlist,
    Time,
    Volume,
    TrackIndex,
    Availability,
    LibraryUpdate,
}

impl PlayerEvent {
    /// Stable textual tag, as written to WebSocket observers.
    pub fn tag(self) -> &'static str {
        match self {
            PlayerEvent::Playstate => "playstate",
            PlayerEvent::Playlist => "playlist",
            PlayerEvent::Time => "time",
            PlayerEvent::Volume => "volume",
            PlayerEvent::TrackIndex => "trackindex",
            PlayerEvent::Availability => "availability",
            PlayerEvent::LibraryUpdate => "library",
        }
    }
}

/// Handle tying a subscriber channel to an [`Emitter`]. Pass it back to
/// [`Emitter::unlisten`] to stop delivery.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

struct Subscriber {
    id: u64,
    tx: Sender<PlayerEvent>,
}

/// Broadcasts events to every registered subscriber.
///
/// Delivery is best-effort per subscriber: `emit` never blocks, a full
/// subscriber buffer drops the event for that subscriber only.
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

#[derive(Default)]
struct EmitterInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The returned stream yields every
    /// event emitted after this call, until `unlisten` or the receiver
    /// is dropped.
    pub fn listen(&self) -> (Subscription, Receiver<PlayerEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push(Subscriber { id, tx });
        (Subscription { id }, rx)
    }

    /// Remove a subscription. Idempotent; after this returns no
    /// subsequently emitted event reaches the handle's stream.
    pub fn unlisten(&self, subscription: Subscription) {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .retain(|sub| sub.id != subscription.id);
    }

    /// Enqueue one event to each current subscriber. Subscribers whose
    /// receiver is gone are pruned; subscribers whose buffer is full
    /// silently miss this event.
    pub fn emit(&self, event: PlayerEvent) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        subscribers.retain(|sub| match sub.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(event = event.tag(), "subscriber lagging, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscriptions, for diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let emitter = Emitter::new();
        let (_sub_a, mut rx_a) = emitter.listen();
        let (_sub_b, mut rx_b) = emitter.listen();

        emitter.emit(PlayerEvent::Volume);

        assert_eq!(rx_a.recv().await, Some(PlayerEvent::Volume));
        assert_eq!(rx_b.recv().await, Some(PlayerEvent::Volume));
    }

    #[tokio::test]
    async fn unlisten_stops_delivery() {
        let emitter = Emitter::new();
        let (sub, mut rx) = emitter.listen();

        emitter.emit(PlayerEvent::Time);
        emitter.unlisten(sub);
        emitter.emit(PlayerEvent::Playstate);

        assert_eq!(rx.recv().await, Some(PlayerEvent::Time));
        // The sender side is gone, so the stream ends after the
        // pre-unlisten event.
        assert_eq!(rx.recv().await, None);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_but_others_stay_live() {
        let emitter = Emitter::new();
        let (_slow, mut slow_rx) = emitter.listen();
        let (_fast, mut fast_rx) = emitter.listen();

        // The slow subscriber never drains; the fast one keeps up with
        // every emit and misses nothing.
        for _ in 0..SUBSCRIBER_BUFFER + 4 {
            emitter.emit(PlayerEvent::Time);
            assert_eq!(fast_rx.recv().await, Some(PlayerEvent::Time));
        }

        // The slow subscriber kept one buffer's worth; the overflow
        // was dropped without stalling anyone.
        let mut slow_seen = 0;
        while slow_rx.try_recv().is_ok() {
            slow_seen += 1;
        }
        assert_eq!(slow_seen, SUBSCRIBER_BUFFER);
        assert_eq!(emitter.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_emit() {
        let emitter = Emitter::new();
        let (_sub, rx) = emitter.listen();
        drop(rx);

        emitter.emit(PlayerEvent::Playlist);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn tags_are_stable() {
        assert_eq!(PlayerEvent::Playstate.tag(), "playstate");
        assert_eq!(PlayerEvent::TrackIndex.tag(), "trackindex");
        assert_eq!(PlayerEvent::LibraryUpdate.tag(), "library");
    }
}
