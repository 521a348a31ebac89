//! Connection state machine and its observable stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

/// Lifecycle of the single feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Failed = 4,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Whether a supervision run is in progress (`start()` is a no-op in these states).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// Legal edges of the state machine.
    ///
    /// `Connected` is only reachable from `Connecting` or `Reconnecting`.
    /// `Reconnecting → Reconnecting` is one edge per retry attempt.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Disconnected | Failed, Connecting) => true,
            (Connecting, Connected | Reconnecting | Failed) => true,
            (Connected, Reconnecting | Failed) => true,
            (Reconnecting, Reconnecting | Connected | Failed) => true,
            (current, Disconnected) => current != Disconnected,
            _ => false,
        }
    }
}

// ─── Publisher ───────────────────────────────────────────────────────────────

struct Observers {
    /// Bumped on every `begin` and `halt`; a supervision run may only publish
    /// while its epoch is current.
    epoch: u64,
    senders: Vec<mpsc::UnboundedSender<ConnectionState>>,
}

/// Single-writer state cell with fan-out to observers.
///
/// Writes and fan-out happen under one lock, so every observer sees every
/// transition exactly once and in the same order. Reads of the current value
/// never take the lock.
pub(crate) struct StatePublisher {
    current: AtomicU8,
    observers: Mutex<Observers>,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(ConnectionState::Disconnected as u8),
            observers: Mutex::new(Observers {
                epoch: 0,
                senders: Vec::new(),
            }),
        }
    }

    pub fn current(&self) -> ConnectionState {
        ConnectionState::from(self.current.load(Ordering::Acquire))
    }

    /// New observer. The current state is delivered first.
    pub fn subscribe(&self) -> ConnectionStateStream {
        let mut observers = self.observers.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.current());
        observers.senders.push(tx);
        ConnectionStateStream { rx }
    }

    /// Open a new supervision run: `Disconnected`/`Failed` → `Connecting`.
    ///
    /// Returns the run's epoch, or `None` if a run is already active.
    pub fn begin(&self) -> Option<u64> {
        let mut observers = self.observers.lock();
        if !self.current().can_transition_to(ConnectionState::Connecting) {
            return None;
        }
        observers.epoch += 1;
        self.emit(&mut observers, ConnectionState::Connecting);
        Some(observers.epoch)
    }

    /// Publish a transition on behalf of the run identified by `epoch`.
    ///
    /// Returns `false` when the run has been superseded or the edge is illegal;
    /// nothing is published in that case.
    pub fn publish(&self, epoch: u64, next: ConnectionState) -> bool {
        let mut observers = self.observers.lock();
        if observers.epoch != epoch {
            tracing::debug!("Ignoring {} from superseded run {}", next, epoch);
            return false;
        }
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!("Ignoring illegal transition {} → {}", current, next);
            return false;
        }
        self.emit(&mut observers, next);
        true
    }

    /// End the active run and publish `Disconnected`.
    ///
    /// Returns `false` if the engine was already disconnected.
    pub fn halt(&self) -> bool {
        let mut observers = self.observers.lock();
        observers.epoch += 1;
        if self.current() == ConnectionState::Disconnected {
            return false;
        }
        self.emit(&mut observers, ConnectionState::Disconnected);
        true
    }

    fn emit(&self, observers: &mut Observers, next: ConnectionState) {
        self.current.store(next as u8, Ordering::Release);
        observers.senders.retain(|tx| tx.send(next).is_ok());
        tracing::debug!("Connection state → {}", next);
    }
}

pin_project! {
    /// Stream of connection state transitions, starting with the state at subscription time.
    pub struct ConnectionStateStream {
        #[pin]
        rx: mpsc::UnboundedReceiver<ConnectionState>,
    }
}

impl Stream for ConnectionStateStream {
    type Item = ConnectionState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        this.rx.poll_recv(cx)
    }
}
