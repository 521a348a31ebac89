//! Connection supervisor — owns the single feed connection.
//!
//! - Background tokio task per supervision run
//! - Batched subscribe of the registry's upstream set on every (re)connect
//! - Incremental subscribe/unsubscribe filtered against what the live socket carries
//! - Application-level ping/pong health check
//! - Exponential backoff reconnection with jitter, bounded attempt budget

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::domain::price::{PriceDirectionTracker, Tick};
use crate::error::WsError;
use crate::ws::{Connection, Frame, LiveSubscriptions, MessageIn, MessageOut, Transport, WsConfig};

use super::distributor::UpdateDistributor;
use super::registry::SubscriptionRegistry;
use super::state::{ConnectionState, ConnectionStateStream, StatePublisher};

/// Close code the feed uses when it throttles a client.
const RATE_LIMITED_CLOSE: u16 = 1008;

/// How long `stop()` waits for the task to close the socket before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(5);

// ─── Disconnect reasons for reconnection decision ────────────────────────────

enum DisconnectReason {
    Shutdown,
    RateLimited,
    Error(String),
}

// ─── State shared between the handle and the background task ────────────────

struct Shared {
    config: WsConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    tracker: Arc<PriceDirectionTracker>,
    distributor: Arc<UpdateDistributor>,
    state: StatePublisher,
    /// Registry deltas. Held by exactly one run at a time.
    outbound: Mutex<mpsc::UnboundedReceiver<MessageOut>>,
}

#[derive(Default)]
struct Lifecycle {
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Owns the feed connection and its state machine.
///
/// `start()` and `stop()` are serialized; the socket itself is only touched by the
/// background task.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    /// Count of runs begun; lets callers queued behind an in-flight `start()` share its outcome.
    starts: AtomicU64,
}

impl ConnectionSupervisor {
    pub(crate) fn new(
        config: WsConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        tracker: Arc<PriceDirectionTracker>,
        distributor: Arc<UpdateDistributor>,
        outbound: mpsc::UnboundedReceiver<MessageOut>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                registry,
                tracker,
                distributor,
                state: StatePublisher::new(),
                outbound: Mutex::new(outbound),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
            starts: AtomicU64::new(0),
        }
    }

    /// Begin supervising the connection and wait for the initial attempt to resolve.
    ///
    /// No-op while a run is active (`Connecting`, `Connected`, `Reconnecting`).
    /// From `Disconnected` or `Failed` this publishes `Connecting` and makes one
    /// physical connect attempt. Concurrent callers share that one attempt.
    ///
    /// Returns the state observed once the attempt resolved: `Connected`,
    /// `Reconnecting` (retrying in the background), `Failed`, or `Disconnected`
    /// when `stop()` cut the attempt short.
    ///
    /// Waits without holding the lifecycle lock.
    pub async fn start(&self) -> ConnectionState {
        let mut states = {
            let seen = self.starts.load(Ordering::SeqCst);
            let observed = self.current_state();
            let mut lifecycle = self.lifecycle.lock().await;

            if !observed.is_active() && self.starts.load(Ordering::SeqCst) == seen {
                if let Some(epoch) = self.shared.state.begin() {
                    self.starts.fetch_add(1, Ordering::SeqCst);
                    self.spawn_run(&mut lifecycle, epoch);
                }
            }
            self.shared.state.subscribe()
        };

        while let Some(state) = states.next().await {
            if state != ConnectionState::Connecting {
                return state;
            }
        }
        self.current_state()
    }

    fn spawn_run(&self, lifecycle: &mut Lifecycle, epoch: u64) {
        if let Some(previous) = lifecycle.task.take() {
            previous.abort();
        }

        tracing::info!("Connecting to {}", self.shared.config.url);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = TaskState {
            shared: Arc::clone(&self.shared),
            epoch,
            attempts: 0,
            shutdown: shutdown_rx,
        };
        lifecycle.task = Some(tokio::spawn(task.run()));
        lifecycle.shutdown = Some(shutdown_tx);
    }

    /// Close the connection and stop supervising. Publishes `Disconnected`.
    ///
    /// Registry contents are kept; a later `start()` resubscribes them.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.shared.state.halt() {
            tracing::info!("Feed connection stopped");
        }
        if let Some(tx) = lifecycle.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = lifecycle.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                tracing::warn!("Supervisor task did not stop within {:?}, aborting", STOP_GRACE);
                task.abort();
            }
        }
        self.shared.registry.set_forwarding(false);
    }

    /// Lock-free read of the current state.
    pub fn current_state(&self) -> ConnectionState {
        self.shared.state.current()
    }

    pub fn state_stream(&self) -> ConnectionStateStream {
        self.shared.state.subscribe()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.lifecycle.get_mut().task.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

struct TaskState {
    shared: Arc<Shared>,
    epoch: u64,
    attempts: u32,
    shutdown: oneshot::Receiver<()>,
}

impl TaskState {
    fn publish(&self, next: ConnectionState) -> bool {
        self.shared.state.publish(self.epoch, next)
    }

    async fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let mut outbound = shared.outbound.lock().await;

        loop {
            // ── 1. Attempt connection ────────────────────────────────────
            let reason = match self.attempt_connect().await {
                Ok(Some(mut conn)) => {
                    let reason = self.run_connected(&mut *conn, &mut outbound).await;
                    self.shared.registry.set_forwarding(false);
                    reason
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::error!("Feed connection failed: {}", e);
                    DisconnectReason::Error(e.to_string())
                }
            };

            // ── 2. Post-disconnect decision ──────────────────────────────
            let rate_limited = match reason {
                DisconnectReason::Shutdown => return,
                DisconnectReason::RateLimited => true,
                DisconnectReason::Error(reason) => {
                    tracing::debug!("Connection lost: {}", reason);
                    false
                }
            };

            let backoff = &self.shared.config.backoff;
            if !backoff.allows(self.attempts) {
                tracing::error!(
                    "Giving up after {} reconnect attempt(s)",
                    self.attempts
                );
                self.publish(ConnectionState::Failed);
                return;
            }

            // ── 3. Backoff ───────────────────────────────────────────────
            self.attempts += 1;
            let delay = backoff.delay_for_attempt(self.attempts, rate_limited);
            let max_attempts = backoff.max_attempts;
            if !self.publish(ConnectionState::Reconnecting) {
                return;
            }
            tracing::info!(
                "Reconnect attempt {}/{} in {}ms{}",
                self.attempts,
                max_attempts,
                delay.as_millis(),
                if rate_limited { " (rate-limited)" } else { "" }
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut self.shutdown => return,
            }
        }
    }

    /// One time-bounded connect. `Ok(None)` means shutdown was requested meanwhile.
    async fn attempt_connect(&mut self) -> Result<Option<Box<dyn Connection>>, WsError> {
        let config = &self.shared.config;
        let connect = tokio::time::timeout(
            config.connect_timeout,
            self.shared.transport.connect(&config.url),
        );

        tokio::select! {
            result = connect => match result {
                Ok(conn) => conn.map(Some),
                Err(_) => Err(WsError::Timeout),
            },
            _ = &mut self.shutdown => Ok(None),
        }
    }

    /// The inner connected loop — runs until the connection breaks.
    async fn run_connected(
        &mut self,
        conn: &mut dyn Connection,
        outbound: &mut mpsc::UnboundedReceiver<MessageOut>,
    ) -> DisconnectReason {
        // Deltas from here on are queued; the snapshot below already reflects
        // every one queued before it.
        self.shared.registry.set_forwarding(true);
        while outbound.try_recv().is_ok() {}

        let upstream = self.shared.registry.upstream_set();
        if !upstream.is_empty() {
            tracing::info!("Subscribing to {} coin(s)", upstream.len());
            let batch = MessageOut::subscribe(upstream.iter().cloned());
            if let Err(e) = send_msg(conn, &batch).await {
                tracing::warn!("Initial subscribe failed: {}", e);
                conn.close().await;
                return DisconnectReason::Error(e.to_string());
            }
        }
        let mut live = LiveSubscriptions::new();
        live.reset(upstream);

        self.shared.tracker.begin_session();
        if !self.publish(ConnectionState::Connected) {
            conn.close().await;
            return DisconnectReason::Shutdown;
        }
        self.attempts = 0;

        let pong_timeout = self.shared.config.pong_timeout;
        let mut ping_interval = self.shared.config.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut awaiting_pong = false;
        let pong_sleep = tokio::time::sleep(pong_timeout);
        tokio::pin!(pong_sleep);

        loop {
            tokio::select! {
                // ── a) Incoming frame ────────────────────────────────────
                frame = conn.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if self.handle_text(&text) {
                            awaiting_pong = false;
                        }
                    }
                    Some(Ok(Frame::Closed { code, reason })) => {
                        tracing::info!("Feed closed the connection: code={:?} reason={}", code, reason);
                        return if code == Some(RATE_LIMITED_CLOSE) {
                            DisconnectReason::RateLimited
                        } else {
                            DisconnectReason::Error(format!("closed by feed: {}", reason))
                        };
                    }
                    Some(Err(e)) => {
                        tracing::error!("Feed connection error: {}", e);
                        return DisconnectReason::Error(e.to_string());
                    }
                    None => return DisconnectReason::Error("stream ended".into()),
                },

                // ── b) Registry delta ────────────────────────────────────
                cmd = outbound.recv() => match cmd {
                    Some(msg) => {
                        let Some(msg) = filter_live(&mut live, msg) else {
                            continue;
                        };
                        if let Err(e) = send_msg(conn, &msg).await {
                            tracing::warn!("Send failed: {}", e);
                            conn.close().await;
                            return DisconnectReason::Error(e.to_string());
                        }
                    }
                    None => {
                        // Registry dropped — engine is gone.
                        conn.close().await;
                        return DisconnectReason::Shutdown;
                    }
                },

                // ── c) Ping interval ─────────────────────────────────────
                _ = next_ping(&mut ping_interval) => {
                    if let Err(e) = send_msg(conn, &MessageOut::ping()).await {
                        tracing::warn!("Failed to send ping: {}", e);
                        conn.close().await;
                        return DisconnectReason::Error(e.to_string());
                    }
                    if !awaiting_pong {
                        awaiting_pong = true;
                        pong_sleep.as_mut().reset(Instant::now() + pong_timeout);
                    }
                }

                // ── d) Pong timeout ──────────────────────────────────────
                () = &mut pong_sleep, if awaiting_pong => {
                    tracing::warn!("Pong timeout — no response within {:?}", pong_timeout);
                    conn.close().await;
                    return DisconnectReason::Error("pong timeout".into());
                }

                // ── e) Stop requested ────────────────────────────────────
                _ = &mut self.shutdown => {
                    conn.close().await;
                    return DisconnectReason::Shutdown;
                }
            }
        }
    }

    /// Decode one text frame. Returns `true` for a pong.
    fn handle_text(&self, text: &str) -> bool {
        match MessageIn::parse(text) {
            Ok(MessageIn::Tick(payload)) => {
                match Tick::try_from(payload.data) {
                    Ok(tick) => {
                        if let Some(update) = self.shared.tracker.annotate_if_newer(&tick) {
                            self.shared.distributor.publish(update);
                        }
                    }
                    Err(e) => tracing::warn!("Dropping invalid tick: {}", e),
                }
                false
            }
            Ok(MessageIn::Pong) => true,
            Ok(MessageIn::Error(payload)) => {
                tracing::warn!(
                    "Feed reported an error{}: {}",
                    payload.code.map(|c| format!(" [{c}]")).unwrap_or_default(),
                    payload.message
                );
                false
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {} — raw: {}", e, text);
                false
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn send_msg(conn: &mut dyn Connection, msg: &MessageOut) -> Result<(), WsError> {
    conn.send(msg.to_json()?).await
}

async fn next_ping(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Reduce a registry delta to the coins that change on the live socket.
fn filter_live(live: &mut LiveSubscriptions, msg: MessageOut) -> Option<MessageOut> {
    let filtered = match &msg {
        MessageOut::Subscribe { params } => live
            .track_subscribe(params)
            .map(|params| MessageOut::Subscribe { params }),
        MessageOut::Unsubscribe { params } => live
            .track_unsubscribe(params)
            .map(|params| MessageOut::Unsubscribe { params }),
        MessageOut::Ping => Some(MessageOut::Ping),
    };
    if filtered.is_none() {
        tracing::debug!("Delta already reflected on the live connection: {:?}", msg);
    }
    filtered
}
