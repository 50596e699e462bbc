//! Termination signalling and the cancellable delayed stop.
//!
//! Two pieces of shared state drive shutdown:
//!
//! - [`ShutdownSignal`]: the one-way "stop now" signal the accept loop and
//!   `await_termination()` listen on.
//! - [`PendingShutdown`]: the armed flag behind the HTTP shutdown endpoint.
//!   A shutdown request arms the flag and schedules a delayed stop; a
//!   cancellation (HTTP or programmatic) disarms it before the timer reads
//!   it.
//!
//! Each call to [`schedule_stop`] spawns its own independent timer. If the
//! shutdown endpoint is hit repeatedly before any timer fires, the timers
//! race and any one of them that finds the flag still armed stops the
//! server; a cancellation clears the single shared flag and thereby disarms
//! all of them. Cancellation is best effort: a cancel that loses the race
//! with a timer's read has no effect.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::broadcast;

/// A clonable signal used to trigger and await server termination.
///
/// All clones share the same state; triggering any clone wakes every
/// waiter. Triggering is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Triggers the signal, waking all waiters. Idempotent.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No receivers is fine; the flag alone satisfies late waiters.
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` if the signal has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Returns a future that completes when the signal is triggered,
    /// immediately if it already has been.
    pub fn recv(&self) -> ShutdownReceiver {
        let triggered = Arc::clone(&self.triggered);
        let mut receiver = self.sender.subscribe();
        ShutdownReceiver {
            inner: Box::pin(async move {
                if triggered.load(Ordering::SeqCst) {
                    return;
                }
                // The channel only ever carries the trigger notification,
                // so any outcome (a value, lag, or closure) means wake.
                let _ = receiver.recv().await;
            }),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Future created by [`ShutdownSignal::recv()`].
pub struct ShutdownReceiver {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Future for ShutdownReceiver {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// The armed-shutdown flag shared between the shutdown endpoint, the
/// delayed-stop timers, and the embedding application.
///
/// At most one shutdown is conceptually "in flight"; arming while already
/// armed is a no-op, as is cancelling while idle.
#[derive(Debug, Clone, Default)]
pub struct PendingShutdown {
    armed: Arc<AtomicBool>,
}

impl PendingShutdown {
    /// Creates a disarmed flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the pending shutdown.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Cancels any pending shutdown. No-op if nothing is pending.
    pub fn cancel(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if a shutdown is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Spawns an independent timer that stops the server after `delay` unless
/// the pending shutdown has been cancelled first.
///
/// Failures on this path have no caller to report to; anything unexpected
/// is logged and swallowed.
pub fn schedule_stop(pending: PendingShutdown, signal: ShutdownSignal, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if pending.is_armed() {
            tracing::info!("shutdown delay elapsed, stopping server");
            signal.trigger();
        } else {
            tracing::debug!("shutdown was cancelled before the delay elapsed");
        }
    });
}

/// Tracks in-flight connections so shutdown can drain them.
///
/// Each accepted connection holds a [`ConnectionToken`]; when the last
/// token drops, waiters on [`ConnectionTracker::wait_for_idle`] resume.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<std::sync::atomic::AtomicUsize>,
    notify: Arc<tokio::sync::Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no active connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Acquires a token for a new connection.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until all connections have closed. Completes immediately if
    /// none are active.
    pub async fn wait_for_idle(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            self.notify.notified().await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Token representing one active connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<std::sync::atomic::AtomicUsize>,
    notify: Arc<tokio::sync::Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        let prev = self.active.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }
}
