// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push update listener.
//!
//! The listener is a delayed, cancellable task that binds the BPUP port and
//! feeds every decoded datagram to an [`UpdateSink`].
//!
//! # Lifecycle
//!
//! ```text
//! Unscheduled ──schedule_after()──► Scheduled ──delay elapsed, bound──► Running
//!      │                               │                                   │
//!      └────────────cancel()───────────┴──────────────cancel()─────────────┴──► Cancelled
//!
//! any state ──shutdown()──► ShutDown        Scheduled ──bind failed──► ShutDown
//! ```
//!
//! A listener runs at most once. To start receiving again after a shutdown,
//! create a new listener; it binds a fresh socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::Poll;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::error::{ListenerError, Result};

use super::codec::{BridgeHello, Datagram, PushUpdate, decode_datagram};

/// Payload of a BPUP keep-alive.
const KEEPALIVE_PAYLOAD: &[u8] = b"\n";

/// Pause after a failed receive before trying again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// State of a [`PushListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Created, not scheduled yet.
    Unscheduled,
    /// Waiting for the warm-up delay to elapse.
    Scheduled,
    /// Socket bound, receiving datagrams.
    Running,
    /// Asked to stop; the task is winding down.
    Cancelled,
    /// Stopped for good, socket released.
    ShutDown,
}

impl ListenerState {
    /// Returns `true` if the listener is receiving datagrams.
    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// Returns `true` if the listener will never receive again.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Cancelled | Self::ShutDown)
    }
}

/// Receiver of everything the listener decodes.
///
/// Called from the listener thread.
pub trait UpdateSink: Send + Sync {
    /// A push update was decoded.
    fn forward(&self, update: &PushUpdate);

    /// The bridge acknowledged a keep-alive.
    fn keep_alive_acknowledged(&self, _hello: &BridgeHello) {}

    /// The listener bound its socket and started receiving.
    fn listener_started(&self, _local_addr: SocketAddr) {}

    /// The listener could not start. Reported at most once per listener.
    fn listener_failed(&self, _error: &ListenerError) {}
}

/// Counters of a listener, as returned by [`PushListener::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Datagrams received, valid or not.
    pub datagrams_received: u64,
    /// Updates handed to the sink.
    pub updates_forwarded: u64,
    /// Keep-alive acknowledgements received.
    pub keepalive_acks: u64,
    /// Datagrams dropped because they could not be decoded or carried an error status.
    pub rejected: u64,
    /// When the last datagram was received.
    pub last_datagram_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams_received: AtomicU64,
    updates_forwarded: AtomicU64,
    keepalive_acks: AtomicU64,
    rejected: AtomicU64,
    last_datagram_at: Mutex<Option<DateTime<Utc>>>,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            updates_forwarded: self.updates_forwarded.load(Ordering::Relaxed),
            keepalive_acks: self.keepalive_acks.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            last_datagram_at: *self.last_datagram_at.lock(),
        }
    }
}

/// State shared between a [`PushListener`] and its task.
struct Shared {
    config: BridgeConfig,
    sink: Arc<dyn UpdateSink>,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
    /// The only strong reference to the bound socket; the task holds a `Weak`.
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    counters: Counters,
}

impl Shared {
    /// Moves the state from `from` to `to`; returns `false` if it was elsewhere.
    fn transition(&self, from: ListenerState, to: ListenerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Closes the socket, freeing the port for the next listener.
    fn release_socket(&self) {
        self.socket.lock().take();
        self.local_addr.lock().take();
    }

    fn handle_datagram(&self, payload: &[u8], from: SocketAddr) {
        self.counters
            .datagrams_received
            .fetch_add(1, Ordering::Relaxed);
        *self.counters.last_datagram_at.lock() = Some(Utc::now());

        tracing::trace!(
            %from,
            len = payload.len(),
            payload = %String::from_utf8_lossy(payload),
            "Push datagram received"
        );

        match decode_datagram(payload) {
            Ok(Datagram::Update(update)) => {
                if let Some(status) = update.status()
                    && !(200..300).contains(&status)
                {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        topic = %update.topic(),
                        status,
                        "Ignoring push update with error status"
                    );
                    return;
                }
                self.counters
                    .updates_forwarded
                    .fetch_add(1, Ordering::Relaxed);
                self.sink.forward(&update);
            }
            Ok(Datagram::KeepAliveAck(hello)) => {
                self.counters.keepalive_acks.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(bridge = ?hello.bridge_id, "Keep-alive acknowledged");
                self.sink.keep_alive_acknowledged(&hello);
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%from, error = %e, "Dropping malformed push datagram");
            }
        }
    }
}

/// Listener for Bond push updates.
///
/// Owns its socket and its task; nothing else touches either. The port is
/// released by the time [`shutdown`](Self::shutdown) returns. Dropping the
/// listener shuts it down.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use bondhome_lib::BridgeConfig;
/// use bondhome_lib::protocol::{PushListener, PushUpdate, UpdateSink};
///
/// struct Printer;
///
/// impl UpdateSink for Printer {
///     fn forward(&self, update: &PushUpdate) {
///         println!("{}: {:?}", update.topic(), update.device_state());
///     }
/// }
///
/// # async fn example() -> bondhome_lib::Result<()> {
/// let listener = PushListener::new(
///     BridgeConfig::default(),
///     tokio::runtime::Handle::current(),
///     Arc::new(Printer),
/// )?;
/// listener.schedule_after(Duration::from_secs(30))?;
/// // ...
/// listener.cancel();
/// listener.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct PushListener {
    shared: Arc<Shared>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushListener {
    /// Creates an unscheduled listener.
    ///
    /// The task will run on `runtime`, which should be dedicated to listeners
    /// so the blocking receive never competes with the host's own tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// if `config` does not pass [`BridgeConfig::validate`].
    pub fn new(config: BridgeConfig, runtime: Handle, sink: Arc<dyn UpdateSink>) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ListenerState::Unscheduled);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                sink,
                cancel: CancellationToken::new(),
                state,
                socket: Mutex::new(None),
                local_addr: Mutex::new(None),
                counters: Counters::default(),
            }),
            runtime,
            task: Mutex::new(None),
        })
    }

    /// Schedules the listener to bind and start receiving after `delay`.
    ///
    /// Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::InvalidTransition`] unless the listener is
    /// [`ListenerState::Unscheduled`].
    pub fn schedule_after(&self, delay: Duration) -> std::result::Result<(), ListenerError> {
        let mut from = ListenerState::Unscheduled;
        let scheduled = self.shared.state.send_if_modified(|state| {
            from = *state;
            if *state == ListenerState::Unscheduled {
                *state = ListenerState::Scheduled;
                true
            } else {
                false
            }
        });
        if !scheduled {
            return Err(ListenerError::InvalidTransition { from });
        }

        tracing::debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Push listener scheduled"
        );
        let task = self.runtime.spawn(run(Arc::clone(&self.shared), delay));
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Requests the listener to stop.
    ///
    /// Interrupts a pending delay or a blocked receive. Safe to call in any
    /// state and more than once.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        let cancelled = self.shared.state.send_if_modified(|state| match state {
            ListenerState::Unscheduled | ListenerState::Scheduled | ListenerState::Running => {
                *state = ListenerState::Cancelled;
                true
            }
            ListenerState::Cancelled | ListenerState::ShutDown => false,
        });
        if cancelled {
            tracing::debug!("Push listener cancelled");
        }
    }

    /// Stops the listener and closes its socket.
    ///
    /// The port can be bound again as soon as this returns. Idempotent; safe
    /// whether or not the listener ever ran.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        // State first: a task that binds concurrently then sees ShutDown and
        // releases its own socket.
        let previous = self.shared.state.send_replace(ListenerState::ShutDown);
        self.shared.release_socket();
        if previous != ListenerState::ShutDown {
            tracing::debug!(?previous, "Push listener shut down");
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self.shared.state.borrow()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.shared.state.subscribe()
    }

    /// Returns the bound local address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }

    /// Returns the listener's counters.
    #[must_use]
    pub fn stats(&self) -> ListenerStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PushListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushListener")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// Body of the listener task.
async fn run(shared: Arc<Shared>, delay: Duration) {
    tokio::select! {
        biased;
        () = shared.cancel.cancelled() => return,
        () = tokio::time::sleep(delay) => {}
    }

    let addr = shared.config.listen_addr();
    let socket = match bind_socket(addr) {
        Ok(socket) => socket,
        Err(source) => {
            let error = ListenerError::BindFailure { addr, source };
            tracing::warn!(error = %error, "Push listener could not start");
            if shared.transition(ListenerState::Scheduled, ListenerState::ShutDown) {
                shared.sink.listener_failed(&error);
            }
            return;
        }
    };
    let local_addr = socket.local_addr().unwrap_or(addr);
    let socket = Arc::new(socket);
    let weak_socket = Arc::downgrade(&socket);

    *shared.socket.lock() = Some(socket);
    *shared.local_addr.lock() = Some(local_addr);
    if !shared.transition(ListenerState::Scheduled, ListenerState::Running) {
        shared.release_socket();
        return;
    }
    tracing::info!(%local_addr, "Push listener started");
    shared.sink.listener_started(local_addr);

    receive_loop(&shared, &weak_socket).await;

    shared.release_socket();
    tracing::info!(%local_addr, "Push listener stopped");
}

async fn receive_loop(shared: &Shared, socket: &Weak<UdpSocket>) {
    let mut buf = vec![0u8; shared.config.receive_buffer_size()];
    let mut keepalive = shared.config.keepalive_target().map(|target| {
        let mut interval = tokio::time::interval(shared.config.keepalive_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        (target, interval)
    });

    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            target = next_keepalive(&mut keepalive) => send_keepalive(socket, target),
            result = recv_from(socket, &mut buf) => match result {
                Some(Ok((len, from))) => shared.handle_datagram(&buf[..len], from),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Push socket receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
                None => break,
            },
        }
    }
}

/// Resolves on the next keep-alive tick; never resolves without a bridge address.
async fn next_keepalive(keepalive: &mut Option<(SocketAddr, Interval)>) -> SocketAddr {
    match keepalive {
        Some((target, interval)) => {
            interval.tick().await;
            *target
        }
        None => std::future::pending().await,
    }
}

/// Receives one datagram; `None` once the socket has been released.
///
/// The socket is only borrowed for the duration of each poll, so releasing it
/// closes it immediately even while a receive is pending.
async fn recv_from(
    socket: &Weak<UdpSocket>,
    buf: &mut [u8],
) -> Option<std::io::Result<(usize, SocketAddr)>> {
    let mut read_buf = ReadBuf::new(buf);
    let received = std::future::poll_fn(|cx| {
        let Some(socket) = socket.upgrade() else {
            return Poll::Ready(None);
        };
        socket.poll_recv_from(cx, &mut read_buf).map(Some)
    })
    .await;

    match received? {
        Ok(from) => Some(Ok((read_buf.filled().len(), from))),
        Err(e) => Some(Err(e)),
    }
}

fn send_keepalive(socket: &Weak<UdpSocket>, target: SocketAddr) {
    let Some(socket) = socket.upgrade() else {
        return;
    };
    match socket.try_send_to(KEEPALIVE_PAYLOAD, target) {
        Ok(_) => tracing::trace!(%target, "Keep-alive sent"),
        Err(e) => tracing::warn!(%target, error = %e, "Failed to send keep-alive"),
    }
}

/// Binds the push socket for exclusive use of the port.
fn bind_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(false)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}
