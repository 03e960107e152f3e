// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge coordinator.
//!
//! Ties the device registry to the push listener: the listener exists only
//! while at least one device is attached, and every update it receives is
//! routed to the handler of the device named in its topic.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::broadcast;

use crate::config::BridgeConfig;
use crate::device::{DeviceAttachSink, DeviceId, StateSink};
use crate::error::{CodecError, ListenerError, Result};
use crate::event::{BridgeEvent, EventBus};
use crate::protocol::{
    BridgeHello, ListenerState, ListenerStats, PushListener, PushUpdate, UpdateSink,
};

use super::registry::{AddOutcome, DeviceRegistry, RemoveOutcome};

/// Name of the listener runtime's worker threads.
const LISTENER_THREAD_NAME: &str = "bond-push";

/// Health of a bridge as seen through its push feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BridgeStatus {
    /// Nothing heard from the bridge yet.
    #[default]
    Unknown,
    /// The bridge answered a keep-alive.
    Online,
    /// The push listener could not start.
    Degraded(String),
}

/// Result of routing one push update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The update was applied by the device's handler.
    Delivered(DeviceId),
    /// No live handler is registered for the device.
    Unrouted(DeviceId),
}

impl ForwardOutcome {
    /// Returns the device the update was addressed to.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::Delivered(id) | Self::Unrouted(id) => id,
        }
    }

    /// Returns `true` if a handler received the update.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Routing state shared with the listener.
///
/// Holds no reference to the listener, so the listener can reach the
/// coordinator without owning it.
struct Dispatcher {
    registry: DeviceRegistry,
    events: EventBus,
    status: RwLock<BridgeStatus>,
    bridge_id: Option<String>,
}

impl Dispatcher {
    fn dispatch(&self, update: &PushUpdate) -> std::result::Result<ForwardOutcome, CodecError> {
        let device_id = update.device_id()?;

        let Some(handler) = self.registry.get(&device_id) else {
            tracing::debug!(
                device = %device_id,
                topic = %update.topic(),
                "No handler for push update"
            );
            self.events.publish(BridgeEvent::UnroutedUpdate {
                device_id: device_id.clone(),
                topic: update.topic().to_string(),
            });
            return Ok(ForwardOutcome::Unrouted(device_id));
        };

        tracing::debug!(device = %device_id, topic = %update.topic(), "Delivering push update");
        handler.apply_state(update.device_state());
        self.events.publish(BridgeEvent::UpdateDelivered {
            device_id: device_id.clone(),
        });
        Ok(ForwardOutcome::Delivered(device_id))
    }
}

impl UpdateSink for Dispatcher {
    fn forward(&self, update: &PushUpdate) {
        if let Err(e) = self.dispatch(update) {
            tracing::debug!(topic = %update.topic(), error = %e, "Dropping push update");
        }
    }

    fn keep_alive_acknowledged(&self, hello: &BridgeHello) {
        if let (Some(expected), Some(actual)) = (&self.bridge_id, &hello.bridge_id)
            && !expected.eq_ignore_ascii_case(actual)
        {
            tracing::warn!(
                expected = %expected,
                actual = %actual,
                "Keep-alive answered by a different bridge"
            );
        }

        let previous = std::mem::replace(&mut *self.status.write(), BridgeStatus::Online);
        if previous != BridgeStatus::Online {
            tracing::info!(
                bridge = ?hello.bridge_id,
                firmware = ?hello.firmware_version,
                "Bridge online"
            );
            self.events.publish(BridgeEvent::BridgeOnline {
                bridge_id: hello.bridge_id.clone(),
                firmware_version: hello.firmware_version.clone(),
            });
        }
    }

    fn listener_started(&self, local_addr: SocketAddr) {
        {
            let mut status = self.status.write();
            if matches!(*status, BridgeStatus::Degraded(_)) {
                *status = BridgeStatus::Unknown;
            }
        }
        self.events
            .publish(BridgeEvent::ListenerStarted { local_addr });
    }

    fn listener_failed(&self, error: &ListenerError) {
        let error = error.to_string();
        *self.status.write() = BridgeStatus::Degraded(error.clone());
        self.events.publish(BridgeEvent::ListenerFailed { error });
    }
}

/// Runtime the listener tasks run on.
enum ListenerRuntime {
    /// Created and shut down by the coordinator.
    Owned(Runtime),
    /// Provided by the host.
    Shared(Handle),
}

impl ListenerRuntime {
    fn handle(&self) -> Handle {
        match self {
            Self::Owned(runtime) => runtime.handle().clone(),
            Self::Shared(handle) => handle.clone(),
        }
    }
}

/// Coordinates the devices of one Bond bridge with its push feed.
///
/// The host calls [`on_device_attached`](Self::on_device_attached) and
/// [`on_device_detached`](Self::on_device_detached) from its lifecycle
/// threads. The first attach schedules a push listener that binds after the
/// configured warm-up delay; the last detach stops it. Updates received in
/// between are routed by device identifier, ignoring case.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use bondhome_lib::{
///     BridgeConfig, BridgeCoordinator, DeviceId, DeviceState, StateSink,
/// };
///
/// struct Fan {
///     id: DeviceId,
/// }
///
/// impl StateSink for Fan {
///     fn device_id(&self) -> DeviceId {
///         self.id.clone()
///     }
///
///     fn apply_state(&self, state: &DeviceState) {
///         println!("{} speed is now {:?}", self.id, state.speed);
///     }
/// }
///
/// # fn example() -> bondhome_lib::Result<()> {
/// let bridge = BridgeCoordinator::new(BridgeConfig::default())?;
/// let fan: Arc<dyn StateSink> = Arc::new(Fan { id: DeviceId::new("abc123") });
///
/// bridge.on_device_attached(&fan)?;
/// // Push updates for devices/abc123/... now reach the fan.
/// bridge.on_device_detached(&fan);
/// # Ok(())
/// # }
/// ```
pub struct BridgeCoordinator {
    config: BridgeConfig,
    dispatcher: Arc<Dispatcher>,
    /// Lifecycle lock; also holds the current listener.
    listener: Mutex<Option<PushListener>>,
    runtime: Option<ListenerRuntime>,
}

impl BridgeCoordinator {
    /// Creates a coordinator with its own listener runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the runtime
    /// threads cannot be started.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.listener_threads())
            .thread_name(LISTENER_THREAD_NAME)
            .enable_io()
            .enable_time()
            .build()
            .map_err(ListenerError::Runtime)?;
        Ok(Self::with_listener_runtime(
            config,
            ListenerRuntime::Owned(runtime),
        ))
    }

    /// Creates a coordinator whose listener runs on a runtime the host owns.
    ///
    /// The runtime must have IO and time drivers enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_runtime(config: BridgeConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_listener_runtime(
            config,
            ListenerRuntime::Shared(runtime),
        ))
    }

    fn with_listener_runtime(config: BridgeConfig, runtime: ListenerRuntime) -> Self {
        let dispatcher = Dispatcher {
            registry: DeviceRegistry::new(),
            events: EventBus::new(),
            status: RwLock::new(BridgeStatus::Unknown),
            bridge_id: config.bridge_id().map(str::to_string),
        };
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            listener: Mutex::new(None),
            runtime: Some(runtime),
        }
    }

    /// Registers a device handler.
    ///
    /// The first handler attached to an empty bridge schedules the push
    /// listener. Attaching a handler that is already registered changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRegistration`](crate::error::RegistryError)
    /// if another handler is registered for the same device.
    pub fn on_device_attached(&self, handler: &Arc<dyn StateSink>) -> Result<AddOutcome> {
        let mut listener = self.listener.lock();

        let outcome = self.dispatcher.registry.add(handler).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected device attach");
        })?;

        if let AddOutcome::Added { first } = outcome {
            let device_id = handler.device_id();
            tracing::debug!(device = %device_id, "Device attached");
            self.dispatcher
                .events
                .publish(BridgeEvent::DeviceAttached { device_id });
            if first {
                self.start_listener(&mut listener);
            }
        }
        Ok(outcome)
    }

    /// Unregisters a device handler.
    ///
    /// Detaching the last handler stops the push listener. Detaching a
    /// handler that is not registered changes nothing.
    pub fn on_device_detached(&self, handler: &Arc<dyn StateSink>) -> RemoveOutcome {
        let listener = self.listener.lock();

        let outcome = self.dispatcher.registry.remove(handler);
        if outcome.removed {
            let device_id = handler.device_id();
            tracing::debug!(device = %device_id, "Device detached");
            self.dispatcher
                .events
                .publish(BridgeEvent::DeviceDetached { device_id });
        }
        if outcome.emptied() {
            Self::stop_listener(listener.as_ref(), &self.dispatcher.events);
        }
        outcome
    }

    /// Routes a push update to the handler of the device named in its topic.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedTopic`] if the topic names no device.
    pub fn forward(&self, update: &PushUpdate) -> std::result::Result<ForwardOutcome, CodecError> {
        self.dispatcher.dispatch(update)
    }

    /// Stops the push listener regardless of attached devices.
    ///
    /// Idempotent. Also runs when the coordinator is dropped.
    pub fn dispose(&self) {
        let listener = self.listener.lock();
        Self::stop_listener(listener.as_ref(), &self.dispatcher.events);
    }

    fn start_listener(&self, slot: &mut Option<PushListener>) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        if let Some(previous) = slot.take() {
            previous.shutdown();
        }

        let sink: Arc<dyn UpdateSink> = self.dispatcher.clone();
        let listener = match PushListener::new(self.config.clone(), runtime.handle(), sink) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create push listener");
                return;
            }
        };
        let delay = self.config.warmup_delay();
        match listener.schedule_after(delay) {
            Ok(()) => {
                tracing::info!(
                    delay_secs = delay.as_secs_f64(),
                    port = self.config.listen_port(),
                    "Push listener scheduled"
                );
                self.dispatcher
                    .events
                    .publish(BridgeEvent::ListenerScheduled { delay });
            }
            Err(e) => tracing::warn!(error = %e, "Failed to schedule push listener"),
        }
        *slot = Some(listener);
    }

    fn stop_listener(listener: Option<&PushListener>, events: &EventBus) {
        let Some(listener) = listener else {
            return;
        };
        if listener.state() == ListenerState::ShutDown {
            return;
        }
        listener.cancel();
        listener.shutdown();
        tracing::info!("Push listener stopped");
        events.publish(BridgeEvent::ListenerStopped);
    }

    /// Returns the bridge status.
    #[must_use]
    pub fn status(&self) -> BridgeStatus {
        self.dispatcher.status.read().clone()
    }

    /// Returns the state of the current listener.
    ///
    /// [`ListenerState::Unscheduled`] before the first attach.
    #[must_use]
    pub fn listener_state(&self) -> ListenerState {
        self.listener
            .lock()
            .as_ref()
            .map_or(ListenerState::Unscheduled, PushListener::state)
    }

    /// Returns the bound address of the listener while it runs.
    #[must_use]
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .as_ref()
            .and_then(PushListener::local_addr)
    }

    /// Returns the counters of the current listener.
    #[must_use]
    pub fn listener_stats(&self) -> ListenerStats {
        self.listener
            .lock()
            .as_ref()
            .map(PushListener::stats)
            .unwrap_or_default()
    }

    /// Returns the number of attached devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.dispatcher.registry.len()
    }

    /// Returns the identifiers of the attached devices with a live handler.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceId> {
        self.dispatcher
            .registry
            .snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Subscribes to bridge events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.dispatcher.events.subscribe()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl DeviceAttachSink for BridgeCoordinator {
    fn on_device_attached(&self, handler: &Arc<dyn StateSink>) -> Result<AddOutcome> {
        Self::on_device_attached(self, handler)
    }

    fn on_device_detached(&self, handler: &Arc<dyn StateSink>) -> RemoveOutcome {
        Self::on_device_detached(self, handler)
    }
}

impl Drop for BridgeCoordinator {
    fn drop(&mut self) {
        self.dispose();
        if let Some(ListenerRuntime::Owned(runtime)) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for BridgeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCoordinator")
            .field("bridge_id", &self.config.bridge_id())
            .field("devices", &self.device_count())
            .field("listener", &self.listener_state())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
