// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge event types.

use std::net::SocketAddr;
use std::time::Duration;

use crate::device::DeviceId;

/// Events emitted by a [`BridgeCoordinator`](crate::BridgeCoordinator).
///
/// # Examples
///
/// ```
/// use bondhome_lib::DeviceId;
/// use bondhome_lib::event::BridgeEvent;
///
/// let event = BridgeEvent::UnroutedUpdate {
///     device_id: DeviceId::new("aabbccdd"),
///     topic: "devices/aabbccdd/state".to_string(),
/// };
/// assert!(event.is_dispatch());
/// assert_eq!(event.device_id().map(DeviceId::as_str), Some("aabbccdd"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A device handler was registered.
    DeviceAttached {
        /// The device the handler serves.
        device_id: DeviceId,
    },

    /// A device handler was unregistered.
    DeviceDetached {
        /// The device the handler served.
        device_id: DeviceId,
    },

    /// The push listener was scheduled to start.
    ListenerScheduled {
        /// Delay before the listener binds.
        delay: Duration,
    },

    /// The push listener bound its socket and is receiving.
    ListenerStarted {
        /// The bound local address.
        local_addr: SocketAddr,
    },

    /// The push listener was stopped.
    ListenerStopped,

    /// The push listener could not start.
    ListenerFailed {
        /// Description of the failure.
        error: String,
    },

    /// The bridge answered a keep-alive.
    BridgeOnline {
        /// Bond ID reported by the bridge.
        bridge_id: Option<String>,
        /// Firmware version reported by the bridge.
        firmware_version: Option<String>,
    },

    /// A push update was handed to its device handler.
    UpdateDelivered {
        /// The device that received the update.
        device_id: DeviceId,
    },

    /// A push update named a device with no registered handler.
    UnroutedUpdate {
        /// The device named by the update.
        device_id: DeviceId,
        /// The full topic of the update.
        topic: String,
    },
}

impl BridgeEvent {
    /// Returns the device this event is about, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::DeviceAttached { device_id }
            | Self::DeviceDetached { device_id }
            | Self::UpdateDelivered { device_id }
            | Self::UnroutedUpdate { device_id, .. } => Some(device_id),
            _ => None,
        }
    }

    /// Returns `true` for device attach/detach events.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::DeviceAttached { .. } | Self::DeviceDetached { .. }
        )
    }

    /// Returns `true` for listener state events.
    #[must_use]
    pub fn is_listener(&self) -> bool {
        matches!(
            self,
            Self::ListenerScheduled { .. }
                | Self::ListenerStarted { .. }
                | Self::ListenerStopped
                | Self::ListenerFailed { .. }
        )
    }

    /// Returns `true` for update delivery events.
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        matches!(
            self,
            Self::UpdateDelivered { .. } | Self::UnroutedUpdate { .. }
        )
    }
}
