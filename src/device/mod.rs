// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device handler capabilities.
//!
//! The bridge never owns the devices it feeds. A host framework creates one
//! handler per child device and hands the bridge an `Arc` to it; the bridge
//! keeps only a weak reference and talks to it through [`StateSink`].
//! Lifecycle notifications flow the other way through [`DeviceAttachSink`].

mod device_id;

pub use device_id::DeviceId;

use std::sync::Arc;

use crate::bridge::{AddOutcome, RemoveOutcome};
use crate::error::Result;
use crate::state::DeviceState;

/// A device handler that accepts pushed state.
///
/// # Examples
///
/// ```
/// use bondhome_lib::{DeviceId, DeviceState, StateSink};
/// use parking_lot::Mutex;
///
/// struct Fan {
///     id: DeviceId,
///     last: Mutex<Option<DeviceState>>,
/// }
///
/// impl StateSink for Fan {
///     fn device_id(&self) -> DeviceId {
///         self.id.clone()
///     }
///
///     fn apply_state(&self, state: &DeviceState) {
///         *self.last.lock() = Some(state.clone());
///     }
/// }
/// ```
pub trait StateSink: Send + Sync {
    /// Returns the identifier of the device this handler is responsible for.
    ///
    /// Must return the same identifier for the whole lifetime of the handler.
    fn device_id(&self) -> DeviceId;

    /// Applies a state snapshot pushed by the bridge.
    ///
    /// Called from the listener thread. Implementations should not block.
    fn apply_state(&self, state: &DeviceState);
}

/// Receiver of device handler lifecycle events.
///
/// Implemented by [`BridgeCoordinator`](crate::BridgeCoordinator); the host
/// framework calls it when a child handler is initialized or disposed.
pub trait DeviceAttachSink {
    /// A device handler became ready.
    ///
    /// # Errors
    ///
    /// Returns an error if another handler is already registered for the
    /// same device.
    fn on_device_attached(&self, handler: &Arc<dyn StateSink>) -> Result<AddOutcome>;

    /// A device handler is going away.
    fn on_device_detached(&self, handler: &Arc<dyn StateSink>) -> RemoveOutcome;
}
