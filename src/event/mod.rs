// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Events published by a bridge coordinator.
//!
//! Subscribers see device attach/detach, listener lifecycle changes and the
//! outcome of each dispatched update, including updates that matched no
//! registered device.
//!
//! # Examples
//!
//! ```
//! use bondhome_lib::{BridgeConfig, BridgeCoordinator};
//! use bondhome_lib::event::BridgeEvent;
//!
//! # fn example() -> bondhome_lib::Result<()> {
//! let bridge = BridgeCoordinator::new(BridgeConfig::default())?;
//! let mut events = bridge.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = events.blocking_recv() {
//!         if let BridgeEvent::UnroutedUpdate { device_id, .. } = event {
//!             println!("no handler for {device_id}");
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```

mod bridge_event;
mod event_bus;

pub use bridge_event::BridgeEvent;
pub use event_bus::EventBus;
