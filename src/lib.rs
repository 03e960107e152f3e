// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `BondHome` Lib - Push updates from Bond bridges.
//!
//! A Bond bridge announces every device state change on its local network
//! with the Bond Push UDP Protocol (BPUP). This library receives those
//! datagrams and routes each one to the handler of the device it describes.
//!
//! # Features
//!
//! - **Lifecycle-driven listener**: the UDP listener starts after a warm-up
//!   delay once the first device is attached and stops when the last one is
//!   detached
//! - **Case-insensitive routing**: `devices/ABC123/state` reaches the handler
//!   registered as `abc123`
//! - **Keep-alives**: optional keep-alive datagrams keep the bridge pushing
//! - **Events**: attach/detach, listener state and unrouted updates on a
//!   broadcast channel
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bondhome_lib::{BridgeConfig, BridgeCoordinator, DeviceId, DeviceState, StateSink};
//!
//! struct Ceiling {
//!     id: DeviceId,
//! }
//!
//! impl StateSink for Ceiling {
//!     fn device_id(&self) -> DeviceId {
//!         self.id.clone()
//!     }
//!
//!     fn apply_state(&self, state: &DeviceState) {
//!         if let Some(on) = state.power_on() {
//!             println!("{} power: {on}", self.id);
//!         }
//!     }
//! }
//!
//! fn main() -> bondhome_lib::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .bridge_id("ZZBL12345")
//!         .bridge_addr("192.168.1.60".parse().unwrap())
//!         .warmup_delay(Duration::from_secs(5))
//!         .build()?;
//!     let bridge = BridgeCoordinator::new(config)?;
//!
//!     let fan: Arc<dyn StateSink> = Arc::new(Ceiling { id: DeviceId::new("abc123") });
//!     bridge.on_device_attached(&fan)?;
//!
//!     // ... later, when the host disposes the device
//!     bridge.on_device_detached(&fan);
//!     Ok(())
//! }
//! ```

pub mod bridge;
mod config;
mod device;
pub mod error;
pub mod event;
pub mod protocol;
pub mod state;

pub use bridge::{
    AddOutcome, BridgeCoordinator, BridgeStatus, DeviceRegistry, ForwardOutcome, RemoveOutcome,
};
pub use config::{BOND_BPUP_PORT, BridgeConfig, BridgeConfigBuilder};
pub use device::{DeviceAttachSink, DeviceId, StateSink};
pub use error::{CodecError, Error, ListenerError, RegistryError, Result};
pub use protocol::{ListenerState, ListenerStats, PushUpdate};
pub use state::{Breeze, DeviceState, Direction};
