// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state reported by the bridge.
//!
//! The dispatch layer treats [`DeviceState`] as an opaque payload and hands
//! it to the matching device handler unchanged. The typed accessors are for
//! handlers that map it onto their own channels.

mod device_state;

pub use device_state::{Breeze, DeviceState, Direction};
