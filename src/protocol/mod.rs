// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bond Push UDP Protocol (BPUP).
//!
//! A Bond bridge pushes a JSON datagram to UDP port 30007 whenever a device
//! changes state. This module decodes those datagrams and runs the listener
//! that receives them.
//!
//! - [`decode`] / [`decode_datagram`]: datagram to [`PushUpdate`]
//! - [`PushListener`]: delayed, cancellable receive loop feeding an [`UpdateSink`]

mod codec;
mod listener;

pub use codec::{BridgeHello, Datagram, PushUpdate, decode, decode_datagram, device_id_from_topic};
pub use listener::{ListenerState, ListenerStats, PushListener, UpdateSink};
