// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge coordination.
//!
//! - [`DeviceRegistry`]: the handlers attached to a bridge
//! - [`BridgeCoordinator`]: listener lifecycle and update routing

mod coordinator;
mod registry;

pub use coordinator::{BridgeCoordinator, BridgeStatus, ForwardOutcome};
pub use registry::{AddOutcome, DeviceRegistry, RemoveOutcome};
