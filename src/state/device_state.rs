// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bond device state snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State of a Bond device as reported by the bridge.
///
/// This is the body of a `devices/<id>/state` push update. Which attributes
/// are present depends on the device type (ceiling fan, fireplace, shades,
/// generic device), so every field is optional. Attributes this library does
/// not know about are kept in [`extra`](Self::extra) rather than rejected.
///
/// # Examples
///
/// ```
/// use bondhome_lib::DeviceState;
///
/// let json = r#"{"_":"7fc1e84b","power":1,"speed":3,"light":0,"direction":-1}"#;
/// let state: DeviceState = serde_json::from_str(json).unwrap();
///
/// assert_eq!(state.power_on(), Some(true));
/// assert_eq!(state.speed, Some(3));
/// assert_eq!(state.light_on(), Some(false));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Hash of the state, changes whenever any attribute changes.
    #[serde(rename = "_", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Main power (0 = off, 1 = on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<u8>,

    /// Seconds left on the auto-off timer, 0 when no timer is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u32>,

    /// Fan speed, 1 to the device's `max_speed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,

    /// Breeze mode as `[enabled, mean, variability]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breeze: Option<[u8; 3]>,

    /// Fan direction (1 = summer, -1 = winter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<i8>,

    /// Light power (0 = off, 1 = on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<u8>,

    /// Light brightness (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    /// Up light power for fans with two light kits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_light: Option<u8>,

    /// Up light brightness (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_light_brightness: Option<u8>,

    /// Down light power for fans with two light kits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_light: Option<u8>,

    /// Down light brightness (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_light_brightness: Option<u8>,

    /// Fireplace flame height (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flame: Option<u8>,

    /// Fireplace fan power.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpfan_power: Option<u8>,

    /// Fireplace fan speed (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpfan_speed: Option<u8>,

    /// Shades position (0 = closed, 1 = open).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<u8>,

    /// Attributes not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ceiling fan rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Air is pushed down (value `1`).
    Summer,
    /// Air is pulled up (value `-1`).
    Winter,
}

/// Breeze mode settings of a ceiling fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breeze {
    /// Whether breeze mode is active.
    pub enabled: bool,
    /// Average speed, 0-100.
    pub mean: u8,
    /// Speed variability, 0-100.
    pub variability: u8,
}

impl DeviceState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the main power as a boolean.
    #[must_use]
    pub fn power_on(&self) -> Option<bool> {
        self.power.map(|p| p != 0)
    }

    /// Returns the light power as a boolean.
    #[must_use]
    pub fn light_on(&self) -> Option<bool> {
        self.light.map(|l| l != 0)
    }

    /// Returns `true` if the shades report being open.
    #[must_use]
    pub fn is_open(&self) -> Option<bool> {
        self.open.map(|o| o != 0)
    }

    /// Returns the fan direction if reported with a known value.
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        match self.direction? {
            1 => Some(Direction::Summer),
            -1 => Some(Direction::Winter),
            _ => None,
        }
    }

    /// Returns the breeze settings if reported.
    #[must_use]
    pub fn breeze(&self) -> Option<Breeze> {
        self.breeze.map(|[enabled, mean, variability]| Breeze {
            enabled: enabled != 0,
            mean,
            variability,
        })
    }

    /// Returns `true` if no attribute at all was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
