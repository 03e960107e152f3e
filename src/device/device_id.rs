// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device identifier type.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a device behind a Bond bridge.
///
/// Bond device identifiers are short hex strings (e.g. `aabbccdd`). The bridge
/// is not consistent about their case between the HTTP API and push updates,
/// so equality and hashing ignore ASCII case. The original spelling is kept
/// for display.
///
/// # Examples
///
/// ```
/// use bondhome_lib::DeviceId;
///
/// let from_api = DeviceId::new("abc123");
/// let from_push = DeviceId::new("ABC123");
/// assert_eq!(from_api, from_push);
/// assert_eq!(from_push.as_str(), "ABC123");
/// ```
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identifier from its textual form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as it was received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `other` names the same device.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for DeviceId {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for DeviceId {}

impl Hash for DeviceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_case() {
        assert_eq!(DeviceId::new("ABC123"), DeviceId::new("abc123"));
        assert_ne!(DeviceId::new("abc123"), DeviceId::new("abc124"));
    }

    #[test]
    fn display_preserves_case() {
        let id = DeviceId::new("AbC123");
        assert_eq!(id.to_string(), "AbC123");
        assert_eq!(id.as_str(), "AbC123");
    }

    #[test]
    fn debug_format() {
        let id = DeviceId::new("aabbccdd");
        assert_eq!(format!("{id:?}"), "DeviceId(aabbccdd)");
    }

    #[test]
    fn hash_ignores_case() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(DeviceId::new("ABC123"));
        assert!(set.contains(&DeviceId::new("abc123")));
        assert!(!set.insert(DeviceId::new("Abc123")));
    }

    #[test]
    fn matches_raw_str() {
        let id = DeviceId::new("abc123");
        assert!(id.matches("ABC123"));
        assert!(!id.matches("abc12"));
    }
}
