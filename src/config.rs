// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use bondhome_lib::BridgeConfig;
//!
//! # fn example() -> bondhome_lib::Result<()> {
//! let config = BridgeConfig::builder()
//!     .bridge_id("ZZBL12345")
//!     .bridge_addr("192.168.1.60".parse().unwrap())
//!     .warmup_delay(Duration::from_secs(10))
//!     .build()?;
//!
//! assert_eq!(config.listen_port(), 30007);
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// UDP port of the Bond Push UDP Protocol, on both the bridge and the hub.
pub const BOND_BPUP_PORT: u16 = 30007;

/// Configuration of a bridge's push feed.
///
/// Durations deserialize from whole seconds so the configuration can live in
/// a host's JSON or TOML files:
///
/// ```
/// use bondhome_lib::BridgeConfig;
///
/// let config: BridgeConfig = serde_json::from_str(
///     r#"{"bridge_id":"ZZBL12345","warmup_delay":5,"listen_port":0}"#,
/// ).unwrap();
/// assert_eq!(config.warmup_delay().as_secs(), 5);
/// assert_eq!(config.keepalive_interval().as_secs(), 60);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    bridge_id: Option<String>,
    bridge_addr: Option<IpAddr>,
    bridge_port: u16,
    listen_port: u16,
    #[serde(with = "duration_secs")]
    warmup_delay: Duration,
    #[serde(with = "duration_secs")]
    keepalive_interval: Duration,
    receive_buffer_size: usize,
    listener_threads: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_id: None,
            bridge_addr: None,
            bridge_port: BOND_BPUP_PORT,
            listen_port: BOND_BPUP_PORT,
            warmup_delay: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(60),
            receive_buffer_size: 2048,
            listener_threads: 1,
        }
    }
}

impl BridgeConfig {
    /// Creates a builder starting from the default configuration.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Returns the Bond ID of the bridge, if known.
    #[must_use]
    pub fn bridge_id(&self) -> Option<&str> {
        self.bridge_id.as_deref()
    }

    /// Returns the bridge address keep-alives are sent to.
    #[must_use]
    pub fn bridge_addr(&self) -> Option<IpAddr> {
        self.bridge_addr
    }

    /// Returns the local UDP port the listener binds.
    #[must_use]
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Returns the local address the listener binds.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.listen_port)
    }

    /// Returns the bridge's BPUP port.
    #[must_use]
    pub fn bridge_port(&self) -> u16 {
        self.bridge_port
    }

    /// Returns the keep-alive destination, if a bridge address is configured.
    #[must_use]
    pub fn keepalive_target(&self) -> Option<SocketAddr> {
        self.bridge_addr
            .map(|ip| SocketAddr::new(ip, self.bridge_port))
    }

    /// Returns how long the listener waits before binding after the first attach.
    #[must_use]
    pub fn warmup_delay(&self) -> Duration {
        self.warmup_delay
    }

    /// Returns the interval between keep-alive datagrams.
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    /// Returns the size of the datagram receive buffer in bytes.
    #[must_use]
    pub fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// Returns the number of threads in the dedicated listener pool.
    #[must_use]
    pub fn listener_threads(&self) -> usize {
        self.listener_threads
    }

    /// Checks that the configuration can be used to run a listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for zero-sized buffers, an empty
    /// listener pool or a zero keep-alive interval.
    pub fn validate(&self) -> Result<()> {
        if self.receive_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "receive buffer size must be greater than zero".to_string(),
            ));
        }
        if self.listener_threads == 0 {
            return Err(Error::InvalidConfiguration(
                "listener pool needs at least one thread".to_string(),
            ));
        }
        if self.bridge_addr.is_some() && self.bridge_port == 0 {
            return Err(Error::InvalidConfiguration(
                "bridge port must be greater than zero".to_string(),
            ));
        }
        if self.keepalive_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "keep-alive interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Sets the Bond ID of the bridge.
    #[must_use]
    pub fn bridge_id(mut self, id: impl Into<String>) -> Self {
        self.config.bridge_id = Some(id.into());
        self
    }

    /// Sets the bridge address; enables keep-alives.
    #[must_use]
    pub fn bridge_addr(mut self, addr: IpAddr) -> Self {
        self.config.bridge_addr = Some(addr);
        self
    }

    /// Sets the bridge's BPUP port (default: 30007).
    #[must_use]
    pub fn bridge_port(mut self, port: u16) -> Self {
        self.config.bridge_port = port;
        self
    }

    /// Sets the local UDP port (default: 30007, 0 for an ephemeral port).
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    /// Sets the warm-up delay before the listener binds (default: 30 seconds).
    #[must_use]
    pub fn warmup_delay(mut self, delay: Duration) -> Self {
        self.config.warmup_delay = delay;
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Sets the receive buffer size (default: 2048 bytes).
    #[must_use]
    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    /// Sets the number of listener threads (default: 1).
    #[must_use]
    pub fn listener_threads(mut self, threads: usize) -> Self {
        self.config.listener_threads = threads;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a value is out of range.
    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = BridgeConfig::default();
        assert!(config.bridge_id().is_none());
        assert!(config.bridge_addr().is_none());
        assert_eq!(config.bridge_port(), BOND_BPUP_PORT);
        assert_eq!(config.listen_port(), BOND_BPUP_PORT);
        assert_eq!(config.warmup_delay(), Duration::from_secs(30));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(60));
        assert_eq!(config.receive_buffer_size(), 2048);
        assert_eq!(config.listener_threads(), 1);
        assert!(config.keepalive_target().is_none());
    }

    #[test]
    fn builder_chain() {
        let config = BridgeConfig::builder()
            .bridge_id("ZZBL12345")
            .bridge_addr("192.168.1.60".parse().unwrap())
            .listen_port(0)
            .warmup_delay(Duration::from_millis(10))
            .keepalive_interval(Duration::from_secs(30))
            .receive_buffer_size(512)
            .listener_threads(2)
            .build()
            .unwrap();

        assert_eq!(config.bridge_id(), Some("ZZBL12345"));
        assert_eq!(config.listen_addr(), "0.0.0.0:0".parse().unwrap());
        assert_eq!(
            config.keepalive_target(),
            Some("192.168.1.60:30007".parse().unwrap())
        );
        assert_eq!(config.warmup_delay(), Duration::from_millis(10));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.receive_buffer_size(), 512);
        assert_eq!(config.listener_threads(), 2);
    }

    #[test]
    fn build_rejects_empty_pool() {
        let result = BridgeConfig::builder().listener_threads(0).build();
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn build_rejects_zero_buffer() {
        let result = BridgeConfig::builder().receive_buffer_size(0).build();
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn build_rejects_zero_keepalive() {
        let result = BridgeConfig::builder()
            .keepalive_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn custom_bridge_port_moves_keepalive_target() {
        let config = BridgeConfig::builder()
            .bridge_addr("127.0.0.1".parse().unwrap())
            .bridge_port(40007)
            .build()
            .unwrap();
        assert_eq!(
            config.keepalive_target(),
            Some("127.0.0.1:40007".parse().unwrap())
        );

        let result = BridgeConfig::builder()
            .bridge_addr("127.0.0.1".parse().unwrap())
            .bridge_port(0)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn deserialize_partial() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{"bridge_addr":"10.0.0.2","keepalive_interval":90,"listener_threads":2}"#,
        )
        .unwrap();

        assert_eq!(config.bridge_addr(), Some("10.0.0.2".parse().unwrap()));
        assert_eq!(config.keepalive_interval(), Duration::from_secs(90));
        assert_eq!(config.listener_threads(), 2);
        assert_eq!(config.listen_port(), BOND_BPUP_PORT);
        assert_eq!(config.warmup_delay(), Duration::from_secs(30));
    }
}
