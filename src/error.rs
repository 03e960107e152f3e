// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `bondhome` library.
//!
//! Errors are split by the layer that produces them: decoding a datagram,
//! registering a device handler, and running the push listener. None of them
//! is fatal to the process; the worst case is a bridge left in a degraded
//! state where only the control API is usable.

use std::net::SocketAddr;

use thiserror::Error;

use crate::device::DeviceId;
use crate::protocol::ListenerState;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A push datagram could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A device handler could not be registered.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The push listener could not be scheduled or started.
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    /// The bridge configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised while decoding a push datagram.
///
/// These are per-packet failures: the listener logs them and keeps receiving.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The topic does not carry a device identifier segment.
    #[error("malformed topic: {0:?}")]
    MalformedTopic(String),

    /// The payload is not a valid push update.
    #[error("malformed update: {0}")]
    MalformedUpdate(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedUpdate(err.to_string())
    }
}

/// Errors raised by the device registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A different handler is already registered under the same identifier.
    #[error("device {device_id} is already registered by another handler")]
    DuplicateRegistration {
        /// The identifier that was already taken.
        device_id: DeviceId,
    },
}

/// Errors raised by the push listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The receive socket could not be bound.
    #[error("failed to bind push socket on {addr}: {source}")]
    BindFailure {
        /// The address the listener tried to bind.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested transition is not valid from the current state.
    #[error("listener cannot be scheduled from state {from:?}")]
    InvalidTransition {
        /// The state the listener was in.
        from: ListenerState,
    },

    /// The dedicated listener runtime could not be created.
    #[error("failed to start listener runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
