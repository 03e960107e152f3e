// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bond Push UDP Protocol (BPUP) datagram decoding.
//!
//! Every datagram the bridge sends is a single JSON object, usually
//! newline-terminated:
//!
//! ```text
//! {"B":"ZZBL12345","d":0,"v":"v3.2.0","t":"devices/aabbccdd/state",
//!  "i":"00112233bbeeffdd","s":200,"m":0,"f":255,"b":{"_":"ab9284ef","power":1,"speed":2}}
//! ```
//!
//! | Key | Meaning                                    |
//! |-----|--------------------------------------------|
//! | `B` | Bond ID of the bridge                      |
//! | `v` | Bridge firmware version                    |
//! | `t` | Topic, `devices/<device id>/<category>`    |
//! | `i` | Request ID the update relates to           |
//! | `s` | HTTP-like status code                      |
//! | `m` | HTTP-like method (0 = GET, 1 = POST, ...)  |
//! | `b` | Body, the device state for `state` topics  |
//!
//! Keep-alive acknowledgements carry only `B`, `d` and `v`.

use serde::Deserialize;
use serde_json::Value;

use crate::device::DeviceId;
use crate::error::CodecError;
use crate::state::DeviceState;

/// Position of the device identifier within a `/`-separated topic.
const DEVICE_ID_SEGMENT: usize = 1;

/// A decoded push update for one device.
///
/// # Examples
///
/// ```
/// use bondhome_lib::protocol::decode;
///
/// let raw = br#"{"B":"ZZBL12345","t":"devices/ABC123/state","s":200,"b":{"power":1}}"#;
/// let update = decode(raw).unwrap();
///
/// assert_eq!(update.topic(), "devices/ABC123/state");
/// assert_eq!(update.device_id().unwrap().as_str(), "ABC123");
/// assert_eq!(update.device_state().power_on(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    topic: String,
    device_state: DeviceState,
    bridge_id: Option<String>,
    request_id: Option<String>,
    status: Option<u16>,
    method: Option<u8>,
}

impl PushUpdate {
    /// Creates an update with the given topic and state and no envelope metadata.
    #[must_use]
    pub fn new(topic: impl Into<String>, device_state: DeviceState) -> Self {
        Self {
            topic: topic.into(),
            device_state,
            bridge_id: None,
            request_id: None,
            status: None,
            method: None,
        }
    }

    /// Returns the topic, e.g. `devices/aabbccdd/state`.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the decoded device state.
    #[must_use]
    pub fn device_state(&self) -> &DeviceState {
        &self.device_state
    }

    /// Extracts the device identifier from the topic.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedTopic`] if the topic has no device segment.
    pub fn device_id(&self) -> Result<DeviceId, CodecError> {
        device_id_from_topic(&self.topic)
    }

    /// Returns the topic category (`state`, `properties`, ...), if present.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.topic.split('/').nth(DEVICE_ID_SEGMENT + 1)
    }

    /// Returns the Bond ID of the bridge that sent the update.
    #[must_use]
    pub fn bridge_id(&self) -> Option<&str> {
        self.bridge_id.as_deref()
    }

    /// Returns the request ID this update relates to.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the HTTP-like status code of the update.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the HTTP-like method code of the update.
    #[must_use]
    pub fn method(&self) -> Option<u8> {
        self.method
    }
}

/// Identity of a bridge, as sent in keep-alive acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeHello {
    /// Bond ID of the bridge.
    pub bridge_id: Option<String>,
    /// Firmware version of the bridge.
    pub firmware_version: Option<String>,
}

/// Any datagram the bridge can send on the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// The bridge acknowledged a keep-alive.
    KeepAliveAck(BridgeHello),
    /// The bridge pushed an update for a device.
    Update(PushUpdate),
}

/// Wire envelope shared by all BPUP datagrams.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "B", default)]
    bridge_id: Option<String>,
    #[serde(rename = "v", default)]
    version: Option<String>,
    #[serde(rename = "t", default)]
    topic: Option<String>,
    #[serde(rename = "i", default)]
    request_id: Option<String>,
    #[serde(rename = "s", default)]
    status: Option<u16>,
    #[serde(rename = "m", default)]
    method: Option<u8>,
    #[serde(rename = "b", default)]
    body: Option<Value>,
}

/// Decodes a datagram into a push update.
///
/// # Errors
///
/// Returns [`CodecError::MalformedUpdate`] if the payload is not a BPUP
/// update: invalid JSON, no topic (this includes keep-alive
/// acknowledgements), or a state body with invalid attribute types.
/// Returns [`CodecError::MalformedTopic`] if the topic has no device segment.
pub fn decode(raw: &[u8]) -> Result<PushUpdate, CodecError> {
    match decode_datagram(raw)? {
        Datagram::Update(update) => Ok(update),
        Datagram::KeepAliveAck(_) => Err(CodecError::MalformedUpdate(
            "missing topic".to_string(),
        )),
    }
}

/// Decodes any datagram received on the push channel.
///
/// # Errors
///
/// Returns [`CodecError::MalformedUpdate`] if the payload is not valid JSON,
/// carries a body without a topic, or has a state body that cannot be decoded.
/// Returns [`CodecError::MalformedTopic`] if the topic has no device segment.
pub fn decode_datagram(raw: &[u8]) -> Result<Datagram, CodecError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| CodecError::MalformedUpdate(format!("payload is not UTF-8: {e}")))?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text.is_empty() {
        return Err(CodecError::MalformedUpdate("empty payload".to_string()));
    }

    let envelope: Envelope = serde_json::from_str(text)?;

    let Some(topic) = envelope.topic else {
        if envelope.body.is_some() || envelope.bridge_id.is_none() {
            return Err(CodecError::MalformedUpdate("missing topic".to_string()));
        }
        return Ok(Datagram::KeepAliveAck(BridgeHello {
            bridge_id: envelope.bridge_id,
            firmware_version: envelope.version,
        }));
    };
    device_id_from_topic(&topic)?;

    let device_state = match envelope.body {
        Some(Value::Object(map)) => serde_json::from_value(Value::Object(map))?,
        Some(Value::Null) | None => DeviceState::default(),
        Some(other) => {
            return Err(CodecError::MalformedUpdate(format!(
                "state body must be an object, got {other}"
            )));
        }
    };

    Ok(Datagram::Update(PushUpdate {
        topic,
        device_state,
        bridge_id: envelope.bridge_id,
        request_id: envelope.request_id,
        status: envelope.status,
        method: envelope.method,
    }))
}

/// Extracts the device identifier from a push topic.
///
/// # Errors
///
/// Returns [`CodecError::MalformedTopic`] if the topic has fewer than two
/// segments or the identifier segment is empty.
///
/// # Examples
///
/// ```
/// use bondhome_lib::protocol::device_id_from_topic;
///
/// let id = device_id_from_topic("devices/aabbccdd/state").unwrap();
/// assert_eq!(id.as_str(), "aabbccdd");
/// assert!(device_id_from_topic("malformed").is_err());
/// ```
pub fn device_id_from_topic(topic: &str) -> Result<DeviceId, CodecError> {
    match topic.split('/').nth(DEVICE_ID_SEGMENT) {
        Some(id) if !id.is_empty() => Ok(DeviceId::new(id)),
        _ => Err(CodecError::MalformedTopic(topic.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAN_UPDATE: &[u8] = br#"{"B":"ZZBL12345","d":0,"v":"v3.2.0","t":"devices/ABC123/state","i":"00112233bbeeffdd","s":200,"m":0,"f":255,"b":{"_":"ab9284ef","power":1,"speed":2}}
"#;

    #[test]
    fn decode_full_update() {
        let update = decode(FAN_UPDATE).unwrap();

        assert_eq!(update.topic(), "devices/ABC123/state");
        assert_eq!(update.device_id().unwrap().as_str(), "ABC123");
        assert_eq!(update.category(), Some("state"));
        assert_eq!(update.bridge_id(), Some("ZZBL12345"));
        assert_eq!(update.request_id(), Some("00112233bbeeffdd"));
        assert_eq!(update.status(), Some(200));
        assert_eq!(update.method(), Some(0));
        assert_eq!(update.device_state().power, Some(1));
        assert_eq!(update.device_state().speed, Some(2));
    }

    #[test]
    fn decode_keep_alive_ack() {
        let datagram = decode_datagram(br#"{"B":"ZZBL12345","d":0,"v":"v3.2.0"}"#).unwrap();
        assert_eq!(
            datagram,
            Datagram::KeepAliveAck(BridgeHello {
                bridge_id: Some("ZZBL12345".to_string()),
                firmware_version: Some("v3.2.0".to_string()),
            })
        );
    }

    #[test]
    fn decode_rejects_keep_alive_as_update() {
        let err = decode(br#"{"B":"ZZBL12345","d":0,"v":"v3.2.0"}"#).unwrap_err();
        assert_eq!(err, CodecError::MalformedUpdate("missing topic".to_string()));
    }

    #[test]
    fn decode_body_without_topic_fails() {
        let err = decode_datagram(br#"{"B":"ZZBL12345","b":{"power":1}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedUpdate(_)));
    }

    #[test]
    fn decode_empty_object_fails() {
        let err = decode_datagram(b"{}").unwrap_err();
        assert_eq!(err, CodecError::MalformedUpdate("missing topic".to_string()));
    }

    #[test]
    fn decode_invalid_json_fails() {
        assert!(matches!(
            decode(b"{\"t\":\"devices/x/state\""),
            Err(CodecError::MalformedUpdate(_))
        ));
        assert!(matches!(decode(b"hello"), Err(CodecError::MalformedUpdate(_))));
    }

    #[test]
    fn decode_empty_payload_fails() {
        assert!(matches!(decode(b"\n"), Err(CodecError::MalformedUpdate(_))));
        assert!(matches!(decode(b""), Err(CodecError::MalformedUpdate(_))));
    }

    #[test]
    fn decode_non_utf8_fails() {
        assert!(matches!(
            decode(&[0xff, 0xfe, 0x7b]),
            Err(CodecError::MalformedUpdate(_))
        ));
    }

    #[test]
    fn decode_invalid_state_encoding_fails() {
        let err = decode(br#"{"t":"devices/abc/state","b":{"power":"on"}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedUpdate(_)));

        let err = decode(br#"{"t":"devices/abc/state","b":[1,2,3]}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedUpdate(_)));
    }

    #[test]
    fn decode_unknown_device_type() {
        let raw = br#"{"t":"devices/abc/state","b":{"position":40,"preset":"night"}}"#;
        let update = decode(raw).unwrap();

        let state = update.device_state();
        assert!(state.power.is_none());
        assert_eq!(state.extra.len(), 2);
    }

    #[test]
    fn decode_tolerates_nul_padding() {
        let mut raw = br#"{"t":"devices/abc/state","b":{"power":0}}"#.to_vec();
        raw.extend_from_slice(&[0, 0, 0]);
        let update = decode(&raw).unwrap();
        assert_eq!(update.device_state().power_on(), Some(false));
    }

    #[test]
    fn decode_topic_without_body() {
        let update = decode(br#"{"t":"devices/abc/state"}"#).unwrap();
        assert!(update.device_state().is_empty());
    }

    #[test]
    fn decode_malformed_topic_fails() {
        let err = decode(br#"{"t":"malformed","b":{"power":1}}"#).unwrap_err();
        assert_eq!(err, CodecError::MalformedTopic("malformed".to_string()));
    }

    #[test]
    fn constructed_update_with_bad_topic() {
        let update = PushUpdate::new("malformed", DeviceState::default());
        assert!(matches!(
            update.device_id(),
            Err(CodecError::MalformedTopic(_))
        ));
        assert_eq!(update.category(), None);
    }

    #[test]
    fn device_id_from_valid_topics() {
        assert_eq!(
            device_id_from_topic("devices/aabbccdd/state").unwrap(),
            DeviceId::new("aabbccdd")
        );
        assert_eq!(
            device_id_from_topic("devices/aabbccdd").unwrap().as_str(),
            "aabbccdd"
        );
    }

    #[test]
    fn device_id_from_invalid_topics() {
        assert!(matches!(
            device_id_from_topic("malformed"),
            Err(CodecError::MalformedTopic(_))
        ));
        assert!(matches!(
            device_id_from_topic("devices//state"),
            Err(CodecError::MalformedTopic(_))
        ));
        assert!(matches!(
            device_id_from_topic(""),
            Err(CodecError::MalformedTopic(_))
        ));
    }
}
