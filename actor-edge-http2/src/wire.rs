// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The JSON wire shapes exchanged over HTTP/2 (spec §6), and their mapping
//! to and from the transport-neutral [`actor_edge_core::Envelope`]. Kept
//! separate from `server.rs`/`client.rs` so the shapes can be unit tested in
//! isolation, the way the teacher's RPC crates separate request/response
//! types from the handlers that produce them.

use std::collections::HashMap;

use actor_edge_core::{ActorId, Envelope, EnvelopeError, MessageKind, SerializationManifest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// `POST /actors/{actorId}/call/{target}` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCallRequest {
    pub call_id: String,
    pub sender: Option<String>,
    pub manifest: SerializationManifest,
    /// Trace ids, baggage and other invocation metadata carried alongside
    /// the envelope (spec §4.I: "headers carry invocation metadata").
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(with = "wire_bytes")]
    pub payload: Bytes,
}

/// Ok carries a value, Void carries none, Error carries a domain failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCallResponseKind {
    Ok,
    Void,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCallResponse {
    pub call_id: String,
    pub kind: RemoteCallResponseKind,
    pub manifest: SerializationManifest,
    #[serde(with = "wire_bytes")]
    pub payload: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type_hint: Option<String>,
}

/// One frame of a `StreamCall` websocket connection. Invocation and
/// response/error frames share the socket; `kind` on the envelope side
/// disambiguates which.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStreamPacket {
    pub recipient: String,
    pub sender: Option<String>,
    pub target: String,
    pub call_id: String,
    pub kind: StreamPacketKind,
    pub manifest: SerializationManifest,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Position of this frame within its `call_id`'s response sequence.
    pub sequence: u32,
    /// Whether this is the final frame for its `call_id`.
    pub last: bool,
    #[serde(with = "wire_bytes")]
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPacketKind {
    Invocation,
    Response,
    Error,
    System,
}

impl From<MessageKind> for StreamPacketKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Invocation => StreamPacketKind::Invocation,
            MessageKind::Response => StreamPacketKind::Response,
            MessageKind::Error => StreamPacketKind::Error,
            MessageKind::System => StreamPacketKind::System,
        }
    }
}

impl RemoteStreamPacket {
    /// Wraps `envelope` as a single, complete frame: `sequence = 0`,
    /// `last = true`. The unary `dispatch_invocation` round trip this crate
    /// implements never produces more than one reply frame per `call_id`;
    /// a caller building a genuine multi-frame reply sets these fields
    /// itself after construction.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            recipient: envelope.recipient().as_str().to_string(),
            sender: envelope.sender().map(|s| s.as_str().to_string()),
            target: envelope.target().to_string(),
            call_id: envelope.call_id().to_string(),
            kind: envelope.kind().into(),
            manifest: envelope.manifest().clone(),
            headers: envelope.metadata().headers.clone(),
            sequence: 0,
            last: true,
            payload: envelope.payload().clone(),
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, EnvelopeError> {
        let recipient = ActorId::well_known(self.recipient);
        let sender = self.sender.map(ActorId::well_known);
        match self.kind {
            StreamPacketKind::Invocation => {
                Envelope::invocation(recipient, sender, self.target, self.manifest, self.payload, Some(self.call_id), self.headers)
            }
            StreamPacketKind::Response => Envelope::response(recipient, sender, self.call_id, self.manifest, self.payload),
            StreamPacketKind::Error => Envelope::error(recipient, sender, self.call_id, self.manifest, self.payload),
            StreamPacketKind::System => Envelope::system(recipient, sender, self.call_id, self.manifest, self.payload),
        }
    }
}

impl RemoteCallRequest {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            call_id: envelope.call_id().to_string(),
            sender: envelope.sender().map(|s| s.as_str().to_string()),
            manifest: envelope.manifest().clone(),
            headers: envelope.metadata().headers.clone(),
            payload: envelope.payload().clone(),
        }
    }

    pub fn into_envelope(self, recipient: ActorId, target: &str) -> Result<Envelope, EnvelopeError> {
        let sender = self.sender.map(ActorId::well_known);
        Envelope::invocation(recipient, sender, target, self.manifest, self.payload, Some(self.call_id), self.headers)
    }
}

impl RemoteCallResponse {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let kind = match envelope.kind() {
            MessageKind::Error => RemoteCallResponseKind::Error,
            _ if envelope.payload().is_empty() => RemoteCallResponseKind::Void,
            _ => RemoteCallResponseKind::Ok,
        };
        let error_type_hint = matches!(envelope.kind(), MessageKind::Error).then(|| envelope.manifest().type_hint.clone());
        Self {
            call_id: envelope.call_id().to_string(),
            kind,
            manifest: envelope.manifest().clone(),
            payload: envelope.payload().clone(),
            error_type_hint,
        }
    }

    /// Rebuilds the `response`/`error` envelope this wire message carries.
    /// `recipient` is the caller that will receive it (not present on the
    /// wire -- it is whoever is holding the open HTTP connection).
    pub fn into_envelope(self, recipient: ActorId, sender: Option<ActorId>) -> Result<Envelope, EnvelopeError> {
        match self.kind {
            RemoteCallResponseKind::Error => {
                let manifest = SerializationManifest::new(self.manifest.serializer_id, self.error_type_hint.unwrap_or_default());
                Envelope::error(recipient, sender, self.call_id, manifest, self.payload)
            }
            RemoteCallResponseKind::Void => {
                Envelope::response(recipient, sender, self.call_id, self.manifest, Bytes::new())
            }
            RemoteCallResponseKind::Ok => Envelope::response(recipient, sender, self.call_id, self.manifest, self.payload),
        }
    }
}

/// JSON has no native byte-string type; payloads round-trip as a byte array,
/// the same convention `actor-edge-core::envelope` uses for the in-process
/// wire form.
mod wire_bytes {
    use bytes::Bytes;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(bytes.as_ref(), s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let v: Vec<u8> = serde_bytes::deserialize(d)?;
        Ok(Bytes::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_round_trips_through_json() {
        let envelope = Envelope::response(
            ActorId::well_known("caller"),
            Some(ActorId::well_known("actor-1")),
            "c-1",
            SerializationManifest::new("json", "String"),
            Bytes::from_static(b"\"hi\""),
        )
        .unwrap();
        let wire = RemoteCallResponse::from_envelope(&envelope);
        let json = serde_json::to_string(&wire).unwrap();
        let back: RemoteCallResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.call_id, "c-1");
        assert_eq!(back.kind, RemoteCallResponseKind::Ok);
        assert_eq!(back.payload.as_ref(), b"\"hi\"");
    }

    #[test]
    fn void_response_has_an_empty_payload() {
        let envelope = Envelope::response(
            ActorId::well_known("caller"),
            None,
            "c-1",
            SerializationManifest::new("json", "Void"),
            Bytes::new(),
        )
        .unwrap();
        let wire = RemoteCallResponse::from_envelope(&envelope);
        assert_eq!(wire.kind, RemoteCallResponseKind::Void);
    }

    #[test]
    fn error_response_carries_the_type_hint() {
        let envelope = Envelope::error(
            ActorId::well_known("caller"),
            None,
            "c-1",
            SerializationManifest::new("json", "NotFoundError"),
            Bytes::from_static(b"\"nope\""),
        )
        .unwrap();
        let wire = RemoteCallResponse::from_envelope(&envelope);
        assert_eq!(wire.kind, RemoteCallResponseKind::Error);
        assert_eq!(wire.error_type_hint.as_deref(), Some("NotFoundError"));
        let rebuilt = wire.into_envelope(ActorId::well_known("caller"), None).unwrap();
        assert_eq!(rebuilt.kind(), MessageKind::Error);
    }

    #[test]
    fn stream_packet_round_trips_an_invocation() {
        let envelope = Envelope::invocation(
            ActorId::well_known("actor-1"),
            Some(ActorId::well_known("caller")),
            "echo",
            SerializationManifest::new("json", "String"),
            Bytes::from_static(b"\"hi\""),
            Some("c-1".to_string()),
            Default::default(),
        )
        .unwrap();
        let packet = RemoteStreamPacket::from_envelope(&envelope);
        assert_eq!(packet.sequence, 0);
        assert!(packet.last);
        let rebuilt = packet.into_envelope().unwrap();
        assert_eq!(rebuilt.call_id(), "c-1");
        assert_eq!(rebuilt.target(), "echo");
        assert_eq!(rebuilt.kind(), MessageKind::Invocation);
    }
}
