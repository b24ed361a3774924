// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::id::ActorId;
use crate::manifest::SerializationManifest;

/// Discriminates the purpose of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Invocation,
    Response,
    Error,
    System,
}

/// Transport-neutral metadata carried alongside every envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub call_id: String,
    /// Non-empty iff `kind == Invocation`.
    pub target: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timestamp_millis: i64,
}

/// Immutable, transport-neutral container for one message.
///
/// Envelopes are constructed once through the constructors below and never
/// mutated afterwards; every field is reachable only through an accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    recipient: ActorId,
    sender: Option<ActorId>,
    manifest: SerializationManifest,
    #[serde(with = "serde_bytes_compat")]
    payload: Bytes,
    metadata: EnvelopeMetadata,
    kind: MessageKind,
}

/// Errors raised by the envelope constructors when an invariant from the
/// data model (see spec model, `Envelope`) does not hold.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("call id must not be empty")]
    EmptyCallId,
    #[error("target must not be empty for an invocation envelope")]
    EmptyTarget,
    #[error("target must be empty for a non-invocation envelope")]
    NonEmptyTarget,
}

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

impl Envelope {
    /// Builds an invocation envelope. `call_id` is generated (a random
    /// UUID-shaped string) when `None` is supplied.
    pub fn invocation(
        recipient: ActorId,
        sender: Option<ActorId>,
        target: impl Into<String>,
        manifest: SerializationManifest,
        payload: Bytes,
        call_id: Option<String>,
        headers: HashMap<String, String>,
    ) -> Result<Self, EnvelopeError> {
        let target = target.into();
        if target.is_empty() {
            return Err(EnvelopeError::EmptyTarget);
        }
        let call_id = call_id.unwrap_or_else(generate_call_id);
        if call_id.is_empty() {
            return Err(EnvelopeError::EmptyCallId);
        }
        Ok(Self {
            recipient,
            sender,
            manifest,
            payload,
            metadata: EnvelopeMetadata { call_id, target, headers, timestamp_millis: now_millis() },
            kind: MessageKind::Invocation,
        })
    }

    /// Builds a `response` envelope correlated to `call_id`. `target` is
    /// always empty for responses.
    pub fn response(
        recipient: ActorId,
        sender: Option<ActorId>,
        call_id: impl Into<String>,
        manifest: SerializationManifest,
        payload: Bytes,
    ) -> Result<Self, EnvelopeError> {
        Self::non_invocation(recipient, sender, call_id, manifest, payload, MessageKind::Response)
    }

    /// Builds an `error` envelope correlated to `call_id`.
    pub fn error(
        recipient: ActorId,
        sender: Option<ActorId>,
        call_id: impl Into<String>,
        manifest: SerializationManifest,
        payload: Bytes,
    ) -> Result<Self, EnvelopeError> {
        Self::non_invocation(recipient, sender, call_id, manifest, payload, MessageKind::Error)
    }

    /// Builds a transport-internal `system` envelope (e.g. keepalive).
    pub fn system(
        recipient: ActorId,
        sender: Option<ActorId>,
        call_id: impl Into<String>,
        manifest: SerializationManifest,
        payload: Bytes,
    ) -> Result<Self, EnvelopeError> {
        Self::non_invocation(recipient, sender, call_id, manifest, payload, MessageKind::System)
    }

    fn non_invocation(
        recipient: ActorId,
        sender: Option<ActorId>,
        call_id: impl Into<String>,
        manifest: SerializationManifest,
        payload: Bytes,
        kind: MessageKind,
    ) -> Result<Self, EnvelopeError> {
        let call_id = call_id.into();
        if call_id.is_empty() {
            return Err(EnvelopeError::EmptyCallId);
        }
        Ok(Self {
            recipient,
            sender,
            manifest,
            payload,
            metadata: EnvelopeMetadata {
                call_id,
                target: String::new(),
                headers: HashMap::new(),
                timestamp_millis: now_millis(),
            },
            kind,
        })
    }

    pub fn recipient(&self) -> &ActorId {
        &self.recipient
    }

    pub fn sender(&self) -> Option<&ActorId> {
        self.sender.as_ref()
    }

    pub fn manifest(&self) -> &SerializationManifest {
        &self.manifest
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    pub fn call_id(&self) -> &str {
        &self.metadata.call_id
    }

    pub fn target(&self) -> &str {
        &self.metadata.target
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }
}

fn generate_call_id() -> String {
    // Not a cryptographic requirement, just uniqueness: 16 random hex bytes.
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `bytes::Bytes` already round-trips through serde as a byte sequence, but
/// we funnel it through an explicit module so the wire representation is
/// pinned down in one place instead of relying on the blanket impl.
mod serde_bytes_compat {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

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

    fn manifest() -> SerializationManifest {
        SerializationManifest::new("json", "String")
    }

    #[test]
    fn invocation_requires_non_empty_target() {
        let err = Envelope::invocation(
            ActorId::well_known("chat-1"),
            None,
            "",
            manifest(),
            Bytes::new(),
            Some("c-1".into()),
            HashMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, EnvelopeError::EmptyTarget);
    }

    #[test]
    fn response_rejects_empty_call_id() {
        let err = Envelope::response(ActorId::well_known("chat-1"), None, "", manifest(), Bytes::new())
            .unwrap_err();
        assert_eq!(err, EnvelopeError::EmptyCallId);
    }

    #[test]
    fn invocation_assigns_fresh_call_id_when_absent() {
        let env = Envelope::invocation(
            ActorId::well_known("chat-1"),
            None,
            "echo",
            manifest(),
            Bytes::from_static(b"hi"),
            None,
            HashMap::new(),
        )
        .unwrap();
        assert!(!env.call_id().is_empty());
        assert_eq!(env.kind(), MessageKind::Invocation);
    }

    #[test]
    fn accessors_round_trip_constructor_arguments() {
        let env = Envelope::response(
            ActorId::well_known("chat-1"),
            Some(ActorId::well_known("server")),
            "c-1",
            manifest(),
            Bytes::from_static(b"hi"),
        )
        .unwrap();
        assert_eq!(env.call_id(), "c-1");
        assert_eq!(env.target(), "");
        assert_eq!(env.payload().as_ref(), b"hi");
        assert_eq!(env.sender().unwrap().as_str(), "server");
    }
}
