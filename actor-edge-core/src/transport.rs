// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The capability interface every transport must satisfy (spec §4.G). The
//! runtime holds any `Arc<dyn Transport>`; concrete implementations live in
//! downstream crates (`actor-edge-transport` for the in-memory reference
//! transport, `actor-edge-http2` for the networked mapping) so this crate
//! never depends on sockets or TLS.

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::ActorEdgeError;

/// Connection- or endpoint-level metadata a transport reports about itself.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    pub transport_type: String,
    pub endpoint: Option<String>,
    pub is_secure: bool,
    pub attributes: std::collections::HashMap<String, String>,
}

/// A stream of envelopes received from peers, unordered across distinct
/// senders but ordered for a single connection.
pub type EnvelopeStream = std::pin::Pin<Box<dyn futures::Stream<Item = Envelope> + Send>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `envelope`. Returning `Ok(None)` means "no synchronous reply";
    /// the caller should wait for a correlated response on `receive()`
    /// instead. Returning `Ok(Some(response))` completes the corresponding
    /// `callID` synchronously (the unary case).
    async fn send(&self, envelope: Envelope) -> Result<Option<Envelope>, ActorEdgeError>;

    /// A stream of envelopes this transport receives from its peer(s).
    async fn receive(&self) -> Result<EnvelopeStream, ActorEdgeError>;

    /// Idempotent. After `close()` resolves, `send` MUST fail with `Disconnected`.
    async fn close(&self) -> Result<(), ActorEdgeError>;

    fn is_connected(&self) -> bool;

    fn metadata(&self) -> TransportMetadata;
}
