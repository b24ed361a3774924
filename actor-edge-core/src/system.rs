// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The distributed actor system: `remoteCall`/`remoteCallVoid`, the local
//! short-circuit, and the server-side entry point that executes a received
//! invocation against a locally registered actor (spec §4.F).

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::envelope::{Envelope, MessageKind};
use crate::error::ActorEdgeError;
use crate::handler::ResultHandler;
use crate::id::ActorId;
use crate::invocation::{Argument, InvocationDecoder, InvocationEncoder, InvocationResult};
use crate::manifest::SerializationManifest;
use crate::metrics::{CallResult, Direction, Metrics};
use crate::pending::PendingCallTable;
use crate::registry::{ActorRegistry, DistributedTarget};
use crate::serialization::SerializerRegistry;
use crate::transport::Transport;

/// An error thrown by the remote target, as opposed to a runtime/transport
/// fault. Carries the concrete error type when the caller asks for it and
/// the payload deserializes cleanly; otherwise callers can fall back to
/// [`DistributedActorSystem::remote_call`], which only ever returns
/// [`ActorEdgeError`] and folds domain errors into `RemoteCallGeneric`.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error("remote target threw a domain error")]
    Domain(E),
    #[error(transparent)]
    Runtime(#[from] ActorEdgeError),
}

/// Client-side proxy, constructed from `(system, actorID)`. Generated stubs
/// (or a typed builder) forward each call by name through this type rather
/// than through a macro-generated transparent protocol witness (spec §9).
#[derive(Clone)]
pub struct ActorProxy {
    system: Arc<DistributedActorSystem>,
    actor_id: ActorId,
}

impl ActorProxy {
    pub fn new(system: Arc<DistributedActorSystem>, actor_id: ActorId) -> Self {
        Self { system, actor_id }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub async fn call<T: Argument>(&self, target: &str, encoder: InvocationEncoder) -> Result<T, ActorEdgeError> {
        self.system.remote_call(self.actor_id.clone(), target, encoder, None).await
    }

    pub async fn call_with_timeout<T: Argument>(
        &self,
        target: &str,
        encoder: InvocationEncoder,
        timeout: Duration,
    ) -> Result<T, ActorEdgeError> {
        self.system.remote_call(self.actor_id.clone(), target, encoder, Some(timeout)).await
    }

    pub async fn call_void(&self, target: &str, encoder: InvocationEncoder) -> Result<(), ActorEdgeError> {
        self.system.remote_call_void(self.actor_id.clone(), target, encoder, None).await
    }

    pub async fn call_fallible<T: Argument, E: Argument>(
        &self,
        target: &str,
        encoder: InvocationEncoder,
    ) -> Result<T, CallError<E>> {
        self.system.remote_call_fallible(self.actor_id.clone(), target, encoder, None).await
    }
}

/// Either a locally registered actor or nothing -- the `nil` branch is the
/// "create a proxy instead" path from spec §4.F's `resolve`.
pub enum Resolution {
    Local(Arc<dyn DistributedTarget>),
    Remote(ActorProxy),
}

struct PendingGuard<'a> {
    table: &'a PendingCallTable,
    call_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.call_id);
    }
}

/// Central runtime object: owns the actor registry, the pending-call table,
/// the serializer registry and (optionally) the transport used for calls
/// that do not resolve to a local actor.
pub struct DistributedActorSystem {
    registry: ActorRegistry,
    pending_calls: PendingCallTable,
    serializer_registry: Arc<SerializerRegistry>,
    default_serializer_id: String,
    default_timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
    metrics: Arc<Metrics>,
}

impl DistributedActorSystem {
    pub fn new(
        serializer_registry: Arc<SerializerRegistry>,
        default_serializer_id: impl Into<String>,
        default_timeout: Duration,
        transport: Option<Arc<dyn Transport>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: ActorRegistry::new(),
            pending_calls: PendingCallTable::new(),
            serializer_registry,
            default_serializer_id: default_serializer_id.into(),
            default_timeout,
            transport,
            metrics,
        }
    }

    pub fn serializer_registry(&self) -> &Arc<SerializerRegistry> {
        &self.serializer_registry
    }

    pub fn new_encoder(&self) -> InvocationEncoder {
        InvocationEncoder::new(self.serializer_registry.clone(), self.default_serializer_id.clone())
    }

    pub fn pending_call_count(&self) -> usize {
        self.pending_calls.len()
    }

    // -- actor lifecycle, delegated to the registry -------------------------------------------

    pub fn assign_id(&self) -> ActorId {
        self.registry.assign_id()
    }

    pub fn reserve_well_known(&self, id: ActorId) -> Result<(), ActorEdgeError> {
        self.registry.reserve_well_known(id)
    }

    pub fn actor_ready(&self, id: &ActorId, actor: Arc<dyn DistributedTarget>) -> Result<(), ActorEdgeError> {
        self.registry.actor_ready(id, actor)?;
        self.metrics.record_actor_registration();
        Ok(())
    }

    pub fn resign_id(&self, id: &ActorId) {
        self.registry.resign_id(id);
    }

    /// Looks the id up locally; if found, returns the actor directly so the
    /// caller can execute against it without ever building a proxy.
    pub fn resolve(self: &Arc<Self>, id: ActorId) -> Resolution {
        match self.registry.find(&id) {
            Some(actor) => {
                self.metrics.record_actor_resolution();
                Resolution::Local(actor)
            }
            None => Resolution::Remote(ActorProxy::new(self.clone(), id)),
        }
    }

    // -- client side ----------------------------------------------------------------------------

    /// `remoteCall`. Domain errors are folded into `RemoteCallGeneric`; use
    /// [`Self::remote_call_fallible`] to recover the original error type.
    #[instrument(skip(self, encoder))]
    pub async fn remote_call<T: Argument>(
        &self,
        recipient: ActorId,
        target: &str,
        encoder: InvocationEncoder,
        timeout: Option<Duration>,
    ) -> Result<T, ActorEdgeError> {
        let outcome = self.remote_call_timed(recipient, target, encoder, timeout).await?;
        match outcome {
            InvocationResult::Success { payload, manifest } => self.serializer_registry.deserialize(&payload, &manifest),
            InvocationResult::Void => Err(ActorEdgeError::RemoteCallGeneric {
                type_hint: "Void".to_string(),
                message: "target returned void but a value was expected".to_string(),
            }),
            InvocationResult::Failure { payload, manifest, error_type_hint } => {
                Err(self.reconstruct_generic_error(payload, manifest, error_type_hint))
            }
        }
    }

    pub async fn remote_call_void(
        &self,
        recipient: ActorId,
        target: &str,
        encoder: InvocationEncoder,
        timeout: Option<Duration>,
    ) -> Result<(), ActorEdgeError> {
        let outcome = self.remote_call_timed(recipient, target, encoder, timeout).await?;
        match outcome {
            InvocationResult::Void => Ok(()),
            InvocationResult::Success { .. } => Ok(()),
            InvocationResult::Failure { payload, manifest, error_type_hint } => {
                Err(self.reconstruct_generic_error(payload, manifest, error_type_hint))
            }
        }
    }

    /// As [`Self::remote_call`], but attempts to deserialize a domain
    /// failure into `E` so the caller can re-raise the original type.
    pub async fn remote_call_fallible<T: Argument, E: Argument>(
        &self,
        recipient: ActorId,
        target: &str,
        encoder: InvocationEncoder,
        timeout: Option<Duration>,
    ) -> Result<T, CallError<E>> {
        let outcome = self.remote_call_timed(recipient, target, encoder, timeout).await?;
        match outcome {
            InvocationResult::Success { payload, manifest } => {
                Ok(self.serializer_registry.deserialize(&payload, &manifest)?)
            }
            InvocationResult::Void => Err(CallError::Runtime(ActorEdgeError::RemoteCallGeneric {
                type_hint: "Void".to_string(),
                message: "target returned void but a value was expected".to_string(),
            })),
            InvocationResult::Failure { payload, manifest, .. } => {
                match self.serializer_registry.deserialize::<E>(&payload, &manifest) {
                    Ok(domain) => Err(CallError::Domain(domain)),
                    Err(_) => Err(CallError::Runtime(self.reconstruct_generic_error(
                        payload,
                        manifest,
                        "Unknown".to_string(),
                    ))),
                }
            }
        }
    }

    fn reconstruct_generic_error(&self, payload: Bytes, manifest: SerializationManifest, error_type_hint: String) -> ActorEdgeError {
        if error_type_hint == "ActorNotFound" {
            if let Ok(id) = self.serializer_registry.deserialize::<String>(&payload, &manifest) {
                return ActorEdgeError::ActorNotFound(ActorId::well_known(id));
            }
        }
        let message = self
            .serializer_registry
            .deserialize::<String>(&payload, &manifest)
            .unwrap_or_else(|_| String::from_utf8_lossy(&payload).into_owned());
        ActorEdgeError::RemoteCallGeneric { type_hint: error_type_hint, message }
    }

    async fn remote_call_timed(
        &self,
        recipient: ActorId,
        target: &str,
        encoder: InvocationEncoder,
        timeout: Option<Duration>,
    ) -> Result<InvocationResult, ActorEdgeError> {
        let start = Instant::now();
        let timeout = timeout.unwrap_or(self.default_timeout);
        let target_label = target.to_string();
        let result = tokio::time::timeout(timeout, self.remote_call_inner(recipient, target, encoder)).await;
        let (metric_result, outcome) = match result {
            Ok(Ok(outcome @ InvocationResult::Failure { .. })) => (CallResult::DomainError, Ok(outcome)),
            Ok(Ok(outcome)) => (CallResult::Ok, Ok(outcome)),
            Ok(Err(e)) => (CallResult::from_metric_str(e.metric_result()), Err(e)),
            Err(_elapsed) => (CallResult::Timeout, Err(ActorEdgeError::Timeout)),
        };
        self.metrics.record_call(Direction::Client, &target_label, metric_result, start.elapsed().as_secs_f64());
        outcome
    }

    async fn remote_call_inner(
        &self,
        recipient: ActorId,
        target: &str,
        mut encoder: InvocationEncoder,
    ) -> Result<InvocationResult, ActorEdgeError> {
        // Local short-circuit: hand the encoder straight to a local decoder,
        // skipping both the transport and byte serialization of arguments.
        if let Some(actor) = self.registry.find(&recipient) {
            encoder.done_recording().ok(); // idempotent: caller may already have called it
            let decoder = encoder.into_local_decoder()?;
            let (handler, sink_rx) = self.remote_handler();
            return self.run_target(actor, target, decoder, handler, sink_rx).await;
        }

        let transport = self.transport.as_ref().ok_or(ActorEdgeError::TransportUnavailable)?;
        encoder.done_recording().ok();
        let data = encoder.finalize()?;
        let (payload, manifest) =
            self.serializer_registry.serialize(&self.default_serializer_id, &data, "InvocationData")?;
        let envelope = Envelope::invocation(recipient, None, target, manifest, payload, None, Default::default())
            .map_err(|e| ActorEdgeError::RemoteCallGeneric { type_hint: "EnvelopeError".into(), message: e.to_string() })?;
        let call_id = envelope.call_id().to_string();

        let rx = self.pending_calls.register(call_id.as_str());
        let _guard = PendingGuard { table: &self.pending_calls, call_id: call_id.clone() };

        match transport.send(envelope).await? {
            Some(response) => {
                self.pending_calls.remove(&call_id);
                envelope_to_result(&response)
            }
            None => rx.await.map_err(|_| ActorEdgeError::Disconnected)?,
        }
    }

    /// Both the "call a local actor directly" path and the "we are the
    /// server executing a received invocation" path run the target
    /// synchronously and collect its one result through a local oneshot --
    /// the difference between them is only what happens to the
    /// `InvocationResult` afterwards (returned in-process, or packed into a
    /// response/error envelope).
    fn remote_handler(&self) -> (ResultHandler, oneshot::Receiver<Result<InvocationResult, ActorEdgeError>>) {
        ResultHandler::local(self.serializer_registry.clone(), self.default_serializer_id.clone())
    }

    async fn run_target(
        &self,
        actor: Arc<dyn DistributedTarget>,
        target: &str,
        decoder: InvocationDecoder,
        handler: ResultHandler,
        sink_rx: oneshot::Receiver<Result<InvocationResult, ActorEdgeError>>,
    ) -> Result<InvocationResult, ActorEdgeError> {
        actor.invoke(target, decoder, handler).await?;
        sink_rx.await.map_err(|_| ActorEdgeError::HandlerAlreadyCompleted)?
    }

    // -- server side ------------------------------------------------------------------------------

    /// Server-side entry point: decodes the invocation carried by `envelope`,
    /// locates the target actor, executes it, and returns the response or
    /// error envelope to send back. Invoked once per received invocation
    /// envelope (spec §4.F).
    #[instrument(skip(self, envelope))]
    pub async fn dispatch_invocation(&self, envelope: Envelope) -> Envelope {
        let start = Instant::now();
        let call_id = envelope.call_id().to_string();
        let target = envelope.target().to_string();
        let caller = envelope.sender().cloned();
        let recipient = envelope.recipient().clone();

        let outcome = self.dispatch_invocation_inner(&envelope).await;
        let metric_result = match &outcome {
            Ok(InvocationResult::Failure { .. }) => CallResult::DomainError,
            Ok(_) => CallResult::Ok,
            Err(e) => CallResult::from_metric_str(e.metric_result()),
        };
        self.metrics.record_call(Direction::Server, &target, metric_result, start.elapsed().as_secs_f64());

        result_to_envelope(&call_id, caller, recipient, outcome, &self.default_serializer_id, &self.serializer_registry)
    }

    async fn dispatch_invocation_inner(&self, envelope: &Envelope) -> Result<InvocationResult, ActorEdgeError> {
        let actor = self
            .registry
            .find(envelope.recipient())
            .ok_or_else(|| ActorEdgeError::ActorNotFound(envelope.recipient().clone()))?;
        self.metrics.record_actor_resolution();

        let data = self.serializer_registry.deserialize(envelope.payload(), envelope.manifest())?;
        let decoder = InvocationDecoder::from_wire(data, self.serializer_registry.clone());
        let (handler, sink_rx) = self.remote_handler();
        self.run_target(actor, envelope.target(), decoder, handler, sink_rx).await
    }

    /// Drives `transport.receive()`: routes response/error envelopes to the
    /// pending-call table and invocation envelopes through
    /// [`Self::dispatch_invocation`], writing the reply back out through the
    /// same transport. Intended to be spawned as a background task; returns
    /// once the transport's stream ends (e.g. on disconnect).
    pub async fn run_inbound_loop(self: Arc<Self>, transport: Arc<dyn Transport>) -> Result<(), ActorEdgeError> {
        let mut stream = transport.receive().await?;
        while let Some(envelope) = stream.next().await {
            match envelope.kind() {
                MessageKind::Response | MessageKind::Error => {
                    let call_id = envelope.call_id().to_string();
                    let result = envelope_to_result(&envelope);
                    if !self.pending_calls.complete(&call_id, result) {
                        debug!(call_id = %call_id, "dropping response for unknown or timed-out call");
                    }
                }
                MessageKind::Invocation => {
                    let response = self.dispatch_invocation(envelope).await;
                    if let Err(e) = transport.send(response).await {
                        warn!(error = %e, "failed to deliver response envelope");
                    }
                }
                MessageKind::System => {}
            }
        }
        self.pending_calls.fail_all();
        Ok(())
    }
}

fn envelope_to_result(envelope: &Envelope) -> Result<InvocationResult, ActorEdgeError> {
    match envelope.kind() {
        MessageKind::Response if envelope.payload().is_empty() => Ok(InvocationResult::Void),
        MessageKind::Response => {
            Ok(InvocationResult::Success { payload: envelope.payload().clone(), manifest: envelope.manifest().clone() })
        }
        MessageKind::Error => Ok(InvocationResult::Failure {
            payload: envelope.payload().clone(),
            manifest: envelope.manifest().clone(),
            error_type_hint: envelope.manifest().type_hint.clone(),
        }),
        other => Err(ActorEdgeError::RemoteCallGeneric {
            type_hint: "UnexpectedEnvelopeKind".to_string(),
            message: format!("expected a response or error envelope, got {other:?}"),
        }),
    }
}

fn result_to_envelope(
    call_id: &str,
    caller: Option<ActorId>,
    recipient_of_invocation: ActorId,
    outcome: Result<InvocationResult, ActorEdgeError>,
    default_serializer_id: &str,
    registry: &SerializerRegistry,
) -> Envelope {
    let recipient = caller.unwrap_or_else(|| ActorId::well_known("unknown-caller"));
    let sender = Some(recipient_of_invocation);
    match outcome {
        Ok(InvocationResult::Success { payload, manifest }) => {
            Envelope::response(recipient, sender, call_id, manifest, payload)
        }
        Ok(InvocationResult::Void) => Envelope::response(
            recipient,
            sender,
            call_id,
            SerializationManifest::new(default_serializer_id, "Void"),
            Bytes::new(),
        ),
        Ok(InvocationResult::Failure { payload, manifest, error_type_hint }) => Envelope::error(
            recipient,
            sender,
            call_id,
            SerializationManifest::new(manifest.serializer_id, error_type_hint),
            payload,
        ),
        Err(e) => {
            // `ActorNotFound` carries the bare id so the caller can
            // reconstruct `ActorEdgeError::ActorNotFound` exactly; every
            // other runtime error only needs to round-trip as a message.
            let message = match &e {
                ActorEdgeError::ActorNotFound(id) => id.as_str().to_string(),
                other => other.to_string(),
            };
            let (payload, manifest) = registry
                .serialize(default_serializer_id, &message, error_kind_name(&e))
                .unwrap_or_else(|_| (Bytes::from_static(b"\"internal error\""), SerializationManifest::new(default_serializer_id, "Unknown")));
            Envelope::error(recipient, sender, call_id, manifest, payload)
        }
    }
    .expect("call_id was taken from a well-formed envelope and is therefore non-empty")
}

fn error_kind_name(error: &ActorEdgeError) -> &'static str {
    match error {
        ActorEdgeError::ActorNotFound(_) => "ActorNotFound",
        ActorEdgeError::UnknownTarget(_) => "UnknownTarget",
        ActorEdgeError::UnknownType(_) => "UnknownType",
        ActorEdgeError::MissingArgument(_) => "MissingArgument",
        ActorEdgeError::SerializationFailure { .. } => "SerializationFailure",
        ActorEdgeError::Timeout => "Timeout",
        ActorEdgeError::Disconnected => "Disconnected",
        ActorEdgeError::TransportUnavailable => "TransportUnavailable",
        ActorEdgeError::SendFailed { .. } => "SendFailed",
        _ => "RemoteCallGeneric",
    }
}
