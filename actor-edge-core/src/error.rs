// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::id::ActorId;
use crate::manifest::SerializationManifest;

/// Runtime-level error taxonomy. The invocation pipeline, handler and actor
/// system only propagate these upward -- none of them attempt recovery.
///
/// Domain errors thrown by a target method are a separate axis, represented
/// by [`crate::system::CallError`] rather than folded in here, so that a
/// caller can re-raise the original error type when it is serializable.
#[derive(Debug, thiserror::Error)]
pub enum ActorEdgeError {
    /// A recording or decoding operation was invoked out of the mandated order.
    #[error("invocation recording performed out of order: {0}")]
    InvalidRecordingOrder(&'static str),

    /// `finalize()` was called before `doneRecording()`.
    #[error("finalize() called before doneRecording()")]
    RecordingNotDone,

    /// A [`crate::handler::ResultHandler`] completion method was invoked more than once.
    #[error("result handler already completed this call")]
    HandlerAlreadyCompleted,

    /// `decodeNextArgument` was called with no arguments left to consume.
    #[error("no argument left to decode at position {0}")]
    MissingArgument(usize),

    /// `executeDistributedTarget` could not find the named method on the actor.
    #[error("actor has no target named '{0}'")]
    UnknownTarget(String),

    /// A decoded generic substitution or type hint could not be resolved locally.
    #[error("unknown type name '{0}'")]
    UnknownType(String),

    /// Encoding or decoding a payload through the serializer registry failed.
    #[error("serialization failed for manifest {manifest:?}: {reason}")]
    SerializationFailure { manifest: SerializationManifest, reason: String },

    /// No serializer is registered under the given id.
    #[error("no serializer registered for id '{0}'")]
    UnknownSerializer(String),

    /// The addressed actor is not registered in the local registry.
    #[error("actor '{0}' not found")]
    ActorNotFound(ActorId),

    /// No transport is attached to the system performing the call.
    #[error("no transport available for this call")]
    TransportUnavailable,

    /// The transport (or the connection backing it) has been closed.
    #[error("transport disconnected")]
    Disconnected,

    /// The transport failed to send the envelope.
    #[error("transport send failed: {reason}")]
    SendFailed { reason: String },

    /// The per-call deadline elapsed before a response arrived.
    #[error("call timed out")]
    Timeout,

    /// A target method threw an error that could not be faithfully
    /// reconstructed as a concrete type on the caller side.
    #[error("remote call failed ({type_hint}): {message}")]
    RemoteCallGeneric { type_hint: String, message: String },
}

impl ActorEdgeError {
    /// The `result` dimension this error should be recorded under in metrics.
    pub fn metric_result(&self) -> &'static str {
        match self {
            ActorEdgeError::Timeout => "timeout",
            ActorEdgeError::RemoteCallGeneric { .. } => "domain_error",
            _ => "transport_error",
        }
    }
}
