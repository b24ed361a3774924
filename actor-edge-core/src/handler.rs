// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Polymorphic outcome sink for one invocation: either a local continuation
//! (same-process caller awaiting a `oneshot`) or a remote response writer.
//! Both shapes share one operation set, so we model them as a sum type
//! behind a single handle rather than reaching for dynamic dispatch over an
//! existential -- a sum type is enough and reads better (spec §9).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ActorEdgeError;
use crate::invocation::{Argument, InvocationResult};
use crate::manifest::SerializationManifest;
use crate::serialization::SerializerRegistry;

/// Capability the remote side of a handler writes a response envelope
/// through. Implemented by transports (or by the distributed actor system
/// on their behalf); kept separate from the envelope/transport crates so
/// `actor-edge-core` has no transport dependency.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send_result(&self, call_id: &str, result: InvocationResult) -> Result<(), ActorEdgeError>;
}

enum Sink {
    Local(oneshot::Sender<Result<InvocationResult, ActorEdgeError>>),
    Remote { call_id: String, writer: Arc<dyn ResponseSink> },
}

/// At most one of `on_return`/`on_return_void`/`on_throw` may complete
/// successfully per instance; later calls fail with
/// [`ActorEdgeError::HandlerAlreadyCompleted`].
#[derive(Clone)]
pub struct ResultHandler {
    registry: Arc<SerializerRegistry>,
    serializer_id: String,
    sink: Arc<Mutex<Option<Sink>>>,
}

impl ResultHandler {
    pub fn local(
        registry: Arc<SerializerRegistry>,
        serializer_id: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<InvocationResult, ActorEdgeError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self { registry, serializer_id: serializer_id.into(), sink: Arc::new(Mutex::new(Some(Sink::Local(tx)))) },
            rx,
        )
    }

    pub fn remote(
        registry: Arc<SerializerRegistry>,
        serializer_id: impl Into<String>,
        call_id: impl Into<String>,
        writer: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            registry,
            serializer_id: serializer_id.into(),
            sink: Arc::new(Mutex::new(Some(Sink::Remote { call_id: call_id.into(), writer }))),
        }
    }

    fn take(&self) -> Result<Sink, ActorEdgeError> {
        self.sink.lock().take().ok_or(ActorEdgeError::HandlerAlreadyCompleted)
    }

    pub async fn on_return<T: Argument>(&self, value: T) -> Result<(), ActorEdgeError> {
        let (payload, manifest) = self.registry.serialize(&self.serializer_id, &value, std::any::type_name::<T>())?;
        self.complete(InvocationResult::Success { payload, manifest }).await
    }

    pub async fn on_return_void(&self) -> Result<(), ActorEdgeError> {
        self.complete(InvocationResult::Void).await
    }

    pub async fn on_throw<E: Argument>(&self, error: E) -> Result<(), ActorEdgeError> {
        let type_hint = std::any::type_name::<E>().to_string();
        let (payload, manifest) = self.registry.serialize(&self.serializer_id, &error, type_hint.clone())?;
        self.complete(InvocationResult::Failure { payload, manifest, error_type_hint: type_hint }).await
    }

    /// Sends an opaque failure for an error that could not be serialized,
    /// carrying a stable type hint and a human-readable message.
    pub async fn on_throw_opaque(&self, type_hint: impl Into<String>, message: impl Into<String>) -> Result<(), ActorEdgeError> {
        let manifest = SerializationManifest::new(&self.serializer_id, "RemoteCallGeneric");
        let payload = Bytes::from(message.into().into_bytes());
        self.complete(InvocationResult::Failure { payload, manifest, error_type_hint: type_hint.into() }).await
    }

    async fn complete(&self, result: InvocationResult) -> Result<(), ActorEdgeError> {
        match self.take()? {
            Sink::Local(tx) => {
                // A dropped receiver (caller cancelled/timed out) is not an
                // error for the callee: the handler still completed exactly once.
                let _ = tx.send(Ok(result));
                Ok(())
            }
            Sink::Remote { call_id, writer } => writer.send_result(&call_id, result).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_completion_is_rejected() {
        let registry = Arc::new(SerializerRegistry::default());
        let (handler, rx) = ResultHandler::local(registry, "json");
        handler.on_return_void().await.unwrap();
        let err = handler.on_return_void().await.unwrap_err();
        assert!(matches!(err, ActorEdgeError::HandlerAlreadyCompleted));
        assert!(matches!(rx.await.unwrap().unwrap(), InvocationResult::Void));
    }

    #[tokio::test]
    async fn on_throw_carries_type_hint() {
        let registry = Arc::new(SerializerRegistry::default());
        let (handler, rx) = ResultHandler::local(registry, "json");
        handler.on_throw("not found".to_string()).await.unwrap();
        match rx.await.unwrap().unwrap() {
            InvocationResult::Failure { error_type_hint, .. } => assert!(error_type_hint.contains("String")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
