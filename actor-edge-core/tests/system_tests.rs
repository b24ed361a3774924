// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end coverage of the testable properties named across the
//! distributed-object RPC spec: local short-circuit, round trip through a
//! transport, void calls, domain-error reconstruction, unknown-actor
//! handling, and timeout cleanup of the pending-call table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};

use actor_edge_core::{
    ActorEdgeError, ActorId, CallError, DistributedActorSystem, DistributedTarget, Envelope, EnvelopeStream,
    InvocationDecoder, Metrics, ResultHandler, SerializerRegistry, Transport, TransportMetadata,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct NotFoundError {
    message: String,
}

struct EchoActor;

#[async_trait]
impl DistributedTarget for EchoActor {
    async fn invoke(&self, target: &str, mut decoder: InvocationDecoder, handler: ResultHandler) -> Result<(), ActorEdgeError> {
        match target {
            "echo" => {
                let value: String = decoder.decode_next_argument()?;
                handler.on_return(value).await
            }
            "boom" => handler.on_throw(NotFoundError { message: "nope".to_string() }).await,
            "slow" => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                handler.on_return_void().await
            }
            other => Err(ActorEdgeError::UnknownTarget(other.to_string())),
        }
    }
}

/// A transport that answers every `send` synchronously by running the
/// invocation straight through a server-side system -- enough to exercise
/// the pending-call table and timeout cleanup without sockets.
struct LoopbackTransport {
    server: Arc<DistributedActorSystem>,
    connected: AtomicBool,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, envelope: Envelope) -> Result<Option<Envelope>, ActorEdgeError> {
        if !self.is_connected() {
            return Err(ActorEdgeError::Disconnected);
        }
        Ok(Some(self.server.dispatch_invocation(envelope).await))
    }

    async fn receive(&self) -> Result<EnvelopeStream, ActorEdgeError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn close(&self) -> Result<(), ActorEdgeError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> TransportMetadata {
        TransportMetadata { transport_type: "loopback".to_string(), ..Default::default() }
    }
}

fn new_system(transport: Option<Arc<dyn Transport>>, timeout: Duration, namespace: &str) -> Arc<DistributedActorSystem> {
    let serializers = Arc::new(SerializerRegistry::default());
    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(namespace, &mut registry));
    Arc::new(DistributedActorSystem::new(serializers, "json", timeout, transport, metrics))
}

fn build_server() -> (Arc<DistributedActorSystem>, ActorId) {
    let server = new_system(None, Duration::from_secs(30), "server");
    let id = ActorId::well_known("echo-actor");
    server.reserve_well_known(id.clone()).unwrap();
    server.actor_ready(&id, Arc::new(EchoActor)).unwrap();
    (server, id)
}

fn build_client(server: Arc<DistributedActorSystem>, timeout: Duration) -> Arc<DistributedActorSystem> {
    let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport { server, connected: AtomicBool::new(true) });
    new_system(Some(transport), timeout, "client")
}

#[tokio::test]
async fn local_short_circuit_echoes_without_a_transport() {
    let (server, id) = build_server();
    let mut encoder = server.new_encoder();
    encoder.record_argument(&"hi".to_string()).unwrap();
    encoder.done_recording().unwrap();
    let reply: String = server.remote_call(id, "echo", encoder, None).await.unwrap();
    assert_eq!(reply, "hi");
}

#[tokio::test]
async fn remote_call_round_trips_through_a_transport() {
    let (server, id) = build_server();
    let client = build_client(server, Duration::from_secs(5));

    let mut encoder = client.new_encoder();
    encoder.record_argument(&"over the wire".to_string()).unwrap();
    encoder.done_recording().unwrap();
    let reply: String = client.remote_call(id, "echo", encoder, None).await.unwrap();
    assert_eq!(reply, "over the wire");
    assert_eq!(client.pending_call_count(), 0);
}

#[tokio::test]
async fn remote_call_void_completes_without_a_return_value() {
    let (server, id) = build_server();
    let client = build_client(server, Duration::from_secs(5));

    let mut encoder = client.new_encoder();
    encoder.done_recording().unwrap();
    client.remote_call_void(id, "slow", encoder, Some(Duration::from_millis(500))).await.unwrap();
}

#[tokio::test]
async fn domain_error_is_reconstructed_through_remote_call_fallible() {
    let (server, id) = build_server();
    let client = build_client(server, Duration::from_secs(5));

    let mut encoder = client.new_encoder();
    encoder.done_recording().unwrap();
    let err = client.remote_call_fallible::<(), NotFoundError>(id, "boom", encoder, None).await.unwrap_err();
    match err {
        CallError::Domain(e) => assert_eq!(e.message, "nope"),
        CallError::Runtime(e) => panic!("expected a domain error, got {e}"),
    }
}

#[tokio::test]
async fn calling_an_unregistered_actor_surfaces_actor_not_found() {
    let (server, _id) = build_server();
    let client = build_client(server, Duration::from_secs(5));

    let ghost = ActorId::well_known("ghost");
    let mut encoder = client.new_encoder();
    encoder.done_recording().unwrap();
    let err = client.remote_call_void(ghost, "echo", encoder, None).await.unwrap_err();
    match err {
        ActorEdgeError::ActorNotFound(id) => assert_eq!(id.as_str(), "ghost"),
        other => panic!("expected ActorNotFound, got {other}"),
    }
}

#[tokio::test]
async fn calling_without_a_transport_or_a_local_actor_is_transport_unavailable() {
    let client = new_system(None, Duration::from_secs(5), "no-transport");
    let ghost = ActorId::well_known("ghost");
    let mut encoder = client.new_encoder();
    encoder.done_recording().unwrap();
    let err = client.remote_call_void(ghost, "echo", encoder, None).await.unwrap_err();
    assert!(matches!(err, ActorEdgeError::TransportUnavailable));
}

#[tokio::test]
async fn a_timed_out_call_is_removed_from_the_pending_table() {
    let (server, id) = build_server();
    let client = build_client(server, Duration::from_millis(20));

    let mut encoder = client.new_encoder();
    encoder.done_recording().unwrap();
    let err = client.remote_call_void(id, "slow", encoder, None).await.unwrap_err();
    assert!(matches!(err, ActorEdgeError::Timeout));
    assert_eq!(client.pending_call_count(), 0);
}
