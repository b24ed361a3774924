// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The axum side of the HTTP/2 mapping: a unary `RemoteCall` POST handler and
//! a `StreamCall` websocket handler, both dispatching through
//! [`DistributedActorSystem::dispatch_invocation`] (spec §6).

use std::net::SocketAddr;
use std::sync::Arc;

use actor_edge_core::{ActorId, DistributedActorSystem, Envelope};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument, warn};

use crate::config::Http2ServerConfig;
use crate::tls::{server_config as rustls_server_config, TlsPosture};
use crate::wire::{RemoteCallRequest, RemoteCallResponse, RemoteStreamPacket};

/// Builds the axum [`Router`] that exposes `system` over HTTP/2. Can be
/// served directly (plaintext) or wrapped by [`serve`] for a TLS posture.
pub fn router(system: Arc<DistributedActorSystem>) -> Router {
    Router::new()
        .route("/actors/{actor_id}/call/{target}", post(call_handler))
        .route("/actors/{actor_id}/stream", get(stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(system)
}

#[instrument(skip(system, body))]
async fn call_handler(
    State(system): State<Arc<DistributedActorSystem>>,
    Path((actor_id, target)): Path<(String, String)>,
    Json(body): Json<RemoteCallRequest>,
) -> Response {
    let recipient = ActorId::well_known(actor_id);
    let envelope = match body.into_envelope(recipient, &target) {
        Ok(envelope) => envelope,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let response = system.dispatch_invocation(envelope).await;
    let wire = RemoteCallResponse::from_envelope(&response);
    Json(wire).into_response()
}

/// Upgrades to a websocket carrying [`RemoteStreamPacket`] frames in both
/// directions. Every frame this connection sends in is run through
/// `dispatch_invocation`; the reply is written back out on the same socket,
/// so a single connection can multiplex many outstanding calls the way a
/// client's `run_inbound_loop` expects.
async fn stream_handler(
    State(system): State<Arc<DistributedActorSystem>>,
    Path(actor_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, system, actor_id))
}

async fn handle_stream(socket: WebSocket, system: Arc<DistributedActorSystem>, _actor_id: String) {
    let (mut sink, mut stream) = socket.split();
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "websocket stream closed with an error");
                break;
            }
        };
        let Message::Text(text) = message else { continue };
        let packet: RemoteStreamPacket = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping malformed stream packet");
                continue;
            }
        };
        let envelope: Envelope = match packet.into_envelope() {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "dropping malformed stream packet envelope");
                continue;
            }
        };
        let response = system.dispatch_invocation(envelope).await;
        let reply = RemoteStreamPacket::from_envelope(&response);
        let text = match serde_json::to_string(&reply) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to encode stream reply");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

/// Serves `router` at `addr` under the TLS posture named by `config`.
/// `Plaintext` serves directly; any other posture terminates TLS itself
/// using `tokio-rustls` ahead of hyper, since this crate does not pull in a
/// dedicated TLS-serving crate on top of axum.
pub async fn serve(addr: SocketAddr, config: &Http2ServerConfig, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    match &config.tls {
        TlsPosture::Plaintext => {
            axum::serve(listener, router.into_make_service()).await
        }
        posture => {
            let rustls_config = rustls_server_config(posture)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let acceptor = TlsAcceptor::from(Arc::new(rustls_config));
            serve_tls(listener, acceptor, router).await
        }
    }
}

async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, router: Router) -> std::io::Result<()> {
    loop {
        let (stream, _peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let router = router.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "TLS handshake failed");
                    return;
                }
            };
            let service = hyper::service::service_fn(move |req| {
                let mut router = router.clone();
                async move {
                    use tower::ServiceExt;
                    router.as_service().oneshot(req).await
                }
            });
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(hyper_util::rt::TokioIo::new(tls_stream), service)
                .await
            {
                warn!(error = %e, "connection terminated with an error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actor_edge_core::{ActorEdgeError, InvocationDecoder, InvocationEncoder, ResultHandler, Metrics, SerializerRegistry};
    use async_trait::async_trait;
    use prometheus_client::registry::Registry;

    use super::*;

    struct EchoActor;

    #[async_trait]
    impl actor_edge_core::DistributedTarget for EchoActor {
        async fn invoke(&self, target: &str, mut decoder: InvocationDecoder, handler: ResultHandler) -> Result<(), ActorEdgeError> {
            match target {
                "echo" => {
                    let value: String = decoder.decode_next_argument()?;
                    handler.on_return(value).await
                }
                other => handler.on_throw_opaque("UnknownTarget", format!("no such target '{other}'")).await,
            }
        }
    }

    fn build_system() -> Arc<DistributedActorSystem> {
        let registry = SerializerRegistry::default();
        let mut prom = Registry::default();
        let system = Arc::new(DistributedActorSystem::new(
            Arc::new(registry),
            "json",
            Duration::from_secs(5),
            None,
            Arc::new(Metrics::new("actor_edge_test", &mut prom)),
        ));
        let id = ActorId::well_known("echo-actor");
        system.reserve_well_known(id.clone()).unwrap();
        system.actor_ready(&id, Arc::new(EchoActor)).unwrap();
        system
    }

    #[tokio::test]
    async fn call_handler_dispatches_through_the_system() {
        let system = build_system();
        let mut encoder = InvocationEncoder::new(system.serializer_registry().clone(), "json".to_string());
        encoder.record_argument(&"hi".to_string()).unwrap();
        encoder.done_recording().unwrap();
        let data = encoder.finalize().unwrap();
        let (payload, manifest) = system.serializer_registry().serialize("json", &data, "InvocationData").unwrap();
        let envelope = Envelope::invocation(
            ActorId::well_known("echo-actor"),
            None,
            "echo",
            manifest,
            payload,
            Some("c-1".to_string()),
            Default::default(),
        )
        .unwrap();
        let request = RemoteCallRequest::from_envelope(&envelope);

        let response = call_handler(
            State(system),
            Path(("echo-actor".to_string(), "echo".to_string())),
            Json(request),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
