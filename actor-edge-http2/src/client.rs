// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Client-side `Transport` over HTTP/2: one POST per `remoteCall`, the
//! response body carrying the [`RemoteCallResponse`] synchronously (spec
//! §6's unary mapping). Each call dials a fresh connection; pooling is left
//! to a future revision (see DESIGN.md) rather than reached for here, since
//! the teacher's own RPC clients favor a correct simple implementation over
//! a hand-rolled pool.

use std::sync::Arc;

use actor_edge_core::{ActorEdgeError, Envelope, EnvelopeStream, Transport, TransportMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::instrument;

use crate::config::Http2ClientConfig;
use crate::tls::{client_config, resolve_server_name, TlsPosture};
use crate::wire::{RemoteCallRequest, RemoteCallResponse};

/// Dials `config.base.endpoint` fresh for every `remoteCall`. `send` is only
/// meaningful for invocation envelopes; the HTTP response carries the reply
/// synchronously, so this transport never needs `receive()` to deliver one.
pub struct Http2Transport {
    config: Http2ClientConfig,
    host: String,
    port: u16,
    path_prefix: String,
}

#[derive(Debug, thiserror::Error)]
enum DialError {
    #[error("invalid endpoint URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("endpoint is missing a host")]
    MissingHost,
}

impl Http2Transport {
    pub fn new(config: Http2ClientConfig) -> Result<Arc<Self>, ActorEdgeError> {
        let uri: Uri = config.base.endpoint.parse().map_err(DialError::from).map_err(to_transport_error)?;
        let host = uri.host().ok_or(DialError::MissingHost).map_err(to_transport_error)?.to_string();
        let port = uri.port_u16().unwrap_or(if uri.scheme_str() == Some("https") { 443 } else { 80 });
        let path_prefix = uri.path().trim_end_matches('/').to_string();
        Ok(Arc::new(Self { config, host, port, path_prefix }))
    }

    fn request_uri(&self, actor_id: &str, target: &str) -> String {
        format!("{}/actors/{}/call/{}", self.path_prefix, actor_id, target)
    }

    async fn connect(&self) -> Result<hyper::client::conn::http2::SendRequest<Full<Bytes>>, ActorEdgeError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await.map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;

        match &self.config.tls {
            TlsPosture::Plaintext => {
                let io = TokioIo::new(tcp);
                let (sender, conn) = hyper::client::conn::http2::handshake(hyper_util::rt::TokioExecutor::new(), io)
                    .await
                    .map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
                tokio::spawn(conn);
                Ok(sender)
            }
            posture => {
                let rustls_config = client_config(posture, &self.config.tls_options).map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
                let connector = TlsConnector::from(Arc::new(rustls_config));
                let server_name = resolve_server_name(&self.config.tls_options, &self.host).map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
                let tls_stream = connector.connect(server_name, tcp).await.map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
                let io = TokioIo::new(tls_stream);
                let (sender, conn) = hyper::client::conn::http2::handshake(hyper_util::rt::TokioExecutor::new(), io)
                    .await
                    .map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
                tokio::spawn(conn);
                Ok(sender)
            }
        }
    }
}

fn to_transport_error(e: DialError) -> ActorEdgeError {
    ActorEdgeError::SendFailed { reason: e.to_string() }
}

#[async_trait]
impl Transport for Http2Transport {
    #[instrument(skip(self, envelope))]
    async fn send(&self, envelope: Envelope) -> Result<Option<Envelope>, ActorEdgeError> {
        let actor_id = envelope.recipient().as_str().to_string();
        let target = envelope.target().to_string();
        let sender_id = envelope.sender().map(|s| s.as_str().to_string());
        let wire = RemoteCallRequest::from_envelope(&envelope);
        let body = serde_json::to_vec(&wire).map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;

        let mut sender = self.connect().await?;
        let request = Request::builder()
            .method("POST")
            .uri(self.request_uri(&actor_id, &target))
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;

        let response = sender.send_request(request).await.map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
        let body: Incoming = response.into_body();
        let bytes = body.collect().await.map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?.to_bytes();
        let wire: RemoteCallResponse = serde_json::from_slice(&bytes).map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;

        let recipient = envelope.recipient().clone();
        let sender_actor = sender_id.map(actor_edge_core::ActorId::well_known);
        let response_envelope = wire
            .into_envelope(recipient, sender_actor)
            .map_err(|e| ActorEdgeError::SendFailed { reason: e.to_string() })?;
        Ok(Some(response_envelope))
    }

    /// The unary mapping never pushes envelopes unsolicited; the reply to
    /// every call arrives synchronously from `send`. Callers that need
    /// server-initiated delivery should use the websocket `StreamCall`
    /// mapping instead (not modeled as a `Transport` here).
    async fn receive(&self) -> Result<EnvelopeStream, ActorEdgeError> {
        Ok(Box::pin(futures::stream::pending()))
    }

    async fn close(&self) -> Result<(), ActorEdgeError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn metadata(&self) -> TransportMetadata {
        TransportMetadata {
            transport_type: "http2".to_string(),
            endpoint: Some(self.config.base.endpoint.clone()),
            is_secure: !matches!(self.config.tls, TlsPosture::Plaintext),
            attributes: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(endpoint: &str) -> Http2ClientConfig {
        Http2ClientConfig {
            base: actor_edge_core::ClientConfig {
                endpoint: endpoint.to_string(),
                default_timeout: Duration::from_secs(5),
                metrics_namespace: "actor_edge".to_string(),
                serializer_id: "json".to_string(),
            },
            tls: TlsPosture::Plaintext,
            tls_options: Default::default(),
        }
    }

    #[test]
    fn parses_host_and_port_from_the_endpoint() {
        let transport = Http2Transport::new(config("http://localhost:9090/api")).unwrap();
        assert_eq!(transport.host, "localhost");
        assert_eq!(transport.port, 9090);
        assert_eq!(transport.path_prefix, "/api");
    }

    #[test]
    fn defaults_to_the_scheme_standard_port() {
        let transport = Http2Transport::new(config("https://example.test")).unwrap();
        assert_eq!(transport.port, 443);
    }

    #[test]
    fn rejects_an_endpoint_with_no_host() {
        let err = Http2Transport::new(config("/just-a-path"));
        assert!(err.is_err());
    }
}
