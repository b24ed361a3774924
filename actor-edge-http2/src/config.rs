// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! HTTP/2-specific configuration: the transport-neutral `ServerConfig`/
//! `ClientConfig` from `actor-edge-core`, plus the TLS posture this mapping
//! layers on top of them (spec §6).

use actor_edge_core::config::{ClientConfig, ServerConfig};
use derive_builder::Builder;

use crate::tls::{TlsClientOptions, TlsPosture};

/// Everything needed to stand up the axum-based server: the shared knobs
/// from `actor-edge-core::config::ServerConfig`, plus the TLS posture it
/// terminates connections under.
#[derive(Clone, Builder)]
#[builder(setter(into), build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct Http2ServerConfig {
    #[builder(default)]
    pub base: ServerConfig,
    #[builder(default = "TlsPosture::Plaintext")]
    pub tls: TlsPosture,
}

impl Default for Http2ServerConfig {
    fn default() -> Self {
        Http2ServerConfigBuilder::default().build().expect("all fields have defaults")
    }
}

/// Everything needed to dial a server over HTTP/2: the shared client knobs,
/// the TLS posture to connect under, and the client-only TLS knobs (SNI
/// override, ALPN requirement) that have no transport-neutral equivalent.
#[derive(Clone, Builder)]
#[builder(setter(into), build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct Http2ClientConfig {
    pub base: ClientConfig,
    #[builder(default = "TlsPosture::SystemDefault")]
    pub tls: TlsPosture,
    #[builder(default)]
    pub tls_options: TlsClientOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults_to_plaintext() {
        let cfg = Http2ServerConfig::default();
        assert!(matches!(cfg.tls, TlsPosture::Plaintext));
        assert_eq!(cfg.base.port, 8000);
    }

    #[test]
    fn client_config_defaults_to_system_trust_store() {
        let base = ClientConfig { endpoint: "https://example.test".to_string(), default_timeout: std::time::Duration::from_secs(30), metrics_namespace: "actor_edge".to_string(), serializer_id: "json".to_string() };
        let cfg = Http2ClientConfigBuilder::default().base(base).build().unwrap();
        assert!(matches!(cfg.tls, TlsPosture::SystemDefault));
        assert!(!cfg.tls_options.alpn_required);
    }
}
