// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use derive_builder::Builder;

/// Server knobs common to every transport (spec §4.J / §6). TLS posture is
/// transport-specific and layered on top by `actor-edge-http2`, which embeds
/// this struct rather than duplicating `host`/`port`/`timeout`.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct ServerConfig {
    #[builder(default = "\"127.0.0.1\".to_string()")]
    pub host: String,
    #[builder(default = "8000")]
    pub port: u16,
    #[builder(default = "1000")]
    pub max_connections: usize,
    #[builder(default = "Duration::from_secs(30)")]
    pub timeout: Duration,
    #[builder(default = "\"actor_edge\".to_string()")]
    pub metrics_namespace: String,
    /// Well-known actor ids the server preregisters so clients can resolve
    /// them by a stable name (spec §4.E).
    #[builder(default)]
    pub well_known_actor_ids: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::default().build().expect("all fields have defaults")
    }
}

/// Client knobs common to every transport.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct ClientConfig {
    pub endpoint: String,
    #[builder(default = "Duration::from_secs(30)")]
    pub default_timeout: Duration,
    #[builder(default = "\"actor_edge\".to_string()")]
    pub metrics_namespace: String,
    #[builder(default = "\"json\".to_string()")]
    pub serializer_id: String,
}
