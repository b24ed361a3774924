// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! HTTP/2 mapping of the ActorEdge wire protocol (spec §6): an axum server
//! exposing a unary `RemoteCall` endpoint and a `StreamCall` websocket, and a
//! hyper + rustls client `Transport` implementation for dialing it.

pub mod client;
pub mod config;
pub mod server;
pub mod tls;
pub mod wire;

pub use client::Http2Transport;
pub use config::{Http2ClientConfig, Http2ClientConfigBuilder, Http2ServerConfig, Http2ServerConfigBuilder};
pub use server::{router, serve};
pub use tls::{CertSource, Identity, ServerCertVerification, TlsClientOptions, TlsError, TlsPosture};
