// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transport-agnostic core of the ActorEdge distributed-object RPC runtime:
//! the invocation pipeline, actor registry, pending-call table and the
//! [`system::DistributedActorSystem`] that ties them together.
//!
//! Concrete transports (in-memory, HTTP/2) live in downstream crates and
//! depend only on [`transport::Transport`] and [`envelope::Envelope`] from
//! here.

pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod id;
pub mod invocation;
pub mod manifest;
pub mod metrics;
pub mod pending;
pub mod registry;
pub mod serialization;
pub mod system;
pub mod transport;

pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMetadata, MessageKind};
pub use error::ActorEdgeError;
pub use handler::{ResponseSink, ResultHandler};
pub use id::ActorId;
pub use invocation::{Argument, InvocationData, InvocationDecoder, InvocationEncoder, InvocationResult, TypeTag, WellKnownType};
pub use manifest::SerializationManifest;
pub use metrics::Metrics;
pub use pending::PendingCallTable;
pub use registry::{ActorRegistry, DistributedTarget};
pub use serialization::{JsonSerializer, Serializer, SerializerRegistry};
pub use system::{ActorProxy, CallError, DistributedActorSystem, Resolution};
pub use transport::{EnvelopeStream, Transport, TransportMetadata};
