// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ActorEdgeError;
use crate::manifest::SerializationManifest;

/// A pluggable codec, looked up by `serializerID`. The registry stores
/// serializers behind `dyn` so new ones can be registered at runtime; the
/// object-safety problem that generic `serialize<T>`/`deserialize<T>` would
/// otherwise create is solved with `erased_serde`, the standard way to put
/// `serde::Serialize`/`Deserialize` behind a trait object.
pub trait Serializer: Send + Sync {
    /// The `serializerID` this implementation registers under.
    fn id(&self) -> &'static str;

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>, ActorEdgeError>;

    fn decode<'de>(
        &self,
        bytes: &'de [u8],
    ) -> Result<Box<dyn erased_serde::Deserializer<'de> + 'de>, ActorEdgeError>;
}

/// The built-in `"json"` serializer. Round-trips plain `Codable`-shaped data
/// through `serde_json`; map key ordering is whatever `serde_json` produces
/// and is not guaranteed stable, per the spec.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn id(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>, ActorEdgeError> {
        serde_json::to_vec(value).map_err(|e| ActorEdgeError::SerializationFailure {
            manifest: SerializationManifest::new("json", ""),
            reason: e.to_string(),
        })
    }

    fn decode<'de>(
        &self,
        bytes: &'de [u8],
    ) -> Result<Box<dyn erased_serde::Deserializer<'de> + 'de>, ActorEdgeError> {
        let de = serde_json::Deserializer::from_slice(bytes);
        Ok(Box::new(<dyn erased_serde::Deserializer>::erase(de)))
    }
}

/// Lookup table of serializers keyed by `serializerID`. Holds at least the
/// `"json"` serializer; additional implementations (e.g. CBOR) can be
/// registered by a host application without changing this crate.
pub struct SerializerRegistry {
    serializers: HashMap<&'static str, Arc<dyn Serializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut registry = Self { serializers: HashMap::new() };
        registry.register(Arc::new(JsonSerializer));
        registry
    }
}

impl SerializerRegistry {
    pub fn empty() -> Self {
        Self { serializers: HashMap::new() }
    }

    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(serializer.id(), serializer);
    }

    fn lookup(&self, id: &str) -> Result<&Arc<dyn Serializer>, ActorEdgeError> {
        self.serializers.get(id).ok_or_else(|| ActorEdgeError::UnknownSerializer(id.to_string()))
    }

    /// Serializes `value`, returning the payload and a manifest that
    /// uniquely identifies the serializer used (`type_hint` is advisory).
    pub fn serialize<T: Serialize + ?Sized>(
        &self,
        serializer_id: &str,
        value: &T,
        type_hint: impl Into<String>,
    ) -> Result<(Bytes, SerializationManifest), ActorEdgeError> {
        let serializer = self.lookup(serializer_id)?;
        let bytes = serializer.encode(value).map_err(|e| match e {
            ActorEdgeError::SerializationFailure { reason, .. } => ActorEdgeError::SerializationFailure {
                manifest: SerializationManifest::new(serializer_id, ""),
                reason,
            },
            other => other,
        })?;
        Ok((Bytes::from(bytes), SerializationManifest::new(serializer_id, type_hint)))
    }

    /// Deserializes `bytes` into `T` using the serializer named in `manifest`.
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        manifest: &SerializationManifest,
    ) -> Result<T, ActorEdgeError> {
        let serializer = self.lookup(&manifest.serializer_id)?;
        let mut deserializer = serializer.decode(bytes)?;
        erased_serde::deserialize(&mut *deserializer).map_err(|e| ActorEdgeError::SerializationFailure {
            manifest: manifest.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn json_round_trips_plain_data() {
        let registry = SerializerRegistry::default();
        let p = Point { x: 1, y: -2 };
        let (bytes, manifest) = registry.serialize("json", &p, "Point").unwrap();
        assert_eq!(manifest.serializer_id, "json");
        let back: Point = registry.deserialize(&bytes, &manifest).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn unknown_serializer_id_is_rejected() {
        let registry = SerializerRegistry::default();
        let err = registry.serialize("msgpack", &1i32, "Int").unwrap_err();
        assert!(matches!(err, ActorEdgeError::UnknownSerializer(id) if id == "msgpack"));
    }
}
