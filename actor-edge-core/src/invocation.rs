// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Apple-ordered recording and replay of one method invocation.
//!
//! The mandated sequence is a small state machine: generics (0+), arguments
//! (0+, in declaration order), return type (0 or 1), error type (0 or 1),
//! `doneRecording`. We represent it as an explicit [`Stage`] enum rather than
//! fusing recording with serialization, so the encoder can still be handed
//! to a local decoder without ever touching the wire (see
//! [`InvocationDecoder::from_local`]).

use std::any::{type_name, Any};
use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ActorEdgeError;
use crate::manifest::SerializationManifest;
use crate::serialization::SerializerRegistry;

/// Bound satisfied by every type that can cross the invocation boundary:
/// it must serialize for the remote path and stay cheaply cloneable for the
/// local short-circuit path (see module docs).
pub trait Argument: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T> Argument for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A generic substitution or return/error type name.
///
/// Recorded type names are the fully qualified name the source language
/// reflects at the call site; this specification treats them as opaque
/// strings with a canonical mapping for primitives. Unknown names are
/// tolerated by the decoder and never cause a failure on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    WellKnown(WellKnownType),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownType {
    String,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bytes,
}

impl TypeTag {
    pub fn of<T: ?Sized>() -> Self {
        Self::from(type_name::<T>())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::WellKnown(w) => w.canonical_name(),
            TypeTag::Other(s) => s,
        }
    }
}

impl WellKnownType {
    fn canonical_name(self) -> &'static str {
        match self {
            WellKnownType::String => "String",
            WellKnownType::Bool => "Bool",
            WellKnownType::I8 => "Int8",
            WellKnownType::I16 => "Int16",
            WellKnownType::I32 => "Int32",
            WellKnownType::I64 => "Int",
            WellKnownType::U8 => "UInt8",
            WellKnownType::U16 => "UInt16",
            WellKnownType::U32 => "UInt32",
            WellKnownType::U64 => "UInt",
            WellKnownType::F32 => "Float",
            WellKnownType::F64 => "Double",
            WellKnownType::Bytes => "Bytes",
        }
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        let well_known = match name {
            "alloc::string::String" | "&str" | "str" | "String" => Some(WellKnownType::String),
            "bool" | "Bool" => Some(WellKnownType::Bool),
            "i8" => Some(WellKnownType::I8),
            "i16" => Some(WellKnownType::I16),
            "i32" => Some(WellKnownType::I32),
            "i64" | "Int" => Some(WellKnownType::I64),
            "u8" => Some(WellKnownType::U8),
            "u16" => Some(WellKnownType::U16),
            "u32" => Some(WellKnownType::U32),
            "u64" | "UInt" => Some(WellKnownType::U64),
            "f32" | "Float" => Some(WellKnownType::F32),
            "f64" | "Double" => Some(WellKnownType::F64),
            _ => None,
        };
        match well_known {
            Some(w) => TypeTag::WellKnown(w),
            None => TypeTag::Other(name.to_string()),
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of one call, produced by [`InvocationEncoder::finalize`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InvocationData {
    pub generic_substitutions: Vec<String>,
    #[serde(with = "arg_bytes")]
    pub arguments: Vec<Bytes>,
    pub argument_manifests: Vec<SerializationManifest>,
    pub is_void: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type_hint: Option<String>,
}

mod arg_bytes {
    use bytes::Bytes;
    use serde::{Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Bytes], s: S) -> Result<S::Ok, S::Error> {
        let raw: Vec<&[u8]> = items.iter().map(|b| b.as_ref()).collect();
        raw.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Bytes>, D::Error> {
        let raw: Vec<Vec<u8>> = serde::Deserialize::deserialize(d)?;
        Ok(raw.into_iter().map(Bytes::from).collect())
    }
}

impl InvocationData {
    /// `|arguments| == |argumentManifests|`, checked at construction sites
    /// (the encoder is the only constructor in practice).
    pub fn arity_is_consistent(&self) -> bool {
        self.arguments.len() == self.argument_manifests.len()
    }
}

/// Tagged outcome of one invocation, as produced by a [`crate::handler::ResultHandler`].
#[derive(Debug, Clone)]
pub enum InvocationResult {
    Success { payload: Bytes, manifest: SerializationManifest },
    Void,
    Failure { payload: Bytes, manifest: SerializationManifest, error_type_hint: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Generics,
    Arguments,
    ReturnType,
    ErrorType,
    Done,
}

/// One locally-held argument, serialized eagerly and also kept as a typed
/// clone so a same-process call can skip the wire entirely.
struct RecordedArgument {
    bytes: Bytes,
    manifest: SerializationManifest,
    local: Arc<dyn Any + Send + Sync>,
}

/// Records generics, arguments, return type and error type in the mandated
/// order, then [`finalize`](Self::finalize)s into an [`InvocationData`].
pub struct InvocationEncoder {
    registry: Arc<SerializerRegistry>,
    serializer_id: String,
    stage: Stage,
    generics: Vec<String>,
    arguments: Vec<RecordedArgument>,
    is_void: bool,
    return_type_hint: Option<String>,
    error_type_hint: Option<String>,
}

impl InvocationEncoder {
    pub fn new(registry: Arc<SerializerRegistry>, serializer_id: impl Into<String>) -> Self {
        Self {
            registry,
            serializer_id: serializer_id.into(),
            stage: Stage::Generics,
            generics: Vec::new(),
            arguments: Vec::new(),
            is_void: true,
            return_type_hint: None,
            error_type_hint: None,
        }
    }

    fn require_stage_at_most(&self, max: Stage) -> Result<(), ActorEdgeError> {
        if self.stage_index() > Self::stage_index_of(max) {
            return Err(ActorEdgeError::InvalidRecordingOrder(stage_name(self.stage)));
        }
        Ok(())
    }

    fn stage_index(&self) -> u8 {
        Self::stage_index_of(self.stage)
    }

    fn stage_index_of(stage: Stage) -> u8 {
        match stage {
            Stage::Generics => 0,
            Stage::Arguments => 1,
            Stage::ReturnType => 2,
            Stage::ErrorType => 3,
            Stage::Done => 4,
        }
    }

    pub fn record_generic_substitution<T: ?Sized>(&mut self) -> Result<(), ActorEdgeError> {
        self.require_stage_at_most(Stage::Generics)?;
        self.generics.push(TypeTag::of::<T>().to_string());
        Ok(())
    }

    pub fn record_argument<T: Argument>(&mut self, value: &T) -> Result<(), ActorEdgeError> {
        self.require_stage_at_most(Stage::Arguments)?;
        self.stage = Stage::Arguments;
        let (bytes, manifest) = self.registry.serialize(&self.serializer_id, value, TypeTag::of::<T>())?;
        self.arguments.push(RecordedArgument { bytes, manifest, local: Arc::new(value.clone()) });
        Ok(())
    }

    pub fn record_return_type<T: ?Sized>(&mut self) -> Result<(), ActorEdgeError> {
        self.require_stage_at_most(Stage::ReturnType)?;
        self.stage = Stage::ReturnType;
        self.is_void = false;
        self.return_type_hint = Some(TypeTag::of::<T>().to_string());
        Ok(())
    }

    pub fn record_error_type<E: ?Sized>(&mut self) -> Result<(), ActorEdgeError> {
        self.require_stage_at_most(Stage::ErrorType)?;
        self.stage = Stage::ErrorType;
        self.error_type_hint = Some(TypeTag::of::<E>().to_string());
        Ok(())
    }

    pub fn done_recording(&mut self) -> Result<(), ActorEdgeError> {
        if self.stage == Stage::Done {
            return Err(ActorEdgeError::InvalidRecordingOrder("doneRecording"));
        }
        self.stage = Stage::Done;
        Ok(())
    }

    /// Produces the wire form. Requires `doneRecording()` to have run.
    pub fn finalize(self) -> Result<InvocationData, ActorEdgeError> {
        if self.stage != Stage::Done {
            return Err(ActorEdgeError::RecordingNotDone);
        }
        let mut arguments = Vec::with_capacity(self.arguments.len());
        let mut argument_manifests = Vec::with_capacity(self.arguments.len());
        for arg in &self.arguments {
            arguments.push(arg.bytes.clone());
            argument_manifests.push(arg.manifest.clone());
        }
        Ok(InvocationData {
            generic_substitutions: self.generics,
            arguments,
            argument_manifests,
            is_void: self.is_void,
            return_type_hint: self.return_type_hint,
            error_type_hint: self.error_type_hint,
        })
    }

    /// Builds a decoder that replays this encoder's arguments from their
    /// typed clones, skipping byte serialization entirely. Used for the
    /// local-call short-circuit (spec §4.C, §9).
    pub fn into_local_decoder(self) -> Result<InvocationDecoder, ActorEdgeError> {
        if self.stage != Stage::Done {
            return Err(ActorEdgeError::RecordingNotDone);
        }
        Ok(InvocationDecoder::Local {
            generics: self.generics,
            arguments: self.arguments.into_iter().map(|a| a.local).collect(),
            is_void: self.is_void,
            return_type_hint: self.return_type_hint,
            error_type_hint: self.error_type_hint,
        })
    }
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Generics => "recordGenericSubstitution",
        Stage::Arguments => "recordArgument",
        Stage::ReturnType => "recordReturnType",
        Stage::ErrorType => "recordErrorType",
        Stage::Done => "doneRecording",
    }
}

/// Symmetric replay of an [`InvocationEncoder`]'s recording, either from
/// wire bytes (`Remote`) or directly from the encoder's typed values
/// (`Local`).
pub enum InvocationDecoder {
    Remote { data: InvocationData, registry: Arc<SerializerRegistry>, cursor: usize },
    Local {
        generics: Vec<String>,
        arguments: VecDeque<Arc<dyn Any + Send + Sync>>,
        is_void: bool,
        return_type_hint: Option<String>,
        error_type_hint: Option<String>,
    },
}

impl InvocationDecoder {
    pub fn from_wire(data: InvocationData, registry: Arc<SerializerRegistry>) -> Self {
        Self::Remote { data, registry, cursor: 0 }
    }

    pub fn decode_generic_substitutions(&self) -> Vec<TypeTag> {
        let names: &[String] = match self {
            InvocationDecoder::Remote { data, .. } => &data.generic_substitutions,
            InvocationDecoder::Local { generics, .. } => generics,
        };
        names.iter().map(|n| TypeTag::from(n.as_str())).collect()
    }

    /// Consumes exactly one argument slot, in declaration order.
    pub fn decode_next_argument<T: Argument>(&mut self) -> Result<T, ActorEdgeError> {
        match self {
            InvocationDecoder::Remote { data, registry, cursor } => {
                if *cursor >= data.arguments.len() {
                    return Err(ActorEdgeError::MissingArgument(*cursor));
                }
                let bytes = &data.arguments[*cursor];
                let manifest = &data.argument_manifests[*cursor];
                *cursor += 1;
                registry.deserialize(bytes, manifest)
            }
            InvocationDecoder::Local { arguments, .. } => {
                let position = arguments.len();
                let value = arguments
                    .pop_front()
                    .ok_or(ActorEdgeError::MissingArgument(position))?;
                value
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| ActorEdgeError::UnknownType(TypeTag::of::<T>().to_string()))
            }
        }
    }

    pub fn decode_return_type(&self) -> Option<TypeTag> {
        let hint = match self {
            InvocationDecoder::Remote { data, .. } => data.return_type_hint.as_deref(),
            InvocationDecoder::Local { return_type_hint, .. } => return_type_hint.as_deref(),
        };
        hint.map(TypeTag::from)
    }

    pub fn decode_error_type(&self) -> Option<TypeTag> {
        let hint = match self {
            InvocationDecoder::Remote { data, .. } => data.error_type_hint.as_deref(),
            InvocationDecoder::Local { error_type_hint, .. } => error_type_hint.as_deref(),
        };
        hint.map(TypeTag::from)
    }

    pub fn is_void(&self) -> bool {
        match self {
            InvocationDecoder::Remote { data, .. } => data.is_void,
            InvocationDecoder::Local { is_void, .. } => *is_void,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<SerializerRegistry> {
        Arc::new(SerializerRegistry::default())
    }

    #[test]
    fn out_of_order_generic_after_argument_is_rejected() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_argument(&"hi".to_string()).unwrap();
        let err = enc.record_generic_substitution::<String>().unwrap_err();
        assert!(matches!(err, ActorEdgeError::InvalidRecordingOrder(_)));
    }

    #[test]
    fn finalize_before_done_recording_fails() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_argument(&1i32).unwrap();
        let err = enc.finalize().unwrap_err();
        assert!(matches!(err, ActorEdgeError::RecordingNotDone));
    }

    #[test]
    fn recording_after_done_fails() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.done_recording().unwrap();
        let err = enc.record_argument(&1i32).unwrap_err();
        assert!(matches!(err, ActorEdgeError::InvalidRecordingOrder(_)));
    }

    #[test]
    fn round_trip_over_the_wire() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_generic_substitution::<String>().unwrap();
        enc.record_argument(&"hi".to_string()).unwrap();
        enc.record_argument(&42i32).unwrap();
        enc.record_return_type::<String>().unwrap();
        enc.record_error_type::<String>().unwrap();
        enc.done_recording().unwrap();
        let data = enc.finalize().unwrap();
        assert!(data.arity_is_consistent());

        let mut dec = InvocationDecoder::from_wire(data, registry());
        assert_eq!(dec.decode_generic_substitutions(), vec![TypeTag::WellKnown(WellKnownType::String)]);
        let a: String = dec.decode_next_argument().unwrap();
        let b: i32 = dec.decode_next_argument().unwrap();
        assert_eq!(a, "hi");
        assert_eq!(b, 42);
        assert_eq!(dec.decode_return_type(), Some(TypeTag::WellKnown(WellKnownType::String)));
        assert_eq!(dec.decode_error_type(), Some(TypeTag::WellKnown(WellKnownType::String)));
    }

    #[test]
    fn decoding_past_the_last_argument_fails() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_argument(&1i32).unwrap();
        enc.done_recording().unwrap();
        let data = enc.finalize().unwrap();
        let mut dec = InvocationDecoder::from_wire(data, registry());
        let _: i32 = dec.decode_next_argument().unwrap();
        let err = dec.decode_next_argument::<i32>().unwrap_err();
        assert!(matches!(err, ActorEdgeError::MissingArgument(1)));
    }

    #[test]
    fn local_short_circuit_skips_serialization_but_matches_remote_ordering() {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_argument(&"hi".to_string()).unwrap();
        enc.record_argument(&7u32).unwrap();
        enc.done_recording().unwrap();
        let mut dec = enc.into_local_decoder().unwrap();
        let a: String = dec.decode_next_argument().unwrap();
        let b: u32 = dec.decode_next_argument().unwrap();
        assert_eq!(a, "hi");
        assert_eq!(b, 7);
    }

    #[quickcheck_macros::quickcheck]
    fn round_trip_preserves_arbitrary_string_and_int_arguments(s: String, n: i64) -> bool {
        let mut enc = InvocationEncoder::new(registry(), "json");
        enc.record_argument(&s).unwrap();
        enc.record_argument(&n).unwrap();
        enc.done_recording().unwrap();
        let data = enc.finalize().unwrap();
        let mut dec = InvocationDecoder::from_wire(data, registry());
        let s2: String = dec.decode_next_argument().unwrap();
        let n2: i64 = dec.decode_next_argument().unwrap();
        s2 == s && n2 == n
    }
}
