// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

/// Metadata identifying the serializer and (advisory) type hint for a payload.
///
/// The wire shape is fixed by the spec: `{ "serializerID", "typeHint",
/// "version" }`. Unknown fields on the wire MUST be ignored, which is the
/// default `serde` behaviour as long as we never add `#[serde(deny_unknown_fields)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializationManifest {
    pub serializer_id: String,
    #[serde(default)]
    pub type_hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SerializationManifest {
    pub fn new(serializer_id: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self { serializer_id: serializer_id.into(), type_hint: type_hint.into(), version: None }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
