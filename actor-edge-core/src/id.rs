// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Minimum number of hex characters in a system-assigned [`ActorId`].
const MIN_GENERATED_LEN: usize = 8;

/// Process-unique opaque identifier for an actor.
///
/// An `ActorId` is either well-known (caller supplied, e.g. a stable name a
/// server preregisters) or system-assigned (random lowercase hex, at least
/// [`MIN_GENERATED_LEN`] characters). Equality is by value; both kinds are
/// interchangeable once constructed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Wraps a caller-supplied, well-known name. Any non-empty printable
    /// string is accepted; well-known ids are not required to match the
    /// system-assigned hex format.
    pub fn well_known(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a fresh system-assigned id: lowercase hex, 16 characters.
    /// Collision across a process is astronomically unlikely but is not
    /// itself guaranteed here -- callers allocate through a registry that
    /// enforces uniqueness (see [`crate::registry::ActorRegistry::assign_id`]).
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 8] = rng.gen();
        Self(hex_lower(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this id matches the system-assigned format `^[0-9a-f]{8,}$`.
    pub fn is_system_assigned_format(&self) -> bool {
        self.0.len() >= MIN_GENERATED_LEN
            && self.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String cannot fail");
    }
    s
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::well_known(s)
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self::well_known(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_canonical_format() {
        for _ in 0..64 {
            let id = ActorId::generate();
            assert!(id.is_system_assigned_format(), "id was {id}");
            assert_eq!(id.as_str().len(), 16);
        }
    }

    #[test]
    fn well_known_ids_need_not_be_hex() {
        let id = ActorId::well_known("chat-1");
        assert_eq!(id.as_str(), "chat-1");
        assert!(!id.is_system_assigned_format());
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(ActorId::well_known("ghost"), ActorId::from("ghost"));
    }
}
