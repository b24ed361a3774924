// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ActorEdgeError;
use crate::handler::ResultHandler;
use crate::id::ActorId;
use crate::invocation::InvocationDecoder;

/// A locally hosted actor that can serve invocations received over any
/// transport. Implementations typically come from generated code; here we
/// expose an explicit method table via [`DistributedTarget::invoke`] rather
/// than a macro-generated dispatcher (spec §9).
#[async_trait]
pub trait DistributedTarget: Send + Sync {
    /// Invokes the method named `target`, driving `decoder` in the mandated
    /// order and routing the outcome through `handler`. Returns
    /// `Err(ActorEdgeError::UnknownTarget)` if this actor has no such method.
    async fn invoke(
        &self,
        target: &str,
        decoder: InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), ActorEdgeError>;
}

enum Slot {
    /// `assignID` has run, but `actorReady` has not (yet).
    Assigned,
    /// `actorReady` has run; lookups now succeed.
    Ready(Arc<dyn DistributedTarget>),
}

/// `assignID` / `actorReady` / `resignID` / `find`, backed by a
/// `parking_lot::RwLock`-guarded map. Any correct synchronization
/// discipline satisfies the spec; a single sharded-free `RwLock` is
/// sufficient at the scale this runtime targets and keeps `find` O(1).
#[derive(Default)]
pub struct ActorRegistry {
    slots: RwLock<HashMap<ActorId, Slot>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh system-assigned id and marks it live but not yet ready.
    pub fn assign_id(&self) -> ActorId {
        loop {
            let id = ActorId::generate();
            let mut slots = self.slots.write();
            if !slots.contains_key(&id) {
                slots.insert(id.clone(), Slot::Assigned);
                return id;
            }
            // Collision within a process is astronomically unlikely; retry rather
            // than panic so the caller never observes it.
        }
    }

    /// Registers a well-known id directly into the `Assigned` state, so a
    /// server can preregister stable names before calling `actor_ready`.
    pub fn reserve_well_known(&self, id: ActorId) -> Result<(), ActorEdgeError> {
        let mut slots = self.slots.write();
        if slots.contains_key(&id) {
            return Err(ActorEdgeError::InvalidRecordingOrder("actor id already assigned"));
        }
        slots.insert(id, Slot::Assigned);
        Ok(())
    }

    /// Registers the actor under a previously assigned id. May be called
    /// exactly once per id; a second call is rejected.
    pub fn actor_ready(&self, id: &ActorId, actor: Arc<dyn DistributedTarget>) -> Result<(), ActorEdgeError> {
        let mut slots = self.slots.write();
        match slots.get(id) {
            Some(Slot::Assigned) => {
                slots.insert(id.clone(), Slot::Ready(actor));
                Ok(())
            }
            Some(Slot::Ready(_)) => Err(ActorEdgeError::InvalidRecordingOrder("actorReady called twice")),
            None => Err(ActorEdgeError::ActorNotFound(id.clone())),
        }
    }

    /// Removes the id. Idempotent-ish: removing an id that was never
    /// assigned is a no-op, matching "an id is live from assignID until
    /// resignID" (there is nothing to resign before assignment).
    pub fn resign_id(&self, id: &ActorId) {
        self.slots.write().remove(id);
    }

    /// O(1) average lookup; only succeeds once the id is `Ready`.
    pub fn find(&self, id: &ActorId) -> Option<Arc<dyn DistributedTarget>> {
        match self.slots.read().get(id) {
            Some(Slot::Ready(actor)) => Some(actor.clone()),
            _ => None,
        }
    }

    pub fn is_live(&self, id: &ActorId) -> bool {
        self.slots.read().contains_key(id)
    }
}
