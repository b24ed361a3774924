// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ActorEdgeError;
use crate::invocation::InvocationResult;

type Waiter = oneshot::Sender<Result<InvocationResult, ActorEdgeError>>;

/// Client-side table of in-flight calls, keyed by `callID`. Timeout
/// cancellation removes the entry synchronously with the check, so a
/// response that arrives afterwards finds nothing to resolve and is
/// silently dropped (spec §5, "Timeout cleanup").
#[derive(Default)]
pub struct PendingCallTable {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter under `call_id`, returning the receiver half.
    pub fn register(&self, call_id: impl Into<String>) -> oneshot::Receiver<Result<InvocationResult, ActorEdgeError>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(call_id.into(), tx);
        rx
    }

    /// Resolves the waiter for `call_id`, if still present. Returns `true`
    /// if a waiter was found and completed (the correlation property from
    /// spec §8: the response's `callID` must match a still-pending request).
    pub fn complete(&self, call_id: &str, result: Result<InvocationResult, ActorEdgeError>) -> bool {
        if let Some(tx) = self.waiters.lock().remove(call_id) {
            let _ = tx.send(result);
            true
        } else {
            false
        }
    }

    /// Removes the waiter without resolving it -- used on timeout/cancel so
    /// a later response for the same `call_id` finds nothing and is dropped.
    pub fn remove(&self, call_id: &str) {
        self.waiters.lock().remove(call_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails every still-pending waiter with `Disconnected` -- used when the
    /// channel backing them is lost (spec §5, "a channel-wide fault fails
    /// all waiters on that channel uniformly").
    pub fn fail_all(&self) {
        let mut waiters = self.waiters.lock();
        for (_, tx) in waiters.drain() {
            let _ = tx.send(Err(ActorEdgeError::Disconnected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completing_an_unknown_call_id_is_a_no_op() {
        let table = PendingCallTable::new();
        assert!(!table.complete("ghost", Ok(InvocationResult::Void)));
    }

    #[tokio::test]
    async fn timeout_removal_discards_a_late_response() {
        let table = PendingCallTable::new();
        let rx = table.register("c-1");
        table.remove("c-1");
        assert!(table.is_empty());
        // A late response for the same id now finds nothing to resolve.
        assert!(!table.complete("c-1", Ok(InvocationResult::Void)));
        drop(rx);
    }

    #[tokio::test]
    async fn fail_all_resolves_every_waiter_with_disconnected() {
        let table = PendingCallTable::new();
        let rx1 = table.register("c-1");
        let rx2 = table.register("c-2");
        table.fail_all();
        assert!(matches!(rx1.await.unwrap(), Err(ActorEdgeError::Disconnected)));
        assert!(matches!(rx2.await.unwrap(), Err(ActorEdgeError::Disconnected)));
        assert!(table.is_empty());
    }
}
