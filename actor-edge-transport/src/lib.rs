// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The in-memory reference [`Transport`] (spec §4.H), in the two
//! configurations the spec names: a [`InMemoryTransport::pair`]ed loopback
//! used by tests and single-process hosting, and a
//! [`InMemoryTransport::with_handler`] instance that maps each request to an
//! optional response through a user-installed closure, with no second
//! endpoint at all. Both configurations are inherently secure -- there is no
//! untrusted intermediary between the two ends of a process's own memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actor_edge_core::{ActorEdgeError, Envelope, EnvelopeStream, Transport, TransportMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 1024;

/// A user-installed closure mapping one request envelope to an optional
/// response envelope, the shape `InMemoryTransport::with_handler` installs.
pub type HandlerFn = Box<dyn Fn(Envelope) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send>> + Send + Sync>;

enum Mode {
    /// `send` delivers to the paired endpoint's `receive()` stream; `close`
    /// on either side drops both of its channel halves so the peer observes
    /// `Disconnected` on its own next `send`/`receive` (FIFO per direction,
    /// spec §4.H).
    Paired {
        outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
        inbound: Mutex<Option<mpsc::Receiver<Envelope>>>,
    },
    /// `send` invokes the installed closure synchronously and returns
    /// whatever it produces; there is no paired endpoint and `receive()`
    /// yields an empty stream.
    Handler(HandlerFn),
}

/// The in-memory reference [`Transport`]. Construct with [`Self::pair`] for
/// a linked loopback, or [`Self::with_handler`] for a single instance backed
/// by a request/response closure.
pub struct InMemoryTransport {
    mode: Mode,
    connected: AtomicBool,
    metadata: TransportMetadata,
}

impl InMemoryTransport {
    /// Builds two linked transports: envelopes sent on one arrive on the
    /// other's `receive()` stream, in FIFO order per direction.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (tx_ab, rx_ab) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_ba, rx_ba) = mpsc::channel(CHANNEL_CAPACITY);
        let a = Arc::new(Self::paired(tx_ab, rx_ba, "in-memory-a"));
        let b = Arc::new(Self::paired(tx_ba, rx_ab, "in-memory-b"));
        (a, b)
    }

    fn paired(outbound: mpsc::Sender<Envelope>, inbound: mpsc::Receiver<Envelope>, endpoint: &str) -> Self {
        Self {
            mode: Mode::Paired { outbound: Mutex::new(Some(outbound)), inbound: Mutex::new(Some(inbound)) },
            connected: AtomicBool::new(true),
            metadata: TransportMetadata {
                transport_type: "in-memory".to_string(),
                endpoint: Some(endpoint.to_string()),
                is_secure: true,
                attributes: Default::default(),
            },
        }
    }

    /// Builds a single instance whose `send` is answered entirely by
    /// `handler`: no second endpoint, no `receive()` traffic. Useful for
    /// tests that want to stub a peer without standing up a real pair.
    pub fn with_handler<F, Fut>(handler: F) -> Arc<Self>
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Envelope>> + Send + 'static,
    {
        let boxed: HandlerFn = Box::new(move |envelope| Box::pin(handler(envelope)));
        Arc::new(Self {
            mode: Mode::Handler(boxed),
            connected: AtomicBool::new(true),
            metadata: TransportMetadata {
                transport_type: "in-memory".to_string(),
                endpoint: None,
                is_secure: true,
                attributes: Default::default(),
            },
        })
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, envelope: Envelope) -> Result<Option<Envelope>, ActorEdgeError> {
        if !self.is_connected() {
            return Err(ActorEdgeError::Disconnected);
        }
        match &self.mode {
            Mode::Paired { outbound, .. } => {
                let sender = outbound.lock().clone();
                let sender = sender.ok_or(ActorEdgeError::Disconnected)?;
                sender.send(envelope).await.map_err(|_| ActorEdgeError::Disconnected)?;
                Ok(None)
            }
            Mode::Handler(handler) => Ok(handler(envelope).await),
        }
    }

    async fn receive(&self) -> Result<EnvelopeStream, ActorEdgeError> {
        match &self.mode {
            Mode::Paired { inbound, .. } => {
                let receiver = inbound.lock().take().ok_or(ActorEdgeError::Disconnected)?;
                Ok(Box::pin(ReceiverStream::new(receiver)))
            }
            Mode::Handler(_) => Ok(Box::pin(futures::stream::empty())),
        }
    }

    async fn close(&self) -> Result<(), ActorEdgeError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Mode::Paired { outbound, inbound } = &self.mode {
            // Dropping both halves is what makes the *other* endpoint observe
            // the close: its next `send` fails once our receiver is gone,
            // and its `receive()` stream ends once our sender is gone.
            outbound.lock().take();
            inbound.lock().take();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_edge_core::{ActorId, SerializationManifest};
    use bytes::Bytes;
    use futures::StreamExt;

    fn envelope(call_id: &str) -> Envelope {
        Envelope::invocation(
            ActorId::well_known("dest"),
            None,
            "echo",
            SerializationManifest::new("json", "String"),
            Bytes::from_static(b"\"hi\""),
            Some(call_id.to_string()),
            Default::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn envelopes_sent_on_one_end_arrive_on_the_other() {
        let (a, b) = InMemoryTransport::pair();
        assert!(a.send(envelope("c-1")).await.unwrap().is_none());

        let mut stream = b.receive().await.unwrap();
        let received = stream.next().await.unwrap();
        assert_eq!(received.call_id(), "c-1");
        assert_eq!(received.target(), "echo");
    }

    #[tokio::test]
    async fn paired_transport_reports_itself_as_secure() {
        let (a, b) = InMemoryTransport::pair();
        assert!(a.metadata().is_secure);
        assert!(b.metadata().is_secure);
    }

    #[tokio::test]
    async fn receive_can_only_be_taken_once() {
        let (a, _b) = InMemoryTransport::pair();
        a.receive().await.unwrap();
        let err = a.receive().await.unwrap_err();
        assert!(matches!(err, ActorEdgeError::Disconnected));
    }

    #[tokio::test]
    async fn closed_transport_rejects_further_sends() {
        let (a, _b) = InMemoryTransport::pair();
        a.close().await.unwrap();
        assert!(!a.is_connected());
        let err = a.send(envelope("c-1")).await.unwrap_err();
        assert!(matches!(err, ActorEdgeError::Disconnected));
    }

    #[tokio::test]
    async fn closing_one_end_surfaces_as_disconnected_on_the_other() {
        let (a, b) = InMemoryTransport::pair();
        a.close().await.unwrap();

        // b's inbound stream (fed by a's now-dropped sender) ends rather
        // than hanging.
        let mut stream = b.receive().await.unwrap();
        assert!(stream.next().await.is_none());

        // b's send (into a's now-dropped receiver) fails.
        let err = b.send(envelope("c-2")).await.unwrap_err();
        assert!(matches!(err, ActorEdgeError::Disconnected));
    }

    #[tokio::test]
    async fn handler_backed_instance_answers_send_synchronously() {
        let transport = InMemoryTransport::with_handler(|req| async move {
            Some(
                Envelope::response(
                    req.recipient().clone(),
                    None,
                    req.call_id(),
                    SerializationManifest::new("json", "String"),
                    Bytes::from_static(b"\"hi\""),
                )
                .unwrap(),
            )
        });

        let response = transport.send(envelope("c-1")).await.unwrap().unwrap();
        assert_eq!(response.call_id(), "c-1");
        assert_eq!(response.payload().as_ref(), b"\"hi\"");
    }

    #[tokio::test]
    async fn handler_backed_instance_has_no_inbound_traffic() {
        let transport = InMemoryTransport::with_handler(|_req| async { None });
        let mut stream = transport.receive().await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
