//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The message bus: a single logical bidirectional pub/sub connection to
//! the subordinate interpreter. See spec.md §4.1.

pub mod frame;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use self::frame::Frame;
use crate::errors::Error;
use crate::errors::Result;

/// Channel names used by the server are namespaced before hitting the wire;
/// the interpreter side is expected to strip this same prefix.
const NAMESPACE: &str = "/app";

/// Lifecycle events for the underlying connection, delivered to any listener
/// registered via [`Bus::subscribe_lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// An opaque handle identifying a live topic listener. Owned by whoever
/// created it; must be released with [`Bus::unsubscribe`] by that same
/// owner.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: Uuid,
    channel: String,
}

struct Inner {
    subscribers: Mutex<HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<Value>)>>>,
    outbound: mpsc::UnboundedSender<Frame>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
    closed: AtomicBool,
    api_key: Option<String>,
}

/// The bus handle shared by every feature provider and indexer. Cloning a
/// `Bus` is cheap; all clones see the same underlying connection.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    /// Wraps a raw outbound frame sender (as produced by
    /// [`transport::spawn`]) into a `Bus`. The caller is responsible for
    /// feeding inbound frames to [`Bus::deliver`] as they arrive.
    pub fn new(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self::with_api_key(outbound, None)
    }

    /// Like [`Bus::new`], but stamps every outgoing frame with `api_key`.
    /// Used for owned-process connections, which authenticate this way
    /// instead of trusting the TLS session alone (spec.md §4.1).
    pub fn with_api_key(outbound: mpsc::UnboundedSender<Frame>, api_key: Option<String>) -> Self {
        let (lifecycle, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                outbound,
                lifecycle,
                closed: AtomicBool::new(false),
                api_key,
            }),
        }
    }

    /// Fire-and-forget publish. Fails silently if the connection is closed,
    /// per spec.md §4.1.
    pub fn publish(&self, channel: &str, payload: Value) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let frame = Frame::with_api_key(format!("{NAMESPACE}{channel}"), payload, self.inner.api_key.clone());
        // A send error here means the writer task has already torn down;
        // that's equivalent to publishing on a closed bus.
        let _ = self.inner.outbound.send(frame);
    }

    /// Registers a listener for `channel` (including channels formed by
    /// appending a correlation id to a base channel). Returns a receiver
    /// that yields one `Value` per message delivered on the topic.
    pub fn subscribe(&self, channel: impl Into<String>) -> Result<(Subscription, mpsc::UnboundedReceiver<Value>)> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::TransportClosed);
        }

        let channel = channel.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(channel.clone())
            .or_default()
            .push((id, tx));

        Ok((Subscription { id, channel }, rx))
    }

    /// Idempotent: after this returns, no further handler invocation for
    /// `subscription` is guaranteed.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        if let Some(list) = subscribers.get_mut(&subscription.channel) {
            list.retain(|(id, _)| *id != subscription.id);
            if list.is_empty() {
                subscribers.remove(&subscription.channel);
            }
        }
    }

    /// Returns a process-unique string suitable for appending to a base
    /// channel to form a private reply inbox.
    pub fn allocate_channel_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.lifecycle.subscribe()
    }

    /// Feeds an inbound wire frame to the dispatcher. Called by the reader
    /// task; the channel prefix added by the peer (if any) is stripped
    /// before matching against locally registered subscribers.
    pub fn deliver(&self, frame: Frame) {
        let channel = frame
            .channel
            .strip_prefix(NAMESPACE)
            .unwrap_or(&frame.channel);

        let subscribers = self.inner.subscribers.lock().unwrap();
        if let Some(list) = subscribers.get(channel) {
            for (_, tx) in list {
                // Ignore failures: a dropped receiver just means the
                // subscriber already moved on (e.g. it hit its own timeout).
                let _ = tx.send(frame.payload.clone());
            }
        } else {
            log::trace!("no subscriber for channel '{channel}'; dropping message");
        }
    }

    /// Marks the connection closed: further `publish` calls are no-ops,
    /// further `subscribe` calls fail, and any listener on the lifecycle
    /// channel is notified.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return; // already closed
        }
        self.inner.subscribers.lock().unwrap().clear();
        let _ = self.inner.lifecycle.send(ConnectionEvent::Disconnected);
    }

    pub fn notify_connected(&self) {
        let _ = self.inner.lifecycle.send(ConnectionEvent::Connected);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Implements the request/response pattern described in spec.md §4.1 and
    /// §4.8: allocate a correlation id, subscribe to the reply topic,
    /// publish the request with the id embedded, await exactly one reply
    /// (or time out), and unsubscribe either way.
    ///
    /// `embed_id` is given the allocated id and must return the request
    /// payload with that id mixed in, since the shape of "where the id
    /// goes" differs per channel pair (some embed it in the payload body,
    /// others only in the response channel name).
    pub async fn request_reply(
        &self,
        request_channel: &str,
        response_channel_base: &str,
        timeout: Duration,
        embed_id: impl FnOnce(&str) -> Value,
    ) -> Result<Value> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::TransportClosed);
        }

        let id = self.allocate_channel_id();
        let response_channel = format!("{response_channel_base}/{id}");
        let (subscription, mut rx) = self.subscribe(response_channel)?;

        self.publish(request_channel, embed_id(&id));

        let result = tokio::time::timeout(timeout, rx.recv()).await;
        self.unsubscribe(subscription);

        match result {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Error::TransportClosed),
            Err(_) => Err(Error::InterpreterUnavailable),
        }
    }
}

/// Spawns a background task that pumps frames from `incoming_rx` (as fed by
/// the transport's reader half) into `bus.deliver`. Kept separate from
/// `Bus` itself so the bus has no direct knowledge of the transport.
pub fn spawn_dispatch_loop(bus: Bus, mut incoming_rx: mpsc::UnboundedReceiver<Frame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = incoming_rx.recv().await {
            bus.deliver(frame);
        }
        bus.close();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_on_closed_bus_is_silent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        bus.close();
        bus.publish("/formatDocument/request", serde_json::json!({}));
    }

    #[tokio::test]
    async fn subscribe_on_closed_bus_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        bus.close();
        assert!(matches!(bus.subscribe("/linting/request"), Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn delivered_frame_reaches_subscriber() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        let (_sub, mut rx) = bus.subscribe("/indexDocument/response").unwrap();

        bus.deliver(Frame::new("/app/indexDocument/response", serde_json::json!({"ok": true})));

        let value = rx.recv().await.unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        let (sub, _rx2) = bus.subscribe("/foo").unwrap();
        bus.unsubscribe(sub.clone());
        bus.unsubscribe(sub);
    }
}
