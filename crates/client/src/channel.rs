//! A named logical pipe multiplexed over one transport connection.
//!
//! A `Channel` supports three interaction styles:
//! * `send` - fire-and-forget, never blocks on a reply
//! * `request` - send and await exactly one correlated reply
//! * `subscribe` / `wait_for_command` - receive unsolicited server pushes
//!
//! A dispatch task per channel consumes the inbound stream: replies whose
//! `ref` matches a pending request settle that request, everything else is
//! broadcast to subscribers in registration order. When the inbound stream
//! ends (transport closed), pending requests and subscriptions fail instead
//! of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use replkit_proto::Frame;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::RawChannel;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Value>,
}

struct ChannelInner {
    service: String,
    id: u32,
    outbound: mpsc::UnboundedSender<Frame>,
    next_ref: AtomicU64,
    next_subscriber: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    closed: AtomicBool,
}

/// Cloneable handle to one multiplexed channel. All clones share the same
/// underlying channel; a session never opens a second channel for the same
/// service name.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Wraps transport plumbing and spawns the dispatch loop.
    pub fn open(raw: RawChannel) -> Self {
        let inner = Arc::new(ChannelInner {
            service: raw.service,
            id: raw.id,
            outbound: raw.outbound,
            next_ref: AtomicU64::new(0),
            next_subscriber: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(dispatch(Arc::clone(&inner), raw.inbound));

        Self { inner }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Enqueues a message for transmission without waiting for any reply.
    pub fn send<T: Serialize>(&self, message: T) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        let body = serde_json::to_value(message)?;
        self.inner
            .outbound
            .send(Frame::command(self.inner.id, body))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Sends a message and awaits the correlated reply.
    ///
    /// A reply carrying an `error` field maps to [`Error::Channel`]; a
    /// transport that closes before the reply arrives maps to
    /// [`Error::ConnectionClosed`]. There is no built-in timeout.
    pub async fn request<T: Serialize>(&self, message: T) -> Result<Value> {
        let body = serde_json::to_value(message)?;
        let reference = format!(
            "{}.{}",
            self.inner.id,
            self.inner.next_ref.fetch_add(1, Ordering::SeqCst)
        );

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(reference.clone(), tx);

        if self
            .inner
            .outbound
            .send(Frame::request(self.inner.id, reference.clone(), body))
            .is_err()
        {
            self.inner.pending.lock().remove(&reference);
            return Err(Error::ConnectionClosed);
        }

        // The dispatch loop may have exited between the insert and the send;
        // its final sweep drops every pending sender, but a waiter registered
        // after the sweep would hang without this re-check.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.pending.lock().remove(&reference);
            return Err(Error::ConnectionClosed);
        }

        let reply = rx.await.map_err(|_| Error::ConnectionClosed)?;
        if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(Error::Channel(message));
        }
        Ok(reply)
    }

    /// Registers a subscriber for unsolicited commands on this channel.
    ///
    /// Subscribers receive commands in registration order. Dropping the
    /// returned stream unsubscribes.
    pub fn subscribe(&self) -> CommandStream {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        if self.inner.closed.load(Ordering::SeqCst) {
            // Dropping the sender makes the stream end immediately.
            drop(tx);
        } else {
            self.inner.subscribers.lock().push(Subscriber { id, tx });
        }
        CommandStream {
            id,
            rx,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Waits for the next unsolicited command, optionally bounded.
    ///
    /// `None` or a zero duration waits indefinitely. Exactly one of
    /// {command received, [`Error::Timeout`]} settles the wait, and the
    /// subscriber is removed on both paths.
    pub async fn wait_for_command(&self, timeout: Option<Duration>) -> Result<Value> {
        let mut stream = self.subscribe();
        let received = match timeout.filter(|t| !t.is_zero()) {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| Error::Timeout)?,
            None => stream.next().await,
        };
        received.ok_or(Error::ConnectionClosed)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Stream of unsolicited commands; unsubscribes from the channel on drop.
pub struct CommandStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    channel: Weak<ChannelInner>,
}

impl CommandStream {
    /// Next unsolicited command, or `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Already-delivered command, if any, without waiting.
    pub fn try_next(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

async fn dispatch(inner: Arc<ChannelInner>, mut inbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = inbound.recv().await {
        if let Some(reference) = &frame.reference {
            if let Some(waiter) = inner.pending.lock().remove(reference) {
                let _ = waiter.send(frame.body);
                continue;
            }
            debug!(
                target = "replkit.channel",
                service = %inner.service,
                %reference,
                "reply without a pending request"
            );
            continue;
        }

        // Broadcast in registration order, pruning closed subscribers.
        inner
            .subscribers
            .lock()
            .retain(|s| s.tx.send(frame.body.clone()).is_ok());
    }

    debug!(target = "replkit.channel", service = %inner.service, "channel closed");
    inner.closed.store(true, Ordering::SeqCst);
    inner.pending.lock().clear();
    inner.subscribers.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use replkit_proto::Frame;
    use serde_json::json;

    fn test_channel() -> (
        Channel,
        mpsc::UnboundedReceiver<Frame>,
        mpsc::UnboundedSender<Frame>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let channel = Channel::open(RawChannel {
            id: 7,
            service: "files".to_string(),
            outbound: out_tx,
            inbound: in_rx,
        });
        (channel, out_rx, in_tx)
    }

    #[tokio::test]
    async fn send_has_no_reference() {
        let (channel, mut sent, _in_tx) = test_channel();
        channel.send(json!({"input": "ls\n"})).unwrap();

        let frame = sent.recv().await.unwrap();
        assert_eq!(frame.channel, 7);
        assert!(frame.reference.is_none());
        assert_eq!(frame.body, json!({"input": "ls\n"}));
    }

    #[tokio::test]
    async fn request_resolves_with_correlated_reply() {
        let (channel, mut sent, in_tx) = test_channel();

        let request = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request(json!({"read": {"path": "main.py"}})).await }
        });

        let frame = sent.recv().await.unwrap();
        let reference = frame.reference.clone().unwrap();
        in_tx
            .send(Frame::request(7, reference, json!({"file": {"path": "main.py"}})))
            .unwrap();

        let reply = request.await.unwrap().unwrap();
        assert_eq!(reply["file"]["path"], "main.py");
    }

    #[tokio::test]
    async fn concurrent_requests_correlate_out_of_order() {
        let (channel, mut sent, in_tx) = test_channel();

        let first = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request(json!({"n": 1})).await }
        });
        let ref1 = sent.recv().await.unwrap().reference.unwrap();

        let second = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request(json!({"n": 2})).await }
        });
        let ref2 = sent.recv().await.unwrap().reference.unwrap();

        // Replies arrive in reverse order.
        in_tx.send(Frame::request(7, ref2, json!({"got": 2}))).unwrap();
        in_tx.send(Frame::request(7, ref1, json!({"got": 1}))).unwrap();

        assert_eq!(first.await.unwrap().unwrap()["got"], 1);
        assert_eq!(second.await.unwrap().unwrap()["got"], 2);
    }

    #[tokio::test]
    async fn request_maps_remote_error_reply() {
        let (channel, mut sent, in_tx) = test_channel();

        let request = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request(json!({"read": {"path": "nope"}})).await }
        });

        let reference = sent.recv().await.unwrap().reference.unwrap();
        in_tx
            .send(Frame::request(7, reference, json!({"error": "file not found"})))
            .unwrap();

        match request.await.unwrap() {
            Err(Error::Channel(message)) => assert_eq!(message, "file not found"),
            other => panic!("expected channel error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_fails_when_transport_closes() {
        let (channel, mut sent, in_tx) = test_channel();

        let request = tokio::spawn({
            let channel = channel.clone();
            async move { channel.request(json!({"read": {"path": "main.py"}})).await }
        });

        let _ = sent.recv().await.unwrap();
        drop(in_tx);

        assert!(matches!(
            request.await.unwrap(),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn subscribers_receive_commands_in_registration_order() {
        let (channel, _sent, in_tx) = test_channel();

        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        in_tx.send(Frame::command(7, json!({"output": "a"}))).unwrap();

        assert_eq!(first.next().await.unwrap()["output"], "a");
        assert_eq!(second.next().await.unwrap()["output"], "a");
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let (channel, _sent, _in_tx) = test_channel();

        let stream = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);
        drop(stream);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn wait_for_command_resolves_on_event() {
        let (channel, _sent, in_tx) = test_channel();
        let before = channel.subscriber_count();

        let wait = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .wait_for_command(Some(Duration::from_secs(5)))
                    .await
            }
        });
        // Let the waiter register before pushing.
        tokio::task::yield_now().await;
        in_tx.send(Frame::command(7, json!({"state": 0}))).unwrap();

        let command = wait.await.unwrap().unwrap();
        assert_eq!(command["state"], 0);
        assert_eq!(channel.subscriber_count(), before);
    }

    #[tokio::test]
    async fn wait_for_command_times_out_and_removes_subscriber() {
        let (channel, _sent, _in_tx) = test_channel();
        let before = channel.subscriber_count();

        let result = channel
            .wait_for_command(Some(Duration::from_millis(20)))
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(channel.subscriber_count(), before);
    }

    #[tokio::test]
    async fn zero_timeout_waits_indefinitely() {
        let (channel, _sent, in_tx) = test_channel();

        let wait = tokio::spawn({
            let channel = channel.clone();
            async move { channel.wait_for_command(Some(Duration::ZERO)).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        in_tx.send(Frame::command(7, json!({"output": "late"}))).unwrap();

        assert_eq!(wait.await.unwrap().unwrap()["output"], "late");
    }
}
