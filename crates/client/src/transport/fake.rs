//! In-memory transport for testing the session/channel layer.
//!
//! Opens channels instantly, records every sent frame, and answers requests
//! from a per-service queue of scripted replies (defaulting to an empty-object
//! ack). The controller half injects unsolicited commands and inspects
//! traffic.
//!
//! # Example
//!
//! ```ignore
//! let (transport, controller) = FakeTransport::new();
//! let session = Session::with_transport(Arc::new(transport), "tok".into());
//! let files = session.channel("files").await?;
//! controller.push_command("files", json!({"output": "hi"}));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use replkit_proto::Frame;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::{RawChannel, Transport};
use crate::error::Result;

#[derive(Default)]
struct FakeState {
    /// Service name per open call, in order. Duplicate opens show up here.
    opens: Vec<String>,
    /// Every frame handed to the transport.
    sent: Vec<Frame>,
    /// channel id -> (service, inbound sender)
    channels: HashMap<u32, (String, mpsc::UnboundedSender<Frame>)>,
    /// Scripted request replies per service.
    replies: HashMap<String, VecDeque<Value>>,
}

impl FakeState {
    fn service_of(&self, channel: u32) -> Option<&str> {
        self.channels.get(&channel).map(|(service, _)| service.as_str())
    }
}

pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
    outbound: mpsc::UnboundedSender<Frame>,
    next_id: AtomicU32,
}

/// Controller for injecting commands and inspecting transport traffic.
pub struct FakeTransportController {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> (Self, FakeTransportController) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let mut locked = state.lock();
                    locked.sent.push(frame.clone());

                    let Some(reference) = frame.reference else {
                        continue;
                    };
                    let Some(service) = locked.service_of(frame.channel).map(str::to_string) else {
                        continue;
                    };
                    let body = locked
                        .replies
                        .get_mut(&service)
                        .and_then(VecDeque::pop_front)
                        .unwrap_or_else(|| json!({}));
                    if let Some((_, inbound)) = locked.channels.get(&frame.channel) {
                        let _ = inbound.send(Frame {
                            channel: frame.channel,
                            reference: Some(reference),
                            body,
                        });
                    }
                }
            }
        });

        (
            Self {
                state: Arc::clone(&state),
                outbound: outbound_tx,
                next_id: AtomicU32::new(1),
            },
            FakeTransportController { state },
        )
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_channel(&self, service: &str) -> Result<RawChannel> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let mut locked = self.state.lock();
        locked.opens.push(service.to_string());
        locked.channels.insert(id, (service.to_string(), in_tx));

        Ok(RawChannel {
            id,
            service: service.to_string(),
            outbound: self.outbound.clone(),
            inbound: in_rx,
        })
    }

    async fn close(&self) {
        // Dropping the inbound senders ends every channel's dispatch loop.
        self.state.lock().channels.clear();
    }
}

impl FakeTransportController {
    /// Number of open-channel calls for the given service.
    pub fn open_count(&self, service: &str) -> usize {
        self.state
            .lock()
            .opens
            .iter()
            .filter(|s| *s == service)
            .count()
    }

    /// Bodies sent on the given service, in send order.
    pub fn sent_bodies(&self, service: &str) -> Vec<Value> {
        let locked = self.state.lock();
        locked
            .sent
            .iter()
            .filter(|frame| locked.service_of(frame.channel) == Some(service))
            .map(|frame| frame.body.clone())
            .collect()
    }

    /// Queues the reply for the next request on the given service.
    pub fn queue_reply(&self, service: &str, body: Value) {
        self.state
            .lock()
            .replies
            .entry(service.to_string())
            .or_default()
            .push_back(body);
    }

    /// Delivers an unsolicited command on the given service's channel.
    ///
    /// The channel must have been opened first.
    pub fn push_command(&self, service: &str, body: Value) {
        let locked = self.state.lock();
        let delivered = locked.channels.iter().any(|(id, (name, inbound))| {
            name == service
                && inbound
                    .send(Frame {
                        channel: *id,
                        reference: None,
                        body: body.clone(),
                    })
                    .is_ok()
        });
        if !delivered {
            tracing::warn!(
                target = "replkit.transport",
                %service,
                "push_command on a channel that is not open"
            );
        }
    }

    /// Simulates an unrecoverable transport failure.
    pub fn drop_connection(&self) {
        self.state.lock().channels.clear();
    }
}
