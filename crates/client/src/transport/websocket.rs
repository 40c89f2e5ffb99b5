//! WebSocket transport.
//!
//! Frames are JSON text messages. A writer task drains the shared outbound
//! queue; a reader task routes inbound frames to per-channel queues by
//! channel id. Channel 0 carries `openChan` requests correlated by `ref`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use replkit_proto::{ControlRequest, ControlResponse, Frame};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{RawChannel, TokenSupplier, Transport};
use crate::error::{Error, Result};

struct Shared {
    routes: Mutex<HashMap<u32, mpsc::UnboundedSender<Frame>>>,
    pending_opens: Mutex<HashMap<String, oneshot::Sender<Result<u32>>>>,
    closed: AtomicBool,
}

impl Shared {
    /// Drops every per-channel sender and pending open so that all
    /// outstanding requests observe closure instead of hanging.
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.routes.lock().clear();
        self.pending_opens.lock().clear();
    }
}

pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
    next_ref: AtomicU64,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl WsTransport {
    /// Connects to the gateway for the given identity. The token supplier is
    /// invoked at connect time so a refreshed token is picked up lazily.
    pub async fn connect(gateway: &str, identity: &str, token: TokenSupplier) -> Result<Self> {
        let url = format!(
            "{}/wsv2/{}?token={}",
            gateway.trim_end_matches('/'),
            identity,
            token()
        );
        let (socket, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let shared = Arc::new(Shared {
            routes: Mutex::new(HashMap::new()),
            pending_opens: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                loop {
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else { break };
                            let text = match serde_json::to_string(&frame) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(target = "replkit.transport", error = %e, "failed to serialize frame");
                                    continue;
                                }
                            };
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        _ = &mut close_rx => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                shared.shutdown();
            }
        });

        tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                while let Some(next) = stream.next().await {
                    let message = match next {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(target = "replkit.transport", error = %e, "socket error");
                            break;
                        }
                    };
                    let text = match message {
                        Message::Text(text) => text.to_string(),
                        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => continue,
                        },
                        Message::Close(_) => break,
                        _ => continue,
                    };
                    match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) => route(&shared, frame),
                        Err(e) => {
                            warn!(target = "replkit.transport", error = %e, "unparseable frame");
                        }
                    }
                }
                shared.shutdown();
            }
        });

        Ok(Self {
            outbound: outbound_tx,
            shared,
            next_ref: AtomicU64::new(0),
            close_tx: Mutex::new(Some(close_tx)),
        })
    }
}

fn route(shared: &Shared, frame: Frame) {
    if frame.channel == 0 {
        match serde_json::from_value::<ControlResponse>(frame.body.clone()) {
            Ok(ControlResponse::OpenChanRes { id, error }) => {
                let Some(reference) = frame.reference else {
                    return;
                };
                let Some(ack) = shared.pending_opens.lock().remove(&reference) else {
                    warn!(target = "replkit.transport", %reference, "unmatched openChanRes");
                    return;
                };
                let result = match error {
                    Some(message) => Err(Error::Channel(message)),
                    None => Ok(id),
                };
                let _ = ack.send(result);
            }
            Err(e) => {
                debug!(target = "replkit.transport", error = %e, "ignoring control frame");
            }
        }
        return;
    }

    let sender = shared.routes.lock().get(&frame.channel).cloned();
    match sender {
        Some(tx) => {
            let _ = tx.send(frame);
        }
        None => {
            debug!(
                target = "replkit.transport",
                channel = frame.channel,
                "message for unknown channel"
            );
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open_channel(&self, service: &str) -> Result<RawChannel> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let reference = format!("open{}", self.next_ref.fetch_add(1, Ordering::SeqCst));
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared
            .pending_opens
            .lock()
            .insert(reference.clone(), ack_tx);

        let body = serde_json::to_value(ControlRequest::OpenChan {
            service: service.to_string(),
        })?;
        if self
            .outbound
            .send(Frame::request(0, reference.clone(), body))
            .is_err()
        {
            self.shared.pending_opens.lock().remove(&reference);
            return Err(Error::ConnectionClosed);
        }

        let id = match ack_rx.await {
            Ok(result) => result?,
            Err(_) => return Err(Error::ConnectionClosed),
        };

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.shared.routes.lock().insert(id, in_tx);
        debug!(target = "replkit.transport", %service, channel = id, "channel opened");

        Ok(RawChannel {
            id,
            service: service.to_string(),
            outbound: self.outbound.clone(),
            inbound: in_rx,
        })
    }

    async fn close(&self) {
        if let Some(tx) = self.close_tx.lock().take() {
            let _ = tx.send(());
        }
        self.shared.shutdown();
    }
}
