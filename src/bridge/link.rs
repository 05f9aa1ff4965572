//! Persistent WebSocket link to the bridge.
//!
//! A tokio task owns the socket and reconnects at a fixed interval forever.
//! The control loop talks to it through channels: outbound messages go in
//! through [`BridgeHandle`], and connection changes plus inbound traffic
//! come back as [`LinkEvent`]s in arrival order.
//!
//! Outbound audio goes through a small bounded queue. When the socket
//! cannot keep up, further frames are refused at the handle instead of
//! piling up in memory. Control messages are rare and never refused while
//! connected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{BridgeSender, Inbound, LinkEvent, Outbound};
use crate::config::DeviceConfig;

/// Capture frames allowed in flight behind the socket.
const AUDIO_QUEUE_FRAMES: usize = 4;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub url: String,
    pub reconnect_interval: Duration,
}

impl From<&DeviceConfig> for LinkConfig {
    fn from(cfg: &DeviceConfig) -> Self {
        Self {
            url: cfg.bridge_url(),
            reconnect_interval: cfg.reconnect_interval(),
        }
    }
}

/// Sending side of the link, held by the control loop.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    control: mpsc::UnboundedSender<Message>,
    audio: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
}

impl BridgeHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl BridgeSender for BridgeHandle {
    fn send_control(&mut self, message: &Outbound) -> bool {
        if !self.is_connected() {
            return false;
        }
        match serde_json::to_string(message) {
            Ok(json) => self.control.send(Message::Text(json)).is_ok(),
            Err(e) => {
                error!("Failed to serialize control message: {}", e);
                false
            }
        }
    }

    fn send_audio(&mut self, bytes: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.audio.try_send(bytes.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(bytes = bytes.len(), "Audio frame dropped, bridge not keeping up");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Spawn the link task on the current tokio runtime.
pub fn spawn(config: LinkConfig) -> (BridgeHandle, mpsc::UnboundedReceiver<LinkEvent>) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE_FRAMES);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(false));

    let outbound = OutboundQueues {
        control: control_rx,
        audio: audio_rx,
    };
    tokio::spawn(run(config, outbound, event_tx, Arc::clone(&connected)));

    (
        BridgeHandle {
            control: control_tx,
            audio: audio_tx,
            connected,
        },
        event_rx,
    )
}

/// Receiving ends of the outbound queues, owned by the link task.
struct OutboundQueues {
    control: mpsc::UnboundedReceiver<Message>,
    audio: mpsc::Receiver<Vec<u8>>,
}

impl OutboundQueues {
    /// Discard everything queued. Returns the number of messages dropped.
    fn discard(&mut self) -> usize {
        let mut dropped = 0;
        while self.control.try_recv().is_ok() {
            dropped += 1;
        }
        while self.audio.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// How a connection ended.
enum PumpEnd {
    /// Socket closed or failed; reconnect.
    Dropped,
    /// The control loop is gone; stop the task.
    CoreGone,
}

async fn run(
    config: LinkConfig,
    mut outbound: OutboundQueues,
    events: mpsc::UnboundedSender<LinkEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        if events.is_closed() {
            break;
        }

        info!(url = %config.url, "Connecting to bridge");
        match connect_async(config.url.as_str()).await {
            Ok((ws, _response)) => {
                // Anything still queued was meant for a previous connection.
                let stale = outbound.discard();
                if stale > 0 {
                    debug!(stale, "Dropped messages queued for a previous connection");
                }

                connected.store(true, Ordering::Release);
                info!("Connected to bridge");
                if events.send(LinkEvent::Connected).is_err() {
                    break;
                }

                let end = pump(ws, &mut outbound, &events).await;

                connected.store(false, Ordering::Release);
                let stale = outbound.discard();
                if stale > 0 {
                    debug!(stale, "Dropped messages left over from the lost connection");
                }
                info!("Disconnected from bridge");
                if matches!(end, PumpEnd::CoreGone) || events.send(LinkEvent::Disconnected).is_err()
                {
                    break;
                }
            }
            Err(e) => {
                warn!("Bridge connection failed: {}", e);
            }
        }

        // Sends while down are dropped at the handle; discard stragglers.
        let pause = tokio::time::sleep(config.reconnect_interval);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                msg = outbound.control.recv() => {
                    if msg.is_none() {
                        debug!("Bridge handle dropped, link task exiting");
                        return;
                    }
                }
                Some(_) = outbound.audio.recv() => {}
            }
        }
    }
    debug!("Link task exiting");
}

async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut OutboundQueues,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> PumpEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        // Inbound first so a close is noticed before more is written; control
        // before audio so session messages are not stuck behind frames.
        tokio::select! {
            biased;

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Inbound::parse(&text) {
                    Ok(msg) => {
                        debug!(?msg, "Control message from bridge");
                        if events.send(LinkEvent::Control(msg)).is_err() {
                            return PumpEnd::CoreGone;
                        }
                    }
                    Err(e) => {
                        warn!("Discarding control message: {} (input: {})", e, text);
                    }
                },
                Some(Ok(Message::Binary(data))) => {
                    if events.send(LinkEvent::Audio(data)).is_err() {
                        return PumpEnd::CoreGone;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Bridge closed the connection");
                    return PumpEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Bridge read error: {}", e);
                    return PumpEnd::Dropped;
                }
                None => return PumpEnd::Dropped,
            },
            outgoing = outbound.control.recv() => match outgoing {
                Some(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        warn!("Bridge write error: {}", e);
                        return PumpEnd::Dropped;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return PumpEnd::CoreGone;
                }
            },
            Some(frame) = outbound.audio.recv() => {
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    warn!("Bridge write error: {}", e);
                    return PumpEnd::Dropped;
                }
            }
        }
    }
}
