//! rosbridge-compatible WebSocket endpoint.
//!
//! [`WsBridge`] lets rosbridge clients talk to the fusion node:
//!
//! 1. **Ingest** – text frames publishing on the configured raw / correction
//!    topics are decoded by the [`RosbridgeCodec`] and handed to the
//!    [`OdometryAdapter`], which validates them and puts them on the bus.
//!
//! 2. **Serve** – every fused pose and frame transform that appears on the
//!    bus is pushed to each connected client as a rosbridge publish frame.
//!
//! The bridge only handles serialisation and transport.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use odomfuse_types::{Event, EventPayload, FuseError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};
use crate::odometry_adapter::OdometryAdapter;
use crate::rosbridge::RosbridgeCodec;

/// Bridge between rosbridge WebSocket clients and the internal [`EventBus`].
#[derive(Clone)]
pub struct WsBridge {
    bus: Arc<EventBus>,
    adapter: OdometryAdapter,
    codec: Arc<RosbridgeCodec>,
}

impl WsBridge {
    pub fn new(bus: Arc<EventBus>, codec: RosbridgeCodec) -> Self {
        let adapter = OdometryAdapter::new(Arc::clone(&bus));
        Self {
            bus,
            adapter,
            codec: Arc::new(codec),
        }
    }

    /// Accept clients on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), FuseError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "rosbridge endpoint listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), FuseError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| FuseError::Transport(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "rosbridge client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut fused_rx = self.bus.subscribe_to(Topic::IntegratedOdometry);
        let mut tf_rx = self.bus.subscribe_to(Topic::FrameTransforms);

        loop {
            let outbound = tokio::select! {
                result = fused_rx.recv() => result,
                result = tf_rx.recv() => result,
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming_ws_message(text.as_str());
                        }
                        _ => {}
                    }
                    continue;
                }
            };

            match outbound {
                Ok(event) => {
                    let Some(frame) = self.outbound_frame(&event) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(frame?.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(peer = %peer, lagged_by = n, "ws client lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }

        debug!(peer = %peer, "rosbridge client disconnected");
        Ok(())
    }

    /// Render a bus event as a rosbridge frame, if it is one we forward.
    fn outbound_frame(&self, event: &Event) -> Option<Result<String, FuseError>> {
        match &event.payload {
            EventPayload::FusedPose(sample) => Some(self.codec.encode_fused(sample)),
            EventPayload::FrameTransform(record) => Some(self.codec.encode_transform(record)),
            _ => None,
        }
    }

    /// Decode an incoming text frame and ingest the sample it carries.
    ///
    /// Frames for other ops or topics are ignored.  Malformed frames and
    /// invalid samples are logged; invalid samples additionally surface on
    /// [`Topic::SystemAlerts`] via the adapter.
    fn handle_incoming_ws_message(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(Some(sample)) => {
                if let Err(e) = self.adapter.ingest(sample) {
                    debug!(error = %e, "inbound sample not ingested");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "malformed rosbridge frame"),
        }
    }
}
