//! Per-connection task.
//!
//! Each authenticated WebSocket runs one task selecting between inbound
//! client frames and the connection's outbound event queue. Inbound intents
//! are processed strictly in arrival order: the next frame is not read until
//! the previous intent's ack has been produced and written. No ordering
//! exists across connections.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::state::ConnectionId;
use chatter_proto::{decode_client_frame, encode_server_frame, ServerFrame};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;
use uuid::Uuid;

/// One live client connection.
pub struct Connection<S> {
    identity: String,
    connection_id: ConnectionId,
    addr: SocketAddr,
    engine: Arc<Engine>,
    ws: WebSocketStream<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        identity: String,
        ws: WebSocketStream<S>,
        addr: SocketAddr,
        engine: Arc<Engine>,
    ) -> Self {
        Self {
            identity,
            connection_id: Uuid::new_v4(),
            addr,
            engine,
            ws,
        }
    }

    /// Register with the engine, serve the socket until it closes, then
    /// clean up registry and room state. Cleanup runs on every exit path,
    /// including transport errors.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<Arc<ServerFrame>>(self.engine.limits().outbound_queue);

        self.engine
            .connection_opened(&self.identity, self.connection_id, Utc::now(), outbound_tx)
            .await;

        let result = self.serve(&mut outbound_rx).await;

        self.engine
            .connection_closed(&self.identity, self.connection_id)
            .await;
        result
    }

    async fn serve(
        &mut self,
        outbound_rx: &mut mpsc::Receiver<Arc<ServerFrame>>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                inbound = self.ws.next() => match inbound {
                    Some(Ok(WsMessage::Text(raw))) => {
                        let ack = match decode_client_frame(&raw) {
                            Ok(frame) => {
                                self.engine
                                    .dispatch(&self.identity, self.connection_id, frame)
                                    .await
                            }
                            Err(e) => EngineError::Invalid(e.to_string()).to_ack(None),
                        };
                        self.ws
                            .send(WsMessage::Text(encode_server_frame(&ack)))
                            .await?;
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        self.ws.send(WsMessage::Pong(payload)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(addr = %self.addr, identity = %self.identity, "client closed");
                        return Ok(());
                    }
                    // Binary and stray pongs are ignored.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(addr = %self.addr, identity = %self.identity, error = %e, "read error");
                        return Ok(());
                    }
                },
                event = outbound_rx.recv() => match event {
                    Some(frame) => {
                        self.ws
                            .send(WsMessage::Text(encode_server_frame(&frame)))
                            .await?;
                    }
                    // Registry dropped our sender (forced disconnect).
                    None => return Ok(()),
                },
            }
        }
    }
}
