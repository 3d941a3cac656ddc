//! WebSocket Server
//!
//! Accepts voice-surface connections and bridges each one to its session in
//! the [`SessionRegistry`].
//!
//! # Connection lifecycle
//!
//! ```text
//!   TCP accept ──► limit check ──► WebSocket upgrade ──► registry.open()
//!                                                            │
//!          ┌─────────────────────────────────────────────────┤
//!          │ reader: text frame ─► decode ─► registry.route()│
//!          │ writer: session sink ─► encode ─► text frame    │
//!          └─────────────────────────────────────────────────┤
//!                                                            ▼
//!                                   close frame / EOF ──► registry.close()
//! ```
//!
//! The writer runs on its own task so a slow client never stalls routing,
//! and a heartbeat is answered while a response is streaming.

use std::future::Future;
use std::net::SocketAddr;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn, Instrument};

use super::frame::TextFrameCodec;
use super::TransportError;
use crate::backend::CompletionBackend;
use crate::config::ServerSettings;
use crate::messages::ConductorMessage;
use crate::registry::{ConnectionId, SessionRegistry};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// WebSocket server for voice surfaces
pub struct WebSocketServer<B: CompletionBackend + 'static> {
    /// Bound listener
    listener: TcpListener,
    /// Server limits
    settings: ServerSettings,
    /// Sessions, one per connection
    registry: SessionRegistry<B>,
}

impl<B: CompletionBackend + 'static> WebSocketServer<B> {
    /// Bind the listener
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Bind` if the address cannot be bound.
    pub async fn bind(settings: ServerSettings, registry: SessionRegistry<B>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(&settings.bind_address)
            .await
            .map_err(|source| TransportError::Bind {
                address: settings.bind_address.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            settings,
            registry,
        })
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Session registry backing this server
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<B> {
        &self.registry
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// On shutdown every connection task is aborted and every session closed.
    ///
    /// # Errors
    ///
    /// Accept failures are logged and do not stop the server; this currently
    /// always returns `Ok`.
    pub async fn run<F>(self, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        let codec = TextFrameCodec::new(self.settings.max_message_size);
        let mut connections: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            address = %self.local_addr().map_or_else(|_| self.settings.bind_address.clone(), |a| a.to_string()),
            max_connections = self.settings.max_connections,
            "Listening for connections"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping accept loop");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    if connections.len() >= self.settings.max_connections {
                        warn!(%peer, "Connection limit reached, rejecting new connection");
                        drop(stream);
                        continue;
                    }

                    let conn_id = ConnectionId::new();
                    connections.spawn(
                        handle_connection(
                            conn_id,
                            stream,
                            peer,
                            self.registry.clone(),
                            self.settings.clone(),
                            codec,
                        )
                        .instrument(tracing::info_span!("connection", %conn_id)),
                    );
                }

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "Connection task panicked");
                        }
                    }
                }
            }
        }

        connections.shutdown().await;
        self.registry.close_all();
        info!("Shutdown complete");
        Ok(())
    }
}

/// Closes the connection's session when the handler exits, however it exits
struct SessionGuard<B: CompletionBackend + 'static> {
    registry: SessionRegistry<B>,
    id: ConnectionId,
}

impl<B: CompletionBackend + 'static> Drop for SessionGuard<B> {
    fn drop(&mut self) {
        self.registry.close(self.id);
    }
}

/// Handle a single client connection
async fn handle_connection<B: CompletionBackend + 'static>(
    conn_id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    registry: SessionRegistry<B>,
    settings: ServerSettings,
    codec: TextFrameCodec,
) {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(settings.max_message_size);
    ws_config.max_frame_size = Some(settings.max_message_size);

    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    info!(%peer, "New connection accepted");

    let (ws_tx, mut ws_rx) = ws.split();
    let (tx, rx) = mpsc::channel::<ConductorMessage>(settings.channel_capacity);

    let mut writer = tokio::spawn(write_outbound(ws_tx, rx, codec).in_current_span());

    let _session = SessionGuard {
        registry: registry.clone(),
        id: conn_id,
    };
    registry.open_with_id(conn_id, tx.clone()).await;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => match codec.decode(&text) {
                    Ok(event) => {
                        debug!(event = ?event, "Received event");
                        let outcome = registry.route(conn_id, event).await;
                        debug!(outcome = ?outcome, "Event routed");
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to decode event frame");
                        let _ = tx.send(ConductorMessage::error(e.to_string())).await;
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    warn!("Binary frame received, expected JSON text");
                    let _ = tx
                        .send(ConductorMessage::error("Invalid message format: expected a JSON text frame"))
                        .await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client disconnected");
                    break;
                }
                // Ping/pong control frames are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Read error");
                    break;
                }
            },

            _ = &mut writer => {
                info!("Outbound stream closed");
                break;
            }
        }
    }

    writer.abort();
    info!("Connection handler finished");
}

/// Forward the session's messages to the client until either side closes
async fn write_outbound(mut ws_tx: WsSink, mut rx: mpsc::Receiver<ConductorMessage>, codec: TextFrameCodec) {
    if let Err(e) = forward_outbound(&mut ws_tx, &mut rx, codec).await {
        warn!(error = %e, "Outbound stream failed, closing connection");
    }
    let _ = ws_tx.close().await;
}

/// Encode and send each message in order; any failure ends the stream
async fn forward_outbound(
    ws_tx: &mut WsSink,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    codec: TextFrameCodec,
) -> Result<(), TransportError> {
    while let Some(message) = rx.recv().await {
        let text = codec.encode(&message)?;
        ws_tx.send(Message::Text(text)).await?;
    }
    Ok(())
}
