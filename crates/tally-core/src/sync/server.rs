//! Mirror server
//!
//! Accepts WebSocket connections, answers one request per connection and
//! persists the mirror after every push that changed it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::message::{ClientMessage, ServerMessage};
use super::mirror::Mirror;
use super::remote::RemoteError;
use crate::storage::{KeyValueStore, StorageResult};

/// Serves a [`Mirror`] over WebSocket
pub struct MirrorServer<S> {
    store: Arc<S>,
    mirror: Arc<Mutex<Mirror>>,
}

impl<S> Clone for MirrorServer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mirror: Arc::clone(&self.mirror),
        }
    }
}

impl<S: KeyValueStore + 'static> MirrorServer<S> {
    /// Load the mirror persisted in `store`
    pub fn open(store: S) -> StorageResult<Self> {
        let mirror = Mirror::load(&store)?;
        Ok(Self {
            store: Arc::new(store),
            mirror: Arc::new(Mutex::new(mirror)),
        })
    }

    /// Number of events currently mirrored
    pub fn event_count(&self) -> usize {
        self.mirror.lock().events().len()
    }

    /// Accept connections until the listener fails
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = ?listener.local_addr().ok(), "Mirror server listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    warn!(%peer, error = %e, "Connection failed");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), RemoteError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| RemoteError::Protocol(format!("handshake failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| RemoteError::Protocol(e.to_string()))?;
            let data = match frame {
                Message::Binary(data) => data,
                Message::Close(_) => return Ok(()),
                _ => continue,
            };

            let reply = match ClientMessage::decode(&data) {
                Ok(request) => self.handle(request),
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            debug!(%peer, "Answering request");

            write
                .send(Message::Binary(reply.encode()?))
                .await
                .map_err(|e| RemoteError::Protocol(e.to_string()))?;
            write.close().await.ok();
            return Ok(());
        }

        Ok(())
    }

    /// Answer a single request
    pub fn handle(&self, request: ClientMessage) -> ServerMessage {
        match request {
            ClientMessage::Pull => ServerMessage::Snapshot {
                events: self.mirror.lock().events().to_vec(),
            },
            ClientMessage::Push { operations } => {
                let mut mirror = self.mirror.lock();
                let mut staged = mirror.clone();
                let acks = staged.apply_batch(&operations);

                if staged == *mirror {
                    return ServerMessage::PushResult { acks };
                }

                if let Err(e) = staged.save(self.store.as_ref()) {
                    error!(error = %e, "Failed to persist mirror");
                    return ServerMessage::Error {
                        message: format!("mirror storage failed: {e}"),
                    };
                }

                *mirror = staged;
                info!(operations = operations.len(), "Applied push");
                ServerMessage::PushResult { acks }
            }
        }
    }
}
