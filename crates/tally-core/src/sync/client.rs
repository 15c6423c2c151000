//! Sync client implementation
//!
//! WebSocket remote talking to a `tally serve` mirror. Every request opens a
//! fresh connection, sends one CBOR frame and waits for one CBOR frame back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::message::{ClientMessage, ServerMessage};
use super::remote::{OpAck, Remote, RemoteError};
use crate::models::Event;
use crate::queue::PendingOperation;

/// Default time allowed for connect plus response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote reached over a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketRemote {
    /// Server URL (`None` when sync is not configured)
    url: Option<String>,
    timeout: Duration,
}

impl WebSocketRemote {
    /// Create a client for the server at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A client with no server; every request fails
    pub fn unconfigured() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound each request (connect + response) by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn request(&self, message: ClientMessage) -> Result<ServerMessage, RemoteError> {
        let Some(url) = self.url.as_deref() else {
            return Err(RemoteError::Unavailable("no remote URL configured".to_string()));
        };

        match tokio::time::timeout(self.timeout, exchange(url, &message)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }
}

/// Send one message and wait for the reply
async fn exchange(url: &str, message: &ClientMessage) -> Result<ServerMessage, RemoteError> {
    debug!("Connecting to {}", url);
    let (ws_stream, _response) =
        connect_async(url)
            .await
            .map_err(|e| RemoteError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            })?;

    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Binary(message.encode()?))
        .await
        .map_err(|e| RemoteError::Protocol(format!("send failed: {e}")))?;

    loop {
        match read.next().await {
            Some(Ok(Message::Binary(data))) => {
                let reply = ServerMessage::decode(&data)?;
                write.close().await.ok();
                return match reply {
                    ServerMessage::Error { message } => Err(RemoteError::Server(message)),
                    reply => Ok(reply),
                };
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(RemoteError::Protocol(format!(
                    "server ({url}) closed the connection before responding"
                )));
            }
            Some(Err(e)) => {
                return Err(RemoteError::Protocol(format!("WebSocket error: {e}")));
            }
            // Pings, pongs and text frames are not part of the protocol
            Some(Ok(_)) => {}
        }
    }
}

impl Remote for WebSocketRemote {
    async fn pull(&self) -> Result<Vec<Event>, RemoteError> {
        match self.request(ClientMessage::Pull).await? {
            ServerMessage::Snapshot { events } => {
                info!(events = events.len(), "Pulled remote snapshot");
                Ok(events)
            }
            other => Err(unexpected("snapshot", &other)),
        }
    }

    async fn push(&self, operations: &[PendingOperation]) -> Result<Vec<OpAck>, RemoteError> {
        let message = ClientMessage::Push {
            operations: operations.to_vec(),
        };
        match self.request(message).await? {
            ServerMessage::PushResult { acks } => Ok(acks),
            other => Err(unexpected("pushResult", &other)),
        }
    }

    fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn unexpected(expected: &str, got: &ServerMessage) -> RemoteError {
    let got = match got {
        ServerMessage::Snapshot { .. } => "snapshot",
        ServerMessage::PushResult { .. } => "pushResult",
        ServerMessage::Error { .. } => "error",
    };
    RemoteError::Protocol(format!("expected {expected} reply, got {got}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_remote_new() {
        let remote = WebSocketRemote::new("ws://localhost:3030");
        assert_eq!(remote.url(), Some("ws://localhost:3030"));
        assert!(remote.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_remote_fails_fast() {
        let remote = WebSocketRemote::unconfigured();
        assert!(!remote.is_configured());

        let err = remote.pull().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = WebSocketRemote::new(format!("ws://{addr}"));
        let err = remote.push(&[]).await.unwrap_err();
        assert!(matches!(err, RemoteError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let remote =
            WebSocketRemote::new(format!("ws://{addr}")).with_timeout(Duration::from_millis(200));
        let err = remote.pull().await.unwrap_err();
        assert_eq!(err, RemoteError::Timeout(Duration::from_millis(200)));
    }
}
