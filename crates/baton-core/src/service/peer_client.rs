// Outbound peer transport for inter-peer communication.
// Messages travel as newline-delimited JSON over cached TCP connections.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::SinkExt;
use tokio::net::{TcpStream, tcp::OwnedWriteHalf};
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use baton_api::Message;
use baton_common::BatonError;

/// Configuration for the peer client
#[derive(Clone, Debug)]
pub struct PeerClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-message send timeout
    pub send_timeout: Duration,
    /// Maximum attempts per message
    pub max_retries: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for PeerClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// A cached connection to one peer; only the write half is kept, inbound
/// traffic arrives on the peer's own listener.
pub struct PeerConnection {
    pub address: String,
    pub created_at: i64,
    sink: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
}

/// Manages outbound connections to the other peers
pub struct PeerClientManager {
    config: PeerClientConfig,
    connections: Arc<DashMap<String, Arc<PeerConnection>>>,
    local_address: String,
}

impl PeerClientManager {
    pub fn new(local_address: String, config: PeerClientConfig) -> Self {
        Self {
            config,
            connections: Arc::new(DashMap::new()),
            local_address,
        }
    }

    /// Get or create a connection to a peer
    async fn get_connection(&self, address: &str) -> Result<Arc<PeerConnection>, BatonError> {
        if address == self.local_address {
            return Err(BatonError::Transport(
                address.to_string(),
                "cannot connect to self".to_string(),
            ));
        }

        if let Some(conn) = self.connections.get(address) {
            return Ok(conn.clone());
        }

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                BatonError::Transport(address.to_string(), "connect timed out".to_string())
            })?
            .map_err(|e| BatonError::Transport(address.to_string(), e.to_string()))?;

        info!("Created peer connection to {}", address);

        let (_, write_half) = stream.into_split();
        let connection = Arc::new(PeerConnection {
            address: address.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            sink: tokio::sync::Mutex::new(FramedWrite::new(write_half, LinesCodec::new())),
        });

        self.connections
            .insert(address.to_string(), connection.clone());

        Ok(connection)
    }

    /// Remove a cached connection
    pub fn remove_connection(&self, address: &str) {
        self.connections.remove(address);
        debug!("Removed peer connection to {}", address);
    }

    /// Send a message to a peer, retrying per the configuration.
    /// A stale cached connection is dropped and redialed on failure.
    pub async fn send(&self, address: &str, message: &Message) -> Result<(), BatonError> {
        let line = message.to_json_string()?;
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match self.try_send(address, &line).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Failed to send {} to {} (attempt {}/{}): {}",
                        message.kind(),
                        address,
                        attempt + 1,
                        self.config.max_retries,
                        e
                    );
                    last_error = Some(e);
                    self.remove_connection(address);

                    if attempt + 1 < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BatonError::Transport(address.to_string(), "unknown send failure".to_string())
        }))
    }

    /// Try to send a line once
    async fn try_send(&self, address: &str, line: &str) -> Result<(), BatonError> {
        let connection = self.get_connection(address).await?;
        let mut sink = connection.sink.lock().await;

        tokio::time::timeout(self.config.send_timeout, sink.send(line.to_string()))
            .await
            .map_err(|_| BatonError::Transport(address.to_string(), "send timed out".to_string()))?
            .map_err(|e| BatonError::Transport(address.to_string(), e.to_string()))
    }

    /// Close all connections
    pub fn close_all(&self) {
        self.connections.clear();
        info!("Closed all peer connections");
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_api::PeerId;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn quick_config() -> PeerClientConfig {
        PeerClientConfig {
            connect_timeout: Duration::from_millis(500),
            send_timeout: Duration::from_millis(500),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_cannot_connect_to_self() {
        let manager = PeerClientManager::new("127.0.0.1:7848".to_string(), quick_config());
        let result = manager.get_connection("127.0.0.1:7848").await;
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("cannot connect to self"));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_peer_fails_after_retries() {
        let manager = PeerClientManager::new("127.0.0.1:7848".to_string(), quick_config());
        let message = Message::RequestToken {
            time: 1,
            requester: PeerId(1),
        };

        // Port 1 is never listening
        let result = manager.send("127.0.0.1:1", &message).await;
        assert!(result.is_err());
        assert!(result.err().unwrap().is_transport());
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_delivers_line_json() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = FramedRead::new(stream, LinesCodec::new());
            lines.next().await.unwrap().unwrap()
        });

        let manager = PeerClientManager::new("127.0.0.1:7848".to_string(), quick_config());
        let message = Message::RequestToken {
            time: 9,
            requester: PeerId(4),
        };
        manager.send(&address, &message).await.unwrap();
        assert_eq!(manager.connection_count(), 1);

        let line = accept.await.unwrap();
        assert_eq!(Message::from_json_string(&line).unwrap(), message);
    }
}
