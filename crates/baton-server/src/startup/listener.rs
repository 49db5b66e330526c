//! Inbound peer listener
//!
//! Accepts connections from other peers and feeds each decoded line-JSON
//! message into the handler registry. One task per connection; request
//! handling is what re-triggers the token-forward check at an idle holder,
//! so a slow connection must never block the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use baton_api::Message;
use baton_core::HandlerRegistry;

use super::shutdown::ShutdownSignal;

/// Accept loop; returns when the shutdown signal fires.
pub async fn serve(listener: TcpListener, registry: Arc<HandlerRegistry>, shutdown: ShutdownSignal) {
    let mut shutdown_rx = shutdown.subscribe();
    match listener.local_addr() {
        Ok(addr) => info!("Peer listener started on {}", addr),
        Err(_) => info!("Peer listener started"),
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Peer listener shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, remote, registry).await;
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, remote: SocketAddr, registry: Arc<HandlerRegistry>) {
    debug!("Peer connection from {}", remote);
    let mut lines = FramedRead::new(stream, LinesCodec::new());

    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => match Message::from_json_string(&line) {
                Ok(message) => registry.dispatch(message).await,
                Err(e) => warn!("Undecodable message from {}: {}", remote, e),
            },
            Err(e) => {
                debug!("Peer connection from {} dropped: {}", remote, e);
                return;
            }
        }
    }
    debug!("Peer connection from {} closed", remote);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use baton_api::PeerId;
    use baton_core::MessageHandler;
    use futures::SinkExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::codec::FramedWrite;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: Message) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn can_handle(&self) -> &'static str {
            "request_token"
        }
    }

    #[tokio::test]
    async fn test_listener_dispatches_and_survives_garbage() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(CountingHandler {
            count: count.clone(),
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();
        let server = tokio::spawn(serve(listener, Arc::new(registry), shutdown.clone()));

        let stream = TcpStream::connect(address).await.unwrap();
        let mut sink = FramedWrite::new(stream, LinesCodec::new());
        let message = Message::RequestToken {
            time: 1,
            requester: PeerId(7),
        };
        sink.send(message.to_json_string().unwrap()).await.unwrap();
        sink.send("this is not json".to_string()).await.unwrap();
        sink.send(message.to_json_string().unwrap()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while count.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both valid messages dispatched");

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("listener stops on shutdown")
            .unwrap();
    }
}
