//! Multi-peer cluster tests
//!
//! Each test boots several full peers in one process: real TCP listeners,
//! real line-JSON traffic, one lock engine per peer. Only the console is
//! left out; the tests drive the lock API directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::sleep;

use baton_api::{Message, PeerId, PeerInfo};
use baton_core::{
    ClusterPeerDirectory, HandlerRegistry, PeerClientConfig,
    handler::lock::{GiveTokenHandler, RequestTokenHandler},
};
use baton_lock::{LockState, TokenLock};
use baton_server::startup::{ShutdownSignal, serve};
use baton_server::store::{RecordStore, WriteEntryHandler};

struct TestPeer {
    lock: Arc<TokenLock>,
    directory: Arc<ClusterPeerDirectory>,
    store: Arc<RecordStore>,
    shutdown: ShutdownSignal,
    _store_dir: tempfile::TempDir,
}

impl TestPeer {
    async fn stop(&self) {
        self.lock.destroy().await;
        self.shutdown.shutdown();
        self.directory.close_all();
    }
}

/// Boot `n` peers with ids 1..=n on ephemeral loopback ports.
async fn start_cluster(n: u64) -> Vec<TestPeer> {
    let mut listeners = Vec::new();
    let mut infos = Vec::new();
    for id in 1..=n {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        infos.push(PeerInfo::new(PeerId(id), "127.0.0.1", port));
        listeners.push(listener);
    }

    let client_config = PeerClientConfig {
        connect_timeout: Duration::from_millis(500),
        send_timeout: Duration::from_millis(500),
        max_retries: 1,
        retry_delay: Duration::from_millis(20),
    };

    let mut peers = Vec::new();
    for (listener, info) in listeners.into_iter().zip(infos.iter()) {
        let directory = Arc::new(ClusterPeerDirectory::new(info.clone(), client_config.clone()));
        directory.seed(&infos);

        let lock = Arc::new(TokenLock::new(info.id, directory.clone()));
        let store_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::open(store_dir.path().join("records.db")).unwrap());

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(RequestTokenHandler::new(lock.clone())));
        registry.register(Arc::new(GiveTokenHandler::new(lock.clone())));
        registry.register(Arc::new(WriteEntryHandler::new(store.clone())));

        let shutdown = ShutdownSignal::new();
        tokio::spawn(serve(listener, Arc::new(registry), shutdown.clone()));

        peers.push(TestPeer {
            lock,
            directory,
            store,
            shutdown,
            _store_dir: store_dir,
        });
    }

    for peer in &peers {
        peer.lock.initialize();
    }
    peers
}

async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_smallest_id_starts_with_token() {
    let peers = start_cluster(3).await;
    assert_eq!(peers[0].lock.status().state, LockState::TokenPresent);
    assert_eq!(peers[1].lock.status().state, LockState::NoToken);
    assert_eq!(peers[2].lock.status().state, LockState::NoToken);
    for peer in &peers {
        peer.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_token_travels_to_remote_requester() {
    let peers = start_cluster(2).await;

    peers[1].lock.acquire().await;
    assert_eq!(peers[1].lock.status().state, LockState::TokenHeld);
    peers[1].lock.release().await;

    // Peer 1 can take it back afterwards.
    peers[0].lock.acquire().await;
    peers[0].lock.release().await;

    for peer in &peers {
        peer.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mutual_exclusion_under_contention() {
    let peers = start_cluster(3).await;
    let in_section = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for peer in &peers {
        let lock = peer.lock.clone();
        let in_section = in_section.clone();
        let entries = entries.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                lock.acquire().await;
                let occupants = in_section.fetch_add(1, Ordering::SeqCst);
                assert_eq!(occupants, 0, "two peers inside the critical section");
                sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
                entries.fetch_add(1, Ordering::SeqCst);
                lock.release().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(entries.load(Ordering::SeqCst), 15);

    for peer in &peers {
        peer.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_departing_holder_hands_the_token_on() {
    let peers = start_cluster(3).await;

    // Peer 1 holds the token at start; stopping it must not strand the ring.
    peers[0].stop().await;

    wait_until("a surviving peer to hold the token", || {
        peers[1].lock.status().state == LockState::TokenPresent
            || peers[2].lock.status().state == LockState::TokenPresent
    })
    .await;

    peers[2].lock.acquire().await;
    peers[2].lock.release().await;

    peers[1].stop().await;
    peers[2].stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replicated_write_reaches_every_store() {
    let peers = start_cluster(3).await;

    peers[1].lock.acquire().await;
    peers[1].store.write("shared fortune").unwrap();
    let failed = peers[1]
        .directory
        .broadcast(&Message::WriteEntry {
            text: "shared fortune".to_string(),
        })
        .await;
    assert!(failed.is_empty());
    peers[1].lock.release().await;

    wait_until("every store to hold the record", || {
        peers.iter().all(|peer| peer.store.len() == 1)
    })
    .await;
    assert_eq!(peers[0].store.read().unwrap(), "shared fortune");

    for peer in &peers {
        peer.stop().await;
    }
}
