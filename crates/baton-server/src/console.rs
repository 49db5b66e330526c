//! Interactive console
//!
//! Reads commands from stdin and drives the lock, the record store and the
//! peer directory. Writes go through the distributed lock so that all peers
//! apply them in the same critical section.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use baton_api::Message;
use baton_core::ClusterPeerDirectory;
use baton_lock::TokenLock;

use crate::store::RecordStore;

const HELP_TEXT: &str = "\
Commands:
    read            print a random record
    write <text>    append a record on every peer
    status          show lock state and counters
    peers           list known peers
    help            show this message
    quit            leave the cluster and exit";

pub struct Console {
    lock: Arc<TokenLock>,
    directory: Arc<ClusterPeerDirectory>,
    store: Arc<RecordStore>,
}

impl Console {
    pub fn new(
        lock: Arc<TokenLock>,
        directory: Arc<ClusterPeerDirectory>,
        store: Arc<RecordStore>,
    ) -> Self {
        Self {
            lock,
            directory,
            store,
        }
    }

    /// Command loop; returns on `quit` or stdin EOF.
    pub async fn run(&self) {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        println!("{}", HELP_TEXT);

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Console input closed");
                    return;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    return;
                }
            };

            let line = line.trim();
            let (command, argument) = match line.split_once(char::is_whitespace) {
                Some((command, rest)) => (command, rest.trim()),
                None => (line, ""),
            };

            match command {
                "" => {}
                "read" | "r" => self.read(),
                "write" | "w" => self.replicated_write(argument).await,
                "status" | "s" => self.status(),
                "peers" | "p" => self.peers(),
                "help" | "h" | "?" => println!("{}", HELP_TEXT),
                "quit" | "q" | "exit" => {
                    info!("Console quit requested");
                    return;
                }
                other => println!("Unknown command '{}', try 'help'", other),
            }
        }
    }

    fn read(&self) {
        match self.store.read() {
            Some(record) => println!("{}", record),
            None => println!("The store is empty"),
        }
    }

    /// Appends the record locally and on every peer, inside the critical
    /// section. Peers that cannot be reached are pruned from the cluster.
    async fn replicated_write(&self, text: &str) {
        if text.is_empty() {
            println!("Usage: write <text>");
            return;
        }

        self.lock.acquire().await;
        if let Err(e) = self.store.write(text) {
            warn!("Local write failed: {}", e);
            println!("Write failed: {}", e);
            self.lock.release().await;
            return;
        }
        let message = Message::WriteEntry {
            text: text.to_string(),
        };
        let failed = self.directory.broadcast(&message).await;
        for id in failed {
            warn!("Peer {} unreachable during write, pruning", id);
            self.lock.prune_peer(id);
        }
        self.lock.release().await;
        println!("Record written ({} entries)", self.store.len());
    }

    fn status(&self) {
        println!("{}", self.lock.status());
        let stats = self.lock.stats();
        println!(
            "Counters:: acquires={} releases={} forwards={} forced_transfers={} pruned_peers={} acquire_timeouts={} pending_acquires={}",
            stats.acquires,
            stats.releases,
            stats.forwards,
            stats.forced_transfers,
            stats.pruned_peers,
            stats.acquire_timeouts,
            stats.pending_acquires,
        );
        println!("Store   :: {} entries", self.store.len());
    }

    fn peers(&self) {
        println!("{} (local)", self.directory.local());
        for info in self.directory.peer_infos() {
            println!("{}", info);
        }
    }
}
