//! Baton server entry point
//!
//! Boots one peer of the token-ring lock cluster: loads configuration and
//! membership, starts the inbound listener, elects the initial token holder
//! and hands control to the interactive console. On shutdown the token is
//! passed on before the process exits.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::net::TcpListener;
use tracing::{info, warn};

use baton_api::{PeerId, PeerInfo};
use baton_core::{
    ClusterPeerDirectory, HandlerRegistry, lookup,
    handler::lock::{GiveTokenHandler, RequestTokenHandler},
};
use baton_lock::TokenLock;
use baton_server::console::Console;
use baton_server::model::Configuration;
use baton_server::startup::{init_logging, run_with_shutdown, serve, wait_for_shutdown_signal};
use baton_server::store::{RecordStore, WriteEntryHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new().context("Failed to load configuration")?;

    let logging_config = configuration.logging_config();
    let _logging_guard =
        init_logging(&logging_config).map_err(|e| anyhow::anyhow!("Failed to init logging: {e}"))?;

    let local_id = PeerId(configuration.peer_id()?);

    // Membership: inline list wins over the peers file.
    let members = match configuration.peer_list() {
        Some(list) => lookup::parse_peer_list(&list)?,
        None => lookup::load_peers_file(Path::new(&configuration.peers_file()))?,
    };
    let Some(local_info) = members.iter().find(|info| info.id == local_id).cloned() else {
        bail!("peer id {} is not in the membership list", local_id);
    };
    info!(
        "Starting peer {} with {} known members",
        local_info,
        members.len()
    );
    let detected_ip = baton_common::local_ip();
    if local_info.ip != "127.0.0.1" && local_info.ip != "0.0.0.0" && local_info.ip != detected_ip {
        warn!(
            "Advertised address {} does not match detected local ip {}",
            local_info.ip, detected_ip
        );
    }

    let directory = Arc::new(ClusterPeerDirectory::new(
        local_info.clone(),
        configuration.peer_client_config(),
    ));
    directory.seed(&members);

    let lock = Arc::new(TokenLock::new(local_id, directory.clone()));
    let store = Arc::new(RecordStore::open(configuration.store_file())?);

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(RequestTokenHandler::new(lock.clone())));
    registry.register(Arc::new(GiveTokenHandler::new(lock.clone())));
    registry.register(Arc::new(WriteEntryHandler::new(store.clone())));
    let registry = Arc::new(registry);

    let bind_address = configuration
        .bind_address()
        .unwrap_or_else(|| bind_address_for(&local_info));
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    let shutdown = wait_for_shutdown_signal().await;
    let listener_task = tokio::spawn(serve(listener, registry, shutdown.clone()));

    lock.initialize();

    let console = Console::new(lock.clone(), directory.clone(), store);
    if run_with_shutdown(console.run(), shutdown.subscribe())
        .await
        .is_some()
    {
        // Console exited on its own (quit or EOF); stop the listener too.
        shutdown.shutdown();
    }

    info!("Leaving the cluster");
    lock.destroy().await;
    directory.close_all();
    if let Err(e) = listener_task.await {
        warn!("Listener task failed: {}", e);
    }
    info!("Peer {} stopped", local_id);

    Ok(())
}

/// Listen on all interfaces at the advertised port.
fn bind_address_for(info: &PeerInfo) -> String {
    format!("0.0.0.0:{}", info.port)
}
