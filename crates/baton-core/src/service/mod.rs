pub mod directory;
pub mod lookup;
pub mod peer_client;
