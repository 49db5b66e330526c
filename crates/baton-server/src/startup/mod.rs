//! Server startup: logging, peer listener, and graceful shutdown

pub mod listener;
pub mod logging;
pub mod shutdown;

pub use listener::serve;
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, run_with_shutdown, wait_for_shutdown_signal};
