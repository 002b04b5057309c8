//! Process bootstrap for the mayfly server binary.

use std::net::SocketAddr;

use mayfly_common::config::RuntimeConfig;
use mayfly_common::error::MayflyResult;

use crate::network::ServerReactor;

/// Builds the runtime from default configuration and runs the event loop
/// forever.
///
/// # Errors
///
/// Returns `MayflyError::Io` when the listener cannot bind or polling
/// fails at runtime.
pub fn run() -> MayflyResult<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = RuntimeConfig::default();
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let mut reactor = ServerReactor::bind(bind_addr, config)?;
    tracing::info!("listening on {}", reactor.local_addr()?);
    reactor.run()
}
