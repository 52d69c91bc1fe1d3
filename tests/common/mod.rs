#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serial_tether::{
    config::SessionConfig,
    mock::{Call, MockBackend},
    session::SerialSession,
};
use tracing::Level;

/// Idempotent, so any test may call it first.
pub async fn logging() {
    serial_tether::logging::init(Level::DEBUG, None).await;
}

/// Short enough to keep tests fast, long enough to observe.
pub const FAST_POLL: Duration = Duration::from_millis(10);

pub fn fast_config(path: &str) -> SessionConfig {
    let mut config = SessionConfig::new(path, 115_200);
    config.timeout = FAST_POLL;
    config
}

pub fn session_with_config(config: SessionConfig) -> (SerialSession, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let session = SerialSession::new(config, backend.clone(), backend.clone());

    (session, backend)
}

pub fn session_with_backend(path: &str) -> (SerialSession, Arc<MockBackend>) {
    session_with_config(fast_config(path))
}

/// Give spawned tasks a few poll intervals to do their thing.
pub async fn settle() {
    tokio::time::sleep(FAST_POLL * 5).await;
}

pub fn read_count(calls: &[Call]) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, Call::Read { .. }))
        .count()
}
