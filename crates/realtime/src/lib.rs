/// Realtime synchronisation and local persistence for the canvas document core.
/// The client is a sequencer: it enforces the server's total order, it does not merge.
use thiserror::Error;

mod config;
pub use config::*;

mod protocol;
pub use protocol::*;

mod sequencer;
pub use sequencer::*;

mod engine;
pub use engine::*;

mod client;
pub use client::*;

mod persistence;
pub use persistence::*;

mod store;
pub use store::*;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no async runtime: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
