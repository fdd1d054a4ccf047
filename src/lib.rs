pub mod client;
pub mod config;
pub mod decimate;
pub mod driver;
pub mod model;
pub mod server;
pub mod storage;
pub mod weighter;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("gateway request failed: {0}")]
    Gateway(#[from] reqwest::Error),

    #[error("no summary device available")]
    NoSummaryDevice,

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid listen address: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),

    #[error("server failed to become healthy")]
    ServerUnhealthy,
}
