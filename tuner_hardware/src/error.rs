use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("channel disconnected: {0}")]
    Disconnected(String),
    #[error("unknown subscription {0}")]
    UnknownSubscription(u64),
}

pub type Result<T> = std::result::Result<T, HwError>;
