use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("not connected")]
    NotConnected,

    #[error("internal connection error: {0}")]
    Internal(String),
}
