use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("config error: {0}")]
    Config(#[from] monsync_config::ConfigError),

    #[error("connection error: {0}")]
    Conn(#[from] monsync_conn::ConnError),

    #[error("dependency emission error: {0}")]
    Deps(#[from] monsync_deps::DepsError),

    #[error("{0}")]
    Internal(String),
}
