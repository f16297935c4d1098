use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedisConnError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("failed to build redis client: {0}")]
    ClientBuild(redis::RedisError),
}
