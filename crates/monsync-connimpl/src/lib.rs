pub mod error;
pub mod redis_conn;

pub use error::RedisConnError;
pub use redis_conn::RedisConnection;

// Re-exported so callers depending on `monsync-connimpl` alone can reach the
// in-memory double and the reset script without an extra dependency line.
pub use monsync_conn::{InMemoryConnection, RESET_DUMP_SCRIPT};
