pub mod conn;
pub mod error;
pub mod memory;

pub use conn::{Command, Connection, RESET_DUMP_SCRIPT};
pub use error::ConnError;
pub use memory::InMemoryConnection;
