pub mod dump;
pub mod error;
pub mod events;
pub mod queue;
pub mod serialize;
pub mod writer;

pub use dump::{update_all_config_objects, DumpReport};
pub use error::WriterError;
pub use events::{send_config_delete, send_config_update, send_status_update};
pub use queue::WorkQueue;
pub use serialize::{prepare_object, reflect_fields, serialize_state, FieldMask};
pub use writer::Writer;
