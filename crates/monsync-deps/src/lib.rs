mod accumulator;
mod emitter;
pub mod error;

pub use accumulator::RelationAccumulator;
pub use emitter::insert_object_dependencies;
pub use error::DepsError;
