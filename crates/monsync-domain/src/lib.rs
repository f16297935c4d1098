pub mod error;
pub mod ident;
pub mod repository;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::DomainError;
pub use repository::{DomainEvent, ObjectRepository};
pub use types::*;
