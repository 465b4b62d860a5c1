//! Log store backends.
//!
//! [`traits::LogStore`] is the contract; [`memory::InMemoryLogStore`] is the
//! embedded/test implementation and [`sql::SqlLogStore`] the durable one.

pub mod traits;
pub mod memory;
pub mod sql;

pub use traits::{LogStore, PullQuery, StorageError};
pub use memory::InMemoryLogStore;
pub use sql::SqlLogStore;
