//! Adapters for the domain storage and audit ports.

pub mod audit;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
