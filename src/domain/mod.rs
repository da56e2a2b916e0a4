//! Core domain types and the ports implemented by storage adapters.

pub mod account;
pub mod entry;
pub mod ports;
