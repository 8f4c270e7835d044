//! Validated cache storage and the read-through manager built on it.

pub mod entry;
pub mod manager;
pub mod stats;
pub mod store;
