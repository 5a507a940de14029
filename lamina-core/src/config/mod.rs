//! Configuration types
//!
//! Board-agnostic configuration structures, loaded by the configuration
//! crate and stored as postcard binary data.

pub mod types;

pub use types::*;
