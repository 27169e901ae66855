//! Data sources other than files on disk.
//!
//! - mock observations drawn from the synthetic library (`mock`)

pub mod mock;

pub use mock::*;
