//! Input/output helpers.
//!
//! - object records as JSON (`record`)
//! - spectrum tables as CSV (`spectrum`)
//! - abundance catalog CSV (`export`)

pub mod export;
pub mod record;
pub mod spectrum;

pub use export::*;
pub use record::*;
pub use spectrum::*;
