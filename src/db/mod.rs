//! Storage module.
//!
//! Check results and incidents are kept in append-only JSONL logs,
//! one file per UTC day.

mod partition;
mod models;
mod store;

pub use partition::*;
pub use models::*;
pub use store::*;
