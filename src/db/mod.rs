//! Database module for availwatch.
//!
//! SQLite storage of stats history with embedded migrations.

mod models;
mod store;
mod tdigest_utils;

pub use models::*;
pub use store::*;
pub use tdigest_utils::*;
