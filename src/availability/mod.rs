//! Availability data model, reconciliation and aggregation.

mod models;
mod reconcile;
mod stats;
mod view;

pub use models::*;
pub use reconcile::*;
pub use stats::*;
pub use view::*;
