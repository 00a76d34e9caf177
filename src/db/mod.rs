//! Registry and results persistence.

mod models;
mod store;

pub use models::*;
pub use store::*;
