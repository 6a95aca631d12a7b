//! Service module
//!
//! Services are the business logic of the application: turning a batch of
//! donation rows into per donor aggregates and merging them into the
//! lifetime-giving table. They are pure functions, all the IOs live in the
//! adapters.

mod aggregator;
mod merge;

pub use aggregator::*;
pub use merge::*;
