//! # Actor module
//!
//! The actors are controllers. They use services and adapters to perform
//! their tasks: the pipeline runs a batch, the exporter prints the table.

mod exporter;
mod pipeline;

pub use exporter::*;
pub use pipeline::*;
