//! The adapter module holds the implementation of tools required by the services.
//! The different adapters perform operations that involve IOs: reading the
//! incoming CSV files and reading or writing the lifetime-giving table.

mod csv_source;
mod parquet_store;
mod table_store;

pub use csv_source::*;
pub use parquet_store::*;
pub use table_store::*;
