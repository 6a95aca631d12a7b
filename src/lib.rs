//! DONOR LEDGER LIBRARY
//!
//! This library reads donation records from CSV files, aggregates them per
//! donor and merges them into a lifetime-giving table stored in Parquet.

pub mod actor;
pub mod adapter;
pub mod config;
pub mod model;
pub mod service;

pub type Result<T> = anyhow::Result<T>;
