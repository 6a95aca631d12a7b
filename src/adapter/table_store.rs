use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{DonorId, Snapshot};
use crate::Result;

/// Errors raised while reading or writing the lifetime-giving table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table file could not be opened, created or renamed.
    #[error("I/O error on table file '{}'.", .path.display())]
    Io {
        /// The file involved.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The Parquet layer failed.
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// The Arrow layer failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// The file was readable but does not hold a lifetime-giving table.
    #[error("Table file '{}' is corrupt: {reason}", .path.display())]
    Corrupt {
        /// The file involved.
        path: PathBuf,

        /// What is wrong with it.
        reason: String,
    },

    /// The amount does not fit in the table's decimal column.
    #[error("Amount {amount} of donor '{donor_id}' cannot be stored with scale {scale}.")]
    AmountOverflow {
        donor_id: DonorId,
        amount: Decimal,
        scale: u32,
    },
}

/// Table store trait.
///
/// A table store holds one snapshot of the lifetime-giving table. Writing
/// replaces the whole snapshot. It must raise an error only on IO failures or
/// when the stored data cannot be understood.
pub trait TableStore {
    /// Read the stored snapshot. `None` means nothing was ever written which
    /// is not an error.
    fn read(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot.
    fn write(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Human readable location of the table, for messages.
    fn location(&self) -> String;
}

/// A simple in-memory table store.
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    snapshot: Option<Snapshot>,
}

impl InMemoryTableStore {
    /// Create a store already holding the given snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    /// The snapshot currently held.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}

impl TableStore for InMemoryTableStore {
    fn read(&self) -> Result<Option<Snapshot>> {
        Ok(self.snapshot.clone())
    }

    fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshot = Some(snapshot.clone());

        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
