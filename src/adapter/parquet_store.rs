//! Parquet table store
//!
//! The lifetime-giving table is one Parquet file with four non nullable
//! columns:
//!
//! | column           | Arrow type          |
//! |------------------|---------------------|
//! | `DonorID`        | `Utf8`              |
//! | `Name`           | `Utf8`              |
//! | `LifetimeAmount` | `Decimal128(38, s)` |
//! | `LastDonation`   | `Date32`            |
//!
//! The scale `s` is the largest scale of the snapshot amounts, so every
//! amount is stored without rounding.

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use arrow::{
    array::{Array, ArrayRef, Date32Array, Decimal128Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{Datelike, NaiveDate};
use log::debug;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use rust_decimal::Decimal;

use crate::adapter::{StoreError, TableStore};
use crate::model::{DonorAggregate, Snapshot};
use crate::Result;

/// Largest precision of an Arrow 128 bits decimal.
const DECIMAL_PRECISION: u8 = 38;

/// `num_days_from_ce` of 1970-01-01, the origin of `Date32` values.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Store the lifetime-giving table in a Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetTableStore {
    path: PathBuf,
}

impl ParquetTableStore {
    /// Create a store on the given file. Nothing is touched on disk until the
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The Parquet file of the table.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_snapshot(&self) -> std::result::Result<Option<Snapshot>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let mut snapshot = Snapshot::new();
        for batch in reader {
            decode_batch(&batch?, &self.path, &mut snapshot)?;
        }

        Ok(Some(snapshot))
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> std::result::Result<(), StoreError> {
        if let Some(directory) = self.path.parent() {
            fs::create_dir_all(directory).map_err(io_error(directory))?;
        }

        let batch = encode_snapshot(snapshot)?;
        // Written aside then renamed so the previous table survives a failed write.
        let tmp_path = self.path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path).map_err(io_error(&tmp_path))?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;

        fs::rename(&tmp_path, &self.path).map_err(io_error(&self.path))?;
        debug!("Wrote {} rows to '{}'.", batch.num_rows(), self.path.display());

        Ok(())
    }
}

impl TableStore for ParquetTableStore {
    fn read(&self) -> Result<Option<Snapshot>> {
        self.read_snapshot()
            .with_context(|| format!("Cannot read table '{}'.", self.path.display()))
    }

    fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.write_snapshot(snapshot)
            .with_context(|| format!("Cannot write table '{}'.", self.path.display()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();

    move |source| StoreError::Io { path, source }
}

/// The Arrow schema of the table for the given amount scale.
pub fn table_schema(scale: i8) -> Schema {
    Schema::new(vec![
        Field::new("DonorID", DataType::Utf8, false),
        Field::new("Name", DataType::Utf8, false),
        Field::new(
            "LifetimeAmount",
            DataType::Decimal128(DECIMAL_PRECISION, scale),
            false,
        ),
        Field::new("LastDonation", DataType::Date32, false),
    ])
}

fn encode_snapshot(snapshot: &Snapshot) -> std::result::Result<RecordBatch, StoreError> {
    let scale = snapshot
        .values()
        .map(|aggregate| aggregate.lifetime_amount.scale())
        .max()
        .unwrap_or(0);

    let mut donor_ids = Vec::with_capacity(snapshot.len());
    let mut names = Vec::with_capacity(snapshot.len());
    let mut amounts = Vec::with_capacity(snapshot.len());
    let mut dates = Vec::with_capacity(snapshot.len());

    for aggregate in snapshot.values() {
        donor_ids.push(aggregate.donor_id.as_str());
        names.push(aggregate.name.as_str());
        amounts.push(to_fixed_point(aggregate, scale)?);
        dates.push(aggregate.last_donation.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE);
    }

    // A rust_decimal scale is at most 28 so it always fits an i8.
    let scale = scale as i8;
    let amounts = Decimal128Array::from(amounts).with_precision_and_scale(DECIMAL_PRECISION, scale)?;
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(donor_ids)),
        Arc::new(StringArray::from(names)),
        Arc::new(amounts),
        Arc::new(Date32Array::from(dates)),
    ];

    Ok(RecordBatch::try_new(Arc::new(table_schema(scale)), columns)?)
}

/// The amount mantissa once brought to `scale`.
fn to_fixed_point(aggregate: &DonorAggregate, scale: u32) -> std::result::Result<i128, StoreError> {
    let amount = aggregate.lifetime_amount;
    let max = 10u128.pow(DECIMAL_PRECISION as u32);

    10i128
        .checked_pow(scale - amount.scale())
        .and_then(|factor| amount.mantissa().checked_mul(factor))
        .filter(|value| value.unsigned_abs() < max)
        .ok_or_else(|| StoreError::AmountOverflow {
            donor_id: aggregate.donor_id.clone(),
            amount,
            scale,
        })
}

fn decode_batch(
    batch: &RecordBatch,
    path: &Path,
    snapshot: &mut Snapshot,
) -> std::result::Result<(), StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let donor_ids = column::<StringArray>(batch, "DonorID", path)?;
    let names = column::<StringArray>(batch, "Name", path)?;
    let amounts = column::<Decimal128Array>(batch, "LifetimeAmount", path)?;
    let dates = column::<Date32Array>(batch, "LastDonation", path)?;

    let scale = u32::try_from(amounts.scale())
        .map_err(|_| corrupt(format!("negative amount scale {}", amounts.scale())))?;

    for row in 0..batch.num_rows() {
        let donor_id = donor_ids.value(row).to_string();
        let lifetime_amount = Decimal::try_from_i128_with_scale(amounts.value(row), scale)
            .map_err(|error| corrupt(format!("amount of donor '{donor_id}': {error}")))?;
        let last_donation = dates
            .value(row)
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| corrupt(format!("last donation date of donor '{donor_id}'")))?;

        let aggregate =
            DonorAggregate::new(donor_id.clone(), names.value(row), lifetime_amount, last_donation);
        if snapshot.insert(donor_id.clone(), aggregate).is_some() {
            return Err(corrupt(format!("donor '{donor_id}' appears twice")));
        }
    }

    Ok(())
}

/// Get a non nullable column of the expected Arrow type.
fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> std::result::Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .filter(|column| column.null_count() == 0)
        .and_then(|column| column.as_any().downcast_ref::<T>())
        .ok_or_else(|| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("column '{name}' is missing, has nulls or has the wrong type"),
        })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(aggregates: Vec<DonorAggregate>) -> Snapshot {
        aggregates
            .into_iter()
            .map(|aggregate| (aggregate.donor_id.clone(), aggregate))
            .collect()
    }

    fn store_in(directory: &Path) -> ParquetTableStore {
        ParquetTableStore::new(directory.join("donorlifetimegiving").join("data.parquet"))
    }

    #[test]
    fn read_before_first_write() {
        let directory = tempfile::tempdir().unwrap();

        assert_eq!(store_in(directory.path()).read().unwrap(), None);
    }

    #[test]
    fn write_creates_directories_and_round_trips() {
        let directory = tempfile::tempdir().unwrap();
        let mut store = store_in(directory.path());
        let table = snapshot(vec![
            DonorAggregate::new("D1", "Alice", dec!(75), date(2024, 3, 4)),
            DonorAggregate::new("D2", "Bob", dec!(10.25), date(2024, 1, 1)),
            DonorAggregate::new("D3", "Zoë", dec!(0.001), date(1969, 12, 31)),
        ]);

        store.write(&table).unwrap();

        assert!(store.path().is_file());
        assert!(!store.path().with_extension("parquet.tmp").exists());
        assert_eq!(store.read().unwrap(), Some(table));
    }

    #[test]
    fn round_trip_keeps_large_exact_amounts() {
        let directory = tempfile::tempdir().unwrap();
        let mut store = store_in(directory.path());
        let table = snapshot(vec![
            DonorAggregate::new("D1", "Alice", dec!(12345678901234567890.12), date(2024, 3, 4)),
            DonorAggregate::new("D2", "Bob", dec!(0.0000001), date(2024, 3, 4)),
        ]);

        store.write(&table).unwrap();
        let read = store.read().unwrap().unwrap();

        assert_eq!(read["D1"].lifetime_amount, dec!(12345678901234567890.12));
        assert_eq!(read["D2"].lifetime_amount, dec!(0.0000001));
    }

    #[test]
    fn write_replaces_previous_table() {
        let directory = tempfile::tempdir().unwrap();
        let mut store = store_in(directory.path());
        store
            .write(&snapshot(vec![DonorAggregate::new(
                "D1",
                "Alice",
                dec!(75),
                date(2024, 3, 4),
            )]))
            .unwrap();
        let second = snapshot(vec![DonorAggregate::new(
            "D2",
            "Bob",
            dec!(10),
            date(2024, 1, 1),
        )]);

        store.write(&second).unwrap();

        assert_eq!(store.read().unwrap(), Some(second));
    }

    #[test]
    fn empty_table_round_trips() {
        let directory = tempfile::tempdir().unwrap();
        let mut store = store_in(directory.path());
        store.write(&Snapshot::new()).unwrap();

        assert_eq!(store.read().unwrap(), Some(Snapshot::new()));
    }

    #[test]
    fn amount_too_large_for_common_scale() {
        let table = snapshot(vec![
            DonorAggregate::new("D1", "Alice", Decimal::MAX, date(2024, 3, 4)),
            DonorAggregate::new("D2", "Bob", dec!(0.0000000001), date(2024, 3, 4)),
        ]);
        let error = encode_snapshot(&table).unwrap_err();

        assert!(matches!(
            error,
            StoreError::AmountOverflow { ref donor_id, scale, .. } if donor_id == "D1" && scale == 10
        ));
    }

    #[test]
    fn read_garbage_file() {
        let directory = tempfile::tempdir().unwrap();
        let store = store_in(directory.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"not a parquet file").unwrap();

        let error = store.read().unwrap_err();

        assert!(matches!(
            error.downcast_ref::<StoreError>(),
            Some(StoreError::Parquet(_))
        ));
    }

    #[test]
    fn read_file_with_other_schema() {
        let directory = tempfile::tempdir().unwrap();
        let store = store_in(directory.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("DonorID", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(vec!["D1"])) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(store.path()).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let error = store.read().unwrap_err();

        assert!(matches!(
            error.downcast_ref::<StoreError>(),
            Some(StoreError::Corrupt { reason, .. }) if reason.contains("Name")
        ));
    }

    #[test]
    fn date32_values_are_days_since_unix_epoch() {
        let table = snapshot(vec![DonorAggregate::new(
            "D1",
            "Alice",
            dec!(1),
            date(1970, 1, 2),
        )]);
        let batch = encode_snapshot(&table).unwrap();
        let dates = batch
            .column_by_name("LastDonation")
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();

        assert_eq!(dates.value(0), 1);
    }
}
