//! CSV source
//!
//! Discovers the donation CSV files of an input directory and loads them into
//! one [RecordSet]. Files are read in path order and rows keep their in-file
//! order, which makes "the first row of a donor" well defined across files.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info};
use thiserror::Error;

use crate::{model::CSVDonationEntity, Result};

/// Columns every donation file must have, in any order.
pub const EXPECTED_COLUMNS: [&str; 4] = ["DonorID", "Name", "Amount", "Date"];

/// Errors raised while discovering or reading the input files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// There is nothing to ingest.
    #[error("No CSV files found in '{}'.", .directory.display())]
    NoInput {
        /// The scanned directory.
        directory: PathBuf,
    },

    /// A file does not have the donation columns.
    #[error("CSV file '{}' has columns {:?}, expected {:?}.", .file.display(), .found, EXPECTED_COLUMNS)]
    SchemaMismatch {
        /// The offending file.
        file: PathBuf,

        /// The header cells found in the file.
        found: Vec<String>,
    },
}

/// Number of rows loaded from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// All the rows of one batch, in file order then row order.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    pub files: Vec<SourceFile>,
    pub rows: Vec<CSVDonationEntity>,
}

impl RecordSet {
    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the batch holds no row (files with a header only).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads every `*.csv` file of a directory.
#[derive(Debug, Clone)]
pub struct CsvSource {
    directory: PathBuf,
}

impl CsvSource {
    /// Create a new CSV source on the given directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The scanned directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List the CSV files of the directory sorted by path. A missing directory
    /// has no file.
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.csv",
            glob::Pattern::escape(&self.directory.to_string_lossy())
        );
        let mut files = Vec::new();

        for entry in glob::glob(&pattern).context("invalid glob pattern for CSV discovery")? {
            let path = entry.context("cannot read CSV directory entry")?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        Ok(files)
    }

    /// Load all the CSV files of the directory into one record set.
    /// Fails with [SourceError::NoInput] when there is no file and with
    /// [SourceError::SchemaMismatch] as soon as one file has other columns.
    pub fn load_all(&self) -> Result<RecordSet> {
        let files = self.find_files()?;
        if files.is_empty() {
            bail!(SourceError::NoInput {
                directory: self.directory.clone(),
            });
        }

        info!("Reading {} CSV file(s) from '{}'.", files.len(), self.directory.display());
        let mut record_set = RecordSet::default();

        for path in files {
            let file = File::open(&path)
                .with_context(|| format!("Cannot open CSV file '{}'.", path.display()))?;
            let rows = read_donations(BufReader::new(file), &path)?;
            info!("  Read {}: {} rows", display_name(&path), rows.len());

            record_set.files.push(SourceFile {
                path,
                rows: rows.len(),
            });
            record_set.rows.extend(rows);
        }

        Ok(record_set)
    }
}

/// Read the donation rows of one CSV stream. `origin` only names the stream
/// in errors.
pub fn read_donations<R: Read>(reader: R, origin: &Path) -> Result<Vec<CSVDonationEntity>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .with_context(|| format!("Cannot read header of '{}'.", origin.display()))?
        .clone();
    check_headers(&headers, origin)?;

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record =
            result.with_context(|| format!("Cannot read CSV record in '{}'.", origin.display()))?;
        let line = record.position().map_or(0, |position| position.line());
        let entity: CSVDonationEntity = record.deserialize(Some(&headers)).with_context(|| {
            format!("Invalid donation row at {}:{}.", origin.display(), line)
        })?;
        debug!("{}:{} {:?}", display_name(origin), line, entity);

        rows.push(entity);
    }

    Ok(rows)
}

fn check_headers(headers: &StringRecord, origin: &Path) -> Result<()> {
    let found: Vec<String> = headers.iter().map(str::to_string).collect();
    let mut sorted: Vec<&str> = found.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut expected = EXPECTED_COLUMNS;
    expected.sort_unstable();

    if sorted != expected {
        bail!(SourceError::SchemaMismatch {
            file: origin.to_path_buf(),
            found,
        });
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rust_decimal_macros::dec;

    use super::*;

    fn read(data: &str) -> Result<Vec<CSVDonationEntity>> {
        read_donations(data.as_bytes(), Path::new("test.csv"))
    }

    fn assert_schema_mismatch(data: &str) {
        let error = read(data).unwrap_err();

        assert!(
            matches!(
                error.downcast_ref::<SourceError>(),
                Some(SourceError::SchemaMismatch { .. })
            ),
            "unexpected error: {error:#}"
        );
    }

    #[test]
    fn simple_ok_sample() {
        let rows = read(
            r#"DonorID,Name,Amount,Date
D1,Alice,50,1/2/2024
D1,Alice,25,3/4/2024
D2,Bob,10.5,1/1/2024"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].donor_id, "D2");
        assert_eq!(rows[2].amount, dec!(10.5));
        assert_eq!(rows[2].date, "1/1/2024");
    }

    #[test]
    fn test_reordered_columns() {
        let rows = read(
            r#"Date, Amount, Name, DonorID
1/2/2024, 50, Alice, D1"#,
        )
        .unwrap();

        assert_eq!(rows[0].donor_id, "D1");
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].amount, dec!(50));
    }

    #[test]
    fn test_empty_lines_and_spaces() {
        let rows = read(
            r#"DonorID,Name,Amount,Date

  D1 , Alice , 50 , 1/2/2024

D2,Bob,10,1/1/2024
"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].donor_id, "D1");
        assert_eq!(rows[0].date, "1/2/2024");
    }

    #[test]
    fn test_header_only() {
        assert!(read("DonorID,Name,Amount,Date\n").unwrap().is_empty());
    }

    #[test]
    fn test_missing_column() {
        assert_schema_mismatch("DonorID,Name,Amount\nD1,Alice,50\n");
    }

    #[test]
    fn test_extra_column() {
        assert_schema_mismatch("DonorID,Name,Amount,Date,Note\nD1,Alice,50,1/2/2024,hi\n");
    }

    #[test]
    fn test_duplicated_column() {
        assert_schema_mismatch("DonorID,Name,Amount,Amount\nD1,Alice,50,50\n");
    }

    #[test]
    fn test_empty_file() {
        assert_schema_mismatch("");
    }

    #[test]
    fn test_invalid_amount_fails() {
        let error = read("DonorID,Name,Amount,Date\nD1,Alice,fifty,1/2/2024\n").unwrap_err();

        assert!(error.to_string().contains("test.csv:2"), "{error}");
    }

    #[test]
    fn test_short_row_fails() {
        assert!(read("DonorID,Name,Amount,Date\nD1,Alice,50\n").is_err());
    }

    #[test]
    fn load_all_from_directory() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(
            directory.path().join("b.csv"),
            "DonorID,Name,Amount,Date\nD2,Bob,10,1/1/2024\n",
        )
        .unwrap();
        fs::write(
            directory.path().join("a.csv"),
            "DonorID,Name,Amount,Date\nD1,Alice,50,1/2/2024\nD1,Alice,25,3/4/2024\n",
        )
        .unwrap();
        fs::write(directory.path().join("notes.txt"), "not a csv").unwrap();

        let record_set = CsvSource::new(directory.path()).load_all().unwrap();

        assert_eq!(record_set.len(), 3);
        assert_eq!(record_set.files.len(), 2);
        assert_eq!(record_set.files[0].path, directory.path().join("a.csv"));
        assert_eq!(record_set.files[0].rows, 2);
        assert_eq!(record_set.files[1].rows, 1);
        // file order then row order
        let donors: Vec<&str> = record_set.rows.iter().map(|r| r.donor_id.as_str()).collect();
        assert_eq!(donors, vec!["D1", "D1", "D2"]);
    }

    #[test]
    fn load_all_without_files() {
        let directory = tempfile::tempdir().unwrap();
        let error = CsvSource::new(directory.path()).load_all().unwrap_err();

        assert!(matches!(
            error.downcast_ref::<SourceError>(),
            Some(SourceError::NoInput { directory: scanned }) if scanned == directory.path()
        ));
    }

    #[test]
    fn load_all_missing_directory() {
        let directory = tempfile::tempdir().unwrap();
        let error = CsvSource::new(directory.path().join("Incoming"))
            .load_all()
            .unwrap_err();

        assert!(matches!(
            error.downcast_ref::<SourceError>(),
            Some(SourceError::NoInput { .. })
        ));
    }

    #[test]
    fn load_all_fails_on_one_bad_file() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(
            directory.path().join("a.csv"),
            "DonorID,Name,Amount,Date\nD1,Alice,50,1/2/2024\n",
        )
        .unwrap();
        fs::write(directory.path().join("b.csv"), "Id,Who,Amount,When\n1,x,1,1/1/2024\n").unwrap();

        let error = CsvSource::new(directory.path()).load_all().unwrap_err();

        assert!(matches!(
            error.downcast_ref::<SourceError>(),
            Some(SourceError::SchemaMismatch { file, .. }) if file.ends_with("b.csv")
        ));
    }
}
