//! The pipeline actor runs one batch: load the incoming files, aggregate them,
//! merge them into the lifetime-giving table and write the table back.
//! For that purpose, it uses the [CsvSource] and [TableStore] adapters and the
//! aggregation and merge services.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{info, warn};
use thiserror::Error;

use crate::{
    adapter::{CsvSource, ParquetTableStore, SourceFile, TableStore},
    config::PipelineConfig,
    model::Snapshot,
    service::{aggregate, merge_report},
    Result,
};

/// Errors raised by a run once the table is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The table holds the batch but its files are still in the incoming
    /// directory, so the next run would count them again.
    #[error("Table '{table_location}' was written but the incoming files could not be archived; move the remaining files out of the incoming directory before the next run.")]
    ArchiveFailed {
        /// Where the table was written.
        table_location: String,

        /// Why the archiving failed.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// The CSV files read, with their row counts.
    pub files: Vec<SourceFile>,

    /// Rows read from all the files.
    pub incoming_rows: usize,

    /// Distinct donors of the batch.
    pub incoming_donors: usize,

    /// Donors added to the table.
    pub new_donors: usize,

    /// Donors of the table that gave again.
    pub updated_donors: usize,

    /// Donors in the table after the run.
    pub total_donors: usize,

    /// True when there was no table before the run.
    pub created: bool,

    /// Where the table was written.
    pub table_location: String,

    /// Where the files were moved, if they were.
    pub archived_to: Option<PathBuf>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} row(s), {} donor(s) in batch: {} new, {} updated, {} in table '{}'",
            self.files.len(),
            self.incoming_rows,
            self.incoming_donors,
            self.new_donors,
            self.updated_donors,
            self.total_donors,
            self.table_location,
        )
    }
}

/// The pipeline actor. It is created once per run from its configuration
/// and owns the table store.
pub struct Pipeline {
    config: PipelineConfig,
    source: CsvSource,
    store: Box<dyn TableStore>,
}

impl Pipeline {
    /// Create a pipeline storing the table in Parquet at the configured place.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let store = ParquetTableStore::new(config.table_path());

        Self::with_store(config, store)
    }

    /// Create a pipeline on the given table store.
    pub fn with_store(config: PipelineConfig, store: impl TableStore + 'static) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source: CsvSource::new(&config.incoming_dir),
            config,
            store: Box::new(store),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the table as currently stored.
    pub fn read_table(&self) -> Result<Option<Snapshot>> {
        self.store.read()
    }

    /// Run the pipeline.
    /// Every stage must succeed before the table is written, so a failed run
    /// leaves the table as it was. Files are archived, when configured, only
    /// once the table is written; an archive failure is reported as
    /// [PipelineError::ArchiveFailed] since the table is already updated.
    pub fn run(&mut self) -> Result<RunReport> {
        info!(
            "Processing incoming donations from '{}'.",
            self.source.directory().display()
        );
        let record_set = self.source.load_all()?;

        info!("Aggregating {} donation row(s) from incoming files.", record_set.len());
        let incoming = aggregate(&record_set)?;
        let incoming_donors = incoming.len();

        let existing = self.store.read()?;
        let created = existing.is_none();
        if created {
            info!(
                "No existing {} table found. Creating new table from incoming data.",
                self.config.table_name
            );
        } else {
            info!(
                "Merging aggregated data from incoming files with {} table.",
                self.config.table_name
            );
        }
        let outcome = merge_report(incoming, existing)?;

        self.store.write(&outcome.snapshot)?;
        info!(
            "Successfully updated {} table at '{}'.",
            self.config.table_name,
            self.store.location()
        );

        let archived_to = match &self.config.archive_dir {
            Some(archive_dir) => {
                archive_files(&record_set.files, archive_dir).map_err(|error| {
                    warn!("Remaining incoming files will be counted again by the next run.");
                    PipelineError::ArchiveFailed {
                        table_location: self.store.location(),
                        source: error.into(),
                    }
                })?;
                Some(archive_dir.clone())
            }
            None => None,
        };

        Ok(RunReport {
            incoming_rows: record_set.len(),
            files: record_set.files,
            incoming_donors,
            new_donors: outcome.new_donors,
            updated_donors: outcome.updated_donors,
            total_donors: outcome.snapshot.len(),
            created,
            table_location: self.store.location(),
            archived_to,
        })
    }
}

/// Move the processed files into the archive directory. A file never
/// overwrites an already archived one.
fn archive_files(files: &[SourceFile], archive_dir: &Path) -> Result<()> {
    fs::create_dir_all(archive_dir).with_context(|| {
        format!("Cannot create archive directory '{}'.", archive_dir.display())
    })?;

    for file in files {
        let target = archive_target(&file.path, archive_dir)?;
        fs::rename(&file.path, &target).with_context(|| {
            format!(
                "Cannot archive '{}' to '{}'.",
                file.path.display(),
                target.display()
            )
        })?;
        info!("Archived '{}' to '{}'.", file.path.display(), target.display());
    }

    Ok(())
}

/// `<archive>/<name>.csv`, or `<archive>/<name>.<n>.csv` with the first free `n`.
fn archive_target(path: &Path, archive_dir: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .with_context(|| format!("'{}' has no file name.", path.display()))?
        .to_string_lossy();
    let mut target = archive_dir.join(format!("{stem}.csv"));
    let mut suffix = 1;
    while target.exists() {
        target = archive_dir.join(format!("{stem}.{suffix}.csv"));
        suffix += 1;
    }

    Ok(target)
}
