//! Pipeline configuration
//!
//! Every setting has a default so the pipeline runs without any argument. The
//! `with_*` methods override them one by one.

use std::path::{self, Path, PathBuf};

use anyhow::bail;

use crate::Result;

/// Directory scanned for incoming CSV files by default.
pub const DEFAULT_INCOMING_DIR: &str = "Incoming";

/// Name of the lifetime-giving table by default.
pub const DEFAULT_TABLE_NAME: &str = "DonorLifetimeGiving";

/// Directory holding the tables by default.
pub const DEFAULT_WAREHOUSE_DIR: &str = "warehouse";

/// File name of a table inside its directory.
pub const TABLE_FILE_NAME: &str = "data.parquet";

/// Settings of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory scanned for `*.csv` files.
    pub incoming_dir: PathBuf,

    /// Name of the lifetime-giving table.
    pub table_name: String,

    /// Directory holding one sub directory per table.
    pub warehouse_dir: PathBuf,

    /// When set, processed CSV files are moved there after a successful run so
    /// they are not counted again by the next run.
    pub archive_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            incoming_dir: PathBuf::from(DEFAULT_INCOMING_DIR),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            warehouse_dir: PathBuf::from(DEFAULT_WAREHOUSE_DIR),
            archive_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_incoming_dir(mut self, incoming_dir: impl Into<PathBuf>) -> Self {
        self.incoming_dir = incoming_dir.into();
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_warehouse_dir(mut self, warehouse_dir: impl Into<PathBuf>) -> Self {
        self.warehouse_dir = warehouse_dir.into();
        self
    }

    pub fn with_archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(archive_dir.into());
        self
    }

    /// Directory of the table: `<warehouse>/<table name in lower case>`.
    ///
    /// ```
    /// use std::path::Path;
    /// use donor_ledger::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::default().with_warehouse_dir("/data");
    /// assert_eq!(config.table_dir(), Path::new("/data/donorlifetimegiving"));
    /// assert_eq!(config.table_path(), Path::new("/data/donorlifetimegiving/data.parquet"));
    /// ```
    pub fn table_dir(&self) -> PathBuf {
        self.warehouse_dir.join(self.table_name.to_lowercase())
    }

    /// The Parquet file of the table.
    pub fn table_path(&self) -> PathBuf {
        self.table_dir().join(TABLE_FILE_NAME)
    }

    /// Check the table name can be used as a directory name.
    pub fn validate(&self) -> Result<()> {
        let name = self.table_name.trim();
        if name.is_empty() {
            bail!("Table name must not be empty.");
        }
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            bail!("Table name '{}' is not a valid directory name.", self.table_name);
        }
        let incoming_dir = resolve(&self.incoming_dir);
        if self.archive_dir.as_deref().map(resolve) == Some(incoming_dir) {
            bail!(
                "Archive directory must differ from the incoming directory '{}'.",
                self.incoming_dir.display()
            );
        }

        Ok(())
    }
}

/// Absolute form of a path with the symbolic links of its existing part
/// resolved, so two spellings of one directory compare equal whether it
/// exists or not.
fn resolve(path: &Path) -> PathBuf {
    let absolute = path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |resolved, name| resolved.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}
