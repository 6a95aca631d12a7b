use std::{io::stdout, path::PathBuf};

use clap::Parser;
use log::{error, info};

use donor_ledger::{
    actor::{Pipeline, TableExporter, DEFAULT_DISPLAY_LIMIT},
    config::{PipelineConfig, DEFAULT_INCOMING_DIR, DEFAULT_TABLE_NAME, DEFAULT_WAREHOUSE_DIR},
    Result,
};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(version, about = "Merge incoming donation CSV files into the donor lifetime-giving table.")]
struct CLIArguments {
    /// Directory scanned for incoming `*.csv` donation files.
    #[arg(long, default_value = DEFAULT_INCOMING_DIR)]
    incoming_dir: PathBuf,

    /// Name of the lifetime-giving table.
    #[arg(long, default_value = DEFAULT_TABLE_NAME)]
    table_name: String,

    /// Directory holding the tables.
    #[arg(long, default_value = DEFAULT_WAREHOUSE_DIR)]
    warehouse_dir: PathBuf,

    /// Move the processed files to this directory once the table is written.
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Number of table rows to print.
    #[arg(long, default_value_t = DEFAULT_DISPLAY_LIMIT)]
    limit: usize,
}

struct Application {
    pipeline: Pipeline,
    limit: usize,
}

impl Application {
    fn new(arguments: CLIArguments) -> Result<Self> {
        let mut config = PipelineConfig::default()
            .with_incoming_dir(arguments.incoming_dir)
            .with_table_name(arguments.table_name)
            .with_warehouse_dir(arguments.warehouse_dir);
        if let Some(archive_dir) = arguments.archive_dir {
            config = config.with_archive_dir(archive_dir);
        }
        let this = Self {
            pipeline: Pipeline::new(config)?,
            limit: arguments.limit,
        };

        Ok(this)
    }

    fn run(&mut self) -> Result<()> {
        info!("Starting DONOR_LEDGER version {}", env!("CARGO_PKG_VERSION"));

        let report = self.pipeline.run()?;
        info!("Run summary: {report}");

        self.show_table()
    }

    fn show_table(&self) -> Result<()> {
        let table_name = &self.pipeline.config().table_name;

        match self.pipeline.read_table()? {
            Some(snapshot) => TableExporter::new(stdout().lock(), self.limit).export(table_name, &snapshot),
            None => {
                println!("Table {table_name} does not exist yet.");
                Ok(())
            }
        }
    }
}

fn main() -> Result<()> {
    let arguments = CLIArguments::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut application = Application::new(arguments)?;

    let result = application.run();

    match &result {
        Ok(_) => {
            info!("DONOR_LEDGER completed successfully");
        }
        Err(error) => {
            error!("DONOR_LEDGER failed with error: {:#}", error);
        }
    };

    result
}
