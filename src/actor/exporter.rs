//! # Table Exporter Actor
//!
//! This module renders the lifetime-giving table as a text grid, ordered by
//! donor ID, followed by the number of records.

use std::io::Write;

use log::debug;

use crate::{model::Snapshot, Result};

/// Number of rows printed by default.
pub const DEFAULT_DISPLAY_LIMIT: usize = 20;

const HEADERS: [&str; 4] = ["DonorID", "Name", "LifetimeAmount", "LastDonation"];

/// The table exporter actor.
pub struct TableExporter<W: Write> {
    /// Where the table is printed.
    writer: W,

    /// At most this many rows are printed.
    limit: usize,
}

impl<W: Write> TableExporter<W> {
    /// Create a new table exporter actor.
    pub fn new(writer: W, limit: usize) -> Self {
        Self { writer, limit }
    }

    /// Print the table.
    pub fn export(&mut self, table_name: &str, snapshot: &Snapshot) -> Result<()> {
        debug!("Table Exporter Actor started");

        let rows: Vec<[String; 4]> = snapshot
            .values()
            .take(self.limit)
            .map(|aggregate| {
                [
                    aggregate.donor_id.clone(),
                    aggregate.name.clone(),
                    aggregate.lifetime_amount.to_string(),
                    aggregate.last_donation.format("%Y-%m-%d").to_string(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(|header| header.chars().count());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        let border = widths
            .iter()
            .fold(String::from("+"), |line, width| line + &"-".repeat(*width) + "+");

        let banner = "=".repeat(60);
        writeln!(self.writer, "\n{banner}\nContents of {table_name}:\n{banner}")?;
        writeln!(self.writer, "{border}")?;
        self.write_row(&HEADERS.map(String::from), &widths)?;
        writeln!(self.writer, "{border}")?;
        for row in &rows {
            self.write_row(row, &widths)?;
        }
        writeln!(self.writer, "{border}")?;
        if snapshot.len() > rows.len() {
            writeln!(self.writer, "only showing top {} rows", rows.len())?;
        }
        writeln!(self.writer, "\nTotal records: {}", snapshot.len())?;
        self.writer.flush()?;

        debug!("Table Exporter Actor stopped");

        Ok(())
    }

    /// Give the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_row(&mut self, cells: &[String; 4], widths: &[usize; 4]) -> Result<()> {
        let line = cells
            .iter()
            .zip(widths)
            .fold(String::from("|"), |line, (cell, &width)| {
                line + &format!("{cell:<width$}") + "|"
            });

        Ok(writeln!(self.writer, "{line}")?)
    }
}
