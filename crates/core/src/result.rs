use std::io;

use serde::Serialize;
use thiserror::Error;

/// Errors raised when appending to a [`SimulationResult`].
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum ResultError {
    #[error("row time {time} precedes previous row time {previous}")]
    DecreasingTime { previous: f64, time: f64 },

    #[error("row has {actual} values, expected {expected}")]
    Width { expected: usize, actual: usize },

    #[error("more than two rows at time {time}")]
    TooManyAtTime { time: f64 },
}

/// One sampled row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub time: f64,
    pub values: Vec<f64>,
}

impl Row {
    #[must_use]
    pub fn new(time: f64, values: Vec<f64>) -> Self {
        Self { time, values }
    }
}

/// Append-only table of sampled outputs.
///
/// Row times never decrease. A timestamp may appear at most twice, and only
/// as an event bracket: the values just before and just after an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl SimulationResult {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Rejects rows with the wrong width, rows earlier than the last one, and
    /// a third row at the same time.
    pub fn push(&mut self, row: Row) -> Result<(), ResultError> {
        if row.values.len() != self.columns.len() {
            return Err(ResultError::Width {
                expected: self.columns.len(),
                actual: row.values.len(),
            });
        }

        if let Some(last) = self.rows.last() {
            if row.time < last.time {
                return Err(ResultError::DecreasingTime {
                    previous: last.time,
                    time: row.time,
                });
            }
            #[allow(clippy::float_cmp)]
            let same_time = self
                .rows
                .iter()
                .rev()
                .take_while(|r| r.time == row.time)
                .count();
            if same_time >= 2 {
                return Err(ResultError::TooManyAtTime { time: row.time });
            }
        }

        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Row> {
        self.rows.last()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|r| r.time)
    }

    /// Returns the values of the named column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r.values[index]).collect())
    }

    /// Streams the table to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the sink.
    pub fn write_to(&self, sink: &mut dyn ResultSink) -> io::Result<()> {
        sink.header(&self.columns)?;
        for row in &self.rows {
            sink.row(row)?;
        }
        Ok(())
    }
}

/// Destination for result rows.
pub trait ResultSink {
    /// # Errors
    ///
    /// Returns any I/O error from the destination.
    fn header(&mut self, columns: &[String]) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns any I/O error from the destination.
    fn row(&mut self, row: &Row) -> io::Result<()>;
}

/// Writes rows as comma-separated text with a `time` column first.
#[derive(Debug)]
pub struct CsvSink<W> {
    writer: W,
}

impl<W: io::Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write> ResultSink for CsvSink<W> {
    fn header(&mut self, columns: &[String]) -> io::Result<()> {
        write!(self.writer, "time")?;
        for column in columns {
            write!(self.writer, ",{column}")?;
        }
        writeln!(self.writer)
    }

    fn row(&mut self, row: &Row) -> io::Result<()> {
        write!(self.writer, "{}", row.time)?;
        for value in &row.values {
            write!(self.writer, ",{value}")?;
        }
        writeln!(self.writer)
    }
}
