//! Lazily populated elevation grid of one frame.

use crate::header::FrameHeader;
use crate::reader::{read_column, MaybeOpenFile};
use dted_metrics::metric_defs;
use tracing::warn;

/// Posts indexed `[column][row]`: column 0 is the westernmost longitude
/// line, row 0 the southernmost post.
///
/// Columns start unread and are fetched from the frame file on first use.
/// A failed read leaves the column empty so a later access retries it.
#[derive(Debug)]
pub struct ElevationGrid {
    header: FrameHeader,
    columns: Vec<Option<Vec<i16>>>,
    file: MaybeOpenFile,
}

impl ElevationGrid {
    pub(crate) fn new(header: FrameHeader, file: MaybeOpenFile) -> Self {
        let columns = vec![None; header.uhl.num_lon_lines as usize];
        Self { header, columns, file }
    }

    /// Number of longitude columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of posts per column.
    pub fn num_rows(&self) -> usize {
        self.header.uhl.num_lat_points as usize
    }

    /// Clamp a column index into range.
    pub fn clamp_column(&self, column: i64) -> usize {
        column.clamp(0, self.num_columns().saturating_sub(1) as i64) as usize
    }

    /// Clamp a row index into range.
    pub fn clamp_row(&self, row: i64) -> usize {
        row.clamp(0, self.num_rows().saturating_sub(1) as i64) as usize
    }

    /// A column of posts, reading it if necessary. The index is clamped.
    ///
    /// Returns `None` when the column could not be read.
    pub fn column(&mut self, column: i64) -> Option<&[i16]> {
        if self.columns.is_empty() {
            return None;
        }
        let column = self.clamp_column(column);
        if self.columns[column].is_none() {
            self.load_column(column);
        }
        self.columns[column].as_deref()
    }

    /// One post, with both indices clamped.
    pub fn post(&mut self, column: i64, row: i64) -> Option<i16> {
        let row = self.clamp_row(row);
        self.column(column).and_then(|posts| posts.get(row).copied())
    }

    /// Whether a column is already in memory.
    pub fn is_loaded(&self, column: usize) -> bool {
        self.columns.get(column).is_some_and(Option::is_some)
    }

    /// Number of columns in memory.
    pub fn columns_loaded(&self) -> usize {
        self.columns.iter().filter(|c| c.is_some()).count()
    }

    /// Read every column not yet in memory. Returns how many are loaded.
    pub fn load_all(&mut self) -> usize {
        for column in 0..self.columns.len() {
            if self.columns[column].is_none() {
                self.load_column(column);
            }
        }
        self.columns_loaded()
    }

    /// Give back the file descriptor; loaded columns stay in memory.
    pub fn release_file(&mut self) {
        self.file.release();
    }

    /// Whether the frame file is currently open.
    pub fn file_is_open(&self) -> bool {
        self.file.is_open()
    }

    /// The file handle, for diagnostics.
    pub fn file(&self) -> &MaybeOpenFile {
        &self.file
    }

    fn load_column(&mut self, column: usize) {
        match read_column(&mut self.file, &self.header, column) {
            Ok(posts) if posts.len() == self.num_rows() => self.columns[column] = Some(posts),
            Ok(posts) => {
                metrics::counter!(metric_defs::COLUMN_READ_FAILURES.name).increment(1);
                warn!(
                    "{}: column {} has {} posts, expected {}",
                    self.file.path().display(),
                    column,
                    posts.len(),
                    self.num_rows()
                );
                self.columns[column] = None;
            }
            Err(e) => {
                metrics::counter!(metric_defs::COLUMN_READ_FAILURES.name).increment(1);
                warn!("{}: failed to read column {}: {}", self.file.path().display(), column, e);
                self.columns[column] = None;
            }
        }
    }
}
