//! Coverage summary file: which one-degree cells have a frame, per level.
//!
//! The file is three 180×360 grids of single bytes, `0` or `1`, written
//! level 0 first. Within a level, rows run from latitude -90 northwards and
//! columns from longitude -180 eastwards.

use crate::{DtedError, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Latitude rows per level.
pub const COVERAGE_ROWS: usize = 180;
/// Longitude columns per level.
pub const COVERAGE_COLS: usize = 360;
/// Number of DTED levels.
pub const COVERAGE_LEVELS: usize = 3;
/// Size of a coverage file in bytes.
pub const COVERAGE_FILE_SIZE: usize = COVERAGE_LEVELS * COVERAGE_ROWS * COVERAGE_COLS;

/// Coverage flags for every cell at every level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    cells: Vec<bool>,
}

impl Default for Coverage {
    fn default() -> Self {
        Self {
            cells: vec![false; COVERAGE_FILE_SIZE],
        }
    }
}

impl Coverage {
    /// Coverage with no cells set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cell containing `(lat, lon)` has a frame at `level`.
    pub fn covers(&self, level: u8, lat: f64, lon: f64) -> bool {
        cell_index(level, lat, lon).is_some_and(|i| self.cells[i])
    }

    /// Mark the cell containing `(lat, lon)`. Out-of-range input is ignored.
    pub fn set(&mut self, level: u8, lat: f64, lon: f64, covered: bool) {
        if let Some(i) = cell_index(level, lat, lon) {
            self.cells[i] = covered;
        }
    }

    /// Number of covered cells at `level`.
    pub fn count(&self, level: u8) -> usize {
        let level = level as usize;
        if level >= COVERAGE_LEVELS {
            return 0;
        }
        let per_level = COVERAGE_ROWS * COVERAGE_COLS;
        self.cells[level * per_level..(level + 1) * per_level]
            .iter()
            .filter(|c| **c)
            .count()
    }

    /// Serialize in file order.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let bytes: Vec<u8> = self.cells.iter().map(|c| u8::from(*c)).collect();
        out.write_all(&bytes)?;
        Ok(())
    }

    /// Parse a coverage file. The input must be exactly
    /// [`COVERAGE_FILE_SIZE`] bytes of `0` or `1`.
    pub fn read_from<R: Read>(src: &mut R) -> Result<Self> {
        let mut bytes = Vec::with_capacity(COVERAGE_FILE_SIZE);
        src.read_to_end(&mut bytes)?;
        if bytes.len() != COVERAGE_FILE_SIZE {
            return Err(DtedError::InvalidCoverage(format!(
                "expected {} bytes, found {}",
                COVERAGE_FILE_SIZE,
                bytes.len()
            )));
        }
        let cells = bytes
            .iter()
            .enumerate()
            .map(|(offset, byte)| match byte {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(DtedError::InvalidCoverage(format!(
                    "byte {} at offset {} is not 0 or 1",
                    other, offset
                ))),
            })
            .collect::<Result<Vec<bool>>>()?;
        Ok(Self { cells })
    }

    /// Write to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Read from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }
}

fn cell_index(level: u8, lat: f64, lon: f64) -> Option<usize> {
    let level = level as usize;
    let row = (lat.floor() + 90.0) as i64;
    let col = (lon.floor() + 180.0) as i64;
    if level >= COVERAGE_LEVELS || !(0..COVERAGE_ROWS as i64).contains(&row) || !(0..COVERAGE_COLS as i64).contains(&col) {
        return None;
    }
    Some((level * COVERAGE_ROWS + row as usize) * COVERAGE_COLS + col as usize)
}
