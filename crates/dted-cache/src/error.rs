//! Error types for the DTED crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when working with DTED data.
#[derive(Debug, Error)]
pub enum DtedError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A header block could not be read at all (truncated file, bad seek).
    #[error("Invalid {block} header in {path}: {reason}")]
    InvalidHeader {
        /// Which block failed (UHL, DSI, ACC).
        block: &'static str,
        /// Frame file path.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// The frame parsed but cannot be queried (zero post counts or intervals).
    #[error("Frame {0} is not usable")]
    InvalidFrame(PathBuf),

    /// No frame covers the requested coordinate at any searched level.
    #[error("No DTED frame found for coordinate ({lat}, {lon}) at level {level}")]
    NoFrame {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
        /// Requested DTED level.
        level: u8,
    },

    /// The requested rectangle crosses the antimeridian.
    #[error("Elevation extraction across the dateline is not supported (ullon={ullon}, lrlon={lrlon})")]
    DatelineUnsupported {
        /// Upper-left longitude.
        ullon: f64,
        /// Lower-right longitude.
        lrlon: f64,
    },

    /// A coverage file did not contain the expected grid bytes.
    #[error("Invalid coverage file: {0}")]
    InvalidCoverage(String),

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
