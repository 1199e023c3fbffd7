//! UHL and DSI header parsing.
//!
//! A DTED frame file starts with three fixed-size blocks:
//!
//! | offset | size | block |
//! |--------|------|-------|
//! | 0      | 80   | UHL (User Header Label) |
//! | 80     | 648  | DSI (Data Set Identification) |
//! | 728    | 2700 | ACC (Accuracy), not interpreted here |
//!
//! All fields are fixed-width ASCII. Malformed numeric fields never fail the
//! parse: they fall back to 0 with a warning, and [`FrameHeader::is_usable`]
//! reports whether the counts and intervals that matter are present. Only
//! I/O failures (truncated file, unreadable handle) are fatal.

use crate::{DtedError, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

/// Size of the User Header Label block.
pub const UHL_SIZE: u64 = 80;
/// Size of the Data Set Identification block.
pub const DSI_SIZE: u64 = 648;
/// Size of the Accuracy block.
pub const ACC_SIZE: u64 = 2700;
/// Offset of the first data record.
pub const DATA_OFFSET: u64 = UHL_SIZE + DSI_SIZE + ACC_SIZE;

/// Post intervals are stored in tenths of arc-seconds; this converts a
/// degree offset into the same unit.
pub const TENTHS_OF_ARCSEC_PER_DEGREE: f64 = 36_000.0;

/// Parsed User Header Label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uhl {
    /// Whether the block started with the `UHL` sentinel.
    pub sentinel_ok: bool,
    /// Longitude of the lower-left post, decimal degrees.
    pub lon_origin: f64,
    /// Latitude of the lower-left post, decimal degrees.
    pub lat_origin: f64,
    /// Longitude post interval in tenths of arc-seconds.
    pub lon_post_interval: u32,
    /// Latitude post interval in tenths of arc-seconds.
    pub lat_post_interval: u32,
    /// Absolute vertical accuracy in meters (0 when `NA`).
    pub accuracy: u32,
    /// Security code.
    pub security_code: String,
    /// Unique reference number.
    pub unique_ref: String,
    /// Number of longitude lines (data records / columns).
    pub num_lon_lines: u32,
    /// Number of latitude points per longitude line.
    pub num_lat_points: u32,
    /// Multiple accuracy flag.
    pub multiple_accuracy: u8,
}

/// Parsed Data Set Identification block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dsi {
    /// Whether the block started with the `DSI` sentinel.
    pub sentinel_ok: bool,
    /// Security classification code (`U`, `C`, `S`, ...).
    pub security: String,
    /// Series designator, e.g. `DTED1`.
    pub series: String,
    /// Product level taken from the series designator.
    pub product_level: Option<u8>,
    /// Unique reference number.
    pub unique_ref: String,
    /// Data edition number.
    pub edition: u32,
    /// Vertical datum, e.g. `E96` or `MSL`.
    pub vertical_datum: String,
    /// Horizontal datum, e.g. `WGS84`.
    pub horizontal_datum: String,
    /// Latitude of origin.
    pub lat_origin: f64,
    /// Longitude of origin.
    pub lon_origin: f64,
    /// South-west corner latitude.
    pub sw_lat: f64,
    /// South-west corner longitude.
    pub sw_lon: f64,
    /// North-west corner latitude.
    pub nw_lat: f64,
    /// North-west corner longitude.
    pub nw_lon: f64,
    /// North-east corner latitude.
    pub ne_lat: f64,
    /// North-east corner longitude.
    pub ne_lon: f64,
    /// South-east corner latitude.
    pub se_lat: f64,
    /// South-east corner longitude.
    pub se_lon: f64,
    /// Clockwise orientation angle.
    pub orientation: f64,
    /// Latitude interval in tenths of arc-seconds.
    pub lat_post_interval: u32,
    /// Longitude interval in tenths of arc-seconds.
    pub lon_post_interval: u32,
    /// Number of latitude lines.
    pub num_lat_lines: u32,
    /// Number of longitude lines.
    pub num_lon_lines: u32,
    /// Partial cell indicator (0 = complete).
    pub partial_cell: u32,
}

/// Geographic bounds of a frame, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBounds {
    /// South edge.
    pub min_lat: f64,
    /// North edge.
    pub max_lat: f64,
    /// West edge.
    pub min_lon: f64,
    /// East edge.
    pub max_lon: f64,
}

impl FrameBounds {
    /// Check if a coordinate is within the bounds.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// The UHL and DSI blocks of one frame file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameHeader {
    /// User Header Label.
    pub uhl: Uhl,
    /// Data Set Identification.
    pub dsi: Dsi,
}

impl FrameHeader {
    /// Parse both header blocks from a seekable source.
    ///
    /// `path` is used for diagnostics only.
    pub fn read<R: Read + Seek>(src: &mut R, path: &Path) -> Result<Self> {
        let uhl = Uhl::read(src, path)?;
        let dsi = Dsi::read(src, path)?;
        Ok(Self { uhl, dsi })
    }

    /// Whether the grid dimensions and post spacing are usable.
    pub fn is_usable(&self) -> bool {
        self.uhl.num_lon_lines > 0
            && self.uhl.num_lat_points > 0
            && self.uhl.lon_post_interval > 0
            && self.uhl.lat_post_interval > 0
    }

    /// Bounding box declared by the header.
    ///
    /// The DSI corners are authoritative; when they are degenerate the box is
    /// derived from the UHL origin, counts and intervals.
    pub fn bounds(&self) -> FrameBounds {
        let dsi = &self.dsi;
        if dsi.ne_lat > dsi.sw_lat && dsi.ne_lon > dsi.sw_lon {
            return FrameBounds {
                min_lat: dsi.sw_lat,
                max_lat: dsi.ne_lat,
                min_lon: dsi.sw_lon,
                max_lon: dsi.ne_lon,
            };
        }

        let uhl = &self.uhl;
        let lat_span = uhl.num_lat_points.saturating_sub(1) as f64 * uhl.lat_post_interval as f64
            / TENTHS_OF_ARCSEC_PER_DEGREE;
        let lon_span = uhl.num_lon_lines.saturating_sub(1) as f64 * uhl.lon_post_interval as f64
            / TENTHS_OF_ARCSEC_PER_DEGREE;
        FrameBounds {
            min_lat: uhl.lat_origin,
            max_lat: uhl.lat_origin + lat_span,
            min_lon: uhl.lon_origin,
            max_lon: uhl.lon_origin + lon_span,
        }
    }

    /// Size in bytes of one longitude data record.
    pub fn record_size(&self) -> u64 {
        crate::reader::RECORD_OVERHEAD + 2 * self.uhl.num_lat_points as u64
    }

    /// DTED level implied by the latitude post interval.
    ///
    /// 300 → level 0 (30"), 30 → level 1 (3"), 10 → level 2 (1").
    pub fn level(&self) -> u8 {
        if let Some(level) = self.dsi.product_level {
            return level;
        }
        match self.uhl.lat_post_interval {
            0..=10 => 2,
            11..=30 => 1,
            _ => 0,
        }
    }
}

impl Uhl {
    /// Parse the UHL block at offset 0.
    pub fn read<R: Read + Seek>(src: &mut R, path: &Path) -> Result<Self> {
        let mut block = [0u8; UHL_SIZE as usize];
        read_block(src, 0, &mut block, "UHL", path)?;
        let field = |start: usize, len: usize| ascii_field(&block, start, len);

        let sentinel_ok = field(0, 3) == "UHL";
        if !sentinel_ok {
            warn!("{}: missing UHL sentinel", path.display());
        }

        Ok(Self {
            sentinel_ok,
            lon_origin: parse_dms_or_zero(&field(4, 8), "UHL longitude origin", path),
            lat_origin: parse_dms_or_zero(&field(12, 8), "UHL latitude origin", path),
            lon_post_interval: parse_int_or_zero(&field(20, 4), "UHL longitude interval", path),
            lat_post_interval: parse_int_or_zero(&field(24, 4), "UHL latitude interval", path),
            accuracy: parse_accuracy(&field(28, 4)),
            security_code: field(32, 3).trim().to_string(),
            unique_ref: field(35, 12).trim().to_string(),
            num_lon_lines: parse_int_or_zero(&field(47, 4), "UHL longitude line count", path),
            num_lat_points: parse_int_or_zero(&field(51, 4), "UHL latitude point count", path),
            multiple_accuracy: u8::from(block[55] == b'1'),
        })
    }
}

impl Dsi {
    /// Parse the DSI block at offset [`UHL_SIZE`].
    pub fn read<R: Read + Seek>(src: &mut R, path: &Path) -> Result<Self> {
        let mut block = [0u8; DSI_SIZE as usize];
        read_block(src, UHL_SIZE, &mut block, "DSI", path)?;
        let field = |start: usize, len: usize| ascii_field(&block, start, len);

        let sentinel_ok = field(0, 3) == "DSI";
        if !sentinel_ok {
            warn!("{}: missing DSI sentinel", path.display());
        }

        let series = field(59, 5).trim().to_string();
        let product_level = series
            .strip_prefix("DTED")
            .and_then(|level| level.parse::<u8>().ok())
            .filter(|level| *level <= 2);

        let dms = |start: usize, len: usize, name: &str| parse_dms_or_zero(&field(start, len), name, path);
        let int = |start: usize, len: usize, name: &str| parse_int_or_zero(&field(start, len), name, path);

        Ok(Self {
            sentinel_ok,
            security: field(3, 1).trim().to_string(),
            series,
            product_level,
            unique_ref: field(64, 15).trim().to_string(),
            edition: int(87, 2, "DSI edition"),
            vertical_datum: field(141, 3).trim().to_string(),
            horizontal_datum: field(144, 5).trim().to_string(),
            lat_origin: dms(185, 9, "DSI latitude origin"),
            lon_origin: dms(194, 10, "DSI longitude origin"),
            sw_lat: dms(204, 7, "DSI SW latitude"),
            sw_lon: dms(211, 8, "DSI SW longitude"),
            nw_lat: dms(219, 7, "DSI NW latitude"),
            nw_lon: dms(226, 8, "DSI NW longitude"),
            ne_lat: dms(234, 7, "DSI NE latitude"),
            ne_lon: dms(241, 8, "DSI NE longitude"),
            se_lat: dms(249, 7, "DSI SE latitude"),
            se_lon: dms(256, 8, "DSI SE longitude"),
            orientation: field(264, 9).trim().parse().unwrap_or(0.0),
            lat_post_interval: int(273, 4, "DSI latitude interval"),
            lon_post_interval: int(277, 4, "DSI longitude interval"),
            num_lat_lines: int(281, 4, "DSI latitude line count"),
            num_lon_lines: int(285, 4, "DSI longitude line count"),
            partial_cell: int(289, 2, "DSI partial cell indicator"),
        })
    }
}

fn read_block<R: Read + Seek>(
    src: &mut R,
    offset: u64,
    buf: &mut [u8],
    block: &'static str,
    path: &Path,
) -> Result<()> {
    let invalid = |e: std::io::Error| DtedError::InvalidHeader {
        block,
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    src.seek(SeekFrom::Start(offset)).map_err(invalid)?;
    src.read_exact(buf).map_err(invalid)
}

fn ascii_field(block: &[u8], start: usize, len: usize) -> String {
    String::from_utf8_lossy(&block[start..start + len]).into_owned()
}

fn parse_int_or_zero(field: &str, name: &str, path: &Path) -> u32 {
    match field.trim().parse::<u32>() {
        Ok(value) => value,
        Err(_) => {
            warn!("{}: malformed {} {:?}, using 0", path.display(), name, field);
            0
        }
    }
}

fn parse_accuracy(field: &str) -> u32 {
    // "NA" is the documented marker for an unknown accuracy.
    field.trim().parse().unwrap_or(0)
}

fn parse_dms_or_zero(field: &str, name: &str, path: &Path) -> f64 {
    match parse_dms(field) {
        Some(value) => value,
        None => {
            warn!("{}: malformed {} {:?}, using 0", path.display(), name, field);
            0.0
        }
    }
}

/// Convert a degrees-minutes-seconds-hemisphere string to signed decimal
/// degrees.
///
/// Accepts the fixed-width DTED forms `DDDMMSSH`, `DDMMSSH`, `DDMMSS.SH`
/// and `DDDMMSS.SH`. The last two integer digits are seconds, the two
/// before are minutes, and whatever precedes them is degrees.
pub fn parse_dms(field: &str) -> Option<f64> {
    let field = field.trim();
    let hemisphere = field.chars().last()?;
    let sign = match hemisphere.to_ascii_uppercase() {
        'N' | 'E' => 1.0,
        'S' | 'W' => -1.0,
        _ => return None,
    };
    let body = &field[..field.len() - 1];

    let (int_part, frac_part) = match body.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (body, None),
    };
    if int_part.len() < 5 || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let split = int_part.len() - 4;
    let degrees: f64 = int_part[..split].parse().ok()?;
    let minutes: f64 = int_part[split..split + 2].parse().ok()?;
    let mut seconds: f64 = int_part[split + 2..].parse().ok()?;
    if let Some(frac) = frac_part {
        if !frac.is_empty() {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            seconds += frac.parse::<f64>().ok()? / 10f64.powi(frac.len() as i32);
        }
    }
    if minutes >= 60.0 || seconds >= 60.0 {
        return None;
    }

    Some(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}

/// Format signed decimal degrees as a DMS-hemisphere string with
/// `degree_digits` digits of degrees and optional tenths of seconds.
pub fn format_dms(value: f64, degree_digits: usize, tenths: bool, positive: char, negative: char) -> String {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let total_tenths = (value.abs() * 36_000.0).round() as u64;
    let degrees = total_tenths / 36_000;
    let minutes = (total_tenths % 36_000) / 600;
    let tenth_seconds = total_tenths % 600;
    if tenths {
        format!(
            "{:0width$}{:02}{:02}.{}{}",
            degrees,
            minutes,
            tenth_seconds / 10,
            tenth_seconds % 10,
            hemisphere,
            width = degree_digits
        )
    } else {
        format!(
            "{:0width$}{:02}{:02}{}",
            degrees,
            minutes,
            tenth_seconds / 10,
            hemisphere,
            width = degree_digits
        )
    }
}
