//! Writer for synthetic DTED frame files.
//!
//! Produces a complete file (UHL, DSI, ACC, data records with checksums) for
//! a one-degree cell from an elevation function. The integration tests and
//! `dtedtool synth` use it in place of binary fixtures.

use crate::cache::frame_relative_path;
use crate::header::{format_dms, ACC_SIZE, DSI_SIZE, TENTHS_OF_ARCSEC_PER_DEGREE, UHL_SIZE};
use crate::reader::{checksum, encode_post, RECORD_SENTINEL};
use crate::Result;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Standard post counts per axis for levels 0, 1 and 2.
pub const LEVEL_POSTS: [u32; 3] = [121, 1201, 3601];

/// Smallest post count whose interval still fits the 4-digit header field.
pub const MIN_POSTS: u32 = 5;

/// Largest post count the 4-digit header count fields can hold.
pub const MAX_POSTS: u32 = 9999;

/// Builder for one frame file.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    lat: i32,
    lon: i32,
    level: u8,
    num_lat_points: u32,
    num_lon_lines: u32,
}

impl FrameWriter {
    /// A frame whose south-west corner is `(lat, lon)`, with the standard
    /// post spacing for `level`.
    pub fn new(lat: i32, lon: i32, level: u8) -> Self {
        let posts = LEVEL_POSTS[level.min(2) as usize];
        Self {
            lat,
            lon,
            level: level.min(2),
            num_lat_points: posts,
            num_lon_lines: posts,
        }
    }

    /// Override the post counts, clamped to [`MIN_POSTS`]..=[`MAX_POSTS`].
    pub fn with_posts(mut self, num_lat_points: u32, num_lon_lines: u32) -> Self {
        self.num_lat_points = num_lat_points.clamp(MIN_POSTS, MAX_POSTS);
        self.num_lon_lines = num_lon_lines.clamp(MIN_POSTS, MAX_POSTS);
        self
    }

    /// Latitude interval in tenths of arc-seconds.
    pub fn lat_interval(&self) -> u32 {
        (TENTHS_OF_ARCSEC_PER_DEGREE as u32) / (self.num_lat_points - 1)
    }

    /// Longitude interval in tenths of arc-seconds.
    pub fn lon_interval(&self) -> u32 {
        (TENTHS_OF_ARCSEC_PER_DEGREE as u32) / (self.num_lon_lines - 1)
    }

    /// Path of this frame under a search root, following the directory
    /// convention the frame cache searches.
    pub fn path_under(&self, root: &Path) -> PathBuf {
        root.join(frame_relative_path(self.lat as f64, self.lon as f64, self.level))
    }

    /// Serialize the frame. `elevation(column, row)` supplies each post,
    /// column 0 west and row 0 south.
    pub fn write_to<W: Write, F: FnMut(u32, u32) -> i16>(&self, out: &mut W, mut elevation: F) -> Result<()> {
        out.write_all(&self.uhl())?;
        out.write_all(&self.dsi())?;
        out.write_all(&acc())?;

        let record_len = 8 + 2 * self.num_lat_points as usize + 4;
        let mut record = Vec::with_capacity(record_len);
        for column in 0..self.num_lon_lines {
            record.clear();
            record.push(RECORD_SENTINEL);
            record.extend_from_slice(&column.to_be_bytes()[1..]);
            record.extend_from_slice(&(column as u16).to_be_bytes());
            record.extend_from_slice(&0u16.to_be_bytes());
            for row in 0..self.num_lat_points {
                record.extend_from_slice(&encode_post(elevation(column, row)));
            }
            let sum = checksum(&record);
            record.extend_from_slice(&sum.to_be_bytes());
            out.write_all(&record)?;
        }
        Ok(())
    }

    /// Write the frame to `path`, creating parent directories.
    pub fn write_file<P: AsRef<Path>, F: FnMut(u32, u32) -> i16>(&self, path: P, elevation: F) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(fs::File::create(path)?);
        self.write_to(&mut out, elevation)?;
        out.flush()?;
        Ok(())
    }

    fn uhl(&self) -> Vec<u8> {
        let mut block = blank(UHL_SIZE, b"UHL");
        put(&mut block, 3, "1");
        put(&mut block, 4, &format_dms(self.lon as f64, 3, false, 'E', 'W'));
        put(&mut block, 12, &format_dms(self.lat as f64, 3, false, 'N', 'S'));
        put(&mut block, 20, &format!("{:04}", self.lon_interval()));
        put(&mut block, 24, &format!("{:04}", self.lat_interval()));
        put(&mut block, 28, "NA  ");
        put(&mut block, 32, "U  ");
        put(&mut block, 35, "SYNTHETIC   ");
        put(&mut block, 47, &format!("{:04}", self.num_lon_lines));
        put(&mut block, 51, &format!("{:04}", self.num_lat_points));
        put(&mut block, 55, "0");
        block
    }

    fn dsi(&self) -> Vec<u8> {
        let (lat, lon) = (self.lat as f64, self.lon as f64);
        let lat7 = |v: f64| format_dms(v, 2, false, 'N', 'S');
        let lon8 = |v: f64| format_dms(v, 3, false, 'E', 'W');

        let mut block = blank(DSI_SIZE, b"DSI");
        put(&mut block, 3, "U");
        put(&mut block, 59, &format!("DTED{}", self.level));
        put(&mut block, 64, "SYNTHETIC");
        put(&mut block, 87, "01");
        put(&mut block, 141, "E96");
        put(&mut block, 144, "WGS84");
        put(&mut block, 185, &format_dms(lat, 2, true, 'N', 'S'));
        put(&mut block, 194, &format_dms(lon, 3, true, 'E', 'W'));
        put(&mut block, 204, &lat7(lat));
        put(&mut block, 211, &lon8(lon));
        put(&mut block, 219, &lat7(lat + 1.0));
        put(&mut block, 226, &lon8(lon));
        put(&mut block, 234, &lat7(lat + 1.0));
        put(&mut block, 241, &lon8(lon + 1.0));
        put(&mut block, 249, &lat7(lat));
        put(&mut block, 256, &lon8(lon + 1.0));
        put(&mut block, 264, "0000000.0");
        put(&mut block, 273, &format!("{:04}", self.lat_interval()));
        put(&mut block, 277, &format!("{:04}", self.lon_interval()));
        put(&mut block, 281, &format!("{:04}", self.num_lat_points));
        put(&mut block, 285, &format!("{:04}", self.num_lon_lines));
        put(&mut block, 289, "00");
        block
    }
}

fn acc() -> Vec<u8> {
    let mut block = blank(ACC_SIZE, b"ACC");
    put(&mut block, 3, "NA  NA  ");
    block
}

fn blank(size: u64, sentinel: &[u8; 3]) -> Vec<u8> {
    let mut block = vec![b' '; size as usize];
    block[..3].copy_from_slice(sentinel);
    block
}

fn put(block: &mut [u8], offset: usize, text: &str) {
    block[offset..offset + text.len()].copy_from_slice(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FrameHeader, DATA_OFFSET};
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn test_written_header_parses() {
        let writer = FrameWriter::new(-1, -123, 1).with_posts(11, 21);
        let mut bytes = Vec::new();
        writer.write_to(&mut bytes, |_, _| 0).unwrap();

        let expected = DATA_OFFSET as usize + 21 * (12 + 2 * 11);
        assert_eq!(bytes.len(), expected);

        let header = FrameHeader::read(&mut Cursor::new(&bytes), Path::new("mem")).unwrap();
        assert!(header.uhl.sentinel_ok && header.dsi.sentinel_ok);
        assert_eq!(header.uhl.num_lat_points, 11);
        assert_eq!(header.uhl.num_lon_lines, 21);
        assert_eq!(header.uhl.lat_post_interval, 3600);
        assert_eq!(header.uhl.lon_post_interval, 1800);
        assert_eq!(header.dsi.product_level, Some(1));
        assert_relative_eq!(header.uhl.lat_origin, -1.0);
        assert_relative_eq!(header.uhl.lon_origin, -123.0);

        let bounds = header.bounds();
        assert_relative_eq!(bounds.min_lat, -1.0);
        assert_relative_eq!(bounds.max_lat, 0.0);
        assert_relative_eq!(bounds.min_lon, -123.0);
        assert_relative_eq!(bounds.max_lon, -122.0);
    }

    #[test]
    fn test_post_count_floor() {
        let writer = FrameWriter::new(0, 0, 0).with_posts(2, 3);
        assert_eq!(writer.lat_interval(), 9000);
        assert_eq!(writer.lon_interval(), 9000);
    }

    #[test]
    fn test_post_count_ceiling_keeps_header_fields() {
        let writer = FrameWriter::new(10, 20, 2).with_posts(20_000, 40_000);
        assert_eq!(writer.lat_interval(), 3);
        assert_eq!(writer.lon_interval(), 3);

        let mut bytes = writer.uhl();
        bytes.extend(writer.dsi());
        bytes.extend(acc());
        let header = FrameHeader::read(&mut Cursor::new(&bytes), Path::new("mem")).unwrap();
        assert_eq!(header.uhl.num_lon_lines, MAX_POSTS);
        assert_eq!(header.uhl.num_lat_points, MAX_POSTS);
        assert_eq!(header.uhl.lon_post_interval, 3);
        assert_eq!(header.uhl.lat_post_interval, 3);
        assert_eq!(header.uhl.multiple_accuracy, 0);
        assert_eq!(header.dsi.num_lon_lines, MAX_POSTS);
        assert_eq!(header.dsi.num_lat_lines, MAX_POSTS);
    }
}
