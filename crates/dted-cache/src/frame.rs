//! Single DTED frame representation.

use crate::colortable::ColorTable;
use crate::grid::ElevationGrid;
use crate::header::{FrameBounds, FrameHeader};
use crate::reader::MaybeOpenFile;
use crate::shading::{self, post_index};
use crate::subframe::{ShadingMode, SubframeGrid, SubframeImage, SubframeInfo};
use crate::Result;
use dted_metrics::metric_defs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Elevation reported for posts that could not be read.
pub const NO_DATA: i16 = -32767;

/// A single DTED frame: one file covering one geographic cell.
///
/// The header is parsed when the frame is opened. Posts are read a
/// longitude column at a time on first access, and rendered subframes are
/// cached per cell of the frame's [`SubframeGrid`].
#[derive(Debug)]
pub struct DtedFrame {
    path: PathBuf,
    header: FrameHeader,
    bounds: FrameBounds,
    valid: bool,
    grid: ElevationGrid,
    subframes: SubframeGrid,
}

/// Inclusive post index window within one frame.
///
/// `x` indexes longitude columns (west to east), `y` latitude rows
/// (south to north).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWindow {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl IndexWindow {
    /// Number of columns in the window.
    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    /// Number of rows in the window.
    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }
}

/// Raw posts `[column][row]`, column 0 west and row 0 south.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElevationMatrix {
    pub columns: Vec<Vec<i16>>,
}

impl ElevationMatrix {
    /// A matrix filled with [`NO_DATA`].
    pub fn no_data(width: usize, height: usize) -> Self {
        Self {
            columns: vec![vec![NO_DATA; height]; width],
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows (length of the first column).
    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Post at `(column, row)`.
    pub fn get(&self, column: usize, row: usize) -> Option<i16> {
        self.columns.get(column).and_then(|c| c.get(row)).copied()
    }

    /// Copy `other` into this matrix with its south-west post at
    /// `(column, row)`. Parts falling outside are dropped.
    pub fn blit(&mut self, other: &ElevationMatrix, column: usize, row: usize) {
        for (dx, source) in other.columns.iter().enumerate() {
            let Some(target) = self.columns.get_mut(column + dx) else {
                break;
            };
            for (dy, value) in source.iter().enumerate() {
                if let Some(slot) = target.get_mut(row + dy) {
                    *slot = *value;
                }
            }
        }
    }
}

impl DtedFrame {
    /// Open a frame file and parse its header. Posts are read lazily.
    ///
    /// Fails only on I/O errors. A header with unusable counts or intervals
    /// yields a frame whose [`is_valid`](Self::is_valid) is false; every
    /// query against it returns nothing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = MaybeOpenFile::open(path)?;
        let header = FrameHeader::read(file.handle()?, path)?;
        let valid = header.is_usable();
        if !valid {
            warn!("{}: header has no usable post grid", path.display());
        }
        let bounds = header.bounds();
        debug!(
            "opened {} level {} ({}x{} posts, lat {:.4}..{:.4}, lon {:.4}..{:.4})",
            path.display(),
            header.level(),
            header.uhl.num_lon_lines,
            header.uhl.num_lat_points,
            bounds.min_lat,
            bounds.max_lat,
            bounds.min_lon,
            bounds.max_lon
        );

        Ok(Self {
            path: path.to_path_buf(),
            grid: ElevationGrid::new(header.clone(), file),
            header,
            bounds,
            valid,
            subframes: SubframeGrid::default(),
        })
    }

    /// Open a frame and read every column, then release the file handle.
    pub fn open_whole<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut frame = Self::open(path)?;
        if frame.valid {
            let loaded = frame.grid.load_all();
            debug!("{}: read {} columns", frame.path.display(), loaded);
        }
        frame.release_file();
        Ok(frame)
    }

    /// Path the frame was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed header blocks.
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Geographic bounds.
    pub fn bounds(&self) -> FrameBounds {
        self.bounds
    }

    /// Whether the header describes a usable post grid.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// DTED level of the frame.
    pub fn level(&self) -> u8 {
        self.header.level()
    }

    /// Number of columns currently in memory.
    pub fn columns_loaded(&self) -> usize {
        self.grid.columns_loaded()
    }

    /// Read every column not yet in memory.
    pub fn load_all(&mut self) -> usize {
        if !self.valid {
            return 0;
        }
        self.grid.load_all()
    }

    /// Close the file descriptor. Loaded posts and cached subframes stay;
    /// the next column read reopens the file.
    pub fn release_file(&mut self) {
        self.grid.release_file();
    }

    /// Whether the frame currently holds an open descriptor.
    pub fn file_is_open(&self) -> bool {
        self.grid.file_is_open()
    }

    /// Post nearest to a coordinate.
    ///
    /// `None` outside the frame, for an invalid frame, or when the column
    /// could not be read.
    pub fn elevation_at(&mut self, lat: f64, lon: f64) -> Option<i16> {
        if !self.valid || !self.bounds.contains(lat, lon) {
            return None;
        }
        let (column, row) = self.fractional_index(lat, lon);
        self.grid.post(column.round() as i64, row.round() as i64)
    }

    /// Bilinear interpolation between the four posts around a coordinate.
    pub fn interp_elevation_at(&mut self, lat: f64, lon: f64) -> Option<i16> {
        if !self.valid || !self.bounds.contains(lat, lon) {
            return None;
        }
        let (column, row) = self.fractional_index(lat, lon);
        let (c0, r0) = (column.floor(), row.floor());
        let (fx, fy) = (column - c0, row - r0);
        let (c0, r0) = (c0 as i64, r0 as i64);

        let sw = self.grid.post(c0, r0)? as f64;
        let se = self.grid.post(c0 + 1, r0)? as f64;
        let nw = self.grid.post(c0, r0 + 1)? as f64;
        let ne = self.grid.post(c0 + 1, r0 + 1)? as f64;

        let south = sw + fx * (se - sw);
        let north = nw + fx * (ne - nw);
        Some((south + fy * (north - south)).round() as i16)
    }

    /// Post spacing and origin of the frame.
    pub fn layout(&self) -> PostLayout {
        PostLayout {
            min_lat: self.bounds.min_lat,
            min_lon: self.bounds.min_lon,
            lat_interval: self.header.uhl.lat_post_interval,
            lon_interval: self.header.uhl.lon_post_interval,
            num_lat_points: self.header.uhl.num_lat_points,
            num_lon_lines: self.header.uhl.num_lon_lines,
        }
    }

    /// Post index window covering a rectangle. See [`PostLayout::window`].
    pub fn indexes_from_lat_lons(&self, ullat: f64, ullon: f64, lrlat: f64, lrlon: f64) -> IndexWindow {
        self.layout().window(ullat, ullon, lrlat, lrlon)
    }

    /// Raw posts inside a rectangle, per [`indexes_from_lat_lons`](Self::indexes_from_lat_lons).
    ///
    /// Columns that cannot be read are filled with [`NO_DATA`]. `None` for
    /// an invalid frame.
    pub fn elevations(&mut self, ullat: f64, ullon: f64, lrlat: f64, lrlon: f64) -> Option<ElevationMatrix> {
        if !self.valid {
            return None;
        }
        let window = self.indexes_from_lat_lons(ullat, ullon, lrlat, lrlon);
        let mut matrix = ElevationMatrix::no_data(window.width(), window.height());
        for (x, target) in (window.x0..=window.x1).zip(matrix.columns.iter_mut()) {
            if let Some(posts) = self.grid.column(x as i64) {
                target.copy_from_slice(&posts[window.y0..=window.y1]);
            }
        }
        Some(matrix)
    }

    /// Size the subframe render cache, discarding anything cached.
    pub fn init_subframes(&mut self, cols: usize, rows: usize) {
        self.subframes = SubframeGrid::new(cols, rows);
    }

    /// `(cols, rows)` of the render cache.
    pub fn subframe_shape(&self) -> (usize, usize) {
        self.subframes.shape()
    }

    /// Drop cached subframe images, keeping the cache shape.
    pub fn clear_subframes(&mut self) {
        self.subframes.clear();
    }

    /// A previously rendered subframe, if one exists for an equal `info`.
    pub fn cached_subframe(&self, info: &SubframeInfo) -> Option<Arc<SubframeImage>> {
        self.subframes.lookup(info)
    }

    /// Render (or fetch from the render cache) one subframe.
    ///
    /// `None` for an invalid frame, [`ShadingMode::None`] and empty windows.
    pub fn subframe_image(&mut self, info: &SubframeInfo, table: &ColorTable) -> Option<Arc<SubframeImage>> {
        if !self.valid || info.mode == ShadingMode::None {
            return None;
        }
        if let Some(image) = self.subframes.lookup(info) {
            metrics::counter!(metric_defs::SUBFRAME_CACHE_HITS.name).increment(1);
            trace!("{}: subframe ({}, {}) cached", self.path.display(), info.subx, info.suby);
            return Some(image);
        }

        let start = Instant::now();
        let image = Arc::new(shading::shade(info, table, &self.header, &self.bounds, &mut self.grid)?);
        let elapsed = start.elapsed();

        let mode = info.mode.as_str();
        metrics::counter!(metric_defs::SUBFRAME_RENDERS.name, "mode" => mode).increment(1);
        metrics::histogram!(metric_defs::SUBFRAME_RENDER_TIME.name, "mode" => mode)
            .record(elapsed.as_micros() as f64);
        trace!(
            "{}: rendered subframe ({}, {}) {}x{} {} in {:?}",
            self.path.display(),
            info.subx,
            info.suby,
            info.width,
            info.height,
            mode,
            elapsed
        );

        if !self.subframes.store(info, Arc::clone(&image)) {
            debug!(
                "{}: subframe ({}, {}) outside {:?} render cache",
                self.path.display(),
                info.subx,
                info.suby,
                self.subframes.shape()
            );
        }
        Some(image)
    }

    fn fractional_index(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            post_index(lon, self.bounds.min_lon, self.header.uhl.lon_post_interval),
            post_index(lat, self.bounds.min_lat, self.header.uhl.lat_post_interval),
        )
    }
}

/// Origin, spacing and post counts of a frame's grid.
///
/// Kept separate from [`DtedFrame`] so index windows can be computed for a
/// cell whose file is missing, using the spacing of a neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostLayout {
    pub min_lat: f64,
    pub min_lon: f64,
    /// Tenths of arc-seconds.
    pub lat_interval: u32,
    /// Tenths of arc-seconds.
    pub lon_interval: u32,
    pub num_lat_points: u32,
    pub num_lon_lines: u32,
}

impl PostLayout {
    /// The same spacing anchored at another south-west corner.
    pub fn at(&self, min_lat: f64, min_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            ..*self
        }
    }

    /// Post index window covering a rectangle.
    ///
    /// Corners may be given in either order. Both axes are clamped to
    /// `[0, count - 2]`, so adjacent frames stitch without repeating their
    /// shared edge posts.
    pub fn window(&self, ullat: f64, ullon: f64, lrlat: f64, lrlon: f64) -> IndexWindow {
        let lon_interval = self.lon_interval.max(1);
        let lat_interval = self.lat_interval.max(1);
        let column = |lon: f64| post_index(lon, self.min_lon, lon_interval).round() as i64;
        let row = |lat: f64| post_index(lat, self.min_lat, lat_interval).round() as i64;

        let (mut x0, mut x1) = (column(ullon), column(lrlon));
        let (mut y0, mut y1) = (row(lrlat), row(ullat));
        if x0 > x1 {
            std::mem::swap(&mut x0, &mut x1);
        }
        if y0 > y1 {
            std::mem::swap(&mut y0, &mut y1);
        }

        let max_x = (self.num_lon_lines as i64 - 2).max(0);
        let max_y = (self.num_lat_points as i64 - 2).max(0);
        IndexWindow {
            x0: x0.clamp(0, max_x) as usize,
            y0: y0.clamp(0, max_y) as usize,
            x1: x1.clamp(0, max_x) as usize,
            y1: y1.clamp(0, max_y) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FrameWriter;
    use std::io::Write;

    /// 11x11 posts over (47, -123); elevation = 10 * column + row.
    fn ramp_frame(dir: &Path) -> PathBuf {
        let path = dir.join("ramp.dt1");
        FrameWriter::new(47, -123, 1)
            .with_posts(11, 11)
            .write_file(&path, |c, r| (10 * c + r) as i16)
            .unwrap();
        path
    }

    #[test]
    fn test_nearest_and_interpolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = DtedFrame::open(ramp_frame(dir.path())).unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.level(), 1);

        assert_eq!(frame.elevation_at(47.0, -123.0), Some(0));
        assert_eq!(frame.elevation_at(47.3, -122.8), Some(23));
        assert_eq!(frame.elevation_at(48.0, -122.0), Some(110));
        // halfway between columns 2 and 3 on row 3
        assert_eq!(frame.interp_elevation_at(47.3, -122.75), Some(28));
        assert_eq!(frame.elevation_at(46.9, -122.5), None);
        assert_eq!(frame.interp_elevation_at(47.5, -121.9), None);
    }

    #[test]
    fn test_window_is_order_independent_and_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let frame = DtedFrame::open(ramp_frame(dir.path())).unwrap();

        let a = frame.indexes_from_lat_lons(47.8, -122.9, 47.2, -122.1);
        let b = frame.indexes_from_lat_lons(47.2, -122.1, 47.8, -122.9);
        assert_eq!(a, b);
        assert_eq!(a, IndexWindow { x0: 1, y0: 2, x1: 9, y1: 8 });

        let whole = frame.indexes_from_lat_lons(50.0, -124.0, 40.0, -120.0);
        assert_eq!(whole, IndexWindow { x0: 0, y0: 0, x1: 9, y1: 9 });
    }

    #[test]
    fn test_elevations_extracts_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = DtedFrame::open(ramp_frame(dir.path())).unwrap();
        let matrix = frame.elevations(47.3, -122.8, 47.1, -122.6).unwrap();
        assert_eq!((matrix.width(), matrix.height()), (3, 3));
        assert_eq!(matrix.get(0, 0), Some(21));
        assert_eq!(matrix.get(2, 2), Some(43));
        assert_eq!(frame.columns_loaded(), 3);
    }

    #[test]
    fn test_release_keeps_loaded_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = DtedFrame::open(ramp_frame(dir.path())).unwrap();
        assert_eq!(frame.elevation_at(47.5, -122.5), Some(55));
        frame.release_file();
        assert!(!frame.file_is_open());

        // already loaded: no reopen needed
        assert_eq!(frame.elevation_at(47.4, -122.5), Some(54));
        assert!(!frame.file_is_open());

        // new column: reopened transparently
        assert_eq!(frame.elevation_at(47.0, -122.0), Some(100));
        assert!(frame.file_is_open());
    }

    #[test]
    fn test_open_whole_loads_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let frame = DtedFrame::open_whole(ramp_frame(dir.path())).unwrap();
        assert_eq!(frame.columns_loaded(), 11);
        assert!(!frame.file_is_open());
    }

    #[test]
    fn test_unusable_header_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.dt1");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[b' '; 728]).unwrap();
        drop(file);

        let mut frame = DtedFrame::open(&path).unwrap();
        assert!(!frame.is_valid());
        assert_eq!(frame.elevation_at(0.0, 0.0), None);
        assert!(frame.elevations(1.0, 0.0, 0.0, 1.0).is_none());
        let info = SubframeInfo {
            width: 4,
            height: 4,
            ..SubframeInfo::default()
        };
        assert!(frame.subframe_image(&info, &ColorTable::default()).is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DtedFrame::open(dir.path().join("nope.dt1")).is_err());
    }

    #[test]
    fn test_subframe_render_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = DtedFrame::open(ramp_frame(dir.path())).unwrap();
        frame.init_subframes(2, 2);
        let table = ColorTable::default();
        let info = SubframeInfo {
            mode: ShadingMode::MetersBand,
            lon_per_pixel: 0.05,
            lat_per_pixel: 0.05,
            ..SubframeInfo::default()
        }
        .positioned(1, 0, 48.0, -122.5, 10, 10);

        let first = frame.subframe_image(&info, &table).unwrap();
        let second = frame.subframe_image(&info, &table).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let rebanded = SubframeInfo { band_height: 5, ..info };
        let third = frame.subframe_image(&rebanded, &table).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        frame.clear_subframes();
        assert!(frame.cached_subframe(&rebanded).is_none());
        assert_eq!(frame.subframe_shape(), (2, 2));
    }

    #[test]
    fn test_blit() {
        let mut target = ElevationMatrix::no_data(3, 2);
        let source = ElevationMatrix {
            columns: vec![vec![1, 2], vec![3, 4]],
        };
        target.blit(&source, 2, 1);
        assert_eq!(target.get(2, 1), Some(1));
        assert_eq!(target.get(1, 1), Some(NO_DATA));
        assert_eq!(target.get(2, 0), Some(NO_DATA));
    }
}
