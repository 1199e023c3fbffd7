//! Bounded frame cache with file lookup by coordinate.

use crate::frame::{DtedFrame, ElevationMatrix, IndexWindow, PostLayout, NO_DATA};
use crate::{DtedError, Result};
use dted_metrics::metric_defs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Capacity used when a non-positive size is requested.
pub const DEFAULT_CACHE_SIZE: usize = 20;

/// Legacy sentinel for "no frame covers this point".
pub const NO_COVERAGE: i16 = -500;

/// DTED levels searched by [`FrameCache::elevation`], finest first.
pub const LEVEL_SEARCH_ORDER: [u8; 3] = [2, 1, 0];

/// Outcome of a cache-level elevation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationLookup {
    /// A post was read.
    Found(i16),
    /// A frame covers the point but the post could not be read.
    NoData,
    /// No frame at any level covers the point.
    NoCoverage,
}

impl ElevationLookup {
    /// The elevation, if one was found.
    pub fn value(self) -> Option<i16> {
        match self {
            ElevationLookup::Found(elevation) => Some(elevation),
            _ => None,
        }
    }

    /// Collapse to the legacy sentinels: [`NO_DATA`] (-32767) for a frame
    /// without data, [`NO_COVERAGE`] (-500) for no frame.
    pub fn sentinel(self) -> i16 {
        match self {
            ElevationLookup::Found(elevation) => elevation,
            ElevationLookup::NoData => NO_DATA,
            ElevationLookup::NoCoverage => NO_COVERAGE,
        }
    }
}

/// Directory holding the frames of the one-degree column containing `lon`,
/// e.g. `w123`.
pub fn lon_dir_name(lon: f64) -> String {
    let degrees = lon.floor() as i32;
    let hemisphere = if degrees < 0 { 'w' } else { 'e' };
    format!("{}{:03}", hemisphere, degrees.unsigned_abs())
}

/// File name of the frame containing `lat` at `level`, e.g. `n47.dt1`.
pub fn lat_file_name(lat: f64, level: u8) -> String {
    let degrees = lat.floor() as i32;
    let hemisphere = if degrees < 0 { 's' } else { 'n' };
    format!("{}{:02}.dt{}", hemisphere, degrees.unsigned_abs(), level)
}

/// Path of the frame containing `(lat, lon)` relative to a search root.
pub fn frame_relative_path(lat: f64, lon: f64, level: u8) -> PathBuf {
    Path::new(&lon_dir_name(lon)).join(lat_file_name(lat, level))
}

#[derive(Debug)]
struct Slot {
    key: PathBuf,
    frame: DtedFrame,
}

/// Bounded cache of open frames keyed by file path.
///
/// Frames are kept in insertion order. Shrinking drops entries from the
/// tail; nothing is evicted by recency. The owner is expected to size the
/// cache for the frames a viewport needs before querying it. A miss on a
/// full cache is served from a single overflow slot that is replaced by the
/// next overflow load.
#[derive(Debug)]
pub struct FrameCache {
    dted_paths: Vec<PathBuf>,
    dted2_paths: Vec<PathBuf>,
    slots: Vec<Slot>,
    overflow: Option<Slot>,
    capacity: usize,
    subframe_shape: (usize, usize),
}

impl FrameCache {
    /// Create a cache searching `dted_paths` for levels 0 and 1 and
    /// `dted2_paths` for level 2.
    pub fn new(dted_paths: Vec<PathBuf>, dted2_paths: Vec<PathBuf>, capacity: usize) -> Self {
        Self {
            dted_paths,
            dted2_paths,
            slots: Vec::new(),
            overflow: None,
            capacity: effective_capacity(capacity),
            subframe_shape: (0, 0),
        }
    }

    /// Search roots for levels 0 and 1.
    pub fn dted_paths(&self) -> &[PathBuf] {
        &self.dted_paths
    }

    /// Search roots for level 2.
    pub fn dted2_paths(&self) -> &[PathBuf] {
        &self.dted2_paths
    }

    /// First existing frame file for a coordinate, searching the roots in
    /// order.
    pub fn find_file(&self, lat: f64, lon: f64, level: u8) -> Option<PathBuf> {
        let roots = if level >= 2 { &self.dted2_paths } else { &self.dted_paths };
        let relative = frame_relative_path(lat, lon, level);
        roots.iter().map(|root| root.join(&relative)).find(|path| path.is_file())
    }

    /// The frame covering `(lat, lon)` at `level`, loading it on a miss.
    ///
    /// `None` when no file exists, it cannot be opened, or its header is
    /// unusable.
    pub fn get(&mut self, lat: f64, lon: f64, level: u8) -> Option<&mut DtedFrame> {
        let path = self.find_file(lat, lon, level)?;
        let level_label = level.to_string();

        if let Some(pos) = self.slots.iter().position(|slot| slot.key == path) {
            metrics::counter!(metric_defs::FRAME_CACHE_HITS.name, "level" => level_label).increment(1);
            return Some(&mut self.slots[pos].frame);
        }
        if self.overflow.as_ref().is_some_and(|slot| slot.key == path) {
            metrics::counter!(metric_defs::FRAME_CACHE_HITS.name, "level" => level_label).increment(1);
            return self.overflow.as_mut().map(|slot| &mut slot.frame);
        }

        metrics::counter!(metric_defs::FRAME_CACHE_MISSES.name, "level" => level_label).increment(1);
        let mut frame = match DtedFrame::open(&path) {
            Ok(frame) if frame.is_valid() => frame,
            Ok(_) => {
                warn!("skipping unusable frame {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("failed to open frame {}: {}", path.display(), e);
                return None;
            }
        };
        let (cols, rows) = self.subframe_shape;
        frame.init_subframes(cols, rows);

        let slot = Slot { key: path, frame };
        if self.slots.len() < self.capacity {
            debug!("loaded {} into slot {}", slot.key.display(), self.slots.len());
            self.slots.push(slot);
            metrics::gauge!(metric_defs::FRAME_CACHE_FRAMES.name).set(self.slots.len() as f64);
            return self.slots.last_mut().map(|slot| &mut slot.frame);
        }

        metrics::counter!(metric_defs::FRAME_CACHE_OVERFLOW.name).increment(1);
        debug!(
            "cache full ({} frames), loaded {} into overflow slot",
            self.capacity,
            slot.key.display()
        );
        self.overflow = Some(slot);
        self.overflow.as_mut().map(|slot| &mut slot.frame)
    }

    /// Change the capacity and, when both `cols` and `rows` are positive,
    /// the subframe grid shape.
    ///
    /// With a new shape the resize is destructive: every retained frame
    /// gets a fresh, empty render cache of that shape. Otherwise it is
    /// passive and frames are kept as they are. Either way, frames beyond
    /// the new capacity are dropped from the tail.
    pub fn resize(&mut self, capacity: usize, cols: usize, rows: usize) {
        let capacity = effective_capacity(capacity);
        let dropped = self.slots.len().saturating_sub(capacity);
        self.slots.truncate(capacity);
        self.overflow = None;
        self.capacity = capacity;

        let kind = if cols > 0 && rows > 0 {
            self.subframe_shape = (cols, rows);
            for slot in &mut self.slots {
                slot.frame.init_subframes(cols, rows);
            }
            "destructive"
        } else {
            "passive"
        };

        metrics::counter!(metric_defs::FRAME_CACHE_RESIZES.name, "kind" => kind).increment(1);
        metrics::gauge!(metric_defs::FRAME_CACHE_FRAMES.name).set(self.slots.len() as f64);
        debug!(
            "{} resize to {} frames, subframes {:?}, dropped {}",
            kind, capacity, self.subframe_shape, dropped
        );
    }

    /// Keep only the frames whose south-west corner lies in the given cell
    /// ranges. Surviving frames keep their slot order and render caches.
    pub fn retain_cells(&mut self, lat_cells: RangeInclusive<i32>, lon_cells: RangeInclusive<i32>) {
        let in_view = |frame: &DtedFrame| {
            let bounds = frame.bounds();
            lat_cells.contains(&(bounds.min_lat.round() as i32)) && lon_cells.contains(&(bounds.min_lon.round() as i32))
        };
        let before = self.slots.len();
        self.slots.retain(|slot| in_view(&slot.frame));
        if self.overflow.as_ref().is_some_and(|slot| !in_view(&slot.frame)) {
            self.overflow = None;
        }

        let evicted = before - self.slots.len();
        if evicted > 0 {
            metrics::gauge!(metric_defs::FRAME_CACHE_FRAMES.name).set(self.slots.len() as f64);
            debug!(
                "evicted {} frames outside lat {:?} lon {:?}",
                evicted, lat_cells, lon_cells
            );
        }
    }

    /// Elevation at a point from the finest level that covers it.
    pub fn elevation(&mut self, lat: f64, lon: f64) -> ElevationLookup {
        let mut covered = false;
        for level in LEVEL_SEARCH_ORDER {
            if let Some(frame) = self.get(lat, lon, level) {
                covered = true;
                if let Some(elevation) = frame.elevation_at(lat, lon) {
                    trace!("({}, {}) level {}: {}", lat, lon, level, elevation);
                    return ElevationLookup::Found(elevation);
                }
            }
        }
        if covered {
            ElevationLookup::NoData
        } else {
            ElevationLookup::NoCoverage
        }
    }

    /// Posts inside a rectangle stitched across every frame it touches.
    ///
    /// Column 0 is the west edge and row 0 the south edge of the result.
    /// Cells without a frame are filled with [`NO_DATA`], sized from the
    /// spacing of a frame that did load. Rectangles crossing the
    /// antimeridian (`ullon > lrlon`) are rejected.
    pub fn elevations(&mut self, ullat: f64, ullon: f64, lrlat: f64, lrlon: f64, level: u8) -> Result<ElevationMatrix> {
        if ullon > lrlon {
            return Err(DtedError::DatelineUnsupported { ullon, lrlon });
        }
        let (south, north) = (ullat.min(lrlat), ullat.max(lrlat));
        let (west, east) = (ullon, lrlon);

        let lon_cells = cell_range(west, east);
        let lat_cells = cell_range(south, north);
        let clip = |cell_lat: i32, cell_lon: i32| {
            let cell_lat = cell_lat as f64;
            let cell_lon = cell_lon as f64;
            (
                north.min(cell_lat + 1.0),
                west.max(cell_lon),
                south.max(cell_lat),
                east.min(cell_lon + 1.0),
            )
        };

        // First pass: read every available cell and remember one layout.
        let mut reference: Option<PostLayout> = None;
        let mut cells: Vec<Vec<Option<(IndexWindow, ElevationMatrix)>>> = Vec::with_capacity(lon_cells.len());
        for &cell_lon in &lon_cells {
            let mut column = Vec::with_capacity(lat_cells.len());
            for &cell_lat in &lat_cells {
                let (ul_lat, ul_lon, lr_lat, lr_lon) = clip(cell_lat, cell_lon);
                let read = self
                    .get(cell_lat as f64 + 0.5, cell_lon as f64 + 0.5, level)
                    .and_then(|frame| {
                        let window = frame.indexes_from_lat_lons(ul_lat, ul_lon, lr_lat, lr_lon);
                        let layout = frame.layout();
                        frame.elevations(ul_lat, ul_lon, lr_lat, lr_lon).map(|m| (layout, window, m))
                    });
                column.push(read.map(|(layout, window, matrix)| {
                    reference.get_or_insert(layout);
                    (window, matrix)
                }));
            }
            cells.push(column);
        }

        let Some(reference) = reference else {
            return Err(DtedError::NoFrame {
                lat: north,
                lon: west,
                level,
            });
        };

        // Second pass: size missing cells from the reference layout.
        let window_of = |i: usize, j: usize, cells: &[Vec<Option<(IndexWindow, ElevationMatrix)>>]| {
            match &cells[i][j] {
                Some((window, _)) => *window,
                None => {
                    let (ul_lat, ul_lon, lr_lat, lr_lon) = clip(lat_cells[j], lon_cells[i]);
                    reference
                        .at(lat_cells[j] as f64, lon_cells[i] as f64)
                        .window(ul_lat, ul_lon, lr_lat, lr_lon)
                }
            }
        };
        let widths: Vec<usize> = (0..lon_cells.len())
            .map(|i| (0..lat_cells.len()).map(|j| window_of(i, j, &cells).width()).max().unwrap_or(0))
            .collect();
        let heights: Vec<usize> = (0..lat_cells.len())
            .map(|j| (0..lon_cells.len()).map(|i| window_of(i, j, &cells).height()).max().unwrap_or(0))
            .collect();

        let mut stitched = ElevationMatrix::no_data(widths.iter().sum(), heights.iter().sum());
        let mut column_offset = 0;
        for (i, column) in cells.iter().enumerate() {
            let mut row_offset = 0;
            for (j, cell) in column.iter().enumerate() {
                match cell {
                    Some((_, matrix)) => stitched.blit(matrix, column_offset, row_offset),
                    None => debug!(
                        "no level {} frame for cell ({}, {}), filled with no data",
                        level, lat_cells[j], lon_cells[i]
                    ),
                }
                row_offset += heights[j];
            }
            column_offset += widths[i];
        }
        Ok(stitched)
    }

    /// Drop every cached subframe image, keeping frames and shapes.
    pub fn clear_subframes(&mut self) {
        for slot in self.slots.iter_mut().chain(self.overflow.iter_mut()) {
            slot.frame.clear_subframes();
        }
    }

    /// Close the file descriptors of every cached frame.
    pub fn release_files(&mut self) {
        for slot in self.slots.iter_mut().chain(self.overflow.iter_mut()) {
            slot.frame.release_file();
        }
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.overflow = None;
        metrics::gauge!(metric_defs::FRAME_CACHE_FRAMES.name).set(0.0);
    }

    /// Number of frames held positionally (the overflow slot excluded).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no frames are held.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of positional frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subframe grid shape given to newly loaded frames.
    pub fn subframe_shape(&self) -> (usize, usize) {
        self.subframe_shape
    }

    /// Paths of the positional frames in slot order.
    pub fn keys(&self) -> impl Iterator<Item = &Path> {
        self.slots.iter().map(|slot| slot.key.as_path())
    }

    /// Render cache shapes of the positional frames in slot order.
    pub fn frame_subframe_shapes(&self) -> Vec<(usize, usize)> {
        self.slots.iter().map(|slot| slot.frame.subframe_shape()).collect()
    }
}

fn effective_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        DEFAULT_CACHE_SIZE
    } else {
        capacity
    }
}

/// Whole-degree cells touched by `[min, max]`.
fn cell_range(min: f64, max: f64) -> Vec<i32> {
    let first = min.floor() as i32;
    let last = (max.ceil() as i32 - 1).max(first);
    (first..=last).collect()
}
