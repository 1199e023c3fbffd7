//! Viewport tiler producing subframe images from a frame cache.
//!
//! A [`CacheHandler`] walks the whole-degree cells covering a viewport and,
//! inside each cell, a grid of subframes of at most [`SUBFRAME_SIZE`]
//! pixels. Images come out in a fixed raster order: cells west to east,
//! then south to north within a column of cells, then subframe columns west
//! to east, then subframe rows north to south.

use crate::cache::FrameCache;
use crate::colortable::ColorTable;
use crate::subframe::{SubframeImage, SubframeInfo};
use std::sync::Arc;
use tracing::{debug, trace};

/// Maximum subframe edge in pixels.
pub const SUBFRAME_SIZE: usize = 200;

/// Pixels-per-degree changes smaller than this are not a scale change.
pub const SCALE_TOLERANCE: f64 = 1e-6;

/// Geographic extent and scale of a map view.
pub trait Projection {
    /// `(lat, lon)` of the upper-left corner.
    fn upper_left(&self) -> (f64, f64);
    /// `(lat, lon)` of the lower-right corner.
    fn lower_right(&self) -> (f64, f64);
    /// Pixels per degree as `(longitude, latitude)`.
    fn pixels_per_degree(&self) -> (f64, f64);
}

/// Equal-arc (plate carrée) viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualArcViewport {
    pub ul_lat: f64,
    pub ul_lon: f64,
    pub lr_lat: f64,
    pub lr_lon: f64,
    /// Pixels per degree of longitude.
    pub ppd_x: f64,
    /// Pixels per degree of latitude.
    pub ppd_y: f64,
}

impl EqualArcViewport {
    pub fn new(ul_lat: f64, ul_lon: f64, lr_lat: f64, lr_lon: f64, ppd_x: f64, ppd_y: f64) -> Self {
        Self {
            ul_lat,
            ul_lon,
            lr_lat,
            lr_lon,
            ppd_x,
            ppd_y,
        }
    }

    /// Viewport whose corners map onto a `width × height` pixel canvas.
    /// A zero-size span gives a zero scale on that axis.
    pub fn with_size(ul_lat: f64, ul_lon: f64, lr_lat: f64, lr_lon: f64, width: u32, height: u32) -> Self {
        let span_x = (lr_lon - ul_lon).abs();
        let span_y = (ul_lat - lr_lat).abs();
        let ppd = |pixels: u32, span: f64| if span > 0.0 { pixels as f64 / span } else { 0.0 };
        Self::new(ul_lat, ul_lon, lr_lat, lr_lon, ppd(width, span_x), ppd(height, span_y))
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        ((self.lr_lon - self.ul_lon).abs() * self.ppd_x).round() as u32
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        ((self.ul_lat - self.lr_lat).abs() * self.ppd_y).round() as u32
    }

    /// Canvas position `(x, y)` of a coordinate, origin at the upper-left.
    pub fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        ((lon - self.ul_lon) * self.ppd_x, (self.ul_lat - lat) * self.ppd_y)
    }
}

impl Projection for EqualArcViewport {
    fn upper_left(&self) -> (f64, f64) {
        (self.ul_lat, self.ul_lon)
    }

    fn lower_right(&self) -> (f64, f64) {
        (self.lr_lat, self.lr_lon)
    }

    fn pixels_per_degree(&self) -> (f64, f64) {
        (self.ppd_x, self.ppd_y)
    }
}

/// Iteration state of a [`CacheHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// No projection set yet.
    Idle,
    /// Projection set, no image requested yet.
    ProjectionSet,
    /// At least one image requested and more may follow.
    Iterating,
    /// Every subframe of the viewport has been visited.
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default)]
struct View {
    north: f64,
    south: f64,
    west: f64,
    east: f64,
    west_cell: i32,
    east_cell: i32,
    south_cell: i32,
    north_cell: i32,
    /// Cell size in pixels.
    cell_width: usize,
    cell_height: usize,
    cols: usize,
    rows: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    lon: i32,
    lat: i32,
    subx: usize,
    suby: usize,
}

/// Walks a viewport and renders its subframes through a [`FrameCache`].
#[derive(Debug)]
pub struct CacheHandler {
    cache: FrameCache,
    table: ColorTable,
    shading: SubframeInfo,
    state: HandlerState,
    view: View,
    scale: Option<(f64, f64)>,
    cursor: Cursor,
}

impl CacheHandler {
    /// A handler over its own frame cache.
    pub fn new(cache: FrameCache, shading: SubframeInfo, table: ColorTable) -> Self {
        Self {
            cache,
            table,
            shading,
            state: HandlerState::Idle,
            view: View::default(),
            scale: None,
            cursor: Cursor::default(),
        }
    }

    /// Current iteration state.
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Subframe grid `(cols, rows)` per cell for the current projection.
    pub fn subframe_grid(&self) -> (usize, usize) {
        (self.view.cols, self.view.rows)
    }

    /// The underlying frame cache.
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// Mutable access to the underlying frame cache.
    pub fn cache_mut(&mut self) -> &mut FrameCache {
        &mut self.cache
    }

    /// Shading parameters applied to every subframe.
    pub fn shading(&self) -> &SubframeInfo {
        &self.shading
    }

    /// Replace the shading parameters. Cached renders are dropped.
    pub fn set_shading(&mut self, shading: SubframeInfo) {
        self.shading = shading;
        self.cache.clear_subframes();
    }

    /// Replace the colour table. Cached renders are dropped.
    pub fn set_color_table(&mut self, table: ColorTable) {
        self.table = table;
        self.cache.clear_subframes();
    }

    /// Set the viewport and rewind iteration to its first subframe.
    ///
    /// Frames outside the viewport's cells are evicted and the frame cache
    /// is resized for the number of cells the viewport covers. When the
    /// scale or the subframe grid shape changed, the resize also resets
    /// every frame's render cache.
    pub fn set_projection(&mut self, projection: &dyn Projection) {
        let (ul_lat, ul_lon) = projection.upper_left();
        let (lr_lat, lr_lon) = projection.lower_right();
        let (ppd_x, ppd_y) = projection.pixels_per_degree();

        let (north, south) = (ul_lat.max(lr_lat), ul_lat.min(lr_lat));
        let (west, east) = (ul_lon.min(lr_lon), ul_lon.max(lr_lon));
        let west_cell = west.floor() as i32;
        let south_cell = south.floor() as i32;
        let east_cell = (east.ceil() as i32 - 1).max(west_cell);
        let north_cell = (north.ceil() as i32 - 1).max(south_cell);

        let pixels = |ppd: f64| if ppd.is_finite() && ppd > 0.0 { ppd.round() as usize } else { 0 };
        let (cell_width, cell_height) = (pixels(ppd_x), pixels(ppd_y));
        let (cols, rows) = if cell_width == 0 || cell_height == 0 {
            (0, 0)
        } else {
            (cell_width.div_ceil(SUBFRAME_SIZE), cell_height.div_ceil(SUBFRAME_SIZE))
        };

        self.view = View {
            north,
            south,
            west,
            east,
            west_cell,
            east_cell,
            south_cell,
            north_cell,
            cell_width,
            cell_height,
            cols,
            rows,
        };

        self.cache.retain_cells(south_cell..=north_cell, west_cell..=east_cell);
        let cells = ((east_cell - west_cell + 1) * (north_cell - south_cell + 1)) as usize;
        let scale_changed = self
            .scale
            .map_or(true, |(x, y)| (x - ppd_x).abs() > SCALE_TOLERANCE || (y - ppd_y).abs() > SCALE_TOLERANCE);
        let shape_changed = self.cache.subframe_shape() != (cols, rows);
        if scale_changed || shape_changed {
            self.cache.resize(cells, cols, rows);
        } else if self.cache.capacity() != cells {
            self.cache.resize(cells, 0, 0);
        }
        self.scale = Some((ppd_x, ppd_y));

        self.cursor = Cursor {
            lon: west_cell,
            lat: south_cell,
            subx: 0,
            suby: 0,
        };
        self.state = HandlerState::ProjectionSet;
        debug!(
            "projection lat {:.4}..{:.4} lon {:.4}..{:.4}, {} cells, {}x{} subframes of {}x{} px cells",
            south, north, west, east, cells, cols, rows, cell_width, cell_height
        );
    }

    /// The next subframe image, or `None` once the viewport is exhausted
    /// (or before any projection is set).
    pub fn next_image(&mut self) -> Option<Arc<SubframeImage>> {
        match self.state {
            HandlerState::Idle | HandlerState::Exhausted => return None,
            HandlerState::ProjectionSet | HandlerState::Iterating => {}
        }
        self.state = HandlerState::Iterating;

        let view = self.view;
        if view.cols == 0 || view.rows == 0 {
            self.state = HandlerState::Exhausted;
            return None;
        }

        while self.cursor.lon <= view.east_cell {
            let cursor = self.cursor;
            self.advance();

            let cell_lat = cursor.lat as f64;
            let cell_lon = cursor.lon as f64;
            let Some(frame) = self.cache.get(cell_lat + 0.5, cell_lon + 0.5, self.shading.level) else {
                trace!("no level {} frame for cell ({}, {})", self.shading.level, cursor.lat, cursor.lon);
                self.skip_cell(cursor);
                continue;
            };

            let x0 = cursor.subx * SUBFRAME_SIZE;
            let y0 = cursor.suby * SUBFRAME_SIZE;
            let width = subframe_extent(cursor.subx, view.cols, view.cell_width);
            let height = subframe_extent(cursor.suby, view.rows, view.cell_height);
            let lon_per_pixel = 1.0 / view.cell_width as f64;
            let lat_per_pixel = 1.0 / view.cell_height as f64;

            let west = cell_lon + x0 as f64 * lon_per_pixel;
            let north = cell_lat + 1.0 - y0 as f64 * lat_per_pixel;
            let east = west + width as f64 * lon_per_pixel;
            let south = north - height as f64 * lat_per_pixel;
            if west >= view.east || east <= view.west || south >= view.north || north <= view.south {
                continue;
            }

            let info = SubframeInfo {
                lon_per_pixel,
                lat_per_pixel,
                ..self.shading
            }
            .positioned(cursor.subx, cursor.suby, north, west, width as u32, height as u32);
            if let Some(image) = frame.subframe_image(&info, &self.table) {
                return Some(image);
            }
        }

        debug!("viewport exhausted");
        self.state = HandlerState::Exhausted;
        None
    }

    /// Drain the remaining images.
    pub fn images(&mut self) -> Vec<Arc<SubframeImage>> {
        std::iter::from_fn(|| self.next_image()).collect()
    }

    fn advance(&mut self) {
        let c = &mut self.cursor;
        c.suby += 1;
        if c.suby < self.view.rows {
            return;
        }
        c.suby = 0;
        c.subx += 1;
        if c.subx < self.view.cols {
            return;
        }
        c.subx = 0;
        c.lat += 1;
        if c.lat <= self.view.north_cell {
            return;
        }
        c.lat = self.view.south_cell;
        c.lon += 1;
    }

    /// Move the cursor past every remaining subframe of `cell`.
    fn skip_cell(&mut self, cell: Cursor) {
        while self.cursor.lon == cell.lon && self.cursor.lat == cell.lat {
            self.advance();
        }
    }
}

fn subframe_extent(index: usize, count: usize, cell_pixels: usize) -> usize {
    if index + 1 == count {
        cell_pixels - index * SUBFRAME_SIZE
    } else {
        SUBFRAME_SIZE
    }
}
