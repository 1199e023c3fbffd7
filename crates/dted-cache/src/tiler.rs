//! Splits a viewport at the antimeridian and the equator and chains one
//! [`CacheHandler`] per piece.

use crate::cache::FrameCache;
use crate::colortable::ColorTable;
use crate::handler::{CacheHandler, EqualArcViewport, Projection};
use crate::subframe::{SubframeImage, SubframeInfo};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Hemisphere quadrant of a viewport piece, in the order their images are
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    SouthWest = 1,
    NorthEast = 2,
    SouthEast = 3,
}

impl Quadrant {
    fn of(north_half: bool, west_half: bool) -> Self {
        match (north_half, west_half) {
            (true, true) => Quadrant::NorthWest,
            (false, true) => Quadrant::SouthWest,
            (true, false) => Quadrant::NorthEast,
            (false, false) => Quadrant::SouthEast,
        }
    }
}

/// Pieces of a viewport that each stay within one hemisphere quadrant,
/// ordered NW, SW, NE, SE.
///
/// A viewport whose upper-left longitude is east of its lower-right
/// longitude wraps across the antimeridian and is cut there. A viewport
/// spanning the equator is cut at latitude 0.
pub fn split_viewport(projection: &dyn Projection) -> Vec<(Quadrant, EqualArcViewport)> {
    let (ul_lat, ul_lon) = projection.upper_left();
    let (lr_lat, lr_lon) = projection.lower_right();
    let (ppd_x, ppd_y) = projection.pixels_per_degree();
    let (north, south) = (ul_lat.max(lr_lat), ul_lat.min(lr_lat));

    let lon_pieces = if ul_lon > lr_lon {
        vec![(ul_lon, 180.0), (-180.0, lr_lon)]
    } else {
        vec![(ul_lon, lr_lon)]
    };
    let lat_pieces = if north > 0.0 && south < 0.0 {
        vec![(north, 0.0), (0.0, south)]
    } else {
        vec![(north, south)]
    };

    let mut pieces: Vec<(Quadrant, EqualArcViewport)> = lon_pieces
        .iter()
        .flat_map(|&(west, east)| {
            lat_pieces.iter().map(move |&(top, bottom)| {
                let quadrant = Quadrant::of(top + bottom > 0.0, west + east < 0.0);
                (quadrant, EqualArcViewport::new(top, west, bottom, east, ppd_x, ppd_y))
            })
        })
        .collect();
    pieces.sort_by_key(|(quadrant, _)| *quadrant);
    pieces
}

/// Up to four cache handlers, one per quadrant a viewport touches.
///
/// Each handler owns its frame cache and is kept across projections, so a
/// quadrant that stays in view keeps its frames and renders.
#[derive(Debug)]
pub struct QuadrantTiler {
    dted_paths: Vec<PathBuf>,
    dted2_paths: Vec<PathBuf>,
    cache_size: usize,
    shading: SubframeInfo,
    table: ColorTable,
    handlers: [Option<CacheHandler>; 4],
    active: Vec<Quadrant>,
    current: usize,
}

impl QuadrantTiler {
    pub fn new(
        dted_paths: Vec<PathBuf>,
        dted2_paths: Vec<PathBuf>,
        cache_size: usize,
        shading: SubframeInfo,
        table: ColorTable,
    ) -> Self {
        Self {
            dted_paths,
            dted2_paths,
            cache_size,
            shading,
            table,
            handlers: [None, None, None, None],
            active: Vec::new(),
            current: 0,
        }
    }

    /// Quadrants touched by the current projection, in iteration order.
    pub fn active(&self) -> &[Quadrant] {
        &self.active
    }

    /// Handler for a quadrant, if one was created.
    pub fn handler(&self, quadrant: Quadrant) -> Option<&CacheHandler> {
        self.handlers[quadrant as usize].as_ref()
    }

    /// Split the viewport and point one handler at each piece.
    pub fn set_projection(&mut self, projection: &dyn Projection) {
        let pieces = split_viewport(projection);
        self.active = pieces.iter().map(|(quadrant, _)| *quadrant).collect();
        self.current = 0;
        for (quadrant, piece) in &pieces {
            let handler = self.handlers[*quadrant as usize].get_or_insert_with(|| {
                debug!("creating handler for {:?}", quadrant);
                CacheHandler::new(
                    FrameCache::new(self.dted_paths.clone(), self.dted2_paths.clone(), self.cache_size),
                    self.shading,
                    self.table.clone(),
                )
            });
            handler.set_projection(piece);
        }
    }

    /// Next image across the active handlers in quadrant order.
    pub fn next_image(&mut self) -> Option<Arc<SubframeImage>> {
        while let Some(quadrant) = self.active.get(self.current) {
            if let Some(image) = self.handlers[*quadrant as usize].as_mut().and_then(CacheHandler::next_image) {
                return Some(image);
            }
            self.current += 1;
        }
        None
    }

    /// Drain the remaining images.
    pub fn images(&mut self) -> Vec<Arc<SubframeImage>> {
        std::iter::from_fn(|| self.next_image()).collect()
    }

    /// Apply new shading parameters to every handler.
    pub fn set_shading(&mut self, shading: SubframeInfo) {
        self.shading = shading;
        for handler in self.handlers.iter_mut().flatten() {
            handler.set_shading(shading);
        }
    }

    /// Apply a new colour table to every handler.
    pub fn set_color_table(&mut self, table: ColorTable) {
        for handler in self.handlers.iter_mut().flatten() {
            handler.set_color_table(table.clone());
        }
        self.table = table;
    }
}
