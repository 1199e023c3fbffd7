//! Subframe view parameters, rendered images and the per-frame render cache.

use crate::colortable::{PaletteKind, Rgba};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel-value derivation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingMode {
    /// No image is produced.
    None,
    /// Greyscale slope shading.
    #[default]
    Slope,
    /// Elevation bands in meters.
    MetersBand,
    /// Elevation bands in feet.
    FeetBand,
    /// Border ring around every subframe, for checking the tiling.
    Boundary,
    /// Hypsometric colours, with slope rounds when the palette has them.
    Colored,
}

impl ShadingMode {
    /// Palette this mode draws from.
    pub fn palette(self) -> PaletteKind {
        match self {
            ShadingMode::Colored => PaletteKind::Colored,
            _ => PaletteKind::Greyscale,
        }
    }

    /// Short name used in logs and metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            ShadingMode::None => "none",
            ShadingMode::Slope => "slope",
            ShadingMode::MetersBand => "meters",
            ShadingMode::FeetBand => "feet",
            ShadingMode::Boundary => "boundary",
            ShadingMode::Colored => "colored",
        }
    }
}

impl std::fmt::Display for ShadingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output pixel representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    /// Palette indices plus the palette.
    #[default]
    Indexed,
    /// Resolved `0xAARRGGBB` values.
    Direct,
}

/// View parameters for one subframe.
///
/// Equality only compares the fields that change pixel values: mode, band
/// height, level, contrast, degrees per pixel and colour model. Position and
/// size (`subx`, `suby`, `lat`, `lon`, `width`, `height`) are ignored, so a
/// render cache cell is reused as long as the shading inputs match.
#[derive(Debug, Clone, Copy)]
pub struct SubframeInfo {
    pub mode: ShadingMode,
    /// Elevation per colour step for the band modes (meters or feet).
    pub band_height: i32,
    /// DTED level 0, 1 or 2; selects the slope distance constant.
    pub level: u8,
    /// Contrast adjustment, 1 (flat) to 5 (harsh).
    pub contrast: u8,
    /// Degrees of longitude per pixel.
    pub lon_per_pixel: f64,
    /// Degrees of latitude per pixel.
    pub lat_per_pixel: f64,
    /// Subframe column within the frame.
    pub subx: usize,
    /// Subframe row within the frame, 0 at the north edge.
    pub suby: usize,
    /// Latitude of the upper-left corner.
    pub lat: f64,
    /// Longitude of the upper-left corner.
    pub lon: f64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    pub color_model: ColorModel,
}

impl Default for SubframeInfo {
    fn default() -> Self {
        Self {
            mode: ShadingMode::default(),
            band_height: DEFAULT_BAND_HEIGHT,
            level: 1,
            contrast: DEFAULT_CONTRAST,
            lon_per_pixel: 0.0,
            lat_per_pixel: 0.0,
            subx: 0,
            suby: 0,
            lat: 0.0,
            lon: 0.0,
            width: 0,
            height: 0,
            color_model: ColorModel::default(),
        }
    }
}

/// Default band height for the band modes.
pub const DEFAULT_BAND_HEIGHT: i32 = 25;

/// Default contrast adjustment.
pub const DEFAULT_CONTRAST: u8 = 3;

impl PartialEq for SubframeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.band_height == other.band_height
            && self.level == other.level
            && self.contrast == other.contrast
            && self.lon_per_pixel == other.lon_per_pixel
            && self.lat_per_pixel == other.lat_per_pixel
            && self.color_model == other.color_model
    }
}

impl SubframeInfo {
    /// Copy of `self` positioned at another subframe.
    pub fn positioned(&self, subx: usize, suby: usize, lat: f64, lon: f64, width: u32, height: u32) -> Self {
        Self {
            subx,
            suby,
            lat,
            lon,
            width,
            height,
            ..*self
        }
    }
}

/// Pixel storage of a rendered subframe, row-major from the north-west
/// corner.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Indexed { indices: Vec<u8>, palette: Arc<[Rgba]> },
    Direct(Vec<u32>),
}

/// A rendered subframe.
#[derive(Debug, Clone, PartialEq)]
pub struct SubframeImage {
    pub width: u32,
    pub height: u32,
    /// Latitude of the upper-left corner.
    pub lat: f64,
    /// Longitude of the upper-left corner.
    pub lon: f64,
    pub subx: usize,
    pub suby: usize,
    pub pixels: PixelData,
}

impl SubframeImage {
    /// Palette index at a pixel, for indexed images.
    pub fn index_at(&self, x: u32, y: u32) -> Option<u8> {
        match &self.pixels {
            PixelData::Indexed { indices, .. } => indices.get(self.offset(x, y)?).copied(),
            PixelData::Direct(_) => None,
        }
    }

    /// Resolved colour at a pixel.
    pub fn color_at(&self, x: u32, y: u32) -> Option<Rgba> {
        let offset = self.offset(x, y)?;
        match &self.pixels {
            PixelData::Indexed { indices, palette } => {
                indices.get(offset).and_then(|i| palette.get(*i as usize)).copied()
            }
            PixelData::Direct(pixels) => pixels.get(offset).map(|p| Rgba::from_argb(*p)),
        }
    }

    /// Every pixel resolved to `0xAARRGGBB`.
    pub fn to_argb(&self) -> Vec<u32> {
        match &self.pixels {
            PixelData::Indexed { indices, palette } => indices
                .iter()
                .map(|i| palette.get(*i as usize).map_or(0, |c| c.to_argb()))
                .collect(),
            PixelData::Direct(pixels) => pixels.clone(),
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }
}

#[derive(Debug, Clone)]
struct CachedSubframe {
    info: SubframeInfo,
    image: Arc<SubframeImage>,
}

/// Render cache cells for one frame, `cols × rows`.
#[derive(Debug, Clone, Default)]
pub struct SubframeGrid {
    cols: usize,
    rows: usize,
    cells: Vec<Option<CachedSubframe>>,
}

impl SubframeGrid {
    /// An empty grid of the given shape.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![None; cols * rows],
        }
    }

    /// `(cols, rows)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cached image for a cell if it was produced by an equal `info`.
    pub fn lookup(&self, info: &SubframeInfo) -> Option<Arc<SubframeImage>> {
        let cell = self.cells.get(self.slot(info.subx, info.suby)?)?.as_ref()?;
        (cell.info == *info).then(|| Arc::clone(&cell.image))
    }

    /// Store an image for its cell. Returns false if the cell is outside
    /// the grid.
    pub fn store(&mut self, info: &SubframeInfo, image: Arc<SubframeImage>) -> bool {
        match self.slot(info.subx, info.suby) {
            Some(slot) => {
                self.cells[slot] = Some(CachedSubframe { info: *info, image });
                true
            }
            None => false,
        }
    }

    /// Drop every cached image, keeping the shape.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = None);
    }

    /// Number of cells holding an image.
    pub fn cached(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    fn slot(&self, subx: usize, suby: usize) -> Option<usize> {
        (subx < self.cols && suby < self.rows).then(|| subx * self.rows + suby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Arc<SubframeImage> {
        Arc::new(SubframeImage {
            width: 1,
            height: 1,
            lat: 0.0,
            lon: 0.0,
            subx: 0,
            suby: 0,
            pixels: PixelData::Direct(vec![0xFF000000]),
        })
    }

    #[test]
    fn test_equality_ignores_geometry() {
        let a = SubframeInfo {
            lon_per_pixel: 0.01,
            lat_per_pixel: 0.01,
            ..SubframeInfo::default()
        };
        let b = a.positioned(3, 4, 10.0, 20.0, 200, 150);
        assert_eq!(a, b);

        let c = SubframeInfo { band_height: 50, ..a };
        assert_ne!(a, c);
        let d = SubframeInfo { contrast: 5, ..a };
        assert_ne!(a, d);
        let e = SubframeInfo { lon_per_pixel: 0.02, ..a };
        assert_ne!(a, e);
    }

    #[test]
    fn test_grid_lookup_requires_equal_info() {
        let mut grid = SubframeGrid::new(2, 3);
        let info = SubframeInfo { subx: 1, suby: 2, ..SubframeInfo::default() };
        let img = image();
        assert!(grid.store(&info, Arc::clone(&img)));
        assert!(Arc::ptr_eq(&grid.lookup(&info).unwrap(), &img));

        let other = SubframeInfo { band_height: 1, ..info };
        assert!(grid.lookup(&other).is_none());

        let out_of_range = SubframeInfo { subx: 2, ..info };
        assert!(!grid.store(&out_of_range, img));
        assert_eq!(grid.cached(), 1);

        grid.clear();
        assert_eq!(grid.cached(), 0);
        assert_eq!(grid.shape(), (2, 3));
    }

    #[test]
    fn test_image_accessors() {
        let palette: Arc<[Rgba]> = vec![Rgba::new(0, 0, 0, 255), Rgba::new(9, 9, 9, 255)].into();
        let img = SubframeImage {
            width: 2,
            height: 1,
            lat: 0.0,
            lon: 0.0,
            subx: 0,
            suby: 0,
            pixels: PixelData::Indexed { indices: vec![0, 1], palette },
        };
        assert_eq!(img.index_at(1, 0), Some(1));
        assert_eq!(img.index_at(2, 0), None);
        assert_eq!(img.color_at(1, 0), Some(Rgba::new(9, 9, 9, 255)));
        assert_eq!(img.to_argb(), vec![0xFF000000, 0xFF090909]);
    }
}
