//! Colour tables for subframe shading.
//!
//! A [`ColorTable`] is immutable once built and is shared by `Arc` across
//! every subframe rendered with the same configuration. It carries two
//! palettes derived from the same colour count and opaqueness; the shading
//! mode picks one with a [`PaletteKind`] rather than toggling shared state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of hypsometric elevation bands.
pub const NUM_ELEVATION_COLORS: usize = 16;

/// Default number of greyscale colours.
pub const DEFAULT_NUM_COLORS: usize = 216;

/// Default alpha for every palette entry.
pub const DEFAULT_OPAQUENESS: u8 = 255;

/// Largest greyscale colour count; one more index is reserved for no data.
pub const MAX_NUM_COLORS: usize = 255;

/// Fully transparent entry closing every palette, drawn where posts are
/// missing.
pub const NO_DATA_COLOR: Rgba = Rgba::new(0, 0, 0, 0);

/// Palette index reserved for water / zero elevation.
pub const WATER_INDEX: u8 = 0;

/// Upper elevation of each colored band.
///
/// Band `i` holds elevations in `(cutoff[i-1], cutoff[i]]`; band 0 is water.
pub const ELEVATION_COLOR_CUTOFF: [i32; NUM_ELEVATION_COLORS] = [
    0, 50, 100, 200, 400, 800, 1200, 1600, 2000, 3000, 4000, 6000, 8000, 10000, 12000, 33000,
];

const ELEVATION_COLORS: [(u8, u8, u8); NUM_ELEVATION_COLORS] = [
    (40, 90, 170),
    (52, 130, 70),
    (70, 150, 80),
    (100, 170, 90),
    (135, 185, 100),
    (170, 200, 110),
    (205, 210, 120),
    (225, 205, 120),
    (220, 185, 105),
    (205, 160, 90),
    (185, 135, 80),
    (160, 110, 70),
    (140, 95, 75),
    (150, 130, 120),
    (200, 195, 190),
    (250, 250, 250),
];

/// A single palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Pack as `0xAARRGGBB`.
    pub const fn to_argb(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Unpack from `0xAARRGGBB`.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    fn scaled(self, factor: f32) -> Self {
        let scale = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    fn lightened(self, amount: f32) -> Self {
        let lift = |c: u8| (c as f32 + (255.0 - c as f32) * amount).round().clamp(0.0, 255.0) as u8;
        Self::new(lift(self.r), lift(self.g), lift(self.b), self.a)
    }
}

/// Which palette of a [`ColorTable`] a shading mode draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteKind {
    /// Hypsometric elevation colours, optionally with slope rounds.
    Colored,
    /// Water index plus a grey ramp.
    Greyscale,
}

/// Slope round within the colored palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeRound {
    Base = 0,
    Darker = 1,
    Brighter = 2,
}

/// Immutable pair of palettes.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    num_colors: usize,
    opaqueness: u8,
    colored: Arc<[Rgba]>,
    greyscale: Arc<[Rgba]>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_COLORS, DEFAULT_OPAQUENESS)
    }
}

impl ColorTable {
    /// Build both palettes.
    ///
    /// `num_colors` is clamped to `2..=255` so the no-data index still
    /// fits a byte. The colored palette has 16 entries, or 48 (base, darker,
    /// brighter rounds) when more than 16 colours are requested. Both
    /// palettes end with [`NO_DATA_COLOR`].
    pub fn new(num_colors: usize, opaqueness: u8) -> Self {
        let num_colors = num_colors.clamp(2, MAX_NUM_COLORS);

        let base: Vec<Rgba> = ELEVATION_COLORS
            .iter()
            .map(|&(r, g, b)| Rgba::new(r, g, b, opaqueness))
            .collect();
        let mut colored = base.clone();
        if num_colors > NUM_ELEVATION_COLORS {
            colored.extend(base.iter().map(|c| c.scaled(0.7)));
            colored.extend(base.iter().map(|c| c.lightened(0.35)));
        }
        colored.push(NO_DATA_COLOR);

        let (wr, wg, wb) = ELEVATION_COLORS[WATER_INDEX as usize];
        let mut greyscale = Vec::with_capacity(num_colors + 1);
        greyscale.push(Rgba::new(wr, wg, wb, opaqueness));
        let steps = (num_colors - 1) as f32;
        for i in 1..num_colors {
            let grey = (i as f32 * 255.0 / steps).round() as u8;
            greyscale.push(Rgba::new(grey, grey, grey, opaqueness));
        }
        greyscale.push(NO_DATA_COLOR);

        Self {
            num_colors,
            opaqueness,
            colored: colored.into(),
            greyscale: greyscale.into(),
        }
    }

    /// A new table with the same colour count and a different alpha.
    pub fn with_opaqueness(&self, opaqueness: u8) -> Self {
        Self::new(self.num_colors, opaqueness)
    }

    /// Requested colour count (after clamping).
    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    /// Alpha applied to every entry.
    pub fn opaqueness(&self) -> u8 {
        self.opaqueness
    }

    /// The selected palette.
    pub fn palette(&self, kind: PaletteKind) -> &Arc<[Rgba]> {
        match kind {
            PaletteKind::Colored => &self.colored,
            PaletteKind::Greyscale => &self.greyscale,
        }
    }

    /// Index of the transparent no-data entry in a palette.
    pub fn no_data_index(&self, kind: PaletteKind) -> u8 {
        (self.palette(kind).len() - 1) as u8
    }

    /// Whether the colored palette carries slope rounds.
    pub fn has_slope_rounds(&self) -> bool {
        self.colored.len() > NUM_ELEVATION_COLORS + 1
    }

    /// Colored palette index for an elevation band and slope round.
    pub fn colored_index(&self, band: usize, round: SlopeRound) -> u8 {
        let band = band.min(NUM_ELEVATION_COLORS - 1);
        if self.has_slope_rounds() {
            (round as usize * NUM_ELEVATION_COLORS + band) as u8
        } else {
            band as u8
        }
    }
}

/// Classify an elevation into one of the 16 colored bands.
///
/// Linear scan with an early break at the first cutoff the elevation does
/// not exceed. Elevations at or below 0, and above the last cutoff, map to
/// band 0.
pub fn elevation_band(elevation: i32) -> usize {
    if elevation <= 0 {
        return WATER_INDEX as usize;
    }
    for (band, cutoff) in ELEVATION_COLOR_CUTOFF.iter().enumerate().skip(1) {
        if elevation <= *cutoff {
            return band;
        }
    }
    WATER_INDEX as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_band_cutoffs() {
        assert_eq!(elevation_band(100), 2);
        assert_eq!(elevation_band(101), 3);
        assert_eq!(elevation_band(1), 1);
        assert_eq!(elevation_band(50), 1);
        assert_eq!(elevation_band(33000), 15);
        assert_eq!(elevation_band(0), 0);
        assert_eq!(elevation_band(-20), 0);
        assert_eq!(elevation_band(33001), 0);
    }

    #[test]
    fn test_table_sizes() {
        let table = ColorTable::new(216, 200);
        assert_eq!(table.palette(PaletteKind::Colored).len(), 49);
        assert_eq!(table.palette(PaletteKind::Greyscale).len(), 217);
        assert!(table.palette(PaletteKind::Greyscale)[..216].iter().all(|c| c.a == 200));

        let small = ColorTable::new(16, 255);
        assert_eq!(small.palette(PaletteKind::Colored).len(), 17);
        assert!(!small.has_slope_rounds());
        assert_eq!(small.colored_index(5, SlopeRound::Darker), 5);
    }

    #[test]
    fn test_greyscale_ramp_is_monotonic() {
        let table = ColorTable::new(32, 255);
        let greys = table.palette(PaletteKind::Greyscale);
        assert_eq!(greys[31], Rgba::new(255, 255, 255, 255));
        for pair in greys[1..32].windows(2) {
            assert!(pair[0].r < pair[1].r);
        }
    }

    #[test]
    fn test_slope_rounds() {
        let table = ColorTable::default();
        let base = table.palette(PaletteKind::Colored)[table.colored_index(7, SlopeRound::Base) as usize];
        let dark = table.palette(PaletteKind::Colored)[table.colored_index(7, SlopeRound::Darker) as usize];
        let bright = table.palette(PaletteKind::Colored)[table.colored_index(7, SlopeRound::Brighter) as usize];
        assert!(dark.r < base.r && base.r < bright.r);
    }

    #[test]
    fn test_construction_is_deterministic() {
        assert_eq!(ColorTable::new(64, 128), ColorTable::new(64, 128));
        assert_eq!(ColorTable::new(64, 255).with_opaqueness(10).opaqueness(), 10);
        assert_eq!(ColorTable::new(1000, 255).num_colors(), 255);
    }

    #[test]
    fn test_no_data_entry_is_transparent_and_last() {
        for num_colors in [2, 16, 17, 216, 255] {
            let table = ColorTable::new(num_colors, 255);
            for kind in [PaletteKind::Colored, PaletteKind::Greyscale] {
                let index = table.no_data_index(kind);
                assert_eq!(index as usize, table.palette(kind).len() - 1);
                assert_eq!(table.palette(kind)[index as usize], NO_DATA_COLOR);
                assert_ne!(index, WATER_INDEX);
            }
        }
        assert_eq!(ColorTable::new(255, 255).no_data_index(PaletteKind::Greyscale), 255);
    }

    #[test]
    fn test_argb_packing() {
        let c = Rgba::new(1, 2, 3, 4);
        assert_eq!(c.to_argb(), 0x04010203);
        assert_eq!(Rgba::from_argb(c.to_argb()), c);
    }
}
