//! Subframe shading pipeline.
//!
//! Every output pixel is mapped to a fractional post index by linear
//! interpolation between the subframe's start and end indices, the integer
//! part is clamped into the grid, and the mode decides the palette index.
//! Direct-colour output resolves the index through the palette afterwards.
//! Posts that cannot be read, and void posts, take the palette's
//! transparent no-data entry so they never look like sea level.

use crate::colortable::{elevation_band, ColorTable, SlopeRound, WATER_INDEX};
use crate::frame::NO_DATA;
use crate::grid::ElevationGrid;
use crate::header::{FrameBounds, FrameHeader, TENTHS_OF_ARCSEC_PER_DEGREE};
use crate::subframe::{ColorModel, PixelData, ShadingMode, SubframeImage, SubframeInfo};
use std::sync::Arc;

/// Meters to feet.
pub const FEET_PER_METER: f64 = 3.280_839_9;

/// Ground distance between posts per DTED level, in meters.
pub const SLOPE_DISTANCE: [f64; 3] = [900.0, 90.0, 30.0];

/// Palettes this large spread bands with a contrast-dependent stride.
pub const LARGE_PALETTE: usize = 216;

/// Slope magnitude below which colored shading uses the base round.
pub const FLAT_SLOPE: f64 = 0.05;

/// Fractional post index of a coordinate.
pub fn post_index(coord: f64, origin: f64, interval_tenths: u32) -> f64 {
    (coord - origin) * TENTHS_OF_ARCSEC_PER_DEGREE / interval_tenths as f64
}

/// Distance term for slope shading.
///
/// The level constant is scaled by `10^(3 - contrast)`, so higher contrast
/// gives steeper slopes, and by the length of the NW→SE post step.
pub fn slope_distance(level: u8, contrast: u8, dx: f64, dy: f64) -> f64 {
    let base = SLOPE_DISTANCE[level.min(2) as usize];
    let contrast = contrast.clamp(1, 5) as i32;
    base * 10f64.powi(3 - contrast) * dx.hypot(dy)
}

/// Palette index for the meters/feet band modes.
///
/// Negative elevations are banded by magnitude. Elevation 0 is water; a
/// band height of 0 maps to index 1.
pub fn band_index(elevation: i16, feet: bool, band_height: i32, contrast: u8, num_colors: usize) -> u8 {
    let mut value = (elevation as i64).abs();
    if feet {
        value = (value as f64 * FEET_PER_METER).round() as i64;
    }
    if value == 0 {
        return WATER_INDEX;
    }
    if band_height <= 0 {
        return 1;
    }

    let usable = num_colors.saturating_sub(1).max(1) as i64;
    let step = value / band_height as i64;
    let index = if num_colors >= LARGE_PALETTE {
        let bands = 8 * contrast.clamp(1, 5) as i64;
        let stride = (usable / bands).max(1);
        (step % bands) * stride + 1
    } else {
        step % usable + 1
    };
    index.clamp(1, usable) as u8
}

/// Greyscale index for a slope: mid-grey when flat, lighter when the
/// south-east post is higher.
pub fn slope_grey_index(slope: f64, num_colors: usize) -> u8 {
    let mid = (num_colors / 2) as f64;
    (mid + slope * mid).round().clamp(1.0, num_colors.saturating_sub(1).max(1) as f64) as u8
}

/// Colored palette index for an elevation and slope. The post value is
/// classified against the cutoff table as is.
pub fn colored_index(elevation: i16, slope: f64, table: &ColorTable) -> u8 {
    let band = elevation_band(elevation as i32);
    let round = if !table.has_slope_rounds() || band == WATER_INDEX as usize {
        SlopeRound::Base
    } else if slope < -FLAT_SLOPE {
        SlopeRound::Darker
    } else if slope > FLAT_SLOPE {
        SlopeRound::Brighter
    } else {
        SlopeRound::Base
    };
    table.colored_index(band, round)
}

/// A post, or `None` when it is unreadable or void.
fn post_value(grid: &mut ElevationGrid, column: i64, row: i64) -> Option<i16> {
    grid.post(column, row).filter(|elevation| *elevation != NO_DATA)
}

/// Shade one subframe window. Returns `None` for [`ShadingMode::None`]
/// and for empty windows.
pub fn shade(
    info: &SubframeInfo,
    table: &ColorTable,
    header: &FrameHeader,
    bounds: &FrameBounds,
    grid: &mut ElevationGrid,
) -> Option<SubframeImage> {
    if info.mode == ShadingMode::None || info.width == 0 || info.height == 0 {
        return None;
    }

    let lon_interval = header.uhl.lon_post_interval;
    let lat_interval = header.uhl.lat_post_interval;
    let width = info.width as f64;
    let height = info.height as f64;

    let lon_start = post_index(info.lon, bounds.min_lon, lon_interval);
    let lon_end = post_index(info.lon + width * info.lon_per_pixel, bounds.min_lon, lon_interval);
    let lat_top = post_index(info.lat, bounds.min_lat, lat_interval);
    let lat_bottom = post_index(info.lat - height * info.lat_per_pixel, bounds.min_lat, lat_interval);

    let lon_step = (lon_end - lon_start) / width;
    let lat_step = (lat_top - lat_bottom) / height;
    let dx = lon_step.round().max(1.0);
    let dy = lat_step.round().max(1.0);
    let distance = slope_distance(info.level, info.contrast, dx, dy);

    let kind = info.mode.palette();
    let palette = Arc::clone(table.palette(kind));
    let num_colors = table.num_colors();
    let no_data = table.no_data_index(kind);
    let mut indices = Vec::with_capacity((info.width * info.height) as usize);

    for y in 0..info.height {
        let row = (lat_top - y as f64 * lat_step).floor() as i64;
        for x in 0..info.width {
            let column = (lon_start + x as f64 * lon_step).floor() as i64;

            let index = match info.mode {
                ShadingMode::Boundary => {
                    let edge = x == 0 || y == 0 || x == info.width - 1 || y == info.height - 1;
                    if edge {
                        1
                    } else {
                        (num_colors / 2) as u8
                    }
                }
                ShadingMode::MetersBand | ShadingMode::FeetBand => match post_value(grid, column, row) {
                    Some(elevation) => band_index(
                        elevation,
                        info.mode == ShadingMode::FeetBand,
                        info.band_height,
                        info.contrast,
                        num_colors,
                    ),
                    None => no_data,
                },
                ShadingMode::Slope | ShadingMode::Colored => match post_value(grid, column, row) {
                    Some(elevation) => {
                        let nw = post_value(grid, column, row + dy as i64).unwrap_or(elevation);
                        let se = post_value(grid, column + dx as i64, row).unwrap_or(elevation);
                        let slope = (se as f64 - nw as f64) / distance;
                        if info.mode == ShadingMode::Colored {
                            colored_index(elevation, slope, table)
                        } else if elevation == 0 {
                            WATER_INDEX
                        } else {
                            slope_grey_index(slope, num_colors)
                        }
                    }
                    None => no_data,
                },
                ShadingMode::None => WATER_INDEX,
            };
            indices.push(index);
        }
    }

    let pixels = match info.color_model {
        ColorModel::Indexed => PixelData::Indexed { indices, palette },
        ColorModel::Direct => PixelData::Direct(
            indices
                .iter()
                .map(|i| palette.get(*i as usize).map_or(0, |c| c.to_argb()))
                .collect(),
        ),
    };

    Some(SubframeImage {
        width: info.width,
        height: info.height,
        lat: info.lat,
        lon: info.lon,
        subx: info.subx,
        suby: info.suby,
        pixels,
    })
}
