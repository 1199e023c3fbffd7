//! Viewport rendering: composite subframe images onto an RGBA canvas and
//! write it as a TIFF.

use dted_cache::{EqualArcViewport, QuadrantTiler, SubframeImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::{debug, info};

/// RGBA8 canvas covering a viewport, origin at the upper-left.
pub struct Canvas {
    ul_lat: f64,
    ul_lon: f64,
    ppd_x: f64,
    ppd_y: f64,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Canvas {
    /// Canvas for a viewport. A viewport whose upper-left longitude is east
    /// of its lower-right one wraps across the antimeridian.
    pub fn for_viewport(view: &EqualArcViewport) -> Self {
        let span_lon = (view.lr_lon - view.ul_lon).rem_euclid(360.0);
        let span_lon = if span_lon == 0.0 && view.lr_lon != view.ul_lon { 360.0 } else { span_lon };
        let width = (span_lon * view.ppd_x).round().max(0.0) as u32;
        let height = view.height();
        Self {
            ul_lat: view.ul_lat,
            ul_lon: view.ul_lon,
            ppd_x: view.ppd_x,
            ppd_y: view.ppd_y,
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Draw an image at its geographic position. Transparent pixels and
    /// pixels off the canvas are skipped.
    pub fn draw(&mut self, image: &SubframeImage) {
        let x0 = ((image.lon - self.ul_lon).rem_euclid(360.0) * self.ppd_x).round() as i64;
        let y0 = ((self.ul_lat - image.lat) * self.ppd_y).round() as i64;
        let argb = image.to_argb();

        for (i, pixel) in argb.iter().enumerate() {
            let alpha = (pixel >> 24) as u8;
            if alpha == 0 {
                continue;
            }
            let x = x0 + (i as i64 % image.width as i64);
            let y = y0 + (i as i64 / image.width as i64);
            if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                continue;
            }
            let offset = (y as usize * self.width as usize + x as usize) * 4;
            self.rgba[offset] = (pixel >> 16) as u8;
            self.rgba[offset + 1] = (pixel >> 8) as u8;
            self.rgba[offset + 2] = *pixel as u8;
            self.rgba[offset + 3] = alpha;
        }
    }

    /// Write the canvas as an RGBA8 TIFF.
    pub fn write_tiff(&self, path: &Path) -> crate::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(file)?;
        encoder.write_image::<colortype::RGBA8>(self.width, self.height, &self.rgba)?;
        Ok(())
    }
}

/// Render every image of a viewport onto a canvas.
pub fn render(tiler: &mut QuadrantTiler, view: &EqualArcViewport) -> Canvas {
    let mut canvas = Canvas::for_viewport(view);
    tiler.set_projection(view);
    debug!("active quadrants: {:?}", tiler.active());

    let mut count = 0usize;
    while let Some(image) = tiler.next_image() {
        canvas.draw(&image);
        count += 1;
    }
    info!("composited {} subframes onto {}x{} canvas", count, canvas.width, canvas.height);
    canvas
}
