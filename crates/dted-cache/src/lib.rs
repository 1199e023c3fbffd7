//! # dted-cache
//!
//! Reader, cache and shaded renderer for DTED (Digital Terrain Elevation
//! Data) frame files.
//!
//! ## Overview
//!
//! A DTED frame covers one whole degree of latitude and longitude with a
//! grid of elevation posts. Post spacing depends on the level:
//! - Level 0: 30 arc-seconds (~1 km)
//! - Level 1: 3 arc-seconds (~100 m)
//! - Level 2: 1 arc-second (~30 m)
//!
//! Frames live under a search root as `<e|w>DDD/<n|s>DD.dt<level>`, where
//! the names carry the south-west corner of the cell, so the frame for
//! 47.6°N 122.3°W at level 1 is `w123/n47.dt1`.
//!
//! The crate is layered:
//! - [`header`] parses the UHL and DSI blocks,
//! - [`reader`] and [`grid`] read longitude columns on demand,
//! - [`DtedFrame`] answers point, interpolated and window queries and
//!   renders subframe images through [`shading`],
//! - [`FrameCache`] keeps a bounded set of open frames,
//! - [`CacheHandler`] walks a viewport subframe by subframe and
//!   [`QuadrantTiler`] splits viewports at the antimeridian and equator.
//!
//! ## Examples
//!
//! ```no_run
//! use dted_cache::{DtedFrame, FrameCache, ElevationLookup};
//!
//! let mut cache = FrameCache::new(vec!["/data/dted".into()], vec![], 20);
//! match cache.elevation(47.6062, -122.3321) {
//!     ElevationLookup::Found(meters) => println!("Seattle: {} m", meters),
//!     other => println!("no elevation: {:?}", other),
//! }
//!
//! // Or open a single frame directly
//! let mut frame = DtedFrame::open("/data/dted/w123/n47.dt1")?;
//! let elevation = frame.interp_elevation_at(47.5, -122.5);
//! # Ok::<(), dted_cache::DtedError>(())
//! ```
//!
//! ### Rendering a viewport
//!
//! ```no_run
//! use dted_cache::{CacheHandler, ColorTable, EqualArcViewport, FrameCache, ShadingMode, SubframeInfo};
//!
//! let cache = FrameCache::new(vec!["/data/dted".into()], vec![], 0);
//! let shading = SubframeInfo { mode: ShadingMode::Colored, ..SubframeInfo::default() };
//! let mut handler = CacheHandler::new(cache, shading, ColorTable::default());
//!
//! handler.set_projection(&EqualArcViewport::with_size(48.0, -123.0, 47.0, -122.0, 1024, 1024));
//! while let Some(image) = handler.next_image() {
//!     println!("{}x{} at ({}, {})", image.width, image.height, image.lat, image.lon);
//! }
//! ```

pub mod cache;
pub mod colortable;
pub mod config;
pub mod coverage;
mod error;
pub mod frame;
pub mod grid;
pub mod handler;
pub mod header;
pub mod reader;
pub mod shading;
pub mod subframe;
pub mod tiler;
pub mod writer;

pub use cache::{ElevationLookup, FrameCache, DEFAULT_CACHE_SIZE, NO_COVERAGE};
pub use colortable::{ColorTable, PaletteKind, Rgba};
pub use config::{DtedConfig, ShadingConfig};
pub use coverage::Coverage;
pub use error::DtedError;
pub use frame::{DtedFrame, ElevationMatrix, IndexWindow, PostLayout, NO_DATA};
pub use handler::{CacheHandler, EqualArcViewport, HandlerState, Projection, SUBFRAME_SIZE};
pub use header::{FrameBounds, FrameHeader};
pub use subframe::{ColorModel, PixelData, ShadingMode, SubframeImage, SubframeInfo};
pub use tiler::{Quadrant, QuadrantTiler};
pub use writer::FrameWriter;

/// Result type for DTED operations.
pub type Result<T> = std::result::Result<T, DtedError>;
