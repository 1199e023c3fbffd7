//! Integration tests for dted-cache against synthetic frame files.
//!
//! Frames are generated with `FrameWriter` into temporary directories.

use dted_cache::colortable::elevation_band;
use dted_cache::header::DATA_OFFSET;
use dted_cache::{
    CacheHandler, ColorTable, Coverage, DtedError, DtedFrame, ElevationLookup, EqualArcViewport, FrameCache,
    FrameWriter, HandlerState, PixelData, ShadingMode, SubframeInfo, NO_COVERAGE, NO_DATA,
};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Deterministic pseudo-random sequence in `[0, 1)`.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Level 0 frame over (47, -123) whose posts encode their index.
fn indexed_frame(dir: &Path) -> PathBuf {
    let writer = FrameWriter::new(47, -123, 0);
    let path = writer.path_under(dir);
    writer.write_file(&path, |c, r| (c * 200 + r) as i16).unwrap();
    path
}

fn uniform_frame(dir: &Path, lat: i32, lon: i32, elevation: i16) -> PathBuf {
    let writer = FrameWriter::new(lat, lon, 1).with_posts(41, 41);
    let path = writer.path_under(dir);
    writer.write_file(&path, |_, _| elevation).unwrap();
    path
}

#[test]
fn test_elevation_index_matches_reference_formula() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(indexed_frame(dir.path())).unwrap();
    let uhl = frame.header().uhl.clone();
    assert_eq!((uhl.num_lon_lines, uhl.num_lat_points), (121, 121));

    let mut rng = Lcg(7);
    for _ in 0..500 {
        let lat = 47.0 + rng.next();
        let lon = -123.0 + rng.next();
        // reference: seconds from the UHL origin over the interval in seconds
        let col = ((lon - uhl.lon_origin) * 3600.0 / (uhl.lon_post_interval as f64 / 10.0)).round() as i16;
        let row = ((lat - uhl.lat_origin) * 3600.0 / (uhl.lat_post_interval as f64 / 10.0)).round() as i16;
        assert_eq!(frame.elevation_at(lat, lon), Some(col * 200 + row), "({lat}, {lon})");
    }
}

#[test]
fn test_out_of_bounds_queries_return_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(indexed_frame(dir.path())).unwrap();
    for (lat, lon) in [(46.99, -122.5), (48.01, -122.5), (47.5, -123.01), (47.5, -121.99), (0.0, 0.0)] {
        assert_eq!(frame.elevation_at(lat, lon), None);
        assert_eq!(frame.interp_elevation_at(lat, lon), None);
        assert_eq!(frame.elevation_at(lat, lon).unwrap_or(NO_DATA), -32767);
    }
}

#[test]
fn test_index_window_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let frame = DtedFrame::open(indexed_frame(dir.path())).unwrap();
    let max = 121 - 2;

    let mut rng = Lcg(42);
    for _ in 0..300 {
        let (a_lat, b_lat) = (46.5 + 2.0 * rng.next(), 46.5 + 2.0 * rng.next());
        let (a_lon, b_lon) = (-123.5 + 2.0 * rng.next(), -123.5 + 2.0 * rng.next());
        let forward = frame.indexes_from_lat_lons(a_lat, a_lon, b_lat, b_lon);
        let reverse = frame.indexes_from_lat_lons(b_lat, b_lon, a_lat, a_lon);
        assert_eq!(forward, reverse);
        assert!(forward.x0 <= forward.x1 && forward.x1 <= max);
        assert!(forward.y0 <= forward.y1 && forward.y1 <= max);
    }
}

#[test]
fn test_uniform_sea_level_renders_water() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(uniform_frame(dir.path(), 10, 20, 0)).unwrap();
    frame.init_subframes(1, 1);
    let table = ColorTable::new(216, 255);

    for mode in [ShadingMode::MetersBand, ShadingMode::FeetBand, ShadingMode::Slope, ShadingMode::Colored] {
        let info = SubframeInfo {
            mode,
            band_height: 25,
            lon_per_pixel: 1.0 / 64.0,
            lat_per_pixel: 1.0 / 64.0,
            ..SubframeInfo::default()
        }
        .positioned(0, 0, 11.0, 20.0, 64, 64);
        let image = frame.subframe_image(&info, &table).unwrap();
        match &image.pixels {
            PixelData::Indexed { indices, palette } => {
                assert_eq!(indices.len(), 64 * 64);
                assert!(indices.iter().all(|i| *i == 0), "{mode}");
                if mode != ShadingMode::Colored {
                    assert_eq!(palette.len(), 217);
                }
            }
            PixelData::Direct(_) => panic!("expected indexed pixels"),
        }
    }
}

#[test]
fn test_direct_color_resolves_palette() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(uniform_frame(dir.path(), 10, 20, 500)).unwrap();
    let table = ColorTable::default();
    let info = SubframeInfo {
        mode: ShadingMode::Colored,
        lon_per_pixel: 0.1,
        lat_per_pixel: 0.1,
        ..SubframeInfo::default()
    }
    .positioned(0, 0, 11.0, 20.0, 10, 10);

    let indexed = frame.subframe_image(&info, &table).unwrap();
    let direct_info = SubframeInfo {
        color_model: dted_cache::ColorModel::Direct,
        ..info
    };
    let direct = frame.subframe_image(&direct_info, &table).unwrap();
    assert!(matches!(direct.pixels, PixelData::Direct(_)));
    assert_eq!(indexed.to_argb(), direct.to_argb());
    // 500 falls in the (400, 800] band
    assert_eq!(indexed.index_at(5, 5), Some(5));
}

#[test]
fn test_render_cache_hit_and_band_height_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(uniform_frame(dir.path(), 10, 20, 130)).unwrap();
    frame.init_subframes(2, 2);
    let table = ColorTable::default();
    let info = SubframeInfo {
        mode: ShadingMode::MetersBand,
        lon_per_pixel: 0.02,
        lat_per_pixel: 0.02,
        ..SubframeInfo::default()
    }
    .positioned(1, 1, 10.5, 20.5, 25, 25);

    let first = frame.subframe_image(&info, &table).unwrap();
    let second = frame.subframe_image(&info, &table).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let changed = SubframeInfo { band_height: 26, ..info };
    let third = frame.subframe_image(&changed, &table).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}

#[test]
fn test_colored_classification_at_cutoff() {
    assert_eq!(elevation_band(100), 2);
    assert_eq!(elevation_band(50), 1);
    assert_eq!(elevation_band(200), 3);
}

#[test]
fn test_dateline_extraction_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    uniform_frame(dir.path(), 0, 170, 10);
    let mut cache = FrameCache::new(vec![dir.path().to_path_buf()], vec![], 4);
    let result = cache.elevations(1.0, 170.0, 0.0, -170.0, 1);
    assert!(matches!(
        result,
        Err(DtedError::DatelineUnsupported { ullon, lrlon }) if ullon == 170.0 && lrlon == -170.0
    ));
}

#[test]
fn test_degenerate_scale_yields_no_images() {
    let dir = tempfile::tempdir().unwrap();
    uniform_frame(dir.path(), 10, 20, 10);
    let cache = FrameCache::new(vec![dir.path().to_path_buf()], vec![], 0);
    let mut handler = CacheHandler::new(cache, SubframeInfo::default(), ColorTable::default());

    let view = EqualArcViewport::with_size(11.0, 20.0, 11.0, 21.0, 256, 256);
    assert_eq!(view.ppd_y, 0.0);
    handler.set_projection(&view);
    assert_eq!(handler.subframe_grid(), (0, 0));
    assert!(handler.images().is_empty());
    assert_eq!(handler.state(), HandlerState::Exhausted);

    // a usable projection afterwards iterates again
    handler.set_projection(&EqualArcViewport::with_size(11.0, 20.0, 10.0, 21.0, 256, 256));
    assert_eq!(handler.subframe_grid(), (2, 2));
    assert_eq!(handler.images().len(), 4);
}

#[test]
fn test_release_and_reopen_keeps_columns() {
    let dir = tempfile::tempdir().unwrap();
    let mut frame = DtedFrame::open(indexed_frame(dir.path())).unwrap();
    let before = frame.elevations(47.6, -122.6, 47.4, -122.4).unwrap();
    let loaded = frame.columns_loaded();

    for _ in 0..3 {
        frame.release_file();
        frame.release_file();
        assert_eq!(frame.columns_loaded(), loaded);
        assert_eq!(frame.elevations(47.6, -122.6, 47.4, -122.4).unwrap(), before);
    }
    assert_eq!(frame.elevation_at(47.0, -122.0), Some(120 * 200));
}

#[test]
fn test_corrupt_records_degrade_to_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = uniform_frame(dir.path(), 10, 20, 42);
    let record = 12 + 2 * 41;

    {
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        // column 3: break the sentinel
        file.seek(SeekFrom::Start(DATA_OFFSET + 3 * record)).unwrap();
        file.write_all(&[0x00]).unwrap();
        // column 5: change a post without fixing the checksum
        file.seek(SeekFrom::Start(DATA_OFFSET + 5 * record + 8)).unwrap();
        file.write_all(&[0x00, 0x07]).unwrap();
    }

    let mut frame = DtedFrame::open(&path).unwrap();
    let step = 1.0 / 40.0;
    assert_eq!(frame.elevation_at(10.0, 20.0 + 3.0 * step), None);
    assert_eq!(frame.elevation_at(10.0, 20.0 + 5.0 * step), Some(7));
    assert_eq!(frame.elevation_at(10.0, 20.0 + 6.0 * step), Some(42));

    let matrix = frame.elevations(10.0, 20.0 + 2.0 * step, 10.0, 20.0 + 4.0 * step).unwrap();
    assert_eq!(matrix.columns, vec![vec![42], vec![NO_DATA], vec![42]]);

    let mut cache = FrameCache::new(vec![dir.path().to_path_buf()], vec![], 4);
    assert_eq!(cache.elevation(10.0, 20.0 + 3.0 * step), ElevationLookup::NoData);
    assert_eq!(cache.elevation(10.0, 20.0 + 3.0 * step).sentinel(), NO_DATA);
    assert_eq!(cache.elevation(-10.0, 20.0).sentinel(), NO_COVERAGE);
}

#[test]
fn test_truncated_frame_has_no_posts() {
    let dir = tempfile::tempdir().unwrap();
    let path = uniform_frame(dir.path(), 10, 20, 42);
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(DATA_OFFSET + 10).unwrap();
    drop(file);

    let mut frame = DtedFrame::open(&path).unwrap();
    assert!(frame.is_valid());
    assert_eq!(frame.elevation_at(10.5, 20.5), None);
    assert_eq!(frame.columns_loaded(), 0);
}

#[test]
fn test_coverage_round_trip_full_grid() {
    let mut rng = Lcg(3);
    let mut coverage = Coverage::new();
    for level in 0..3u8 {
        for lat in -90..90 {
            for lon in -180..180 {
                coverage.set(level, lat as f64, lon as f64, rng.next() < 0.3);
            }
        }
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coverage.dat");
    coverage.save(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * 180 * 360);
    assert_eq!(Coverage::load(&path).unwrap(), coverage);
}

#[test]
fn test_unreadable_posts_render_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let writer = FrameWriter::new(10, 20, 1).with_posts(41, 41);
    let path = writer.path_under(dir.path());
    writer.write_file(&path, |c, _| if c < 10 { NO_DATA } else { 0 }).unwrap();
    {
        let record = 12 + 2 * 41;
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        for column in 28..=32 {
            file.seek(SeekFrom::Start(DATA_OFFSET + column * record)).unwrap();
            file.write_all(&[0x00]).unwrap();
        }
    }

    let mut frame = DtedFrame::open(&path).unwrap();
    frame.init_subframes(1, 1);
    let table = ColorTable::default();
    for mode in [ShadingMode::MetersBand, ShadingMode::Slope, ShadingMode::Colored] {
        let info = SubframeInfo {
            mode,
            lon_per_pixel: 1.0 / 64.0,
            lat_per_pixel: 1.0 / 64.0,
            ..SubframeInfo::default()
        }
        .positioned(0, 0, 11.0, 20.0, 64, 64);
        let image = frame.subframe_image(&info, &table).unwrap();
        let no_data = table.no_data_index(mode.palette());
        assert_ne!(no_data, 0);

        // void posts, then the columns with broken sentinels
        for x in [2, 48] {
            assert_eq!(image.index_at(x, 10), Some(no_data), "{mode} x={x}");
            assert_eq!(image.color_at(x, 10).map(|c| c.a), Some(0), "{mode} x={x}");
        }
        assert_eq!(image.index_at(60, 10), Some(0), "{mode}");
        assert_ne!(image.color_at(60, 10).map(|c| c.a), Some(0), "{mode}");
    }
}

#[test]
fn test_reprojection_after_partial_iteration_restarts() {
    let dir = tempfile::tempdir().unwrap();
    uniform_frame(dir.path(), 10, 20, 300);
    uniform_frame(dir.path(), 10, 21, 300);
    let cache = FrameCache::new(vec![dir.path().to_path_buf()], vec![], 0);
    let mut handler = CacheHandler::new(cache, SubframeInfo::default(), ColorTable::default());
    let view = EqualArcViewport::new(11.0, 20.0, 10.0, 22.0, 300.0, 300.0);

    handler.set_projection(&view);
    let partial: Vec<_> = (0..3).map(|_| handler.next_image().unwrap()).collect();
    assert_eq!(handler.state(), HandlerState::Iterating);

    handler.set_projection(&view);
    assert_eq!(handler.state(), HandlerState::ProjectionSet);
    let images = handler.images();
    assert_eq!(images.len(), 8);
    assert!(partial.iter().zip(&images).all(|(a, b)| Arc::ptr_eq(a, b)));

    let order: Vec<(i32, usize, usize)> = images
        .iter()
        .map(|img| (img.lon.floor() as i32, img.subx, img.suby))
        .collect();
    let expected: Vec<(i32, usize, usize)> = [20, 21]
        .into_iter()
        .flat_map(|lon| [(lon, 0, 0), (lon, 0, 1), (lon, 1, 0), (lon, 1, 1)])
        .collect();
    assert_eq!(order, expected);
    assert!(handler.next_image().is_none());
    assert_eq!(handler.state(), HandlerState::Exhausted);
}
