//! dtedtool: inspect, query and render DTED frames.
//!
//! Search roots and shading come from an optional YAML config file
//! (`--config`), overridden by command-line flags.

mod render;

use clap::{Parser, Subcommand, ValueEnum};
use dted_cache::{
    ColorModel, Coverage, DtedConfig, DtedError, DtedFrame, ElevationLookup, EqualArcViewport, FrameWriter,
    QuadrantTiler, ShadingMode, NO_DATA,
};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Dted(#[from] DtedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Shading mode selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Greyscale slope shading
    Slope,
    /// Elevation bands in meters
    Meters,
    /// Elevation bands in feet
    Feet,
    /// Subframe outlines
    Boundary,
    /// Hypsometric colours with slope rounds
    Colored,
}

impl From<Mode> for ShadingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Slope => ShadingMode::Slope,
            Mode::Meters => ShadingMode::MetersBand,
            Mode::Feet => ShadingMode::FeetBand,
            Mode::Boundary => ShadingMode::Boundary,
            Mode::Colored => ShadingMode::Colored,
        }
    }
}

/// DTED frame inspection and rendering tool.
#[derive(Parser)]
#[command(name = "dtedtool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Level 0/1 search root (repeatable, replaces the configured roots)
    #[arg(long = "dted-path", global = true)]
    dted_paths: Vec<PathBuf>,

    /// Level 2 search root (repeatable, replaces the configured roots)
    #[arg(long = "dted2-path", global = true)]
    dted2_paths: Vec<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header of a frame file
    Info {
        /// Frame file
        file: PathBuf,
    },

    /// Look up the elevation at a coordinate, finest level first
    #[command(allow_negative_numbers = true)]
    Elevation {
        lat: f64,
        lon: f64,
    },

    /// Print the posts inside a rectangle, north row first
    #[command(allow_negative_numbers = true)]
    Matrix {
        ullat: f64,
        ullon: f64,
        lrlat: f64,
        lrlon: f64,

        /// DTED level
        #[arg(short, long, default_value = "1")]
        level: u8,
    },

    /// Render a viewport to an RGBA TIFF
    Render {
        /// Upper-left corner as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        ul: (f64, f64),

        /// Lower-right corner as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        lr: (f64, f64),

        /// Pixels per degree
        #[arg(long, conflicts_with = "size")]
        ppd: Option<f64>,

        /// Canvas size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        size: Option<(u32, u32)>,

        /// Output TIFF
        #[arg(short, long)]
        out: PathBuf,

        /// Shading mode (overrides the config)
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,

        /// Band height in meters or feet
        #[arg(long)]
        band_height: Option<i32>,

        /// DTED level
        #[arg(short, long)]
        level: Option<u8>,

        /// Slope contrast, 1 to 5
        #[arg(long)]
        contrast: Option<u8>,

        /// Greyscale palette size
        #[arg(long)]
        colors: Option<usize>,

        /// Resolve colours while shading instead of keeping palette indices
        #[arg(long)]
        direct: bool,
    },

    /// Write a synthetic frame (a single hill) under a search root
    #[command(allow_negative_numbers = true)]
    Synth {
        /// Search root to write under
        root: PathBuf,

        /// Latitude of the south-west corner
        lat: i32,

        /// Longitude of the south-west corner
        lon: i32,

        /// DTED level
        #[arg(short, long, default_value = "1")]
        level: u8,

        /// Posts per axis (defaults to the level's standard count)
        #[arg(long)]
        posts: Option<u32>,

        /// Hill height in meters
        #[arg(long, default_value = "1500")]
        peak: i16,
    },

    /// Show per-level cell counts of a coverage file
    Coverage {
        /// Coverage file
        file: PathBuf,

        /// Also report whether this LAT,LON is covered
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        at: Option<(f64, f64)>,
    },

    /// Print the effective configuration as YAML
    Config,
}

fn parse_lat_lon(s: &str) -> std::result::Result<(f64, f64), String> {
    let (lat, lon) = s.split_once(',').ok_or_else(|| format!("expected LAT,LON, got '{}'", s))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude '{}': {}", lat, e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude '{}': {}", lon, e))?;
    Ok((lat, lon))
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("width '{}': {}", w, e))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("height '{}': {}", h, e))?;
    Ok((w, h))
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_config(cli: &Cli) -> Result<DtedConfig> {
    let mut config = match &cli.config {
        Some(path) => DtedConfig::load(path)?,
        None => DtedConfig::default(),
    };
    if !cli.dted_paths.is_empty() {
        config.dted_paths = cli.dted_paths.clone();
    }
    if !cli.dted2_paths.is_empty() {
        config.dted2_paths = cli.dted2_paths.clone();
    }
    debug!("config: {:?}", config);
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dted_metrics::describe_metrics();

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Info { file } => {
            let frame = DtedFrame::open(&file)?;
            let header = frame.header();
            let uhl = &header.uhl;
            let dsi = &header.dsi;
            let bounds = frame.bounds();

            println!("File:            {}", file.display());
            println!("Usable:          {}", frame.is_valid());
            println!("Level:           {}", frame.level());
            println!("Origin:          {:.6}, {:.6}", uhl.lat_origin, uhl.lon_origin);
            println!(
                "Bounds:          lat {:.4}..{:.4}, lon {:.4}..{:.4}",
                bounds.min_lat, bounds.max_lat, bounds.min_lon, bounds.max_lon
            );
            println!("Posts:           {} lon lines x {} lat points", uhl.num_lon_lines, uhl.num_lat_points);
            println!(
                "Intervals:       {:.1}\" lon, {:.1}\" lat",
                uhl.lon_post_interval as f64 / 10.0,
                uhl.lat_post_interval as f64 / 10.0
            );
            println!("Accuracy:        {} m", uhl.accuracy);
            println!("Security:        {}", uhl.security_code.trim());
            println!("Series:          {}", dsi.series.trim());
            println!("Edition:         {}", dsi.edition);
            println!("Vertical datum:  {}", dsi.vertical_datum.trim());
            println!("Horizontal datum:{}", dsi.horizontal_datum.trim());
        }

        Commands::Elevation { lat, lon } => {
            let mut cache = config.frame_cache();
            let start = Instant::now();
            let lookup = cache.elevation(lat, lon);
            info!("lookup took {:?}", start.elapsed());
            match lookup {
                ElevationLookup::Found(meters) => println!("{} m", meters),
                ElevationLookup::NoData => println!("no data (frame present, post unreadable)"),
                ElevationLookup::NoCoverage => println!("no coverage"),
            }
        }

        Commands::Matrix {
            ullat,
            ullon,
            lrlat,
            lrlon,
            level,
        } => {
            if level > 2 {
                return Err(CliError::InvalidArgument(format!("level must be 0, 1 or 2, got {}", level)));
            }
            let mut cache = config.frame_cache();
            let matrix = cache.elevations(ullat, ullon, lrlat, lrlon, level)?;
            println!("# {} columns x {} rows", matrix.width(), matrix.height());
            for row in (0..matrix.height()).rev() {
                let line: Vec<String> = (0..matrix.width())
                    .map(|column| match matrix.get(column, row) {
                        Some(NO_DATA) | None => "-".to_string(),
                        Some(value) => value.to_string(),
                    })
                    .collect();
                println!("{}", line.join(" "));
            }
        }

        Commands::Render {
            ul,
            lr,
            ppd,
            size,
            out,
            mode,
            band_height,
            level,
            contrast,
            colors,
            direct,
        } => {
            let shading = &mut config.shading;
            if let Some(mode) = mode {
                shading.mode = mode.into();
            }
            if let Some(band_height) = band_height {
                shading.band_height = band_height;
            }
            if let Some(level) = level {
                shading.level = level;
            }
            if let Some(contrast) = contrast {
                shading.contrast = contrast;
            }
            if let Some(colors) = colors {
                shading.num_colors = colors;
            }
            if direct {
                shading.color_model = ColorModel::Direct;
            }
            config.validate()?;

            let view = match (ppd, size) {
                (Some(ppd), _) => EqualArcViewport::new(ul.0, ul.1, lr.0, lr.1, ppd, ppd),
                (None, Some((width, height))) => EqualArcViewport::with_size(ul.0, ul.1, lr.0, lr.1, width, height),
                (None, None) => {
                    return Err(CliError::InvalidArgument("one of --ppd or --size is required".to_string()))
                }
            };

            let mut tiler = QuadrantTiler::new(
                config.dted_paths.clone(),
                config.dted2_paths.clone(),
                config.cache_size,
                config.shading.subframe_info(),
                config.shading.color_table(),
            );
            let start = Instant::now();
            let canvas = render::render(&mut tiler, &view);
            canvas.write_tiff(&out)?;
            println!(
                "Wrote {}x{} {} image to {} in {:.2}s",
                canvas.width(),
                canvas.height(),
                config.shading.mode,
                out.display(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Synth {
            root,
            lat,
            lon,
            level,
            posts,
            peak,
        } => {
            if level > 2 {
                return Err(CliError::InvalidArgument(format!("level must be 0, 1 or 2, got {}", level)));
            }
            let mut writer = FrameWriter::new(lat, lon, level);
            if let Some(posts) = posts {
                writer = writer.with_posts(posts, posts);
            }
            let path = writer.path_under(&root);
            let (lat_n, lon_n) = (writer.lat_interval(), writer.lon_interval());
            let columns = (36_000 / lon_n) as f64;
            let rows = (36_000 / lat_n) as f64;
            writer.write_file(&path, |column, row| {
                let dx = column as f64 / columns - 0.5;
                let dy = row as f64 / rows - 0.5;
                let falloff = (1.0 - 2.0 * dx.hypot(dy)).max(0.0);
                (peak as f64 * falloff * falloff).round() as i16
            })?;
            println!("Wrote {}", path.display());
        }

        Commands::Coverage { file, at } => {
            let coverage = Coverage::load(&file)?;
            for level in 0..3u8 {
                println!("Level {}: {} cells", level, coverage.count(level));
            }
            if let Some((lat, lon)) = at {
                let levels: Vec<String> = (0..3u8)
                    .filter(|level| coverage.covers(*level, lat, lon))
                    .map(|level| level.to_string())
                    .collect();
                if levels.is_empty() {
                    println!("({}, {}) is not covered", lat, lon);
                } else {
                    println!("({}, {}) is covered at level(s) {}", lat, lon, levels.join(", "));
                }
            }
        }

        Commands::Config => {
            config.validate()?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}
