//! Metric declarations for the DTED frame cache.
//!
//! Every metric recorded by `dted-cache` is declared here as a structured
//! [`MetricDef`] constant so names and label keys cannot drift between the
//! recording site and whatever exporter the embedding application installs.
//! The `metrics` crate is re-exported for convenience.
//!
//! # Example
//!
//! ```rust
//! use dted_metrics::{metric_defs, describe_metrics};
//!
//! // Register descriptions once at startup.
//! describe_metrics();
//!
//! // Record through the facade (a no-op until a recorder is installed).
//! metrics::counter!(metric_defs::FRAME_CACHE_HITS.name, "level" => "1").increment(1);
//! ```
//!
//! # Declaring a metric
//!
//! ```rust
//! use dted_metrics::{MetricDef, MetricKind};
//! use metrics::Unit;
//!
//! const TILES: MetricDef = MetricDef::new(MetricKind::Counter, "dted.example.tiles", Unit::Count)
//!     .help("Tiles drawn by the example")
//!     .labelled(&["level"]);
//!
//! assert!(TILES.has_label("level"));
//! TILES.describe();
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name, kind, unit and label keys of one recorded metric.
#[derive(Debug, Clone)]
pub struct MetricDef {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricDef {
    pub const fn new(kind: MetricKind, name: &'static str, unit: Unit) -> Self {
        Self {
            name,
            kind,
            unit,
            help: "",
            labels: &[],
        }
    }

    pub const fn help(self, help: &'static str) -> Self {
        Self { help, ..self }
    }

    pub const fn labelled(self, labels: &'static [&'static str]) -> Self {
        Self { labels, ..self }
    }

    /// Whether `key` is one of the label keys recorded with this metric.
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains(&key)
    }

    /// Register the unit and help text with the installed recorder.
    pub fn describe(&self) {
        let (name, unit, help) = (self.name, self.unit, self.help);
        match self.kind {
            MetricKind::Counter => describe_counter!(name, unit, help),
            MetricKind::Gauge => describe_gauge!(name, unit, help),
            MetricKind::Histogram => describe_histogram!(name, unit, help),
        }
    }
}

/// All metrics recorded by the DTED core.
pub mod metric_defs {
    use super::MetricDef;
    use super::MetricKind::{Counter, Gauge, Histogram};
    use metrics::Unit;

    /// Label carrying the DTED level (`"0"`, `"1"`, `"2"`).
    pub const LEVEL_LABELS: &[&str] = &["level"];

    // frame cache

    pub const FRAME_CACHE_HITS: MetricDef = MetricDef::new(Counter, "dted.cache.hits", Unit::Count)
        .help("Frame lookups answered by a retained frame")
        .labelled(LEVEL_LABELS);
    pub const FRAME_CACHE_MISSES: MetricDef = MetricDef::new(Counter, "dted.cache.misses", Unit::Count)
        .help("Frame lookups that had to open and parse a frame file")
        .labelled(LEVEL_LABELS);
    pub const FRAME_CACHE_OVERFLOW: MetricDef = MetricDef::new(Counter, "dted.cache.overflow_loads", Unit::Count)
        .help("Frames loaded while every slot was taken");
    pub const FRAME_CACHE_RESIZES: MetricDef = MetricDef::new(Counter, "dted.cache.resizes", Unit::Count)
        .help("Cache resizes, labelled destructive or passive")
        .labelled(&["kind"]);
    pub const FRAME_CACHE_FRAMES: MetricDef =
        MetricDef::new(Gauge, "dted.cache.frames", Unit::Count).help("Frames currently retained by the cache");

    // grid reader

    pub const COLUMN_READS: MetricDef =
        MetricDef::new(Counter, "dted.reader.column_reads", Unit::Count).help("Longitude columns read from frame files");
    pub const COLUMN_READ_FAILURES: MetricDef = MetricDef::new(Counter, "dted.reader.column_read_failures", Unit::Count)
        .help("Longitude column reads that failed and left the column empty");
    pub const CHECKSUM_MISMATCHES: MetricDef = MetricDef::new(Counter, "dted.reader.checksum_mismatches", Unit::Count)
        .help("Data records whose stored checksum did not match");
    pub const FILE_REOPENS: MetricDef = MetricDef::new(Counter, "dted.reader.file_reopens", Unit::Count)
        .help("Frame files reopened after their handle was released");

    // shading

    pub const SUBFRAME_RENDERS: MetricDef = MetricDef::new(Counter, "dted.shading.renders", Unit::Count)
        .help("Subframe images computed by the shading pipeline")
        .labelled(&["mode"]);
    pub const SUBFRAME_CACHE_HITS: MetricDef = MetricDef::new(Counter, "dted.shading.cache_hits", Unit::Count)
        .help("Subframe requests answered from the render cache");
    pub const SUBFRAME_RENDER_TIME: MetricDef =
        MetricDef::new(Histogram, "dted.shading.render_time_us", Unit::Microseconds)
            .help("Wall-clock time to shade one subframe in microseconds")
            .labelled(&["mode"]);

    pub const ALL: &[&MetricDef] = &[
        &FRAME_CACHE_HITS,
        &FRAME_CACHE_MISSES,
        &FRAME_CACHE_OVERFLOW,
        &FRAME_CACHE_RESIZES,
        &FRAME_CACHE_FRAMES,
        &COLUMN_READS,
        &COLUMN_READ_FAILURES,
        &CHECKSUM_MISMATCHES,
        &FILE_REOPENS,
        &SUBFRAME_RENDERS,
        &SUBFRAME_CACHE_HITS,
        &SUBFRAME_RENDER_TIME,
    ];
}

/// Describe all metrics with the installed recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Installs a Prometheus recorder listening on the given address and
/// describes all metrics.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len(), "duplicate metric name");
    }

    #[test]
    fn test_metric_names_are_namespaced() {
        for metric in metric_defs::ALL {
            assert!(metric.name.starts_with("dted."), "{} is not namespaced", metric.name);
            assert!(!metric.help.is_empty(), "{} has no help text", metric.name);
        }
    }

    #[test]
    fn test_recorded_label_keys_are_declared() {
        // label keys used at the recording sites in dted-cache
        assert!(metric_defs::FRAME_CACHE_HITS.has_label("level"));
        assert!(metric_defs::FRAME_CACHE_MISSES.has_label("level"));
        assert!(metric_defs::FRAME_CACHE_RESIZES.has_label("kind"));
        assert!(metric_defs::SUBFRAME_RENDERS.has_label("mode"));
        assert!(metric_defs::SUBFRAME_RENDER_TIME.has_label("mode"));
        assert!(!metric_defs::FRAME_CACHE_FRAMES.has_label("level"));
        assert_eq!(metric_defs::SUBFRAME_RENDER_TIME.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::SUBFRAME_RENDER_TIME.unit, Unit::Microseconds);
    }

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_metrics();
    }
}
