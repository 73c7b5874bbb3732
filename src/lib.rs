// Herd Census - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod catalog;    // Canonical buckets + versioned release catalog
pub mod loader;     // Delimited extract reader (encoding, delimiter, raw rows)
pub mod normalizer; // Locale-aware numeric cleaning
pub mod schema;     // Header → bucket resolution
pub mod holding;    // HoldingRecord + Population
pub mod geo;        // Coordinate validation
pub mod aggregate;  // Totals, ranking, pyramid
pub mod anomaly;    // Zero-count holdings
pub mod pipeline;   // Stage composition + analytics views
pub mod cache;      // Fingerprinted extract cache
pub mod report;     // Presentation boundary (sign flip, text report)
pub mod config;
pub mod logging;
pub mod db;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use catalog::{
    AgeBracket, Bucket, Sex,
    BucketAliases, IdentityColumns, ReleaseCatalog, ReleaseSchema,
};
pub use loader::{ExtractSource, LoadOptions, RawHeader, RawRecord, TextEncoding};
pub use normalizer::{normalize_coordinate, normalize_count, normalize_record, NormalizedRecord};
pub use schema::{ResolvedSchema, SchemaResolver, UnresolvedBucketWarning, UnresolvedReason};
pub use holding::{BucketCount, HoldingIdentity, HoldingRecord, Population};
pub use geo::{DroppedRecord, GeoOutcome, GeoPredicate, GeoValidator};
pub use aggregate::{
    municipality_totals, pyramid, rank_municipalities, summarize,
    MunicipalityAggregate, PyramidEntry, PyramidTable, Summary, DEFAULT_TOP_N,
};
pub use anomaly::{AnomalyDetector, AnomalyReason, AnomalyRecord, AnomalyReport};
pub use pipeline::{analyze, AnalyticsView, CleanedExtract, MunicipalitySelection, Pipeline};
pub use cache::{fingerprint, CacheStats, ExtractCache};
pub use report::{anomaly_table, diverging_rows, AnomalyRow, DashboardReport, PyramidRow};
pub use config::PipelineConfig;
pub use db::{
    Event, ExtractRow, StoredExtract,
    setup_database, insert_extract, load_extract, list_extracts,
    insert_event, get_events_for_extract,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
