// Dump Convert - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod splitter;    // Row Splitter - INSERT text → raw tuples
pub mod schema;      // Schema Decoder - fixed per-version field catalogs
pub mod entities;    // Typed records + registries
pub mod enrichment;  // Enrichment Engine - owners, categories, contacts, expiries, keys
pub mod export;      // Export Assembler - Legacy / Final shapes
pub mod pipeline;    // End-to-end conversion + report
pub mod db;          // Relational sink (SQLite)
pub mod backup;      // SQL text backup of the sink
pub mod config;      // Environment settings + tracing bootstrap

#[cfg(feature = "server")]
pub mod queue;       // Single-worker job queue

// Re-export commonly used types
pub use splitter::{split_dump, split_fields, split_tuples, RawRow, RowSplitter, SplitStats};
pub use schema::{decode_rows, DecodedRow, DecodedTables, SchemaVersion, TableKind, TableSchema};
pub use entities::{
    Assignment, Category, CategoryRegistry, DumpTables, EndUser, Reseller, ResellerRegistry,
};
pub use enrichment::{
    enrich, ContactPolicy, ContactRule, Enriched, EnrichmentEngine, EnrichmentStats,
    ExpirySource, NormalizedExpiry,
};
pub use export::{get_shape, ExportShape, FinalSnapshot, LegacySnapshot, ShapeKind, Snapshot};
pub use pipeline::{
    convert_and_load, convert_file, convert_str, seeded_rng, Conversion, ConversionReport,
    LoadOutcome,
};
pub use db::{load_snapshot, setup_database, LoadStats};
pub use backup::{backup_path_for, dump_database};
pub use config::{init_tracing, Settings};

#[cfg(feature = "server")]
pub use queue::{JobQueue, JobResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
