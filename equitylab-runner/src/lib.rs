//! EquityLab Runner — simulation orchestration, summaries, history, export.
//!
//! This crate builds on `equitylab-core` to provide:
//! - Summary aggregation over a run set (percentiles, ruin, risk/reward ratios)
//! - Synchronous engine with progress reporting and cooperative cancel
//! - Background worker handle (submit / progress / cancel / result)
//! - History store over a pluggable keyed object store
//! - JSON and CSV artifact export

pub mod engine;
pub mod export;
pub mod history;
pub mod summary;
pub mod worker;

pub use engine::{
    run_simulation, EngineError, EngineOptions, ExecutionMode, SimulationEngine, SimulationReport,
};
pub use export::{
    export_paths_csv, export_summary_csv, export_summary_json, import_summary_json,
    save_artifacts, SCHEMA_VERSION,
};
pub use history::{
    BackupSink, HistoryItem, HistoryStore, JsonDirStore, KeyValueStore, MemoryStore,
    StorageError, StoredConfig,
};
pub use summary::{
    summarize, PathDigest, SimulationSummary, SummaryAccumulator, PROFIT_FACTOR_CAP,
};
pub use worker::{EngineMessage, SimulationHandle};
