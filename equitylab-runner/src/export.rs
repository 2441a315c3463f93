//! Reporting and export — JSON and CSV artifacts for saved simulations.
//!
//! - **JSON**: a full `HistoryItem` with a `schemaVersion` field; newer
//!   versions are rejected on import
//! - **CSV**: long-format sample paths and a two-column summary table

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use equitylab_core::PathResult;

use crate::history::HistoryItem;
use crate::summary::SimulationSummary;

/// Version stamped into exported JSON.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionedItem {
    schema_version: u32,
    #[serde(flatten)]
    item: HistoryItem,
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `HistoryItem` to pretty JSON with `schemaVersion`.
pub fn export_summary_json(item: &HistoryItem) -> Result<String> {
    let versioned = VersionedItem {
        schema_version: SCHEMA_VERSION,
        item: item.clone(),
    };
    serde_json::to_string_pretty(&versioned).context("failed to serialize HistoryItem to JSON")
}

/// Deserialize a `HistoryItem`, rejecting unknown schema versions.
pub fn import_summary_json(json: &str) -> Result<HistoryItem> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("failed to parse exported JSON")?;
    let version = value
        .get("schemaVersion")
        .and_then(serde_json::Value::as_u64)
        .context("exported JSON has no schemaVersion")?;
    if version > u64::from(SCHEMA_VERSION) {
        bail!(
            "unsupported schema version {} (max supported: {})",
            version,
            SCHEMA_VERSION
        );
    }
    let versioned: VersionedItem =
        serde_json::from_value(value).context("failed to deserialize HistoryItem from JSON")?;
    Ok(versioned.item)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export sample paths as long-format CSV.
///
/// Columns: run, trade, equity, return. Trade 0 is the starting equity and
/// has an empty return.
pub fn export_paths_csv(runs: &[PathResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["run", "trade", "equity", "return"])?;

    for (run, path) in runs.iter().enumerate() {
        for (trade, equity) in path.equity_series.iter().enumerate() {
            let ret = match trade.checked_sub(1) {
                Some(i) => format!("{:.6}", path.returns_per_trade[i]),
                None => String::new(),
            };
            wtr.write_record([
                &run.to_string(),
                &trade.to_string(),
                &format!("{:.2}", equity),
                &ret,
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export summary statistics as `metric,value` rows, metrics in name order.
pub fn export_summary_csv(summary: &SimulationSummary) -> Result<String> {
    let value = serde_json::to_value(summary).context("failed to serialize summary")?;
    let Some(fields) = value.as_object() else {
        bail!("summary did not serialize to an object");
    };

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["metric", "value"])?;
    for (metric, value) in fields {
        wtr.write_record([metric.as_str(), &value.to_string()])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one history item.
///
/// Creates `{id}/` under `output_dir` containing:
/// - `item.json` — the versioned `HistoryItem`
/// - `summary.csv` — metric/value table
/// - `paths.csv` — sample paths (only when the item kept any)
///
/// Returns the path to the created directory.
pub fn save_artifacts(item: &HistoryItem, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&item.id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_summary_json(item)?;
    std::fs::write(run_dir.join("item.json"), &json)?;

    let summary_csv = export_summary_csv(&item.summary)?;
    std::fs::write(run_dir.join("summary.csv"), &summary_csv)?;

    if let Some(runs) = item.sample_runs.as_deref().filter(|r| !r.is_empty()) {
        let paths_csv = export_paths_csv(runs)?;
        std::fs::write(run_dir.join("paths.csv"), &paths_csv)?;
    }

    tracing::info!(id = %item.id, dir = %run_dir.display(), "exported artifacts");
    Ok(run_dir)
}
