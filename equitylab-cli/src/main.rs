//! EquityLab CLI — run Monte Carlo equity simulations and manage their history.
//!
//! Commands:
//! - `run` — simulate from a TOML config file, print the summary, save to history
//! - `history list` — saved simulations, newest first
//! - `history show <id>` — one saved simulation as JSON
//! - `history delete <id>` — remove a saved simulation
//! - `history export <id> --out DIR` — write JSON and CSV artifacts

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use equitylab_core::SimulationConfig;
use equitylab_runner::{
    export_summary_json, save_artifacts, EngineOptions, ExecutionMode, HistoryStore,
    JsonDirStore, SimulationEngine, SimulationReport, SimulationSummary,
};

#[derive(Parser)]
#[command(
    name = "equitylab",
    about = "EquityLab CLI — Monte Carlo equity curve simulator"
)]
struct Cli {
    /// History directory. Defaults to the platform data dir.
    #[arg(long, global = true, env = "EQUITYLAB_HISTORY_DIR")]
    history_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML config file.
    Run {
        /// Path to a TOML simulation config.
        #[arg(long)]
        config: PathBuf,

        /// Override the number of simulated paths.
        #[arg(long)]
        simulations: Option<usize>,

        /// Override the master seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads. Omit for sequential execution.
        #[arg(long)]
        threads: Option<usize>,

        /// Do not save the result to history.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Saved simulation management.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved simulations, newest first.
    List,
    /// Print one saved simulation as JSON.
    Show { id: String },
    /// Delete a saved simulation.
    Delete { id: String },
    /// Export JSON and CSV artifacts for a saved simulation.
    Export {
        id: String,

        /// Output directory.
        #[arg(long, default_value = "exports")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let history_dir = resolve_history_dir(cli.history_dir);

    match cli.command {
        Commands::Run {
            config,
            simulations,
            seed,
            threads,
            no_save,
        } => run_simulation_cmd(&config, simulations, seed, threads, no_save, &history_dir),
        Commands::History { action } => {
            let history = open_history(&history_dir)?;
            match action {
                HistoryAction::List => run_history_list(&history),
                HistoryAction::Show { id } => run_history_show(&history, &id),
                HistoryAction::Delete { id } => run_history_delete(&history, &id),
                HistoryAction::Export { id, out } => run_history_export(&history, &id, &out),
            }
        }
    }
}

fn resolve_history_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("equitylab").join("history"))
            .unwrap_or_else(|| PathBuf::from("history"))
    })
}

fn open_history(dir: &Path) -> Result<HistoryStore<JsonDirStore>> {
    let store = JsonDirStore::open(dir)
        .with_context(|| format!("failed to open history dir: {}", dir.display()))?;
    Ok(HistoryStore::new(store))
}

/// Apply command-line overrides on top of a file config.
fn apply_overrides(
    mut config: SimulationConfig,
    simulations: Option<usize>,
    seed: Option<u64>,
) -> SimulationConfig {
    if let Some(n) = simulations {
        config.simulations = n;
        // A file-level interval tuned for the old count no longer applies.
        config.progress_interval = None;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    config
}

fn execution_mode(threads: Option<usize>) -> Result<ExecutionMode> {
    match threads {
        None => Ok(ExecutionMode::Sequential),
        Some(0) => bail!("--threads must be at least 1"),
        Some(threads) => Ok(ExecutionMode::Parallel { threads }),
    }
}

fn run_simulation_cmd(
    config_path: &Path,
    simulations: Option<usize>,
    seed: Option<u64>,
    threads: Option<usize>,
    no_save: bool,
    history_dir: &Path,
) -> Result<()> {
    let file_config = SimulationConfig::load(config_path)?;
    let config = apply_overrides(file_config, simulations, seed);
    let engine = SimulationEngine::new(EngineOptions {
        mode: execution_mode(threads)?,
    });

    let mut handle = engine.submit(config.clone())?;
    handle.on_progress(|p| eprint!("\rSimulating... {p:>3}%"));
    let report = handle.result();
    eprintln!();
    let report = report?;

    print_summary(&config, &report);

    if no_save {
        return Ok(());
    }
    let history = open_history(history_dir)?;
    let item = history
        .save_report(&config, &report)
        .context("simulation finished but saving to history failed")?;
    info!(id = %item.id, "saved");
    println!("Saved to history: {}", item.id);
    Ok(())
}

fn run_history_list(history: &HistoryStore<JsonDirStore>) -> Result<()> {
    let items = history.list()?;
    if items.is_empty() {
        println!("No saved simulations in {}.", history.store().dir().display());
        return Ok(());
    }

    println!(
        "{:<22} {:<20} {:>8} {:>14} {:>9}",
        "ID", "Created", "Runs", "Median Final", "P(ruin)"
    );
    println!("{}", "-".repeat(77));
    for item in &items {
        let name = item.config.config.name.as_deref().unwrap_or("");
        println!(
            "{:<22} {:<20} {:>8} {:>14.2} {:>8.1}%  {}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M:%S"),
            item.summary.total_runs,
            item.summary.median_final,
            item.summary.prob_ruin * 100.0,
            name,
        );
    }
    Ok(())
}

fn run_history_show(history: &HistoryStore<JsonDirStore>, id: &str) -> Result<()> {
    let Some(item) = history.get(id)? else {
        bail!("no saved simulation with id '{id}'");
    };
    println!("{}", export_summary_json(&item)?);
    Ok(())
}

fn run_history_delete(history: &HistoryStore<JsonDirStore>, id: &str) -> Result<()> {
    if !history.delete(id)? {
        bail!("no saved simulation with id '{id}'");
    }
    println!("Deleted: {id}");
    Ok(())
}

fn run_history_export(history: &HistoryStore<JsonDirStore>, id: &str, out: &Path) -> Result<()> {
    let Some(item) = history.get(id)? else {
        bail!("no saved simulation with id '{id}'");
    };
    let dir = save_artifacts(&item, out)?;
    println!("Artifacts saved to: {}", dir.display());
    Ok(())
}

fn print_summary(config: &SimulationConfig, report: &SimulationReport) {
    let s: &SimulationSummary = &report.summary;
    println!();
    println!("=== Simulation Result ===");
    if let Some(name) = &config.name {
        println!("Name:           {name}");
    }
    println!(
        "Model:          {}",
        if config.sampler().is_bootstrap() {
            "bootstrap"
        } else {
            "parametric"
        }
    );
    println!("Runs:           {}", s.total_runs);
    println!("Trades/run:     {:.1} avg", s.avg_trades_simulated);
    println!("Seed:           {}", report.master_seed);
    println!("Elapsed:        {:.2}s", report.elapsed_secs);
    println!();
    println!("--- Final Equity ---");
    println!("Mean:           {:.2}", s.avg_final);
    println!("Median:         {:.2}", s.median_final);
    println!("P05 / P95:      {:.2} / {:.2}", s.p05, s.p95);
    println!("P25 / P75:      {:.2} / {:.2}", s.p25, s.p75);
    println!("Min / Max:      {:.2} / {:.2}", s.min_final, s.max_final);
    println!();
    println!("--- Risk ---");
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!("Avg Drawdown:   {:.2}%", s.avg_drawdown * 100.0);
    println!("P(ruin):        {:.2}%", s.prob_ruin * 100.0);
    println!("Skew / Kurt:    {:.3} / {:.3}", s.skewness, s.kurtosis);
    println!();
    println!("--- Reward ---");
    println!("CAGR:           {:.2}%", s.cagr * 100.0);
    println!("Sharpe:         {:.3}", s.sharpe);
    println!("Sortino:        {:.3}", s.sortino);
    println!("Calmar:         {:.3}", s.calmar);
    println!("Profit Factor:  {:.2}", s.profit_factor);
    println!("EV/trade:       {:.2}", s.expected_value);
    println!();
}
