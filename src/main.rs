mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tabflow_registry::SavedState;

/// tabflow - keeps derived datasets in sync with their sources
#[derive(Parser)]
#[command(name = "tabflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tabflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Replay a scenario against an in-memory host
  Replay {
    /// Path to the scenario file (JSON)
    scenario_file: PathBuf,
  },

  /// Print the dependency buckets of a save-state blob
  Inspect {
    /// Path to the save-state file (JSON)
    state_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tabflow=info".into()))
    .with(fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tabflow"),
  };

  match cli.command {
    Some(Commands::Replay { scenario_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_replay(scenario_file, data_dir).await })?;
    }
    Some(Commands::Inspect { state_file }) => {
      inspect(state_file)?;
    }
    None => {
      println!("tabflow - use --help to see available commands");
    }
  }

  Ok(())
}

async fn run_replay(scenario_file: PathBuf, data_dir: PathBuf) -> Result<()> {
  let scenario = scenario::load(&scenario_file).await?;

  eprintln!(
    "Loaded scenario: {} datasets, {} transformations, {} edits",
    scenario.datasets.len(),
    scenario.transformations.len(),
    scenario.edits.len()
  );

  let outcome = scenario::replay(scenario).await.context("replay failed")?;

  let saved = scenario::save(&data_dir, &outcome.saved_state).await?;
  eprintln!("Saved state: {}", saved.display());

  println!("{}", serde_json::to_string_pretty(&outcome)?);

  Ok(())
}

fn inspect(state_file: PathBuf) -> Result<()> {
  let content = std::fs::read_to_string(&state_file)
    .with_context(|| format!("failed to read state file: {}", state_file.display()))?;
  let blob: serde_json::Value = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse state file: {}", state_file.display()))?;

  let (registry, edited) = SavedState::decode(blob)
    .context("invalid save state")?
    .restore();

  let output = serde_json::json!({
    "buckets": registry.diagram(),
    "editedOutputs": edited,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}
