//! Replayable scenarios for the in-memory host.
//!
//! A scenario file seeds datasets, applies transformations and then plays
//! host edits one at a time, letting propagation settle after each:
//!
//! ```json
//! {
//!   "config": { "deletion_policy": "freeze" },
//!   "datasets": [ { "schema": { "name": "Sales", ... }, "rows": [ ... ] } ],
//!   "transformations": [ { "transformer": "Mean", "state": { ... } } ],
//!   "edits": [ { "op": "updateRows", "context": "Sales", "rows": [ ... ] } ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use tabflow_dataset::{Attribute, DataSet, Row, RowId};
use tabflow_engine::{ApplyRequest, EngineConfig, NotificationRunner, SequentialIds, TransformEngine};
use tabflow_host::{MemoryHost, TextComponent};

/// File name of the save-state blob inside the data directory.
pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
  pub config: EngineConfig,
  pub datasets: Vec<DataSet>,
  pub transformations: Vec<ApplyRequest>,
  pub edits: Vec<Edit>,
}

/// An edit made by a person in the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Edit {
  CreateRows {
    context: String,
    rows: Vec<Map<String, Value>>,
  },
  UpdateRows {
    context: String,
    rows: Vec<Row>,
  },
  DeleteRows {
    context: String,
    ids: Vec<RowId>,
  },
  CreateAttribute {
    context: String,
    attribute: Attribute,
  },
  RenameContext {
    context: String,
    title: String,
  },
  RemoveContext {
    context: String,
  },
  RemoveText {
    text: String,
  },
}

impl Edit {
  fn play(&self, host: &MemoryHost) -> Result<()> {
    match self {
      Edit::CreateRows { context, rows } => host.create_rows(context, rows.clone()).map(|_| ())?,
      Edit::UpdateRows { context, rows } => host.update_rows(context, rows.clone())?,
      Edit::DeleteRows { context, ids } => host.delete_rows(context, ids)?,
      Edit::CreateAttribute { context, attribute } => {
        host.create_attribute(context, attribute.clone())?
      }
      Edit::RenameContext { context, title } => host.rename_context(context, title)?,
      Edit::RemoveContext { context } => host.remove_context(context)?,
      Edit::RemoveText { text } => host.remove_text(text)?,
    }
    Ok(())
  }
}

/// Host contents and outstanding errors after a replay.
#[derive(Debug, Serialize)]
pub struct Outcome {
  pub datasets: BTreeMap<String, DataSet>,
  pub texts: BTreeMap<String, TextComponent>,
  pub errors: BTreeMap<String, String>,
  pub transformations: Value,
  #[serde(skip)]
  pub saved_state: Value,
}

pub async fn load(path: &Path) -> Result<Scenario> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse scenario file: {}", path.display()))
}

pub async fn replay(scenario: Scenario) -> Result<Outcome> {
  let host = Arc::new(MemoryHost::new());
  for dataset in scenario.datasets {
    host.seed_context(dataset);
  }

  let engine = Arc::new(
    TransformEngine::builder(host.clone())
      .config(scenario.config)
      .ids(Arc::new(SequentialIds::new()))
      .build(),
  );
  let mut runner = NotificationRunner::new(engine.clone());
  host.connect(runner.sender());

  for request in scenario.transformations {
    let name = request.transformer.clone();
    let description = engine
      .apply(request)
      .await
      .with_context(|| format!("failed to apply '{}'", name))?;
    info!(id = %description.id, transformer = %name, "applied transformation");
  }

  for (index, edit) in scenario.edits.iter().enumerate() {
    edit
      .play(&host)
      .with_context(|| format!("edit #{} could not be played", index + 1))?;
    let processed = runner.settle().await;
    info!(edit = index + 1, processed, "edit settled");
  }

  Ok(Outcome {
    datasets: host.contexts(),
    texts: host.texts(),
    errors: engine.errors().all(),
    transformations: engine.store().registry().diagram(),
    saved_state: engine.save_state(),
  })
}

/// Write the save-state blob into `data_dir`. Returns the file written.
pub async fn save(data_dir: &Path, state: &Value) -> Result<std::path::PathBuf> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let path = data_dir.join(STATE_FILE);
  tokio::fs::write(&path, serde_json::to_string_pretty(state)?)
    .await
    .with_context(|| format!("failed to write save state: {}", path.display()))?;
  Ok(path)
}
