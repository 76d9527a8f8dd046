//! Property test: after any sequence of host mutations and their
//! notifications, every cache hit equals what the host currently holds.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tabflow_cache::ResultCache;
use tabflow_dataset::{Attribute, ContextSchema, Row, RowId};
use tabflow_host::{ChangeOrigin, ContextChange, HostNotification};

const CONTEXTS: [&str; 2] = ["A", "B"];

/// What the host actually holds.
struct Truth {
  contexts: BTreeMap<String, (ContextSchema, Vec<Row>)>,
  next_row: RowId,
  stamp: u64,
}

impl Truth {
  fn new() -> Self {
    let mut truth = Self {
      contexts: BTreeMap::new(),
      next_row: 0,
      stamp: 0,
    };
    for name in CONTEXTS {
      let rows = (0..3).map(|_| truth.new_row()).collect();
      truth.contexts.insert(
        name.to_string(),
        (ContextSchema::flat(name, &["v"]), rows),
      );
    }
    truth
  }

  fn tick(&mut self) -> u64 {
    self.stamp += 1;
    self.stamp
  }

  fn new_row(&mut self) -> Row {
    self.next_row += 1;
    let stamp = self.tick();
    let mut values = Map::new();
    values.insert("v".to_string(), json!(stamp));
    Row::new(self.next_row, values)
  }
}

#[derive(Debug, Clone)]
enum Op {
  /// Read a context through the cache, filling it on a miss.
  Read(usize),
  /// Read a single row through the cache.
  ReadRow(usize, usize),
  UpdateSome(usize, usize),
  UpdateUnspecified(usize),
  Create(usize),
  DeleteSome(usize, usize),
  Move(usize),
  AddAttribute(usize),
  RenameCollection(usize),
  Describe(usize),
  DeleteContext(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
  let ctx = 0..CONTEXTS.len();
  prop_oneof![
    3 => ctx.clone().prop_map(Op::Read),
    2 => (ctx.clone(), 0..4usize).prop_map(|(c, r)| Op::ReadRow(c, r)),
    1 => (ctx.clone(), 0..4usize).prop_map(|(c, r)| Op::UpdateSome(c, r)),
    1 => ctx.clone().prop_map(Op::UpdateUnspecified),
    1 => ctx.clone().prop_map(Op::Create),
    1 => (ctx.clone(), 0..4usize).prop_map(|(c, r)| Op::DeleteSome(c, r)),
    1 => ctx.clone().prop_map(Op::Move),
    1 => ctx.clone().prop_map(Op::AddAttribute),
    1 => ctx.clone().prop_map(Op::RenameCollection),
    1 => ctx.clone().prop_map(Op::Describe),
    1 => ctx.prop_map(Op::DeleteContext),
  ]
}

fn changed(context: &str, change: ContextChange) -> HostNotification {
  HostNotification::ContextChanged {
    context: context.to_string(),
    change,
    origin: ChangeOrigin::Unknown,
  }
}

/// Mutate the truth and return the notification the host would send.
fn mutate(truth: &mut Truth, op: &Op) -> Option<HostNotification> {
  let name = match op {
    Op::Read(_) | Op::ReadRow(_, _) => return None,
    Op::UpdateSome(c, _)
    | Op::UpdateUnspecified(c)
    | Op::Create(c)
    | Op::DeleteSome(c, _)
    | Op::Move(c)
    | Op::AddAttribute(c)
    | Op::RenameCollection(c)
    | Op::Describe(c)
    | Op::DeleteContext(c) => CONTEXTS[*c].to_string(),
  };

  if !truth.contexts.contains_key(&name) {
    return None;
  }

  match op {
    Op::UpdateSome(_, r) => {
      let stamp = truth.tick();
      let (_, rows) = truth.contexts.get_mut(&name)?;
      let row = rows.get_mut(*r)?;
      row.values.insert("v".to_string(), json!(stamp));
      Some(changed(
        &name,
        ContextChange::UpdateCases {
          ids: Some(vec![row.id]),
        },
      ))
    }
    Op::UpdateUnspecified(_) => {
      let stamp = truth.tick();
      let (_, rows) = truth.contexts.get_mut(&name)?;
      for row in rows.iter_mut() {
        row.values.insert("v".to_string(), json!(stamp));
      }
      Some(changed(&name, ContextChange::UpdateCases { ids: None }))
    }
    Op::Create(_) => {
      let row = truth.new_row();
      let id = row.id;
      truth.contexts.get_mut(&name)?.1.push(row);
      Some(changed(&name, ContextChange::CreateCases { ids: vec![id] }))
    }
    Op::DeleteSome(_, r) => {
      let (_, rows) = truth.contexts.get_mut(&name)?;
      if *r >= rows.len() {
        return None;
      }
      let removed = rows.remove(*r);
      Some(changed(
        &name,
        ContextChange::DeleteCases {
          ids: Some(vec![removed.id]),
        },
      ))
    }
    Op::Move(_) => {
      truth.contexts.get_mut(&name)?.1.reverse();
      Some(changed(&name, ContextChange::MoveCases))
    }
    Op::AddAttribute(_) => {
      let stamp = truth.tick();
      let attribute = format!("a{}", stamp);
      let (schema, rows) = truth.contexts.get_mut(&name)?;
      schema.collections[0]
        .attributes
        .push(Attribute::new(attribute.clone()));
      for row in rows.iter_mut() {
        row.values.insert(attribute.clone(), Value::Null);
      }
      Some(changed(&name, ContextChange::CreateAttributes))
    }
    Op::RenameCollection(_) => {
      let stamp = truth.tick();
      let (schema, _) = truth.contexts.get_mut(&name)?;
      schema.collections[0].title = Some(format!("c{}", stamp));
      Some(changed(&name, ContextChange::UpdateCollection))
    }
    Op::Describe(_) => {
      let stamp = truth.tick();
      let (schema, _) = truth.contexts.get_mut(&name)?;
      schema.description = format!("d{}", stamp);
      Some(changed(&name, ContextChange::UpdateDataContext))
    }
    Op::DeleteContext(_) => {
      truth.contexts.remove(&name);
      Some(HostNotification::ContextDeleted { context: name })
    }
    Op::Read(_) | Op::ReadRow(_, _) => None,
  }
}

/// Read-through as the cached host does it.
fn read(cache: &ResultCache, truth: &Truth, op: &Op) {
  match op {
    Op::Read(c) => {
      let name = CONTEXTS[*c];
      if let Some((schema, rows)) = truth.contexts.get(name) {
        if cache.get_schema(name).is_none() || cache.get_rows(name).is_none() {
          let generation = cache.generation(name);
          cache.fill(name, generation, schema.clone(), rows.clone());
        }
      }
    }
    Op::ReadRow(c, r) => {
      let name = CONTEXTS[*c];
      if let Some((_, rows)) = truth.contexts.get(name) {
        if let Some(row) = rows.get(*r) {
          if cache.get_row(name, row.id).is_none() {
            let generation = cache.generation(name);
            cache.fill_row(name, generation, row.clone());
          }
        }
      }
    }
    _ => {}
  }
}

fn assert_no_stale_hits(cache: &ResultCache, truth: &Truth) -> Result<(), TestCaseError> {
  for name in CONTEXTS {
    match truth.contexts.get(name) {
      Some((schema, rows)) => {
        if let Some(cached) = cache.get_schema(name) {
          prop_assert_eq!(&cached, schema);
        }
        if let Some(cached) = cache.get_rows(name) {
          prop_assert_eq!(&cached, rows);
        }
        for row in rows {
          if let Some(cached) = cache.get_row(name, row.id) {
            prop_assert_eq!(&cached, row);
          }
        }
      }
      None => {
        prop_assert!(cache.get_schema(name).is_none());
        prop_assert!(cache.get_rows(name).is_none());
      }
    }
  }
  // Rows deleted from the host must never be served
  for id in 1..=truth.next_row {
    let live = truth
      .contexts
      .values()
      .any(|(_, rows)| rows.iter().any(|r| r.id == id));
    if !live {
      for name in CONTEXTS {
        prop_assert!(cache.get_row(name, id).is_none(), "deleted row {} still cached", id);
      }
    }
  }
  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

  #[test]
  fn cache_never_serves_stale_entries(ops in proptest::collection::vec(op_strategy(), 1..40)) {
    let cache = ResultCache::new();
    let mut truth = Truth::new();

    for op in &ops {
      read(&cache, &truth, op);
      if let Some(notification) = mutate(&mut truth, op) {
        cache.apply_notification(&notification);
      }
      assert_no_stale_hits(&cache, &truth)?;
    }
  }
}
