//! Turns flat query results into records, filling nested collections.
//!
//! A plan with multisets runs one query for the outer rows and one per
//! multiset. Nested rows are grouped by their correlation key and handed to
//! the outer rows with an equal key; an outer row whose key is `NULL` gets an
//! empty collection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::database::ColumnLabel;
use crate::error::{Result, ShapeMismatch};
use crate::executor::Executor;
use crate::query::{QueryPlan, Slot};
use crate::record::{Cell, FromRow, Record};
use crate::value::Value;

/// Runs `plan` and assembles its records.
pub fn fetch_records<E: Executor + ?Sized>(executor: &mut E, plan: &QueryPlan) -> Result<Vec<Record>> {
    Ok(load(executor, plan, None)?.into_iter().map(|(_, record)| record).collect())
}

/// Converts records into rows of `R`.
pub fn map_rows<R: FromRow>(records: Vec<Record>) -> std::result::Result<Vec<R>, ShapeMismatch> {
    records.into_iter().map(R::from_row).collect()
}

/// Loads the records of `plan` with their correlation keys, restricted to
/// `keys` when given.
fn load<E: Executor + ?Sized>(
    executor: &mut E,
    plan: &QueryPlan,
    keys: Option<Vec<Value>>,
) -> Result<Vec<(Vec<Value>, Record)>> {
    let sql = match keys {
        Some(keys) => plan.restricted_sql(keys),
        None => plan.sql(),
    };
    let result = executor.run_query(&sql)?;
    if result.columns.len() != plan.width() {
        return Err(ShapeMismatch::Arity {
            expected: plan.width(),
            found: result.columns.len(),
        }
        .into());
    }

    let mut nested = Vec::with_capacity(plan.multisets().len());
    for multiset in plan.multisets() {
        nested.push(load_nested(executor, multiset, &result.rows)?);
    }

    let labels: Arc<[ColumnLabel]> = plan.labels().into();
    let key_len = plan.key_len();
    let records = result
        .rows
        .into_iter()
        .map(|row| {
            let cells = plan
                .slots()
                .iter()
                .map(|slot| match *slot {
                    Slot::Column(i) => Cell::Value(row[i].clone()),
                    Slot::Multiset(m) => {
                        let outer_key = key_of(&row, &plan.multisets()[m].outer_keys);
                        let records = outer_key
                            .and_then(|key| nested[m].get(&key))
                            .cloned()
                            .unwrap_or_default();
                        Cell::Multiset(records)
                    }
                })
                .collect();
            let key = row[..key_len].to_vec();
            (key, Record::new(Arc::clone(&labels), cells))
        })
        .collect();
    Ok(records)
}

/// The key at `positions`, or `None` when part of it is `NULL`.
fn key_of(row: &[Value], positions: &[usize]) -> Option<Vec<Value>> {
    let key: Vec<Value> = positions.iter().map(|&i| row[i].clone()).collect();
    (!key.iter().any(Value::is_null)).then_some(key)
}

fn load_nested<E: Executor + ?Sized>(
    executor: &mut E,
    multiset: &crate::query::MultisetPlan,
    outer_rows: &[Vec<Value>],
) -> Result<HashMap<Vec<Value>, Vec<Record>>> {
    let restriction = match multiset.outer_keys.as_slice() {
        [position] => {
            let mut seen = HashSet::new();
            let distinct: Vec<Value> = outer_rows
                .iter()
                .map(|row| &row[*position])
                .filter(|value| !value.is_null() && seen.insert(*value))
                .cloned()
                .collect();
            if distinct.is_empty() {
                debug!("no outer row has a key, nested query skipped");
                return Ok(HashMap::new());
            }
            Some(distinct)
        }
        _ => None,
    };

    let mut groups: HashMap<Vec<Value>, Vec<Record>> = HashMap::new();
    for (key, record) in load(executor, &multiset.plan, restriction)? {
        if key.iter().any(Value::is_null) {
            continue;
        }
        let group = groups.entry(key).or_default();
        if multiset.limit.is_none_or(|limit| group.len() < limit) {
            group.push(record);
        }
    }
    debug!(groups = groups.len(), "nested rows grouped");
    Ok(groups)
}
