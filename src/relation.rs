//! One-to-many assembly of consecutive rows sharing relation key values.
//!
//! The engine keeps one pending row. A new row whose key values equal the
//! pending row's has its collection elements moved into the pending row and
//! is dropped; any other row displaces the pending row, which is then handed
//! to the table.

use std::{any::Any, sync::Arc};

use itertools::Itertools;
use log::debug;

use crate::{
    class::{ClassDef, Instance, NestedDef},
    data::Value,
    error::{CompileError, InvokeError},
    fill::FieldPath,
};

#[derive(Debug, Clone)]
pub struct RelationGroup {
    keys: Vec<FieldPath>,
    collections: Vec<Arc<NestedDef>>,
}

/// The row waiting for its possible continuation rows.
pub struct PendingRow {
    pub row: Instance,
    pub keys: Vec<Value>,
    pub row_no: u64,
}

impl RelationGroup {
    /// Resolves comma separated key names against `row`. Returns `None`
    /// when no keys are named or the row class has no collections.
    pub fn compile(keys: &str, row: &Arc<ClassDef>) -> Result<Option<Self>, CompileError> {
        let keys = keys
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| FieldPath::resolve(row, key))
            .collect::<Result<Vec<_>, _>>()?;
        let collections = row.collections().cloned().collect::<Vec<_>>();
        if keys.is_empty() || collections.is_empty() {
            debug!(
                "No relation grouping for {} ({} key(s), {} collection(s))",
                row.name(),
                keys.len(),
                collections.len()
            );
            return Ok(None);
        }
        debug!(
            "Relation grouping for {} on [{}] across {} collection(s)",
            row.name(),
            keys.iter().map(FieldPath::path).join(", "),
            collections.len()
        );
        Ok(Some(Self { keys, collections }))
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn key_values(&self, row: &dyn Any) -> Result<Vec<Value>, InvokeError> {
        self.keys.iter().map(|key| key.read(row)).collect()
    }

    /// Moves every collection element of `row` into `pending`.
    pub fn merge(&self, pending: &mut dyn Any, row: &mut dyn Any) -> Result<(), InvokeError> {
        for collection in &self.collections {
            let elements = collection.take_elements(row);
            collection.absorb_elements(pending, elements)?;
        }
        Ok(())
    }

    /// Folds `row` into the pending slot. Returns the displaced pending row
    /// when `row` starts a new group.
    pub fn fold(
        &self,
        pending: &mut Option<PendingRow>,
        mut row: Instance,
        row_no: u64,
    ) -> Result<Option<PendingRow>, InvokeError> {
        let keys = self.key_values(&*row)?;
        if let Some(current) = pending.as_mut()
            && current.keys == keys
        {
            self.merge(&mut *current.row, &mut *row)?;
            return Ok(None);
        }
        Ok(pending.replace(PendingRow { row, keys, row_no }))
    }
}
