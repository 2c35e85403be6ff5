//! Row iteration: drives result records through the compiled fill plans
//! into a table object.
//!
//! A [`ResultMapper`] holds the mapping configuration and compiles it lazily
//! on the first [`ResultMapper::materialize`] call. Changing any part of the
//! configuration discards the compiled state; the next call recompiles once.
//! The mapper is `Send + Sync` and may be shared through an `Arc`.

use std::{
    any::Any,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};
use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    class::{ClassDef, Instance},
    coerce::CoercionCache,
    data::Value,
    error::{CompileError, InvokeError, MappingError},
    fill::{FillPlan, RowFiller, compile_field_plan, compile_row_filler, compile_table_filler},
    metadata::{NameStyle, TableMetadata},
    record::{Item, Record, scalar_field_name},
    relation::{PendingRow, RelationGroup},
};

pub const DEFAULT_FILL: &str = "add(row)";
pub const DEFAULT_ROW_FILL: &str = "put(colName, colValue)";
const RELATION_FIELD: &str = "<relation keys>";

/// Outcome of mapping one result.
pub struct TableResult {
    pub table: Instance,
    pub row_count: u64,
    pub column_count: usize,
    pub elapsed: Duration,
    pub metadata: TableMetadata,
}

impl TableResult {
    pub fn table_as<T: Any>(&self) -> Option<&T> {
        self.table.downcast_ref::<T>()
    }

    pub fn into_table<T: Any>(self) -> Option<T> {
        self.table.downcast::<T>().ok().map(|table| *table)
    }
}

impl std::fmt::Debug for TableResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableResult")
            .field("row_count", &self.row_count)
            .field("column_count", &self.column_count)
            .field("elapsed", &self.elapsed)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
struct MappingConfig {
    table: Option<Arc<ClassDef>>,
    row: Option<Arc<ClassDef>>,
    fill: Option<String>,
    row_fill: Option<String>,
    name_style: NameStyle,
    relation_keys: Option<String>,
}

struct CompiledMapping {
    table: Arc<ClassDef>,
    row: Arc<ClassDef>,
    table_plan: FillPlan,
    row_filler: RowFiller,
    relation: Option<RelationGroup>,
    field_plans: DashMap<String, Option<Arc<FillPlan>>>,
    coercions: CoercionCache,
    seen_fields: DashSet<String>,
    metadata: Mutex<TableMetadata>,
}

impl CompiledMapping {
    fn compile(config: &MappingConfig) -> Result<Self, CompileError> {
        let table = config
            .table
            .clone()
            .ok_or(CompileError::MissingConfig("a table class"))?;
        let row = config
            .row
            .clone()
            .ok_or(CompileError::MissingConfig("a row class"))?;
        let fill = config.fill.as_deref().unwrap_or(DEFAULT_FILL);
        let row_fill = config.row_fill.as_deref().unwrap_or(DEFAULT_ROW_FILL);
        let table_plan = compile_table_filler(fill, &table, &row)?;
        let row_filler = compile_row_filler(row_fill, &row)?;
        let relation = match config.relation_keys.as_deref() {
            Some(keys) => RelationGroup::compile(keys, &row)?,
            None => None,
        };
        Ok(Self {
            table,
            row,
            table_plan,
            row_filler,
            relation,
            field_plans: DashMap::new(),
            coercions: CoercionCache::new(),
            seen_fields: DashSet::new(),
            metadata: Mutex::new(TableMetadata::new(config.name_style)),
        })
    }

    fn field_plan(&self, field: &str) -> Result<Option<Arc<FillPlan>>, CompileError> {
        if let Some(plan) = self.field_plans.get(field) {
            return Ok(plan.value().clone());
        }
        let entry = self
            .field_plans
            .entry(field.to_string())
            .or_try_insert_with(|| {
                compile_field_plan(field, &self.row).map(|plan| plan.map(Arc::new))
            })?;
        Ok(entry.value().clone())
    }

    fn fill_row(&self, row: &mut dyn Any, record: Record, row_no: u64) -> Result<(), MappingError> {
        for (name, item) in record.into_items() {
            match item {
                Item::Node(properties) => {
                    for (field, value) in properties {
                        self.fill_field(row, &field, value, row_no)?;
                    }
                }
                Item::Scalar(value) => {
                    self.fill_field(row, scalar_field_name(&name), value, row_no)?;
                }
            }
        }
        Ok(())
    }

    fn fill_field(
        &self,
        row: &mut dyn Any,
        field: &str,
        value: Value,
        row_no: u64,
    ) -> Result<(), MappingError> {
        self.observe(field);
        let wrap = |source: InvokeError| MappingError::Row {
            row: row_no,
            field: field.to_string(),
            source,
        };
        match &self.row_filler {
            RowFiller::Fixed(plan) => plan.invoke_row(row, field, &value).map_err(wrap),
            RowFiller::PerField => {
                let Some(plan) = self.field_plan(field)? else {
                    return Ok(());
                };
                let value = self
                    .coercions
                    .coerce(field, value, plan.target_kind())
                    .map_err(|err| wrap(err.into()))?;
                plan.invoke_field(row, value).map_err(wrap)
            }
        }
    }

    /// Records `field` in the metadata the first time any record carries it.
    fn observe(&self, field: &str) {
        if self.seen_fields.contains(field) {
            return;
        }
        if self.seen_fields.insert(field.to_string()) {
            self.metadata.lock().add_column(field);
        }
    }

    /// Hands `row` to the table as its `added`-th row; `row_no` is the record
    /// ordinal the row came from and only used for error reporting.
    fn append(
        &self,
        table: &mut dyn Any,
        row: Instance,
        added: u64,
        row_no: u64,
    ) -> Result<(), MappingError> {
        self.table_plan
            .invoke_table(table, row, added)
            .map_err(|source| MappingError::Table {
                row: row_no,
                source,
            })
    }
}

/// Numbers records from zero and, when `window > 0`, keeps the `window`
/// records starting at ordinal `start_row`.
fn windowed<I: Iterator>(
    records: I,
    start_row: usize,
    window: usize,
) -> impl Iterator<Item = (u64, I::Item)> {
    let (skip, take) = if window > 0 {
        (start_row, window)
    } else {
        (0, usize::MAX)
    };
    records
        .enumerate()
        .skip(skip)
        .take(take)
        .map(|(ordinal, record)| (ordinal as u64, record))
}

#[derive(Default)]
pub struct ResultMapper {
    config: MappingConfig,
    state: Mutex<Option<Arc<CompiledMapping>>>,
    compile_count: AtomicUsize,
}

impl ResultMapper {
    pub fn new(table: Arc<ClassDef>, row: Arc<ClassDef>) -> Self {
        let mut mapper = Self::default();
        mapper.set_table_class(table);
        mapper.set_row_class(row);
        mapper
    }

    fn invalidate(&mut self) {
        if self.state.get_mut().take().is_some() {
            debug!("Mapping configuration changed; recompiling on next use");
        }
    }

    pub fn set_table_class(&mut self, table: Arc<ClassDef>) {
        self.config.table = Some(table);
        self.invalidate();
    }

    pub fn set_row_class(&mut self, row: Arc<ClassDef>) {
        self.config.row = Some(row);
        self.invalidate();
    }

    pub fn set_fill(&mut self, fill: impl Into<String>) {
        self.config.fill = Some(fill.into());
        self.invalidate();
    }

    pub fn set_row_fill(&mut self, row_fill: impl Into<String>) {
        self.config.row_fill = Some(row_fill.into());
        self.invalidate();
    }

    pub fn set_name_style(&mut self, style: NameStyle) {
        self.config.name_style = style;
        self.invalidate();
    }

    pub fn set_relation_keys(&mut self, keys: impl Into<String>) {
        self.config.relation_keys = Some(keys.into());
        self.invalidate();
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.set_fill(fill);
        self
    }

    pub fn with_row_fill(mut self, row_fill: impl Into<String>) -> Self {
        self.set_row_fill(row_fill);
        self
    }

    pub fn with_name_style(mut self, style: NameStyle) -> Self {
        self.set_name_style(style);
        self
    }

    pub fn with_relation_keys(mut self, keys: impl Into<String>) -> Self {
        self.set_relation_keys(keys);
        self
    }

    pub fn name_style(&self) -> NameStyle {
        self.config.name_style
    }

    pub fn is_compiled(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Number of compilations performed since construction.
    pub fn compile_count(&self) -> usize {
        self.compile_count.load(Ordering::Relaxed)
    }

    /// Coercion rules resolved by the current compilation.
    pub fn coercion_resolutions(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map_or(0, |compiled| compiled.coercions.resolutions())
    }

    /// Columns observed by the current compilation.
    pub fn metadata(&self) -> Option<TableMetadata> {
        self.state
            .lock()
            .as_ref()
            .map(|compiled| compiled.metadata.lock().clone())
    }

    /// Compiles the configuration now instead of on first use.
    pub fn prepare(&self) -> Result<(), MappingError> {
        self.compiled().map(|_| ())
    }

    fn compiled(&self) -> Result<Arc<CompiledMapping>, MappingError> {
        let mut state = self.state.lock();
        if let Some(compiled) = state.as_ref() {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(CompiledMapping::compile(&self.config)?);
        let count = self.compile_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Compiled mapping {} -> {} (compilation #{count})",
            compiled.table.name(),
            compiled.row.name()
        );
        *state = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Maps `records` into a new table instance. With `window > 0` only the
    /// records at ordinals `start_row..start_row + window` are mapped; the
    /// skipped records are consumed without being touched.
    pub fn materialize<I>(
        &self,
        records: I,
        start_row: usize,
        window: usize,
    ) -> Result<TableResult, MappingError>
    where
        I: IntoIterator<Item = Record>,
    {
        let started = Instant::now();
        let compiled = self.compiled()?;
        let mut table = compiled.table.instantiate();
        let mut row_count = 0u64;
        let mut pending: Option<PendingRow> = None;

        for (row_no, record) in windowed(records.into_iter(), start_row, window) {
            let mut row = compiled.row.instantiate();
            compiled.fill_row(&mut *row, record, row_no)?;
            let ready = match &compiled.relation {
                Some(group) => group
                    .fold(&mut pending, row, row_no)
                    .map_err(|source| MappingError::Row {
                        row: row_no,
                        field: RELATION_FIELD.to_string(),
                        source,
                    })?
                    .map(|done| (done.row, done.row_no)),
                None => Some((row, row_no)),
            };
            if let Some((row, row_no)) = ready {
                compiled.append(&mut *table, row, row_count, row_no)?;
                row_count += 1;
            }
        }
        if let Some(done) = pending.take() {
            compiled.append(&mut *table, done.row, row_count, done.row_no)?;
            row_count += 1;
        }

        let metadata = compiled.metadata.lock().clone();
        let result = TableResult {
            table,
            row_count,
            column_count: metadata.column_count(),
            elapsed: started.elapsed(),
            metadata,
        };
        info!(
            "Mapped {} row(s) across {} column(s) into {} in {:?}",
            result.row_count,
            result.column_count,
            compiled.table.name(),
            result.elapsed
        );
        Ok(result)
    }
}

impl std::fmt::Debug for ResultMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultMapper")
            .field("config", &self.config)
            .field("compiled", &self.is_compiled())
            .field("compile_count", &self.compile_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windowed_keeps_absolute_ordinals() {
        let picked = windowed(0..10, 2, 3).collect::<Vec<_>>();
        assert_eq!(picked, vec![(2, 2), (3, 3), (4, 4)]);
    }

    #[test]
    fn zero_window_maps_everything() {
        assert_eq!(windowed(0..4, 2, 0).count(), 4);
    }

    #[test]
    fn window_past_the_end_is_empty() {
        assert_eq!(windowed(0..4, 10, 3).count(), 0);
    }

    #[test]
    fn missing_classes_fail_compilation() {
        let mapper = ResultMapper::default();
        assert!(matches!(
            mapper.prepare(),
            Err(MappingError::Compile(CompileError::MissingConfig(_)))
        ));
        assert_eq!(mapper.compile_count(), 0);
    }
}
