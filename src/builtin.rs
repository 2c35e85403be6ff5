//! Generic targets for callers without typed row/table classes: every record
//! becomes an ordered field bag and the table is a plain list of them.

use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use serde::{Serialize, ser::SerializeMap};

use crate::{
    class::{Arg, ClassDef},
    data::{Value, ValueKind},
    error::InvokeError,
    rows::ResultMapper,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapRow {
    fields: Vec<(String, Value)>,
}

impl MapRow {
    /// Sets `name`, replacing an earlier value under the same name.
    pub fn put(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for MapRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowList {
    rows: Vec<MapRow>,
}

impl RowList {
    pub fn add(&mut self, row: MapRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MapRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MapRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Field names across all rows, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| row.fields())
            .map(|(name, _)| name.clone())
            .unique()
            .collect()
    }
}

pub fn map_row_class() -> Arc<ClassDef> {
    static CLASS: OnceLock<Arc<ClassDef>> = OnceLock::new();
    Arc::clone(CLASS.get_or_init(|| {
        ClassDef::builder::<MapRow>("MapRow")
            .method(
                "put",
                vec![ValueKind::Text, ValueKind::Any],
                |row: &mut MapRow, args: Vec<Arg>| {
                    let mut args = args.into_iter().map(Arg::into_value);
                    let name = match args.next().flatten() {
                        Some(Value::Text(name)) => name,
                        _ => return Err(InvokeError::Message("put expects a text name".into())),
                    };
                    row.put(name, args.next().flatten().unwrap_or(Value::Null));
                    Ok(())
                },
            )
            .build()
    }))
}

pub fn row_list_class() -> Arc<ClassDef> {
    static CLASS: OnceLock<Arc<ClassDef>> = OnceLock::new();
    Arc::clone(CLASS.get_or_init(|| {
        ClassDef::builder::<RowList>("RowList")
            .adder("add", &map_row_class(), |list: &mut RowList, row: MapRow| {
                list.add(row)
            })
            .build()
    }))
}

/// Mapper producing a [`RowList`] of [`MapRow`]s with the default fillers.
pub fn builtin_mapper() -> ResultMapper {
    ResultMapper::new(row_list_class(), map_row_class())
}
