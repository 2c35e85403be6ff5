//! Compilation of table and row filler strings into invocation plans.
//!
//! A filler is a method-call shaped string such as `add(row)`,
//! `put(row.id, row)` or `put(colName, colValue)`. Compilation resolves the
//! named operation on the target class once; the resulting [`FillPlan`] is
//! then invoked for every record without further lookups.

use std::{any::Any, sync::Arc};

use log::debug;

use crate::{
    class::{Arg, ClassDef, GetterDef, Instance, MethodDef, NestedDef},
    data::{Value, ValueKind},
    error::{CompileError, InvokeError, ValueError},
};

const ROW: &str = "row";
const ROW_NO: &str = "rowNo";
const COL_VALUE: &str = "colValue";
const COL_NAME: &str = "colName";
const PER_FIELD: &str = "setter";

/// A dotted path on the row class resolved to nested hops and a final getter.
#[derive(Debug, Clone)]
pub struct FieldPath {
    path: String,
    hops: Vec<Arc<NestedDef>>,
    getter: Arc<GetterDef>,
}

impl FieldPath {
    pub fn resolve(class: &Arc<ClassDef>, path: &str) -> Result<Self, CompileError> {
        let unknown = || CompileError::UnknownAccessor {
            class: class.name().to_string(),
            path: path.to_string(),
        };
        let mut current = Arc::clone(class);
        let mut hops = Vec::new();
        let mut segments = path.split('.').map(str::trim).peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let getter = current
                    .getters_for(segment)
                    .into_iter()
                    .next()
                    .ok_or_else(unknown)?;
                return Ok(Self {
                    path: path.to_string(),
                    hops,
                    getter,
                });
            }
            let nested = current
                .nested(segment)
                .filter(|nested| !nested.is_collection())
                .ok_or_else(unknown)?;
            current = Arc::clone(nested.class());
            hops.push(nested);
        }
        Err(unknown())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> &ValueKind {
        self.getter.kind()
    }

    /// Reads the path; an absent intermediate object reads as `Null`.
    pub fn read(&self, instance: &dyn Any) -> Result<Value, InvokeError> {
        let mut current = instance;
        for hop in &self.hops {
            match hop.read(current) {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            }
        }
        self.getter.read(current)
    }
}

/// Where one argument of a plan comes from.
#[derive(Debug, Clone)]
pub enum ParamSource {
    Row,
    RowOrdinal,
    RowField(FieldPath),
    ColumnValue,
    ColumnName,
}

#[derive(Debug, Clone)]
pub struct FillPlan {
    method: Arc<MethodDef>,
    params: Vec<ParamSource>,
    nested: Option<Arc<NestedDef>>,
}

impl FillPlan {
    pub fn method(&self) -> &MethodDef {
        &self.method
    }

    pub fn params(&self) -> &[ParamSource] {
        &self.params
    }

    pub fn nested(&self) -> Option<&Arc<NestedDef>> {
        self.nested.as_ref()
    }

    /// Declared kind of the first parameter; the coercion target of a
    /// per-field plan.
    pub fn target_kind(&self) -> &ValueKind {
        self.method.params().first().unwrap_or(&ValueKind::Any)
    }

    /// Hands a finished row to the table operation. `rowNo` binds to `added`,
    /// the number of rows already appended to this table.
    pub fn invoke_table(
        &self,
        table: &mut dyn Any,
        row: Instance,
        added: u64,
    ) -> Result<(), InvokeError> {
        let mut values = Vec::with_capacity(self.params.len());
        for (param, kind) in self.params.iter().zip(self.method.params()) {
            let value = match param {
                ParamSource::RowOrdinal => Some(ordinal_value(added, kind)?),
                ParamSource::RowField(path) => Some(path.read(&*row)?),
                _ => None,
            };
            values.push(value);
        }
        let mut row = Some(row);
        let args = values
            .into_iter()
            .map(|value| match value {
                Some(value) => Arg::Value(value),
                None => row.take().map_or(Arg::Value(Value::Null), Arg::Object),
            })
            .collect();
        self.method.invoke(table, args)
    }

    /// Invokes a fixed row plan with one `(field, value)` pair.
    pub fn invoke_row(
        &self,
        row: &mut dyn Any,
        field: &str,
        value: &Value,
    ) -> Result<(), InvokeError> {
        let args = self
            .params
            .iter()
            .map(|param| match param {
                ParamSource::ColumnName => Arg::Value(Value::Text(field.to_string())),
                _ => Arg::Value(value.clone()),
            })
            .collect();
        self.method.invoke(row, args)
    }

    /// Invokes a per-field setter, reaching through the nested target first
    /// when the plan has one.
    pub fn invoke_field(&self, row: &mut dyn Any, value: Value) -> Result<(), InvokeError> {
        let target = match &self.nested {
            Some(nested) => match nested.target_mut(row, !value.is_null())? {
                Some(target) => target,
                None => return Ok(()),
            },
            None => row,
        };
        self.method.invoke(target, vec![Arg::Value(value)])
    }
}

fn ordinal_value(row_no: u64, kind: &ValueKind) -> Result<Value, InvokeError> {
    let out_of_range = |_| {
        InvokeError::Value(ValueError::OutOfRange {
            value: row_no.to_string(),
            target: "row ordinal",
        })
    };
    match kind {
        ValueKind::Int => i32::try_from(row_no).map(Value::Int).map_err(out_of_range),
        _ => i64::try_from(row_no).map(Value::Long).map_err(out_of_range),
    }
}

#[derive(Debug, Clone)]
pub enum RowFiller {
    Fixed(FillPlan),
    /// `setter(...)`: one plan per discovered field, compiled lazily.
    PerField,
}

fn parse_call(spec: &str) -> Result<(&str, Vec<&str>), CompileError> {
    let invalid = |reason: &str| CompileError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = spec.trim();
    let open = trimmed.find('(').ok_or_else(|| invalid("missing '('"))?;
    let body = trimmed[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| invalid("missing closing ')'"))?;
    let name = trimmed[..open].trim();
    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid_name {
        return Err(invalid("operation name is not an identifier"));
    }
    if body.contains(['(', ')']) {
        return Err(invalid("nested calls are not supported"));
    }
    let args = if body.trim().is_empty() {
        Vec::new()
    } else {
        body.split(',').map(str::trim).collect::<Vec<_>>()
    };
    if args.iter().any(|arg| arg.is_empty()) {
        return Err(invalid("empty argument"));
    }
    Ok((name, args))
}

fn matching(candidates: &[Arc<MethodDef>], inferred: &[ValueKind]) -> Vec<Arc<MethodDef>> {
    candidates
        .iter()
        .filter(|method| {
            method
                .params()
                .iter()
                .zip(inferred)
                .all(|(declared, inferred)| declared.accepts(inferred))
        })
        .cloned()
        .collect()
}

fn resolve_method(
    class: &ClassDef,
    name: &str,
    inferred: &[ValueKind],
    ordinals: &[usize],
) -> Result<Arc<MethodDef>, CompileError> {
    let candidates = class.methods_named(name, inferred.len());
    if let [only] = candidates.as_slice() {
        return Ok(Arc::clone(only));
    }
    if candidates.is_empty() {
        return Err(CompileError::UnknownOperation {
            class: class.name().to_string(),
            name: name.to_string(),
            arity: inferred.len(),
        });
    }
    let mut survivors = matching(&candidates, inferred);
    if survivors.len() != 1 && !ordinals.is_empty() {
        let mut retry = inferred.to_vec();
        for &position in ordinals {
            retry[position] = ValueKind::Int;
        }
        survivors = matching(&candidates, &retry);
    }
    match survivors.as_slice() {
        [chosen] => Ok(Arc::clone(chosen)),
        _ => Err(CompileError::AmbiguousOverload {
            class: class.name().to_string(),
            name: name.to_string(),
            arity: inferred.len(),
            candidates: candidates.len(),
        }),
    }
}

/// Compiles the table filler, e.g. `add(row)` or `put(row.id, row)`.
pub fn compile_table_filler(
    spec: &str,
    table: &ClassDef,
    row: &Arc<ClassDef>,
) -> Result<FillPlan, CompileError> {
    let (name, args) = parse_call(spec)?;
    let mut params = Vec::with_capacity(args.len());
    let mut inferred = Vec::with_capacity(args.len());
    let mut ordinals = Vec::new();
    for arg in args {
        if arg.eq_ignore_ascii_case(ROW) {
            if params.iter().any(|p| matches!(p, ParamSource::Row)) {
                return Err(CompileError::RowArgumentRepeated(spec.to_string()));
            }
            params.push(ParamSource::Row);
            inferred.push(ValueKind::Object(row.name().to_string()));
        } else if arg.eq_ignore_ascii_case(ROW_NO) {
            ordinals.push(params.len());
            params.push(ParamSource::RowOrdinal);
            inferred.push(ValueKind::Long);
        } else if let Some(path) = strip_prefix_ignore_case(arg, "row.") {
            let path = FieldPath::resolve(row, path)?;
            inferred.push(path.kind().clone());
            params.push(ParamSource::RowField(path));
        } else {
            return Err(CompileError::InvalidArgument {
                spec: spec.to_string(),
                argument: arg.to_string(),
                expected: "row, rowNo or row.<field>",
            });
        }
    }
    let method = resolve_method(table, name, &inferred, &ordinals)?;
    debug!(
        "Compiled table filler '{}' to {}.{}",
        spec.trim(),
        table.name(),
        method.name()
    );
    Ok(FillPlan {
        method,
        params,
        nested: None,
    })
}

/// Compiles the row filler, e.g. `put(colName, colValue)` or `setter(colValue)`.
pub fn compile_row_filler(spec: &str, row: &ClassDef) -> Result<RowFiller, CompileError> {
    let (name, args) = parse_call(spec)?;
    if name.eq_ignore_ascii_case(PER_FIELD) {
        debug!("Row filler '{}' maps fields through setters", spec.trim());
        return Ok(RowFiller::PerField);
    }
    let mut params = Vec::with_capacity(args.len());
    let mut inferred = Vec::with_capacity(args.len());
    for arg in args {
        if arg.eq_ignore_ascii_case(COL_VALUE) {
            params.push(ParamSource::ColumnValue);
            inferred.push(ValueKind::Any);
        } else if arg.eq_ignore_ascii_case(COL_NAME) {
            params.push(ParamSource::ColumnName);
            inferred.push(ValueKind::Text);
        } else {
            return Err(CompileError::InvalidArgument {
                spec: spec.to_string(),
                argument: arg.to_string(),
                expected: "colValue or colName",
            });
        }
    }
    let method = resolve_method(row, name, &inferred, &[])?;
    debug!(
        "Compiled row filler '{}' to {}.{}",
        spec.trim(),
        row.name(),
        method.name()
    );
    Ok(RowFiller::Fixed(FillPlan {
        method,
        params,
        nested: None,
    }))
}

/// Compiles the setter plan for one record field: `x` calls `setX` on the
/// row, `a.b` calls `setB` on the row's nested `a` target. Fields without a
/// setter compile to `None`.
pub fn compile_field_plan(field: &str, row: &ClassDef) -> Result<Option<FillPlan>, CompileError> {
    let (nested, property) = match field.split_once('.') {
        Some((head, tail)) => match row.nested(head) {
            Some(nested) => (Some(nested), tail),
            None => {
                debug!("Field '{field}' has no nested target '{head}' on {}", row.name());
                return Ok(None);
            }
        },
        None => (None, field),
    };
    let owner = nested
        .as_ref()
        .map_or(row, |nested| nested.class().as_ref());
    if property.contains('.') {
        debug!("Field '{field}' nests deeper than one level; not mapped");
        return Ok(None);
    }
    let mut setters = owner.methods_named(&format!("set{property}"), 1).into_iter();
    let Some(method) = setters.next() else {
        debug!("Field '{field}' has no setter on {}", owner.name());
        return Ok(None);
    };
    if setters.next().is_some() {
        debug!(
            "Field '{field}' matches several setters on {}; using the first declared",
            owner.name()
        );
    }
    debug!("Compiled field plan '{field}' to {}.{}", owner.name(), method.name());
    Ok(Some(FillPlan {
        method,
        params: vec![ParamSource::ColumnValue],
        nested,
    }))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}
