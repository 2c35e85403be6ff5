//! Conversion of schemaless source values into declared target kinds.
//!
//! Rules are resolved from the pair (runtime source family, declared target
//! kind) and cached per field name in a [`CoercionCache`], so a field seen
//! in every record pays for resolution once.

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use dashmap::DashMap;
use log::debug;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::{
    data::{EnumDef, EnumValue, Value, ValueKind, parse_naive_date, parse_naive_datetime},
    error::CoercionError,
};

/// Runtime family of a source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Text,
    Integer,
    Float,
    Boolean,
    Other,
}

impl SourceKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Text(_) => SourceKind::Text,
            Value::Int(_) | Value::Long(_) | Value::Short(_) | Value::Byte(_) => {
                SourceKind::Integer
            }
            Value::Float(_) | Value::Decimal(_) => SourceKind::Float,
            Value::Boolean(_) => SourceKind::Boolean,
            _ => SourceKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Identity,
    ParseText(ValueKind),
    Integer(ValueKind),
    PositiveAsTrue,
    Float(ValueKind),
    BooleanAsInt,
    Stringify,
    Enumeration(Arc<EnumDef>),
}

impl Transform {
    pub fn resolve(source: SourceKind, target: &ValueKind) -> Self {
        use ValueKind as K;
        match (source, target) {
            (SourceKind::Text, K::Text) => Transform::Identity,
            (
                SourceKind::Text,
                K::Int
                | K::Long
                | K::Short
                | K::Byte
                | K::Decimal
                | K::Float
                | K::Boolean
                | K::Date
                | K::DateTime
                | K::Bytes,
            ) => Transform::ParseText(target.clone()),
            (SourceKind::Text | SourceKind::Integer, K::Enum(def)) => {
                Transform::Enumeration(Arc::clone(def))
            }
            (SourceKind::Integer, K::Int | K::Long | K::Short | K::Byte | K::Decimal | K::Float) => {
                Transform::Integer(target.clone())
            }
            (SourceKind::Integer, K::Boolean) => Transform::PositiveAsTrue,
            (SourceKind::Float, K::Float | K::Decimal) => Transform::Float(target.clone()),
            (SourceKind::Boolean, K::Int) => Transform::BooleanAsInt,
            (SourceKind::Integer | SourceKind::Float | SourceKind::Boolean, K::Text) => {
                Transform::Stringify
            }
            _ => Transform::Identity,
        }
    }

    pub fn apply(&self, value: Value) -> Result<Value, CoercionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Transform::Identity => Ok(value),
            Transform::Stringify => Ok(Value::Text(value.as_display())),
            Transform::ParseText(target) => match value {
                Value::Text(text) => parse_text(&text, target),
                other => Ok(other),
            },
            Transform::Integer(target) => {
                let Some(wide) = value.as_i64() else {
                    return Ok(value);
                };
                integer_to(wide, target)
            }
            Transform::PositiveAsTrue => Ok(value
                .as_i64()
                .map_or(value, |wide| Value::Boolean(wide > 0))),
            Transform::Float(target) => float_to(value, target),
            Transform::BooleanAsInt => match value {
                Value::Boolean(b) => Ok(Value::Int(i32::from(b))),
                other => Ok(other),
            },
            Transform::Enumeration(def) => Ok(resolve_enum(def, &value.as_display())
                .map(Value::Enum)
                .unwrap_or(Value::Null)),
        }
    }
}

fn failure(value: &str, target: &ValueKind, reason: impl ToString) -> CoercionError {
    CoercionError::Failure {
        value: value.to_string(),
        target: target.clone(),
        reason: reason.to_string(),
    }
}

fn parse_text(text: &str, target: &ValueKind) -> Result<Value, CoercionError> {
    let trimmed = text.trim();
    match target {
        ValueKind::Int => trimmed
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Long => trimmed
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Short => trimmed
            .parse::<i16>()
            .map(Value::Short)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Byte => trimmed
            .parse::<i8>()
            .map(Value::Byte)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Decimal => Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map(Value::Decimal)
            .map_err(|err| failure(text, target, err)),
        ValueKind::Boolean => Ok(Value::Boolean(trimmed.eq_ignore_ascii_case("true"))),
        ValueKind::Date => parse_naive_date(trimmed)
            .map(Value::Date)
            .ok_or_else(|| failure(text, target, "unrecognized date format")),
        ValueKind::DateTime => parse_naive_datetime(trimmed)
            .map(Value::DateTime)
            .ok_or_else(|| failure(text, target, "unrecognized datetime format")),
        ValueKind::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
        _ => Ok(Value::Text(text.to_string())),
    }
}

fn integer_to(wide: i64, target: &ValueKind) -> Result<Value, CoercionError> {
    let out_of_range = |_| failure(&wide.to_string(), target, "out of range");
    match target {
        ValueKind::Int => i32::try_from(wide).map(Value::Int).map_err(out_of_range),
        ValueKind::Short => i16::try_from(wide).map(Value::Short).map_err(out_of_range),
        ValueKind::Byte => i8::try_from(wide).map(Value::Byte).map_err(out_of_range),
        ValueKind::Decimal => Ok(Value::Decimal(Decimal::from(wide))),
        ValueKind::Float => Ok(Value::Float(wide as f64)),
        _ => Ok(Value::Long(wide)),
    }
}

fn float_to(value: Value, target: &ValueKind) -> Result<Value, CoercionError> {
    match (target, value) {
        (ValueKind::Decimal, Value::Float(f)) => Decimal::from_f64(f)
            .map(Value::Decimal)
            .ok_or_else(|| failure(&f.to_string(), target, "not representable as decimal")),
        (ValueKind::Float, Value::Decimal(d)) => d
            .to_f64()
            .map(Value::Float)
            .ok_or_else(|| failure(&d.to_string(), target, "not representable as float")),
        (_, other) => Ok(other),
    }
}

/// Matches `text` against display form, then constant name (both
/// case-insensitive), then ordinal index.
pub fn resolve_enum(def: &EnumDef, text: &str) -> Option<EnumValue> {
    let constants = def.constants();
    constants
        .iter()
        .position(|constant| constant.display.eq_ignore_ascii_case(text))
        .or_else(|| {
            constants
                .iter()
                .position(|constant| constant.name.eq_ignore_ascii_case(text))
        })
        .or_else(|| {
            text.trim()
                .parse::<usize>()
                .ok()
                .filter(|ordinal| *ordinal < constants.len())
        })
        .and_then(|ordinal| def.value(ordinal))
}

/// A resolved `(source family, target kind) -> transform` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionRule {
    pub source: SourceKind,
    pub target: ValueKind,
    pub transform: Transform,
}

impl CoercionRule {
    pub fn resolve(source: SourceKind, target: &ValueKind) -> Self {
        Self {
            source,
            target: target.clone(),
            transform: Transform::resolve(source, target),
        }
    }

    pub fn apply(&self, value: Value) -> Result<Value, CoercionError> {
        self.transform.apply(value)
    }
}

/// Field-name keyed rule cache. Rules are never evicted.
#[derive(Debug, Default)]
pub struct CoercionCache {
    rules: DashMap<String, Arc<CoercionRule>>,
    resolutions: AtomicUsize,
}

impl CoercionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, field: &str, source: SourceKind, target: &ValueKind) -> Arc<CoercionRule> {
        if let Some(rule) = self.rules.get(field) {
            return Arc::clone(rule.value());
        }
        let rule = self.rules.entry(field.to_string()).or_insert_with(|| {
            self.resolutions.fetch_add(1, Ordering::Relaxed);
            debug!("Resolved coercion for '{field}': {source:?} -> {target}");
            Arc::new(CoercionRule::resolve(source, target))
        });
        Arc::clone(rule.value())
    }

    /// Converts `value` for `field`. Nulls pass through without touching the
    /// cache; a value whose family differs from the cached rule's source is
    /// converted with an uncached rule.
    pub fn coerce(
        &self,
        field: &str,
        value: Value,
        target: &ValueKind,
    ) -> Result<Value, CoercionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let source = SourceKind::of(&value);
        let rule = self.resolve(field, source, target);
        if rule.source == source {
            rule.apply(value)
        } else {
            CoercionRule::resolve(source, target).apply(value)
        }
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
