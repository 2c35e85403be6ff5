//! Tagged values flowing between records, coercion rules and target objects.
//!
//! [`Value`] is the runtime variant carried by schemaless records and passed
//! to target operations. [`ValueKind`] is the declared kind of a target
//! parameter or getter; the coercion matrix maps one to the other.

use std::{fmt, sync::Arc};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Serialize;

use crate::error::ValueError;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
    Enum(EnumValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Short(_) => "short",
            Value::Byte(_) => "byte",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Long(i) => i.to_string(),
            Value::Short(i) => i.to_string(),
            Value::Byte(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Enum(e) => e.name.clone(),
        }
    }

    /// Integer view of any whole-number variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(i) => Some(*i),
            Value::Short(i) => Some(i64::from(*i)),
            Value::Byte(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn extract<T: FromValue>(self) -> Result<T, ValueError> {
        T::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// One constant of an enumeration target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub display: String,
}

/// Declared shape of an enumeration target: constants in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    constants: Vec<EnumConstant>,
}

impl EnumDef {
    /// `constants` are `(name, display form)` pairs in ordinal order.
    pub fn new<I, N, D>(name: impl Into<String>, constants: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        Arc::new(Self {
            name: name.into(),
            constants: constants
                .into_iter()
                .map(|(name, display)| EnumConstant {
                    name: name.into(),
                    display: display.into(),
                })
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn constants(&self) -> &[EnumConstant] {
        &self.constants
    }

    pub fn value(&self, ordinal: usize) -> Option<EnumValue> {
        self.constants.get(ordinal).map(|constant| EnumValue {
            type_name: self.name.clone(),
            name: constant.name.clone(),
            ordinal,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    #[serde(skip)]
    pub type_name: String,
    pub name: String,
    #[serde(skip)]
    pub ordinal: usize,
}

/// Declared kind of a target parameter or getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Int,
    Long,
    Short,
    Byte,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Bytes,
    Enum(Arc<EnumDef>),
    Object(String),
    /// Opaque; matches any inferred kind during overload resolution.
    Any,
}

impl ValueKind {
    pub fn as_str(&self) -> &str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Short => "short",
            ValueKind::Byte => "byte",
            ValueKind::Float => "float",
            ValueKind::Decimal => "decimal",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Bytes => "bytes",
            ValueKind::Enum(def) => def.name(),
            ValueKind::Object(name) => name,
            ValueKind::Any => "any",
        }
    }

    /// Overload compatibility: equal kinds, or either side opaque.
    pub fn accepts(&self, inferred: &ValueKind) -> bool {
        matches!(self, ValueKind::Any) || matches!(inferred, ValueKind::Any) || self == inferred
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.date()))
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = value.trim().trim_end_matches('Z');
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Extraction of a typed Rust value from a [`Value`], used by setter closures.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

fn mismatch(expected: &'static str, found: &Value) -> ValueError {
    ValueError::Mismatch {
        expected,
        found: found.kind_name(),
    }
}

fn narrow<T: TryFrom<i64>>(value: &Value, target: &'static str) -> Result<T, ValueError> {
    let wide = value.as_i64().ok_or_else(|| mismatch(target, value))?;
    T::try_from(wide).map_err(|_| ValueError::OutOfRange {
        value: wide.to_string(),
        target,
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => Err(mismatch("text", &value)),
            other => Ok(other.as_display()),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        narrow(&value, "long")
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        narrow(&value, "int")
    }
}

impl FromValue for i16 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        narrow(&value, "short")
    }
}

impl FromValue for i8 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        narrow(&value, "byte")
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match &value {
            Value::Float(f) => Ok(*f),
            Value::Decimal(d) => d.to_f64().ok_or_else(|| ValueError::OutOfRange {
                value: d.to_string(),
                target: "float",
            }),
            other => other
                .as_i64()
                .map(|i| i as f64)
                .ok_or_else(|| mismatch("float", &value)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match &value {
            Value::Decimal(d) => Ok(*d),
            Value::Float(f) => Decimal::from_f64(*f).ok_or_else(|| ValueError::OutOfRange {
                value: f.to_string(),
                target: "decimal",
            }),
            other => other
                .as_i64()
                .map(Decimal::from)
                .ok_or_else(|| mismatch("decimal", &value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Date(d) => Ok(d),
            Value::DateTime(dt) => Ok(dt.date()),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromValue for EnumValue {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Enum(e) => Ok(e),
            other => Err(mismatch("enum", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from!(
    String => Text,
    i32 => Int,
    i64 => Long,
    i16 => Short,
    i8 => Byte,
    f64 => Float,
    Decimal => Decimal,
    bool => Boolean,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    Vec<u8> => Bytes,
    EnumValue => Enum,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
