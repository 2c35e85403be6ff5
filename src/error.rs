//! Error types shared by the templating and mapping layers.
//!
//! Configuration-time failures ([`TemplateError`], [`CompileError`]) point at
//! a defect in a template or filler string and surface exactly once.
//! Per-record failures are wrapped in [`MappingError::Row`] together with the
//! offending row ordinal and field name.

use thiserror::Error;

use crate::data::ValueKind;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Malformed template: {0}")]
    Malformed(String),
    #[error("Template '{0}' declares no placeholders")]
    NoPlaceholders(String),
    #[error("No value supplied for mandatory placeholder '{token}'")]
    MissingValue { token: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("Mapping configuration is missing {0}")]
    MissingConfig(&'static str),
    #[error("Filler '{spec}' is not a valid call: {reason}")]
    InvalidSpec { spec: String, reason: String },
    #[error("Filler '{spec}' has an unsupported argument '{argument}'; expected {expected}")]
    InvalidArgument {
        spec: String,
        argument: String,
        expected: &'static str,
    },
    #[error("'{class}' has no operation '{name}' taking {arity} argument(s)")]
    UnknownOperation {
        class: String,
        name: String,
        arity: usize,
    },
    #[error("'{class}.{name}' has {candidates} overload(s) taking {arity} argument(s) and none resolves uniquely")]
    AmbiguousOverload {
        class: String,
        name: String,
        arity: usize,
        candidates: usize,
    },
    #[error("'{class}' has no accessor for '{path}'")]
    UnknownAccessor { class: String, path: String },
    #[error("Filler '{0}' passes the row more than once")]
    RowArgumentRepeated(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("Expected a {expected} value but found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("Cannot convert '{value}' to {target}: {reason}")]
    Failure {
        value: String,
        target: ValueKind,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("'{method}' expected an instance of {expected}")]
    TargetMismatch {
        method: String,
        expected: &'static str,
    },
    #[error("'{method}' received {found} argument(s) but takes {expected}")]
    Arity {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("'{method}' argument {index} must be an object")]
    ExpectedObject { method: String, index: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("RowNo={row} ColName={field}: {source}")]
    Row {
        row: u64,
        field: String,
        #[source]
        source: InvokeError,
    },
    #[error("Filling row {row} into the table failed: {source}")]
    Table {
        row: u64,
        #[source]
        source: InvokeError,
    },
}

impl MappingError {
    /// Row ordinal the failure is attributed to, if it happened while iterating.
    pub fn row(&self) -> Option<u64> {
        match self {
            MappingError::Row { row, .. } | MappingError::Table { row, .. } => Some(*row),
            MappingError::Compile(_) => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            MappingError::Row { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Connection is not valid")]
    ConnectionInvalid,
    #[error("Query execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}
