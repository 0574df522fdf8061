//! Core data model types for chunked ingestion.
//!
//! A [`Schema`] is an explicit list of [`FieldDescriptor`]s. Each descriptor binds one logical
//! field to a CSV column (by header name or by zero-based position) and optionally carries a
//! [`FieldConverter`]. Rows are materialized into [`Record`]s, which callers turn into their own
//! types through [`FromRecord`].

use std::fmt;
use std::sync::Arc;

use crate::convert::FieldConverter;
use crate::error::{ConversionError, RowError};

/// Where a field's raw text comes from in a CSV record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    /// Located through the header line.
    Name(String),
    /// Zero-based index into the record's fields.
    Position(usize),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => f.write_str(name),
            ColumnRef::Position(idx) => write!(f, "#{idx}"),
        }
    }
}

/// A single field in a [`Schema`].
#[derive(Clone)]
pub struct FieldDescriptor {
    /// Logical field name, used to look values up in a [`Record`].
    pub name: String,
    /// Source column binding.
    pub column: ColumnRef,
    converter: Option<Arc<dyn FieldConverter>>,
}

impl FieldDescriptor {
    /// Bind a field to a header column. The logical name is the column name.
    pub fn by_name(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            name: column.clone(),
            column: ColumnRef::Name(column),
            converter: None,
        }
    }

    /// Bind a field to a zero-based column position.
    pub fn by_position(name: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            column: ColumnRef::Position(position),
            converter: None,
        }
    }

    /// Override the logical field name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a converter; without one the trimmed text is passed through as [`Value::Utf8`].
    pub fn with_converter(mut self, converter: impl FieldConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Convert already-trimmed raw text into this field's value.
    pub fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        match &self.converter {
            Some(c) => c.convert(raw),
            None => Ok(Value::Utf8(raw.to_owned())),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("converter_set", &self.converter.is_some())
            .finish()
    }
}

/// An ordered list of fields describing the expected shape of each record.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by logical name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Incremental [`Schema`] construction.
///
/// ```rust
/// use csv_chunk_ingest::convert::{Float64Converter, YearMonthConverter};
/// use csv_chunk_ingest::types::Schema;
///
/// let schema = Schema::builder()
///     .column("NO")
///     .column("NAME")
///     .column_with("YYMM", YearMonthConverter)
///     .column_with("AMT", Float64Converter)
///     .build();
/// assert_eq!(schema.fields.len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a header-bound text field.
    pub fn column(self, column: impl Into<String>) -> Self {
        self.field(FieldDescriptor::by_name(column))
    }

    /// Add a header-bound field with a converter.
    pub fn column_with(self, column: impl Into<String>, converter: impl FieldConverter + 'static) -> Self {
        self.field(FieldDescriptor::by_name(column).with_converter(converter))
    }

    /// Add a position-bound text field.
    pub fn position(self, name: impl Into<String>, position: usize) -> Self {
        self.field(FieldDescriptor::by_position(name, position))
    }

    /// Add a position-bound field with a converter.
    pub fn position_with(
        self,
        name: impl Into<String>,
        position: usize,
        converter: impl FieldConverter + 'static,
    ) -> Self {
        self.field(FieldDescriptor::by_position(name, position).with_converter(converter))
    }

    pub fn build(self) -> Schema {
        Schema::new(self.fields)
    }
}

/// A single typed value in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Bool(_) => "bool",
            Value::Utf8(_) => "utf8",
        }
    }
}

/// One fully materialized row, with values in the same order as the [`Schema`] fields.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
            && self.schema.field_names().eq(other.schema.field_names())
    }
}

impl Record {
    pub(crate) fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(schema.fields.len(), values.len());
        Self { schema, values }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Look a value up by logical field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|idx| self.values.get(idx))
    }

    /// Move a value out by logical field name, leaving an empty string behind.
    pub fn take(&mut self, name: &str) -> Result<Value, RowError> {
        let idx = self.schema.index_of(name).ok_or_else(|| RowError::Record {
            message: format!("no field named '{name}' in schema"),
        })?;
        Ok(std::mem::replace(&mut self.values[idx], Value::Utf8(String::new())))
    }

    pub fn take_string(&mut self, name: &str) -> Result<String, RowError> {
        match self.take(name)? {
            Value::Utf8(s) => Ok(s),
            other => Err(type_mismatch(name, "utf8", &other)),
        }
    }

    pub fn take_f64(&mut self, name: &str) -> Result<f64, RowError> {
        match self.take(name)? {
            Value::Float64(v) => Ok(v),
            other => Err(type_mismatch(name, "float64", &other)),
        }
    }

    pub fn take_i64(&mut self, name: &str) -> Result<i64, RowError> {
        match self.take(name)? {
            Value::Int64(v) => Ok(v),
            other => Err(type_mismatch(name, "int64", &other)),
        }
    }

    pub fn take_bool(&mut self, name: &str) -> Result<bool, RowError> {
        match self.take(name)? {
            Value::Bool(v) => Ok(v),
            other => Err(type_mismatch(name, "bool", &other)),
        }
    }
}

fn type_mismatch(name: &str, expected: &str, got: &Value) -> RowError {
    RowError::Record {
        message: format!(
            "field '{name}' holds a {} value, expected {expected}",
            got.type_name()
        ),
    }
}

/// Conversion from a materialized [`Record`] into a caller-defined row type.
///
/// Implementations must either build the whole value or return an error; the pipeline treats
/// an error here exactly like a converter rejection on that row.
///
/// ```rust
/// use csv_chunk_ingest::error::RowError;
/// use csv_chunk_ingest::types::{FromRecord, Record};
///
/// struct Payment {
///     name: String,
///     amount: f64,
/// }
///
/// impl FromRecord for Payment {
///     fn from_record(mut record: Record) -> Result<Self, RowError> {
///         Ok(Self {
///             name: record.take_string("NAME")?,
///             amount: record.take_f64("AMT")?,
///         })
///     }
/// }
/// ```
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self, RowError>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self, RowError> {
        Ok(record)
    }
}

impl FromRecord for Vec<Value> {
    fn from_record(record: Record) -> Result<Self, RowError> {
        Ok(record.into_values())
    }
}
