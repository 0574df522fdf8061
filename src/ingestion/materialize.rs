//! Record materialization: one raw record plus a schema gives one typed record.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{IngestionError, IngestionResult, RowError};
use crate::types::{ColumnRef, FromRecord, Record, Schema, Value};

use super::source::RawRecord;

/// Turns [`RawRecord`]s into `T` using a fixed schema.
///
/// Column indexes are resolved once, against the header line when one is available. Fields
/// are trimmed, then converted in schema order; the first rejection fails the whole row.
pub struct Materializer<T> {
    schema: Arc<Schema>,
    columns: Vec<Option<usize>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRecord> Materializer<T> {
    /// Resolve column indexes for `schema`.
    ///
    /// Name-bound fields need `headers`; if a header line was read but lacks one of them, this
    /// fails with [`IngestionError::SchemaMismatch`]. Without any header line those fields stay
    /// unresolved and each row reports them as missing.
    pub fn new(schema: Arc<Schema>, headers: Option<&[String]>) -> IngestionResult<Self> {
        let mut columns = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let idx = match (&field.column, headers) {
                (ColumnRef::Position(idx), _) => Some(*idx),
                (ColumnRef::Name(name), Some(headers)) => {
                    match headers.iter().position(|h| h == name) {
                        Some(idx) => Some(idx),
                        None => {
                            return Err(IngestionError::SchemaMismatch {
                                message: format!(
                                    "missing required column '{name}'. headers={headers:?}"
                                ),
                            });
                        }
                    }
                }
                (ColumnRef::Name(_), None) => None,
            };
            columns.push(idx);
        }

        Ok(Self {
            schema,
            columns,
            _marker: PhantomData,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Materialize one raw record. No partial record is ever returned.
    pub fn materialize(&self, raw: &RawRecord) -> Result<T, RowError> {
        let mut values: Vec<Value> = Vec::with_capacity(self.schema.fields.len());
        for (field, idx) in self.schema.fields.iter().zip(&self.columns) {
            let text = idx
                .and_then(|i| raw.get(i))
                .ok_or_else(|| RowError::MissingField {
                    column: field.column.to_string(),
                })?;
            let value = field
                .convert(text.trim())
                .map_err(|source| RowError::Conversion {
                    column: field.column.to_string(),
                    source,
                })?;
            values.push(value);
        }
        T::from_record(Record::new(Arc::clone(&self.schema), values))
    }
}
