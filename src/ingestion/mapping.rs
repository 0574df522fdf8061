//! Column mapping resolution.
//!
//! A schema binds its fields either through the header line ([`BindingMode::ByName`]) or by
//! fixed column index ([`BindingMode::ByPosition`]). The mode decides how many leading lines
//! precede the first data row.

use crate::types::{ColumnRef, Schema};

/// How raw fields are located for a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// Columns are located by matching header names. One header line precedes the data.
    ByName,
    /// Columns are located by zero-based index. No header line is assumed.
    ByPosition,
}

impl BindingMode {
    /// Resolution priority. The first mode with a matching field wins.
    pub const PRIORITY: [BindingMode; 2] = [BindingMode::ByName, BindingMode::ByPosition];

    /// Leading lines consumed before data begins.
    pub fn skip_lines(self) -> usize {
        match self {
            BindingMode::ByName => 1,
            BindingMode::ByPosition => 0,
        }
    }

    fn matches(self, column: &ColumnRef) -> bool {
        matches!(
            (self, column),
            (BindingMode::ByName, ColumnRef::Name(_)) | (BindingMode::ByPosition, ColumnRef::Position(_))
        )
    }
}

/// The outcome of resolving a schema's column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    /// `None` only for a schema without fields.
    pub mode: Option<BindingMode>,
    pub skip_lines: usize,
}

/// Decide the binding mode for `schema`.
///
/// Never fails: a schema where no field matches any mode resolves to no mode and zero skipped
/// lines. A schema mixing both kinds of binding resolves to [`BindingMode::ByName`].
pub fn resolve(schema: &Schema) -> ColumnMapping {
    BindingMode::PRIORITY
        .into_iter()
        .find(|mode| schema.fields.iter().any(|f| mode.matches(&f.column)))
        .map(|mode| ColumnMapping {
            mode: Some(mode),
            skip_lines: mode.skip_lines(),
        })
        .unwrap_or(ColumnMapping {
            mode: None,
            skip_lines: 0,
        })
}
