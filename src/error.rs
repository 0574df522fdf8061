use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Boxed error returned by chunk handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned by pipeline construction and [`crate::ingestion::ChunkPipeline`] runs.
///
/// Exactly one of these is produced per failed run, naming the first point of failure.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The configured chunk size was zero.
    #[error("chunk size must be a positive number (got {chunk_size})")]
    InvalidChunkSize { chunk_size: usize },

    /// The schema declares no fields.
    #[error("schema must declare at least one field")]
    EmptySchema,

    /// The requested start row precedes the first data row.
    #[error("start row must be at least {min} (got {start_row})")]
    InvalidStartRow { start_row: usize, min: usize },

    /// A configuration value is out of range or malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Underlying I/O error while opening or staging the input.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The tokenizer failed before any data row was read (e.g. on the header line).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The header line does not conform to the schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A single row could not be materialized into a typed record.
    #[error("failed to parse row {row}")]
    Parse {
        row: usize,
        #[source]
        source: RowError,
    },

    /// The caller's handler failed on the chunk covering `start_row..=end_row`.
    ///
    /// `end_row < start_row` means the failing chunk was the final, empty one.
    #[error("{}", handler_failure(.start_row, .end_row))]
    Handler {
        start_row: usize,
        end_row: usize,
        #[source]
        source: HandlerError,
    },
}

impl IngestionError {
    /// The file row (or `(start, end)` range) this error is attributed to, if any.
    pub fn rows(&self) -> Option<(usize, usize)> {
        match self {
            IngestionError::Parse { row, .. } => Some((*row, *row)),
            IngestionError::Handler {
                start_row, end_row, ..
            } => Some((*start_row, *end_row)),
            _ => None,
        }
    }
}

fn handler_failure(start_row: &usize, end_row: &usize) -> String {
    if end_row < start_row {
        format!("handler failed on the final empty chunk after row {end_row}")
    } else {
        format!("handler failed for rows {start_row} to {end_row}")
    }
}

/// Why one raw record could not be turned into a typed record.
#[derive(Debug, Error)]
pub enum RowError {
    /// A field converter rejected the raw text.
    #[error("invalid value in column '{column}'")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },

    /// The record has no value at the column the field is bound to.
    #[error("column '{column}' is missing from the record")]
    MissingField { column: String },

    /// The tokenizer could not produce the record at all.
    #[error("csv error: {0}")]
    Read(#[from] csv::Error),

    /// A [`crate::types::FromRecord`] implementation rejected the record.
    #[error("{message}")]
    Record { message: String },
}

/// A converter's rejection of one raw field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConversionError {
    /// The offending text, as passed to the converter.
    pub raw: String,
    /// Human-readable detail, including the expected format where one exists.
    pub message: String,
}

impl ConversionError {
    pub fn new(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn parse_error_keeps_conversion_detail_in_source_chain() {
        let err = IngestionError::Parse {
            row: 9,
            source: RowError::Conversion {
                column: "YYMM".to_string(),
                source: ConversionError::new(
                    "202302XX",
                    "202302XX is invalid format. valid format is e.g. 202101",
                ),
            },
        };

        assert_eq!(err.to_string(), "failed to parse row 9");
        let row_err = err.source().unwrap();
        assert!(row_err.to_string().contains("column 'YYMM'"));
        assert_eq!(
            row_err.source().unwrap().to_string(),
            "202302XX is invalid format. valid format is e.g. 202101"
        );
        assert_eq!(err.rows(), Some((9, 9)));
    }

    #[test]
    fn handler_error_reports_range() {
        let err = IngestionError::Handler {
            start_row: 2,
            end_row: 6,
            source: "db down".into(),
        };
        assert_eq!(err.to_string(), "handler failed for rows 2 to 6");
        assert_eq!(err.source().unwrap().to_string(), "db down");
        assert_eq!(err.rows(), Some((2, 6)));
    }

    #[test]
    fn handler_error_on_final_empty_chunk_names_last_row() {
        let err = IngestionError::Handler {
            start_row: 8,
            end_row: 7,
            source: "flush failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "handler failed on the final empty chunk after row 7"
        );
        assert_eq!(err.rows(), Some((8, 7)));
    }
}
