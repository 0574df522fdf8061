//! `csv-chunk-ingest` turns arbitrarily large CSV input into typed records and hands them to a
//! caller-supplied handler in fixed-size chunks, holding at most one chunk in memory.
//!
//! When something goes wrong, the error names the file rows involved:
//!
//! - a value that fails conversion yields [`IngestionError::Parse`] with the exact row number,
//!   and the converter's detail (offending text, expected format) in the source chain;
//! - a handler failure yields [`IngestionError::Handler`] with the inclusive row range of the
//!   chunk the handler was given.
//!
//! Row numbers are file rows: the header line is row 1, the first data row is row 2.
//!
//! ## Schema + binding
//!
//! A [`types::Schema`] lists [`types::FieldDescriptor`]s. Fields bind either by header name or by
//! zero-based column position; [`ingestion::mapping::resolve`] picks the binding mode and with it
//! the number of leading lines to skip (one header line by name, none by position). Each field may
//! carry a [`convert::FieldConverter`]; without one the trimmed text is passed through.
//!
//! ## Quick example
//!
//! ```rust
//! use csv_chunk_ingest::convert::{Float64Converter, YearMonthConverter};
//! use csv_chunk_ingest::error::RowError;
//! use csv_chunk_ingest::ingestion::ChunkPipeline;
//! use csv_chunk_ingest::types::{FromRecord, Record, Schema};
//!
//! #[derive(Debug, PartialEq)]
//! struct Sale {
//!     name: String,
//!     year_month: String,
//!     amount: f64,
//! }
//!
//! impl FromRecord for Sale {
//!     fn from_record(mut r: Record) -> Result<Self, RowError> {
//!         Ok(Self {
//!             name: r.take_string("NAME")?,
//!             year_month: r.take_string("YYMM")?,
//!             amount: r.take_f64("AMT")?,
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<(), csv_chunk_ingest::IngestionError> {
//! let schema = Schema::builder()
//!     .column("NAME")
//!     .column_with("YYMM", YearMonthConverter)
//!     .column_with("AMT", Float64Converter)
//!     .build();
//!
//! let input = "NAME,YYMM,AMT\njohn,202301,10000\nhuk,202303,\n";
//! let mut sales = Vec::new();
//! ChunkPipeline::<Sale>::new(schema, 10_000)?.process(input.as_bytes(), |chunk: Vec<Sale>| {
//!     sales.extend(chunk);
//!     Ok(())
//! })?;
//!
//! assert_eq!(sales[1].year_month, "2023-03");
//! assert_eq!(sales[1].amount, 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: the chunked pipeline, its configuration, sources and observers
//! - [`types`]: schema, values and records
//! - [`convert`]: field converters
//! - [`error`]: error types
//! - [`logging`]: `tracing-subscriber` setup helpers

pub mod convert;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod types;

pub use error::{ConversionError, HandlerError, IngestionError, IngestionResult, RowError};
