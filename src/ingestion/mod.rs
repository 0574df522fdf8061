//! Chunked CSV ingestion.
//!
//! Most callers should build a [`ChunkPipeline`] and call one of its `process*` methods:
//!
//! - [`ChunkPipeline::process`] for any reader
//! - [`ChunkPipeline::process_path`] for a file on disk
//! - [`ChunkPipeline::process_upload`] for an upload payload, staged to a temp file first
//! - [`ChunkPipeline::process_source`] for rows that are already tokenized
//!
//! The pieces are also usable on their own:
//! - [`mapping`]: binding mode resolution
//! - [`source`]: raw record sources
//! - [`materialize`]: raw record to typed record
//! - [`staging`]: temp-file spooling of uploads

pub mod chunked;
pub mod mapping;
pub mod materialize;
pub mod observability;
pub mod options;
pub mod source;
pub mod staging;

pub use chunked::{process, ChunkPipeline};
pub use mapping::{resolve, BindingMode, ColumnMapping};
pub use observability::{
    ChunkEvent, CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, TracingObserver,
};
pub use options::{PipelineConfig, PipelineOptions, DEFAULT_CHUNK_SIZE, FIRST_DATA_ROW};
pub use source::{CsvRecordSource, RawRecord, RawRecordSource, VecRecordSource};
pub use staging::StagedInput;
