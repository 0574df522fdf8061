//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

use super::observability::{IngestionObserver, IngestionSeverity};

/// Default number of records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Row number of the first data row; row 1 is the header line.
pub const FIRST_DATA_ROW: usize = 2;

/// Options controlling a [`super::ChunkPipeline`] run.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Records per chunk handed to the handler. Must be positive.
    pub chunk_size: usize,
    /// First file row delivered to the handler. Rows before it are read and discarded.
    pub start_row: usize,
    /// Overrides the number of leading lines implied by the schema's binding mode.
    ///
    /// Useful for positional schemas over files that still carry a header line.
    pub skip_lines: Option<usize>,
    /// Field delimiter.
    pub delimiter: u8,
    /// Directory for staged uploads. `None` uses the system temp directory.
    pub staging_dir: Option<PathBuf>,
    /// Optional observer for outcomes and alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("chunk_size", &self.chunk_size)
            .field("start_row", &self.start_row)
            .field("skip_lines", &self.skip_lines)
            .field("delimiter", &(self.delimiter as char))
            .field("staging_dir", &self.staging_dir)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            start_row: FIRST_DATA_ROW,
            skip_lines: None,
            delimiter: b',',
            staging_dir: None,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl PipelineOptions {
    pub(crate) fn validate(&self) -> IngestionResult<()> {
        if self.chunk_size == 0 {
            return Err(IngestionError::InvalidChunkSize {
                chunk_size: self.chunk_size,
            });
        }
        if self.start_row < FIRST_DATA_ROW {
            return Err(IngestionError::InvalidStartRow {
                start_row: self.start_row,
                min: FIRST_DATA_ROW,
            });
        }
        Ok(())
    }
}

/// Serializable subset of [`PipelineOptions`], e.g. loaded from a JSON settings file.
///
/// ```rust
/// use csv_chunk_ingest::ingestion::PipelineConfig;
///
/// let cfg = PipelineConfig::from_json_str(r#"{ "chunk_size": 500, "delimiter": ";" }"#).unwrap();
/// let opts = cfg.into_options().unwrap();
/// assert_eq!(opts.chunk_size, 500);
/// assert_eq!(opts.delimiter, b';');
/// assert_eq!(opts.start_row, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub start_row: usize,
    pub skip_lines: Option<usize>,
    pub delimiter: String,
    pub staging_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            start_row: FIRST_DATA_ROW,
            skip_lines: None,
            delimiter: ",".to_string(),
            staging_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Convert into runtime options (no observer attached).
    pub fn into_options(self) -> IngestionResult<PipelineOptions> {
        let delimiter = match self.delimiter.as_bytes() {
            [b] => *b,
            _ => {
                return Err(IngestionError::InvalidConfig {
                    message: format!(
                        "delimiter must be a single ASCII character (got {:?})",
                        self.delimiter
                    ),
                });
            }
        };
        let opts = PipelineOptions {
            chunk_size: self.chunk_size,
            start_row: self.start_row,
            skip_lines: self.skip_lines,
            delimiter,
            staging_dir: self.staging_dir,
            ..Default::default()
        };
        opts.validate()?;
        Ok(opts)
    }
}
