//! Chunked dispatch: read, materialize, batch, hand off.
//!
//! The loop pulls raw records one at a time, materializes each into `T`, and hands the handler
//! an owned `Vec<T>` every time `chunk_size` records have accumulated, plus once more at end of
//! input with whatever is left (possibly nothing). Memory use is bounded by one chunk.
//!
//! Every failure is attributed to file rows. Row 1 is the header line, so the first data row is
//! row 2 whatever the binding mode.
//!
//! - A row that fails to materialize is reported as [`IngestionError::Parse`] naming that row;
//!   the chunk holding it is never dispatched.
//! - A handler failure is reported as [`IngestionError::Handler`] naming the inclusive file-row
//!   span of the chunk it was given.

use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use crate::error::{HandlerError, IngestionError, IngestionResult};
use crate::types::{FromRecord, Schema};

use super::mapping::{self, BindingMode, ColumnMapping};
use super::materialize::Materializer;
use super::observability::{
    error_chain, ChunkEvent, IngestionContext, IngestionSeverity, IngestionStats,
};
use super::options::{PipelineOptions, FIRST_DATA_ROW};
use super::source::{CsvRecordSource, RawRecordSource};
use super::staging::StagedInput;

/// A single-use ingestion pipeline for records of type `T`.
///
/// The handler is any `FnMut(Vec<T>) -> Result<(), HandlerError>`. It receives each chunk by
/// value; the pipeline starts a fresh buffer for the next one.
///
/// Construction validates the options and resolves the schema's column mapping once. Each
/// `process*` call consumes the pipeline; build a new one for the next input.
///
/// ```rust
/// use csv_chunk_ingest::convert::{Float64Converter, YearMonthConverter};
/// use csv_chunk_ingest::ingestion::ChunkPipeline;
/// use csv_chunk_ingest::types::{Record, Schema};
///
/// # fn main() -> Result<(), csv_chunk_ingest::IngestionError> {
/// let schema = Schema::builder()
///     .column("NAME")
///     .column_with("YYMM", YearMonthConverter)
///     .column_with("AMT", Float64Converter)
///     .build();
///
/// let input = "NAME,YYMM,AMT\njohn,202301,10000\ndohun,202302,20000\n";
/// let mut seen = 0;
/// let stats = ChunkPipeline::<Record>::new(schema, 1)?.process(input.as_bytes(), |chunk: Vec<Record>| {
///     seen += chunk.len();
///     Ok(())
/// })?;
/// assert_eq!(seen, 2);
/// assert_eq!(stats.chunks, 3); // two full chunks, then the final empty one
/// # Ok(())
/// # }
/// ```
pub struct ChunkPipeline<T> {
    schema: Arc<Schema>,
    mapping: ColumnMapping,
    options: PipelineOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRecord> ChunkPipeline<T> {
    /// Pipeline with default options and the given chunk size.
    pub fn new(schema: Schema, chunk_size: usize) -> IngestionResult<Self> {
        Self::with_options(
            schema,
            PipelineOptions {
                chunk_size,
                ..Default::default()
            },
        )
    }

    pub fn with_options(schema: Schema, options: PipelineOptions) -> IngestionResult<Self> {
        let checked = options.validate().and_then(|()| {
            if schema.is_empty() {
                Err(IngestionError::EmptySchema)
            } else {
                Ok(())
            }
        });
        if let Err(e) = checked {
            error!(error = %e, ?options, "invalid pipeline configuration");
            return Err(e);
        }

        let mapping = mapping::resolve(&schema);
        debug!(
            ?mapping,
            fields = schema.fields.len(),
            chunk_size = options.chunk_size,
            "resolved column mapping"
        );
        Ok(Self {
            schema: Arc::new(schema),
            mapping,
            options,
            _marker: PhantomData,
        })
    }

    pub fn mapping(&self) -> ColumnMapping {
        self.mapping
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Leading lines consumed before the first data row.
    pub fn skip_lines(&self) -> usize {
        self.options.skip_lines.unwrap_or(self.mapping.skip_lines)
    }

    /// Ingest CSV text from any reader.
    pub fn process<R, H>(self, reader: R, handler: H) -> IngestionResult<IngestionStats>
    where
        R: Read,
        H: FnMut(Vec<T>) -> Result<(), HandlerError>,
    {
        let ctx = self.context("<reader>");
        let result = self
            .open_csv(reader)
            .and_then(|source| self.drive(&ctx, source, handler));
        self.report(&ctx, result)
    }

    /// Ingest a CSV file. Failing to open it is a setup error.
    pub fn process_path<H>(self, path: impl AsRef<Path>, handler: H) -> IngestionResult<IngestionStats>
    where
        H: FnMut(Vec<T>) -> Result<(), HandlerError>,
    {
        let path = path.as_ref();
        let ctx = self.context(&path.display().to_string());
        let result = File::open(path)
            .map_err(IngestionError::from)
            .and_then(|file| self.open_csv(file))
            .and_then(|source| self.drive(&ctx, source, handler));
        self.report(&ctx, result)
    }

    /// Stage an uploaded payload to a temporary file, ingest it, and remove the file again.
    ///
    /// The file is removed on every exit path, including parse and handler failures.
    pub fn process_upload<P, H>(self, payload: P, name: &str, handler: H) -> IngestionResult<IngestionStats>
    where
        P: Read,
        H: FnMut(Vec<T>) -> Result<(), HandlerError>,
    {
        let ctx = self.context(name);
        let staged = match self.options.staging_dir.as_deref() {
            Some(dir) => StagedInput::stage_in(dir, payload, name),
            None => StagedInput::stage(payload, name),
        };
        let result = staged.map_err(IngestionError::from).and_then(|staged| {
            let result = staged
                .open()
                .map_err(IngestionError::from)
                .and_then(|file| self.open_csv(file))
                .and_then(|source| self.drive(&ctx, source, handler));
            staged.cleanup();
            result
        });
        self.report(&ctx, result)
    }

    /// Ingest from an already-tokenized record source.
    pub fn process_source<S, H>(self, source: S, handler: H) -> IngestionResult<IngestionStats>
    where
        S: RawRecordSource,
        H: FnMut(Vec<T>) -> Result<(), HandlerError>,
    {
        let ctx = self.context("<records>");
        let result = self.drive(&ctx, source, handler);
        self.report(&ctx, result)
    }

    fn context(&self, label: &str) -> IngestionContext {
        IngestionContext {
            source: label.to_owned(),
            chunk_size: self.options.chunk_size,
            start_row: self.options.start_row,
        }
    }

    fn open_csv<R: Read>(&self, reader: R) -> IngestionResult<CsvRecordSource<R>> {
        CsvRecordSource::open(
            reader,
            self.options.delimiter,
            self.skip_lines(),
            self.mapping.mode == Some(BindingMode::ByName),
        )
    }

    fn drive<S, H>(&self, ctx: &IngestionContext, mut source: S, handler: H) -> IngestionResult<IngestionStats>
    where
        S: RawRecordSource,
        H: FnMut(Vec<T>) -> Result<(), HandlerError>,
    {
        info!(
            source = %ctx.source,
            chunk_size = ctx.chunk_size,
            start_row = ctx.start_row,
            mode = ?self.mapping.mode,
            skip_lines = self.skip_lines(),
            "starting chunked ingestion"
        );
        let materializer = Materializer::new(Arc::clone(&self.schema), source.headers())?;
        DispatchLoop::new(materializer, handler, &self.options, ctx).run(&mut source)
    }

    fn report(&self, ctx: &IngestionContext, result: IngestionResult<IngestionStats>) -> IngestionResult<IngestionStats> {
        match &result {
            Ok(stats) => {
                info!(
                    source = %ctx.source,
                    rows = stats.rows,
                    chunks = stats.chunks,
                    last_row = stats.last_row,
                    "chunked ingestion finished"
                );
                if let Some(obs) = self.options.observer.as_ref() {
                    obs.on_success(ctx, *stats);
                }
            }
            Err(e) => {
                let severity = IngestionSeverity::for_error(e);
                error!(
                    source = %ctx.source,
                    ?severity,
                    rows = ?e.rows(),
                    error = %error_chain(e),
                    "chunked ingestion failed"
                );
                if let Some(obs) = self.options.observer.as_ref() {
                    obs.on_failure(ctx, severity, e);
                    if severity >= self.options.alert_at_or_above {
                        obs.on_alert(ctx, severity, e);
                    }
                }
            }
        }
        result
    }
}

/// State of one run: the cursor and the chunk being filled.
struct DispatchLoop<'a, T, H> {
    materializer: Materializer<T>,
    handler: H,
    options: &'a PipelineOptions,
    ctx: &'a IngestionContext,
    /// Row number of the next raw record to be consumed.
    cursor: usize,
    /// Row number of the first record in `chunk`.
    chunk_start: usize,
    chunk: Vec<T>,
    rows: usize,
    chunks: usize,
}

impl<'a, T, H> DispatchLoop<'a, T, H>
where
    T: FromRecord,
    H: FnMut(Vec<T>) -> Result<(), HandlerError>,
{
    fn new(
        materializer: Materializer<T>,
        handler: H,
        options: &'a PipelineOptions,
        ctx: &'a IngestionContext,
    ) -> Self {
        Self {
            materializer,
            handler,
            options,
            ctx,
            cursor: FIRST_DATA_ROW,
            chunk_start: FIRST_DATA_ROW,
            chunk: Vec::with_capacity(options.chunk_size),
            rows: 0,
            chunks: 0,
        }
    }

    fn run<S: RawRecordSource>(mut self, source: &mut S) -> IngestionResult<IngestionStats> {
        while self.cursor < self.options.start_row {
            match source.next_record() {
                None => break,
                Some(Err(err)) => {
                    return Err(IngestionError::Parse {
                        row: self.cursor,
                        source: err,
                    });
                }
                Some(Ok(raw)) => {
                    trace!(row = self.cursor, line = raw.line, "skipped row before start row");
                    self.cursor += 1;
                }
            }
        }
        self.chunk_start = self.cursor;

        while let Some(next) = source.next_record() {
            let row = self.cursor;
            self.cursor += 1;
            let raw = next.map_err(|source| IngestionError::Parse { row, source })?;
            if raw.is_blank() {
                // Occupies a row, carries no record.
                trace!(row, line = raw.line, "blank line");
                continue;
            }
            let record = self
                .materializer
                .materialize(&raw)
                .map_err(|source| IngestionError::Parse { row, source })?;
            self.chunk.push(record);

            if self.chunk.len() == self.options.chunk_size {
                let chunk = std::mem::replace(&mut self.chunk, Vec::with_capacity(self.options.chunk_size));
                self.dispatch(chunk)?;
            }
        }

        let last = std::mem::take(&mut self.chunk);
        self.dispatch(last)?;

        Ok(IngestionStats {
            rows: self.rows,
            chunks: self.chunks,
            last_row: self.cursor - 1,
        })
    }

    /// Hand `chunk` to the handler.
    ///
    /// The reported span runs from the row the chunk started at to the last row consumed. For a
    /// full chunk this is `cursor - chunk_size ..= cursor - 1`. A trailing partial chunk, or the
    /// first chunk after a start-row skip, is not derived from `chunk_size`: rows 8 to 8 stay
    /// rows 8 to 8 and never widen to 6 to 8. The final empty chunk starts one past its end.
    fn dispatch(&mut self, chunk: Vec<T>) -> IngestionResult<()> {
        let start_row = self.chunk_start;
        let end_row = self.cursor - 1;
        let records = chunk.len();

        (self.handler)(chunk).map_err(|source| IngestionError::Handler {
            start_row,
            end_row,
            source,
        })?;

        self.rows += records;
        self.chunks += 1;
        self.chunk_start = self.cursor;
        debug!(start_row, end_row, records, "chunk dispatched");
        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_chunk(
                self.ctx,
                ChunkEvent {
                    start_row,
                    end_row,
                    records,
                },
            );
        }
        Ok(())
    }
}

/// One-shot ingestion of `reader` with `schema`, delivering chunks of `chunk_size` records from
/// `start_row` onwards.
pub fn process<T, R, H>(
    reader: R,
    schema: Schema,
    handler: H,
    chunk_size: usize,
    start_row: usize,
) -> IngestionResult<IngestionStats>
where
    T: FromRecord,
    R: Read,
    H: FnMut(Vec<T>) -> Result<(), HandlerError>,
{
    let options = PipelineOptions {
        chunk_size,
        start_row,
        ..Default::default()
    };
    ChunkPipeline::<T>::with_options(schema, options)?.process(reader, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Float64Converter, YearMonthConverter};
    use crate::error::RowError;
    use crate::ingestion::source::VecRecordSource;
    use crate::types::{Record, Value};

    fn amount_schema() -> Schema {
        Schema::builder()
            .column("ID")
            .column_with("AMT", Float64Converter)
            .build()
    }

    /// Header plus `n` data rows; data row `k` (file row `k + 1`) has ID `k`.
    fn csv_with_rows(n: usize) -> String {
        let mut out = String::from("ID,AMT\n");
        for k in 1..=n {
            out.push_str(&format!("{k},{k}.5\n"));
        }
        out
    }

    fn ids(chunk: &[Record]) -> Vec<String> {
        chunk
            .iter()
            .map(|r| match r.get("ID") {
                Some(Value::Utf8(s)) => s.clone(),
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    fn collect_chunks(input: &str, chunk_size: usize, start_row: usize) -> (IngestionStats, Vec<Vec<String>>) {
        let mut chunks = Vec::new();
        let stats = process(
            input.as_bytes(),
            amount_schema(),
            |chunk: Vec<Record>| {
                chunks.push(ids(&chunk));
                Ok(())
            },
            chunk_size,
            start_row,
        )
        .unwrap();
        (stats, chunks)
    }

    #[test]
    fn short_input_is_one_chunk_in_order() {
        let (stats, chunks) = collect_chunks(&csv_with_rows(3), 10, 2);
        assert_eq!(chunks, vec![vec!["1", "2", "3"]]);
        assert_eq!(
            stats,
            IngestionStats {
                rows: 3,
                chunks: 1,
                last_row: 4
            }
        );
    }

    #[test]
    fn exact_multiple_gets_trailing_empty_chunk() {
        let (stats, chunks) = collect_chunks(&csv_with_rows(6), 3, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec!["1", "2", "3"]);
        assert_eq!(chunks[1], vec!["4", "5", "6"]);
        assert!(chunks[2].is_empty());
        assert_eq!(stats.rows, 6);
    }

    #[test]
    fn header_only_input_dispatches_one_empty_chunk() {
        let (stats, chunks) = collect_chunks("ID,AMT\n", 3, 2);
        assert_eq!(chunks, vec![Vec::<String>::new()]);
        assert_eq!(stats.last_row, 1);
    }

    #[test]
    fn start_row_skips_leading_data_rows() {
        // File rows 2..=7 hold ids 1..=6; start at row 5 (id 4).
        let (_, chunks) = collect_chunks(&csv_with_rows(6), 10, 5);
        assert_eq!(chunks, vec![vec!["4", "5", "6"]]);
    }

    #[test]
    fn start_row_past_end_dispatches_empty_chunk() {
        let (stats, chunks) = collect_chunks(&csv_with_rows(2), 10, 50);
        assert_eq!(chunks, vec![Vec::<String>::new()]);
        assert_eq!(stats.rows, 0);
    }

    #[test]
    fn skipped_rows_are_not_materialized() {
        let input = "ID,AMT\n1,bad\n2,2\n";
        let (_, chunks) = collect_chunks(input, 10, 3);
        assert_eq!(chunks, vec![vec!["2"]]);
    }

    #[test]
    fn parse_failure_names_row_and_stops_dispatch() {
        // Row 6 (id 5) is broken; chunk size 2 means rows 2..=5 are dispatched first.
        let input = "ID,AMT\n1,1\n2,2\n3,3\n4,4\n5,oops\n6,6\n";
        let mut dispatched = Vec::new();
        let err = process(
            input.as_bytes(),
            amount_schema(),
            |chunk: Vec<Record>| {
                dispatched.push(ids(&chunk));
                Ok(())
            },
            2,
            2,
        )
        .unwrap_err();

        assert_eq!(dispatched, vec![vec!["1", "2"], vec!["3", "4"]]);
        match err {
            IngestionError::Parse {
                row,
                source: RowError::Conversion { column, source },
            } => {
                assert_eq!(row, 6);
                assert_eq!(column, "AMT");
                assert_eq!(source.raw, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn handler_failure_reports_full_chunk_span() {
        let mut calls = 0;
        let err = process(
            csv_with_rows(10).as_bytes(),
            amount_schema(),
            |_chunk: Vec<Record>| {
                calls += 1;
                if calls == 2 { Err("insert failed".into()) } else { Ok(()) }
            },
            4,
            2,
        )
        .unwrap_err();
        match err {
            IngestionError::Handler {
                start_row,
                end_row,
                source,
            } => {
                assert_eq!((start_row, end_row), (6, 9));
                assert_eq!(source.to_string(), "insert failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn handler_failure_on_partial_chunk_after_skip_reports_literal_rows() {
        // Start at row 10, rows 10..=11 form the only, partial chunk.
        let err = process(
            csv_with_rows(10).as_bytes(),
            amount_schema(),
            |_chunk: Vec<Record>| Err("nope".into()),
            5,
            10,
        )
        .unwrap_err();
        assert_eq!(err.rows(), Some((10, 11)));
    }

    #[test]
    fn handler_failure_on_trailing_partial_chunk() {
        let mut calls = 0;
        let err = process(
            csv_with_rows(7).as_bytes(),
            amount_schema(),
            |_chunk: Vec<Record>| {
                calls += 1;
                if calls == 3 { Err("late".into()) } else { Ok(()) }
            },
            3,
            2,
        )
        .unwrap_err();
        // Rows 2..=4, 5..=7 ok; final chunk holds row 8 only.
        assert_eq!(err.rows(), Some((8, 8)));
    }

    #[test]
    fn blank_line_still_counts_toward_the_failing_row() {
        // The bad value sits on file row 5; row 4 is empty.
        let input = "ID,AMT\n1,1\n2,2\n\n3,x\n";
        let err = process(input.as_bytes(), amount_schema(), |_chunk: Vec<Record>| Ok(()), 10, 2).unwrap_err();
        assert_eq!(err.to_string(), "failed to parse row 5");
        assert_eq!(err.rows(), Some((5, 5)));
    }

    #[test]
    fn blank_lines_are_skipped_but_stay_in_the_chunk_span() {
        // Rows 3 and 4 are empty, so the first chunk of two records spans rows 2..=5.
        let input = "ID,AMT\n1,1\n\n\n2,2\n3,3\n";
        let (stats, chunks) = collect_chunks(input, 2, 2);
        assert_eq!(chunks, vec![vec!["1", "2"], vec!["3"]]);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.last_row, 6);

        let err = process(
            input.as_bytes(),
            amount_schema(),
            |_chunk: Vec<Record>| Err("sink closed".into()),
            2,
            2,
        )
        .unwrap_err();
        assert_eq!(err.rows(), Some((2, 5)));
    }

    #[test]
    fn blank_lines_before_start_row_are_skipped_rows() {
        // Rows: 2 id 1, 3 empty, 4 id 2, 5 id 3.
        let (_, chunks) = collect_chunks("ID,AMT\n1,1\n\n2,2\n3,3\n", 10, 5);
        assert_eq!(chunks, vec![vec!["3"]]);
    }

    #[test]
    fn construction_rejects_zero_chunk_size_and_empty_schema() {
        assert!(matches!(
            ChunkPipeline::<Record>::new(amount_schema(), 0),
            Err(IngestionError::InvalidChunkSize { chunk_size: 0 })
        ));
        assert!(matches!(
            ChunkPipeline::<Record>::new(Schema::new(Vec::new()), 5),
            Err(IngestionError::EmptySchema)
        ));
    }

    #[test]
    fn positional_schema_with_header_override() {
        let schema = Schema::builder()
            .position("name", 1)
            .position_with("ym", 2, YearMonthConverter)
            .build();
        let options = PipelineOptions {
            chunk_size: 10,
            skip_lines: Some(1),
            ..Default::default()
        };
        let pipeline = ChunkPipeline::<Vec<Value>>::with_options(schema, options).unwrap();
        assert_eq!(pipeline.skip_lines(), 1);

        let mut got = Vec::new();
        pipeline
            .process("NO,NAME,YYMM\n01,john,202301\n".as_bytes(), |chunk: Vec<Vec<Value>>| {
                got.extend(chunk);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            got,
            vec![vec![Value::Utf8("john".to_string()), Value::Utf8("2023-01".to_string())]]
        );
    }

    #[test]
    fn process_source_reads_pretokenized_rows() {
        let source = VecRecordSource::with_headers(
            vec!["ID".to_string(), "AMT".to_string()],
            vec![
                vec!["a".to_string(), "1".to_string()],
                vec!["b".to_string(), "".to_string()],
            ],
        );
        let mut got = Vec::new();
        let stats = ChunkPipeline::<Vec<Value>>::new(amount_schema(), 1)
            .unwrap()
            .process_source(source, |chunk: Vec<Vec<Value>>| {
                got.extend(chunk);
                Ok(())
            })
            .unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(got[1], vec![Value::Utf8("b".to_string()), Value::Float64(0.0)]);
    }

    #[test]
    fn missing_header_column_fails_before_any_dispatch() {
        let mut calls = 0;
        let err = process(
            "ID,TOTAL\n1,2\n".as_bytes(),
            amount_schema(),
            |_chunk: Vec<Record>| {
                calls += 1;
                Ok(())
            },
            10,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, IngestionError::SchemaMismatch { .. }));
        assert_eq!(calls, 0);
    }
}
