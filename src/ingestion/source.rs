//! Raw record sources.
//!
//! A source yields already-tokenized lines, forward only. Quoting, embedded delimiters and
//! newlines are the tokenizer's concern; the pipeline only sees field sequences.

use std::io::{Chain, Read};
use std::ops::Range;

use crate::error::{IngestionResult, RowError};

const UTF8_BOM: char = '\u{feff}';

/// One input line split into text fields.
///
/// A blank line is a record with no fields at all; the tokenizer never yields those for real
/// content, which always has at least one (possibly empty) field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Physical line the record starts on (1-based).
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn blank(line: u64) -> Self {
        Self {
            line,
            fields: Vec::new(),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }

    pub fn is_blank(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A lazy, finite, forward-only sequence of [`RawRecord`]s.
pub trait RawRecordSource {
    /// Header names, when a header line was consumed.
    fn headers(&self) -> Option<&[String]> {
        None
    }

    /// The next record, or `None` once the input is exhausted.
    fn next_record(&mut self) -> Option<Result<RawRecord, RowError>>;
}

/// [`RawRecordSource`] backed by [`csv::Reader`].
///
/// Lines end in `\n` or `\r\n`. `csv` drops empty lines silently, but they still occupy a file
/// row, so this source reports each one as a [`RawRecord::blank`] ahead of the record that
/// follows it. Blank lines after the last record carry no row and may go unreported.
pub struct CsvRecordSource<R: Read> {
    reader: csv::Reader<Chain<R, &'static [u8]>>,
    record: csv::StringRecord,
    headers: Option<Vec<String>>,
    first_read: bool,
    /// Line the next record starts on when no blank lines come first.
    next_line: u64,
    blank_lines: Range<u64>,
    pending: Option<RawRecord>,
}

impl<R: Read> CsvRecordSource<R> {
    /// Wrap `reader`, consuming `skip_lines` leading lines.
    ///
    /// When `read_header` is set, the last skipped line is kept as the header line.
    pub fn open(reader: R, delimiter: u8, skip_lines: usize, read_header: bool) -> IngestionResult<Self> {
        // A final newline makes the last record terminated, so its start line is computable.
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_reader(reader.chain(&b"\n"[..]));
        let mut source = Self {
            reader,
            record: csv::StringRecord::new(),
            headers: None,
            first_read: true,
            next_line: 1,
            blank_lines: 0..0,
            pending: None,
        };

        for i in 0..skip_lines {
            let Some(raw) = source.read_line()? else {
                break;
            };
            if read_header && i + 1 == skip_lines {
                source.headers = Some(raw.fields.into_iter().map(|h| h.trim().to_owned()).collect());
            }
        }
        Ok(source)
    }

    fn read_line(&mut self) -> Result<Option<RawRecord>, csv::Error> {
        if let Some(line) = self.blank_lines.next() {
            return Ok(Some(RawRecord::blank(line)));
        }
        if let Some(raw) = self.pending.take() {
            return Ok(Some(raw));
        }

        let read = self.reader.read_record(&mut self.record);
        // The reader's line count sits just past the terminator of what was consumed.
        let end = self.reader.position().line();
        match read {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                self.next_line = end;
                return Err(e);
            }
        }

        let embedded: u64 = self
            .record
            .iter()
            .map(|f| f.bytes().filter(|&b| b == b'\n').count() as u64)
            .sum();
        let start = end.saturating_sub(embedded + 1).max(self.next_line);
        let skipped = self.next_line..start;
        self.next_line = end;

        let mut fields: Vec<String> = self.record.iter().map(str::to_owned).collect();
        if std::mem::take(&mut self.first_read) {
            if let Some(first) = fields.first_mut() {
                if let Some(stripped) = first.strip_prefix(UTF8_BOM) {
                    *first = stripped.to_owned();
                }
            }
        }
        let crlf_blank = fields.len() == 1 && fields[0] == "\r";
        if let Some(last) = fields.last_mut() {
            if last.ends_with('\r') {
                last.pop();
            }
        }
        let raw = if crlf_blank {
            RawRecord::blank(start)
        } else {
            RawRecord { line: start, fields }
        };

        if skipped.is_empty() {
            return Ok(Some(raw));
        }
        self.pending = Some(raw);
        self.blank_lines = skipped;
        Ok(self.blank_lines.next().map(RawRecord::blank))
    }
}

impl<R: Read> RawRecordSource for CsvRecordSource<R> {
    fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    fn next_record(&mut self) -> Option<Result<RawRecord, RowError>> {
        self.read_line().map_err(RowError::Read).transpose()
    }
}

/// In-memory [`RawRecordSource`] over pre-tokenized rows.
#[derive(Debug, Clone, Default)]
pub struct VecRecordSource {
    headers: Option<Vec<String>>,
    rows: std::vec::IntoIter<Vec<String>>,
    line: u64,
}

impl VecRecordSource {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: None,
            rows: rows.into_iter(),
            line: 0,
        }
    }

    pub fn with_headers(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: Some(headers),
            rows: rows.into_iter(),
            line: 1,
        }
    }
}

impl RawRecordSource for VecRecordSource {
    fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    fn next_record(&mut self) -> Option<Result<RawRecord, RowError>> {
        let fields = self.rows.next()?;
        self.line += 1;
        Some(Ok(RawRecord {
            line: self.line,
            fields,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut source: impl RawRecordSource) -> Vec<RawRecord> {
        let mut out = Vec::new();
        while let Some(rec) = source.next_record() {
            out.push(rec.unwrap());
        }
        out
    }

    #[test]
    fn header_line_is_consumed_and_bom_stripped() {
        let input = "\u{feff}NO, NAME\n01,john\n02,dohun\n";
        let source = CsvRecordSource::open(input.as_bytes(), b',', 1, true).unwrap();
        assert_eq!(
            source.headers().unwrap(),
            &["NO".to_string(), "NAME".to_string()][..]
        );
        let records = drain(source);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields, vec!["01", "john"]);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn positional_source_yields_every_line() {
        let input = "01,john\n02,dohun\n";
        let source = CsvRecordSource::open(input.as_bytes(), b',', 0, false).unwrap();
        assert!(source.headers().is_none());
        let records = drain(source);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
    }

    #[test]
    fn bom_on_first_data_line_is_stripped_without_header() {
        let input = "\u{feff}01,john\n";
        let records = drain(CsvRecordSource::open(input.as_bytes(), b',', 0, false).unwrap());
        assert_eq!(records[0].fields[0], "01");
    }

    #[test]
    fn skipping_past_end_of_input_is_not_an_error() {
        let source = CsvRecordSource::open("".as_bytes(), b',', 3, true).unwrap();
        assert!(source.headers().is_none());
        assert!(drain(source).is_empty());
    }

    #[test]
    fn custom_delimiter_and_quoting() {
        let input = "a;\"b;c\"\n";
        let records = drain(CsvRecordSource::open(input.as_bytes(), b';', 0, false).unwrap());
        assert_eq!(records[0].fields, vec!["a", "b;c"]);
    }

    #[test]
    fn blank_lines_are_reported_with_their_line() {
        let input = "NAME\na\n\n\nb\n";
        let records = drain(CsvRecordSource::open(input.as_bytes(), b',', 1, true).unwrap());
        assert_eq!(
            records,
            vec![
                RawRecord {
                    line: 2,
                    fields: vec!["a".to_string()]
                },
                RawRecord::blank(3),
                RawRecord::blank(4),
                RawRecord {
                    line: 5,
                    fields: vec!["b".to_string()]
                },
            ]
        );
    }

    #[test]
    fn quoted_newlines_and_missing_final_newline_keep_lines_exact() {
        let input = "a,\"x\ny\"\nb,c\n\nd,e";
        let records = drain(CsvRecordSource::open(input.as_bytes(), b',', 0, false).unwrap());
        let lines: Vec<(u64, bool)> = records.iter().map(|r| (r.line, r.is_blank())).collect();
        assert_eq!(lines, vec![(1, false), (3, false), (4, true), (5, false)]);
        assert_eq!(records[0].fields, vec!["a", "x\ny"]);
    }

    #[test]
    fn crlf_blank_lines_are_reported() {
        let input = "a\r\n\r\nb\r\n";
        let records = drain(CsvRecordSource::open(input.as_bytes(), b',', 0, false).unwrap());
        let lines: Vec<(u64, bool)> = records.iter().map(|r| (r.line, r.is_blank())).collect();
        assert_eq!(lines, vec![(1, false), (2, true), (3, false)]);
        assert_eq!(records[2].fields, vec!["b"]);
    }

    #[test]
    fn trailing_blank_lines_are_dropped() {
        let records = drain(CsvRecordSource::open("a\n\n\n".as_bytes(), b',', 0, false).unwrap());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn vec_source_numbers_lines_after_header() {
        let source = VecRecordSource::with_headers(
            vec!["A".to_string()],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        );
        let records = drain(source);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].line, 3);
    }
}
