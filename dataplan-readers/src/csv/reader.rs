//! CSV reader implementation

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use dataplan_core::{Record, Schema};
use tracing::debug;

use crate::common::{Projection, RecordReader};
use crate::error::Result;

use super::parser::CsvParser;

/// Options for CSV reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReaderOptions {
    /// Whether the CSV has a header row
    pub has_header: bool,

    /// Delimiter character
    pub delimiter: u8,

    /// Quote character
    pub quote: u8,

    /// Whether to trim whitespace
    pub trim: bool,
}

impl Default for CsvReaderOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote: b'"',
            trim: false,
        }
    }
}

impl CsvReaderOptions {
    fn builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(self.has_header)
            .flexible(true)
            .trim(if self.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            });
        builder
    }
}

/// Reads CSV rows as records of a schema
pub struct CsvRecordReader<R: Read> {
    /// Inner CSV reader
    reader: csv::Reader<R>,

    /// CSV parser
    parser: CsvParser,

    /// Reusable row buffer
    row: StringRecord,

    /// Whether the reader is exhausted
    exhausted: bool,

    /// Rows read so far
    rows_read: usize,
}

impl<R: Read> CsvRecordReader<R> {
    /// Create a reader locating schema columns through the header row, or by
    /// position when there is no header
    pub fn new(reader: R, schema: Schema, options: &CsvReaderOptions) -> Result<Self> {
        let mut reader = options.builder().from_reader(reader);
        let columns: Vec<String> = if options.has_header {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            schema.column_names()
        };
        Self::build(reader, schema, &columns)
    }

    /// Create a reader for rows laid out as `columns`, whatever the header says
    pub fn with_columns<S: AsRef<str>>(
        reader: R,
        schema: Schema,
        columns: &[S],
        options: &CsvReaderOptions,
    ) -> Result<Self> {
        Self::build(options.builder().from_reader(reader), schema, columns)
    }

    fn build<S: AsRef<str>>(reader: csv::Reader<R>, schema: Schema, columns: &[S]) -> Result<Self> {
        let projection = Projection::from_names(&schema, columns)?;
        debug!(
            schema = schema.name(),
            columns = ?schema.column_names(),
            source_columns = columns.len(),
            "opening CSV reader"
        );
        Ok(Self {
            reader,
            parser: CsvParser::new(schema, projection),
            row: StringRecord::new(),
            exhausted: false,
            rows_read: 0,
        })
    }

    /// Number of rows read so far
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}

impl CsvRecordReader<File> {
    /// Open a CSV file
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        schema: Schema,
        options: &CsvReaderOptions,
    ) -> Result<Self> {
        Self::new(File::open(path)?, schema, options)
    }
}

impl<R: Read> RecordReader for CsvRecordReader<R> {
    fn schema(&self) -> &Schema {
        self.parser.schema()
    }

    fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(max_rows.min(1024));
        while records.len() < max_rows {
            if !self.reader.read_record(&mut self.row)? {
                self.exhausted = true;
                break;
            }
            records.push(self.parser.parse_record(&self.row)?);
        }
        self.rows_read += records.len();
        if records.is_empty() && self.exhausted {
            return Ok(None);
        }
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use dataplan_core::{DataType, RecordType, Value};
    use std::io::{Cursor, Write};

    fn sale() -> Schema {
        Schema::from_record_type(
            &RecordType::new("reader.Sale")
                .field("id", DataType::Int64)
                .field("name", DataType::String)
                .field("amount", DataType::Float64),
        )
        .unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    const SALES: &str = "id,name,amount\n1,a,5.0\n2,a,-1.0\n3,b,2.0\n";

    #[test]
    fn test_read_all_with_header() {
        let mut reader =
            CsvRecordReader::new(Cursor::new(SALES), sale(), &CsvReaderOptions::default()).unwrap();
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(reader.rows_read(), 3);
        assert_eq!(records[2].value("name"), Value::from("b"));
        assert_eq!(records[1].value("amount"), Value::Float(-1.0));
    }

    #[test]
    fn test_batches() {
        let mut reader =
            CsvRecordReader::new(Cursor::new(SALES), sale(), &CsvReaderOptions::default()).unwrap();
        assert_eq!(reader.next_batch(2).unwrap().map(|b| b.len()), Some(2));
        assert_eq!(reader.next_batch(2).unwrap().map(|b| b.len()), Some(1));
        assert!(reader.next_batch(2).unwrap().is_none());
    }

    #[test]
    fn test_pruned_schema_reads_used_columns() {
        init_tracing();
        let mut schema = sale();
        schema.retain_columns(&["amount", "id"]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"name;amount;id\nx;1.5;7\n").unwrap();

        let options = CsvReaderOptions {
            delimiter: b';',
            ..CsvReaderOptions::default()
        };
        let records = CsvRecordReader::from_path(file.path(), schema, &options)
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].names(), vec!["id", "amount"]);
        assert_eq!(records[0].value("id"), Value::Int(7));
    }

    #[test]
    fn test_headerless_rows_use_declared_layout() {
        init_tracing();
        let mut schema = sale();
        schema.retain_columns(&["name"]);
        let options = CsvReaderOptions {
            has_header: false,
            ..CsvReaderOptions::default()
        };
        let records = CsvRecordReader::with_columns(
            Cursor::new("1,a,5.0\n3,b,2.0\n"),
            schema,
            &["id", "name", "amount"],
            &options,
        )
        .unwrap()
        .read_all()
        .unwrap();
        let names: Vec<_> = records.iter().map(|r| r.value("name")).collect();
        assert_eq!(names, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_bad_cell_is_format_error() {
        let mut reader = CsvRecordReader::new(
            Cursor::new("id,name,amount\nx,a,1.0\n"),
            sale(),
            &CsvReaderOptions::default(),
        )
        .unwrap();
        assert!(matches!(reader.read_all(), Err(Error::Format(_))));
    }
}
