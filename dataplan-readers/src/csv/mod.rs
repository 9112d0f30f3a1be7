//! CSV record reader
//!
//! Rows are mapped to schema columns by header name, or by the declared column
//! layout for headerless files. Only the columns of the (possibly pruned)
//! schema are parsed; list, set and struct cells hold JSON text.

mod parser;
mod reader;

pub use parser::CsvParser;
pub use reader::{CsvReaderOptions, CsvRecordReader};
