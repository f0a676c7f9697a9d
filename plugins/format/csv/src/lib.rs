mod parser;
mod source;

pub use source::{CsvRecordSource, CsvSourceConfig, HeaderMode};
