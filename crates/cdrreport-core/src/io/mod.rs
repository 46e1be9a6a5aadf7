//! File I/O around the engine
//!
//! Decoding of CDR files into typed records and export of finished reports.
//! Neither side holds report logic.

pub mod export;
pub mod reader;

pub use export::{default_file_name, write_json, write_report, write_report_to_path};
pub use reader::{load_records, read_records};
