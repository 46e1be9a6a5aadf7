//! Data models for CdrReport

mod record;
mod report;
mod row;

pub use record::*;
pub use report::*;
pub use row::*;
