//! # CdrReport
//!
//! KPI and billing reports from call detail records.
//!
//! CdrReport turns a batch of decoded call detail records (CDRs) into grouped,
//! multi-metric summary tables: an operational KPI report per date and
//! location, and a billing report per date.
//!
//! ## Architecture
//!
//! - **Catalog**: Declarative metric rules (predicate, reduction, optional percentage-of)
//! - **Engine**: Date filtering, grouping, per-group evaluation, grand-total synthesis, progress/ETA
//! - **IO**: CSV decoding of CDR files and delimited-text export
//!
//! ## Quick Start
//!
//! ```bash
//! # KPI report for January
//! cdrreport kpi --input calls.csv --from 2024-01-01 --to 2024-01-31
//!
//! # Billing report
//! cdrreport billing --input calls.csv
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod models;

pub use config::Config;
pub use engine::{compute_billing_report, compute_kpi_report};
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::catalog::{MetricCatalog, MetricRule, Predicate, Reduction};
    pub use crate::config::Config;
    pub use crate::engine::{
        AggregationEngine, CancelFlag, DateRange, GroupingKey, NoProgress, ProgressEvent,
        ProgressSink,
    };
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
