//! Prediction history
//!
//! - `record`: the row type, its enumerations and the form input
//! - `store`: CSV file with append, ordinal listing and bulk delete

pub mod record;
pub mod store;

pub use record::{
    DietType, PredictionInput, PredictionRecord, Region, Sex, StressLevel, YesNo, TIMESTAMP_FORMAT,
};
pub use store::{HistoryLedger, LedgerEntry};
