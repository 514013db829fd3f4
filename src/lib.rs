//! insurance-predictor - health insurance cost prediction service
//!
//! Authenticated users submit personal and health attributes and receive a
//! predicted insurance cost from a tree-ensemble regressor trained on an
//! insurance dataset. Each prediction is appended to a CSV history and
//! rendered as a one-page PDF report.
//!
//! ## Components
//!
//! - **auth**: password policy, hashing, JSON credential file
//! - **model**: dataset encoding, random forest, process-wide model cache
//! - **ledger**: CSV prediction history with ordinal ids
//! - **report**: PDF report rendering and storage
//! - **session**: session state machine and bearer-token sessions
//! - **routes** / **server**: JSON HTTP API over hyper

pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod report;
pub mod routes;
pub mod server;
pub mod session;

pub use config::{Args, Config};
pub use error::{PredictorError, Result};
pub use server::{run, AppState};
