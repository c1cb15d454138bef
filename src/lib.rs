//! CSV ingestion into Postgres and resumable embedding backfill.
pub mod cli;
pub mod config;
pub mod database_ops;
pub mod env_boot;
pub mod error;
pub mod normalization;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use error::{FailureReason, IngestError, RecordFailure, StoreError};
