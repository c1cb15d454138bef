//! One import run: CSV file -> mapper -> duplicate resolver -> batch writer.
use std::fmt;
use std::path::Path;

use tracing::{info, instrument, warn};

use super::dedupe::DuplicateResolver;
use super::store::RecordStore;
use super::upsert::BatchWriter;
use crate::config::IngestConfig;
use crate::error::{FailureReason, IngestError, RecordFailure};
use crate::normalization::encoding::{decode_csv, DecodeFailure, TextEncoding};
use crate::normalization::{EntityDescriptor, Mapped, RawRow, RecordMapper};

/// What one run did, end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub entity: &'static str,
    pub encoding: TextEncoding,
    pub rows_read: usize,
    /// Rows the CSV reader could not parse at all.
    pub unreadable_rows: usize,
    pub admitted: usize,
    pub inadmissible: usize,
    pub ambiguous_dates: usize,
    pub unkeyable: usize,
    pub duplicate_groups: usize,
    pub duplicates_discarded: usize,
    pub written: u64,
    pub failed: u64,
    pub failures: Vec<RecordFailure>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} import ({})", self.entity, self.encoding)?;
        writeln!(f, "  rows read:            {}", self.rows_read)?;
        writeln!(f, "  unreadable rows:      {}", self.unreadable_rows)?;
        writeln!(f, "  admitted:             {}", self.admitted)?;
        writeln!(f, "  inadmissible:         {}", self.inadmissible)?;
        writeln!(f, "  ambiguous dates:      {}", self.ambiguous_dates)?;
        writeln!(f, "  unkeyable:            {}", self.unkeyable)?;
        writeln!(
            f,
            "  deduplicated away:    {} ({} keys)",
            self.duplicates_discarded, self.duplicate_groups
        )?;
        writeln!(f, "  written:              {}", self.written)?;
        write!(f, "  failed:               {}", self.failed)
    }
}

fn decode_error(path: &Path, failure: DecodeFailure) -> IngestError {
    match failure {
        DecodeFailure::Undecodable => IngestError::Undecodable(path.to_path_buf()),
        DecodeFailure::MissingColumns { encoding, missing } => IngestError::MissingColumns {
            path: path.to_path_buf(),
            encoding: encoding.to_string(),
            missing,
        },
    }
}

/// Import one CSV file. Only missing input, an unusable header, or I/O errors are
/// fatal; every per-row problem is counted in the summary.
#[instrument(skip(store, descriptor, config), fields(entity = descriptor.kind.label()))]
pub async fn run_import<S>(
    store: &S,
    descriptor: &EntityDescriptor,
    path: &Path,
    config: &IngestConfig,
) -> Result<ImportSummary, IngestError>
where
    S: RecordStore + ?Sized,
{
    if !path.is_file() {
        return Err(IngestError::InputNotFound(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await?;
    let (encoding, text) =
        decode_csv(&bytes, &descriptor.required_sources()).map_err(|f| decode_error(path, f))?;
    info!(%encoding, bytes = bytes.len(), "decoded input");

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let mapper = RecordMapper::new(descriptor, config.mapper_options());
    let mut admitted = Vec::new();
    let mut failures = Vec::new();
    let mut rows_read = 0usize;
    let mut unreadable_rows = 0usize;
    let mut inadmissible = 0usize;
    let mut ambiguous_dates = 0usize;

    for (idx, result) in rdr.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                unreadable_rows += 1;
                warn!(line, error = %e, "unreadable csv row");
                continue;
            }
        };
        rows_read += 1;
        let outcome = mapper.map_row(&RawRow::from_record(&headers, &record));
        ambiguous_dates += outcome.ambiguous_dates;
        match outcome.mapped {
            Mapped::Admissible(rec) => admitted.push(rec),
            Mapped::Inadmissible { missing } => {
                inadmissible += 1;
                failures.push(RecordFailure {
                    key: format!("line {line}"),
                    reason: FailureReason::MissingRequired { field: missing },
                });
            }
        }
    }
    let admitted_count = admitted.len();
    info!(rows_read, admitted = admitted_count, inadmissible, "rows mapped");

    let resolution = DuplicateResolver::new(descriptor).resolve(admitted);
    failures.extend(resolution.failures);
    info!(
        kept = resolution.records.len(),
        duplicate_groups = resolution.duplicate_groups,
        discarded = resolution.discarded,
        unkeyable = resolution.unkeyable,
        "duplicates resolved"
    );

    let report = BatchWriter::new(config.batch_size)
        .write(store, descriptor, &resolution.records)
        .await;
    failures.extend(report.failures);

    let summary = ImportSummary {
        entity: descriptor.kind.label(),
        encoding,
        rows_read,
        unreadable_rows,
        admitted: admitted_count,
        inadmissible,
        ambiguous_dates,
        unkeyable: resolution.unkeyable,
        duplicate_groups: resolution.duplicate_groups,
        duplicates_discarded: resolution.discarded,
        written: report.written,
        failed: report.failed,
        failures,
    };
    info!(
        written = summary.written,
        failed = summary.failed,
        deduplicated = summary.duplicates_discarded,
        "import complete"
    );
    Ok(summary)
}
