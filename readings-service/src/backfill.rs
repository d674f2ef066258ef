use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ledger::{LedgerError, ReadingLedger};
use crate::photos::display_date;
use crate::registry::valid_meter_id;

/// CSV import for historical readings.
///
/// Expected header columns (by name):
/// - meter_id
/// - user
/// - closing
/// - ts (optional, RFC3339; stored in the ledger's display format, import
///   time when absent)
/// - photo (optional reference, stored verbatim)
///
/// Rows run through the same chain derivation as live submissions, in file
/// order. Rows that fail to parse or fall below the recorded chain are
/// skipped and counted, not fatal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSummary {
    pub inserted: u64,
    pub skipped: u64,
}

struct ParsedRow {
    meter_id: String,
    user: String,
    closing: f64,
    date: String,
    photo: String,
}

fn parse_row(record: &StringRecord, headers: &StringRecord) -> Result<ParsedRow, String> {
    let get = |name: &str| -> Result<&str, String> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| format!("missing column '{name}'"))
    };

    let meter_id = get("meter_id")?.trim().to_string();
    if !valid_meter_id(&meter_id) {
        return Err(format!("invalid meter_id '{meter_id}'"));
    }
    let user = get("user")?.trim().to_string();

    let closing_str = get("closing")?;
    let closing: f64 = closing_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid closing '{closing_str}': {e}"))?;
    if !closing.is_finite() {
        return Err(format!("non-finite closing '{closing_str}'"));
    }

    let date = match get("ts").ok().map(str::trim).filter(|s| !s.is_empty()) {
        Some(ts_str) => {
            let ts = OffsetDateTime::parse(ts_str, &Rfc3339)
                .map_err(|e| format!("invalid ts '{ts_str}': {e}"))?;
            display_date(ts)
        }
        None => display_date(OffsetDateTime::now_utc()),
    };

    let photo = get("photo").ok().map(str::trim).unwrap_or("").to_string();

    Ok(ParsedRow {
        meter_id,
        user,
        closing,
        date,
        photo,
    })
}

pub async fn run(ledger: &ReadingLedger, path: &Path) -> Result<BackfillSummary> {
    let file = File::open(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers().context("failed to read CSV headers")?.clone();

    let mut summary = BackfillSummary::default();

    for (idx, result) in rdr.records().enumerate() {
        let record = result.context("failed to read CSV record")?;
        // Header occupies line 1.
        let line = idx + 2;

        let row = match parse_row(&record, &headers) {
            Ok(row) => row,
            Err(reason) => {
                metrics::counter!("backfill_rows_skipped_total").increment(1);
                tracing::warn!(line, reason = %reason, "skipping unparsable row");
                summary.skipped += 1;
                continue;
            }
        };

        match ledger
            .backfill(&row.meter_id, &row.user, row.closing, &row.date, &row.photo)
            .await
        {
            Ok(_) => {
                metrics::counter!("backfill_rows_inserted_total").increment(1);
                summary.inserted += 1;
            }
            Err(LedgerError::NonMonotonicReading { opening, closing }) => {
                metrics::counter!("backfill_rows_skipped_total").increment(1);
                tracing::warn!(
                    line,
                    meter_id = %row.meter_id,
                    closing,
                    opening,
                    "skipping reading below the recorded chain"
                );
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}
