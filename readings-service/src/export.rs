use axum::body::Bytes;
use futures::{Stream, TryStreamExt};
use meter_ledger::db::ledger_queries;
use meter_ledger::ReadingWithLocation;
use sqlx::SqlitePool;

use crate::ledger::LedgerError;

pub const CSV_FILENAME: &str = "energy_readings.csv";
pub const CSV_HEADER: &str = "Meter ID,Location,Opening,Closing,Consumption,User,Date,Photo";

/// Reduce a stored photo reference to its basename for display and export.
pub fn photo_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// One export line, newline-terminated. No quoting: the input domain is
/// controlled and embedded commas are not expected.
pub fn csv_row(r: &ReadingWithLocation) -> String {
    format!(
        "{},{},{},{},{},{},{},{}\n",
        r.meter_id,
        r.location,
        r.opening,
        r.closing,
        r.consumption,
        r.user,
        r.date,
        photo_basename(&r.photo)
    )
}

/// Lazily produce the export: the header line, then one line per reading,
/// newest first, straight off the database cursor. The ledger is never
/// materialized as a whole.
pub fn csv_stream(pool: SqlitePool) -> impl Stream<Item = Result<Bytes, LedgerError>> {
    async_stream::try_stream! {
        yield Bytes::from(format!("{CSV_HEADER}\n"));

        let mut rows =
            sqlx::query_as::<_, ReadingWithLocation>(ledger_queries::WITH_LOCATION_SQL)
                .fetch(&pool);

        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
        {
            yield Bytes::from(csv_row(&row));
        }
    }
}
