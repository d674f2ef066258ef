use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use meter_ledger::db::ledger_queries;
use meter_ledger::{Reading, ReadingWithLocation};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;

use crate::auth::DeletePolicy;
use crate::photos::{display_date, photo_filename, PhotoStore, PhotoStoreError};
use crate::registry::MeterRegistry;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("no photo attached to the reading")]
    MissingPhoto,
    #[error("closing reading {closing} is below the last recorded value {opening}")]
    NonMonotonicReading { opening: f64, closing: f64 },
    #[error("Not authorized")]
    NotAuthorized,
    #[error("reading {0} does not exist")]
    NotFound(i64),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<PhotoStoreError> for LedgerError {
    fn from(e: PhotoStoreError) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

/// Append-only log of submitted readings.
///
/// Owns the derivation of every stored value a user does not supply: the
/// opening value (previous closing, 0.0 for a first reading), the
/// consumption delta, the display timestamp and the photo filename.
pub struct ReadingLedger {
    pool: SqlitePool,
    registry: MeterRegistry,
    photos: Arc<dyn PhotoStore>,
    delete_policy: Arc<dyn DeletePolicy>,
    // One lock per meter; submissions for different meters do not contend.
    // Entries are pruned when the last holder releases.
    meter_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ReadingLedger {
    pub fn new(
        pool: SqlitePool,
        registry: MeterRegistry,
        photos: Arc<dyn PhotoStore>,
        delete_policy: Arc<dyn DeletePolicy>,
    ) -> Self {
        Self {
            pool,
            registry,
            photos,
            delete_policy,
            meter_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn meter_lock(&self, meter_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.meter_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(meter_id.to_string()).or_default().clone()
    }

    /// Drop the map entry once no task holds or awaits its lock. An entry
    /// removed here can only be one the caller just released, so a fresh
    /// entry never coexists with an active holder.
    fn prune_meter_lock(&self, meter_id: &str) {
        let mut locks = self.meter_locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(meter_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(meter_id);
            }
        }
    }

    /// Closing value of the meter's most recent reading, or 0.0 if none.
    /// This is the opening value the next submission will receive.
    pub async fn latest_closing(&self, meter_id: &str) -> Result<f64, LedgerError> {
        Ok(ledger_queries::latest_closing(&self.pool, meter_id).await?)
    }

    /// Validate and commit one reading.
    ///
    /// The read-validate-store-insert window runs under the per-meter lock,
    /// so concurrent submissions for one meter cannot observe the same
    /// opening value. The photo is persisted before the row: a committed
    /// reading never references a photo that failed to save. The reverse can
    /// still leave an orphaned file if the insert fails afterwards.
    pub async fn submit(
        &self,
        meter_id: &str,
        user: &str,
        closing: f64,
        photo: Option<&[u8]>,
    ) -> Result<Reading, LedgerError> {
        let photo = match photo {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                metrics::counter!("readings_rejected_total").increment(1);
                return Err(LedgerError::MissingPhoto);
            }
        };

        if !self.registry.exists(meter_id).await? {
            // Accepted anyway: the join hides it from reports until the
            // meter is registered.
            tracing::warn!(meter_id, "reading submitted for unregistered meter");
        }

        let lock = self.meter_lock(meter_id);
        let result = {
            let _guard = lock.lock().await;
            self.commit(meter_id, user, closing, photo).await
        };
        drop(lock);
        self.prune_meter_lock(meter_id);
        result
    }

    async fn commit(
        &self,
        meter_id: &str,
        user: &str,
        closing: f64,
        photo: &[u8],
    ) -> Result<Reading, LedgerError> {
        let opening = ledger_queries::latest_closing(&self.pool, meter_id).await?;
        // NaN and infinite closings fail this guard as well.
        if !closing.is_finite() || closing < opening {
            metrics::counter!("readings_rejected_total").increment(1);
            tracing::warn!(meter_id, closing, opening, "rejected non-monotonic reading");
            return Err(LedgerError::NonMonotonicReading { opening, closing });
        }
        let consumption = closing - opening;

        let now = OffsetDateTime::now_utc();
        let stored = self.photos.save(&photo_filename(meter_id, now), photo).await?;

        let reading = ledger_queries::insert_reading(
            &self.pool,
            meter_id,
            opening,
            closing,
            consumption,
            user,
            &display_date(now),
            &stored,
        )
        .await?;

        metrics::counter!("readings_submitted_total").increment(1);
        tracing::info!(
            meter_id,
            user,
            reading_id = reading.id,
            consumption,
            "reading committed"
        );

        Ok(reading)
    }

    /// Insert a historical reading through the same chain derivation and
    /// monotonicity check as `submit`, trusting the supplied date and photo
    /// reference. Operator import only; there is no photo persistence here.
    pub async fn backfill(
        &self,
        meter_id: &str,
        user: &str,
        closing: f64,
        date: &str,
        photo_ref: &str,
    ) -> Result<Reading, LedgerError> {
        if !self.registry.exists(meter_id).await? {
            tracing::warn!(meter_id, "reading imported for unregistered meter");
        }

        let lock = self.meter_lock(meter_id);
        let result = {
            let _guard = lock.lock().await;
            self.commit_historical(meter_id, user, closing, date, photo_ref).await
        };
        drop(lock);
        self.prune_meter_lock(meter_id);
        result
    }

    async fn commit_historical(
        &self,
        meter_id: &str,
        user: &str,
        closing: f64,
        date: &str,
        photo_ref: &str,
    ) -> Result<Reading, LedgerError> {
        let opening = ledger_queries::latest_closing(&self.pool, meter_id).await?;
        if !closing.is_finite() || closing < opening {
            return Err(LedgerError::NonMonotonicReading { opening, closing });
        }

        let reading = ledger_queries::insert_reading(
            &self.pool,
            meter_id,
            opening,
            closing,
            closing - opening,
            user,
            date,
            photo_ref,
        )
        .await?;

        tracing::debug!(meter_id, reading_id = reading.id, "historical reading inserted");

        Ok(reading)
    }

    /// Readings joined with their meter's location, newest first.
    pub async fn list_with_location(&self) -> Result<Vec<ReadingWithLocation>, LedgerError> {
        Ok(ledger_queries::list_with_location(&self.pool).await?)
    }

    /// Stream the ledger as CSV chunks: header first, then one line per
    /// reading, newest first.
    pub fn export_csv(
        &self,
    ) -> impl futures::Stream<Item = Result<axum::body::Bytes, LedgerError>> {
        crate::export::csv_stream(self.pool.clone())
    }

    /// Delete one reading on behalf of an explicit requesting identity.
    ///
    /// Deletion never recomputes other rows: stored opening and consumption
    /// values of the remaining readings are untouched.
    pub async fn delete(&self, reading_id: i64, requesting_user: &str) -> Result<(), LedgerError> {
        let reading = ledger_queries::find_reading(&self.pool, reading_id)
            .await?
            .ok_or(LedgerError::NotFound(reading_id))?;

        self.delete_checked(reading, requesting_user).await
    }

    /// Delete with the identity implied by the row itself: the stored
    /// submitter. This mirrors the link-driven delete flow, where no
    /// explicit identity accompanies the request.
    pub async fn delete_as_submitter(&self, reading_id: i64) -> Result<(), LedgerError> {
        let reading = ledger_queries::find_reading(&self.pool, reading_id)
            .await?
            .ok_or(LedgerError::NotFound(reading_id))?;

        let user = reading.user.clone();
        self.delete_checked(reading, &user).await
    }

    async fn delete_checked(
        &self,
        reading: Reading,
        requesting_user: &str,
    ) -> Result<(), LedgerError> {
        if !self.delete_policy.may_delete(requesting_user) {
            tracing::warn!(
                reading_id = reading.id,
                user = requesting_user,
                "delete refused"
            );
            return Err(LedgerError::NotAuthorized);
        }

        ledger_queries::delete_reading(&self.pool, reading.id).await?;

        metrics::counter!("readings_deleted_total").increment(1);
        tracing::info!(
            reading_id = reading.id,
            user = requesting_user,
            "reading deleted"
        );

        Ok(())
    }
}
