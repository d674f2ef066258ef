use anyhow::Result;
use meter_ledger::db::registry_queries;
use meter_ledger::Meter;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyExists,
}

/// Meter identifiers turn into photo filename prefixes; separators and
/// parent-directory fragments are rejected.
pub fn valid_meter_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('/') && !id.contains('\\') && !id.contains("..")
}

/// The set of known meters. Leaf component: no dependency on the ledger.
#[derive(Clone)]
pub struct MeterRegistry {
    pool: SqlitePool,
}

impl MeterRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a meter. Duplicate identifiers are ignored, not rejected;
    /// the registration form may be resubmitted.
    pub async fn register(&self, meter_id: &str, location: &str) -> Result<RegisterOutcome> {
        let inserted = registry_queries::insert_meter(&self.pool, meter_id, location).await?;

        if inserted {
            metrics::counter!("meters_registered_total").increment(1);
            tracing::info!(meter_id, location, "meter registered");
            Ok(RegisterOutcome::Registered)
        } else {
            tracing::debug!(meter_id, "meter already registered");
            Ok(RegisterOutcome::AlreadyExists)
        }
    }

    /// All meters in registration order.
    pub async fn list(&self) -> Result<Vec<Meter>> {
        registry_queries::list_meters(&self.pool).await
    }

    pub async fn exists(&self, meter_id: &str) -> Result<bool> {
        registry_queries::meter_exists(&self.pool, meter_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_registry() -> MeterRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        meter_ledger::db::init_schema(&pool).await.unwrap();
        MeterRegistry::new(pool)
    }

    #[tokio::test]
    async fn duplicate_registration_reports_already_exists() {
        let registry = test_registry().await;

        let first = registry.register("M1", "Warehouse A").await.unwrap();
        let second = registry.register("M1", "Warehouse A").await.unwrap();

        assert_eq!(first, RegisterOutcome::Registered);
        assert_eq!(second, RegisterOutcome::AlreadyExists);
        assert_eq!(registry.list().await.unwrap().len(), 1);
        assert!(registry.exists("M1").await.unwrap());
        assert!(!registry.exists("M2").await.unwrap());
    }

    #[test]
    fn meter_id_validation_rejects_path_fragments() {
        assert!(valid_meter_id("M1"));
        assert!(valid_meter_id("yard-7.main"));
        assert!(!valid_meter_id(""));
        assert!(!valid_meter_id("a/b"));
        assert!(!valid_meter_id("a\\b"));
        assert!(!valid_meter_id("v2..final"));
    }
}
