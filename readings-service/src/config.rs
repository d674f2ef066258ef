use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    8 * 1024 * 1024
}

/// Identities allowed to delete readings. Empty set denies all deletes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub privileged_users: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("ENERGY_TRACKER_CONFIG").unwrap_or_else(|_| "energy-tracker.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:8080"

            [database]
            path = "energy-tracker.db"
            max_connections = 5

            [storage]
            upload_dir = "uploads"
            max_upload_bytes = 1048576

            [auth]
            privileged_users = ["admin", "ops"]

            [metrics]
            bind_addr = "127.0.0.1:9102"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.storage.max_upload_bytes, 1_048_576);
        assert_eq!(cfg.auth.privileged_users, vec!["admin", "ops"]);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9102");
    }

    #[test]
    fn auth_and_metrics_sections_are_optional() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            bind_addr = "0.0.0.0:8080"

            [database]
            path = ":memory:"
            max_connections = 1

            [storage]
            upload_dir = "uploads"
            "#,
        )
        .unwrap();

        assert!(cfg.auth.privileged_users.is_empty());
        assert!(cfg.metrics.is_none());
        assert_eq!(cfg.storage.max_upload_bytes, 8 * 1024 * 1024);
    }
}
