//! Demo configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;

use quarry_orm::DatabaseConfig;

/// Demo configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    /// Run pending migrations on start.
    pub migrate: bool,
    /// Seed the database before the walkthrough.
    pub seed: bool,
    pub per_page: u64,
    /// Base path rendered into pagination links.
    pub api_path: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars().collect())
    }

    pub(crate) fn from_vars(vars: HashMap<String, String>) -> Self {
        let lookup = |key: &str| vars.get(key).cloned();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default)
        };

        Self {
            database: DatabaseConfig::from_vars(vars.clone()),
            migrate: flag("QUARRY_MIGRATE", true),
            seed: flag("QUARRY_SEED", true),
            per_page: lookup("QUARRY_PER_PAGE")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(15),
            api_path: lookup("QUARRY_API_PATH").unwrap_or_else(|| "/api".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_flags_and_defaults() {
        let config = AppConfig::from_vars(vars(&[("QUARRY_SEED", "0"), ("QUARRY_PER_PAGE", "25")]));

        assert!(config.database.is_none());
        assert!(config.migrate);
        assert!(!config.seed);
        assert_eq!(config.per_page, 25);
        assert_eq!(config.api_path, "/api");
    }

    #[test]
    fn test_zero_per_page_falls_back() {
        let config = AppConfig::from_vars(vars(&[
            ("QUARRY_PER_PAGE", "0"),
            ("DATABASE_URL", "postgres://localhost/quarry"),
        ]));
        assert_eq!(config.per_page, 15);
        assert_eq!(
            config.database.map(|db| db.main_url).as_deref(),
            Some("postgres://localhost/quarry")
        );
    }
}
