use std::env;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DbConn};

use quarry_core::{OrmError, OrmResult};

use super::executor::db_error;

/// Configuration for the main database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub main_url: String,
    pub main_max_connections: u32,
    pub main_min_connections: u32,
    /// Forward SQL statements to the sqlx logger.
    pub sql_logging: bool,
    pub secondary_databases: Vec<SecondaryDbConfig>,
}

/// Configuration for a secondary database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryDbConfig {
    pub name: String,
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(main_url: impl Into<String>) -> Self {
        Self {
            main_url: main_url.into(),
            main_max_connections: 100,
            main_min_connections: 10,
            sql_logging: false,
            secondary_databases: Vec::new(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Returns `None` when `DATABASE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(env::vars())
    }

    /// Load configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let lookup = |key: &str| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        let main_url = lookup("DATABASE_URL")?;
        let mut config = Self::new(main_url);
        if let Some(max) = lookup("DB_MAX_CONNECTIONS").and_then(|s| s.parse().ok()) {
            config.main_max_connections = max;
        }
        if let Some(min) = lookup("DB_MIN_CONNECTIONS").and_then(|s| s.parse().ok()) {
            config.main_min_connections = min;
        }
        config.sql_logging = lookup("DB_SQL_LOGGING")
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        config.secondary_databases = parse_secondary_databases(&vars);
        Some(config)
    }
}

/// Parse secondary databases.
/// Format: SECONDARY_DB_<NAME>=<URL>,<MAX_CONNECTIONS>
/// Example: SECONDARY_DB_ANALYTICS=postgres://...,20
fn parse_secondary_databases(vars: &[(String, String)]) -> Vec<SecondaryDbConfig> {
    let mut secondary: Vec<SecondaryDbConfig> = vars
        .iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix("SECONDARY_DB_")?;
            let mut parts = value.splitn(2, ',');
            let url = parts.next().filter(|u| !u.is_empty())?;
            let max_connections = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(20);
            Some(SecondaryDbConfig {
                name: name.to_lowercase(),
                url: url.to_string(),
                max_connections,
            })
        })
        .collect();
    secondary.sort_by(|a, b| a.name.cmp(&b.name));
    secondary
}

/// A named connection to a secondary database.
pub struct NamedConnection {
    pub name: String,
    pub conn: DbConn,
}

/// Multi-database connection manager.
///
/// Models use the main connection unless their definition names a secondary
/// one.
pub struct DatabaseConnections {
    /// Primary database.
    pub main: DbConn,
    /// Secondary databases, looked up by name.
    pub secondary: Vec<NamedConnection>,
}

impl DatabaseConnections {
    /// Initialize all database connections from configuration.
    pub async fn init(config: &DatabaseConfig) -> OrmResult<Self> {
        tracing::info!("Initializing database connections...");

        let main_opts = ConnectOptions::new(&config.main_url)
            .max_connections(config.main_max_connections)
            .min_connections(config.main_min_connections)
            .connect_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(config.sql_logging)
            .to_owned();

        let main = Database::connect(main_opts).await.map_err(db_error)?;
        tracing::info!(
            "Main database connected (pool: {})",
            config.main_max_connections
        );

        let mut secondary = Vec::new();
        for db_config in &config.secondary_databases {
            let opts = ConnectOptions::new(&db_config.url)
                .max_connections(db_config.max_connections)
                .min_connections(2)
                .connect_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .sqlx_logging(config.sql_logging)
                .to_owned();

            let conn = Database::connect(opts).await.map_err(db_error)?;
            tracing::info!(
                "Secondary database '{}' connected (pool: {})",
                db_config.name,
                db_config.max_connections
            );

            secondary.push(NamedConnection {
                name: db_config.name.clone(),
                conn,
            });
        }

        Ok(Self { main, secondary })
    }

    /// Wrap an existing connection (tests, embedding).
    pub fn from_connection(main: DbConn) -> Self {
        Self {
            main,
            secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, name: impl Into<String>, conn: DbConn) -> Self {
        self.secondary.push(NamedConnection {
            name: name.into(),
            conn,
        });
        self
    }

    /// Get a secondary database connection by name.
    pub fn get(&self, name: &str) -> Option<&DbConn> {
        self.secondary
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.conn)
    }

    /// The main connection, or the named secondary one.
    pub fn resolve(&self, name: Option<&str>) -> OrmResult<&DbConn> {
        match name {
            None => Ok(&self.main),
            Some(name) => self.get(name).ok_or_else(|| {
                OrmError::Connection(format!("Unknown database connection '{name}'"))
            }),
        }
    }

    /// List all available secondary database names.
    pub fn secondary_names(&self) -> Vec<&str> {
        self.secondary.iter().map(|c| c.name.as_str()).collect()
    }
}
