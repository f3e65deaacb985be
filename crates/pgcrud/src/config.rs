//! Service configuration.
//!
//! Load from the environment (with `.env` support):
//!
//! | Variable                          | Meaning                                  |
//! |-----------------------------------|------------------------------------------|
//! | `DATABASE_URL`                    | Full connection string (wins if set)     |
//! | `DB_HOST` / `DB_PORT`             | Host and port (`localhost`, `5432`)      |
//! | `POSTGRES_DB`                     | Database name (`postgres`)               |
//! | `POSTGRES_USER`                   | User (`postgres`)                        |
//! | `POSTGRES_PASSWORD`               | Password                                 |
//! | `PGCRUD_STATEMENT_TIMEOUT_MS`     | Per-statement timeout                    |
//!
//! or from a TOML file where `${VAR}` references are expanded:
//!
//! ```toml
//! default_limit = 100
//! statement_timeout_ms = 5000
//!
//! [database]
//! url = "${DATABASE_URL}"
//! max_connections = 16
//!
//! [safety]
//! update_without_filter = "warn"
//! delete_without_filter = "reject"
//!
//! [logging]
//! level = "debug"
//! max_sql_length = 200
//! ```

use crate::error::{CrudError, CrudResult};
use crate::logging::SqlLogger;
use crate::statement::{CompiledStatement, StatementKind};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// How to treat UPDATE/DELETE statements compiled without a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyPolicy {
    Allow,
    Warn,
    Reject,
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string; overrides the individual fields below.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    /// Pool size.
    pub max_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            max_connections: 16,
        }
    }
}

impl DatabaseConfig {
    /// Use a connection string.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Read `DATABASE_URL`, or the `DB_*`/`POSTGRES_*` variables.
    pub fn from_env() -> CrudResult<Self> {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.url = Some(url);
            return Ok(cfg);
        }
        if let Ok(host) = std::env::var("DB_HOST") {
            cfg.host = host;
        }
        if let Ok(port) = std::env::var("DB_PORT") {
            cfg.port = port
                .parse()
                .map_err(|_| CrudError::config(format!("DB_PORT is not a port number: {port}")))?;
        }
        if let Ok(dbname) = std::env::var("POSTGRES_DB") {
            cfg.dbname = dbname;
        }
        if let Ok(user) = std::env::var("POSTGRES_USER") {
            cfg.user = user;
        }
        cfg.password = std::env::var("POSTGRES_PASSWORD").ok();
        Ok(cfg)
    }

    /// Build the driver configuration.
    pub fn to_pg_config(&self) -> CrudResult<tokio_postgres::Config> {
        if let Some(url) = &self.url {
            return url
                .parse()
                .map_err(|e: tokio_postgres::Error| CrudError::Connection(e.to_string()));
        }
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if let Some(password) = &self.password {
            pg.password(password);
        }
        Ok(pg)
    }

    fn expand_env(&mut self) -> CrudResult<()> {
        if let Some(url) = self.url.as_mut() {
            *url = expand_env_vars(url)?;
        }
        self.host = expand_env_vars(&self.host)?;
        self.dbname = expand_env_vars(&self.dbname)?;
        self.user = expand_env_vars(&self.user)?;
        if let Some(password) = self.password.as_mut() {
            *password = expand_env_vars(password)?;
        }
        Ok(())
    }
}

/// Safety policies for unfiltered mutations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub update_without_filter: SafetyPolicy,
    pub delete_without_filter: SafetyPolicy,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            update_without_filter: SafetyPolicy::Warn,
            delete_without_filter: SafetyPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
    max_sql_length: Option<usize>,
    slow_query_ms: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            max_sql_length: Some(200),
            slow_query_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    database: DatabaseConfig,
    safety: SafetyConfig,
    logging: LoggingConfig,
    default_limit: Option<u64>,
    update_return_cap: Option<usize>,
    statement_timeout_ms: Option<u64>,
}

/// Configuration for [`CrudService`](crate::CrudService).
#[derive(Debug, Clone)]
pub struct CrudConfig {
    pub database: DatabaseConfig,
    pub safety: SafetyConfig,
    /// Limit applied to reads that do not set one.
    pub default_limit: u64,
    /// Updates affecting more rows than this return only the count.
    pub update_return_cap: usize,
    /// Per-statement timeout.
    pub statement_timeout: Option<Duration>,
    pub sql_logger: SqlLogger,
}

impl Default for CrudConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            safety: SafetyConfig::default(),
            default_limit: 100,
            update_return_cap: 100,
            statement_timeout: None,
            sql_logger: SqlLogger::default(),
        }
    }
}

impl CrudConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> CrudResult<Self> {
        dotenvy::dotenv().ok();

        let mut cfg = Self {
            database: DatabaseConfig::from_env()?,
            ..Self::default()
        };
        if let Ok(ms) = std::env::var("PGCRUD_STATEMENT_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                CrudError::config(format!("PGCRUD_STATEMENT_TIMEOUT_MS is not a number: {ms}"))
            })?;
            cfg.statement_timeout = Some(Duration::from_millis(ms));
        }
        Ok(cfg)
    }

    /// Parse a TOML document, expanding `${VAR}` references.
    pub fn from_toml_str(s: &str) -> CrudResult<Self> {
        let mut file: ConfigFile =
            toml::from_str(s).map_err(|e| CrudError::config(format!("failed to parse config: {e}")))?;
        file.database.expand_env()?;

        let level = Level::from_str(&file.logging.level).map_err(|_| {
            CrudError::config(format!("invalid logging.level: {}", file.logging.level))
        })?;
        let defaults = Self::default();
        let default_limit = file.default_limit.unwrap_or(defaults.default_limit);
        if default_limit == 0 || default_limit > crate::compile::MAX_LIMIT {
            return Err(CrudError::config(format!(
                "default_limit must be between 1 and {}",
                crate::compile::MAX_LIMIT
            )));
        }

        Ok(Self {
            database: file.database,
            safety: file.safety,
            default_limit,
            update_return_cap: file.update_return_cap.unwrap_or(defaults.update_return_cap),
            statement_timeout: file.statement_timeout_ms.map(Duration::from_millis),
            sql_logger: SqlLogger {
                level,
                max_sql_length: file.logging.max_sql_length,
                slow_threshold: file.logging.slow_query_ms.map(Duration::from_millis),
            },
        })
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> CrudResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CrudError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    /// Set the limit for reads without one.
    pub fn default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn update_return_cap(mut self, cap: usize) -> Self {
        self.update_return_cap = cap;
        self
    }

    /// Set per-statement timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.statement_timeout = Some(duration);
        self
    }

    /// Configure how UPDATE without filters is handled.
    pub fn update_without_filter(mut self, policy: SafetyPolicy) -> Self {
        self.safety.update_without_filter = policy;
        self
    }

    /// Configure how DELETE without filters is handled.
    pub fn delete_without_filter(mut self, policy: SafetyPolicy) -> Self {
        self.safety.delete_without_filter = policy;
        self
    }

    pub fn sql_logger(mut self, logger: SqlLogger) -> Self {
        self.sql_logger = logger;
        self
    }
}

impl SafetyConfig {
    /// Apply the policy matching an unfiltered UPDATE/DELETE.
    pub(crate) fn check(&self, stmt: &CompiledStatement) -> CrudResult<()> {
        if !stmt.is_unfiltered_mutation() {
            return Ok(());
        }
        let policy = match stmt.kind {
            StatementKind::Update => self.update_without_filter,
            StatementKind::Delete => self.delete_without_filter,
            _ => return Ok(()),
        };
        match policy {
            SafetyPolicy::Allow => Ok(()),
            SafetyPolicy::Warn => {
                tracing::warn!(kind = %stmt.kind, sql = %stmt.sql, "mutation without filters affects every row");
                Ok(())
            }
            SafetyPolicy::Reject => Err(CrudError::PolicyViolation { kind: stmt.kind }),
        }
    }
}

/// Expand `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> CrudResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(CrudError::config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(CrudError::config("invalid env var reference: ${}"));
            }

            let v = std::env::var(&key)
                .map_err(|_| CrudError::config(format!("missing env var for config expansion: {key}")))?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
