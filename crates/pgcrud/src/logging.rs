//! SQL event logging.

use crate::statement::CompiledStatement;
use std::time::Duration;
use tracing::Level;

/// Tracing target for SQL events.
pub const SQL_TARGET: &str = "pgcrud.sql";

/// Truncate a string to at most `max_bytes` bytes without splitting a UTF-8 character.
pub(crate) fn truncate_sql_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN => tracing::warn!($($field)*),
            Level::INFO => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// Emits each compiled statement before it runs.
///
/// Only SQL text and the parameter count are logged; bound values may carry
/// credentials and are never written out.
#[derive(Debug, Clone)]
pub struct SqlLogger {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Statements slower than this are reported at WARN after they finish.
    pub slow_threshold: Option<Duration>,
}

impl Default for SqlLogger {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
            slow_threshold: None,
        }
    }
}

impl SqlLogger {
    /// Create a new logger with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Report statements slower than `threshold`.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    /// Log a statement about to be executed.
    pub fn before(&self, stmt: &CompiledStatement) {
        let sql = self.truncate_sql(&stmt.sql);
        emit_at_level!(
            self.level,
            target: SQL_TARGET,
            kind = %stmt.kind,
            param_count = stmt.params.len(),
            affects_all_rows = stmt.affects_all_rows,
            sql = %sql,
        );
    }

    /// Log completion of a statement.
    pub fn after(&self, stmt: &CompiledStatement, elapsed: Duration, rows: u64) {
        match self.slow_threshold {
            Some(threshold) if elapsed >= threshold => tracing::warn!(
                target: SQL_TARGET,
                kind = %stmt.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                rows,
                sql = %self.truncate_sql(&stmt.sql),
                "slow query",
            ),
            _ => emit_at_level!(
                self.level,
                target: SQL_TARGET,
                kind = %stmt.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                rows,
                "query finished",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("SELECT 1", 6), "SELECT");
        // 'é' is two bytes; cutting inside it backs off.
        assert_eq!(truncate_sql_bytes("aé", 2), "a");
    }

    #[test]
    fn truncate_sql_appends_ellipsis() {
        let logger = SqlLogger::new().max_sql_length(6);
        assert_eq!(logger.truncate_sql("SELECT * FROM users"), "SELECT...");
        assert_eq!(SqlLogger::new().no_truncate().truncate_sql("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn logging_without_subscriber_is_noop() {
        let stmt = CompiledStatement::new(StatementKind::Read, "SELECT 1".into(), Vec::new());
        let logger = SqlLogger::new().level(Level::INFO).slow_threshold(Duration::ZERO);
        logger.before(&stmt);
        logger.after(&stmt, Duration::from_millis(3), 1);
    }
}
