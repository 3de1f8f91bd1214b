//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    #[serde(alias = "mysql")]
    pub source: SourceConfig,

    /// Target database configuration (ClickHouse).
    #[serde(alias = "clickhouse")]
    pub target: TargetConfig,

    /// Tables and transfer defaults.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Run-level policies.
    #[serde(default)]
    pub advanced: AdvancedConfig,

    /// Connection timeouts and pool sizing.
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Webhook notifications.
    #[serde(default, alias = "feishu")]
    pub notification: NotificationConfig,

    /// Task ledger.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Connection charset (default: utf8mb4).
    #[serde(default = "default_charset")]
    pub charset: String,

    /// SSL mode: disabled, preferred, required (default: preferred).
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (ClickHouse HTTP interface) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// HTTP port (default: 8123).
    #[serde(default = "default_clickhouse_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username (default: "default").
    #[serde(default = "default_clickhouse_user")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Use https instead of http.
    #[serde(default)]
    pub secure: bool,
}

impl TargetConfig {
    /// Base URL of the HTTP interface.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("secure", &self.secure)
            .finish()
    }
}

/// One source table to copy and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Source (MySQL) table name.
    #[serde(default, alias = "mysql_table")]
    pub source_table: String,

    /// Target (ClickHouse) table name.
    #[serde(default, alias = "ch_table")]
    pub target_table: String,

    /// Rows per batch, overriding `migration.default_batch_size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Run row-count verification, overriding `migration.default_verify`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
}

impl TableMapping {
    /// Create a mapping with default batch size and verification.
    pub fn new(source_table: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            target_table: target_table.into(),
            batch_size: None,
            verify: None,
        }
    }

    /// A mapping is usable only when both table names are present.
    pub fn is_valid(&self) -> bool {
        !self.source_table.trim().is_empty() && !self.target_table.trim().is_empty()
    }
}

/// A table mapping with run-level defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableJob {
    pub source_table: String,
    pub target_table: String,
    pub batch_size: usize,
    pub verify: bool,
}

/// Tables and transfer defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Ordered list of tables to migrate.
    #[serde(default)]
    pub tables: Vec<TableMapping>,

    /// Rows per batch when a mapping does not set one (default: 10000).
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Verify row counts when a mapping does not say (default: true).
    #[serde(default = "default_true")]
    pub default_verify: bool,

    /// Minimum seconds between progress lines (default: 3).
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,

    /// Width of the textual progress bar (default: 40).
    #[serde(default = "default_bar_width")]
    pub progress_bar_width: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            default_batch_size: default_batch_size(),
            default_verify: true,
            log_interval: default_log_interval(),
            progress_bar_width: default_bar_width(),
        }
    }
}

impl MigrationConfig {
    /// Apply run-level defaults to one mapping.
    pub fn resolve(&self, mapping: &TableMapping) -> TableJob {
        TableJob {
            source_table: mapping.source_table.trim().to_string(),
            target_table: mapping.target_table.trim().to_string(),
            batch_size: mapping.batch_size.unwrap_or(self.default_batch_size).max(1),
            verify: mapping.verify.unwrap_or(self.default_verify),
        }
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval)
    }
}

/// Run-level policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Drop the target table before creating it (default: true).
    #[serde(default = "default_true")]
    pub drop_table_before_create: bool,

    /// Skip streaming when the source count is zero (default: true).
    #[serde(default = "default_true")]
    pub skip_empty_tables: bool,

    /// Record a failed table and move on instead of aborting (default: false).
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            drop_table_before_create: true,
            skip_empty_tables: true,
            continue_on_error: false,
        }
    }
}

/// Connection timeouts and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Connect timeout in seconds (default: 30).
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Read timeout in seconds (default: 60).
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Maximum source connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            connection_timeout: default_connection_timeout(),
            read_timeout: default_read_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl PerformanceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

/// Webhook notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_true")]
    pub notify_on_start: bool,

    #[serde(default = "default_true")]
    pub notify_on_success: bool,

    #[serde(default = "default_true")]
    pub notify_on_failure: bool,

    /// Environment label shown in messages (default: "Production").
    #[serde(default = "default_env_name")]
    pub env_name: String,

    /// Project label used in message titles (default: "Data Migration").
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// User ids to mention.
    #[serde(default)]
    pub mention_users: Vec<String>,

    /// Mention everyone in the chat.
    #[serde(default)]
    pub mention_all: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            notify_on_start: true,
            notify_on_success: true,
            notify_on_failure: true,
            env_name: default_env_name(),
            project_name: default_project_name(),
            mention_users: Vec::new(),
            mention_all: false,
        }
    }
}

/// Task ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Record runs in the SQLite ledger (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite file path (default: migration_tasks.db).
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_ledger_path(),
        }
    }
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_clickhouse_port() -> u16 {
    8123
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

fn default_log_interval() -> u64 {
    3
}

fn default_bar_width() -> usize {
    40
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_connections() -> u32 {
    4
}

fn default_env_name() -> String {
    "Production".to_string()
}

fn default_project_name() -> String {
    "Data Migration".to_string()
}

fn default_ledger_path() -> String {
    "migration_tasks.db".to_string()
}

fn default_true() -> bool {
    true
}
