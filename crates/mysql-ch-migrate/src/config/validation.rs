//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    match config.source.ssl_mode.to_lowercase().as_str() {
        "disabled" | "preferred" | "required" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "source.ssl_mode must be one of disabled, preferred, required, got '{}'",
                other
            )))
        }
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }

    if config.source.host == config.target.host && config.source.port == config.target.port {
        return Err(MigrateError::Config(
            "source and target cannot be the same endpoint".into(),
        ));
    }

    if config.migration.default_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.default_batch_size must be at least 1".into(),
        ));
    }
    if config.migration.progress_bar_width == 0 {
        return Err(MigrateError::Config(
            "migration.progress_bar_width must be at least 1".into(),
        ));
    }
    for mapping in &config.migration.tables {
        if let Some(0) = mapping.batch_size {
            return Err(MigrateError::Config(format!(
                "batch_size for table '{}' must be at least 1",
                mapping.source_table
            )));
        }
    }

    if config.performance.max_connections == 0 {
        return Err(MigrateError::Config(
            "performance.max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AdvancedConfig, LedgerConfig, MigrationConfig, NotificationConfig, PerformanceConfig,
        SourceConfig, TableMapping, TargetConfig,
    };

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "mysql.internal".to_string(),
                port: 3306,
                database: "shop".to_string(),
                user: "reader".to_string(),
                password: "password".to_string(),
                charset: "utf8mb4".to_string(),
                ssl_mode: "preferred".to_string(),
            },
            target: TargetConfig {
                host: "clickhouse.internal".to_string(),
                port: 8123,
                database: "analytics".to_string(),
                user: "default".to_string(),
                password: "password".to_string(),
                secure: false,
            },
            migration: MigrationConfig {
                tables: vec![TableMapping::new("orders", "orders")],
                ..MigrationConfig::default()
            },
            advanced: AdvancedConfig::default(),
            performance: PerformanceConfig::default(),
            notification: NotificationConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_database() {
        let mut config = valid_config();
        config.target.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_endpoint_rejected() {
        let mut config = valid_config();
        config.target.host = config.source.host.clone();
        config.target.port = config.source.port;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.tables[0].batch_size = Some(0);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.migration.default_batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_ssl_mode_rejected() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
