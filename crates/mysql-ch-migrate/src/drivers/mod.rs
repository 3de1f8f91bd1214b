//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB source reader
//! - [`clickhouse`]: ClickHouse target writer

pub mod clickhouse;
pub mod mysql;

pub use self::clickhouse::ClickhouseWriter;
pub use self::mysql::MysqlReader;
