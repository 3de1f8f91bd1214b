//! MySQL/MariaDB source driver.
//!
//! [`MysqlReader`] implements schema introspection, counts and the streaming
//! cursor for the migration source.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;

pub use reader::MysqlReader;
