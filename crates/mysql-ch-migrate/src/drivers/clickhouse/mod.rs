//! ClickHouse target driver.
//!
//! [`ClickhouseWriter`] talks to the ClickHouse HTTP interface: statements and
//! scalar queries go through the `clickhouse` client, bulk inserts are posted
//! as `JSONEachRow` so rows keep the canonical dynamic representation.

mod writer;

pub use writer::ClickhouseWriter;
