//! Target DDL synthesis for ClickHouse.
//!
//! Tables are created with the MergeTree engine ordered by the source primary
//! key. A table without a primary key is ordered by `tuple()`, which MergeTree
//! accepts as "no sorting key".

use crate::core::{ColumnDescriptor, PrimaryKey};
use crate::typemap::mysql_to_clickhouse;

/// Index granularity written into every created table.
pub const INDEX_GRANULARITY: u32 = 8192;

/// Quote an identifier with backticks, doubling any embedded backtick.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build the `CREATE TABLE` statement for `target_table`.
///
/// Pure and deterministic: identical inputs give byte-identical output.
pub fn build(target_table: &str, columns: &[ColumnDescriptor], primary_key: &PrimaryKey) -> String {
    let column_defs = columns
        .iter()
        .map(|col| {
            format!(
                "    {} {}",
                quote_ident(&col.name),
                mysql_to_clickhouse(&col.source_type, col.nullable)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE IF NOT EXISTS {}\n(\n{}\n)\nENGINE = MergeTree()\nORDER BY {}\nSETTINGS index_granularity = {}",
        quote_ident(target_table),
        column_defs,
        order_by(primary_key),
        INDEX_GRANULARITY
    )
}

fn order_by(primary_key: &PrimaryKey) -> String {
    if primary_key.is_empty() {
        return "tuple()".to_string();
    }
    let cols = primary_key
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("({})", cols)
}
