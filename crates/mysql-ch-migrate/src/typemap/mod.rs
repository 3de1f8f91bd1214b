//! Type mapping between MySQL and ClickHouse.

/// Map a MySQL column type to a ClickHouse type.
///
/// `mysql_type` is the full column type as reported by the source, including
/// any length/precision suffix and qualifiers (e.g. `int(10) unsigned`,
/// `decimal(12,2)`). The mapping is total: unrecognized types become `String`.
pub fn mysql_to_clickhouse(mysql_type: &str, nullable: bool) -> String {
    let lowered = mysql_type.trim().to_lowercase();
    let base = lowered
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    let mut ch_type = match base {
        // Integer types
        "tinyint" => "Int8",
        "smallint" => "Int16",
        "mediumint" | "int" | "integer" => "Int32",
        "bigint" => "Int64",
        "year" => "Int16",

        // Floating point
        "float" => "Float32",
        "double" => "Float64",

        // Decimal
        "decimal" => "Decimal",

        // Date/time types
        "date" => "Date",
        "datetime" | "timestamp" => "DateTime",

        // Text, binary, JSON, enum/set and time of day, plus anything exotic
        _ => "String",
    }
    .to_string();

    if ch_type.starts_with("Int") && lowered.contains("unsigned") {
        ch_type = format!("U{}", ch_type);
    }

    if base == "decimal" {
        if let Some(args) = parenthesized(&lowered) {
            ch_type = format!("Decimal({})", args);
        }
    }

    if nullable {
        ch_type = format!("Nullable({})", ch_type);
    }

    ch_type
}

/// Text between the first `(` and the following `)`, if any.
fn parenthesized(type_str: &str) -> Option<&str> {
    let start = type_str.find('(')?;
    let rest = &type_str[start + 1..];
    let end = rest.find(')')?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(mysql_to_clickhouse("tinyint(4)", false), "Int8");
        assert_eq!(mysql_to_clickhouse("smallint(6)", false), "Int16");
        assert_eq!(mysql_to_clickhouse("mediumint(9)", false), "Int32");
        assert_eq!(mysql_to_clickhouse("int(11)", false), "Int32");
        assert_eq!(mysql_to_clickhouse("integer", false), "Int32");
        assert_eq!(mysql_to_clickhouse("bigint(20)", false), "Int64");
        assert_eq!(mysql_to_clickhouse("year(4)", false), "Int16");
    }

    #[test]
    fn test_unsigned_promotes_width() {
        assert_eq!(mysql_to_clickhouse("tinyint(3) unsigned", false), "UInt8");
        assert_eq!(mysql_to_clickhouse("int(10) unsigned", false), "UInt32");
        assert_eq!(mysql_to_clickhouse("BIGINT UNSIGNED", false), "UInt64");
        // Only integer kinds are promoted.
        assert_eq!(mysql_to_clickhouse("double unsigned", false), "Float64");
    }

    #[test]
    fn test_decimal_precision_is_propagated() {
        assert_eq!(mysql_to_clickhouse("decimal(12,2)", false), "Decimal(12,2)");
        assert_eq!(mysql_to_clickhouse("decimal", false), "Decimal");
    }

    #[test]
    fn test_temporal_and_text_types() {
        assert_eq!(mysql_to_clickhouse("date", false), "Date");
        assert_eq!(mysql_to_clickhouse("datetime", false), "DateTime");
        assert_eq!(mysql_to_clickhouse("timestamp", false), "DateTime");
        assert_eq!(mysql_to_clickhouse("time", false), "String");
        assert_eq!(mysql_to_clickhouse("varchar(255)", false), "String");
        assert_eq!(mysql_to_clickhouse("longblob", false), "String");
        assert_eq!(mysql_to_clickhouse("enum('a','b')", false), "String");
        assert_eq!(mysql_to_clickhouse("json", false), "String");
    }

    #[test]
    fn test_nullable_wraps_final_type() {
        assert_eq!(mysql_to_clickhouse("int(11)", true), "Nullable(Int32)");
        assert_eq!(
            mysql_to_clickhouse("int unsigned", true),
            "Nullable(UInt32)"
        );
        assert_eq!(
            mysql_to_clickhouse("decimal(10,4)", true),
            "Nullable(Decimal(10,4))"
        );
    }

    #[test]
    fn test_unknown_types_fall_back_to_string() {
        assert_eq!(mysql_to_clickhouse("geometry", false), "String");
        assert_eq!(mysql_to_clickhouse("", false), "String");
        assert_eq!(mysql_to_clickhouse("((((", true), "Nullable(String)");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for t in ["int(11)", "decimal(5,1)", "varchar(3)", "bit(1)"] {
            assert_eq!(mysql_to_clickhouse(t, true), mysql_to_clickhouse(t, true));
        }
    }
}
