//! SQL Server default value translations

/// SQL Server default expressions and their SQLite equivalents
///
/// Keys are matched case-insensitively, including the surrounding parentheses
/// SQL Server stores with every default constraint.
pub const SQL_SERVER_DEFAULT_VALUES: &[(&str, &str)] = &[
    ("(newid())", "lower(hex(randomblob(16)))"),
    ("(newsequentialid())", "lower(hex(randomblob(16)))"),
    ("(getdate())", "datetime('now')"),
    ("(getutcdate())", "datetime('now')"),
    ("(sysdatetime())", "datetime('now')"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectAdapter;

    #[test]
    fn test_every_entry_is_loaded_by_the_preset() {
        let adapter = DialectAdapter::for_sql_server();
        assert_eq!(adapter.default_value_map().len(), SQL_SERVER_DEFAULT_VALUES.len());
        for (from, to) in SQL_SERVER_DEFAULT_VALUES {
            assert_eq!(adapter.translate_default_value(Some(from)).as_deref(), Some(*to));
            let upper = from.to_uppercase();
            assert_eq!(adapter.translate_default_value(Some(&upper)).as_deref(), Some(*to));
        }
    }
}
