//! SQLite DDL dialect

use crate::database::schema::{
    Column, ColumnType, ForeignKey, Platform, Table, TableDiff, DEFAULT_STRING_LENGTH,
};

/// Keywords that must be quoted when used as identifiers
const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLLATE",
    "COLUMN", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FOREIGN", "FROM", "FULL", "GROUP", "HAVING",
    "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LEFT",
    "LIKE", "LIMIT", "NATURAL", "NOT", "NOTNULL", "NULL", "OF", "OFFSET", "ON", "OR", "ORDER",
    "OUTER", "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO",
    "TRANSACTION", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

const TIME_KEYWORDS: &[&str] = &["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"];

/// Column type information recovered from a declared SQLite type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeclaredType {
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<(u32, u32)>,
    pub unsigned: bool,
}

/// SQL rendering for SQLite
///
/// SQLite can add columns in place but cannot change or remove columns that
/// carry constraints, so any other column change rebuilds the table through a
/// temporary copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlitePlatform;

impl SqlitePlatform {
    /// Declared type written for a column
    pub fn type_declaration(&self, column: &Column, autoincrement: bool) -> String {
        if autoincrement {
            return "INTEGER".to_string();
        }
        let unsigned = if column.unsigned { " UNSIGNED" } else { "" };
        match column.column_type {
            ColumnType::Integer => format!("INTEGER{}", unsigned),
            ColumnType::BigInt => format!("BIGINT{}", unsigned),
            ColumnType::SmallInt => format!("SMALLINT{}", unsigned),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::String => format!(
                "VARCHAR({})",
                column.length.unwrap_or(DEFAULT_STRING_LENGTH)
            ),
            ColumnType::Text => "CLOB".to_string(),
            ColumnType::Float => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal => {
                let (precision, scale) = column.effective_precision().unwrap_or((10, 0));
                format!("NUMERIC({}, {})", precision, scale)
            }
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Blob => "BLOB".to_string(),
        }
    }

    /// Map a declared type back to a column type
    ///
    /// Types this platform never writes fall back to SQLite's affinity rules.
    pub(crate) fn parse_declared_type(declared: &str) -> DeclaredType {
        let upper = declared.trim().to_uppercase();
        let unsigned = upper.contains("UNSIGNED");

        let (base, args) = match upper.find('(') {
            Some(open) => {
                let close = upper[open..].find(')').map(|c| open + c).unwrap_or(upper.len());
                let args: Vec<u32> = upper[open + 1..close]
                    .split(',')
                    .filter_map(|a| a.trim().parse().ok())
                    .collect();
                (upper[..open].trim().to_string(), args)
            }
            None => (upper.clone(), Vec::new()),
        };
        let base = base.replace("UNSIGNED", "");
        let base = base.trim();

        let column_type = match base {
            "INTEGER" | "INT" | "MEDIUMINT" => ColumnType::Integer,
            "BIGINT" => ColumnType::BigInt,
            "SMALLINT" => ColumnType::SmallInt,
            "BOOLEAN" | "TINYINT" => ColumnType::Boolean,
            "VARCHAR" | "CHAR" | "NVARCHAR" | "NCHAR" | "CHARACTER" | "VARYING CHARACTER" => {
                ColumnType::String
            }
            "TEXT" | "CLOB" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => ColumnType::Text,
            "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => ColumnType::Float,
            "NUMERIC" | "DECIMAL" => ColumnType::Decimal,
            "DATE" => ColumnType::Date,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            "TIME" => ColumnType::Time,
            "BLOB" | "" => ColumnType::Blob,
            other if other.contains("INT") => ColumnType::Integer,
            other if other.contains("CHAR") || other.contains("CLOB") || other.contains("TEXT") => {
                ColumnType::Text
            }
            other if other.contains("BLOB") => ColumnType::Blob,
            other if other.contains("REAL") || other.contains("FLOA") || other.contains("DOUB") => {
                ColumnType::Float
            }
            _ => ColumnType::Decimal,
        };

        let length = match column_type {
            ColumnType::String => args.first().copied(),
            _ => None,
        };
        let precision = match column_type {
            ColumnType::Decimal => args
                .first()
                .map(|p| (*p, args.get(1).copied().unwrap_or(0))),
            _ => None,
        };

        DeclaredType {
            column_type,
            length,
            precision,
            unsigned,
        }
    }

    fn default_literal(column: &Column, default: &str) -> String {
        let numeric = column.column_type.is_numeric() && default.parse::<f64>().is_ok();
        let keyword = TIME_KEYWORDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(default));
        if numeric || keyword {
            default.to_string()
        } else {
            format!("'{}'", default.replace('\'', "''"))
        }
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn foreign_key_declaration(&self, fk: &ForeignKey) -> String {
        let mut sql = String::new();
        if !fk.name.is_empty() {
            sql.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(&fk.name)));
        }
        sql.push_str(&format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.column_list(&fk.local_columns),
            self.quote_identifier(&fk.foreign_table),
            self.column_list(&fk.foreign_columns)
        ));
        if let Some(action) = &fk.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action));
        }
        if let Some(action) = &fk.on_update {
            sql.push_str(&format!(" ON UPDATE {}", action));
        }
        sql
    }

    fn needs_rebuild(diff: &TableDiff) -> bool {
        !diff.removed_columns.is_empty()
            || !diff.changed_columns.is_empty()
            || diff.primary_key_changed()
            || !diff.added_foreign_keys.is_empty()
            || !diff.removed_foreign_keys.is_empty()
            || diff
                .added_columns
                .iter()
                .any(|c| (c.notnull && c.default.is_none()) || c.autoincrement)
    }

    fn rebuild_table_sql(&self, diff: &TableDiff) -> Vec<String> {
        let temp = format!("__temp__{}", diff.to.name);
        let common: Vec<String> = diff
            .to
            .columns
            .iter()
            .filter(|c| diff.from.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();
        let common = self.column_list(&common);

        let mut sql = Vec::new();
        if !common.is_empty() {
            sql.push(format!(
                "CREATE TEMPORARY TABLE {} AS SELECT {} FROM {}",
                self.quote_identifier(&temp),
                common,
                self.quote_identifier(&diff.from.name)
            ));
        }
        sql.push(self.drop_table_sql(&diff.from.name));

        let mut create = self.create_table_sql(&diff.to);
        let indexes = create.split_off(1);
        sql.extend(create);

        if !common.is_empty() {
            sql.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.quote_identifier(&diff.to.name),
                common,
                common,
                self.quote_identifier(&temp)
            ));
            sql.push(self.drop_table_sql(&temp));
        }
        sql.extend(indexes);
        sql
    }
}

impl Platform for SqlitePlatform {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        let simple = name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        let reserved = RESERVED_WORDS
            .iter()
            .any(|w| w.eq_ignore_ascii_case(name));
        if simple && !reserved {
            name.to_string()
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    fn column_declaration(&self, column: &Column, table: &Table) -> String {
        let autoincrement = table
            .autoincrement_column()
            .map(|c| c.name.eq_ignore_ascii_case(&column.name))
            .unwrap_or(false);

        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.type_declaration(column, autoincrement)
        );
        if autoincrement {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if column.notnull {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&Self::default_literal(column, default));
        }
        sql
    }

    fn create_table_sql(&self, table: &Table) -> Vec<String> {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_declaration(c, table))
            .collect();

        if let Some(pk) = table.primary_key() {
            if table.autoincrement_column().is_none() {
                parts.push(format!("PRIMARY KEY ({})", self.column_list(&pk.columns)));
            }
        }
        for fk in &table.foreign_keys {
            parts.push(self.foreign_key_declaration(fk));
        }

        let mut sql = vec![format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(&table.name),
            parts.join(", ")
        )];
        for index in table.indexes.iter().filter(|i| !i.primary) {
            sql.push(self.create_index_sql(index, &table.name));
        }
        sql
    }

    fn requires_rebuild(&self, diff: &TableDiff) -> bool {
        Self::needs_rebuild(diff)
    }

    fn foreign_key_toggle_sql(&self) -> Option<(String, String)> {
        Some((
            "PRAGMA foreign_keys = OFF".to_string(),
            "PRAGMA foreign_keys = ON".to_string(),
        ))
    }

    fn foreign_key_check_sql(&self) -> Option<String> {
        Some("PRAGMA foreign_key_check".to_string())
    }

    fn alter_table_sql(&self, diff: &TableDiff) -> Vec<String> {
        if Self::needs_rebuild(diff) {
            return self.rebuild_table_sql(diff);
        }

        let table = &diff.to.name;
        let mut sql = Vec::new();
        for index in diff.removed_indexes.iter().chain(&diff.changed_indexes) {
            sql.push(self.drop_index_sql(index, table));
        }
        for column in &diff.added_columns {
            sql.push(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_declaration(column, &diff.to)
            ));
        }
        for index in diff.added_indexes.iter().chain(&diff.changed_indexes) {
            sql.push(self.create_index_sql(index, table));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::{Comparator, Schema};

    fn users_table() -> Table {
        let mut table = Table::new("xo_users");
        table
            .add_column("uid", ColumnType::Integer)
            .set_autoincrement(true);
        table.add_column("uname", ColumnType::String).set_length(60);
        table
            .add_column("level", ColumnType::SmallInt)
            .set_default(Some("1"));
        table
            .add_column("bio", ColumnType::Text)
            .set_notnull(false);
        table.set_primary_key(&["uid"]);
        table.add_unique_index(&["uname"], "uname");
        table
    }

    #[test]
    fn test_create_table_sql() {
        let sql = SqlitePlatform.create_table_sql(&users_table());
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE xo_users (uid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
                 uname VARCHAR(60) NOT NULL, level SMALLINT NOT NULL DEFAULT 1, bio CLOB)"
                    .to_string(),
                "CREATE UNIQUE INDEX uname ON xo_users (uname)".to_string(),
            ]
        );
    }

    #[test]
    fn test_composite_primary_key_and_foreign_key() {
        let mut table = Table::new("xo_link");
        table.add_column("a", ColumnType::Integer);
        table.add_column("b", ColumnType::Integer);
        table.set_primary_key(&["a", "b"]);
        table
            .add_foreign_key("xo_users", &["a"], &["uid"], "fk_link_user")
            .on_delete = Some("CASCADE".to_string());

        let sql = SqlitePlatform.create_table_sql(&table);
        assert_eq!(
            sql[0],
            "CREATE TABLE xo_link (a INTEGER NOT NULL, b INTEGER NOT NULL, PRIMARY KEY (a, b), \
             CONSTRAINT fk_link_user FOREIGN KEY (a) REFERENCES xo_users (uid) ON DELETE CASCADE)"
        );
    }

    #[test]
    fn test_quote_identifier() {
        let platform = SqlitePlatform;
        assert_eq!(platform.quote_identifier("users"), "users");
        assert_eq!(platform.quote_identifier("order"), "\"order\"");
        assert_eq!(platform.quote_identifier("my col"), "\"my col\"");
        assert_eq!(platform.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_string_default_is_quoted() {
        let mut column = Column::new("title", ColumnType::String);
        column.set_default(Some("it's"));
        let table = Table::new("t");
        assert_eq!(
            SqlitePlatform.column_declaration(&column, &table),
            "title VARCHAR(255) NOT NULL DEFAULT 'it''s'"
        );
    }

    #[test]
    fn test_parse_declared_types() {
        let parsed = SqlitePlatform::parse_declared_type("VARCHAR(60)");
        assert_eq!(parsed.column_type, ColumnType::String);
        assert_eq!(parsed.length, Some(60));

        let parsed = SqlitePlatform::parse_declared_type("NUMERIC(12, 2)");
        assert_eq!(parsed.column_type, ColumnType::Decimal);
        assert_eq!(parsed.precision, Some((12, 2)));

        let parsed = SqlitePlatform::parse_declared_type("integer unsigned");
        assert_eq!(parsed.column_type, ColumnType::Integer);
        assert!(parsed.unsigned);

        assert_eq!(
            SqlitePlatform::parse_declared_type("DOUBLE PRECISION").column_type,
            ColumnType::Float
        );
        assert_eq!(
            SqlitePlatform::parse_declared_type("").column_type,
            ColumnType::Blob
        );
        assert_eq!(
            SqlitePlatform::parse_declared_type("UNSIGNED BIG INT").column_type,
            ColumnType::Integer
        );
    }

    #[test]
    fn test_add_nullable_column_alters_in_place() {
        let mut target = users_table();
        target
            .add_column("email", ColumnType::String)
            .set_notnull(false);
        target.add_index(&["email"], "idx_email");

        let diff = Comparator::compare_tables(&users_table(), &target).unwrap();
        assert_eq!(
            SqlitePlatform.alter_table_sql(&diff),
            vec![
                "ALTER TABLE xo_users ADD COLUMN email VARCHAR(255)".to_string(),
                "CREATE INDEX idx_email ON xo_users (email)".to_string(),
            ]
        );
    }

    #[test]
    fn test_removed_column_rebuilds_table() {
        let mut target = users_table();
        target.columns.retain(|c| c.name != "bio");

        let diff = Comparator::compare_tables(&users_table(), &target).unwrap();
        let sql = SqlitePlatform.alter_table_sql(&diff);
        assert_eq!(
            sql[0],
            "CREATE TEMPORARY TABLE __temp__xo_users AS SELECT uid, uname, level FROM xo_users"
        );
        assert_eq!(sql[1], "DROP TABLE xo_users");
        assert!(sql[2].starts_with("CREATE TABLE xo_users ("));
        assert_eq!(
            sql[3],
            "INSERT INTO xo_users (uid, uname, level) SELECT uid, uname, level FROM __temp__xo_users"
        );
        assert_eq!(sql[4], "DROP TABLE __temp__xo_users");
        assert_eq!(sql[5], "CREATE UNIQUE INDEX uname ON xo_users (uname)");
    }

    #[test]
    fn test_alter_schema_order() {
        let mut from = Schema::new();
        from.add_table(users_table());
        from.create_table("xo_old").add_column("x", ColumnType::Integer);

        let mut to = Schema::new();
        to.add_table(users_table());
        to.create_table("xo_new").add_column("y", ColumnType::Integer);
        to.create_sequence("xo_seq", 1, 1);

        let diff = Comparator::compare_schemas(&from, &to);
        let sql = SqlitePlatform.alter_schema_sql(&diff);
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE xo_new (y INTEGER NOT NULL)".to_string(),
                "DROP TABLE xo_old".to_string(),
            ]
        );
    }

    #[test]
    fn test_rebuild_suspends_foreign_keys() {
        let mut from = Schema::new();
        from.add_table(users_table());
        let mut to = Schema::new();
        let mut target = users_table();
        target.columns.retain(|c| c.name != "bio");
        to.add_table(target);

        let diff = Comparator::compare_schemas(&from, &to);
        let sql = SqlitePlatform.alter_schema_sql(&diff);
        assert_eq!(sql.first().map(String::as_str), Some("PRAGMA foreign_keys = OFF"));
        assert_eq!(sql.last().map(String::as_str), Some("PRAGMA foreign_keys = ON"));
        assert_eq!(sql[2], "DROP TABLE xo_users");
    }
}
