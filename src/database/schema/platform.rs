//! Platform-specific SQL rendering
//!
//! A [`Platform`] turns schema objects and schema diffs into the DDL dialect of
//! one database. Drivers expose their platform through
//! [`DriverConnection::platform`](crate::database::driver::DriverConnection::platform).

use super::comparator::{SchemaDiff, TableDiff};
use super::model::{Column, Index, Sequence, Table};

pub trait Platform {
    /// Short platform name, e.g. `sqlite`
    fn name(&self) -> &str;

    /// Quote an identifier for use in DDL when the dialect requires it
    fn quote_identifier(&self, name: &str) -> String;

    fn supports_sequences(&self) -> bool {
        false
    }

    /// Column definition as used inside `CREATE TABLE` or `ADD COLUMN`
    fn column_declaration(&self, column: &Column, table: &Table) -> String;

    /// Statements creating the table and its secondary indexes
    fn create_table_sql(&self, table: &Table) -> Vec<String>;

    fn create_index_sql(&self, index: &Index, table: &str) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            index
                .columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn drop_index_sql(&self, index: &Index, _table: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    fn create_sequence_sql(&self, sequence: &Sequence) -> String {
        format!(
            "CREATE SEQUENCE {} INCREMENT BY {} START WITH {}",
            self.quote_identifier(&sequence.name),
            sequence.allocation_size,
            sequence.initial_value
        )
    }

    fn drop_sequence_sql(&self, sequence: &Sequence) -> String {
        format!("DROP SEQUENCE {}", self.quote_identifier(&sequence.name))
    }

    /// Statements turning `diff.from` into `diff.to`
    fn alter_table_sql(&self, diff: &TableDiff) -> Vec<String>;

    /// Whether the table is altered by copying it into a new table
    fn requires_rebuild(&self, _diff: &TableDiff) -> bool {
        false
    }

    /// Statements switching foreign key enforcement off and back on
    ///
    /// They bracket a schema update that rebuilds tables, so that dropping the
    /// old table neither cascades into referencing tables nor is refused by them.
    fn foreign_key_toggle_sql(&self) -> Option<(String, String)> {
        None
    }

    /// Query returning one row per foreign key violation
    fn foreign_key_check_sql(&self) -> Option<String> {
        None
    }

    /// Pagination suffix appended to a select statement
    fn limit_clause(&self, limit: Option<usize>, offset: usize) -> String {
        match (limit, offset) {
            (None, 0) => String::new(),
            (Some(limit), 0) => format!(" LIMIT {}", limit),
            (Some(limit), offset) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (None, offset) => format!(" LIMIT -1 OFFSET {}", offset),
        }
    }

    /// Render a complete schema diff in execution order
    ///
    /// Sequences come first, then created tables, altered tables and finally
    /// dropped tables. When a table is rebuilt, the whole list is bracketed by
    /// the platform's foreign key toggle.
    fn alter_schema_sql(&self, diff: &SchemaDiff) -> Vec<String> {
        let mut sql = Vec::new();

        if self.supports_sequences() {
            for sequence in &diff.dropped_sequences {
                sql.push(self.drop_sequence_sql(sequence));
            }
            for sequence in &diff.created_sequences {
                sql.push(self.create_sequence_sql(sequence));
            }
        } else if !diff.created_sequences.is_empty() || !diff.dropped_sequences.is_empty() {
            tracing::debug!(
                platform = self.name(),
                "sequences are not supported by this platform, skipping"
            );
        }

        for table in &diff.created_tables {
            sql.extend(self.create_table_sql(table));
        }
        for table_diff in &diff.altered_tables {
            sql.extend(self.alter_table_sql(table_diff));
        }
        for table in &diff.dropped_tables {
            sql.push(self.drop_table_sql(&table.name));
        }

        if diff.altered_tables.iter().any(|t| self.requires_rebuild(t)) {
            if let Some((off, on)) = self.foreign_key_toggle_sql() {
                sql.insert(0, off);
                sql.push(on);
            }
        }

        sql
    }
}
