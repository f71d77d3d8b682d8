//! Structural schema comparison
//!
//! [`Comparator::compare_schemas`] computes what has to change to turn one
//! schema into another. Names are compared case-insensitively. Foreign keys are
//! matched by definition since not every database keeps constraint names.

use super::model::{Column, ColumnType, ForeignKey, Index, Schema, Sequence, Table};

/// A column whose definition differs between the two schemas
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDiff {
    pub from: Column,
    pub to: Column,
}

/// Changes to a table that exists on both sides
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// The table as it currently exists
    pub from: Table,
    /// The table as it should be
    pub to: Table,
    pub added_columns: Vec<Column>,
    pub removed_columns: Vec<Column>,
    pub changed_columns: Vec<ColumnDiff>,
    pub added_indexes: Vec<Index>,
    pub removed_indexes: Vec<Index>,
    /// Indexes present on both sides under the same name with a different definition
    pub changed_indexes: Vec<Index>,
    pub added_foreign_keys: Vec<ForeignKey>,
    pub removed_foreign_keys: Vec<ForeignKey>,
}

impl TableDiff {
    fn new(from: &Table, to: &Table) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
            added_columns: Vec::new(),
            removed_columns: Vec::new(),
            changed_columns: Vec::new(),
            added_indexes: Vec::new(),
            removed_indexes: Vec::new(),
            changed_indexes: Vec::new(),
            added_foreign_keys: Vec::new(),
            removed_foreign_keys: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.changed_indexes.is_empty()
            && self.added_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
    }

    /// Whether the primary key is added, removed or redefined
    pub fn primary_key_changed(&self) -> bool {
        self.added_indexes
            .iter()
            .chain(&self.removed_indexes)
            .chain(&self.changed_indexes)
            .any(|i| i.primary)
    }
}

/// The complete difference between two schemas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub created_tables: Vec<Table>,
    pub altered_tables: Vec<TableDiff>,
    pub dropped_tables: Vec<Table>,
    pub created_sequences: Vec<Sequence>,
    pub dropped_sequences: Vec<Sequence>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.created_tables.is_empty()
            && self.altered_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.created_sequences.is_empty()
            && self.dropped_sequences.is_empty()
    }
}

/// Schema comparator
pub struct Comparator;

impl Comparator {
    /// Compute the changes needed to turn `from` into `to`
    pub fn compare_schemas(from: &Schema, to: &Schema) -> SchemaDiff {
        let mut diff = SchemaDiff::default();

        for table in to.tables() {
            match from.table(&table.name) {
                None => diff.created_tables.push(table.clone()),
                Some(existing) => {
                    if let Some(table_diff) = Self::compare_tables(existing, table) {
                        diff.altered_tables.push(table_diff);
                    }
                }
            }
        }

        for table in from.tables() {
            if !to.has_table(&table.name) {
                diff.dropped_tables.push(table.clone());
            }
        }

        for sequence in to.sequences() {
            match from.sequence(&sequence.name) {
                None => diff.created_sequences.push(sequence.clone()),
                Some(existing) if existing != sequence => {
                    diff.dropped_sequences.push(existing.clone());
                    diff.created_sequences.push(sequence.clone());
                }
                Some(_) => {}
            }
        }

        for sequence in from.sequences() {
            if to.sequence(&sequence.name).is_none() {
                diff.dropped_sequences.push(sequence.clone());
            }
        }

        diff
    }

    /// Compare two definitions of the same table; `None` when they are equivalent
    pub fn compare_tables(from: &Table, to: &Table) -> Option<TableDiff> {
        let mut diff = TableDiff::new(from, to);

        for column in &to.columns {
            match from.column(&column.name) {
                None => diff.added_columns.push(column.clone()),
                Some(existing) => {
                    if Self::column_changed(existing, column) {
                        diff.changed_columns.push(ColumnDiff {
                            from: existing.clone(),
                            to: column.clone(),
                        });
                    }
                }
            }
        }
        for column in &from.columns {
            if !to.has_column(&column.name) {
                diff.removed_columns.push(column.clone());
            }
        }

        for index in &to.indexes {
            match find_index(from, index) {
                None => diff.added_indexes.push(index.clone()),
                Some(existing) => {
                    if !existing.same_definition(index) {
                        diff.changed_indexes.push(index.clone());
                    }
                }
            }
        }
        for index in &from.indexes {
            if find_index(to, index).is_none() {
                diff.removed_indexes.push(index.clone());
            }
        }

        for fk in &to.foreign_keys {
            if !from.foreign_keys.iter().any(|f| f.same_definition(fk)) {
                diff.added_foreign_keys.push(fk.clone());
            }
        }
        for fk in &from.foreign_keys {
            if !to.foreign_keys.iter().any(|f| f.same_definition(fk)) {
                diff.removed_foreign_keys.push(fk.clone());
            }
        }

        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    /// Whether two definitions of the same column differ
    pub fn column_changed(from: &Column, to: &Column) -> bool {
        if normalized_type(from) != normalized_type(to) {
            return true;
        }
        if from.notnull != to.notnull || from.autoincrement != to.autoincrement {
            return true;
        }
        if from.default != to.default {
            return true;
        }
        if from.effective_length() != to.effective_length() {
            return true;
        }
        if from.effective_precision() != to.effective_precision() {
            return true;
        }
        from.column_type.is_integer() && !from.autoincrement && from.unsigned != to.unsigned
    }
}

// Autoincrement columns are always stored as plain integers.
fn normalized_type(column: &Column) -> ColumnType {
    if column.autoincrement && column.column_type.is_integer() {
        ColumnType::Integer
    } else {
        column.column_type
    }
}

fn find_index<'t>(table: &'t Table, index: &Index) -> Option<&'t Index> {
    if index.primary {
        table.primary_key()
    } else {
        table
            .indexes
            .iter()
            .find(|i| !i.primary && i.name.eq_ignore_ascii_case(&index.name))
    }
}
