//! Schema export and import
//!
//! [`ExportVisitor`] walks a [`Schema`] and projects it into a nested JSON
//! mapping keyed by table, column, index and sequence name. Column attributes
//! without a value are left out so that the document can be fed back to
//! [`import_schema`] unchanged.

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::model::{Column, ColumnType, ForeignKey, Index, Schema, Sequence, Table};

/// Callbacks invoked while walking a schema
pub trait SchemaVisitor {
    fn accept_schema(&mut self, _schema: &Schema) {}

    fn accept_table(&mut self, _table: &Table) {}

    fn accept_column(&mut self, _table: &Table, _column: &Column) {}

    fn accept_foreign_key(&mut self, _table: &Table, _fk: &ForeignKey) {}

    fn accept_index(&mut self, _table: &Table, _index: &Index) {}

    fn accept_sequence(&mut self, _sequence: &Sequence) {}
}

impl Schema {
    /// Walk every object of the schema, tables first and sequences last
    pub fn visit(&self, visitor: &mut dyn SchemaVisitor) {
        visitor.accept_schema(self);
        for table in self.tables() {
            visitor.accept_table(table);
            for column in &table.columns {
                visitor.accept_column(table, column);
            }
            for fk in &table.foreign_keys {
                visitor.accept_foreign_key(table, fk);
            }
            for index in &table.indexes {
                visitor.accept_index(table, index);
            }
        }
        for sequence in self.sequences() {
            visitor.accept_sequence(sequence);
        }
    }
}

/// Projects a schema into a serializable mapping
#[derive(Debug, Default)]
pub struct ExportVisitor {
    tables: BTreeMap<String, TableExport>,
    sequences: Map<String, Value>,
}

#[derive(Debug, Default)]
struct TableExport {
    options: Map<String, Value>,
    columns: Map<String, Value>,
    indexes: Map<String, Value>,
    constraints: Vec<Value>,
}

impl ExportVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a whole schema in one call
    pub fn export(schema: &Schema) -> Value {
        let mut visitor = Self::new();
        schema.visit(&mut visitor);
        visitor.into_value()
    }

    pub fn into_value(self) -> Value {
        let tables: Map<String, Value> = self
            .tables
            .into_iter()
            .map(|(name, t)| {
                let table = json!({
                    "options": t.options,
                    "columns": t.columns,
                    "indexes": t.indexes,
                    "constraint": t.constraints,
                });
                (name, table)
            })
            .collect();
        json!({
            "tables": tables,
            "sequence": self.sequences,
        })
    }

    fn table_entry(&mut self, table: &Table) -> &mut TableExport {
        self.tables.entry(table.name.clone()).or_default()
    }
}

impl SchemaVisitor for ExportVisitor {
    fn accept_table(&mut self, table: &Table) {
        self.table_entry(table).options = table
            .options
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
    }

    fn accept_column(&mut self, table: &Table, column: &Column) {
        self.table_entry(table)
            .columns
            .insert(column.name.clone(), export_column(column));
    }

    fn accept_foreign_key(&mut self, table: &Table, fk: &ForeignKey) {
        let mut options = Map::new();
        if let Some(action) = &fk.on_delete {
            options.insert("onDelete".to_string(), json!(action));
        }
        if let Some(action) = &fk.on_update {
            options.insert("onUpdate".to_string(), json!(action));
        }
        self.table_entry(table).constraints.push(json!({
            "name": fk.name,
            "localcolumns": fk.local_columns,
            "foreigntable": fk.foreign_table,
            "foreigncolumns": fk.foreign_columns,
            "options": options,
        }));
    }

    fn accept_index(&mut self, table: &Table, index: &Index) {
        self.table_entry(table).indexes.insert(
            index.name.clone(),
            json!({
                "name": index.name,
                "columns": index.columns,
                "unique": index.unique,
                "primary": index.primary,
            }),
        );
    }

    fn accept_sequence(&mut self, sequence: &Sequence) {
        self.sequences.insert(
            sequence.name.clone(),
            json!({
                "name": sequence.name,
                "allocationsize": sequence.allocation_size,
                "initialvalue": sequence.initial_value,
            }),
        );
    }
}

fn export_column(column: &Column) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(column.name));
    map.insert("type".to_string(), json!(column.column_type.name()));
    if let Some(length) = column.length {
        map.insert("length".to_string(), json!(length));
    }
    if let Some(precision) = column.precision {
        map.insert("precision".to_string(), json!(precision));
    }
    if let Some(scale) = column.scale {
        map.insert("scale".to_string(), json!(scale));
    }
    map.insert("unsigned".to_string(), json!(column.unsigned));
    map.insert("notnull".to_string(), json!(column.notnull));
    if let Some(default) = &column.default {
        map.insert("default".to_string(), json!(default));
    }
    map.insert("autoincrement".to_string(), json!(column.autoincrement));
    if let Some(comment) = &column.comment {
        map.insert("comment".to_string(), json!(comment));
    }
    Value::Object(map)
}

/// Rebuild a [`Schema`] from the mapping produced by [`ExportVisitor`]
pub fn import_schema(value: &Value) -> Result<Schema> {
    let mut schema = Schema::new();

    let tables = value
        .get("tables")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("Failed to import schema: missing 'tables' object"))?;

    for (table_name, definition) in tables {
        let table = schema.create_table(table_name);
        import_table(table, definition)
            .map_err(|e| anyhow!("Failed to import table '{}': {}", table_name, e))?;
    }

    if let Some(sequences) = value.get("sequence").and_then(Value::as_object) {
        for (name, definition) in sequences {
            let allocation_size = u32_field(definition, "allocationsize")?.unwrap_or(1);
            let initial_value = u32_field(definition, "initialvalue")?.unwrap_or(1);
            schema.create_sequence(name, allocation_size, initial_value);
        }
    }

    Ok(schema)
}

fn import_table(table: &mut Table, definition: &Value) -> Result<()> {
    if let Some(options) = definition.get("options").and_then(Value::as_object) {
        for (key, value) in options {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            table.add_option(key, &value);
        }
    }

    if let Some(columns) = definition.get("columns").and_then(Value::as_object) {
        for (name, column) in columns {
            let type_name = column
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("column '{}' has no type", name))?;
            let column_type: ColumnType = type_name.parse().map_err(|e| anyhow!("{}", e))?;

            let target = table.add_column(name, column_type);
            if let Some(length) = u32_field(column, "length")? {
                target.set_length(length);
            }
            target.precision = u32_field(column, "precision")?;
            target.scale = u32_field(column, "scale")?;
            target.unsigned = bool_field(column, "unsigned").unwrap_or(false);
            target.notnull = bool_field(column, "notnull").unwrap_or(true);
            target.autoincrement = bool_field(column, "autoincrement").unwrap_or(false);
            target.default = column.get("default").and_then(scalar_string);
            target.comment = column.get("comment").and_then(scalar_string);
        }
    }

    if let Some(indexes) = definition.get("indexes").and_then(Value::as_object) {
        for (name, index) in indexes {
            let columns = string_list(index, "columns");
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            if bool_field(index, "primary").unwrap_or(false) {
                table.set_primary_key(&columns);
            } else if bool_field(index, "unique").unwrap_or(false) {
                table.add_unique_index(&columns, name);
            } else {
                table.add_index(&columns, name);
            }
        }
    }

    if let Some(constraints) = definition.get("constraint").and_then(Value::as_array) {
        for constraint in constraints {
            let foreign_table = constraint
                .get("foreigntable")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("foreign key without 'foreigntable'"))?;
            let local = string_list(constraint, "localcolumns");
            let foreign = string_list(constraint, "foreigncolumns");
            let local: Vec<&str> = local.iter().map(String::as_str).collect();
            let foreign: Vec<&str> = foreign.iter().map(String::as_str).collect();
            let name = constraint
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let fk = table.add_foreign_key(foreign_table, &local, &foreign, name);
            if let Some(options) = constraint.get("options") {
                fk.on_delete = options.get("onDelete").and_then(scalar_string);
                fk.on_update = options.get("onUpdate").and_then(scalar_string);
            }
        }
    }

    Ok(())
}

fn u32_field(value: &Value, key: &str) -> Result<Option<u32>> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| anyhow!("'{}' is not a valid number: {}", key, v)),
    }
}

fn bool_field(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::Comparator;

    fn sample_schema() -> Schema {
        let mut schema = Schema::new();
        let users = schema.create_table("xo_users");
        users
            .add_column("uid", ColumnType::Integer)
            .set_autoincrement(true)
            .set_unsigned(true);
        users.add_column("uname", ColumnType::String).set_length(60);
        users
            .add_column("posts", ColumnType::Integer)
            .set_default(Some("0"))
            .set_comment(Some("post count"));
        users
            .add_column("rank", ColumnType::Decimal)
            .set_precision(8, 2)
            .set_notnull(false);
        users.set_primary_key(&["uid"]);
        users.add_unique_index(&["uname"], "uname");
        users.add_option("engine", "InnoDB");

        let session = schema.create_table("xo_session");
        session.add_column("sess_id", ColumnType::String).set_length(32);
        session.add_column("uid", ColumnType::Integer);
        session.set_primary_key(&["sess_id"]);
        session
            .add_foreign_key("xo_users", &["uid"], &["uid"], "fk_session_user")
            .on_delete = Some("CASCADE".to_string());

        schema.create_sequence("xo_seq", 5, 100);
        schema
    }

    #[test]
    fn test_export_shape() {
        let exported = ExportVisitor::export(&sample_schema());

        let uid = &exported["tables"]["xo_users"]["columns"]["uid"];
        assert_eq!(uid["type"], "integer");
        assert_eq!(uid["autoincrement"], true);
        assert!(uid.get("default").is_none());
        assert!(uid.get("length").is_none());
        assert!(uid.get("comment").is_none());

        let posts = &exported["tables"]["xo_users"]["columns"]["posts"];
        assert_eq!(posts["default"], "0");
        assert_eq!(posts["comment"], "post count");

        assert_eq!(exported["tables"]["xo_users"]["options"]["engine"], "InnoDB");
        assert_eq!(
            exported["tables"]["xo_users"]["indexes"]["primary"]["primary"],
            true
        );

        let fk = &exported["tables"]["xo_session"]["constraint"][0];
        assert_eq!(fk["foreigntable"], "xo_users");
        assert_eq!(fk["localcolumns"], json!(["uid"]));
        assert_eq!(fk["options"]["onDelete"], "CASCADE");

        assert_eq!(exported["sequence"]["xo_seq"]["allocationsize"], 5);
        assert_eq!(exported["sequence"]["xo_seq"]["initialvalue"], 100);
    }

    #[test]
    fn test_exported_columns_keep_table_order() {
        let exported = ExportVisitor::export(&sample_schema());
        let names: Vec<&String> = exported["tables"]["xo_users"]["columns"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(names, vec!["uid", "uname", "posts", "rank"]);
    }

    #[test]
    fn test_import_of_export_has_no_diff() {
        let schema = sample_schema();
        let imported = import_schema(&ExportVisitor::export(&schema)).unwrap();

        assert!(Comparator::compare_schemas(&schema, &imported).is_empty());
        let users = imported.table("xo_users").unwrap();
        assert_eq!(users.column("posts").unwrap().comment.as_deref(), Some("post count"));
        assert_eq!(users.options.get("engine").map(String::as_str), Some("InnoDB"));
        assert_eq!(imported.sequence("xo_seq").unwrap().initial_value, 100);
    }

    #[test]
    fn test_import_rejects_unknown_type() {
        let doc = json!({
            "tables": {"t": {"columns": {"g": {"type": "geometry"}}}}
        });
        let err = import_schema(&doc).unwrap_err();
        assert!(err.to_string().contains("Failed to import table 't'"));
    }

    #[test]
    fn test_import_requires_tables() {
        assert!(import_schema(&json!({"sequence": {}})).is_err());
    }

    #[derive(Default)]
    struct Counter {
        tables: usize,
        columns: usize,
        indexes: usize,
        foreign_keys: usize,
        sequences: usize,
    }

    impl SchemaVisitor for Counter {
        fn accept_table(&mut self, _table: &Table) {
            self.tables += 1;
        }
        fn accept_column(&mut self, _table: &Table, _column: &Column) {
            self.columns += 1;
        }
        fn accept_foreign_key(&mut self, _table: &Table, _fk: &ForeignKey) {
            self.foreign_keys += 1;
        }
        fn accept_index(&mut self, _table: &Table, _index: &Index) {
            self.indexes += 1;
        }
        fn accept_sequence(&mut self, _sequence: &Sequence) {
            self.sequences += 1;
        }
    }

    #[test]
    fn test_visit_reaches_every_object() {
        let mut counter = Counter::default();
        sample_schema().visit(&mut counter);
        assert_eq!(counter.tables, 2);
        assert_eq!(counter.columns, 6);
        assert_eq!(counter.indexes, 3);
        assert_eq!(counter.foreign_keys, 1);
        assert_eq!(counter.sequences, 1);
    }
}
