//! In-memory schema description
//!
//! A [`Schema`] is either introspected from a live database or declared by the
//! application as the target state for synchronization.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default length of a `String` column without an explicit length
pub const DEFAULT_STRING_LENGTH: u32 = 255;
/// Default precision of a `Decimal` column
pub const DEFAULT_DECIMAL_PRECISION: u32 = 10;

/// Abstract column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    BigInt,
    SmallInt,
    Boolean,
    String,
    Text,
    Float,
    Decimal,
    Date,
    DateTime,
    Time,
    Blob,
}

impl ColumnType {
    /// Type name used in exported schemas
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::SmallInt => "smallint",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Blob => "blob",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::BigInt | ColumnType::SmallInt
        )
    }

    /// Whether default values of this type are written unquoted
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Boolean | ColumnType::Float | ColumnType::Decimal
            )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(ColumnType::Integer),
            "bigint" => Ok(ColumnType::BigInt),
            "smallint" => Ok(ColumnType::SmallInt),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "string" | "varchar" => Ok(ColumnType::String),
            "text" => Ok(ColumnType::Text),
            "float" | "double" => Ok(ColumnType::Float),
            "decimal" | "numeric" => Ok(ColumnType::Decimal),
            "date" => Ok(ColumnType::Date),
            "datetime" => Ok(ColumnType::DateTime),
            "time" => Ok(ColumnType::Time),
            "blob" | "binary" => Ok(ColumnType::Blob),
            other => Err(format!("Unknown column type: {}", other)),
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
    pub notnull: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
    pub comment: Option<String>,
}

impl Column {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            unsigned: false,
            notnull: true,
            default: None,
            autoincrement: false,
            comment: None,
        }
    }

    pub fn set_length(&mut self, length: u32) -> &mut Self {
        self.length = Some(length);
        self
    }

    pub fn set_precision(&mut self, precision: u32, scale: u32) -> &mut Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn set_unsigned(&mut self, unsigned: bool) -> &mut Self {
        self.unsigned = unsigned;
        self
    }

    pub fn set_notnull(&mut self, notnull: bool) -> &mut Self {
        self.notnull = notnull;
        self
    }

    pub fn set_default(&mut self, default: Option<&str>) -> &mut Self {
        self.default = default.map(str::to_string);
        self
    }

    pub fn set_autoincrement(&mut self, autoincrement: bool) -> &mut Self {
        self.autoincrement = autoincrement;
        self
    }

    pub fn set_comment(&mut self, comment: Option<&str>) -> &mut Self {
        self.comment = comment.map(str::to_string);
        self
    }

    /// Length used for comparison and rendering of `String` columns
    pub fn effective_length(&self) -> Option<u32> {
        match self.column_type {
            ColumnType::String => Some(self.length.unwrap_or(DEFAULT_STRING_LENGTH)),
            _ => None,
        }
    }

    /// Precision and scale used for comparison and rendering of `Decimal` columns
    pub fn effective_precision(&self) -> Option<(u32, u32)> {
        match self.column_type {
            ColumnType::Decimal => Some((
                self.precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                self.scale.unwrap_or(0),
            )),
            _ => None,
        }
    }
}

/// A table index; the primary key is an index with `primary` set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
}

impl Index {
    /// Structural equality, ignoring the index name
    pub fn same_definition(&self, other: &Index) -> bool {
        self.unique == other.unique
            && self.primary == other.primary
            && same_names(&self.columns, &other.columns)
    }
}

/// A foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub local_columns: Vec<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

impl ForeignKey {
    /// Structural equality, ignoring the constraint name
    pub fn same_definition(&self, other: &ForeignKey) -> bool {
        self.foreign_table.eq_ignore_ascii_case(&other.foreign_table)
            && same_names(&self.local_columns, &other.local_columns)
            && same_names(&self.foreign_columns, &other.foreign_columns)
            && same_action(&self.on_delete, &other.on_delete)
            && same_action(&self.on_update, &other.on_update)
    }
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

fn same_action(a: &Option<String>, b: &Option<String>) -> bool {
    fn normalize(action: &Option<String>) -> Option<String> {
        action
            .as_deref()
            .map(str::to_uppercase)
            .filter(|a| a != "NO ACTION")
    }
    normalize(a) == normalize(b)
}

/// A sequence (not supported by every platform)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub allocation_size: u32,
    pub initial_value: u32,
}

/// A table definition
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub options: BTreeMap<String, String>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Add a column, replacing an existing column of the same name
    pub fn add_column(&mut self, name: &str, column_type: ColumnType) -> &mut Column {
        self.columns.retain(|c| !c.name.eq_ignore_ascii_case(name));
        self.columns.push(Column::new(name, column_type));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn set_primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.indexes.retain(|i| !i.primary);
        self.indexes.insert(
            0,
            Index {
                name: "primary".to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                unique: true,
                primary: true,
            },
        );
        self
    }

    pub fn add_index(&mut self, columns: &[&str], name: &str) -> &mut Self {
        self.push_index(columns, name, false)
    }

    pub fn add_unique_index(&mut self, columns: &[&str], name: &str) -> &mut Self {
        self.push_index(columns, name, true)
    }

    fn push_index(&mut self, columns: &[&str], name: &str, unique: bool) -> &mut Self {
        self.indexes.retain(|i| !i.name.eq_ignore_ascii_case(name));
        self.indexes.push(Index {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
            primary: false,
        });
        self
    }

    pub fn add_foreign_key(
        &mut self,
        foreign_table: &str,
        local_columns: &[&str],
        foreign_columns: &[&str],
        name: &str,
    ) -> &mut ForeignKey {
        self.foreign_keys.push(ForeignKey {
            name: name.to_string(),
            local_columns: local_columns.iter().map(|c| c.to_string()).collect(),
            foreign_table: foreign_table.to_string(),
            foreign_columns: foreign_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: None,
            on_update: None,
        });
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    pub fn add_option(&mut self, key: &str, value: &str) -> &mut Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.primary)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The single autoincrement column backing the primary key, if any
    pub fn autoincrement_column(&self) -> Option<&Column> {
        let pk = self.primary_key()?;
        if pk.columns.len() != 1 {
            return None;
        }
        self.column(&pk.columns[0])
            .filter(|c| c.autoincrement && c.column_type.is_integer())
    }
}

/// A complete schema: tables keyed by lowercase name plus sequences
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
    sequences: BTreeMap<String, Sequence>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table and return it for further definition
    pub fn create_table(&mut self, name: &str) -> &mut Table {
        match self.tables.entry(name.to_lowercase()) {
            Entry::Occupied(mut entry) => {
                entry.insert(Table::new(name));
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(Table::new(name)),
        }
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(&name.to_lowercase())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    pub fn drop_table(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn create_sequence(&mut self, name: &str, allocation_size: u32, initial_value: u32) {
        self.sequences.insert(
            name.to_lowercase(),
            Sequence {
                name: name.to_string(),
                allocation_size,
                initial_value,
            },
        );
    }

    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(&name.to_lowercase())
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let mut schema = Schema::new();
        let table = schema.create_table("xo_users");
        table
            .add_column("uid", ColumnType::Integer)
            .set_autoincrement(true);
        table.add_column("uname", ColumnType::String).set_length(60);
        table.set_primary_key(&["uid"]);
        table.add_unique_index(&["uname"], "uname");

        let table = schema.table("XO_USERS").unwrap();
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.primary_key().unwrap().columns, vec!["uid"]);
        assert_eq!(table.autoincrement_column().unwrap().name, "uid");
        assert!(table.index("uname").unwrap().unique);
    }

    #[test]
    fn test_add_column_replaces() {
        let mut table = Table::new("t");
        table.add_column("a", ColumnType::Integer);
        table.add_column("A", ColumnType::Text);
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.column("a").unwrap().column_type, ColumnType::Text);
    }

    #[test]
    fn test_effective_defaults() {
        let column = Column::new("name", ColumnType::String);
        assert_eq!(column.effective_length(), Some(DEFAULT_STRING_LENGTH));
        let column = Column::new("price", ColumnType::Decimal);
        assert_eq!(column.effective_precision(), Some((10, 0)));
        assert_eq!(Column::new("n", ColumnType::Integer).effective_length(), None);
    }

    #[test]
    fn test_foreign_key_definition_ignores_name_and_no_action() {
        let mut a = Table::new("a");
        let fk = a.add_foreign_key("b", &["b_id"], &["id"], "fk_one");
        fk.on_delete = Some("NO ACTION".to_string());
        let mut c = Table::new("c");
        c.add_foreign_key("B", &["B_ID"], &["ID"], "fk_other");
        assert!(a.foreign_keys[0].same_definition(&c.foreign_keys[0]));
    }

    #[test]
    fn test_column_type_names() {
        assert_eq!("DateTime".parse::<ColumnType>().unwrap(), ColumnType::DateTime);
        assert_eq!(ColumnType::BigInt.to_string(), "bigint");
        assert!("geometry".parse::<ColumnType>().is_err());
    }
}
