//! Schema description, comparison and export
//!
//! - [`model`]: tables, columns, indexes, foreign keys and sequences
//! - [`comparator`]: structural diff between two schemas
//! - [`platform`]: rendering schemas and diffs into DDL
//! - [`export`]: visitor-based export to JSON and the matching import

pub mod comparator;
pub mod export;
pub mod model;
pub mod platform;

pub use comparator::{ColumnDiff, Comparator, SchemaDiff, TableDiff};
pub use export::{import_schema, ExportVisitor, SchemaVisitor};
pub use model::{
    Column, ColumnType, ForeignKey, Index, Schema, Sequence, Table, DEFAULT_DECIMAL_PRECISION,
    DEFAULT_STRING_LENGTH,
};
pub use platform::Platform;
