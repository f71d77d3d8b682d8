//! Read the live schema of a SQLite database

use rusqlite::Connection;
use std::collections::BTreeMap;

use super::platform::SqlitePlatform;
use crate::database::schema::{ForeignKey, Index, Schema, Table};

/// Build a [`Schema`] from `sqlite_master` and the table pragmas
pub(super) fn introspect(conn: &Connection) -> rusqlite::Result<Schema> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
    )?;
    let tables: Vec<(String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut schema = Schema::new();
    for (name, sql) in tables {
        let table = read_table(conn, &name, sql.as_deref().unwrap_or(""))?;
        schema.add_table(table);
    }
    Ok(schema)
}

struct ColumnInfo {
    name: String,
    declared_type: String,
    notnull: bool,
    default: Option<String>,
    pk: i64,
}

fn read_table(conn: &Connection, name: &str, create_sql: &str) -> rusqlite::Result<Table> {
    let mut table = Table::new(name);

    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns: Vec<ColumnInfo> = stmt
        .query_map([name], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                declared_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                notnull: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                pk: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut pk_columns: Vec<(i64, String)> = columns
        .iter()
        .filter(|c| c.pk > 0)
        .map(|c| (c.pk, c.name.clone()))
        .collect();
    pk_columns.sort();
    let autoincrement =
        pk_columns.len() == 1 && create_sql.to_uppercase().contains("AUTOINCREMENT");

    for info in &columns {
        let declared = SqlitePlatform::parse_declared_type(&info.declared_type);
        let column = table.add_column(&info.name, declared.column_type);
        column
            .set_notnull(info.notnull || info.pk > 0)
            .set_unsigned(declared.unsigned)
            .set_default(parse_default(info.default.as_deref()).as_deref());
        if let Some(length) = declared.length {
            column.set_length(length);
        }
        if let Some((precision, scale)) = declared.precision {
            column.set_precision(precision, scale);
        }
        if autoincrement && info.pk > 0 {
            column.set_autoincrement(true);
        }
    }

    if !pk_columns.is_empty() {
        let names: Vec<&str> = pk_columns.iter().map(|(_, n)| n.as_str()).collect();
        table.set_primary_key(&names);
    }

    for index in read_indexes(conn, name)? {
        table.indexes.push(index);
    }
    table.foreign_keys = read_foreign_keys(conn, name)?;

    Ok(table)
}

fn read_indexes(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Index>> {
    let mut stmt = conn.prepare(
        "SELECT name, \"unique\" FROM pragma_index_list(?1) WHERE origin = 'c' ORDER BY name",
    )?;
    let listed: Vec<(String, bool)> = stmt
        .query_map([table], |row| {
            Ok((row.get(0)?, row.get::<_, i64>(1)? != 0))
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut column_stmt =
        conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(listed.len());
    for (name, unique) in listed {
        let columns: Vec<String> = column_stmt
            .query_map([&name], |row| row.get::<_, Option<String>>(0))?
            .filter_map(|c| c.transpose())
            .collect::<rusqlite::Result<_>>()?;
        indexes.push(Index {
            name,
            columns,
            unique,
            primary: false,
        });
    }
    Ok(indexes)
}

fn read_foreign_keys(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ForeignKey>> {
    let mut stmt = conn.prepare(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let rows = stmt.query_map([table], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
    for row in rows {
        let (id, foreign_table, from, to, on_update, on_delete) = row?;
        let fk = grouped.entry(id).or_insert_with(|| ForeignKey {
            name: format!("fk_{}_{}", table, id),
            local_columns: Vec::new(),
            foreign_table,
            foreign_columns: Vec::new(),
            on_delete: action(&on_delete),
            on_update: action(&on_update),
        });
        fk.local_columns.push(from);
        fk.foreign_columns.push(to.unwrap_or_default());
    }
    Ok(grouped.into_values().collect())
}

fn action(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    if upper.is_empty() || upper == "NO ACTION" {
        None
    } else {
        Some(upper)
    }
}

/// Turn a stored default expression back into its plain value
fn parse_default(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(raw[1..raw.len() - 1].replace("''", "'"));
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::{ColumnType, Comparator, Platform};

    fn target_schema() -> Schema {
        let mut schema = Schema::new();
        let users = schema.create_table("xo_users");
        users
            .add_column("uid", ColumnType::Integer)
            .set_autoincrement(true)
            .set_unsigned(true);
        users.add_column("uname", ColumnType::String).set_length(60);
        users
            .add_column("email", ColumnType::String)
            .set_notnull(false);
        users
            .add_column("level", ColumnType::SmallInt)
            .set_default(Some("1"));
        users
            .add_column("theme", ColumnType::String)
            .set_default(Some("it's default"));
        users
            .add_column("balance", ColumnType::Decimal)
            .set_precision(12, 2);
        users
            .add_column("created", ColumnType::DateTime)
            .set_default(Some("CURRENT_TIMESTAMP"));
        users.set_primary_key(&["uid"]);
        users.add_unique_index(&["uname"], "uname");
        users.add_index(&["email", "level"], "idx_email_level");

        let groups = schema.create_table("xo_groups_users_link");
        groups.add_column("groupid", ColumnType::Integer);
        groups.add_column("uid", ColumnType::Integer);
        groups.set_primary_key(&["groupid", "uid"]);
        groups
            .add_foreign_key("xo_users", &["uid"], &["uid"], "fk_link_users")
            .on_delete = Some("CASCADE".to_string());
        schema
    }

    fn build(schema: &Schema) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for table in schema.tables() {
            for sql in SqlitePlatform.create_table_sql(table) {
                conn.execute(&sql, []).unwrap();
            }
        }
        conn
    }

    #[test]
    fn test_roundtrip_has_no_diff() {
        let target = target_schema();
        let conn = build(&target);
        let live = introspect(&conn).unwrap();

        let diff = Comparator::compare_schemas(&live, &target);
        assert!(diff.is_empty(), "unexpected diff: {:?}", diff);
    }

    #[test]
    fn test_introspected_details() {
        let conn = build(&target_schema());
        let live = introspect(&conn).unwrap();

        let users = live.table("xo_users").unwrap();
        assert_eq!(users.autoincrement_column().unwrap().name, "uid");
        assert_eq!(users.column("theme").unwrap().default.as_deref(), Some("it's default"));
        assert!(!users.column("email").unwrap().notnull);
        assert_eq!(users.index("idx_email_level").unwrap().columns, vec!["email", "level"]);

        let link = live.table("xo_groups_users_link").unwrap();
        assert_eq!(link.primary_key().unwrap().columns, vec!["groupid", "uid"]);
        assert!(link.autoincrement_column().is_none());
        assert_eq!(link.foreign_keys.len(), 1);
        assert_eq!(link.foreign_keys[0].on_delete.as_deref(), Some("CASCADE"));
    }

    #[test]
    fn test_internal_tables_are_skipped() {
        let conn = build(&target_schema());
        let live = introspect(&conn).unwrap();
        assert!(live.tables().all(|t| !t.name.starts_with("sqlite_")));
        assert_eq!(live.tables().count(), 2);
    }

    #[test]
    fn test_parse_default() {
        assert_eq!(parse_default(None), None);
        assert_eq!(parse_default(Some("NULL")), None);
        assert_eq!(parse_default(Some("'a''b'")).as_deref(), Some("a'b"));
        assert_eq!(parse_default(Some("0")).as_deref(), Some("0"));
    }
}
