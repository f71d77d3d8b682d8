//! Incremental SQL query builder
//!
//! `QueryBuilder` assembles `SELECT`, `INSERT`, `UPDATE`, `DELETE` and `UNION`
//! statements part by part, collects positional parameters, and runs the
//! result through the [`Connection`] it was created from.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlgate::database::{Connection, ParamType, Value};
//!
//! let mut qb = conn.create_query_builder();
//! qb.select(&["u.uid", "u.uname"])
//!     .from_prefix("users", Some("u"))
//!     .left_join_prefix("u", "groups_users_link", "l", "l.uid = u.uid")
//!     .where_clause("u.level > ?")
//!     .set_parameter(0, Value::from(0), ParamType::Integer)
//!     .order_by("u.uname", "ASC")
//!     .set_max_results(Some(10));
//!
//! let result = qb.execute()?;
//!
//! // start over with the same builder
//! qb.reset_query_parts()
//!     .delete_prefix("session", None)
//!     .where_clause("sess_updated < 100");
//! qb.execute()?;
//! ```

use anyhow::Result;
use std::collections::HashSet;

use crate::database::core::{starts_with_keyword, Connection, QueryResult, WriteOutcome};
use crate::database::value::{ParamType, ParamTypes, Value};

/// Kind of statement being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Delete,
    Update,
    Insert,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    from_alias: String,
    kind: JoinKind,
    table: String,
    alias: String,
    condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Junction {
    And,
    Or,
}

/// `WHERE` or `HAVING` predicate built from `and_*` / `or_*` calls
#[derive(Debug, Clone)]
struct Predicate {
    junction: Junction,
    parts: Vec<String>,
}

impl Predicate {
    fn single(part: &str) -> Self {
        Self {
            junction: Junction::And,
            parts: vec![part.to_string()],
        }
    }

    fn combine(current: Option<Predicate>, junction: Junction, part: &str) -> Predicate {
        match current {
            None => Predicate::single(part),
            Some(mut predicate) if predicate.junction == junction || predicate.parts.len() == 1 => {
                predicate.junction = junction;
                predicate.parts.push(part.to_string());
                predicate
            }
            Some(predicate) => Predicate {
                junction,
                parts: vec![predicate.render(), part.to_string()],
            },
        }
    }

    fn render(&self) -> String {
        if self.parts.len() == 1 {
            return self.parts[0].clone();
        }
        let glue = match self.junction {
            Junction::And => ") AND (",
            Junction::Or => ") OR (",
        };
        format!("({})", self.parts.join(glue))
    }
}

#[derive(Debug, Clone)]
struct Cte {
    name: String,
    columns: Vec<String>,
    sql: String,
}

/// Builder for one statement at a time, bound to a [`Connection`]
pub struct QueryBuilder<'a> {
    conn: &'a Connection,
    query_type: QueryType,
    select: Vec<String>,
    distinct: bool,
    from: Vec<(String, Option<String>)>,
    table: Option<String>,
    table_alias: Option<String>,
    joins: Vec<Join>,
    set: Vec<String>,
    where_part: Option<Predicate>,
    group_by: Vec<String>,
    having: Option<Predicate>,
    order_by: Vec<String>,
    values: Vec<(String, String)>,
    unions: Vec<(String, bool)>,
    ctes: Vec<Cte>,
    params: Vec<Value>,
    types: Vec<ParamType>,
    first_result: usize,
    max_results: Option<usize>,
    param_counter: usize,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            query_type: QueryType::Select,
            select: Vec::new(),
            distinct: false,
            from: Vec::new(),
            table: None,
            table_alias: None,
            joins: Vec::new(),
            set: Vec::new(),
            where_part: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            values: Vec::new(),
            unions: Vec::new(),
            ctes: Vec::new(),
            params: Vec::new(),
            types: Vec::new(),
            first_result: 0,
            max_results: None,
            param_counter: 0,
        }
    }

    /// Restore the just-constructed state so that the builder can be reused
    pub fn reset_query_parts(&mut self) -> &mut Self {
        self.query_type = QueryType::Select;
        self.select.clear();
        self.distinct = false;
        self.from.clear();
        self.table = None;
        self.table_alias = None;
        self.joins.clear();
        self.set.clear();
        self.where_part = None;
        self.group_by.clear();
        self.having = None;
        self.order_by.clear();
        self.values.clear();
        self.unions.clear();
        self.ctes.clear();
        self.params.clear();
        self.types.clear();
        self.first_result = 0;
        self.max_results = None;
        self.param_counter = 0;
        self
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    // ------------------------------------------------------------------
    // statement type
    // ------------------------------------------------------------------

    /// Set the selected expressions
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.query_type = QueryType::Select;
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add selected expressions
    pub fn add_select(&mut self, columns: &[&str]) -> &mut Self {
        self.query_type = QueryType::Select;
        self.select.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn delete(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.query_type = QueryType::Delete;
        self.table = Some(table.to_string());
        self.table_alias = alias.map(str::to_string);
        self
    }

    pub fn update(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.query_type = QueryType::Update;
        self.table = Some(table.to_string());
        self.table_alias = alias.map(str::to_string);
        self
    }

    pub fn insert(&mut self, table: &str) -> &mut Self {
        self.query_type = QueryType::Insert;
        self.table = Some(table.to_string());
        self.table_alias = None;
        self
    }

    /// Start a union with its first `SELECT`
    pub fn union(&mut self, sql: &str) -> &mut Self {
        self.query_type = QueryType::Union;
        self.unions = vec![(sql.to_string(), false)];
        self
    }

    /// Add another `SELECT` to the union; `all` keeps duplicates
    pub fn add_union(&mut self, sql: &str, all: bool) -> &mut Self {
        self.query_type = QueryType::Union;
        self.unions.push((sql.to_string(), all));
        self
    }

    /// Add a common table expression
    pub fn with(&mut self, name: &str, sql: &str, columns: &[&str]) -> &mut Self {
        self.ctes.push(Cte {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            sql: sql.to_string(),
        });
        self
    }

    // ------------------------------------------------------------------
    // tables and joins
    // ------------------------------------------------------------------

    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.from
            .push((table.to_string(), alias.map(str::to_string)));
        self
    }

    /// Inner join attached to the table or join known as `from_alias`
    pub fn join(&mut self, from_alias: &str, table: &str, alias: &str, condition: &str) -> &mut Self {
        self.inner_join(from_alias, table, alias, condition)
    }

    pub fn inner_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        self.add_join(JoinKind::Inner, from_alias, table, alias, condition)
    }

    pub fn left_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        self.add_join(JoinKind::Left, from_alias, table, alias, condition)
    }

    pub fn right_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        self.add_join(JoinKind::Right, from_alias, table, alias, condition)
    }

    fn add_join(
        &mut self,
        kind: JoinKind,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        self.joins.push(Join {
            from_alias: from_alias.to_string(),
            kind,
            table: table.to_string(),
            alias: alias.to_string(),
            condition: (!condition.is_empty()).then(|| condition.to_string()),
        });
        self
    }

    // ------------------------------------------------------------------
    // prefixed tables
    // ------------------------------------------------------------------

    pub fn delete_prefix(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        let table = self.conn.prefix(table);
        self.delete(&table, alias)
    }

    pub fn update_prefix(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        let table = self.conn.prefix(table);
        self.update(&table, alias)
    }

    pub fn insert_prefix(&mut self, table: &str) -> &mut Self {
        let table = self.conn.prefix(table);
        self.insert(&table)
    }

    pub fn from_prefix(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        let table = self.conn.prefix(table);
        self.from(&table, alias)
    }

    pub fn join_prefix(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        let table = self.conn.prefix(table);
        self.join(from_alias, &table, alias, condition)
    }

    pub fn inner_join_prefix(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        let table = self.conn.prefix(table);
        self.inner_join(from_alias, &table, alias, condition)
    }

    pub fn left_join_prefix(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        let table = self.conn.prefix(table);
        self.left_join(from_alias, &table, alias, condition)
    }

    pub fn right_join_prefix(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: &str,
        condition: &str,
    ) -> &mut Self {
        let table = self.conn.prefix(table);
        self.right_join(from_alias, &table, alias, condition)
    }

    // ------------------------------------------------------------------
    // clauses
    // ------------------------------------------------------------------

    /// Set `column = expression` for an update
    pub fn set(&mut self, column: &str, expression: &str) -> &mut Self {
        self.set.push(format!("{} = {}", column, expression));
        self
    }

    /// Replace the inserted column/expression pairs
    pub fn values(&mut self, values: &[(&str, &str)]) -> &mut Self {
        self.values = values
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect();
        self
    }

    /// Set the expression inserted for one column
    pub fn set_value(&mut self, column: &str, expression: &str) -> &mut Self {
        match self.values.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = expression.to_string(),
            None => self
                .values
                .push((column.to_string(), expression.to_string())),
        }
        self
    }

    /// Replace the `WHERE` predicate
    pub fn where_clause(&mut self, predicate: &str) -> &mut Self {
        self.where_part = Some(Predicate::single(predicate));
        self
    }

    pub fn and_where(&mut self, predicate: &str) -> &mut Self {
        self.where_part = Some(Predicate::combine(
            self.where_part.take(),
            Junction::And,
            predicate,
        ));
        self
    }

    pub fn or_where(&mut self, predicate: &str) -> &mut Self {
        self.where_part = Some(Predicate::combine(
            self.where_part.take(),
            Junction::Or,
            predicate,
        ));
        self
    }

    pub fn group_by(&mut self, expressions: &[&str]) -> &mut Self {
        self.group_by = expressions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn add_group_by(&mut self, expressions: &[&str]) -> &mut Self {
        self.group_by
            .extend(expressions.iter().map(|e| e.to_string()));
        self
    }

    /// Replace the `HAVING` predicate
    pub fn having(&mut self, predicate: &str) -> &mut Self {
        self.having = Some(Predicate::single(predicate));
        self
    }

    pub fn and_having(&mut self, predicate: &str) -> &mut Self {
        self.having = Some(Predicate::combine(
            self.having.take(),
            Junction::And,
            predicate,
        ));
        self
    }

    pub fn or_having(&mut self, predicate: &str) -> &mut Self {
        self.having = Some(Predicate::combine(
            self.having.take(),
            Junction::Or,
            predicate,
        ));
        self
    }

    /// Replace the ordering
    pub fn order_by(&mut self, sort: &str, order: &str) -> &mut Self {
        self.order_by.clear();
        self.add_order_by(sort, order)
    }

    pub fn add_order_by(&mut self, sort: &str, order: &str) -> &mut Self {
        if order.is_empty() {
            self.order_by.push(sort.to_string());
        } else {
            self.order_by.push(format!("{} {}", sort, order));
        }
        self
    }

    /// Set OFFSET
    pub fn set_first_result(&mut self, first_result: usize) -> &mut Self {
        self.first_result = first_result;
        self
    }

    /// Set LIMIT; `None` removes it
    pub fn set_max_results(&mut self, max_results: Option<usize>) -> &mut Self {
        self.max_results = max_results;
        self
    }

    // ------------------------------------------------------------------
    // parameters
    // ------------------------------------------------------------------

    /// Bind a value to a zero-based positional parameter
    pub fn set_parameter(&mut self, index: usize, value: Value, param_type: ParamType) -> &mut Self {
        if self.params.len() <= index {
            self.params.resize(index + 1, Value::Null);
            self.types.resize(index + 1, ParamType::default());
        }
        self.params[index] = value;
        self.types[index] = param_type;
        self.param_counter = self.param_counter.max(index + 1);
        self
    }

    /// Replace all positional parameters
    pub fn set_parameters(&mut self, params: Vec<Value>, types: Vec<ParamType>) -> &mut Self {
        self.param_counter = params.len();
        self.params = params;
        self.types = types;
        self
    }

    /// Bind a value to the next positional parameter and return its placeholder
    pub fn create_positional_parameter(&mut self, value: Value, param_type: ParamType) -> String {
        let index = self.param_counter;
        self.set_parameter(index, value, param_type);
        "?".to_string()
    }

    pub fn parameters(&self) -> &[Value] {
        &self.params
    }

    pub fn parameter_types(&self) -> &[ParamType] {
        &self.types
    }

    // ------------------------------------------------------------------
    // rendering and execution
    // ------------------------------------------------------------------

    /// The SQL for the current parts
    pub fn sql(&self) -> String {
        let body = match self.query_type {
            QueryType::Select => self.select_sql(),
            QueryType::Insert => self.insert_sql(),
            QueryType::Update => self.update_sql(),
            QueryType::Delete => self.delete_sql(),
            QueryType::Union => self.union_sql(),
        };
        format!("{}{}", self.with_sql(), body)
    }

    fn with_sql(&self) -> String {
        if self.ctes.is_empty() {
            return String::new();
        }
        let ctes: Vec<String> = self
            .ctes
            .iter()
            .map(|cte| {
                if cte.columns.is_empty() {
                    format!("{} AS ({})", cte.name, cte.sql)
                } else {
                    format!("{}({}) AS ({})", cte.name, cte.columns.join(", "), cte.sql)
                }
            })
            .collect();
        format!("WITH {} ", ctes.join(", "))
    }

    fn select_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select.join(", "));

        if !self.from.is_empty() {
            let from: Vec<String> = self
                .from
                .iter()
                .map(|(table, alias)| {
                    let mut part = match alias {
                        Some(alias) => format!("{} {}", table, alias),
                        None => table.clone(),
                    };
                    let key = alias.as_deref().unwrap_or(table);
                    let mut visited = HashSet::from([key]);
                    self.append_joins(&mut part, key, &mut visited);
                    part
                })
                .collect();
            sql.push_str(" FROM ");
            sql.push_str(&from.join(", "));
        }

        self.append_where(&mut sql);
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&having.render());
        }
        self.append_order_and_limit(&mut sql);
        sql
    }

    /// Render the joins hanging off `alias`, then the joins off each of them.
    /// An alias is rendered at most once per FROM entry.
    fn append_joins<'s>(&'s self, sql: &mut String, alias: &str, visited: &mut HashSet<&'s str>) {
        for join in self.joins.iter().filter(|j| j.from_alias == alias) {
            if !visited.insert(join.alias.as_str()) {
                tracing::warn!(alias = %join.alias, "skipping join, alias already in use");
                continue;
            }
            sql.push_str(&format!(" {} {} {}", join.kind.keyword(), join.table, join.alias));
            if let Some(condition) = &join.condition {
                sql.push_str(&format!(" ON {}", condition));
            }
            self.append_joins(sql, &join.alias, visited);
        }
    }

    fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
        let values: Vec<&str> = self.values.iter().map(|(_, v)| v.as_str()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES({})",
            self.table.as_deref().unwrap_or_default(),
            columns.join(", "),
            values.join(", ")
        )
    }

    /// Target table of an update or delete, with its alias
    fn target_table(&self) -> String {
        let table = self.table.as_deref().unwrap_or_default();
        match &self.table_alias {
            Some(alias) => format!("{} AS {}", table, alias),
            None => table.to_string(),
        }
    }

    fn update_sql(&self) -> String {
        let mut sql = format!("UPDATE {} SET {}", self.target_table(), self.set.join(", "));
        self.append_where(&mut sql);
        sql
    }

    fn delete_sql(&self) -> String {
        let mut sql = format!("DELETE FROM {}", self.target_table());
        self.append_where(&mut sql);
        sql
    }

    fn union_sql(&self) -> String {
        let mut sql = String::new();
        for (i, (part, all)) in self.unions.iter().enumerate() {
            if i > 0 {
                sql.push_str(if *all { " UNION ALL " } else { " UNION " });
            }
            sql.push_str(part);
        }
        self.append_order_and_limit(&mut sql);
        sql
    }

    fn append_where(&self, sql: &mut String) {
        if let Some(predicate) = &self.where_part {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.render());
        }
    }

    fn append_order_and_limit(&self, sql: &mut String) {
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql.push_str(
            &self
                .conn
                .platform()
                .limit_clause(self.max_results, self.first_result),
        );
    }

    /// Run the statement
    ///
    /// Statements starting with `SELECT` or `WITH` are reads and return rows.
    /// Anything else goes through the connection's write gate: a denied write
    /// reports zero affected rows, and a driver error is returned.
    pub fn execute(&self) -> Result<QueryResult> {
        let sql = self.sql();
        let types = ParamTypes::Positional(self.types.clone());

        if starts_with_keyword(&sql, "select") || starts_with_keyword(&sql, "with") {
            return self
                .conn
                .execute_query(&sql, &self.params, &types)
                .map(QueryResult::Rows);
        }

        match self.conn.execute_statement(&sql, &self.params, &types) {
            WriteOutcome::Written(affected) => Ok(QueryResult::Affected(affected)),
            WriteOutcome::Denied => Ok(QueryResult::Affected(0)),
            WriteOutcome::Failed(e) => Err(e),
        }
    }
}
