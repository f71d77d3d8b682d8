//! Schema synchronization
//!
//! Brings a live database in line with a declared target [`Schema`]. The live
//! schema is introspected, compared with the target, and the difference is
//! rendered as SQL for the connection's platform.

use anyhow::{anyhow, Result};

use super::connection::{starts_with_keyword, Connection};
use crate::database::schema::{Comparator, Schema};
use crate::database::value::ParamTypes;

/// Computes and applies the statements that turn the live schema into a target
pub struct SchemaSynchronizer<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaSynchronizer<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Statements that would update the live schema to `target`, in execution order
    ///
    /// With `suppress_destructive`, statements starting with `DROP` are left out.
    pub fn get_update_schema(
        &self,
        target: &Schema,
        suppress_destructive: bool,
    ) -> Result<Vec<String>> {
        let live = self
            .conn
            .introspect_schema()
            .map_err(|e| anyhow!("Failed to read live schema: {}", e))?;
        let diff = Comparator::compare_schemas(&live, target);

        let mut statements = self.conn.platform().alter_schema_sql(&diff);
        if suppress_destructive {
            let before = statements.len();
            statements.retain(|sql| !is_destructive(sql));
            tracing::debug!(
                suppressed = before - statements.len(),
                "suppressed destructive statements"
            );
        }
        Ok(statements)
    }

    /// Execute the statements from [`get_update_schema`](Self::get_update_schema)
    ///
    /// Statements run one after the other. The first failure stops the update
    /// and is returned as is; statements that already ran are not undone.
    ///
    /// Updates that rebuild tables run with foreign key enforcement switched
    /// off. They are refused inside a transaction, where enforcement cannot be
    /// switched. Enforcement is switched back on even after a failure, and
    /// remaining foreign key violations fail the update.
    pub fn update_schema(&self, target: &Schema, suppress_destructive: bool) -> Result<()> {
        let statements = self.get_update_schema(target, suppress_destructive)?;

        let toggle = self.conn.platform().foreign_key_toggle_sql();
        let enable = toggle
            .filter(|(disable, _)| statements.contains(disable))
            .map(|(_, enable)| enable);
        if enable.is_some() && self.conn.transaction_active() {
            return Err(anyhow!(
                "Cannot rebuild tables inside a transaction: foreign key enforcement cannot be switched off"
            ));
        }

        for sql in &statements {
            if let Err(e) = self.conn.execute_unchecked(sql) {
                if let Some(enable) = &enable {
                    if let Err(restore) = self.conn.execute_unchecked(enable) {
                        tracing::warn!(error = %restore, "failed to re-enable foreign keys");
                    }
                }
                return Err(e);
            }
        }

        if enable.is_some() {
            self.check_foreign_keys()?;
        }
        tracing::info!(count = statements.len(), "schema updated");
        Ok(())
    }

    fn check_foreign_keys(&self) -> Result<()> {
        let Some(sql) = self.conn.platform().foreign_key_check_sql() else {
            return Ok(());
        };
        let violations = self.conn.execute_query(&sql, &[], &ParamTypes::none())?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "Schema update left {} foreign key violation(s)",
                violations.len()
            ))
        }
    }
}

/// Whether the statement's leading keyword is `DROP`
fn is_destructive(sql: &str) -> bool {
    let sql = sql.trim_start();
    starts_with_keyword(sql, "drop")
        && sql[4..]
            .chars()
            .next()
            .map(char::is_whitespace)
            .unwrap_or(true)
}
