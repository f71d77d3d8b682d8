//! SQL dump files: statement splitting and table prefixing

use anyhow::{anyhow, Result};
use regex::Regex;

/// Split a dump into individual statements
///
/// Statements end at a `;` outside of quotes. `#` and `-- ` line comments and
/// `/* */` block comments are removed. Returned statements are trimmed and
/// never empty.
pub fn split_sql_dump(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                // doubled quote stays inside the literal
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            ';' => push_statement(&mut statements, &mut current),
            '#' => skip_line(&mut chars),
            '-' if chars.peek() == Some(&'-') => {
                let mut lookahead = chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    None | Some(' ') | Some('\t') | Some('\n') | Some('\r') => skip_line(&mut chars),
                    _ => current.push(c),
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
                current.push(' ');
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

/// Rewrites the table name of dump statements to its prefixed form
///
/// Handles `INSERT INTO`, `CREATE TABLE [IF NOT EXISTS]`, `ALTER TABLE`,
/// `UPDATE` and `DROP TABLE [IF EXISTS]`. Anything else is not a dump
/// statement and is rejected with `None`.
pub struct StatementPrefixer {
    prefix: String,
    statement: Regex,
    drop_table: Regex,
}

impl StatementPrefixer {
    pub fn new(prefix: &str) -> Result<Self> {
        let statement = Regex::new(
            r"(?is)^(INSERT\s+INTO|CREATE\s+TABLE(?:\s+IF\s+NOT\s+EXISTS)?|ALTER\s+TABLE|UPDATE)\s+(?:`([^`]+)`|([^`\s(]+))(\s*\(|\s+)(.*)$",
        )
        .map_err(|e| anyhow!("Failed to create regex: {}", e))?;
        let drop_table = Regex::new(
            r"(?is)^(DROP\s+TABLE(?:\s+IF\s+EXISTS)?)\s+(?:`([^`]+)`|([^`\s]+))\s*$",
        )
        .map_err(|e| anyhow!("Failed to create regex: {}", e))?;

        Ok(Self {
            prefix: prefix.to_string(),
            statement,
            drop_table,
        })
    }

    /// Prefixed statement, or `None` if the statement is not one of the dump forms
    pub fn prefix_statement(&self, sql: &str) -> Option<String> {
        let sql = sql.trim();

        if let Some(caps) = self.statement.captures(sql) {
            let (table, quoted) = table_name(&caps)?;
            return Some(format!(
                "{} {}{}{}",
                normalize_keyword(&caps[1]),
                self.prefixed(table, quoted),
                &caps[4],
                &caps[5]
            ));
        }

        if let Some(caps) = self.drop_table.captures(sql) {
            let (table, quoted) = table_name(&caps)?;
            return Some(format!(
                "{} {}",
                normalize_keyword(&caps[1]),
                self.prefixed(table, quoted)
            ));
        }

        None
    }

    fn prefixed(&self, table: &str, quoted: bool) -> String {
        if quoted {
            format!("`{}_{}`", self.prefix, table)
        } else {
            format!("{}_{}", self.prefix, table)
        }
    }
}

fn table_name<'h>(caps: &regex::Captures<'h>) -> Option<(&'h str, bool)> {
    caps.get(2)
        .map(|m| (m.as_str(), true))
        .or_else(|| caps.get(3).map(|m| (m.as_str(), false)))
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.split_whitespace().collect::<Vec<_>>().join(" ")
}
