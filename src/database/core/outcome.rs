//! Results of gated connection operations

use anyhow::Error;

use crate::database::driver::{NativeError, ResultSet};

/// Result of a gated write
#[derive(Debug)]
pub enum WriteOutcome {
    /// The statement ran and changed this many rows
    Written(u64),
    /// Neither `safe` nor `force` allowed the write; the driver was not called
    Denied,
    /// The driver reported an error, which was also published as an event
    Failed(Error),
}

impl WriteOutcome {
    /// Affected rows, with denied and failed writes reported as zero
    pub fn rows_affected(&self) -> u64 {
        match self {
            WriteOutcome::Written(n) => *n,
            WriteOutcome::Denied | WriteOutcome::Failed(_) => 0,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, WriteOutcome::Denied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed(_))
    }
}

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(ResultSet),
    Affected(u64),
}

impl QueryResult {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Affected(_) => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            QueryResult::Rows(_) => None,
            QueryResult::Affected(n) => Some(*n),
        }
    }
}

/// Result of [`Connection::query`](super::Connection::query)
#[derive(Debug)]
pub enum QueryOutcome {
    Rows(ResultSet),
    Affected(u64),
    Denied,
    Failed(Error),
}

impl QueryOutcome {
    /// Collapse into the legacy shape
    ///
    /// Denied and failed statements as well as writes that changed nothing
    /// all become `None`.
    pub fn into_legacy(self) -> Option<QueryResult> {
        match self {
            QueryOutcome::Rows(rows) => Some(QueryResult::Rows(rows)),
            QueryOutcome::Affected(0) => None,
            QueryOutcome::Affected(n) => Some(QueryResult::Affected(n)),
            QueryOutcome::Denied | QueryOutcome::Failed(_) => None,
        }
    }

    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            QueryOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, QueryOutcome::Denied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed(_))
    }
}

/// Last native error in the conventional three-part shape
///
/// All fields are empty when no error is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub driver_code: Option<i64>,
    pub message: String,
}

impl ErrorInfo {
    pub fn is_empty(&self) -> bool {
        self.sqlstate.is_empty() && self.driver_code.is_none() && self.message.is_empty()
    }
}

impl From<NativeError> for ErrorInfo {
    fn from(err: NativeError) -> Self {
        Self {
            sqlstate: err.sqlstate,
            driver_code: err.driver_code,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_write_outcome_sentinel() {
        assert_eq!(WriteOutcome::Written(3).rows_affected(), 3);
        assert_eq!(WriteOutcome::Denied.rows_affected(), 0);
        assert_eq!(WriteOutcome::Failed(anyhow!("boom")).rows_affected(), 0);
    }

    #[test]
    fn test_query_outcome_legacy() {
        assert!(QueryOutcome::Denied.into_legacy().is_none());
        assert!(QueryOutcome::Failed(anyhow!("boom")).into_legacy().is_none());
        assert!(QueryOutcome::Affected(0).into_legacy().is_none());
        assert_eq!(
            QueryOutcome::Affected(2).into_legacy(),
            Some(QueryResult::Affected(2))
        );
        assert!(matches!(
            QueryOutcome::Rows(ResultSet::default()).into_legacy(),
            Some(QueryResult::Rows(_))
        ));
    }
}
