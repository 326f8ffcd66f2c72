//! Prepared-statement batches: the unit handed from a unit-of-work to the
//! transaction batcher.

use sqlx::sqlite::{Sqlite, SqliteArguments};

/// What a statement does, for observability and batcher accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Upsert => "upsert",
        }
    }
}

/// A bound parameter value.
///
/// Dates are carried as ISO-8601 UTC text, booleans as 0/1 integers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlParam {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn opt_text(value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => Self::Text(v.into()),
            None => Self::Null,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::Integer(value)
    }

    pub fn opt_integer(value: Option<i64>) -> Self {
        match value {
            Some(v) => Self::Integer(v),
            None => Self::Null,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// One prepared statement with `?` placeholders and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl BatchStatement {
    pub fn new(kind: StatementKind, sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params,
        }
    }
}

/// Bind a parameter list onto a sqlx query in order.
pub fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Integer(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_become_zero_or_one() {
        assert_eq!(SqlParam::boolean(true), SqlParam::Integer(1));
        assert_eq!(SqlParam::boolean(false), SqlParam::Integer(0));
    }

    #[test]
    fn optional_params_become_null() {
        assert_eq!(SqlParam::opt_text(None::<String>), SqlParam::Null);
        assert_eq!(SqlParam::opt_integer(None), SqlParam::Null);
        assert_eq!(
            SqlParam::opt_text(Some("x")),
            SqlParam::Text("x".to_string())
        );
    }
}
