//! Typed read-model repositories, one per aggregate view.
//!
//! Writes are staged upserts keyed on `aggregate_id`; the projection router
//! drives them inside the same logical transaction as the events they
//! mirror. Reads are the query path's only data source.

pub mod collections;
pub mod products;
pub mod schedules;
pub mod variants;

use core::str::FromStr;

use merchkit_core::AggregateStatus;

use crate::batch::SqlParam;
use crate::error::CoreError;

/// Append an optional fixed-column status filter.
pub(crate) fn push_status_filter(
    sql: &mut String,
    params: &mut Vec<SqlParam>,
    status: Option<AggregateStatus>,
) {
    if let Some(status) = status {
        sql.push_str(" AND status = ?");
        params.push(SqlParam::text(status.as_str()));
    }
}

/// Append LIMIT/OFFSET. Offset without limit uses the `-1` sentinel
/// (limit all, offset N).
pub(crate) fn push_paging(
    sql: &mut String,
    params: &mut Vec<SqlParam>,
    limit: Option<i64>,
    offset: Option<i64>,
) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlParam::integer(limit));
            params.push(SqlParam::integer(offset));
        }
        (Some(limit), None) => {
            sql.push_str(" LIMIT ?");
            params.push(SqlParam::integer(limit));
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(SqlParam::integer(offset));
        }
        (None, None) => {}
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<AggregateStatus, CoreError> {
    AggregateStatus::from_str(raw)
        .map_err(|e| CoreError::storage(format!("corrupt status column: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_without_limit_uses_the_sentinel() {
        let mut sql = String::from("SELECT * FROM t WHERE 1=1");
        let mut params = Vec::new();
        push_paging(&mut sql, &mut params, None, Some(20));
        assert!(sql.ends_with(" LIMIT -1 OFFSET ?"));
        assert_eq!(params, vec![SqlParam::Integer(20)]);
    }

    #[test]
    fn limit_and_offset_bind_in_order() {
        let mut sql = String::from("SELECT * FROM t WHERE 1=1");
        let mut params = Vec::new();
        push_paging(&mut sql, &mut params, Some(10), Some(20));
        assert!(sql.ends_with(" LIMIT ? OFFSET ?"));
        assert_eq!(params, vec![SqlParam::Integer(10), SqlParam::Integer(20)]);
    }

    #[test]
    fn status_filter_uses_placeholder_for_the_value() {
        let mut sql = String::from("SELECT * FROM t WHERE 1=1");
        let mut params = Vec::new();
        push_status_filter(&mut sql, &mut params, Some(AggregateStatus::Active));
        assert!(sql.ends_with(" AND status = ?"));
        assert_eq!(params, vec![SqlParam::Text("active".to_string())]);
    }
}
