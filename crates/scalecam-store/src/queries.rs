//! Query builder for measurement ranges.
//!
//! [`MeasurementQuery`] is shared by the provider endpoint, CSV export and
//! analysis so all of them apply the same bounds: the lower bound is
//! exclusive (it is a replication cursor), the upper bound inclusive.
//!
//! # Example
//!
//! ```
//! use scalecam_store::{MeasurementQuery, Store};
//! use scalecam_types::Timestamp;
//!
//! let store = Store::open_in_memory("measurements")?;
//!
//! let query = MeasurementQuery::new()
//!     .after(Timestamp::from_micros(1_000))
//!     .limit(500);
//! let rows = store.query(&query)?;
//! assert!(rows.is_empty());
//! # Ok::<(), scalecam_store::Error>(())
//! ```

use scalecam_types::Timestamp;

/// Rows returned by [`Store::range`](crate::Store::range) when no limit is given.
pub const DEFAULT_RANGE_LIMIT: u32 = 10_000;

/// Fluent query builder for measurements.
///
/// Results are ordered by `ts` ascending unless [`newest_first`](Self::newest_first)
/// is set. No limit means all matching rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeasurementQuery {
    /// Only rows with `ts` strictly greater than this.
    pub after: Option<Timestamp>,
    /// Only rows with `ts` at or before this.
    pub until: Option<Timestamp>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by ts descending.
    pub newest_first: bool,
}

impl MeasurementQuery {
    /// Create an unbounded, oldest-first query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only rows strictly newer than `ts`.
    pub fn after(mut self, ts: Timestamp) -> Self {
        self.after = Some(ts);
        self
    }

    /// Only rows at or before `ts`.
    pub fn until(mut self, ts: Timestamp) -> Self {
        self.until = Some(ts);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(after) = self.after {
            conditions.push("ts > ?");
            params.push(Box::new(after.as_micros()));
        }

        if let Some(until) = self.until {
            conditions.push("ts <= ?");
            params.push(Box::new(until.as_micros()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query against `table` (already validated).
    pub(crate) fn build_sql(&self, table: &str) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        // id breaks ties between rows sharing a timestamp
        let mut sql = format!(
            "SELECT id, ts, raw, config_id FROM \"{}\" {} ORDER BY ts {}, id {}",
            table, where_clause, order, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        } else if self.offset.is_some() {
            sql.push_str(" LIMIT -1");
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}
