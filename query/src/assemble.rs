use chrono::NaiveDateTime;

use crate::{dsl::Query, lexer::RangeOp};

/// The time window logs are streamed from, supplied per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub timestamp_field: String,
    pub start: NaiveDateTime,
    /// `None` streams everything after `start`
    pub end: Option<NaiveDateTime>,
}

/// Which `bool` clause the assembled queries are placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// Used for KQL queries
    Filter,
    /// Used for specifiers
    Must,
}

/// ISO-8601 without an offset, fractional seconds only when present
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

impl TimeRange {
    pub fn new<S: Into<String>>(
        timestamp_field: S,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            start,
            end,
        }
    }

    /// `{"range": {field: {"gte": start, "lte": end}}}`, without `lte` for open ranges
    pub fn to_query(&self) -> Query {
        let mut bounds = vec![(RangeOp::Gte, format_timestamp(&self.start))];
        if let Some(end) = &self.end {
            bounds.push((RangeOp::Lte, format_timestamp(end)));
        }
        Query::Range {
            field: self.timestamp_field.clone(),
            bounds,
        }
    }
}

/// Prepend the time filter to `queries`, combining them in a single `bool` clause
pub fn assemble<I>(range: &TimeRange, queries: I, clause: Clause) -> Query
where
    I: IntoIterator<Item = Query>,
{
    let all: Vec<Query> = std::iter::once(range.to_query()).chain(queries).collect();
    match clause {
        Clause::Filter => Query::all_of(all),
        Clause::Must => Query::must(all),
    }
}
