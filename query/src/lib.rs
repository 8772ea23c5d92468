//! Translates human friendly log queries into the search engine's query DSL.
//!
//! Two surfaces are supported:
//! - KQL, the primary one: `level:error and not service:(auth or billing)`
//! - specifiers, the legacy flat syntax: `level=error` `http.status>499`
//!
//! Both end up as a [`Query`] combined with a [`TimeRange`] filter.
//!
//! ```
//! use elastic_log_query::{translate_kql, KqlParser, TimeRange};
//!
//! let parser = KqlParser::new();
//! let start = chrono::NaiveDate::from_ymd_opt(2022, 2, 27)
//!     .unwrap()
//!     .and_hms_opt(12, 0, 0)
//!     .unwrap();
//! let range = TimeRange::new("@timestamp", start, None);
//! let query = translate_kql(&parser, "items:{ name:banana }", &range).unwrap();
//! assert_eq!(
//!     query.to_json()["bool"]["filter"][1]["nested"]["query"],
//!     serde_json::json!({"match": {"items.name": "banana"}})
//! );
//! ```

pub use crate::assemble::{assemble, format_timestamp, Clause, TimeRange};
pub use crate::dsl::{BoolQuery, Query};
pub use crate::lexer::{parser::KqlParser, Kql, Node, QueryError, RangeOp, ValueList};
pub use crate::specifier::{parse_specifier, Specifier, SpecifierOp};
pub use crate::transform::transform;

pub mod assemble;
pub mod dsl;
pub mod lexer;
pub mod specifier;
pub mod transform;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Parse and transform a KQL query, without any time filter
pub fn parse_kql(parser: &KqlParser, query: &str) -> Result<Query> {
    Ok(transform(parser.parse(query)?))
}

/// Translate a KQL query into the final query, filtered to `range`
pub fn translate_kql(parser: &KqlParser, query: &str, range: &TimeRange) -> Result<Query> {
    let query = parse_kql(parser, query)?;
    Ok(assemble(range, [query], Clause::Filter))
}

/// Translate specifiers into the final query; all of them, and `range`, must match
pub fn translate_specifiers<S: AsRef<str>>(specifiers: &[S], range: &TimeRange) -> Result<Query> {
    let queries = specifiers
        .iter()
        .map(|specifier| parse_specifier(specifier.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(assemble(range, queries, Clause::Must))
}
