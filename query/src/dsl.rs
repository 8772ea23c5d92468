use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::lexer::RangeOp;

/// Backend query tree, serialized into the search engine's query DSL.
///
/// Every variant maps to exactly one root key, except [`Query::Bool`] which
/// composes other queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// `{"exists": {"field": field}}`
    Exists { field: String },
    /// `{"match": {field: text}}`
    Match { field: String, text: String },
    /// `{"match": {field: {"query": query}}}`
    MatchQuery { field: String, query: String },
    /// `{"match_phrase_prefix": {field: {"query": query}}}`
    MatchPhrasePrefix { field: String, query: String },
    /// `{"term": {field: {"value": value}}}`
    Term { field: String, value: String },
    /// `{"range": {field: {op: value, ...}}}`, bounds keep their order
    Range {
        field: String,
        bounds: Vec<(RangeOp, String)>,
    },
    /// `{"nested": {"path": path, "query": query, "score_mode": "none"}}`
    Nested { path: String, query: Box<Query> },
    Bool(BoolQuery),
}

/// The clauses of a `bool` query, empty clauses are left out when serialized
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Query>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Query>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    fn map(self, f: &impl Fn(Query) -> Query) -> Self {
        let map_all = |queries: Vec<Query>| -> Vec<Query> { queries.into_iter().map(f).collect() };
        BoolQuery {
            must: map_all(self.must),
            filter: map_all(self.filter),
            should: map_all(self.should),
            must_not: map_all(self.must_not),
            minimum_should_match: self.minimum_should_match,
        }
    }
}

impl Query {
    pub fn exists<S: Into<String>>(field: S) -> Self {
        Query::Exists {
            field: field.into(),
        }
    }

    pub fn range<S: Into<String>, V: Into<String>>(field: S, op: RangeOp, value: V) -> Self {
        Query::Range {
            field: field.into(),
            bounds: vec![(op, value.into())],
        }
    }

    /// Every query must match, without scoring (`bool.filter`)
    pub fn all_of(queries: Vec<Query>) -> Self {
        Query::Bool(BoolQuery {
            filter: queries,
            ..Default::default()
        })
    }

    /// At least one query must match (`bool.should`)
    pub fn any_of(queries: Vec<Query>) -> Self {
        Query::Bool(BoolQuery {
            should: queries,
            minimum_should_match: Some(1),
            ..Default::default()
        })
    }

    /// Every query must match, with scoring (`bool.must`)
    pub fn must(queries: Vec<Query>) -> Self {
        Query::Bool(BoolQuery {
            must: queries,
            ..Default::default()
        })
    }

    /// Negate a single query
    pub fn not(self) -> Self {
        Query::Bool(BoolQuery {
            must_not: vec![self],
            ..Default::default()
        })
    }

    /// Scope `query` to the objects of the array field `path`.
    ///
    /// `query` refers to fields relative to `path`; they are made absolute here.
    pub fn nested<S: Into<String>>(path: S, query: Query) -> Self {
        let path = path.into();
        let query = query.with_field_prefix(&path);
        Query::Nested {
            path,
            query: Box::new(query),
        }
    }

    /// Returns a copy of the tree with `prefix.` prepended to every field
    /// reference and every nested path.
    pub fn with_field_prefix(self, prefix: &str) -> Self {
        let prefixed = |field: String| format!("{}.{}", prefix, field);
        match self {
            Query::Exists { field } => Query::Exists {
                field: prefixed(field),
            },
            Query::Match { field, text } => Query::Match {
                field: prefixed(field),
                text,
            },
            Query::MatchQuery { field, query } => Query::MatchQuery {
                field: prefixed(field),
                query,
            },
            Query::MatchPhrasePrefix { field, query } => Query::MatchPhrasePrefix {
                field: prefixed(field),
                query,
            },
            Query::Term { field, value } => Query::Term {
                field: prefixed(field),
                value,
            },
            Query::Range { field, bounds } => Query::Range {
                field: prefixed(field),
                bounds,
            },
            Query::Nested { path, query } => Query::Nested {
                path: prefixed(path),
                query: Box::new(query.with_field_prefix(prefix)),
            },
            Query::Bool(bool_query) => {
                Query::Bool(bool_query.map(&|query: Query| query.with_field_prefix(prefix)))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A map with a single entry
struct Single<'a, V: ?Sized>(&'a str, &'a V);

impl<V: Serialize + ?Sized> Serialize for Single<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

struct Bounds<'a>(&'a [(RangeOp, String)]);

impl Serialize for Bounds<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (op, value) in self.0 {
            map.serialize_entry(op.as_str(), value)?;
        }
        map.end()
    }
}

#[derive(serde::Serialize)]
struct NestedBody<'a> {
    path: &'a str,
    query: &'a Query,
    score_mode: &'static str,
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Query::Exists { field } => map.serialize_entry("exists", &Single("field", field))?,
            Query::Match { field, text } => map.serialize_entry("match", &Single(field, text))?,
            Query::MatchQuery { field, query } => {
                map.serialize_entry("match", &Single(field, &Single("query", query)))?
            }
            Query::MatchPhrasePrefix { field, query } => map.serialize_entry(
                "match_phrase_prefix",
                &Single(field, &Single("query", query)),
            )?,
            Query::Term { field, value } => {
                map.serialize_entry("term", &Single(field, &Single("value", value)))?
            }
            Query::Range { field, bounds } => {
                map.serialize_entry("range", &Single(field, &Bounds(bounds)))?
            }
            Query::Nested { path, query } => map.serialize_entry(
                "nested",
                &NestedBody {
                    path,
                    query,
                    score_mode: "none",
                },
            )?,
            Query::Bool(bool_query) => map.serialize_entry("bool", bool_query)?,
        }
        map.end()
    }
}
