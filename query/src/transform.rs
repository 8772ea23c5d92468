//! Maps a [`Kql`] parse tree onto the backend [`Query`] tree.
//!
//! Each parse node variant has exactly one handler; value lists are expanded
//! here, not in the parser, by re-applying the field to every listed value.

use crate::{
    dsl::Query,
    lexer::{Kql, Node, ValueList},
};

/// Consume a parse tree, producing the equivalent query
pub fn transform(kql: Kql) -> Query {
    transform_node(kql.root)
}

fn transform_node(node: Node) -> Query {
    match node {
        Node::And(children) => Query::all_of(children.into_iter().map(transform_node).collect()),
        Node::Or(children) => Query::any_of(children.into_iter().map(transform_node).collect()),
        Node::Not(operand) => transform_node(*operand).not(),
        Node::FieldValue { field, value } => field_value(&field, value),
        Node::FieldRange { field, op, value } => Query::range(field, op, value),
        Node::Value(field) => Query::exists(field),
        Node::Nested { field, query } => Query::nested(field, transform_node(*query)),
    }
}

/// `field:value`, where `value` may be a list joined with `and`/`or`/`not`.
///
/// A `not` list only ever holds one operand, so the negation applies to the
/// last (and only) value it wraps: `tag:(a and not b)` negates `b` alone.
fn field_value(field: &str, value: ValueList) -> Query {
    let expand = |values: Vec<ValueList>| -> Vec<Query> {
        values
            .into_iter()
            .map(|value| field_value(field, value))
            .collect()
    };
    match value {
        ValueList::Wildcard => Query::exists(field),
        ValueList::Literal(text) => Query::Match {
            field: field.to_string(),
            text,
        },
        ValueList::Or(values) => Query::any_of(expand(values)),
        ValueList::And(values) => Query::all_of(expand(values)),
        ValueList::Not(operand) => field_value(field, *operand).not(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parser::KqlParser;
    use serde_json::{json, Value};

    fn translate(query: &str) -> Value {
        transform(KqlParser::new().parse(query).unwrap()).to_json()
    }

    #[test]
    fn test_exists() {
        assert_eq!(translate("foo"), json!({"exists": {"field": "foo"}}));
        assert_eq!(translate("foo:*"), translate("foo"));
    }

    #[test]
    fn test_quoted_star_is_a_match() {
        assert_eq!(translate(r#"foo:"*""#), json!({"match": {"foo": "*"}}));
    }

    #[test]
    fn test_match() {
        assert_eq!(translate("foo:bar"), json!({"match": {"foo": "bar"}}));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(translate("a<1"), json!({"range": {"a": {"lt": "1"}}}));
        assert_eq!(translate("a<=1"), json!({"range": {"a": {"lte": "1"}}}));
        assert_eq!(translate("a>1"), json!({"range": {"a": {"gt": "1"}}}));
        assert_eq!(translate("a>=1"), json!({"range": {"a": {"gte": "1"}}}));
    }

    #[test]
    fn test_mixed_query() {
        assert_eq!(
            translate(" foo:bar and not (qux>=mux or abc:def) and foo"),
            json!({"bool": {"filter": [
                {"match": {"foo": "bar"}},
                {"bool": {"must_not": [{"bool": {
                    "should": [{"range": {"qux": {"gte": "mux"}}}, {"match": {"abc": "def"}}],
                    "minimum_should_match": 1
                }}]}},
                {"exists": {"field": "foo"}}
            ]}})
        );
    }

    #[test]
    fn test_value_lists() {
        assert_eq!(
            translate("level:(error or warn)"),
            json!({"bool": {
                "should": [{"match": {"level": "error"}}, {"match": {"level": "warn"}}],
                "minimum_should_match": 1
            }})
        );
        assert_eq!(
            translate("tag:(a and b)"),
            json!({"bool": {"filter": [{"match": {"tag": "a"}}, {"match": {"tag": "b"}}]}})
        );
        assert_eq!(
            translate("tag:(not a)"),
            json!({"bool": {"must_not": [{"match": {"tag": "a"}}]}})
        );
    }

    // Boundary case: `not` inside a list negates only the operand that follows it.
    #[test]
    fn test_not_in_value_list_negates_last_operand_only() {
        assert_eq!(
            translate("tag:(a and not b)"),
            json!({"bool": {"filter": [
                {"match": {"tag": "a"}},
                {"bool": {"must_not": [{"match": {"tag": "b"}}]}}
            ]}})
        );
    }

    #[test]
    fn test_value_list_with_wildcard() {
        assert_eq!(
            translate("tag:(* or a)"),
            json!({"bool": {
                "should": [{"exists": {"field": "tag"}}, {"match": {"tag": "a"}}],
                "minimum_should_match": 1
            }})
        );
    }
}
