//! Source-document citations pulled out of agent execution traces.
//!
//! The trace schema is not stable, so instead of following one fixed path the
//! walk checks every object for the field patterns citation URIs have been
//! seen under:
//!
//! 1. `location.s3Location.uri`
//! 2. `s3Uri`
//! 3. `uri`
//!
//! Anything that does not match is ignored. The walk never fails.

use serde_json::Value;
use std::collections::HashSet;

/// Unique citation URIs in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CitationSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `uri` unless it is empty or already present.
    pub fn insert(&mut self, uri: &str) -> bool {
        if uri.is_empty() || self.seen.contains(uri) {
            return false;
        }
        self.seen.insert(uri.to_string());
        self.ordered.push(uri.to_string());
        true
    }

    /// Walk `trace` depth-first and merge every URI found.
    pub fn extend_from_trace(&mut self, trace: &Value) {
        // Children go on the stack in reverse so they pop in document order.
        let mut stack = vec![trace];

        while let Some(node) = stack.pop() {
            match node {
                Value::Object(map) => {
                    let nested = map
                        .get("location")
                        .and_then(|location| location.get("s3Location"))
                        .and_then(|s3| s3.get("uri"));
                    for candidate in [nested, map.get("s3Uri"), map.get("uri")] {
                        if let Some(Value::String(uri)) = candidate {
                            self.insert(uri);
                        }
                    }
                    stack.extend(map.values().rev());
                }
                Value::Array(items) => stack.extend(items.iter().rev()),
                _ => {}
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ordered.len()
    }

    #[cfg(test)]
    fn as_slice(&self) -> &[String] {
        &self.ordered
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

/// Every citation URI in `trace`, deduplicated, in depth-first order.
pub fn collect(trace: &Value) -> Vec<String> {
    let mut citations = CitationSet::new();
    citations.extend_from_trace(trace);
    citations.into_vec()
}

/// Short display name for a citation: the last path segment.
///
/// `?` and `#` are legal in S3 object keys, so they stay part of the name.
pub fn citation_label(uri: &str) -> &str {
    match uri.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => uri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_the_documented_example() {
        let trace = json!({
            "location": {"s3Location": {"uri": "s3://bucket/policy.pdf"}},
            "children": [
                {"uri": "s3://bucket/policy.pdf"},
                {"s3Uri": "s3://bucket/sop.pdf"}
            ]
        });

        assert_eq!(
            collect(&trace),
            vec!["s3://bucket/policy.pdf", "s3://bucket/sop.pdf"]
        );
    }

    #[test]
    fn repeated_uri_is_returned_once() {
        let trace = json!({
            "a": {"uri": "s3://b/x.pdf"},
            "b": [{"uri": "s3://b/x.pdf"}, [{"s3Uri": "s3://b/x.pdf"}]],
            "c": {"location": {"s3Location": {"uri": "s3://b/x.pdf"}}}
        });
        assert_eq!(collect(&trace), vec!["s3://b/x.pdf"]);
    }

    #[test]
    fn order_follows_depth_first_key_order() {
        let trace = json!({
            "first": {"deeper": {"uri": "s3://b/a.pdf"}},
            "second": {"uri": "s3://b/b.pdf"},
            "uri": "s3://b/root.pdf"
        });

        // The node's own fields are checked before any of its children.
        assert_eq!(
            collect(&trace),
            vec!["s3://b/root.pdf", "s3://b/a.pdf", "s3://b/b.pdf"]
        );
    }

    #[test]
    fn nested_location_is_checked_before_flat_fields() {
        let trace = json!({
            "uri": "s3://b/flat.pdf",
            "s3Uri": "s3://b/s3uri.pdf",
            "location": {"s3Location": {"uri": "s3://b/nested.pdf"}}
        });

        assert_eq!(
            collect(&trace),
            vec!["s3://b/nested.pdf", "s3://b/s3uri.pdf", "s3://b/flat.pdf"]
        );
    }

    #[test]
    fn empty_and_unrecognized_inputs_yield_nothing() {
        for trace in [
            json!({}),
            json!([]),
            json!(null),
            json!("s3://b/not-a-field.pdf"),
            json!({"a": {"b": {"c": [1, 2, {"d": true}]}}}),
        ] {
            assert!(collect(&trace).is_empty(), "{trace}");
        }
    }

    #[test]
    fn malformed_fields_are_tolerated() {
        let trace = json!({
            "location": "not-an-object",
            "s3Uri": 42,
            "uri": "",
            "x": {"location": {"s3Location": ["wrong"]}},
            "y": {"location": {"s3Location": {"uri": null}}},
            "z": {"uri": "s3://b/ok.pdf"}
        });
        assert_eq!(collect(&trace), vec!["s3://b/ok.pdf"]);
    }

    #[test]
    fn survives_very_deep_nesting() {
        let mut trace = json!({"uri": "s3://b/deep.pdf"});
        for _ in 0..100_000 {
            trace = Value::Array(vec![trace]);
        }
        assert_eq!(collect(&trace), vec!["s3://b/deep.pdf"]);
        // Tear down iteratively too; the recursive Drop would overflow.
        let mut current = trace;
        while let Value::Array(mut items) = current {
            current = items.pop().unwrap_or(Value::Null);
        }
    }

    #[test]
    fn set_spans_multiple_traces() {
        let mut set = CitationSet::new();
        set.extend_from_trace(&json!({"uri": "s3://b/a.pdf"}));
        set.extend_from_trace(&json!([{"uri": "s3://b/b.pdf"}, {"uri": "s3://b/a.pdf"}]));

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice(), ["s3://b/a.pdf", "s3://b/b.pdf"]);
        assert!(!set.insert("s3://b/b.pdf"));
        assert!(!set.insert(""));
    }

    #[test]
    fn labels_use_the_file_name() {
        assert_eq!(citation_label("s3://bucket/docs/policy.pdf"), "policy.pdf");
        assert_eq!(citation_label("s3://bucket/dir/"), "s3://bucket/dir/");
        assert_eq!(citation_label("plain"), "plain");
    }

    #[test]
    fn labels_keep_question_marks_and_hashes_from_object_keys() {
        assert_eq!(citation_label("s3://bucket/audit/report#2.pdf"), "report#2.pdf");
        assert_eq!(
            citation_label("s3://bucket/faq/what-is-this?.pdf"),
            "what-is-this?.pdf"
        );
        assert_eq!(
            citation_label("https://host/a/sop.pdf?version=2"),
            "sop.pdf?version=2"
        );
    }
}
