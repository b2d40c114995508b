//! Parsing and resolution of dotted, bracket-indexed paths into an opaque JSON tree.
//!
//! A path such as `template.spec.replicatedJobs[0].template` is split on `.`; each segment
//! either names a map key (`foo`) or indexes into an array after a map lookup
//! (`foo[3]`). The first segment must always be the literal `template`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use snafu::{OptionExt, Snafu};

static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\[\]]+)(\[([0-9]+)\])?$").expect("valid regex"));

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PathError {
    #[snafu(display("path must not be empty"))]
    EmptyPath,

    #[snafu(display("path must start with the literal segment `template`, got {first:?}"))]
    MissingTemplatePrefix { first: String },

    #[snafu(display("malformed path segment {segment:?}"))]
    MalformedSegment { segment: String },

    #[snafu(display("key {key:?} not found while resolving path"))]
    MissingKey { key: String },

    #[snafu(display("index {index} out of range (length {len}) for key {key:?}"))]
    IndexOutOfRange { key: String, index: usize, len: usize },

    #[snafu(display("segment {segment:?} expected a {expected}, found a different shape"))]
    NotAContainer { segment: String, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index { key: String, index: usize },
}

/// Parses a dotted path into its segments, validating the `template` prefix and bracket syntax.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let raw_segments: Vec<&str> = path.split('.').collect();

    let first = raw_segments.first().copied().unwrap_or_default();
    if first != "template" {
        return Err(PathError::MissingTemplatePrefix {
            first: first.to_owned(),
        });
    }

    raw_segments
        .into_iter()
        .skip(1)
        .map(|segment| parse_segment(segment))
        .collect()
}

fn parse_segment(segment: &str) -> Result<PathSegment, PathError> {
    let captures = SEGMENT_PATTERN
        .captures(segment)
        .context(MalformedSegmentSnafu {
            segment: segment.to_owned(),
        })?;

    let key = captures[1].to_owned();

    match captures.get(3) {
        Some(index) => {
            let index: usize = index.as_str().parse().map_err(|_| PathError::MalformedSegment {
                segment: segment.to_owned(),
            })?;
            Ok(PathSegment::Index { key, index })
        }
        None => Ok(PathSegment::Key(key)),
    }
}

/// Resolves `path` (which must start with `template`) inside `tree`, returning a reference to
/// the addressed subtree.
pub fn resolve<'a>(tree: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    let segments = parse_path(path)?;
    let mut current = tree;

    for segment in &segments {
        current = descend(current, segment)?;
    }

    Ok(current)
}

/// Same as [`resolve`] but returns a mutable reference, used by the mutator.
pub fn resolve_mut<'a>(tree: &'a mut Value, path: &str) -> Result<&'a mut Value, PathError> {
    let segments = parse_path(path)?;
    let mut current = tree;

    for segment in &segments {
        current = descend_mut(current, segment)?;
    }

    Ok(current)
}

fn descend<'a>(node: &'a Value, segment: &PathSegment) -> Result<&'a Value, PathError> {
    match segment {
        PathSegment::Key(key) => node
            .as_object()
            .context(NotAContainerSnafu {
                segment: key.clone(),
                expected: "map",
            })?
            .get(key)
            .context(MissingKeySnafu { key: key.clone() }),
        PathSegment::Index { key, index } => {
            let array = node
                .as_object()
                .context(NotAContainerSnafu {
                    segment: key.clone(),
                    expected: "map",
                })?
                .get(key)
                .context(MissingKeySnafu { key: key.clone() })?
                .as_array()
                .context(NotAContainerSnafu {
                    segment: key.clone(),
                    expected: "array",
                })?;

            array.get(*index).context(IndexOutOfRangeSnafu {
                key: key.clone(),
                index: *index,
                len: array.len(),
            })
        }
    }
}

fn descend_mut<'a>(node: &'a mut Value, segment: &PathSegment) -> Result<&'a mut Value, PathError> {
    match segment {
        PathSegment::Key(key) => node
            .as_object_mut()
            .context(NotAContainerSnafu {
                segment: key.clone(),
                expected: "map",
            })?
            .get_mut(key)
            .context(MissingKeySnafu { key: key.clone() }),
        PathSegment::Index { key, index } => {
            let array = node
                .as_object_mut()
                .context(NotAContainerSnafu {
                    segment: key.clone(),
                    expected: "map",
                })?
                .get_mut(key)
                .context(MissingKeySnafu { key: key.clone() })?
                .as_array_mut()
                .context(NotAContainerSnafu {
                    segment: key.clone(),
                    expected: "array",
                })?;

            let len = array.len();
            array
                .get_mut(*index)
                .context(IndexOutOfRangeSnafu { key: key.clone(), index: *index, len })
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_plain_key_path() {
        let tree = json!({ "template": { "spec": { "foo": "bar" } } });
        let resolved = resolve(&tree, "template.spec.foo").unwrap();
        assert_eq!(resolved, &json!("bar"));
    }

    #[test]
    fn resolves_indexed_path() {
        let tree = json!({ "template": { "spec": { "jobs": [{ "name": "a" }, { "name": "b" }] } } });
        let resolved = resolve(&tree, "template.spec.jobs[1].name").unwrap();
        assert_eq!(resolved, &json!("b"));
    }

    #[rstest]
    #[case("spec.foo", PathError::MissingTemplatePrefix { first: "spec".to_owned() })]
    #[case("", PathError::EmptyPath)]
    fn rejects_missing_template_prefix(#[case] path: &str, #[case] expected: PathError) {
        assert_eq!(resolve(&json!({}), path).unwrap_err(), expected);
    }

    #[test]
    fn rejects_unbalanced_bracket() {
        let tree = json!({ "template": { "spec": { "foo": [1, 2] } } });
        assert!(resolve(&tree, "template.spec.foo[1").is_err());
    }

    #[test]
    fn rejects_negative_index() {
        let tree = json!({ "template": { "spec": { "foo": [1, 2] } } });
        assert!(resolve(&tree, "template.spec.foo[-1]").is_err());
    }

    #[test]
    fn rejects_out_of_range_index() {
        let tree = json!({ "template": { "spec": { "foo": [1, 2] } } });
        let err = resolve(&tree, "template.spec.foo[5]").unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfRange { .. }));
    }

    #[test]
    fn rejects_missing_key() {
        let tree = json!({ "template": {} });
        let err = resolve(&tree, "template.spec").unwrap_err();
        assert!(matches!(err, PathError::MissingKey { .. }));
    }
}
