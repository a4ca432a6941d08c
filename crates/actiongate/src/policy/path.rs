//! Dotted-path access into JSON values.
//!
//! Session conditions, object templates and session references all address
//! nested fields with `.`-delimited paths such as `user.role.name`. Paths are
//! parsed once into a [`FieldPath`] and resolved against
//! [`serde_json::Value`] trees without allocating.

use std::fmt;

use serde_json::Value;

/// A parsed `.`-delimited field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path.
    ///
    /// Every segment is kept verbatim, including empty ones, so a path with an
    /// empty segment can only resolve against a key that is literally empty.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw.split('.').map(str::to_string).collect(),
        }
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The individual path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the first segment and the remaining path, if any.
    #[must_use]
    pub fn split_first(&self) -> Option<(&str, &[String])> {
        self.segments
            .split_first()
            .map(|(head, rest)| (head.as_str(), rest))
    }

    /// Resolve this path against a JSON value.
    ///
    /// Returns `None` when any intermediate value is missing or is not an
    /// object. Array elements are addressed by decimal index segments.
    #[must_use]
    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        resolve_segments(root, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve a sequence of segments against a JSON value.
#[must_use]
pub fn resolve_segments<'v, S: AsRef<str>>(root: &'v Value, segments: &[S]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| step(current, segment.as_ref()))
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = FieldPath::parse("user.role.name");
        assert_eq!(path.segments(), &["user", "role", "name"]);
        assert_eq!(path.as_str(), "user.role.name");
        assert_eq!(path.to_string(), "user.role.name");
    }

    #[test]
    fn test_resolve_nested() {
        let value = json!({"user": {"role": {"name": "admin"}}});
        let path = FieldPath::parse("user.role.name");
        assert_eq!(path.resolve(&value), Some(&json!("admin")));
    }

    #[test]
    fn test_resolve_missing_intermediate() {
        let value = json!({"user": null});
        assert_eq!(FieldPath::parse("user.role.name").resolve(&value), None);
        assert_eq!(FieldPath::parse("account.id").resolve(&value), None);
    }

    #[test]
    fn test_resolve_through_scalar_is_none() {
        let value = json!({"user": "vova"});
        assert_eq!(FieldPath::parse("user.name").resolve(&value), None);
    }

    #[test]
    fn test_resolve_array_index() {
        let value = json!({"groups": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(
            FieldPath::parse("groups.1.id").resolve(&value),
            Some(&json!("b"))
        );
        assert_eq!(FieldPath::parse("groups.7.id").resolve(&value), None);
        assert_eq!(FieldPath::parse("groups.x.id").resolve(&value), None);
    }

    #[test]
    fn test_resolve_non_object_root() {
        assert_eq!(FieldPath::parse("a").resolve(&json!(42)), None);
        assert_eq!(FieldPath::parse("a").resolve(&Value::Null), None);
    }

    #[test]
    fn test_split_first() {
        let path = FieldPath::parse("session.user.name");
        let (head, rest) = path.split_first().unwrap();
        assert_eq!(head, "session");
        assert_eq!(rest, &["user".to_string(), "name".to_string()]);
    }
}
