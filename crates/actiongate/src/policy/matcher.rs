//! Structural matching of sessions and objects against policy templates.
//!
//! Both predicates use partial-match semantics: every clause of the template
//! must resolve in the subject and be deep-equal to the expected value;
//! fields of the subject not named by the template are ignored.
//!
//! # Usage
//!
//! ```ignore
//! use actiongate::policy::matcher::SessionMatcher;
//!
//! let matcher = SessionMatcher::new();
//! if matcher.matches(&entry.session, &session) {
//!     // Entry applies to this session
//! }
//! ```

use serde_json::Value;

use crate::policy::entry::{ObjectTemplate, SessionCondition};
use crate::policy::session::Session;

/// Partial-match predicate over sessions and target objects.
///
/// Stateless and cheap to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionMatcher;

impl SessionMatcher {
    /// Create a new matcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check whether a session satisfies a policy's session condition.
    ///
    /// An empty condition matches every well-formed session. A session that
    /// is not a JSON object matches nothing. A missing path never matches,
    /// not even an expected `null`.
    #[must_use]
    pub fn matches(&self, condition: &SessionCondition, session: &Session) -> bool {
        session.is_well_formed()
            && condition
                .clauses()
                .iter()
                .all(|(path, expected)| session.get(path) == Some(expected))
    }

    /// Check whether a target object satisfies an object template.
    ///
    /// Template values are compared as declared: session references are not
    /// substituted here, so a `"$session.…"` field only matches an object
    /// holding that literal string.
    #[must_use]
    pub fn matches_object(&self, template: &ObjectTemplate, object: &Value) -> bool {
        template
            .fields()
            .iter()
            .all(|field| field.path.resolve(object) == Some(&field.value.as_declared()))
    }

    /// Check whether an object satisfies at least one template.
    #[must_use]
    pub fn matches_any_object(&self, templates: &[ObjectTemplate], object: &Value) -> bool {
        templates.iter().any(|t| self.matches_object(t, object))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admin_condition() -> SessionCondition {
        SessionCondition::from_pairs([("user.role.name", json!("admin"))])
    }

    // -------------------------------------------------------------------------
    // Session Matching
    // -------------------------------------------------------------------------

    #[test]
    fn test_empty_condition_matches_everything() {
        let matcher = SessionMatcher::new();
        let any = SessionCondition::any();
        assert!(matcher.matches(&any, &Session::anonymous()));
        assert!(matcher.matches(&any, &Session::new(json!({"user": {"id": 1}}))));
    }

    #[test]
    fn test_nested_path_match() {
        let matcher = SessionMatcher::new();
        let session = Session::new(json!({"user": {"role": {"name": "admin"}, "id": 7}}));
        assert!(matcher.matches(&admin_condition(), &session));
    }

    #[test]
    fn test_value_mismatch() {
        let matcher = SessionMatcher::new();
        let session = Session::new(json!({"user": {"role": {"name": "editor"}}}));
        assert!(!matcher.matches(&admin_condition(), &session));
    }

    #[test]
    fn test_missing_path_never_matches() {
        let matcher = SessionMatcher::new();
        assert!(!matcher.matches(&admin_condition(), &Session::anonymous()));
        assert!(!matcher.matches(
            &admin_condition(),
            &Session::new(json!({"user": {"name": "guest"}}))
        ));

        let expects_null = SessionCondition::from_pairs([("user.deleted", json!(null))]);
        assert!(!matcher.matches(&expects_null, &Session::new(json!({"user": {}}))));
        assert!(matcher.matches(
            &expects_null,
            &Session::new(json!({"user": {"deleted": null}}))
        ));
    }

    #[test]
    fn test_all_clauses_required() {
        let matcher = SessionMatcher::new();
        let condition = SessionCondition::from_pairs([
            ("user.role.name", json!("admin")),
            ("tenant", json!("acme")),
        ]);
        let partial = Session::new(json!({"user": {"role": {"name": "admin"}}}));
        let full = Session::new(json!({"user": {"role": {"name": "admin"}}, "tenant": "acme"}));
        assert!(!matcher.matches(&condition, &partial));
        assert!(matcher.matches(&condition, &full));
    }

    #[test]
    fn test_deep_equality_on_structured_values() {
        let matcher = SessionMatcher::new();
        let condition = SessionCondition::from_pairs([("user.groups", json!(["a", "b"]))]);
        assert!(matcher.matches(
            &condition,
            &Session::new(json!({"user": {"groups": ["a", "b"]}}))
        ));
        assert!(!matcher.matches(
            &condition,
            &Session::new(json!({"user": {"groups": ["b", "a"]}}))
        ));
    }

    #[test]
    fn test_malformed_session_matches_nothing() {
        let matcher = SessionMatcher::new();
        for value in [json!([1, 2, 3]), json!(null), json!("garbage"), json!(42)] {
            let session = Session::new(value);
            assert!(!matcher.matches(&admin_condition(), &session));
            assert!(!matcher.matches(&SessionCondition::any(), &session));
        }
    }

    // -------------------------------------------------------------------------
    // Object Matching
    // -------------------------------------------------------------------------

    #[test]
    fn test_object_literal_match() {
        let matcher = SessionMatcher::new();
        let template = ObjectTemplate::from_pairs([("_key", json!("test123"))]);
        assert!(matcher.matches_object(&template, &json!({"_key": "test123", "title": "x"})));
        assert!(!matcher.matches_object(&template, &json!({"_key": "xyz"})));
        assert!(!matcher.matches_object(&template, &json!({})));
    }

    #[test]
    fn test_object_nested_path() {
        let matcher = SessionMatcher::new();
        let template = ObjectTemplate::from_pairs([("author.name", json!("Vova"))]);
        assert!(matcher.matches_object(&template, &json!({"author": {"name": "Vova"}})));
    }

    #[test]
    fn test_object_session_ref_compared_as_declared() {
        let matcher = SessionMatcher::new();
        let template = ObjectTemplate::from_pairs([("author.name", json!("$session.user.name"))]);
        assert!(!matcher.matches_object(&template, &json!({"author": {"name": "Vova"}})));
        assert!(matcher.matches_object(
            &template,
            &json!({"author": {"name": "$session.user.name"}})
        ));
    }

    #[test]
    fn test_matches_any_object() {
        let matcher = SessionMatcher::new();
        let templates = vec![
            ObjectTemplate::from_pairs([("_key", json!("a"))]),
            ObjectTemplate::from_pairs([("_key", json!("b"))]),
        ];
        assert!(matcher.matches_any_object(&templates, &json!({"_key": "b"})));
        assert!(!matcher.matches_any_object(&templates, &json!({"_key": "c"})));
        assert!(!matcher.matches_any_object(&[], &json!({"_key": "a"})));
    }
}
