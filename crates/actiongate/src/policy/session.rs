//! Actor session as seen by the decision engine.
//!
//! The engine treats the session as an opaque JSON document supplied by the
//! caller. It only ever reads two things from it: values at dotted paths, and
//! the top-level `access` flag that marks trusted internal call paths.
//!
//! ```ignore
//! use actiongate::policy::Session;
//! use serde_json::json;
//!
//! let session = Session::new(json!({"user": {"name": "Vova", "role": {"name": "admin"}}}));
//! assert!(!session.is_trusted());
//!
//! let internal = Session::trusted();
//! assert!(internal.is_trusted());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::policy::path::FieldPath;

/// Name of the top-level escape flag.
pub const ACCESS_FLAG: &str = "access";

/// Read-only view of an actor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    value: Value,
}

impl Session {
    /// Wrap a session document.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// An unauthenticated session with no fields.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            value: Value::Object(Map::new()),
        }
    }

    /// A session that bypasses policy evaluation (`access: false`).
    #[must_use]
    pub fn trusted() -> Self {
        let mut map = Map::new();
        map.insert(ACCESS_FLAG.to_string(), Value::Bool(false));
        Self {
            value: Value::Object(map),
        }
    }

    /// Returns `true` when the session carries `access: false`.
    ///
    /// Only a literal boolean `false` counts; a missing flag, `true`, or any
    /// other value leaves policy evaluation in force.
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        matches!(self.value.get(ACCESS_FLAG), Some(Value::Bool(false)))
    }

    /// Returns `true` if the session is a JSON object.
    ///
    /// Anything else is malformed: it never bypasses and matches no session
    /// condition, so every decision on it denies.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.value.is_object()
    }

    /// Look up the value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(&self.value)
    }

    /// Look up the value at the given path segments.
    #[must_use]
    pub fn get_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        crate::policy::path::resolve_segments(&self.value, segments)
    }

    /// The underlying session document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.value
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl From<Value> for Session {
    fn from(value: Value) -> Self {
        Self::new(value)
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
    fn test_trusted_session() {
        assert!(Session::trusted().is_trusted());
        assert!(Session::new(json!({"access": false, "user": {}})).is_trusted());
    }

    #[test]
    fn test_access_flag_must_be_literal_false() {
        assert!(!Session::anonymous().is_trusted());
        assert!(!Session::new(json!({"access": true})).is_trusted());
        assert!(!Session::new(json!({"access": 0})).is_trusted());
        assert!(!Session::new(json!({"access": null})).is_trusted());
        assert!(!Session::new(json!({"access": "false"})).is_trusted());
    }

    #[test]
    fn test_non_object_session() {
        let session = Session::new(json!("not a session"));
        assert!(!session.is_well_formed());
        assert!(!session.is_trusted());
        assert_eq!(session.get(&FieldPath::parse("user")), None);
    }

    #[test]
    fn test_get_path() {
        let session = Session::new(json!({"user": {"name": "Vova"}}));
        assert_eq!(
            session.get(&FieldPath::parse("user.name")),
            Some(&json!("Vova"))
        );
        assert_eq!(session.get_segments(&["user", "name"]), Some(&json!("Vova")));
        assert_eq!(session.get(&FieldPath::parse("user.email")), None);
    }

    #[test]
    fn test_transparent_serde() {
        let session: Session = serde_json::from_value(json!({"user": {"id": 1}})).unwrap();
        assert_eq!(session.as_value(), &json!({"user": {"id": 1}}));
        assert_eq!(
            serde_json::to_value(&session).unwrap(),
            json!({"user": {"id": 1}})
        );
    }
}
