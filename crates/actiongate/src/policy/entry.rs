//! In-memory policy representation.
//!
//! These are the parsed, evaluation-ready forms of a policy. Dotted paths are
//! split once, `"$…"` strings are turned into structured session references,
//! and the `true | false | {allow, objects}` union becomes [`ActionSpec`].
//! The declarative (wire) form lives in [`crate::policy::resources`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::policy::path::FieldPath;
use crate::policy::session::Session;

/// Prefix marking a template value as a session reference.
pub const SESSION_REF_PREFIX: char = '$';

/// Root name under which the session is visible to references.
pub const SESSION_ROOT: &str = "session";

// =============================================================================
// Policy Key
// =============================================================================

/// Unique, opaque identifier of a policy entry.
///
/// Integer and string keys are interchangeable: `1` and `"1"` are the same
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyKey(String);

impl PolicyKey {
    /// Create a key from any displayable value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolicyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for PolicyKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<i64> for PolicyKey {
    fn from(key: i64) -> Self {
        Self(key.to_string())
    }
}

impl From<u64> for PolicyKey {
    fn from(key: u64) -> Self {
        Self(key.to_string())
    }
}

impl From<i32> for PolicyKey {
    fn from(key: i32) -> Self {
        Self(key.to_string())
    }
}

impl Serialize for PolicyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PolicyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = PolicyKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer policy key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PolicyKey, E> {
                Ok(PolicyKey::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PolicyKey, E> {
                Ok(PolicyKey::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PolicyKey, E> {
                Ok(PolicyKey::from(v))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

// =============================================================================
// Session Condition
// =============================================================================

/// Partial-match template over a session.
///
/// Every clause names a dotted path and the value expected there. An empty
/// condition matches every session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCondition {
    clauses: Vec<(FieldPath, Value)>,
}

impl SessionCondition {
    /// A condition that matches any session.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a condition from `(dotted path, expected value)` pairs.
    #[must_use]
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Self {
            clauses: pairs
                .into_iter()
                .map(|(path, value)| (FieldPath::parse(path.as_ref()), value))
                .collect(),
        }
    }

    /// Returns `true` if the condition has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The condition's clauses.
    #[must_use]
    pub fn clauses(&self) -> &[(FieldPath, Value)] {
        &self.clauses
    }

    /// The condition in its declarative form.
    #[must_use]
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.clauses
            .iter()
            .map(|(path, value)| (path.as_str().to_string(), value.clone()))
            .collect()
    }
}

// =============================================================================
// Object Templates
// =============================================================================

/// Reference to a value inside the session, written `"$session.a.b"`.
///
/// The path is resolved under a root object `{session}`, so only references
/// whose first segment is `session` can ever resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    raw: String,
    path: FieldPath,
}

impl SessionRef {
    /// Parse a `"$…"` string. Returns `None` if the prefix is missing.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let path = raw.strip_prefix(SESSION_REF_PREFIX)?;
        Some(Self {
            raw: raw.to_string(),
            path: FieldPath::parse(path),
        })
    }

    /// The reference as written, including the `$`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path under the `{session}` root.
    #[must_use]
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Resolve the reference against a session.
    #[must_use]
    pub fn resolve<'s>(&self, session: &'s Session) -> Option<&'s Value> {
        match self.path.split_first() {
            Some((SESSION_ROOT, [])) => Some(session.as_value()),
            Some((SESSION_ROOT, rest)) => session.get_segments(rest),
            _ => None,
        }
    }
}

/// Expected value of one template field.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// A literal compared as-is.
    Literal(Value),
    /// A value taken from the session at filter-derivation time.
    SessionRef(SessionRef),
}

impl TemplateValue {
    /// Classify a declared value: strings starting with `$` are references.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match &value {
            Value::String(s) => match SessionRef::parse(s) {
                Some(reference) => Self::SessionRef(reference),
                None => Self::Literal(value),
            },
            _ => Self::Literal(value),
        }
    }

    /// The value exactly as it was declared.
    ///
    /// Object-level checks compare templates as given, so a reference is
    /// compared as its literal `"$…"` string.
    #[must_use]
    pub fn as_declared(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::SessionRef(reference) => Value::String(reference.as_str().to_string()),
        }
    }
}

/// One field constraint of an object template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    /// Dotted path into the target object.
    pub path: FieldPath,
    /// Expected value.
    pub value: TemplateValue,
}

/// A conjunction of field constraints describing permitted objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectTemplate {
    fields: Vec<TemplateField>,
}

impl ObjectTemplate {
    /// Build a template from `(dotted path, declared value)` pairs.
    #[must_use]
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(path, value)| TemplateField {
                    path: FieldPath::parse(path.as_ref()),
                    value: TemplateValue::from_value(value),
                })
                .collect(),
        }
    }

    /// The template's fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// The template in its declarative form.
    #[must_use]
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.path.as_str().to_string(), f.value.as_declared()))
            .collect()
    }
}

impl Serialize for ObjectTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(field.path.as_str(), &field.value.as_declared())?;
        }
        map.end()
    }
}

// =============================================================================
// Action Spec
// =============================================================================

/// Decision attached to an action pattern within one policy.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    /// The policy blocks the action. Other policies may still allow it.
    Deny,
    /// Unconditional allow.
    Allow,
    /// Allow restricted to objects matching at least one template.
    AllowObjects(Arc<[ObjectTemplate]>),
}

impl ActionSpec {
    /// Restricted allow over the given templates.
    #[must_use]
    pub fn objects(templates: Vec<ObjectTemplate>) -> Self {
        Self::AllowObjects(templates.into())
    }

    /// Returns `true` unless this spec denies.
    #[must_use]
    pub fn is_grant(&self) -> bool {
        !matches!(self, Self::Deny)
    }

    /// Returns `true` for an allow without object restrictions.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Object templates, if the allow is restricted.
    #[must_use]
    pub fn templates(&self) -> Option<&[ObjectTemplate]> {
        match self {
            Self::AllowObjects(templates) => Some(templates),
            _ => None,
        }
    }
}

impl Serialize for ActionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Deny => serializer.serialize_bool(false),
            Self::Allow => serializer.serialize_bool(true),
            Self::AllowObjects(templates) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("objects", templates.as_ref())?;
                map.end()
            }
        }
    }
}

// =============================================================================
// Policy Entry
// =============================================================================

/// One ACL record: a session condition plus an action-to-decision table.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEntry {
    /// Unique key within a store.
    pub key: PolicyKey,

    /// Which sessions this entry applies to.
    pub session: SessionCondition,

    /// Action pattern to decision, looked up by exact string match.
    pub actions: IndexMap<String, ActionSpec>,

    /// Optional human-readable description.
    pub description: Option<String>,
}

impl PolicyEntry {
    /// Create an entry without a description.
    #[must_use]
    pub fn new(
        key: impl Into<PolicyKey>,
        session: SessionCondition,
        actions: IndexMap<String, ActionSpec>,
    ) -> Self {
        Self {
            key: key.into(),
            session,
            actions,
            description: None,
        }
    }

    /// Look up the spec for an exact pattern.
    #[must_use]
    pub fn action(&self, pattern: &str) -> Option<&ActionSpec> {
        self.actions.get(pattern)
    }
}

// =============================================================================
// Tests
// =============================================================================
