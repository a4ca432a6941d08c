//! Declarative policy documents.
//!
//! This is the form in which policies are written in configuration files and
//! accepted from callers. A document is validated and converted once into a
//! [`PolicyEntry`] before it reaches the store.
//!
//! # Example
//!
//! ```json
//! [
//!   { "key": 1, "session": {"user.role.name": "admin"},
//!     "actions": {"*": true, "*.*": true} },
//!   { "key": 2, "session": {},
//!     "actions": {
//!       "test.findOne": {"objects": [{"_key": "test123"},
//!                                    {"author.name": "$session.user.name"}]},
//!       "test.*": true } }
//! ]
//! ```
//!
//! ```ignore
//! use actiongate::policy::resources::PolicyDocument;
//!
//! let document: PolicyDocument = serde_json::from_value(json)?;
//! document.validate()?;
//! let entry = document.to_policy_entry()?;
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::entry::{ActionSpec, ObjectTemplate, PolicyEntry, PolicyKey, SessionCondition};
use crate::policy::pattern::{WILDCARD, is_valid_pattern};

// =============================================================================
// Policy Document
// =============================================================================

/// Declarative form of one policy entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Unique key.
    pub key: PolicyKey,

    /// Session condition: dotted path to expected value.
    #[serde(default)]
    pub session: IndexMap<String, Value>,

    /// Action pattern to decision.
    #[serde(default)]
    pub actions: IndexMap<String, ActionSpecDocument>,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declared decision for an action pattern: `true`, `false`, or a rule object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpecDocument {
    /// `true` allows, `false` denies.
    Flag(bool),
    /// Conditional allow.
    Rule(ActionRule),
}

/// Object form of an action decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionRule {
    /// Whether the rule allows. Defaults to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,

    /// Permitted object templates. Absent means unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<IndexMap<String, Value>>>,
}

impl ActionSpecDocument {
    /// Convert to the evaluation-ready form.
    ///
    /// `{allow: false}` denies regardless of `objects`; an allow without
    /// `objects` is unconditional.
    #[must_use]
    pub fn to_action_spec(&self) -> ActionSpec {
        match self {
            Self::Flag(true) => ActionSpec::Allow,
            Self::Flag(false) => ActionSpec::Deny,
            Self::Rule(rule) if rule.allow == Some(false) => ActionSpec::Deny,
            Self::Rule(ActionRule { objects: None, .. }) => ActionSpec::Allow,
            Self::Rule(ActionRule {
                objects: Some(objects),
                ..
            }) => ActionSpec::objects(
                objects
                    .iter()
                    .map(|template| ObjectTemplate::from_pairs(template.clone()))
                    .collect(),
            ),
        }
    }

    /// Convert an evaluation-ready spec back to its declarative form.
    #[must_use]
    pub fn from_action_spec(spec: &ActionSpec) -> Self {
        match spec {
            ActionSpec::Allow => Self::Flag(true),
            ActionSpec::Deny => Self::Flag(false),
            ActionSpec::AllowObjects(templates) => Self::Rule(ActionRule {
                allow: None,
                objects: Some(templates.iter().map(ObjectTemplate::to_map).collect()),
            }),
        }
    }
}

// =============================================================================
// Policy Set
// =============================================================================

/// A file-level collection of policy documents.
///
/// Accepts either a bare array or an object with a `policies` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicySet {
    /// `[ {...}, {...} ]`
    List(Vec<PolicyDocument>),
    /// `{ "policies": [ ... ] }`
    Wrapped {
        /// The policy documents.
        policies: Vec<PolicyDocument>,
    },
}

impl PolicySet {
    /// Unwrap into the contained documents.
    #[must_use]
    pub fn into_documents(self) -> Vec<PolicyDocument> {
        match self {
            Self::List(policies) | Self::Wrapped { policies } => policies,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Errors found while validating a policy document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The key is the empty string.
    #[error("policy key cannot be empty")]
    EmptyKey,

    /// A session condition path is empty or has an empty segment.
    #[error("invalid session path '{0}'")]
    InvalidSessionPath(String),

    /// An action pattern is malformed.
    #[error("invalid action pattern '{0}': segments must be non-empty literals or '*'")]
    InvalidPattern(String),

    /// A multi-level wildcard was used.
    #[error("multi-level wildcard '**' is not supported in pattern '{0}'")]
    MultiLevelWildcard(String),

    /// An object template field path is malformed.
    #[error("invalid object field path '{field}' in pattern '{pattern}'")]
    InvalidObjectPath {
        /// The pattern whose template is malformed.
        pattern: String,
        /// The offending field path.
        field: String,
    },
}

/// Errors that can occur converting a document into a policy entry.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The document failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}

impl PolicyDocument {
    /// Create a document.
    #[must_use]
    pub fn new(
        key: impl Into<PolicyKey>,
        session: IndexMap<String, Value>,
        actions: IndexMap<String, ActionSpecDocument>,
    ) -> Self {
        Self {
            key: key.into(),
            session,
            actions,
            description: None,
        }
    }

    /// Validate the document.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: an empty key, a malformed session
    /// path, a malformed or multi-level action pattern, or a malformed object
    /// field path.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.as_str().is_empty() {
            return Err(ValidationError::EmptyKey);
        }

        if let Some(path) = self.session.keys().find(|p| !is_valid_path(p)) {
            return Err(ValidationError::InvalidSessionPath(path.clone()));
        }

        for (pattern, spec) in &self.actions {
            if pattern.split('.').any(|s| s == "**") {
                return Err(ValidationError::MultiLevelWildcard(pattern.clone()));
            }
            if !is_valid_pattern(pattern) {
                return Err(ValidationError::InvalidPattern(pattern.clone()));
            }

            if let ActionSpecDocument::Rule(ActionRule {
                objects: Some(objects),
                ..
            }) = spec
                && let Some(field) = objects
                    .iter()
                    .flat_map(IndexMap::keys)
                    .find(|f| !is_valid_path(f))
            {
                return Err(ValidationError::InvalidObjectPath {
                    pattern: pattern.clone(),
                    field: field.clone(),
                });
            }
        }

        Ok(())
    }

    /// Validate and convert into an evaluation-ready entry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if validation fails.
    pub fn to_policy_entry(&self) -> Result<PolicyEntry, ConversionError> {
        self.validate()?;

        Ok(PolicyEntry {
            key: self.key.clone(),
            session: SessionCondition::from_pairs(self.session.clone()),
            actions: self
                .actions
                .iter()
                .map(|(pattern, spec)| (pattern.clone(), spec.to_action_spec()))
                .collect(),
            description: self.description.clone(),
        })
    }

    /// Build the declarative form of an entry.
    #[must_use]
    pub fn from_policy_entry(entry: &PolicyEntry) -> Self {
        Self {
            key: entry.key.clone(),
            session: entry.session.to_map(),
            actions: entry
                .actions
                .iter()
                .map(|(pattern, spec)| (pattern.clone(), ActionSpecDocument::from_action_spec(spec)))
                .collect(),
            description: entry.description.clone(),
        }
    }

    /// Number of fully wildcarded patterns (`*`, `*.*`, …) in the document.
    #[must_use]
    pub fn wildcard_pattern_count(&self) -> usize {
        self.actions
            .keys()
            .filter(|p| p.split('.').all(|s| s == WILDCARD))
            .count()
    }
}

/// Convert a batch of documents, failing on the first invalid one.
///
/// # Errors
///
/// Returns [`crate::AclError::InvalidPolicy`] naming the offending key.
pub fn to_policy_entries(documents: &[PolicyDocument]) -> crate::AclResult<Vec<PolicyEntry>> {
    documents
        .iter()
        .map(|doc| {
            doc.to_policy_entry()
                .map_err(|e| crate::AclError::invalid_policy(doc.key.to_string(), e.to_string()))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::entry::TemplateValue;
    use serde_json::json;

    fn scenario_documents() -> Vec<PolicyDocument> {
        serde_json::from_value(json!([
            {"key": 1, "session": {"user.role.name": "admin"},
             "actions": {"*": true, "*.*": true}},
            {"key": 2, "session": {},
             "actions": {
                "test.findOne": {"objects": [{"_key": "test123"},
                                             {"author.name": "$session.user.name"}]},
                "test.*": true}}
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_scenario() {
        let docs = scenario_documents();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].key, PolicyKey::from("1"));
        assert_eq!(docs[0].actions["*"], ActionSpecDocument::Flag(true));
        assert!(matches!(
            docs[1].actions["test.findOne"],
            ActionSpecDocument::Rule(ActionRule { objects: Some(_), .. })
        ));
    }

    #[test]
    fn test_convert_scenario() {
        let entries = to_policy_entries(&scenario_documents()).unwrap();
        assert!(entries[1].session.is_empty());
        assert_eq!(entries[1].action("test.*"), Some(&ActionSpec::Allow));

        let templates = entries[1].action("test.findOne").unwrap().templates().unwrap();
        assert_eq!(templates.len(), 2);
        assert!(matches!(templates[0].fields()[0].value, TemplateValue::Literal(_)));
        assert!(matches!(templates[1].fields()[0].value, TemplateValue::SessionRef(_)));
    }

    #[test]
    fn test_spec_normalisation() {
        let deny: ActionSpecDocument =
            serde_json::from_value(json!({"allow": false, "objects": [{"a": 1}]})).unwrap();
        assert_eq!(deny.to_action_spec(), ActionSpec::Deny);

        let allow: ActionSpecDocument = serde_json::from_value(json!({"allow": true})).unwrap();
        assert_eq!(allow.to_action_spec(), ActionSpec::Allow);

        let empty_rule: ActionSpecDocument = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty_rule.to_action_spec(), ActionSpec::Allow);

        let flag: ActionSpecDocument = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(flag.to_action_spec(), ActionSpec::Deny);
    }

    #[test]
    fn test_unknown_rule_field_rejected() {
        assert!(serde_json::from_value::<ActionSpecDocument>(json!({"allowed": true})).is_err());
    }

    #[test]
    fn test_wrapped_policy_set() {
        let set: PolicySet = serde_json::from_value(json!({
            "policies": [{"key": "a", "actions": {"*": true}}]
        }))
        .unwrap();
        let docs = set.into_documents();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].session.is_empty());
    }

    #[test]
    fn test_validate_rejects_multi_level_wildcard() {
        let doc: PolicyDocument =
            serde_json::from_value(json!({"key": 1, "actions": {"test.**": true}})).unwrap();
        assert_eq!(
            doc.validate(),
            Err(ValidationError::MultiLevelWildcard("test.**".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        for pattern in ["", "test.", ".find", "te*st.find"] {
            let mut actions = IndexMap::new();
            actions.insert(pattern.to_string(), ActionSpecDocument::Flag(true));
            let doc = PolicyDocument::new("k", IndexMap::new(), actions);
            assert!(
                matches!(doc.validate(), Err(ValidationError::InvalidPattern(_))),
                "pattern {pattern:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_empty_key_and_paths() {
        let doc = PolicyDocument::new("", IndexMap::new(), IndexMap::new());
        assert_eq!(doc.validate(), Err(ValidationError::EmptyKey));

        let mut session = IndexMap::new();
        session.insert("user..role".to_string(), json!("x"));
        let doc = PolicyDocument::new("k", session, IndexMap::new());
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::InvalidSessionPath(_))
        ));

        let doc: PolicyDocument = serde_json::from_value(json!({
            "key": "k", "actions": {"a.b": {"objects": [{"": 1}]}}
        }))
        .unwrap();
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::InvalidObjectPath { .. })
        ));
    }

    #[test]
    fn test_batch_conversion_names_offending_key() {
        let mut docs = scenario_documents();
        docs[1].actions.insert("x.**".to_string(), ActionSpecDocument::Flag(true));
        let err = to_policy_entries(&docs).unwrap_err();
        assert!(err.to_string().contains("'2'"));
    }

    #[test]
    fn test_entry_round_trip_to_document() {
        let docs = scenario_documents();
        let entry = docs[1].to_policy_entry().unwrap();
        let back = PolicyDocument::from_policy_entry(&entry);
        assert_eq!(
            serde_json::to_value(&back).unwrap(),
            serde_json::to_value(&docs[1]).unwrap()
        );
    }

    #[test]
    fn test_wildcard_pattern_count() {
        let docs = scenario_documents();
        assert_eq!(docs[0].wildcard_pattern_count(), 2);
        assert_eq!(docs[1].wildcard_pattern_count(), 0);
    }

    #[test]
    fn test_toml_document() {
        let set: PolicySet = toml::from_str(
            r#"
            [[policies]]
            key = "editors"
            session = { "user.role.name" = "editor" }
            actions = { "posts.*" = true, "posts.delete" = false }
            "#,
        )
        .unwrap();
        let docs = set.into_documents();
        assert_eq!(docs[0].key.as_str(), "editors");
        assert_eq!(docs[0].actions["posts.delete"], ActionSpecDocument::Flag(false));
    }
}
