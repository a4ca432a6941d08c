//! Action-level access control.
//!
//! A policy set is an ordered list of entries. Each entry pairs a session
//! condition with a table mapping action patterns to decisions. Given an
//! action such as `test.findOne` and a session, the engine answers:
//!
//! - whether the action is allowed, optionally for a specific object
//! - which permission fragments apply (for building read filters)
//! - which read filter a bulk query must apply
//!
//! # Pattern Expansion
//!
//! The [`pattern`] module expands an action into its wildcard candidates in
//! a fixed lookup order:
//!
//! ```ignore
//! use actiongate::policy::pattern::ActionName;
//!
//! let action = ActionName::parse("test.findOne")?;
//! let candidates: Vec<String> = action.candidates().collect();
//! assert_eq!(candidates, ["test.findOne", "test.*", "*.findOne", "*.*"]);
//! ```
//!
//! # Policy Documents
//!
//! The [`resources`] module provides the declarative form of a policy:
//!
//! ```ignore
//! use actiongate::policy::resources::PolicyDocument;
//!
//! let document: PolicyDocument = serde_json::from_str(r#"{
//!     "key": 2,
//!     "session": {},
//!     "actions": {"test.*": true}
//! }"#)?;
//! let entry = document.to_policy_entry()?;
//! ```
//!
//! # Evaluation
//!
//! The [`engine`] module provides [`PolicyEvaluator`], the entry point for
//! decisions, grant collection and filter derivation:
//!
//! ```ignore
//! use actiongate::policy::engine::{AccessRequest, EvaluatorConfig, PolicyEvaluator};
//!
//! let evaluator = PolicyEvaluator::new(store, EvaluatorConfig::default());
//! let allowed = evaluator.is_allowed(&AccessRequest::new("test.findOne", &session));
//! let filter = evaluator.build_filter_expression("test.find", &session);
//! ```
//!
//! # Hot Reload
//!
//! The [`reload`] module reloads the store from a [`PolicySource`] on request
//! or periodically.

pub mod collector;
pub mod engine;
pub mod entry;
pub mod filter;
pub mod matcher;
pub mod path;
pub mod pattern;
pub mod reload;
pub mod resources;
pub mod session;
pub mod store;

pub use collector::{Grant, GrantSource};

pub use engine::{
    AccessDecision, AccessRequest, DenyCode, DenyDetail, EntryVerdict, EvaluatedPolicy,
    EvaluationResult, EvaluatorConfig, PolicyEvaluator,
};

pub use entry::{
    ActionSpec, ObjectTemplate, PolicyEntry, PolicyKey, SessionCondition, SessionRef,
    TemplateField, TemplateValue,
};

pub use filter::{
    AutoCoercion, FieldKind, FilterClause, FilterExpression, FilterValue, SchemaCoercion,
    ValueCoercion,
};

pub use matcher::SessionMatcher;

pub use path::FieldPath;

pub use pattern::{ActionName, PatternCandidates, PatternError};

pub use reload::{
    FilePolicySource, PolicyChange, PolicyChangeNotifier, PolicyFormat, PolicyReloadService,
    PolicySource, ReloadConfig, ReloadStats, StaticPolicySource, parse_policy_set,
};

pub use resources::{
    ActionRule, ActionSpecDocument, ConversionError, PolicyDocument, PolicySet, ValidationError,
    to_policy_entries,
};

pub use session::Session;

pub use store::{ActionMatch, PolicySnapshot, PolicyStore, PolicyStoreStats};
