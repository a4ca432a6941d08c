//! Access decision engine.
//!
//! [`PolicyEvaluator`] answers whether an action is allowed for a session and,
//! optionally, a target object. It is also the entry point for collecting
//! grants and deriving read filters, and for mutating the policy set.
//!
//! # Decision Rules
//!
//! 1. A trusted session (`access: false`) is always allowed.
//! 2. Entries whose session condition matches are visited in store order.
//! 3. Within an entry, the first wildcard candidate of the action present in
//!    its action table decides: a deny spec denies, an unconditional spec
//!    grants, an object-restricted spec grants when no object is supplied or
//!    when the object matches one of its templates.
//! 4. The first granting entry wins. Denies never override a grant from
//!    another entry.
//!
//! Decisions never fail. A malformed action or a session that is not a JSON
//! object denies and logs a warning.
//!
//! # Example
//!
//! ```ignore
//! use actiongate::policy::engine::{AccessRequest, PolicyEvaluator};
//!
//! let evaluator = PolicyEvaluator::new(store, EvaluatorConfig::default());
//!
//! let request = AccessRequest::new("test.findOne", &session).with_object(&object);
//! if evaluator.is_allowed(&request) {
//!     // Proceed
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::policy::collector::{self, Grant};
use crate::policy::entry::{ActionSpec, PolicyEntry, PolicyKey, SessionCondition};
use crate::policy::filter::{self, AutoCoercion, FilterExpression, ValueCoercion};
use crate::policy::matcher::SessionMatcher;
use crate::policy::pattern::{ActionName, DEFAULT_MAX_SEGMENTS, PatternError};
use crate::policy::session::Session;
use crate::policy::store::{ActionMatch, PolicyStore};

// =============================================================================
// Access Request
// =============================================================================

/// The question put to the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Dot-segmented action name.
    pub action: &'a str,
    /// The acting session.
    pub session: &'a Session,
    /// Target object of a single-object operation.
    pub object: Option<&'a Value>,
}

impl<'a> AccessRequest<'a> {
    /// A request without a target object.
    #[must_use]
    pub fn new(action: &'a str, session: &'a Session) -> Self {
        Self {
            action,
            session,
            object: None,
        }
    }

    /// Attach a target object.
    #[must_use]
    pub fn with_object(mut self, object: &'a Value) -> Self {
        self.object = Some(object);
        self
    }
}

// =============================================================================
// Access Decision
// =============================================================================

/// Machine-readable deny cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyCode {
    /// No session-matching entry resolved the action.
    NoMatchingPolicy,
    /// The last consulted entry denies the action.
    PolicyDenied,
    /// The object matched none of the last consulted entry's templates.
    ObjectMismatch,
    /// The action name could not be expanded.
    MalformedAction,
    /// The session is not a JSON object.
    MalformedSession,
}

impl DenyCode {
    /// The wire form of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatchingPolicy => "no-matching-policy",
            Self::PolicyDenied => "policy-denied",
            Self::ObjectMismatch => "object-mismatch",
            Self::MalformedAction => "malformed-action",
            Self::MalformedSession => "malformed-session",
        }
    }
}

impl fmt::Display for DenyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics attached to a deny.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenyDetail {
    /// Deny cause.
    pub code: DenyCode,

    /// Human-readable message.
    pub message: String,

    /// Key of the last entry that resolved the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PolicyKey>,

    /// The action as requested.
    pub action: String,

    /// Pattern the last consulted entry resolved the action to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,

    /// Whether an object-level check ran for that entry.
    pub checked_objects: bool,
}

impl DenyDetail {
    /// No entry resolved the action.
    #[must_use]
    pub fn no_matching_policy(action: &str) -> Self {
        Self {
            code: DenyCode::NoMatchingPolicy,
            message: "No policy grants this action".to_string(),
            key: None,
            action: action.to_string(),
            matched_pattern: None,
            checked_objects: false,
        }
    }

    /// The action name is malformed.
    #[must_use]
    pub fn malformed_action(action: &str, error: &PatternError) -> Self {
        Self {
            code: DenyCode::MalformedAction,
            message: error.to_string(),
            key: None,
            action: action.to_string(),
            matched_pattern: None,
            checked_objects: false,
        }
    }

    /// The session is not a JSON object.
    #[must_use]
    pub fn malformed_session(action: &str) -> Self {
        Self {
            code: DenyCode::MalformedSession,
            message: "Session is not a JSON object".to_string(),
            key: None,
            action: action.to_string(),
            matched_pattern: None,
            checked_objects: false,
        }
    }

    fn from_evaluated(action: &str, last: EvaluatedPolicy) -> Self {
        let (code, message) = match last.verdict {
            EntryVerdict::ObjectMismatch => (
                DenyCode::ObjectMismatch,
                format!("Object does not match any template of policy '{}'", last.key),
            ),
            _ => (
                DenyCode::PolicyDenied,
                format!("Action denied by policy '{}'", last.key),
            ),
        };
        Self {
            code,
            message,
            key: Some(last.key),
            action: action.to_string(),
            matched_pattern: last.matched_pattern,
            checked_objects: last.checked_objects,
        }
    }
}

/// Result of evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "lowercase")]
pub enum AccessDecision {
    /// Access is granted.
    Allow,
    /// Access is denied.
    Deny(DenyDetail),
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// Deny diagnostics, if denied.
    #[must_use]
    pub fn deny_detail(&self) -> Option<&DenyDetail> {
        match self {
            Self::Deny(detail) => Some(detail),
            Self::Allow => None,
        }
    }

    /// Consume into deny diagnostics, if denied.
    #[must_use]
    pub fn into_deny_detail(self) -> Option<DenyDetail> {
        match self {
            Self::Deny(detail) => Some(detail),
            Self::Allow => None,
        }
    }
}

// =============================================================================
// Evaluation Result
// =============================================================================

/// Outcome of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryVerdict {
    /// No candidate pattern present in the entry.
    NoPattern,
    /// The entry grants.
    Granted,
    /// The resolved spec denies.
    Denied,
    /// The object matched none of the templates.
    ObjectMismatch,
}

/// Audit record of one session-matching entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedPolicy {
    /// Entry key.
    pub key: PolicyKey,
    /// Pattern that resolved the action, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
    /// The entry's verdict.
    pub verdict: EntryVerdict,
    /// Whether an object-level check ran.
    pub checked_objects: bool,
}

/// Decision plus audit information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// The final access decision.
    pub decision: AccessDecision,

    /// Session-matching entries visited, in order.
    pub evaluated_policies: Vec<EvaluatedPolicy>,

    /// Whether the trusted-session bypass applied.
    pub bypassed: bool,

    /// Snapshot version the decision was made against.
    pub store_version: u64,

    /// Time taken to evaluate (milliseconds).
    pub evaluation_time_ms: f64,
}

// =============================================================================
// Evaluator
// =============================================================================

/// Configuration for the policy evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Upper bound on action segments. Longer actions are malformed.
    pub max_action_segments: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_action_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

/// Policy evaluation engine.
pub struct PolicyEvaluator {
    store: Arc<PolicyStore>,
    matcher: SessionMatcher,
    coercion: Arc<dyn ValueCoercion>,
    config: EvaluatorConfig,
}

impl fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    /// Create an evaluator over `store` with auto-detecting filter coercion.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>, config: EvaluatorConfig) -> Self {
        Self {
            store,
            matcher: SessionMatcher::new(),
            coercion: Arc::new(AutoCoercion),
            config,
        }
    }

    /// Replace the filter value coercion.
    #[must_use]
    pub fn with_coercion(mut self, coercion: Arc<dyn ValueCoercion>) -> Self {
        self.coercion = coercion;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// The evaluator configuration.
    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn parse_action(&self, action: &str) -> Result<ActionName, PatternError> {
        ActionName::parse_with_limit(action, self.config.max_action_segments).inspect_err(|e| {
            tracing::warn!(action = %action, error = %e, "Malformed action name");
        })
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Insert or replace the entry with `key`.
    pub fn upsert_policy(
        &self,
        key: impl Into<PolicyKey>,
        session: SessionCondition,
        actions: indexmap::IndexMap<String, ActionSpec>,
    ) -> Arc<PolicyEntry> {
        self.store.upsert(PolicyEntry::new(key, session, actions))
    }

    /// Remove the entry with `key`. Returns `false` if it does not exist.
    pub fn remove_policy(&self, key: &PolicyKey) -> bool {
        self.store.remove(key)
    }

    // -------------------------------------------------------------------------
    // Decisions
    // -------------------------------------------------------------------------

    /// Returns `true` if the request is allowed.
    #[must_use]
    pub fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        self.evaluate(request).is_allowed()
    }

    /// Returns `true` if the request is denied.
    #[must_use]
    pub fn is_denied(&self, request: &AccessRequest<'_>) -> bool {
        !self.is_allowed(request)
    }

    /// Deny diagnostics, or `None` if the request is allowed.
    #[must_use]
    pub fn deny_details(&self, request: &AccessRequest<'_>) -> Option<DenyDetail> {
        self.evaluate(request).into_deny_detail()
    }

    /// Evaluate the request.
    #[must_use]
    pub fn evaluate(&self, request: &AccessRequest<'_>) -> AccessDecision {
        self.decide(request, |_| {}).0
    }

    /// Evaluate the request and record every visited entry.
    #[must_use]
    pub fn evaluate_with_audit(&self, request: &AccessRequest<'_>) -> EvaluationResult {
        let start = std::time::Instant::now();
        let mut evaluated_policies = Vec::new();

        let (decision, store_version) =
            self.decide(request, |evaluated| evaluated_policies.push(evaluated.clone()));

        EvaluationResult {
            bypassed: request.session.is_trusted(),
            decision,
            evaluated_policies,
            store_version,
            evaluation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn decide(
        &self,
        request: &AccessRequest<'_>,
        mut observe: impl FnMut(&EvaluatedPolicy),
    ) -> (AccessDecision, u64) {
        let snapshot = self.store.snapshot();

        if request.session.is_trusted() {
            tracing::debug!(action = %request.action, "Trusted session, access granted");
            return (AccessDecision::Allow, snapshot.version());
        }

        if !request.session.is_well_formed() {
            tracing::warn!(action = %request.action, "Malformed session, access denied");
            return (
                AccessDecision::Deny(DenyDetail::malformed_session(request.action)),
                snapshot.version(),
            );
        }

        let action = match self.parse_action(request.action) {
            Ok(action) => action,
            Err(e) => {
                return (
                    AccessDecision::Deny(DenyDetail::malformed_action(request.action, &e)),
                    snapshot.version(),
                );
            }
        };

        let mut last_resolved: Option<EvaluatedPolicy> = None;

        for entry in snapshot.find_by_session(request.session, &self.matcher) {
            let evaluated = self.evaluate_entry(entry, &action, request.object);

            tracing::trace!(
                policy_key = %entry.key,
                pattern = ?evaluated.matched_pattern,
                verdict = ?evaluated.verdict,
                "Policy entry evaluated"
            );
            observe(&evaluated);

            match evaluated.verdict {
                EntryVerdict::Granted => {
                    tracing::debug!(
                        action = %action,
                        policy_key = %entry.key,
                        "Access granted"
                    );
                    return (AccessDecision::Allow, snapshot.version());
                }
                EntryVerdict::NoPattern => {}
                EntryVerdict::Denied | EntryVerdict::ObjectMismatch => {
                    last_resolved = Some(evaluated);
                }
            }
        }

        let detail = match last_resolved {
            Some(last) => DenyDetail::from_evaluated(request.action, last),
            None => DenyDetail::no_matching_policy(request.action),
        };
        tracing::debug!(action = %action, code = %detail.code, "Access denied");
        (AccessDecision::Deny(detail), snapshot.version())
    }

    fn evaluate_entry(
        &self,
        entry: &PolicyEntry,
        action: &ActionName,
        object: Option<&Value>,
    ) -> EvaluatedPolicy {
        let Some((pattern, spec)) = action.first_match(|p| entry.action(p)) else {
            return EvaluatedPolicy {
                key: entry.key.clone(),
                matched_pattern: None,
                verdict: EntryVerdict::NoPattern,
                checked_objects: false,
            };
        };

        let (verdict, checked_objects) = match (spec, object) {
            (ActionSpec::Deny, _) => (EntryVerdict::Denied, false),
            (ActionSpec::Allow, _) | (ActionSpec::AllowObjects(_), None) => {
                (EntryVerdict::Granted, false)
            }
            (ActionSpec::AllowObjects(templates), Some(object)) => {
                if self.matcher.matches_any_object(templates, object) {
                    (EntryVerdict::Granted, true)
                } else {
                    (EntryVerdict::ObjectMismatch, true)
                }
            }
        };

        EvaluatedPolicy {
            key: entry.key.clone(),
            matched_pattern: Some(pattern),
            verdict,
            checked_objects,
        }
    }

    // -------------------------------------------------------------------------
    // Grants and Filters
    // -------------------------------------------------------------------------

    /// Every non-denying spec resolved for `action` under `session`.
    ///
    /// A trusted session yields a single unconditional spec; a malformed
    /// session or action yields none.
    #[must_use]
    pub fn collect_grants(&self, action: &str, session: &Session) -> Vec<ActionSpec> {
        self.collect_grant_details(action, session)
            .into_iter()
            .map(|grant| grant.spec)
            .collect()
    }

    /// Like [`collect_grants`](Self::collect_grants), with each grant's origin.
    #[must_use]
    pub fn collect_grant_details(&self, action: &str, session: &Session) -> Vec<Grant> {
        if session.is_trusted() {
            return vec![Grant::bypass()];
        }
        if !session.is_well_formed() {
            tracing::warn!(action = %action, "Malformed session, no grants");
            return Vec::new();
        }
        let Ok(action) = self.parse_action(action) else {
            return Vec::new();
        };
        collector::collect_grants(&self.store.snapshot(), &self.matcher, &action, session)
    }

    /// Derive the read filter for `action` under `session`.
    ///
    /// A malformed action or session yields [`FilterExpression::Nothing`].
    #[must_use]
    pub fn build_filter_expression(&self, action: &str, session: &Session) -> FilterExpression {
        if session.is_trusted() {
            return FilterExpression::Unrestricted;
        }
        if !session.is_well_formed() {
            tracing::warn!(action = %action, "Malformed session, filtering out everything");
            return FilterExpression::Nothing;
        }
        let Ok(action) = self.parse_action(action) else {
            return FilterExpression::Nothing;
        };
        filter::build_filter_expression(
            &self.store.snapshot(),
            &self.matcher,
            &action,
            session,
            self.coercion.as_ref(),
        )
    }

    /// Entries granting `action` regardless of session, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AclError::InvalidAction`] for a malformed action.
    pub fn find_by_action(&self, action: &str) -> crate::AclResult<Vec<ActionMatch>> {
        let action = self.parse_action(action)?;
        Ok(self.store.find_by_action(&action))
    }
}

// =============================================================================
// Tests
// =============================================================================
