//! Collection of permission fragments for an action.
//!
//! Where [`crate::policy::engine`] stops at the first granting entry, the
//! collector visits every entry matching the session and returns each
//! resolved, non-denying spec. Object-level checks are not applied: there is
//! no single candidate object yet, and the result feeds filter derivation.

use serde::Serialize;

use crate::policy::entry::{ActionSpec, PolicyKey};
use crate::policy::matcher::SessionMatcher;
use crate::policy::pattern::ActionName;
use crate::policy::session::Session;
use crate::policy::store::PolicySnapshot;

/// Where a grant came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GrantSource {
    /// The session is trusted and bypasses policy evaluation.
    Bypass,
    /// A policy entry resolved the action to a grant.
    #[serde(rename_all = "camelCase")]
    Policy {
        /// Key of the granting entry.
        key: PolicyKey,
        /// Pattern that resolved the action.
        pattern: String,
    },
}

/// A resolved, non-denying spec together with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grant {
    /// Origin of the grant.
    pub source: GrantSource,
    /// The resolved spec. Never [`ActionSpec::Deny`].
    pub spec: ActionSpec,
}

impl Grant {
    /// The unconditional grant produced for trusted sessions.
    #[must_use]
    pub fn bypass() -> Self {
        Self {
            source: GrantSource::Bypass,
            spec: ActionSpec::Allow,
        }
    }

    /// Returns `true` if the grant carries no object restriction.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.spec.is_unconditional()
    }
}

/// Collect every grant for `action` from entries matching `session`.
///
/// A trusted session yields a single [`Grant::bypass`]. Otherwise the result
/// holds one grant per session-matching entry whose first present pattern
/// resolves to a non-deny, in store order.
#[must_use]
pub fn collect_grants(
    snapshot: &PolicySnapshot,
    matcher: &SessionMatcher,
    action: &ActionName,
    session: &Session,
) -> Vec<Grant> {
    if session.is_trusted() {
        return vec![Grant::bypass()];
    }

    let grants: Vec<Grant> = snapshot
        .find_by_session(session, matcher)
        .filter_map(|entry| {
            let (pattern, spec) = action.first_match(|p| entry.action(p))?;
            if !spec.is_grant() {
                tracing::trace!(policy_key = %entry.key, pattern = %pattern, "Entry denies action");
                return None;
            }
            Some(Grant {
                source: GrantSource::Policy {
                    key: entry.key.clone(),
                    pattern,
                },
                spec: spec.clone(),
            })
        })
        .collect();

    tracing::debug!(action = %action, grants = grants.len(), "Grants collected");
    grants
}
