//! # actiongate
//!
//! Action-level access control decisions for application servers.
//!
//! This crate provides:
//! - Ordered policy sets matched against actor sessions
//! - Wildcard action patterns with a deterministic lookup order
//! - Object-scoped grants with session-derived templates
//! - Read-filter derivation for bulk queries
//! - Lock-free policy snapshots with hot reload from JSON or TOML
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - Error types
//! - [`policy`] - Policy model, evaluation and reload

pub mod config;
pub mod error;
pub mod policy;

pub use config::{AclConfig, ConfigError};
pub use error::AclError;
pub use policy::{
    AccessDecision, AccessRequest, ActionSpec, DenyCode, DenyDetail, EvaluationResult,
    EvaluatorConfig, FilterExpression, PolicyDocument, PolicyEntry, PolicyEvaluator, PolicyKey,
    PolicyStore, Session, SessionCondition,
};

/// Type alias for access control results.
pub type AclResult<T> = Result<T, AclError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use actiongate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AclResult;
    pub use crate::config::{AclConfig, ConfigError};
    pub use crate::error::AclError;
    pub use crate::policy::{
        AccessDecision, AccessRequest, ActionSpec, AutoCoercion, DenyCode, DenyDetail,
        EvaluatedPolicy, EvaluationResult, EvaluatorConfig, FilePolicySource, FilterExpression,
        Grant, ObjectTemplate, PolicyChange, PolicyChangeNotifier, PolicyDocument, PolicyEntry,
        PolicyEvaluator, PolicyKey, PolicyReloadService, PolicySource, PolicyStore,
        ReloadConfig, SchemaCoercion, Session, SessionCondition, ValueCoercion,
    };
}
