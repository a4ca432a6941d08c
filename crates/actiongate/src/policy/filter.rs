//! Read-filter derivation.
//!
//! Turns the grants collected for an action into a predicate the storage layer
//! can apply to a bulk read. The result is one of three shapes:
//!
//! - `true`: no restriction, at least one grant is unconditional.
//! - `false`: no object may be returned.
//! - `{"$or": [clause, ...]}`: an object is visible if it satisfies every
//!   field of at least one clause.
//!
//! Template values of the form `"$session.a.b"` are substituted from the
//! session. A template whose reference does not resolve is dropped entirely.
//! Every surviving literal is passed through a [`ValueCoercion`] so that, for
//! example, UUID strings reach the storage layer as identifiers.
//!
//! ```ignore
//! let expression = build_filter_expression(&snapshot, &matcher, &action, &session, &AutoCoercion);
//! assert_eq!(serde_json::to_value(&expression)?, json!({"$or": [{"_key": "test123"}]}));
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::policy::collector::{Grant, collect_grants};
use crate::policy::entry::{ObjectTemplate, TemplateValue};
use crate::policy::matcher::SessionMatcher;
use crate::policy::path::FieldPath;
use crate::policy::pattern::ActionName;
use crate::policy::session::Session;
use crate::policy::store::PolicySnapshot;

/// Wire key of a disjunction.
pub const OR_KEY: &str = "$or";

/// Wire key of a coerced identifier.
pub const UUID_KEY: &str = "$uuid";

/// Wire key of a coerced date-time.
pub const DATE_KEY: &str = "$date";

// =============================================================================
// Filter Values
// =============================================================================

/// A coerced literal in a filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Plain JSON, compared as given.
    Literal(Value),
    /// An identifier. Serialised as `{"$uuid": "…"}`.
    Identifier(Uuid),
    /// A date-time. Serialised as `{"$date": "<RFC 3339>"}`.
    Date(OffsetDateTime),
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Identifier(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(UUID_KEY, &id.hyphenated().to_string())?;
                map.end()
            }
            Self::Date(date) => {
                let formatted = date.format(&Rfc3339).map_err(S::Error::custom)?;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(DATE_KEY, &formatted)?;
                map.end()
            }
        }
    }
}

/// A conjunction of field equalities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterClause(IndexMap<String, FilterValue>);

impl FilterClause {
    /// The clause's fields in template order.
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, FilterValue> {
        &self.0
    }

    /// Expected value for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }
}

/// Result of filter derivation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    /// Every object is visible.
    Unrestricted,
    /// Objects satisfying at least one clause are visible.
    AnyOf(Vec<FilterClause>),
    /// No object is visible.
    Nothing,
}

impl FilterExpression {
    /// Returns `true` for [`FilterExpression::Unrestricted`].
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Returns `true` for [`FilterExpression::Nothing`].
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// The disjunction's clauses, if restricted.
    #[must_use]
    pub fn clauses(&self) -> Option<&[FilterClause]> {
        match self {
            Self::AnyOf(clauses) => Some(clauses),
            _ => None,
        }
    }
}

impl Serialize for FilterExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unrestricted => serializer.serialize_bool(true),
            Self::Nothing => serializer.serialize_bool(false),
            Self::AnyOf(clauses) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(OR_KEY, clauses)?;
                map.end()
            }
        }
    }
}

// =============================================================================
// Coercion
// =============================================================================

/// Converts a template value into the literal the storage layer compares.
pub trait ValueCoercion: Send + Sync {
    /// Coerce `value`, destined for the object field at `field`.
    fn coerce(&self, field: &FieldPath, value: Value) -> FilterValue;
}

/// Detects identifiers and date-times, leaves everything else as given.
///
/// Numbers are not detected: a numeric string stays a string. Use a
/// `number` hint with [`SchemaCoercion`] to compare a field numerically.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoCoercion;

impl ValueCoercion for AutoCoercion {
    fn coerce(&self, _field: &FieldPath, value: Value) -> FilterValue {
        match &value {
            Value::String(s) => detect(s).unwrap_or(FilterValue::Literal(value)),
            _ => FilterValue::Literal(value),
        }
    }
}

/// Hyphenated 8-4-4-4-12 form only, so short hex keys stay strings.
fn parse_hyphenated_uuid(s: &str) -> Option<Uuid> {
    if s.len() != 36 {
        return None;
    }
    Uuid::try_parse(s).ok()
}

fn parse_date(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::from(n));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn detect(s: &str) -> Option<FilterValue> {
    parse_hyphenated_uuid(s)
        .map(FilterValue::Identifier)
        .or_else(|| parse_date(s).map(FilterValue::Date))
}

/// Declared comparison type of an object field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Keep as given, no detection.
    String,
    /// Parse numeric strings.
    Number,
    /// Parse RFC 3339 strings.
    Date,
    /// Parse UUID strings.
    Identifier,
    /// Fall back to [`AutoCoercion`].
    #[default]
    Auto,
}

/// Coercion driven by per-field hints, falling back to auto-detection.
///
/// A value that does not parse as its hinted type is kept as given.
#[derive(Debug, Clone, Default)]
pub struct SchemaCoercion {
    fields: HashMap<String, FieldKind>,
}

impl SchemaCoercion {
    /// Create from `field path -> kind` hints.
    #[must_use]
    pub fn new(fields: HashMap<String, FieldKind>) -> Self {
        Self { fields }
    }

    /// Add a hint.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(field.into(), kind);
        self
    }

    /// Hint for `field`, [`FieldKind::Auto`] if none.
    #[must_use]
    pub fn kind_of(&self, field: &FieldPath) -> FieldKind {
        self.fields.get(field.as_str()).copied().unwrap_or_default()
    }
}

impl ValueCoercion for SchemaCoercion {
    fn coerce(&self, field: &FieldPath, value: Value) -> FilterValue {
        let Value::String(s) = &value else {
            return FilterValue::Literal(value);
        };

        let coerced = match self.kind_of(field) {
            FieldKind::String => None,
            FieldKind::Number => parse_number(s).map(FilterValue::Literal),
            FieldKind::Date => parse_date(s).map(FilterValue::Date),
            FieldKind::Identifier => Uuid::try_parse(s).ok().map(FilterValue::Identifier),
            FieldKind::Auto => detect(s),
        };

        coerced.unwrap_or(FilterValue::Literal(value))
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// Substitute and coerce one template. `None` if a reference is unresolved.
fn template_clause(
    template: &ObjectTemplate,
    session: &Session,
    coercion: &dyn ValueCoercion,
) -> Option<FilterClause> {
    let mut clause = IndexMap::with_capacity(template.fields().len());

    for field in template.fields() {
        let value = match &field.value {
            TemplateValue::Literal(value) => value.clone(),
            TemplateValue::SessionRef(reference) => match reference.resolve(session) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!(
                        field = %field.path,
                        reference = reference.as_str(),
                        "Session reference unresolved, template dropped"
                    );
                    return None;
                }
            },
        };
        clause.insert(
            field.path.as_str().to_string(),
            coercion.coerce(&field.path, value),
        );
    }

    Some(FilterClause(clause))
}

/// Build a filter expression from already collected grants.
#[must_use]
pub fn filter_from_grants(
    grants: &[Grant],
    session: &Session,
    coercion: &dyn ValueCoercion,
) -> FilterExpression {
    if grants.iter().any(Grant::is_unconditional) {
        return FilterExpression::Unrestricted;
    }

    let clauses: Vec<FilterClause> = grants
        .iter()
        .filter_map(|grant| grant.spec.templates())
        .flatten()
        .filter_map(|template| template_clause(template, session, coercion))
        .collect();

    if clauses.is_empty() {
        FilterExpression::Nothing
    } else {
        FilterExpression::AnyOf(clauses)
    }
}

/// Derive the read filter for `action` under `session`.
#[must_use]
pub fn build_filter_expression(
    snapshot: &PolicySnapshot,
    matcher: &SessionMatcher,
    action: &ActionName,
    session: &Session,
    coercion: &dyn ValueCoercion,
) -> FilterExpression {
    if session.is_trusted() {
        return FilterExpression::Unrestricted;
    }

    let grants = collect_grants(snapshot, matcher, action, session);
    let expression = filter_from_grants(&grants, session, coercion);

    tracing::debug!(
        action = %action,
        grants = grants.len(),
        clauses = expression.clauses().map_or(0, <[_]>::len),
        unrestricted = expression.is_unrestricted(),
        "Filter expression derived"
    );
    expression
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::entry::{ActionSpec, PolicyEntry, SessionCondition};
    use crate::policy::store::PolicyStore;
    use serde_json::json;
    use time::macros::datetime;

    fn restricted(templates: Vec<ObjectTemplate>) -> ActionSpec {
        ActionSpec::objects(templates)
    }

    fn scenario_store() -> PolicyStore {
        PolicyStore::with_entries(vec![
            PolicyEntry::new(
                "1",
                SessionCondition::from_pairs([("user.role.name", json!("admin"))]),
                IndexMap::from([
                    ("*".to_string(), ActionSpec::Allow),
                    ("*.*".to_string(), ActionSpec::Allow),
                ]),
            ),
            PolicyEntry::new(
                "2",
                SessionCondition::any(),
                IndexMap::from([
                    (
                        "test.findOne".to_string(),
                        restricted(vec![
                            ObjectTemplate::from_pairs([("_key", json!("test123"))]),
                            ObjectTemplate::from_pairs([(
                                "author.name",
                                json!("$session.user.name"),
                            )]),
                        ]),
                    ),
                    ("test.*".to_string(), ActionSpec::Allow),
                ]),
            ),
        ])
    }

    fn derive(store: &PolicyStore, action: &str, session: &Session) -> Value {
        let expression = build_filter_expression(
            &store.snapshot(),
            &SessionMatcher::new(),
            &ActionName::parse(action).unwrap(),
            session,
            &AutoCoercion,
        );
        serde_json::to_value(&expression).unwrap()
    }

    // -------------------------------------------------------------------------
    // Derivation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_guest_reference_template_dropped() {
        let store = scenario_store();
        assert_eq!(
            derive(&store, "test.findOne", &Session::anonymous()),
            json!({"$or": [{"_key": "test123"}]})
        );
    }

    #[test]
    fn test_reference_substituted() {
        let store = scenario_store();
        let session = Session::new(json!({"user": {"name": "Vova"}}));
        assert_eq!(
            derive(&store, "test.findOne", &session),
            json!({"$or": [{"_key": "test123"}, {"author.name": "Vova"}]})
        );
    }

    #[test]
    fn test_unconditional_grant_is_unrestricted() {
        let store = scenario_store();
        let admin = Session::new(json!({"user": {"role": {"name": "admin"}}}));
        assert_eq!(derive(&store, "test.findOne", &admin), json!(true));
        assert_eq!(derive(&store, "test.create", &Session::anonymous()), json!(true));
    }

    #[test]
    fn test_trusted_session_is_unrestricted() {
        let store = PolicyStore::new();
        assert_eq!(derive(&store, "x.y", &Session::trusted()), json!(true));
    }

    #[test]
    fn test_no_grants_is_nothing() {
        let store = scenario_store();
        assert_eq!(derive(&store, "other.find", &Session::anonymous()), json!(false));
    }

    #[test]
    fn test_all_templates_dropped_is_nothing() {
        let store = PolicyStore::with_entries(vec![PolicyEntry::new(
            "1",
            SessionCondition::any(),
            IndexMap::from([(
                "posts.find".to_string(),
                restricted(vec![ObjectTemplate::from_pairs([
                    ("owner", json!("$session.user.id")),
                    ("published", json!(true)),
                ])]),
            )]),
        )]);
        assert_eq!(derive(&store, "posts.find", &Session::anonymous()), json!(false));
    }

    #[test]
    fn test_non_session_root_reference_never_resolves() {
        let store = PolicyStore::with_entries(vec![PolicyEntry::new(
            "1",
            SessionCondition::any(),
            IndexMap::from([(
                "posts.find".to_string(),
                restricted(vec![ObjectTemplate::from_pairs([("owner", json!("$user.id"))])]),
            )]),
        )]);
        let session = Session::new(json!({"user": {"id": 5}}));
        assert_eq!(derive(&store, "posts.find", &session), json!(false));
    }

    #[test]
    fn test_empty_objects_list_contributes_nothing() {
        let store = PolicyStore::with_entries(vec![PolicyEntry::new(
            "1",
            SessionCondition::any(),
            IndexMap::from([("posts.find".to_string(), restricted(vec![]))]),
        )]);
        assert_eq!(derive(&store, "posts.find", &Session::anonymous()), json!(false));
    }

    #[test]
    fn test_clauses_from_multiple_grants_are_joined() {
        let store = PolicyStore::with_entries(vec![
            PolicyEntry::new(
                "1",
                SessionCondition::any(),
                IndexMap::from([(
                    "posts.*".to_string(),
                    restricted(vec![ObjectTemplate::from_pairs([("status", json!("public"))])]),
                )]),
            ),
            PolicyEntry::new(
                "2",
                SessionCondition::any(),
                IndexMap::from([(
                    "*.find".to_string(),
                    restricted(vec![ObjectTemplate::from_pairs([
                        ("owner", json!("$session.user.id")),
                        ("status", json!("draft")),
                    ])]),
                )]),
            ),
        ]);
        let session = Session::new(json!({"user": {"id": 5}}));
        assert_eq!(
            derive(&store, "posts.find", &session),
            json!({"$or": [{"status": "public"}, {"owner": 5, "status": "draft"}]})
        );
    }

    // -------------------------------------------------------------------------
    // Coercion Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_auto_coercion_detects_identifiers_and_dates() {
        let field = FieldPath::parse("x");
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";

        assert_eq!(
            AutoCoercion.coerce(&field, json!(id)),
            FilterValue::Identifier(Uuid::parse_str(id).unwrap())
        );
        assert_eq!(
            AutoCoercion.coerce(&field, json!("2024-03-01T10:00:00Z")),
            FilterValue::Date(datetime!(2024-03-01 10:00:00 UTC))
        );
        assert_eq!(
            AutoCoercion.coerce(&field, json!("test123")),
            FilterValue::Literal(json!("test123"))
        );
        assert_eq!(
            AutoCoercion.coerce(&field, json!("67e5504410b1426f9247bb680e5fe0c8")),
            FilterValue::Literal(json!("67e5504410b1426f9247bb680e5fe0c8"))
        );
        assert_eq!(AutoCoercion.coerce(&field, json!(42)), FilterValue::Literal(json!(42)));
        // Numeric strings are not detected without a hint.
        assert_eq!(
            AutoCoercion.coerce(&field, json!("42")),
            FilterValue::Literal(json!("42"))
        );
    }

    #[test]
    fn test_coerced_wire_shape() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let clause = FilterClause(IndexMap::from([
            ("id".to_string(), FilterValue::Identifier(id)),
            (
                "created".to_string(),
                FilterValue::Date(datetime!(2024-03-01 10:00:00 UTC)),
            ),
        ]));
        let expression = FilterExpression::AnyOf(vec![clause]);

        assert_eq!(
            serde_json::to_value(&expression).unwrap(),
            json!({"$or": [{
                "id": {"$uuid": "67e55044-10b1-426f-9247-bb680e5fe0c8"},
                "created": {"$date": "2024-03-01T10:00:00Z"}
            }]})
        );
    }

    #[test]
    fn test_schema_coercion_hints() {
        let coercion = SchemaCoercion::default()
            .with_field("count", FieldKind::Number)
            .with_field("code", FieldKind::String)
            .with_field("ref", FieldKind::Identifier);

        assert_eq!(
            coercion.coerce(&FieldPath::parse("count"), json!("42")),
            FilterValue::Literal(json!(42))
        );
        assert_eq!(
            coercion.coerce(&FieldPath::parse("count"), json!("1.5")),
            FilterValue::Literal(json!(1.5))
        );
        assert_eq!(
            coercion.coerce(&FieldPath::parse("count"), json!("many")),
            FilterValue::Literal(json!("many"))
        );
        assert_eq!(
            coercion.coerce(
                &FieldPath::parse("code"),
                json!("67e55044-10b1-426f-9247-bb680e5fe0c8")
            ),
            FilterValue::Literal(json!("67e55044-10b1-426f-9247-bb680e5fe0c8"))
        );
        assert!(matches!(
            coercion.coerce(
                &FieldPath::parse("ref"),
                json!("67e5504410b1426f9247bb680e5fe0c8")
            ),
            FilterValue::Identifier(_)
        ));
        assert!(matches!(
            coercion.coerce(&FieldPath::parse("other"), json!("2024-03-01T10:00:00Z")),
            FilterValue::Date(_)
        ));
    }

    #[test]
    fn test_field_kind_deserialize() {
        let kind: FieldKind = serde_json::from_value(json!("identifier")).unwrap();
        assert_eq!(kind, FieldKind::Identifier);
    }
}
