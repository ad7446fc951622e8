//! Domain models for the Palisade authorization layer

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PalisadeError, Result};

/// Object types fixed by the schema regardless of the permission map.
pub mod object_types {
    pub const USER: &str = "user";
    pub const ORGANIZATION: &str = "organization";
    pub const ROLE: &str = "role";
    pub const GROUP: &str = "group";
}

/// Structural relations every generated schema declares.
pub mod relations {
    pub const ORGANIZATION: &str = "organization";
    pub const ACCESSORS: &str = "accessors";
    pub const MEMBER: &str = "member";
}

// =============================================================================
// References & Tuples
// =============================================================================

/// Reference to a single object in the policy graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// Reference to the subject side of a tuple or check.
///
/// With `relation: None` the subject is the object itself (`user:u1`); with
/// `relation: Some("member")` it is the set of objects reachable through
/// that relation (`group:g1#member`). The two are semantically different,
/// which is why the field is an `Option` and an explicit empty string is
/// rejected at the operation layer instead of being silently collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub object: ObjectRef,
    pub relation: Option<String>,
}

impl SubjectRef {
    /// A concrete subject, e.g. `user:u1`.
    pub fn direct(object: ObjectRef) -> Self {
        Self {
            object,
            relation: None,
        }
    }

    /// A subject set reached through a relation, e.g. `group:g1#member`.
    pub fn via_relation(object: ObjectRef, relation: impl Into<String>) -> Self {
        Self {
            object,
            relation: Some(relation.into()),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}#{}", self.object, relation),
            None => write!(f, "{}", self.object),
        }
    }
}

/// A single stored fact: `resource` is linked to `subject` via `relation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub resource: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
}

impl Relationship {
    pub fn new(resource: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
        }
    }
}

/// Mutation verb for a relationship write.
///
/// The current operation set only issues `Create`; `Touch` and `Delete` are
/// part of the protocol so revocation and idempotent re-grants do not need a
/// contract change. Whether a duplicate `Create` is a no-op or a rejection
/// is decided by the policy service, not deduplicated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    Create,
    Touch,
    Delete,
}

/// One entry of a `write_relationships` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    pub operation: UpdateOperation,
    pub relationship: Relationship,
}

impl RelationshipUpdate {
    pub fn create(relationship: Relationship) -> Self {
        Self {
            operation: UpdateOperation::Create,
            relationship,
        }
    }
}

/// Filter for reading relationships back from the policy service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFilter {
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub relation: Option<String>,
}

// =============================================================================
// Consistency & Check Results
// =============================================================================

/// Read consistency requested from the policy service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Serve from whatever revision is cheapest. Acceptable staleness of a
    /// few seconds; never used by the operation layer.
    MinimizeLatency,
    /// At least as fresh as the given revision token.
    AtLeastAsFresh(String),
    /// Reflect every write completed before the read was issued. Every
    /// check, lookup and read in the operation layer uses this: anything
    /// weaker can answer "no" for a permission granted a moment ago.
    FullyConsistent,
}

/// Result code of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permissionship {
    Unspecified,
    NoPermission,
    HasPermission,
    /// Permission depends on context not supplied with the check.
    Conditional,
}

impl Permissionship {
    /// Only `HasPermission` grants; unknown and conditional codes do not.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::HasPermission)
    }
}

// =============================================================================
// Principals
// =============================================================================

/// The grantee of a record-access grant: a single user or a whole group.
///
/// A group grant is written as `group:<id>#member`, so users joining the
/// group later are covered without another write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::Group(id.into())
    }

    /// Rebuilds a principal from optional identifiers, for callers that
    /// accept `user_id` / `group_id` as separate inputs. Exactly one must be
    /// supplied.
    pub fn from_ids(user_id: Option<&str>, group_id: Option<&str>) -> Result<Self> {
        match (user_id, group_id) {
            (Some(user), None) => Ok(Self::user(user)),
            (None, Some(group)) => Ok(Self::group(group)),
            (Some(_), Some(_)) => Err(PalisadeError::invalid_argument(
                "user_id and group_id are mutually exclusive",
            )),
            (None, None) => Err(PalisadeError::invalid_argument(
                "either user_id or group_id is required",
            )),
        }
    }

    /// The subject reference this principal grants to.
    pub fn subject_ref(&self) -> SubjectRef {
        match self {
            Self::User(id) => SubjectRef::direct(ObjectRef::new(object_types::USER, id.clone())),
            Self::Group(id) => SubjectRef::via_relation(
                ObjectRef::new(object_types::GROUP, id.clone()),
                relations::MEMBER,
            ),
        }
    }
}

// =============================================================================
// Permission Map
// =============================================================================

/// Declarative product → actions map the schema is compiled from.
///
/// Loaded once at startup and read-only afterwards; services share it behind
/// an `Arc`. Iteration order is insertion order and is treated as canonical:
/// the compiled schema text is diffed across publishes, so the compiler must
/// not reorder entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap {
    actions: IndexMap<String, Vec<String>>,
}

impl PermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares (or extends) the action set of a product.
    pub fn declare(
        &mut self,
        product: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let entry = self.actions.entry(product.into()).or_default();
        for action in actions {
            let action = action.into();
            if !entry.contains(&action) {
                entry.push(action);
            }
        }
    }

    /// True when `action` is declared for `product`.
    pub fn allows(&self, product: &str, action: &str) -> bool {
        self.actions
            .get(product)
            .is_some_and(|actions| actions.iter().any(|a| a == action))
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Products and their actions, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.actions
            .iter()
            .map(|(product, actions)| (product.as_str(), actions.as_slice()))
    }
}
