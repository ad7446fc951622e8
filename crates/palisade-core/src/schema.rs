//! Schema compiler: turns a [`PermissionMap`] into policy schema text
//!
//! The compiler builds a structured [`Schema`] first and renders it to text
//! as a final step, so tests can assert on definitions instead of diffing
//! strings. Rendering is deterministic: definitions and their members are
//! emitted in declaration order, which for products is the insertion order
//! of the permission map.

use std::fmt;

use crate::error::{PalisadeError, Result};
use crate::models::{object_types, relations, PermissionMap};

/// Action exempt from per-record `accessors` gating. Creating a record is
/// authorized by role alone, because the record does not exist yet to be
/// granted on.
pub const CREATE_ACTION: &str = "create";

/// Name of the organization-level grant for `action` on `product`.
///
/// The same name serves as the `organization` relation written by role
/// provisioning, the permission checked by organization-level gates, and
/// the arrow target inside the product definition, so every call site
/// derives it from this one function.
pub fn product_permission(product: &str, action: &str) -> String {
    format!("{action}_{product}")
}

fn member_set(object_type: &str) -> String {
    format!("{object_type}#{}", relations::MEMBER)
}

// =============================================================================
// Structured Schema
// =============================================================================

/// A compiled schema: ordered object type definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub object_types: Vec<ObjectTypeDef>,
}

impl Schema {
    pub fn object_type(&self, name: &str) -> Option<&ObjectTypeDef> {
        self.object_types.iter().find(|def| def.name == name)
    }

    /// Renders the schema to the text form accepted by the policy service.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// One `definition` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTypeDef {
    pub name: String,
    pub relations: Vec<RelationDef>,
    pub permissions: Vec<PermissionDef>,
}

impl ObjectTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        subject_types: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.relations.push(RelationDef {
            name: name.into(),
            subject_types: subject_types.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_permission(mut self, name: impl Into<String>, expr: PermissionExpr) -> Self {
        self.permissions.push(PermissionDef {
            name: name.into(),
            expr,
        });
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    pub fn permission(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions
            .iter()
            .find(|permission| permission.name == name)
    }
}

/// A relation declaration and its allowed subject types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub subject_types: Vec<String>,
}

/// A permission declaration and its defining expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDef {
    pub name: String,
    pub expr: PermissionExpr,
}

/// Expression language subset the compiler emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionExpr {
    /// A relation on the same object type.
    Relation(String),
    /// Walks `relation` and evaluates `target` on every object reached.
    Arrow { relation: String, target: String },
    /// Intersection of two sub-expressions.
    Intersect(Box<PermissionExpr>, Box<PermissionExpr>),
}

impl PermissionExpr {
    pub fn relation(name: impl Into<String>) -> Self {
        Self::Relation(name.into())
    }

    pub fn arrow(relation: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Arrow {
            relation: relation.into(),
            target: target.into(),
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self::Intersect(Box::new(self), Box::new(other))
    }

    /// True when an `accessors` conjunct appears anywhere in the expression.
    pub fn requires_accessors(&self) -> bool {
        match self {
            Self::Relation(name) => name == relations::ACCESSORS,
            Self::Arrow { .. } => false,
            Self::Intersect(left, right) => {
                left.requires_accessors() || right.requires_accessors()
            }
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, def) in self.object_types.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{def}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ObjectTypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relations.is_empty() && self.permissions.is_empty() {
            return writeln!(f, "definition {} {{}}", self.name);
        }
        writeln!(f, "definition {} {{", self.name)?;
        for relation in &self.relations {
            writeln!(
                f,
                "    relation {}: {}",
                relation.name,
                relation.subject_types.join(" | ")
            )?;
        }
        for permission in &self.permissions {
            writeln!(f, "    permission {} = {}", permission.name, permission.expr)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for PermissionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relation(name) => f.write_str(name),
            Self::Arrow { relation, target } => write!(f, "{relation}->{target}"),
            Self::Intersect(left, right) => write!(f, "{left} & {right}"),
        }
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// Compiles the permission map into a full schema.
///
/// Emitted definitions, in order: `user`, `organization`, `role`, `group`,
/// then one definition per product in map order. For every declared
/// (product, action) pair the `organization` type carries a relation named
/// [`product_permission`] accepting `role#member` subjects; that relation is
/// checked directly as the organization-level permission, so no separate
/// permission line is emitted for it. Each product type declares
/// `organization` and `accessors` relations and one permission per action,
/// gated through the organization and intersected with `accessors` for
/// every action except [`CREATE_ACTION`].
pub fn compile_schema(map: &PermissionMap) -> Result<Schema> {
    if map.is_empty() {
        return Err(PalisadeError::invalid_configuration(
            "permission map is empty; declare at least one product",
        ));
    }

    const RESERVED: [&str; 4] = [
        object_types::USER,
        object_types::ORGANIZATION,
        object_types::ROLE,
        object_types::GROUP,
    ];
    for (product, _) in map.iter() {
        if RESERVED.contains(&product) {
            return Err(PalisadeError::invalid_configuration(format!(
                "product name {product:?} collides with a built-in object type"
            )));
        }
    }

    let mut schema = Schema {
        object_types: Vec::with_capacity(map.len() + 4),
    };

    schema.object_types.push(ObjectTypeDef::new(object_types::USER));

    let mut organization = ObjectTypeDef::new(object_types::ORGANIZATION);
    for (product, actions) in map.iter() {
        for action in actions {
            organization = organization.with_relation(
                product_permission(product, action),
                [member_set(object_types::ROLE)],
            );
        }
    }
    schema.object_types.push(organization);

    schema.object_types.push(
        ObjectTypeDef::new(object_types::ROLE)
            .with_relation(relations::MEMBER, [object_types::USER])
            .with_relation(relations::ORGANIZATION, [object_types::ORGANIZATION]),
    );
    schema.object_types.push(
        ObjectTypeDef::new(object_types::GROUP)
            .with_relation(relations::MEMBER, [object_types::USER])
            .with_relation(relations::ORGANIZATION, [object_types::ORGANIZATION]),
    );

    for (product, actions) in map.iter() {
        let mut def = ObjectTypeDef::new(product)
            .with_relation(relations::ORGANIZATION, [object_types::ORGANIZATION])
            .with_relation(
                relations::ACCESSORS,
                [
                    object_types::USER.to_string(),
                    member_set(object_types::GROUP),
                ],
            );
        for action in actions {
            let gate = PermissionExpr::arrow(
                relations::ORGANIZATION,
                product_permission(product, action),
            );
            let expr = if action == CREATE_ACTION {
                gate
            } else {
                gate.intersect(PermissionExpr::relation(relations::ACCESSORS))
            };
            def = def.with_permission(action, expr);
        }
        schema.object_types.push(def);
    }

    Ok(schema)
}
