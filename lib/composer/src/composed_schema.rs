use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use graphql_parser::schema as input;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::selection::FieldSelection;

/// Rendered GraphQL type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeNode {
    List(Box<TypeNode>),
    NonNull(Box<TypeNode>),
    Named(String),
}

impl TypeNode {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeNode::NonNull(_))
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeNode::List(_) => true,
            TypeNode::NonNull(inner) => inner.as_ref().is_list(),
            TypeNode::Named(_) => false,
        }
    }

    pub fn inner_type(&self) -> &str {
        match self {
            TypeNode::List(inner) => inner.as_ref().inner_type(),
            TypeNode::NonNull(inner) => inner.as_ref().inner_type(),
            TypeNode::Named(name) => name,
        }
    }

    /// Based on https://spec.graphql.org/draft/#SameResponseShape()
    pub fn can_be_merged_with(&self, other: &TypeNode) -> bool {
        match (self, other) {
            (TypeNode::List(left), TypeNode::List(right)) => left.can_be_merged_with(right),
            (TypeNode::NonNull(left), TypeNode::NonNull(right)) => left.can_be_merged_with(right),
            (TypeNode::Named(left), TypeNode::Named(right)) => left == right,
            _ => false,
        }
    }
}

impl Display for TypeNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TypeNode::List(inner) => write!(f, "[{}]", inner),
            TypeNode::NonNull(inner) => write!(f, "{}!", inner),
            TypeNode::Named(name) => write!(f, "{}", name),
        }
    }
}

impl From<&input::Type<'_, String>> for TypeNode {
    fn from(value: &input::Type<'_, String>) -> Self {
        match value {
            input::Type::NamedType(name) => TypeNode::Named(name.clone()),
            input::Type::ListType(inner) => TypeNode::List(Box::new(inner.as_ref().into())),
            input::Type::NonNullType(inner) => TypeNode::NonNull(Box::new(inner.as_ref().into())),
        }
    }
}

/// A field of a composed object type, together with the subgraphs able to
/// resolve it. `owners` preserves subgraph declaration order, which the
/// planner's tie-break policy relies on.
#[derive(Debug, Clone)]
pub struct ComposedField {
    pub name: String,
    pub type_node: TypeNode,
    /// Subgraphs declaring this field as resolvable (not `@external`),
    /// in composed declaration order.
    pub owners: Vec<String>,
    /// Subgraphs declaring this field `@external` (they reference it but
    /// cannot resolve it).
    pub external_in: Vec<String>,
    /// `@requires` selection, when the owning subgraph needs sibling data
    /// resolved elsewhere before this field can be fetched.
    pub requires: Option<Vec<FieldSelection>>,
    /// `@provides` selections per subgraph: child fields of this field's type
    /// that the given subgraph can resolve inline, despite not owning them.
    pub provides: FxHashMap<String, Vec<FieldSelection>>,
}

/// A declared entity key and the subgraphs that declared it.
#[derive(Debug, Clone)]
pub struct EntityKey {
    pub fields: Vec<FieldSelection>,
    pub subgraphs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub is_interface: bool,
    pub fields: FxHashMap<String, ComposedField>,
    pub keys: Vec<EntityKey>,
    pub implements: Vec<String>,
}

impl ObjectType {
    pub fn is_entity(&self) -> bool {
        !self.keys.is_empty()
    }

    /// The primary key: the first declared one, matching federation's
    /// resolvable-key convention.
    pub fn primary_key(&self) -> Option<&EntityKey> {
        self.keys.first()
    }
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
    pub declared_in: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScalarType {
    pub name: String,
    pub declared_in: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UnionType {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InputObjectType {
    pub name: String,
    pub fields: FxHashMap<String, TypeNode>,
}

#[derive(Debug, Clone)]
pub enum ComposedType {
    Object(ObjectType),
    Enum(EnumType),
    Scalar(ScalarType),
    Union(UnionType),
    InputObject(InputObjectType),
}

impl ComposedType {
    pub fn name(&self) -> &str {
        match self {
            ComposedType::Object(t) => &t.name,
            ComposedType::Enum(t) => &t.name,
            ComposedType::Scalar(t) => &t.name,
            ComposedType::Union(t) => &t.name,
            ComposedType::InputObject(t) => &t.name,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ComposedType::Object(t) if t.is_interface => "interface",
            ComposedType::Object(_) => "object",
            ComposedType::Enum(_) => "enum",
            ComposedType::Scalar(_) => "scalar",
            ComposedType::Union(_) => "union",
            ComposedType::InputObject(_) => "input object",
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            ComposedType::Object(object_type) => Some(object_type),
            _ => None,
        }
    }
}

/// Derived lookup tables consumed by response projection and variable
/// validation. Computed once at composition time.
#[derive(Debug, Default)]
pub struct SchemaMetadata {
    pub possible_types: FxHashMap<String, HashSet<String>>,
    pub enum_values: FxHashMap<String, Vec<String>>,
    pub type_fields: FxHashMap<String, FxHashMap<String, TypeNode>>,
}

impl SchemaMetadata {
    pub fn entity_satisfies_type_condition(&self, type_name: &str, type_condition: &str) -> bool {
        if type_name == type_condition {
            return true;
        }
        self.possible_types
            .get(type_condition)
            .is_some_and(|possible| possible.contains(type_name))
    }
}

/// The read-only composition artifact. Shared across requests behind an `Arc`
/// and replaced atomically on schema reload, never mutated in place.
#[derive(Debug)]
pub struct ComposedSchema {
    pub types: FxHashMap<String, ComposedType>,
    /// Subgraph names in composition input order.
    pub subgraph_names: Vec<String>,
    /// Subgraph name to its GraphQL-over-HTTP endpoint.
    pub subgraph_endpoint_map: FxHashMap<String, String>,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub metadata: SchemaMetadata,
}

impl ComposedSchema {
    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name).and_then(ComposedType::as_object)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&ComposedField> {
        self.object_type(type_name)
            .and_then(|object_type| object_type.fields.get(field_name))
    }

    pub fn is_leaf_type(&self, type_name: &str) -> bool {
        match self.types.get(type_name) {
            Some(ComposedType::Enum(_)) | Some(ComposedType::Scalar(_)) => true,
            Some(_) => false,
            // Built-in scalars are not stored as explicit definitions.
            None => matches!(type_name, "String" | "Int" | "Float" | "Boolean" | "ID"),
        }
    }

    /// True when `subgraph` can resolve every field of `key` on `type_name`.
    pub fn subgraph_can_resolve_key(&self, type_name: &str, key: &EntityKey, subgraph: &str) -> bool {
        let Some(object_type) = self.object_type(type_name) else {
            return false;
        };
        key.fields.iter().all(|selection| {
            object_type
                .fields
                .get(&selection.name)
                .is_some_and(|field| {
                    field.owners.iter().any(|owner| owner == subgraph)
                        || field.external_in.iter().any(|ext| ext == subgraph)
                })
        })
    }
}
