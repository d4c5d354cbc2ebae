//! Merges a set of subgraph schemas into one [`ComposedSchema`].
//!
//! Composition is all-or-nothing: every validation runs before anything is
//! published, so a failing epoch can never leave a half-composed artifact
//! visible to planners.

use std::collections::HashSet;

use graphql_parser::schema as input;
use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::{
    composed_schema::{
        ComposedField, ComposedSchema, ComposedType, EntityKey, EnumType, InputObjectType,
        ObjectType, ScalarType, SchemaMetadata, TypeNode, UnionType,
    },
    error::CompositionError,
    federation_spec::{
        extract_directives, has_directive, ExternalDirective, KeyDirective, ProvidesDirective,
        RequiresDirective,
    },
    selection::{display_field_set, parse_field_set, FieldSelection},
    subgraph_schema::SubgraphSchema,
};

#[instrument(level = "debug", skip(subgraphs), fields(subgraph_count = subgraphs.len()))]
pub fn compose(subgraphs: &[SubgraphSchema]) -> Result<ComposedSchema, CompositionError> {
    if subgraphs.is_empty() {
        return Err(CompositionError::NoSubgraphs);
    }

    let mut composer = Composer::default();
    for subgraph in subgraphs {
        composer.merge_subgraph(subgraph)?;
    }

    let composed = composer.finish(subgraphs)?;
    validate(&composed)?;

    debug!(
        types = composed.types.len(),
        subgraphs = composed.subgraph_names.len(),
        "composition succeeded"
    );

    Ok(composed)
}

#[derive(Default)]
struct Composer {
    types: FxHashMap<String, ComposedType>,
    /// First subgraph that declared each type, for conflict reports.
    first_declared_in: FxHashMap<String, String>,
}

impl Composer {
    fn merge_subgraph(&mut self, subgraph: &SubgraphSchema) -> Result<(), CompositionError> {
        for definition in &subgraph.document.definitions {
            match definition {
                input::Definition::TypeDefinition(input::TypeDefinition::Scalar(scalar_type)) => {
                    self.merge_scalar(subgraph, &scalar_type.name)?;
                }
                input::Definition::TypeDefinition(input::TypeDefinition::Enum(enum_type)) => {
                    self.merge_enum(subgraph, enum_type)?;
                }
                input::Definition::TypeDefinition(input::TypeDefinition::Union(union_type)) => {
                    self.merge_union(subgraph, union_type)?;
                }
                input::Definition::TypeDefinition(input::TypeDefinition::InputObject(
                    input_object,
                )) => {
                    self.merge_input_object(subgraph, input_object)?;
                }
                _ => {}
            }
        }

        for object_like in subgraph.object_like_types() {
            if is_federation_internal_type(object_like.name) {
                continue;
            }

            self.ensure_kind(
                object_like.name,
                if object_like.is_interface {
                    "interface"
                } else {
                    "object"
                },
                &subgraph.name,
            )?;

            let object_type = match self
                .types
                .entry(object_like.name.to_string())
                .or_insert_with(|| {
                    ComposedType::Object(ObjectType {
                        name: object_like.name.to_string(),
                        is_interface: object_like.is_interface,
                        fields: FxHashMap::default(),
                        keys: Vec::new(),
                        implements: Vec::new(),
                    })
                }) {
                ComposedType::Object(object_type) => object_type,
                // ensure_kind already rejected the mismatch
                _ => unreachable!("non-object stored under object name"),
            };

            for interface_name in object_like.implements {
                if !object_type.implements.contains(interface_name) {
                    object_type.implements.push(interface_name.clone());
                }
            }

            for key in extract_directives::<KeyDirective>(object_like.directives, KeyDirective::NAME)
            {
                let fields = parse_field_set(&key.fields)?;
                match object_type
                    .keys
                    .iter_mut()
                    .find(|existing| existing.fields == fields)
                {
                    Some(existing) => {
                        if !existing.subgraphs.contains(&subgraph.name) {
                            existing.subgraphs.push(subgraph.name.clone());
                        }
                    }
                    None => object_type.keys.push(EntityKey {
                        fields,
                        subgraphs: vec![subgraph.name.clone()],
                    }),
                }
            }

            for field in object_like.fields {
                if is_federation_internal_field(&field.name) {
                    continue;
                }

                let type_node: TypeNode = (&field.field_type).into();
                let is_external = has_directive(&field.directives, ExternalDirective::NAME);
                let requires =
                    extract_directives::<RequiresDirective>(&field.directives, RequiresDirective::NAME)
                        .into_iter()
                        .next()
                        .map(|directive| parse_field_set(&directive.fields))
                        .transpose()?;
                let provides =
                    extract_directives::<ProvidesDirective>(&field.directives, ProvidesDirective::NAME)
                        .into_iter()
                        .next()
                        .map(|directive| parse_field_set(&directive.fields))
                        .transpose()?;

                match object_type.fields.get_mut(&field.name) {
                    Some(existing) => {
                        if !existing.type_node.can_be_merged_with(&type_node) {
                            let existing_subgraph = existing
                                .owners
                                .first()
                                .or(existing.external_in.first())
                                .cloned()
                                .unwrap_or_default();
                            return Err(CompositionError::FieldTypeMismatch {
                                type_name: object_like.name.to_string(),
                                field_name: field.name.clone(),
                                existing: existing.type_node.to_string(),
                                existing_subgraph,
                                conflicting: type_node.to_string(),
                                conflicting_subgraph: subgraph.name.clone(),
                            });
                        }
                        if is_external {
                            if !existing.external_in.contains(&subgraph.name) {
                                existing.external_in.push(subgraph.name.clone());
                            }
                        } else if !existing.owners.contains(&subgraph.name) {
                            existing.owners.push(subgraph.name.clone());
                        }
                        if existing.requires.is_none() {
                            existing.requires = requires;
                        }
                        if let Some(provides) = provides {
                            existing.provides.insert(subgraph.name.clone(), provides);
                        }
                    }
                    None => {
                        let mut composed_field = ComposedField {
                            name: field.name.clone(),
                            type_node,
                            owners: Vec::new(),
                            external_in: Vec::new(),
                            requires,
                            provides: FxHashMap::default(),
                        };
                        if is_external {
                            composed_field.external_in.push(subgraph.name.clone());
                        } else {
                            composed_field.owners.push(subgraph.name.clone());
                        }
                        if let Some(provides) = provides {
                            composed_field
                                .provides
                                .insert(subgraph.name.clone(), provides);
                        }
                        object_type.fields.insert(field.name.clone(), composed_field);
                    }
                }
            }

            self.first_declared_in
                .entry(object_like.name.to_string())
                .or_insert_with(|| subgraph.name.clone());
        }

        Ok(())
    }

    fn ensure_kind(
        &self,
        type_name: &str,
        kind: &'static str,
        subgraph: &str,
    ) -> Result<(), CompositionError> {
        if let Some(existing) = self.types.get(type_name) {
            if existing.kind_str() != kind {
                return Err(CompositionError::ConflictingTypeKinds {
                    type_name: type_name.to_string(),
                    left_kind: existing.kind_str(),
                    left_subgraph: self
                        .first_declared_in
                        .get(type_name)
                        .cloned()
                        .unwrap_or_default(),
                    right_kind: kind,
                    right_subgraph: subgraph.to_string(),
                });
            }
        }
        Ok(())
    }

    fn merge_scalar(
        &mut self,
        subgraph: &SubgraphSchema,
        name: &str,
    ) -> Result<(), CompositionError> {
        if is_federation_internal_type(name) {
            return Ok(());
        }
        self.ensure_kind(name, "scalar", &subgraph.name)?;
        match self.types.entry(name.to_string()).or_insert_with(|| {
            ComposedType::Scalar(ScalarType {
                name: name.to_string(),
                declared_in: Vec::new(),
            })
        }) {
            ComposedType::Scalar(scalar_type) => {
                scalar_type.declared_in.push(subgraph.name.clone());
            }
            _ => unreachable!("non-scalar stored under scalar name"),
        }
        self.first_declared_in
            .entry(name.to_string())
            .or_insert_with(|| subgraph.name.clone());
        Ok(())
    }

    fn merge_enum(
        &mut self,
        subgraph: &SubgraphSchema,
        enum_type: &input::EnumType<'_, String>,
    ) -> Result<(), CompositionError> {
        self.ensure_kind(&enum_type.name, "enum", &subgraph.name)?;
        let values: Vec<String> = enum_type
            .values
            .iter()
            .map(|value| value.name.clone())
            .collect();

        match self.types.get_mut(&enum_type.name) {
            Some(ComposedType::Enum(existing)) => {
                // Same-named enums must be structurally identical across subgraphs.
                let mut left = existing.values.clone();
                let mut right = values.clone();
                left.sort();
                right.sort();
                if left != right {
                    return Err(CompositionError::IncompatibleEnum {
                        type_name: enum_type.name.clone(),
                        left_subgraph: existing
                            .declared_in
                            .first()
                            .cloned()
                            .unwrap_or_default(),
                        right_subgraph: subgraph.name.clone(),
                    });
                }
                existing.declared_in.push(subgraph.name.clone());
            }
            Some(_) => unreachable!("non-enum stored under enum name"),
            None => {
                self.types.insert(
                    enum_type.name.clone(),
                    ComposedType::Enum(EnumType {
                        name: enum_type.name.clone(),
                        values,
                        declared_in: vec![subgraph.name.clone()],
                    }),
                );
                self.first_declared_in
                    .entry(enum_type.name.clone())
                    .or_insert_with(|| subgraph.name.clone());
            }
        }
        Ok(())
    }

    fn merge_union(
        &mut self,
        subgraph: &SubgraphSchema,
        union_type: &input::UnionType<'_, String>,
    ) -> Result<(), CompositionError> {
        if is_federation_internal_type(&union_type.name) {
            return Ok(());
        }
        self.ensure_kind(&union_type.name, "union", &subgraph.name)?;
        match self.types.entry(union_type.name.clone()).or_insert_with(|| {
            ComposedType::Union(UnionType {
                name: union_type.name.clone(),
                members: Vec::new(),
            })
        }) {
            ComposedType::Union(existing) => {
                for member in &union_type.types {
                    if !existing.members.contains(member) {
                        existing.members.push(member.clone());
                    }
                }
            }
            _ => unreachable!("non-union stored under union name"),
        }
        self.first_declared_in
            .entry(union_type.name.clone())
            .or_insert_with(|| subgraph.name.clone());
        Ok(())
    }

    fn merge_input_object(
        &mut self,
        subgraph: &SubgraphSchema,
        input_object: &input::InputObjectType<'_, String>,
    ) -> Result<(), CompositionError> {
        self.ensure_kind(&input_object.name, "input object", &subgraph.name)?;
        match self.types.entry(input_object.name.clone()).or_insert_with(|| {
            ComposedType::InputObject(InputObjectType {
                name: input_object.name.clone(),
                fields: FxHashMap::default(),
            })
        }) {
            ComposedType::InputObject(existing) => {
                for field in &input_object.fields {
                    let type_node: TypeNode = (&field.value_type).into();
                    match existing.fields.get(&field.name) {
                        Some(known) if !known.can_be_merged_with(&type_node) => {
                            return Err(CompositionError::FieldTypeMismatch {
                                type_name: input_object.name.clone(),
                                field_name: field.name.clone(),
                                existing: known.to_string(),
                                existing_subgraph: self
                                    .first_declared_in
                                    .get(&input_object.name)
                                    .cloned()
                                    .unwrap_or_default(),
                                conflicting: type_node.to_string(),
                                conflicting_subgraph: subgraph.name.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            existing.fields.insert(field.name.clone(), type_node);
                        }
                    }
                }
            }
            _ => unreachable!("non-input-object stored under input object name"),
        }
        self.first_declared_in
            .entry(input_object.name.clone())
            .or_insert_with(|| subgraph.name.clone());
        Ok(())
    }

    fn finish(self, subgraphs: &[SubgraphSchema]) -> Result<ComposedSchema, CompositionError> {
        let query_type = "Query".to_string();
        let mutation_type = self
            .types
            .contains_key("Mutation")
            .then(|| "Mutation".to_string());

        if !self.types.contains_key(&query_type) {
            return Err(CompositionError::NoQueryRoot);
        }

        let metadata = build_metadata(&self.types);

        Ok(ComposedSchema {
            types: self.types,
            subgraph_names: subgraphs.iter().map(|s| s.name.clone()).collect(),
            subgraph_endpoint_map: subgraphs
                .iter()
                .map(|s| (s.name.clone(), s.url.clone()))
                .collect(),
            query_type,
            mutation_type,
            metadata,
        })
    }
}

fn build_metadata(types: &FxHashMap<String, ComposedType>) -> SchemaMetadata {
    let mut possible_types: FxHashMap<String, HashSet<String>> = FxHashMap::default();
    let mut enum_values: FxHashMap<String, Vec<String>> = FxHashMap::default();
    let mut type_fields: FxHashMap<String, FxHashMap<String, TypeNode>> = FxHashMap::default();

    for composed_type in types.values() {
        match composed_type {
            ComposedType::Object(object_type) => {
                let fields = type_fields.entry(object_type.name.clone()).or_default();
                for (field_name, field) in &object_type.fields {
                    fields.insert(field_name.clone(), field.type_node.clone());
                }
                for interface_name in &object_type.implements {
                    possible_types
                        .entry(interface_name.clone())
                        .or_default()
                        .insert(object_type.name.clone());
                }
            }
            ComposedType::Enum(enum_type) => {
                enum_values.insert(enum_type.name.clone(), enum_type.values.clone());
            }
            ComposedType::Union(union_type) => {
                possible_types
                    .entry(union_type.name.clone())
                    .or_default()
                    .extend(union_type.members.iter().cloned());
            }
            _ => {}
        }
    }

    SchemaMetadata {
        possible_types,
        enum_values,
        type_fields,
    }
}

fn validate(composed: &ComposedSchema) -> Result<(), CompositionError> {
    for composed_type in composed.types.values() {
        let Some(object_type) = composed_type.as_object() else {
            continue;
        };

        for key in &object_type.keys {
            for selection in &key.fields {
                validate_field_path(composed, object_type, selection).map_err(|field_path| {
                    CompositionError::InvalidKeyFieldPath {
                        type_name: object_type.name.clone(),
                        subgraph: key.subgraphs.first().cloned().unwrap_or_default(),
                        field_path,
                    }
                })?;
            }

            let resolvable = key.subgraphs.iter().any(|subgraph| {
                composed.subgraph_can_resolve_key(&object_type.name, key, subgraph)
            });
            if !resolvable {
                return Err(CompositionError::UnresolvableKey {
                    type_name: object_type.name.clone(),
                    key_fields: display_field_set(&key.fields),
                });
            }
        }

        for field in object_type.fields.values() {
            if let Some(requires) = &field.requires {
                for selection in requires {
                    if !object_type.fields.contains_key(&selection.name) {
                        return Err(CompositionError::UnknownRequiresField {
                            type_name: object_type.name.clone(),
                            field_name: field.name.clone(),
                            subgraph: field.owners.first().cloned().unwrap_or_default(),
                            referenced: selection.name.clone(),
                        });
                    }
                }
            }

            for (subgraph, provides) in &field.provides {
                let provided_type = field.type_node.inner_type();
                let Some(provided_object) = composed.object_type(provided_type) else {
                    continue;
                };
                for selection in provides {
                    if !provided_object.fields.contains_key(&selection.name) {
                        return Err(CompositionError::UnknownProvidesField {
                            type_name: object_type.name.clone(),
                            field_name: field.name.clone(),
                            subgraph: subgraph.clone(),
                            referenced: selection.name.clone(),
                            provided_type: provided_type.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Checks a key field path against the composed type graph. Returns the
/// offending path rendered as a string on failure.
fn validate_field_path(
    composed: &ComposedSchema,
    object_type: &ObjectType,
    selection: &FieldSelection,
) -> Result<(), String> {
    let Some(field) = object_type.fields.get(&selection.name) else {
        return Err(selection.name.clone());
    };

    if selection.selections.is_empty() {
        return Ok(());
    }

    let inner_type = field.type_node.inner_type();
    let Some(inner_object) = composed.object_type(inner_type) else {
        return Err(format!("{} ({} is not an object type)", selection, inner_type));
    };

    for inner_selection in &selection.selections {
        validate_field_path(composed, inner_object, inner_selection)
            .map_err(|inner| format!("{}.{}", selection.name, inner))?;
    }

    Ok(())
}

fn is_federation_internal_type(name: &str) -> bool {
    name.starts_with('_') || name == "Entity"
}

fn is_federation_internal_field(name: &str) -> bool {
    matches!(name, "_entities" | "_service")
}
