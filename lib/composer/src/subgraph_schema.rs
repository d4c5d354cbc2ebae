use graphql_parser::schema as input;

pub type SchemaDocument = input::Document<'static, String>;

/// A single subgraph's schema, parsed from SDL annotated with federation
/// directives. Immutable once constructed; a composition epoch always works
/// against a fixed set of these.
#[derive(Debug)]
pub struct SubgraphSchema {
    pub name: String,
    pub url: String,
    pub document: SchemaDocument,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to parse schema of subgraph '{subgraph}': {reason}")]
pub struct SubgraphSchemaParseError {
    pub subgraph: String,
    pub reason: String,
}

impl SubgraphSchema {
    pub fn parse(
        name: impl Into<String>,
        url: impl Into<String>,
        sdl: &str,
    ) -> Result<Self, SubgraphSchemaParseError> {
        let name = name.into();
        let document = graphql_parser::parse_schema::<String>(sdl)
            .map_err(|err| SubgraphSchemaParseError {
                subgraph: name.clone(),
                reason: err.to_string(),
            })?
            .into_static();

        Ok(Self {
            name,
            url: url.into(),
            document,
        })
    }

    /// Iterates object and interface type definitions, including `extend type`
    /// blocks, which federation subgraphs use to attach fields to types owned
    /// elsewhere.
    pub fn object_like_types(&self) -> impl Iterator<Item = ObjectLikeType<'_>> + '_ {
        self.document.definitions.iter().filter_map(|definition| {
            match definition {
                input::Definition::TypeDefinition(input::TypeDefinition::Object(object_type)) => {
                    Some(ObjectLikeType {
                        name: &object_type.name,
                        directives: &object_type.directives,
                        fields: &object_type.fields,
                        implements: &object_type.implements_interfaces,
                        is_interface: false,
                    })
                }
                input::Definition::TypeDefinition(input::TypeDefinition::Interface(
                    interface_type,
                )) => Some(ObjectLikeType {
                    name: &interface_type.name,
                    directives: &interface_type.directives,
                    fields: &interface_type.fields,
                    implements: &interface_type.implements_interfaces,
                    is_interface: true,
                }),
                input::Definition::TypeExtension(input::TypeExtension::Object(extension)) => {
                    Some(ObjectLikeType {
                        name: &extension.name,
                        directives: &extension.directives,
                        fields: &extension.fields,
                        implements: &extension.implements_interfaces,
                        is_interface: false,
                    })
                }
                _ => None,
            }
        })
    }
}

pub struct ObjectLikeType<'a> {
    pub name: &'a str,
    pub directives: &'a [input::Directive<'static, String>],
    pub fields: &'a [input::Field<'static, String>],
    pub implements: &'a [String],
    pub is_interface: bool,
}
