pub mod compose;
pub mod composed_schema;
pub mod error;
pub mod federation_spec;
pub mod selection;
pub mod subgraph_schema;

pub use compose::compose;
pub use composed_schema::{ComposedSchema, ComposedType, SchemaMetadata, TypeNode};
pub use error::CompositionError;
pub use subgraph_schema::SubgraphSchema;

#[cfg(test)]
mod tests;
