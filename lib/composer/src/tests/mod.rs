use crate::{compose, CompositionError, SubgraphSchema};

fn subgraph(name: &str, sdl: &str) -> SubgraphSchema {
    SubgraphSchema::parse(name, format!("http://{}.local/graphql", name), sdl)
        .expect("test SDL should parse")
}

const PRODUCTS_SDL: &str = r#"
    type Query {
      product(id: ID!): Product
      topProducts: [Product]
    }

    type Product @key(fields: "id") {
      id: ID!
      name: String!
      price: Int
    }
"#;

const REVIEWS_SDL: &str = r#"
    type Product @key(fields: "id") {
      id: ID! @external
      reviews: [Review]
    }

    type Review {
      body: String
      rating: Int
    }
"#;

#[test]
fn composes_entity_across_two_subgraphs() {
    let composed = compose(&[
        subgraph("products", PRODUCTS_SDL),
        subgraph("reviews", REVIEWS_SDL),
    ])
    .expect("composition should succeed");

    let product = composed.object_type("Product").expect("Product exists");
    assert!(product.is_entity());
    assert_eq!(product.keys.len(), 1);
    assert_eq!(product.keys[0].fields[0].name, "id");
    assert_eq!(product.keys[0].subgraphs, vec!["products", "reviews"]);

    let id = &product.fields["id"];
    assert_eq!(id.owners, vec!["products"]);
    assert_eq!(id.external_in, vec!["reviews"]);

    let reviews = &product.fields["reviews"];
    assert_eq!(reviews.owners, vec!["reviews"]);

    assert_eq!(
        composed.subgraph_endpoint_map["products"],
        "http://products.local/graphql"
    );
}

#[test]
fn multi_owner_field_preserves_declaration_order() {
    let composed = compose(&[
        subgraph(
            "a",
            r#"
            type Query { thing: Thing }
            type Thing @key(fields: "id") { id: ID! label: String }
            "#,
        ),
        subgraph(
            "b",
            r#"
            type Thing @key(fields: "id") { id: ID! @external label: String }
            "#,
        ),
    ])
    .expect("composition should succeed");

    let label = composed.field("Thing", "label").expect("label exists");
    assert_eq!(label.owners, vec!["a", "b"]);
}

#[test]
fn rejects_conflicting_field_types() {
    let err = compose(&[
        subgraph("a", "type Query { x: X } type X { v: Int }"),
        subgraph("b", "type X { v: String }"),
    ])
    .expect_err("conflicting field types must fail composition");

    match err {
        CompositionError::FieldTypeMismatch {
            type_name,
            field_name,
            ..
        } => {
            assert_eq!(type_name, "X");
            assert_eq!(field_name, "v");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!compose(&[subgraph("a", "type Query { x: X } type X { v: Int }")])
        .expect("single subgraph composes")
        .types
        .is_empty());
}

#[test]
fn rejects_structurally_different_enums() {
    let err = compose(&[
        subgraph("a", "type Query { s: Status } enum Status { OPEN CLOSED }"),
        subgraph("b", "enum Status { OPEN }"),
    ])
    .expect_err("enum mismatch must fail composition");

    assert!(matches!(err, CompositionError::IncompatibleEnum { ref type_name, .. } if type_name == "Status"));
    assert_eq!(err.offending_types(), vec!["Status"]);
}

#[test]
fn accepts_identical_enums_regardless_of_value_order() {
    compose(&[
        subgraph("a", "type Query { s: Status } enum Status { OPEN CLOSED }"),
        subgraph("b", "enum Status { CLOSED OPEN }"),
    ])
    .expect("value order must not matter");
}

#[test]
fn rejects_conflicting_type_kinds() {
    let err = compose(&[
        subgraph("a", "type Query { x: Conflicted } type Conflicted { id: ID }"),
        subgraph("b", "enum Conflicted { A }"),
    ])
    .expect_err("kind conflict must fail composition");

    assert!(matches!(
        err,
        CompositionError::ConflictingTypeKinds { ref type_name, .. } if type_name == "Conflicted"
    ));
}

#[test]
fn rejects_invalid_key_field_path() {
    let err = compose(&[subgraph(
        "a",
        r#"
        type Query { p: Product }
        type Product @key(fields: "sku") { id: ID! }
        "#,
    )])
    .expect_err("key naming a missing field must fail");

    assert!(matches!(
        err,
        CompositionError::InvalidKeyFieldPath { ref field_path, .. } if field_path == "sku"
    ));
}

#[test]
fn accepts_nested_key_field_path() {
    compose(&[subgraph(
        "a",
        r#"
        type Query { p: Product }
        type Product @key(fields: "dimensions { size }") {
          id: ID!
          dimensions: Dimensions!
        }
        type Dimensions { size: Int weight: Int }
        "#,
    )])
    .expect("nested key paths are valid");
}

#[test]
fn rejects_requires_on_unknown_field() {
    let err = compose(&[
        subgraph(
            "a",
            r#"
            type Query { p: Product }
            type Product @key(fields: "id") { id: ID! weight: Int }
            "#,
        ),
        subgraph(
            "b",
            r#"
            type Product @key(fields: "id") {
              id: ID! @external
              shippingEstimate: Int @requires(fields: "mass")
            }
            "#,
        ),
    ])
    .expect_err("@requires must reference an existing field");

    assert!(matches!(
        err,
        CompositionError::UnknownRequiresField { ref referenced, .. } if referenced == "mass"
    ));
}

#[test]
fn records_requires_selection_on_composed_field() {
    let composed = compose(&[
        subgraph(
            "a",
            r#"
            type Query { p: Product }
            type Product @key(fields: "id") { id: ID! weight: Int }
            "#,
        ),
        subgraph(
            "b",
            r#"
            type Product @key(fields: "id") {
              id: ID! @external
              weight: Int @external
              shippingEstimate: Int @requires(fields: "weight")
            }
            "#,
        ),
    ])
    .expect("composition should succeed");

    let field = composed
        .field("Product", "shippingEstimate")
        .expect("field exists");
    let requires = field.requires.as_ref().expect("requires recorded");
    assert_eq!(requires[0].name, "weight");
}

#[test]
fn rejects_provides_on_unknown_field() {
    let err = compose(&[subgraph(
        "a",
        r#"
        type Query { feed: [Post] }
        type Post @key(fields: "id") {
          id: ID!
          author: Author @provides(fields: "nickname")
        }
        type Author @key(fields: "id") { id: ID! name: String }
        "#,
    )])
    .expect_err("@provides must reference an existing field");

    assert!(matches!(
        err,
        CompositionError::UnknownProvidesField { ref referenced, .. } if referenced == "nickname"
    ));
}

#[test]
fn fails_without_query_root() {
    let err = compose(&[subgraph("a", "type Product { id: ID! }")])
        .expect_err("a graph without Query cannot compose");
    assert!(matches!(err, CompositionError::NoQueryRoot));
}

#[test]
fn fails_on_empty_input() {
    assert!(matches!(
        compose(&[]),
        Err(CompositionError::NoSubgraphs)
    ));
}

#[test]
fn builds_possible_types_metadata() {
    let composed = compose(&[subgraph(
        "a",
        r#"
        type Query { media: [Media] }
        union Media = Book | Movie
        type Book { title: String }
        type Movie { title: String }
        "#,
    )])
    .expect("composition should succeed");

    let possible = &composed.metadata.possible_types["Media"];
    assert!(possible.contains("Book"));
    assert!(possible.contains("Movie"));
    assert!(composed
        .metadata
        .entity_satisfies_type_condition("Book", "Media"));
    assert!(!composed
        .metadata
        .entity_satisfies_type_condition("Song", "Media"));
}

#[test]
fn ignores_federation_internal_machinery() {
    let composed = compose(&[subgraph(
        "a",
        r#"
        type Query {
          product: Product
          _service: _Service
        }
        type Product @key(fields: "id") { id: ID! }
        type _Service { sdl: String }
        "#,
    )])
    .expect("composition should succeed");

    assert!(!composed.types.contains_key("_Service"));
    assert!(!composed
        .object_type("Query")
        .expect("Query exists")
        .fields
        .contains_key("_service"));
}
