use apollo_compiler::name;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::compiler::compile_operation;
use crate::compiler::ir::FieldMergingConfig;
use crate::compiler::ir::FieldPath;
use crate::compiler::ir::FragmentSource;
use crate::compiler::CompiledOperation;
use crate::compiler::Operation;
use crate::error::CompilationError;
use crate::schema::ClientSchema;

const SCHEMA: &str = r#"
type Query {
  allAnimals: [Animal!]!
}

type Mutation {
  adoptAnimal(id: ID!): Animal
}

interface Animal {
  id: ID!
  species: String!
  height: Height!
  predators: [Animal!]!
}

interface Pet implements Animal {
  id: ID!
  species: String!
  height: Height!
  predators: [Animal!]!
  humanName: String
}

type Height {
  meters: Int!
  feet: Int!
}

interface Furry {
  furLength: Int!
}

type Cat implements Animal & Pet & Furry {
  id: ID!
  species: String!
  height: Height!
  predators: [Animal!]!
  humanName: String
  isJellicle: Boolean!
  furLength: Int!
}

type Dog implements Animal & Pet {
  id: ID!
  species: String!
  height: Height!
  predators: [Animal!]!
  humanName: String
  birthdate: String!
}

type Bird implements Animal & Furry {
  id: ID!
  species: String!
  height: Height!
  predators: [Animal!]!
  wingspan: Float!
  furLength: Int!
}
"#;

fn test_schema() -> ClientSchema {
    ClientSchema::parse(SCHEMA, "schema.graphql").expect("valid test schema")
}

fn compile(document: &str) -> Result<CompiledOperation, CompilationError> {
    compile_with_config(document, &FieldMergingConfig::ALL)
}

fn compile_with_config(
    document: &str,
    config: &FieldMergingConfig,
) -> Result<CompiledOperation, CompilationError> {
    let operation = Operation::parse(test_schema(), document, "operation.graphql", None)?;
    compile_operation(&operation, config)
}

#[test]
fn deferred_inline_fragment_compiles_into_scopes_and_manifest() {
    let compiled = compile(
        r#"
        query AllAnimals {
          allAnimals {
            __typename
            id
            ...HeightInMeters
            ... on Cat @defer(label: "c") {
              isJellicle
            }
          }
        }

        fragment HeightInMeters on Animal {
          height {
            meters
          }
        }
        "#,
    )
    .expect("operation compiles");

    let animals = compiled
        .root
        .children
        .get("allAnimals")
        .expect("allAnimals entity");
    assert_eq!(animals.declared_type, name!("Animal"));
    assert_eq!(animals.path, FieldPath::from_iter(["allAnimals"]));

    // The fragment on Animal covers every possible animal, so its fields land
    // in the unconditional scope, which therefore fulfills the fragment.
    let ancestor = animals.unconditional_scope().expect("unconditional scope");
    assert_eq!(
        ancestor
            .fields
            .response_keys()
            .map(|key| key.as_str())
            .collect::<Vec<_>>(),
        ["__typename", "id", "height"],
    );
    let height_fragment = compiled
        .fragments
        .get(&FragmentSource::Named(name!("HeightInMeters")))
        .expect("interned fragment");
    assert!(ancestor.fulfilled_fragments.contains(&height_fragment));

    let cat = animals.scope("Cat").expect("Cat scope");
    let is_jellicle = cat.fields.get("isJellicle").expect("deferred field");
    assert!(is_jellicle.deferred);
    for folded in ["__typename", "id", "height"] {
        let field = cat.fields.get(folded).expect("folded ancestor field");
        assert!(!field.deferred, "{folded} must not be deferred");
    }

    assert_eq!(compiled.defer_manifest.len(), 1);
    let (identifier, target) = compiled
        .defer_manifest
        .first()
        .expect("one manifest entry");
    assert_eq!(identifier.label.as_deref(), Some("c"));
    assert_eq!(identifier.field_path, FieldPath::from_iter(["allAnimals"]));
    assert_eq!(target.type_condition, Some(name!("Cat")));

    // The fragment's sub-selection compiles into a child entity.
    let height = animals.children.get("height").expect("height entity");
    assert_eq!(
        height.path,
        FieldPath::from_iter(["allAnimals", "height"])
    );
    assert!(height
        .unconditional_scope()
        .is_some_and(|scope| scope.fields.contains_key("meters")));
}

#[test]
fn undefined_field_is_rejected() {
    let error = compile("{ allAnimals { paws } }").expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::UndefinedField {
            type_name: name!("Animal"),
            field_name: name!("paws"),
        }
    );
}

#[test]
fn conflicting_aliases_are_rejected() {
    let error = compile("{ allAnimals { a: species a: id } }").expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::AmbiguousField {
            type_name: name!("Animal"),
            response_key: name!("a"),
        }
    );
}

#[test]
fn conflicting_arguments_are_rejected() {
    let error = compile(
        r#"
        mutation {
          adoptAnimal(id: "1") { id }
          adoptAnimal(id: "2") { species }
        }
        "#,
    )
    .expect_err("must not compile");
    assert!(matches!(
        error,
        CompilationError::AmbiguousField { response_key, .. } if response_key == "adoptAnimal"
    ));
}

#[test]
fn identical_arguments_merge() {
    let compiled = compile(
        r#"
        mutation {
          adoptAnimal(id: "1") { id }
          adoptAnimal(id: "1") { species }
        }
        "#,
    )
    .expect("identical selections merge");
    let adopt = compiled.root.children.get("adoptAnimal").expect("entity");
    assert_eq!(
        adopt
            .unconditional_scope()
            .expect("scope")
            .fields
            .response_keys()
            .map(|key| key.as_str())
            .collect::<Vec<_>>(),
        ["id", "species"],
    );
}

#[test]
fn unknown_fragment_is_rejected() {
    let error = compile("{ allAnimals { ...Missing } }").expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::UndefinedFragment {
            name: name!("Missing"),
        }
    );
}

#[test]
fn unknown_type_condition_is_rejected() {
    let error = compile("{ allAnimals { ... on Spaceship { id } } }").expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::UnknownType {
            name: name!("Spaceship"),
        }
    );
}

#[test]
fn unknown_operation_name_is_rejected() {
    let error = Operation::parse(
        test_schema(),
        "query Named { allAnimals { id } }",
        "operation.graphql",
        Some("Other"),
    )
    .expect_err("must not resolve");
    assert_eq!(
        error,
        CompilationError::UnknownOperation {
            name: Some("Other".to_string()),
        }
    );
}

#[test]
fn statically_skipped_selections_are_dropped() {
    let compiled = compile(
        r#"
        query ($withId: Boolean!) {
          allAnimals {
            id @include(if: $withId)
            species @skip(if: true)
            height { meters }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let scope = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.unconditional_scope())
        .expect("unconditional scope");

    assert!(scope.fields.get("species").is_none());
    assert!(scope.fields.get("id").expect("id field").conditional);
    assert!(!scope.fields.get("height").expect("height field").conditional);
}

#[test]
fn conditional_source_weakens_merged_field() {
    // Merged from an unconditional and a variable-gated source, the field
    // must come out optional.
    let compiled = compile(
        r#"
        query ($extra: Boolean!) {
          allAnimals {
            id
            ... @include(if: $extra) {
              id
            }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let scope = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.unconditional_scope())
        .expect("unconditional scope");
    assert!(scope.fields.get("id").expect("id field").conditional);
}

#[rstest]
#[case::jellicle_first(
    "{ allAnimals { ... on Cat { isJellicle } ... on Cat { humanName } } }"
)]
#[case::human_name_first(
    "{ allAnimals { ... on Cat { humanName } ... on Cat { isJellicle } } }"
)]
fn sibling_blocks_on_one_condition_merge_to_the_same_field_set(#[case] document: &str) {
    let compiled = compile(document).expect("operation compiles");
    let cat = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.scope("Cat"))
        .expect("Cat scope");
    let mut keys: Vec<_> = cat.fields.response_keys().map(|key| key.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["humanName", "isJellicle"]);
}

#[test]
fn merged_fields_keep_authored_order() {
    let compiled = compile(
        "{ allAnimals { ... on Cat { isJellicle } ... on Cat { humanName isJellicle } } }",
    )
    .expect("operation compiles");
    let cat = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.scope("Cat"))
        .expect("Cat scope");
    assert_eq!(
        cat.fields
            .response_keys()
            .map(|key| key.as_str())
            .collect::<Vec<_>>(),
        ["isJellicle", "humanName"],
    );
}

#[test]
fn sibling_scope_folds_into_narrower_condition() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ... on Pet { humanName }
            ... on Cat { isJellicle }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let animals = compiled.root.children.get("allAnimals").expect("entity");

    // Every Cat is a Pet, so the Pet scope folds into Cat and Cat fulfills
    // the Pet type condition. The reverse does not hold.
    let cat = animals.scope("Cat").expect("Cat scope");
    assert!(cat.fields.contains_key("humanName"));
    let pet_condition = compiled
        .fragments
        .get(&FragmentSource::TypeCondition {
            path: FieldPath::from_iter(["allAnimals"]),
            condition: name!("Pet"),
        })
        .expect("interned Pet condition");
    assert!(cat.fulfilled_fragments.contains(&pet_condition));

    let pet = animals.scope("Pet").expect("Pet scope");
    assert!(!pet.fields.contains_key("isJellicle"));
    let cat_condition = compiled
        .fragments
        .get(&FragmentSource::TypeCondition {
            path: FieldPath::from_iter(["allAnimals"]),
            condition: name!("Cat"),
        })
        .expect("interned Cat condition");
    assert!(!pet.fulfilled_fragments.contains(&cat_condition));
}

#[rstest]
#[case::nothing_folds(FieldMergingConfig::NONE, vec!["isJellicle"])]
#[case::ancestors_only(
    FieldMergingConfig { ancestors: true, siblings: false, named_fragments: true },
    vec!["id", "isJellicle"],
)]
#[case::everything_folds(FieldMergingConfig::ALL, vec!["id", "humanName", "isJellicle"])]
fn merging_config_controls_folding(
    #[case] config: FieldMergingConfig,
    #[case] expected: Vec<&str>,
) {
    let compiled = compile_with_config(
        r#"
        {
          allAnimals {
            id
            ... on Pet { humanName }
            ... on Cat { isJellicle }
          }
        }
        "#,
        &config,
    )
    .expect("operation compiles");
    let cat = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.scope("Cat"))
        .expect("Cat scope");
    let mut keys: Vec<_> = cat.fields.response_keys().map(|key| key.as_str()).collect();
    keys.sort_unstable();
    let mut expected = expected;
    expected.sort_unstable();
    assert_eq!(keys, expected);
}

#[test]
fn fragment_fields_stay_out_of_folding_when_disabled() {
    let compiled = compile_with_config(
        r#"
        {
          allAnimals {
            id
            ...HeightInMeters
            ... on Cat { isJellicle }
          }
        }

        fragment HeightInMeters on Animal {
          height { meters }
        }
        "#,
        &FieldMergingConfig {
            ancestors: true,
            siblings: true,
            named_fragments: false,
        },
    )
    .expect("operation compiles");
    let cat = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.scope("Cat"))
        .expect("Cat scope");
    assert!(cat.fields.contains_key("id"));
    assert!(
        !cat.fields.contains_key("height"),
        "fragment-sourced fields must not fold",
    );
}

#[test]
fn unsatisfiable_nested_conditions_are_dropped() {
    // No concrete type is both a Cat and a Dog, so the inner block can never
    // produce data and must not leak into any scope.
    let compiled = compile(
        r#"
        {
          allAnimals {
            id
            ... on Cat {
              ... on Dog {
                birthdate
              }
            }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let animals = compiled.root.children.get("allAnimals").expect("entity");
    assert!(animals.scope("Dog").is_none());
    assert!(animals
        .scopes
        .values()
        .all(|scope| !scope.fields.contains_key("birthdate")));
}

#[test]
fn defer_inside_an_unsatisfiable_branch_is_dropped() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            id
            ... on Cat {
              ... on Dog @defer(label: "never") {
                birthdate
              }
            }
          }
        }
        "#,
    )
    .expect("operation compiles");
    assert!(compiled.defer_manifest.is_empty());
}

#[test]
fn partially_overlapping_conditions_narrow_to_their_intersection() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ... on Pet {
              ... on Furry {
                furLength
              }
            }
            ... on Cat { isJellicle }
            ... on Bird { wingspan furLength }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let animals = compiled.root.children.get("allAnimals").expect("entity");
    let furry_condition = compiled
        .fragments
        .get(&FragmentSource::TypeCondition {
            path: FieldPath::from_iter(["allAnimals"]),
            condition: name!("Furry"),
        })
        .expect("interned Furry condition");

    // Only furry pets (cats) satisfy the nested block, so it folds into the
    // Cat scope and Cat fulfills it.
    let cat = animals.scope("Cat").expect("Cat scope");
    assert!(cat.fields.contains_key("furLength"));
    assert!(cat.fulfilled_fragments.contains(&furry_condition));

    // A bird is furry but not a pet: selecting the same fields on Bird must
    // not count as fulfilling the nested block.
    let bird = animals.scope("Bird").expect("Bird scope");
    assert!(bird.fields.contains_key("furLength"));
    assert!(!bird.fulfilled_fragments.contains(&furry_condition));
}

#[test]
fn repeated_spread_of_one_fragment_is_a_noop() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ...HeightInMeters
            ...HeightInMeters
          }
        }

        fragment HeightInMeters on Animal {
          height { meters }
        }
        "#,
    )
    .expect("operation compiles");
    let scope = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.unconditional_scope())
        .expect("unconditional scope");
    assert_eq!(
        scope
            .fields
            .response_keys()
            .map(|key| key.as_str())
            .collect::<Vec<_>>(),
        ["height"]
    );
}

#[rstest]
#[case::deferred_first(
    r#"
    {
      allAnimals {
        ...HeightInMeters @defer(label: "h")
        ...HeightInMeters
      }
    }

    fragment HeightInMeters on Animal {
      height { meters }
    }
    "#
)]
#[case::plain_first(
    r#"
    {
      allAnimals {
        ...HeightInMeters
        ...HeightInMeters @defer(label: "h")
      }
    }

    fragment HeightInMeters on Animal {
      height { meters }
    }
    "#
)]
fn plain_spread_cancels_a_deferred_spread_in_either_order(#[case] document: &str) {
    // One spread delivers the fields immediately, so they are never deferred
    // and nothing is left for the manifest, whichever spread comes first.
    let compiled = compile(document).expect("operation compiles");
    assert!(compiled.defer_manifest.is_empty());
    let scope = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.unconditional_scope())
        .expect("unconditional scope");
    assert!(!scope.fields.get("height").expect("height field").deferred);
}

#[test]
fn repeatedly_deferred_spread_keeps_one_manifest_entry() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ...HeightInMeters @defer(label: "h")
            ...HeightInMeters @defer(label: "h")
          }
        }

        fragment HeightInMeters on Animal {
          height { meters }
        }
        "#,
    )
    .expect("operation compiles");
    assert_eq!(compiled.defer_manifest.len(), 1);
    let scope = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.unconditional_scope())
        .expect("unconditional scope");
    assert!(scope.fields.get("height").expect("height field").deferred);
}

#[test]
fn nested_selections_compile_into_child_entities() {
    let compiled = compile("{ allAnimals { predators { species predators { id } } } }")
        .expect("operation compiles");
    let predators = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.children.get("predators"))
        .expect("predators entity");
    assert_eq!(
        predators.path,
        FieldPath::from_iter(["allAnimals", "predators"])
    );
    let nested = predators.children.get("predators").expect("nested entity");
    assert_eq!(
        nested.path,
        FieldPath::from_iter(["allAnimals", "predators", "predators"])
    );
}

#[test]
fn duplicate_defer_labels_at_one_path_are_rejected() {
    let error = compile(
        r#"
        {
          allAnimals {
            ... on Dog @defer(label: "a") { humanName }
            ... on Dog @defer(label: "a") { birthdate }
          }
        }
        "#,
    )
    .expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::DuplicateDeferLabel {
            label: Some("a".to_string()),
            path: FieldPath::from_iter(["allAnimals"]),
        }
    );
}

#[test]
fn duplicate_unlabeled_defers_at_one_path_are_rejected() {
    let error = compile(
        r#"
        {
          allAnimals {
            ... on Dog @defer { humanName }
            ... on Dog @defer { birthdate }
          }
        }
        "#,
    )
    .expect_err("must not compile");
    assert_eq!(
        error,
        CompilationError::DuplicateDeferLabel {
            label: None,
            path: FieldPath::from_iter(["allAnimals"]),
        }
    );
}

#[test]
fn distinct_defer_labels_at_one_path_compile() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ... on Dog @defer(label: "a") { humanName }
            ... on Dog @defer(label: "b") { birthdate }
          }
        }
        "#,
    )
    .expect("operation compiles");
    let labels: Vec<_> = compiled
        .defer_manifest
        .keys()
        .map(|identifier| identifier.label.as_deref())
        .collect();
    assert_eq!(labels, [Some("a"), Some("b")]);
}

#[test]
fn statically_disabled_defer_is_a_plain_fragment() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            ... on Cat @defer(if: false, label: "c") { isJellicle }
          }
        }
        "#,
    )
    .expect("operation compiles");
    assert!(compiled.defer_manifest.is_empty());
    let cat = compiled
        .root
        .children
        .get("allAnimals")
        .and_then(|entity| entity.scope("Cat"))
        .expect("Cat scope");
    assert!(!cat.fields.get("isJellicle").expect("field").deferred);
}

#[test]
fn defer_on_a_mutation_root_is_rejected() {
    let error = compile(
        r#"
        mutation {
          ... @defer(label: "late") {
            adoptAnimal(id: "1") { id }
          }
        }
        "#,
    )
    .expect_err("must not compile");
    assert!(matches!(
        error,
        CompilationError::InvalidDeferPlacement { root_kind } if root_kind.to_string() == "mutation"
    ));
}

#[test]
fn deferred_named_fragment_resolves_through_the_manifest() {
    let compiled = compile(
        r#"
        {
          allAnimals {
            id
            ...PetDetails @defer(label: "details")
          }
        }

        fragment PetDetails on Pet {
          humanName
        }
        "#,
    )
    .expect("operation compiles");
    let (identifier, target) = compiled
        .defer_manifest
        .resolve(Some("details"), &FieldPath::from_iter(["allAnimals"]))
        .expect("manifest entry");
    assert_eq!(identifier.label.as_deref(), Some("details"));
    assert_eq!(
        compiled.fragments.source(target.fragment),
        Some(&FragmentSource::Named(name!("PetDetails"))),
    );
}
