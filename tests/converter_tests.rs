// tests/converter_tests.rs

use odata_sql::alias::AliasSet;
use odata_sql::ast::{ArithmeticOp, ComparisonOp, LambdaKind, LogicalOp};
use odata_sql::converter::{self, Converter, ExpressionResolver};
use odata_sql::error::{QueryError, SemanticError};
use odata_sql::filter::{FilterExpression, FilterKind, Function, ScalarExpr, TypeName};
use odata_sql::model::{Catalog, EntityModel, MetadataProvider, NavigationModel, PrimitiveType, PropertyModel};
use odata_sql::parser::with_parsed;
use odata_sql::pool::Pools;
use odata_sql::value::Literal;

fn catalog() -> Catalog {
    let products = EntityModel::new("Products", "products")
        .with(PropertyModel::new("Id", "id", PrimitiveType::Int32).key())
        .with(PropertyModel::new("Name", "name", PrimitiveType::String).searchable())
        .with(PropertyModel::new("Price", "price", PrimitiveType::Decimal))
        .with(PropertyModel::new("Rating", "rating", PrimitiveType::Int32))
        .with(PropertyModel::new("IsActive", "is_active", PrimitiveType::Boolean))
        .with(PropertyModel::new("Status", "status", PrimitiveType::Int32).flags())
        .with(PropertyModel::new("CreatedAt", "created_at", PrimitiveType::DateTimeOffset))
        .with(PropertyModel::new("Location", "location", PrimitiveType::Geography))
        .with(PropertyModel::new("UnitCount", "unit_count", PrimitiveType::Int32).serialized_as("units"))
        .with(
            PropertyModel::new("Category", "category_id", PrimitiveType::Int32).navigation(NavigationModel {
                target_entity: Some("Categories".into()),
                target_table: "categories".into(),
                source_column: "category_id".into(),
                target_column: "id".into(),
                collection: false,
                value_column: None,
            }),
        )
        .with(
            PropertyModel::new("Tags", "id", PrimitiveType::String).navigation(NavigationModel {
                target_entity: None,
                target_table: "product_tags".into(),
                source_column: "id".into(),
                target_column: "product_id".into(),
                collection: true,
                value_column: Some("tag".into()),
            }),
        )
        .with(
            PropertyModel::new("Orders", "id", PrimitiveType::Int32).navigation(NavigationModel {
                target_entity: Some("Orders".into()),
                target_table: "orders".into(),
                source_column: "id".into(),
                target_column: "product_id".into(),
                collection: true,
                value_column: None,
            }),
        );

    let categories = EntityModel::new("Categories", "categories")
        .with(PropertyModel::new("Id", "id", PrimitiveType::Int32).key())
        .with(PropertyModel::new("Name", "category_name", PrimitiveType::String));

    let orders = EntityModel::new("Orders", "orders")
        .with(PropertyModel::new("Id", "id", PrimitiveType::Int32).key())
        .with(PropertyModel::new("Amount", "amount", PrimitiveType::Decimal));

    Catalog::new().with(products).with(categories).with(orders)
}

fn resolve_with(input: &str, aliases: &AliasSet, max_in: Option<usize>) -> Result<FilterExpression, QueryError> {
    let catalog = catalog();
    let model = catalog.entity("Products");
    let pools = Pools::new(64);
    let converter = Converter::new(model, aliases, max_in).with_catalog(&catalog);
    let result = ExpressionResolver::new(&pools, converter).filter(input);
    assert_eq!(pools.nodes.outstanding(), 0, "leaked nodes for: {}", input);
    result
}

fn resolve(input: &str) -> FilterExpression {
    resolve_with(input, &AliasSet::new(), Some(1000)).unwrap()
}

fn semantic_err(input: &str) -> SemanticError {
    match resolve_with(input, &AliasSet::new(), Some(1000)) {
        Err(QueryError::Semantic(e)) => e,
        other => panic!("expected semantic error for {}, got {:?}", input, other),
    }
}

fn lenient(input: &str) -> Result<FilterExpression, QueryError> {
    let pools = Pools::new(64);
    let aliases = AliasSet::new();
    ExpressionResolver::new(&pools, Converter::new(None, &aliases, None)).filter(input)
}

// ============================================================================
// Properties and Comparisons
// ============================================================================

#[test]
fn test_property_binds_column_and_type() {
    let expr = resolve("Price gt 10");
    let FilterKind::Compare { left, op, right } = expr.kind else {
        panic!("expected comparison");
    };
    assert_eq!(op, ComparisonOp::Gt);
    let property = left.property().unwrap();
    assert_eq!(property.column(), "price");
    assert_eq!(property.ty, Some(PrimitiveType::Decimal));
    assert_eq!(right, ScalarExpr::Literal(Literal::Integer(10)));
}

#[test]
fn test_resolve_parsed_tree() {
    let pools = Pools::new(16);
    let catalog = catalog();
    let aliases = AliasSet::new();
    let expr = with_parsed("Price gt 10", &pools, |node| {
        converter::resolve(node, catalog.entity("Products"), &aliases, None).map_err(QueryError::from)
    })
    .unwrap();

    assert!(matches!(expr.kind, FilterKind::Compare { op: ComparisonOp::Gt, .. }));
    assert_eq!(pools.nodes.outstanding(), 0);
}

#[test]
fn test_serialized_name_resolves_to_declared_property() {
    let expr = resolve("units gt 2");
    assert_eq!(expr.property_names(), vec!["UnitCount"]);
}

#[test]
fn test_unknown_property() {
    let err = semantic_err("Missing eq 1");
    assert_eq!(
        err,
        SemanticError::UnknownProperty {
            name: "Missing".to_string(),
            offset: Some(0),
        }
    );
}

#[test]
fn test_it_prefix_is_stripped() {
    assert_eq!(resolve("$it/Price gt 10"), resolve("Price gt 10"));
}

#[test]
fn test_not_sets_negated_flag() {
    let expr = resolve("not (Price gt 10)");
    assert!(expr.negated);
    assert!(matches!(expr.kind, FilterKind::Compare { .. }));
}

#[test]
fn test_double_negation_cancels() {
    let expr = resolve("not not IsActive");
    assert!(!expr.negated);
}

#[test]
fn test_logical_structure() {
    let expr = resolve("IsActive and (Price gt 1 or Rating lt 3)");
    let FilterKind::Logical { op, right, .. } = expr.kind else {
        panic!("expected logical");
    };
    assert_eq!(op, LogicalOp::And);
    assert!(matches!(right.kind, FilterKind::Logical { op: LogicalOp::Or, .. }));
}

#[test]
fn test_boolean_property_is_predicate() {
    let expr = resolve("IsActive");
    assert!(matches!(expr.kind, FilterKind::Predicate(ScalarExpr::Property(_))));
}

#[test]
fn test_non_boolean_property_is_not_a_predicate() {
    assert!(matches!(semantic_err("Price"), SemanticError::NotBoolean { .. }));
    assert!(matches!(semantic_err("Price add 1"), SemanticError::NotBoolean { .. }));
    assert!(matches!(semantic_err("'x'"), SemanticError::NotBoolean { .. }));
}

#[test]
fn test_boolean_literal_is_constant() {
    assert_eq!(resolve("true").kind, FilterKind::Constant(true));
}

#[test]
fn test_nested_arithmetic() {
    let expr = resolve("(Price add 10) mul 2 gt 100");
    let FilterKind::Compare { left, .. } = expr.kind else {
        panic!("expected comparison");
    };
    let ScalarExpr::Arithmetic { op, left, .. } = left else {
        panic!("expected arithmetic");
    };
    assert_eq!(op, ArithmeticOp::Mul);
    assert!(matches!(*left, ScalarExpr::Arithmetic { op: ArithmeticOp::Add, .. }));
}

#[test]
fn test_integer_overflow_against_integer_property() {
    let err = semantic_err("Rating eq 9223372036854775808");
    assert!(matches!(err, SemanticError::NumericOverflow { ref property, .. } if property == "Rating"));
}

#[test]
fn test_large_decimal_against_decimal_property_is_fine() {
    resolve("Price eq 9223372036854775808");
}

// ============================================================================
// Membership and Flags
// ============================================================================

#[test]
fn test_in_list_resolves_literals() {
    let expr = resolve("Name in ('a', 'b')");
    let FilterKind::In { values, .. } = expr.kind else {
        panic!("expected in");
    };
    assert_eq!(values, vec![Literal::String("a".into()), Literal::String("b".into())]);
}

#[test]
fn test_in_list_requires_literals() {
    assert!(matches!(semantic_err("Name in (Name, 'b')"), SemanticError::MalformedIn { .. }));
}

#[test]
fn test_in_list_size_limit() {
    let err = resolve_with("Rating in (1, 2, 3)", &AliasSet::new(), Some(2)).unwrap_err();
    assert_eq!(err, QueryError::Semantic(SemanticError::InListTooLarge { size: 3, max: 2 }));

    resolve_with("Rating in (1, 2, 3)", &AliasSet::new(), None).unwrap();
}

#[test]
fn test_has_on_flags_property() {
    let expr = resolve("Status has 4");
    assert!(matches!(expr.kind, FilterKind::Has { flag: Literal::Integer(4), .. }));
}

#[test]
fn test_has_prefix_and_infix_forms_match() {
    assert_eq!(resolve("Status has 1"), resolve("has(Status, 1)"));
}

#[test]
fn test_has_on_plain_property_is_rejected() {
    assert!(matches!(semantic_err("Rating has 4"), SemanticError::WrongArgumentKind { .. }));
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_predicate_function() {
    let expr = resolve("contains(Name, 'milk')");
    assert!(matches!(
        expr.kind,
        FilterKind::Predicate(ScalarExpr::Function {
            function: Function::Contains,
            ..
        })
    ));
}

#[test]
fn test_function_names_are_case_insensitive() {
    assert_eq!(resolve("ToLower(Name) eq 'x'"), resolve("tolower(Name) eq 'x'"));
}

#[test]
fn test_wrong_arity() {
    let err = semantic_err("tolower(Name, Name) eq 'x'");
    assert!(matches!(err, SemanticError::WrongArity { found: 2, .. }));

    let err = semantic_err("substring(Name) eq 'x'");
    assert!(matches!(err, SemanticError::WrongArity { found: 1, .. }));
}

#[test]
fn test_wrong_operand_type() {
    assert!(matches!(semantic_err("year(Name) eq 2024"), SemanticError::WrongArgumentKind { .. }));
    assert!(matches!(semantic_err("length(Price) gt 1"), SemanticError::WrongArgumentKind { .. }));
}

#[test]
fn test_substring_rejects_negative_start() {
    assert!(matches!(
        semantic_err("substring(Name, -1) eq 'x'"),
        SemanticError::WrongArgumentKind { .. }
    ));
}

#[test]
fn test_unknown_function() {
    assert!(matches!(semantic_err("frobnicate(Name)"), SemanticError::Unsupported(_)));
}

#[test]
fn test_spatial_function_requires_literal() {
    resolve("geo.intersects(Location, geography'POLYGON((0 0,1 0,1 1,0 0))')");
    assert!(matches!(
        semantic_err("geo.distance(Location, Name) lt 10"),
        SemanticError::WrongArgumentKind { .. }
    ));
}

#[test]
fn test_cast_and_isof() {
    let expr = resolve("cast(Rating, Edm.String) eq '5'");
    let FilterKind::Compare { left, .. } = expr.kind else {
        panic!("expected comparison");
    };
    assert!(matches!(
        left,
        ScalarExpr::Cast {
            target: TypeName::Primitive(PrimitiveType::String),
            ..
        }
    ));

    let expr = resolve("isof(Shop.Products)");
    assert!(matches!(
        expr.kind,
        FilterKind::IsOf {
            operand: None,
            target: TypeName::EntityType(_)
        }
    ));
}

#[test]
fn test_invalid_type_name() {
    assert_eq!(
        semantic_err("isof(Name, NotAType)"),
        SemanticError::InvalidTypeName("NotAType".to_string())
    );
}

// ============================================================================
// Navigation and Lambdas
// ============================================================================

#[test]
fn test_single_valued_navigation_path() {
    let expr = resolve("Category/Name eq 'Dairy'");
    let FilterKind::Compare { left, .. } = expr.kind else {
        panic!("expected comparison");
    };
    let ScalarExpr::NavigationProperty { navigation, property } = left else {
        panic!("expected navigation property");
    };
    assert_eq!(navigation, "Category");
    assert_eq!(property.column(), "category_name");
}

#[test]
fn test_collection_navigation_outside_lambda_is_rejected() {
    assert!(matches!(
        semantic_err("Orders/Amount gt 1"),
        SemanticError::WrongArgumentKind { .. }
    ));
}

#[test]
fn test_navigation_as_value_is_rejected() {
    assert!(matches!(semantic_err("Category eq 1"), SemanticError::WrongArgumentKind { .. }));
}

#[test]
fn test_deep_path_is_unsupported() {
    assert!(matches!(semantic_err("Category/Parent/Name eq 'x'"), SemanticError::Unsupported(_)));
}

#[test]
fn test_any_over_values() {
    let expr = resolve("Tags/any(t: t eq 'organic')");
    let FilterKind::Lambda {
        kind,
        navigation,
        predicate,
    } = expr.kind
    else {
        panic!("expected lambda");
    };
    assert_eq!(kind, LambdaKind::Any);
    assert_eq!(navigation, "Tags");
    let predicate = predicate.unwrap();
    assert!(matches!(
        predicate.kind,
        FilterKind::Compare {
            left: ScalarExpr::CurrentElement,
            ..
        }
    ));
}

#[test]
fn test_lambda_predicate_properties_are_relative() {
    let expr = resolve("Orders/all(o: o/Amount gt 100)");
    assert_eq!(expr.property_names(), vec!["Amount"]);
}

#[test]
fn test_lambda_over_non_collection() {
    assert!(matches!(
        semantic_err("Category/any(c: c/Name eq 'x')"),
        SemanticError::WrongArgumentKind { .. }
    ));
}

#[test]
fn test_all_without_predicate() {
    assert!(matches!(semantic_err("Orders/all()"), SemanticError::WrongArity { .. }));
}

#[test]
fn test_nested_lambda_is_unsupported() {
    assert!(matches!(
        semantic_err("Orders/any(o: o/Lines/any(l: l/Qty gt 1))"),
        SemanticError::Unsupported(_)
    ));
}

#[test]
fn test_outer_reference_inside_lambda_is_unsupported() {
    assert!(matches!(
        semantic_err("Orders/any(o: $it/Price gt 1)"),
        SemanticError::Unsupported(_)
    ));
}

// ============================================================================
// Aliases and Lenient Mode
// ============================================================================

#[test]
fn test_alias_is_visible_when_not_a_property() {
    let aliases: AliasSet = ["Total"].into_iter().collect();
    let expr = resolve_with("Total gt 100", &aliases, None).unwrap();
    let FilterKind::Compare { left, .. } = expr.kind else {
        panic!("expected comparison");
    };
    assert_eq!(left, ScalarExpr::Alias("Total".to_string()));
}

#[test]
fn test_lenient_mode_accepts_any_name() {
    let expr = lenient("Whatever eq 1 and Other").unwrap();
    assert_eq!(expr.property_names(), vec!["Whatever", "Other"]);
}

#[test]
fn test_lenient_mode_rejects_paths() {
    let err = lenient("A/B eq 1").unwrap_err();
    assert!(matches!(err, QueryError::Semantic(SemanticError::Unsupported(_))));
}

#[test]
fn test_scalar_and_order_by_resolution() {
    let catalog = catalog();
    let pools = Pools::new(16);
    let aliases = AliasSet::new();
    let resolver = ExpressionResolver::new(&pools, Converter::new(catalog.entity("Products"), &aliases, None));

    let scalar = resolver.scalar("Price mul 2").unwrap();
    assert_eq!(scalar.static_type(), None);

    let (expr, direction) = resolver.order_by("length(Name) desc").unwrap();
    assert_eq!(direction, odata_sql::SortDirection::Descending);
    assert!(matches!(expr, ScalarExpr::Function { function: Function::Length, .. }));
    assert_eq!(pools.nodes.outstanding(), 0);
}
