// tests/sql_tests.rs

use odata_sql::alias::AliasSet;
use odata_sql::ast::SortDirection;
use odata_sql::converter::{Converter, ExpressionResolver};
use odata_sql::error::SqlError;
use odata_sql::filter::ScalarExpr;
use odata_sql::model::{Catalog, EntityModel, MetadataProvider, NavigationModel, PrimitiveType, PropertyModel};
use odata_sql::options::OrderByItem;
use odata_sql::pool::Pools;
use odata_sql::sql::{self, Dialect, SqlBuilder, SqlFragment, escape_like};
use odata_sql::value::Literal;

fn catalog() -> Catalog {
    let products = EntityModel::new("Products", "products")
        .with(PropertyModel::new("Id", "id", PrimitiveType::Int32).key())
        .with(PropertyModel::new("Name", "name", PrimitiveType::String))
        .with(PropertyModel::new("Sku", "sku", PrimitiveType::String))
        .with(PropertyModel::new("Price", "price", PrimitiveType::Decimal))
        .with(PropertyModel::new("Rating", "rating", PrimitiveType::Int32))
        .with(PropertyModel::new("IsActive", "is_active", PrimitiveType::Boolean))
        .with(PropertyModel::new("IsDeleted", "is_deleted", PrimitiveType::Boolean))
        .with(PropertyModel::new("IsFeatured", "is_featured", PrimitiveType::Boolean))
        .with(PropertyModel::new("Status", "status", PrimitiveType::Int32).flags())
        .with(PropertyModel::new("CreatedAt", "created_at", PrimitiveType::DateTimeOffset))
        .with(PropertyModel::new("Location", "location", PrimitiveType::Geography))
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
        .with(PropertyModel::new("Name", "category_name", PrimitiveType::String));

    let orders = EntityModel::new("Orders", "orders")
        .with(PropertyModel::new("Amount", "amount", PrimitiveType::Decimal));

    Catalog::new().with(products).with(categories).with(orders)
}

fn translate(dialect: Dialect, filter: &str) -> Result<SqlFragment, SqlError> {
    let catalog = catalog();
    let model = catalog.entity("Products");
    let pools = Pools::new(64);
    let aliases = AliasSet::new();
    let resolver = ExpressionResolver::new(&pools, Converter::new(model, &aliases, None).with_catalog(&catalog));
    let expr = resolver.filter(filter).unwrap();

    let mut builder = SqlBuilder::new(dialect).with_catalog(&catalog);
    if let Some(model) = model {
        builder = builder.with_model(model);
    }
    builder.build(&expr)
}

fn sqlite(filter: &str) -> SqlFragment {
    translate(Dialect::Sqlite, filter).unwrap()
}

fn assert_sql(fragment: &SqlFragment, sql: &str, args: Vec<Literal>) {
    assert_eq!(fragment.sql, sql);
    assert_eq!(fragment.args, args);
}

fn s(text: &str) -> Literal {
    Literal::String(text.to_string())
}

// ============================================================================
// Fragments
// ============================================================================

#[test]
fn test_compose_sequential_operands() {
    let a = SqlFragment::raw("a");
    let b = SqlFragment::bind(Literal::Integer(1));
    let out = SqlFragment::compose("$ = $", &[&a, &b]);
    assert_sql(&out, "a = ?", vec![Literal::Integer(1)]);
}

#[test]
fn test_compose_indexed_operands_keep_args_aligned() {
    let haystack = SqlFragment::bind(s("abc"));
    let needle = SqlFragment::bind(s("b"));
    let out = SqlFragment::compose("LOCATE($2, $1)", &[&haystack, &needle]);
    assert_sql(&out, "LOCATE(?, ?)", vec![s("b"), s("abc")]);
}

#[test]
fn test_compose_repeats_single_operand() {
    let x = SqlFragment::bind(Literal::Integer(7));
    let out = SqlFragment::compose("$ + $", &[&x]);
    assert_sql(&out, "? + ?", vec![Literal::Integer(7), Literal::Integer(7)]);
}

#[test]
fn test_join() {
    let parts = vec![SqlFragment::raw("a"), SqlFragment::bind(Literal::Null), SqlFragment::raw("c")];
    assert_sql(&SqlFragment::join(&parts, ", "), "a, ?, c", vec![Literal::Null]);
}

#[test]
fn test_escape_like() {
    assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
    assert_eq!(escape_like("[x]"), "![x]");
    assert_eq!(escape_like("plain"), "plain");
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_logical_composition() {
    let out = sqlite("IsActive eq true and (IsDeleted eq false or IsFeatured eq true)");
    assert_sql(
        &out,
        "(is_active = ?) AND ((is_deleted = ?) OR (is_featured = ?))",
        vec![Literal::Boolean(true), Literal::Boolean(false), Literal::Boolean(true)],
    );
}

#[test]
fn test_negation() {
    assert_sql(&sqlite("not (Price gt 10)"), "NOT (price > ?)", vec![Literal::Integer(10)]);
}

#[test]
fn test_null_comparisons() {
    assert_sql(&sqlite("Name eq null"), "name IS NULL", vec![]);
    assert_sql(&sqlite("null ne Name"), "name IS NOT NULL", vec![]);
}

#[test]
fn test_relational_operators() {
    let cases = vec![
        ("Rating eq 1", "rating = ?"),
        ("Rating ne 1", "rating <> ?"),
        ("Rating gt 1", "rating > ?"),
        ("Rating ge 1", "rating >= ?"),
        ("Rating lt 1", "rating < ?"),
        ("Rating le 1", "rating <= ?"),
    ];

    for (filter, expected) in cases {
        assert_sql(&sqlite(filter), expected, vec![Literal::Integer(1)]);
    }
}

#[test]
fn test_in_list() {
    assert_sql(
        &sqlite("Rating in (1, 2)"),
        "rating IN (?, ?)",
        vec![Literal::Integer(1), Literal::Integer(2)],
    );
}

#[test]
fn test_empty_in_list_is_false() {
    assert_sql(&sqlite("Rating in ()"), "1 = 0", vec![]);
}

#[test]
fn test_has_binds_flag_twice() {
    assert_sql(
        &sqlite("Status has 4"),
        "(status & ?) = ?",
        vec![Literal::Integer(4), Literal::Integer(4)],
    );
}

#[test]
fn test_boolean_property_predicate() {
    assert_sql(&sqlite("IsActive"), "is_active = ?", vec![Literal::Boolean(true)]);
}

#[test]
fn test_constants() {
    assert_sql(&sqlite("true"), "1 = 1", vec![]);
    assert_sql(&sqlite("false or IsActive"), "(1 = 0) OR (is_active = ?)", vec![Literal::Boolean(true)]);
}

#[test]
fn test_arithmetic() {
    assert_sql(
        &sqlite("(Price add 10) mul 2 gt 100"),
        "((price + ?) * ?) > ?",
        vec![Literal::Integer(10), Literal::Integer(2), Literal::Integer(100)],
    );
    assert_sql(&sqlite("-Price lt 0"), "(-price) < ?", vec![Literal::Integer(0)]);
}

#[test]
fn test_isof_is_static() {
    assert_sql(&sqlite("isof(Name, Edm.String)"), "1 = 1", vec![]);
    assert_sql(&sqlite("isof(Name, Edm.Int32)"), "1 = 0", vec![]);
    assert_sql(&sqlite("isof(Shop.Products)"), "1 = 1", vec![]);
    assert_sql(&sqlite("isof(Shop.Orders)"), "1 = 0", vec![]);
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_contains_escapes_pattern() {
    assert_sql(
        &sqlite("contains(Name, '50%_off')"),
        "name LIKE ? ESCAPE '!'",
        vec![s("%50!%!_off%")],
    );
    assert_sql(&sqlite("startswith(Name, 'ab')"), "name LIKE ? ESCAPE '!'", vec![s("ab%")]);
    assert_sql(&sqlite("endswith(Name, 'ab')"), "name LIKE ? ESCAPE '!'", vec![s("%ab")]);
}

#[test]
fn test_like_with_column_pattern() {
    assert_sql(&sqlite("startswith(Name, Sku)"), "name LIKE (sku || '%') ESCAPE '!'", vec![]);

    let mysql = translate(Dialect::MySql, "contains(Name, Sku)").unwrap();
    assert_sql(&mysql, "name LIKE CONCAT('%', sku, '%') ESCAPE '!'", vec![]);
}

#[test]
fn test_ceiling_emulation() {
    assert_sql(
        &sqlite("ceiling(Price) eq 100"),
        "CASE WHEN price = CAST(price AS INTEGER) THEN price ELSE CAST(price AS INTEGER) + (CASE WHEN price > 0 THEN 1 ELSE 0 END) END = ?",
        vec![Literal::Integer(100)],
    );

    let mysql = translate(Dialect::MySql, "floor(Price) eq 1").unwrap();
    assert!(mysql.sql.contains("- (CASE WHEN price < 0 THEN 1 ELSE 0 END)"));
}

#[test]
fn test_ceiling_floor_truncate_before_cast() {
    let postgres = translate(Dialect::Postgres, "ceiling(Price) eq 2").unwrap();
    assert_eq!(
        postgres.sql,
        "CASE WHEN price = CAST(TRUNC(price) AS INTEGER) THEN price ELSE CAST(TRUNC(price) AS INTEGER) + (CASE WHEN price > 0 THEN 1 ELSE 0 END) END = ?"
    );

    let mysql = translate(Dialect::MySql, "floor(Price) eq 1").unwrap();
    assert_eq!(
        mysql.sql,
        "CASE WHEN price = CAST(TRUNCATE(price, 0) AS SIGNED) THEN price ELSE CAST(TRUNCATE(price, 0) AS SIGNED) - (CASE WHEN price < 0 THEN 1 ELSE 0 END) END = ?"
    );
    assert_eq!(mysql.args, vec![Literal::Integer(1)]);

    let mssql = translate(Dialect::SqlServer, "floor(Price) eq 1").unwrap();
    assert!(mssql.sql.starts_with("CASE WHEN price = CAST(price AS INTEGER) THEN price"));
}

#[test]
fn test_round_per_dialect() {
    assert_eq!(sqlite("round(Price) eq 1").sql, "ROUND(price) = ?");
    assert_eq!(translate(Dialect::SqlServer, "round(Price) eq 1").unwrap().sql, "ROUND(price, 0) = ?");
}

#[test]
fn test_date_parts_per_dialect() {
    let cases = vec![
        (Dialect::Sqlite, "CAST(strftime('%Y', created_at) AS INTEGER) = ?"),
        (Dialect::Postgres, "EXTRACT(YEAR FROM created_at) = ?"),
        (Dialect::MySql, "YEAR(created_at) = ?"),
        (Dialect::SqlServer, "DATEPART(year, created_at) = ?"),
    ];

    for (dialect, expected) in cases {
        let out = translate(dialect, "year(CreatedAt) eq 2024").unwrap();
        assert_sql(&out, expected, vec![Literal::Integer(2024)]);
    }
}

#[test]
fn test_indexof_argument_order() {
    let out = translate(Dialect::MySql, "indexof(Name, 'x') eq 0").unwrap();
    assert_sql(&out, "(LOCATE(?, name) - 1) = ?", vec![s("x"), Literal::Integer(0)]);

    let out = translate(Dialect::Sqlite, "indexof(Name, 'x') eq 0").unwrap();
    assert_sql(&out, "(INSTR(name, ?) - 1) = ?", vec![s("x"), Literal::Integer(0)]);
}

#[test]
fn test_substring_without_length_on_sqlserver() {
    let out = translate(Dialect::SqlServer, "substring(Name, 1) eq 'x'").unwrap();
    assert_sql(&out, "SUBSTRING(name, ? + 1, LEN(name)) = ?", vec![Literal::Integer(1), s("x")]);
}

#[test]
fn test_concat_and_length() {
    assert_sql(
        &sqlite("length(concat(Name, Sku)) gt 3"),
        "LENGTH((name || sku)) > ?",
        vec![Literal::Integer(3)],
    );
}

#[test]
fn test_matchespattern_unsupported_on_sqlserver() {
    let err = translate(Dialect::SqlServer, "matchespattern(Name, '^a')").unwrap_err();
    assert!(matches!(err, SqlError::UnsupportedByDialect { dialect: "sqlserver", .. }));
}

#[test]
fn test_cast() {
    assert_sql(&sqlite("cast(Rating, Edm.String) eq '5'"), "CAST(rating AS TEXT) = ?", vec![s("5")]);
    assert_eq!(
        translate(Dialect::Postgres, "cast(Rating, Edm.Int64) eq 5").unwrap().sql,
        "CAST(rating AS BIGINT) = ?"
    );
}

#[test]
fn test_spatial_functions() {
    let filter = "geo.intersects(Location, geography'SRID=4326;POINT(1 2)')";

    let out = translate(Dialect::Postgres, filter).unwrap();
    assert_sql(
        &out,
        "ST_Intersects(location, ST_GeogFromText(?, ?))",
        vec![s("POINT(1 2)"), Literal::Integer(4326)],
    );

    let out = translate(Dialect::SqlServer, filter).unwrap();
    assert_eq!(out.sql, "(location.STIntersects(geography::STGeomFromText(?, ?)) = 1)");
}

#[test]
fn test_now_per_dialect() {
    assert_eq!(sqlite("CreatedAt lt now()").sql, "created_at < CURRENT_TIMESTAMP");
    assert_eq!(
        translate(Dialect::SqlServer, "CreatedAt lt now()").unwrap().sql,
        "created_at < SYSDATETIMEOFFSET()"
    );
}

// ============================================================================
// Navigation and Lambdas
// ============================================================================

#[test]
fn test_navigation_property_subquery() {
    assert_sql(
        &sqlite("Category/Name eq 'Dairy'"),
        "(SELECT n0.category_name FROM categories AS n0 WHERE n0.id = products.category_id) = ?",
        vec![s("Dairy")],
    );
}

#[test]
fn test_any_over_values() {
    assert_sql(
        &sqlite("Tags/any(t: t eq 'organic')"),
        "EXISTS (SELECT 1 FROM product_tags AS l0 WHERE l0.product_id = products.id AND (l0.tag = ?))",
        vec![s("organic")],
    );
}

#[test]
fn test_all_over_entities() {
    assert_sql(
        &sqlite("Orders/all(o: o/Amount gt 100)"),
        "NOT EXISTS (SELECT 1 FROM orders AS l0 WHERE l0.product_id = products.id AND NOT (l0.amount > ?))",
        vec![Literal::Integer(100)],
    );
}

#[test]
fn test_empty_any() {
    assert_sql(
        &sqlite("Orders/any()"),
        "EXISTS (SELECT 1 FROM orders AS l0 WHERE l0.product_id = products.id)",
        vec![],
    );
}

#[test]
fn test_lambda_aliases_are_numbered() {
    let out = sqlite("Orders/any() and Tags/any(t: t eq 'x')");
    assert!(out.sql.contains("orders AS l0"));
    assert!(out.sql.contains("product_tags AS l1"));
}

// ============================================================================
// Whole Builder
// ============================================================================

#[test]
fn test_output_is_deterministic() {
    let filter = "Category/Name eq 'x' and Tags/any(t: contains(t, 'y')) or Rating in (1, 2, 3)";
    assert_eq!(sqlite(filter), sqlite(filter));
}

#[test]
fn test_placeholders_match_args() {
    let filters = vec![
        "Status has 1 and Name in ('a', 'b')",
        "ceiling(Price) eq 3 or indexof(Name, 'z') ge 1",
        "Tags/all(t: t ne 'q') and year(CreatedAt) eq 2020",
    ];

    for dialect in Dialect::ALL {
        for filter in &filters {
            let out = translate(dialect, filter).unwrap();
            assert_eq!(out.sql.matches('?').count(), out.args.len(), "{} / {}", dialect, filter);
        }
    }
}

#[test]
fn test_build_without_model() {
    let pools = Pools::new(16);
    let aliases = AliasSet::new();
    let expr = ExpressionResolver::new(&pools, Converter::new(None, &aliases, None))
        .filter("Amount gt 5")
        .unwrap();
    let out = sql::build(Dialect::Postgres, &expr, None).unwrap();
    assert_sql(&out, "Amount > ?", vec![Literal::Integer(5)]);
}

#[test]
fn test_lambda_without_model_is_untranslatable() {
    let pools = Pools::new(16);
    let aliases = AliasSet::new();
    let expr = ExpressionResolver::new(&pools, Converter::new(None, &aliases, None))
        .filter("Orders/any()")
        .unwrap();
    let err = sql::build(Dialect::Sqlite, &expr, None).unwrap_err();
    assert_eq!(err, SqlError::UnknownNavigation("Orders".to_string()));
}

#[test]
fn test_order_by() {
    let catalog = catalog();
    let model = catalog.entity("Products").unwrap();
    let pools = Pools::new(16);
    let aliases = AliasSet::new();
    let resolver = ExpressionResolver::new(&pools, Converter::new(Some(model), &aliases, None));

    let mut items = Vec::new();
    for text in ["Name", "tolower(Sku) desc"] {
        let (expr, direction) = resolver.order_by(text).unwrap();
        items.push(OrderByItem { expr, direction });
    }
    assert_eq!(items[1].direction, SortDirection::Descending);

    let out = SqlBuilder::new(Dialect::Sqlite).with_model(model).build_order_by(&items).unwrap();
    assert_sql(&out, "name ASC, LOWER(sku) DESC", vec![]);
}

#[test]
fn test_unknown_alias_without_registry() {
    let mut builder = SqlBuilder::new(Dialect::Postgres);
    let err = builder.build_scalar(&ScalarExpr::Alias("Total".to_string())).unwrap_err();
    assert_eq!(err, SqlError::UnknownAlias("Total".to_string()));
}
