#[cfg(test)]
mod tests {
    use odata_sql::alias::{AliasDefinition, AliasRegistry, AliasSet};
    use odata_sql::converter::{Converter, ExpressionResolver};
    use odata_sql::error::{OptionError, QueryError};
    use odata_sql::filter::ScalarExpr;
    use odata_sql::model::{EntityModel, PrimitiveType, PropertyModel};
    use odata_sql::pool::Pools;
    use odata_sql::transform::{
        AggregateEntry, AggregateMethod, Aggregation, ApplyStep, ApplyTransformation, ComputeEntry, GROUP_COUNT,
        collect_aliases, parse_aggregate, parse_apply, parse_compute, resolve_apply, resolve_compute,
        split_top_level,
    };

    fn sales() -> EntityModel {
        EntityModel::new("Sales", "sales")
            .with(PropertyModel::new("Id", "id", PrimitiveType::Int32).key())
            .with(PropertyModel::new("Region", "region", PrimitiveType::String))
            .with(PropertyModel::new("Product", "product", PrimitiveType::String))
            .with(PropertyModel::new("Amount", "amount", PrimitiveType::Decimal))
            .with(PropertyModel::new("Quantity", "quantity", PrimitiveType::Int32))
    }

    fn entry(expression: &str, alias: &str) -> ComputeEntry {
        ComputeEntry {
            expression: expression.to_string(),
            alias: alias.to_string(),
        }
    }

    fn aggregate(expression: &str, method: AggregateMethod, alias: &str) -> AggregateEntry {
        AggregateEntry {
            source: Some((expression.to_string(), method)),
            alias: alias.to_string(),
        }
    }

    fn malformed_reason(err: OptionError) -> String {
        match err {
            OptionError::MalformedEntry { reason, .. } => reason,
            other => panic!("expected malformed entry, got {:?}", other),
        }
    }

    /// Run both phases the way the options parser does.
    fn resolve(apply: &str, compute: &str) -> Result<(Vec<ApplyTransformation>, AliasRegistry), QueryError> {
        let model = sales();
        let steps = if apply.is_empty() { Vec::new() } else { parse_apply(apply)? };
        let entries = if compute.is_empty() {
            Vec::new()
        } else {
            parse_compute(compute, "$compute")?
        };

        let mut aliases = AliasSet::new();
        collect_aliases(&steps, &entries, Some(&model), &mut aliases)?;

        let pools = Pools::new(32);
        let resolver = ExpressionResolver::new(&pools, Converter::new(Some(&model), &aliases, None));
        let mut registry = AliasRegistry::new();
        resolve_compute(&entries, &resolver, &mut registry)?;
        let transformations = resolve_apply(&steps, &resolver, &mut registry)?;
        assert_eq!(pools.nodes.outstanding(), 0);
        Ok((transformations, registry))
    }

    // ========================================================================
    // Top-Level Splitting
    // ========================================================================

    #[test]
    fn test_split_ignores_nested_separators() {
        let parts = split_top_level("a,f(b,c),'x,y'", ',', "$compute").unwrap();
        assert_eq!(parts, vec!["a", "f(b,c)", "'x,y'"]);
    }

    #[test]
    fn test_split_borrows_from_text() {
        let text = String::from("Name, Price desc");
        let parts = split_top_level(&text, ',', "$orderby").unwrap();
        assert_eq!(parts, vec!["Name", " Price desc"]);
    }

    #[test]
    fn test_split_with_doubled_quote() {
        let parts = split_top_level("'it''s',b", ',', "$compute").unwrap();
        assert_eq!(parts, vec!["'it''s'", "b"]);
    }

    #[test]
    fn test_split_on_slash() {
        let parts = split_top_level("filter(a/b eq 1)/groupby((c))", '/', "$apply").unwrap();
        assert_eq!(parts, vec!["filter(a/b eq 1)", "groupby((c))"]);
    }

    #[test]
    fn test_split_rejects_unbalanced_input() {
        assert_eq!(
            malformed_reason(split_top_level("f(a", ',', "$apply").unwrap_err()),
            "unbalanced '('"
        );
        assert_eq!(
            malformed_reason(split_top_level("a)", ',', "$apply").unwrap_err()),
            "unbalanced ')'"
        );
        assert_eq!(
            malformed_reason(split_top_level("'abc", ',', "$apply").unwrap_err()),
            "unterminated string literal"
        );
    }

    // ========================================================================
    // $compute Parsing
    // ========================================================================

    #[test]
    fn test_parse_compute_entries() {
        let entries = parse_compute("Amount mul Quantity as Total, tolower(Region) AS Lower", "$compute").unwrap();
        assert_eq!(
            entries,
            vec![entry("Amount mul Quantity", "Total"), entry("tolower(Region)", "Lower")]
        );
    }

    #[test]
    fn test_parse_compute_uses_last_top_level_as() {
        let entries = parse_compute("concat(Region, ' as ') as Label", "$compute").unwrap();
        assert_eq!(entries, vec![entry("concat(Region, ' as ')", "Label")]);
    }

    #[test]
    fn test_parse_compute_errors() {
        let err = parse_compute("Amount mul 2", "$compute").unwrap_err();
        assert_eq!(malformed_reason(err), "expected '<expression> as <alias>'");

        let err = parse_compute("Amount as 2x", "$compute").unwrap_err();
        assert_eq!(malformed_reason(err), "alias must be a simple identifier");
    }

    #[test]
    fn test_compute_error_names_option() {
        let err = parse_compute("Amount", "$apply").unwrap_err();
        assert!(matches!(err, OptionError::MalformedEntry { option: "$apply", .. }));
    }

    // ========================================================================
    // $apply Parsing
    // ========================================================================

    #[test]
    fn test_parse_aggregate_entries() {
        let entries = parse_aggregate("Amount with sum as Total, $count as Rows, Product with countdistinct as Kinds")
            .unwrap();
        assert_eq!(
            entries,
            vec![
                aggregate("Amount", AggregateMethod::Sum, "Total"),
                AggregateEntry {
                    source: None,
                    alias: "Rows".to_string(),
                },
                aggregate("Product", AggregateMethod::CountDistinct, "Kinds"),
            ]
        );
    }

    #[test]
    fn test_parse_aggregate_unknown_method() {
        let err = parse_aggregate("Amount with median as M").unwrap_err();
        assert_eq!(malformed_reason(err), "unknown aggregation method");
    }

    #[test]
    fn test_parse_apply_pipeline() {
        let steps = parse_apply(
            "filter(Amount gt 5)/groupby((Region, Product), aggregate(Amount with average as Avg))/filter(Avg gt 10)",
        )
        .unwrap();

        assert_eq!(
            steps,
            vec![
                ApplyStep::Filter("Amount gt 5".to_string()),
                ApplyStep::GroupBy {
                    properties: vec!["Region".to_string(), "Product".to_string()],
                    aggregate: vec![aggregate("Amount", AggregateMethod::Average, "Avg")],
                },
                ApplyStep::Filter("Avg gt 10".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_groupby_without_aggregate() {
        let steps = parse_apply("groupby((Region))").unwrap();
        assert_eq!(
            steps,
            vec![ApplyStep::GroupBy {
                properties: vec!["Region".to_string()],
                aggregate: Vec::new(),
            }]
        );
        assert_eq!(steps[0].aliases(), vec![GROUP_COUNT]);
    }

    #[test]
    fn test_parse_apply_compute_step() {
        let steps = parse_apply("compute(Amount mul 2 as Double)").unwrap();
        assert_eq!(steps, vec![ApplyStep::Compute(vec![entry("Amount mul 2", "Double")])]);
    }

    #[test]
    fn test_parse_apply_errors() {
        let cases = vec![
            ("orderby(Amount)", "unknown transformation"),
            ("filter()", "empty filter"),
            ("groupby(Region)", "groupby expects a parenthesized property list"),
            ("groupby((Region), filter(x))", "groupby may only nest aggregate(...)"),
            ("filter(a eq 1) extra", "unexpected text after ')'"),
            ("filter", "expected '<transformation>(...)'"),
        ];

        for (input, expected) in cases {
            let err = parse_apply(input).unwrap_err();
            assert_eq!(malformed_reason(err), expected, "Failed for input: {}", input);
        }
    }

    // ========================================================================
    // Alias Collection
    // ========================================================================

    #[test]
    fn test_collect_aliases_from_both_options() {
        let steps = parse_apply("aggregate(Amount with sum as Total)").unwrap();
        let compute = vec![entry("Amount mul 2", "Double")];
        let mut aliases = AliasSet::new();

        collect_aliases(&steps, &compute, Some(&sales()), &mut aliases).unwrap();
        assert!(aliases.contains("Total"));
        assert!(aliases.contains("Double"));
        assert_eq!(aliases.len(), 2);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let steps = parse_apply("aggregate(Amount with sum as Total)").unwrap();
        let compute = vec![entry("Amount mul 2", "Total")];
        let mut aliases = AliasSet::new();

        let err = collect_aliases(&steps, &compute, None, &mut aliases).unwrap_err();
        assert_eq!(err, OptionError::DuplicateAlias("Total".to_string()));
    }

    #[test]
    fn test_alias_shadowing_property_rejected() {
        let compute = vec![entry("Amount mul 2", "Amount")];
        let mut aliases = AliasSet::new();

        let err = collect_aliases(&[], &compute, Some(&sales()), &mut aliases).unwrap_err();
        assert_eq!(err, OptionError::DuplicateAlias("Amount".to_string()));
    }

    #[test]
    fn test_group_count_may_repeat() {
        let steps = parse_apply("groupby((Region))/groupby((Product))").unwrap();
        let mut aliases = AliasSet::new();

        collect_aliases(&steps, &[], Some(&sales()), &mut aliases).unwrap();
        assert!(aliases.contains(GROUP_COUNT));
        assert_eq!(aliases.len(), 1);
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn test_resolve_groupby_registers_aliases() {
        let (transformations, registry) =
            resolve("groupby((Region), aggregate(Amount with sum as Total))/filter(Total gt 100)", "").unwrap();

        assert_eq!(transformations.len(), 2);
        assert!(matches!(
            registry.get("Total"),
            Some(AliasDefinition::Aggregate(Aggregation::Method {
                method: AggregateMethod::Sum,
                ..
            }))
        ));
        assert_eq!(
            registry.get(GROUP_COUNT),
            Some(&AliasDefinition::Aggregate(Aggregation::Count))
        );

        let ApplyTransformation::GroupBy { properties, aggregate } = &transformations[0] else {
            panic!("expected groupby");
        };
        assert_eq!(properties.len(), 1);
        assert_eq!(aggregate[0].alias, "Total");
    }

    #[test]
    fn test_filter_may_use_alias_declared_later() {
        let (transformations, registry) = resolve("filter(Double gt 10)", "Amount mul 2 as Double").unwrap();

        assert!(matches!(registry.get("Double"), Some(AliasDefinition::Expression(_))));
        assert!(matches!(transformations[0], ApplyTransformation::Filter(_)));
    }

    #[test]
    fn test_compute_referencing_compute() {
        let (_, registry) = resolve("", "Amount mul 2 as Double, Double add 1 as Next").unwrap();

        let Some(AliasDefinition::Expression(ScalarExpr::Arithmetic { left, .. })) = registry.get("Next") else {
            panic!("expected arithmetic definition");
        };
        assert_eq!(**left, ScalarExpr::Alias("Double".to_string()));
    }

    #[test]
    fn test_alias_used_before_definition() {
        let err = resolve("filter(Total gt 5)/groupby((Region), aggregate(Amount with sum as Total))", "").unwrap_err();
        assert_eq!(err, QueryError::Option(OptionError::AliasNotYetDefined("Total".to_string())));

        let err = resolve("filter($count gt 1)/groupby((Region))", "").unwrap_err();
        assert_eq!(err, QueryError::Option(OptionError::AliasNotYetDefined("$count".to_string())));

        let err = resolve("", "Next add 1 as Double, Amount add 1 as Next").unwrap_err();
        assert_eq!(err, QueryError::Option(OptionError::AliasNotYetDefined("Next".to_string())));
    }

    #[test]
    fn test_aggregate_of_aggregate_rejected() {
        let err = resolve("aggregate(Amount with sum as Total)/aggregate(Total with max as Top)", "").unwrap_err();
        let QueryError::Option(err) = err else {
            panic!("expected option error");
        };
        assert_eq!(malformed_reason(err), "cannot aggregate an aggregate alias");
    }

    #[test]
    fn test_aggregate_through_expression_alias() {
        let (_, registry) = resolve("aggregate(Amount with sum as Total)/compute(Total mul 2 as Double)", "").unwrap();
        assert!(registry.is_aggregate("Total"));
        assert!(registry.is_aggregate("Double"));
        assert!(!registry.is_aggregate("Region"));
    }

    #[test]
    fn test_groupby_rejects_expressions() {
        let err = resolve("groupby((tolower(Region)))", "").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Option(OptionError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn test_sum_requires_numeric_operand() {
        let err = resolve("aggregate(Region with sum as Total)", "").unwrap_err();
        let QueryError::Option(err) = err else {
            panic!("expected option error");
        };
        assert_eq!(malformed_reason(err), "sum requires a numeric expression");
    }

    #[test]
    fn test_min_accepts_strings() {
        assert!(resolve("aggregate(Region with min as First)", "").is_ok());
    }

    #[test]
    fn test_unknown_property_in_apply() {
        let err = resolve("filter(Missing eq 1)", "").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }
}
