//! # SQL Generation
//!
//! Translates resolved expressions into parameterized SQL fragments.
//!
//! Every literal becomes a `?` placeholder and is appended to the fragment's
//! positional argument list, in the order the placeholders appear in the
//! text. Identifiers are emitted exactly as stored in the metadata.
//!
//! ## Translation Overview
//!
//! | Expression                     | SQL                                    |
//! |--------------------------------|----------------------------------------|
//! | `Price gt 10`                  | `price > ?`                            |
//! | `A and B`                      | `(A) AND (B)`                          |
//! | `not A`                        | `NOT (A)`                              |
//! | `Name eq null`                 | `name IS NULL`                         |
//! | `Status has 4`                 | `(status & ?) = ?`                     |
//! | `Category in ()`               | `1 = 0`                                |
//! | `contains(Name, 'a')`          | `name LIKE ? ESCAPE '!'`               |
//! | `Tags/any(t: t eq 'x')`        | `EXISTS (SELECT 1 FROM ... AND (...))` |
//!
//! The walk itself is dialect-agnostic; [`Dialect`] supplies the spelling of
//! date-part extraction, string and spatial functions and cast types.
//!
//! Output is deterministic: the same tree and dialect always produce the same
//! text and argument order.

pub mod dialect;

use std::fmt;

use tracing::instrument;

pub use dialect::Dialect;

use crate::{
    alias::{AliasDefinition, AliasRegistry},
    ast::{ComparisonOp, LambdaKind},
    error::SqlError,
    filter::{FilterExpression, FilterKind, Function, PropertyRef, ScalarExpr, TypeName},
    model::{EntityModel, MetadataProvider, NavigationModel, PrimitiveType},
    options::OrderByItem,
    transform::{Aggregation, ApplyTransformation, ComputeItem},
    value::{Literal, SpatialKind},
};

type Fragment = Result<SqlFragment, SqlError>;

/// SQL text plus its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub args: Vec<Literal>,
}

impl SqlFragment {
    /// Text with no placeholders.
    pub fn raw(sql: impl Into<String>) -> Self {
        SqlFragment {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// A single bound value.
    pub fn bind(value: Literal) -> Self {
        SqlFragment {
            sql: "?".to_string(),
            args: vec![value],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn append(&mut self, other: &SqlFragment) {
        self.sql.push_str(&other.sql);
        self.args.extend(other.args.iter().cloned());
    }

    /// Fill a template with operands.
    ///
    /// `$` stands for the next operand and `$N` for the N-th (1-based).
    /// Indexing wraps, so a one-operand template may use `$` repeatedly.
    /// Each occurrence contributes the operand's arguments again, keeping
    /// arguments aligned with placeholders.
    pub fn compose(template: &str, operands: &[&SqlFragment]) -> SqlFragment {
        let mut out = SqlFragment::default();
        let mut next = 0;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || operands.is_empty() {
                out.sql.push(c);
                continue;
            }

            let mut digits = String::new();
            while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                digits.push(d);
            }

            let index = match digits.parse::<usize>() {
                Ok(n) => n.saturating_sub(1),
                Err(_) => {
                    next += 1;
                    next - 1
                }
            };
            out.append(operands[index % operands.len()]);
        }
        out
    }

    /// Join fragments with a separator.
    pub fn join(fragments: &[SqlFragment], separator: &str) -> SqlFragment {
        let mut out = SqlFragment::default();
        for (i, fragment) in fragments.iter().enumerate() {
            if i > 0 {
                out.sql.push_str(separator);
            }
            out.append(fragment);
        }
        out
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// SQL pieces produced from an `$apply` pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplySql {
    /// `expr AS alias` items, plus the grouping columns
    pub projections: Vec<SqlFragment>,
    pub group_by: Vec<SqlFragment>,
    /// Filters that run before the first grouping or aggregation
    pub where_clause: Option<SqlFragment>,
    /// Filters that run after it
    pub having: Option<SqlFragment>,
}

/// Build a WHERE-clause fragment for `expr`.
pub fn build(dialect: Dialect, expr: &FilterExpression, model: Option<&EntityModel>) -> Fragment {
    let mut builder = SqlBuilder::new(dialect);
    if let Some(model) = model {
        builder = builder.with_model(model);
    }
    builder.build(expr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AliasMode {
    /// Emit the alias name
    Reference,
    /// Emit the alias definition
    Inline,
}

struct LambdaScope<'a> {
    alias: String,
    navigation: &'a NavigationModel,
    target: Option<&'a EntityModel>,
}

pub struct SqlBuilder<'a> {
    dialect: Dialect,
    model: Option<&'a EntityModel>,
    catalog: Option<&'a dyn MetadataProvider>,
    registry: Option<&'a AliasRegistry>,
    lambda: Option<LambdaScope<'a>>,
    aliases: AliasMode,
    expanding: Vec<String>,
    counter: usize,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: Dialect) -> Self {
        SqlBuilder {
            dialect,
            model: None,
            catalog: None,
            registry: None,
            lambda: None,
            aliases: AliasMode::Reference,
            expanding: Vec::new(),
            counter: 0,
        }
    }

    pub fn with_model(mut self, model: &'a EntityModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_catalog(mut self, catalog: &'a dyn MetadataProvider) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Alias definitions for inline substitution.
    pub fn with_registry(mut self, registry: &'a AliasRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn reset(&mut self, aliases: AliasMode) {
        self.counter = 0;
        self.lambda = None;
        self.expanding.clear();
        self.aliases = aliases;
    }

    fn predicate_aliases(&self) -> AliasMode {
        if self.dialect.supports_alias_in_predicate() {
            AliasMode::Reference
        } else {
            AliasMode::Inline
        }
    }

    /// Translate a predicate for a WHERE or HAVING clause.
    #[instrument(level = "debug", skip_all, fields(dialect = %self.dialect))]
    pub fn build(&mut self, expr: &FilterExpression) -> Fragment {
        self.reset(self.predicate_aliases());
        self.condition(expr)
    }

    /// Translate a value expression for a projection.
    pub fn build_scalar(&mut self, expr: &ScalarExpr) -> Fragment {
        self.reset(AliasMode::Inline);
        self.scalar(expr)
    }

    /// `expr ASC, expr DESC, ...`
    #[instrument(level = "debug", skip_all, fields(dialect = %self.dialect))]
    pub fn build_order_by(&mut self, items: &[OrderByItem]) -> Fragment {
        self.reset(AliasMode::Reference);

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let expr = self.scalar(&item.expr)?;
            parts.push(SqlFragment::compose(
                &format!("$ {}", item.direction.sql_keyword()),
                &[&expr],
            ));
        }
        Ok(SqlFragment::join(&parts, ", "))
    }

    /// `expr AS alias, ...`
    #[instrument(level = "debug", skip_all, fields(dialect = %self.dialect))]
    pub fn build_compute(&mut self, items: &[ComputeItem]) -> Fragment {
        self.reset(AliasMode::Inline);

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let expr = self.scalar(&item.expr)?;
            parts.push(projection(&expr, &item.alias));
        }
        Ok(SqlFragment::join(&parts, ", "))
    }

    /// Projections, grouping and the WHERE/HAVING split for `$apply`.
    #[instrument(level = "debug", skip_all, fields(dialect = %self.dialect, steps = steps.len()))]
    pub fn build_apply(&mut self, steps: &[ApplyTransformation]) -> Result<ApplySql, SqlError> {
        let mut out = ApplySql::default();
        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut grouped = false;

        for step in steps {
            match step {
                ApplyTransformation::GroupBy {
                    properties,
                    aggregate,
                } => {
                    self.reset(AliasMode::Inline);
                    for property in properties {
                        let column = self.scalar(property)?;
                        out.projections.push(column.clone());
                        out.group_by.push(column);
                    }
                    for item in aggregate {
                        let expr = self.aggregation(&item.aggregation)?;
                        out.projections.push(projection(&expr, &item.alias));
                    }
                    grouped = true;
                }
                ApplyTransformation::Aggregate(items) => {
                    self.reset(AliasMode::Inline);
                    for item in items {
                        let expr = self.aggregation(&item.aggregation)?;
                        out.projections.push(projection(&expr, &item.alias));
                    }
                    grouped = true;
                }
                ApplyTransformation::Filter(filter) => {
                    let condition = self.build(filter)?;
                    if grouped {
                        after.push(condition);
                    } else {
                        before.push(condition);
                    }
                }
                ApplyTransformation::Compute(items) => {
                    let computed = self.build_compute(items)?;
                    if !computed.is_empty() {
                        out.projections.push(computed);
                    }
                }
            }
        }

        out.where_clause = conjunction(before);
        out.having = conjunction(after);
        Ok(out)
    }

    // ========================================
    // Conditions
    // ========================================

    fn condition(&mut self, expr: &FilterExpression) -> Fragment {
        let inner = match &expr.kind {
            FilterKind::Logical { op, left, right } => {
                let left = self.condition(left)?;
                let right = self.condition(right)?;
                SqlFragment::compose(&format!("($) {} ($)", op.sql_keyword()), &[&left, &right])
            }

            FilterKind::Compare { left, op, right } => self.comparison(left, *op, right)?,

            FilterKind::In { values, .. } if values.is_empty() => SqlFragment::raw("1 = 0"),

            FilterKind::In { operand, values } => {
                let operand = self.scalar(operand)?;
                let placeholders = vec!["?"; values.len()].join(", ");
                let mut out = SqlFragment::compose(&format!("$ IN ({})", placeholders), &[&operand]);
                out.args.extend(values.iter().cloned());
                out
            }

            FilterKind::Has { operand, flag } => {
                let operand = self.scalar(operand)?;
                let mut out = SqlFragment::compose("($ & ?) = ?", &[&operand]);
                out.args.push(flag.clone());
                out.args.push(flag.clone());
                out
            }

            FilterKind::Predicate(value) => self.predicate(value)?,

            FilterKind::IsOf { operand, target } => self.isof(operand.as_ref(), target)?,

            FilterKind::Lambda {
                kind,
                navigation,
                predicate,
            } => self.lambda(*kind, navigation, predicate.as_deref())?,

            FilterKind::Constant(true) => SqlFragment::raw("1 = 1"),
            FilterKind::Constant(false) => SqlFragment::raw("1 = 0"),
        };

        if expr.negated {
            Ok(SqlFragment::compose("NOT ($)", &[&inner]))
        } else {
            Ok(inner)
        }
    }

    fn comparison(
        &mut self,
        left: &ScalarExpr,
        op: ComparisonOp,
        right: &ScalarExpr,
    ) -> Fragment {
        let null_test = match op {
            ComparisonOp::Eq => Some("$ IS NULL"),
            ComparisonOp::Ne => Some("$ IS NOT NULL"),
            _ => None,
        };

        if let Some(template) = null_test {
            match (left, right) {
                (value, ScalarExpr::Literal(Literal::Null)) | (ScalarExpr::Literal(Literal::Null), value) => {
                    let value = self.scalar(value)?;
                    return Ok(SqlFragment::compose(template, &[&value]));
                }
                _ => {}
            }
        }

        let symbol = op
            .sql_symbol()
            .ok_or_else(|| SqlError::Untranslatable(format!("'{}' as a relational operator", op)))?;

        let left = self.scalar(left)?;
        let right = self.scalar(right)?;
        Ok(SqlFragment::compose(&format!("$ {} $", symbol), &[&left, &right]))
    }

    /// A boolean operand on its own.
    fn predicate(&mut self, value: &ScalarExpr) -> Fragment {
        match value {
            ScalarExpr::Function { function, .. } if function.is_predicate() => self.scalar(value),
            ScalarExpr::Condition(inner) => self.condition(inner),
            _ => {
                let value = self.scalar(value)?;
                let mut out = SqlFragment::compose("$ = ?", &[&value]);
                out.args.push(Literal::Boolean(true));
                Ok(out)
            }
        }
    }

    /// `isof` is decided statically from the metadata.
    fn isof(&mut self, operand: Option<&ScalarExpr>, target: &TypeName) -> Fragment {
        let matches = match (operand, target) {
            (Some(operand), TypeName::Primitive(ty)) => match operand.static_type() {
                Some(actual) => actual == *ty,
                None => {
                    return Err(SqlError::Untranslatable(
                        "isof on an operand of unknown type".to_string(),
                    ));
                }
            },
            (None, TypeName::Primitive(_)) => false,
            (None, TypeName::EntityType(name)) => {
                let model = self.model.ok_or_else(|| {
                    SqlError::Untranslatable("isof without an entity model".to_string())
                })?;
                name.rsplit('.').next() == Some(model.name.as_str())
            }
            (Some(_), TypeName::EntityType(name)) => {
                return Err(SqlError::UnsupportedByDialect {
                    construct: format!("isof on a value with entity type '{}'", name),
                    dialect: self.dialect.name(),
                });
            }
        };

        Ok(SqlFragment::raw(if matches { "1 = 1" } else { "1 = 0" }))
    }

    fn lambda(
        &mut self,
        kind: LambdaKind,
        navigation: &str,
        predicate: Option<&FilterExpression>,
    ) -> Fragment {
        if self.lambda.is_some() {
            return Err(SqlError::Untranslatable("nested lambda expression".to_string()));
        }

        let model = self
            .model
            .ok_or_else(|| SqlError::UnknownNavigation(navigation.to_string()))?;
        let nav = model
            .property(navigation)
            .and_then(|p| p.navigation.as_ref())
            .ok_or_else(|| SqlError::UnknownNavigation(navigation.to_string()))?;

        let alias = format!("l{}", self.counter);
        self.counter += 1;

        let correlation = format!(
            "SELECT 1 FROM {table} AS {alias} WHERE {alias}.{target} = {root}.{source}",
            table = nav.target_table,
            alias = alias,
            target = nav.target_column,
            root = model.table,
            source = nav.source_column,
        );

        self.lambda = Some(LambdaScope {
            alias,
            navigation: nav,
            target: self.catalog.and_then(|c| c.navigation_target(nav)),
        });
        let predicate = predicate.map(|p| self.condition(p)).transpose();
        self.lambda = None;
        let predicate = predicate?;

        let out = match (kind, predicate) {
            (LambdaKind::Any, None) => SqlFragment::raw(format!("EXISTS ({})", correlation)),
            (LambdaKind::Any, Some(p)) => {
                SqlFragment::compose(&format!("EXISTS ({} AND ($))", correlation), &[&p])
            }
            (LambdaKind::All, Some(p)) => {
                SqlFragment::compose(&format!("NOT EXISTS ({} AND NOT ($))", correlation), &[&p])
            }
            // Vacuously true.
            (LambdaKind::All, None) => SqlFragment::raw("1 = 1"),
        };
        Ok(out)
    }

    // ========================================
    // Values
    // ========================================

    fn scalar(&mut self, expr: &ScalarExpr) -> Fragment {
        match expr {
            ScalarExpr::Property(property) => Ok(SqlFragment::raw(self.column(property))),

            ScalarExpr::NavigationProperty {
                navigation,
                property,
            } => self.navigation_property(navigation, property),

            ScalarExpr::CurrentElement => {
                let scope = self.lambda.as_ref().ok_or_else(|| {
                    SqlError::Untranslatable("range variable outside a lambda".to_string())
                })?;
                let column = scope.navigation.value_column.as_deref().ok_or_else(|| {
                    SqlError::Untranslatable(format!(
                        "range variable over '{}', which is not a collection of values",
                        scope.navigation.target_table
                    ))
                })?;
                Ok(SqlFragment::raw(format!("{}.{}", scope.alias, column)))
            }

            ScalarExpr::Alias(name) => self.alias(name),

            ScalarExpr::Literal(Literal::Spatial(spatial)) => {
                let template = self
                    .dialect
                    .spatial_literal(spatial.kind == SpatialKind::Geography);
                Ok(SqlFragment {
                    sql: template.to_string(),
                    args: vec![
                        Literal::String(spatial.wkt.clone()),
                        Literal::Integer(i64::from(spatial.srid)),
                    ],
                })
            }

            ScalarExpr::Literal(value) => Ok(SqlFragment::bind(value.clone())),

            ScalarExpr::Arithmetic { op, left, right } => {
                let left = self.scalar(left)?;
                let right = self.scalar(right)?;
                Ok(SqlFragment::compose(
                    &format!("($ {} $)", op.sql_symbol()),
                    &[&left, &right],
                ))
            }

            ScalarExpr::Negate(inner) => {
                let inner = self.scalar(inner)?;
                Ok(SqlFragment::compose("(-$)", &[&inner]))
            }

            ScalarExpr::Function { function, args } => self.function(*function, args),

            ScalarExpr::Cast { operand, target } => {
                let operand = operand.as_deref().ok_or_else(|| {
                    SqlError::Untranslatable("cast without an operand".to_string())
                })?;
                let ty = match target {
                    TypeName::Primitive(ty) => self.cast_type(*ty)?,
                    TypeName::EntityType(name) => {
                        return Err(SqlError::Untranslatable(format!("cast to entity type '{}'", name)));
                    }
                };
                let operand = self.scalar(operand)?;
                Ok(SqlFragment::compose(&format!("CAST($ AS {})", ty), &[&operand]))
            }

            ScalarExpr::Condition(inner) => {
                let inner = self.condition(inner)?;
                let template = match self.dialect {
                    Dialect::SqlServer => "CASE WHEN $ THEN 1 ELSE 0 END",
                    _ => "($)",
                };
                Ok(SqlFragment::compose(template, &[&inner]))
            }
        }
    }

    fn column(&self, property: &PropertyRef) -> String {
        match &self.lambda {
            Some(scope) => {
                let column = scope
                    .target
                    .and_then(|t| t.property(&property.name))
                    .map_or_else(|| property.column().to_string(), |p| p.column.clone());
                format!("{}.{}", scope.alias, column)
            }
            None => property.column().to_string(),
        }
    }

    /// Correlated scalar subquery over a single-valued navigation.
    fn navigation_property(&mut self, navigation: &str, property: &PropertyRef) -> Fragment {
        let unknown = || SqlError::UnknownNavigation(navigation.to_string());

        if self.lambda.is_some() {
            return Err(SqlError::Untranslatable(format!(
                "navigation '{}' inside a lambda",
                navigation
            )));
        }

        let model = self.model.ok_or_else(unknown)?;
        let nav = model
            .property(navigation)
            .and_then(|p| p.navigation.as_ref())
            .ok_or_else(unknown)?;

        let alias = format!("n{}", self.counter);
        self.counter += 1;

        Ok(SqlFragment::raw(format!(
            "(SELECT {alias}.{column} FROM {table} AS {alias} WHERE {alias}.{target} = {root}.{source})",
            alias = alias,
            column = property.column(),
            table = nav.target_table,
            target = nav.target_column,
            root = model.table,
            source = nav.source_column,
        )))
    }

    fn alias(&mut self, name: &str) -> Fragment {
        // `$count` is not a valid SQL identifier, so it is always inlined.
        if self.aliases == AliasMode::Reference && !name.starts_with('$') {
            return Ok(SqlFragment::raw(name));
        }

        let registry = self
            .registry
            .ok_or_else(|| SqlError::UnknownAlias(name.to_string()))?;
        let definition = registry
            .get(name)
            .ok_or_else(|| SqlError::UnknownAlias(name.to_string()))?;

        if self.expanding.iter().any(|a| a == name) {
            return Err(SqlError::Untranslatable(format!(
                "alias '{}' is defined in terms of itself",
                name
            )));
        }

        self.expanding.push(name.to_string());
        let expanded = match definition {
            AliasDefinition::Expression(expr) => self.scalar(expr),
            AliasDefinition::Aggregate(aggregation) => self.aggregation(aggregation),
        };
        self.expanding.pop();

        Ok(SqlFragment::compose("($)", &[&expanded?]))
    }

    fn aggregation(&mut self, aggregation: &Aggregation) -> Fragment {
        match aggregation {
            Aggregation::Count => Ok(SqlFragment::raw("COUNT(*)")),
            Aggregation::Method { method, expr } => {
                let expr = self.scalar(expr)?;
                Ok(SqlFragment::compose(method.sql_template(), &[&expr]))
            }
        }
    }

    fn cast_type(&self, ty: PrimitiveType) -> Result<&'static str, SqlError> {
        self.dialect
            .cast_type(ty)
            .ok_or_else(|| SqlError::UnsupportedByDialect {
                construct: format!("cast to {}", ty.edm_name()),
                dialect: self.dialect.name(),
            })
    }

    fn unsupported(&self, function: Function) -> SqlError {
        SqlError::UnsupportedByDialect {
            construct: format!("function '{}'", function.name()),
            dialect: self.dialect.name(),
        }
    }

    // ========================================
    // Functions
    // ========================================

    fn function(&mut self, function: Function, args: &[ScalarExpr]) -> Fragment {
        use Function as F;

        match function {
            F::Now => return Ok(SqlFragment::raw(self.dialect.now())),
            F::MinDateTime => {
                return Ok(SqlFragment::bind(Literal::DateTimeOffset(
                    "0001-01-01T00:00:00Z".to_string(),
                )));
            }
            F::MaxDateTime => {
                return Ok(SqlFragment::bind(Literal::DateTimeOffset(
                    "9999-12-31T23:59:59.999Z".to_string(),
                )));
            }
            F::Contains | F::StartsWith | F::EndsWith => return self.like(function, args),
            _ => {}
        }

        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            operands.push(self.scalar(arg)?);
        }
        let operands: Vec<&SqlFragment> = operands.iter().collect();

        let template = match function {
            F::Length | F::ToLower | F::ToUpper | F::Trim | F::IndexOf | F::MatchesPattern => self
                .dialect
                .string_function(function)
                .ok_or_else(|| self.unsupported(function))?
                .to_string(),
            F::Concat => self.dialect.concat(operands.len()),
            F::Substring => self.dialect.substring(operands.len() == 3).to_string(),
            F::Year
            | F::Month
            | F::Day
            | F::Hour
            | F::Minute
            | F::Second
            | F::FractionalSeconds
            | F::TotalOffsetMinutes
            | F::Date
            | F::Time => self
                .dialect
                .date_part(function)
                .ok_or_else(|| self.unsupported(function))?
                .to_string(),
            F::Round => match self.dialect {
                Dialect::SqlServer => "ROUND($, 0)".to_string(),
                _ => "ROUND($)".to_string(),
            },
            F::Ceiling => format!(
                "CASE WHEN $ = {trunc} THEN $ ELSE {trunc} + (CASE WHEN $ > 0 THEN 1 ELSE 0 END) END",
                trunc = self.dialect.truncate()
            ),
            F::Floor => format!(
                "CASE WHEN $ = {trunc} THEN $ ELSE {trunc} - (CASE WHEN $ < 0 THEN 1 ELSE 0 END) END",
                trunc = self.dialect.truncate()
            ),
            F::GeoDistance | F::GeoLength | F::GeoIntersects => self
                .dialect
                .spatial(function)
                .ok_or_else(|| self.unsupported(function))?
                .to_string(),
            F::Now | F::MinDateTime | F::MaxDateTime | F::Contains | F::StartsWith | F::EndsWith => {
                return Err(SqlError::Untranslatable(format!("function '{}'", function.name())));
            }
        };

        Ok(SqlFragment::compose(&template, &operands))
    }

    /// `contains`, `startswith` and `endswith` as `LIKE` with `!` as escape.
    fn like(&mut self, function: Function, args: &[ScalarExpr]) -> Fragment {
        let [subject, needle] = args else {
            return Err(SqlError::Untranslatable(format!("function '{}'", function.name())));
        };

        let subject = self.scalar(subject)?;

        let (prefix, suffix) = match function {
            Function::StartsWith => ("", "%"),
            Function::EndsWith => ("%", ""),
            _ => ("%", "%"),
        };

        let pattern = match needle {
            ScalarExpr::Literal(Literal::String(text)) => SqlFragment::bind(Literal::String(format!(
                "{}{}{}",
                prefix,
                escape_like(text),
                suffix
            ))),
            other => {
                let needle = self.scalar(other)?;
                let wildcard = SqlFragment::raw("'%'");
                let mut parts = Vec::new();
                if !prefix.is_empty() {
                    parts.push(&wildcard);
                }
                parts.push(&needle);
                if !suffix.is_empty() {
                    parts.push(&wildcard);
                }
                SqlFragment::compose(&self.dialect.concat(parts.len()), &parts)
            }
        };

        Ok(SqlFragment::compose("$ LIKE $ ESCAPE '!'", &[&subject, &pattern]))
    }
}

fn projection(expr: &SqlFragment, alias: &str) -> SqlFragment {
    // Appended, not composed: aliases may start with `$`.
    let mut out = expr.clone();
    out.sql.push_str(" AS ");
    out.sql.push_str(alias);
    out
}

fn conjunction(conditions: Vec<SqlFragment>) -> Option<SqlFragment> {
    match conditions.len() {
        0 => None,
        1 => conditions.into_iter().next(),
        _ => {
            let wrapped: Vec<SqlFragment> = conditions
                .iter()
                .map(|c| SqlFragment::compose("($)", &[c]))
                .collect();
            Some(SqlFragment::join(&wrapped, " AND "))
        }
    }
}

/// Escape LIKE metacharacters with `!`.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '!' | '%' | '_' | '[') {
            out.push('!');
        }
        out.push(c);
    }
    out
}
