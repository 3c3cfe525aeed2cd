//! The `$apply` and `$compute` pipeline.
//!
//! `$apply` is a `/`-separated list of transformations:
//!
//! ```text
//! filter(Price gt 5)/groupby((Category), aggregate(Price with sum as Total))/filter(Total gt 100)
//! ```
//!
//! `$compute` is a comma-separated list of `<expr> as <alias>` entries.
//!
//! Both are handled in two phases. Parsing splits the text into raw
//! [`ApplyStep`]s and [`ComputeEntry`]s without looking at the model, which
//! is enough to collect every alias up front with [`collect_aliases`]. Only
//! then are the embedded expressions resolved, so an alias may be used by
//! any option regardless of where it is introduced.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use tracing::trace;

use crate::{
    alias::{AliasDefinition, AliasRegistry, AliasSet},
    converter::ExpressionResolver,
    error::{OptionError, QueryError},
    filter::{FilterExpression, ScalarExpr},
    model::EntityModel,
};

static AGGREGATE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(.+?)\s+with\s+([A-Za-z]+)\s+as\s+([A-Za-z_][A-Za-z0-9_]*)\s*$")
        .expect("valid regex")
});

static COUNT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\$count\s+as\s+([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("valid regex")
});

static ALIAS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Alias `groupby` introduces for the number of rows in each group.
pub const GROUP_COUNT: &str = "$count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateMethod {
    Sum,
    Min,
    Max,
    Average,
    CountDistinct,
}

impl AggregateMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(AggregateMethod::Sum),
            "min" => Some(AggregateMethod::Min),
            "max" => Some(AggregateMethod::Max),
            "average" => Some(AggregateMethod::Average),
            "countdistinct" => Some(AggregateMethod::CountDistinct),
            _ => None,
        }
    }

    /// SQL template; `$` marks the aggregated expression.
    pub fn sql_template(&self) -> &'static str {
        match self {
            AggregateMethod::Sum => "SUM($)",
            AggregateMethod::Min => "MIN($)",
            AggregateMethod::Max => "MAX($)",
            AggregateMethod::Average => "AVG($)",
            AggregateMethod::CountDistinct => "COUNT(DISTINCT $)",
        }
    }

    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggregateMethod::Sum | AggregateMethod::Average)
    }
}

impl fmt::Display for AggregateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateMethod::Sum => "sum",
            AggregateMethod::Min => "min",
            AggregateMethod::Max => "max",
            AggregateMethod::Average => "average",
            AggregateMethod::CountDistinct => "countdistinct",
        };
        f.write_str(name)
    }
}

// ========================================
// Raw (unresolved) entries
// ========================================

/// One `aggregate` entry before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    /// `None` for `$count as <alias>`
    pub source: Option<(String, AggregateMethod)>,
    pub alias: String,
}

/// One `<expr> as <alias>` entry before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEntry {
    pub expression: String,
    pub alias: String,
}

/// One `$apply` transformation before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyStep {
    GroupBy {
        properties: Vec<String>,
        aggregate: Vec<AggregateEntry>,
    },
    Aggregate(Vec<AggregateEntry>),
    Filter(String),
    Compute(Vec<ComputeEntry>),
}

impl ApplyStep {
    /// Aliases this step introduces, in declaration order.
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            ApplyStep::GroupBy { aggregate, .. } => std::iter::once(GROUP_COUNT)
                .chain(aggregate.iter().map(|a| a.alias.as_str()))
                .collect(),
            ApplyStep::Aggregate(entries) => entries.iter().map(|a| a.alias.as_str()).collect(),
            ApplyStep::Compute(entries) => entries.iter().map(|c| c.alias.as_str()).collect(),
            ApplyStep::Filter(_) => Vec::new(),
        }
    }
}

// ========================================
// Resolved transformations
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Count,
    Method {
        method: AggregateMethod,
        expr: ScalarExpr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateItem {
    pub alias: String,
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeItem {
    pub expr: ScalarExpr,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyTransformation {
    GroupBy {
        properties: Vec<ScalarExpr>,
        aggregate: Vec<AggregateItem>,
    },
    Aggregate(Vec<AggregateItem>),
    Filter(FilterExpression),
    Compute(Vec<ComputeItem>),
}

// ========================================
// Parsing
// ========================================

fn malformed(option: &'static str, entry: &str, reason: &str) -> OptionError {
    OptionError::MalformedEntry {
        option,
        entry: entry.trim().to_string(),
        reason: reason.to_string(),
    }
}

/// Split `text` on `separator` wherever it sits outside parentheses and
/// string literals. Doubled quotes inside a literal toggle twice and so
/// leave the state unchanged.
pub fn split_top_level<'t>(
    text: &'t str,
    separator: char,
    option: &'static str,
) -> Result<Vec<&'t str>, OptionError> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed(option, text, "unbalanced ')'"))?;
            }
            c if c == separator && depth == 0 && !in_string => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if in_string {
        return Err(malformed(option, text, "unterminated string literal"));
    }
    if depth != 0 {
        return Err(malformed(option, text, "unbalanced '('"));
    }

    parts.push(&text[start..]);
    Ok(parts)
}

/// Byte offset of the `)` closing the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;

    for (i, c) in text[open..].char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `<name>(<body>)` into its name and body.
fn call_parts<'t>(text: &'t str, option: &'static str) -> Result<(&'t str, &'t str), OptionError> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| malformed(option, text, "expected '<transformation>(...)'"))?;
    let close = matching_paren(text, open)
        .ok_or_else(|| malformed(option, text, "unbalanced parentheses"))?;

    if close != text.len() - 1 {
        return Err(malformed(option, text, "unexpected text after ')'"));
    }
    Ok((text[..open].trim(), &text[open + 1..close]))
}

/// Position of the last top-level ` as ` keyword, case-insensitive.
fn find_as(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut found = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth = depth.saturating_sub(1),
            b if b.is_ascii_whitespace() && depth == 0 && !in_string => {
                let rest = &bytes[i + 1..];
                if rest.len() > 3
                    && rest[..2].eq_ignore_ascii_case(b"as")
                    && rest[2].is_ascii_whitespace()
                {
                    found = Some((i, i + 3));
                }
            }
            _ => {}
        }
    }
    found
}

fn check_alias(alias: &str, option: &'static str, entry: &str) -> Result<(), OptionError> {
    if ALIAS_NAME.is_match(alias) {
        Ok(())
    } else {
        Err(malformed(option, entry, "alias must be a simple identifier"))
    }
}

/// Parse comma-separated `<expr> as <alias>` entries.
pub fn parse_compute(text: &str, option: &'static str) -> Result<Vec<ComputeEntry>, OptionError> {
    let mut entries = Vec::new();

    for entry in split_top_level(text, ',', option)? {
        let (end, alias_start) =
            find_as(entry).ok_or_else(|| malformed(option, entry, "expected '<expression> as <alias>'"))?;

        let expression = entry[..end].trim();
        let alias = entry[alias_start..].trim();
        if expression.is_empty() {
            return Err(malformed(option, entry, "missing expression"));
        }
        check_alias(alias, option, entry)?;

        entries.push(ComputeEntry {
            expression: expression.to_string(),
            alias: alias.to_string(),
        });
    }
    Ok(entries)
}

/// Parse comma-separated `aggregate` entries.
pub fn parse_aggregate(text: &str) -> Result<Vec<AggregateEntry>, OptionError> {
    let mut entries = Vec::new();

    for entry in split_top_level(text, ',', "$apply")? {
        if let Some(caps) = COUNT_ENTRY.captures(entry) {
            entries.push(AggregateEntry {
                source: None,
                alias: caps[1].to_string(),
            });
            continue;
        }

        let caps = AGGREGATE_ENTRY.captures(entry).ok_or_else(|| {
            malformed("$apply", entry, "expected '<expression> with <method> as <alias>'")
        })?;
        let method = AggregateMethod::from_name(&caps[2])
            .ok_or_else(|| malformed("$apply", entry, "unknown aggregation method"))?;

        entries.push(AggregateEntry {
            source: Some((caps[1].trim().to_string(), method)),
            alias: caps[3].to_string(),
        });
    }
    Ok(entries)
}

/// `groupby((P1, P2)[, aggregate(...)])`
fn parse_groupby(body: &str) -> Result<ApplyStep, OptionError> {
    let body = body.trim();
    if !body.starts_with('(') {
        return Err(malformed("$apply", body, "groupby expects a parenthesized property list"));
    }
    let close = matching_paren(body, 0)
        .ok_or_else(|| malformed("$apply", body, "unbalanced parentheses"))?;

    let mut properties = Vec::new();
    for property in split_top_level(&body[1..close], ',', "$apply")? {
        let property = property.trim();
        if property.is_empty() {
            return Err(malformed("$apply", body, "empty grouping property"));
        }
        properties.push(property.to_string());
    }

    let rest = body[close + 1..].trim();
    let aggregate = if rest.is_empty() {
        Vec::new()
    } else {
        let rest = rest
            .strip_prefix(',')
            .ok_or_else(|| malformed("$apply", body, "expected ',' after the property list"))?;
        let (name, inner) = call_parts(rest, "$apply")?;
        if !name.eq_ignore_ascii_case("aggregate") {
            return Err(malformed("$apply", rest, "groupby may only nest aggregate(...)"));
        }
        parse_aggregate(inner)?
    };

    Ok(ApplyStep::GroupBy {
        properties,
        aggregate,
    })
}

/// Split an `$apply` value into its transformations.
pub fn parse_apply(text: &str) -> Result<Vec<ApplyStep>, OptionError> {
    let mut steps = Vec::new();

    for part in split_top_level(text, '/', "$apply")? {
        let (name, body) = call_parts(part, "$apply")?;

        let step = match name.to_ascii_lowercase().as_str() {
            "groupby" => parse_groupby(body)?,
            "aggregate" => ApplyStep::Aggregate(parse_aggregate(body)?),
            "filter" => {
                if body.trim().is_empty() {
                    return Err(malformed("$apply", part, "empty filter"));
                }
                ApplyStep::Filter(body.trim().to_string())
            }
            "compute" => ApplyStep::Compute(parse_compute(body, "$apply")?),
            _ => return Err(malformed("$apply", part, "unknown transformation")),
        };
        trace!(step = name, "parsed apply step");
        steps.push(step);
    }
    Ok(steps)
}

/// Collect every alias from `$apply` and `$compute` into `aliases`.
///
/// An alias may be declared once and may not shadow a declared property.
/// The implicit group count may appear any number of times.
pub fn collect_aliases(
    steps: &[ApplyStep],
    compute: &[ComputeEntry],
    model: Option<&EntityModel>,
    aliases: &mut AliasSet,
) -> Result<(), OptionError> {
    let declared = steps
        .iter()
        .flat_map(|step| step.aliases())
        .chain(compute.iter().map(|c| c.alias.as_str()));

    for alias in declared {
        if alias == GROUP_COUNT {
            aliases.insert(alias);
            continue;
        }
        if model.is_some_and(|m| m.property(alias).is_some()) || !aliases.insert(alias) {
            return Err(OptionError::DuplicateAlias(alias.to_string()));
        }
    }
    Ok(())
}

// ========================================
// Resolution
// ========================================

// Aliases are visible to the entries after the one that defines them.
fn require_defined(referenced: Vec<String>, registry: &AliasRegistry) -> Result<(), OptionError> {
    match referenced.into_iter().find(|name| !registry.contains(name)) {
        Some(name) => Err(OptionError::AliasNotYetDefined(name)),
        None => Ok(()),
    }
}

fn resolve_aggregate(
    entries: &[AggregateEntry],
    resolver: &ExpressionResolver<'_>,
    registry: &mut AliasRegistry,
) -> Result<Vec<AggregateItem>, QueryError> {
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let aggregation = match &entry.source {
            None => Aggregation::Count,
            Some((text, method)) => {
                let expr = resolver.scalar(text)?;
                let referenced = expr.alias_names();
                if referenced.iter().any(|name| registry.is_aggregate(name)) {
                    return Err(malformed("$apply", text, "cannot aggregate an aggregate alias").into());
                }
                require_defined(referenced, registry)?;
                if method.requires_numeric()
                    && expr.static_type().is_some_and(|ty| !ty.is_numeric())
                {
                    return Err(malformed(
                        "$apply",
                        text,
                        &format!("{} requires a numeric expression", method),
                    )
                    .into());
                }
                Aggregation::Method {
                    method: *method,
                    expr,
                }
            }
        };

        registry.define(&entry.alias, AliasDefinition::Aggregate(aggregation.clone()))?;
        items.push(AggregateItem {
            alias: entry.alias.clone(),
            aggregation,
        });
    }
    Ok(items)
}

/// Resolve compute entries, registering each alias definition.
pub fn resolve_compute(
    entries: &[ComputeEntry],
    resolver: &ExpressionResolver<'_>,
    registry: &mut AliasRegistry,
) -> Result<Vec<ComputeItem>, QueryError> {
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let expr = resolver.scalar(&entry.expression)?;
        require_defined(expr.alias_names(), registry)?;
        registry.define(&entry.alias, AliasDefinition::Expression(expr.clone()))?;
        items.push(ComputeItem {
            expr,
            alias: entry.alias.clone(),
        });
    }
    Ok(items)
}

/// Resolve parsed `$apply` steps, registering every alias they define.
pub fn resolve_apply(
    steps: &[ApplyStep],
    resolver: &ExpressionResolver<'_>,
    registry: &mut AliasRegistry,
) -> Result<Vec<ApplyTransformation>, QueryError> {
    let mut resolved = Vec::with_capacity(steps.len());

    for step in steps {
        let transformation = match step {
            ApplyStep::GroupBy {
                properties,
                aggregate,
            } => {
                let mut columns = Vec::with_capacity(properties.len());
                for property in properties {
                    let expr = resolver.scalar(property)?;
                    if !matches!(
                        expr,
                        ScalarExpr::Property(_) | ScalarExpr::NavigationProperty { .. }
                    ) {
                        return Err(malformed("$apply", property, "groupby accepts properties only").into());
                    }
                    columns.push(expr);
                }

                registry.redefine(GROUP_COUNT, AliasDefinition::Aggregate(Aggregation::Count));
                let aggregate = resolve_aggregate(aggregate, resolver, registry)?;

                ApplyTransformation::GroupBy {
                    properties: columns,
                    aggregate,
                }
            }
            ApplyStep::Aggregate(entries) => {
                ApplyTransformation::Aggregate(resolve_aggregate(entries, resolver, registry)?)
            }
            ApplyStep::Filter(text) => {
                let filter = resolver.filter(text)?;
                require_defined(filter.alias_names(), registry)?;
                ApplyTransformation::Filter(filter)
            }
            ApplyStep::Compute(entries) => {
                ApplyTransformation::Compute(resolve_compute(entries, resolver, registry)?)
            }
        };
        resolved.push(transformation);
    }
    Ok(resolved)
}
