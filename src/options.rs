//! Query-option orchestration.
//!
//! [`OptionsParser::parse`] takes a whole query string, validates the option
//! set and dispatches each value to the right sub-compiler:
//!
//! 1. split on `&`, reject unknown or repeated system options
//! 2. reject mutually exclusive combinations
//! 3. parse `$apply` and `$compute` and collect every alias they introduce
//! 4. resolve those definitions, then `$filter`, `$orderby`, `$select` and
//!    `$expand` with all aliases visible
//! 5. validate paging, `$count` and the remaining scalar options
//!
//! The input is expected to be percent-decoded already.

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use crate::{
    alias::{AliasSet, CompileContext},
    ast::SortDirection,
    config::CompilerConfig,
    converter::{Converter, ExpressionResolver},
    error::{OptionError, QueryError, SemanticError},
    filter::{FilterExpression, ScalarExpr},
    model::{EntityModel, MetadataProvider},
    pool::Pools,
    transform::{self, ApplyTransformation, ComputeItem},
};

/// System options, by lower-cased name.
pub const SYSTEM_OPTIONS: [&str; 14] = [
    "$filter",
    "$select",
    "$expand",
    "$orderby",
    "$top",
    "$skip",
    "$skiptoken",
    "$deltatoken",
    "$count",
    "$search",
    "$apply",
    "$compute",
    "$index",
    "$schemaversion",
];

const EXCLUSIVE: [(&str, &str); 3] = [
    ("$skip", "$skiptoken"),
    ("$skip", "$deltatoken"),
    ("$skiptoken", "$deltatoken"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: ScalarExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    All,
    Property(String),
    /// A `$compute` or `$apply` alias
    Computed(String),
    /// A bare navigation property: selects the link, does not expand it
    NavigationLink(String),
}

/// One expanded navigation with its nested options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandItem {
    pub navigation: String,
    pub select: Vec<SelectItem>,
    pub filter: Option<FilterExpression>,
    pub order_by: Vec<OrderByItem>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: bool,
    pub expand: Vec<ExpandItem>,
}

impl ExpandItem {
    pub fn new(navigation: &str) -> Self {
        ExpandItem {
            navigation: navigation.to_string(),
            ..Default::default()
        }
    }
}

/// Everything a query string asked for, validated and resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<FilterExpression>,
    pub select: Vec<SelectItem>,
    pub expand: Vec<ExpandItem>,
    pub order_by: Vec<OrderByItem>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub skip_token: Option<String>,
    pub delta_token: Option<String>,
    pub count: bool,
    pub search: Option<String>,
    pub apply: Vec<ApplyTransformation>,
    pub compute: Vec<ComputeItem>,
    pub index: bool,
    pub schema_version: Option<String>,
    /// Non-system parameters, verbatim and in order
    pub custom: Vec<(String, String)>,
}

/// Split a query string into system options (by lower-cased name) and
/// custom parameters.
#[instrument(level = "trace", skip_all)]
pub fn split_query(
    query: &str,
) -> Result<(IndexMap<String, String>, Vec<(String, String)>), OptionError> {
    let query = query.trim().trim_start_matches('?');
    let mut system = IndexMap::new();
    let mut custom = Vec::new();

    for pair in split_unquoted(query, '&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));

        if !name.starts_with('$') {
            custom.push((name.to_string(), value.to_string()));
            continue;
        }

        let lower = name.to_ascii_lowercase();
        if !SYSTEM_OPTIONS.contains(&lower.as_str()) {
            debug!(option = name, "rejected unknown query option");
            return Err(OptionError::UnknownOption(name.to_string()));
        }
        if system.contains_key(&lower) {
            debug!(option = name, "rejected repeated query option");
            return Err(OptionError::DuplicateOption(lower));
        }
        trace!(option = %lower, "accepted query option");
        system.insert(lower, value.to_string());
    }

    for (a, b) in EXCLUSIVE {
        if system.contains_key(a) && system.contains_key(b) {
            return Err(OptionError::MutuallyExclusive(a.to_string(), b.to_string()));
        }
    }

    Ok((system, custom))
}

/// Split on `separator` outside single-quoted literals.
fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if c == '\'' {
            in_string = !in_string;
        } else if c == separator && !in_string {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn paging(option: &str, value: &str, max: Option<u64>) -> Result<u64, OptionError> {
    let invalid = |reason: String| OptionError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason,
    };

    let n = value
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid("expected a non-negative integer".to_string()))?;

    match max {
        Some(max) if n > max => Err(invalid(format!("exceeds the maximum of {}", max))),
        _ => Ok(n),
    }
}

fn flag(option: &str, value: &str) -> Result<bool, OptionError> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(OptionError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
            reason: "expected 'true' or 'false'".to_string(),
        }),
    }
}

fn non_empty(option: &str, value: &str) -> Result<String, OptionError> {
    if value.trim().is_empty() {
        return Err(OptionError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value.to_string())
}

/// Validates and resolves the option set for one entity.
pub struct OptionsParser<'a> {
    model: Option<&'a EntityModel>,
    catalog: Option<&'a dyn MetadataProvider>,
    config: &'a CompilerConfig,
    pools: &'a Pools,
}

impl<'a> OptionsParser<'a> {
    pub fn new(model: Option<&'a EntityModel>, config: &'a CompilerConfig, pools: &'a Pools) -> Self {
        OptionsParser {
            model,
            catalog: None,
            config,
            pools,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a dyn MetadataProvider) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn converter<'c>(&self, model: Option<&'c EntityModel>, aliases: &'c AliasSet) -> Converter<'c>
    where
        'a: 'c,
    {
        let converter = Converter::new(model, aliases, self.config.max_in_clause_size);
        match self.catalog {
            Some(catalog) => converter.with_catalog(catalog),
            None => converter,
        }
    }

    /// Compile every option in `query`, recording aliases in `context`.
    #[instrument(level = "debug", skip_all)]
    pub fn parse(&self, query: &str, context: &mut CompileContext) -> Result<QueryOptions, QueryError> {
        let (system, custom) = split_query(query)?;
        let get = |name: &str| system.get(name).map(String::as_str);

        let mut options = QueryOptions {
            custom,
            ..Default::default()
        };

        // Every alias is collected before any expression is resolved.
        let apply_steps = match get("$apply") {
            Some(text) => transform::parse_apply(text)?,
            None => Vec::new(),
        };
        let compute_entries = match get("$compute") {
            Some(text) => transform::parse_compute(text, "$compute")?,
            None => Vec::new(),
        };
        transform::collect_aliases(&apply_steps, &compute_entries, self.model, &mut context.aliases)?;

        let resolver = ExpressionResolver::new(self.pools, self.converter(self.model, &context.aliases));

        options.compute = transform::resolve_compute(&compute_entries, &resolver, &mut context.registry)
            .map_err(|e| e.in_option("$compute"))?;
        options.apply = transform::resolve_apply(&apply_steps, &resolver, &mut context.registry)
            .map_err(|e| e.in_option("$apply"))?;

        if let Some(text) = get("$filter") {
            let filter = resolver.filter(text).map_err(|e| e.in_option("$filter"))?;
            if let Some(alias) = filter
                .alias_names()
                .into_iter()
                .find(|name| context.registry.is_aggregate(name))
            {
                return Err(OptionError::AggregateInRowFilter(alias).into());
            }
            options.filter = Some(filter);
        }
        if let Some(text) = get("$orderby") {
            options.order_by = self
                .order_by(text, &resolver)
                .map_err(|e| e.in_option("$orderby"))?;
        }
        if let Some(text) = get("$select") {
            options.select = self
                .select(text, self.model, &context.aliases, &mut options.expand, 0)
                .map_err(|e| e.in_option("$select"))?;
        }
        if let Some(text) = get("$expand") {
            self.expand(text, self.model, 1, &mut options.expand)
                .map_err(|e| e.in_option("$expand"))?;
        }

        if let Some(value) = get("$top") {
            options.top = Some(paging("$top", value, self.config.max_top)?);
        }
        if let Some(value) = get("$skip") {
            options.skip = Some(paging("$skip", value, None)?);
        }
        if let Some(value) = get("$skiptoken") {
            options.skip_token = Some(non_empty("$skiptoken", value)?);
        }
        if let Some(value) = get("$deltatoken") {
            options.delta_token = Some(non_empty("$deltatoken", value)?);
        }
        if let Some(value) = get("$count") {
            options.count = flag("$count", value)?;
        }
        if let Some(value) = get("$search") {
            options.search = Some(non_empty("$search", value)?);
        }
        if let Some(value) = get("$schemaversion") {
            options.schema_version = Some(non_empty("$schemaversion", value)?);
        }
        options.index = get("$index").is_some();

        Ok(options)
    }

    fn order_by(&self, text: &str, resolver: &ExpressionResolver<'_>) -> Result<Vec<OrderByItem>, QueryError> {
        let mut items = Vec::new();
        for part in transform::split_top_level(text, ',', "$orderby")? {
            let (expr, direction) = resolver.order_by(part)?;
            items.push(OrderByItem { expr, direction });
        }
        Ok(items)
    }

    /// Resolve a `$select` list. `Nav/Prop` items are folded into an expand
    /// of `Nav` selecting `Prop`.
    fn select(
        &self,
        text: &str,
        model: Option<&EntityModel>,
        aliases: &AliasSet,
        expand: &mut Vec<ExpandItem>,
        depth: usize,
    ) -> Result<Vec<SelectItem>, QueryError> {
        let mut items = Vec::new();

        for part in transform::split_top_level(text, ',', "$select")? {
            let part = part.trim();
            if part.is_empty() {
                return Err(OptionError::MalformedEntry {
                    option: "$select",
                    entry: text.to_string(),
                    reason: "empty item".to_string(),
                }
                .into());
            }

            if part == "*" {
                items.push(SelectItem::All);
                continue;
            }

            if let Some((navigation, rest)) = part.split_once('/') {
                let (name, target) = self.navigation(navigation, model)?;
                if depth + 1 > self.config.max_expand_depth {
                    return Err(OptionError::ExpandTooDeep(self.config.max_expand_depth).into());
                }

                let item = find_or_insert(expand, &name);
                let nested = self.select(rest, target, &AliasSet::new(), &mut item.expand, depth + 1)?;
                item.select.extend(nested);
                continue;
            }

            let item = match model {
                None => SelectItem::Property(part.to_string()),
                Some(model) => match model.property(part) {
                    Some(p) if p.is_navigation() => SelectItem::NavigationLink(p.name.clone()),
                    Some(p) => SelectItem::Property(p.name.clone()),
                    None if aliases.contains(part) => SelectItem::Computed(part.to_string()),
                    None => {
                        return Err(SemanticError::UnknownProperty {
                            name: part.to_string(),
                            offset: None,
                        }
                        .into());
                    }
                },
            };
            items.push(item);
        }
        Ok(items)
    }

    /// Check that `name` is a navigation of `model` and find its target.
    fn navigation(
        &self,
        name: &str,
        model: Option<&EntityModel>,
    ) -> Result<(String, Option<&'a EntityModel>), QueryError> {
        let Some(model) = model else {
            return Ok((name.to_string(), None));
        };

        let property = model.property(name).ok_or_else(|| SemanticError::UnknownProperty {
            name: name.to_string(),
            offset: None,
        })?;
        let navigation = property.navigation.as_ref().ok_or_else(|| OptionError::InvalidValue {
            option: "$expand".to_string(),
            value: name.to_string(),
            reason: "not a navigation property".to_string(),
        })?;

        let target = self.catalog.and_then(|c| c.navigation_target(navigation));
        Ok((property.name.clone(), target))
    }

    /// Resolve an `$expand` list at nesting level `depth` into `items`.
    fn expand(
        &self,
        text: &str,
        model: Option<&EntityModel>,
        depth: usize,
        items: &mut Vec<ExpandItem>,
    ) -> Result<(), QueryError> {
        if depth > self.config.max_expand_depth {
            return Err(OptionError::ExpandTooDeep(self.config.max_expand_depth).into());
        }

        for part in transform::split_top_level(text, ',', "$expand")? {
            let part = part.trim();
            let (name, nested) = match part.find('(') {
                Some(open) if part.ends_with(')') => (part[..open].trim(), Some(&part[open + 1..part.len() - 1])),
                Some(_) => {
                    return Err(OptionError::MalformedEntry {
                        option: "$expand",
                        entry: part.to_string(),
                        reason: "unexpected text after ')'".to_string(),
                    }
                    .into());
                }
                None => (part, None),
            };

            if name.is_empty() {
                return Err(OptionError::MalformedEntry {
                    option: "$expand",
                    entry: part.to_string(),
                    reason: "missing navigation property".to_string(),
                }
                .into());
            }

            let (navigation, target) = self.navigation(name, model)?;
            let item = find_or_insert(items, &navigation);
            if let Some(nested) = nested {
                self.expand_options(nested, target, depth, item)?;
            }
        }
        Ok(())
    }

    /// `$select=...;$filter=...;...` inside an expand item.
    fn expand_options(
        &self,
        text: &str,
        target: Option<&EntityModel>,
        depth: usize,
        item: &mut ExpandItem,
    ) -> Result<(), QueryError> {
        // Nested predicates see no root aliases. They bind strictly when the
        // target model is known and leniently otherwise.
        let aliases = AliasSet::new();
        let resolver = ExpressionResolver::new(self.pools, self.converter(target, &aliases));
        let mut seen = Vec::new();

        for part in transform::split_top_level(text, ';', "$expand")? {
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            let name = name.trim().to_ascii_lowercase();

            if seen.contains(&name) {
                return Err(OptionError::DuplicateOption(name).into());
            }

            match name.as_str() {
                "$select" => {
                    let select = self.select(value, target, &aliases, &mut item.expand, depth)?;
                    item.select.extend(select);
                }
                "$filter" => item.filter = Some(resolver.filter(value)?),
                "$orderby" => item.order_by = self.order_by(value, &resolver)?,
                "$top" => item.top = Some(paging("$top", value, self.config.max_top)?),
                "$skip" => item.skip = Some(paging("$skip", value, None)?),
                "$count" => item.count = flag("$count", value)?,
                "$expand" => self.expand(value, target, depth + 1, &mut item.expand)?,
                _ => {
                    debug!(option = %name, "rejected nested expand option");
                    return Err(OptionError::UnknownOption(name).into());
                }
            }
            seen.push(name);
        }
        Ok(())
    }
}

fn find_or_insert<'e>(items: &'e mut Vec<ExpandItem>, navigation: &str) -> &'e mut ExpandItem {
    let index = match items.iter().position(|i| i.navigation == navigation) {
        Some(index) => index,
        None => {
            items.push(ExpandItem::new(navigation));
            items.len() - 1
        }
    };
    &mut items[index]
}
