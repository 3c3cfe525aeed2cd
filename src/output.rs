//! JSON rendering of compilation results.
//!
//! Converts a [`CompiledQuery`] into a `serde_json::Value` so callers outside
//! Rust (and the command-line tool) can consume the SQL fragments and their
//! arguments. Output is deterministic: object keys are sorted.
//!
//! # Layout
//!
//! ```text
//! {
//!   "filter":  { "sql": "price > ?", "args": [10] },
//!   "orderby": { "sql": "name ASC", "args": [] },
//!   "top": 5,
//!   ...
//! }
//! ```
//!
//! Clauses the query did not ask for are omitted.
//!
//! # Literal Encoding
//!
//! - Integers and doubles become JSON numbers
//! - Decimals become strings, so no precision is lost
//! - Dates, times, GUIDs and spatial values become their literal text

use serde_json::{Map, Value, json};

use crate::{
    compiler::{CompiledExpand, CompiledQuery},
    options::{QueryOptions, SelectItem},
    sql::{ApplySql, SqlFragment},
    value::Literal,
};

pub fn literal_to_json(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Integer(n) => Value::Number((*n).into()),
        Literal::Decimal(d) => Value::String(d.to_string()),
        Literal::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Literal::String(s)
        | Literal::Date(s)
        | Literal::TimeOfDay(s)
        | Literal::DateTimeOffset(s)
        | Literal::Guid(s) => Value::String(s.clone()),
        Literal::Spatial(_) => Value::String(literal.to_string()),
    }
}

pub fn fragment_to_json(fragment: &SqlFragment) -> Value {
    json!({
        "sql": fragment.sql,
        "args": fragment.args.iter().map(literal_to_json).collect::<Vec<_>>(),
    })
}

fn apply_to_json(apply: &ApplySql) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "projections".into(),
        apply.projections.iter().map(fragment_to_json).collect(),
    );
    obj.insert(
        "groupby".into(),
        apply.group_by.iter().map(fragment_to_json).collect(),
    );
    if let Some(w) = &apply.where_clause {
        obj.insert("where".into(), fragment_to_json(w));
    }
    if let Some(h) = &apply.having {
        obj.insert("having".into(), fragment_to_json(h));
    }
    Value::Object(obj)
}

fn expand_to_json(expand: &CompiledExpand) -> Value {
    let mut obj = Map::new();
    obj.insert("navigation".into(), Value::String(expand.navigation.clone()));
    if let Some(f) = &expand.filter {
        obj.insert("filter".into(), fragment_to_json(f));
    }
    if let Some(o) = &expand.order_by {
        obj.insert("orderby".into(), fragment_to_json(o));
    }
    if !expand.expand.is_empty() {
        obj.insert(
            "expand".into(),
            expand.expand.iter().map(expand_to_json).collect(),
        );
    }
    Value::Object(obj)
}

fn select_to_json(item: &SelectItem) -> Value {
    match item {
        SelectItem::All => Value::String("*".into()),
        SelectItem::Property(name) | SelectItem::Computed(name) | SelectItem::NavigationLink(name) => {
            Value::String(name.clone())
        }
    }
}

fn options_to_json(options: &QueryOptions, obj: &mut Map<String, Value>) {
    if !options.select.is_empty() {
        obj.insert(
            "select".into(),
            options.select.iter().map(select_to_json).collect(),
        );
    }
    if let Some(top) = options.top {
        obj.insert("top".into(), json!(top));
    }
    if let Some(skip) = options.skip {
        obj.insert("skip".into(), json!(skip));
    }
    if let Some(token) = &options.skip_token {
        obj.insert("skiptoken".into(), json!(token));
    }
    if let Some(token) = &options.delta_token {
        obj.insert("deltatoken".into(), json!(token));
    }
    if let Some(search) = &options.search {
        obj.insert("search".into(), json!(search));
    }
    if let Some(version) = &options.schema_version {
        obj.insert("schemaversion".into(), json!(version));
    }
    if options.count {
        obj.insert("count".into(), Value::Bool(true));
    }
    if options.index {
        obj.insert("index".into(), Value::Bool(true));
    }
    if !options.custom.is_empty() {
        let custom: Map<String, Value> = options
            .custom
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        obj.insert("custom".into(), Value::Object(custom));
    }
}

pub fn query_to_json(query: &CompiledQuery) -> Value {
    let mut obj = Map::new();

    if let Some(f) = &query.filter {
        obj.insert("filter".into(), fragment_to_json(f));
    }
    if let Some(o) = &query.order_by {
        obj.insert("orderby".into(), fragment_to_json(o));
    }
    if let Some(c) = &query.compute {
        obj.insert("compute".into(), fragment_to_json(c));
    }
    if let Some(a) = &query.apply {
        obj.insert("apply".into(), apply_to_json(a));
    }
    if !query.expand.is_empty() {
        obj.insert(
            "expand".into(),
            query.expand.iter().map(expand_to_json).collect(),
        );
    }
    options_to_json(&query.options, &mut obj);

    Value::Object(obj)
}

/// Compact JSON for a compiled query.
pub fn to_json(query: &CompiledQuery) -> String {
    query_to_json(query).to_string()
}

/// Pretty-printed JSON for a compiled query, two-space indented.
pub fn to_json_pretty(query: &CompiledQuery) -> String {
    format!("{:#}", query_to_json(query))
}
