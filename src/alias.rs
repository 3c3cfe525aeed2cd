//! Computed aliases and the per-compilation context that carries them.
//!
//! Aliases are introduced by `$compute` and `$apply` and may be referenced
//! by any other option regardless of textual order. Compilation therefore
//! runs in two phases: every alias name is collected into an [`AliasSet`]
//! first, then each definition is resolved into the [`AliasRegistry`].
//!
//! Both live in a [`CompileContext`] owned by a single compilation and
//! passed explicitly to whatever needs it. Nothing here is global, so
//! concurrent compilations using the same alias name never interfere.

use indexmap::{IndexMap, IndexSet};

use crate::{error::OptionError, filter::ScalarExpr, transform::Aggregation};

/// Names visible to the converter as if they were declared properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasSet {
    names: IndexSet<String>,
}

impl AliasSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name. Returns `false` if it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

impl<'a> FromIterator<&'a str> for AliasSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        AliasSet {
            names: iter.into_iter().map(str::to_string).collect(),
        }
    }
}

/// What an alias stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasDefinition {
    /// `<expr> as <alias>` in `$compute` or an apply `compute` step
    Expression(ScalarExpr),

    /// `<expr> with <method> as <alias>` or `$count as <alias>`, and the
    /// implicit `$count` of `groupby`
    Aggregate(Aggregation),
}

/// Alias definitions, in the order they were declared.
///
/// Used by the SQL builder to substitute an alias with its defining
/// expression on dialects that cannot reference a computed column inside a
/// predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasRegistry {
    definitions: IndexMap<String, AliasDefinition>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, alias: &str, definition: AliasDefinition) -> Result<(), OptionError> {
        if self.definitions.contains_key(alias) {
            return Err(OptionError::DuplicateAlias(alias.to_string()));
        }
        self.definitions.insert(alias.to_string(), definition);
        Ok(())
    }

    /// Replace a definition, keeping its original position.
    pub fn redefine(&mut self, alias: &str, definition: AliasDefinition) {
        self.definitions.insert(alias.to_string(), definition);
    }

    pub fn get(&self, alias: &str) -> Option<&AliasDefinition> {
        self.definitions.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.definitions.contains_key(alias)
    }

    /// Whether `alias` stands for an aggregate, directly or through the
    /// expressions it is defined by.
    pub fn is_aggregate(&self, alias: &str) -> bool {
        match self.definitions.get(alias) {
            Some(AliasDefinition::Aggregate(_)) => true,
            Some(AliasDefinition::Expression(expr)) => {
                expr.alias_names().iter().any(|name| self.is_aggregate(name))
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AliasDefinition)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
    }
}

/// Alias state for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    pub aliases: AliasSet,
    pub registry: AliasRegistry,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every alias, making the context reusable for another request.
    pub fn reset(&mut self) {
        self.aliases.clear();
        self.registry.clear();
    }
}
