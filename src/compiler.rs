//! The compilation entry point.
//!
//! A [`Compiler`] owns the metadata, the limits and the syntax-tree pools.
//! [`Compiler::compile`] takes an entity name and a query string and returns
//! every clause as a parameterized SQL fragment alongside the resolved
//! option set.
//!
//! Compilation keeps no state between calls: aliases live in a
//! [`CompileContext`] created per call, and the pools are safe to share, so a
//! compiler may be used from many threads at once.
//!
//! # Examples
//!
//! ```
//! use odata_sql::{Catalog, Compiler, CompilerConfig, EntityModel, PrimitiveType, PropertyModel};
//!
//! let catalog = Catalog::new().with(
//!     EntityModel::new("Products", "products")
//!         .with(PropertyModel::new("Price", "price", PrimitiveType::Decimal)),
//! );
//! let compiler = Compiler::new(catalog, CompilerConfig::default());
//!
//! let compiled = compiler.compile("Products", "$filter=Price gt 10").unwrap();
//! assert_eq!(compiled.filter.unwrap().sql, "price > ?");
//! ```

use tracing::{debug, instrument};

use crate::{
    alias::CompileContext,
    config::CompilerConfig,
    error::{QueryError, SemanticError, SqlError},
    model::{Catalog, EntityModel, MetadataProvider},
    options::{ExpandItem, OptionsParser, QueryOptions},
    pool::Pools,
    sql::{ApplySql, SqlBuilder, SqlFragment},
};

/// SQL for one expanded navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpand {
    pub navigation: String,
    pub filter: Option<SqlFragment>,
    pub order_by: Option<SqlFragment>,
    pub expand: Vec<CompiledExpand>,
}

/// The output of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub options: QueryOptions,
    /// WHERE clause body
    pub filter: Option<SqlFragment>,
    /// ORDER BY clause body
    pub order_by: Option<SqlFragment>,
    /// Extra projections for `$compute`
    pub compute: Option<SqlFragment>,
    pub apply: Option<ApplySql>,
    pub expand: Vec<CompiledExpand>,
}

pub struct Compiler<P: MetadataProvider = Catalog> {
    config: CompilerConfig,
    catalog: P,
    pools: Pools,
}

impl<P: MetadataProvider> Compiler<P> {
    pub fn new(catalog: P, config: CompilerConfig) -> Self {
        let pools = Pools::new(config.pool_capacity);
        Compiler {
            config,
            catalog,
            pools,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &P {
        &self.catalog
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// Compile `query` against the entity named `entity`.
    #[instrument(level = "debug", skip(self), fields(dialect = %self.config.dialect))]
    pub fn compile(&self, entity: &str, query: &str) -> Result<CompiledQuery, QueryError> {
        let model = self
            .catalog
            .entity(entity)
            .ok_or_else(|| SemanticError::UnknownEntity(entity.to_string()))?;

        let mut context = CompileContext::new();
        let options = OptionsParser::new(Some(model), &self.config, &self.pools)
            .with_catalog(&self.catalog)
            .parse(query, &mut context)
            .inspect_err(|e| debug!(error = %e, "query rejected"))?;

        let mut builder = SqlBuilder::new(self.config.dialect)
            .with_model(model)
            .with_catalog(&self.catalog)
            .with_registry(&context.registry);

        let filter = options
            .filter
            .as_ref()
            .map(|f| builder.build(f))
            .transpose()
            .map_err(|e| QueryError::from(e).in_option("$filter"))?;

        let order_by = if options.order_by.is_empty() {
            None
        } else {
            Some(
                builder
                    .build_order_by(&options.order_by)
                    .map_err(|e| QueryError::from(e).in_option("$orderby"))?,
            )
        };

        let compute = if options.compute.is_empty() {
            None
        } else {
            Some(
                builder
                    .build_compute(&options.compute)
                    .map_err(|e| QueryError::from(e).in_option("$compute"))?,
            )
        };

        let apply = if options.apply.is_empty() {
            None
        } else {
            Some(
                builder
                    .build_apply(&options.apply)
                    .map_err(|e| QueryError::from(e).in_option("$apply"))?,
            )
        };

        let expand = self
            .expand(&options.expand, Some(model))
            .map_err(|e| QueryError::from(e).in_option("$expand"))?;

        Ok(CompiledQuery {
            options,
            filter,
            order_by,
            compute,
            apply,
            expand,
        })
    }

    fn expand(&self, items: &[ExpandItem], parent: Option<&EntityModel>) -> Result<Vec<CompiledExpand>, SqlError> {
        let mut compiled = Vec::with_capacity(items.len());

        for item in items {
            let target = parent
                .and_then(|m| m.property(&item.navigation))
                .and_then(|p| p.navigation.as_ref())
                .and_then(|n| self.catalog.navigation_target(n));

            let mut builder = SqlBuilder::new(self.config.dialect).with_catalog(&self.catalog);
            if let Some(target) = target {
                builder = builder.with_model(target);
            }

            let filter = item.filter.as_ref().map(|f| builder.build(f)).transpose()?;
            let order_by = if item.order_by.is_empty() {
                None
            } else {
                Some(builder.build_order_by(&item.order_by)?)
            };

            compiled.push(CompiledExpand {
                navigation: item.navigation.clone(),
                filter,
                order_by,
                expand: self.expand(&item.expand, target)?,
            });
        }
        Ok(compiled)
    }
}
