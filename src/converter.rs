//! Binds syntax trees to the data model.
//!
//! The [`Converter`] walks a [`Node`] tree and produces a
//! [`FilterExpression`] (boolean context) or a [`ScalarExpr`] (value
//! context), validating along the way:
//!
//! - identifiers name a declared property or a visible computed alias
//! - functions get the right number and kind of arguments
//! - `in` lists hold only literals and respect the size limit
//! - literals compared with integer properties fit in 64 bits
//!
//! A converter built without a model is *lenient*: property names are taken
//! on trust. That mode is chosen explicitly by the caller, for predicates
//! whose target type is not known locally; it is never a fallback.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::{
    alias::AliasSet,
    ast::{ArithmeticOp, BinaryOp, ComparisonOp, LambdaKind, Node, SortDirection, UnaryOp},
    error::{QueryError, SemanticError},
    filter::{ArityClass, FilterExpression, FilterKind, Function, PropertyRef, ScalarExpr, TypeName},
    model::{EntityModel, MetadataProvider, PrimitiveType},
    parser::{with_parsed, with_parsed_order_by},
    pool::Pools,
    value::Literal,
};

type Filter = Result<FilterExpression, SemanticError>;
type Scalar = Result<ScalarExpr, SemanticError>;

static ENTITY_TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$").expect("valid regex")
});

/// Resolve a boolean expression against `model`, or leniently when `model`
/// is `None`.
pub fn resolve(
    node: &Node,
    model: Option<&EntityModel>,
    aliases: &AliasSet,
    max_in: Option<usize>,
) -> Filter {
    Converter::new(model, aliases, max_in).resolve(node)
}

#[derive(Clone, Copy)]
pub struct Converter<'a> {
    model: Option<&'a EntityModel>,
    catalog: Option<&'a dyn MetadataProvider>,
    aliases: &'a AliasSet,
    max_in: Option<usize>,
    /// Inside a lambda predicate: the range variable, if one was bound
    range: Option<Option<&'a str>>,
}

impl<'a> Converter<'a> {
    pub fn new(model: Option<&'a EntityModel>, aliases: &'a AliasSet, max_in: Option<usize>) -> Self {
        Converter {
            model,
            catalog: None,
            aliases,
            max_in,
            range: None,
        }
    }

    /// Make navigation targets resolvable through `catalog`.
    pub fn with_catalog(mut self, catalog: &'a dyn MetadataProvider) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn is_lenient(&self) -> bool {
        self.model.is_none()
    }

    /// Resolve a node used as a predicate.
    #[instrument(level = "debug", skip_all, fields(lenient = self.is_lenient()))]
    pub fn resolve(&self, node: &Node) -> Filter {
        let result = self.filter(node);
        if let Err(e) = &result {
            debug!(error = %e, "resolution failed");
        }
        result
    }

    /// Resolve a node used as a value, as in `$orderby` or `$compute`.
    #[instrument(level = "debug", skip_all, fields(lenient = self.is_lenient()))]
    pub fn resolve_scalar(&self, node: &Node) -> Scalar {
        self.scalar(node)
    }

    fn filter(&self, node: &Node) -> Filter {
        match node {
            Node::Binary {
                op: BinaryOp::Logical(op),
                left,
                right,
            } => Ok(FilterExpression::new(FilterKind::Logical {
                op: *op,
                left: Box::new(self.filter(left)?),
                right: Box::new(self.filter(right)?),
            })),

            Node::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(self.filter(operand)?.negate()),

            Node::Comparison { op, left, right } => self.comparison(*op, left, right),

            Node::Group(inner) => self.filter(inner),

            Node::Literal {
                value: Literal::Boolean(b),
                ..
            } => Ok(FilterExpression::new(FilterKind::Constant(*b))),

            Node::Lambda {
                path,
                kind,
                variable,
                predicate,
                offset,
            } => self.lambda(path, *kind, variable.as_deref(), predicate.as_deref(), *offset),

            Node::FunctionCall { name, args, offset } if name.eq_ignore_ascii_case("isof") => {
                self.isof(args, *offset)
            }

            Node::FunctionCall { name, args, offset } if name.eq_ignore_ascii_case("has") => {
                let [left, right] = args.as_slice() else {
                    return Err(wrong_arity("has", "2", args.len(), *offset));
                };
                self.has(left, right)
            }

            Node::FunctionCall { .. } | Node::Identifier { .. } => {
                let value = self.scalar(node)?;
                match value.static_type() {
                    Some(PrimitiveType::Boolean) | None => {
                        Ok(FilterExpression::new(FilterKind::Predicate(value)))
                    }
                    Some(_) => Err(SemanticError::NotBoolean {
                        offset: node.offset(),
                    }),
                }
            }

            Node::Binary { .. }
            | Node::Unary { .. }
            | Node::Literal { .. }
            | Node::Collection { .. } => Err(SemanticError::NotBoolean {
                offset: node.offset(),
            }),
        }
    }

    fn scalar(&self, node: &Node) -> Scalar {
        match node {
            Node::Binary {
                op: BinaryOp::Arithmetic(op),
                left,
                right,
            } => Ok(ScalarExpr::Arithmetic {
                op: *op,
                left: Box::new(self.scalar(left)?),
                right: Box::new(self.scalar(right)?),
            }),

            Node::Unary {
                op: UnaryOp::Negate,
                operand,
            } => Ok(ScalarExpr::Negate(Box::new(self.scalar(operand)?))),

            Node::Binary { .. } | Node::Unary { .. } | Node::Comparison { .. } | Node::Lambda { .. } => {
                Ok(ScalarExpr::Condition(Box::new(self.filter(node)?)))
            }

            Node::FunctionCall { name, args, offset } => self.function(name, args, *offset),

            Node::Identifier { segments, offset } => self.identifier(segments, *offset),

            Node::Literal { value, .. } => Ok(ScalarExpr::Literal(value.clone())),

            Node::Group(inner) => self.scalar(inner),

            Node::Collection { offset, .. } => Err(SemanticError::MalformedIn {
                reason: "a parenthesized list may only follow 'in'".to_string(),
                offset: Some(*offset),
            }),
        }
    }

    // ========================================
    // Identifiers
    // ========================================

    fn identifier(&self, segments: &[String], offset: usize) -> Scalar {
        let mut path: Vec<&str> = segments.iter().map(String::as_str).collect();

        match self.range {
            Some(variable) => {
                if path[0] == "$it" {
                    return Err(SemanticError::Unsupported(
                        "reference to the outer entity inside a lambda".to_string(),
                    ));
                }
                if let Some(variable) = variable
                    && path[0] == variable
                {
                    if path.len() == 1 {
                        return Ok(ScalarExpr::CurrentElement);
                    }
                    path.remove(0);
                }
            }
            None => {
                if path[0] == "$it" && path.len() > 1 {
                    path.remove(0);
                }
            }
        }

        match path.as_slice() {
            [name] => self.property_or_alias(name, offset),
            [navigation, property] => self.navigation_path(navigation, property, offset),
            _ => Err(SemanticError::Unsupported(format!(
                "path '{}' with more than one navigation step",
                path.join("/")
            ))),
        }
    }

    fn property_or_alias(&self, name: &str, offset: usize) -> Scalar {
        let Some(model) = self.model else {
            if self.aliases.contains(name) {
                return Ok(ScalarExpr::Alias(name.to_string()));
            }
            return Ok(ScalarExpr::Property(PropertyRef::unbound(name)));
        };

        match model.property(name) {
            Some(property) if property.is_navigation() => Err(SemanticError::WrongArgumentKind {
                function: name.to_string(),
                reason: "a navigation property cannot be used as a value".to_string(),
                offset: Some(offset),
            }),
            Some(property) => Ok(ScalarExpr::Property(property.into())),
            None if self.aliases.contains(name) => Ok(ScalarExpr::Alias(name.to_string())),
            None => Err(SemanticError::UnknownProperty {
                name: name.to_string(),
                offset: Some(offset),
            }),
        }
    }

    /// `Navigation/Property` over a single-valued navigation.
    fn navigation_path(&self, navigation: &str, name: &str, offset: usize) -> Scalar {
        let Some(model) = self.model else {
            return Err(SemanticError::Unsupported(format!(
                "navigation path '{}/{}' where the target type is unknown",
                navigation, name
            )));
        };

        let source = model.property(navigation).ok_or_else(|| SemanticError::UnknownProperty {
            name: navigation.to_string(),
            offset: Some(offset),
        })?;

        let Some(nav) = &source.navigation else {
            return Err(SemanticError::Unsupported(format!(
                "path through non-navigation property '{}'",
                navigation
            )));
        };

        if nav.collection {
            return Err(SemanticError::WrongArgumentKind {
                function: navigation.to_string(),
                reason: "a collection can only be filtered through any() or all()".to_string(),
                offset: Some(offset),
            });
        }

        let target = self.catalog.and_then(|c| c.navigation_target(nav));
        let property = match target {
            Some(target) => match target.property(name) {
                Some(p) if !p.is_navigation() => PropertyRef::from(p),
                _ => {
                    return Err(SemanticError::UnknownProperty {
                        name: format!("{}/{}", navigation, name),
                        offset: Some(offset),
                    });
                }
            },
            None => PropertyRef::unbound(name),
        };

        Ok(ScalarExpr::NavigationProperty {
            navigation: source.name.clone(),
            property,
        })
    }

    // ========================================
    // Comparisons
    // ========================================

    fn comparison(&self, op: ComparisonOp, left: &Node, right: &Node) -> Filter {
        match op {
            ComparisonOp::In => self.membership(left, right),
            ComparisonOp::Has => self.has(left, right),
            _ => {
                let left = self.scalar(left)?;
                let right = self.scalar(right)?;
                check_range(&left, &right)?;
                check_range(&right, &left)?;
                Ok(FilterExpression::new(FilterKind::Compare { left, op, right }))
            }
        }
    }

    fn membership(&self, left: &Node, right: &Node) -> Filter {
        let operand = self.scalar(left)?;

        let Node::Collection { items, offset } = right else {
            return Err(SemanticError::MalformedIn {
                reason: "expected a parenthesized list".to_string(),
                offset: right.offset(),
            });
        };

        if let Some(max) = self.max_in
            && items.len() > max
        {
            return Err(SemanticError::InListTooLarge {
                size: items.len(),
                max,
            });
        }

        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match unwrap_group(item) {
                Node::Literal { value, .. } => {
                    check_range(&operand, &ScalarExpr::Literal(value.clone()))?;
                    values.push(value.clone());
                }
                other => {
                    return Err(SemanticError::MalformedIn {
                        reason: "list items must be literals".to_string(),
                        offset: other.offset().or(Some(*offset)),
                    });
                }
            }
        }

        Ok(FilterExpression::new(FilterKind::In { operand, values }))
    }

    /// `Status has 1` and `has(Status, 1)`.
    fn has(&self, left: &Node, right: &Node) -> Filter {
        let operand = self.scalar(left)?;

        if let Some(property) = operand.property()
            && property.ty.is_some()
            && !property.flags
        {
            return Err(SemanticError::WrongArgumentKind {
                function: "has".to_string(),
                reason: format!("'{}' is not an enum-flags property", property.name),
                offset: left.offset(),
            });
        }

        let flag = match unwrap_group(right) {
            Node::Literal { value, .. } if matches!(value, Literal::Integer(_) | Literal::String(_)) => {
                value.clone()
            }
            other => {
                return Err(SemanticError::WrongArgumentKind {
                    function: "has".to_string(),
                    reason: "the flag must be an integer or string literal".to_string(),
                    offset: other.offset(),
                });
            }
        };

        Ok(FilterExpression::new(FilterKind::Has { operand, flag }))
    }

    // ========================================
    // Functions
    // ========================================

    fn function(&self, name: &str, args: &[Box<Node>], offset: usize) -> Scalar {
        let lower = name.to_ascii_lowercase();

        match lower.as_str() {
            "cast" => return self.cast(args, offset),
            "isof" => return Ok(ScalarExpr::Condition(Box::new(self.isof(args, offset)?))),
            "has" => {
                let [left, right] = args else {
                    return Err(wrong_arity("has", "2", args.len(), offset));
                };
                return Ok(ScalarExpr::Condition(Box::new(self.has(left, right)?)));
            }
            _ => {}
        }

        if let Some(op) = ArithmeticOp::from_keyword(&lower) {
            let [left, right] = args else {
                return Err(wrong_arity(&lower, "2", args.len(), offset));
            };
            return Ok(ScalarExpr::Arithmetic {
                op,
                left: Box::new(self.scalar(left)?),
                right: Box::new(self.scalar(right)?),
            });
        }

        let function = Function::from_name(&lower)
            .ok_or_else(|| SemanticError::Unsupported(format!("function '{}'", name)))?;

        let args = match function.arity() {
            ArityClass::Nullary => {
                if !args.is_empty() {
                    return Err(wrong_arity(function.name(), "0", args.len(), offset));
                }
                Vec::new()
            }
            ArityClass::Unary => {
                let [arg] = args else {
                    return Err(wrong_arity(function.name(), "1", args.len(), offset));
                };
                let arg = self.scalar(arg)?;
                self.check_operand(function, &arg, offset)?;
                vec![arg]
            }
            ArityClass::Binary => {
                let [first, second] = args else {
                    return Err(wrong_arity(function.name(), "2", args.len(), offset));
                };
                let first = self.scalar(first)?;
                let second = self.scalar(second)?;
                self.check_operand(function, &first, offset)?;
                self.check_operand(function, &second, offset)?;
                vec![first, second]
            }
            ArityClass::Substring => self.substring(args, offset)?,
            ArityClass::Spatial { min, max } => self.spatial(function, args, min, max, offset)?,
        };

        Ok(ScalarExpr::Function { function, args })
    }

    fn check_operand(&self, function: Function, arg: &ScalarExpr, offset: usize) -> Result<(), SemanticError> {
        match arg.static_type() {
            Some(ty) if !function.accepts(ty) => Err(SemanticError::WrongArgumentKind {
                function: function.name().to_string(),
                reason: format!("{} operand is not accepted", ty.edm_name()),
                offset: Some(offset),
            }),
            _ => Ok(()),
        }
    }

    fn substring(&self, args: &[Box<Node>], offset: usize) -> Result<Vec<ScalarExpr>, SemanticError> {
        if !(2..=3).contains(&args.len()) {
            return Err(wrong_arity("substring", "2 or 3", args.len(), offset));
        }

        let text = self.scalar(&args[0])?;
        self.check_operand(Function::Substring, &text, offset)?;

        let mut resolved = vec![text];
        for arg in &args[1..] {
            let value = self.scalar(arg)?;
            let valid = match &value {
                ScalarExpr::Literal(literal) => literal.as_integer().is_some_and(|n| n >= 0),
                other => other.static_type().is_none_or(|ty| ty.is_integral()),
            };
            if !valid {
                return Err(SemanticError::WrongArgumentKind {
                    function: "substring".to_string(),
                    reason: "start and length must be non-negative integers".to_string(),
                    offset: arg.offset(),
                });
            }
            resolved.push(value);
        }
        Ok(resolved)
    }

    fn spatial(
        &self,
        function: Function,
        args: &[Box<Node>],
        min: usize,
        max: usize,
        offset: usize,
    ) -> Result<Vec<ScalarExpr>, SemanticError> {
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(wrong_arity(function.name(), &expected, args.len(), offset));
        }

        let subject = match unwrap_group(&args[0]) {
            node @ Node::Identifier { .. } => self.scalar(node)?,
            other => {
                return Err(SemanticError::WrongArgumentKind {
                    function: function.name().to_string(),
                    reason: "the first argument must be a property".to_string(),
                    offset: other.offset(),
                });
            }
        };
        self.check_operand(function, &subject, offset)?;

        let mut resolved = vec![subject];
        for arg in &args[1..] {
            match unwrap_group(arg) {
                Node::Literal {
                    value: value @ Literal::Spatial(_),
                    ..
                } => resolved.push(ScalarExpr::Literal(value.clone())),
                other => {
                    return Err(SemanticError::WrongArgumentKind {
                        function: function.name().to_string(),
                        reason: "expected a geography or geometry literal".to_string(),
                        offset: other.offset(),
                    });
                }
            }
        }
        Ok(resolved)
    }

    fn cast(&self, args: &[Box<Node>], offset: usize) -> Scalar {
        let (operand, target) = self.type_arguments("cast", args, offset)?;
        Ok(ScalarExpr::Cast {
            operand: operand.map(Box::new),
            target,
        })
    }

    fn isof(&self, args: &[Box<Node>], offset: usize) -> Filter {
        let (operand, target) = self.type_arguments("isof", args, offset)?;
        Ok(FilterExpression::new(FilterKind::IsOf { operand, target }))
    }

    /// `f(Type)` or `f(operand, Type)`; the type is always last.
    fn type_arguments(
        &self,
        function: &str,
        args: &[Box<Node>],
        offset: usize,
    ) -> Result<(Option<ScalarExpr>, TypeName), SemanticError> {
        match args {
            [target] => Ok((None, type_name(target)?)),
            [operand, target] => {
                let target = type_name(target)?;
                Ok((Some(self.scalar(operand)?), target))
            }
            _ => Err(wrong_arity(function, "1 or 2", args.len(), offset)),
        }
    }

    // ========================================
    // Lambdas
    // ========================================

    fn lambda(
        &self,
        path: &[String],
        kind: LambdaKind,
        variable: Option<&str>,
        predicate: Option<&Node>,
        offset: usize,
    ) -> Filter {
        let function = match kind {
            LambdaKind::Any => "any",
            LambdaKind::All => "all",
        };

        if self.range.is_some() {
            return Err(SemanticError::Unsupported("nested lambda expression".to_string()));
        }

        let segments: Vec<&str> = path
            .iter()
            .map(String::as_str)
            .skip_while(|s| *s == "$it")
            .collect();
        let [navigation] = segments.as_slice() else {
            return Err(SemanticError::Unsupported(format!(
                "lambda over multi-segment path '{}'",
                path.join("/")
            )));
        };

        let navigation = match self.model {
            Some(model) => {
                let property = model.property(navigation).ok_or_else(|| SemanticError::UnknownProperty {
                    name: navigation.to_string(),
                    offset: Some(offset),
                })?;
                if !property.navigation.as_ref().is_some_and(|n| n.collection) {
                    return Err(SemanticError::WrongArgumentKind {
                        function: function.to_string(),
                        reason: format!("'{}' is not a collection", property.name),
                        offset: Some(offset),
                    });
                }
                property.name.clone()
            }
            None => navigation.to_string(),
        };

        let predicate = match predicate {
            Some(predicate) => {
                // The element type is described by the collection, not by
                // this model: resolve without binding and with no aliases.
                let empty = AliasSet::new();
                let inner = Converter {
                    model: None,
                    catalog: self.catalog,
                    aliases: &empty,
                    max_in: self.max_in,
                    range: Some(variable),
                };
                Some(Box::new(inner.filter(predicate)?))
            }
            None if kind == LambdaKind::All => {
                return Err(wrong_arity("all", "1", 0, offset));
            }
            None => None,
        };

        Ok(FilterExpression::new(FilterKind::Lambda {
            kind,
            navigation,
            predicate,
        }))
    }
}

fn unwrap_group(node: &Node) -> &Node {
    match node {
        Node::Group(inner) => unwrap_group(inner),
        other => other,
    }
}

fn wrong_arity(function: &str, expected: &str, found: usize, offset: usize) -> SemanticError {
    SemanticError::WrongArity {
        function: function.to_string(),
        expected: expected.to_string(),
        found,
        offset: Some(offset),
    }
}

/// A literal compared with an integer property must fit in 64 bits.
fn check_range(property: &ScalarExpr, value: &ScalarExpr) -> Result<(), SemanticError> {
    let property = match property {
        ScalarExpr::Property(p) | ScalarExpr::NavigationProperty { property: p, .. } => p,
        _ => return Ok(()),
    };

    if let (Some(ty), ScalarExpr::Literal(literal)) = (property.ty, value)
        && ty.is_integral()
        && !literal.fits_i64()
    {
        return Err(SemanticError::NumericOverflow {
            property: property.name.clone(),
            literal: literal.to_string(),
        });
    }
    Ok(())
}

/// Primitive names are checked against the allow-list first; anything else
/// must at least look like a qualified entity type name.
fn type_name(node: &Node) -> Result<TypeName, SemanticError> {
    let name = match unwrap_group(node) {
        Node::Identifier { segments, .. } if segments.len() == 1 => segments[0].as_str(),
        Node::Literal {
            value: Literal::String(s),
            ..
        } => s.as_str(),
        other => {
            return Err(SemanticError::InvalidTypeName(match other {
                Node::Identifier { segments, .. } => segments.join("/"),
                Node::Literal { value, .. } => value.to_string(),
                _ => "expression".to_string(),
            }));
        }
    };

    if let Some(ty) = PrimitiveType::from_edm_name(name) {
        return Ok(TypeName::Primitive(ty));
    }
    if ENTITY_TYPE_NAME.is_match(name) {
        return Ok(TypeName::EntityType(name.to_string()));
    }
    Err(SemanticError::InvalidTypeName(name.to_string()))
}

/// Parses expression text and resolves it with one [`Converter`], returning
/// every syntax tree to the pool once it has been converted.
#[derive(Clone, Copy)]
pub struct ExpressionResolver<'a> {
    pub pools: &'a Pools,
    pub converter: Converter<'a>,
}

impl<'a> ExpressionResolver<'a> {
    pub fn new(pools: &'a Pools, converter: Converter<'a>) -> Self {
        ExpressionResolver { pools, converter }
    }

    pub fn filter(&self, text: &str) -> Result<FilterExpression, QueryError> {
        with_parsed(text, self.pools, |node| Ok(self.converter.resolve(node)?))
    }

    pub fn scalar(&self, text: &str) -> Result<ScalarExpr, QueryError> {
        with_parsed(text, self.pools, |node| Ok(self.converter.resolve_scalar(node)?))
    }

    pub fn order_by(&self, text: &str) -> Result<(ScalarExpr, SortDirection), QueryError> {
        with_parsed_order_by(text, self.pools, |node, direction| {
            Ok((self.converter.resolve_scalar(node)?, direction))
        })
    }
}
