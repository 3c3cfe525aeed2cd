//! The semantic, metadata-bound expression tree.
//!
//! A [`FilterExpression`] is produced once per request by the
//! [`Converter`](crate::converter::Converter) and consumed once by the
//! [`SqlBuilder`](crate::sql::SqlBuilder). Boolean structure lives in
//! [`FilterKind`]; value-producing sub-expressions are [`ScalarExpr`]s, so a
//! node is either a leaf comparison or a logical composition, never both.

use std::fmt;

use crate::{
    ast::{ArithmeticOp, ComparisonOp, LambdaKind, LogicalOp},
    model::{PrimitiveType, PropertyModel},
    value::Literal,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    pub kind: FilterKind,
    /// Set by `not`; negation is a flag, not a node of its own.
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Logical {
        op: LogicalOp,
        left: Box<FilterExpression>,
        right: Box<FilterExpression>,
    },

    /// Relational comparison; `op` is never `has` or `in`
    Compare {
        left: ScalarExpr,
        op: ComparisonOp,
        right: ScalarExpr,
    },

    /// Membership in a literal list, possibly empty
    In {
        operand: ScalarExpr,
        values: Vec<Literal>,
    },

    /// Enum-flags containment
    Has { operand: ScalarExpr, flag: Literal },

    /// A boolean-valued operand used on its own: a property, an alias or a
    /// predicate function such as `contains`
    Predicate(ScalarExpr),

    /// `isof(Type)` or `isof(operand, Type)`
    IsOf {
        operand: Option<ScalarExpr>,
        target: TypeName,
    },

    /// `any`/`all` over a related collection
    Lambda {
        kind: LambdaKind,
        navigation: String,
        predicate: Option<Box<FilterExpression>>,
    },

    /// `true` / `false`
    Constant(bool),
}

/// A resolved property: the declared name plus what the model says about it.
///
/// Properties resolved without a model carry only the name.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRef {
    pub name: String,
    pub column: Option<String>,
    pub ty: Option<PrimitiveType>,
    pub flags: bool,
}

impl PropertyRef {
    pub fn unbound(name: &str) -> Self {
        PropertyRef {
            name: name.to_string(),
            column: None,
            ty: None,
            flags: false,
        }
    }

    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

impl From<&PropertyModel> for PropertyRef {
    fn from(property: &PropertyModel) -> Self {
        PropertyRef {
            name: property.name.clone(),
            column: Some(property.column.clone()),
            ty: Some(property.ty),
            flags: property.flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Property(PropertyRef),

    /// A property reached through a single-valued navigation
    NavigationProperty {
        navigation: String,
        property: PropertyRef,
    },

    /// The element itself inside a lambda over a primitive collection
    CurrentElement,

    /// Computed alias introduced by `$compute` or `$apply`
    Alias(String),

    Literal(Literal),

    Arithmetic {
        op: ArithmeticOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },

    Negate(Box<ScalarExpr>),

    Function {
        function: Function,
        args: Vec<ScalarExpr>,
    },

    /// `cast(Type)` or `cast(operand, Type)`
    Cast {
        operand: Option<Box<ScalarExpr>>,
        target: TypeName,
    },

    /// A boolean sub-expression used as a value, e.g. `Price gt 10 as Expensive`
    Condition(Box<FilterExpression>),
}

/// Target of `cast` and `isof`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    Primitive(PrimitiveType),
    /// Qualified entity type name, checked for shape only
    EntityType(String),
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Primitive(ty) => f.write_str(ty.edm_name()),
            TypeName::EntityType(name) => f.write_str(name),
        }
    }
}

/// Built-in functions, other than `cast`, `isof`, `has` and the prefix
/// arithmetic forms, which resolve to dedicated nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Now,
    MinDateTime,
    MaxDateTime,

    Length,
    ToLower,
    ToUpper,
    Trim,

    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    TotalOffsetMinutes,
    Date,
    Time,

    Round,
    Floor,
    Ceiling,

    Contains,
    StartsWith,
    EndsWith,
    IndexOf,
    Concat,
    MatchesPattern,

    Substring,

    GeoDistance,
    GeoLength,
    GeoIntersects,
}

/// How many arguments a function takes and of what kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityClass {
    Nullary,
    /// One string, numeric or temporal operand
    Unary,
    /// Two string operands
    Binary,
    /// `substring(s, start[, length])`
    Substring,
    /// A property followed by spatial literal(s)
    Spatial { min: usize, max: usize },
}

impl Function {
    const NAMES: [(&'static str, Function); 30] = [
        ("now", Function::Now),
        ("mindatetime", Function::MinDateTime),
        ("maxdatetime", Function::MaxDateTime),
        ("length", Function::Length),
        ("tolower", Function::ToLower),
        ("toupper", Function::ToUpper),
        ("trim", Function::Trim),
        ("year", Function::Year),
        ("month", Function::Month),
        ("day", Function::Day),
        ("hour", Function::Hour),
        ("minute", Function::Minute),
        ("second", Function::Second),
        ("fractionalseconds", Function::FractionalSeconds),
        ("totaloffsetminutes", Function::TotalOffsetMinutes),
        ("date", Function::Date),
        ("time", Function::Time),
        ("round", Function::Round),
        ("floor", Function::Floor),
        ("ceiling", Function::Ceiling),
        ("contains", Function::Contains),
        ("startswith", Function::StartsWith),
        ("endswith", Function::EndsWith),
        ("indexof", Function::IndexOf),
        ("concat", Function::Concat),
        ("matchespattern", Function::MatchesPattern),
        ("substring", Function::Substring),
        ("geo.distance", Function::GeoDistance),
        ("geo.length", Function::GeoLength),
        ("geo.intersects", Function::GeoIntersects),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, f)| f == self)
            .map_or("?", |(n, _)| *n)
    }

    pub fn arity(&self) -> ArityClass {
        match self {
            Function::Now | Function::MinDateTime | Function::MaxDateTime => ArityClass::Nullary,
            Function::Length
            | Function::ToLower
            | Function::ToUpper
            | Function::Trim
            | Function::Year
            | Function::Month
            | Function::Day
            | Function::Hour
            | Function::Minute
            | Function::Second
            | Function::FractionalSeconds
            | Function::TotalOffsetMinutes
            | Function::Date
            | Function::Time
            | Function::Round
            | Function::Floor
            | Function::Ceiling => ArityClass::Unary,
            Function::Contains
            | Function::StartsWith
            | Function::EndsWith
            | Function::IndexOf
            | Function::Concat
            | Function::MatchesPattern => ArityClass::Binary,
            Function::Substring => ArityClass::Substring,
            Function::GeoLength => ArityClass::Spatial { min: 1, max: 1 },
            Function::GeoDistance | Function::GeoIntersects => ArityClass::Spatial { min: 2, max: 2 },
        }
    }

    /// Functions usable directly as a predicate.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Function::Contains
                | Function::StartsWith
                | Function::EndsWith
                | Function::MatchesPattern
                | Function::GeoIntersects
        )
    }

    /// Types the single operand of a unary function may have.
    pub fn accepts(&self, ty: PrimitiveType) -> bool {
        match self {
            Function::Length | Function::ToLower | Function::ToUpper | Function::Trim => {
                ty == PrimitiveType::String
            }
            Function::Year | Function::Month | Function::Day | Function::Date => {
                matches!(ty, PrimitiveType::Date | PrimitiveType::DateTimeOffset)
            }
            Function::Hour
            | Function::Minute
            | Function::Second
            | Function::FractionalSeconds
            | Function::Time => {
                matches!(ty, PrimitiveType::TimeOfDay | PrimitiveType::DateTimeOffset)
            }
            Function::TotalOffsetMinutes => ty == PrimitiveType::DateTimeOffset,
            Function::Round | Function::Floor | Function::Ceiling => ty.is_numeric(),
            Function::GeoLength | Function::GeoDistance | Function::GeoIntersects => ty.is_spatial(),
            _ => ty == PrimitiveType::String,
        }
    }
}

impl FilterExpression {
    pub fn new(kind: FilterKind) -> Self {
        FilterExpression {
            kind,
            negated: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Names of every property referenced, in source order. Properties
    /// inside a lambda predicate are named relative to the collection.
    pub fn property_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |expr: &ScalarExpr| {
            if let ScalarExpr::Property(p) | ScalarExpr::NavigationProperty { property: p, .. } = expr {
                names.push(p.name.clone());
            }
        });
        names
    }

    /// Names of every computed alias referenced, in source order.
    pub fn alias_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |expr: &ScalarExpr| {
            if let ScalarExpr::Alias(name) = expr {
                names.push(name.clone());
            }
        });
        names
    }

    /// Call `f` on every scalar sub-expression, outermost first.
    pub fn visit(&self, f: &mut impl FnMut(&ScalarExpr)) {
        match &self.kind {
            FilterKind::Logical { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            FilterKind::Compare { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            FilterKind::In { operand, .. }
            | FilterKind::Has { operand, .. }
            | FilterKind::Predicate(operand) => operand.visit(f),
            FilterKind::IsOf { operand, .. } => {
                if let Some(operand) = operand {
                    operand.visit(f);
                }
            }
            FilterKind::Lambda { predicate, .. } => {
                if let Some(predicate) = predicate {
                    predicate.visit(f);
                }
            }
            FilterKind::Constant(_) => {}
        }
    }
}

impl ScalarExpr {
    pub fn property(&self) -> Option<&PropertyRef> {
        match self {
            ScalarExpr::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Primitive type of the expression, where it is statically known.
    pub fn static_type(&self) -> Option<PrimitiveType> {
        match self {
            ScalarExpr::Property(p) | ScalarExpr::NavigationProperty { property: p, .. } => p.ty,
            ScalarExpr::Literal(value) => match value {
                Literal::Boolean(_) => Some(PrimitiveType::Boolean),
                Literal::Integer(_) => Some(PrimitiveType::Int64),
                Literal::Decimal(_) => Some(PrimitiveType::Decimal),
                Literal::Double(_) => Some(PrimitiveType::Double),
                Literal::String(_) => Some(PrimitiveType::String),
                Literal::Date(_) => Some(PrimitiveType::Date),
                Literal::TimeOfDay(_) => Some(PrimitiveType::TimeOfDay),
                Literal::DateTimeOffset(_) => Some(PrimitiveType::DateTimeOffset),
                Literal::Guid(_) => Some(PrimitiveType::Guid),
                Literal::Spatial(_) | Literal::Null => None,
            },
            ScalarExpr::Function { function, .. } => match function {
                Function::Now | Function::MinDateTime | Function::MaxDateTime => {
                    Some(PrimitiveType::DateTimeOffset)
                }
                Function::ToLower
                | Function::ToUpper
                | Function::Trim
                | Function::Concat
                | Function::Substring => Some(PrimitiveType::String),
                Function::Date => Some(PrimitiveType::Date),
                Function::Time => Some(PrimitiveType::TimeOfDay),
                Function::FractionalSeconds | Function::GeoDistance | Function::GeoLength => {
                    Some(PrimitiveType::Double)
                }
                Function::Round | Function::Floor | Function::Ceiling => Some(PrimitiveType::Decimal),
                _ if function.is_predicate() => Some(PrimitiveType::Boolean),
                _ => Some(PrimitiveType::Int32),
            },
            ScalarExpr::Cast {
                target: TypeName::Primitive(ty),
                ..
            } => Some(*ty),
            ScalarExpr::Condition(_) => Some(PrimitiveType::Boolean),
            _ => None,
        }
    }

    pub fn alias_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |expr: &ScalarExpr| {
            if let ScalarExpr::Alias(name) = expr {
                names.push(name.clone());
            }
        });
        names
    }

    pub fn visit(&self, f: &mut impl FnMut(&ScalarExpr)) {
        f(self);
        match self {
            ScalarExpr::Arithmetic { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            ScalarExpr::Negate(inner) => inner.visit(f),
            ScalarExpr::Function { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            ScalarExpr::Cast { operand, .. } => {
                if let Some(operand) = operand {
                    operand.visit(f);
                }
            }
            ScalarExpr::Condition(inner) => inner.visit(f),
            ScalarExpr::Property(_)
            | ScalarExpr::NavigationProperty { .. }
            | ScalarExpr::CurrentElement
            | ScalarExpr::Alias(_)
            | ScalarExpr::Literal(_) => {}
        }
    }
}
