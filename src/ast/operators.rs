use std::fmt;

/// Comparison operators.
///
/// `has` and `in` sit at the same precedence level as the relational
/// operators; the parser routes `in` to a parenthesized collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// Equal (`eq`)
    Eq,
    /// Not equal (`ne`)
    Ne,
    /// Greater than (`gt`)
    Gt,
    /// Greater than or equal (`ge`)
    Ge,
    /// Less than (`lt`)
    Lt,
    /// Less than or equal (`le`)
    Le,
    /// Flags containment (`has`)
    Has,
    /// Membership in a literal list (`in`)
    In,
}

impl ComparisonOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "eq" => Some(ComparisonOp::Eq),
            "ne" => Some(ComparisonOp::Ne),
            "gt" => Some(ComparisonOp::Gt),
            "ge" => Some(ComparisonOp::Ge),
            "lt" => Some(ComparisonOp::Lt),
            "le" => Some(ComparisonOp::Le),
            "has" => Some(ComparisonOp::Has),
            "in" => Some(ComparisonOp::In),
            _ => None,
        }
    }

    /// The SQL spelling of a relational operator. `has` and `in` have
    /// dedicated translations and return `None`.
    pub fn sql_symbol(&self) -> Option<&'static str> {
        match self {
            ComparisonOp::Eq => Some("="),
            ComparisonOp::Ne => Some("<>"),
            ComparisonOp::Gt => Some(">"),
            ComparisonOp::Ge => Some(">="),
            ComparisonOp::Lt => Some("<"),
            ComparisonOp::Le => Some("<="),
            ComparisonOp::Has | ComparisonOp::In => None,
        }
    }
}

/// Logical connectives (word forms only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// Logical AND (`and`)
    And,
    /// Logical OR (`or`)
    Or,
}

impl LogicalOp {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

/// Arithmetic operators, in both keyword (`add`) and symbol (`+`) forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    /// Addition (`add`, `+`)
    Add,
    /// Subtraction (`sub`, `-`)
    Sub,
    /// Multiplication (`mul`, `*`)
    Mul,
    /// Division (`div`, `/`)
    Div,
    /// Modulo (`mod`)
    Mod,
}

impl ArithmeticOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "add" => Some(ArithmeticOp::Add),
            "sub" => Some(ArithmeticOp::Sub),
            "mul" => Some(ArithmeticOp::Mul),
            "div" => Some(ArithmeticOp::Div),
            "mod" => Some(ArithmeticOp::Mod),
            _ => None,
        }
    }

    pub fn sql_symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }

    /// Additive operators bind looser than multiplicative ones.
    pub fn is_additive(&self) -> bool {
        matches!(self, ArithmeticOp::Add | ArithmeticOp::Sub)
    }
}

/// Binary syntax-tree operators: the logical connectives plus arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Logical(LogicalOp),
    Arithmetic(ArithmeticOp),
}

/// Unary syntax-tree operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation (`not`)
    Not,
    /// Numeric negation (`-Price`)
    Negate,
}

/// Lambda quantifiers over a collection-valued path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LambdaKind {
    /// `any` - at least one element matches (or the collection is non-empty)
    Any,
    /// `all` - every element matches
    All,
}

impl LambdaKind {
    pub fn from_segment(segment: &str) -> Option<Self> {
        if segment.eq_ignore_ascii_case("any") {
            Some(LambdaKind::Any)
        } else if segment.eq_ignore_ascii_case("all") {
            Some(LambdaKind::All)
        } else {
            None
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Has => "has",
            ComparisonOp::In => "in",
        };
        f.write_str(word)
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::Div => "div",
            ArithmeticOp::Mod => "mod",
        };
        f.write_str(word)
    }
}

/// Order-by direction suffix (`asc` / `desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_keyword(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Ascending)
        } else if word.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Descending)
        } else {
            None
        }
    }

    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}
