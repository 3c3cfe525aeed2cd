use crate::{
    ast::{BinaryOp, ComparisonOp, LambdaKind, UnaryOp},
    value::Literal,
};

/// Syntax-tree node produced by the parser.
///
/// The set of variants is closed: the converter matches on it exhaustively,
/// so adding a variant is a compile error until every consumer handles it.
/// Children are boxed slots drawn from a [`NodePool`](crate::pool::NodePool);
/// the tree has no back-references.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Logical or arithmetic binary operation
    ///
    /// # Examples
    /// ```text
    /// IsActive eq true and Price gt 10
    /// Price add 10
    /// Price * 2
    /// ```
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `not` or numeric negation
    ///
    /// # Examples
    /// ```text
    /// not contains(Name, 'x')
    /// -Price
    /// ```
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },

    /// Comparison, including `has` and `in`
    ///
    /// For `in`, `right` is always a [`Node::Collection`].
    ///
    /// # Examples
    /// ```text
    /// Price gt 100
    /// Status has 1
    /// Category in ('A', 'B')
    /// ```
    Comparison {
        op: ComparisonOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Function call with zero or more full sub-expression arguments
    ///
    /// # Examples
    /// ```text
    /// now()
    /// contains(Name, 'milk')
    /// substring(Name, 1, 2)
    /// ```
    FunctionCall {
        name: String,
        args: Vec<Box<Node>>,
        offset: usize,
    },

    /// Property, alias, range variable or type name, possibly a `/` path
    ///
    /// # Examples
    /// ```text
    /// Price
    /// Category/Name
    /// t/Name
    /// ```
    Identifier {
        segments: Vec<String>,
        offset: usize,
    },

    /// Literal value
    Literal {
        value: Literal,
        offset: usize,
    },

    /// Parenthesized sub-expression
    Group(Box<Node>),

    /// Parenthesized list on the right of `in`; may be empty
    Collection {
        items: Vec<Box<Node>>,
        offset: usize,
    },

    /// `any`/`all` over a collection path
    ///
    /// # Examples
    /// ```text
    /// Tags/any()
    /// Tags/any(t: t/Name eq 'x')
    /// Items/all(i: i/Quantity gt 0)
    /// ```
    Lambda {
        path: Vec<String>,
        kind: LambdaKind,
        variable: Option<String>,
        predicate: Option<Box<Node>>,
        offset: usize,
    },
}

impl Node {
    /// The placeholder a pooled slot holds while it sits on the free list.
    pub const VACANT: Node = Node::Literal {
        value: Literal::Null,
        offset: 0,
    };

    /// Character offset of the node's leftmost token, where one is recorded.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Node::Binary { left, .. } | Node::Comparison { left, .. } => left.offset(),
            Node::Unary { operand, .. } => operand.offset(),
            Node::Group(inner) => inner.offset(),
            Node::FunctionCall { offset, .. }
            | Node::Identifier { offset, .. }
            | Node::Literal { offset, .. }
            | Node::Collection { offset, .. }
            | Node::Lambda { offset, .. } => Some(*offset),
        }
    }

    /// Number of nodes in this subtree, the root included.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Node::Binary { left, right, .. } | Node::Comparison { left, right, .. } => {
                left.node_count() + right.node_count()
            }
            Node::Unary { operand, .. } | Node::Group(operand) => operand.node_count(),
            Node::FunctionCall { args, .. } => args.iter().map(|a| a.node_count()).sum(),
            Node::Collection { items, .. } => items.iter().map(|i| i.node_count()).sum(),
            Node::Lambda { predicate, .. } => predicate.as_ref().map_or(0, |p| p.node_count()),
            Node::Identifier { .. } | Node::Literal { .. } => 0,
        }
    }
}
