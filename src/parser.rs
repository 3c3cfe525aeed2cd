use tracing::instrument;

use crate::{
    ast::{
        ArithmeticOp, BinaryOp, ComparisonOp, LambdaKind, LogicalOp, Node, SortDirection, Token,
        TokenKind, UnaryOp,
    },
    error::{LexError, ParseError},
    lexer::tokenize_into,
    pool::Pools,
    value::{Literal, SpatialKind, SpatialLiteral},
};

type ParseResult = Result<Box<Node>, ParseError>;

/// Recursive-descent parser over a pooled token buffer.
///
/// Every node is drawn from the node pool. On success the caller owns the
/// returned tree and must hand it back with
/// [`NodePool::release`](crate::pool::NodePool::release) once it has been
/// converted; on failure everything acquired so far has already been released.
pub struct Parser<'p> {
    tokens: Vec<Token>,
    position: usize,
    pools: &'p Pools,
}

/// Parse a complete expression using the process-wide pools.
pub fn parse(input: &str) -> ParseResult {
    Parser::new(input, Pools::global())?.parse()
}

impl<'p> Parser<'p> {
    pub fn new(input: &str, pools: &'p Pools) -> Result<Self, ParseError> {
        let mut tokens = pools.tokens.acquire();
        if let Err(e) = tokenize_into(input, &mut tokens) {
            pools.tokens.release(tokens);
            return Err(e.into());
        }

        Ok(Parser {
            tokens,
            position: 0,
            pools,
        })
    }

    // The buffer always ends with Eof, so indexing is clamped to it.
    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn peek(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.position + offset).min(last)]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().is(kind)
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        if token.is(TokenKind::Eof) {
            ParseError::UnexpectedEof {
                expected: expected.to_string(),
                offset: token.offset,
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind,
                offset: token.offset,
            }
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if !self.check(kind) {
            return Err(self.error(&kind.to_string()));
        }
        let token = self.current().clone();
        self.advance();
        Ok(token)
    }

    /// Like [`Self::expect`], releasing `held` when the token is missing.
    fn expect_holding(&mut self, kind: TokenKind, held: Box<Node>) -> ParseResult {
        match self.expect(kind) {
            Ok(_) => Ok(held),
            Err(e) => {
                self.pools.nodes.release(held);
                Err(e)
            }
        }
    }

    /// Run a sub-parse while holding a finished left operand.
    fn parse_holding(
        &mut self,
        held: Box<Node>,
        parse: impl FnOnce(&mut Self) -> ParseResult,
    ) -> Result<(Box<Node>, Box<Node>), ParseError> {
        match parse(self) {
            Ok(next) => Ok((held, next)),
            Err(e) => {
                self.pools.nodes.release(held);
                Err(e)
            }
        }
    }

    fn node(&self, node: Node) -> Box<Node> {
        self.pools.nodes.acquire(node)
    }

    /// Parse a complete expression; trailing tokens are an error.
    #[instrument(level = "trace", skip(self))]
    pub fn parse(&mut self) -> ParseResult {
        let expr = self.parse_expression()?;
        self.expect_holding(TokenKind::Eof, expr)
    }

    /// Parse an order-by item: an expression with an optional `asc`/`desc`.
    pub fn parse_order_by_item(&mut self) -> Result<(Box<Node>, SortDirection), ParseError> {
        let expr = self.parse_expression()?;

        let direction = match self.current() {
            token if token.is(TokenKind::Identifier) => SortDirection::from_keyword(&token.text),
            _ => None,
        };
        if direction.is_some() {
            self.advance();
        }

        let expr = self.expect_holding(TokenKind::Eof, expr)?;
        Ok((expr, direction.unwrap_or_default()))
    }

    pub fn parse_expression(&mut self) -> ParseResult {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult {
        let mut left = self.parse_and()?;

        while self.check(TokenKind::Logical(LogicalOp::Or)) {
            self.advance();
            let (l, right) = self.parse_holding(left, Self::parse_and)?;

            left = self.node(Node::Binary {
                op: BinaryOp::Logical(LogicalOp::Or),
                left: l,
                right,
            });
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut left = self.parse_not()?;

        while self.check(TokenKind::Logical(LogicalOp::And)) {
            self.advance();
            let (l, right) = self.parse_holding(left, Self::parse_not)?;

            left = self.node(Node::Binary {
                op: BinaryOp::Logical(LogicalOp::And),
                left: l,
                right,
            });
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult {
        if self.check(TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(self.node(Node::Unary {
                op: UnaryOp::Not,
                operand,
            }));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult {
        let left = self.parse_arithmetic()?;

        let op = match self.current().kind {
            TokenKind::Comparison(op) => op,
            _ => return Ok(left),
        };
        self.advance();

        let (left, right) = if op == ComparisonOp::In {
            self.parse_holding(left, Self::parse_collection)?
        } else {
            self.parse_holding(left, Self::parse_arithmetic)?
        };

        Ok(self.node(Node::Comparison { op, left, right }))
    }

    /// `'(' (item (',' item)*)? ')'` on the right of `in`.
    fn parse_collection(&mut self) -> ParseResult {
        let offset = self.current().offset;
        self.expect(TokenKind::LParen)?;

        let mut items = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                match self.parse_arithmetic() {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        self.pools.nodes.release_all(items);
                        return Err(e);
                    }
                }

                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if let Err(e) = self.expect(TokenKind::RParen) {
            self.pools.nodes.release_all(items);
            return Err(e);
        }
        Ok(self.node(Node::Collection { items, offset }))
    }

    fn parse_arithmetic(&mut self) -> ParseResult {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Arithmetic(op) if op.is_additive() => op,
                _ => break,
            };

            self.advance();
            let (l, right) = self.parse_holding(left, Self::parse_term)?;

            left = self.node(Node::Binary {
                op: BinaryOp::Arithmetic(op),
                left: l,
                right,
            });
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Arithmetic(op) if !op.is_additive() => op,
                _ => break,
            };

            self.advance();
            let (l, right) = self.parse_holding(left, Self::parse_unary)?;

            left = self.node(Node::Binary {
                op: BinaryOp::Arithmetic(op),
                left: l,
                right,
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult {
        // Signed numbers are single tokens; this is `-Price` or `- (a add b)`.
        if self.check(TokenKind::Arithmetic(ArithmeticOp::Sub)) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(self.node(Node::Unary {
                op: UnaryOp::Negate,
                operand,
            }));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult {
        let token = self.current().clone();

        match token.kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                let inner = self.expect_holding(TokenKind::RParen, inner)?;
                Ok(self.node(Node::Group(inner)))
            }
            TokenKind::Identifier => {
                self.advance();
                self.parse_identifier(token)
            }
            kind if kind.is_literal() => {
                let value = literal_from_token(&token)?;
                self.advance();
                Ok(self.node(Node::Literal {
                    value,
                    offset: token.offset,
                }))
            }
            _ => Err(self.error("expression")),
        }
    }

    /// After an identifier: a call, a `/` path, or a lambda over a path.
    fn parse_identifier(&mut self, token: Token) -> ParseResult {
        if self.check(TokenKind::LParen) {
            self.advance();
            return self.parse_call(token);
        }

        let mut segments = vec![token.text];

        // '/' is a path separator only when an identifier follows.
        while self.check(TokenKind::Arithmetic(ArithmeticOp::Div))
            && self.peek(1).is(TokenKind::Identifier)
        {
            let segment = self.peek(1).text.clone();

            if let Some(kind) = LambdaKind::from_segment(&segment)
                && self.peek(2).is(TokenKind::LParen)
            {
                self.advance(); // consume '/'
                self.advance(); // consume any/all
                self.advance(); // consume '('
                return self.parse_lambda(segments, kind, token.offset);
            }

            self.advance();
            self.advance();
            segments.push(segment);
        }

        Ok(self.node(Node::Identifier {
            segments,
            offset: token.offset,
        }))
    }

    fn parse_call(&mut self, name: Token) -> ParseResult {
        let mut args = Vec::new();

        if !self.check(TokenKind::RParen) {
            loop {
                match self.parse_or() {
                    Ok(arg) => args.push(arg),
                    Err(e) => {
                        self.pools.nodes.release_all(args);
                        return Err(e);
                    }
                }

                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if let Err(e) = self.expect(TokenKind::RParen) {
            self.pools.nodes.release_all(args);
            return Err(e);
        }

        Ok(self.node(Node::FunctionCall {
            name: name.text,
            args,
            offset: name.offset,
        }))
    }

    /// Lambda body after `any(` / `all(`: `')'` or `variable ':' Or ')'`.
    fn parse_lambda(&mut self, path: Vec<String>, kind: LambdaKind, offset: usize) -> ParseResult {
        if self.check(TokenKind::RParen) {
            self.advance();
            return Ok(self.node(Node::Lambda {
                path,
                kind,
                variable: None,
                predicate: None,
                offset,
            }));
        }

        let variable = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::Colon)?;

        let predicate = self.parse_or()?;
        let predicate = self.expect_holding(TokenKind::RParen, predicate)?;

        Ok(self.node(Node::Lambda {
            path,
            kind,
            variable: Some(variable),
            predicate: Some(predicate),
            offset,
        }))
    }
}

impl Drop for Parser<'_> {
    fn drop(&mut self) {
        self.pools.tokens.release(std::mem::take(&mut self.tokens));
    }
}

fn literal_from_token(token: &Token) -> Result<Literal, ParseError> {
    let malformed = |kind: &'static str| LexError::MalformedLiteral {
        kind,
        text: token.text.clone(),
        offset: token.offset,
    };

    let value = match token.kind {
        TokenKind::String => Literal::String(token.text.clone()),
        TokenKind::Number => Literal::from_number(&token.text).ok_or_else(|| malformed("number"))?,
        TokenKind::Boolean => Literal::Boolean(token.text.eq_ignore_ascii_case("true")),
        TokenKind::Null => Literal::Null,
        TokenKind::Date => Literal::Date(token.text.clone()),
        TokenKind::Time => Literal::TimeOfDay(token.text.clone()),
        TokenKind::DateTime => Literal::DateTimeOffset(token.text.clone()),
        TokenKind::Guid => Literal::Guid(token.text.clone()),
        TokenKind::Geography => Literal::Spatial(
            SpatialLiteral::parse(SpatialKind::Geography, &token.text).ok_or_else(|| malformed("geography"))?,
        ),
        TokenKind::Geometry => Literal::Spatial(
            SpatialLiteral::parse(SpatialKind::Geometry, &token.text).ok_or_else(|| malformed("geometry"))?,
        ),
        _ => return Err(malformed("literal").into()),
    };
    Ok(value)
}

/// Parse `input`, hand the tree to `f`, then return the tree to the pool.
pub fn with_parsed<T, E>(
    input: &str,
    pools: &Pools,
    f: impl FnOnce(&Node) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<ParseError>,
{
    let tree = Parser::new(input, pools)?.parse()?;
    let result = f(&tree);
    pools.nodes.release(tree);
    result
}

/// Like [`with_parsed`], for an order-by item with its direction.
pub fn with_parsed_order_by<T, E>(
    input: &str,
    pools: &Pools,
    f: impl FnOnce(&Node, SortDirection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<ParseError>,
{
    let (tree, direction) = Parser::new(input, pools)?.parse_order_by_item()?;
    let result = f(&tree, direction);
    pools.nodes.release(tree);
    result
}
