use tracing::{instrument, trace};

use crate::{
    ast::{ArithmeticOp, ComparisonOp, LogicalOp, Token, TokenKind},
    error::LexError,
};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    previous: Option<TokenKind>,
}

/// Tokenize `text` into a fresh vector ending with one `Eof` token.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    tokenize_into(text, &mut tokens)?;
    Ok(tokens)
}

/// Tokenize `text`, appending to `tokens` (typically a pooled buffer).
#[instrument(level = "trace", skip(tokens), fields(len = text.len()))]
pub fn tokenize_into(text: &str, tokens: &mut Vec<Token>) -> Result<(), LexError> {
    let mut lexer = Lexer::new(text);
    loop {
        let token = lexer.next_token()?;
        let done = token.is(TokenKind::Eof);
        tokens.push(token);
        if done {
            break;
        }
    }
    trace!(count = tokens.len(), "tokenized");
    Ok(())
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            previous: None,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn slice(&self, start: usize) -> String {
        self.input[start..self.position].iter().collect()
    }

    /// Consume exactly `count` characters matching `pred`.
    fn take_exact(&mut self, count: usize, pred: impl Fn(char) -> bool) -> bool {
        for _ in 0..count {
            match self.current_char() {
                Some(ch) if pred(ch) => self.advance(),
                _ => return false,
            }
        }
        true
    }

    fn take_char(&mut self, expected: char) -> bool {
        if self.current_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn take_digits(&mut self) -> usize {
        let mut count = 0;
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            count += 1;
        }
        count
    }

    fn read_string(&mut self, start: usize) -> Result<String, LexError> {
        let mut result = String::new();
        self.advance(); // Consume opening quote

        while let Some(ch) = self.current_char() {
            if ch == '\'' {
                if self.peek_char(1) == Some('\'') {
                    result.push('\'');
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(result);
                }
            } else {
                result.push(ch);
                self.advance();
            }
        }

        Err(LexError::UnterminatedString { offset: start })
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        if self.current_char() == Some('$') {
            self.advance();
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        self.slice(start)
    }

    /// `8-4-4-4-12` hex digits, not followed by more hex or a hyphen.
    fn scan_guid(&mut self) -> Option<Token> {
        let start = self.position;
        let hex = |c: char| c.is_ascii_hexdigit();
        let matched = self.take_exact(8, hex)
            && self.take_char('-')
            && self.take_exact(4, hex)
            && self.take_char('-')
            && self.take_exact(4, hex)
            && self.take_char('-')
            && self.take_exact(4, hex)
            && self.take_char('-')
            && self.take_exact(12, hex)
            && !self.current_char().is_some_and(|c| c.is_ascii_hexdigit() || c == '-');

        if matched {
            let text = self.slice(start).to_ascii_lowercase();
            Some(Token::new(TokenKind::Guid, text, start))
        } else {
            self.position = start;
            None
        }
    }

    /// `YYYY-MM-DD` shape only; range checks happen in [`Self::scan_date`].
    fn match_date_shape(&mut self) -> bool {
        let digit = |c: char| c.is_ascii_digit();
        self.take_exact(4, digit)
            && self.take_char('-')
            && self.take_exact(2, digit)
            && self.take_char('-')
            && self.take_exact(2, digit)
    }

    /// `HH:MM[:SS[.f+]]`; seconds are required unless `allow_short`.
    fn match_time_shape(&mut self, allow_short: bool) -> bool {
        let digit = |c: char| c.is_ascii_digit();
        if !(self.take_exact(2, digit) && self.take_char(':') && self.take_exact(2, digit)) {
            return false;
        }

        if self.current_char() == Some(':') {
            self.advance();
            if !self.take_exact(2, digit) {
                return false;
            }
            if self.current_char() == Some('.') {
                self.advance();
                if self.take_digits() == 0 {
                    return false;
                }
            }
            true
        } else {
            allow_short
        }
    }

    fn match_offset_suffix(&mut self) -> bool {
        match self.current_char() {
            Some('Z') | Some('z') => {
                self.advance();
                true
            }
            Some('+') | Some('-') => {
                let start = self.position;
                self.advance();
                let digit = |c: char| c.is_ascii_digit();
                if self.take_exact(2, digit) && self.take_char(':') && self.take_exact(2, digit) {
                    true
                } else {
                    self.position = start;
                    false
                }
            }
            _ => true,
        }
    }

    fn scan_datetime(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        let matched = self.match_date_shape()
            && matches!(self.current_char(), Some('T') | Some('t'))
            && {
                self.advance();
                self.match_time_shape(true)
            }
            && self.match_offset_suffix()
            && !self.current_char().is_some_and(|c| c.is_ascii_alphanumeric());

        if !matched {
            self.position = start;
            return Ok(None);
        }

        let text = self.slice(start);
        let (date, time) = text.split_at(10);
        if !valid_date(date) || !valid_time(&time[1..]) {
            return Err(LexError::MalformedLiteral {
                kind: "date-time",
                text,
                offset: start,
            });
        }
        Ok(Some(Token::new(TokenKind::DateTime, text, start)))
    }

    fn scan_date(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        if !self.match_date_shape() || self.current_char().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.position = start;
            return Ok(None);
        }

        let text = self.slice(start);
        if !valid_date(&text) {
            return Err(LexError::MalformedLiteral {
                kind: "date",
                text,
                offset: start,
            });
        }
        Ok(Some(Token::new(TokenKind::Date, text, start)))
    }

    fn scan_time(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        if !self.match_time_shape(false) || self.current_char().is_some_and(|c| c.is_ascii_digit() || c == ':') {
            self.position = start;
            return Ok(None);
        }

        let text = self.slice(start);
        if !valid_time(&text) {
            return Err(LexError::MalformedLiteral {
                kind: "time",
                text,
                offset: start,
            });
        }
        Ok(Some(Token::new(TokenKind::Time, text, start)))
    }

    /// Optional sign, integer part, optional fraction, optional exponent.
    fn scan_number(&mut self) -> Option<Token> {
        let start = self.position;
        if matches!(self.current_char(), Some('+') | Some('-')) {
            self.advance();
        }

        if self.take_digits() == 0 {
            self.position = start;
            return None;
        }

        if self.current_char() == Some('.') && self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.take_digits();
        }

        if matches!(self.current_char(), Some('e') | Some('E')) {
            let exponent_start = self.position;
            self.advance();
            if matches!(self.current_char(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.take_digits() == 0 {
                // `2eq` style input: the `e` belongs to whatever follows.
                self.position = exponent_start;
            }
        }

        Some(Token::new(TokenKind::Number, self.slice(start), start))
    }

    fn scan_word(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let word = self.read_identifier();
        let lowered = word.to_ascii_lowercase();

        if (lowered == "geography" || lowered == "geometry") && self.current_char() == Some('\'') {
            let body = self.read_string(self.position)?;
            let kind = if lowered == "geography" {
                TokenKind::Geography
            } else {
                TokenKind::Geometry
            };
            return Ok(Token::new(kind, body, start));
        }

        let call_follows = self.current_char() == Some('(');
        let kind = match lowered.as_str() {
            "and" => TokenKind::Logical(LogicalOp::And),
            "or" => TokenKind::Logical(LogicalOp::Or),
            "not" => TokenKind::Not,
            "true" | "false" => TokenKind::Boolean,
            "null" => TokenKind::Null,
            // Prefix forms: add(a, b), has(a, b)
            "add" | "sub" | "mul" | "div" | "mod" | "has" if call_follows => TokenKind::Identifier,
            other => match (ComparisonOp::from_keyword(other), ArithmeticOp::from_keyword(other)) {
                (Some(op), _) => TokenKind::Comparison(op),
                (None, Some(op)) => TokenKind::Arithmetic(op),
                (None, None) => TokenKind::Identifier,
            },
        };

        Ok(Token::new(kind, word, start))
    }

    fn punctuation(&mut self, kind: TokenKind) -> Token {
        let start = self.position;
        self.advance();
        Token::new(kind, self.slice(start), start)
    }

    fn scan_literal_or_word(&mut self) -> Result<Token, LexError> {
        if let Some(token) = self.scan_guid() {
            return Ok(token);
        }
        if let Some(token) = self.scan_datetime()? {
            return Ok(token);
        }
        if let Some(token) = self.scan_date()? {
            return Ok(token);
        }
        if let Some(token) = self.scan_time()? {
            return Ok(token);
        }
        if let Some(token) = self.scan_number() {
            return Ok(token);
        }
        self.scan_word()
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let start = self.position;

        let token = match self.current_char() {
            None => return Ok(Token::eof(start)),
            Some('\'') => {
                let text = self.read_string(start)?;
                Token::new(TokenKind::String, text, start)
            }
            Some('(') => self.punctuation(TokenKind::LParen),
            Some(')') => self.punctuation(TokenKind::RParen),
            Some(',') => self.punctuation(TokenKind::Comma),
            Some(':') => self.punctuation(TokenKind::Colon),
            Some('*') => self.punctuation(TokenKind::Arithmetic(ArithmeticOp::Mul)),
            Some('/') => self.punctuation(TokenKind::Arithmetic(ArithmeticOp::Div)),
            Some(sign @ ('+' | '-')) => {
                // A sign directly after an operand is an operator: `Price-5`.
                let after_operand = self.previous.is_some_and(|k| k.ends_operand());
                let digit_follows = self.peek_char(1).is_some_and(|c| c.is_ascii_digit());
                match (after_operand, digit_follows) {
                    (false, true) => self
                        .scan_number()
                        .ok_or(LexError::UnexpectedChar { ch: sign, offset: start })?,
                    _ if sign == '+' => self.punctuation(TokenKind::Arithmetic(ArithmeticOp::Add)),
                    _ => self.punctuation(TokenKind::Arithmetic(ArithmeticOp::Sub)),
                }
            }
            Some(ch) if ch.is_ascii_digit() || ch.is_ascii_hexdigit() => self.scan_literal_or_word()?,
            Some(ch) if ch.is_alphabetic() || ch == '_' || ch == '$' => self.scan_word()?,
            Some(ch) => return Err(LexError::UnexpectedChar { ch, offset: start }),
        };

        self.previous = Some(token.kind);
        Ok(token)
    }
}

fn valid_date(text: &str) -> bool {
    let parts: Vec<u32> = text.split('-').filter_map(|p| p.parse().ok()).collect();
    match parts.as_slice() {
        [_, month, day] => (1..=12).contains(month) && (1..=31).contains(day),
        _ => false,
    }
}

fn valid_time(text: &str) -> bool {
    // Strip a trailing offset before checking fields.
    let clock = text
        .trim_end_matches(['Z', 'z'])
        .split(['+', '-'])
        .next()
        .unwrap_or_default();
    let fields: Vec<&str> = clock.split(':').collect();
    let number = |s: &str| s.split('.').next().and_then(|n| n.parse::<u32>().ok());
    match fields.as_slice() {
        [h, m] => number(h).is_some_and(|h| h < 24) && number(m).is_some_and(|m| m < 60),
        [h, m, s] => {
            number(h).is_some_and(|h| h < 24)
                && number(m).is_some_and(|m| m < 60)
                && number(s).is_some_and(|s| s < 60)
        }
        _ => false,
    }
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("and OR not Eq true null");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Logical(LogicalOp::And));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Logical(LogicalOp::Or));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Not);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Comparison(ComparisonOp::Eq));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Boolean);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Null);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
}

#[test]
fn test_eof_is_idempotent() {
    let mut lexer = Lexer::new("x");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
    assert_eq!(lexer.next_token().unwrap(), Token::eof(1));
    assert_eq!(lexer.next_token().unwrap(), Token::eof(1));
}

#[test]
fn test_failed_guid_scan_restores_position() {
    // Eight hex digits and a hyphen, then not a GUID: falls through to a number.
    let tokens = tokenize("12345678-1").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Number);
    assert_eq!(tokens[0].text, "12345678");
    assert_eq!(tokens[1].kind, TokenKind::Arithmetic(ArithmeticOp::Sub));
    assert_eq!(tokens[2].text, "1");
}
