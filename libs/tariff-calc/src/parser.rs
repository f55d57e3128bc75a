//! Tokenizer and recursive-descent parser
//!
//! Turns an expression string into an [`Expr`] tree. Only the closed grammar
//! is accepted; anything else (assignment, attribute calls, lambdas, unknown
//! functions) is a syntax error rather than something to execute.

use crate::builtin_functions::Builtin;
use crate::error::{CalcError, Result};
use crate::value::Value;

/// Maximum nesting depth accepted by the parser
pub const MAX_DEPTH: usize = 64;

/// Maximum number of tokens in one expression
///
/// Left-associative operator chains do not nest in the source but do nest in
/// the tree, so the token count bounds the tree depth the evaluator recurses.
pub const MAX_TOKENS: usize = 512;

/// Expression syntax tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c` holds when every adjacent pair holds
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
}

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Identifier(String),
    True,
    False,
    None,

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,

    And,
    Or,
    Not,
    In,

    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
}

/// Parse an expression string into a syntax tree
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(CalcError::syntax("empty expression"));
    }
    if tokens.len() > MAX_TOKENS {
        return Err(CalcError::syntax(format!(
            "expression has {} tokens, limit is {}",
            tokens.len(),
            MAX_TOKENS
        )));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::syntax(format!(
            "unexpected token {:?} after expression",
            token
        )));
    }
    Ok(expr)
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => continue,
            '(' => tokens.push(Token::LeftParen),
            ')' => tokens.push(Token::RightParen),
            '[' => tokens.push(Token::LeftBracket),
            ']' => tokens.push(Token::RightBracket),
            ',' => tokens.push(Token::Comma),
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '%' => tokens.push(Token::Percent),
            '*' => {
                if chars.next_if_eq(&'*').is_some() {
                    tokens.push(Token::DoubleStar);
                } else {
                    tokens.push(Token::Star);
                }
            },
            '/' => {
                if chars.next_if_eq(&'/').is_some() {
                    tokens.push(Token::DoubleSlash);
                } else {
                    tokens.push(Token::Slash);
                }
            },
            '>' => {
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::GreaterEqual);
                } else {
                    tokens.push(Token::Greater);
                }
            },
            '<' => {
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::LessEqual);
                } else {
                    tokens.push(Token::Less);
                }
            },
            '=' => {
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Equal);
                } else {
                    return Err(CalcError::syntax("assignment '=' is not allowed"));
                }
            },
            '!' => {
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEqual);
                } else {
                    tokens.push(Token::Not);
                }
            },
            '&' => {
                if chars.next_if_eq(&'&').is_some() {
                    tokens.push(Token::And);
                } else {
                    return Err(CalcError::syntax("invalid operator '&'"));
                }
            },
            '|' => {
                if chars.next_if_eq(&'|').is_some() {
                    tokens.push(Token::Or);
                } else {
                    return Err(CalcError::syntax("invalid operator '|'"));
                }
            },
            '\'' | '"' => {
                let mut text = String::new();
                let mut closed = false;
                for next_ch in chars.by_ref() {
                    if next_ch == ch {
                        closed = true;
                        break;
                    }
                    text.push(next_ch);
                }
                if !closed {
                    return Err(CalcError::syntax("unterminated string literal"));
                }
                tokens.push(Token::Str(text));
            },
            '0'..='9' | '.' => {
                let mut number = String::from(ch);
                while let Some(next_ch) = chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
                    number.push(next_ch);
                }
                // exponent only when digits follow, so `2e` stays a syntax error
                let mut lookahead = chars.clone();
                if matches!(lookahead.next(), Some('e' | 'E')) {
                    let sign = lookahead.next_if(|c| *c == '+' || *c == '-');
                    if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        number.push('e');
                        chars.next();
                        if let Some(sign) = sign {
                            number.push(sign);
                            chars.next();
                        }
                        while let Some(next_ch) = chars.next_if(|c| c.is_ascii_digit()) {
                            number.push(next_ch);
                        }
                    }
                }
                let value = number
                    .parse::<f64>()
                    .map_err(|_| CalcError::syntax(format!("invalid number: {}", number)))?;
                tokens.push(Token::Number(value));
            },
            c if c.is_alphabetic() || c == '_' => {
                let mut identifier = String::from(c);
                loop {
                    if let Some(next_ch) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
                        identifier.push(next_ch);
                        continue;
                    }
                    // a dot continues a dotted name only when a name segment follows
                    let mut lookahead = chars.clone();
                    if lookahead.next() == Some('.')
                        && lookahead
                            .peek()
                            .is_some_and(|c| c.is_alphabetic() || *c == '_')
                    {
                        chars.next();
                        identifier.push('.');
                        continue;
                    }
                    break;
                }

                match identifier.to_ascii_lowercase().as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::In),
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "none" | "null" => tokens.push(Token::None),
                    _ => tokens.push(Token::Identifier(identifier)),
                }
            },
            _ => return Err(CalcError::syntax(format!("invalid character: {}", ch))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;

        while self.match_token(&Token::Or) {
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }

        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_not()?;

        while self.match_token(&Token::And) {
            let right = self.parse_not()?;
            expr = binary(expr, BinaryOp::And, right);
        }

        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.match_token(&Token::Not) {
            self.enter()?;
            let operand = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();

        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Equal), _) => CompareOp::Equal,
                (Some(Token::NotEqual), _) => CompareOp::NotEqual,
                (Some(Token::Less), _) => CompareOp::Less,
                (Some(Token::LessEqual), _) => CompareOp::LessEqual,
                (Some(Token::Greater), _) => CompareOp::Greater,
                (Some(Token::GreaterEqual), _) => CompareOp::GreaterEqual,
                (Some(Token::In), _) => CompareOp::In,
                (Some(Token::Not), Some(Token::In)) => CompareOp::NotIn,
                _ => break,
            };
            self.current += if op == CompareOp::NotIn { 2 } else { 1 };
            rest.push((op, self.parse_additive()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::DoubleSlash) => BinaryOp::FloorDivide,
                Some(Token::Percent) => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Minus,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.match_token(&Token::DoubleStar) {
            // right-associative, binds tighter than unary minus on its left
            self.enter()?;
            let exponent = self.parse_unary();
            self.depth -= 1;
            return Ok(binary(base, BinaryOp::Power, exponent?));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.advance().cloned() else {
            return Err(CalcError::syntax("unexpected end of expression"));
        };

        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::None)),
            Token::Identifier(name) => {
                if self.match_token(&Token::LeftParen) {
                    let func = Builtin::from_name(&name)
                        .ok_or_else(|| CalcError::unsupported_function(name.clone()))?;
                    let args = self.parse_sequence(&Token::RightParen)?;
                    return Ok(Expr::Call { func, args });
                }
                Ok(Expr::Var(name))
            },
            Token::LeftParen => {
                let expr = self.parse_expression()?;
                if !self.match_token(&Token::RightParen) {
                    return Err(CalcError::syntax("expected ')' after expression"));
                }
                Ok(expr)
            },
            Token::LeftBracket => Ok(Expr::List(self.parse_sequence(&Token::RightBracket)?)),
            other => Err(CalcError::syntax(format!("unexpected token: {:?}", other))),
        }
    }

    /// Comma-separated expressions up to `close` (already past the opener)
    fn parse_sequence(&mut self, close: &Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.match_token(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.match_token(close) {
                return Ok(items);
            }
            if !self.match_token(&Token::Comma) {
                return Err(CalcError::syntax(format!("expected ',' or {:?}", close)));
            }
            // trailing comma
            if self.match_token(close) {
                return Ok(items);
            }
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.current + offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.current)?;
        self.current += 1;
        Some(token)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if let Some(token) = self.peek() {
            if std::mem::discriminant(token) == std::mem::discriminant(expected) {
                self.current += 1;
                return true;
            }
        }
        false
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    #[test]
    fn test_precedence() {
        // 2 + 3 * 4 => 2 + (3 * 4)
        assert_eq!(
            parse("2 + 3 * 4").unwrap(),
            binary(num(2.0), BinaryOp::Add, binary(num(3.0), BinaryOp::Multiply, num(4.0)))
        );
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(parse("1e-3").unwrap(), num(0.001));
        assert_eq!(parse("2.5E+2").unwrap(), num(250.0));
        assert_eq!(
            parse("user.billed_kwh * 1e3").unwrap(),
            binary(
                Expr::Var("user.billed_kwh".to_string()),
                BinaryOp::Multiply,
                num(1000.0)
            )
        );
        // no digits after the marker
        assert!(parse("2e").is_err());
        assert!(parse("2e+").is_err());
    }

    #[test]
    fn test_dotted_identifier() {
        assert_eq!(
            parse("user.bill_date.month").unwrap(),
            Expr::Var("user.bill_date.month".to_string())
        );
    }

    #[test]
    fn test_number_after_name_is_not_dotted() {
        // "x.5" is not a dotted name; the dangling ".5" is a separate number
        assert!(parse("x.5").is_err());
    }

    #[test]
    fn test_chained_comparison() {
        let expr = parse("2.2 < delivery_voltage <= 15").unwrap();
        let Expr::Compare { rest, .. } = expr else {
            panic!("expected chained comparison");
        };
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0, CompareOp::Less);
        assert_eq!(rest[1].0, CompareOp::LessEqual);
    }

    #[test]
    fn test_not_in() {
        let expr = parse("user.bill_date.month not in [6, 7, 8]").unwrap();
        let Expr::Compare { rest, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(rest[0].0, CompareOp::NotIn);
        assert!(matches!(rest[0].1, Expr::List(ref items) if items.len() == 3));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(parse("True AND false").unwrap(), parse("true and False").unwrap());
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            parse("'On Peak'").unwrap(),
            Expr::Literal(Value::Str("On Peak".to_string()))
        );
        assert_eq!(
            parse("\"Off Peak\"").unwrap(),
            Expr::Literal(Value::Str("Off Peak".to_string()))
        );
        assert!(parse("'unterminated").is_err());
    }

    #[test]
    fn test_rejects_outside_grammar() {
        assert!(matches!(
            parse("__import__('os')").unwrap_err(),
            CalcError::UnsupportedFunction(_)
        ));
        assert!(parse("x = 1").is_err());
        assert!(parse("lambda: 1").is_err());
        assert!(parse("user.billed_kwh;").is_err());
        assert!(parse("").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("(1 + 2").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&deep).unwrap_err(), CalcError::TooDeep(MAX_DEPTH));

        let negations = format!("{}1", "-".repeat(200));
        assert_eq!(parse(&negations).unwrap_err(), CalcError::TooDeep(MAX_DEPTH));
    }

    #[test]
    fn test_token_limit() {
        let long = vec!["1"; MAX_TOKENS].join(" + ");
        assert!(matches!(parse(&long).unwrap_err(), CalcError::Syntax(_)));
    }

    #[test]
    fn test_power_binds_right() {
        // -2 ** 2 => -(2 ** 2)
        assert_eq!(
            parse("-2 ** 2").unwrap(),
            Expr::Unary {
                op: UnaryOp::Minus,
                operand: Box::new(binary(num(2.0), BinaryOp::Power, num(2.0))),
            }
        );
    }
}
