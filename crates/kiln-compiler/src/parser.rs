//! Recursive-descent parser for Kiln source units.
//!
//! Syntax errors are collected; after an error inside a declaration the parser
//! resynchronizes at the next `fn`, `class`, `;` or `}` and keeps going so one
//! batch reports as many problems as possible.

use crate::ast::{BinaryOp, Expr, ExprKind, FnDecl, Param, TypeDecl, Unit, UnaryOp};
use crate::diagnostic::{codes, Diagnostic};
use crate::lexer::{LexError, Lexer, Span, Token};

/// Nesting limit for expressions and type declarations
const MAX_DEPTH: usize = 256;

/// A syntax error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(codes::SYNTAX, self.message).at(self.span)
    }
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    depth: usize,
    errors: Vec<ParseError>,
}

/// Lex and parse `source`, returning the unit and every diagnostic found.
///
/// The unit is `None` only when lexing failed.
pub fn parse_unit(source: &str) -> (Option<Unit>, Vec<Diagnostic>) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(errors) => return (None, errors.into_iter().map(lex_diagnostic).collect()),
    };
    let mut parser = Parser::new(tokens);
    let unit = parser.parse();
    let diagnostics = parser
        .errors
        .into_iter()
        .map(ParseError::into_diagnostic)
        .collect();
    (Some(unit), diagnostics)
}

fn lex_diagnostic(error: LexError) -> Diagnostic {
    let code = match error {
        LexError::UnexpectedCharacter { .. } => codes::UNEXPECTED_CHARACTER,
        LexError::InvalidNumber { .. } => codes::INVALID_NUMBER,
    };
    Diagnostic::error(code, error.description()).at(error.span())
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].1
    }

    fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn advance(&mut self) -> (Token, Span) {
        let entry = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        entry
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, expected: &str) -> ParseError {
        ParseError {
            message: format!("Expected {}, found {}", expected, self.current()),
            span: self.current_span(),
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<Span, ParseError> {
        if self.check(&token) {
            Ok(self.advance().1)
        } else {
            Err(self.error_here(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), ParseError> {
        match self.current().clone() {
            Token::Ident(name) => {
                let span = self.advance().1;
                Ok((name, span))
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError {
                message: "Nesting too deep".to_string(),
                span: self.current_span(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Skip to a point where declaration parsing can resume.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            match self.current() {
                Token::Fn | Token::Class | Token::RightBrace => return,
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn parse(&mut self) -> Unit {
        let mut types = Vec::new();
        while !self.at_eof() {
            if self.check(&Token::Class) {
                match self.parse_type() {
                    Ok(decl) => types.push(decl),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                        self.eat(&Token::RightBrace);
                    }
                }
            } else {
                let err = self.error_here("'class'");
                self.errors.push(err);
                self.advance();
                self.synchronize();
                self.eat(&Token::RightBrace);
            }
        }
        Unit { types }
    }

    fn parse_type(&mut self) -> Result<TypeDecl, ParseError> {
        self.enter()?;
        let decl = self.parse_type_body();
        self.leave();
        decl
    }

    fn parse_type_body(&mut self) -> Result<TypeDecl, ParseError> {
        let start = self.expect(Token::Class, "'class'")?;
        let (name, _) = self.expect_ident("type name")?;
        self.expect(Token::LeftBrace, "'{'")?;

        let mut functions = Vec::new();
        let mut nested = Vec::new();
        loop {
            match self.current() {
                Token::RightBrace => break,
                Token::Eof => return Err(self.error_here("'}'")),
                Token::Fn => match self.parse_function() {
                    Ok(f) => functions.push(f),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                },
                Token::Class => {
                    let before = self.pos;
                    match self.parse_type() {
                        Ok(t) => nested.push(t),
                        Err(err) => {
                            self.errors.push(err);
                            if self.pos == before {
                                self.advance();
                            }
                            self.synchronize();
                            self.eat(&Token::RightBrace);
                        }
                    }
                }
                _ => {
                    let err = self.error_here("'fn', 'class' or '}'");
                    self.errors.push(err);
                    self.advance();
                    self.synchronize();
                }
            }
        }
        let end = self.expect(Token::RightBrace, "'}'")?;

        Ok(TypeDecl {
            name,
            span: start.to(end),
            functions,
            nested,
        })
    }

    fn parse_function(&mut self) -> Result<FnDecl, ParseError> {
        let start = self.expect(Token::Fn, "'fn'")?;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(Token::LeftParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                let (name, span) = self.expect_ident("parameter name")?;
                params.push(Param { name, span });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen, "')'")?;
        self.expect(Token::Assign, "'='")?;
        let body = self.parse_expression()?;
        let end = self.expect(Token::Semicolon, "';'")?;

        Ok(FnDecl {
            name,
            span: start.to(end),
            params,
            body,
        })
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = if self.check(&Token::If) {
            self.parse_if()
        } else {
            self.parse_binary(0)
        };
        self.leave();
        expr
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(Token::If, "'if'")?;
        let cond = self.parse_expression()?;
        self.expect(Token::Then, "'then'")?;
        let then_branch = self.parse_expression()?;
        self.expect(Token::Else, "'else'")?;
        let else_branch = self.parse_expression()?;
        let span = start.to(else_branch.span);
        Ok(Expr {
            kind: ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        })
    }

    /// Precedence climbing over binary operators.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = binary_op(self.current()) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            let span = left.span.to(right.span);
            left = Expr {
                kind: ExprKind::Binary(op, Box::new(left), Box::new(right)),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.advance().1;
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        let operand = operand?;
        let span = start.to(operand.span);
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let (token, span) = (self.current().clone(), self.current_span());
        match token {
            Token::Int(value) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Int(value),
                    span,
                })
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Bool(token == Token::True),
                    span,
                })
            }
            Token::If => self.parse_expression(),
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RightParen, "')'")?;
                Ok(Expr {
                    kind: inner.kind,
                    span: span.to(self.previous_span()),
                })
            }
            Token::Ident(first) => {
                self.advance();
                let mut path = vec![first];
                while self.eat(&Token::Dot) {
                    let (segment, _) = self.expect_ident("identifier after '.'")?;
                    path.push(segment);
                }
                if self.check(&Token::LeftParen) {
                    let args = self.parse_arguments()?;
                    return Ok(Expr {
                        kind: ExprKind::Call { path, args },
                        span: span.to(self.previous_span()),
                    });
                }
                if path.len() > 1 {
                    return Err(ParseError {
                        message: format!("Expected '(' after '{}'", path.join(".")),
                        span: self.current_span(),
                    });
                }
                Ok(Expr {
                    kind: ExprKind::Name(path.remove(0)),
                    span,
                })
            }
            _ => Err(self.error_here("expression")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LeftParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen, "')'")?;
        Ok(args)
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let entry = match token {
        Token::PipePipe => (BinaryOp::Or, 1),
        Token::AmpAmp => (BinaryOp::And, 2),
        Token::EqualEqual => (BinaryOp::Eq, 3),
        Token::BangEqual => (BinaryOp::Ne, 3),
        Token::Less => (BinaryOp::Lt, 4),
        Token::LessEqual => (BinaryOp::Le, 4),
        Token::Greater => (BinaryOp::Gt, 4),
        Token::GreaterEqual => (BinaryOp::Ge, 4),
        Token::Plus => (BinaryOp::Add, 5),
        Token::Minus => (BinaryOp::Sub, 5),
        Token::Star => (BinaryOp::Mul, 6),
        Token::Slash => (BinaryOp::Div, 6),
        Token::Percent => (BinaryOp::Mod, 6),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Unit {
        let (unit, diags) = parse_unit(source);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        unit.unwrap()
    }

    fn body(source: &str) -> Expr {
        let unit = parse_ok(&format!("class T {{ fn f(a, b, c) = {}; }}", source));
        unit.types[0].functions[0].body.clone()
    }

    #[test]
    fn test_class_with_functions_and_nested() {
        let unit = parse_ok(
            "class Outer {
                fn one() = 1;
                class Inner { fn two() = 2; }
                fn three() = 3;
            }
            class Helper {}",
        );
        assert_eq!(unit.types.len(), 2);
        let outer = &unit.types[0];
        assert_eq!(outer.name, "Outer");
        assert_eq!(outer.functions.len(), 2);
        assert_eq!(outer.nested[0].name, "Inner");
        assert_eq!(unit.types[1].name, "Helper");
    }

    #[test]
    fn test_precedence() {
        let expr = body("a + b * c");
        let ExprKind::Binary(BinaryOp::Add, _, right) = expr.kind else {
            panic!("expected addition at the root");
        };
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = body("a - b - c");
        let ExprKind::Binary(BinaryOp::Sub, left, _) = expr.kind else {
            panic!("expected subtraction");
        };
        assert!(matches!(left.kind, ExprKind::Binary(BinaryOp::Sub, _, _)));
    }

    #[test]
    fn test_logical_binds_looser_than_comparison() {
        let expr = body("a < b && b < c || a == c");
        assert!(matches!(expr.kind, ExprKind::Binary(BinaryOp::Or, _, _)));
    }

    #[test]
    fn test_if_expression() {
        let expr = body("if a > 0 then a else -a");
        let ExprKind::If { else_branch, .. } = expr.kind else {
            panic!("expected if");
        };
        assert!(matches!(else_branch.kind, ExprKind::Unary(UnaryOp::Neg, _)));
    }

    #[test]
    fn test_qualified_call() {
        let expr = body("rules.Tax.rate(a, 2)");
        let ExprKind::Call { path, args } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(path, vec!["rules", "Tax", "rate"]);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_dotted_name_without_call() {
        let (_, diags) = parse_unit("class T { fn f() = Math.max; }");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Expected '('"));
    }

    #[test]
    fn test_recovers_after_bad_function() {
        let (unit, diags) = parse_unit(
            "class T {
                fn bad( = 1;
                fn good() = 2;
            }",
        );
        assert_eq!(diags.len(), 1);
        let unit = unit.unwrap();
        assert_eq!(unit.types[0].functions.len(), 1);
        assert_eq!(unit.types[0].functions[0].name, "good");
    }

    #[test]
    fn test_missing_semicolon_reported() {
        let (_, diags) = parse_unit("class T { fn f() = 1 }");
        assert_eq!(diags[0].code, "E0010");
        assert!(diags[0].message.contains("';'"));
    }

    #[test]
    fn test_top_level_garbage() {
        let (_, diags) = parse_unit("fn loose() = 1;");
        assert!(!diags.is_empty());
        assert!(diags[0].message.contains("'class'"));
    }

    #[test]
    fn test_lex_errors_become_diagnostics() {
        let (unit, diags) = parse_unit("class T { fn f() = 1 @ 2; }");
        assert!(unit.is_none());
        assert_eq!(diags[0].code, "E0001");
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let source = format!("class T {{ fn f() = {}1{}; }}", "(".repeat(400), ")".repeat(400));
        let (_, diags) = parse_unit(&source);
        assert!(diags.iter().any(|d| d.message.contains("Nesting too deep")));
    }
}
