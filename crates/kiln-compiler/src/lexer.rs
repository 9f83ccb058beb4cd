//! Lexer for Kiln source units.
//!
//! Tokenization is done by logos; this module adds line/column tracking and
//! turns logos errors into [`LexError`]s.

use logos::Logos;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of a token or syntax node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through `other`
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// A Kiln token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    #[token("class")]
    Class,
    #[token("fn")]
    Fn,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,

    /// End of input, appended by the lexer
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Class => f.write_str("'class'"),
            Token::Fn => f.write_str("'fn'"),
            Token::If => f.write_str("'if'"),
            Token::Then => f.write_str("'then'"),
            Token::Else => f.write_str("'else'"),
            Token::True => f.write_str("'true'"),
            Token::False => f.write_str("'false'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Int(value) => write!(f, "integer {}", value),
            Token::LeftBrace => f.write_str("'{'"),
            Token::RightBrace => f.write_str("'}'"),
            Token::LeftParen => f.write_str("'('"),
            Token::RightParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Semicolon => f.write_str("';'"),
            Token::Dot => f.write_str("'.'"),
            Token::Assign => f.write_str("'='"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Percent => f.write_str("'%'"),
            Token::Bang => f.write_str("'!'"),
            Token::EqualEqual => f.write_str("'=='"),
            Token::BangEqual => f.write_str("'!='"),
            Token::Less => f.write_str("'<'"),
            Token::LessEqual => f.write_str("'<='"),
            Token::Greater => f.write_str("'>'"),
            Token::GreaterEqual => f.write_str("'>='"),
            Token::AmpAmp => f.write_str("'&&'"),
            Token::PipePipe => f.write_str("'||'"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    InvalidNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. } | LexError::InvalidNumber { span, .. } => {
                *span
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { char, .. } => {
                format!("Unexpected character '{}'", char)
            }
            LexError::InvalidNumber { text, .. } => {
                format!("Integer literal '{}' does not fit in 64 bits", text)
            }
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = self.span();
        write!(f, "{} at {}:{}", self.description(), span.line, span.column)
    }
}

impl std::error::Error for LexError {}

/// Byte offset to line/column translation.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    fn span(&self, source: &str, start: usize, end: usize) -> Span {
        let line = match self.line_starts.binary_search(&start) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let column = source[self.line_starts[line]..start].chars().count() + 1;
        Span::new(start, end, line as u32 + 1, column as u32)
    }
}

/// Main lexer structure.
pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// Tokenize the whole source, appending a [`Token::Eof`].
    ///
    /// All lexical errors are collected rather than stopping at the first one.
    pub fn tokenize(self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let index = LineIndex::new(self.source);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        for (result, range) in Token::lexer(self.source).spanned() {
            let span = index.span(self.source, range.start, range.end);
            match result {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    let text = &self.source[range.clone()];
                    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                        errors.push(LexError::InvalidNumber {
                            text: text.to_string(),
                            span,
                        });
                    } else {
                        let char = text.chars().next().unwrap_or('\0');
                        errors.push(LexError::UnexpectedCharacter { char, span });
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let end = self.source.len();
        tokens.push((Token::Eof, index.span(self.source, end, end)));
        Ok(tokens)
    }
}
