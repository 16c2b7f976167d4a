use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    Asterisk,
    Bang,
    Eof,
    Equal,
    Ident(SmolStr),
    LParen,
    Minus,
    NumberLiteral(Number),
    Plus,
    Pow,
    RParen,
    SemiColon,
    Slash,
    StringLiteral(String),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Eof => write!(f, ""),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Pow => write!(f, "**"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
        }
    }
}
