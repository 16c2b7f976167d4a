use smol_str::SmolStr;
use thiserror::Error;

use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected,
    #[error("Expected a closing parenthesis `)` but got `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingParen(Token),
    #[error("A quoted string may not directly abut a bare symbol")]
    AmbiguousAdjacency(Token),
    #[error("`{1}` is a macro trigger and must be called with an argument list")]
    BareMacroTrigger(Token, SmolStr),
    #[error("`{name}` expects {expected} arguments but got {actual}")]
    WrongArity {
        token: Token,
        name: SmolStr,
        expected: usize,
        actual: usize,
    },
    #[error("`{1}` requires a leading string argument")]
    MissingStringArgument(Token, SmolStr),
}
