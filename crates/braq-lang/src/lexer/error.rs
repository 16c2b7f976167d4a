use thiserror::Error;

use crate::range::Range;

use super::token::Token;

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("Unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("Unterminated string literal")]
    UnterminatedString(Range),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected,
}
