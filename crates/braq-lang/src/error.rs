use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::lexer::error::LexerError;
use crate::parser::error::ParseError;
use crate::range::Range;
use crate::serialize::FormatError;
use crate::tree::ConstructionError;

#[derive(Debug, thiserror::Error)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let range = match &cause {
            InnerError::Lexer(LexerError::UnexpectedToken(token)) => Some(&token.range),
            InnerError::Lexer(LexerError::UnterminatedString(range)) => Some(range),
            InnerError::Lexer(LexerError::UnexpectedEOFDetected) => None,
            InnerError::Parse(err) => match err {
                ParseError::UnexpectedToken(token) => Some(&token.range),
                ParseError::UnexpectedEOFDetected => None,
                ParseError::ExpectedClosingParen(token) => Some(&token.range),
                ParseError::AmbiguousAdjacency(token) => Some(&token.range),
                ParseError::BareMacroTrigger(token, _) => Some(&token.range),
                ParseError::WrongArity { token, .. } => Some(&token.range),
                ParseError::MissingStringArgument(token, _) => Some(&token.range),
            },
            InnerError::Format(_) | InnerError::Construction(_) => None,
        };

        match range {
            Some(range) => {
                let location = Self::span_for(&source_code, range);
                Self {
                    cause,
                    source_code,
                    location,
                }
            }
            None => {
                let is_eof = matches!(
                    &cause,
                    InnerError::Lexer(LexerError::UnexpectedEOFDetected)
                        | InnerError::Parse(ParseError::UnexpectedEOFDetected)
                );
                let location = if is_eof {
                    let lines = source_code.lines();
                    let loc_line = lines.clone().count().saturating_sub(1);
                    let loc_col = lines.last().map(|line| line.len()).unwrap_or(0);
                    SourceSpan::new(SourceOffset::from_location(&source_code, loc_line, loc_col), 1)
                } else {
                    SourceSpan::new(SourceOffset::from_location(&source_code, 0, 0), 1)
                };
                Self {
                    cause,
                    source_code,
                    location,
                }
            }
        }
    }

    fn span_for(source_code: &str, range: &Range) -> SourceSpan {
        let start =
            SourceOffset::from_location(source_code, range.start.line as usize, range.start.column);
        let end =
            SourceOffset::from_location(source_code, range.end.line as usize, range.end.column);
        SourceSpan::new(
            start,
            std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
        )
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => {
                "LexerError::UnexpectedToken".to_string()
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                "LexerError::UnterminatedString".to_string()
            }
            InnerError::Lexer(LexerError::UnexpectedEOFDetected) => {
                "LexerError::UnexpectedEOFDetected".to_string()
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => {
                "ParseError::UnexpectedToken".to_string()
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected) => {
                "ParseError::UnexpectedEOFDetected".to_string()
            }
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                "ParseError::ExpectedClosingParen".to_string()
            }
            InnerError::Parse(ParseError::AmbiguousAdjacency(_)) => {
                "ParseError::AmbiguousAdjacency".to_string()
            }
            InnerError::Parse(ParseError::BareMacroTrigger(_, _)) => {
                "ParseError::BareMacroTrigger".to_string()
            }
            InnerError::Parse(ParseError::WrongArity { .. }) => "ParseError::WrongArity".to_string(),
            InnerError::Parse(ParseError::MissingStringArgument(_, _)) => {
                "ParseError::MissingStringArgument".to_string()
            }
            InnerError::Format(FormatError::Malformed(_)) => "FormatError::Malformed".to_string(),
            InnerError::Format(FormatError::Construction(_)) => {
                "FormatError::Construction".to_string()
            }
            InnerError::Construction(ConstructionError::ArityViolation { .. }) => {
                "ConstructionError::ArityViolation".to_string()
            }
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => {
                Some("Check for unexpected or misplaced characters in your formula.".to_string())
            }
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                Some("A string literal is missing its closing double quote.".to_string())
            }
            InnerError::Lexer(LexerError::UnexpectedEOFDetected) => {
                Some("Input ended unexpectedly. Make sure the formula is complete.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => {
                Some("Check for syntax errors or misplaced tokens.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected) => Some(
                "Input ended unexpectedly. Check for missing closing parentheses or incomplete expressions."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                Some("Check for a missing `)` in the formula.".to_string())
            }
            InnerError::Parse(ParseError::AmbiguousAdjacency(_)) => Some(
                "Insert an explicit `*` or parentheses between the string and the symbol."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::BareMacroTrigger(_, name)) => Some(format!(
                "`{name}` is defined as a macro. Call it with an argument list, e.g. `{name}(...)`."
            )),
            InnerError::Parse(ParseError::WrongArity {
                expected, actual, ..
            }) => Some(format!(
                "Invalid number of arguments: expected {expected}, got {actual}."
            )),
            InnerError::Parse(ParseError::MissingStringArgument(_, name)) => Some(format!(
                "`{name}` requires a quoted string label as its first argument."
            )),
            InnerError::Format(FormatError::Malformed(_)) => {
                Some("The stored document is not valid JSON. Check the persisted text.".to_string())
            }
            InnerError::Format(FormatError::Construction(_)) => Some(
                "The stored document carries a node with the wrong number of children.".to_string(),
            ),
            InnerError::Construction(ConstructionError::ArityViolation { .. }) => {
                Some("Check the number of children supplied to the node constructor.".to_string())
            }
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::{Token, TokenKind};
    use rstest::rstest;

    fn token() -> Token {
        Token {
            range: Range::default(),
            kind: TokenKind::Eof,
        }
    }

    #[rstest]
    #[case::lexer_unexpected_token(
        InnerError::Lexer(LexerError::UnexpectedToken(token())),
        "source code"
    )]
    #[case::lexer_unterminated_string(
        InnerError::Lexer(LexerError::UnterminatedString(Range::default())),
        "\"abc"
    )]
    #[case::lexer_unexpected_eof(
        InnerError::Lexer(LexerError::UnexpectedEOFDetected),
        "line 1\nline 2"
    )]
    #[case::parse_unexpected_token(
        InnerError::Parse(ParseError::UnexpectedToken(token())),
        "source code"
    )]
    #[case::parse_unexpected_eof(
        InnerError::Parse(ParseError::UnexpectedEOFDetected),
        "source code"
    )]
    #[case::parse_expected_closing_paren(
        InnerError::Parse(ParseError::ExpectedClosingParen(token())),
        "(a + b"
    )]
    #[case::parse_bare_macro_trigger(
        InnerError::Parse(ParseError::BareMacroTrigger(token(), "t".into())),
        "t"
    )]
    #[case::parse_wrong_arity(
        InnerError::Parse(ParseError::WrongArity {
            token: token(),
            name: "t".into(),
            expected: 2,
            actual: 1,
        }),
        "t(1)"
    )]
    fn test_from_error(#[case] cause: InnerError, #[case] source_code: &str) {
        let error = Error::from_error(source_code, cause);
        assert_eq!(error.source_code, source_code);
        assert!(error.code().is_some());
        assert!(error.labels().is_some());
    }

    #[test]
    fn test_help_for_wrong_arity() {
        let cause = InnerError::Parse(ParseError::WrongArity {
            token: token(),
            name: "t".into(),
            expected: 2,
            actual: 1,
        });
        let error = Error::from_error("t(1)", cause);
        assert_eq!(
            error.help().map(|h| h.to_string()),
            Some("Invalid number of arguments: expected 2, got 1.".to_string())
        );
    }
}
