pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, none_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::number::Number;
use crate::range::{Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

pub struct Lexer;

impl Lexer {
    pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
        match tokens(Span::new(input)) {
            Ok((span, tokens)) => {
                let rest = span.fragment();

                if rest.trim().is_empty() {
                    let eof: Range = span.into();
                    Ok([
                        tokens,
                        vec![Token {
                            range: eof,
                            kind: TokenKind::Eof,
                        }],
                    ]
                    .concat())
                } else if rest.trim_start().starts_with('"') {
                    Err(LexerError::UnterminatedString(span.into()))
                } else {
                    Err(LexerError::UnexpectedToken(Token {
                        range: span.into(),
                        kind: TokenKind::Ident(SmolStr::new(
                            rest.trim_start().chars().take(1).collect::<String>(),
                        )),
                    }))
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(LexerError::UnexpectedToken(Token {
                    range: e.input.into(),
                    kind: TokenKind::Eof,
                }))
            }
            _ => unreachable!(),
        }
    }
}

define_token_parser!(pow, "**", TokenKind::Pow);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(bang, "!", TokenKind::Bang);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(
    empty_string,
    "\"\"",
    TokenKind::StringLiteral(String::new())
);

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        pow, asterisk, plus, minus, slash, bang, l_paren, r_paren, semi_colon, equal,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        recognize(pair(digit1, opt(preceded(char('.'), digit1)))),
        |span: Span| {
            span.fragment().parse::<f64>().map(|n| Token {
                range: span.into(),
                kind: TokenKind::NumberLiteral(Number::new(n)),
            })
        },
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (span, start) = position(input)?;
    let (span, s) = delimited(
        char('"'),
        escaped_transform(
            none_of("\"\\"),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\"', char('\"')),
                value('\n', char('n')),
                value('\t', char('t')),
            )),
        ),
        char('"'),
    )
    .parse(span)?;
    let (span, end) = position(span)?;

    Ok((
        span,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLiteral(s),
        },
    ))
}

fn literals(input: Span) -> IResult<Span, Token> {
    alt((number_literal, empty_string, string_literal)).parse(input)
}

fn ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| Token {
            range: span.into(),
            kind: TokenKind::Ident(SmolStr::new(*span.fragment())),
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((literals, punctuations, ident)).parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    many0(delimited(
        nom::character::complete::multispace0,
        token,
        nom::character::complete::multispace0,
    ))
    .parse(input)
}
