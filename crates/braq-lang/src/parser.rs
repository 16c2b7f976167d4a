pub mod error;

use smallvec::{SmallVec, smallvec};
use smol_str::SmolStr;
use std::iter::Peekable;

use crate::lexer::token::{Token, TokenKind};
use crate::registry::MacroRegistry;
use crate::tree::{Operator, OperatorKind};
use error::ParseError;

/// Recursive-descent parser for the linear formula notation.
///
/// Builds trees bottom-up with operator-precedence grouping. Identifier
/// resolution consults the macro registry on every identifier token; the
/// parser itself is stateless between runs. A failed parse aborts entirely,
/// no partial tree is ever produced.
pub struct Parser<'a> {
    tokens: Peekable<core::slice::Iter<'a, Token>>,
    macros: &'a MacroRegistry,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], macros: &'a MacroRegistry) -> Self {
        Self {
            tokens: tokens.iter().peekable(),
            macros,
        }
    }

    pub fn parse(&mut self) -> Result<Operator, ParseError> {
        let expr = self.parse_expr(true)?;
        match self.tokens.next() {
            Some(token) if token.is_eof() => Ok(expr),
            Some(token) => Err(ParseError::UnexpectedToken(token.clone())),
            None => Ok(expr),
        }
    }

    // `implicit` controls whether adjacency extends an implicit product.
    // Inside a call argument list top-level adjacency separates arguments
    // instead, so the expression grammar runs with `implicit` off there.
    fn parse_expr(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        let mut lhs = self.parse_additive(implicit)?;
        while matches!(self.peek_kind(), Some(TokenKind::Equal)) {
            self.tokens.next();
            let rhs = self.parse_additive(implicit)?;
            lhs = Operator::equality(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        let mut terms = vec![self.parse_multiplicative(implicit)?];
        loop {
            match self.peek_kind() {
                Some(TokenKind::Plus) => {
                    self.tokens.next();
                    terms.push(self.parse_multiplicative(implicit)?);
                }
                Some(TokenKind::Minus) => {
                    self.tokens.next();
                    terms.push(Operator::negation(self.parse_multiplicative(implicit)?));
                }
                _ => break,
            }
        }
        Ok(Operator::sum(terms))
    }

    fn parse_multiplicative(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        let mut factors: SmallVec<[Operator; 4]> = smallvec![];
        let mut current = self.parse_unary(implicit)?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Asterisk) => {
                    self.tokens.next();
                    factors.push(current);
                    current = self.parse_unary(implicit)?;
                }
                Some(TokenKind::Slash) => {
                    self.tokens.next();
                    let denominator = self.parse_unary(implicit)?;
                    current = Operator::fraction(current, denominator);
                }
                Some(kind) if implicit && Self::starts_value(kind) => {
                    let kind = kind.clone();
                    self.check_adjacency(&current, &kind)?;
                    factors.push(current);
                    current = self.parse_unary(implicit)?;
                }
                _ => break,
            }
        }
        factors.push(current);
        Ok(Operator::product(factors.into_vec()))
    }

    fn starts_value(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::NumberLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::Ident(_)
                | TokenKind::LParen
        )
    }

    // A bare string literal directly abutting a bare symbol is ambiguous
    // (label or factor?) and rejected outright.
    fn check_adjacency(&mut self, current: &Operator, next: &TokenKind) -> Result<(), ParseError> {
        let ambiguous = (current.kind == OperatorKind::Str && matches!(next, TokenKind::Ident(_)))
            || (current.kind == OperatorKind::Variable
                && matches!(next, TokenKind::StringLiteral(_)));
        if ambiguous {
            let token = self
                .tokens
                .peek()
                .map(|t| (*t).clone())
                .ok_or(ParseError::UnexpectedEOFDetected)?;
            return Err(ParseError::AmbiguousAdjacency(token));
        }
        Ok(())
    }

    fn parse_unary(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        if matches!(self.peek_kind(), Some(TokenKind::Minus)) {
            self.tokens.next();
            return Ok(Operator::negation(self.parse_unary(implicit)?));
        }
        self.parse_power(implicit)
    }

    fn parse_power(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        let base = self.parse_postfix(implicit)?;
        if matches!(self.peek_kind(), Some(TokenKind::Pow)) {
            self.tokens.next();
            // Right-associative, and the exponent may carry its own sign.
            let exponent = self.parse_unary(implicit)?;
            return Ok(Operator::power(base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self, implicit: bool) -> Result<Operator, ParseError> {
        let mut expr = self.parse_primary(implicit)?;
        while matches!(self.peek_kind(), Some(TokenKind::Bang)) {
            self.tokens.next();
            expr = Operator::factorial(expr);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, _implicit: bool) -> Result<Operator, ParseError> {
        let token = self
            .tokens
            .next()
            .cloned()
            .ok_or(ParseError::UnexpectedEOFDetected)?;
        match &token.kind {
            TokenKind::NumberLiteral(n) => Ok(Operator::number(*n)),
            TokenKind::StringLiteral(s) => Ok(Operator::string(s.as_str())),
            TokenKind::LParen => self.parse_paren(&token),
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.parse_ident(&token, name)
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected),
            _ => Err(ParseError::UnexpectedToken(token)),
        }
    }

    // Parenthesized group, or a tuple when `;` separators appear.
    fn parse_paren(&mut self, open: &Token) -> Result<Operator, ParseError> {
        let mut items = vec![self.parse_expr(true)?];
        while matches!(self.peek_kind(), Some(TokenKind::SemiColon)) {
            self.tokens.next();
            items.push(self.parse_expr(true)?);
        }
        match self.tokens.next() {
            Some(token) if token.kind == TokenKind::RParen => {
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Operator::tuple(items))
                }
            }
            Some(token) => Err(ParseError::ExpectedClosingParen(token.clone())),
            None => Err(ParseError::ExpectedClosingParen(open.clone())),
        }
    }

    fn parse_ident(&mut self, token: &Token, name: SmolStr) -> Result<Operator, ParseError> {
        match name.as_str() {
            "_" => return Ok(Operator::empty()),
            "pi" => return Ok(Operator::pi()),
            "e" => return Ok(Operator::euler_number()),
            "inf" | "infinity" => return Ok(Operator::infinity()),
            _ => {}
        }

        let called = matches!(self.peek_kind(), Some(TokenKind::LParen));

        if Self::is_constructor(&name) && called {
            let args = self.parse_call_args(token)?;
            return self.build_constructor(token, name, args);
        }

        let macros = self.macros;
        if let Some(def) = macros.lookup(&name) {
            let arity = def.arity;
            if !called {
                return Err(ParseError::BareMacroTrigger(token.clone(), name));
            }
            let args = self.parse_call_args(token)?;
            let args = Self::group_to_arity(args, arity);
            if args.len() != arity {
                return Err(ParseError::WrongArity {
                    token: token.clone(),
                    name,
                    expected: arity,
                    actual: args.len(),
                });
            }
            return Ok(Operator::macro_ref(name, args));
        }

        Ok(Operator::variable(name))
    }

    fn is_constructor(name: &str) -> bool {
        matches!(
            name,
            "sum"
                | "prod"
                | "delta"
                | "tuple"
                | "bra"
                | "ket"
                | "braket"
                | "bracket"
                | "fc"
                | "fa"
                | "bc"
                | "ba"
                | "complex"
                | "frac"
                | "root"
                | "exp"
                | "sin"
                | "cos"
                | "tan"
                | "bigsum"
                | "bigint"
                | "cv"
                | "svar"
                | "raw"
        )
    }

    // Whitespace-separated argument expressions up to the closing paren.
    fn parse_call_args(&mut self, open: &Token) -> Result<Vec<Operator>, ParseError> {
        match self.tokens.next() {
            Some(token) if token.kind == TokenKind::LParen => {}
            Some(token) => return Err(ParseError::UnexpectedToken(token.clone())),
            None => return Err(ParseError::UnexpectedEOFDetected),
        }

        let mut args = Vec::new();
        loop {
            match self.tokens.peek() {
                Some(token) if token.kind == TokenKind::RParen => {
                    self.tokens.next();
                    return Ok(args);
                }
                Some(token) if token.is_eof() => {
                    return Err(ParseError::ExpectedClosingParen((*token).clone()));
                }
                Some(_) => args.push(self.parse_expr(false)?),
                None => return Err(ParseError::ExpectedClosingParen(open.clone())),
            }
        }
    }

    // When more whitespace-separated arguments appear than the declared
    // arity, the tail folds into one implicit product before the count is
    // checked.
    fn group_to_arity(mut args: Vec<Operator>, arity: usize) -> Vec<Operator> {
        if args.len() > arity && arity >= 1 {
            let tail = args.split_off(arity - 1);
            args.push(Operator::product(tail));
        }
        args
    }

    fn build_constructor(
        &mut self,
        token: &Token,
        name: SmolStr,
        args: Vec<Operator>,
    ) -> Result<Operator, ParseError> {
        match name.as_str() {
            "sum" => Ok(Operator::sum(args)),
            "prod" => Ok(Operator::product(args)),
            "tuple" => {
                if args.is_empty() {
                    return Err(self.wrong_arity(token, name, 1, 0));
                }
                Ok(Operator::tuple(args))
            }
            "delta" => {
                let [a, b] = self.fixed_args(token, &name, args)?;
                Ok(Operator::delta(a, b))
            }
            "bra" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::bra(a))
            }
            "ket" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::ket(a))
            }
            "braket" => {
                let [a, b] = self.fixed_args(token, &name, args)?;
                Ok(Operator::braket(a, b))
            }
            "bracket" => {
                let [a, b] = self.fixed_args(token, &name, args)?;
                Ok(Operator::double_braket(a, b))
            }
            "fc" | "fa" | "bc" | "ba" => {
                let (label, rest) = self.labeled_args(token, &name, args)?;
                let [index] = self.fixed_args(token, &name, rest)?;
                Ok(match name.as_str() {
                    "fc" => Operator::fermionic_create(label, index),
                    "fa" => Operator::fermionic_annihilate(label, index),
                    "bc" => Operator::bosonic_create(label, index),
                    _ => Operator::bosonic_annihilate(label, index),
                })
            }
            "complex" => {
                let [re, im] = self.fixed_args(token, &name, args)?;
                if re.is_number(0.0) && im.is_number(1.0) {
                    Ok(Operator::imaginary_unit())
                } else {
                    Ok(Operator::complex(re, im))
                }
            }
            "frac" => {
                let [a, b] = self.fixed_args(token, &name, args)?;
                Ok(Operator::fraction(a, b))
            }
            "root" => {
                let [a, b] = self.fixed_args(token, &name, args)?;
                Ok(Operator::root(a, b))
            }
            "exp" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::exp(a))
            }
            "sin" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::sin(a))
            }
            "cos" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::cos(a))
            }
            "tan" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::tan(a))
            }
            "bigsum" => {
                let [index, body] = self.fixed_args(token, &name, args)?;
                Ok(Operator::big_sum(index, body))
            }
            "bigint" => {
                let [measure, body] = self.fixed_args(token, &name, args)?;
                Ok(Operator::big_integral(measure, body))
            }
            "cv" => {
                let [a] = self.fixed_args(token, &name, args)?;
                Ok(Operator::commutable(a))
            }
            "svar" => {
                let (label, mut rest) = self.labeled_args(token, &name, args)?;
                if rest.len() > 1 {
                    rest = Self::group_to_arity(rest, 1);
                }
                Ok(Operator::structural_variable(label, rest.into_iter().next()))
            }
            "raw" => {
                let (label, rest) = self.labeled_args(token, &name, args)?;
                if !rest.is_empty() {
                    return Err(self.wrong_arity(token, name, 1, rest.len() + 1));
                }
                Ok(Operator::raw(label))
            }
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    fn fixed_args<const N: usize>(
        &self,
        token: &Token,
        name: &SmolStr,
        args: Vec<Operator>,
    ) -> Result<[Operator; N], ParseError> {
        let args = Self::group_to_arity(args, N);
        let actual = args.len();
        args.try_into().map_err(|_| ParseError::WrongArity {
            token: token.clone(),
            name: name.clone(),
            expected: N,
            actual,
        })
    }

    // Mandatory leading string label of fc/fa/bc/ba, svar and raw.
    fn labeled_args(
        &self,
        token: &Token,
        name: &SmolStr,
        args: Vec<Operator>,
    ) -> Result<(SmolStr, Vec<Operator>), ParseError> {
        let mut iter = args.into_iter();
        match iter.next() {
            Some(label) if label.kind == OperatorKind::Str => {
                Ok((label.payload.clone(), iter.collect()))
            }
            _ => Err(ParseError::MissingStringArgument(
                token.clone(),
                name.clone(),
            )),
        }
    }

    fn wrong_arity(
        &self,
        token: &Token,
        name: SmolStr,
        expected: usize,
        actual: usize,
    ) -> ParseError {
        ParseError::WrongArity {
            token: token.clone(),
            name,
            expected,
            actual,
        }
    }

    fn peek_kind(&mut self) -> Option<&TokenKind> {
        self.tokens.peek().map(|token| &token.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use rstest::rstest;

    fn parse(input: &str) -> Result<Operator, ParseError> {
        let macros = MacroRegistry::default();
        parse_with(input, &macros)
    }

    fn parse_with(input: &str, macros: &MacroRegistry) -> Result<Operator, ParseError> {
        let tokens = Lexer::tokenize(input).expect("tokenize");
        Parser::new(&tokens, macros).parse()
    }

    #[test]
    fn test_parse_flattened_sum() {
        let tree = parse("1 + 2 + 3").unwrap();
        assert_eq!(tree.kind, OperatorKind::Sum);
        assert_eq!(tree.children().len(), 3);
    }

    #[test]
    fn test_parse_subtraction_as_negation() {
        let tree = parse("a - b").unwrap();
        assert_eq!(tree.kind, OperatorKind::Sum);
        assert_eq!(tree.children()[1].kind, OperatorKind::Negation);
    }

    #[rstest]
    #[case("2x")]
    #[case("2 * x")]
    #[case("(2)(x)")]
    fn test_implicit_and_explicit_products(#[case] input: &str) {
        let tree = parse(input).unwrap();
        assert_eq!(tree.kind, OperatorKind::Product);
        assert_eq!(tree.children().len(), 2);
    }

    #[test]
    fn test_nested_products_flatten() {
        let tree = parse("2 * x * y").unwrap();
        assert_eq!(tree.children().len(), 3);
    }

    #[rstest]
    #[case("\"s\" x")]
    #[case("x \"s\"")]
    fn test_ambiguous_string_adjacency(#[case] input: &str) {
        assert!(matches!(
            parse(input),
            Err(ParseError::AmbiguousAdjacency(_))
        ));
    }

    #[test]
    fn test_parse_power_right_associative() {
        let tree = parse("x ** 2 ** 3").unwrap();
        assert_eq!(tree.kind, OperatorKind::Power);
        assert_eq!(tree.children()[1].kind, OperatorKind::Power);
    }

    #[test]
    fn test_parse_factorial_postfix() {
        let tree = parse("x!").unwrap();
        assert_eq!(tree.kind, OperatorKind::Factorial);
    }

    #[test]
    fn test_parse_fraction() {
        let tree = parse("a / b").unwrap();
        assert_eq!(tree.kind, OperatorKind::Fraction);
    }

    #[test]
    fn test_parse_tuple() {
        let tree = parse("(a; b; c)").unwrap();
        assert_eq!(tree.kind, OperatorKind::Tuple);
        assert_eq!(tree.children().len(), 3);
    }

    #[test]
    fn test_parse_delta_constructor() {
        let tree = parse("delta(a b)").unwrap();
        assert_eq!(tree.kind, OperatorKind::Delta);
        assert_eq!(tree.children().len(), 2);
    }

    #[test]
    fn test_parse_sum_constructor_empty_folds_to_zero() {
        let tree = parse("sum()").unwrap();
        assert!(tree.is_number(0.0));
        let tree = parse("prod()").unwrap();
        assert!(tree.is_number(1.0));
    }

    #[test]
    fn test_parse_fermionic_with_label() {
        let tree = parse("fc(\"c\" 1)").unwrap();
        assert_eq!(tree.kind, OperatorKind::FermionicCreate);
        assert_eq!(tree.payload, "c");
    }

    #[test]
    fn test_parse_fermionic_missing_label() {
        assert!(matches!(
            parse("fc(1 2)"),
            Err(ParseError::MissingStringArgument(_, _))
        ));
    }

    #[test]
    fn test_parse_complex_upcasts_to_imaginary_unit() {
        let tree = parse("complex(0 1)").unwrap();
        assert_eq!(tree.kind, OperatorKind::ImaginaryUnit);

        let tree = parse("complex(1 2)").unwrap();
        assert_eq!(tree.kind, OperatorKind::Complex);
    }

    #[test]
    fn test_parse_unbalanced_paren() {
        assert!(matches!(
            parse("(a + b"),
            Err(ParseError::ExpectedClosingParen(_))
        ));
        assert!(parse("a + b)").is_err());
    }

    #[test]
    fn test_parse_unknown_identifier_is_variable() {
        let tree = parse("energy").unwrap();
        assert_eq!(tree.kind, OperatorKind::Variable);
        assert_eq!(tree.payload, "energy");
    }

    #[test]
    fn test_macro_call_with_matching_arity() {
        let mut macros = MacroRegistry::default();
        macros.define("t", "\\mathrm{#0}", 1);

        let tree = parse_with("t(2)", &macros).unwrap();
        assert_eq!(tree.kind, OperatorKind::MacroRef);
        assert_eq!(tree.payload, "t");
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn test_macro_bare_trigger_is_error() {
        let mut macros = MacroRegistry::default();
        macros.define("t", "\\mathrm{#0}", 1);

        assert!(matches!(
            parse_with("t", &macros),
            Err(ParseError::BareMacroTrigger(_, _))
        ));
    }

    #[test]
    fn test_macro_excess_tokens_group_into_product() {
        let mut macros = MacroRegistry::default();
        macros.define("t", "\\mathrm{#0}", 1);

        let tree = parse_with("t(2 x)", &macros).unwrap();
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].kind, OperatorKind::Product);
    }

    #[test]
    fn test_macro_too_few_arguments() {
        let mut macros = MacroRegistry::default();
        macros.define("m", "#0 + #1", 2);

        assert!(matches!(
            parse_with("m(2)", &macros),
            Err(ParseError::WrongArity { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_parse_equality_marker() {
        let tree = parse("a = b").unwrap();
        assert_eq!(tree.kind, OperatorKind::Equality);
    }

    #[test]
    fn test_parse_constants() {
        assert_eq!(parse("pi").unwrap().kind, OperatorKind::Pi);
        assert_eq!(parse("e").unwrap().kind, OperatorKind::EulerNumber);
        assert_eq!(parse("inf").unwrap().kind, OperatorKind::Infinity);
        assert_eq!(parse("_").unwrap().kind, OperatorKind::Empty);
    }

    #[test]
    fn test_parse_big_sum_binder() {
        let tree = parse("bigsum(n frac(x**n n!))").unwrap();
        assert_eq!(tree.kind, OperatorKind::BigSum);
        assert_eq!(tree.children()[1].kind, OperatorKind::Fraction);
    }

    #[test]
    fn test_unary_minus_binds_tighter_than_product() {
        let tree = parse("-x * y").unwrap();
        assert_eq!(tree.kind, OperatorKind::Product);
        assert_eq!(tree.children()[0].kind, OperatorKind::Negation);
    }
}
