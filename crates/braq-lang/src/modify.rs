//! Context-free rewrites. Each function inspects exactly one node, performs
//! one rewrite step, and returns `None` when the node has the wrong shape.
//! Nothing here recurses to a fixed point or looks at siblings; context
//! dependent edits live in [`crate::peer`].

use smol_str::SmolStr;

use crate::equiv::{fold, provably_equal};
use crate::registry::VariableRegistry;
use crate::tree::{Operator, OperatorKind};

/// Pulls a negation out of a product, fraction, complex pair or sum. Products
/// and fractions strip every negative factor and keep the parity as an outer
/// negation; a complex pair needs both components negative; a sum flips only
/// when every term is negative.
pub fn extract_minus(op: &Operator) -> Option<Operator> {
    match op.kind {
        OperatorKind::Product => {
            let mut flips = 0usize;
            let factors: Vec<Operator> = op
                .children()
                .iter()
                .map(|factor| match strip_negative(factor) {
                    Some(stripped) => {
                        flips += 1;
                        stripped
                    }
                    None => (**factor).clone(),
                })
                .collect();
            if flips == 0 {
                return None;
            }
            let base = Operator::product(factors);
            Some(if flips % 2 == 1 {
                Operator::negation(base)
            } else {
                base
            })
        }
        OperatorKind::Fraction => {
            let numerator = op.child(0)?;
            let denominator = op.child(1)?;
            let mut flips = 0usize;
            let mut strip = |node: &Operator| match strip_negative(node) {
                Some(stripped) => {
                    flips += 1;
                    stripped
                }
                None => node.clone(),
            };
            let base = Operator::fraction(strip(numerator), strip(denominator));
            if flips == 0 {
                return None;
            }
            Some(if flips % 2 == 1 {
                Operator::negation(base)
            } else {
                base
            })
        }
        OperatorKind::Complex => {
            let re = strip_negative(op.child(0)?)?;
            let im = strip_negative(op.child(1)?)?;
            Some(Operator::negation(Operator::complex(re, im)))
        }
        OperatorKind::Sum => {
            let terms: Option<Vec<Operator>> =
                op.children().iter().map(|term| strip_negative(term)).collect();
            Some(Operator::negation(Operator::sum(terms?)))
        }
        _ => None,
    }
}

fn strip_negative(op: &Operator) -> Option<Operator> {
    match op.kind {
        OperatorKind::Negation => op.child(0).map(|inner| (**inner).clone()),
        OperatorKind::Number => op.as_number().and_then(|n| {
            if n.value() < 0.0 {
                Some(Operator::number(-n))
            } else {
                None
            }
        }),
        _ => None,
    }
}

/// Distributes the first nested sum across its enclosing product:
/// `a * (b + c) * d` becomes `a*b*d + a*c*d`.
pub fn distribute(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Product {
        return None;
    }
    let position = op
        .children()
        .iter()
        .position(|factor| factor.kind == OperatorKind::Sum)?;
    let nested = op.child(position)?;

    let terms: Vec<Operator> = nested
        .children()
        .iter()
        .map(|term| {
            let factors: Vec<Operator> = op
                .children()
                .iter()
                .enumerate()
                .map(|(k, factor)| {
                    if k == position {
                        (**term).clone()
                    } else {
                        (**factor).clone()
                    }
                })
                .collect();
            Operator::product(factors)
        })
        .collect();
    Some(Operator::sum(terms))
}

/// Cancels structurally equal factors between numerator and denominator.
/// Exhausted sides collapse to the multiplicative identity; a fully
/// cancelled denominator drops the fraction entirely.
pub fn reduce_fraction(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Fraction {
        return None;
    }
    let mut numerator = factor_list(op.child(0)?);
    let denominator = factor_list(op.child(1)?);

    let mut kept: Vec<Operator> = Vec::with_capacity(denominator.len());
    let mut cancelled = false;
    for factor in denominator {
        if let Some(k) = numerator.iter().position(|n| *n == factor) {
            numerator.remove(k);
            cancelled = true;
        } else {
            kept.push(factor);
        }
    }
    if !cancelled {
        return None;
    }

    let numerator = Operator::product(numerator);
    if kept.is_empty() {
        Some(numerator)
    } else {
        Some(Operator::fraction(numerator, Operator::product(kept)))
    }
}

fn factor_list(op: &Operator) -> Vec<Operator> {
    if op.kind == OperatorKind::Product {
        op.children().iter().map(|c| (**c).clone()).collect()
    } else {
        vec![op.clone()]
    }
}

/// Component-wise addition of complex pairs in a sum. Plain numbers join as
/// pure real components; the sum must contain at least one complex node.
pub fn combine_complex_add(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Sum {
        return None;
    }
    if !op.children().iter().any(|term| {
        matches!(
            term.kind,
            OperatorKind::Complex | OperatorKind::ImaginaryUnit
        )
    }) {
        return None;
    }
    let parts: Option<Vec<(Operator, Operator)>> = op
        .children()
        .iter()
        .map(|term| complex_components(term))
        .collect();
    let (res, ims): (Vec<Operator>, Vec<Operator>) = parts?.into_iter().unzip();
    Some(fold(&Operator::complex(
        Operator::sum(res),
        Operator::sum(ims),
    )))
}

/// `(a+bi)(c+di) = (ac-bd) + (ad+bc)i`, accumulated across every factor of
/// the product. All factors must be complex-like.
pub fn combine_complex_mul(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Product {
        return None;
    }
    if !op.children().iter().any(|factor| {
        matches!(
            factor.kind,
            OperatorKind::Complex | OperatorKind::ImaginaryUnit
        )
    }) {
        return None;
    }
    let mut factors = op.children().iter();
    let (mut re, mut im) = complex_components(factors.next()?)?;
    for factor in factors {
        let (c, d) = complex_components(factor)?;
        let next_re = Operator::sum(vec![
            Operator::product(vec![re.clone(), c.clone()]),
            Operator::negation(Operator::product(vec![im.clone(), d.clone()])),
        ]);
        let next_im = Operator::sum(vec![
            Operator::product(vec![re, d]),
            Operator::product(vec![im, c]),
        ]);
        re = next_re;
        im = next_im;
    }
    Some(fold(&Operator::complex(re, im)))
}

fn complex_components(op: &Operator) -> Option<(Operator, Operator)> {
    match op.kind {
        OperatorKind::Complex => Some(((**op.child(0)?).clone(), (**op.child(1)?).clone())),
        OperatorKind::ImaginaryUnit => Some((Operator::number(0.0), Operator::number(1.0))),
        OperatorKind::Number => Some((op.clone(), Operator::number(0.0))),
        _ => None,
    }
}

/// `complex(a b)` becomes the explicit sum `a + b * i`.
pub fn split_complex(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Complex {
        return None;
    }
    let re = (**op.child(0)?).clone();
    let im = (**op.child(1)?).clone();
    Some(Operator::sum(vec![
        re,
        Operator::product(vec![im, Operator::imaginary_unit()]),
    ]))
}

/// A delta over two equal-arity tuples splits into a product of per-position
/// deltas. Unequal arities stay unsplit.
pub fn split_delta(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Delta {
        return None;
    }
    let left = op.child(0)?;
    let right = op.child(1)?;
    if left.kind != OperatorKind::Tuple || right.kind != OperatorKind::Tuple {
        return None;
    }
    if left.children().len() != right.children().len() {
        return None;
    }
    let deltas: Vec<Operator> = left
        .children()
        .iter()
        .zip(right.children().iter())
        .map(|(a, b)| Operator::delta((**a).clone(), (**b).clone()))
        .collect();
    Some(Operator::product(deltas))
}

/// `exp(x)` expanded as its power series `bigsum(n, x**n / n!)`.
pub fn expand_exp_series(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Exp {
        return None;
    }
    let x = (**op.child(0)?).clone();
    let n = Operator::variable("n");
    Some(Operator::big_sum(
        n.clone(),
        Operator::fraction(Operator::power(x, n.clone()), Operator::factorial(n)),
    ))
}

/// `exp(i*x)` becomes `cos(x) + i*sin(x)`. Applies when the argument is the
/// bare imaginary unit or a product with an imaginary-unit factor.
pub fn euler_formula(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Exp {
        return None;
    }
    let arg = op.child(0)?;
    let x = match arg.kind {
        OperatorKind::ImaginaryUnit => Operator::number(1.0),
        OperatorKind::Product => {
            let position = arg
                .children()
                .iter()
                .position(|factor| factor.kind == OperatorKind::ImaginaryUnit)?;
            let rest: Vec<Operator> = arg
                .children()
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != position)
                .map(|(_, factor)| (**factor).clone())
                .collect();
            Operator::product(rest)
        }
        _ => return None,
    };
    Some(Operator::sum(vec![
        Operator::cos(x.clone()),
        Operator::product(vec![Operator::imaginary_unit(), Operator::sin(x)]),
    ]))
}

/// Merges the first adjacent `bra * ket` pair of a product into a
/// double-braket over their indices.
pub fn merge_braket(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::Product {
        return None;
    }
    let position = op
        .children()
        .windows(2)
        .position(|pair| pair[0].kind == OperatorKind::Bra && pair[1].kind == OperatorKind::Ket)?;
    let bra_index = (**op.children()[position].child(0)?).clone();
    let ket_index = (**op.children()[position + 1].child(0)?).clone();

    let mut factors: Vec<Operator> = op.children().iter().map(|c| (**c).clone()).collect();
    factors.splice(
        position..position + 2,
        [Operator::double_braket(bra_index, ket_index)],
    );
    Some(Operator::product(factors))
}

/// Orthonormal evaluation of a double-braket: equal index expressions give 1,
/// provably unequal give 0, anything symbolic stays.
pub fn evaluate_braket(op: &Operator) -> Option<Operator> {
    if op.kind != OperatorKind::DoubleBraket {
        return None;
    }
    match provably_equal(op.child(0)?, op.child(1)?) {
        Some(true) => Some(Operator::number(1.0)),
        Some(false) => Some(Operator::number(0.0)),
        None => None,
    }
}

/// Wraps a subtree into a named structural variable carrying it as its single
/// child.
pub fn pack_variable(op: &Operator, name: impl Into<SmolStr>) -> Operator {
    Operator::structural_variable(name, Some(op.clone()))
}

/// Unwraps a structural variable back into its carried subtree. An empty
/// placeholder resolves through the registry instead.
pub fn unpack_variable(op: &Operator, registry: &VariableRegistry) -> Option<Operator> {
    if op.kind != OperatorKind::StructuralVariable {
        return None;
    }
    if let Some(packed) = op.child(0) {
        return Some((**packed).clone());
    }
    registry.get(&op.payload).map(|value| (**value).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::registry::MacroRegistry;
    use rstest::rstest;

    fn parse(input: &str) -> Operator {
        let macros = MacroRegistry::default();
        let tokens = Lexer::tokenize(input).expect("tokenize");
        Parser::new(&tokens, &macros).parse().expect("parse")
    }

    #[rstest]
    #[case("(-x) * y", true)]
    #[case("(-x) * (-y)", false)]
    #[case("x * y", false)]
    fn test_extract_minus_product(#[case] input: &str, #[case] negated: bool) {
        let result = extract_minus(&parse(input));
        if input == "x * y" {
            assert!(result.is_none());
            return;
        }
        let result = result.expect("applicable");
        if negated {
            assert_eq!(result.kind, OperatorKind::Negation);
        } else {
            assert_eq!(result.kind, OperatorKind::Product);
        }
    }

    #[test]
    fn test_extract_minus_sum_requires_all_negative() {
        let all = extract_minus(&parse("(-x) + (-y)")).expect("applicable");
        assert_eq!(all.kind, OperatorKind::Negation);
        assert_eq!(all.children()[0].kind, OperatorKind::Sum);

        assert!(extract_minus(&parse("(-x) + y")).is_none());
    }

    #[test]
    fn test_extract_minus_complex() {
        let result = extract_minus(&parse("complex((-1) (-2))")).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Negation);
        assert_eq!(result.children()[0].kind, OperatorKind::Complex);
    }

    #[test]
    fn test_distribute() {
        let result = distribute(&parse("a * (b + c)")).expect("applicable");
        assert_eq!(result, parse("a*b + a*c"));

        assert!(distribute(&parse("a * b")).is_none());
    }

    #[test]
    fn test_distribute_keeps_outer_factors() {
        let result = distribute(&parse("a * (b + c) * d")).expect("applicable");
        assert_eq!(result, parse("a*b*d + a*c*d"));
    }

    #[rstest]
    #[case("frac((a * b) (b * c))", "frac(a c)")]
    #[case("frac((a * b) b)", "a")]
    #[case("frac(a (a * b))", "frac(1 b)")]
    #[case("frac(a a)", "1")]
    fn test_reduce_fraction(#[case] input: &str, #[case] expected: &str) {
        let result = reduce_fraction(&parse(input)).expect("applicable");
        assert_eq!(result, parse(expected));
    }

    #[test]
    fn test_reduce_fraction_without_common_factor() {
        assert!(reduce_fraction(&parse("frac(a b)")).is_none());
    }

    #[test]
    fn test_combine_complex_add() {
        let result = combine_complex_add(&parse("complex(1 2) + complex(3 4)")).expect("applicable");
        assert_eq!(result, parse("complex(4 6)"));

        assert!(combine_complex_add(&parse("x + y")).is_none());
    }

    #[test]
    fn test_combine_complex_mul() {
        let result = combine_complex_mul(&parse("complex(1 2) * complex(3 4)")).expect("applicable");
        // (1+2i)(3+4i) = -5 + 10i
        assert_eq!(result.kind, OperatorKind::Complex);
        assert!(result.children()[0].is_number(-5.0));
        assert!(result.children()[1].is_number(10.0));
    }

    #[test]
    fn test_combine_complex_mul_with_unit() {
        let result = combine_complex_mul(&parse("complex(0 1) * complex(0 1)")).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Complex);
        assert!(result.children()[0].is_number(-1.0));
        assert!(result.children()[1].is_number(0.0));
    }

    #[test]
    fn test_split_complex() {
        let result = split_complex(&parse("complex(a b)")).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Sum);
        assert_eq!(result.children()[1].kind, OperatorKind::Product);
    }

    #[test]
    fn test_split_delta() {
        let result = split_delta(&parse("delta((a; b) (c; d))")).expect("applicable");
        assert_eq!(result, parse("delta(a c) * delta(b d)"));

        assert!(split_delta(&parse("delta((a; b) (c; d; e))")).is_none());
        assert!(split_delta(&parse("delta(a b)")).is_none());
    }

    #[test]
    fn test_expand_exp_series() {
        let result = expand_exp_series(&parse("exp(x)")).expect("applicable");
        assert_eq!(result, parse("bigsum(n frac(x**n n!))"));
    }

    #[test]
    fn test_euler_formula() {
        let result = euler_formula(&parse("exp(complex(0 1) * x)")).expect("applicable");
        assert_eq!(result, parse("cos(x) + complex(0 1) * sin(x)"));

        assert!(euler_formula(&parse("exp(x)")).is_none());
    }

    #[test]
    fn test_merge_braket() {
        let result = merge_braket(&parse("bra(1) * ket(2)")).expect("applicable");
        assert_eq!(result, parse("bracket(1 2)"));

        let kept = merge_braket(&parse("a * bra(1) * ket(2)")).expect("applicable");
        assert_eq!(kept, parse("a * bracket(1 2)"));

        assert!(merge_braket(&parse("ket(2) * bra(1)")).is_none());
    }

    #[rstest]
    #[case("bracket(1 1)", Some(1.0))]
    #[case("bracket(1 2)", Some(0.0))]
    #[case("bracket(x y)", None)]
    fn test_evaluate_braket(#[case] input: &str, #[case] expected: Option<f64>) {
        let result = evaluate_braket(&parse(input));
        match expected {
            Some(value) => assert!(result.expect("applicable").is_number(value)),
            None => assert!(result.is_none()),
        }
    }

    #[test]
    fn test_pack_and_unpack_variable() {
        let registry = VariableRegistry::default();
        let tree = parse("x + y");

        let packed = pack_variable(&tree, "s");
        assert_eq!(packed.kind, OperatorKind::StructuralVariable);
        assert_eq!(packed.payload, "s");

        let unpacked = unpack_variable(&packed, &registry).expect("applicable");
        assert_eq!(unpacked, tree);
    }

    #[test]
    fn test_unpack_empty_placeholder_resolves_registry() {
        let mut registry = VariableRegistry::default();
        registry.assign("s", Some(parse("x + y")));

        let placeholder = Operator::structural_variable("s", None);
        let unpacked = unpack_variable(&placeholder, &registry).expect("applicable");
        assert_eq!(unpacked, parse("x + y"));

        let unknown = Operator::structural_variable("t", None);
        assert!(unpack_variable(&unknown, &registry).is_none());
    }
}
