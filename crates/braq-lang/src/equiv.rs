use crate::number::Number;
use crate::tree::{Operator, OperatorKind};

/// Structural equivalence with a numeric escape hatch: trees that fully
/// constant-fold to numbers compare by value even when their shapes differ.
/// A symbolic subtree is never equivalent to a different kind by coincidence.
pub fn are_equivalent(a: &Operator, b: &Operator) -> bool {
    if a == b {
        return true;
    }
    match (fold(a).as_number(), fold(b).as_number()) {
        (Some(x), Some(y)) => (x.value() - y.value()).abs() < f64::EPSILON,
        _ => false,
    }
}

/// Constant folding: evaluates purely numeric subtrees bottom-up and leaves
/// anything containing an unresolved symbol untouched.
pub fn fold(op: &Operator) -> Operator {
    let children: Vec<Operator> = op.children().iter().map(|c| fold(c)).collect();
    let numbers: Option<Vec<Number>> = children.iter().map(|c| c.as_number()).collect();

    if let Some(ns) = numbers {
        match (op.kind, ns.as_slice()) {
            (OperatorKind::Sum, _) => {
                let total = ns.iter().fold(Number::new(0.0), |acc, n| acc + *n);
                return Operator::number(total);
            }
            (OperatorKind::Product, _) => {
                let total = ns.iter().fold(Number::new(1.0), |acc, n| acc * *n);
                return Operator::number(total);
            }
            (OperatorKind::Negation, [n]) => return Operator::number(-*n),
            (OperatorKind::Fraction, [a, b]) if !b.is_zero() => {
                return Operator::number(*a / *b);
            }
            (OperatorKind::Power, [base, exponent]) => {
                let value = base.value().powf(exponent.value());
                if value.is_finite() {
                    return Operator::number(value);
                }
            }
            (OperatorKind::Root, [degree, radicand]) if !degree.is_zero() => {
                let value = radicand.value().powf(1.0 / degree.value());
                if value.is_finite() {
                    return Operator::number(value);
                }
            }
            (OperatorKind::Factorial, [n]) => {
                if let Some(value) = n.factorial() {
                    return Operator::number(value);
                }
            }
            (OperatorKind::Delta, [a, b]) => {
                let equal = (a.value() - b.value()).abs() < f64::EPSILON;
                return Operator::number(if equal { 1.0 } else { 0.0 });
            }
            _ => {}
        }
    }

    if op.kind == OperatorKind::DoubleBraket {
        if let [left, right] = &children[..] {
            match provably_equal(left, right) {
                Some(true) => return Operator::number(1.0),
                Some(false) => return Operator::number(0.0),
                None => {}
            }
        }
    }

    op.with_children(children)
}

/// Decides equality of two index expressions where possible: `Some(true)` /
/// `Some(false)` only when provable, `None` when the comparison stays
/// symbolic.
pub fn provably_equal(a: &Operator, b: &Operator) -> Option<bool> {
    let fa = fold(a);
    let fb = fold(b);

    if let (Some(x), Some(y)) = (fa.as_number(), fb.as_number()) {
        return Some((x.value() - y.value()).abs() < f64::EPSILON);
    }

    if fa.kind == OperatorKind::Tuple && fb.kind == OperatorKind::Tuple {
        if fa.children().len() != fb.children().len() {
            return Some(false);
        }
        let mut provable = true;
        for (x, y) in fa.children().iter().zip(fb.children().iter()) {
            match provably_equal(x, y) {
                Some(false) => return Some(false),
                Some(true) => {}
                None => provable = false,
            }
        }
        return if provable { Some(true) } else { None };
    }

    if fa == fb {
        return Some(true);
    }

    None
}

/// Removes identity elements (multiply-by-one, add-zero, double negation)
/// without altering numeric or symbolic content. Singleton containers cannot
/// arise from construction but are collapsed defensively after removals.
pub fn canonicalize(op: &Operator) -> Operator {
    let children: Vec<Operator> = op.children().iter().map(|c| canonicalize(c)).collect();

    match op.kind {
        OperatorKind::Sum => {
            let kept: Vec<Operator> = children
                .into_iter()
                .filter(|c| !c.is_number(0.0))
                .collect();
            rebuild_nary(op, kept, 0.0)
        }
        OperatorKind::Product => {
            let kept: Vec<Operator> = children
                .into_iter()
                .filter(|c| !c.is_number(1.0))
                .collect();
            rebuild_nary(op, kept, 1.0)
        }
        OperatorKind::Negation => {
            if let [inner] = &children[..] {
                if inner.kind == OperatorKind::Negation {
                    if let Some(grandchild) = inner.child(0) {
                        return (**grandchild).clone();
                    }
                }
            }
            op.with_children(children)
        }
        _ => op.with_children(children),
    }
}

fn rebuild_nary(op: &Operator, mut kept: Vec<Operator>, identity: f64) -> Operator {
    match kept.len() {
        0 => Operator::number(identity),
        1 => kept.remove(0),
        _ => op.with_children(kept),
    }
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
    #[case("1 + 2 + 3", "6", true)]
    #[case("2 * 3", "6", true)]
    #[case("1 + 2 + x", "6", false)]
    #[case("x + y", "x + y", true)]
    #[case("x", "y", false)]
    fn test_are_equivalent(#[case] left: &str, #[case] right: &str, #[case] expected: bool) {
        let a = parse(left);
        let b = parse(right);
        assert_eq!(are_equivalent(&a, &b), expected);
        assert_eq!(are_equivalent(&b, &a), expected);
        assert!(are_equivalent(&a, &a));
    }

    #[rstest]
    #[case("delta(1 2)", Some(0.0))]
    #[case("delta(2 (1 + 1))", Some(1.0))]
    #[case("delta(x (x + 1))", None)]
    fn test_delta_folding(#[case] input: &str, #[case] expected: Option<f64>) {
        let folded = fold(&parse(input));
        match expected {
            Some(value) => assert!(folded.is_number(value)),
            None => assert_eq!(folded.kind, OperatorKind::Delta),
        }
    }

    #[rstest]
    #[case("4!", 24.0)]
    #[case("2 ** 3", 8.0)]
    #[case("root(2 9)", 3.0)]
    #[case("frac(6 2)", 3.0)]
    #[case("-(2 + 3)", -5.0)]
    fn test_numeric_folding(#[case] input: &str, #[case] expected: f64) {
        assert!(fold(&parse(input)).is_number(expected));
    }

    #[test]
    fn test_fold_leaves_symbolic_subtrees() {
        let folded = fold(&parse("x + 1 + 2"));
        assert_eq!(folded.kind, OperatorKind::Sum);
    }

    #[test]
    fn test_fold_division_by_zero_stays_symbolic() {
        let folded = fold(&parse("frac(1 0)"));
        assert_eq!(folded.kind, OperatorKind::Fraction);
    }

    #[test]
    fn test_orthonormal_braket_folds() {
        assert!(fold(&parse("bracket(1 1)")).is_number(1.0));
        assert!(fold(&parse("bracket(1 2)")).is_number(0.0));
        assert_eq!(
            fold(&parse("bracket(x y)")).kind,
            OperatorKind::DoubleBraket
        );
    }

    #[rstest]
    #[case("x * 1", OperatorKind::Variable)]
    #[case("x + 0", OperatorKind::Variable)]
    #[case("-(-x)", OperatorKind::Variable)]
    fn test_canonicalize_removes_identities(#[case] input: &str, #[case] expected: OperatorKind) {
        assert_eq!(canonicalize(&parse(input)).kind, expected);
    }

    #[test]
    fn test_canonicalize_keeps_content() {
        let tree = parse("2 * x * 1");
        let canon = canonicalize(&tree);
        assert_eq!(canon.kind, OperatorKind::Product);
        assert_eq!(canon.children().len(), 2);
    }

    #[test]
    fn test_provably_equal_tuples() {
        assert_eq!(
            provably_equal(&parse("(1; 2)"), &parse("(1; (1 + 1))")),
            Some(true)
        );
        assert_eq!(
            provably_equal(&parse("(1; 2)"), &parse("(1; 3)")),
            Some(false)
        );
        assert_eq!(provably_equal(&parse("(1; x)"), &parse("(1; y)")), None);
        assert_eq!(
            provably_equal(&parse("(1; 2)"), &parse("(1; 2; 3)")),
            Some(false)
        );
    }
}
