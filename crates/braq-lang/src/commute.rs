//! Exchange statistics for ordered operator products. Fermionic operators
//! anticommute, bosonic operators commute, and a creation/annihilation pair
//! with the same label additionally picks up a Kronecker-delta correction
//! over its indices. Anything without a declared algebra swaps unchanged.

use rustc_hash::FxHashMap;

use crate::tree::{NodeId, Operator, OperatorKind};

/// Classification of one adjacent swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Fermionic creation/annihilation pair with the same label: sign flip
    /// plus a delta correction.
    FermionicMatched,
    /// Two fermionic operators without a matching pair: sign flip only.
    Fermionic,
    /// Bosonic creation/annihilation pair with the same label: delta
    /// correction, no sign flip.
    BosonicMatched,
    /// Two bosonic operators without a matching pair: plain swap.
    Bosonic,
    /// No declared algebra on at least one side: unconditional plain swap.
    Forced,
}

pub fn exchange_kind(a: &Operator, b: &Operator) -> ExchangeKind {
    if a.kind.is_fermionic() && b.kind.is_fermionic() {
        if a.payload == b.payload && a.kind != b.kind {
            ExchangeKind::FermionicMatched
        } else {
            ExchangeKind::Fermionic
        }
    } else if a.kind.is_bosonic() && b.kind.is_bosonic() {
        if a.payload == b.payload && a.kind != b.kind {
            ExchangeKind::BosonicMatched
        } else {
            ExchangeKind::Bosonic
        }
    } else {
        ExchangeKind::Forced
    }
}

/// Swaps the identified child of a product with its immediate next sibling,
/// returning the corrected tree: a fermionic swap negates the product, and a
/// matched pair turns the product into a two-term sum with a delta correction
/// over the pair's indices times the remaining factors.
///
/// `None` when the node is not a product, the id is absent, or the child has
/// no next sibling.
pub fn commute_child_and_subsequent(product: &Operator, child_id: NodeId) -> Option<Operator> {
    if product.kind != OperatorKind::Product {
        return None;
    }
    let position = product
        .children()
        .iter()
        .position(|child| child.id == child_id)?;
    if position + 1 >= product.children().len() {
        return None;
    }

    let a = product.child(position)?;
    let b = product.child(position + 1)?;
    let exchange = exchange_kind(a, b);

    let mut swapped: Vec<Operator> = product.children().iter().map(|c| (**c).clone()).collect();
    swapped.swap(position, position + 1);
    let swapped = Operator::product(swapped);

    let correction = || -> Option<Operator> {
        let delta = Operator::delta((**a.child(0)?).clone(), (**b.child(0)?).clone());
        let rest: Vec<Operator> = product
            .children()
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != position && *k != position + 1)
            .map(|(_, factor)| (**factor).clone())
            .collect();
        Some(Operator::product(
            std::iter::once(delta).chain(rest).collect(),
        ))
    };

    match exchange {
        ExchangeKind::Forced | ExchangeKind::Bosonic => Some(swapped),
        ExchangeKind::Fermionic => Some(Operator::negation(swapped)),
        ExchangeKind::FermionicMatched => Some(Operator::sum(vec![
            Operator::negation(swapped),
            correction()?,
        ])),
        ExchangeKind::BosonicMatched => Some(Operator::sum(vec![swapped, correction()?])),
    }
}

/// Coarse factor classes ranked by the ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorClass {
    Numeric,
    Bosonic,
    Fermionic,
    Commutable,
    QuantumState,
    Other,
}

fn classify(op: &Operator) -> FactorClass {
    match op.kind {
        OperatorKind::Number
        | OperatorKind::Pi
        | OperatorKind::EulerNumber
        | OperatorKind::Infinity => FactorClass::Numeric,
        OperatorKind::BosonicCreate | OperatorKind::BosonicAnnihilate => FactorClass::Bosonic,
        OperatorKind::FermionicCreate | OperatorKind::FermionicAnnihilate => {
            FactorClass::Fermionic
        }
        OperatorKind::CommutableVariable => FactorClass::Commutable,
        OperatorKind::Bra
        | OperatorKind::Ket
        | OperatorKind::Braket
        | OperatorKind::DoubleBraket => FactorClass::QuantumState,
        _ => FactorClass::Other,
    }
}

/// Rank table driving [`order_operator_strings`]. The ranking is
/// configuration rather than a derived invariant: hosts with different
/// conventions override individual classes.
#[derive(Debug, Clone)]
pub struct OrderingPolicy {
    ranks: FxHashMap<FactorClass, u8>,
}

impl Default for OrderingPolicy {
    fn default() -> Self {
        let mut ranks = FxHashMap::default();
        ranks.insert(FactorClass::Numeric, 0);
        ranks.insert(FactorClass::Other, 0);
        ranks.insert(FactorClass::Bosonic, 1);
        ranks.insert(FactorClass::Fermionic, 2);
        ranks.insert(FactorClass::Commutable, 2);
        ranks.insert(FactorClass::QuantumState, 3);
        Self { ranks }
    }
}

impl OrderingPolicy {
    pub fn set_rank(&mut self, class: FactorClass, rank: u8) {
        self.ranks.insert(class, rank);
    }

    pub fn rank(&self, op: &Operator) -> u8 {
        self.ranks.get(&classify(op)).copied().unwrap_or(0)
    }

    // Two factors swap when the left ranks strictly higher, or on a numeric
    // index tie-break within the same rank. Everything else keeps its
    // relative order.
    fn out_of_order(&self, a: &Operator, b: &Operator) -> bool {
        let (ra, rb) = (self.rank(a), self.rank(b));
        if ra != rb {
            return ra > rb;
        }
        match (embedded_index(a), embedded_index(b)) {
            (Some(i), Some(j)) => i > j,
            _ => false,
        }
    }
}

fn embedded_index(op: &Operator) -> Option<i64> {
    op.child(0)?.as_number().map(|n| n.to_int())
}

/// Canonicalizes a product by a bubble pass of adjacent commutations,
/// accumulating every sign flip and correction term. Corrections are
/// themselves recursively ordered. Returns the reordered base product alone,
/// or a sum of the base product and all corrections.
pub fn order_operator_strings(product: &Operator, policy: &OrderingPolicy) -> Operator {
    if product.kind != OperatorKind::Product {
        return product.clone();
    }

    let mut factors: Vec<Operator> = product.children().iter().map(|c| (**c).clone()).collect();
    let mut negated = false;
    let mut corrections: Vec<Operator> = Vec::new();

    loop {
        let mut swapped_any = false;
        for k in 0..factors.len().saturating_sub(1) {
            if !policy.out_of_order(&factors[k], &factors[k + 1]) {
                continue;
            }
            let exchange = exchange_kind(&factors[k], &factors[k + 1]);

            if matches!(
                exchange,
                ExchangeKind::FermionicMatched | ExchangeKind::BosonicMatched
            ) {
                // The correction carries the sign accumulated before this
                // swap and the factor order current at this point.
                if let Some(term) = correction_term(&factors, k, negated) {
                    corrections.push(term);
                }
            }
            if matches!(
                exchange,
                ExchangeKind::Fermionic | ExchangeKind::FermionicMatched
            ) {
                negated = !negated;
            }
            factors.swap(k, k + 1);
            swapped_any = true;
        }
        if !swapped_any {
            break;
        }
    }

    let base = Operator::product(factors);
    let base = if negated {
        Operator::negation(base)
    } else {
        base
    };
    if corrections.is_empty() {
        return base;
    }

    let ordered_corrections: Vec<Operator> = corrections
        .iter()
        .map(|term| order_correction(term, policy))
        .collect();
    Operator::sum(std::iter::once(base).chain(ordered_corrections).collect())
}

fn correction_term(factors: &[Operator], position: usize, negated: bool) -> Option<Operator> {
    let delta = Operator::delta(
        (**factors[position].child(0)?).clone(),
        (**factors[position + 1].child(0)?).clone(),
    );
    let rest: Vec<Operator> = factors
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != position && *k != position + 1)
        .map(|(_, factor)| factor.clone())
        .collect();
    let term = Operator::product(std::iter::once(delta).chain(rest).collect());
    Some(if negated {
        Operator::negation(term)
    } else {
        term
    })
}

fn order_correction(term: &Operator, policy: &OrderingPolicy) -> Operator {
    match term.kind {
        OperatorKind::Product => order_operator_strings(term, policy),
        OperatorKind::Negation => term
            .child(0)
            .map(|inner| Operator::negation(order_operator_strings(inner, policy)))
            .unwrap_or_else(|| term.clone()),
        _ => term.clone(),
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
    #[case("fa(\"c\" i)", "fc(\"c\" j)", ExchangeKind::FermionicMatched)]
    #[case("fc(\"c\" i)", "fc(\"c\" j)", ExchangeKind::Fermionic)]
    #[case("fa(\"c\" i)", "fc(\"d\" j)", ExchangeKind::Fermionic)]
    #[case("ba(\"b\" i)", "bc(\"b\" j)", ExchangeKind::BosonicMatched)]
    #[case("bc(\"b\" i)", "bc(\"b\" j)", ExchangeKind::Bosonic)]
    #[case("fc(\"c\" i)", "bc(\"b\" j)", ExchangeKind::Forced)]
    #[case("x", "fc(\"c\" i)", ExchangeKind::Forced)]
    fn test_exchange_kind(#[case] left: &str, #[case] right: &str, #[case] expected: ExchangeKind) {
        assert_eq!(exchange_kind(&parse(left), &parse(right)), expected);
    }

    #[test]
    fn test_commute_fermionic_matched_pair() {
        let product = parse("fa(\"c\" i) * fc(\"c\" j)");
        let first = product.children()[0].id;

        let result = commute_child_and_subsequent(&product, first).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Sum);
        assert_eq!(result.children()[0].kind, OperatorKind::Negation);
        assert_eq!(
            result.children()[0].children()[0],
            std::rc::Rc::new(parse("fc(\"c\" j) * fa(\"c\" i)"))
        );
        assert_eq!(*result.children()[1], parse("delta(i j)"));
    }

    #[test]
    fn test_commute_matched_pair_keeps_remaining_factors() {
        let product = parse("fa(\"c\" i) * fc(\"c\" j) * x");
        let first = product.children()[0].id;

        let result = commute_child_and_subsequent(&product, first).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Sum);
        assert_eq!(*result.children()[1], parse("delta(i j) * x"));
    }

    #[test]
    fn test_commute_bosonic_matched_pair_has_no_sign_flip() {
        let product = parse("ba(\"b\" i) * bc(\"b\" j)");
        let first = product.children()[0].id;

        let result = commute_child_and_subsequent(&product, first).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Sum);
        assert_eq!(*result.children()[0], parse("bc(\"b\" j) * ba(\"b\" i)"));
        assert_eq!(*result.children()[1], parse("delta(i j)"));
    }

    #[test]
    fn test_commute_unmatched_fermionic_negates() {
        let product = parse("fc(\"c\" i) * fc(\"c\" j)");
        let first = product.children()[0].id;

        let result = commute_child_and_subsequent(&product, first).expect("applicable");
        assert_eq!(result.kind, OperatorKind::Negation);
        assert_eq!(
            *result.children()[0],
            parse("fc(\"c\" j) * fc(\"c\" i)")
        );
    }

    #[test]
    fn test_commute_forced_swap() {
        let product = parse("x * y");
        let first = product.children()[0].id;

        let result = commute_child_and_subsequent(&product, first).expect("applicable");
        assert_eq!(result, parse("y * x"));
    }

    #[test]
    fn test_commute_requires_next_sibling() {
        let product = parse("x * y");
        let last = product.children()[1].id;
        assert!(commute_child_and_subsequent(&product, last).is_none());

        assert!(commute_child_and_subsequent(&parse("x + y"), NodeId::fresh()).is_none());
    }

    #[test]
    fn test_order_numeric_factor_moves_left() {
        // Swapping past a plain number has no declared algebra: no sign flip.
        let policy = OrderingPolicy::default();
        let result = order_operator_strings(&parse("fc(\"c\" 1) * 3"), &policy);
        assert_eq!(result, parse("3 * fc(\"c\" 1)"));
    }

    #[test]
    fn test_order_by_numeric_index_within_rank() {
        let policy = OrderingPolicy::default();
        let result = order_operator_strings(&parse("fc(\"c\" 2) * fc(\"d\" 1)"), &policy);

        assert_eq!(result.kind, OperatorKind::Negation);
        assert_eq!(
            *result.children()[0],
            parse("fc(\"d\" 1) * fc(\"c\" 2)")
        );
    }

    #[test]
    fn test_order_matched_pair_produces_correction() {
        let policy = OrderingPolicy::default();
        let result = order_operator_strings(&parse("fa(\"c\" 2) * fc(\"c\" 1)"), &policy);

        assert_eq!(result.kind, OperatorKind::Sum);
        assert_eq!(result.children()[0].kind, OperatorKind::Negation);
        assert_eq!(
            *result.children()[0].children()[0],
            parse("fc(\"c\" 1) * fa(\"c\" 2)")
        );
        assert_eq!(*result.children()[1], parse("delta(2 1)"));
    }

    #[test]
    fn test_order_already_ordered_is_identity_shape() {
        let policy = OrderingPolicy::default();
        let product = parse("3 * bc(\"b\" 1) * fc(\"c\" 1)");
        let result = order_operator_strings(&product, &policy);
        assert_eq!(result, product);
    }

    #[test]
    fn test_order_custom_rank() {
        let mut policy = OrderingPolicy::default();
        policy.set_rank(FactorClass::Numeric, 9);

        let result = order_operator_strings(&parse("3 * x"), &policy);
        assert_eq!(result, parse("x * 3"));
    }
}
