use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

use crate::number::Number;

/// Stable identity of a node within (and across) trees.
///
/// Identities are never reused: structural edits produce new nodes with fresh
/// identities, and every lookup elsewhere (anchored rendering, patches,
/// registries) refers to nodes by id rather than by ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// The closed set of node kinds.
///
/// Every cross-cutting operation (render, fold, equivalence, commutation)
/// matches exhaustively over this enum; adding a kind extends those matches
/// under compiler enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Number,
    Variable,
    Str,
    Pi,
    EulerNumber,
    Infinity,
    Sum,
    Product,
    Negation,
    Fraction,
    Power,
    Root,
    Factorial,
    Exp,
    Sin,
    Cos,
    Tan,
    Delta,
    Tuple,
    Complex,
    ImaginaryUnit,
    Bra,
    Ket,
    Braket,
    DoubleBraket,
    FermionicCreate,
    FermionicAnnihilate,
    BosonicCreate,
    BosonicAnnihilate,
    BigSum,
    BigIntegral,
    Empty,
    MacroRef,
    StructuralVariable,
    CommutableVariable,
    RawText,
    Equality,
}

/// Child-count bound fixed by each kind at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    AtMost(usize),
    Any,
}

impl Arity {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
            Arity::AtMost(n) => count <= *n,
            Arity::Any => true,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::AtMost(n) => write!(f, "at most {}", n),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

impl OperatorKind {
    pub fn arity(&self) -> Arity {
        match self {
            OperatorKind::Number
            | OperatorKind::Variable
            | OperatorKind::Str
            | OperatorKind::Pi
            | OperatorKind::EulerNumber
            | OperatorKind::Infinity
            | OperatorKind::ImaginaryUnit
            | OperatorKind::Empty
            | OperatorKind::RawText => Arity::Exact(0),
            OperatorKind::Negation
            | OperatorKind::Factorial
            | OperatorKind::Exp
            | OperatorKind::Sin
            | OperatorKind::Cos
            | OperatorKind::Tan
            | OperatorKind::Bra
            | OperatorKind::Ket
            | OperatorKind::FermionicCreate
            | OperatorKind::FermionicAnnihilate
            | OperatorKind::BosonicCreate
            | OperatorKind::BosonicAnnihilate
            | OperatorKind::CommutableVariable => Arity::Exact(1),
            OperatorKind::Fraction
            | OperatorKind::Power
            | OperatorKind::Root
            | OperatorKind::Delta
            | OperatorKind::Complex
            | OperatorKind::Braket
            | OperatorKind::DoubleBraket
            | OperatorKind::BigSum
            | OperatorKind::BigIntegral
            | OperatorKind::Equality => Arity::Exact(2),
            OperatorKind::Sum | OperatorKind::Product => Arity::AtLeast(2),
            OperatorKind::Tuple => Arity::AtLeast(1),
            OperatorKind::StructuralVariable => Arity::AtMost(1),
            OperatorKind::MacroRef => Arity::Any,
        }
    }

    /// Quantum-operator-like kinds, rendered without multiplication
    /// punctuation in compact mode.
    pub fn is_quantum(&self) -> bool {
        matches!(
            self,
            OperatorKind::Bra
                | OperatorKind::Ket
                | OperatorKind::Braket
                | OperatorKind::DoubleBraket
                | OperatorKind::FermionicCreate
                | OperatorKind::FermionicAnnihilate
                | OperatorKind::BosonicCreate
                | OperatorKind::BosonicAnnihilate
        )
    }

    pub fn is_fermionic(&self) -> bool {
        matches!(
            self,
            OperatorKind::FermionicCreate | OperatorKind::FermionicAnnihilate
        )
    }

    pub fn is_bosonic(&self) -> bool {
        matches!(
            self,
            OperatorKind::BosonicCreate | OperatorKind::BosonicAnnihilate
        )
    }

    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            OperatorKind::FermionicCreate | OperatorKind::BosonicCreate
        )
    }
}

impl Display for OperatorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:?}", self)
    }
}

/// Arity violation at node build time. Fatal, never caught internally.
#[derive(Error, Debug, PartialEq)]
pub enum ConstructionError {
    #[error("`{kind}` expects {expected} child nodes but got {actual}")]
    ArityViolation {
        kind: OperatorKind,
        expected: Arity,
        actual: usize,
    },
}

/// An immutable expression-tree node.
///
/// A node exclusively owns its children; the structure is a tree, never a
/// DAG. Transformations build new nodes and structurally share untouched
/// branches through `Rc`. Equality ignores the identity: two trees are `==`
/// when their kinds, payloads and ordered children match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub kind: OperatorKind,
    pub payload: SmolStr,
    children: Vec<Rc<Operator>>,
    #[serde(default = "NodeId::fresh")]
    pub id: NodeId,
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.payload == other.payload
            && self.children == other.children
    }
}

impl Operator {
    /// Generic fallible constructor, used where the kind is not statically
    /// known (deserialization). The specific constructors below fix their
    /// arity by signature and cannot fail.
    pub fn new(
        kind: OperatorKind,
        payload: impl Into<SmolStr>,
        children: Vec<Operator>,
    ) -> Result<Self, ConstructionError> {
        let expected = kind.arity();
        if !expected.allows(children.len()) {
            return Err(ConstructionError::ArityViolation {
                kind,
                expected,
                actual: children.len(),
            });
        }
        Ok(Self::build(kind, payload, children))
    }

    fn build(kind: OperatorKind, payload: impl Into<SmolStr>, children: Vec<Operator>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            children: children.into_iter().map(Rc::new).collect(),
            id: NodeId::fresh(),
        }
    }

    /// Returns a copy of this node carrying the given identity.
    ///
    /// This is the identity-override operation for externally authored
    /// anchors; everything else receives a fresh id on construction.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn children(&self) -> &[Rc<Operator>] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&Rc<Operator>> {
        self.children.get(index)
    }

    // Leaves.

    pub fn number(value: impl Into<Number>) -> Self {
        Self::build(OperatorKind::Number, value.into().to_string(), Vec::new())
    }

    pub fn variable(name: impl Into<SmolStr>) -> Self {
        Self::build(OperatorKind::Variable, name, Vec::new())
    }

    pub fn string(text: impl Into<SmolStr>) -> Self {
        Self::build(OperatorKind::Str, text, Vec::new())
    }

    pub fn pi() -> Self {
        Self::build(OperatorKind::Pi, "", Vec::new())
    }

    pub fn euler_number() -> Self {
        Self::build(OperatorKind::EulerNumber, "", Vec::new())
    }

    pub fn infinity() -> Self {
        Self::build(OperatorKind::Infinity, "", Vec::new())
    }

    pub fn imaginary_unit() -> Self {
        Self::build(OperatorKind::ImaginaryUnit, "", Vec::new())
    }

    pub fn empty() -> Self {
        Self::build(OperatorKind::Empty, "", Vec::new())
    }

    pub fn raw(text: impl Into<SmolStr>) -> Self {
        Self::build(OperatorKind::RawText, text, Vec::new())
    }

    // Associative containers, normalized on construction: the empty case
    // folds to the additive/multiplicative identity literal and a single
    // term collapses to that term. Directly nested same-kind containers
    // flatten into one n-ary node.

    pub fn sum(terms: Vec<Operator>) -> Self {
        Self::associative(OperatorKind::Sum, terms, 0.0)
    }

    pub fn product(factors: Vec<Operator>) -> Self {
        Self::associative(OperatorKind::Product, factors, 1.0)
    }

    fn associative(kind: OperatorKind, terms: Vec<Operator>, identity: f64) -> Self {
        let mut flat: Vec<Operator> = Vec::with_capacity(terms.len());
        for term in terms {
            if term.kind == kind {
                flat.extend(term.children.iter().map(|c| (**c).clone()));
            } else {
                flat.push(term);
            }
        }
        if flat.is_empty() {
            return Self::number(identity);
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Self::build(kind, "", flat)
    }

    pub fn tuple(items: Vec<Operator>) -> Self {
        Self::build(OperatorKind::Tuple, "", items)
    }

    // Fixed-arity composites.

    pub fn negation(inner: Operator) -> Self {
        Self::build(OperatorKind::Negation, "", vec![inner])
    }

    pub fn fraction(numerator: Operator, denominator: Operator) -> Self {
        Self::build(OperatorKind::Fraction, "", vec![numerator, denominator])
    }

    pub fn power(base: Operator, exponent: Operator) -> Self {
        Self::build(OperatorKind::Power, "", vec![base, exponent])
    }

    pub fn root(degree: Operator, radicand: Operator) -> Self {
        Self::build(OperatorKind::Root, "", vec![degree, radicand])
    }

    pub fn factorial(inner: Operator) -> Self {
        Self::build(OperatorKind::Factorial, "", vec![inner])
    }

    pub fn exp(inner: Operator) -> Self {
        Self::build(OperatorKind::Exp, "", vec![inner])
    }

    pub fn sin(inner: Operator) -> Self {
        Self::build(OperatorKind::Sin, "", vec![inner])
    }

    pub fn cos(inner: Operator) -> Self {
        Self::build(OperatorKind::Cos, "", vec![inner])
    }

    pub fn tan(inner: Operator) -> Self {
        Self::build(OperatorKind::Tan, "", vec![inner])
    }

    pub fn delta(left: Operator, right: Operator) -> Self {
        Self::build(OperatorKind::Delta, "", vec![left, right])
    }

    pub fn complex(re: Operator, im: Operator) -> Self {
        Self::build(OperatorKind::Complex, "", vec![re, im])
    }

    pub fn bra(index: Operator) -> Self {
        Self::build(OperatorKind::Bra, "", vec![index])
    }

    pub fn ket(index: Operator) -> Self {
        Self::build(OperatorKind::Ket, "", vec![index])
    }

    pub fn braket(left: Operator, right: Operator) -> Self {
        Self::build(OperatorKind::Braket, "", vec![left, right])
    }

    pub fn double_braket(left: Operator, right: Operator) -> Self {
        Self::build(OperatorKind::DoubleBraket, "", vec![left, right])
    }

    pub fn fermionic_create(label: impl Into<SmolStr>, index: Operator) -> Self {
        Self::build(OperatorKind::FermionicCreate, label, vec![index])
    }

    pub fn fermionic_annihilate(label: impl Into<SmolStr>, index: Operator) -> Self {
        Self::build(OperatorKind::FermionicAnnihilate, label, vec![index])
    }

    pub fn bosonic_create(label: impl Into<SmolStr>, index: Operator) -> Self {
        Self::build(OperatorKind::BosonicCreate, label, vec![index])
    }

    pub fn bosonic_annihilate(label: impl Into<SmolStr>, index: Operator) -> Self {
        Self::build(OperatorKind::BosonicAnnihilate, label, vec![index])
    }

    pub fn big_sum(index: Operator, body: Operator) -> Self {
        Self::build(OperatorKind::BigSum, "", vec![index, body])
    }

    pub fn big_integral(measure: Operator, body: Operator) -> Self {
        Self::build(OperatorKind::BigIntegral, "", vec![measure, body])
    }

    pub fn macro_ref(name: impl Into<SmolStr>, args: Vec<Operator>) -> Self {
        Self::build(OperatorKind::MacroRef, name, args)
    }

    pub fn structural_variable(name: impl Into<SmolStr>, packed: Option<Operator>) -> Self {
        Self::build(
            OperatorKind::StructuralVariable,
            name,
            packed.into_iter().collect(),
        )
    }

    pub fn commutable(inner: Operator) -> Self {
        Self::build(OperatorKind::CommutableVariable, "", vec![inner])
    }

    pub fn equality(left: Operator, right: Operator) -> Self {
        Self::build(OperatorKind::Equality, "", vec![left, right])
    }

    // Inspection.

    pub fn as_number(&self) -> Option<Number> {
        if self.kind != OperatorKind::Number {
            return None;
        }
        self.payload.parse::<f64>().ok().map(Number::new)
    }

    pub fn is_number(&self, value: f64) -> bool {
        self.as_number()
            .map(|n| (n.value() - value).abs() < f64::EPSILON)
            .unwrap_or(false)
    }

    /// Preorder traversal over this node and every descendant.
    pub fn descendants(&self) -> impl Iterator<Item = &Operator> {
        let mut stack: Vec<&Operator> = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            for child in node.children.iter().rev() {
                stack.push(child.as_ref());
            }
            Some(node)
        })
    }

    /// Finds the node carrying `id`, searching this subtree.
    pub fn find(&self, id: NodeId) -> Option<&Operator> {
        self.descendants().find(|node| node.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Replaces the node carrying `id` with `replacement`, copying only the
    /// path from the root down to the edit and sharing every untouched
    /// branch. Returns a structurally shared copy when `id` is absent.
    pub fn replace(&self, id: NodeId, replacement: &Operator) -> Operator {
        if self.id == id {
            return replacement.clone();
        }
        if !self.contains(id) {
            return self.clone();
        }
        let children = self
            .children
            .iter()
            .map(|child| {
                if child.contains(id) {
                    Rc::new(child.replace(id, replacement))
                } else {
                    Rc::clone(child)
                }
            })
            .collect();
        Operator {
            kind: self.kind,
            payload: self.payload.clone(),
            children,
            id: self.id,
        }
    }

    /// Deep copy carrying fresh identities on every node. Used when a subtree
    /// is inserted more than once and by identity-regenerating
    /// deserialization.
    pub fn refreshed(&self) -> Operator {
        Operator {
            kind: self.kind,
            payload: self.payload.clone(),
            children: self
                .children
                .iter()
                .map(|child| Rc::new(child.refreshed()))
                .collect(),
            id: NodeId::fresh(),
        }
    }

    /// Rebuilds this node with the given children, keeping kind, payload and
    /// identity. Used by tree-walking rewrites; the caller is responsible for
    /// keeping the child count within the kind's arity.
    pub(crate) fn with_children(&self, children: Vec<Operator>) -> Operator {
        Operator {
            kind: self.kind,
            payload: self.payload.clone(),
            children: children.into_iter().map(Rc::new).collect(),
            id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_construction_arity_violation() {
        let err = Operator::new(OperatorKind::Delta, "", vec![Operator::number(1.0)]);
        assert_eq!(
            err,
            Err(ConstructionError::ArityViolation {
                kind: OperatorKind::Delta,
                expected: Arity::Exact(2),
                actual: 1,
            })
        );
    }

    #[test]
    fn test_sum_normalization() {
        assert!(Operator::sum(Vec::new()).is_number(0.0));
        assert!(Operator::product(Vec::new()).is_number(1.0));

        let single = Operator::sum(vec![Operator::variable("x")]);
        assert_eq!(single.kind, OperatorKind::Variable);

        let nested = Operator::sum(vec![
            Operator::sum(vec![Operator::variable("a"), Operator::variable("b")]),
            Operator::variable("c"),
        ]);
        assert_eq!(nested.children().len(), 3);
    }

    #[test]
    fn test_equality_ignores_identity() {
        let a = Operator::variable("x");
        let b = Operator::variable("x");
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[rstest]
    #[case(OperatorKind::Sum, Arity::AtLeast(2))]
    #[case(OperatorKind::Negation, Arity::Exact(1))]
    #[case(OperatorKind::Delta, Arity::Exact(2))]
    #[case(OperatorKind::MacroRef, Arity::Any)]
    #[case(OperatorKind::StructuralVariable, Arity::AtMost(1))]
    fn test_arity_table(#[case] kind: OperatorKind, #[case] expected: Arity) {
        assert_eq!(kind.arity(), expected);
    }

    #[test]
    fn test_replace_shares_untouched_branches() {
        let left = Operator::variable("x");
        let right = Operator::variable("y");
        let target = right.id;
        let root = Operator::sum(vec![left, right]);

        let edited = root.replace(target, &Operator::number(2.0));
        assert_eq!(edited.id, root.id);
        assert!(Rc::ptr_eq(&edited.children()[0], &root.children()[0]));
        assert!(edited.children()[1].is_number(2.0));
    }

    #[test]
    fn test_find() {
        let inner = Operator::variable("x");
        let inner_id = inner.id;
        let root = Operator::negation(Operator::factorial(inner));

        assert_eq!(root.find(inner_id).map(|n| n.kind), Some(OperatorKind::Variable));
        assert!(root.find(NodeId::fresh()).is_none());
    }
}
