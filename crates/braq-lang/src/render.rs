//! Tree to formula text. Output parses back into an equivalent tree: infix
//! operators carry precedence-aware parenthesization and everything without
//! an infix spelling uses its constructor form. Compact mode drops the
//! multiplication punctuation between adjacent quantum-operator factors, the
//! usual physics convention.

use itertools::Itertools;

use crate::registry::MacroRegistry;
use crate::tree::{Operator, OperatorKind};

const PREC_EQUALITY: u8 = 1;
const PREC_SUM: u8 = 2;
const PREC_PRODUCT: u8 = 3;
const PREC_UNARY: u8 = 4;
const PREC_POWER: u8 = 5;
const PREC_POSTFIX: u8 = 6;
const PREC_ATOM: u8 = 7;

pub struct Renderer<'a> {
    macros: &'a MacroRegistry,
    expanded: bool,
    anchored: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(macros: &'a MacroRegistry, expanded: bool) -> Self {
        Self {
            macros,
            expanded,
            anchored: false,
        }
    }

    /// Renderer wrapping every node span as `[[{id}:{text}]]`, so external
    /// tooling can map rendered text back to nodes. Anchored output is not
    /// re-parseable.
    pub fn anchored(macros: &'a MacroRegistry) -> Self {
        Self {
            macros,
            expanded: true,
            anchored: true,
        }
    }

    pub fn render(&self, op: &Operator) -> String {
        self.node(op)
    }

    fn node(&self, op: &Operator) -> String {
        let text = self.body(op);
        if self.anchored {
            format!("[[{}:{}]]", op.id, text)
        } else {
            text
        }
    }

    fn operand(&self, op: &Operator, min: u8) -> String {
        let text = self.node(op);
        if precedence(op) < min {
            format!("({})", text)
        } else {
            text
        }
    }

    // Constructor arguments are whitespace-separated, so anything that could
    // merge with a neighboring argument gets parenthesized.
    fn call_arg(&self, op: &Operator) -> String {
        self.operand(op, PREC_POSTFIX)
    }

    fn call(&self, name: &str, args: &[&Operator]) -> String {
        format!(
            "{}({})",
            name,
            args.iter().map(|arg| self.call_arg(arg)).join(" ")
        )
    }

    fn body(&self, op: &Operator) -> String {
        match op.kind {
            OperatorKind::Number | OperatorKind::Variable => op.payload.to_string(),
            OperatorKind::Str => format!("\"{}\"", escape(&op.payload)),
            OperatorKind::RawText => format!("raw(\"{}\")", escape(&op.payload)),
            OperatorKind::Pi => "pi".to_string(),
            OperatorKind::EulerNumber => "e".to_string(),
            OperatorKind::Infinity => "inf".to_string(),
            OperatorKind::Empty => "_".to_string(),
            OperatorKind::ImaginaryUnit => "complex(0 1)".to_string(),
            OperatorKind::Sum => self.sum(op),
            OperatorKind::Product => self.product(op),
            OperatorKind::Negation => {
                format!("-{}", self.child_operand(op, 0, PREC_UNARY))
            }
            OperatorKind::Fraction => format!(
                "{} / {}",
                self.child_operand(op, 0, PREC_PRODUCT + 1),
                self.child_operand(op, 1, PREC_UNARY)
            ),
            OperatorKind::Power => format!(
                "{} ** {}",
                self.child_operand(op, 0, PREC_POSTFIX),
                self.child_operand(op, 1, PREC_POWER)
            ),
            OperatorKind::Factorial => {
                format!("{}!", self.child_operand(op, 0, PREC_ATOM))
            }
            OperatorKind::Equality => format!(
                "{} = {}",
                self.child_operand(op, 0, PREC_SUM),
                self.child_operand(op, 1, PREC_SUM)
            ),
            OperatorKind::Tuple => format!(
                "({})",
                op.children().iter().map(|item| self.node(item)).join("; ")
            ),
            OperatorKind::Root => self.call_children("root", op),
            OperatorKind::Exp => self.call_children("exp", op),
            OperatorKind::Sin => self.call_children("sin", op),
            OperatorKind::Cos => self.call_children("cos", op),
            OperatorKind::Tan => self.call_children("tan", op),
            OperatorKind::Delta => self.call_children("delta", op),
            OperatorKind::Complex => self.call_children("complex", op),
            OperatorKind::Bra => self.call_children("bra", op),
            OperatorKind::Ket => self.call_children("ket", op),
            OperatorKind::Braket => self.call_children("braket", op),
            OperatorKind::DoubleBraket => self.call_children("bracket", op),
            OperatorKind::BigSum => self.call_children("bigsum", op),
            OperatorKind::BigIntegral => self.call_children("bigint", op),
            OperatorKind::CommutableVariable => self.call_children("cv", op),
            OperatorKind::FermionicCreate => self.labeled_call("fc", op),
            OperatorKind::FermionicAnnihilate => self.labeled_call("fa", op),
            OperatorKind::BosonicCreate => self.labeled_call("bc", op),
            OperatorKind::BosonicAnnihilate => self.labeled_call("ba", op),
            OperatorKind::StructuralVariable => {
                if op.children().is_empty() {
                    format!("svar(\"{}\")", escape(&op.payload))
                } else {
                    self.labeled_call("svar", op)
                }
            }
            OperatorKind::MacroRef => self.macro_ref(op),
        }
    }

    fn sum(&self, op: &Operator) -> String {
        let mut out = String::new();
        for (k, term) in op.children().iter().enumerate() {
            if k == 0 {
                out.push_str(&self.operand(term, PREC_PRODUCT));
                continue;
            }
            if !self.anchored && term.kind == OperatorKind::Negation {
                if let Some(inner) = term.child(0) {
                    out.push_str(" - ");
                    out.push_str(&self.operand(inner, PREC_PRODUCT));
                    continue;
                }
            }
            out.push_str(" + ");
            out.push_str(&self.operand(term, PREC_PRODUCT));
        }
        out
    }

    fn product(&self, op: &Operator) -> String {
        let mut out = String::new();
        let factors = op.children();
        for (k, factor) in factors.iter().enumerate() {
            if k > 0 {
                let compact = !self.expanded
                    && factors[k - 1].kind.is_quantum()
                    && factor.kind.is_quantum();
                out.push_str(if compact { " " } else { " * " });
            }
            out.push_str(&self.operand(factor, PREC_UNARY));
        }
        out
    }

    fn child_operand(&self, op: &Operator, index: usize, min: u8) -> String {
        op.child(index)
            .map(|child| self.operand(child, min))
            .unwrap_or_default()
    }

    fn call_children(&self, name: &str, op: &Operator) -> String {
        let args: Vec<&Operator> = op.children().iter().map(|c| c.as_ref()).collect();
        self.call(name, &args)
    }

    fn labeled_call(&self, name: &str, op: &Operator) -> String {
        let args = op
            .children()
            .iter()
            .map(|arg| self.call_arg(arg))
            .join(" ");
        if args.is_empty() {
            format!("{}(\"{}\")", name, escape(&op.payload))
        } else {
            format!("{}(\"{}\" {})", name, escape(&op.payload), args)
        }
    }

    // A macro reference renders by expanding the registry template with its
    // rendered arguments. An undefined trigger falls back to call syntax.
    fn macro_ref(&self, op: &Operator) -> String {
        let args: Vec<String> = op.children().iter().map(|arg| self.node(arg)).collect();
        match self.macros.lookup(&op.payload) {
            Some(def) => def.expand(&args),
            None => format!("{}({})", op.payload, args.join(" ")),
        }
    }
}

fn precedence(op: &Operator) -> u8 {
    match op.kind {
        OperatorKind::Equality => PREC_EQUALITY,
        OperatorKind::Sum => PREC_SUM,
        OperatorKind::Product | OperatorKind::Fraction => PREC_PRODUCT,
        OperatorKind::Negation => PREC_UNARY,
        OperatorKind::Power => PREC_POWER,
        OperatorKind::Factorial => PREC_POSTFIX,
        _ => PREC_ATOM,
    }
}

fn escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '\\' => vec!['\\', '\\'],
            '"' => vec!['\\', '"'],
            '\n' => vec!['\\', 'n'],
            '\t' => vec!['\\', 't'],
            _ => vec![c],
        })
        .collect()
}
