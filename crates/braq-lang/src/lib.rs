//! `braq-lang` is a symbolic expression engine for physics formula notation:
//! a parser for a linear textual syntax, an immutable identity-bearing
//! expression tree, a library of single-step rewrites, a two-phase peer
//! alteration protocol, and fermionic/bosonic commutation algebra.
//!
//! ## Examples
//!
//! ```rs
//! use braq_lang::Engine;
//!
//! let mut engine = Engine::default();
//! let tree = engine.parse("fa(\"c\" i) * fc(\"c\" j)").unwrap();
//!
//! // Commute the first pair: fermionic operators anticommute and a matched
//! // creation/annihilation pair picks up a Kronecker-delta correction.
//! use braq_lang::commute_child_and_subsequent;
//! let first = tree.children()[0].id;
//! let commuted = commute_child_and_subsequent(&tree, first).unwrap();
//!
//! assert_eq!(engine.render(&commuted, false), "-fc(\"c\" j) fa(\"c\" i) + delta(i j)");
//!
//! // Trees persist with or without their identities.
//! let text = engine.serialize(&tree).unwrap();
//! assert_eq!(engine.deserialize(&text, true).unwrap().id, tree.id);
//! ```
mod commute;
mod engine;
mod equiv;
mod error;
mod lexer;
mod modify;
mod number;
mod parser;
mod peer;
mod range;
mod registry;
mod render;
mod serialize;
mod tree;

use error::InnerError;
use lexer::Lexer;

pub use commute::{
    ExchangeKind, FactorClass, OrderingPolicy, commute_child_and_subsequent, exchange_kind,
    order_operator_strings,
};
pub use engine::Engine;
pub use equiv::{are_equivalent, canonicalize, fold};
pub use error::Error;
pub use lexer::token::{Token, TokenKind};
pub use modify::{
    combine_complex_add, combine_complex_mul, distribute, euler_formula, evaluate_braket,
    expand_exp_series, extract_minus, merge_braket, pack_variable, reduce_fraction, split_complex,
    split_delta, unpack_variable,
};
pub use number::{INFINITE, Number};
pub use parser::Parser;
pub use peer::{
    Adjacency, EditDirective, Patch, apply, propose_cancellation, propose_delta_propagation,
    propose_rename, propose_sum_over_delta, propose_variable_packing,
};
pub use range::{Position, Range};
pub use registry::{MacroDef, MacroRegistry, VariableRegistry};
pub use render::Renderer;
pub use serialize::{FormatError, deserialize, serialize};
pub use tree::{Arity, ConstructionError, NodeId, Operator, OperatorKind};

pub type BraqResult = Result<Operator, Error>;

#[allow(clippy::result_large_err)]
pub fn parse(code: &str, macros: &MacroRegistry) -> BraqResult {
    let tokens = tokenize(code)?;
    Parser::new(&tokens, macros)
        .parse()
        .map_err(|e| Error::from_error(code, InnerError::Parse(e)))
}

#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str) -> Result<Vec<Token>, Error> {
    Lexer::tokenize(code).map_err(|e| Error::from_error(code, InnerError::Lexer(e)))
}
