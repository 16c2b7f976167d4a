use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::tree::Operator;

/// A named text template with positional `#0..#n` placeholders and a fixed
/// arity, expanded at render time for each call.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub template: String,
    pub arity: usize,
}

impl MacroDef {
    /// Substitutes rendered argument texts into the template. Placeholders
    /// are replaced highest-index first so `#1` never clobbers `#10`.
    pub fn expand(&self, args: &[String]) -> String {
        let mut out = self.template.clone();
        for (k, arg) in args.iter().enumerate().rev() {
            out = out.replace(&format!("#{}", k), arg);
        }
        out
    }
}

/// Trigger name to template table, consulted by the parser on every
/// identifier token. Mutated only through [`MacroRegistry::define`].
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    defs: FxHashMap<SmolStr, MacroDef>,
}

impl MacroRegistry {
    pub fn define(&mut self, name: impl Into<SmolStr>, template: impl Into<String>, arity: usize) {
        self.defs.insert(
            name.into(),
            MacroDef {
                template: template.into(),
                arity,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&MacroDef> {
        self.defs.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}

/// Variable name to optional assigned subtree. Read during folding and
/// unpacking; mutated only through the explicit [`VariableRegistry::assign`].
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    vars: FxHashMap<SmolStr, Option<Rc<Operator>>>,
}

impl VariableRegistry {
    pub fn assign(&mut self, name: impl Into<SmolStr>, value: Option<Operator>) {
        self.vars.insert(name.into(), value.map(Rc::new));
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Operator>> {
        self.vars.get(name).and_then(|value| value.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.vars.keys()
    }
}
