use crate::error::{self, InnerError};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::registry::{MacroRegistry, VariableRegistry};
use crate::render::Renderer;
use crate::serialize;
use crate::tree::Operator;

/// The one stateful entry point: owns the macro and variable registries and
/// wires them into the pure core. Trees never reference an engine; multiple
/// independent trees can be processed by independent engines with no
/// coordination.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub(crate) macros: MacroRegistry,
    pub(crate) variables: VariableRegistry,
}

impl Engine {
    #[allow(clippy::result_large_err)]
    pub fn parse(&self, code: &str) -> Result<Operator, error::Error> {
        let tokens = Lexer::tokenize(code)
            .map_err(|e| error::Error::from_error(code, InnerError::Lexer(e)))?;
        Parser::new(&tokens, &self.macros)
            .parse()
            .map_err(|e| error::Error::from_error(code, InnerError::Parse(e)))
    }

    pub fn render(&self, tree: &Operator, expanded: bool) -> String {
        Renderer::new(&self.macros, expanded).render(tree)
    }

    pub fn render_anchored(&self, tree: &Operator) -> String {
        Renderer::anchored(&self.macros).render(tree)
    }

    #[allow(clippy::result_large_err)]
    pub fn serialize(&self, tree: &Operator) -> Result<String, error::Error> {
        serialize::serialize(tree)
            .map_err(|e| error::Error::from_error("", InnerError::Format(e)))
    }

    #[allow(clippy::result_large_err)]
    pub fn deserialize(
        &self,
        text: &str,
        preserve_identities: bool,
    ) -> Result<Operator, error::Error> {
        serialize::deserialize(text, preserve_identities)
            .map_err(|e| error::Error::from_error(text, InnerError::Format(e)))
    }

    pub fn set_variable(&mut self, name: &str, value: Option<Operator>) {
        self.variables.assign(name, value);
    }

    pub fn variable(&self, name: &str) -> Option<Operator> {
        self.variables.get(name).map(|value| (**value).clone())
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn define_macro(&mut self, name: &str, template: &str, arity: usize) {
        self.macros.define(name, template, arity);
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::OperatorKind;

    #[test]
    fn test_parse_and_render() {
        let engine = Engine::default();
        let tree = engine.parse("1 + 2 + x").unwrap();
        assert_eq!(tree.kind, OperatorKind::Sum);
        assert_eq!(engine.render(&tree, true), "1 + 2 + x");
    }

    #[test]
    fn test_parse_error_carries_source() {
        let engine = Engine::default();
        let error = engine.parse("(a + b").unwrap_err();
        assert_eq!(error.source_code, "(a + b");
    }

    #[test]
    fn test_macro_definition_end_to_end() {
        let mut engine = Engine::default();
        engine.define_macro("t", "\\mathrm{#0}", 1);

        let tree = engine.parse("t(2)").unwrap();
        assert_eq!(engine.render(&tree, true), "\\mathrm{2}");

        assert!(engine.parse("t").is_err());
    }

    #[test]
    fn test_variable_registry_access() {
        let mut engine = Engine::default();
        assert!(engine.variable("x").is_none());

        let value = engine.parse("a + b").unwrap();
        engine.set_variable("x", Some(value.clone()));
        assert_eq!(engine.variable("x"), Some(value));

        engine.set_variable("x", None);
        assert!(engine.variable("x").is_none());
    }

    #[test]
    fn test_serialize_round_trip() {
        let engine = Engine::default();
        let tree = engine.parse("delta(i j) * fc(\"c\" 1)").unwrap();

        let text = engine.serialize(&tree).unwrap();
        let restored = engine.deserialize(&text, true).unwrap();
        assert_eq!(restored, tree);
        assert_eq!(restored.id, tree.id);
    }

    #[test]
    fn test_version() {
        assert!(!Engine::version().is_empty());
    }
}
