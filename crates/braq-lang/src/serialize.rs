//! Tree persistence. The JSON grammar carries kind, payload, ordered
//! children and identity per node and is the one externally stable artifact:
//! stored documents must keep parsing across versions.

use thiserror::Error;

use crate::tree::{ConstructionError, Operator};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

pub fn serialize(tree: &Operator) -> Result<String, FormatError> {
    Ok(serde_json::to_string(tree)?)
}

/// Reconstructs a tree from its serialized form.
///
/// `preserve_identities` reuses the stored ids verbatim, the round-trip mode
/// for persisted documents. With it off every node gets a fresh identity, so
/// two reconstructions of the same text never alias. Malformed JSON, a
/// missing children list, or a child count violating the kind's arity all
/// fail; no partial tree is returned.
pub fn deserialize(text: &str, preserve_identities: bool) -> Result<Operator, FormatError> {
    let tree: Operator = serde_json::from_str(text)?;
    validate(&tree)?;
    if preserve_identities {
        Ok(tree)
    } else {
        Ok(tree.refreshed())
    }
}

fn validate(tree: &Operator) -> Result<(), ConstructionError> {
    for node in tree.descendants() {
        let expected = node.kind.arity();
        if !expected.allows(node.children().len()) {
            return Err(ConstructionError::ArityViolation {
                kind: node.kind,
                expected,
                actual: node.children().len(),
            });
        }
    }
    Ok(())
}
