//! Context-dependent rewrites, split into pure discovery and a generic
//! commit. Discovery functions never mutate: they return candidate patches
//! referencing original node identities, so a host can enumerate several
//! edits before committing exactly one against the live tree. An empty patch
//! list means "not applicable" and callers must branch on it; [`apply`]
//! assumes a well-formed, non-empty patch.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::equiv::are_equivalent;
use crate::registry::VariableRegistry;
use crate::tree::{NodeId, Operator, OperatorKind};

/// One identity-keyed edit inside a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditDirective {
    Replace {
        target: NodeId,
        replacement: Operator,
    },
    Remove {
        target: NodeId,
    },
}

/// A self-describing candidate edit. Serializable so a host UI can hold and
/// preview candidates away from the authoritative document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub edits: Vec<EditDirective>,
}

/// Whether cancellation pairs a term with any peer or only with its direct
/// neighbors in the peer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjacency {
    AdjacentOnly,
    Any,
}

/// Commits one patch against `root` by identity lookup.
///
/// All removals land in a single pass, so a patch removing both halves of a
/// cancelable pair sees the original tree throughout. N-ary containers left
/// short by removals renormalize: an emptied sum or product becomes its
/// identity literal and a singleton collapses to its remaining child.
pub fn apply(root: &Operator, patch: &Patch) -> Operator {
    debug_assert!(!patch.edits.is_empty(), "empty patch");
    let mut replacements: FxHashMap<NodeId, &Operator> = FxHashMap::default();
    let mut removals: FxHashSet<NodeId> = FxHashSet::default();
    for edit in &patch.edits {
        match edit {
            EditDirective::Replace {
                target,
                replacement,
            } => {
                replacements.insert(*target, replacement);
            }
            EditDirective::Remove { target } => {
                removals.insert(*target);
            }
        }
    }
    rebuild(root, &replacements, &removals)
}

fn rebuild(
    node: &Operator,
    replacements: &FxHashMap<NodeId, &Operator>,
    removals: &FxHashSet<NodeId>,
) -> Operator {
    if let Some(replacement) = replacements.get(&node.id) {
        return (*replacement).clone();
    }
    let mut children: Vec<Operator> = node
        .children()
        .iter()
        .filter(|child| !removals.contains(&child.id))
        .map(|child| rebuild(child, replacements, removals))
        .collect();

    match node.kind {
        OperatorKind::Sum if children.len() < 2 => match children.len() {
            0 => Operator::number(0.0),
            _ => children.remove(0),
        },
        OperatorKind::Product if children.len() < 2 => match children.len() {
            0 => Operator::number(1.0),
            _ => children.remove(0),
        },
        _ => node.with_children(children),
    }
}

/// Finds peers that cancel the target: sum terms against their negation,
/// product factors against their reciprocal. One patch of two removals per
/// cancelable pair; the target never pairs with itself and a lone occurrence
/// yields no patches.
pub fn propose_cancellation(
    target: &Operator,
    peers: &[Operator],
    adjacency: Adjacency,
) -> Vec<Patch> {
    let Some(position) = peers.iter().position(|peer| peer.id == target.id) else {
        return Vec::new();
    };
    let mut patches = Vec::new();
    for (k, peer) in peers.iter().enumerate() {
        if k == position {
            continue;
        }
        if adjacency == Adjacency::AdjacentOnly && position.abs_diff(k) != 1 {
            continue;
        }
        if cancels(target, peer) {
            patches.push(Patch {
                edits: vec![
                    EditDirective::Remove { target: target.id },
                    EditDirective::Remove { target: peer.id },
                ],
            });
        }
    }
    patches
}

fn cancels(a: &Operator, b: &Operator) -> bool {
    negation_of(a, b) || negation_of(b, a) || reciprocal_of(a, b) || reciprocal_of(b, a)
}

fn negation_of(negated: &Operator, plain: &Operator) -> bool {
    negated.kind == OperatorKind::Negation
        && negated.child(0).is_some_and(|inner| **inner == *plain)
}

fn reciprocal_of(fraction: &Operator, plain: &Operator) -> bool {
    fraction.kind == OperatorKind::Fraction
        && fraction.child(0).is_some_and(|n| n.is_number(1.0))
        && fraction.child(1).is_some_and(|d| **d == *plain)
}

/// `Σ_i δ(i,j)·f(i)` collapses to `f(j)`: when the binder body carries a
/// delta factor over the bound index, the whole binder is replaced by the
/// remaining factors with the other delta side substituted in.
pub fn propose_sum_over_delta(binder: &Operator) -> Vec<Patch> {
    if binder.kind != OperatorKind::BigSum {
        return Vec::new();
    }
    let (Some(index), Some(body)) = (binder.child(0), binder.child(1)) else {
        return Vec::new();
    };
    let factors: Vec<&Operator> = if body.kind == OperatorKind::Product {
        body.children().iter().map(|c| c.as_ref()).collect()
    } else {
        vec![body.as_ref()]
    };

    let mut patches = Vec::new();
    for (k, factor) in factors.iter().enumerate() {
        if factor.kind != OperatorKind::Delta {
            continue;
        }
        let (Some(left), Some(right)) = (factor.child(0), factor.child(1)) else {
            continue;
        };
        let other = if **left == **index {
            right
        } else if **right == **index {
            left
        } else {
            continue;
        };
        let rest: Vec<Operator> = factors
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .map(|(_, f)| (*f).clone())
            .collect();
        let replacement = substitute(&Operator::product(rest), index, other);
        patches.push(Patch {
            edits: vec![EditDirective::Replace {
                target: binder.id,
                replacement,
            }],
        });
    }
    patches
}

/// A delta between two index expressions lets either one stand in for the
/// other across the sibling subtrees. One patch per substitution direction,
/// each covering every affected peer.
pub fn propose_delta_propagation(delta: &Operator, peers: &[Operator]) -> Vec<Patch> {
    if delta.kind != OperatorKind::Delta {
        return Vec::new();
    }
    let (Some(left), Some(right)) = (delta.child(0), delta.child(1)) else {
        return Vec::new();
    };
    if **left == **right {
        return Vec::new();
    }

    let mut patches = Vec::new();
    for (from, to) in [(left, right), (right, left)] {
        let edits: Vec<EditDirective> = peers
            .iter()
            .filter(|peer| peer.id != delta.id)
            .filter(|peer| occurs(peer, from))
            .map(|peer| EditDirective::Replace {
                target: peer.id,
                replacement: substitute(peer, from, to),
            })
            .collect();
        if !edits.is_empty() {
            patches.push(Patch { edits });
        }
    }
    patches
}

/// Renames every occurrence of the given symbols in one patch.
pub fn propose_rename(root: &Operator, renames: &[(SmolStr, SmolStr)]) -> Vec<Patch> {
    let edits: Vec<EditDirective> = root
        .descendants()
        .filter(|node| node.kind == OperatorKind::Variable)
        .filter_map(|node| {
            renames
                .iter()
                .find(|(from, _)| *from == node.payload)
                .map(|(_, to)| EditDirective::Replace {
                    target: node.id,
                    replacement: Operator::variable(to.clone()),
                })
        })
        .collect();
    if edits.is_empty() {
        Vec::new()
    } else {
        vec![Patch { edits }]
    }
}

/// Packs every subtree equivalent to the registry-assigned value of `name`
/// into the named structural variable, one patch covering all occurrences.
/// Matches never nest: a matched subtree is not searched again.
pub fn propose_variable_packing(
    root: &Operator,
    name: &str,
    registry: &VariableRegistry,
) -> Vec<Patch> {
    let Some(value) = registry.get(name) else {
        return Vec::new();
    };
    let mut matches: Vec<&Operator> = Vec::new();
    collect_matches(root, value, &mut matches);

    let edits: Vec<EditDirective> = matches
        .into_iter()
        .map(|node| EditDirective::Replace {
            target: node.id,
            replacement: Operator::structural_variable(name, Some(node.clone())),
        })
        .collect();
    if edits.is_empty() {
        Vec::new()
    } else {
        vec![Patch { edits }]
    }
}

fn collect_matches<'a>(node: &'a Operator, value: &Operator, out: &mut Vec<&'a Operator>) {
    if are_equivalent(node, value) {
        out.push(node);
        return;
    }
    for child in node.children() {
        collect_matches(child, value, out);
    }
}

fn occurs(tree: &Operator, pattern: &Operator) -> bool {
    tree.descendants().any(|node| *node == *pattern)
}

// Every occurrence inserted by a substitution gets fresh identities so ids
// stay unique within the edited tree.
fn substitute(tree: &Operator, from: &Operator, to: &Operator) -> Operator {
    if *tree == *from {
        return to.refreshed();
    }
    let children: Vec<Operator> = tree
        .children()
        .iter()
        .map(|child| substitute(child, from, to))
        .collect();
    tree.with_children(children)
}
