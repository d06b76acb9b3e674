//! Literal token-pattern matching.
//!
//! A pattern is a space-separated list of atoms matched against consecutive
//! tokens in the flat stream:
//!
//! - a literal symbol matches that exact token text,
//! - `a|b|c` matches any of the alternatives,
//! - `%name%` matches any identifier, `%var%` an identifier with a resolved
//!   variable id, `%num%` an integer literal, `%op%` any operator,
//!   `%cmp%` a comparison operator, `%assign%` an assignment operator,
//!   `%any%` any token.
//!
//! The matcher answers purely textual questions; anything semantic goes
//! through the analysis modules.

use super::{NodeArena, NodeKind};
use crate::core::NodeId;

/// Match `pattern` against the stream starting at `start`.
pub fn matches(arena: &NodeArena, start: NodeId, pattern: &str) -> bool {
    let mut tok = Some(start);
    for atom in pattern.split_whitespace() {
        let Some(id) = tok else { return false };
        if !matches_atom(arena, id, atom) {
            return false;
        }
        tok = arena.next(id);
    }
    true
}

/// Match against an optional start token; `None` never matches.
pub fn matches_opt(arena: &NodeArena, start: Option<NodeId>, pattern: &str) -> bool {
    start.is_some_and(|s| matches(arena, s, pattern))
}

fn matches_atom(arena: &NodeArena, id: NodeId, atom: &str) -> bool {
    if atom.contains('|') && !atom.starts_with('%') {
        return atom.split('|').any(|alt| matches_atom(arena, id, alt));
    }
    match atom {
        "%any%" => true,
        "%name%" => arena.is_name(id),
        "%var%" => arena.node(id).variable_id.is_some(),
        "%num%" => arena.is_number(id),
        "%op%" => arena.node(id).kind == NodeKind::Op,
        "%cmp%" => arena.is_comparison_op(id),
        "%assign%" => arena.is_assignment_op(id),
        _ => arena.sym(id) == atom,
    }
}
