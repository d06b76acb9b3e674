//! Identity types and analysis-wide constants.
//!
//! Every node, variable, expression and scope is addressed by a small integer
//! handle into an arena. Handles are newtypes so that a node index can never
//! be confused with a variable identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a token/AST node in a [`crate::ast::NodeArena`].
///
/// Arena construction pushes nodes in document order, so comparing two
/// `NodeId`s orders the underlying tokens by their position in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of a resolved variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Identity tag shared by syntactically-recurring instances of the same
/// source expression. A fast equality hint, always refined by structural
/// comparison before anything is concluded from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub u32);

/// Index of a lexical scope in a [`crate::ast::NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How much an analysis answer can be trusted.
///
/// Replaces the out-parameter convention: an inconclusive alias or
/// reference-resolution result is reported alongside its payload so the
/// caller can downgrade a diagnostic instead of suppressing or asserting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Certain,
    Inconclusive,
}

impl Confidence {
    pub fn is_certain(self) -> bool {
        matches!(self, Confidence::Certain)
    }

    /// Combine two confidences: anything touched by an inconclusive step is
    /// itself inconclusive.
    pub fn and(self, other: Confidence) -> Confidence {
        if self.is_certain() && other.is_certain() {
            Confidence::Certain
        } else {
            Confidence::Inconclusive
        }
    }
}

/// Depth bound for recursive structural comparison of expressions.
pub const MAX_EXPR_DEPTH: usize = 100;

/// Depth bound for the forward token walk across scopes.
pub const MAX_WALK_DEPTH: usize = 1000;

/// Depth budget when resolving reference-returning call chains.
pub const MAX_REFERENCE_DEPTH: usize = 20;
