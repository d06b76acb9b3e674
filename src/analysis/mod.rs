//! The analysis kernel: expression equivalence, alias analysis, forward
//! reachability and the variable-change classifier.
//!
//! Everything here is a total function over read-only borrows of the node
//! arena and symbol table. The kernel never returns `Err` and never panics;
//! "cannot determine" is expressed as [`AnalysisOutcome::Bailout`], `false`,
//! or [`Confidence::Inconclusive`], all of which callers must treat as
//! silence, never as evidence for a finding.

pub mod alias;
pub mod change;
pub mod equivalence;
pub mod forward;

use crate::ast::{NodeArena, NodeKind};
use crate::core::{Confidence, NodeId, VarId};
use crate::library::LibraryConfig;
use crate::symbols::{Function, SymbolTable, Variable};
use std::collections::BTreeSet;

pub use alias::{follow_all_references, get_parent_lifetime, is_alias_of, ReferenceToken};
pub use change::{is_variable_changed, is_variable_changed_by_call};
pub use equivalence::{is_opposite_expression, is_same_expression, is_without_side_effects};
pub use forward::ForwardAnalyzer;

/// Read-only view of everything an analysis call needs.
///
/// Passed explicitly to every entry point; the kernel keeps no ambient or
/// global state.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub arena: &'a NodeArena,
    pub symbols: &'a SymbolTable,
    pub library: &'a LibraryConfig,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        arena: &'a NodeArena,
        symbols: &'a SymbolTable,
        library: &'a LibraryConfig,
    ) -> Self {
        Self {
            arena,
            symbols,
            library,
        }
    }

    /// Variable record for the token at `id`, if the token is resolved.
    pub fn variable_of(&self, id: NodeId) -> Option<&'a Variable> {
        self.arena
            .node(id)
            .variable_id
            .and_then(|v| self.symbols.variable(v))
    }

    /// Resolved callee of a call node (`(` with an operand), when the callee
    /// is a plain name with a known definition or prototype.
    pub fn callee_of(&self, call: NodeId) -> Option<&'a Function> {
        let name = self.callee_name(call)?;
        self.symbols.function(name)
    }

    /// Name of the called function or method for a call node.
    pub fn callee_name(&self, call: NodeId) -> Option<&'a str> {
        let callee = self.arena.op1(call)?;
        match self.arena.sym(callee) {
            // obj.method(..) / ptr->method(..): the method name
            "." | "->" => {
                let member = self.arena.op2(callee)?;
                Some(self.arena.sym(member))
            }
            _ if self.arena.is_name(callee) => Some(self.arena.sym(callee)),
            _ => None,
        }
    }
}

/// How the forward walk interprets interactions (see the engine docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Looking for a provable overwrite of the expression
    Reassign,
    /// Looking for any read of the current value
    UnusedValue,
    /// Tracking whether a known value survives a token range
    ValueFlow,
}

/// Classification of the first observable interaction with an expression.
///
/// Produced fresh per top-level call; may be upgraded while it propagates
/// (e.g. `Break` resolved against the enclosing loop) but never downgraded
/// from `Bailout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The walk reached the end without any interaction
    None,
    /// The current value is read
    Read,
    /// The expression is overwritten at the given assignment
    Write(NodeId),
    /// A `break` at the given token exits the enclosing breakable scope
    Break(NodeId),
    /// Control leaves the function without touching the expression
    Return,
    /// Unmodeled construct; no conclusion may be drawn
    Bailout(Option<NodeId>),
}

impl AnalysisOutcome {
    pub fn is_bailout(self) -> bool {
        matches!(self, AnalysisOutcome::Bailout(_))
    }

    /// Outcomes that end the walk where they occur.
    pub fn is_terminal(self) -> bool {
        !matches!(self, AnalysisOutcome::None)
    }
}

/// Per-call memoization, scoped to a single top-level
/// [`ForwardAnalyzer::analyze`] invocation.
///
/// Not meant to be reused across calls; the aliasing answer is only valid
/// for the expression and start token of the call that computed it.
#[derive(Debug, Default)]
pub struct Cache {
    possibly_aliased: Option<bool>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized [`alias::possibly_aliased`] for this call.
    pub fn possibly_aliased(
        &mut self,
        ctx: &AnalysisContext,
        expr: NodeId,
        start: NodeId,
    ) -> bool {
        *self
            .possibly_aliased
            .get_or_insert_with(|| alias::possibly_aliased(ctx, expr, start))
    }
}

/// The free, non-member variable identities of an expression tree.
#[derive(Debug, Clone)]
pub struct VarIdSet {
    pub ids: BTreeSet<VarId>,
    /// Every variable in the set has local storage
    pub all_local: bool,
}

impl VarIdSet {
    /// Collect the variable ids under `expr`. `None` when an identifier
    /// cannot be resolved (and is not a member or callee name): analysis
    /// must bail out rather than guess.
    pub fn of(ctx: &AnalysisContext, expr: NodeId) -> Option<VarIdSet> {
        let mut set = VarIdSet {
            ids: BTreeSet::new(),
            all_local: true,
        };
        if set.collect(ctx, expr) {
            Some(set)
        } else {
            None
        }
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.ids.contains(&id)
    }

    fn collect(&mut self, ctx: &AnalysisContext, id: NodeId) -> bool {
        let node = ctx.arena.node(id);
        if node.kind == NodeKind::Name {
            match node.variable_id {
                Some(var_id) => {
                    let Some(var) = ctx.symbols.variable(var_id) else {
                        return false;
                    };
                    if !var.has_local_storage() || var.is_volatile {
                        self.all_local = false;
                    }
                    self.ids.insert(var_id);
                }
                None if self.is_member_or_callee(ctx, id) => {}
                None => return false,
            }
        }
        if let Some(op1) = node.operand1 {
            if !self.collect(ctx, op1) {
                return false;
            }
        }
        if let Some(op2) = node.operand2 {
            if !self.collect(ctx, op2) {
                return false;
            }
        }
        true
    }

    /// Unresolved names that are still fine: member names after `.`/`->`
    /// and callee names of calls.
    fn is_member_or_callee(&self, ctx: &AnalysisContext, id: NodeId) -> bool {
        let Some(parent) = ctx.arena.parent(id) else {
            return false;
        };
        match ctx.arena.sym(parent) {
            "." | "->" => ctx.arena.op2(parent) == Some(id),
            "(" => ctx.arena.op1(parent) == Some(id),
            _ => false,
        }
    }
}

/// Payload of an alias query: the answer plus how much to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasAnswer {
    pub aliased: bool,
    pub confidence: Confidence,
}
