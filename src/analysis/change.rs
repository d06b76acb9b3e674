//! Variable-change classification: does "something happening here" mutate
//! the value a token occurrence denotes?
//!
//! The classifier climbs dereference/member chains from the occurrence,
//! counting indirection, then judges the innermost structural context.
//! Unknown call targets default to "changed": false positives here are
//! suppressed findings downstream, false negatives are wrong findings.

use super::AnalysisContext;
use crate::core::NodeId;
use crate::library::ContainerAction;

/// Is the value denoted by `occurrence` (at `indirect` dereferences) changed
/// at this program point? `cpp_rules` enables C++ container-method reasoning.
pub fn is_variable_changed(
    ctx: &AnalysisContext,
    occurrence: NodeId,
    indirect: usize,
    cpp_rules: bool,
) -> bool {
    let arena = ctx.arena;

    // const at the requested indirection level cannot be changed
    if indirect == 0 {
        if let Some(var) = ctx.variable_of(occurrence) {
            if var.is_const {
                return false;
            }
        }
    }

    // Climb through the chains that merely re-address the same storage.
    let mut tok = occurrence;
    let mut level = 0usize;
    loop {
        let Some(parent) = arena.parent(tok) else {
            return false;
        };
        match arena.sym(parent) {
            "*" if arena.is_unary_op(parent, "*") => {
                level += 1;
                tok = parent;
            }
            "[" if arena.op1(parent) == Some(tok) => {
                level += 1;
                tok = parent;
            }
            "->" if arena.op1(parent) == Some(tok) => {
                level += 1;
                tok = parent;
            }
            "." if arena.op1(parent) == Some(tok) => {
                tok = parent;
            }
            "(" if arena.node(parent).flags.cast => {
                tok = parent;
            }
            _ => break,
        }
    }

    let Some(parent) = arena.parent(tok) else {
        return false;
    };

    if arena.is_assignment_op(parent) && arena.op1(parent) == Some(tok) {
        return level == indirect;
    }
    if arena.is_inc_dec(parent) {
        return level == indirect;
    }
    // &x handed somewhere: if it ends up as a call argument, ask the call;
    // anything else taking the address is assumed to write through it.
    if arena.is_unary_op(parent, "&") {
        if let Some((call, index)) = enclosing_call_argument(ctx, parent) {
            return is_variable_changed_by_call(ctx, call, index, cpp_rules);
        }
        return true;
    }
    if let Some((call, index)) = enclosing_call_argument(ctx, tok) {
        // By-value arguments cannot change the caller's variable
        if indirect == 0 && level == 0 && !is_reference_bindable(ctx, call, index) {
            return false;
        }
        return is_variable_changed_by_call(ctx, call, index, cpp_rules);
    }
    // Receiver of a method call: the climb left `tok` at the `.`/`->` node
    // of `obj.method(..)`
    if cpp_rules
        && matches!(arena.sym(tok), "." | "->")
        && arena.sym(parent) == "("
        && arena.op1(parent) == Some(tok)
    {
        if let Some(member) = arena.op2(tok) {
            return match ctx.library.container_action(arena.sym(member)) {
                Some(ContainerAction::Mutating) => true,
                Some(ContainerAction::Observing) => false,
                None => true,
            };
        }
    }
    false
}

/// Could the callee bind argument `index` by reference at all?
fn is_reference_bindable(ctx: &AnalysisContext, call: NodeId, index: usize) -> bool {
    match ctx.callee_of(call).and_then(|f| f.params.get(index)) {
        Some(param) => param.is_reference || param.is_pointer,
        // Unknown callee: cannot rule it out
        None => true,
    }
}

/// Change classification for an expression passed as call argument `index`.
///
/// Consults, in order: the resolved callee's parameter shape, the container
/// action tables for method calls, and the library argument-direction
/// metadata; defaults to "changed" when nothing proves otherwise.
pub fn is_variable_changed_by_call(
    ctx: &AnalysisContext,
    call: NodeId,
    index: usize,
    cpp_rules: bool,
) -> bool {
    if let Some(func) = ctx.callee_of(call) {
        if let Some(param) = func.params.get(index) {
            return param.can_mutate_argument();
        }
    }
    if let Some(name) = ctx.callee_name(call) {
        if cpp_rules {
            match ctx.library.container_action(name) {
                Some(ContainerAction::Observing) => return false,
                Some(ContainerAction::Mutating) => return true,
                None => {}
            }
        }
        if let Some(dir) = ctx.library.arg_direction(name, index) {
            return dir.writes();
        }
    }
    true
}

/// Locate the call node and 0-based argument position containing `tok`,
/// if `tok`'s expression is (part of) a call argument.
pub(crate) fn enclosing_call_argument(
    ctx: &AnalysisContext,
    tok: NodeId,
) -> Option<(NodeId, usize)> {
    let arena = ctx.arena;
    let mut cur = tok;
    // Climb out of the argument expression to the comma tree / call paren
    loop {
        let parent = arena.parent(cur)?;
        match arena.sym(parent) {
            "," => {
                cur = parent;
            }
            "(" if !arena.node(parent).flags.cast && arena.op1(parent).is_some() => {
                // Not an argument if we climbed in from the callee side
                if arena.op1(parent) == Some(cur) {
                    return None;
                }
                let args = arena.op2(parent)?;
                return Some((parent, argument_index(ctx, args, tok)?));
            }
            _ => {
                cur = parent;
            }
        }
    }
}

/// Position of the argument containing `tok` in a comma tree.
fn argument_index(ctx: &AnalysisContext, args: NodeId, tok: NodeId) -> Option<usize> {
    let mut flat = Vec::new();
    flatten_commas(ctx, args, &mut flat);
    flat.iter()
        .position(|&arg| ctx.arena.has_operand(arg, tok))
}

fn flatten_commas(ctx: &AnalysisContext, id: NodeId, out: &mut Vec<NodeId>) {
    if ctx.arena.sym(id) == "," {
        if let (Some(l), Some(r)) = (ctx.arena.op1(id), ctx.arena.op2(id)) {
            flatten_commas(ctx, l, out);
            flatten_commas(ctx, r, out);
            return;
        }
    }
    out.push(id);
}
