//! Alias and lifetime analysis: is a write through one symbolic path
//! observable through another?
//!
//! Every answer leans conservative: ambiguity propagates as "cannot prove
//! no-alias", never as proven safety. Inconclusive steps are tagged with
//! [`Confidence::Inconclusive`] instead of being dropped.

use super::{equivalence, AliasAnswer, AnalysisContext, VarIdSet};
use crate::ast::ScopeKind;
use crate::core::{Confidence, NodeId, ScopeId, VarId, MAX_EXPR_DEPTH, MAX_REFERENCE_DEPTH};

/// One storage location a reference-typed expression may denote, with the
/// substitution chain that led there.
#[derive(Debug, Clone)]
pub struct ReferenceToken {
    pub token: NodeId,
    /// Each step: the token where a substitution happened and why
    pub error_path: Vec<(NodeId, String)>,
    pub confidence: Confidence,
}

/// Resolve a reference-typed expression to the underlying storage locations
/// it may denote.
///
/// Follows reference-variable initializers, ternary-selected references
/// (`consider_ternary`), and reference-returning functions with
/// actual-for-formal substitution, bounded by [`MAX_REFERENCE_DEPTH`].
pub fn follow_all_references(
    ctx: &AnalysisContext,
    node: NodeId,
    consider_ternary: bool,
    allow_inconclusive: bool,
) -> Vec<ReferenceToken> {
    let mut out = Vec::new();
    follow_rec(
        ctx,
        node,
        consider_ternary,
        allow_inconclusive,
        &Vec::new(),
        Confidence::Certain,
        0,
        &mut out,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn follow_rec(
    ctx: &AnalysisContext,
    node: NodeId,
    consider_ternary: bool,
    allow_inconclusive: bool,
    path: &[(NodeId, String)],
    confidence: Confidence,
    depth: usize,
    out: &mut Vec<ReferenceToken>,
) {
    let arena = ctx.arena;
    if depth > MAX_REFERENCE_DEPTH {
        out.push(ReferenceToken {
            token: node,
            error_path: path.to_vec(),
            confidence: Confidence::Inconclusive,
        });
        return;
    }

    // Reference variable: substitute the referent
    if arena.is_name(node) {
        if let Some(var) = ctx.variable_of(node) {
            if var.is_reference {
                if let Some(init) = var.initializer {
                    let mut next_path = path.to_vec();
                    next_path.push((node, format!("{} is bound here", var.name)));
                    follow_rec(
                        ctx,
                        init,
                        consider_ternary,
                        allow_inconclusive,
                        &next_path,
                        confidence,
                        depth + 1,
                        out,
                    );
                    return;
                }
            }
        }
    }

    // Ternary: union of both branches
    if consider_ternary && arena.sym(node) == "?" {
        if let Some(colon) = arena.op2(node) {
            if arena.sym(colon) == ":" {
                if !allow_inconclusive {
                    // Cannot commit to either branch; report the expression
                    // itself unresolved.
                    out.push(ReferenceToken {
                        token: node,
                        error_path: path.to_vec(),
                        confidence,
                    });
                    return;
                }
                let mut next_path = path.to_vec();
                next_path.push((node, "condition selects the reference".to_string()));
                for branch in [arena.op1(colon), arena.op2(colon)].into_iter().flatten() {
                    follow_rec(
                        ctx,
                        branch,
                        consider_ternary,
                        allow_inconclusive,
                        &next_path,
                        Confidence::Inconclusive,
                        depth + 1,
                        out,
                    );
                }
                return;
            }
        }
    }

    // Reference-returning call: resolve each return statement, substituting
    // actual arguments for reference-typed formal parameters.
    if arena.sym(node) == "(" && !arena.node(node).flags.cast {
        if let Some(func) = ctx.callee_of(node) {
            if func.returns_reference && !func.return_statements.is_empty() {
                let multi = func.return_statements.len() > 1;
                let conf = if multi {
                    Confidence::Inconclusive
                } else {
                    confidence
                };
                if multi && !allow_inconclusive {
                    out.push(ReferenceToken {
                        token: node,
                        error_path: path.to_vec(),
                        confidence,
                    });
                    return;
                }
                for &ret in &func.return_statements {
                    let Some(ret_expr) = return_expression(ctx, ret) else {
                        continue;
                    };
                    let mut next_path = path.to_vec();
                    next_path.push((ret, format!("{} returns a reference here", func.name)));
                    match substitute_actual(ctx, node, func, ret_expr) {
                        Some(actual) => follow_rec(
                            ctx,
                            actual,
                            consider_ternary,
                            allow_inconclusive,
                            &next_path,
                            conf,
                            depth + 1,
                            out,
                        ),
                        None => follow_rec(
                            ctx,
                            ret_expr,
                            consider_ternary,
                            allow_inconclusive,
                            &next_path,
                            conf,
                            depth + 1,
                            out,
                        ),
                    }
                }
                return;
            }
        }
    }

    out.push(ReferenceToken {
        token: node,
        error_path: path.to_vec(),
        confidence,
    });
}

/// Root of the expression after a `return` keyword, if any.
fn return_expression(ctx: &AnalysisContext, ret: NodeId) -> Option<NodeId> {
    let next = ctx.arena.next(ret)?;
    if ctx.arena.sym(next) == ";" {
        return None;
    }
    Some(ctx.arena.expr_root(next))
}

/// When a returned expression is a reference-typed formal parameter,
/// find the actual argument bound to it at `call`.
fn substitute_actual(
    ctx: &AnalysisContext,
    call: NodeId,
    func: &crate::symbols::Function,
    ret_expr: NodeId,
) -> Option<NodeId> {
    let var_id = ctx.arena.node(ret_expr).variable_id?;
    let index = func
        .params
        .iter()
        .position(|p| p.is_reference && p.var_id == Some(var_id))?;
    let args = ctx.arena.op2(call)?;
    let mut flat = Vec::new();
    flatten_args(ctx, args, &mut flat);
    flat.get(index).copied()
}

fn flatten_args(ctx: &AnalysisContext, id: NodeId, out: &mut Vec<NodeId>) {
    if ctx.arena.sym(id) == "," {
        if let (Some(l), Some(r)) = (ctx.arena.op1(id), ctx.arena.op2(id)) {
            flatten_args(ctx, l, out);
            flatten_args(ctx, r, out);
            return;
        }
    }
    out.push(id);
}

/// Does any local-lifetime value attached to `node` point back at `var_id`?
pub fn is_alias_of(ctx: &AnalysisContext, node: NodeId, var_id: VarId) -> AliasAnswer {
    let arena = ctx.arena;

    // Direct address-of inside the expression
    if subtree_takes_address_of(ctx, node, var_id) {
        return AliasAnswer {
            aliased: true,
            confidence: Confidence::Certain,
        };
    }

    // Reference chains
    for reference in follow_all_references(ctx, node, true, true) {
        if arena.node(reference.token).variable_id == Some(var_id) && reference.token != node {
            return AliasAnswer {
                aliased: true,
                confidence: reference.confidence,
            };
        }
    }

    // Pointer provenance: a pointer variable whose initializer we cannot
    // resolve might still point at the variable.
    if let Some(var) = ctx.variable_of(node) {
        if var.is_pointer {
            match var.initializer {
                Some(init) if subtree_takes_address_of(ctx, init, var_id) => {
                    return AliasAnswer {
                        aliased: true,
                        confidence: Confidence::Certain,
                    };
                }
                Some(init) if subtree_mentions(ctx, init, var_id) => {
                    // Array decay or arithmetic over the variable
                    return AliasAnswer {
                        aliased: true,
                        confidence: Confidence::Certain,
                    };
                }
                Some(init) if !contains_opaque_call(ctx, init) => {
                    // Seated on something unrelated and resolvable
                }
                _ => {
                    return AliasAnswer {
                        aliased: false,
                        confidence: Confidence::Inconclusive,
                    };
                }
            }
        }
    }

    AliasAnswer {
        aliased: false,
        confidence: Confidence::Certain,
    }
}

// The subtree walks below are depth-bounded; a malformed operand chain past
// the limit answers conservatively (aliased / opaque) instead of recursing.

fn subtree_takes_address_of(ctx: &AnalysisContext, root: NodeId, var_id: VarId) -> bool {
    address_of_rec(ctx, root, var_id, 0)
}

fn address_of_rec(ctx: &AnalysisContext, root: NodeId, var_id: VarId, depth: usize) -> bool {
    let arena = ctx.arena;
    if arena.is_unary_op(root, "&") {
        if let Some(op) = arena.op1(root) {
            if arena.node(op).variable_id == Some(var_id) {
                return true;
            }
        }
    }
    if depth > MAX_EXPR_DEPTH {
        return true;
    }
    [arena.op1(root), arena.op2(root)]
        .into_iter()
        .flatten()
        .any(|c| address_of_rec(ctx, c, var_id, depth + 1))
}

/// Any call in the subtree whose callee has no visible definition.
fn contains_opaque_call(ctx: &AnalysisContext, root: NodeId) -> bool {
    opaque_call_rec(ctx, root, 0)
}

fn opaque_call_rec(ctx: &AnalysisContext, root: NodeId, depth: usize) -> bool {
    let arena = ctx.arena;
    if arena.sym(root) == "("
        && !arena.node(root).flags.cast
        && arena.op1(root).is_some()
        && ctx.callee_of(root).is_none()
    {
        return true;
    }
    if depth > MAX_EXPR_DEPTH {
        return true;
    }
    [arena.op1(root), arena.op2(root)]
        .into_iter()
        .flatten()
        .any(|c| opaque_call_rec(ctx, c, depth + 1))
}

fn subtree_mentions(ctx: &AnalysisContext, root: NodeId, var_id: VarId) -> bool {
    mentions_rec(ctx, root, var_id, 0)
}

fn mentions_rec(ctx: &AnalysisContext, root: NodeId, var_id: VarId, depth: usize) -> bool {
    if ctx.arena.node(root).variable_id == Some(var_id) {
        return true;
    }
    if depth > MAX_EXPR_DEPTH {
        return true;
    }
    [ctx.arena.op1(root), ctx.arena.op2(root)]
        .into_iter()
        .flatten()
        .any(|c| mentions_rec(ctx, c, var_id, depth + 1))
}

/// Outermost object whose lifetime bounds the member denoted by `node`.
///
/// Walks down member-access chains; a pointer or reference link breaks
/// containment (the pointee may outlive or be independent of the immediate
/// container), so the walk stops there and reports that base.
pub fn get_parent_lifetime(ctx: &AnalysisContext, node: NodeId) -> Option<NodeId> {
    let arena = ctx.arena;
    let mut cur = node;
    loop {
        match arena.sym(cur) {
            "." | "[" => {
                let base = arena.op1(cur)?;
                if let Some(var) = ctx.variable_of(base) {
                    if var.is_pointer || var.is_reference {
                        return Some(base);
                    }
                }
                cur = base;
            }
            // The pointed-to object is independent of the pointer's owner
            "->" => return arena.op1(cur),
            _ => return Some(cur),
        }
    }
}

/// Backward scan: could `expr` have been aliased before `start`?
///
/// True when the expression is reached through a dereference, or when an
/// earlier token in the enclosing function takes its address, binds a
/// reference to it, seats a pointer on it, or passes it to a call by
/// non-const reference (the call check only fires in scopes with more than
/// one local, since a single-variable scope has nothing to alias with).
pub fn possibly_aliased(ctx: &AnalysisContext, expr: NodeId, start: NodeId) -> bool {
    let arena = ctx.arena;

    // A value assigned through a dereference is aliased by construction.
    match arena.sym(expr) {
        "*" if arena.is_unary_op(expr, "*") => return true,
        "[" if arena.op1(expr).is_some() => {
            if let Some(base) = arena.op1(expr) {
                if ctx.variable_of(base).is_some_and(|v| v.is_pointer) {
                    return true;
                }
            }
        }
        _ => {}
    }

    let Some(var_ids) = VarIdSet::of(ctx, expr) else {
        return true;
    };
    let stop = arena.enclosing_function(start).map(|s| s.body_start);

    let mut tok = Some(start);
    while let Some(t) = tok {
        if Some(t) == stop {
            break;
        }

        // & expr, or &x for any variable of the expression
        if arena.is_unary_op(t, "&") && !arena.node(t).flags.cast {
            let op = arena.op1(t);
            if equivalence::is_same_expression(ctx, false, op, Some(expr), false, false) {
                return true;
            }
            if op.is_some_and(|o| {
                arena
                    .node(o)
                    .variable_id
                    .is_some_and(|v| var_ids.contains(v))
            }) {
                return true;
            }
        }

        // Reference bound to (part of) the expression
        if let Some(var) = ctx.variable_of(t) {
            if var.is_reference && var.decl_node == Some(t) {
                if let Some(init) = var.initializer {
                    if var_ids.ids.iter().any(|&v| subtree_mentions(ctx, init, v)) {
                        return true;
                    }
                }
            }
            // Pointer seated on the expression (address-of or array decay)
            if var.is_pointer && var.decl_node == Some(t) {
                if let Some(init) = var.initializer {
                    if var_ids.ids.iter().any(|&v| subtree_mentions(ctx, init, v)) {
                        return true;
                    }
                }
            }
        }

        // Call passing the expression by non-const reference
        if arena.sym(t) == "(" && !arena.node(t).flags.cast && arena.op1(t).is_some() {
            if let Some(args) = arena.op2(t) {
                let mut flat = Vec::new();
                flatten_args(ctx, args, &mut flat);
                for (index, &arg) in flat.iter().enumerate() {
                    if !var_ids.ids.iter().any(|&v| subtree_mentions(ctx, arg, v)) {
                        continue;
                    }
                    if !scope_has_sibling_locals(ctx, start) {
                        continue;
                    }
                    if call_can_bind_mutably(ctx, t, index) {
                        return true;
                    }
                }
            }
        }

        tok = arena.previous(t);
    }
    false
}

fn call_can_bind_mutably(ctx: &AnalysisContext, call: NodeId, index: usize) -> bool {
    if let Some(func) = ctx.callee_of(call) {
        return func
            .params
            .get(index)
            .is_some_and(|p| p.can_mutate_argument());
    }
    if let Some(name) = ctx.callee_name(call) {
        if let Some(dir) = ctx.library.arg_direction(name, index) {
            return dir.writes();
        }
    }
    // Unknown callee: cannot prove the binding is const
    true
}

/// More than one local variable lives in the function around `at`; with a
/// single local there is nothing else a reference argument could alias.
fn scope_has_sibling_locals(ctx: &AnalysisContext, at: NodeId) -> bool {
    let Some(func_scope) = ctx
        .arena
        .enclosing_scope(ctx.arena.node(at).scope, |k| k == ScopeKind::Function)
    else {
        return true;
    };
    let count = ctx
        .symbols
        .variables()
        .filter(|v| {
            (v.is_local || v.is_argument) && scope_within(ctx, v.scope, func_scope)
        })
        .count();
    count > 1
}

fn scope_within(ctx: &AnalysisContext, mut scope: ScopeId, ancestor: ScopeId) -> bool {
    loop {
        if scope == ancestor {
            return true;
        }
        match ctx.arena.scope(scope).nested_in {
            Some(parent) => scope = parent,
            None => return false,
        }
    }
}
