//! Expression equivalence: does one tree compute the same (or the opposite
//! boolean) value as another?
//!
//! Equality is structural with three refinements: known-value short circuits
//! (gated by macro sensitivity), commutative operand matching for the
//! operators where order cannot matter, and optional variable/reference
//! following that substitutes a provably-unchanged initializer before
//! comparing. Purity gates call comparison: two textually identical calls of
//! an impure function are not the same value.

use super::{change, AnalysisContext};
use crate::ast::NodeKind;
use crate::core::{NodeId, MAX_EXPR_DEPTH};

/// Operators for which `a op b` equals `b op a`.
const COMMUTATIVE: &[&str] = &["|", "||", "+", "*", "&", "&&", "^", "==", "!="];

/// Structural-value equality of two expression trees.
///
/// `macro_sensitive` refuses to equate differently-expanded macro tokens even
/// when their values match. `pure` requires call purity before two calls are
/// treated as the same value. `follow_variables` substitutes local initializer
/// expressions (and follows references) when the root symbols differ.
pub fn is_same_expression(
    ctx: &AnalysisContext,
    macro_sensitive: bool,
    t1: Option<NodeId>,
    t2: Option<NodeId>,
    pure: bool,
    follow_variables: bool,
) -> bool {
    same_rec(ctx, macro_sensitive, t1, t2, pure, follow_variables, 0)
}

fn same_rec(
    ctx: &AnalysisContext,
    macro_sensitive: bool,
    t1: Option<NodeId>,
    t2: Option<NodeId>,
    pure: bool,
    follow_variables: bool,
    depth: usize,
) -> bool {
    let (a, b) = match (t1, t2) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if a == b {
        return true;
    }
    if depth > MAX_EXPR_DEPTH {
        return false;
    }
    let arena = ctx.arena;
    let n1 = arena.node(a);
    let n2 = arena.node(b);

    // Known-value short circuit, unless a macro expansion is involved and the
    // caller asked to be sensitive to that.
    if let (Some(v1), Some(v2)) = (n1.known_int_value, n2.known_int_value) {
        if !(macro_sensitive && (n1.flags.expanded_macro || n2.flags.expanded_macro)) {
            return v1 == v2;
        }
    }

    // Matching structural ids encode operand shape, variable identity and
    // folded values, so they decide equality outright when the caller does
    // not care about purity, macro provenance or initializer following.
    if !macro_sensitive && !pure && !follow_variables {
        if let (Some(e1), Some(e2)) = (n1.expression_id, n2.expression_id) {
            if e1 == e2 {
                return true;
            }
        }
    }

    if n1.symbol != n2.symbol {
        if follow_variables {
            if let Some(sub) = followed_initializer(ctx, a) {
                return same_rec(ctx, macro_sensitive, Some(sub), Some(b), pure, true, depth + 1);
            }
            if let Some(sub) = followed_initializer(ctx, b) {
                return same_rec(ctx, macro_sensitive, Some(a), Some(sub), pure, true, depth + 1);
            }
        }
        return false;
    }

    if macro_sensitive && n1.flags.expanded_macro != n2.flags.expanded_macro {
        return false;
    }
    if n1.flags.template_arg != n2.flags.template_arg
        || n1.flags.is_unsigned != n2.flags.is_unsigned
        || n1.flags.is_long != n2.flags.is_long
        || n1.flags.cast != n2.flags.cast
    {
        return false;
    }

    match n1.kind {
        NodeKind::Name => {
            // Resolved names compare by identity; unresolved member names by
            // spelling, which the symbol check above already did.
            return n1.variable_id == n2.variable_id;
        }
        NodeKind::Number => return n1.symbol == n2.symbol,
        _ => {}
    }

    if n1.flags.cast {
        // Compare the type token sequence inside the parentheses.
        if !same_token_range(ctx, a, b) {
            return false;
        }
    } else if n1.symbol == "(" && n1.operand1.is_some() {
        // Function or method call: re-evaluating an impure callee is not the
        // same value.
        if pure && !is_pure_call(ctx, a) {
            return false;
        }
    }

    let same = |x: Option<NodeId>, y: Option<NodeId>| {
        same_rec(ctx, macro_sensitive, x, y, pure, follow_variables, depth + 1)
    };
    if same(n1.operand1, n2.operand1) && same(n1.operand2, n2.operand2) {
        return true;
    }
    if COMMUTATIVE.contains(&n1.symbol.as_str())
        && n1.operand2.is_some()
        && n2.operand2.is_some()
        && same(n1.operand1, n2.operand2)
        && same(n1.operand2, n2.operand1)
    {
        return true;
    }
    false
}

/// Initializer substitution for `follow_variables`.
///
/// References are always followed to their referent. A plain local is
/// followed only when nothing can have changed it between declaration and
/// use: `const`, or no mutating/address-taking occurrence in between.
fn followed_initializer(ctx: &AnalysisContext, id: NodeId) -> Option<NodeId> {
    if !ctx.arena.is_name(id) {
        return None;
    }
    let var = ctx.variable_of(id)?;
    let init = var.initializer?;
    if var.is_reference {
        return Some(init);
    }
    if !var.has_local_storage() || var.is_volatile {
        return None;
    }
    if var.is_const {
        return Some(init);
    }
    let decl = var.decl_node?;
    if !ctx.arena.precedes(decl, id) {
        return None;
    }
    // Scan the stream between declaration and use for mutation or aliasing.
    let mut tok = ctx.arena.next(decl);
    while let Some(t) = tok {
        if t == id {
            break;
        }
        if ctx.arena.node(t).variable_id == Some(var.var_id) {
            if change::is_variable_changed(ctx, t, 0, true) {
                return None;
            }
            if ctx
                .arena
                .parent(t)
                .is_some_and(|p| ctx.arena.is_unary_op(p, "&"))
            {
                return None;
            }
        }
        tok = ctx.arena.next(t);
    }
    Some(init)
}

/// Token-by-token comparison of two bracketed sequences (cast types,
/// template argument lists).
fn same_token_range(ctx: &AnalysisContext, open1: NodeId, open2: NodeId) -> bool {
    let (Some(close1), Some(close2)) = (ctx.arena.link(open1), ctx.arena.link(open2)) else {
        return false;
    };
    let mut iter1 = ctx.arena.stream(open1, close1);
    let mut iter2 = ctx.arena.stream(open2, close2);
    loop {
        match (iter1.next(), iter2.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if ctx.arena.sym(x) == ctx.arena.sym(y) => {}
            _ => return false,
        }
    }
}

/// Purity of a call node: established via the resolved callee's const/pure
/// attributes, the library purity tables, or observing container actions.
fn is_pure_call(ctx: &AnalysisContext, call: NodeId) -> bool {
    if let Some(func) = ctx.callee_of(call) {
        if func.is_pure || func.is_const {
            return true;
        }
    }
    let Some(name) = ctx.callee_name(call) else {
        return false;
    };
    if ctx.library.is_pure_function(name) {
        return true;
    }
    use crate::library::ContainerAction;
    let is_method = ctx
        .arena
        .op1(call)
        .is_some_and(|c| matches!(ctx.arena.sym(c), "." | "->"));
    is_method && ctx.library.container_action(name) == Some(ContainerAction::Observing)
}

fn invert_comparison(sym: &str) -> Option<&'static str> {
    Some(match sym {
        "<" => ">=",
        "<=" => ">",
        ">" => "<=",
        ">=" => "<",
        "==" => "!=",
        "!=" => "==",
        _ => return None,
    })
}

fn swap_comparison(sym: &str) -> &str {
    match sym {
        "<" => ">",
        "<=" => ">=",
        ">" => "<",
        ">=" => "<=",
        other => other,
    }
}

/// Integer solution interval of `x OP v`; `None` for operators that do not
/// describe one contiguous interval.
fn comparison_interval(op: &str, v: i64) -> Option<(i64, i64)> {
    Some(match op {
        "<" => (i64::MIN, v.checked_sub(1)?),
        "<=" => (i64::MIN, v),
        ">" => (v.checked_add(1)?, i64::MAX),
        ">=" => (v, i64::MAX),
        "==" => (v, v),
        _ => return None,
    })
}

fn intervals_exclusive(op1: &str, v1: i64, op2: &str, v2: i64) -> bool {
    match (comparison_interval(op1, v1), comparison_interval(op2, v2)) {
        (Some((lo1, hi1)), Some((lo2, hi2))) => lo1 > hi2 || lo2 > hi1,
        _ => false,
    }
}

/// Do the two boolean expressions exclude each other?
///
/// Handles negation against the same expression, comparison-operator
/// inversion (also with swapped operands), known-bound incompatibility
/// (`x < 5` vs `x >= 10`), and distribution of `&&`/`||` over a shared
/// operand with an opposite remainder.
pub fn is_opposite_expression(
    ctx: &AnalysisContext,
    t1: Option<NodeId>,
    t2: Option<NodeId>,
    pure: bool,
    follow_variables: bool,
) -> bool {
    opposite_rec(ctx, t1, t2, pure, follow_variables, 0)
}

fn opposite_rec(
    ctx: &AnalysisContext,
    t1: Option<NodeId>,
    t2: Option<NodeId>,
    pure: bool,
    follow_variables: bool,
    depth: usize,
) -> bool {
    let (Some(a), Some(b)) = (t1, t2) else {
        return false;
    };
    if depth > MAX_EXPR_DEPTH {
        return false;
    }
    let arena = ctx.arena;
    let same = |x: Option<NodeId>, y: Option<NodeId>| {
        same_rec(ctx, true, x, y, pure, follow_variables, depth + 1)
    };
    let opp = |x: Option<NodeId>, y: Option<NodeId>| {
        opposite_rec(ctx, x, y, pure, follow_variables, depth + 1)
    };

    // `!x` against `x`, `!!x` against `!x`, and `!x` against `x != 0`
    for (neg, other) in [(a, b), (b, a)] {
        if arena.is_unary_op(neg, "!") {
            let inner = arena.op1(neg);
            if same(inner, Some(other)) {
                return true;
            }
            if arena.sym(other) == "!="
                && same(inner, arena.op1(other))
                && arena.op2(other).and_then(|r| arena.known_int(r)) == Some(0)
            {
                return true;
            }
        }
    }

    if arena.is_comparison_op(a) && arena.is_comparison_op(b) {
        let (l1, r1) = (arena.op1(a), arena.op2(a));
        let (l2, r2) = (arena.op1(b), arena.op2(b));
        let sym1 = arena.sym(a);
        let sym2 = arena.sym(b);
        if same(l1, l2) {
            if same(r1, r2) && invert_comparison(sym1) == Some(sym2) {
                return true;
            }
            // Same left comparand against different known bounds: mutually
            // exclusive ranges are opposite in the can-never-both-hold sense.
            if let (Some(v1), Some(v2)) = (
                r1.and_then(|r| arena.known_int(r)),
                r2.and_then(|r| arena.known_int(r)),
            ) {
                if intervals_exclusive(sym1, v1, sym2, v2) {
                    return true;
                }
            }
        }
        if same(l1, r2)
            && same(r1, l2)
            && invert_comparison(swap_comparison(sym1)) == Some(sym2)
        {
            return true;
        }
        return false;
    }

    // `a && b` vs `a && !b`: shared operand, opposite remainder
    let sym1 = arena.sym(a);
    let sym2 = arena.sym(b);
    if sym1 == "&&" && sym2 == "&&" {
        let (l1, r1) = (arena.op1(a), arena.op2(a));
        let (l2, r2) = (arena.op1(b), arena.op2(b));
        return (same(l1, l2) && opp(r1, r2))
            || (same(r1, r2) && opp(l1, l2))
            || (same(l1, r2) && opp(r1, l2))
            || (same(r1, l2) && opp(l1, r2));
    }
    // De Morgan: `a && b` vs `!a || !b`
    if (sym1 == "&&" && sym2 == "||") || (sym1 == "||" && sym2 == "&&") {
        let (l1, r1) = (arena.op1(a), arena.op2(a));
        let (l2, r2) = (arena.op1(b), arena.op2(b));
        return (opp(l1, l2) && opp(r1, r2)) || (opp(l1, r2) && opp(r1, l2));
    }
    false
}

/// Can this expression be re-evaluated or elided without observable effect?
///
/// Checkers must confirm this before treating two equal expressions as
/// redundant; equality alone does not make impure calls interchangeable.
pub fn is_without_side_effects(ctx: &AnalysisContext, expr: NodeId) -> bool {
    side_effect_free_rec(ctx, expr, 0)
}

fn side_effect_free_rec(ctx: &AnalysisContext, id: NodeId, depth: usize) -> bool {
    if depth > MAX_EXPR_DEPTH {
        return false;
    }
    let arena = ctx.arena;
    if arena.is_assignment_op(id) || arena.is_inc_dec(id) {
        return false;
    }
    if matches!(arena.sym(id), "new" | "delete") {
        return false;
    }
    if arena.sym(id) == "(" && arena.op1(id).is_some() && !arena.node(id).flags.cast {
        if !is_pure_call(ctx, id) {
            return false;
        }
    }
    for child in [arena.op1(id), arena.op2(id)].into_iter().flatten() {
        if !side_effect_free_rec(ctx, child, depth + 1) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryConfig;
    use crate::parse::Program;

    fn fixture(src: &str) -> (Program, LibraryConfig) {
        (Program::parse(src).unwrap(), LibraryConfig::default())
    }

    macro_rules! ctx {
        ($prog:expr, $lib:expr) => {
            AnalysisContext::new(&$prog.arena, &$prog.symbols, &$lib)
        };
    }

    #[test]
    fn same_expression_is_reflexive() {
        let (prog, lib) = fixture("void f(int a, int b) { int x = a + b * 2; }");
        let ctx = ctx!(prog, lib);
        let plus = prog.find("+").unwrap();
        assert!(is_same_expression(&ctx, true, Some(plus), Some(plus), false, false));
    }

    #[test]
    fn commutative_operands_match_crosswise() {
        let (prog, lib) = fixture("void f(int a, int b) { int x = a + b; int y = b + a; }");
        let ctx = ctx!(prog, lib);
        let p1 = prog.find_nth("+", 0).unwrap();
        let p2 = prog.find_nth("+", 1).unwrap();
        assert!(is_same_expression(&ctx, true, Some(p1), Some(p2), false, false));
    }

    #[test]
    fn subtraction_is_not_commutative() {
        let (prog, lib) = fixture("void f(int a, int b) { int x = a - b; int y = b - a; }");
        let ctx = ctx!(prog, lib);
        let m1 = prog.find_nth("-", 0).unwrap();
        let m2 = prog.find_nth("-", 1).unwrap();
        assert!(!is_same_expression(&ctx, true, Some(m1), Some(m2), false, false));
    }

    #[test]
    fn known_values_short_circuit() {
        let (prog, lib) = fixture("void f(int a) { if (a == 0x10) { } if (a == 16) { } }");
        let ctx = ctx!(prog, lib);
        let hex = prog.find("0x10").unwrap();
        let dec = prog.find("16").unwrap();
        assert!(is_same_expression(&ctx, true, Some(hex), Some(dec), false, false));
    }

    #[test]
    fn different_variables_differ() {
        let (prog, lib) = fixture("void f(int a, int b) { int x = a; int y = b; }");
        let ctx = ctx!(prog, lib);
        let a = prog.find_pattern("a ;").unwrap();
        let b = prog.find_pattern("b ;").unwrap();
        assert!(!is_same_expression(&ctx, true, Some(a), Some(b), false, false));
    }

    #[test]
    fn follow_variables_substitutes_initializer() {
        let (prog, lib) = fixture("void f(int a) { int x = a; if (x == a) { } }");
        let ctx = ctx!(prog, lib);
        let eq = prog.find("==").unwrap();
        let x_use = prog.arena.op1(eq).unwrap();
        let a_use = prog.arena.op2(eq).unwrap();
        assert!(is_same_expression(&ctx, true, Some(x_use), Some(a_use), false, true));
        // without following, they are just different variables
        assert!(!is_same_expression(&ctx, true, Some(x_use), Some(a_use), false, false));
    }

    #[test]
    fn follow_variables_stops_at_mutation() {
        let (prog, lib) = fixture("void f(int a) { int x = a; x = 7; if (x == a) { } }");
        let ctx = ctx!(prog, lib);
        let eq = prog.find("==").unwrap();
        let x_use = prog.arena.op1(eq).unwrap();
        let a_use = prog.arena.op2(eq).unwrap();
        assert!(!is_same_expression(&ctx, true, Some(x_use), Some(a_use), false, true));
    }

    #[test]
    fn references_are_followed() {
        let (prog, lib) = fixture("void f(int a) { int& r = a; if (r == a) { } }");
        let ctx = ctx!(prog, lib);
        let eq = prog.find("==").unwrap();
        let r_use = prog.arena.op1(eq).unwrap();
        let a_use = prog.arena.op2(eq).unwrap();
        assert!(is_same_expression(&ctx, true, Some(r_use), Some(a_use), false, true));
    }

    #[test]
    fn impure_calls_are_not_interchangeable() {
        let (prog, lib) =
            fixture("void f(int a) { int x = next(a); int y = next(a); int p = strlen(a); int q = strlen(a); }");
        let ctx = ctx!(prog, lib);
        let c1 = prog.find_nth("(", 1).unwrap();
        let c2 = prog.find_nth("(", 2).unwrap();
        assert!(!is_same_expression(&ctx, true, Some(c1), Some(c2), true, false));
        // strlen is pure per the library tables
        let c3 = prog.find_nth("(", 3).unwrap();
        let c4 = prog.find_nth("(", 4).unwrap();
        assert!(is_same_expression(&ctx, true, Some(c3), Some(c4), true, false));
    }

    #[test]
    fn equal_expression_ids_do_not_bridge_impure_calls() {
        // The structural-id fast path must stay out of purity-sensitive
        // comparison: both calls share an id but re-evaluation differs.
        let (prog, lib) = fixture("void f(int a) { int x = next(a); int y = next(a); }");
        let ctx = ctx!(prog, lib);
        let c1 = prog.find_nth("(", 1).unwrap();
        let c2 = prog.find_nth("(", 2).unwrap();
        assert_eq!(
            prog.arena.node(c1).expression_id,
            prog.arena.node(c2).expression_id
        );
        assert!(!is_same_expression(&ctx, false, Some(c1), Some(c2), true, false));
        assert!(is_same_expression(&ctx, false, Some(c1), Some(c2), false, false));
    }

    #[test]
    fn opposite_comparison_inversion() {
        let (prog, lib) = fixture("void f(int a, int b) { if (a < b) { } if (a >= b) { } }");
        let ctx = ctx!(prog, lib);
        let lt = prog.find("<").unwrap();
        let ge = prog.find(">=").unwrap();
        assert!(is_opposite_expression(&ctx, Some(lt), Some(ge), false, false));
        assert!(is_opposite_expression(&ctx, Some(ge), Some(lt), false, false));
        assert!(!is_opposite_expression(&ctx, Some(lt), Some(lt), false, false));
    }

    #[test]
    fn opposite_with_swapped_operands() {
        // a < b is the opposite of b <= a
        let (prog, lib) = fixture("void f(int a, int b) { if (a < b) { } if (b <= a) { } }");
        let ctx = ctx!(prog, lib);
        let lt = prog.find("<").unwrap();
        let le = prog.find("<=").unwrap();
        assert!(is_opposite_expression(&ctx, Some(lt), Some(le), false, false));
    }

    #[test]
    fn opposite_negation() {
        let (prog, lib) = fixture("void f(int a) { if (!a) { } if (a) { } if (a != 0) { } }");
        let ctx = ctx!(prog, lib);
        let not = prog.find("!").unwrap();
        let bare = prog.find_nth("a", 2).unwrap();
        let ne = prog.find("!=").unwrap();
        assert!(is_opposite_expression(&ctx, Some(not), Some(bare), false, false));
        assert!(is_opposite_expression(&ctx, Some(not), Some(ne), false, false));
    }

    #[test]
    fn opposite_known_bounds() {
        let (prog, lib) = fixture("void f(int x) { if (x < 5) { } if (x >= 10) { } }");
        let ctx = ctx!(prog, lib);
        let lt = prog.find("<").unwrap();
        let ge = prog.find(">=").unwrap();
        assert!(is_opposite_expression(&ctx, Some(lt), Some(ge), false, false));
    }

    #[test]
    fn overlapping_bounds_are_not_opposite() {
        let (prog, lib) = fixture("void f(int x) { if (x < 10) { } if (x >= 5) { } }");
        let ctx = ctx!(prog, lib);
        let lt = prog.find("<").unwrap();
        let ge = prog.find(">=").unwrap();
        assert!(!is_opposite_expression(&ctx, Some(lt), Some(ge), false, false));
    }

    #[test]
    fn opposite_distributes_over_shared_conjunct() {
        let (prog, lib) =
            fixture("void f(int a, int b) { if (a && b < 1) { } if (a && b >= 1) { } }");
        let ctx = ctx!(prog, lib);
        let and1 = prog.find_nth("&&", 0).unwrap();
        let and2 = prog.find_nth("&&", 1).unwrap();
        assert!(is_opposite_expression(&ctx, Some(and1), Some(and2), false, false));
    }

    #[test]
    fn side_effect_detection() {
        let (prog, lib) = fixture("void f(int a, int b) { int x = a + b; int y = a++; }");
        let ctx = ctx!(prog, lib);
        let plus = prog.find("+").unwrap();
        let inc = prog.find("++").unwrap();
        assert!(is_without_side_effects(&ctx, plus));
        assert!(!is_without_side_effects(&ctx, inc));
    }
}
