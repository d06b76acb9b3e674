//! Forward reachability: classify the first observable interaction with an
//! expression along a token range.
//!
//! The walk dispatches on structural shape (statements, branches, loops,
//! calls) and consults the equivalence engine at every candidate occurrence.
//! Anything the walk cannot model exactly becomes [`AnalysisOutcome::Bailout`]
//! rather than a guess.
//!
//! The loop treatment is deliberately a single extra pass over the body at
//! the closing brace, not a fixed-point iteration; checker expectations are
//! calibrated against exactly this approximation.

use super::{change, equivalence, AnalysisContext, AnalysisOutcome, Cache, Mode, VarIdSet};
use crate::ast::{NodeArena, ScopeKind};
use crate::core::{NodeId, ScopeId, VarId, MAX_EXPR_DEPTH, MAX_WALK_DEPTH};
use crate::library::ArgDirection;
use log::debug;

/// The forward-reachability engine over one analysis context.
pub struct ForwardAnalyzer<'a> {
    ctx: &'a AnalysisContext<'a>,
}

impl<'a> ForwardAnalyzer<'a> {
    pub fn new(ctx: &'a AnalysisContext<'a>) -> Self {
        Self { ctx }
    }

    /// Classify the first interaction with `expr` between `start` and `end`
    /// (exclusive).
    pub fn analyze(
        &self,
        expr: NodeId,
        start: NodeId,
        end: NodeId,
        mode: Mode,
    ) -> AnalysisOutcome {
        let mut cache = Cache::new();
        self.analyze_with_cache(expr, start, end, mode, &mut cache)
    }

    /// [`Self::analyze`] with an explicit per-call cache; the cache must not
    /// be reused for a different expression or start token.
    pub fn analyze_with_cache(
        &self,
        expr: NodeId,
        start: NodeId,
        end: NodeId,
        mode: Mode,
        cache: &mut Cache,
    ) -> AnalysisOutcome {
        let Some(var_ids) = VarIdSet::of(self.ctx, expr) else {
            debug!("bailout: unresolved identifier under expression {}", expr);
            return AnalysisOutcome::Bailout(None);
        };
        let mut walker = Walker {
            ctx: self.ctx,
            cache,
            expr,
            start,
            var_ids,
            mode,
            in_rewalk: false,
        };
        let mut result = walker.range(Some(start), end, 0);

        // Resolve breaks against the enclosing breakable scope's exit.
        while let AnalysisOutcome::Break(tok) = result {
            if mode == Mode::ValueFlow {
                return AnalysisOutcome::Bailout(Some(tok));
            }
            let Some(exit) = breakable_exit(self.ctx, tok) else {
                return AnalysisOutcome::Bailout(Some(tok));
            };
            if !self.ctx.arena.precedes(exit, end) {
                result = AnalysisOutcome::None;
                break;
            }
            result = walker.range(self.ctx.arena.next(exit), end, 0);
        }

        // An overwrite means the value under analysis is dead; for the
        // unused-value question that is the same as never seeing it again.
        if mode == Mode::UnusedValue {
            if let AnalysisOutcome::Write(_) = result {
                result = AnalysisOutcome::None;
            }
        }
        result
    }

    /// Token of a provable overwrite of `expr`, if the walk finds one.
    pub fn reassign(&self, expr: NodeId, start: NodeId, end: NodeId) -> Option<NodeId> {
        match self.analyze(expr, start, end, Mode::Reassign) {
            AnalysisOutcome::Write(at) => Some(at),
            _ => None,
        }
    }

    /// Is the value of `expr` at `start` provably never read afterwards?
    pub fn unused_value(&self, expr: NodeId, start: NodeId, end: NodeId) -> bool {
        let mut cache = Cache::new();
        let result = self.analyze_with_cache(expr, start, end, Mode::UnusedValue, &mut cache);
        matches!(
            result,
            AnalysisOutcome::None | AnalysisOutcome::Return
        ) && !cache.possibly_aliased(self.ctx, expr, start)
    }
}

/// Closing brace of the innermost breakable scope around `tok`.
fn breakable_exit(ctx: &AnalysisContext, tok: NodeId) -> Option<NodeId> {
    let scope = ctx
        .arena
        .enclosing_scope(ctx.arena.node(tok).scope, |k| k.is_breakable())?;
    Some(ctx.arena.scope(scope).body_end)
}

/// What to do after classifying one occurrence.
enum OccAction {
    /// Jump past the current statement without classifying
    SkipStatement,
    /// A disjoint member access; keep scanning from the next token
    Step,
    Done(AnalysisOutcome),
}

struct Walker<'a, 'c> {
    ctx: &'a AnalysisContext<'a>,
    cache: &'c mut Cache,
    expr: NodeId,
    /// Start token of the top-level query, for alias lookups
    start: NodeId,
    var_ids: VarIdSet,
    mode: Mode,
    /// Set during the single extra pass over a loop body
    in_rewalk: bool,
}

impl<'a> Walker<'a, '_> {
    fn arena(&self) -> &'a NodeArena {
        self.ctx.arena
    }

    /// Walk `[start, end)` and classify the first interaction.
    fn range(&mut self, start: Option<NodeId>, end: NodeId, depth: usize) -> AnalysisOutcome {
        if depth > MAX_WALK_DEPTH {
            return AnalysisOutcome::Bailout(start);
        }
        let mut cur = start;
        while let Some(t) = cur {
            // Statement skips may jump one token past the range
            if !self.arena().precedes(t, end) {
                break;
            }
            let sym = self.arena().sym(t).to_string();
            match sym.as_str() {
                "goto" | "asm" | "try" | "continue" => {
                    debug!("bailout: unmodeled control transfer '{}'", sym);
                    return AnalysisOutcome::Bailout(Some(t));
                }
                "break" => return AnalysisOutcome::Break(t),
                "sizeof" => {
                    // unevaluated context
                    cur = self.skip_call_like(t);
                    continue;
                }
                "struct" | "class" | "union" => {
                    // A nested type body is opaque to the enclosing flow
                    match self.skip_type_body(t) {
                        Some(next) => {
                            cur = Some(next);
                            continue;
                        }
                        None => {
                            cur = self.arena().next(t);
                            continue;
                        }
                    }
                }
                "if" => match self.walk_if(t, end, depth) {
                    Ok(next) => {
                        cur = next;
                        continue;
                    }
                    Err(outcome) => return outcome,
                },
                "while" | "for" => match self.walk_loop_header(t, depth) {
                    Ok(next) => {
                        cur = next;
                        continue;
                    }
                    Err(outcome) => return outcome,
                },
                "switch" => match self.walk_switch(t, depth) {
                    Ok(next) => {
                        cur = next;
                        continue;
                    }
                    Err(outcome) => return outcome,
                },
                "return" | "throw" => return self.walk_return(t, depth),
                "{" => {
                    let scope = self.arena().node(t).scope;
                    match self.arena().scope(scope).kind {
                        ScopeKind::Class | ScopeKind::Union => {
                            cur = self.arena().link(t).and_then(|c| self.arena().next(c));
                            continue;
                        }
                        ScopeKind::Lambda => {
                            let Some(close) = self.arena().link(t) else {
                                return AnalysisOutcome::Bailout(Some(t));
                            };
                            // The body runs at an unknown time; only a pure
                            // read is classified, everything else bails.
                            match self.range(self.arena().next(t), close, depth + 1) {
                                AnalysisOutcome::None => {}
                                AnalysisOutcome::Read => return AnalysisOutcome::Read,
                                other => {
                                    return AnalysisOutcome::Bailout(at_of(other).or(Some(t)))
                                }
                            }
                            cur = self.arena().next(close);
                            continue;
                        }
                        _ => {
                            cur = self.arena().next(t);
                            continue;
                        }
                    }
                }
                "}" => {
                    let scope = self.arena().node(t).scope;
                    if self.arena().scope(scope).kind.is_loop() {
                        if let Err(outcome) = self.close_loop(t, scope, depth) {
                            return outcome;
                        }
                    }
                    cur = self.arena().next(t);
                    continue;
                }
                _ => {}
            }

            // Occurrence of one of the expression's variables
            if let Some(var_id) = self.arena().node(t).variable_id {
                if self.var_ids.contains(var_id) {
                    match self.classify_occurrence(t) {
                        OccAction::Done(outcome) => return outcome,
                        OccAction::SkipStatement => {
                            cur = self.skip_statement(t);
                            continue;
                        }
                        OccAction::Step => {
                            cur = self.arena().next(t);
                            continue;
                        }
                    }
                } else if self.aliased_indirect_write(t, var_id) {
                    // A write through an unrelated pointer can hit the
                    // expression once its address has escaped.
                    debug!("bailout: indirect write may alias the expression");
                    return AnalysisOutcome::Bailout(Some(t));
                }
            }

            // Opaque call: cannot rule out a read/write of non-local state
            if self.arena().is_name(t)
                && self.arena().node(t).variable_id.is_none()
                && !self.var_ids.all_local
            {
                if let Some(lparen) = self.arena().next(t) {
                    if self.arena().sym(lparen) == "(" {
                        let body_follows = self
                            .arena()
                            .link(lparen)
                            .and_then(|r| self.arena().next(r))
                            .is_some_and(|n| self.arena().sym(n) == "{");
                        if !body_follows {
                            debug!("bailout: opaque call '{}' with non-local expression", sym);
                            return AnalysisOutcome::Bailout(Some(t));
                        }
                    }
                }
            }

            cur = self.arena().next(t);
        }
        AnalysisOutcome::None
    }

    /// `if (cond) { .. } [else { .. }]`. Returns the token to resume at, or
    /// the final outcome.
    fn walk_if(
        &mut self,
        t: NodeId,
        end: NodeId,
        depth: usize,
    ) -> Result<Option<NodeId>, AnalysisOutcome> {
        let arena = self.arena();
        let header = match self.call_header(t) {
            Some(h) => h,
            None => return Err(AnalysisOutcome::Bailout(Some(t))),
        };
        let (lparen, rparen) = header;

        // ValueFlow: a statically-known condition selects one branch
        if self.mode == Mode::ValueFlow {
            return self.walk_if_valueflow(t, lparen, rparen, end, depth);
        }

        let cond = self.range(arena.next(lparen), rparen, depth + 1);
        if cond.is_terminal() {
            return Err(cond);
        }

        let Some(open1) = self.body_open(rparen) else {
            return Err(AnalysisOutcome::Bailout(Some(rparen)));
        };
        let Some(close1) = self.arena().link(open1) else {
            return Err(AnalysisOutcome::Bailout(Some(open1)));
        };
        let r1 = self.range(self.arena().next(open1), close1, depth + 1);

        let else_tok = self
            .arena()
            .next(close1)
            .filter(|&n| self.arena().sym(n) == "else");
        let Some(else_tok) = else_tok else {
            return match r1 {
                AnalysisOutcome::Read | AnalysisOutcome::Bailout(_) => Err(r1),
                AnalysisOutcome::Break(_) => {
                    // A conditional break partially exits the loop; the
                    // remaining flow is not modeled.
                    Err(AnalysisOutcome::Bailout(at_of(r1)))
                }
                // Conditional writes/returns prove nothing; keep walking
                _ => Ok(self.arena().next(close1)),
            };
        };

        let Some(open2) = self.body_open(else_tok) else {
            return Err(AnalysisOutcome::Bailout(Some(else_tok)));
        };
        let Some(close2) = self.arena().link(open2) else {
            return Err(AnalysisOutcome::Bailout(Some(open2)));
        };
        let r2 = self.range(self.arena().next(open2), close2, depth + 1);

        match combine_branches(r1, r2) {
            BranchOutcome::Final(outcome) => Err(outcome),
            BranchOutcome::Continue => Ok(self.arena().next(close2)),
        }
    }

    fn walk_if_valueflow(
        &mut self,
        t: NodeId,
        lparen: NodeId,
        rparen: NodeId,
        _end: NodeId,
        depth: usize,
    ) -> Result<Option<NodeId>, AnalysisOutcome> {
        let arena = self.arena();
        let Some(open1) = self.body_open(rparen) else {
            return Err(AnalysisOutcome::Bailout(Some(rparen)));
        };
        let Some(close1) = arena.link(open1) else {
            return Err(AnalysisOutcome::Bailout(Some(open1)));
        };
        let else_tok = arena
            .next(close1)
            .filter(|&n| arena.sym(n) == "else");
        let after = match else_tok {
            Some(e) => {
                let open2 = self.body_open(e);
                let close2 = open2.and_then(|o| self.arena().link(o));
                match close2 {
                    Some(c) => self.arena().next(c),
                    None => return Err(AnalysisOutcome::Bailout(Some(e))),
                }
            }
            None => self.arena().next(close1),
        };

        let known = self
            .arena()
            .next(lparen)
            .filter(|&n| n != rparen)
            .map(|n| self.arena().expr_root(n))
            .and_then(|root| self.arena().known_int(root));
        match known {
            Some(v) if v != 0 => {
                let r = self.range(self.arena().next(open1), close1, depth + 1);
                if r.is_terminal() {
                    return Err(r);
                }
                Ok(after)
            }
            Some(_) => {
                if let Some(e) = else_tok {
                    let open2 = self.body_open(e).ok_or(AnalysisOutcome::Bailout(Some(e)))?;
                    let close2 = self
                        .arena()
                        .link(open2)
                        .ok_or(AnalysisOutcome::Bailout(Some(open2)))?;
                    let r = self.range(self.arena().next(open2), close2, depth + 1);
                    if r.is_terminal() {
                        return Err(r);
                    }
                }
                Ok(after)
            }
            None => {
                // Unknown condition: the construct is transparent only if it
                // provably leaves the expression unchanged.
                if self.region_changes_expr(self.arena().next(lparen), after) {
                    Err(AnalysisOutcome::Bailout(Some(t)))
                } else {
                    Ok(after)
                }
            }
        }
    }

    /// `while (..)` / `for (..)` headers, including `do .. while (..);`
    /// tails and brace-less bodies.
    fn walk_loop_header(
        &mut self,
        t: NodeId,
        depth: usize,
    ) -> Result<Option<NodeId>, AnalysisOutcome> {
        let Some((lparen, rparen)) = self.call_header(t) else {
            return Err(AnalysisOutcome::Bailout(Some(t)));
        };

        if self.mode == Mode::ValueFlow {
            // Transparent only when nothing inside can change the expression
            let stop = self.loop_construct_end(rparen);
            if self.region_changes_expr(self.arena().next(lparen), stop) {
                return Err(AnalysisOutcome::Bailout(Some(t)));
            }
            return Ok(stop);
        }

        let header = self.range(self.arena().next(lparen), rparen, depth + 1);
        if header.is_terminal() {
            return Err(header);
        }

        let Some(after) = self.arena().next(rparen) else {
            return Ok(None);
        };
        match self.arena().sym(after) {
            // do { .. } while (cond); -- the body was already walked
            ";" => Ok(self.arena().next(after)),
            // braced body: walked linearly; the closing brace drives the
            // loop re-walk
            "{" => Ok(Some(after)),
            _ => {
                // brace-less body: one statement, walked once and, when the
                // condition is independent of the expression, once more for
                // the backward flow
                let stmt_end = self.statement_end(after);
                let r1 = self.range(Some(after), stmt_end.unwrap_or(after), depth + 1);
                if r1.is_terminal() {
                    return Err(r1);
                }
                if self.header_uses_vars(lparen, rparen) {
                    return Err(AnalysisOutcome::Bailout(Some(t)));
                }
                if !self.in_rewalk {
                    self.in_rewalk = true;
                    let r2 = self.range(Some(after), stmt_end.unwrap_or(after), depth + 1);
                    self.in_rewalk = false;
                    if r2.is_terminal() {
                        return Err(r2);
                    }
                }
                Ok(stmt_end.and_then(|s| self.arena().next(s)))
            }
        }
    }

    /// Closing brace of a `while`/`for`/`do` body: bail when the condition
    /// re-reads the expression, otherwise walk the body once more.
    fn close_loop(
        &mut self,
        close: NodeId,
        scope: ScopeId,
        depth: usize,
    ) -> Result<(), AnalysisOutcome> {
        if self.loop_condition_uses_vars(scope) {
            debug!("bailout: loop condition re-reads the expression");
            return Err(AnalysisOutcome::Bailout(Some(close)));
        }
        if self.in_rewalk {
            return Ok(());
        }
        let body_start = self.arena().scope(scope).body_start;
        self.in_rewalk = true;
        let r = self.range(self.arena().next(body_start), close, depth + 1);
        self.in_rewalk = false;
        match r {
            AnalysisOutcome::None => Ok(()),
            AnalysisOutcome::Read => Err(AnalysisOutcome::Read),
            AnalysisOutcome::Write(at) if self.mode == Mode::Reassign => {
                Err(AnalysisOutcome::Write(at))
            }
            AnalysisOutcome::Write(_) => Ok(()),
            AnalysisOutcome::Return => Ok(()),
            other => Err(AnalysisOutcome::Bailout(at_of(other).or(Some(close)))),
        }
    }

    fn walk_switch(
        &mut self,
        t: NodeId,
        depth: usize,
    ) -> Result<Option<NodeId>, AnalysisOutcome> {
        let Some((lparen, rparen)) = self.call_header(t) else {
            return Err(AnalysisOutcome::Bailout(Some(t)));
        };
        let cond = self.range(self.arena().next(lparen), rparen, depth + 1);
        if cond.is_terminal() {
            return Err(cond);
        }
        let Some(open) = self.body_open(rparen) else {
            return Err(AnalysisOutcome::Bailout(Some(rparen)));
        };
        let Some(close) = self.arena().link(open) else {
            return Err(AnalysisOutcome::Bailout(Some(open)));
        };
        // Fall-through between cases is not modeled; any occurrence or
        // control transfer inside the body gives up.
        let mut tok = self.arena().next(open);
        while let Some(inner) = tok {
            if inner == close {
                break;
            }
            if matches!(
                self.arena().sym(inner),
                "goto" | "asm" | "try" | "continue" | "return" | "throw"
            ) {
                debug!("bailout: control transfer inside switch body");
                return Err(AnalysisOutcome::Bailout(Some(inner)));
            }
            if let Some(var_id) = self.arena().node(inner).variable_id {
                if self.var_ids.contains(var_id) {
                    return Err(AnalysisOutcome::Bailout(Some(inner)));
                }
            }
            tok = self.arena().next(inner);
        }
        Ok(self.arena().next(close))
    }

    fn walk_return(&mut self, t: NodeId, depth: usize) -> AnalysisOutcome {
        let stmt_end = self.statement_end(t);
        let operand = self.range(self.arena().next(t), stmt_end.unwrap_or(t), depth + 1);
        match operand {
            AnalysisOutcome::None => {}
            other => return other,
        }
        if self.mode == Mode::Reassign && !self.var_ids.all_local {
            // A non-local value followed by an unanalyzed exit is unsafe to
            // call overwritten-before-read.
            return AnalysisOutcome::Bailout(Some(t));
        }
        AnalysisOutcome::Return
    }

    /// Classify one occurrence of an expression variable by climbing the AST
    /// to the first ancestor structurally equivalent to the expression.
    fn classify_occurrence(&mut self, t: NodeId) -> OccAction {
        let arena = self.arena();
        let mut cur = t;
        let mut steps = 0usize;
        loop {
            if equivalence::is_same_expression(
                self.ctx,
                true,
                Some(cur),
                Some(self.expr),
                false,
                false,
            ) {
                break;
            }
            steps += 1;
            if steps > MAX_EXPR_DEPTH {
                return OccAction::Done(AnalysisOutcome::Bailout(Some(t)));
            }
            let Some(parent) = arena.parent(cur) else {
                // No equivalent ancestor: a write to part of the expression
                // cannot be classified; a read of a component is a read.
                return if change::is_variable_changed(self.ctx, t, 0, true) {
                    OccAction::Done(AnalysisOutcome::Bailout(Some(t)))
                } else {
                    OccAction::Done(AnalysisOutcome::Read)
                };
            };
            if matches!(arena.sym(parent), "." | "->") && arena.op2(parent) == Some(cur) {
                // Member name whose object is foreign to the expression:
                // a disjoint field, not an occurrence.
                let foreign = arena
                    .op1(parent)
                    .and_then(|b| arena.node(b).variable_id)
                    .is_none_or(|v| !self.var_ids.contains(v));
                if foreign {
                    return OccAction::Step;
                }
            }
            cur = parent;
        }

        let Some(parent) = arena.parent(cur) else {
            return OccAction::Done(AnalysisOutcome::Read);
        };

        if arena.is_assignment_op(parent) && arena.op1(parent) == Some(cur) {
            if arena.sym(parent) != "=" {
                // Compound assignment reads the old value
                return OccAction::Done(AnalysisOutcome::Read);
            }
            let rhs_reads = arena
                .op2(parent)
                .is_some_and(|rhs| self.subtree_has_expr(rhs, 0));
            if rhs_reads {
                // Read-then-write (including self-assignment): not a plain
                // overwrite. During the loop re-walk the write lands before
                // the next iteration's read, so for the reassign question it
                // counts as the overwrite.
                if self.in_rewalk && self.mode == Mode::Reassign {
                    return OccAction::Done(AnalysisOutcome::Write(parent));
                }
                return OccAction::SkipStatement;
            }
            if self.mode == Mode::UnusedValue && self.expr_is_mutable_reference() {
                // Writing through a reference target: the observability of
                // the old value elsewhere is unclear.
                return OccAction::Done(AnalysisOutcome::Bailout(Some(parent)));
            }
            return OccAction::Done(AnalysisOutcome::Write(parent));
        }

        if arena.is_inc_dec(parent) {
            return OccAction::Done(AnalysisOutcome::Read);
        }

        if arena.is_unary_op(parent, "&") {
            // Address-of: fine when handed to a declared output parameter
            // (the call is the intended writer), an escape otherwise.
            if let Some((call, index)) = change::enclosing_call_argument(self.ctx, parent) {
                if let Some(name) = self.ctx.callee_name(call) {
                    if self.ctx.library.arg_direction(name, index) == Some(ArgDirection::Out) {
                        return OccAction::SkipStatement;
                    }
                }
            }
            debug!("bailout: address of expression escapes at {}", t);
            return OccAction::Done(AnalysisOutcome::Bailout(Some(t)));
        }

        OccAction::Done(AnalysisOutcome::Read)
    }

    /// Does the token write through a pointer or reference that might alias
    /// the expression?
    fn aliased_indirect_write(&mut self, t: NodeId, var_id: VarId) -> bool {
        let Some(var) = self.ctx.symbols.variable(var_id) else {
            return false;
        };
        // A reference writes its referent at level 0, a pointer at level 1
        let indirect = if var.is_reference {
            0
        } else if var.is_pointer {
            1
        } else {
            return false;
        };
        change::is_variable_changed(self.ctx, t, indirect, true)
            && self.cache.possibly_aliased(self.ctx, self.expr, self.start)
    }

    fn expr_is_mutable_reference(&self) -> bool {
        self.ctx
            .variable_of(self.expr)
            .is_some_and(|v| v.is_reference && !v.is_const)
    }

    fn subtree_has_expr(&self, root: NodeId, depth: usize) -> bool {
        if equivalence::is_same_expression(
            self.ctx,
            true,
            Some(root),
            Some(self.expr),
            false,
            false,
        ) {
            return true;
        }
        if depth > MAX_EXPR_DEPTH {
            // Malformed operand chain; assume a read rather than walk it
            return true;
        }
        [self.arena().op1(root), self.arena().op2(root)]
            .into_iter()
            .flatten()
            .any(|c| self.subtree_has_expr(c, depth + 1))
    }

    /// Any occurrence in `[start, stop)` that would change the expression,
    /// an opaque call that could, or a control transfer that makes the
    /// region impossible to treat as transparent.
    fn region_changes_expr(&self, start: Option<NodeId>, stop: Option<NodeId>) -> bool {
        let mut tok = start;
        while let Some(t) = tok {
            if Some(t) == stop {
                break;
            }
            if matches!(self.arena().sym(t), "goto" | "asm" | "try" | "continue") {
                return true;
            }
            if let Some(var_id) = self.arena().node(t).variable_id {
                if self.var_ids.contains(var_id)
                    && change::is_variable_changed(self.ctx, t, 0, true)
                {
                    return true;
                }
            }
            if !self.var_ids.all_local
                && self.arena().is_name(t)
                && self.arena().node(t).variable_id.is_none()
                && self
                    .arena()
                    .next(t)
                    .is_some_and(|n| self.arena().sym(n) == "(")
            {
                return true;
            }
            tok = self.arena().next(t);
        }
        false
    }

    /// `keyword ( .. )` header brackets.
    fn call_header(&self, t: NodeId) -> Option<(NodeId, NodeId)> {
        let lparen = self.arena().next(t)?;
        if self.arena().sym(lparen) != "(" {
            return None;
        }
        let rparen = self.arena().link(lparen)?;
        Some((lparen, rparen))
    }

    /// The `{` opening a branch body right after `at` (a `)` or `else`).
    fn body_open(&self, at: NodeId) -> Option<NodeId> {
        self.arena()
            .next(at)
            .filter(|&n| self.arena().sym(n) == "{")
    }

    /// Token one past a loop construct starting behind `rparen` (closing
    /// brace or statement semicolon), for ValueFlow skipping.
    fn loop_construct_end(&self, rparen: NodeId) -> Option<NodeId> {
        let after = self.arena().next(rparen)?;
        match self.arena().sym(after) {
            "{" => self.arena().link(after).and_then(|c| self.arena().next(c)),
            _ => self.statement_end(after).and_then(|s| self.arena().next(s)),
        }
    }

    /// Does the loop condition belonging to `scope` mention any of the
    /// expression's variables? Unrecognized shapes count as yes.
    fn loop_condition_uses_vars(&self, scope: ScopeId) -> bool {
        let s = self.arena().scope(scope);
        let header = match s.kind {
            ScopeKind::Do => {
                // do { .. } while (cond);
                let Some(kw) = self.arena().next(s.body_end) else {
                    return true;
                };
                if self.arena().sym(kw) != "while" {
                    return true;
                }
                self.call_header(kw)
            }
            _ => {
                // while/for (cond) { .. }
                let Some(rparen) = self.arena().previous(s.body_start) else {
                    return true;
                };
                if self.arena().sym(rparen) != ")" {
                    return true;
                }
                self.arena().link(rparen).map(|l| (l, rparen))
            }
        };
        let Some((lparen, rparen)) = header else {
            return true;
        };
        self.arena().stream(lparen, rparen).any(|t| {
            self.arena()
                .node(t)
                .variable_id
                .is_some_and(|v| self.var_ids.contains(v))
        })
    }

    fn header_uses_vars(&self, lparen: NodeId, rparen: NodeId) -> bool {
        self.arena().stream(lparen, rparen).any(|t| {
            self.arena()
                .node(t)
                .variable_id
                .is_some_and(|v| self.var_ids.contains(v))
        })
    }

    /// The terminating `;` of the statement containing `from`, jumping over
    /// bracketed groups.
    fn statement_end(&self, from: NodeId) -> Option<NodeId> {
        let mut tok = Some(from);
        while let Some(t) = tok {
            match self.arena().sym(t) {
                "(" | "[" => {
                    tok = self.arena().link(t).and_then(|c| self.arena().next(c));
                }
                ";" => return Some(t),
                "{" | "}" => return None,
                _ => tok = self.arena().next(t),
            }
        }
        None
    }

    /// Resume after the statement containing `t`.
    fn skip_statement(&self, t: NodeId) -> Option<NodeId> {
        match self.statement_end(t) {
            Some(semi) => self.arena().next(semi),
            None => self.arena().next(t),
        }
    }

    /// Past a `name ( .. )` group starting at `t`.
    fn skip_call_like(&self, t: NodeId) -> Option<NodeId> {
        let lparen = self.arena().next(t)?;
        if self.arena().sym(lparen) != "(" {
            return Some(lparen);
        }
        self.arena().link(lparen).and_then(|c| self.arena().next(c))
    }

    /// Past `struct|class|union [name] { .. }`, when that is what `t`
    /// starts.
    fn skip_type_body(&self, t: NodeId) -> Option<NodeId> {
        let mut cur = self.arena().next(t)?;
        if self.arena().is_name(cur) {
            cur = self.arena().next(cur)?;
        }
        if self.arena().sym(cur) != "{" {
            return None;
        }
        self.arena().link(cur).and_then(|c| self.arena().next(c))
    }
}

fn at_of(outcome: AnalysisOutcome) -> Option<NodeId> {
    match outcome {
        AnalysisOutcome::Write(at) | AnalysisOutcome::Break(at) => Some(at),
        AnalysisOutcome::Bailout(at) => at,
        _ => None,
    }
}

enum BranchOutcome {
    Final(AnalysisOutcome),
    Continue,
}

/// Combine the outcomes of an `if` branch and its `else` branch.
fn combine_branches(r1: AnalysisOutcome, r2: AnalysisOutcome) -> BranchOutcome {
    use AnalysisOutcome::*;
    match (r1, r2) {
        (Bailout(_), _) => BranchOutcome::Final(r1),
        (_, Bailout(_)) => BranchOutcome::Final(r2),
        (Read, _) | (_, Read) => BranchOutcome::Final(Read),
        // Partial loop exits are not modeled
        (Break(at), _) | (_, Break(at)) => BranchOutcome::Final(Bailout(Some(at))),
        // Every continuing path overwrote the expression
        (Write(at), Write(_)) => BranchOutcome::Final(Write(at)),
        (Write(at), Return) | (Return, Write(at)) => BranchOutcome::Final(Write(at)),
        (Return, Return) => BranchOutcome::Final(Return),
        // One transparent path survives: nothing is proven
        (None, _) | (_, None) => BranchOutcome::Continue,
    }
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

    /// Start of the statement after the first assignment to keep fixtures
    /// short: the token after the first `;` past `from`.
    fn after_semi(prog: &Program, from: NodeId) -> NodeId {
        let mut t = from;
        loop {
            if prog.arena.sym(t) == ";" {
                return prog.arena.next(t).unwrap();
            }
            t = prog.arena.next(t).unwrap();
        }
    }

    #[test]
    fn plain_overwrite_is_reported() {
        let (prog, lib) = fixture("void f() { int x; x = 1; x = 2; return; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        let end = prog.last();
        let at = fwd.reassign(first, start, end).unwrap();
        assert_eq!(prog.arena.sym(at), "=");
        assert_eq!(prog.find_pattern("x = 2").map(|x| prog.arena.parent(x).unwrap()), Some(at));
    }

    #[test]
    fn read_blocks_reassign() {
        let (prog, lib) = fixture("void f(int y) { int x; x = 1; y = x; x = 2; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert_eq!(fwd.reassign(first, start, prog.last()), None);
    }

    #[test]
    fn goto_bails_out_in_every_mode() {
        let (prog, lib) = fixture("void f() { int x; x = 1; goto done; done: x = 2; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        for mode in [Mode::Reassign, Mode::UnusedValue, Mode::ValueFlow] {
            assert!(fwd.analyze(first, start, prog.last(), mode).is_bailout());
        }
    }

    #[test]
    fn unused_value_on_dead_store() {
        let (prog, lib) = fixture("void f() { int x; int y; x = 1; x = 2; y = x; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd.unused_value(first, start, prog.last()));
    }

    #[test]
    fn unused_value_false_when_read() {
        let (prog, lib) = fixture("void f() { int x; int y; x = 1; y = x; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(!fwd.unused_value(first, start, prog.last()));
    }

    #[test]
    fn branch_writes_combine() {
        let src = "void f(int c) { int x; int y; x = 1; if (c) { x = 2; } else { x = 3; } y = 4; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        let at = fwd.reassign(first, start, prog.last()).unwrap();
        assert_eq!(prog.arena.parent(prog.find_pattern("x = 2").unwrap()), Some(at));
    }

    #[test]
    fn single_branch_write_proves_nothing() {
        let src = "void f(int c) { int x; int y; x = 1; if (c) { x = 2; } y = x; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert_eq!(fwd.reassign(first, start, prog.last()), None);
        assert!(!fwd.unused_value(first, start, prog.last()));
    }

    #[test]
    fn loop_rewalk_reports_body_write() {
        let (prog, lib) = fixture("void f(int c) { int x; x = 0; while (c) x = x + 1; return; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 0").unwrap();
        let start = after_semi(&prog, first);
        let at = fwd.reassign(first, start, prog.last()).unwrap();
        assert_eq!(prog.arena.parent(prog.find_pattern("x = x + 1").unwrap()), Some(at));
    }

    #[test]
    fn loop_condition_reading_expr_bails() {
        let (prog, lib) = fixture("void f() { int x; x = 10; while (x > 0) { g(); } }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 10").unwrap();
        let start = after_semi(&prog, first);
        // The condition read is found before the closing brace
        let r = fwd.analyze(first, start, prog.last(), Mode::Reassign);
        assert!(matches!(r, AnalysisOutcome::Read | AnalysisOutcome::Bailout(_)));
        assert_eq!(fwd.reassign(first, start, prog.last()), None);
    }

    #[test]
    fn break_resolves_to_after_loop() {
        let src = "void f(int c) { int x; x = 1; while (c) { break; } x = 2; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        let at = fwd.reassign(first, start, prog.last()).unwrap();
        assert_eq!(prog.arena.parent(prog.find_pattern("x = 2").unwrap()), Some(at));
    }

    #[test]
    fn address_of_escape_bails() {
        let (prog, lib) = fixture("void f() { int x; int y; x = 1; consume(&x); x = 2; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::Reassign)
            .is_bailout());
    }

    #[test]
    fn output_parameter_address_is_not_an_escape() {
        let src = "void f(char* s, char* fmt) { int x; x = 1; sscanf(s, fmt, &x); x = 2; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        let at = fwd.reassign(first, start, prog.last()).unwrap();
        assert_eq!(prog.arena.parent(prog.find_pattern("x = 2").unwrap()), Some(at));
    }

    #[test]
    fn self_assignment_is_not_a_write() {
        let (prog, lib) = fixture("void f() { int x; int y; x = 1; x = x; y = 2; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert_eq!(fwd.reassign(first, start, prog.last()), None);
    }

    #[test]
    fn return_of_local_gives_return_outcome() {
        let (prog, lib) = fixture("void f() { int x; x = 1; return; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert_eq!(
            fwd.analyze(first, start, prog.last(), Mode::UnusedValue),
            AnalysisOutcome::Return
        );
    }

    #[test]
    fn opaque_call_bails_for_non_local() {
        let (prog, lib) = fixture("int g; void f() { g = 1; other(); g = 2; }");
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("g = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::Reassign)
            .is_bailout());
    }

    #[test]
    fn valueflow_skips_transparent_branch() {
        let src = "void f(int c, int y) { int x; x = 1; if (c) { y = 2; } x = 3; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        let r = fwd.analyze(first, start, prog.last(), Mode::ValueFlow);
        assert!(matches!(r, AnalysisOutcome::Write(_)));
    }

    #[test]
    fn valueflow_bails_on_mutating_branch() {
        let src = "void f(int c) { int x; x = 1; if (c) { x = 2; } }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::ValueFlow)
            .is_bailout());
    }

    #[test]
    fn goto_inside_switch_body_bails_in_every_mode() {
        // The jump target is unknown; the overwrite after the switch must
        // not be reported even though the body never touches x.
        let src =
            "int f(int c) { int x; x = 1; switch (c) { case 0: goto out; } x = 2; out: return x; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        for mode in [Mode::Reassign, Mode::UnusedValue, Mode::ValueFlow] {
            assert!(
                fwd.analyze(first, start, prog.last(), mode).is_bailout(),
                "switch-body goto must bail out in {mode:?}"
            );
        }
    }

    #[test]
    fn return_inside_switch_body_bails() {
        let src = "int f(int c) { int x; x = 1; switch (c) { case 0: return 0; } x = 2; return x; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::Reassign)
            .is_bailout());
    }

    #[test]
    fn valueflow_branch_with_goto_is_not_transparent() {
        // Without the goto the branch would be skipped as transparent and
        // the overwrite reported.
        let src = "void f(int c) { int x; x = 1; if (c) { goto lab; } x = 2; lab: x = 3; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::ValueFlow)
            .is_bailout());
    }

    #[test]
    fn valueflow_loop_with_continue_is_not_transparent() {
        let src = "void f(int c, int y) { int x; x = 1; while (c) { continue; } x = 2; }";
        let (prog, lib) = fixture(src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = after_semi(&prog, first);
        assert!(fwd
            .analyze(first, start, prog.last(), Mode::ValueFlow)
            .is_bailout());
    }
}
