//! Minimal C-subset front end.
//!
//! Builds a [`NodeArena`] and [`SymbolTable`] from source text so that tests
//! and embedders without their own tokenizer can feed the analysis kernel
//! real snippets. This is NOT a conforming C parser: it covers the statement
//! and expression shapes the kernel reasons about (declarations, assignments,
//! calls, member access, control flow) and rejects anything it cannot parse
//! rather than mis-parsing it.
//!
//! Construction runs in passes over the flat token stream:
//!
//! 1. tokenize and push nodes, pairing brackets,
//! 2. build the scope tree from brace context,
//! 3. recognize declarations, assign variable ids, resolve names,
//! 4. build expression ASTs per statement region,
//! 5. fold known integer values and assign structural expression ids,
//! 6. fix up symbol records (initializers, return statements).

pub mod lexer;

mod expr;

use crate::ast::{pattern, Node, NodeArena, NodeKind, Scope, ScopeKind};
use crate::core::{Error, NodeId, Result, ScopeId, VarId};
use crate::symbols::{Function, Parameter, SymbolTable, Variable};
use std::collections::HashMap;

use expr::{fold_known_values, is_type_keyword, ExprParser};
use lexer::{int_value, tokenize};

/// A parsed compilation unit: the node stream plus its symbols.
#[derive(Debug, Clone)]
pub struct Program {
    pub arena: NodeArena,
    pub symbols: SymbolTable,
}

impl Program {
    /// Parse `source` into a node stream with AST links and symbols.
    pub fn parse(source: &str) -> Result<Program> {
        Builder::new().build(source)
    }

    /// First token of the stream.
    pub fn first(&self) -> NodeId {
        NodeId(0)
    }

    /// Last token of the stream.
    pub fn last(&self) -> NodeId {
        NodeId(self.arena.len() as u32 - 1)
    }

    /// First token whose symbol is `sym`.
    pub fn find(&self, sym: &str) -> Option<NodeId> {
        self.find_nth(sym, 0)
    }

    /// `nth` (0-based) token whose symbol is `sym`.
    pub fn find_nth(&self, sym: &str, nth: usize) -> Option<NodeId> {
        (0..self.arena.len())
            .map(|i| NodeId(i as u32))
            .filter(|&id| self.arena.sym(id) == sym)
            .nth(nth)
    }

    /// First stream position where `pat` matches (see [`crate::ast::pattern`]).
    pub fn find_pattern(&self, pat: &str) -> Option<NodeId> {
        (0..self.arena.len())
            .map(|i| NodeId(i as u32))
            .find(|&id| pattern::matches(&self.arena, id, pat))
    }
}

struct PendingParam {
    name: Option<NodeId>,
    var_id: Option<VarId>,
    is_const: bool,
    is_reference: bool,
    is_pointer: bool,
}

#[derive(Default)]
struct Builder {
    arena: NodeArena,
    symbols: SymbolTable,
    next_var: u32,
    /// Parameter lists keyed by the body's `{`
    pending_params: HashMap<NodeId, Vec<PendingParam>>,
    /// Function names keyed by the body's `{`
    fn_names: HashMap<NodeId, String>,
    /// Tokens consumed structurally by declarations; the AST pass skips them
    covered: Vec<bool>,
    /// `name = init` regions recorded by the declaration pass
    init_regions: Vec<(NodeId, NodeId)>,
}

impl Builder {
    fn new() -> Self {
        Self {
            next_var: 1,
            ..Default::default()
        }
    }

    fn build(mut self, source: &str) -> Result<Program> {
        let raw = tokenize(source)?;
        if raw.is_empty() {
            return Err(Error::parse(1, "empty input"));
        }

        self.push_tokens(&raw)?;
        self.covered = vec![false; self.arena.len()];
        self.build_scopes()?;
        self.declare_and_resolve()?;
        self.build_ast()?;
        fold_known_values(&mut self.arena);
        self.assign_expr_ids();
        self.fixup_symbols();

        Ok(Program {
            arena: self.arena,
            symbols: self.symbols,
        })
    }

    // -- pass 1: token stream and bracket links ---------------------------

    fn push_tokens(&mut self, raw: &[lexer::RawToken]) -> Result<()> {
        let mut brackets: Vec<(NodeId, char)> = Vec::new();
        for tok in raw {
            let mut node = Node::new(tok.text.clone(), tok.kind, tok.line);
            if tok.kind == NodeKind::Number {
                node.known_int_value = int_value(&tok.text);
            }
            let id = self.arena.push(node);
            match tok.text.as_str() {
                "(" => brackets.push((id, '(')),
                "{" => brackets.push((id, '{')),
                "[" => brackets.push((id, '[')),
                ")" | "}" | "]" => {
                    let expected = match tok.text.as_str() {
                        ")" => '(',
                        "}" => '{',
                        _ => '[',
                    };
                    let Some((open, kind)) = brackets.pop() else {
                        return Err(Error::parse(tok.line, format!("unmatched '{}'", tok.text)));
                    };
                    if kind != expected {
                        return Err(Error::parse(tok.line, format!("mismatched '{}'", tok.text)));
                    }
                    self.arena.node_mut(open).link = Some(id);
                    self.arena.node_mut(id).link = Some(open);
                }
                _ => {}
            }
        }
        if let Some((open, _)) = brackets.pop() {
            let line = self.arena.node(open).line;
            return Err(Error::parse(line, "unclosed bracket"));
        }
        Ok(())
    }

    // -- pass 2: scope tree -----------------------------------------------

    fn build_scopes(&mut self) -> Result<()> {
        let last = NodeId(self.arena.len() as u32 - 1);
        let global = self.arena.push_scope(Scope {
            kind: ScopeKind::Global,
            body_start: NodeId(0),
            body_end: last,
            nested_in: None,
        });
        let mut stack = vec![global];

        for i in 0..self.arena.len() {
            let id = NodeId(i as u32);
            match self.arena.sym(id) {
                "{" => {
                    let kind = self.classify_brace(id);
                    let scope = self.arena.push_scope(Scope {
                        kind,
                        body_start: id,
                        body_end: id,
                        nested_in: Some(*stack.last().unwrap()),
                    });
                    self.arena.node_mut(id).scope = scope;
                    stack.push(scope);
                }
                "}" => {
                    let top = *stack.last().unwrap();
                    self.arena.scope_mut(top).body_end = id;
                    self.arena.node_mut(id).scope = top;
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                _ => {
                    self.arena.node_mut(id).scope = *stack.last().unwrap();
                }
            }
        }
        Ok(())
    }

    fn classify_brace(&self, brace: NodeId) -> ScopeKind {
        let Some(prev) = self.arena.previous(brace) else {
            return ScopeKind::Unconditional;
        };
        match self.arena.sym(prev) {
            ")" => {
                let Some(lparen) = self.arena.link(prev) else {
                    return ScopeKind::Unconditional;
                };
                let Some(before) = self.arena.previous(lparen) else {
                    return ScopeKind::Unconditional;
                };
                match self.arena.sym(before) {
                    "while" | "for" => ScopeKind::Loop,
                    "switch" => ScopeKind::Switch,
                    "if" => ScopeKind::Conditional,
                    "]" => ScopeKind::Lambda,
                    _ if self.arena.is_name(before) => ScopeKind::Function,
                    _ => ScopeKind::Unconditional,
                }
            }
            "else" => ScopeKind::Conditional,
            "do" => ScopeKind::Do,
            "]" => ScopeKind::Lambda,
            "union" => ScopeKind::Union,
            "struct" | "class" => ScopeKind::Class,
            _ if self.arena.is_name(prev) => {
                match self.arena.previous(prev).map(|p| self.arena.sym(p).to_string()) {
                    Some(ref s) if s == "struct" || s == "class" => ScopeKind::Class,
                    Some(ref s) if s == "union" => ScopeKind::Union,
                    _ => ScopeKind::Unconditional,
                }
            }
            _ => ScopeKind::Unconditional,
        }
    }

    // -- pass 3: declarations and name resolution -------------------------

    fn declare_and_resolve(&mut self) -> Result<()> {
        let len = self.arena.len();
        let mut maps: Vec<HashMap<String, VarId>> = vec![HashMap::new()];
        let mut i = 0usize;

        while i < len {
            let id = NodeId(i as u32);
            let sym = self.arena.sym(id).to_string();
            match sym.as_str() {
                "{" => {
                    let mut map = HashMap::new();
                    if let Some(params) = self.pending_params.remove(&id) {
                        let scope = self.arena.node(id).scope;
                        for param in &params {
                            let (Some(name), Some(var_id)) = (param.name, param.var_id) else {
                                continue;
                            };
                            let mut var = Variable::new(self.arena.sym(name), var_id, scope);
                            var.is_argument = true;
                            var.is_const = param.is_const;
                            var.is_reference = param.is_reference;
                            var.is_pointer = param.is_pointer;
                            var.decl_node = Some(name);
                            map.insert(var.name.clone(), var_id);
                            self.symbols.insert_variable(var);
                        }
                        if let Some(name) = self.fn_names.get(&id) {
                            let scope = self.arena.node(id).scope;
                            if let Some(func) = self.symbols.function_mut(name) {
                                func.body = Some(scope);
                            }
                        }
                    }
                    maps.push(map);
                    i += 1;
                }
                "}" => {
                    if maps.len() > 1 {
                        maps.pop();
                    }
                    i += 1;
                }
                "goto" => i += 2,
                "." | "->" => i += 2,
                _ if is_decl_start(&sym) => {
                    match self.try_declaration(i, &mut maps)? {
                        Some(next) => i = next,
                        None => i += 1,
                    }
                }
                _ if self.arena.is_name(id) => {
                    self.resolve_name(id, &maps);
                    i += 1;
                }
                _ => i += 1,
            }
        }
        Ok(())
    }

    fn resolve_name(&mut self, id: NodeId, maps: &[HashMap<String, VarId>]) {
        let name = self.arena.sym(id).to_string();
        for map in maps.iter().rev() {
            if let Some(&var_id) = map.get(&name) {
                self.arena.node_mut(id).variable_id = Some(var_id);
                return;
            }
        }
    }

    /// Try to parse a declaration statement starting at index `start`.
    /// Returns the index to resume scanning at, or `None` if this is not a
    /// declaration (e.g. a cast like `(int)` reaching the type keyword).
    fn try_declaration(
        &mut self,
        start: usize,
        maps: &mut Vec<HashMap<String, VarId>>,
    ) -> Result<Option<usize>> {
        let len = self.arena.len();
        let mut i = start;
        let mut is_static = false;
        let mut is_extern = false;
        let mut is_const = false;
        let mut is_volatile = false;
        let mut is_unsigned = false;
        let mut is_long = false;
        let mut saw_type = false;

        // Qualifier/type prefix
        while i < len {
            let id = NodeId(i as u32);
            match self.arena.sym(id) {
                "static" => is_static = true,
                "extern" => is_extern = true,
                "const" => is_const = true,
                "volatile" => is_volatile = true,
                "unsigned" => {
                    is_unsigned = true;
                    saw_type = true;
                }
                "signed" => saw_type = true,
                "long" => {
                    is_long = true;
                    saw_type = true;
                }
                "int" | "char" | "short" | "float" | "double" | "bool" | "void" | "auto" => {
                    saw_type = true;
                }
                "struct" | "class" | "union" => {
                    // `struct Name` as a type; `struct Name {` is a definition
                    let Some(next) = self.arena.next(id) else {
                        return Ok(None);
                    };
                    if !self.arena.is_name(next) {
                        return Ok(None);
                    }
                    if self
                        .arena
                        .next(next)
                        .is_some_and(|n| self.arena.sym(n) == "{")
                    {
                        return Ok(None);
                    }
                    saw_type = true;
                    i += 1; // extra step over the type name
                }
                _ => break,
            }
            i += 1;
        }
        if !saw_type || i >= len {
            return Ok(None);
        }

        // Declarators
        loop {
            let mut is_pointer = false;
            let mut is_reference = false;
            while i < len {
                match self.arena.sym(NodeId(i as u32)) {
                    "*" => {
                        is_pointer = true;
                        i += 1;
                    }
                    "&" => {
                        is_reference = true;
                        i += 1;
                    }
                    _ => break,
                }
            }
            if i >= len || !self.arena.is_name(NodeId(i as u32)) {
                return Ok(None);
            }
            let name_id = NodeId(i as u32);
            i += 1;

            let next_sym = if i < len {
                self.arena.sym(NodeId(i as u32)).to_string()
            } else {
                String::new()
            };

            if next_sym == "(" {
                return self.declare_function(start, name_id, NodeId(i as u32), is_reference);
            }

            // Plain variable declarator
            let scope = self.arena.node(name_id).scope;
            let scope_kind = self.arena.scope(scope).kind;
            let var_id = self.fresh_var();
            let mut var = Variable::new(self.arena.sym(name_id), var_id, scope);
            var.is_static = is_static;
            var.is_extern = is_extern;
            var.is_const = is_const;
            var.is_volatile = is_volatile;
            var.is_pointer = is_pointer;
            var.is_reference = is_reference;
            var.is_unsigned = is_unsigned;
            var.is_long = is_long;
            var.is_global = scope_kind == ScopeKind::Global;
            var.is_class_member = matches!(scope_kind, ScopeKind::Class | ScopeKind::Union);
            var.is_local = !var.is_global && !var.is_class_member && !is_static && !is_extern;
            var.decl_node = Some(name_id);
            self.arena.node_mut(name_id).variable_id = Some(var_id);
            maps.last_mut().unwrap().insert(var.name.clone(), var_id);
            self.symbols.insert_variable(var);
            for j in start..i {
                self.covered[j] = true;
            }

            // Array suffix
            if i < len && self.arena.sym(NodeId(i as u32)) == "[" {
                if let Some(var) = self.symbols.variable_mut(var_id) {
                    var.is_array = true;
                }
                let close = self
                    .arena
                    .link(NodeId(i as u32))
                    .ok_or_else(|| Error::parse(self.arena.node(name_id).line, "unmatched '['"))?;
                for j in i..=close.0 as usize {
                    self.covered[j] = true;
                }
                i = close.0 as usize + 1;
            }

            // Initializer
            if i < len && self.arena.sym(NodeId(i as u32)) == "=" {
                let init_end = self.scan_init_end(i + 1);
                self.init_regions.push((name_id, NodeId(init_end as u32)));
                // Resolve names inside the initializer now so later
                // declarators can refer to earlier ones.
                let mut j = i + 1;
                while j < init_end {
                    let tok = NodeId(j as u32);
                    if self.arena.is_name(tok)
                        && !self
                            .arena
                            .previous(tok)
                            .is_some_and(|p| matches!(self.arena.sym(p), "." | "->"))
                    {
                        self.resolve_name(tok, maps);
                    }
                    j += 1;
                }
                // The init region is parsed explicitly; keep the statement
                // scanner away from it.
                for j in i..init_end {
                    self.covered[j] = true;
                }
                i = init_end;
            }

            match self.arena.sym(NodeId(i.min(len - 1) as u32)) {
                "," if i < len => {
                    self.covered[i] = true;
                    i += 1;
                }
                ";" if i < len => {
                    self.covered[i] = true;
                    return Ok(Some(i + 1));
                }
                _ => return Ok(Some(i)),
            }
        }
    }

    fn declare_function(
        &mut self,
        decl_start: usize,
        name_id: NodeId,
        lparen: NodeId,
        returns_reference: bool,
    ) -> Result<Option<usize>> {
        let name = self.arena.sym(name_id).to_string();
        let rparen = self
            .arena
            .link(lparen)
            .ok_or_else(|| Error::parse(self.arena.node(lparen).line, "unmatched '('"))?;
        let after = self.arena.next(rparen);
        let is_definition = after.is_some_and(|a| self.arena.sym(a) == "{");

        let (params, pending) = self.parse_param_list(lparen, rparen, is_definition);
        let mut func = Function::new(&name);
        func.params = params;
        func.returns_reference = returns_reference;
        self.symbols.insert_function(func);

        for j in decl_start..=rparen.0 as usize {
            self.covered[j] = true;
        }

        if is_definition {
            let brace = after.unwrap();
            self.pending_params.insert(brace, pending);
            self.fn_names.insert(brace, name);
            Ok(Some(brace.0 as usize))
        } else {
            // Prototype: skip past the ';'
            let mut i = rparen.0 as usize + 1;
            if i < self.arena.len() && self.arena.sym(NodeId(i as u32)) == ";" {
                self.covered[i] = true;
                i += 1;
            }
            Ok(Some(i))
        }
    }

    fn parse_param_list(
        &mut self,
        lparen: NodeId,
        rparen: NodeId,
        assign_ids: bool,
    ) -> (Vec<Parameter>, Vec<PendingParam>) {
        let mut params = Vec::new();
        let mut pending = Vec::new();
        let mut tok = self.arena.next(lparen);
        let mut current: Vec<NodeId> = Vec::new();

        let mut flush = |this: &mut Self, group: &mut Vec<NodeId>| {
            if group.is_empty() {
                return;
            }
            let mut is_const = false;
            let mut is_reference = false;
            let mut is_pointer = false;
            let mut name: Option<NodeId> = None;
            for &id in group.iter() {
                match this.arena.sym(id) {
                    "const" => is_const = true,
                    "&" => is_reference = true,
                    "*" => is_pointer = true,
                    s if is_type_keyword(s) => {}
                    _ if this.arena.is_name(id) => name = Some(id),
                    _ => {}
                }
            }
            let var_id = match name {
                Some(n) if assign_ids => {
                    let id = this.fresh_var();
                    this.arena.node_mut(n).variable_id = Some(id);
                    Some(id)
                }
                _ => None,
            };
            params.push(Parameter {
                name: name
                    .map(|n| this.arena.sym(n).to_string())
                    .unwrap_or_default(),
                var_id,
                is_const,
                is_reference,
                is_pointer,
            });
            pending.push(PendingParam {
                name,
                var_id,
                is_const,
                is_reference,
                is_pointer,
            });
            group.clear();
        };

        while let Some(id) = tok {
            if id == rparen {
                break;
            }
            if self.arena.sym(id) == "," {
                flush(self, &mut current);
            } else if self.arena.sym(id) != "void" || self.arena.next(id) != Some(rparen) {
                current.push(id);
            }
            tok = self.arena.next(id);
        }
        flush(self, &mut current);
        (params, pending)
    }

    /// Find the end (exclusive index) of an initializer: the first `,` or `;`
    /// at bracket depth zero.
    fn scan_init_end(&self, from: usize) -> usize {
        let len = self.arena.len();
        let mut i = from;
        while i < len {
            let id = NodeId(i as u32);
            match self.arena.sym(id) {
                "(" | "[" => {
                    let Some(close) = self.arena.link(id) else {
                        return i;
                    };
                    i = close.0 as usize + 1;
                }
                "," | ";" | "{" | "}" => return i,
                _ => i += 1,
            }
        }
        len
    }

    fn fresh_var(&mut self) -> VarId {
        let id = VarId(self.next_var);
        self.next_var += 1;
        id
    }

    // -- pass 4: expression ASTs ------------------------------------------

    fn build_ast(&mut self) -> Result<()> {
        let len = self.arena.len();

        // Declaration initializers parse as `name = expr` regions.
        let regions = self.init_regions.clone();
        for (name, end) in regions {
            ExprParser::new(&mut self.arena, name, end).parse_all()?;
        }

        let mut i = 0usize;
        while i < len {
            if self.covered[i] {
                i += 1;
                continue;
            }
            let id = NodeId(i as u32);
            let sym = self.arena.sym(id).to_string();
            match sym.as_str() {
                "if" | "while" | "switch" => {
                    i = self.parse_header_condition(id)?;
                }
                "for" => {
                    i = self.parse_for_header(id)?;
                }
                "return" | "throw" => {
                    let start = i + 1;
                    let end = self.statement_region_end(start);
                    if end > start && !self.covered[start] {
                        ExprParser::new(&mut self.arena, NodeId(start as u32), NodeId(end as u32))
                            .parse_all()?;
                    }
                    i = end + 1;
                }
                "case" => {
                    let start = i + 1;
                    let mut end = start;
                    while end < len && self.arena.sym(NodeId(end as u32)) != ":" {
                        end += 1;
                    }
                    if end > start {
                        ExprParser::new(&mut self.arena, NodeId(start as u32), NodeId(end as u32))
                            .parse_all()?;
                    }
                    i = end + 1;
                }
                "asm" => {
                    // Opaque; skip a parenthesized payload if present
                    if let Some(next) = self.arena.next(id) {
                        if self.arena.sym(next) == "(" {
                            if let Some(close) = self.arena.link(next) {
                                i = close.0 as usize + 1;
                                continue;
                            }
                        }
                    }
                    i += 1;
                }
                "goto" => i += 2,
                _ if self.arena.is_name(id) && self.is_label(id) => i += 2,
                _ if self.starts_expression(id) => {
                    let end = self.statement_region_end(i);
                    if end > i {
                        ExprParser::new(&mut self.arena, id, NodeId(end as u32)).parse_all()?;
                    }
                    i = end + 1;
                }
                _ => i += 1,
            }
        }
        Ok(())
    }

    fn parse_header_condition(&mut self, keyword: NodeId) -> Result<usize> {
        let Some(lparen) = self.arena.next(keyword) else {
            return Ok(keyword.0 as usize + 1);
        };
        if self.arena.sym(lparen) != "(" {
            return Ok(keyword.0 as usize + 1);
        }
        let rparen = self
            .arena
            .link(lparen)
            .ok_or_else(|| Error::parse(self.arena.node(lparen).line, "unmatched '('"))?;
        let start = NodeId(lparen.0 + 1);
        if start != rparen {
            ExprParser::new(&mut self.arena, start, rparen).parse_all()?;
        }
        Ok(rparen.0 as usize + 1)
    }

    fn parse_for_header(&mut self, keyword: NodeId) -> Result<usize> {
        let Some(lparen) = self.arena.next(keyword) else {
            return Ok(keyword.0 as usize + 1);
        };
        if self.arena.sym(lparen) != "(" {
            return Ok(keyword.0 as usize + 1);
        }
        let rparen = self
            .arena
            .link(lparen)
            .ok_or_else(|| Error::parse(self.arena.node(lparen).line, "unmatched '('"))?;
        // Split the header at top-level semicolons
        let mut boundaries = vec![lparen.0 as usize];
        let mut i = lparen.0 as usize + 1;
        while i < rparen.0 as usize {
            let id = NodeId(i as u32);
            match self.arena.sym(id) {
                "(" | "[" => {
                    i = self.arena.link(id).map(|c| c.0 as usize + 1).unwrap_or(i + 1);
                }
                ";" => {
                    boundaries.push(i);
                    i += 1;
                }
                _ => i += 1,
            }
        }
        boundaries.push(rparen.0 as usize);
        for pair in boundaries.windows(2) {
            let (start, end) = (pair[0] + 1, pair[1]);
            if start >= end || self.covered[start] {
                continue;
            }
            ExprParser::new(&mut self.arena, NodeId(start as u32), NodeId(end as u32))
                .parse_all()?;
        }
        Ok(rparen.0 as usize + 1)
    }

    fn statement_region_end(&self, from: usize) -> usize {
        let len = self.arena.len();
        let mut i = from;
        while i < len {
            let id = NodeId(i as u32);
            match self.arena.sym(id) {
                "(" | "[" => {
                    let Some(close) = self.arena.link(id) else {
                        return i;
                    };
                    i = close.0 as usize + 1;
                }
                ";" | "{" | "}" => return i,
                _ => i += 1,
            }
        }
        len
    }

    fn is_label(&self, id: NodeId) -> bool {
        let stmt_start = match self.arena.previous(id) {
            None => true,
            Some(p) => matches!(self.arena.sym(p), ";" | "{" | "}"),
        };
        stmt_start
            && self
                .arena
                .next(id)
                .is_some_and(|n| self.arena.sym(n) == ":")
    }

    fn starts_expression(&self, id: NodeId) -> bool {
        match self.arena.node(id).kind {
            NodeKind::Name | NodeKind::Number => true,
            NodeKind::Op => matches!(
                self.arena.sym(id),
                "!" | "~" | "*" | "&" | "++" | "--" | "-" | "+"
            ),
            NodeKind::Punct => self.arena.sym(id) == "(",
            NodeKind::Keyword => false,
        }
    }

    // -- pass 5: expression identities ------------------------------------

    fn assign_expr_ids(&mut self) {
        let mut keys: HashMap<NodeId, String> = HashMap::new();
        let mut interned: HashMap<String, u32> = HashMap::new();
        let mut next_id = 1u32;

        for i in 0..self.arena.len() {
            let id = NodeId(i as u32);
            let node = self.arena.node(id);
            let participates = node.operand1.is_some()
                || node.variable_id.is_some()
                || node.kind == NodeKind::Number;
            if !participates {
                continue;
            }
            let key = self.structural_key(id, &mut keys);
            let expr_id = *interned.entry(key).or_insert_with(|| {
                let v = next_id;
                next_id += 1;
                v
            });
            self.arena.node_mut(id).expression_id = Some(crate::core::ExprId(expr_id));
        }
    }

    fn structural_key(&self, id: NodeId, memo: &mut HashMap<NodeId, String>) -> String {
        if let Some(k) = memo.get(&id) {
            return k.clone();
        }
        let node = self.arena.node(id);
        let key = if let Some(var) = node.variable_id {
            format!("v{}", var.0)
        } else if node.kind == NodeKind::Number {
            format!("k{}", node.known_int_value.unwrap_or_default())
        } else if node.operand1.is_none() {
            format!("n:{}", node.symbol)
        } else {
            let k1 = node
                .operand1
                .map(|c| self.structural_key(c, memo))
                .unwrap_or_default();
            let k2 = node
                .operand2
                .map(|c| self.structural_key(c, memo))
                .unwrap_or_default();
            // Casts to different types must get different identities
            let cast = if node.flags.cast {
                self.cast_type_text(id)
            } else {
                String::new()
            };
            format!("({}{}|{}|{})", node.symbol, cast, k1, k2)
        };
        memo.insert(id, key.clone());
        key
    }

    /// Type tokens inside a cast's parentheses, e.g. `cast:int*`.
    fn cast_type_text(&self, lparen: NodeId) -> String {
        let mut text = String::from("cast:");
        if let Some(rparen) = self.arena.link(lparen) {
            for tok in self.arena.stream(lparen, rparen).skip(1) {
                text.push_str(self.arena.sym(tok));
            }
        }
        text
    }

    // -- pass 6: symbol fixups --------------------------------------------

    fn fixup_symbols(&mut self) {
        // Initializer roots: the declaration name's parent is the `=` node
        for (name, _) in &self.init_regions {
            let Some(var_id) = self.arena.node(*name).variable_id else {
                continue;
            };
            let Some(assign) = self.arena.parent(*name) else {
                continue;
            };
            if self.arena.sym(assign) != "=" {
                continue;
            }
            let init = self.arena.op2(assign);
            if let Some(var) = self.symbols.variable_mut(var_id) {
                var.initializer = init;
            }
        }

        // Return statements per function body
        let bodies: Vec<(String, ScopeId)> = self
            .fn_names
            .iter()
            .map(|(brace, name)| (name.clone(), self.arena.node(*brace).scope))
            .collect();
        for (name, scope) in bodies {
            let (start, end) = {
                let s = self.arena.scope(scope);
                (s.body_start, s.body_end)
            };
            let returns: Vec<NodeId> = self
                .arena
                .stream(start, end)
                .filter(|&id| self.arena.sym(id) == "return")
                .collect();
            if let Some(func) = self.symbols.function_mut(&name) {
                func.body = Some(scope);
                func.return_statements = returns;
            }
        }
    }
}

fn is_decl_start(sym: &str) -> bool {
    matches!(
        sym,
        "static"
            | "extern"
            | "const"
            | "volatile"
            | "unsigned"
            | "signed"
            | "int"
            | "char"
            | "short"
            | "long"
            | "float"
            | "double"
            | "bool"
            | "void"
            | "auto"
            | "struct"
            | "class"
            | "union"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScopeKind;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_assignment_ast() {
        let prog = Program::parse("void f() { int x; x = 1 + 2; }").unwrap();
        let assign = prog.find("=").unwrap();
        let x = prog.arena.op1(assign).unwrap();
        let plus = prog.arena.op2(assign).unwrap();
        assert_eq!(prog.arena.sym(x), "x");
        assert_eq!(prog.arena.sym(plus), "+");
        assert!(prog.arena.node(x).variable_id.is_some());
    }

    #[test]
    fn declaration_initializer_recorded() {
        let prog = Program::parse("void f() { int x = 40 + 2; }").unwrap();
        let x = prog.find("x").unwrap();
        let var_id = prog.arena.node(x).variable_id.unwrap();
        let var = prog.symbols.variable(var_id).unwrap();
        let init = var.initializer.unwrap();
        assert_eq!(prog.arena.sym(init), "+");
        assert!(var.is_local);
    }

    #[test]
    fn scope_tree_kinds() {
        let src = indoc! {"
            void f(int n) {
                while (n > 0) {
                    if (n == 1) {
                        n = 0;
                    }
                }
            }
        "};
        let prog = Program::parse(src).unwrap();
        let kinds: Vec<ScopeKind> = (0..prog.arena.scope_count())
            .map(|i| prog.arena.scope(crate::core::ScopeId(i as u32)).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ScopeKind::Global,
                ScopeKind::Function,
                ScopeKind::Loop,
                ScopeKind::Conditional
            ]
        );
    }

    #[test]
    fn resolves_names_per_scope() {
        let src = "void f() { int x; { int x; x = 1; } x = 2; }";
        let prog = Program::parse(src).unwrap();
        let inner_use = prog.find_pattern("x = 1").unwrap();
        let outer_use = prog.find_pattern("x = 2").unwrap();
        let inner_id = prog.arena.node(inner_use).variable_id.unwrap();
        let outer_id = prog.arena.node(outer_use).variable_id.unwrap();
        assert_ne!(inner_id, outer_id);
    }

    #[test]
    fn recurring_expressions_share_expr_ids() {
        let prog = Program::parse("void f(int a, int b) { int x = a + b; int y = a + b; }")
            .unwrap();
        let first = prog.find_nth("+", 0).unwrap();
        let second = prog.find_nth("+", 1).unwrap();
        assert_eq!(
            prog.arena.node(first).expression_id,
            prog.arena.node(second).expression_id
        );
    }

    #[test]
    fn function_symbols_recorded() {
        let src = indoc! {"
            int& pick(int& a, int& b) {
                return a;
            }
        "};
        let prog = Program::parse(src).unwrap();
        let func = prog.symbols.function("pick").unwrap();
        assert!(func.returns_reference);
        assert_eq!(func.params.len(), 2);
        assert!(func.params[0].is_reference);
        assert_eq!(func.return_statements.len(), 1);
    }

    #[test]
    fn call_ast_uses_paren_node() {
        let prog = Program::parse("void f(int x) { g(x, 1); }").unwrap();
        let call = prog.find_pattern("( %var%").unwrap();
        assert_eq!(prog.arena.sym(prog.arena.op1(call).unwrap()), "g");
        let args = prog.arena.op2(call).unwrap();
        assert_eq!(prog.arena.sym(args), ",");
    }

    #[test]
    fn member_access_left_unresolved() {
        let prog = Program::parse("struct S { int x; }; void f(struct S s) { s.x = 1; }").unwrap();
        let dot = prog.find(".").unwrap();
        let member = prog.arena.op2(dot).unwrap();
        assert_eq!(prog.arena.sym(member), "x");
        assert!(prog.arena.node(member).variable_id.is_none());
        let base = prog.arena.op1(dot).unwrap();
        assert!(prog.arena.node(base).variable_id.is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Program::parse("void f() { int x = $; }").is_err());
        assert!(Program::parse("void f() { (").is_err());
    }

    #[test]
    fn signedness_and_width_qualifiers_recorded() {
        let prog = Program::parse("void f() { unsigned long a; long b; int c; a = 1; }").unwrap();
        let var_of = |name: &str| {
            prog.symbols
                .variable(prog.arena.node(prog.find(name).unwrap()).variable_id.unwrap())
                .unwrap()
        };
        assert!(var_of("a").is_unsigned);
        assert!(var_of("a").is_long);
        assert!(!var_of("b").is_unsigned);
        assert!(var_of("b").is_long);
        assert!(!var_of("c").is_unsigned);
        assert!(!var_of("c").is_long);
    }

    #[test]
    fn cast_type_changes_expression_identity() {
        let prog =
            Program::parse("void f(int x) { int a; a = (long) x; int b; b = (char) x; }").unwrap();
        let first = prog.find_nth("(", 1).unwrap();
        let second = prog.find_nth("(", 2).unwrap();
        assert!(prog.arena.node(first).flags.cast);
        assert_ne!(
            prog.arena.node(first).expression_id,
            prog.arena.node(second).expression_id
        );
    }

    #[test]
    fn pointer_and_reference_flags() {
        let prog = Program::parse("void f() { int y; int* p = &y; int& r = y; }").unwrap();
        let p = prog.find("p").unwrap();
        let p_var = prog
            .symbols
            .variable(prog.arena.node(p).variable_id.unwrap())
            .unwrap();
        assert!(p_var.is_pointer);
        let r = prog.find("r").unwrap();
        let r_var = prog
            .symbols
            .variable(prog.arena.node(r).variable_id.unwrap())
            .unwrap();
        assert!(r_var.is_reference);
        assert!(r_var.initializer.is_some());
    }
}
