//! Token/AST node model.
//!
//! The node stream is an arena: a flat vector of [`Node`]s pushed in document
//! order, with AST operand links, a cached parent link, sibling links for
//! flat traversal, and bracket links pairing `(`/`)`, `{`/`}` and `[`/`]`.
//! Because every link is an `Option<NodeId>` into the arena there is no owned
//! tree and no ownership cycle; the arena owns all nodes uniformly.
//!
//! The model is immutable during analysis. The analysis modules only ever
//! borrow `&NodeArena`; all mutation happens during construction in
//! [`crate::parse`].

pub mod pattern;

use crate::core::{ExprId, NodeId, ScopeId, VarId, MAX_EXPR_DEPTH};
use serde::{Deserialize, Serialize};

/// Lexical classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Identifier
    Name,
    /// Integer literal
    Number,
    /// Operator
    Op,
    /// Language keyword
    Keyword,
    /// Punctuation: brackets, separators
    Punct,
}

/// Read-only node flags consulted by the equivalence engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Token was produced by macro expansion
    pub expanded_macro: bool,
    /// Token originates from a template argument
    pub template_arg: bool,
    /// Unsigned arithmetic type
    pub is_unsigned: bool,
    /// Long/long-double width
    pub is_long: bool,
    /// `(` of a cast expression rather than a call or grouping
    pub cast: bool,
}

/// A single token with its AST links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub symbol: String,
    pub kind: NodeKind,
    pub line: usize,
    /// First AST operand; `None` for leaves
    pub operand1: Option<NodeId>,
    /// Second AST operand; `None` for leaves and unary operators
    pub operand2: Option<NodeId>,
    /// Cached AST parent, never mutated by analysis
    pub parent: Option<NodeId>,
    pub previous: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Matching bracket for `(`/`)`, `{`/`}`, `[`/`]`
    pub link: Option<NodeId>,
    pub variable_id: Option<VarId>,
    pub expression_id: Option<ExprId>,
    pub scope: ScopeId,
    pub known_int_value: Option<i64>,
    pub flags: NodeFlags,
}

impl Node {
    pub fn new(symbol: impl Into<String>, kind: NodeKind, line: usize) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            line,
            operand1: None,
            operand2: None,
            parent: None,
            previous: None,
            next: None,
            link: None,
            variable_id: None,
            expression_id: None,
            scope: ScopeId(0),
            known_int_value: None,
            flags: NodeFlags::default(),
        }
    }
}

/// Kind of a lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// File scope (root of the scope tree)
    Global,
    Function,
    /// `while`/`for` body
    Loop,
    Switch,
    /// `do { .. } while` body
    Do,
    /// `if`/`else` body
    Conditional,
    Lambda,
    Class,
    Union,
    /// Bare `{ .. }` block
    Unconditional,
}

impl ScopeKind {
    /// Scopes whose closing brace re-enters the body (backward flow).
    pub fn is_loop(self) -> bool {
        matches!(self, ScopeKind::Loop | ScopeKind::Do)
    }

    /// Scopes a `break` statement exits.
    pub fn is_breakable(self) -> bool {
        matches!(self, ScopeKind::Loop | ScopeKind::Do | ScopeKind::Switch)
    }
}

/// A lexical scope delimited by `body_start`/`body_end` braces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub body_start: NodeId,
    pub body_end: NodeId,
    pub nested_in: Option<ScopeId>,
}

/// Arena owning the token stream, its AST links and the scope tree.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NodeArena {
    nodes: Vec<Node>,
    scopes: Vec<Scope>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        if let Some(prev) = self.nodes.last_mut() {
            prev.next = Some(id);
            node.previous = Some(NodeId(self.nodes.len() as u32 - 1));
        }
        self.nodes.push(node);
        id
    }

    pub fn push_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn sym(&self, id: NodeId) -> &str {
        &self.node(id).symbol
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    pub fn previous(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).previous
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn op1(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).operand1
    }

    pub fn op2(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).operand2
    }

    pub fn link(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).link
    }

    pub fn scope_of(&self, id: NodeId) -> &Scope {
        self.scope(self.node(id).scope)
    }

    pub fn is_name(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Name
    }

    pub fn is_number(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Number
    }

    pub fn is_keyword(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Keyword
    }

    pub fn is_comparison_op(&self, id: NodeId) -> bool {
        matches!(self.sym(id), "<" | "<=" | ">" | ">=" | "==" | "!=")
    }

    pub fn is_assignment_op(&self, id: NodeId) -> bool {
        matches!(
            self.sym(id),
            "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>="
        )
    }

    pub fn is_inc_dec(&self, id: NodeId) -> bool {
        matches!(self.sym(id), "++" | "--")
    }

    /// True if `id` is the given operator applied as a unary AST node.
    pub fn is_unary_op(&self, id: NodeId, sym: &str) -> bool {
        self.sym(id) == sym && self.op1(id).is_some() && self.op2(id).is_none()
    }

    pub fn known_int(&self, id: NodeId) -> Option<i64> {
        self.node(id).known_int_value
    }

    /// Document-order comparison. Holds because ids are assigned in push
    /// order and pushes happen in stream order.
    pub fn precedes(&self, a: NodeId, b: NodeId) -> bool {
        a < b
    }

    /// Climb AST parents to the root of the expression containing `id`.
    /// The climb is depth-bounded; a parent chain longer than the expression
    /// depth limit stops where it is.
    pub fn expr_root(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        for _ in 0..=MAX_EXPR_DEPTH {
            match self.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        cur
    }

    /// Iterate the flat stream from `start` (inclusive) to `end` (exclusive).
    pub fn stream(&self, start: NodeId, end: NodeId) -> StreamIter<'_> {
        StreamIter {
            arena: self,
            cur: Some(start),
            end,
        }
    }

    /// True if the subtree rooted at `root` contains `needle`.
    pub fn has_operand(&self, root: NodeId, needle: NodeId) -> bool {
        self.has_operand_rec(root, needle, 0)
    }

    fn has_operand_rec(&self, root: NodeId, needle: NodeId, depth: usize) -> bool {
        if root == needle {
            return true;
        }
        if depth > MAX_EXPR_DEPTH {
            return false;
        }
        self.op1(root)
            .is_some_and(|c| self.has_operand_rec(c, needle, depth + 1))
            || self
                .op2(root)
                .is_some_and(|c| self.has_operand_rec(c, needle, depth + 1))
    }

    /// Innermost enclosing scope of `kind_filter`, starting at `scope`.
    pub fn enclosing_scope(
        &self,
        mut scope: ScopeId,
        pred: impl Fn(ScopeKind) -> bool,
    ) -> Option<ScopeId> {
        loop {
            if pred(self.scope(scope).kind) {
                return Some(scope);
            }
            scope = self.scope(scope).nested_in?;
        }
    }

    /// Body of the function scope enclosing `id`, if any.
    pub fn enclosing_function(&self, id: NodeId) -> Option<&Scope> {
        self.enclosing_scope(self.node(id).scope, |k| k == ScopeKind::Function)
            .map(|s| self.scope(s))
    }
}

/// Iterator over the flat token stream.
pub struct StreamIter<'a> {
    arena: &'a NodeArena,
    cur: Option<NodeId>,
    end: NodeId,
}

impl Iterator for StreamIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.cur?;
        if cur == self.end {
            return None;
        }
        self.cur = self.arena.next(cur);
        Some(cur)
    }
}
