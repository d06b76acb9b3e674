//! Expression AST construction by precedence climbing.
//!
//! Operates on a half-open token range of the arena and wires up
//! `operand1`/`operand2`/`parent` links on the existing nodes. Parenthesized
//! groupings stay transparent: the `(` node gets no operands and the inner
//! expression attaches across it, so only calls, casts and index brackets
//! appear as AST nodes.

use crate::ast::{NodeArena, NodeKind};
use crate::core::{Error, NodeId, Result};

const TYPE_KEYWORDS: &[&str] = &[
    "int", "char", "short", "long", "float", "double", "bool", "void", "unsigned", "signed",
    "auto", "const", "struct", "class", "union",
];

pub(crate) fn is_type_keyword(sym: &str) -> bool {
    TYPE_KEYWORDS.contains(&sym)
}

fn binary_precedence(sym: &str) -> Option<u8> {
    Some(match sym {
        "," => 0,
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => 1,
        "?" => 2,
        "||" => 3,
        "&&" => 4,
        "|" => 5,
        "^" => 6,
        "&" => 7,
        "==" | "!=" => 8,
        "<" | "<=" | ">" | ">=" => 9,
        "<<" | ">>" => 10,
        "+" | "-" => 11,
        "*" | "/" | "%" => 12,
        _ => return None,
    })
}

fn is_prefix_op(sym: &str) -> bool {
    matches!(sym, "!" | "~" | "++" | "--" | "-" | "+" | "*" | "&")
}

pub(crate) struct ExprParser<'a> {
    arena: &'a mut NodeArena,
    cur: Option<NodeId>,
    end: NodeId,
}

impl<'a> ExprParser<'a> {
    pub fn new(arena: &'a mut NodeArena, start: NodeId, end: NodeId) -> Self {
        let cur = if start == end { None } else { Some(start) };
        Self { arena, cur, end }
    }

    /// Parse the whole range as one expression; every token must be consumed.
    pub fn parse_all(mut self) -> Result<Option<NodeId>> {
        if self.cur.is_none() {
            return Ok(None);
        }
        let root = self.parse_binary(0)?;
        if let Some(left) = self.cur {
            return Err(self.error(left, "trailing tokens in expression"));
        }
        Ok(Some(root))
    }

    fn error(&self, at: NodeId, message: &str) -> Error {
        Error::parse(
            self.arena.node(at).line,
            format!("{} near '{}'", message, self.arena.sym(at)),
        )
    }

    fn peek(&self) -> Option<NodeId> {
        self.cur
    }

    fn peek_sym(&self) -> Option<&str> {
        self.cur.map(|id| self.arena.sym(id))
    }

    fn advance(&mut self) -> Option<NodeId> {
        let cur = self.cur?;
        let next = self.arena.next(cur);
        self.cur = next.filter(|&n| n != self.end);
        Some(cur)
    }

    fn expect(&mut self, sym: &str) -> Result<NodeId> {
        match self.peek() {
            Some(id) if self.arena.sym(id) == sym => Ok(self.advance().unwrap()),
            Some(id) => Err(self.error(id, &format!("expected '{}'", sym))),
            None => Err(Error::parse(0, format!("expected '{}', found end", sym))),
        }
    }

    fn set_unary(&mut self, op: NodeId, operand: NodeId) {
        self.arena.node_mut(op).operand1 = Some(operand);
        self.arena.node_mut(operand).parent = Some(op);
    }

    fn set_binary(&mut self, op: NodeId, lhs: NodeId, rhs: NodeId) {
        self.arena.node_mut(op).operand1 = Some(lhs);
        self.arena.node_mut(op).operand2 = Some(rhs);
        self.arena.node_mut(lhs).parent = Some(op);
        self.arena.node_mut(rhs).parent = Some(op);
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<NodeId> {
        let mut lhs = self.parse_unary()?;
        while let Some(op_id) = self.peek() {
            let sym = self.arena.sym(op_id).to_string();
            let Some(prec) = binary_precedence(&sym) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            if sym == "?" {
                // cond ? a : b  -- the ':' node holds the two branches
                let then_branch = self.parse_binary(0)?;
                let colon = self.expect(":")?;
                let else_branch = self.parse_binary(2)?;
                self.set_binary(colon, then_branch, else_branch);
                self.set_binary(op_id, lhs, colon);
                lhs = op_id;
                continue;
            }
            // Assignment is right-associative, everything else left
            let next_min = if prec == 1 { prec } else { prec + 1 };
            let rhs = self.parse_binary(next_min)?;
            self.set_binary(op_id, lhs, rhs);
            lhs = op_id;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<NodeId> {
        let Some(tok) = self.peek() else {
            return Err(Error::parse(0, "expected expression, found end"));
        };
        let sym = self.arena.sym(tok).to_string();

        if self.arena.node(tok).kind == NodeKind::Op && is_prefix_op(&sym) {
            self.advance();
            let operand = self.parse_unary()?;
            self.set_unary(tok, operand);
            return Ok(tok);
        }

        if sym == "sizeof" {
            self.advance();
            let lparen = self.expect("(")?;
            let rparen = self
                .arena
                .link(lparen)
                .ok_or_else(|| self.error(lparen, "unmatched '('"))?;
            self.skip_to_after(rparen);
            // sizeof(..) is a compile-time constant; treat the keyword as leaf
            return Ok(tok);
        }

        if sym == "(" {
            if self.is_cast(tok) {
                let rparen = self.arena.link(tok).unwrap();
                self.arena.node_mut(tok).flags.cast = true;
                self.skip_to_after(rparen);
                let operand = self.parse_unary()?;
                self.set_unary(tok, operand);
                return Ok(tok);
            }
            self.advance();
            let inner = self.parse_binary(0)?;
            self.expect(")")?;
            return self.parse_postfix(inner);
        }

        match self.arena.node(tok).kind {
            NodeKind::Name | NodeKind::Number => {
                self.advance();
                self.parse_postfix(tok)
            }
            _ => Err(self.error(tok, "expected expression")),
        }
    }

    fn parse_postfix(&mut self, base: NodeId) -> Result<NodeId> {
        let mut base = base;
        while let Some(sym) = self.peek_sym() {
            match sym {
                "(" => {
                    let lparen = self.advance().unwrap();
                    if self.peek_sym() == Some(")") {
                        self.advance();
                        self.arena.node_mut(lparen).operand1 = Some(base);
                        self.arena.node_mut(base).parent = Some(lparen);
                    } else {
                        let args = self.parse_binary(0)?;
                        self.expect(")")?;
                        self.set_binary(lparen, base, args);
                    }
                    base = lparen;
                }
                "[" => {
                    let lbracket = self.advance().unwrap();
                    let index = self.parse_binary(0)?;
                    self.expect("]")?;
                    self.set_binary(lbracket, base, index);
                    base = lbracket;
                }
                "." | "->" => {
                    let access = self.advance().unwrap();
                    let Some(member) = self.peek() else {
                        return Err(self.error(access, "expected member name"));
                    };
                    if !self.arena.is_name(member) {
                        return Err(self.error(member, "expected member name"));
                    }
                    self.advance();
                    self.set_binary(access, base, member);
                    base = access;
                }
                "++" | "--" => {
                    let op = self.advance().unwrap();
                    self.set_unary(op, base);
                    base = op;
                }
                _ => break,
            }
        }
        Ok(base)
    }

    /// True if `lparen` opens a cast: every token up to the matching `)` is a
    /// type keyword or pointer/reference decoration, and an operand follows.
    fn is_cast(&self, lparen: NodeId) -> bool {
        let Some(rparen) = self.arena.link(lparen) else {
            return false;
        };
        if rparen >= self.end {
            return false;
        }
        let mut tok = self.arena.next(lparen);
        let mut saw_type = false;
        while let Some(id) = tok {
            if id == rparen {
                break;
            }
            match self.arena.sym(id) {
                "*" | "&" => {}
                sym if is_type_keyword(sym) => saw_type = true,
                _ => return false,
            }
            tok = self.arena.next(id);
        }
        saw_type && self.arena.next(rparen).is_some_and(|n| n != self.end)
    }

    fn skip_to_after(&mut self, tok: NodeId) {
        self.cur = self.arena.next(tok).filter(|&n| n != self.end);
    }
}

/// Fold known integer values bottom-up through unary `+`/`-` and groupings.
pub(crate) fn fold_known_values(arena: &mut NodeArena) {
    // Literals get their value at push time; only simple unary folds remain.
    // Prefix operators precede their operand in the stream, so walk backwards.
    for i in (0..arena.len()).rev() {
        let id = NodeId(i as u32);
        if arena.known_int(id).is_some() {
            continue;
        }
        let sym = arena.sym(id).to_string();
        if (sym == "-" || sym == "+") && arena.op2(id).is_none() {
            if let Some(op) = arena.op1(id) {
                if let Some(v) = arena.known_int(op) {
                    let folded = if sym == "-" { v.checked_neg() } else { Some(v) };
                    arena.node_mut(id).known_int_value = folded;
                }
            }
        }
    }
}
