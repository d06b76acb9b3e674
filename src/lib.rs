//! astflow — AST query and forward-dataflow kernel for C/C++ static
//! analysis.
//!
//! The crate answers the questions a lint checker asks about a parsed
//! token stream: are two expressions interchangeable, are they logical
//! opposites, does a token range overwrite or read a value, does a
//! reference chain lead back to a variable, could an expression be
//! reached through an alias.
//!
//! The entry points live in [`analysis`]; [`parse`] builds the node
//! arena and symbol table from a C-like source subset, and [`library`]
//! supplies metadata about functions the analysis cannot see.
//!
//! ```
//! use astflow::{AnalysisContext, ForwardAnalyzer, LibraryConfig, Program};
//!
//! let prog = Program::parse("void f() { int x; x = 1; x = 2; }").unwrap();
//! let lib = LibraryConfig::default();
//! let ctx = AnalysisContext::new(&prog.arena, &prog.symbols, &lib);
//! let fwd = ForwardAnalyzer::new(&ctx);
//!
//! let first = prog.find_pattern("x = 1").unwrap();
//! let start = prog.find_pattern("x = 2").unwrap();
//! assert!(fwd.reassign(first, start, prog.last()).is_some());
//! ```

pub mod analysis;
pub mod ast;
pub mod core;
pub mod library;
pub mod parse;
pub mod symbols;

pub use analysis::{
    follow_all_references, get_parent_lifetime, is_alias_of, is_opposite_expression,
    is_same_expression, is_variable_changed, is_variable_changed_by_call,
    is_without_side_effects, AliasAnswer, AnalysisContext, AnalysisOutcome, Cache,
    ForwardAnalyzer, Mode, ReferenceToken, VarIdSet,
};
pub use ast::{Node, NodeArena, NodeKind, Scope, ScopeKind};
pub use core::{Confidence, Error, ExprId, NodeId, Result, ScopeId, VarId};
pub use library::{ArgDirection, ContainerAction, FunctionSpec, LibraryConfig};
pub use parse::Program;
pub use symbols::{Function, Parameter, SymbolTable, Variable};
