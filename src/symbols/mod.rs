//! Symbol records attached to the node stream.
//!
//! Variable and function records are the symbol/type collaborator contract:
//! storage class and type shape for variables, const/purity and
//! reference-return information for functions. The analysis modules consult
//! these read-only; names that cannot be resolved here fall back to the
//! library configuration tables in [`crate::library`].

use crate::core::{NodeId, ScopeId, VarId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resolved variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub var_id: VarId,
    /// Scope the declaration appears in
    pub scope: ScopeId,
    pub is_local: bool,
    pub is_static: bool,
    pub is_extern: bool,
    pub is_global: bool,
    pub is_argument: bool,
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_reference: bool,
    pub is_pointer: bool,
    pub is_array: bool,
    pub is_class_member: bool,
    pub is_unsigned: bool,
    pub is_long: bool,
    /// Name token of the declaration
    pub decl_node: Option<NodeId>,
    /// Root of the initializer expression, if the declaration has one
    pub initializer: Option<NodeId>,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_id: VarId, scope: ScopeId) -> Self {
        Self {
            name: name.into(),
            var_id,
            scope,
            is_local: false,
            is_static: false,
            is_extern: false,
            is_global: false,
            is_argument: false,
            is_const: false,
            is_volatile: false,
            is_reference: false,
            is_pointer: false,
            is_array: false,
            is_class_member: false,
            is_unsigned: false,
            is_long: false,
            decl_node: None,
            initializer: None,
        }
    }

    /// Local storage: block-scope or parameter, not static/extern.
    pub fn has_local_storage(&self) -> bool {
        (self.is_local || self.is_argument) && !self.is_static && !self.is_extern
    }
}

/// Shape of one formal parameter, as far as the kernel cares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub var_id: Option<VarId>,
    pub is_const: bool,
    pub is_reference: bool,
    pub is_pointer: bool,
}

impl Parameter {
    /// Can a call mutate the argument bound to this parameter?
    pub fn can_mutate_argument(&self) -> bool {
        (self.is_reference || self.is_pointer) && !self.is_const
    }
}

/// A function with a known definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    /// `const` member function
    pub is_const: bool,
    /// Declared pure (no observable side effects)
    pub is_pure: bool,
    pub returns_reference: bool,
    /// Body scope, when the definition was seen
    pub body: Option<ScopeId>,
    /// `return` keyword tokens inside the body
    pub return_statements: Vec<NodeId>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            is_const: false,
            is_pure: false,
            returns_reference: false,
            body: None,
            return_statements: Vec::new(),
        }
    }
}

/// Lookup tables for resolved symbols.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    variables: HashMap<VarId, Variable>,
    functions: HashMap<String, Function>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_variable(&mut self, var: Variable) {
        self.variables.insert(var.var_id, var);
    }

    pub fn insert_function(&mut self, func: Function) {
        self.functions.insert(func.name.clone(), func);
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    pub(crate) fn variable_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.variables.get_mut(&id)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub(crate) fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Number of local variables declared directly in `scope`.
    pub fn locals_in_scope(&self, scope: ScopeId) -> usize {
        self.variables
            .values()
            .filter(|v| v.scope == scope && v.is_local)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_storage_excludes_static() {
        let mut v = Variable::new("x", VarId(1), ScopeId(1));
        v.is_local = true;
        assert!(v.has_local_storage());
        v.is_static = true;
        assert!(!v.has_local_storage());
    }

    #[test]
    fn parameter_mutability() {
        let p = Parameter {
            name: "out".into(),
            var_id: None,
            is_const: false,
            is_reference: true,
            is_pointer: false,
        };
        assert!(p.can_mutate_argument());
        let q = Parameter {
            name: "in".into(),
            var_id: None,
            is_const: true,
            is_reference: true,
            is_pointer: false,
        };
        assert!(!q.can_mutate_argument());
    }
}
