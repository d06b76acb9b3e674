//! Library configuration: metadata about functions the analysis cannot see.
//!
//! For callees without a visible definition the kernel falls back to these
//! tables: argument direction (`in`/`out`/`inout`), purity, and container
//! method classification (mutating vs. observing). The built-in defaults
//! cover common C standard-library and C++ container names; embedders extend
//! them with TOML files via [`loader`].

pub mod loader;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Declared data direction of one call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgDirection {
    /// Read only; the call cannot change the argument
    In,
    /// Written only; the call is the intended writer
    Out,
    /// Read and written
    InOut,
}

impl ArgDirection {
    pub fn writes(self) -> bool {
        matches!(self, ArgDirection::Out | ArgDirection::InOut)
    }
}

/// Everything the tables know about one external function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FunctionSpec {
    /// Re-evaluating the call yields the same value and has no side effects
    pub pure: bool,
    /// Direction per argument position, left to right
    pub arg_directions: Vec<ArgDirection>,
}

/// Whether a container method mutates the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Mutating,
    Observing,
}

/// External-metadata tables consulted for unresolved names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LibraryConfig {
    pub functions: HashMap<String, FunctionSpec>,
    /// Container method names that mutate the receiver
    pub container_mutating: HashSet<String>,
    /// Container method names that only observe the receiver
    pub container_observing: HashSet<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl LibraryConfig {
    /// Empty tables; every lookup is unknown.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
            container_mutating: HashSet::new(),
            container_observing: HashSet::new(),
        }
    }

    /// True when the tables vouch that `name` has no side effects.
    pub fn is_pure_function(&self, name: &str) -> bool {
        self.functions.get(name).is_some_and(|f| f.pure)
    }

    /// Declared direction of argument `index` (0-based) of `name`.
    pub fn arg_direction(&self, name: &str, index: usize) -> Option<ArgDirection> {
        self.functions
            .get(name)
            .and_then(|f| f.arg_directions.get(index))
            .copied()
    }

    /// Classify a container method name, if recognized.
    pub fn container_action(&self, method: &str) -> Option<ContainerAction> {
        if self.container_mutating.contains(method) {
            Some(ContainerAction::Mutating)
        } else if self.container_observing.contains(method) {
            Some(ContainerAction::Observing)
        } else {
            None
        }
    }

    /// Merge `other` over `self`; later tables win on conflicts.
    pub fn merge(&mut self, other: LibraryConfig) {
        self.functions.extend(other.functions);
        self.container_mutating.extend(other.container_mutating);
        self.container_observing.extend(other.container_observing);
    }
}

fn spec(pure: bool, dirs: &[ArgDirection]) -> FunctionSpec {
    FunctionSpec {
        pure,
        arg_directions: dirs.to_vec(),
    }
}

/// Built-in default tables for common standard-library names.
static BUILTIN: Lazy<LibraryConfig> = Lazy::new(|| {
    use ArgDirection::{In, InOut, Out};
    let mut functions = HashMap::new();
    functions.insert("abs".into(), spec(true, &[In]));
    functions.insert("labs".into(), spec(true, &[In]));
    functions.insert("strlen".into(), spec(true, &[In]));
    functions.insert("strcmp".into(), spec(true, &[In, In]));
    functions.insert("strncmp".into(), spec(true, &[In, In, In]));
    functions.insert("memcmp".into(), spec(true, &[In, In, In]));
    functions.insert("strchr".into(), spec(true, &[In, In]));
    functions.insert("memcpy".into(), spec(false, &[Out, In, In]));
    functions.insert("memmove".into(), spec(false, &[Out, In, In]));
    functions.insert("memset".into(), spec(false, &[Out, In, In]));
    functions.insert("strcpy".into(), spec(false, &[Out, In]));
    functions.insert("strncpy".into(), spec(false, &[Out, In, In]));
    functions.insert("strcat".into(), spec(false, &[InOut, In]));
    functions.insert("sprintf".into(), spec(false, &[Out, In]));
    functions.insert("snprintf".into(), spec(false, &[Out, In, In]));
    functions.insert("sscanf".into(), spec(false, &[In, In, Out]));
    functions.insert("fread".into(), spec(false, &[Out, In, In, InOut]));
    functions.insert("free".into(), spec(false, &[In]));

    let container_mutating: HashSet<String> = [
        "insert", "erase", "clear", "resize", "reserve", "push_back", "push_front", "pop_back",
        "pop_front", "push", "pop", "emplace", "emplace_back", "assign", "swap", "shrink_to_fit",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let container_observing: HashSet<String> = [
        "size", "length", "empty", "find", "count", "at", "front", "back", "begin", "end",
        "cbegin", "cend", "capacity", "contains", "data", "c_str",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    LibraryConfig {
        functions,
        container_mutating,
        container_observing,
    }
});
