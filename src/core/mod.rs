pub mod errors;
pub mod types;

pub use errors::{Error, Result, ResultExt};
pub use types::{
    Confidence, ExprId, NodeId, ScopeId, VarId, MAX_EXPR_DEPTH, MAX_REFERENCE_DEPTH,
    MAX_WALK_DEPTH,
};
