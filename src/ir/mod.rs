//! The vectorized intermediate representation the optimizer rewrites.

pub mod expr;
pub mod matcher;
pub mod mutate;
pub mod simplify;
pub mod substitute;
pub mod types;

pub use self::expr::{CallType, Expr, Stmt};
pub use self::mutate::Mutator;
pub use self::types::{Type, TypeCode};
