//! Peephole optimizer for the Hexagon HVX vector backend.
//!
//! HVX operates on wide vectors of 8/16/32-bit integer lanes, and its
//! widening and narrowing instructions read and write a paired even/odd
//! lane layout. This crate takes statements already lowered to vectorized
//! arithmetic and rewrites them for that instruction set:
//!
//! - [`optimize_hexagon_instructions`] selects `halide.hexagon.*`
//!   instruction intrinsics for arithmetic and cast idioms, tagging
//!   results and operands with the interleave/deinterleave permutations
//!   the encodings require, then cancels every redundant permutation pair
//!   it can.
//! - [`optimize_hexagon_shuffles`] turns indirect vector loads whose index
//!   range provably fits the 256-entry shuffle table into
//!   `dynamic_shuffle` lookups.
//!
//! Both passes are pure `Stmt -> Stmt` functions: no shared state, no
//! side effects, deterministic traversal order. Rewrites never change the
//! type of the expression they replace.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod bounds;
pub mod deinterleave;
pub mod intrinsics;
pub mod ir;
pub mod patterns;
pub mod peephole;
pub mod scope;
pub mod shuffles;

pub use crate::deinterleave::InterleaveEliminator;
pub use crate::peephole::PatternMatcher;
pub use crate::shuffles::{upper_bound, BoundedShuffleRewriter};

use crate::ir::{Mutator, Stmt};

/// Rewrite generic vector arithmetic and casts into target instruction
/// intrinsics, then cancel redundant interleave/deinterleave pairs.
pub fn optimize_hexagon_instructions(s: &Stmt) -> Stmt {
    let selected = PatternMatcher.mutate_stmt(s);
    InterleaveEliminator::new().mutate_stmt(&selected)
}

/// Replace indirect vector loads with bounded index ranges by
/// `dynamic_shuffle` lookups over a contiguously loaded table.
pub fn optimize_hexagon_shuffles(s: &Stmt) -> Stmt {
    BoundedShuffleRewriter::new().mutate_stmt(s)
}
