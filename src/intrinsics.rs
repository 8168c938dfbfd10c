//! Target intrinsic names and builders.
//!
//! Every `halide.hexagon.*` call emitted by the rewriters lowers to one
//! machine instruction; the set of names and their arities is a stable
//! contract with the code generator. Interleave and deinterleave are the
//! lane permutations between natural order and the paired even/odd layout
//! the widening and narrowing instructions operate in.

use crate::ir::expr::{self, CallType, Expr};

/// Prefix shared by every target instruction intrinsic.
pub const HEXAGON_PREFIX: &str = "halide.hexagon.";

const INTERLEAVE_PREFIX: &str = "halide.hexagon.interleave";
const DEINTERLEAVE_PREFIX: &str = "halide.hexagon.deinterleave";

// Pure IR-level helper operations, lowered by the code generator without a
// dedicated `halide.hexagon` name.

/// Lane-wise bitwise and.
pub const BITWISE_AND: &str = "bitwise_and";
/// Lane-wise bitwise or.
pub const BITWISE_OR: &str = "bitwise_or";
/// Lane-wise bitwise exclusive or.
pub const BITWISE_XOR: &str = "bitwise_xor";
/// Lane-wise bitwise complement.
pub const BITWISE_NOT: &str = "bitwise_not";
/// Lane-wise left shift.
pub const SHIFT_LEFT: &str = "shift_left";
/// Lane-wise arithmetic right shift.
pub const SHIFT_RIGHT: &str = "shift_right";
/// Lane-wise absolute value.
pub const ABS: &str = "abs";
/// Lane-wise absolute difference.
pub const ABSD: &str = "absd";
/// Lane-wise count of leading zero bits.
pub const CLZ: &str = "clz";
/// Table-driven lane permutation with a runtime permutation vector.
pub const DYNAMIC_SHUFFLE: &str = "dynamic_shuffle";

/// The `.vb`/`.vh`/`.vw` suffix for a vector of `bits`-wide lanes.
fn interleave_suffix(e: &Expr, bits: u8) -> &'static str {
    match bits {
        8 => "vb",
        16 => "vh",
        32 => "vw",
        _ => panic!("unsupported lane width {} for interleave: {}", bits, e),
    }
}

/// Wrap `x` in the interleave instruction for its lane width.
pub fn native_interleave(x: Expr) -> Expr {
    let name = format!("{}.{}", INTERLEAVE_PREFIX, interleave_suffix(&x, x.ty().bits));
    expr::call(x.ty(), &name, vec![x], CallType::PureExtern)
}

/// Wrap `x` in the deinterleave instruction for its lane width.
pub fn native_deinterleave(x: Expr) -> Expr {
    let name = format!(
        "{}.{}",
        DEINTERLEAVE_PREFIX,
        interleave_suffix(&x, x.ty().bits)
    );
    expr::call(x.ty(), &name, vec![x], CallType::PureExtern)
}

/// Is `x` a call to one of the interleave instructions?
pub fn is_native_interleave(x: &Expr) -> bool {
    matches!(x, Expr::Call { name, .. } if name.starts_with(INTERLEAVE_PREFIX))
}

/// Is `x` a call to one of the deinterleave instructions?
pub fn is_native_deinterleave(x: &Expr) -> bool {
    matches!(x, Expr::Call { name, .. } if name.starts_with(DEINTERLEAVE_PREFIX))
}

/// Is `name` one of the six interleave/deinterleave instruction names?
pub fn is_interleave_op_name(name: &str) -> bool {
    name.starts_with(INTERLEAVE_PREFIX) || name.starts_with(DEINTERLEAVE_PREFIX)
}

/// Count leading zeros, lane-wise.
pub fn clz(x: Expr) -> Expr {
    expr::call(x.ty(), CLZ, vec![x], CallType::PureIntrinsic)
}

/// Bitwise complement, lane-wise.
pub fn bitwise_not(x: Expr) -> Expr {
    expr::call(x.ty(), BITWISE_NOT, vec![x], CallType::PureIntrinsic)
}

/// Bitwise and, lane-wise.
pub fn bitwise_and(a: Expr, b: Expr) -> Expr {
    debug_assert_eq!(a.ty(), b.ty());
    expr::call(a.ty(), BITWISE_AND, vec![a, b], CallType::PureIntrinsic)
}

/// Left shift by a per-lane amount.
pub fn shift_left(a: Expr, b: Expr) -> Expr {
    expr::call(a.ty(), SHIFT_LEFT, vec![a, b], CallType::PureIntrinsic)
}

/// Arithmetic right shift by a per-lane amount.
pub fn shift_right(a: Expr, b: Expr) -> Expr {
    expr::call(a.ty(), SHIFT_RIGHT, vec![a, b], CallType::PureIntrinsic)
}
