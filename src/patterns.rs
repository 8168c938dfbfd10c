//! Pattern tables mapping arithmetic shapes to target instructions.
//!
//! Each table is scanned in declaration order and the first successful
//! match wins, so more specific shapes must precede more general ones;
//! the order is semantic, not stylistic. Flags describe fixups applied to
//! the captured operands before the intrinsic call is built.

use crate::intrinsics::{native_deinterleave, native_interleave};
use crate::ir::expr::{self, CallType, Expr};
use crate::ir::matcher::expr_match;
use crate::ir::mutate::Mutator;
use crate::ir::simplify::{is_const_power_of_two_integer, lossless_cast};
use crate::ir::types::{Type, TypeCode};
use bitflags::bitflags;
use log::trace;
use once_cell::sync::Lazy;

bitflags! {
    /// Operand fixups attached to a pattern.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PatternFlags: u32 {
        /// Wrap the produced intrinsic call in `native_interleave`.
        const INTERLEAVE_RESULT = 1 << 0;
        /// Swap captured operands 0 and 1 before substitution.
        const SWAP_OPS_01 = 1 << 1;
        /// Swap captured operands 1 and 2 before substitution.
        const SWAP_OPS_12 = 1 << 2;
        /// Operand 1 must be a positive power of two; replace with its log2.
        const EXACT_LOG2_OP_1 = 1 << 3;
        /// Operand 2 must be a positive power of two; replace with its log2.
        const EXACT_LOG2_OP_2 = 1 << 4;
        /// Wrap operand 0 in `native_deinterleave`.
        const DEINTERLEAVE_OP_0 = 1 << 5;
        /// Wrap operand 1 in `native_deinterleave`.
        const DEINTERLEAVE_OP_1 = 1 << 6;
        /// Wrap operand 2 in `native_deinterleave`.
        const DEINTERLEAVE_OP_2 = 1 << 7;
        /// Losslessly narrow operand 0 to half width, keeping signedness.
        const NARROW_OP_0 = 1 << 8;
        /// Losslessly narrow operand 1 to half width, keeping signedness.
        const NARROW_OP_1 = 1 << 9;
        /// Losslessly narrow operand 2 to half width, keeping signedness.
        const NARROW_OP_2 = 1 << 10;
        /// Losslessly narrow operand 0 to unsigned half width.
        const NARROW_UNSIGNED_OP_0 = 1 << 11;
        /// Losslessly narrow operand 1 to unsigned half width.
        const NARROW_UNSIGNED_OP_1 = 1 << 12;
        /// Losslessly narrow operand 2 to unsigned half width.
        const NARROW_UNSIGNED_OP_2 = 1 << 13;
        /// An interleaved result accumulating onto a deinterleaved operand 0.
        const REINTERLEAVE_OP_0 = Self::INTERLEAVE_RESULT.bits() | Self::DEINTERLEAVE_OP_0.bits();
    }
}

fn narrow_flag(i: usize) -> PatternFlags {
    [
        PatternFlags::NARROW_OP_0,
        PatternFlags::NARROW_OP_1,
        PatternFlags::NARROW_OP_2,
    ][i]
}

fn narrow_unsigned_flag(i: usize) -> PatternFlags {
    [
        PatternFlags::NARROW_UNSIGNED_OP_0,
        PatternFlags::NARROW_UNSIGNED_OP_1,
        PatternFlags::NARROW_UNSIGNED_OP_2,
    ][i]
}

fn deinterleave_flag(i: usize) -> PatternFlags {
    [
        PatternFlags::DEINTERLEAVE_OP_0,
        PatternFlags::DEINTERLEAVE_OP_1,
        PatternFlags::DEINTERLEAVE_OP_2,
    ][i]
}

fn exact_log2_flag(i: usize) -> PatternFlags {
    [
        PatternFlags::empty(),
        PatternFlags::EXACT_LOG2_OP_1,
        PatternFlags::EXACT_LOG2_OP_2,
    ][i]
}

/// One rewrite rule: an expression shape, the instruction it selects, and
/// the operand fixups.
pub struct Pattern {
    /// The target instruction the match rewrites to.
    pub intrinsic: &'static str,
    /// The shape to match, containing wildcard variables.
    pub pattern: Expr,
    /// Operand fixups.
    pub flags: PatternFlags,
}

impl Pattern {
    fn new(intrinsic: &'static str, pattern: Expr, flags: PatternFlags) -> Self {
        Self {
            intrinsic,
            pattern,
            flags,
        }
    }
}

/// Try each pattern in order against `x`; on the first match, fix up the
/// captures per the pattern's flags, re-mutate them through `mutator`, and
/// build the intrinsic call. Returns `x` unchanged when nothing matches.
pub fn apply_patterns(x: &Expr, patterns: &[Pattern], mutator: &mut dyn Mutator) -> Expr {
    'next_pattern: for p in patterns {
        let Some(mut matches) = expr_match(&p.pattern, x) else {
            continue;
        };
        for i in 0..matches.len().min(3) {
            let narrow = p.flags.contains(narrow_flag(i));
            let narrow_unsigned = p.flags.contains(narrow_unsigned_flag(i));
            if !narrow && !narrow_unsigned {
                continue;
            }
            let t = matches[i].ty();
            let target = if narrow_unsigned {
                t.with_code(TypeCode::UInt).with_bits(t.bits / 2)
            } else {
                t.with_bits(t.bits / 2)
            };
            match lossless_cast(target, &matches[i]) {
                Some(narrowed) => matches[i] = narrowed,
                None => continue 'next_pattern,
            }
        }
        for i in 1..matches.len().min(3) {
            if !p.flags.contains(exact_log2_flag(i)) {
                continue;
            }
            match is_const_power_of_two_integer(&matches[i]) {
                Some(log2) => {
                    let ty = matches[i].ty().element_of();
                    matches[i] = expr::const_scalar(ty, log2 as i64);
                }
                None => continue 'next_pattern,
            }
        }
        for i in 0..matches.len().min(3) {
            if p.flags.contains(deinterleave_flag(i)) {
                assert!(
                    matches[i].ty().is_vector(),
                    "deinterleave of non-vector operand {}",
                    matches[i]
                );
                matches[i] = native_deinterleave(matches[i].clone());
            }
        }
        if p.flags.contains(PatternFlags::SWAP_OPS_01) {
            matches.swap(0, 1);
        }
        if p.flags.contains(PatternFlags::SWAP_OPS_12) {
            matches.swap(1, 2);
        }
        for m in matches.iter_mut() {
            *m = mutator.mutate_expr(m);
        }
        let mut result = expr::call(x.ty(), p.intrinsic, matches.to_vec(), CallType::PureExtern);
        if p.flags.contains(PatternFlags::INTERLEAVE_RESULT) {
            result = native_interleave(result);
        }
        trace!("{} -> {}", x, result);
        return result;
    }
    x.clone()
}

// Shorthand used by the table definitions below. Types inside patterns use
// lane count 0, the any-lane wildcard resolved at match time.

fn wv(code: TypeCode, bits: u8) -> Expr {
    expr::var(Type::new(code, bits, 0), "*")
}

fn ws(code: TypeCode, bits: u8) -> Expr {
    expr::var(Type::new(code, bits, 1), "*")
}

fn bc(value: Expr) -> Expr {
    Expr::Broadcast {
        value: Box::new(value),
        lanes: 0,
    }
}

fn cst(code: TypeCode, bits: u8, value: Expr) -> Expr {
    Expr::Cast {
        ty: Type::new(code, bits, 0),
        value: Box::new(value),
    }
}

fn sat(code: TypeCode, bits: u8, value: Expr) -> Expr {
    expr::sat_cast(Type::new(code, bits, 1), value)
}

fn k(code: TypeCode, bits: u8, value: i64) -> Expr {
    expr::make_const(Type::new(code, bits, 0), value)
}

/// Rewrites tried on vector `Cast` nodes.
pub fn casts() -> &'static [Pattern] {
    use PatternFlags as F;
    use TypeCode::{Int, UInt};
    static CASTS: Lazy<Vec<Pattern>> = Lazy::new(|| {
        vec![
            // Saturating arithmetic at widened precision.
            Pattern::new(
                "halide.hexagon.satub_add.vub.vub",
                sat(
                    UInt,
                    8,
                    expr::add(cst(UInt, 16, wv(UInt, 8)), cst(UInt, 16, wv(UInt, 8))),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.satuh_add.vuh.vuh",
                sat(
                    UInt,
                    16,
                    expr::add(cst(UInt, 32, wv(UInt, 16)), cst(UInt, 32, wv(UInt, 16))),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.sath_add.vh.vh",
                sat(
                    Int,
                    16,
                    expr::add(cst(Int, 32, wv(Int, 16)), cst(Int, 32, wv(Int, 16))),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.satw_add.vw.vw",
                sat(
                    Int,
                    32,
                    expr::add(cst(Int, 64, wv(Int, 32)), cst(Int, 64, wv(Int, 32))),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.satub_sub.vub.vub",
                sat(
                    UInt,
                    8,
                    expr::sub(cst(Int, 16, wv(UInt, 8)), cst(Int, 16, wv(UInt, 8))),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.sath_sub.vh.vh",
                sat(
                    Int,
                    16,
                    expr::sub(cst(Int, 32, wv(Int, 16)), cst(Int, 32, wv(Int, 16))),
                ),
                F::empty(),
            ),
            // Saturating multiply-accumulate. The product of the narrowed
            // operands always fits 32 bits, so only the final add saturates.
            Pattern::new(
                "halide.hexagon.satw_add_mpy.vw.vh.h",
                sat(
                    Int,
                    32,
                    expr::add(
                        cst(Int, 64, wv(Int, 32)),
                        expr::mul(cst(Int, 64, wv(Int, 32)), cst(Int, 64, bc(ws(Int, 32)))),
                    ),
                ),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            // Rounding averages.
            Pattern::new(
                "halide.hexagon.avg_rnd.vub.vub",
                cst(
                    UInt,
                    8,
                    expr::div(
                        expr::add(
                            expr::add(cst(UInt, 16, wv(UInt, 8)), cst(UInt, 16, wv(UInt, 8))),
                            k(UInt, 16, 1),
                        ),
                        k(UInt, 16, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg_rnd.vuh.vuh",
                cst(
                    UInt,
                    16,
                    expr::div(
                        expr::add(
                            expr::add(cst(UInt, 32, wv(UInt, 16)), cst(UInt, 32, wv(UInt, 16))),
                            k(UInt, 32, 1),
                        ),
                        k(UInt, 32, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg_rnd.vh.vh",
                cst(
                    Int,
                    16,
                    expr::div(
                        expr::add(
                            expr::add(cst(Int, 32, wv(Int, 16)), cst(Int, 32, wv(Int, 16))),
                            k(Int, 32, 1),
                        ),
                        k(Int, 32, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg_rnd.vw.vw",
                cst(
                    Int,
                    32,
                    expr::div(
                        expr::add(
                            expr::add(cst(Int, 64, wv(Int, 32)), cst(Int, 64, wv(Int, 32))),
                            k(Int, 64, 1),
                        ),
                        k(Int, 64, 2),
                    ),
                ),
                F::empty(),
            ),
            // Averages.
            Pattern::new(
                "halide.hexagon.avg.vub.vub",
                cst(
                    UInt,
                    8,
                    expr::div(
                        expr::add(cst(UInt, 16, wv(UInt, 8)), cst(UInt, 16, wv(UInt, 8))),
                        k(UInt, 16, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg.vuh.vuh",
                cst(
                    UInt,
                    16,
                    expr::div(
                        expr::add(cst(UInt, 32, wv(UInt, 16)), cst(UInt, 32, wv(UInt, 16))),
                        k(UInt, 32, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg.vh.vh",
                cst(
                    Int,
                    16,
                    expr::div(
                        expr::add(cst(Int, 32, wv(Int, 16)), cst(Int, 32, wv(Int, 16))),
                        k(Int, 32, 2),
                    ),
                ),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.avg.vw.vw",
                cst(
                    Int,
                    32,
                    expr::div(
                        expr::add(cst(Int, 64, wv(Int, 32)), cst(Int, 64, wv(Int, 32))),
                        k(Int, 64, 2),
                    ),
                ),
                F::empty(),
            ),
            // Negative averages; the unsigned variant narrows its widened
            // unsigned sources back out of the signed difference.
            Pattern::new(
                "halide.hexagon.navg.vub.vub",
                sat(
                    Int,
                    8,
                    expr::div(expr::sub(wv(Int, 16), wv(Int, 16)), k(Int, 16, 2)),
                ),
                F::NARROW_UNSIGNED_OP_0.union(F::NARROW_UNSIGNED_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.navg.vh.vh",
                sat(
                    Int,
                    16,
                    expr::div(expr::sub(wv(Int, 32), wv(Int, 32)), k(Int, 32, 2)),
                ),
                F::NARROW_OP_0.union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.navg.vw.vw",
                sat(
                    Int,
                    32,
                    expr::div(expr::sub(wv(Int, 64), wv(Int, 64)), k(Int, 64, 2)),
                ),
                F::NARROW_OP_0.union(F::NARROW_OP_1),
            ),
            // Saturating narrowing with rounding half-up.
            Pattern::new(
                "halide.hexagon.trunc_satub_rnd.vh",
                sat(
                    UInt,
                    8,
                    expr::div(expr::add(wv(Int, 32), k(Int, 32, 128)), k(Int, 32, 256)),
                ),
                F::DEINTERLEAVE_OP_0.union(F::NARROW_OP_0),
            ),
            Pattern::new(
                "halide.hexagon.trunc_sath_rnd.vw",
                sat(
                    Int,
                    16,
                    expr::div(
                        expr::add(wv(Int, 64), k(Int, 64, 32768)),
                        k(Int, 64, 65536),
                    ),
                ),
                F::DEINTERLEAVE_OP_0.union(F::NARROW_OP_0),
            ),
            Pattern::new(
                "halide.hexagon.trunc_satuh_rnd.vw",
                sat(
                    UInt,
                    16,
                    expr::div(
                        expr::add(wv(Int, 64), k(Int, 64, 32768)),
                        k(Int, 64, 65536),
                    ),
                ),
                F::DEINTERLEAVE_OP_0.union(F::NARROW_OP_0),
            ),
            // Saturating narrowing with a right shift; the power-of-two
            // divisor becomes the shift amount.
            Pattern::new(
                "halide.hexagon.trunc_satub_shr.vh.h",
                sat(UInt, 8, expr::div(wv(Int, 16), bc(ws(Int, 16)))),
                F::DEINTERLEAVE_OP_0.union(F::EXACT_LOG2_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.trunc_sath_shr.vw.w",
                sat(Int, 16, expr::div(wv(Int, 32), bc(ws(Int, 32)))),
                F::DEINTERLEAVE_OP_0.union(F::EXACT_LOG2_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.trunc_satuh_shr.vw.w",
                sat(UInt, 16, expr::div(wv(Int, 32), bc(ws(Int, 32)))),
                F::DEINTERLEAVE_OP_0.union(F::EXACT_LOG2_OP_1),
            ),
            // Non-saturating narrowing of the high half.
            Pattern::new(
                "halide.hexagon.trunclo.vh",
                cst(UInt, 8, expr::div(wv(UInt, 16), k(UInt, 16, 256))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vh",
                cst(UInt, 8, expr::div(wv(Int, 16), k(Int, 16, 256))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vh",
                cst(Int, 8, expr::div(wv(UInt, 16), k(UInt, 16, 256))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vh",
                cst(Int, 8, expr::div(wv(Int, 16), k(Int, 16, 256))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vw",
                cst(UInt, 16, expr::div(wv(UInt, 32), k(UInt, 32, 65536))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vw",
                cst(UInt, 16, expr::div(wv(Int, 32), k(Int, 32, 65536))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vw",
                cst(Int, 16, expr::div(wv(UInt, 32), k(UInt, 32, 65536))),
                F::DEINTERLEAVE_OP_0,
            ),
            Pattern::new(
                "halide.hexagon.trunclo.vw",
                cst(Int, 16, expr::div(wv(Int, 32), k(Int, 32, 65536))),
                F::DEINTERLEAVE_OP_0,
            ),
            // Saturating packs. These have deinterleaving alternatives the
            // interleave eliminator may choose instead.
            Pattern::new(
                "halide.hexagon.pack_satub.vh",
                sat(UInt, 8, wv(Int, 16)),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.pack_satub.vuh",
                sat(UInt, 8, wv(UInt, 16)),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.pack_satb.vh",
                sat(Int, 8, wv(Int, 16)),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.pack_sath.vw",
                sat(Int, 16, wv(Int, 32)),
                F::empty(),
            ),
            Pattern::new(
                "halide.hexagon.pack_satuh.vw",
                sat(UInt, 16, wv(Int, 32)),
                F::empty(),
            ),
            // Unrounded packs.
            Pattern::new("halide.hexagon.pack.vh", cst(UInt, 8, wv(UInt, 16)), F::empty()),
            Pattern::new("halide.hexagon.pack.vh", cst(UInt, 8, wv(Int, 16)), F::empty()),
            Pattern::new("halide.hexagon.pack.vh", cst(Int, 8, wv(UInt, 16)), F::empty()),
            Pattern::new("halide.hexagon.pack.vh", cst(Int, 8, wv(Int, 16)), F::empty()),
            Pattern::new("halide.hexagon.pack.vw", cst(UInt, 16, wv(UInt, 32)), F::empty()),
            Pattern::new("halide.hexagon.pack.vw", cst(UInt, 16, wv(Int, 32)), F::empty()),
            Pattern::new("halide.hexagon.pack.vw", cst(Int, 16, wv(UInt, 32)), F::empty()),
            Pattern::new("halide.hexagon.pack.vw", cst(Int, 16, wv(Int, 32)), F::empty()),
            // Widening casts come out interleaved.
            Pattern::new(
                "halide.hexagon.zxt.vub",
                cst(UInt, 16, wv(UInt, 8)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.zxt.vub",
                cst(Int, 16, wv(UInt, 8)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.zxt.vuh",
                cst(UInt, 32, wv(UInt, 16)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.zxt.vuh",
                cst(Int, 32, wv(UInt, 16)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.sxt.vb",
                cst(UInt, 16, wv(Int, 8)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.sxt.vb",
                cst(Int, 16, wv(Int, 8)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.sxt.vh",
                cst(UInt, 32, wv(Int, 16)),
                F::INTERLEAVE_RESULT,
            ),
            Pattern::new(
                "halide.hexagon.sxt.vh",
                cst(Int, 32, wv(Int, 16)),
                F::INTERLEAVE_RESULT,
            ),
        ]
    });
    CASTS.as_slice()
}

/// Rewrites tried on vector `Mul` nodes (and their commuted forms).
pub fn muls() -> &'static [Pattern] {
    use PatternFlags as F;
    use TypeCode::{Int, UInt};
    static MULS: Lazy<Vec<Pattern>> = Lazy::new(|| {
        vec![
            // Vector by broadcast-scalar widening multiplies.
            Pattern::new(
                "halide.hexagon.mpy.vub.ub",
                expr::mul(wv(UInt, 16), bc(ws(UInt, 16))),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vub.b",
                expr::mul(wv(Int, 16), bc(ws(Int, 16))),
                F::INTERLEAVE_RESULT
                    .union(F::NARROW_UNSIGNED_OP_0)
                    .union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vuh.uh",
                expr::mul(wv(UInt, 32), bc(ws(UInt, 32))),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vh.h",
                expr::mul(wv(Int, 32), bc(ws(Int, 32))),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            // Multiplication by a power of two is a shift.
            Pattern::new(
                "halide.hexagon.shl.vh.h",
                expr::mul(wv(Int, 16), bc(ws(Int, 16))),
                F::EXACT_LOG2_OP_1,
            ),
            Pattern::new(
                "halide.hexagon.shl.vuh.uh",
                expr::mul(wv(UInt, 16), bc(ws(UInt, 16))),
                F::EXACT_LOG2_OP_1,
            ),
            Pattern::new(
                "halide.hexagon.shl.vw.w",
                expr::mul(wv(Int, 32), bc(ws(Int, 32))),
                F::EXACT_LOG2_OP_1,
            ),
            Pattern::new(
                "halide.hexagon.shl.vuw.uw",
                expr::mul(wv(UInt, 32), bc(ws(UInt, 32))),
                F::EXACT_LOG2_OP_1,
            ),
            // Vector by vector widening multiplies.
            Pattern::new(
                "halide.hexagon.mpy.vub.vub",
                expr::mul(wv(UInt, 16), wv(UInt, 16)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vb.vb",
                expr::mul(wv(Int, 16), wv(Int, 16)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vub.vb",
                expr::mul(wv(Int, 16), wv(Int, 16)),
                F::INTERLEAVE_RESULT
                    .union(F::NARROW_UNSIGNED_OP_0)
                    .union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vuh.vuh",
                expr::mul(wv(UInt, 32), wv(UInt, 32)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vh.vh",
                expr::mul(wv(Int, 32), wv(Int, 32)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.mpy.vuh.vh",
                expr::mul(wv(Int, 32), wv(Int, 32)),
                F::INTERLEAVE_RESULT
                    .union(F::NARROW_UNSIGNED_OP_0)
                    .union(F::NARROW_OP_1),
            ),
        ]
    });
    MULS.as_slice()
}

/// Rewrites tried on vector `Add` nodes (and, through lossless negation,
/// on `Sub` nodes). The generic multiply-accumulate must stay last: it
/// matches everything the narrowing rows match.
pub fn adds() -> &'static [Pattern] {
    use PatternFlags as F;
    use TypeCode::{Int, UInt};
    static ADDS: Lazy<Vec<Pattern>> = Lazy::new(|| {
        vec![
            // Widening multiply-accumulates with a broadcast scalar.
            Pattern::new(
                "halide.hexagon.add_mpy.vuh.vub.ub",
                expr::add(wv(UInt, 16), expr::mul(wv(UInt, 16), bc(ws(UInt, 16)))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vh.vub.b",
                expr::add(wv(Int, 16), expr::mul(wv(Int, 16), bc(ws(Int, 16)))),
                F::REINTERLEAVE_OP_0
                    .union(F::NARROW_UNSIGNED_OP_1)
                    .union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vuw.vuh.uh",
                expr::add(wv(UInt, 32), expr::mul(wv(UInt, 32), bc(ws(UInt, 32)))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vw.vh.h",
                expr::add(wv(Int, 32), expr::mul(wv(Int, 32), bc(ws(Int, 32)))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            // The same with the scalar on the left of the multiply.
            Pattern::new(
                "halide.hexagon.add_mpy.vuh.vub.ub",
                expr::add(wv(UInt, 16), expr::mul(bc(ws(UInt, 16)), wv(UInt, 16))),
                F::REINTERLEAVE_OP_0
                    .union(F::NARROW_OP_1)
                    .union(F::NARROW_OP_2)
                    .union(F::SWAP_OPS_12),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vw.vh.h",
                expr::add(wv(Int, 32), expr::mul(bc(ws(Int, 32)), wv(Int, 32))),
                F::REINTERLEAVE_OP_0
                    .union(F::NARROW_OP_1)
                    .union(F::NARROW_OP_2)
                    .union(F::SWAP_OPS_12),
            ),
            // Widening vector multiply-accumulates.
            Pattern::new(
                "halide.hexagon.add_mpy.vuh.vub.vub",
                expr::add(wv(UInt, 16), expr::mul(wv(UInt, 16), wv(UInt, 16))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vh.vb.vb",
                expr::add(wv(Int, 16), expr::mul(wv(Int, 16), wv(Int, 16))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vuw.vuh.vuh",
                expr::add(wv(UInt, 32), expr::mul(wv(UInt, 32), wv(UInt, 32))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            Pattern::new(
                "halide.hexagon.add_mpy.vw.vh.vh",
                expr::add(wv(Int, 32), expr::mul(wv(Int, 32), wv(Int, 32))),
                F::REINTERLEAVE_OP_0.union(F::NARROW_OP_1).union(F::NARROW_OP_2),
            ),
            // Shift-accumulates; a power-of-two multiplier or divisor
            // becomes the shift amount.
            Pattern::new(
                "halide.hexagon.add_shl.vh.vh.h",
                expr::add(wv(Int, 16), expr::mul(wv(Int, 16), bc(ws(Int, 16)))),
                F::EXACT_LOG2_OP_2,
            ),
            Pattern::new(
                "halide.hexagon.add_shl.vw.vw.w",
                expr::add(wv(Int, 32), expr::mul(wv(Int, 32), bc(ws(Int, 32)))),
                F::EXACT_LOG2_OP_2,
            ),
            Pattern::new(
                "halide.hexagon.add_shl.vw.vw.w",
                expr::add(wv(Int, 32), expr::mul(bc(ws(Int, 32)), wv(Int, 32))),
                F::EXACT_LOG2_OP_1.union(F::SWAP_OPS_12),
            ),
            Pattern::new(
                "halide.hexagon.add_shr.vw.vw.w",
                expr::add(wv(Int, 32), expr::div(wv(Int, 32), bc(ws(Int, 32)))),
                F::EXACT_LOG2_OP_2,
            ),
            // Widening vector adds.
            Pattern::new(
                "halide.hexagon.add_vuh.vub.vub",
                expr::add(wv(UInt, 16), wv(UInt, 16)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.add_vuw.vuh.vuh",
                expr::add(wv(UInt, 32), wv(UInt, 32)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            Pattern::new(
                "halide.hexagon.add_vw.vh.vh",
                expr::add(wv(Int, 32), wv(Int, 32)),
                F::INTERLEAVE_RESULT.union(F::NARROW_OP_0).union(F::NARROW_OP_1),
            ),
            // Non-widening multiply-accumulates with a narrowed scalar.
            Pattern::new(
                "halide.hexagon.add_mul.vh.vh.b",
                expr::add(wv(Int, 16), expr::mul(wv(Int, 16), bc(ws(Int, 16)))),
                F::NARROW_OP_2,
            ),
            Pattern::new(
                "halide.hexagon.add_mul.vw.vw.h",
                expr::add(wv(Int, 32), expr::mul(wv(Int, 32), bc(ws(Int, 32)))),
                F::NARROW_OP_2,
            ),
            // The generic multiply-accumulate. This is very general, so it
            // must come last.
            Pattern::new(
                "halide.hexagon.add_mul.vh.vh.vh",
                expr::add(wv(Int, 16), expr::mul(wv(Int, 16), wv(Int, 16))),
                F::empty(),
            ),
        ]
    });
    ADDS.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::*;
    use crate::ir::types::Type;

    struct NoRecurse;
    impl Mutator for NoRecurse {
        fn mutate_expr(&mut self, e: &Expr) -> Expr {
            e.clone()
        }
    }

    fn mac_operands() -> (Expr, Expr, Expr) {
        let acc = var(Type::int(16, 64), "acc");
        let a = cast(Type::int(16, 64), var(Type::int(8, 64), "a"));
        let b = cast(Type::int(16, 64), var(Type::int(8, 64), "b"));
        (acc, a, b)
    }

    fn unwrap_interleave(e: &Expr) -> &Expr {
        match e {
            Expr::Call { name, args, .. } if name.starts_with("halide.hexagon.interleave") => {
                &args[0]
            }
            _ => panic!("expected an interleaved result: {}", e),
        }
    }

    #[test]
    fn vector_mac_prefers_widening_row() {
        let (acc, a, b) = mac_operands();
        let e = add(acc, mul(a, b));
        let out = apply_patterns(&e, adds(), &mut NoRecurse);
        match unwrap_interleave(&out) {
            Expr::Call { name, .. } => assert_eq!(name, "halide.hexagon.add_mpy.vh.vb.vb"),
            other => panic!("no rewrite: {}", other),
        }
    }

    #[test]
    fn reversed_adds_table_regresses_to_generic_mac() {
        // The ordering constraint is semantic: with the table reversed the
        // generic i16 MAC shadows the widening row.
        let reversed: Vec<Pattern> = adds()
            .iter()
            .rev()
            .map(|p| Pattern::new(p.intrinsic, p.pattern.clone(), p.flags))
            .collect();
        let (acc, a, b) = mac_operands();
        let e = add(acc, mul(a, b));
        let out = apply_patterns(&e, &reversed, &mut NoRecurse);
        match &out {
            Expr::Call { name, .. } => assert_eq!(name, "halide.hexagon.add_mul.vh.vh.vh"),
            _ => panic!("no rewrite: {}", out),
        }
    }

    #[test]
    fn narrowing_failure_skips_to_next_pattern() {
        // Genuinely 16-bit operands cannot use the widening MAC; the
        // power-of-two multiplier selects the shift-accumulate instead.
        let t = Type::int(16, 64);
        let acc = var(t, "acc");
        let e = add(acc, mul(var(t, "x"), make_const(t, 8)));
        let out = apply_patterns(&e, adds(), &mut NoRecurse);
        match &out {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "halide.hexagon.add_shl.vh.vh.h");
                assert_eq!(args[2], const_scalar(Type::int(16, 1), 3));
            }
            _ => panic!("no rewrite: {}", out),
        }
    }

    #[test]
    fn non_power_of_two_divisor_is_not_a_shift() {
        let t = Type::int(32, 64);
        let acc = var(t, "acc");
        let e = add(acc.clone(), div(var(t, "x"), make_const(t, 3)));
        let out = apply_patterns(&e, adds(), &mut NoRecurse);
        assert_eq!(out, e);
    }

    #[test]
    fn swapped_scalar_multiply_normalizes_operand_order() {
        let a = cast(Type::uint(16, 64), var(Type::uint(8, 64), "a"));
        let acc = var(Type::uint(16, 64), "acc");
        let kb = broadcast(cast(Type::uint(16, 1), var(Type::uint(8, 1), "k")), 64);
        let e = add(acc.clone(), mul(kb, a.clone()));
        let out = apply_patterns(&e, adds(), &mut NoRecurse);
        match unwrap_interleave(&out) {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "halide.hexagon.add_mpy.vuh.vub.ub");
                // Vector operand second, scalar last, after the swap.
                assert_eq!(args[1], var(Type::uint(8, 64), "a"));
                assert_eq!(args[2], broadcast(var(Type::uint(8, 1), "k"), 1));
            }
            other => panic!("no rewrite: {}", other),
        }
    }
}
