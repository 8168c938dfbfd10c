//! Instruction selection over vector arithmetic.
//!
//! The matcher walks expressions bottom-up and rewrites multiplies, adds,
//! subtracts (through lossless negation), the count-leading-sign-bits
//! `max` idiom, and casts into `halide.hexagon.*` calls using the tables
//! in [`crate::patterns`]. Rewrites never change the type of the
//! expression they replace.

use crate::ir::expr::{self, Expr};
use crate::ir::matcher::expr_match;
use crate::ir::mutate::Mutator;
use crate::ir::substitute::substitute;
use crate::ir::types::{Type, TypeCode};
use crate::intrinsics;
use crate::patterns::{adds, apply_patterns, casts, muls};
use log::trace;
use once_cell::sync::Lazy;

/// Rewrites generic arithmetic into target instruction calls.
pub struct PatternMatcher;

/// Negate `e` without changing its type, when that can be done exactly:
/// the negation of a multiply can be pushed into either operand, and a
/// constant other than the type minimum negates directly.
pub(crate) fn lossless_negate(e: &Expr) -> Option<Expr> {
    match e {
        Expr::Mul { a, b } => {
            if let Some(na) = lossless_negate(a) {
                Some(expr::mul(na, (**b).clone()))
            } else {
                lossless_negate(b).map(|nb| expr::mul((**a).clone(), nb))
            }
        }
        Expr::Broadcast { value, lanes } => {
            lossless_negate(value).map(|v| expr::broadcast(v, *lanes))
        }
        Expr::IntImm { ty, value } => {
            // The minimum representable value has no negation.
            if *value != ty.min_value() {
                Some(Expr::IntImm {
                    ty: *ty,
                    value: -*value,
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Fixed rewrites splitting wide casts through an intermediate 16-bit
/// stage, so narrower pack and extend instructions can fire on both
/// halves. Each entry is a (shape, replacement) pair; the replacement
/// contains one wildcard standing for the captured operand.
fn double_casts() -> &'static [(Expr, Expr)] {
    use TypeCode::{Int, UInt};
    fn wv(code: TypeCode, bits: u8) -> Expr {
        expr::var(Type::new(code, bits, 0), "*")
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
    static DOUBLE_CASTS: Lazy<Vec<(Expr, Expr)>> = Lazy::new(|| {
        vec![
            // Saturating narrowing, 32 to 8 bits.
            (
                sat(UInt, 8, wv(Int, 32)),
                sat(UInt, 8, sat(UInt, 16, wv(Int, 32))),
            ),
            (
                sat(Int, 8, wv(Int, 32)),
                sat(Int, 8, sat(Int, 16, wv(Int, 32))),
            ),
            (
                sat(UInt, 8, wv(UInt, 32)),
                sat(UInt, 8, sat(UInt, 16, wv(UInt, 32))),
            ),
            (
                sat(Int, 8, wv(UInt, 32)),
                sat(Int, 8, sat(Int, 16, wv(UInt, 32))),
            ),
            // Plain narrowing, 32 to 8 bits.
            (
                cst(UInt, 8, wv(Int, 32)),
                cst(UInt, 8, cst(UInt, 16, wv(Int, 32))),
            ),
            (
                cst(Int, 8, wv(Int, 32)),
                cst(Int, 8, cst(Int, 16, wv(Int, 32))),
            ),
            (
                cst(UInt, 8, wv(UInt, 32)),
                cst(UInt, 8, cst(UInt, 16, wv(UInt, 32))),
            ),
            (
                cst(Int, 8, wv(UInt, 32)),
                cst(Int, 8, cst(Int, 16, wv(UInt, 32))),
            ),
            // Widening, 8 to 32 bits. The intermediate keeps the source's
            // signedness so the extension is preserved.
            (
                cst(UInt, 32, wv(UInt, 8)),
                cst(UInt, 32, cst(UInt, 16, wv(UInt, 8))),
            ),
            (
                cst(Int, 32, wv(UInt, 8)),
                cst(Int, 32, cst(UInt, 16, wv(UInt, 8))),
            ),
            (
                cst(UInt, 32, wv(Int, 8)),
                cst(UInt, 32, cst(Int, 16, wv(Int, 8))),
            ),
            (
                cst(Int, 32, wv(Int, 8)),
                cst(Int, 32, cst(Int, 16, wv(Int, 8))),
            ),
        ]
    });
    &DOUBLE_CASTS
}

/// Give every pattern-shaped node in `e` (lane count zero) the concrete
/// lane count of the expression being rewritten.
fn concretize_lanes(e: &Expr, lanes: u32) -> Expr {
    struct Concretize(u32);
    impl Mutator for Concretize {
        fn mutate_expr(&mut self, e: &Expr) -> Expr {
            match e {
                Expr::Cast { ty, value } if ty.lanes == 0 => Expr::Cast {
                    ty: ty.with_lanes(self.0),
                    value: Box::new(self.mutate_expr(value)),
                },
                Expr::Broadcast { value, lanes: 0 } => Expr::Broadcast {
                    value: Box::new(self.mutate_expr(value)),
                    lanes: self.0,
                },
                _ => self.walk_expr(e),
            }
        }
    }
    Concretize(lanes).mutate_expr(e)
}

impl PatternMatcher {
    /// Try a commutative table on `e` and on its operand-swapped form.
    fn visit_commutative(
        &mut self,
        e: &Expr,
        a: &Expr,
        b: &Expr,
        table: &[crate::patterns::Pattern],
        rebuild: fn(Expr, Expr) -> Expr,
    ) -> Expr {
        let out = apply_patterns(e, table, self);
        if &out != e {
            return out;
        }
        let swapped = rebuild(b.clone(), a.clone());
        let out = apply_patterns(&swapped, table, self);
        if out != swapped {
            return out;
        }
        self.walk_expr(e)
    }

    /// `max(clz(x), clz(~x))` counts leading sign bits, off by one.
    fn as_cls_idiom(a: &Expr, b: &Expr) -> Option<Expr> {
        fn clz_arg(e: &Expr) -> Option<&Expr> {
            match e {
                Expr::Call { name, args, .. } if name == intrinsics::CLZ => Some(&args[0]),
                _ => None,
            }
        }
        let x = clz_arg(a)?;
        let inverted = clz_arg(b)?;
        match inverted {
            Expr::Call { name, args, .. } if name == intrinsics::BITWISE_NOT && &args[0] == x => {
                Some(x.clone())
            }
            _ => None,
        }
    }

    fn visit_max(&mut self, e: &Expr) -> Expr {
        let out = self.walk_expr(e);
        if let Expr::Max { a, b } = &out {
            let x = Self::as_cls_idiom(a, b).or_else(|| Self::as_cls_idiom(b, a));
            if let Some(x) = x {
                let ty = x.ty();
                if ty.is_int() && ty.is_vector() && (ty.bits == 16 || ty.bits == 32) {
                    let name = if ty.bits == 16 {
                        "halide.hexagon.cls.vh"
                    } else {
                        "halide.hexagon.cls.vw"
                    };
                    trace!("{} -> {}", out, name);
                    let cls = expr::call(ty, name, vec![x], expr::CallType::PureExtern);
                    return expr::add(cls, expr::make_const(ty, 1));
                }
            }
        }
        out
    }

    fn visit_cast(&mut self, e: &Expr) -> Expr {
        let out = apply_patterns(e, casts(), self);
        if &out != e {
            return out;
        }
        for (shape, replacement) in double_casts() {
            if let Some(captures) = expr_match(shape, e) {
                let split = substitute("*", &captures[0], replacement);
                let split = concretize_lanes(&split, e.ty().lanes);
                trace!("{} -> {}", e, split);
                // New pattern opportunities surface on both stages.
                return self.mutate_expr(&split);
            }
        }
        self.walk_expr(e)
    }
}

impl Mutator for PatternMatcher {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if !e.ty().is_vector() {
            return self.walk_expr(e);
        }
        match e {
            Expr::Mul { a, b } => self.visit_commutative(e, a, b, muls(), expr::mul),
            Expr::Add { a, b } => self.visit_commutative(e, a, b, adds(), expr::add),
            Expr::Sub { a, b } => {
                if let Some(nb) = lossless_negate(b) {
                    let as_add = expr::add((**a).clone(), nb.clone());
                    let out = apply_patterns(&as_add, adds(), self);
                    if out != as_add {
                        return out;
                    }
                    let swapped = expr::add(nb, (**a).clone());
                    let out = apply_patterns(&swapped, adds(), self);
                    if out != swapped {
                        return out;
                    }
                }
                self.walk_expr(e)
            }
            Expr::Max { .. } => self.visit_max(e),
            Expr::Cast { .. } => self.visit_cast(e),
            _ => self.walk_expr(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::{bitwise_not, clz, native_deinterleave, native_interleave};
    use crate::ir::expr::*;
    use crate::ir::types::Type;

    fn u8x(name: &str) -> Expr {
        var(Type::uint(8, 64), name)
    }

    #[test]
    fn averaging_idiom_selects_avg() {
        // u8((u16(a) + u16(b)) / 2)
        let t16 = Type::uint(16, 64);
        let e = cast(
            Type::uint(8, 64),
            div(
                add(cast(t16, u8x("a")), cast(t16, u8x("b"))),
                make_const(t16, 2),
            ),
        );
        let out = PatternMatcher.mutate_expr(&e);
        assert_eq!(
            out,
            call(
                Type::uint(8, 64),
                "halide.hexagon.avg.vub.vub",
                vec![u8x("a"), u8x("b")],
                CallType::PureExtern,
            )
        );
    }

    #[test]
    fn rounding_saturating_narrow_deinterleaves() {
        // u8_sat((i32(a) + 128) / 256) with a 16-bit a.
        let a = var(Type::int(16, 64), "a");
        let t32 = Type::int(32, 64);
        let e = sat_cast(
            Type::uint(8, 1),
            div(
                add(cast(t32, a.clone()), make_const(t32, 128)),
                make_const(t32, 256),
            ),
        );
        let out = PatternMatcher.mutate_expr(&e);
        assert_eq!(
            out,
            call(
                Type::uint(8, 64),
                "halide.hexagon.trunc_satub_rnd.vh",
                vec![native_deinterleave(a)],
                CallType::PureExtern,
            )
        );
    }

    #[test]
    fn scalar_widening_multiply_interleaves() {
        // u16(a) * broadcast(u16(k))
        let a = u8x("a");
        let kscalar = var(Type::uint(8, 1), "k");
        let e = mul(
            cast(Type::uint(16, 64), a.clone()),
            broadcast(cast(Type::uint(16, 1), kscalar.clone()), 64),
        );
        let out = PatternMatcher.mutate_expr(&e);
        assert_eq!(
            out,
            native_interleave(call(
                Type::uint(16, 64),
                "halide.hexagon.mpy.vub.ub",
                vec![a, broadcast(kscalar, 1)],
                CallType::PureExtern,
            ))
        );
    }

    #[test]
    fn commuted_multiply_still_selects_a_widening_multiply() {
        let a = u8x("a");
        let t16 = Type::uint(16, 64);
        let e = mul(
            broadcast(cast(Type::uint(16, 1), var(Type::uint(8, 1), "k")), 64),
            cast(t16, a.clone()),
        );
        let out = PatternMatcher.mutate_expr(&e);
        match &out {
            Expr::Call { name, .. } => assert!(name.starts_with("halide.hexagon.interleave")),
            _ => panic!("expected interleaved mpy, got {}", out),
        }
    }

    #[test]
    fn cls_idiom_both_orders() {
        let x = var(Type::int(32, 32), "x");
        for e in [
            max(clz(x.clone()), clz(bitwise_not(x.clone()))),
            max(clz(bitwise_not(x.clone())), clz(x.clone())),
        ] {
            let out = PatternMatcher.mutate_expr(&e);
            assert_eq!(
                out,
                add(
                    call(
                        Type::int(32, 32),
                        "halide.hexagon.cls.vw",
                        vec![x.clone()],
                        CallType::PureExtern,
                    ),
                    make_const(Type::int(32, 32), 1),
                )
            );
        }
    }

    #[test]
    fn cls_idiom_requires_matching_operands() {
        let x = var(Type::int(32, 32), "x");
        let y = var(Type::int(32, 32), "y");
        let e = max(clz(x), clz(bitwise_not(y)));
        let out = PatternMatcher.mutate_expr(&e);
        assert!(matches!(out, Expr::Max { .. }));
    }

    #[test]
    fn subtract_of_scalar_multiply_negates_into_mac() {
        // acc - x * 4: the multiplier negates to -4, no longer a power of
        // two, so the scalar MAC fires with the narrowed constant.
        let t = Type::int(16, 64);
        let acc = var(t, "acc");
        let e = sub(acc, mul(var(t, "x"), make_const(t, 4)));
        let out = PatternMatcher.mutate_expr(&e);
        match &out {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "halide.hexagon.add_mul.vh.vh.b");
                assert_eq!(args[2], broadcast(const_scalar(Type::int(8, 1), -4), 1));
            }
            _ => panic!("expected MAC, got {}", out),
        }
    }

    #[test]
    fn minimum_constant_declines_negation() {
        let t = Type::int(16, 64);
        assert_eq!(lossless_negate(&make_const(t, i64::from(i16::MIN))), None);
        assert_eq!(
            lossless_negate(&make_const(t, -5)),
            Some(make_const(t, 5))
        );
    }

    #[test]
    fn double_cast_splits_through_sixteen_bits() {
        // u8(i32(x)) with x genuinely 32-bit becomes nested packs.
        let x = var(Type::int(32, 64), "x");
        let e = cast(Type::uint(8, 64), x.clone());
        let out = PatternMatcher.mutate_expr(&e);
        match &out {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "halide.hexagon.pack.vh");
                match &args[0] {
                    Expr::Call { name, .. } => assert_eq!(name, "halide.hexagon.pack.vw"),
                    other => panic!("inner stage not packed: {}", other),
                }
            }
            _ => panic!("expected pack of pack, got {}", out),
        }
    }
}
