//! Algebraic simplification and lossless type conversion.
//!
//! This is not a general-purpose simplifier; it folds the constant and
//! identity forms the peephole passes lean on: scalar and broadcast
//! arithmetic on immediates, comparison folding (so "provably less than"
//! questions have constant answers), and additive/multiplicative
//! identities.

use crate::ir::expr::{self, Expr};
use crate::ir::mutate::Mutator;
use crate::ir::types::{Type, TypeCode};

/// Wrap `value` to the representable range of one lane of `ty`.
fn wrap_to_type(ty: Type, value: i64) -> i64 {
    debug_assert!(ty.is_integer());
    if ty.bits >= 64 {
        return value;
    }
    let mask = (1i64 << ty.bits) - 1;
    let v = value & mask;
    if ty.code == TypeCode::Int && (v >> (ty.bits - 1)) & 1 == 1 {
        v - (1i64 << ty.bits)
    } else {
        v
    }
}

/// Division rounding toward negative infinity, as the IR defines it.
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Euclidean remainder: always in `[0, |b|)`.
fn mod_floor(a: i64, b: i64) -> i64 {
    a - div_floor(a, b) * b
}

struct Simplifier;

impl Simplifier {
    fn fold_binary(&self, e: &Expr) -> Option<Expr> {
        let (a, b) = match e {
            Expr::Add { a, b }
            | Expr::Sub { a, b }
            | Expr::Mul { a, b }
            | Expr::Div { a, b }
            | Expr::Mod { a, b }
            | Expr::Min { a, b }
            | Expr::Max { a, b }
            | Expr::Eq { a, b }
            | Expr::Ne { a, b }
            | Expr::Lt { a, b }
            | Expr::Le { a, b }
            | Expr::Gt { a, b }
            | Expr::Ge { a, b } => (a, b),
            _ => return None,
        };
        // Both sides the same broadcast width: fold on the scalars.
        if let (
            Expr::Broadcast {
                value: av,
                lanes: al,
            },
            Expr::Broadcast {
                value: bv,
                lanes: bl,
            },
        ) = (a.as_ref(), b.as_ref())
        {
            if al == bl {
                let scalar = rebuild_binary(e, (**av).clone(), (**bv).clone());
                if let Some(folded) = self.fold_binary(&scalar) {
                    return Some(expr::broadcast(folded, *al));
                }
            }
        }
        let ty = a.ty();
        if !ty.is_integer() || !ty.is_scalar() {
            return None;
        }
        let (ca, cb) = (a.as_const_int()?, b.as_const_int()?);
        let value = match e {
            Expr::Add { .. } => wrap_to_type(ty, ca.wrapping_add(cb)),
            Expr::Sub { .. } => wrap_to_type(ty, ca.wrapping_sub(cb)),
            Expr::Mul { .. } => wrap_to_type(ty, ca.wrapping_mul(cb)),
            Expr::Div { .. } => {
                if cb == 0 {
                    return None;
                }
                wrap_to_type(ty, div_floor(ca, cb))
            }
            Expr::Mod { .. } => {
                if cb == 0 {
                    return None;
                }
                wrap_to_type(ty, mod_floor(ca, cb))
            }
            Expr::Min { .. } => ca.min(cb),
            Expr::Max { .. } => ca.max(cb),
            Expr::Eq { .. } => return Some(bool_const(ty.lanes, ca == cb)),
            Expr::Ne { .. } => return Some(bool_const(ty.lanes, ca != cb)),
            Expr::Lt { .. } => return Some(bool_const(ty.lanes, ca < cb)),
            Expr::Le { .. } => return Some(bool_const(ty.lanes, ca <= cb)),
            Expr::Gt { .. } => return Some(bool_const(ty.lanes, ca > cb)),
            Expr::Ge { .. } => return Some(bool_const(ty.lanes, ca >= cb)),
            _ => unreachable!(),
        };
        Some(expr::const_scalar(ty, value))
    }
}

impl Simplifier {
    /// Cancellation rules for differences of offset expressions:
    /// `x - x`, `(x + a) - x`, and `(x + a) - (x + b)`.
    fn sub_cancel(&mut self, a: &Expr, b: &Expr) -> Option<Expr> {
        if a == b {
            return Some(expr::make_const(a.ty(), 0));
        }
        if let Expr::Add { a: p, b: q } = a {
            if p.as_ref() == b {
                return Some((**q).clone());
            }
            if q.as_ref() == b {
                return Some((**p).clone());
            }
            if let Expr::Add { a: r, b: s } = b {
                let diff = |x: &Expr, y: &Expr| {
                    let d = expr::sub(x.clone(), y.clone());
                    self.fold_binary(&d)
                };
                if p == r {
                    return diff(q, s);
                }
                if q == s {
                    return diff(p, r);
                }
                if p == s {
                    return diff(q, r);
                }
                if q == r {
                    return diff(p, s);
                }
            }
        }
        None
    }
}

fn bool_const(lanes: u32, value: bool) -> Expr {
    expr::make_const(Type::bool(lanes), value as i64)
}

fn rebuild_binary(template: &Expr, a: Expr, b: Expr) -> Expr {
    match template {
        Expr::Add { .. } => expr::add(a, b),
        Expr::Sub { .. } => expr::sub(a, b),
        Expr::Mul { .. } => expr::mul(a, b),
        Expr::Div { .. } => expr::div(a, b),
        Expr::Mod { .. } => expr::modulo(a, b),
        Expr::Min { .. } => expr::min(a, b),
        Expr::Max { .. } => expr::max(a, b),
        Expr::Eq { .. } => expr::eq(a, b),
        Expr::Ne { .. } => expr::ne(a, b),
        Expr::Lt { .. } => expr::lt(a, b),
        Expr::Le { .. } => expr::le(a, b),
        Expr::Gt { .. } => expr::gt(a, b),
        Expr::Ge { .. } => expr::ge(a, b),
        _ => unreachable!("not a foldable binary operator"),
    }
}

impl Mutator for Simplifier {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        let e = self.walk_expr(e);
        if let Some(folded) = self.fold_binary(&e) {
            return folded;
        }
        match &e {
            // Additive and multiplicative identities.
            Expr::Add { a, b } => {
                if b.as_const_int() == Some(0) {
                    (**a).clone()
                } else if a.as_const_int() == Some(0) {
                    (**b).clone()
                } else {
                    e
                }
            }
            Expr::Sub { a, b } => {
                if b.as_const_int() == Some(0) {
                    (**a).clone()
                } else if let Some(cancelled) = self.sub_cancel(a, b) {
                    cancelled
                } else {
                    e
                }
            }
            Expr::Mul { a, b } => {
                if b.as_const_int() == Some(1) {
                    (**a).clone()
                } else if a.as_const_int() == Some(1) {
                    (**b).clone()
                } else {
                    e
                }
            }
            Expr::Div { a, b } => {
                if b.as_const_int() == Some(1) {
                    (**a).clone()
                } else {
                    e
                }
            }
            // Casts of constants fold, wrapping on narrowing; casts of
            // broadcasts move inside the broadcast.
            Expr::Cast { ty, value } if ty.is_integer() => match value.as_ref() {
                Expr::IntImm { value: v, .. } => expr::const_scalar(*ty, wrap_to_type(*ty, *v)),
                Expr::UIntImm { value: v, .. } => {
                    expr::const_scalar(*ty, wrap_to_type(*ty, *v as i64))
                }
                Expr::Broadcast { value: sv, lanes } if sv.ty().is_integer() => {
                    let inner = self.mutate_expr(&expr::cast(ty.element_of(), (**sv).clone()));
                    expr::broadcast(inner, *lanes)
                }
                _ => e,
            },
            _ => e,
        }
    }
}

/// Simplify `e` by constant folding and the identities above.
pub fn simplify(e: &Expr) -> Expr {
    Simplifier.mutate_expr(e)
}

/// Is `e` provably the constant true (over every lane)?
pub fn is_one(e: &Expr) -> bool {
    e.as_const_int() == Some(1)
}

/// Return an expression of type `ty` equal to `e` on every input, or `None`
/// if that cannot be established. Strips widening casts, narrows constants
/// that fit, and distributes over broadcasts.
pub fn lossless_cast(ty: Type, e: &Expr) -> Option<Expr> {
    if e.ty() == ty {
        return Some(e.clone());
    }
    if ty.lanes != e.ty().lanes {
        return None;
    }
    if !ty.is_integer() || !e.ty().is_integer() {
        return None;
    }
    if ty.can_represent(e.ty()) {
        return Some(expr::cast(ty, e.clone()));
    }
    match e {
        // A cast that lost no information can be looked through.
        Expr::Cast { value, .. } => {
            if e.ty().can_represent(value.ty()) {
                lossless_cast(ty, value)
            } else {
                None
            }
        }
        Expr::Broadcast { value, lanes } => {
            lossless_cast(ty.element_of(), value).map(|v| expr::broadcast(v, *lanes))
        }
        Expr::IntImm { value, .. } => {
            if ty.can_hold(*value) {
                Some(expr::const_scalar(ty, *value))
            } else {
                None
            }
        }
        Expr::UIntImm { value, .. } => {
            let v = i64::try_from(*value).ok()?;
            if ty.can_hold(v) {
                Some(expr::const_scalar(ty, v))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// If `e` is a positive constant power of two, its base-2 logarithm.
pub fn is_const_power_of_two_integer(e: &Expr) -> Option<u8> {
    let v = e.as_const_int()?;
    if v > 0 && (v & (v - 1)) == 0 {
        Some(v.trailing_zeros() as u8)
    } else {
        None
    }
}
