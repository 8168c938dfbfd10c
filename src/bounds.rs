//! Conservative bounds of integer expressions.
//!
//! An [`Interval`] brackets every lane of an expression with scalar
//! expressions. Endpoints are inclusive and optional; `None` means no
//! bound is known on that side. Free scalar variables are loop-invariant
//! symbols, so their interval is the single point `[x, x]`; everything the
//! transfer functions cannot track falls back to the representable range
//! of the type, or to unknown.

use crate::ir::expr::{self, Expr};
use crate::ir::simplify::simplify;
use crate::ir::types::Type;
use crate::scope::Scope;

/// Inclusive scalar bounds of an expression, lane-wise.
#[derive(Clone, PartialEq, Debug)]
pub struct Interval {
    /// Lower bound, if known.
    pub min: Option<Expr>,
    /// Upper bound, if known.
    pub max: Option<Expr>,
}

impl Interval {
    /// The interval `[e, e]`.
    pub fn single_point(e: Expr) -> Self {
        Self {
            min: Some(e.clone()),
            max: Some(e),
        }
    }

    /// The interval with no known bounds.
    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// The representable range of one lane of `ty`.
    pub fn range_of_type(ty: Type) -> Self {
        if ty.is_integer() && ty.bits < 64 {
            let elem = ty.element_of();
            Self {
                min: Some(expr::const_scalar(elem, ty.min_value())),
                max: Some(expr::const_scalar(elem, ty.max_value())),
            }
        } else {
            Self::unbounded()
        }
    }

    /// Are both endpoints known?
    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }
}

fn lift2(a: &Option<Expr>, b: &Option<Expr>, f: impl Fn(Expr, Expr) -> Expr) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(simplify(&f(a.clone(), b.clone()))),
        _ => None,
    }
}

fn scale(i: &Interval, c: i64, ty: Type) -> Interval {
    let k = expr::const_scalar(ty.element_of(), c);
    let times = |e: &Option<Expr>| {
        e.as_ref()
            .map(|e| simplify(&expr::mul(e.clone(), k.clone())))
    };
    if c >= 0 {
        Interval {
            min: times(&i.min),
            max: times(&i.max),
        }
    } else {
        Interval {
            min: times(&i.max),
            max: times(&i.min),
        }
    }
}

/// Compute conservative bounds of `e` given intervals for the variables in
/// `scope`.
pub fn bounds_of_expr_in_scope(e: &Expr, scope: &mut Scope<Interval>) -> Interval {
    let ty = e.ty();
    match e {
        Expr::IntImm { .. } | Expr::UIntImm { .. } => Interval::single_point(e.clone()),
        Expr::Variable { name, .. } => {
            if let Some(interval) = scope.get(name) {
                interval.clone()
            } else if ty.is_scalar() {
                // A free scalar is a loop-invariant symbol.
                Interval::single_point(e.clone())
            } else {
                Interval::range_of_type(ty)
            }
        }
        Expr::Cast { ty, value } => {
            if ty.can_represent(value.ty()) {
                let inner = bounds_of_expr_in_scope(value, scope);
                let recast = |e: &Option<Expr>| {
                    e.as_ref()
                        .map(|e| simplify(&expr::cast(ty.element_of(), e.clone())))
                };
                Interval {
                    min: recast(&inner.min),
                    max: recast(&inner.max),
                }
            } else {
                // Narrowing wraps; all we know is the target's range.
                Interval::range_of_type(*ty)
            }
        }
        Expr::Broadcast { value, .. } => bounds_of_expr_in_scope(value, scope),
        Expr::Ramp {
            base,
            stride,
            lanes,
        } => {
            let b = bounds_of_expr_in_scope(base, scope);
            match stride.as_const_int() {
                Some(c) => {
                    let extent = c * (*lanes as i64 - 1);
                    let k = expr::const_scalar(base.ty().element_of(), extent);
                    if c >= 0 {
                        Interval {
                            min: b.min,
                            max: b.max.map(|m| simplify(&expr::add(m, k))),
                        }
                    } else {
                        Interval {
                            min: b.min.map(|m| simplify(&expr::add(m, k))),
                            max: b.max,
                        }
                    }
                }
                None => Interval::range_of_type(ty),
            }
        }
        Expr::Add { a, b } => {
            let (ia, ib) = (
                bounds_of_expr_in_scope(a, scope),
                bounds_of_expr_in_scope(b, scope),
            );
            Interval {
                min: lift2(&ia.min, &ib.min, expr::add),
                max: lift2(&ia.max, &ib.max, expr::add),
            }
        }
        Expr::Sub { a, b } => {
            let (ia, ib) = (
                bounds_of_expr_in_scope(a, scope),
                bounds_of_expr_in_scope(b, scope),
            );
            Interval {
                min: lift2(&ia.min, &ib.max, expr::sub),
                max: lift2(&ia.max, &ib.min, expr::sub),
            }
        }
        Expr::Mul { a, b } => {
            if let Some(c) = b.as_const_int() {
                scale(&bounds_of_expr_in_scope(a, scope), c, ty)
            } else if let Some(c) = a.as_const_int() {
                scale(&bounds_of_expr_in_scope(b, scope), c, ty)
            } else {
                Interval::range_of_type(ty)
            }
        }
        Expr::Div { a, b } => match b.as_const_int() {
            Some(c) if c > 0 => {
                let ia = bounds_of_expr_in_scope(a, scope);
                let k = expr::const_scalar(ty.element_of(), c);
                let over = |e: &Option<Expr>| {
                    e.as_ref()
                        .map(|e| simplify(&expr::div(e.clone(), k.clone())))
                };
                Interval {
                    min: over(&ia.min),
                    max: over(&ia.max),
                }
            }
            _ => Interval::range_of_type(ty),
        },
        Expr::Mod { b, .. } => match b.as_const_int() {
            // Euclidean remainder lands in [0, c-1].
            Some(c) if c > 0 => Interval {
                min: Some(expr::const_scalar(ty.element_of(), 0)),
                max: Some(expr::const_scalar(ty.element_of(), c - 1)),
            },
            _ => Interval::range_of_type(ty),
        },
        Expr::Min { a, b } => {
            let (ia, ib) = (
                bounds_of_expr_in_scope(a, scope),
                bounds_of_expr_in_scope(b, scope),
            );
            Interval {
                min: lift2(&ia.min, &ib.min, expr::min),
                // One known upper bound already bounds the minimum.
                max: match (ia.max, ib.max) {
                    (Some(x), Some(y)) => Some(simplify(&expr::min(x, y))),
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (None, None) => None,
                },
            }
        }
        Expr::Max { a, b } => {
            let (ia, ib) = (
                bounds_of_expr_in_scope(a, scope),
                bounds_of_expr_in_scope(b, scope),
            );
            Interval {
                min: match (ia.min, ib.min) {
                    (Some(x), Some(y)) => Some(simplify(&expr::max(x, y))),
                    (Some(x), None) | (None, Some(x)) => Some(x),
                    (None, None) => None,
                },
                max: lift2(&ia.max, &ib.max, expr::max),
            }
        }
        Expr::Select { t, f, .. } => {
            let (it, ifl) = (
                bounds_of_expr_in_scope(t, scope),
                bounds_of_expr_in_scope(f, scope),
            );
            Interval {
                min: lift2(&it.min, &ifl.min, expr::min),
                max: lift2(&it.max, &ifl.max, expr::max),
            }
        }
        Expr::Let { name, value, body } => {
            let value_bounds = bounds_of_expr_in_scope(value, scope);
            scope.push(name, value_bounds);
            let result = bounds_of_expr_in_scope(body, scope);
            scope.pop(name);
            result
        }
        _ => Interval::range_of_type(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::*;
    use crate::ir::types::Type;

    fn bounds(e: &Expr) -> Interval {
        bounds_of_expr_in_scope(e, &mut Scope::new())
    }

    #[test]
    fn constants_and_free_scalars() {
        let t = Type::int(32, 1);
        let c = make_const(t, 42);
        assert_eq!(bounds(&c), Interval::single_point(c));
        let base = var(t, "base");
        assert_eq!(bounds(&base), Interval::single_point(base));
    }

    #[test]
    fn offset_range_around_invariant_base() {
        // base + (x % 201): [base, base + 200].
        let t = Type::int(32, 64);
        let base = var(Type::int(32, 1), "base");
        let e = add(
            broadcast(base.clone(), 64),
            modulo(var(t, "x"), make_const(t, 201)),
        );
        let i = bounds(&e);
        assert_eq!(i.min, Some(base.clone()));
        assert_eq!(
            i.max,
            Some(add(base, make_const(Type::int(32, 1), 200)))
        );
    }

    #[test]
    fn ramp_extends_by_stride() {
        let t = Type::int(32, 1);
        let r = ramp(var(t, "b"), make_const(t, 2), 16);
        let i = bounds(&r);
        assert_eq!(i.min, Some(var(t, "b")));
        assert_eq!(i.max, Some(add(var(t, "b"), make_const(t, 30))));
    }

    #[test]
    fn narrow_types_fall_back_to_type_range() {
        let e = var(Type::uint(8, 64), "v");
        let i = bounds(&e);
        assert_eq!(i.min.unwrap().as_const_int(), Some(0));
        assert_eq!(i.max.unwrap().as_const_int(), Some(255));
    }

    #[test]
    fn let_bindings_enter_scope() {
        let t = Type::int(32, 1);
        let e = let_expr(
            "y",
            modulo(var(t, "x"), make_const(t, 10)),
            add(var(t, "y"), make_const(t, 5)),
        );
        let i = bounds(&e);
        assert_eq!(i.min.unwrap().as_const_int(), Some(5));
        assert_eq!(i.max.unwrap().as_const_int(), Some(14));
    }

    #[test]
    fn min_uses_either_upper_bound() {
        let t = Type::int(64, 16);
        // A 64-bit vector has no usable type range, but min(x, 100) is
        // still at most 100.
        let e = min(var(t, "x"), make_const(t, 100));
        let i = bounds(&e);
        assert_eq!(i.min, None);
        assert_eq!(i.max.unwrap().as_const_int(), Some(100));
    }
}
