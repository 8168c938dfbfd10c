//! Lookup-table rewriting of bounded indirect loads.
//!
//! A vector load whose index is not a dense ramp costs a gather. When the
//! index provably spans fewer than 256 elements, the whole reachable range
//! fits the target's dynamic-shuffle table: load it contiguously once and
//! permute with the byte offsets. The caller guarantees allocations are
//! padded so reading `extent` elements past the lower bound is safe.

use crate::bounds::{bounds_of_expr_in_scope, Interval};
use crate::intrinsics::DYNAMIC_SHUFFLE;
use crate::ir::expr::{self, CallType, Expr, Stmt};
use crate::ir::mutate::Mutator;
use crate::ir::simplify::{is_one, simplify};
use crate::ir::types::Type;
use crate::scope::Scope;
use log::trace;

/// Derives a conservative upper bound of an integer expression by
/// cancelling matching `min`/`max` clamps out of differences.
struct UpperBound;

impl Mutator for UpperBound {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let Expr::Sub { a, b } = e {
            match (a.as_ref(), b.as_ref()) {
                (Expr::Min { a: xa, b: ka }, Expr::Min { a: xb, b: kb })
                | (Expr::Max { a: xa, b: ka }, Expr::Max { a: xb, b: kb })
                    if ka == kb =>
                {
                    let difference = simplify(&expr::sub((**xa).clone(), (**xb).clone()));
                    return self.mutate_expr(&difference);
                }
                _ => {}
            }
        }
        self.walk_expr(e)
    }
}

/// An expression at least as large as `e` on every input.
pub fn upper_bound(e: &Expr) -> Expr {
    simplify(&UpperBound.mutate_expr(e))
}

/// Replaces bounded indirect vector loads with `dynamic_shuffle`.
pub struct BoundedShuffleRewriter {
    bounds: Scope<Interval>,
}

impl BoundedShuffleRewriter {
    /// Creates a rewriter with empty scope state.
    pub fn new() -> Self {
        Self {
            bounds: Scope::new(),
        }
    }

    fn visit_load(&mut self, e: &Expr) -> Expr {
        let Expr::Load {
            ty,
            name,
            index,
            image,
            param,
        } = e
        else {
            unreachable!()
        };
        let index = self.mutate_expr(index);
        let interval = bounds_of_expr_in_scope(&index, &mut self.bounds);
        if let Interval {
            min: Some(lo),
            max: Some(hi),
        } = interval
        {
            let lo = simplify(&lo);
            let span = simplify(&upper_bound(&expr::sub(simplify(&hi), lo.clone())));
            let fits = simplify(&expr::lt(
                span.clone(),
                expr::make_const(span.ty(), 256),
            ));
            if is_one(&fits) {
                // The reachable range fits one shuffle table.
                let extent = span
                    .as_const_int()
                    .map(|c| (c + 1) as u32)
                    .unwrap_or(256);
                let lut = Expr::Load {
                    ty: ty.with_lanes(extent),
                    name: name.clone(),
                    index: Box::new(expr::ramp(
                        lo.clone(),
                        expr::make_const(lo.ty(), 1),
                        extent,
                    )),
                    image: image.clone(),
                    param: param.clone(),
                };
                let offsets = simplify(&expr::cast(
                    Type::uint(8, ty.lanes),
                    expr::sub(index.clone(), expr::broadcast(lo, ty.lanes)),
                ));
                trace!("{} spans {} entries; using dynamic_shuffle", e, extent);
                return expr::call(
                    *ty,
                    DYNAMIC_SHUFFLE,
                    vec![
                        lut,
                        offsets,
                        expr::const_scalar(Type::int(32, 1), 0),
                        expr::const_scalar(Type::int(32, 1), extent as i64),
                    ],
                    CallType::PureIntrinsic,
                );
            }
        }
        Expr::Load {
            ty: *ty,
            name: name.clone(),
            index: Box::new(index),
            image: image.clone(),
            param: param.clone(),
        }
    }
}

impl Default for BoundedShuffleRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator for BoundedShuffleRewriter {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        match e {
            Expr::Load { ty, index, .. }
                if ty.is_vector() && !matches!(index.as_ref(), Expr::Ramp { .. }) =>
            {
                self.visit_load(e)
            }
            Expr::Let { name, value, body } => {
                let value = self.mutate_expr(value);
                if value.ty().is_vector() {
                    let interval = bounds_of_expr_in_scope(&value, &mut self.bounds);
                    self.bounds.push(name, interval);
                    let body = self.mutate_expr(body);
                    self.bounds.pop(name);
                    expr::let_expr(name, value, body)
                } else {
                    let body = self.mutate_expr(body);
                    expr::let_expr(name, value, body)
                }
            }
            _ => self.walk_expr(e),
        }
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        match s {
            Stmt::LetStmt { name, value, body } => {
                let value = self.mutate_expr(value);
                if value.ty().is_vector() {
                    let interval = bounds_of_expr_in_scope(&value, &mut self.bounds);
                    self.bounds.push(name, interval);
                    let body = self.mutate_stmt(body);
                    self.bounds.pop(name);
                    expr::let_stmt(name, value, body)
                } else {
                    let body = self.mutate_stmt(body);
                    expr::let_stmt(name, value, body)
                }
            }
            _ => self.walk_stmt(s),
        }
    }
}
