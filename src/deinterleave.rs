//! Cancellation of interleave/deinterleave pairs.
//!
//! Instruction selection leaves `native_interleave` markers on widening
//! results and `native_deinterleave` markers on narrowing operands. Lane
//! permutations distribute over pointwise operations, so this pass pushes
//! interleaves outward until adjacent pairs annihilate, republishing `Let`
//! bindings in both layouts when their bodies want both.

use crate::intrinsics::{
    is_interleave_op_name, is_native_deinterleave, is_native_interleave, native_interleave,
};
use crate::ir::expr::{self, Expr, Stmt};
use crate::ir::mutate::Mutator;
use crate::ir::substitute::{expr_uses_var, stmt_uses_var};
use crate::scope::Scope;
use log::trace;
use smallvec::SmallVec;

const DEINTERLEAVED: &str = ".deinterleaved";

/// Pushes interleaves outward and cancels redundant pairs.
pub struct InterleaveEliminator {
    /// Names whose `.deinterleaved` twin is bound in the current body.
    vars: Scope<()>,
}

fn deinterleaved_name(name: &str) -> String {
    format!("{}{}", name, DEINTERLEAVED)
}

/// Operand lists the pointwise rules work over.
type Operands<'a> = SmallVec<[&'a Expr; 3]>;

fn pointwise_operands(e: &Expr) -> Option<Operands> {
    let mut ops = Operands::new();
    match e {
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
        | Expr::Ge { a, b }
        | Expr::And { a, b }
        | Expr::Or { a, b } => {
            ops.push(a);
            ops.push(b);
        }
        Expr::Not { a } => ops.push(a),
        Expr::Select { cond, t, f } => {
            ops.push(cond);
            ops.push(t);
            ops.push(f);
        }
        _ => return None,
    }
    Some(ops)
}

fn rebuild_pointwise(template: &Expr, mut ops: Vec<Expr>) -> Expr {
    let mut next = || Box::new(ops.remove(0));
    match template {
        Expr::Add { .. } => Expr::Add { a: next(), b: next() },
        Expr::Sub { .. } => Expr::Sub { a: next(), b: next() },
        Expr::Mul { .. } => Expr::Mul { a: next(), b: next() },
        Expr::Div { .. } => Expr::Div { a: next(), b: next() },
        Expr::Mod { .. } => Expr::Mod { a: next(), b: next() },
        Expr::Min { .. } => Expr::Min { a: next(), b: next() },
        Expr::Max { .. } => Expr::Max { a: next(), b: next() },
        Expr::Eq { .. } => Expr::Eq { a: next(), b: next() },
        Expr::Ne { .. } => Expr::Ne { a: next(), b: next() },
        Expr::Lt { .. } => Expr::Lt { a: next(), b: next() },
        Expr::Le { .. } => Expr::Le { a: next(), b: next() },
        Expr::Gt { .. } => Expr::Gt { a: next(), b: next() },
        Expr::Ge { .. } => Expr::Ge { a: next(), b: next() },
        Expr::And { .. } => Expr::And { a: next(), b: next() },
        Expr::Or { .. } => Expr::Or { a: next(), b: next() },
        Expr::Not { .. } => Expr::Not { a: next() },
        Expr::Select { .. } => Expr::Select {
            cond: next(),
            t: next(),
            f: next(),
        },
        _ => unreachable!("not a pointwise node"),
    }
}

/// The deinterleaving twin of a pack instruction, if it has one, plus any
/// extra constant arguments the twin requires.
fn deinterleaving_alternative(name: &str) -> Option<(&'static str, Vec<Expr>)> {
    match name {
        "halide.hexagon.pack.vh" => Some(("halide.hexagon.trunc.vh", vec![])),
        "halide.hexagon.pack.vw" => Some(("halide.hexagon.trunc.vw", vec![])),
        "halide.hexagon.pack_satub.vh" => Some(("halide.hexagon.trunc_satub.vh", vec![])),
        "halide.hexagon.pack_sath.vw" => Some(("halide.hexagon.trunc_sath.vw", vec![])),
        "halide.hexagon.pack_satuh.vw" => Some((
            "halide.hexagon.trunc_satuh_shr.vw.w",
            vec![expr::const_scalar(crate::ir::Type::int(32, 1), 0)],
        )),
        _ => None,
    }
}

impl InterleaveEliminator {
    /// Creates an eliminator with empty scope state.
    pub fn new() -> Self {
        Self { vars: Scope::new() }
    }

    /// Does `e` become a plain expression when an enclosing interleave is
    /// stripped? True for actual interleaves, scalars, broadcasts, and
    /// variables with a published deinterleaved twin.
    fn yields_interleave(&self, e: &Expr) -> bool {
        if is_native_interleave(e) || e.ty().is_scalar() {
            return true;
        }
        match e {
            Expr::Broadcast { .. } => true,
            Expr::Variable { name, .. } => self.vars.contains(&deinterleaved_name(name)),
            _ => false,
        }
    }

    /// A gang is removable when stripping is productive: at least one
    /// operand is an actual interleave and the rest all yield one.
    fn is_removable_gang(&self, ops: &[&Expr]) -> bool {
        ops.iter().any(|o| is_native_interleave(o)) && ops.iter().all(|o| self.yields_interleave(o))
    }

    /// Strip the interleave from `e`.
    fn remove_interleave(&self, e: Expr) -> Expr {
        if e.ty().is_scalar() {
            return e;
        }
        match e {
            Expr::Call { ref args, .. } if is_native_interleave(&e) => args[0].clone(),
            Expr::Broadcast { .. } => e,
            Expr::Variable { ty, ref name } if self.vars.contains(&deinterleaved_name(name)) => {
                Expr::Variable {
                    ty,
                    name: deinterleaved_name(name),
                }
            }
            _ => panic!("removing interleave from an expression that has none: {}", e),
        }
    }

    fn strip_all(&self, ops: &[&Expr]) -> Vec<Expr> {
        ops.iter().map(|o| self.remove_interleave((*o).clone())).collect()
    }

    fn visit_pointwise(&mut self, e: &Expr) -> Expr {
        let out = self.walk_expr(e);
        // Interleaves only exist at 8/16/32-bit lane widths; comparison
        // masks and wider lanes rebuild without regrouping.
        if matches!(out.ty().bits, 8 | 16 | 32) {
            if let Some(ops) = pointwise_operands(&out) {
                if self.is_removable_gang(&ops) {
                    let stripped = self.strip_all(&ops);
                    let rebuilt = rebuild_pointwise(&out, stripped);
                    trace!("hoisting interleave out of {}", out);
                    return native_interleave(rebuilt);
                }
            }
        }
        out
    }

    /// Is a call transparent to lane permutation of all its operands?
    fn is_interleavable(&self, call: &Expr) -> bool {
        let Expr::Call { ty, name, args, .. } = call else {
            return false;
        };
        match name.as_str() {
            "bitwise_and" | "bitwise_not" | "bitwise_xor" | "bitwise_or" | "shift_left"
            | "shift_right" | "abs" | "absd" => true,
            _ if is_interleave_op_name(name) => false,
            _ if name.starts_with("halide.hexagon.") => args
                .iter()
                .filter(|a| a.ty().is_vector())
                .all(|a| a.ty().lanes == ty.lanes && a.ty().bits == ty.bits),
            _ => false,
        }
    }

    fn visit_call(&mut self, e: &Expr) -> Expr {
        let out = self.walk_expr(e);
        let Expr::Call {
            ty,
            name,
            args,
            call_type,
        } = &out
        else {
            unreachable!()
        };
        if is_native_deinterleave(&out) && self.yields_interleave(&args[0]) {
            trace!("deinterleave of interleave cancels: {}", out);
            return self.remove_interleave(args[0].clone());
        }
        if is_native_interleave(&out) && is_native_deinterleave(&args[0]) {
            if let Expr::Call { args: inner, .. } = &args[0] {
                trace!("interleave of deinterleave cancels: {}", out);
                return inner[0].clone();
            }
        }
        let arg_refs: Operands = args.iter().collect();
        if self.is_interleavable(&out) && self.is_removable_gang(&arg_refs) {
            let stripped = self.strip_all(&arg_refs);
            trace!("hoisting interleave out of {}", out);
            return native_interleave(expr::call(*ty, name, stripped, *call_type));
        }
        if let Some((alternative, extra)) = deinterleaving_alternative(name) {
            if self.is_removable_gang(&arg_refs) {
                let mut stripped = self.strip_all(&arg_refs);
                stripped.extend(extra);
                trace!("{} -> {}", name, alternative);
                return expr::call(*ty, alternative, stripped, *call_type);
            }
        }
        drop(arg_refs);
        out
    }

    fn visit_cast(&mut self, e: &Expr) -> Expr {
        let out = self.walk_expr(e);
        if let Expr::Cast { ty, value } = &out {
            if ty.bits == value.ty().bits && is_native_interleave(value) {
                let inner = self.remove_interleave((**value).clone());
                return native_interleave(Expr::Cast {
                    ty: *ty,
                    value: Box::new(inner),
                });
            }
        }
        out
    }
}

impl Default for InterleaveEliminator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator for InterleaveEliminator {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        match e {
            Expr::Cast { .. } => self.visit_cast(e),
            Expr::Call { .. } => self.visit_call(e),
            Expr::Let { name, value, body } => {
                let value = self.mutate_expr(value);
                if !is_native_interleave(&value) {
                    let body = self.mutate_expr(body);
                    return expr::let_expr(name, value, body);
                }
                let dname = deinterleaved_name(name);
                self.vars.push(&dname, ());
                let new_body = self.mutate_expr(body);
                self.vars.pop(&dname);
                let uses_orig = expr_uses_var(&new_body, name);
                let uses_deint = expr_uses_var(&new_body, &dname);
                let ty = value.ty();
                match (uses_orig, uses_deint) {
                    (true, true) => expr::let_expr(
                        &dname,
                        self.remove_interleave(value),
                        expr::let_expr(
                            name,
                            native_interleave(expr::var(ty, &dname)),
                            new_body,
                        ),
                    ),
                    (false, true) => {
                        expr::let_expr(&dname, self.remove_interleave(value), new_body)
                    }
                    (true, false) => expr::let_expr(name, value, new_body),
                    (false, false) => {
                        assert!(
                            !expr_uses_var(body, name),
                            "dead binding of {} still referenced before rewriting",
                            name
                        );
                        new_body
                    }
                }
            }
            _ => {
                if pointwise_operands(e).is_some() {
                    self.visit_pointwise(e)
                } else {
                    self.walk_expr(e)
                }
            }
        }
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        match s {
            Stmt::LetStmt { name, value, body } => {
                let value = self.mutate_expr(value);
                if !is_native_interleave(&value) {
                    let body = self.mutate_stmt(body);
                    return expr::let_stmt(name, value, body);
                }
                let dname = deinterleaved_name(name);
                self.vars.push(&dname, ());
                let new_body = self.mutate_stmt(body);
                self.vars.pop(&dname);
                let uses_orig = stmt_uses_var(&new_body, name);
                let uses_deint = stmt_uses_var(&new_body, &dname);
                let ty = value.ty();
                match (uses_orig, uses_deint) {
                    (true, true) => expr::let_stmt(
                        &dname,
                        self.remove_interleave(value),
                        expr::let_stmt(
                            name,
                            native_interleave(expr::var(ty, &dname)),
                            new_body,
                        ),
                    ),
                    (false, true) => {
                        expr::let_stmt(&dname, self.remove_interleave(value), new_body)
                    }
                    (true, false) => expr::let_stmt(name, value, new_body),
                    (false, false) => {
                        assert!(
                            !stmt_uses_var(body, name),
                            "dead binding of {} still referenced before rewriting",
                            name
                        );
                        new_body
                    }
                }
            }
            _ => self.walk_stmt(s),
        }
    }
}
