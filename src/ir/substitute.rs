//! Variable substitution and free-variable queries.

use crate::ir::expr::{Expr, Stmt};
use crate::ir::mutate::Mutator;

struct Substitute<'a> {
    name: &'a str,
    replacement: &'a Expr,
}

impl Mutator for Substitute<'_> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        match e {
            Expr::Variable { name, .. } if name == self.name => self.replacement.clone(),
            // An inner binding of the same name shadows the substitution.
            Expr::Let { name, value, body } if name == self.name => Expr::Let {
                name: name.clone(),
                value: Box::new(self.mutate_expr(value)),
                body: body.clone(),
            },
            _ => self.walk_expr(e),
        }
    }
}

/// Replace every free occurrence of `name` in `e` with `replacement`.
pub fn substitute(name: &str, replacement: &Expr, e: &Expr) -> Expr {
    Substitute { name, replacement }.mutate_expr(e)
}

/// Does `e` reference the variable `name` free?
pub fn expr_uses_var(e: &Expr, name: &str) -> bool {
    match e {
        Expr::Variable { name: n, .. } => n == name,
        Expr::Let {
            name: n,
            value,
            body,
        } => expr_uses_var(value, name) || (n != name && expr_uses_var(body, name)),
        Expr::IntImm { .. } | Expr::UIntImm { .. } => false,
        Expr::Cast { value, .. } | Expr::Broadcast { value, .. } | Expr::Not { a: value } => {
            expr_uses_var(value, name)
        }
        Expr::Ramp { base, stride, .. } => {
            expr_uses_var(base, name) || expr_uses_var(stride, name)
        }
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
        | Expr::Or { a, b } => expr_uses_var(a, name) || expr_uses_var(b, name),
        Expr::Select { cond, t, f } => {
            expr_uses_var(cond, name) || expr_uses_var(t, name) || expr_uses_var(f, name)
        }
        Expr::Load { index, .. } => expr_uses_var(index, name),
        Expr::Call { args, .. } => args.iter().any(|a| expr_uses_var(a, name)),
    }
}

/// Does `s` reference the variable `name` free?
pub fn stmt_uses_var(s: &Stmt, name: &str) -> bool {
    match s {
        Stmt::LetStmt {
            name: n,
            value,
            body,
        } => expr_uses_var(value, name) || (n != name && stmt_uses_var(body, name)),
        Stmt::Store { index, value, .. } => {
            expr_uses_var(index, name) || expr_uses_var(value, name)
        }
        Stmt::Block { stmts } => stmts.iter().any(|s| stmt_uses_var(s, name)),
        Stmt::Evaluate { value } => expr_uses_var(value, name),
    }
}
