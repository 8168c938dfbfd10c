//! Tree rewriting.
//!
//! A rewriter implements [`Mutator`] and overrides `mutate_expr` (and
//! `mutate_stmt` when it carries statement-level state), falling back to
//! `walk_expr`/`walk_stmt` for the nodes it does not handle. The walkers
//! rebuild each node bottom-up from mutated children.

use crate::ir::expr::{Expr, Stmt};

/// An IR-to-IR rewriter.
pub trait Mutator {
    /// Rewrite one expression. The default recurses into children.
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        self.walk_expr(e)
    }

    /// Rewrite one statement. The default recurses into children.
    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        self.walk_stmt(s)
    }

    /// Rebuild `e` from mutated children.
    fn walk_expr(&mut self, e: &Expr) -> Expr {
        macro_rules! binary {
            ($variant:ident, $a:expr, $b:expr) => {
                Expr::$variant {
                    a: Box::new(self.mutate_expr($a)),
                    b: Box::new(self.mutate_expr($b)),
                }
            };
        }
        match e {
            Expr::IntImm { .. } | Expr::UIntImm { .. } | Expr::Variable { .. } => e.clone(),
            Expr::Cast { ty, value } => Expr::Cast {
                ty: *ty,
                value: Box::new(self.mutate_expr(value)),
            },
            Expr::Broadcast { value, lanes } => Expr::Broadcast {
                value: Box::new(self.mutate_expr(value)),
                lanes: *lanes,
            },
            Expr::Ramp {
                base,
                stride,
                lanes,
            } => Expr::Ramp {
                base: Box::new(self.mutate_expr(base)),
                stride: Box::new(self.mutate_expr(stride)),
                lanes: *lanes,
            },
            Expr::Add { a, b } => binary!(Add, a, b),
            Expr::Sub { a, b } => binary!(Sub, a, b),
            Expr::Mul { a, b } => binary!(Mul, a, b),
            Expr::Div { a, b } => binary!(Div, a, b),
            Expr::Mod { a, b } => binary!(Mod, a, b),
            Expr::Min { a, b } => binary!(Min, a, b),
            Expr::Max { a, b } => binary!(Max, a, b),
            Expr::Eq { a, b } => binary!(Eq, a, b),
            Expr::Ne { a, b } => binary!(Ne, a, b),
            Expr::Lt { a, b } => binary!(Lt, a, b),
            Expr::Le { a, b } => binary!(Le, a, b),
            Expr::Gt { a, b } => binary!(Gt, a, b),
            Expr::Ge { a, b } => binary!(Ge, a, b),
            Expr::And { a, b } => binary!(And, a, b),
            Expr::Or { a, b } => binary!(Or, a, b),
            Expr::Not { a } => Expr::Not {
                a: Box::new(self.mutate_expr(a)),
            },
            Expr::Select { cond, t, f } => Expr::Select {
                cond: Box::new(self.mutate_expr(cond)),
                t: Box::new(self.mutate_expr(t)),
                f: Box::new(self.mutate_expr(f)),
            },
            Expr::Load {
                ty,
                name,
                index,
                image,
                param,
            } => Expr::Load {
                ty: *ty,
                name: name.clone(),
                index: Box::new(self.mutate_expr(index)),
                image: image.clone(),
                param: param.clone(),
            },
            Expr::Call {
                ty,
                name,
                args,
                call_type,
            } => Expr::Call {
                ty: *ty,
                name: name.clone(),
                args: args.iter().map(|a| self.mutate_expr(a)).collect(),
                call_type: *call_type,
            },
            Expr::Let { name, value, body } => Expr::Let {
                name: name.clone(),
                value: Box::new(self.mutate_expr(value)),
                body: Box::new(self.mutate_expr(body)),
            },
        }
    }

    /// Rebuild `s` from mutated children.
    fn walk_stmt(&mut self, s: &Stmt) -> Stmt {
        match s {
            Stmt::LetStmt { name, value, body } => Stmt::LetStmt {
                name: name.clone(),
                value: self.mutate_expr(value),
                body: Box::new(self.mutate_stmt(body)),
            },
            Stmt::Store { name, index, value } => Stmt::Store {
                name: name.clone(),
                index: self.mutate_expr(index),
                value: self.mutate_expr(value),
            },
            Stmt::Block { stmts } => Stmt::Block {
                stmts: stmts.iter().map(|s| self.mutate_stmt(s)).collect(),
            },
            Stmt::Evaluate { value } => Stmt::Evaluate {
                value: self.mutate_expr(value),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::*;
    use crate::ir::types::Type;

    struct RenameVars;

    impl Mutator for RenameVars {
        fn mutate_expr(&mut self, e: &Expr) -> Expr {
            match e {
                Expr::Variable { ty, name } => Expr::Variable {
                    ty: *ty,
                    name: format!("{}_r", name),
                },
                _ => self.walk_expr(e),
            }
        }
    }

    #[test]
    fn walk_reaches_every_leaf() {
        let t = Type::int(16, 32);
        let e = add(
            mul(var(t, "a"), var(t, "b")),
            select(lt(var(t, "a"), var(t, "c")), var(t, "c"), make_const(t, 0)),
        );
        let out = RenameVars.mutate_expr(&e);
        let expected = add(
            mul(var(t, "a_r"), var(t, "b_r")),
            select(
                lt(var(t, "a_r"), var(t, "c_r")),
                var(t, "c_r"),
                make_const(t, 0),
            ),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn walk_stmt_reaches_exprs() {
        let t = Type::int(32, 1);
        let s = let_stmt(
            "x",
            var(t, "y"),
            Stmt::Store {
                name: "buf".to_string(),
                index: var(t, "x"),
                value: var(t, "z"),
            },
        );
        let out = RenameVars.mutate_stmt(&s);
        match out {
            Stmt::LetStmt { value, body, .. } => {
                assert_eq!(value, var(t, "y_r"));
                match *body {
                    Stmt::Store { index, value, .. } => {
                        assert_eq!(index, var(t, "x_r"));
                        assert_eq!(value, var(t, "z_r"));
                    }
                    _ => panic!("expected store"),
                }
            }
            _ => panic!("expected let"),
        }
    }
}
