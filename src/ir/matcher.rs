//! Structural pattern matching over expressions.
//!
//! Patterns are ordinary expressions containing wildcard variables (named
//! `"*"`). A wildcard with a fully specified type binds an expression of
//! exactly that type. A wildcard whose type has `lanes == 0` binds any lane
//! count, but every such wildcard in one match must resolve to the same
//! count. A `Broadcast { .., lanes: 0 }` pattern matches any broadcast;
//! a wildcard directly under it binds the broadcast value as a one-lane
//! broadcast, so scalar operands keep their broadcast shape through
//! rewriting.

use crate::ir::expr::Expr;
use crate::ir::types::Type;
use smallvec::SmallVec;

/// Captures bound by a successful match, in pattern traversal order.
pub type Captures = SmallVec<[Expr; 4]>;

struct MatchState {
    captures: Captures,
    lanes: Option<u32>,
}

impl MatchState {
    fn unify_lanes(&mut self, lanes: u32) -> bool {
        match self.lanes {
            None => {
                self.lanes = Some(lanes);
                true
            }
            Some(l) => l == lanes,
        }
    }

    /// Match a pattern type against a value type, treating `lanes == 0` in
    /// the pattern as "any lane count, unified across the match".
    fn match_type(&mut self, pattern: Type, value: Type) -> bool {
        if pattern.lanes == 0 {
            pattern.code == value.code && pattern.bits == value.bits && self.unify_lanes(value.lanes)
        } else {
            pattern == value
        }
    }
}

/// Match `value` against `pattern`, returning the wildcard captures in
/// traversal order, or `None` if the shapes or types disagree.
pub fn expr_match(pattern: &Expr, value: &Expr) -> Option<Captures> {
    let mut state = MatchState {
        captures: SmallVec::new(),
        lanes: None,
    };
    if matches(pattern, value, &mut state) {
        Some(state.captures)
    } else {
        None
    }
}

fn matches(pattern: &Expr, value: &Expr, state: &mut MatchState) -> bool {
    if let Expr::Variable { ty, name } = pattern {
        if name == "*" {
            if !state.match_type(*ty, value.ty()) {
                return false;
            }
            state.captures.push(value.clone());
            return true;
        }
    }
    match (pattern, value) {
        (
            Expr::IntImm { ty: pt, value: pv },
            Expr::IntImm { ty: vt, value: vv },
        ) => pt.code == vt.code && pt.bits == vt.bits && pv == vv,
        (
            Expr::UIntImm { ty: pt, value: pv },
            Expr::UIntImm { ty: vt, value: vv },
        ) => pt.code == vt.code && pt.bits == vt.bits && pv == vv,
        (
            Expr::Cast { ty: pt, value: pv },
            Expr::Cast { ty: vt, value: vv },
        ) => state.match_type(*pt, *vt) && matches(pv, vv, state),
        (
            Expr::Broadcast {
                value: pv,
                lanes: 0,
            },
            Expr::Broadcast {
                value: vv,
                lanes: vl,
            },
        ) => {
            if !state.unify_lanes(*vl) {
                return false;
            }
            // A wildcard under a broadcast binds the scalar as a one-lane
            // broadcast; anything else matches the scalar structurally.
            if pv.is_wildcard() {
                let one = Expr::Broadcast {
                    value: vv.clone(),
                    lanes: 1,
                };
                matches(pv, &one, state)
            } else {
                matches(pv, vv, state)
            }
        }
        (
            Expr::Broadcast {
                value: pv,
                lanes: pl,
            },
            Expr::Broadcast {
                value: vv,
                lanes: vl,
            },
        ) => pl == vl && matches(pv, vv, state),
        (Expr::Add { a: pa, b: pb }, Expr::Add { a: va, b: vb })
        | (Expr::Sub { a: pa, b: pb }, Expr::Sub { a: va, b: vb })
        | (Expr::Mul { a: pa, b: pb }, Expr::Mul { a: va, b: vb })
        | (Expr::Div { a: pa, b: pb }, Expr::Div { a: va, b: vb })
        | (Expr::Mod { a: pa, b: pb }, Expr::Mod { a: va, b: vb })
        | (Expr::Min { a: pa, b: pb }, Expr::Min { a: va, b: vb })
        | (Expr::Max { a: pa, b: pb }, Expr::Max { a: va, b: vb }) => {
            matches(pa, va, state) && matches(pb, vb, state)
        }
        (
            Expr::Call {
                ty: pt,
                name: pn,
                args: pargs,
                call_type: pct,
            },
            Expr::Call {
                ty: vt,
                name: vn,
                args: vargs,
                call_type: vct,
            },
        ) => {
            pn == vn
                && pct == vct
                && pargs.len() == vargs.len()
                && state.match_type(*pt, *vt)
                && pargs
                    .iter()
                    .zip(vargs.iter())
                    .all(|(p, v)| matches(p, v, state))
        }
        _ => false,
    }
}
