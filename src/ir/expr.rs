//! Expression and statement trees.
//!
//! Expressions are immutable values; rewriters build new trees rather than
//! mutating in place. Every expression has a type computable with
//! [`Expr::ty`]. The constructors at the bottom of this module check operand
//! types in debug builds.

use crate::ir::types::{Type, TypeCode};
use core::fmt;

/// How a call is lowered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CallType {
    /// A named target instruction; the code generator lowers it directly.
    PureExtern,
    /// A pure IR-level operation (bitwise helpers, shifts, `dynamic_shuffle`).
    PureIntrinsic,
}

/// An expression tree node.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    /// Signed integer immediate.
    IntImm {
        /// The immediate's type.
        ty: Type,
        /// The immediate's value.
        value: i64,
    },
    /// Unsigned integer immediate.
    UIntImm {
        /// The immediate's type.
        ty: Type,
        /// The immediate's value.
        value: u64,
    },
    /// A named value. The name `"*"` marks a pattern wildcard.
    Variable {
        /// The variable's type.
        ty: Type,
        /// The variable's name.
        name: String,
    },
    /// Type conversion.
    Cast {
        /// The type to convert to.
        ty: Type,
        /// The expression being converted.
        value: Box<Expr>,
    },
    /// A scalar replicated across `lanes` lanes. `lanes == 0` only occurs
    /// inside patterns, where it matches any broadcast.
    Broadcast {
        /// The scalar expression being broadcast.
        value: Box<Expr>,
        /// The number of lanes in the result.
        lanes: u32,
    },
    /// The vector `[base, base + stride, base + 2*stride, ...]`.
    Ramp {
        /// The value of lane 0.
        base: Box<Expr>,
        /// The difference between consecutive lanes.
        stride: Box<Expr>,
        /// The number of lanes in the result.
        lanes: u32,
    },
    /// Lane-wise addition.
    Add {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise subtraction.
    Sub {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise multiplication.
    Mul {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise division, rounding toward negative infinity.
    Div {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise Euclidean remainder.
    Mod {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise minimum.
    Min {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise maximum.
    Max {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `==`.
    Eq {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `!=`.
    Ne {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `<`.
    Lt {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `<=`.
    Le {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `>`.
    Gt {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise `>=`.
    Ge {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise boolean and.
    And {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise boolean or.
    Or {
        /// Left operand.
        a: Box<Expr>,
        /// Right operand.
        b: Box<Expr>,
    },
    /// Lane-wise boolean negation.
    Not {
        /// The operand being negated.
        a: Box<Expr>,
    },
    /// Lane-wise conditional.
    Select {
        /// The boolean condition.
        cond: Box<Expr>,
        /// The value when `cond` is true.
        t: Box<Expr>,
        /// The value when `cond` is false.
        f: Box<Expr>,
    },
    /// A read of `lanes` elements from buffer `name` at `index`.
    Load {
        /// The type of the loaded value.
        ty: Type,
        /// The name of the buffer being read.
        name: String,
        /// The index expression into the buffer.
        index: Box<Expr>,
        /// The name of the source image, if any.
        image: Option<String>,
        /// The name of the source param, if any.
        param: Option<String>,
    },
    /// A call to a pure intrinsic or target instruction.
    Call {
        /// The type of the call's result.
        ty: Type,
        /// The name of the called intrinsic or instruction.
        name: String,
        /// The call's arguments.
        args: Vec<Expr>,
        /// How the call is lowered.
        call_type: CallType,
    },
    /// An expression-level binding of `name` in `body`.
    Let {
        /// The bound name.
        name: String,
        /// The value bound to `name`.
        value: Box<Expr>,
        /// The expression in which the binding is visible.
        body: Box<Expr>,
    },
}

impl Expr {
    /// The type of this expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntImm { ty, .. }
            | Expr::UIntImm { ty, .. }
            | Expr::Variable { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Load { ty, .. }
            | Expr::Call { ty, .. } => *ty,
            Expr::Broadcast { value, lanes } => value.ty().with_lanes(*lanes),
            Expr::Ramp { base, lanes, .. } => base.ty().with_lanes(*lanes),
            Expr::Add { a, .. }
            | Expr::Sub { a, .. }
            | Expr::Mul { a, .. }
            | Expr::Div { a, .. }
            | Expr::Mod { a, .. }
            | Expr::Min { a, .. }
            | Expr::Max { a, .. } => a.ty(),
            Expr::Eq { a, .. }
            | Expr::Ne { a, .. }
            | Expr::Lt { a, .. }
            | Expr::Le { a, .. }
            | Expr::Gt { a, .. }
            | Expr::Ge { a, .. } => Type::bool(a.ty().lanes),
            Expr::And { a, .. } | Expr::Or { a, .. } | Expr::Not { a } => a.ty(),
            Expr::Select { t, .. } => t.ty(),
            Expr::Let { body, .. } => body.ty(),
        }
    }

    /// If this is an integer immediate, or a broadcast of one, its value.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Expr::IntImm { value, .. } => Some(*value),
            Expr::UIntImm { value, .. } => i64::try_from(*value).ok(),
            Expr::Broadcast { value, .. } => value.as_const_int(),
            _ => None,
        }
    }

    /// Is this expression a wildcard variable?
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Expr::Variable { name, .. } if name == "*")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::IntImm { value, .. } => write!(f, "{}", value),
            Expr::UIntImm { value, .. } => write!(f, "{}", value),
            Expr::Variable { name, .. } => write!(f, "{}", name),
            Expr::Cast { ty, value } => write!(f, "{}({})", ty, value),
            Expr::Broadcast { value, lanes } => write!(f, "x{}({})", lanes, value),
            Expr::Ramp {
                base,
                stride,
                lanes,
            } => write!(f, "ramp({}, {}, {})", base, stride, lanes),
            Expr::Add { a, b } => write!(f, "({} + {})", a, b),
            Expr::Sub { a, b } => write!(f, "({} - {})", a, b),
            Expr::Mul { a, b } => write!(f, "({}*{})", a, b),
            Expr::Div { a, b } => write!(f, "({}/{})", a, b),
            Expr::Mod { a, b } => write!(f, "({} % {})", a, b),
            Expr::Min { a, b } => write!(f, "min({}, {})", a, b),
            Expr::Max { a, b } => write!(f, "max({}, {})", a, b),
            Expr::Eq { a, b } => write!(f, "({} == {})", a, b),
            Expr::Ne { a, b } => write!(f, "({} != {})", a, b),
            Expr::Lt { a, b } => write!(f, "({} < {})", a, b),
            Expr::Le { a, b } => write!(f, "({} <= {})", a, b),
            Expr::Gt { a, b } => write!(f, "({} > {})", a, b),
            Expr::Ge { a, b } => write!(f, "({} >= {})", a, b),
            Expr::And { a, b } => write!(f, "({} && {})", a, b),
            Expr::Or { a, b } => write!(f, "({} || {})", a, b),
            Expr::Not { a } => write!(f, "!({})", a),
            Expr::Select { cond, t, f: fv } => write!(f, "select({}, {}, {})", cond, t, fv),
            Expr::Load { name, index, .. } => write!(f, "{}[{}]", name, index),
            Expr::Call { name, args, .. } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Let { name, value, body } => {
                write!(f, "(let {} = {} in {})", name, value, body)
            }
        }
    }
}

/// A statement tree node. Only the forms the rewriters look inside are
/// modeled; everything is passed through with its expressions mutated.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Stmt {
    /// A statement-level binding of `name` in `body`.
    LetStmt {
        /// The bound name.
        name: String,
        /// The value bound to `name`.
        value: Expr,
        /// The statement in which the binding is visible.
        body: Box<Stmt>,
    },
    /// A write of `value` to buffer `name` at `index`.
    Store {
        /// The name of the buffer being written.
        name: String,
        /// The index expression into the buffer.
        index: Expr,
        /// The value being written.
        value: Expr,
    },
    /// A sequence of statements.
    Block {
        /// The statements, executed in order.
        stmts: Vec<Stmt>,
    },
    /// An expression evaluated for effect.
    Evaluate {
        /// The expression being evaluated.
        value: Expr,
    },
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stmt::LetStmt { name, value, body } => {
                writeln!(f, "let {} = {}", name, value)?;
                write!(f, "{}", body)
            }
            Stmt::Store { name, index, value } => write!(f, "{}[{}] = {}", name, index, value),
            Stmt::Block { stmts } => {
                for s in stmts {
                    writeln!(f, "{}", s)?;
                }
                Ok(())
            }
            Stmt::Evaluate { value } => write!(f, "{}", value),
        }
    }
}

/// An integer constant of scalar type `ty`.
pub fn const_scalar(ty: Type, value: i64) -> Expr {
    debug_assert!(ty.is_scalar());
    match ty.code {
        TypeCode::UInt => Expr::UIntImm {
            ty,
            value: value as u64,
        },
        _ => Expr::IntImm { ty, value },
    }
}

/// An integer constant of `ty`, broadcast if `ty` is not scalar. A lane
/// count of zero yields the wildcard-broadcast form used inside patterns.
pub fn make_const(ty: Type, value: i64) -> Expr {
    if ty.lanes == 1 {
        const_scalar(ty, value)
    } else {
        broadcast(const_scalar(ty.element_of(), value), ty.lanes)
    }
}

/// A named value of type `ty`.
pub fn var(ty: Type, name: &str) -> Expr {
    Expr::Variable {
        ty,
        name: name.to_string(),
    }
}

/// Convert `value` to `ty`. The lane counts must agree.
pub fn cast(ty: Type, value: Expr) -> Expr {
    debug_assert!(
        ty.lanes == value.ty().lanes,
        "cast cannot change lane count: {} -> {}",
        value.ty(),
        ty
    );
    if value.ty() == ty {
        return value;
    }
    Expr::Cast {
        ty,
        value: Box::new(value),
    }
}

/// Convert `value` to the scalar kind of `target` with saturation: the
/// operand is clamped to the target's representable range before the cast.
/// This is the only saturating-cast form the IR has, so matcher patterns
/// and programs under test build the identical `cast(max(min(..)))` tree.
pub fn sat_cast(target: Type, value: Expr) -> Expr {
    let source = value.ty();
    debug_assert!(source.is_integer());
    let target = target.with_lanes(source.lanes);
    debug_assert!(target.is_integer());
    let hi = make_const(source, target.element_of().max_value());
    let lo = make_const(source, target.element_of().min_value());
    let clamped = max(min(value, hi), lo);
    Expr::Cast {
        ty: target,
        value: Box::new(clamped),
    }
}

/// Replicate the scalar `value` across `lanes` lanes.
pub fn broadcast(value: Expr, lanes: u32) -> Expr {
    Expr::Broadcast {
        value: Box::new(value),
        lanes,
    }
}

/// The dense vector `[base, base + stride, ...]` of `lanes` elements.
pub fn ramp(base: Expr, stride: Expr, lanes: u32) -> Expr {
    debug_assert_eq!(base.ty(), stride.ty());
    Expr::Ramp {
        base: Box::new(base),
        stride: Box::new(stride),
        lanes,
    }
}

macro_rules! binop_ctor {
    ($(#[$attr:meta])* $name:ident, $variant:ident) => {
        $(#[$attr])*
        pub fn $name(a: Expr, b: Expr) -> Expr {
            debug_assert_eq!(a.ty(), b.ty(), "operand types differ in {}", stringify!($name));
            Expr::$variant { a: Box::new(a), b: Box::new(b) }
        }
    };
}

binop_ctor!(
    /// Lane-wise addition.
    add, Add
);
binop_ctor!(
    /// Lane-wise subtraction.
    sub, Sub
);
binop_ctor!(
    /// Lane-wise multiplication.
    mul, Mul
);
binop_ctor!(
    /// Lane-wise division.
    div, Div
);
binop_ctor!(
    /// Lane-wise remainder.
    modulo, Mod
);
binop_ctor!(
    /// Lane-wise minimum.
    min, Min
);
binop_ctor!(
    /// Lane-wise maximum.
    max, Max
);
binop_ctor!(
    /// Lane-wise equality.
    eq, Eq
);
binop_ctor!(
    /// Lane-wise inequality.
    ne, Ne
);
binop_ctor!(
    /// Lane-wise `<`.
    lt, Lt
);
binop_ctor!(
    /// Lane-wise `<=`.
    le, Le
);
binop_ctor!(
    /// Lane-wise `>`.
    gt, Gt
);
binop_ctor!(
    /// Lane-wise `>=`.
    ge, Ge
);

/// Lane-wise boolean and.
pub fn and(a: Expr, b: Expr) -> Expr {
    Expr::And {
        a: Box::new(a),
        b: Box::new(b),
    }
}

/// Lane-wise boolean or.
pub fn or(a: Expr, b: Expr) -> Expr {
    Expr::Or {
        a: Box::new(a),
        b: Box::new(b),
    }
}

/// Lane-wise boolean negation.
pub fn not(a: Expr) -> Expr {
    Expr::Not { a: Box::new(a) }
}

/// Lane-wise conditional.
pub fn select(cond: Expr, t: Expr, f: Expr) -> Expr {
    debug_assert_eq!(t.ty(), f.ty());
    Expr::Select {
        cond: Box::new(cond),
        t: Box::new(t),
        f: Box::new(f),
    }
}

/// A read of buffer `name` at `index`.
pub fn load(ty: Type, name: &str, index: Expr) -> Expr {
    Expr::Load {
        ty,
        name: name.to_string(),
        index: Box::new(index),
        image: None,
        param: None,
    }
}

/// A call to a pure intrinsic or target instruction.
pub fn call(ty: Type, name: &str, args: Vec<Expr>, call_type: CallType) -> Expr {
    Expr::Call {
        ty,
        name: name.to_string(),
        args,
        call_type,
    }
}

/// Bind `name` to `value` in `body`.
pub fn let_expr(name: &str, value: Expr, body: Expr) -> Expr {
    Expr::Let {
        name: name.to_string(),
        value: Box::new(value),
        body: Box::new(body),
    }
}

/// Bind `name` to `value` in statement `body`.
pub fn let_stmt(name: &str, value: Expr, body: Stmt) -> Stmt {
    Stmt::LetStmt {
        name: name.to_string(),
        value,
        body: Box::new(body),
    }
}
