//! Scalar and vector value types.
//!
//! A type is a `(code, bits, lanes)` triple. `lanes == 1` denotes a scalar;
//! wider lane counts denote a vector of `lanes` elements of the scalar type.
//! The optimizer only reasons about `Int` and `UInt`; `Float` and `Handle`
//! expressions are passed through untouched.

use core::fmt;

/// The kind of scalar value a type describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypeCode {
    /// Signed two's complement integers.
    Int,
    /// Unsigned integers.
    UInt,
    /// IEEE floating point. Not rewritten by any pass here.
    Float,
    /// Opaque pointer-like values. Not rewritten by any pass here.
    Handle,
}

/// A value type: scalar element kind, element width in bits, lane count.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Type {
    /// Scalar element kind.
    pub code: TypeCode,
    /// Element width in bits.
    pub bits: u8,
    /// Number of lanes. `1` is scalar.
    pub lanes: u32,
}

impl Type {
    /// Create a new type.
    pub const fn new(code: TypeCode, bits: u8, lanes: u32) -> Self {
        Self { code, bits, lanes }
    }

    /// A signed integer type.
    pub const fn int(bits: u8, lanes: u32) -> Self {
        Self::new(TypeCode::Int, bits, lanes)
    }

    /// An unsigned integer type.
    pub const fn uint(bits: u8, lanes: u32) -> Self {
        Self::new(TypeCode::UInt, bits, lanes)
    }

    /// The type of comparison results: one boolean per lane.
    pub const fn bool(lanes: u32) -> Self {
        Self::new(TypeCode::UInt, 1, lanes)
    }

    /// Is this a single-lane type?
    pub fn is_scalar(self) -> bool {
        self.lanes == 1
    }

    /// Is this a multi-lane type?
    pub fn is_vector(self) -> bool {
        self.lanes > 1
    }

    /// Is this a signed integer type?
    pub fn is_int(self) -> bool {
        self.code == TypeCode::Int
    }

    /// Is this an unsigned integer type?
    pub fn is_uint(self) -> bool {
        self.code == TypeCode::UInt
    }

    /// Signed or unsigned integer?
    pub fn is_integer(self) -> bool {
        self.is_int() || self.is_uint()
    }

    /// Same type with a different element width.
    pub fn with_bits(self, bits: u8) -> Self {
        Self { bits, ..self }
    }

    /// Same type with a different scalar kind.
    pub fn with_code(self, code: TypeCode) -> Self {
        Self { code, ..self }
    }

    /// Same type with a different lane count.
    pub fn with_lanes(self, lanes: u32) -> Self {
        Self { lanes, ..self }
    }

    /// The scalar type of one lane.
    pub fn element_of(self) -> Self {
        self.with_lanes(1)
    }

    /// The smallest value representable by one lane of this type.
    ///
    /// Meaningful for integer types of at most 64 bits.
    pub fn min_value(self) -> i64 {
        debug_assert!(self.is_integer() && self.bits <= 64);
        match self.code {
            TypeCode::Int => {
                if self.bits == 64 {
                    i64::MIN
                } else {
                    -(1i64 << (self.bits - 1))
                }
            }
            _ => 0,
        }
    }

    /// The largest value representable by one lane of this type.
    ///
    /// For `UInt(64)` the true maximum does not fit an `i64`; the passes
    /// here never need it, so this saturates to `i64::MAX`.
    pub fn max_value(self) -> i64 {
        debug_assert!(self.is_integer() && self.bits <= 64);
        match self.code {
            TypeCode::Int => {
                if self.bits == 64 {
                    i64::MAX
                } else {
                    (1i64 << (self.bits - 1)) - 1
                }
            }
            _ => {
                if self.bits >= 64 {
                    i64::MAX
                } else {
                    (1i64 << self.bits) - 1
                }
            }
        }
    }

    /// Can every value of one lane of `other` be represented in one lane of
    /// `self`? Both must be integer types.
    pub fn can_represent(self, other: Type) -> bool {
        if !self.is_integer() || !other.is_integer() {
            return false;
        }
        self.min_value() <= other.min_value() && self.max_value() >= other.max_value()
    }

    /// Does `value` fit in one lane of this type?
    pub fn can_hold(self, value: i64) -> bool {
        self.is_integer() && self.min_value() <= value && value <= self.max_value()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.code {
            TypeCode::Int => "i",
            TypeCode::UInt => "u",
            TypeCode::Float => "f",
            TypeCode::Handle => "h",
        };
        if self.lanes == 1 {
            write!(f, "{}{}", prefix, self.bits)
        } else {
            write!(f, "{}{}x{}", prefix, self.bits, self.lanes)
        }
    }
}
