//! The closed algebra of C data types handled by the compiler.
//!
//! `DataType` is everything the type system can express after parsing:
//! primary scalars, pointers, arrays, structs (with lazy self-reference),
//! enums, function types, and `void`. Only the *pure* structural queries
//! live here: predicates, integer promotion, usual arithmetic conversions,
//! decay, and stringification. Anything that needs an array length folded
//! (sizes, layouts, compatibility, assignability) lives on the Processor,
//! because lengths are expressions resolved by the compile-time evaluator.

use std::fmt;
use std::rc::Rc;

use crate::frontend::ast::Expr;

/// The primary (scalar) C types.
///
/// Sizes are fixed for the wasm32 target: char 1, short 2, int 4, long 8,
/// float 4, double 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryDataType {
    SignedChar,
    UnsignedChar,
    SignedShort,
    UnsignedShort,
    SignedInt,
    UnsignedInt,
    SignedLong,
    UnsignedLong,
    Float,
    Double,
}

impl PrimaryDataType {
    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            PrimaryDataType::SignedChar | PrimaryDataType::UnsignedChar => 1,
            PrimaryDataType::SignedShort | PrimaryDataType::UnsignedShort => 2,
            PrimaryDataType::SignedInt | PrimaryDataType::UnsignedInt => 4,
            PrimaryDataType::SignedLong | PrimaryDataType::UnsignedLong => 8,
            PrimaryDataType::Float => 4,
            PrimaryDataType::Double => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, PrimaryDataType::Float | PrimaryDataType::Double)
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimaryDataType::Float | PrimaryDataType::Double)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimaryDataType::SignedChar
                | PrimaryDataType::SignedShort
                | PrimaryDataType::SignedInt
                | PrimaryDataType::SignedLong
        )
    }

    /// Conversion rank of an integer type (C17 6.3.1.1); signedness does not
    /// affect rank. Not meaningful for float/double.
    pub fn rank(self) -> u32 {
        match self {
            PrimaryDataType::SignedChar | PrimaryDataType::UnsignedChar => 1,
            PrimaryDataType::SignedShort | PrimaryDataType::UnsignedShort => 2,
            PrimaryDataType::SignedInt | PrimaryDataType::UnsignedInt => 3,
            PrimaryDataType::SignedLong | PrimaryDataType::UnsignedLong => 4,
            PrimaryDataType::Float | PrimaryDataType::Double => 0,
        }
    }

    /// Apply the C integer promotions (C17 6.3.1.1): every integer type
    /// smaller than `int` promotes to `signed int` (all such values fit in a
    /// 4-byte int). Float/double and int/long are unchanged.
    pub fn integer_promoted(self) -> PrimaryDataType {
        match self {
            PrimaryDataType::SignedChar
            | PrimaryDataType::UnsignedChar
            | PrimaryDataType::SignedShort
            | PrimaryDataType::UnsignedShort => PrimaryDataType::SignedInt,
            other => other,
        }
    }

    /// The unsigned counterpart of an integer type (identity for unsigned
    /// and floating types).
    pub fn to_unsigned(self) -> PrimaryDataType {
        match self {
            PrimaryDataType::SignedChar => PrimaryDataType::UnsignedChar,
            PrimaryDataType::SignedShort => PrimaryDataType::UnsignedShort,
            PrimaryDataType::SignedInt => PrimaryDataType::UnsignedInt,
            PrimaryDataType::SignedLong => PrimaryDataType::UnsignedLong,
            other => other,
        }
    }

    /// The usual arithmetic conversions (C17 6.3.1.8) over this type set.
    ///
    /// If either operand is `double` the result is `double`; else if either
    /// is `float` the result is `float`; otherwise both operands are
    /// integer-promoted and the rank/sign rules apply. With these widths a
    /// signed type of strictly greater rank always represents every value of
    /// the lower-rank unsigned type, so the signed type wins that case.
    pub fn usual_arithmetic_conversion(a: PrimaryDataType, b: PrimaryDataType) -> PrimaryDataType {
        use PrimaryDataType::*;
        if a == Double || b == Double {
            return Double;
        }
        if a == Float || b == Float {
            return Float;
        }
        let a = a.integer_promoted();
        let b = b.integer_promoted();
        if a == b {
            return a;
        }
        let (hi, lo) = if a.rank() >= b.rank() { (a, b) } else { (b, a) };
        if hi.is_signed() == lo.is_signed() || !hi.is_signed() {
            hi
        } else if hi.rank() > lo.rank() {
            // Signed type of greater rank represents all values of the
            // unsigned operand.
            hi
        } else {
            // Equal rank, mixed signs: unsigned version of the signed type.
            hi.to_unsigned()
        }
    }

    /// The IR scalar this primary type maps to.
    pub fn ir_type(self) -> IrType {
        match self {
            PrimaryDataType::SignedChar => IrType::I8,
            PrimaryDataType::UnsignedChar => IrType::U8,
            PrimaryDataType::SignedShort => IrType::I16,
            PrimaryDataType::UnsignedShort => IrType::U16,
            PrimaryDataType::SignedInt => IrType::I32,
            PrimaryDataType::UnsignedInt => IrType::U32,
            PrimaryDataType::SignedLong => IrType::I64,
            PrimaryDataType::UnsignedLong => IrType::U64,
            PrimaryDataType::Float => IrType::F32,
            PrimaryDataType::Double => IrType::F64,
        }
    }
}

impl fmt::Display for PrimaryDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimaryDataType::SignedChar => "signed char",
            PrimaryDataType::UnsignedChar => "unsigned char",
            PrimaryDataType::SignedShort => "signed short",
            PrimaryDataType::UnsignedShort => "unsigned short",
            PrimaryDataType::SignedInt => "signed int",
            PrimaryDataType::UnsignedInt => "unsigned int",
            PrimaryDataType::SignedLong => "signed long",
            PrimaryDataType::UnsignedLong => "unsigned long",
            PrimaryDataType::Float => "float",
            PrimaryDataType::Double => "double",
        };
        f.write_str(name)
    }
}

/// A C data type.
///
/// The algebra is a tree: struct self-reference is modeled as the distinct
/// `SelfPointer` marker (valid only inside the enclosing struct's own field
/// list) rather than a back-reference, so recursion over types terminates
/// without cycle detection.
#[derive(Debug, Clone)]
pub enum DataType {
    Primary {
        kind: PrimaryDataType,
        is_const: bool,
    },
    /// Pointer to any type; `Void` is a permitted pointee.
    Pointer {
        pointee: Box<DataType>,
        is_const: bool,
    },
    /// Array with a length expression that must fold to a non-negative
    /// integer constant when the size is needed.
    Array {
        element: Box<DataType>,
        length: Box<Expr>,
        is_const: bool,
    },
    Struct(Rc<StructType>),
    /// Stands for "pointer to the enclosing struct" inside a struct's own
    /// field list; resolved against the enclosing struct when layout or
    /// assignability needs it.
    SelfPointer,
    Enum(EnumType),
    Function(Rc<FunctionType>),
    Void,
}

/// A struct type: ordered fields, packed in declaration order with no
/// padding.
#[derive(Debug)]
pub struct StructType {
    pub tag: Option<String>,
    pub fields: Vec<StructField>,
}

#[derive(Debug)]
pub struct StructField {
    pub name: String,
    pub data_type: DataType,
}

/// An enum type. All enums have the representation of `signed int`;
/// members carry their resolved constant values in declaration order.
#[derive(Debug, Clone)]
pub struct EnumType {
    pub tag: Option<String>,
    pub members: Vec<(String, i128)>,
}

/// A function type. `Void` return means "no return value"; parameter types
/// have already had array/function decay applied by declaration processing.
#[derive(Debug)]
pub struct FunctionType {
    pub return_type: DataType,
    pub parameters: Vec<DataType>,
}

impl DataType {
    /// Convenience constructor for an unqualified primary type.
    pub fn primary(kind: PrimaryDataType) -> DataType {
        DataType::Primary {
            kind,
            is_const: false,
        }
    }

    pub fn signed_int() -> DataType {
        DataType::primary(PrimaryDataType::SignedInt)
    }

    pub fn unsigned_long() -> DataType {
        DataType::primary(PrimaryDataType::UnsignedLong)
    }

    /// Convenience constructor for an unqualified pointer.
    pub fn pointer_to(pointee: DataType) -> DataType {
        DataType::Pointer {
            pointee: Box::new(pointee),
            is_const: false,
        }
    }

    /// The primary kind of this type if it is arithmetic (enums count as
    /// `signed int`).
    pub fn primary_kind(&self) -> Option<PrimaryDataType> {
        match self {
            DataType::Primary { kind, .. } => Some(*kind),
            DataType::Enum(_) => Some(PrimaryDataType::SignedInt),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.primary_kind().map_or(false, |k| k.is_integer())
    }

    pub fn is_float(&self) -> bool {
        self.primary_kind().map_or(false, |k| k.is_float())
    }

    /// Arithmetic types: integer and floating primaries, and enums.
    pub fn is_arithmetic(&self) -> bool {
        self.primary_kind().is_some()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, DataType::Pointer { .. } | DataType::SelfPointer)
    }

    /// Scalar types: arithmetic or pointer.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    /// Aggregate types: arrays and structs, the types that unpack into more
    /// than one primary.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, DataType::Array { .. } | DataType::Struct(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, DataType::Function(_))
    }

    /// Whether this is a pointer to `void`.
    pub fn is_void_pointer(&self) -> bool {
        matches!(self, DataType::Pointer { pointee, .. } if pointee.is_void())
    }

    /// Whether the outermost type carries a `const` qualifier.
    pub fn is_const_qualified(&self) -> bool {
        match self {
            DataType::Primary { is_const, .. }
            | DataType::Pointer { is_const, .. }
            | DataType::Array { is_const, .. } => *is_const,
            _ => false,
        }
    }

    /// Return this type with the outermost `const` qualifier set.
    pub fn with_const(self, value: bool) -> DataType {
        match self {
            DataType::Primary { kind, .. } => DataType::Primary {
                kind,
                is_const: value,
            },
            DataType::Pointer { pointee, .. } => DataType::Pointer {
                pointee,
                is_const: value,
            },
            DataType::Array { element, length, .. } => DataType::Array {
                element,
                length,
                is_const: value,
            },
            other => other,
        }
    }

    /// Apply integer promotion at the type level. Enums promote to
    /// `signed int`; non-arithmetic types are returned unchanged.
    pub fn integer_promoted(&self) -> DataType {
        match self.primary_kind() {
            Some(kind) => DataType::primary(kind.integer_promoted()),
            None => self.clone(),
        }
    }

    /// Array-to-pointer and function-to-pointer decay (C17 6.3.2.1).
    ///
    /// Applied at every expression position except the operand of `sizeof`
    /// and unary `&`. Idempotent: decaying an already-decayed type is the
    /// identity.
    pub fn decay(&self) -> DataType {
        match self {
            DataType::Array { element, .. } => DataType::Pointer {
                pointee: element.clone(),
                is_const: false,
            },
            DataType::Function(f) => DataType::Pointer {
                pointee: Box::new(DataType::Function(Rc::clone(f))),
                is_const: false,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primary { kind, is_const } => {
                if *is_const {
                    write!(f, "const {}", kind)
                } else {
                    write!(f, "{}", kind)
                }
            }
            DataType::Pointer { pointee, is_const } => {
                write!(f, "{}*", pointee)?;
                if *is_const {
                    f.write_str(" const")?;
                }
                Ok(())
            }
            DataType::Array { element, length, .. } => {
                // Lengths are expressions; only a plain literal can be shown
                // without folding.
                match length.as_ref() {
                    Expr::IntLiteral(v, _, _) => write!(f, "{}[{}]", element, v),
                    _ => write!(f, "{}[]", element),
                }
            }
            DataType::Struct(s) => match &s.tag {
                Some(tag) => write!(f, "struct {}", tag),
                None => f.write_str("struct <anonymous>"),
            },
            DataType::SelfPointer => f.write_str("struct*"),
            DataType::Enum(e) => match &e.tag {
                Some(tag) => write!(f, "enum {}", tag),
                None => f.write_str("enum <anonymous>"),
            },
            DataType::Function(func) => {
                write!(f, "{} (", func.return_type)?;
                for (i, p) in func.parameters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                f.write_str(")")
            }
            DataType::Void => f.write_str("void"),
        }
    }
}

/// The scalar shapes a value can have once aggregates are unpacked.
///
/// Signed and unsigned variants are tracked separately so the code generator
/// can pick sign- vs zero-extension and the signed vs unsigned forms of
/// division, remainder, shift-right, and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// wasm32 linear-memory pointer: 4 bytes, unsigned.
    Ptr,
}

impl IrType {
    pub fn size(self) -> u32 {
        match self {
            IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 | IrType::Ptr => 4,
            IrType::I64 | IrType::U64 => 8,
            IrType::F32 => 4,
            IrType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IrType::I8 => "i8",
            IrType::U8 => "u8",
            IrType::I16 => "i16",
            IrType::U16 => "u16",
            IrType::I32 => "i32",
            IrType::U32 => "u32",
            IrType::I64 => "i64",
            IrType::U64 => "u64",
            IrType::F32 => "f32",
            IrType::F64 => "f64",
            IrType::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// One primary scalar of an unpacked aggregate: its byte offset within the
/// containing object and its IR scalar shape, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackedScalar {
    pub offset: u32,
    pub ir_type: IrType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::source::Span;
    use crate::frontend::ast::IntBase;

    fn int_expr(v: i128) -> Box<Expr> {
        Box::new(Expr::IntLiteral(v, IntBase::Decimal, Span::dummy()))
    }

    #[test]
    fn integer_promotion_widens_sub_int() {
        use PrimaryDataType::*;
        assert_eq!(SignedChar.integer_promoted(), SignedInt);
        assert_eq!(UnsignedChar.integer_promoted(), SignedInt);
        assert_eq!(SignedShort.integer_promoted(), SignedInt);
        assert_eq!(UnsignedShort.integer_promoted(), SignedInt);
        assert_eq!(UnsignedInt.integer_promoted(), UnsignedInt);
        assert_eq!(SignedLong.integer_promoted(), SignedLong);
        assert_eq!(Double.integer_promoted(), Double);
    }

    #[test]
    fn usual_arithmetic_conversions() {
        use PrimaryDataType::*;
        let uac = PrimaryDataType::usual_arithmetic_conversion;
        // Floating operands dominate.
        assert_eq!(uac(Double, SignedChar), Double);
        assert_eq!(uac(Float, UnsignedLong), Float);
        assert_eq!(uac(Float, Double), Double);
        // Sub-int operands promote first.
        assert_eq!(uac(SignedChar, UnsignedShort), SignedInt);
        // Same rank, mixed signs: unsigned wins.
        assert_eq!(uac(SignedInt, UnsignedInt), UnsignedInt);
        assert_eq!(uac(SignedLong, UnsignedLong), UnsignedLong);
        // Signed type of greater rank represents all unsigned values.
        assert_eq!(uac(SignedLong, UnsignedInt), SignedLong);
        // Unsigned operand of greater rank.
        assert_eq!(uac(UnsignedLong, SignedInt), UnsignedLong);
    }

    #[test]
    fn decay_is_idempotent() {
        let arr = DataType::Array {
            element: Box::new(DataType::signed_int()),
            length: int_expr(5),
            is_const: false,
        };
        let once = arr.decay();
        assert!(matches!(
            &once,
            DataType::Pointer { pointee, .. } if pointee.is_integer()
        ));
        let twice = once.decay();
        assert_eq!(once.to_string(), twice.to_string());

        let scalar = DataType::signed_int();
        assert_eq!(scalar.decay().to_string(), scalar.to_string());
    }

    #[test]
    fn display_forms() {
        assert_eq!(DataType::signed_int().to_string(), "signed int");
        assert_eq!(DataType::pointer_to(DataType::Void).to_string(), "void*");
        let arr = DataType::Array {
            element: Box::new(DataType::primary(PrimaryDataType::SignedLong)),
            length: int_expr(5),
            is_const: false,
        };
        assert_eq!(arr.to_string(), "signed long[5]");
        let st = DataType::Struct(Rc::new(StructType {
            tag: Some("point".into()),
            fields: vec![],
        }));
        assert_eq!(st.to_string(), "struct point");
    }
}
