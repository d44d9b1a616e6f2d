//! Compile-time expression evaluation.
//!
//! Folds constant expressions over integers and floats: array lengths,
//! enum member values, case labels, and data-segment initializers all pass
//! through here. Integer arithmetic wraps at the two's-complement width of
//! the result type on every operation, so the `i128` working domain is
//! unobservable. The address of a data-segment variable folds to an opaque
//! constant pointer, which is what lets global initializers like
//! `int *p = &g;` serialize into the data segment.

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{DataType, PrimaryDataType};
use crate::frontend::ast::{BinaryOperator, Expr, IntBase, UnaryOperator};
use super::lowering::Processor;

/// A folded constant: an integer with its C type (pointer-typed for address
/// constants) or a float.
#[derive(Debug, Clone)]
pub(super) enum Constant {
    Int { value: i128, data_type: DataType },
    Float { value: f64, data_type: DataType },
}

impl Constant {
    pub fn int(value: i128, kind: PrimaryDataType) -> Constant {
        Constant::Int {
            value: wrap_integer(value, kind),
            data_type: DataType::primary(kind),
        }
    }

    /// A `signed int` truth value.
    pub fn truth(value: bool) -> Constant {
        Constant::int(if value { 1 } else { 0 }, PrimaryDataType::SignedInt)
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Constant::Int { data_type, .. } | Constant::Float { data_type, .. } => data_type,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Constant::Int { value, .. } => *value == 0,
            Constant::Float { value, .. } => *value == 0.0,
        }
    }
}

/// Wrap `value` to the two's-complement width of `kind`, reinterpreting the
/// low bits as signed or unsigned per the type.
pub(super) fn wrap_integer(value: i128, kind: PrimaryDataType) -> i128 {
    let bits = (kind.size() * 8) as u32;
    let mask: i128 = (1i128 << bits) - 1;
    let low = value & mask;
    if kind.is_signed() && (low >> (bits - 1)) & 1 == 1 {
        low - (1i128 << bits)
    } else {
        low
    }
}

/// The C17 type of an integer constant (6.4.4.1): the smallest of
/// `signed int`, `signed long`, `unsigned long` that represents the value,
/// with hex/octal constants also trying the unsigned type at each rank.
pub(super) fn integer_literal_type(value: i128, base: IntBase) -> PrimaryDataType {
    use PrimaryDataType::*;
    if value <= i32::MAX as i128 {
        return SignedInt;
    }
    if base != IntBase::Decimal && value <= u32::MAX as i128 {
        return UnsignedInt;
    }
    if value <= i64::MAX as i128 {
        return SignedLong;
    }
    UnsignedLong
}

impl Processor {
    /// Try to fold `expr` to a constant. The canonical failure message is
    /// `expression is not a compile-time constant`.
    pub(super) fn eval_const_expr(&self, expr: &Expr) -> Result<Constant, ProcessingError> {
        let span = expr.span();
        match expr {
            Expr::IntLiteral(value, base, _) => {
                Ok(Constant::int(*value, integer_literal_type(*value, *base)))
            }
            Expr::FloatLiteral(value, _) => Ok(Constant::Float {
                value: *value,
                data_type: DataType::primary(PrimaryDataType::Double),
            }),
            Expr::FloatLiteralF32(value, _) => Ok(Constant::Float {
                value: *value as f32 as f64,
                data_type: DataType::primary(PrimaryDataType::Float),
            }),
            Expr::CharLiteral(value, _) => {
                Ok(Constant::int(*value as i128, PrimaryDataType::SignedInt))
            }
            Expr::Identifier(name, _) => match self.symbols.lookup(name) {
                Some(SymbolEntry::Enumerator { value }) => {
                    Ok(Constant::int(*value, PrimaryDataType::SignedInt))
                }
                // An array in the data segment folds to its (decayed)
                // address.
                Some(SymbolEntry::DataSegmentVariable { data_type, offset }) => match data_type {
                    DataType::Array { element, .. } => Ok(Constant::Int {
                        value: *offset as i128,
                        data_type: DataType::Pointer {
                            pointee: element.clone(),
                            is_const: false,
                        },
                    }),
                    _ => Err(not_constant(span)),
                },
                _ => Err(not_constant(span)),
            },
            Expr::AddressOf(inner, _) => match inner.as_ref() {
                Expr::Identifier(name, _) => match self.symbols.lookup(name) {
                    Some(SymbolEntry::DataSegmentVariable { data_type, offset }) => {
                        Ok(Constant::Int {
                            value: *offset as i128,
                            data_type: DataType::pointer_to(data_type.clone()),
                        })
                    }
                    _ => Err(not_constant(span)),
                },
                _ => Err(not_constant(span)),
            },
            Expr::UnaryOp(op, inner, _) => self.eval_const_unary(*op, inner, span),
            Expr::BinaryOp(op, lhs, rhs, _) => self.eval_const_binary(*op, lhs, rhs, span),
            Expr::Conditional(cond, then_expr, else_expr, _) => {
                let cond = self.eval_const_expr(cond)?;
                if !cond.data_type().is_scalar() {
                    return Err(not_constant(span));
                }
                // Only the chosen branch is evaluated, mirroring runtime
                // short-circuiting.
                if cond.is_zero() {
                    self.eval_const_expr(else_expr)
                } else {
                    self.eval_const_expr(then_expr)
                }
            }
            Expr::Cast(specifier, inner, _) => {
                let target = self.resolve_scalar_specifier(specifier, span)?;
                let value = self.eval_const_expr(inner)?;
                convert_constant(value, &target, span)
            }
            Expr::SizeofType(specifier, _) => {
                let ty = self.resolve_scalar_specifier(specifier, span)?;
                self.sizeof_constant(&ty, span)
            }
            Expr::SizeofExpr(inner, _) => {
                let ty = self.static_expr_type(inner)?;
                self.sizeof_constant(&ty, span)
            }
            _ => Err(not_constant(span)),
        }
    }

    fn sizeof_constant(&self, ty: &DataType, span: Span) -> Result<Constant, ProcessingError> {
        if ty.is_function() {
            return Err(Self::error(
                "invalid application of 'sizeof' to function type",
                span,
            ));
        }
        let size = self.size_of(ty, span)?;
        Ok(Constant::int(size as i128, PrimaryDataType::UnsignedLong))
    }

    /// The declared type of an expression, derivable without processing it.
    /// Covers the operand forms `sizeof` meets in constant contexts.
    fn static_expr_type(&self, expr: &Expr) -> Result<DataType, ProcessingError> {
        match expr {
            Expr::Identifier(name, span) => match self.symbols.lookup(name) {
                Some(SymbolEntry::LocalVariable { data_type, .. })
                | Some(SymbolEntry::DataSegmentVariable { data_type, .. }) => {
                    Ok(data_type.clone())
                }
                Some(SymbolEntry::Enumerator { .. }) => Ok(DataType::signed_int()),
                _ => Err(Self::error(format!("'{}' undeclared", name), *span)),
            },
            Expr::StringLiteral(text, span) => Ok(DataType::Array {
                element: Box::new(DataType::primary(PrimaryDataType::SignedChar)),
                length: Box::new(Expr::IntLiteral(
                    text.len() as i128 + 1,
                    IntBase::Decimal,
                    *span,
                )),
                is_const: false,
            }),
            other => Ok(self.eval_const_expr(other)?.data_type().clone()),
        }
    }

    fn eval_const_unary(
        &self,
        op: UnaryOperator,
        inner: &Expr,
        span: Span,
    ) -> Result<Constant, ProcessingError> {
        let value = self.eval_const_expr(inner)?;
        match op {
            UnaryOperator::Plus => match value {
                Constant::Int { value, data_type } => {
                    let kind = promoted_kind(&data_type).ok_or_else(|| not_constant(span))?;
                    Ok(Constant::int(value, kind))
                }
                float => Ok(float),
            },
            UnaryOperator::Neg => match value {
                Constant::Int { value, data_type } => {
                    let kind = promoted_kind(&data_type).ok_or_else(|| not_constant(span))?;
                    Ok(Constant::int(-wrap_integer(value, kind), kind))
                }
                Constant::Float { value, data_type } => Ok(Constant::Float {
                    value: -value,
                    data_type,
                }),
            },
            UnaryOperator::BitNot => match value {
                Constant::Int { value, data_type } if data_type.is_integer() => {
                    let kind = promoted_kind(&data_type).ok_or_else(|| not_constant(span))?;
                    Ok(Constant::int(!wrap_integer(value, kind), kind))
                }
                _ => Err(not_constant(span)),
            },
            UnaryOperator::LogicalNot => {
                if !value.data_type().is_scalar() {
                    return Err(not_constant(span));
                }
                Ok(Constant::truth(value.is_zero()))
            }
            UnaryOperator::PreIncrement | UnaryOperator::PreDecrement => Err(not_constant(span)),
        }
    }

    fn eval_const_binary(
        &self,
        op: BinaryOperator,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<Constant, ProcessingError> {
        // Logical operators short-circuit: the right operand is only
        // evaluated when the left does not already decide the result.
        if op == BinaryOperator::LogicalAnd || op == BinaryOperator::LogicalOr {
            let left = self.eval_const_expr(lhs)?;
            if !left.data_type().is_scalar() {
                return Err(not_constant(span));
            }
            let left_true = !left.is_zero();
            if op == BinaryOperator::LogicalAnd && !left_true {
                return Ok(Constant::truth(false));
            }
            if op == BinaryOperator::LogicalOr && left_true {
                return Ok(Constant::truth(true));
            }
            let right = self.eval_const_expr(rhs)?;
            if !right.data_type().is_scalar() {
                return Err(not_constant(span));
            }
            return Ok(Constant::truth(!right.is_zero()));
        }

        let left = self.eval_const_expr(lhs)?;
        let right = self.eval_const_expr(rhs)?;

        // Shifts promote each operand on its own; the result has the
        // promoted left type.
        if op == BinaryOperator::Shl || op == BinaryOperator::Shr {
            let (Constant::Int { value: l, data_type: lt }, Constant::Int { value: r, .. }) =
                (&left, &right)
            else {
                return Err(not_constant(span));
            };
            if !lt.is_integer() {
                return Err(not_constant(span));
            }
            let kind = promoted_kind(lt).ok_or_else(|| not_constant(span))?;
            let l = wrap_integer(*l, kind);
            let bits = (kind.size() * 8) as u32;
            let amount = (*r as u32) % bits;
            let result = match op {
                BinaryOperator::Shl => l << amount,
                _ if kind.is_signed() => l >> amount,
                _ => (wrap_integer(l, kind.to_unsigned()) >> amount),
            };
            return Ok(Constant::int(result, kind));
        }

        match (&left, &right) {
            (
                Constant::Int { value: l, data_type: lt },
                Constant::Int { value: r, data_type: rt },
            ) if lt.is_integer() && rt.is_integer() => {
                let lk = lt.primary_kind().ok_or_else(|| not_constant(span))?;
                let rk = rt.primary_kind().ok_or_else(|| not_constant(span))?;
                let kind = PrimaryDataType::usual_arithmetic_conversion(lk, rk);
                let l = wrap_integer(*l, kind);
                let r = wrap_integer(*r, kind);
                self.eval_int_binop(op, l, r, kind, span)
            }
            // Pointer constants participate in comparisons and equality.
            (Constant::Int { value: l, .. }, Constant::Int { value: r, .. }) => match op {
                BinaryOperator::Eq => Ok(Constant::truth(l == r)),
                BinaryOperator::Ne => Ok(Constant::truth(l != r)),
                BinaryOperator::Lt => Ok(Constant::truth(l < r)),
                BinaryOperator::Le => Ok(Constant::truth(l <= r)),
                BinaryOperator::Gt => Ok(Constant::truth(l > r)),
                BinaryOperator::Ge => Ok(Constant::truth(l >= r)),
                _ => Err(not_constant(span)),
            },
            _ => {
                // At least one floating operand: convert both to the common
                // floating type and fold in f64.
                let lk = promoted_kind(left.data_type()).ok_or_else(|| not_constant(span))?;
                let rk = promoted_kind(right.data_type()).ok_or_else(|| not_constant(span))?;
                let kind = PrimaryDataType::usual_arithmetic_conversion(lk, rk);
                let l = constant_to_f64(&left);
                let r = constant_to_f64(&right);
                self.eval_float_binop(op, l, r, kind, span)
            }
        }
    }

    fn eval_int_binop(
        &self,
        op: BinaryOperator,
        l: i128,
        r: i128,
        kind: PrimaryDataType,
        span: Span,
    ) -> Result<Constant, ProcessingError> {
        let value = match op {
            // Wrapping in the i128 working domain; Constant::int then wraps
            // to the result type's width, which is what C observes.
            BinaryOperator::Add => l.wrapping_add(r),
            BinaryOperator::Sub => l.wrapping_sub(r),
            BinaryOperator::Mul => l.wrapping_mul(r),
            BinaryOperator::Div | BinaryOperator::Mod => {
                if r == 0 {
                    return Err(Self::error("division by zero in constant expression", span));
                }
                // Unsigned operands were wrapped to their nonnegative
                // values, so i128 division matches the C result.
                if op == BinaryOperator::Div {
                    l / r
                } else {
                    l % r
                }
            }
            BinaryOperator::BitAnd => l & r,
            BinaryOperator::BitOr => l | r,
            BinaryOperator::BitXor => l ^ r,
            BinaryOperator::Eq => return Ok(Constant::truth(l == r)),
            BinaryOperator::Ne => return Ok(Constant::truth(l != r)),
            BinaryOperator::Lt => return Ok(Constant::truth(l < r)),
            BinaryOperator::Le => return Ok(Constant::truth(l <= r)),
            BinaryOperator::Gt => return Ok(Constant::truth(l > r)),
            BinaryOperator::Ge => return Ok(Constant::truth(l >= r)),
            BinaryOperator::Shl
            | BinaryOperator::Shr
            | BinaryOperator::LogicalAnd
            | BinaryOperator::LogicalOr => unreachable!("handled by caller"),
        };
        Ok(Constant::int(value, kind))
    }

    fn eval_float_binop(
        &self,
        op: BinaryOperator,
        l: f64,
        r: f64,
        kind: PrimaryDataType,
        span: Span,
    ) -> Result<Constant, ProcessingError> {
        let arith = |value: f64| {
            let value = if kind == PrimaryDataType::Float {
                value as f32 as f64
            } else {
                value
            };
            Constant::Float {
                value,
                data_type: DataType::primary(kind),
            }
        };
        match op {
            BinaryOperator::Add => Ok(arith(l + r)),
            BinaryOperator::Sub => Ok(arith(l - r)),
            BinaryOperator::Mul => Ok(arith(l * r)),
            BinaryOperator::Div => Ok(arith(l / r)),
            BinaryOperator::Eq => Ok(Constant::truth(l == r)),
            BinaryOperator::Ne => Ok(Constant::truth(l != r)),
            BinaryOperator::Lt => Ok(Constant::truth(l < r)),
            BinaryOperator::Le => Ok(Constant::truth(l <= r)),
            BinaryOperator::Gt => Ok(Constant::truth(l > r)),
            BinaryOperator::Ge => Ok(Constant::truth(l >= r)),
            _ => Err(not_constant(span)),
        }
    }
}

/// The integer-promoted primary kind of an arithmetic type.
fn promoted_kind(ty: &DataType) -> Option<PrimaryDataType> {
    ty.primary_kind().map(|k| k.integer_promoted())
}

fn constant_to_f64(c: &Constant) -> f64 {
    match c {
        Constant::Int { value, .. } => *value as f64,
        Constant::Float { value, .. } => *value,
    }
}

/// Convert a folded constant to `target` (the semantics of a cast, and of
/// initializer narrowing).
pub(super) fn convert_constant(
    value: Constant,
    target: &DataType,
    span: Span,
) -> Result<Constant, ProcessingError> {
    if let Some(kind) = target.primary_kind() {
        if kind.is_integer() {
            let int_value = match &value {
                Constant::Int { value, .. } => *value,
                Constant::Float { value, .. } => *value as i128,
            };
            return Ok(Constant::int(int_value, kind));
        }
        let float_value = constant_to_f64(&value);
        let float_value = if kind == PrimaryDataType::Float {
            float_value as f32 as f64
        } else {
            float_value
        };
        return Ok(Constant::Float {
            value: float_value,
            data_type: DataType::primary(kind),
        });
    }
    if target.is_pointer() {
        let Constant::Int { value, .. } = value else {
            return Err(ProcessingError::new(
                "expression is not a compile-time constant",
            )
            .with_span(span));
        };
        return Ok(Constant::Int {
            value: value & 0xffff_ffff,
            data_type: target.clone(),
        });
    }
    Err(ProcessingError::new("conversion to non-scalar type requested").with_span(span))
}

fn not_constant(span: Span) -> ProcessingError {
    ProcessingError::new("expression is not a compile-time constant").with_span(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_matches_twos_complement() {
        use PrimaryDataType::*;
        assert_eq!(wrap_integer(-10, UnsignedInt), 4294967286);
        assert_eq!(wrap_integer(4294967296, UnsignedInt), 0);
        assert_eq!(wrap_integer(128, SignedChar), -128);
        assert_eq!(wrap_integer(255, UnsignedChar), 255);
        assert_eq!(wrap_integer(-10, UnsignedLong), 18446744073709551606);
        assert_eq!(wrap_integer(i64::MIN as i128, SignedLong), i64::MIN as i128);
    }

    #[test]
    fn literal_typing_follows_c17() {
        use PrimaryDataType::*;
        assert_eq!(integer_literal_type(10, IntBase::Decimal), SignedInt);
        assert_eq!(integer_literal_type(i32::MAX as i128, IntBase::Decimal), SignedInt);
        // Decimal constants never type as unsigned int.
        assert_eq!(
            integer_literal_type(i32::MAX as i128 + 1, IntBase::Decimal),
            SignedLong
        );
        // Hex constants preserve the bit pattern in unsigned int.
        assert_eq!(
            integer_literal_type(0xFFFF_FFFF, IntBase::Hex),
            UnsignedInt
        );
        assert_eq!(integer_literal_type(4294967296, IntBase::Decimal), SignedLong);
        assert_eq!(
            integer_literal_type(u64::MAX as i128, IntBase::Decimal),
            UnsignedLong
        );
    }
}
