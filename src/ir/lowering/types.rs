//! Context-dependent type queries: sizes, unpacked layouts, compatibility,
//! and assignability.
//!
//! These live on the Processor rather than on `DataType` because array
//! lengths are expressions that must be folded by the compile-time
//! evaluator (which may consult enumerators in scope). Layout is packed:
//! struct fields at consecutive offsets in declaration order, no padding,
//! alignment uniformly 1.

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::types::{DataType, IrType, StructType, UnpackedScalar};
use crate::frontend::ast::Expr;
use super::const_eval::Constant;
use super::lowering::Processor;

impl Processor {
    /// Size of a data type in bytes.
    pub(super) fn size_of(&self, ty: &DataType, span: Span) -> Result<u32, ProcessingError> {
        match ty {
            DataType::Primary { kind, .. } => Ok(kind.size()),
            DataType::Pointer { .. } | DataType::SelfPointer => Ok(IrType::Ptr.size()),
            DataType::Enum(_) => Ok(IrType::I32.size()),
            DataType::Array { element, length, .. } => {
                let count = self.array_length(length, span)?;
                Ok(self.size_of(element, span)? * count)
            }
            DataType::Struct(st) => {
                let mut total = 0;
                for field in &st.fields {
                    total += self.size_of(&field.data_type, span)?;
                }
                Ok(total)
            }
            DataType::Void => Err(Self::error(
                "void value not ignored as it should be",
                span,
            )),
            DataType::Function(_) => Err(Self::error(
                "invalid application of 'sizeof' to function type",
                span,
            )),
        }
    }

    /// Fold an array length expression to a non-negative element count.
    pub(super) fn array_length(&self, length: &Expr, span: Span) -> Result<u32, ProcessingError> {
        match self.eval_const_expr(length) {
            Ok(Constant::Int { value, .. }) if value >= 0 => Ok(value as u32),
            _ => Err(Self::error("Variable Length Arrays not supported", span)),
        }
    }

    /// The IR scalar shape of a scalar data type.
    pub(super) fn scalar_ir_type(&self, ty: &DataType) -> IrType {
        match ty {
            DataType::Pointer { .. } | DataType::SelfPointer => IrType::Ptr,
            _ => match ty.primary_kind() {
                Some(kind) => kind.ir_type(),
                None => IrType::Ptr,
            },
        }
    }

    /// Flatten a type into its primary scalars in layout order, offsets
    /// relative to `base`.
    pub(super) fn unpack(
        &self,
        ty: &DataType,
        base: u32,
        out: &mut Vec<UnpackedScalar>,
        span: Span,
    ) -> Result<(), ProcessingError> {
        match ty {
            DataType::Primary { .. }
            | DataType::Pointer { .. }
            | DataType::SelfPointer
            | DataType::Enum(_) => {
                out.push(UnpackedScalar {
                    offset: base,
                    ir_type: self.scalar_ir_type(ty),
                });
                Ok(())
            }
            DataType::Array { element, length, .. } => {
                let count = self.array_length(length, span)?;
                let elem_size = self.size_of(element, span)?;
                for i in 0..count {
                    self.unpack(element, base + i * elem_size, out, span)?;
                }
                Ok(())
            }
            DataType::Struct(st) => {
                let mut offset = base;
                for field in &st.fields {
                    self.unpack(&field.data_type, offset, out, span)?;
                    offset += self.size_of(&field.data_type, span)?;
                }
                Ok(())
            }
            DataType::Void => Err(Self::error(
                "void value not ignored as it should be",
                span,
            )),
            DataType::Function(_) => Err(Self::error(
                "invalid application of 'sizeof' to function type",
                span,
            )),
        }
    }

    pub(super) fn unpack_type(
        &self,
        ty: &DataType,
        span: Span,
    ) -> Result<Vec<UnpackedScalar>, ProcessingError> {
        let mut out = Vec::new();
        self.unpack(ty, 0, &mut out, span)?;
        Ok(out)
    }

    /// Locate a struct field: its byte offset, its index range within the
    /// struct's unpacked primaries, and its type.
    pub(super) fn struct_field<'a>(
        &self,
        st: &'a StructType,
        name: &str,
        span: Span,
    ) -> Result<Option<FieldLocation<'a>>, ProcessingError> {
        let mut offset = 0;
        let mut scalar_start = 0;
        for field in &st.fields {
            let scalar_count = self.unpack_type(&field.data_type, span)?.len();
            if field.name == name {
                return Ok(Some(FieldLocation {
                    offset,
                    scalar_start,
                    scalar_count,
                    data_type: &field.data_type,
                }));
            }
            offset += self.size_of(&field.data_type, span)?;
            scalar_start += scalar_count;
        }
        Ok(None)
    }

    /// Type compatibility per C's rules.
    ///
    /// Struct compatibility requires equal tags before fields are compared,
    /// so two `SelfPointer` fields only ever meet when their enclosing tags
    /// already match, which is the conservative reading of self-pointer
    /// equality.
    pub(super) fn is_compatible(&self, a: &DataType, b: &DataType, ignore_qualifiers: bool) -> bool {
        if !ignore_qualifiers && a.is_const_qualified() != b.is_const_qualified() {
            return false;
        }
        match (a, b) {
            (DataType::Primary { kind: ka, .. }, DataType::Primary { kind: kb, .. }) => ka == kb,
            (DataType::Pointer { pointee: pa, .. }, DataType::Pointer { pointee: pb, .. }) => {
                // Two void pointers are compatible; otherwise pointees must be.
                (pa.is_void() && pb.is_void())
                    || self.is_compatible(pa, pb, ignore_qualifiers)
            }
            (
                DataType::Array {
                    element: ea,
                    length: la,
                    ..
                },
                DataType::Array {
                    element: eb,
                    length: lb,
                    ..
                },
            ) => {
                let span = Span::dummy();
                match (self.array_length(la, span), self.array_length(lb, span)) {
                    (Ok(na), Ok(nb)) => na == nb && self.is_compatible(ea, eb, ignore_qualifiers),
                    _ => false,
                }
            }
            (DataType::Struct(sa), DataType::Struct(sb)) => {
                sa.tag == sb.tag
                    && sa.fields.len() == sb.fields.len()
                    && sa.fields.iter().zip(&sb.fields).all(|(fa, fb)| {
                        fa.name == fb.name
                            && self.is_compatible(&fa.data_type, &fb.data_type, ignore_qualifiers)
                    })
            }
            (DataType::SelfPointer, DataType::SelfPointer) => true,
            // All enums share the representation of signed int.
            (DataType::Enum(_), DataType::Enum(_)) => true,
            (DataType::Function(fa), DataType::Function(fb)) => {
                let returns_compatible = match (&fa.return_type, &fb.return_type) {
                    (DataType::Void, DataType::Void) => true,
                    (DataType::Void, _) | (_, DataType::Void) => false,
                    (ra, rb) => self.is_compatible(ra, rb, ignore_qualifiers),
                };
                returns_compatible
                    && fa.parameters.len() == fb.parameters.len()
                    && fa
                        .parameters
                        .iter()
                        .zip(&fb.parameters)
                        .all(|(pa, pb)| self.is_compatible(pa, pb, ignore_qualifiers))
            }
            (DataType::Void, DataType::Void) => true,
            _ => false,
        }
    }

    /// Whether `expr` is a null pointer constant: an integer constant
    /// expression with value 0.
    pub(super) fn is_null_pointer_constant(&self, expr: &Expr) -> bool {
        matches!(
            self.eval_const_expr(expr),
            Ok(Constant::Int { value: 0, data_type }) if data_type.is_integer()
        )
    }

    /// Assignability per C17 6.5.16.1: can a value of type `rhs` (produced
    /// by `rhs_expr` where available, for the null-pointer-constant case)
    /// be assigned to an lvalue of type `lhs`?
    pub(super) fn can_assign(
        &self,
        lhs: &DataType,
        rhs: &DataType,
        rhs_expr: Option<&Expr>,
    ) -> bool {
        // Both arithmetic: implicit conversion always exists.
        if lhs.is_arithmetic() && rhs.is_arithmetic() {
            return true;
        }
        // Same struct type.
        if let (DataType::Struct(_), DataType::Struct(_)) = (lhs, rhs) {
            return self.is_compatible(lhs, rhs, true);
        }
        if let (
            DataType::Pointer { pointee: pl, .. },
            DataType::Pointer { pointee: pr, .. },
        ) = (lhs, rhs)
        {
            // Either side a void pointer, or compatible pointees; the left
            // pointee must carry every qualifier of the right pointee.
            let pointees_ok = pl.is_void()
                || pr.is_void()
                || self.is_compatible(pl, pr, true);
            let qualifiers_ok = pl.is_const_qualified() || !pr.is_const_qualified();
            return pointees_ok && qualifiers_ok;
        }
        // Null pointer constant into any pointer.
        if lhs.is_pointer() && rhs.is_integer() {
            if let Some(expr) = rhs_expr {
                return self.is_null_pointer_constant(expr);
            }
        }
        false
    }
}

/// Where a struct field sits: byte offset, position and width within the
/// struct's unpacked primaries, and its type.
pub(super) struct FieldLocation<'a> {
    pub offset: u32,
    pub scalar_start: usize,
    pub scalar_count: usize,
    pub data_type: &'a DataType,
}
