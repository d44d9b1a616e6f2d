//! Lvalue resolution and memory access expressions: member access,
//! subscripts, dereference, and address-of.
//!
//! An lvalue resolves to the address of its object plus its type and
//! modifiability. Member access prefers the address path (base address plus
//! field offset); when the base is not an lvalue (a function returning a
//! struct, say) it falls back to slicing the base's unpacked expression
//! vector, the index-aligned walk every aggregate consumer shares.

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{DataType, IrType};
use crate::frontend::ast::Expr;
use crate::ir::ir::{IrExpr, TypedExprs};
use super::expr::offset_address_expr;
use super::lowering::Processor;

/// A resolved lvalue: where the object lives, what type it has, and
/// whether assignment to it is permitted.
#[derive(Debug, Clone)]
pub(super) struct LvaluePlace {
    pub address: IrExpr,
    pub data_type: DataType,
    /// False for arrays, functions, `const`-qualified objects, and
    /// anything else C calls a non-modifiable lvalue.
    pub modifiable: bool,
}

impl Processor {
    /// Resolve an expression to an lvalue, or `None` when it does not
    /// designate an object (callers pick the context-specific message).
    pub(super) fn lvalue_place(
        &mut self,
        expr: &Expr,
    ) -> Result<Option<LvaluePlace>, ProcessingError> {
        let span = expr.span();
        match expr {
            Expr::Identifier(name, _) => {
                let entry = self
                    .symbols
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| Self::error(format!("'{}' undeclared", name), span))?;
                match entry {
                    SymbolEntry::LocalVariable { data_type, offset } => {
                        let modifiable = Self::type_is_modifiable(&data_type);
                        Ok(Some(LvaluePlace {
                            address: IrExpr::LocalAddress { offset },
                            data_type,
                            modifiable,
                        }))
                    }
                    SymbolEntry::DataSegmentVariable { data_type, offset } => {
                        let modifiable = Self::type_is_modifiable(&data_type);
                        Ok(Some(LvaluePlace {
                            address: IrExpr::DataSegmentAddress { offset },
                            data_type,
                            modifiable,
                        }))
                    }
                    // Functions and enumerators are not object lvalues.
                    SymbolEntry::Function { .. }
                    | SymbolEntry::Enumerator { .. }
                    | SymbolEntry::Typedef { .. } => Ok(None),
                }
            }
            Expr::Deref(inner, _) => {
                let pointer = self.process_value_expr(inner)?;
                let DataType::Pointer { pointee, .. } = &pointer.data_type else {
                    return Err(Self::error("cannot dereference non-pointer type", span));
                };
                let pointee = (**pointee).clone();
                let modifiable = Self::type_is_modifiable(&pointee);
                Ok(Some(LvaluePlace {
                    address: pointer.into_single(),
                    data_type: pointee,
                    modifiable,
                }))
            }
            Expr::ArraySubscript(base, index, _) => {
                self.subscript_place(base, index, span).map(Some)
            }
            Expr::MemberAccess(base, field, _) => {
                let Some(place) = self.lvalue_place(base)? else {
                    return Ok(None);
                };
                let field_place = self.member_place(place, field, span)?;
                Ok(Some(field_place))
            }
            Expr::PointerMemberAccess(base, field, _) => {
                let pointer = self.process_value_expr(base)?;
                let DataType::Pointer { pointee, .. } = &pointer.data_type else {
                    return Err(Self::error(
                        format!(
                            "request for member '{}' in something that is not a structure",
                            field
                        ),
                        span,
                    ));
                };
                let pointee = (**pointee).clone();
                let place = LvaluePlace {
                    address: pointer.into_single(),
                    data_type: pointee,
                    modifiable: true,
                };
                let field_place = self.member_place(place, field, span)?;
                Ok(Some(field_place))
            }
            _ => Ok(None),
        }
    }

    /// The lvalue `base[index]`, i.e. `*(base + index)` after decay.
    fn subscript_place(
        &mut self,
        base: &Expr,
        index: &Expr,
        span: Span,
    ) -> Result<LvaluePlace, ProcessingError> {
        let base_value = self.process_value_expr(base)?;
        let DataType::Pointer { pointee, .. } = &base_value.data_type else {
            return Err(Self::error("cannot dereference non-pointer type", span));
        };
        let pointee = (**pointee).clone();
        let index_value = self.process_value_expr(index)?;
        if !index_value.data_type.is_integer() {
            return Err(Self::error(
                format!(
                    "invalid operands to binary '+' (have '{}' and '{}')",
                    base_value.data_type, index_value.data_type
                ),
                span,
            ));
        }
        let scaled = self.scale_index(index_value, &pointee, span)?;
        let address = IrExpr::Binary {
            op: crate::ir::ir::IrBinaryOp::Add,
            lhs: Box::new(base_value.into_single()),
            rhs: Box::new(scaled),
            ir_type: IrType::Ptr,
        };
        let modifiable = Self::type_is_modifiable(&pointee);
        Ok(LvaluePlace {
            address,
            data_type: pointee,
            modifiable,
        })
    }

    /// Narrow an lvalue to one of its struct fields.
    fn member_place(
        &mut self,
        place: LvaluePlace,
        field: &str,
        span: Span,
    ) -> Result<LvaluePlace, ProcessingError> {
        let DataType::Struct(st) = &place.data_type else {
            return Err(Self::error(
                format!(
                    "request for member '{}' in something that is not a structure",
                    field
                ),
                span,
            ));
        };
        let st = std::rc::Rc::clone(st);
        let Some(location) = self.struct_field(&st, field, span)? else {
            return Err(Self::error(
                format!(
                    "struct {} has no member named '{}'",
                    st.tag.as_deref().unwrap_or("<anonymous>"),
                    field
                ),
                span,
            ));
        };
        // A self-pointer field is a pointer to the enclosing struct.
        let data_type = match location.data_type {
            DataType::SelfPointer => DataType::pointer_to(DataType::Struct(st.clone())),
            other => other.clone(),
        };
        let modifiable = place.modifiable && Self::type_is_modifiable(&data_type);
        Ok(LvaluePlace {
            address: offset_address_expr(place.address, location.offset),
            data_type,
            modifiable,
        })
    }

    /// Modifiable lvalue per C17 6.3.2.1: not an array, not of function
    /// type, and not `const`-qualified.
    fn type_is_modifiable(ty: &DataType) -> bool {
        !matches!(ty, DataType::Array { .. } | DataType::Function(_))
            && !ty.is_const_qualified()
    }

    // --- Value-position access expressions ---

    /// Unary `&`: the operand must be an lvalue (or a function, whose
    /// "address" is its table index). No decay applies to the operand.
    pub(super) fn process_address_of(
        &mut self,
        inner: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        // &function yields the function's table index with pointer type.
        if let Expr::Identifier(name, _) = inner {
            if let Some(SymbolEntry::Function { data_type, .. }) = self.symbols.lookup(name) {
                let data_type = data_type.clone();
                let index = self.function_table_index(name);
                return Ok(TypedExprs::scalar(
                    DataType::pointer_to(data_type),
                    IrExpr::FunctionTableIndex { index },
                ));
            }
        }
        let Some(place) = self.lvalue_place(inner)? else {
            return Err(Self::error("lvalue required for unary '&' operand", span));
        };
        Ok(TypedExprs::scalar(
            DataType::pointer_to(place.data_type),
            place.address,
        ))
    }

    /// Unary `*`: loads every primary of the pointee (aggregates included).
    pub(super) fn process_deref(
        &mut self,
        inner: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let pointer = self.process_value_expr(inner)?;
        let DataType::Pointer { pointee, .. } = &pointer.data_type else {
            return Err(Self::error("cannot dereference non-pointer type", span));
        };
        let pointee = (**pointee).clone();
        if pointee.is_void() {
            return Err(Self::error(
                "void value not ignored as it should be",
                span,
            ));
        }
        // Dereferencing a function pointer denotes the function itself.
        if pointee.is_function() {
            return Ok(TypedExprs {
                data_type: pointee,
                exprs: pointer.exprs,
            });
        }
        let address = pointer.into_single();
        self.loads_from_address(&address, &pointee, span)
    }

    /// `a[i]`: loads through the scaled address.
    pub(super) fn process_subscript(
        &mut self,
        base: &Expr,
        index: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let place = self.subscript_place(base, index, span)?;
        self.loads_from_address(&place.address, &place.data_type, span)
    }

    /// `s.field`: the address path when the base is an lvalue, otherwise
    /// the index-aligned slice of the base's unpacked expressions.
    pub(super) fn process_member_access(
        &mut self,
        base: &Expr,
        field: &str,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        if let Some(place) = self.lvalue_place(base)? {
            let field_place = self.member_place(place, field, span)?;
            return self.loads_from_address(&field_place.address, &field_place.data_type, span);
        }

        // Not an lvalue: slice the field's primaries out of the base value.
        let base_value = self.process_expr(base)?;
        let DataType::Struct(st) = &base_value.data_type else {
            return Err(Self::error(
                format!(
                    "request for member '{}' in something that is not a structure",
                    field
                ),
                span,
            ));
        };
        let st = std::rc::Rc::clone(st);
        let Some(location) = self.struct_field(&st, field, span)? else {
            return Err(Self::error(
                format!(
                    "struct {} has no member named '{}'",
                    st.tag.as_deref().unwrap_or("<anonymous>"),
                    field
                ),
                span,
            ));
        };
        let data_type = match location.data_type {
            DataType::SelfPointer => DataType::pointer_to(DataType::Struct(st.clone())),
            other => other.clone(),
        };
        let exprs = base_value.exprs
            [location.scalar_start..location.scalar_start + location.scalar_count]
            .to_vec();
        Ok(TypedExprs { data_type, exprs })
    }

    /// `p->field` is `(*p).field`.
    pub(super) fn process_pointer_member_access(
        &mut self,
        base: &Expr,
        field: &str,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let pointer = self.process_value_expr(base)?;
        let DataType::Pointer { pointee, .. } = &pointer.data_type else {
            return Err(Self::error(
                format!(
                    "request for member '{}' in something that is not a structure",
                    field
                ),
                span,
            ));
        };
        let pointee = (**pointee).clone();
        let place = LvaluePlace {
            address: pointer.into_single(),
            data_type: pointee,
            modifiable: true,
        };
        let field_place = self.member_place(place, field, span)?;
        self.loads_from_address(&field_place.address, &field_place.data_type, span)
    }
}
