//! Initializer unpacking.
//!
//! One recursive algorithm walks (data type, initializer) in lock-step and
//! feeds scalars to one of two sinks: memory-store statements for locals,
//! or little-endian bytes for the data segment. The walk keeps a cursor
//! into the current brace level: scalars consume one item (peeling nested
//! single-element braces), aggregate elements consume either a whole
//! sub-list (fresh cursor) or a compatible aggregate-typed expression, and
//! anything the list does not cover is zero-filled. Leftover items at the
//! end are an error.
//!
//! The data-segment variant additionally requires every scalar to fold to a
//! compile-time constant; a missing initializer serializes to all zero
//! bytes (tentative definition).

use std::rc::Rc;

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::types::{DataType, IrType, StructType};
use crate::frontend::ast::{Expr, Initializer};
use crate::ir::ir::{IrExpr, IrStatement};
use super::const_eval::{convert_constant, Constant};
use super::lowering::Processor;

/// Where unpacked scalars go.
pub(super) enum InitSink<'a> {
    /// Emit one `MemoryStore` per scalar at frame offset `base + offset`.
    Local {
        stores: &'a mut Vec<IrStatement>,
        base: i32,
    },
    /// Write each scalar's little-endian encoding into a pre-zeroed buffer.
    Data { bytes: &'a mut Vec<u8> },
}

impl Processor {
    /// Expand a local declaration's initializer into stores. No initializer
    /// means no stores (the object starts indeterminate).
    pub(super) fn unpack_local_initializer(
        &mut self,
        ty: &DataType,
        init: Option<&Initializer>,
        base: i32,
        stores: &mut Vec<IrStatement>,
        span: Span,
    ) -> Result<(), ProcessingError> {
        let Some(init) = init else {
            return Ok(());
        };
        let mut sink = InitSink::Local { stores, base };
        self.apply_initializer(ty, None, init, &mut sink, span)
    }

    /// Serialize a file-scope declaration's initializer to bytes. A missing
    /// initializer yields a fully zeroed buffer of the declared size.
    pub(super) fn data_segment_initializer(
        &mut self,
        ty: &DataType,
        init: Option<&Initializer>,
        span: Span,
    ) -> Result<Vec<u8>, ProcessingError> {
        let size = self.size_of(ty, span)?;
        let mut bytes = vec![0u8; size as usize];
        if let Some(init) = init {
            let mut sink = InitSink::Data { bytes: &mut bytes };
            self.apply_initializer(ty, None, init, &mut sink, span)?;
        }
        Ok(bytes)
    }

    fn apply_initializer(
        &mut self,
        ty: &DataType,
        enclosing: Option<&Rc<StructType>>,
        init: &Initializer,
        sink: &mut InitSink,
        span: Span,
    ) -> Result<(), ProcessingError> {
        if ty.is_aggregate() {
            match init {
                Initializer::List(items, list_span) => {
                    let mut cursor = 0;
                    self.init_walk(ty, enclosing, items, &mut cursor, 0, sink)?;
                    if cursor < items.len() {
                        return Err(Self::error("excess elements in initializer", *list_span));
                    }
                    Ok(())
                }
                Initializer::Single(expr, single_span) => {
                    self.init_whole_aggregate(ty, expr, 0, sink, *single_span)
                }
            }
        } else {
            let items = std::slice::from_ref(init);
            let mut cursor = 0;
            self.init_walk(ty, enclosing, items, &mut cursor, 0, sink)?;
            Ok(())
        }
    }

    /// Initialize an aggregate from a single expression of compatible
    /// aggregate type by copying every unpacked primary.
    fn init_whole_aggregate(
        &mut self,
        ty: &DataType,
        expr: &Expr,
        offset: u32,
        sink: &mut InitSink,
        span: Span,
    ) -> Result<(), ProcessingError> {
        let value = self.process_expr(expr)?;
        if !value.data_type.is_aggregate() || !self.is_compatible(ty, &value.data_type, true) {
            return Err(Self::error(
                format!(
                    "incompatible types when initializing type '{}' using type '{}'",
                    ty, value.data_type
                ),
                span,
            ));
        }
        match sink {
            InitSink::Local { stores, base } => {
                let scalars = self.unpack_type(ty, span)?;
                debug_assert_eq!(scalars.len(), value.exprs.len());
                for (scalar, expr) in scalars.iter().zip(value.exprs) {
                    stores.push(IrStatement::MemoryStore {
                        address: IrExpr::LocalAddress {
                            offset: *base + (offset + scalar.offset) as i32,
                        },
                        value: expr,
                        ir_type: scalar.ir_type,
                    });
                }
                Ok(())
            }
            InitSink::Data { .. } => Err(Self::error(
                "initializer element is not constant",
                span,
            )),
        }
    }

    /// The recursive cursor walk over one brace level.
    fn init_walk(
        &mut self,
        ty: &DataType,
        enclosing: Option<&Rc<StructType>>,
        items: &[Initializer],
        cursor: &mut usize,
        offset: u32,
        sink: &mut InitSink,
    ) -> Result<(), ProcessingError> {
        match ty {
            DataType::Primary { .. }
            | DataType::Pointer { .. }
            | DataType::Enum(_)
            | DataType::SelfPointer => {
                // Self-pointer fields check assignability as a pointer to
                // the enclosing struct, recorded when the walk entered it.
                let effective = match (ty, enclosing) {
                    (DataType::SelfPointer, Some(st)) => {
                        DataType::pointer_to(DataType::Struct(Rc::clone(st)))
                    }
                    _ => ty.clone(),
                };
                if *cursor >= items.len() {
                    self.emit_zero_scalar(&effective, offset, sink);
                    *cursor += 1;
                    return Ok(());
                }
                let item = &items[*cursor];
                *cursor += 1;
                match self.peel_scalar_item(item)? {
                    Some(expr) => self.init_scalar(&effective, expr, offset, sink),
                    None => {
                        self.emit_zero_scalar(&effective, offset, sink);
                        Ok(())
                    }
                }
            }
            DataType::Array { element, length, .. } => {
                let span = length.span();
                let count = self.array_length(length, span)?;
                let elem_size = self.size_of(element, span)?;
                for i in 0..count {
                    self.init_walk_element(
                        element,
                        enclosing,
                        items,
                        cursor,
                        offset + i * elem_size,
                        sink,
                    )?;
                }
                Ok(())
            }
            DataType::Struct(st) => {
                let mut field_offset = offset;
                for field in &st.fields {
                    self.init_walk_element(
                        &field.data_type,
                        Some(st),
                        items,
                        cursor,
                        field_offset,
                        sink,
                    )?;
                    field_offset += self.size_of(&field.data_type, Span::dummy())?;
                }
                Ok(())
            }
            DataType::Void | DataType::Function(_) => Err(ProcessingError::new(
                "void value not ignored as it should be",
            )),
        }
    }

    /// Consume initializer items for one array element or struct field.
    ///
    /// Scalars recurse at the same list level (the cursor advances inside
    /// the scalar rule). Aggregates look at the current item: a nested list
    /// gets a fresh cursor, a compatible aggregate-typed expression is
    /// consumed whole, and anything else flattens into this list level.
    fn init_walk_element(
        &mut self,
        element: &DataType,
        enclosing: Option<&Rc<StructType>>,
        items: &[Initializer],
        cursor: &mut usize,
        offset: u32,
        sink: &mut InitSink,
    ) -> Result<(), ProcessingError> {
        if !element.is_aggregate() {
            return self.init_walk(element, enclosing, items, cursor, offset, sink);
        }
        if *cursor >= items.len() {
            // Nothing left: zero-fill the whole element.
            return self.init_walk(element, enclosing, &[], &mut 0, offset, sink);
        }
        match &items[*cursor] {
            Initializer::List(sub_items, sub_span) => {
                let mut sub_cursor = 0;
                self.init_walk(element, enclosing, sub_items, &mut sub_cursor, offset, sink)?;
                if sub_cursor < sub_items.len() {
                    return Err(Self::error("excess elements in initializer", *sub_span));
                }
                *cursor += 1;
                Ok(())
            }
            Initializer::Single(expr, single_span) => {
                let value = self.process_expr(expr)?;
                if value.data_type.is_aggregate()
                    && self.is_compatible(element, &value.data_type, true)
                {
                    *cursor += 1;
                    return self.init_whole_aggregate(element, expr, offset, sink, *single_span);
                }
                // A scalar expression initializes the element's primaries
                // one by one from this list level.
                self.init_walk(element, enclosing, items, cursor, offset, sink)
            }
        }
    }

    /// Peel nested single-element brace wrappers around a scalar
    /// initializer. `None` means an explicit empty list `{}` (zero value);
    /// more than one element inside a scalar's braces is an error.
    fn peel_scalar_item<'a>(
        &self,
        item: &'a Initializer,
    ) -> Result<Option<&'a Expr>, ProcessingError> {
        match item {
            Initializer::Single(expr, _) => Ok(Some(expr)),
            Initializer::List(sub, span) => {
                if sub.is_empty() {
                    return Ok(None);
                }
                if sub.len() > 1 {
                    return Err(Self::error("excess elements in initializer", *span));
                }
                self.peel_scalar_item(&sub[0])
            }
        }
    }

    /// Initialize one scalar from an expression.
    fn init_scalar(
        &mut self,
        ty: &DataType,
        expr: &Expr,
        offset: u32,
        sink: &mut InitSink,
    ) -> Result<(), ProcessingError> {
        let span = expr.span();
        let ir_type = self.scalar_ir_type(ty);
        match sink {
            InitSink::Local { stores, base } => {
                let base = *base;
                let value = self.process_value_expr(expr)?;
                if !self.can_assign(ty, &value.data_type, Some(expr)) {
                    return Err(Self::error(
                        format!(
                            "incompatible types when initializing type '{}' using type '{}'",
                            ty, value.data_type
                        ),
                        span,
                    ));
                }
                let from = self.scalar_ir_type(&value.data_type);
                let converted = Self::convert_scalar_expr(value.into_single(), from, ir_type);
                stores.push(IrStatement::MemoryStore {
                    address: IrExpr::LocalAddress {
                        offset: base + offset as i32,
                    },
                    value: converted,
                    ir_type,
                });
                Ok(())
            }
            InitSink::Data { bytes } => {
                // String literals fold to the address of their interned
                // data-segment copy; everything else must already be a
                // compile-time constant.
                let constant = if let Expr::StringLiteral(text, _) = expr {
                    let (address, element) = self.intern_string_literal(text);
                    Constant::Int {
                        value: address as i128,
                        data_type: DataType::Pointer {
                            pointee: Box::new(element),
                            is_const: false,
                        },
                    }
                } else {
                    self.eval_const_expr(expr).map_err(|_| {
                        Self::error("initializer element is not constant", span)
                    })?
                };
                if !self.can_assign(ty, constant.data_type(), Some(expr)) {
                    return Err(Self::error(
                        format!(
                            "incompatible types when initializing type '{}' using type '{}'",
                            ty,
                            constant.data_type()
                        ),
                        span,
                    ));
                }
                let converted = convert_constant(constant, ty, span)?;
                encode_scalar(bytes.as_mut_slice(), offset, &converted, ir_type);
                Ok(())
            }
        }
    }

    /// The zero value of a scalar: integer 0, float 0.0, or a null pointer.
    fn emit_zero_scalar(&self, ty: &DataType, offset: u32, sink: &mut InitSink) {
        let ir_type = self.scalar_ir_type(ty);
        match sink {
            InitSink::Local { stores, base } => {
                let value = if ir_type.is_float() {
                    IrExpr::FloatConst {
                        value: 0.0,
                        ir_type,
                    }
                } else {
                    IrExpr::IntConst { value: 0, ir_type }
                };
                stores.push(IrStatement::MemoryStore {
                    address: IrExpr::LocalAddress {
                        offset: *base + offset as i32,
                    },
                    value,
                    ir_type,
                });
            }
            // The data-segment buffer is pre-zeroed.
            InitSink::Data { .. } => {}
        }
    }
}

/// Write one scalar constant into the buffer, little-endian.
fn encode_scalar(bytes: &mut [u8], offset: u32, constant: &Constant, ir_type: IrType) {
    let offset = offset as usize;
    match constant {
        Constant::Int { value, .. } => {
            let raw = (*value as u64).to_le_bytes();
            let size = ir_type.size() as usize;
            bytes[offset..offset + size].copy_from_slice(&raw[..size]);
        }
        Constant::Float { value, .. } => match ir_type {
            IrType::F32 => {
                bytes[offset..offset + 4].copy_from_slice(&(*value as f32).to_le_bytes());
            }
            _ => {
                bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
            }
        },
    }
}
