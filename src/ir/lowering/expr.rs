//! Expression processing: typing, implicit conversions, and lowering to
//! scalar IR expressions.
//!
//! Every expression produces a `TypedExprs`: its original C type plus one
//! IR expression per unpacked primary (one for scalars). Decay is applied
//! by `process_value_expr` at every value position except the operands of
//! `sizeof` and unary `&`. Implicit conversions become explicit `Convert`
//! nodes so the emitter never re-derives them.

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{DataType, IrType, PrimaryDataType};
use crate::frontend::ast::{
    BinaryOperator, Expr, IntBase, PostfixOperator, TypeSpecifier, UnaryOperator,
};
use crate::ir::ir::{IrBinaryOp, IrExpr, IrStatement, IrUnaryOp, TypedExprs};
use super::const_eval::integer_literal_type;
use super::lowering::Processor;

impl Processor {
    /// Process an expression and apply decay, the shape every value
    /// position consumes.
    pub(super) fn process_value_expr(&mut self, expr: &Expr) -> Result<TypedExprs, ProcessingError> {
        let mut wrapper = self.process_expr(expr)?;
        wrapper.data_type = wrapper.data_type.decay();
        Ok(wrapper)
    }

    /// Process an expression without decaying its type (for `sizeof` and
    /// the operand of unary `&`).
    pub(super) fn process_expr(&mut self, expr: &Expr) -> Result<TypedExprs, ProcessingError> {
        let span = expr.span();
        match expr {
            Expr::IntLiteral(value, base, _) => {
                let kind = integer_literal_type(*value, *base);
                Ok(TypedExprs::scalar(
                    DataType::primary(kind),
                    IrExpr::IntConst {
                        value: *value as i64,
                        ir_type: kind.ir_type(),
                    },
                ))
            }
            Expr::FloatLiteral(value, _) => Ok(TypedExprs::scalar(
                DataType::primary(PrimaryDataType::Double),
                IrExpr::FloatConst {
                    value: *value,
                    ir_type: IrType::F64,
                },
            )),
            Expr::FloatLiteralF32(value, _) => Ok(TypedExprs::scalar(
                DataType::primary(PrimaryDataType::Float),
                IrExpr::FloatConst {
                    value: *value as f32 as f64,
                    ir_type: IrType::F32,
                },
            )),
            Expr::CharLiteral(value, _) => Ok(TypedExprs::scalar(
                DataType::signed_int(),
                IrExpr::IntConst {
                    value: *value as i64,
                    ir_type: IrType::I32,
                },
            )),
            Expr::StringLiteral(text, _) => {
                let (offset, element) = self.intern_string_literal(text);
                let length = text.len() as i128 + 1;
                Ok(TypedExprs::scalar(
                    DataType::Array {
                        element: Box::new(element),
                        length: Box::new(Expr::IntLiteral(length, IntBase::Decimal, span)),
                        is_const: false,
                    },
                    IrExpr::DataSegmentAddress { offset },
                ))
            }
            Expr::Identifier(name, _) => self.process_identifier(name, span),
            Expr::BinaryOp(op, lhs, rhs, _) => self.process_binary(*op, lhs, rhs, span),
            Expr::UnaryOp(op, inner, _) => self.process_unary(*op, inner, span),
            Expr::PostfixOp(op, inner, _) => {
                let increment = *op == PostfixOperator::PostIncrement;
                self.process_increment(inner, increment, false, span)
            }
            Expr::Assign(lhs, rhs, _) => {
                let (stores, wrapper) = self.process_assignment(lhs, rhs, None, span)?;
                Ok(Self::sequence_before(stores, wrapper))
            }
            Expr::CompoundAssign(op, lhs, rhs, _) => {
                let (stores, wrapper) = self.process_assignment(lhs, rhs, Some(*op), span)?;
                Ok(Self::sequence_before(stores, wrapper))
            }
            Expr::Conditional(cond, then_expr, else_expr, _) => {
                self.process_conditional(cond, then_expr, else_expr, span)
            }
            Expr::FunctionCall(callee, args, _) => self.process_call_value(callee, args, span),
            Expr::ArraySubscript(base, index, _) => self.process_subscript(base, index, span),
            Expr::MemberAccess(base, field, _) => self.process_member_access(base, field, span),
            Expr::PointerMemberAccess(base, field, _) => {
                self.process_pointer_member_access(base, field, span)
            }
            Expr::Cast(specifier, inner, _) => self.process_cast(specifier, inner, span),
            Expr::SizeofType(specifier, _) => {
                let ty = self.resolve_type_specifier(specifier, span)?;
                self.sizeof_value(&ty, span)
            }
            Expr::SizeofExpr(inner, _) => {
                // The operand is typed but not evaluated.
                let wrapper = self.process_expr(inner)?;
                self.sizeof_value(&wrapper.data_type, span)
            }
            Expr::Comma(lhs, rhs, _) => {
                let side_effects = self.process_expression_statement(lhs)?;
                let wrapper = self.process_expr(rhs)?;
                Ok(Self::sequence_before(side_effects, wrapper))
            }
            Expr::AddressOf(inner, _) => self.process_address_of(inner, span),
            Expr::Deref(inner, _) => self.process_deref(inner, span),
        }
    }

    /// Intern a string literal into the data segment (NUL-terminated) and
    /// return its address and element type.
    pub(super) fn intern_string_literal(&mut self, text: &str) -> (u32, DataType) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let offset = self.symbols.allocate_data_segment(&bytes);
        (offset, DataType::primary(PrimaryDataType::SignedChar))
    }

    fn process_identifier(&mut self, name: &str, span: Span) -> Result<TypedExprs, ProcessingError> {
        let entry = self
            .symbols
            .lookup(name)
            .cloned()
            .ok_or_else(|| Self::error(format!("'{}' undeclared", name), span))?;
        match entry {
            SymbolEntry::LocalVariable { data_type, offset } => {
                self.variable_value(data_type, VariableBase::Local(offset), span)
            }
            SymbolEntry::DataSegmentVariable { data_type, offset } => {
                self.variable_value(data_type, VariableBase::DataSegment(offset), span)
            }
            SymbolEntry::Function { data_type, .. } => {
                let index = self.function_table_index(name);
                Ok(TypedExprs::scalar(
                    data_type,
                    IrExpr::FunctionTableIndex { index },
                ))
            }
            SymbolEntry::Enumerator { value } => Ok(TypedExprs::scalar(
                DataType::signed_int(),
                IrExpr::IntConst {
                    value: value as i64,
                    ir_type: IrType::I32,
                },
            )),
            SymbolEntry::Typedef { .. } => {
                Err(Self::error(format!("'{}' undeclared", name), span))
            }
        }
    }

    /// The value of a variable: a single load for scalars, one load per
    /// primary field for structs, and the bare address for arrays (which
    /// decay at every value position).
    fn variable_value(
        &self,
        data_type: DataType,
        base: VariableBase,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        match &data_type {
            DataType::Array { .. } => Ok(TypedExprs::scalar(data_type.clone(), base.address(0))),
            DataType::Struct(_) => {
                let scalars = self.unpack_type(&data_type, span)?;
                let exprs = scalars
                    .iter()
                    .map(|s| IrExpr::MemoryLoad {
                        address: Box::new(base.address(s.offset)),
                        ir_type: s.ir_type,
                    })
                    .collect();
                Ok(TypedExprs { data_type, exprs })
            }
            _ => {
                let ir_type = self.scalar_ir_type(&data_type);
                Ok(TypedExprs::scalar(
                    data_type,
                    IrExpr::MemoryLoad {
                        address: Box::new(base.address(0)),
                        ir_type,
                    },
                ))
            }
        }
    }

    fn sizeof_value(&self, ty: &DataType, span: Span) -> Result<TypedExprs, ProcessingError> {
        if ty.is_function() {
            return Err(Self::error(
                "invalid application of 'sizeof' to function type",
                span,
            ));
        }
        if ty.is_void() {
            return Err(Self::error(
                "invalid application of 'sizeof' to incomplete type",
                span,
            ));
        }
        let size = self.size_of(ty, span)?;
        Ok(TypedExprs::scalar(
            DataType::unsigned_long(),
            IrExpr::IntConst {
                value: size as i64,
                ir_type: IrType::U64,
            },
        ))
    }

    // --- Unary operators ---

    fn process_unary(
        &mut self,
        op: UnaryOperator,
        inner: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        match op {
            UnaryOperator::PreIncrement => self.process_increment(inner, true, true, span),
            UnaryOperator::PreDecrement => self.process_increment(inner, false, true, span),
            UnaryOperator::Plus | UnaryOperator::Neg => {
                let value = self.process_value_expr(inner)?;
                let Some(kind) = value.data_type.primary_kind() else {
                    return Err(Self::error(
                        format!("wrong type argument to unary '{}'", op),
                        span,
                    ));
                };
                let promoted = kind.integer_promoted();
                let operand =
                    Self::convert_scalar_expr(value.into_single(), kind.ir_type(), promoted.ir_type());
                let expr = if op == UnaryOperator::Neg {
                    IrExpr::Unary {
                        op: IrUnaryOp::Neg,
                        operand: Box::new(operand),
                        ir_type: promoted.ir_type(),
                    }
                } else {
                    operand
                };
                Ok(TypedExprs::scalar(DataType::primary(promoted), expr))
            }
            UnaryOperator::BitNot => {
                let value = self.process_value_expr(inner)?;
                if !value.data_type.is_integer() {
                    return Err(Self::error(
                        format!("wrong type argument to unary '{}'", op),
                        span,
                    ));
                }
                let kind = value.data_type.primary_kind().expect("integer type");
                let promoted = kind.integer_promoted();
                let operand =
                    Self::convert_scalar_expr(value.into_single(), kind.ir_type(), promoted.ir_type());
                Ok(TypedExprs::scalar(
                    DataType::primary(promoted),
                    IrExpr::Unary {
                        op: IrUnaryOp::BitNot,
                        operand: Box::new(operand),
                        ir_type: promoted.ir_type(),
                    },
                ))
            }
            UnaryOperator::LogicalNot => {
                let value = self.process_value_expr(inner)?;
                if !value.data_type.is_scalar() {
                    return Err(Self::error(
                        format!("wrong type argument to unary '{}'", op),
                        span,
                    ));
                }
                let ir_type = self.scalar_ir_type(&value.data_type);
                Ok(TypedExprs::scalar(
                    DataType::signed_int(),
                    IrExpr::Unary {
                        op: IrUnaryOp::LogicalNot,
                        operand: Box::new(value.into_single()),
                        ir_type,
                    },
                ))
            }
        }
    }

    /// Prefix and postfix `++`/`--`: a store sequenced against a load of a
    /// modifiable arithmetic or pointer lvalue, stepping pointers by the
    /// pointee size.
    fn process_increment(
        &mut self,
        inner: &Expr,
        increment: bool,
        prefix: bool,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let verb = if increment { "increment" } else { "decrement" };
        let Some(place) = self.lvalue_place(inner)? else {
            return Err(Self::error(
                format!("argument to {} is not a modifiable lvalue", verb),
                span,
            ));
        };
        if !place.modifiable {
            return Err(Self::error(
                format!("argument to {} is not a modifiable lvalue", verb),
                span,
            ));
        }
        let ir_type = self.scalar_ir_type(&place.data_type);
        let step = if let DataType::Pointer { pointee, .. } = &place.data_type {
            IrExpr::IntConst {
                value: self.size_of(pointee, span)? as i64,
                ir_type: IrType::Ptr,
            }
        } else if place.data_type.is_arithmetic() {
            if ir_type.is_float() {
                IrExpr::FloatConst {
                    value: 1.0,
                    ir_type,
                }
            } else {
                IrExpr::IntConst { value: 1, ir_type }
            }
        } else {
            return Err(Self::error(
                format!("wrong type argument to {}", verb),
                span,
            ));
        };

        let load = IrExpr::MemoryLoad {
            address: Box::new(place.address.clone()),
            ir_type,
        };
        let new_value = IrExpr::Binary {
            op: if increment {
                IrBinaryOp::Add
            } else {
                IrBinaryOp::Sub
            },
            lhs: Box::new(load.clone()),
            rhs: Box::new(step),
            ir_type,
        };
        let store = IrStatement::MemoryStore {
            address: place.address,
            value: new_value,
            ir_type,
        };

        let expr = if prefix {
            IrExpr::PreStatements {
                statements: vec![store],
                expr: Box::new(load),
            }
        } else {
            IrExpr::PostStatements {
                expr: Box::new(load),
                statements: vec![store],
            }
        };
        Ok(TypedExprs::scalar(place.data_type, expr))
    }

    // --- Binary operators ---

    fn process_binary(
        &mut self,
        op: BinaryOperator,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let left = self.process_value_expr(lhs)?;
        let right = self.process_value_expr(rhs)?;
        self.binary_operation(op, left, right, Some(lhs), rhs, span)
    }

    /// Apply one binary operator to two processed values (shared with
    /// compound assignment, where the left side is a place rather than an
    /// expression).
    pub(super) fn binary_operation(
        &mut self,
        op: BinaryOperator,
        left: TypedExprs,
        right: TypedExprs,
        lhs_expr: Option<&Expr>,
        rhs_expr: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        use BinaryOperator::*;
        let invalid = |l: &TypedExprs, r: &TypedExprs| {
            Self::error(
                format!(
                    "invalid operands to binary '{}' (have '{}' and '{}')",
                    op, l.data_type, r.data_type
                ),
                span,
            )
        };

        match op {
            LogicalAnd | LogicalOr => {
                if !left.data_type.is_scalar() || !right.data_type.is_scalar() {
                    return Err(invalid(&left, &right));
                }
                let l = self.truth_test(left)?;
                let r = self.truth_test(right)?;
                Ok(TypedExprs::scalar(
                    DataType::signed_int(),
                    IrExpr::Binary {
                        op: if op == LogicalAnd {
                            IrBinaryOp::LogicalAnd
                        } else {
                            IrBinaryOp::LogicalOr
                        },
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                        ir_type: IrType::I32,
                    },
                ))
            }
            Mul | Div | Mod | BitAnd | BitOr | BitXor => {
                let integer_only = matches!(op, Mod | BitAnd | BitOr | BitXor);
                let arithmetic_ok = left.data_type.is_arithmetic()
                    && right.data_type.is_arithmetic()
                    && (!integer_only
                        || (left.data_type.is_integer() && right.data_type.is_integer()));
                if !arithmetic_ok {
                    return Err(invalid(&left, &right));
                }
                let (kind, l, r) = self.arithmetic_operands(left, right);
                Ok(TypedExprs::scalar(
                    DataType::primary(kind),
                    IrExpr::Binary {
                        op: ir_binary_op(op),
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                        ir_type: kind.ir_type(),
                    },
                ))
            }
            Shl | Shr => {
                if !left.data_type.is_integer() || !right.data_type.is_integer() {
                    return Err(invalid(&left, &right));
                }
                // Each operand promotes on its own; the result has the
                // promoted left type.
                let lk_orig = left.data_type.primary_kind().expect("integer");
                let rk_orig = right.data_type.primary_kind().expect("integer");
                let lk = lk_orig.integer_promoted();
                let l =
                    Self::convert_scalar_expr(left.into_single(), lk_orig.ir_type(), lk.ir_type());
                let r =
                    Self::convert_scalar_expr(right.into_single(), rk_orig.ir_type(), lk.ir_type());
                Ok(TypedExprs::scalar(
                    DataType::primary(lk),
                    IrExpr::Binary {
                        op: ir_binary_op(op),
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                        ir_type: lk.ir_type(),
                    },
                ))
            }
            Add | Sub => self.additive_operation(op, left, right, span),
            Eq | Ne | Lt | Le | Gt | Ge => {
                if left.data_type.is_arithmetic() && right.data_type.is_arithmetic() {
                    let (kind, l, r) = self.arithmetic_operands(left, right);
                    return Ok(TypedExprs::scalar(
                        DataType::signed_int(),
                        IrExpr::Binary {
                            op: ir_binary_op(op),
                            lhs: Box::new(l),
                            rhs: Box::new(r),
                            ir_type: kind.ir_type(),
                        },
                    ));
                }
                let pointers_ok = match (&left.data_type, &right.data_type) {
                    (DataType::Pointer { pointee: pl, .. }, DataType::Pointer { pointee: pr, .. }) => {
                        pl.is_void() || pr.is_void() || self.is_compatible(pl, pr, true)
                    }
                    (DataType::Pointer { .. }, _) => {
                        right.data_type.is_integer() && self.is_null_pointer_constant(rhs_expr)
                    }
                    (_, DataType::Pointer { .. }) => {
                        left.data_type.is_integer()
                            && lhs_expr.is_some_and(|e| self.is_null_pointer_constant(e))
                    }
                    _ => false,
                };
                if !pointers_ok {
                    return Err(invalid(&left, &right));
                }
                let left_ir = self.scalar_ir_type(&left.data_type);
                let right_ir = self.scalar_ir_type(&right.data_type);
                let l = Self::convert_scalar_expr(left.into_single(), left_ir, IrType::Ptr);
                let r = Self::convert_scalar_expr(right.into_single(), right_ir, IrType::Ptr);
                Ok(TypedExprs::scalar(
                    DataType::signed_int(),
                    IrExpr::Binary {
                        op: ir_binary_op(op),
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                        ir_type: IrType::Ptr,
                    },
                ))
            }
        }
    }

    /// `+` and `-` with pointer arithmetic: an integer operand scales by
    /// the pointee size; subtracting compatible pointers yields the
    /// element distance as `signed long`.
    fn additive_operation(
        &mut self,
        op: BinaryOperator,
        left: TypedExprs,
        right: TypedExprs,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        if left.data_type.is_arithmetic() && right.data_type.is_arithmetic() {
            let (kind, l, r) = self.arithmetic_operands(left, right);
            return Ok(TypedExprs::scalar(
                DataType::primary(kind),
                IrExpr::Binary {
                    op: ir_binary_op(op),
                    lhs: Box::new(l),
                    rhs: Box::new(r),
                    ir_type: kind.ir_type(),
                },
            ));
        }

        let invalid = Self::error(
            format!(
                "invalid operands to binary '{}' (have '{}' and '{}')",
                op, left.data_type, right.data_type
            ),
            span,
        );

        let left_type = left.data_type.clone();
        let right_type = right.data_type.clone();
        match (&left_type, &right_type) {
            // pointer + integer, pointer - integer
            (DataType::Pointer { pointee, .. }, _) if right.data_type.is_integer() => {
                let scaled = self.scale_index(right, pointee, span)?;
                Ok(TypedExprs::scalar(
                    left.data_type.clone(),
                    IrExpr::Binary {
                        op: ir_binary_op(op),
                        lhs: Box::new(left.into_single()),
                        rhs: Box::new(scaled),
                        ir_type: IrType::Ptr,
                    },
                ))
            }
            // integer + pointer
            (_, DataType::Pointer { pointee, .. })
                if left.data_type.is_integer() && op == BinaryOperator::Add =>
            {
                let scaled = self.scale_index(left, pointee, span)?;
                Ok(TypedExprs::scalar(
                    right.data_type.clone(),
                    IrExpr::Binary {
                        op: IrBinaryOp::Add,
                        lhs: Box::new(right.into_single()),
                        rhs: Box::new(scaled),
                        ir_type: IrType::Ptr,
                    },
                ))
            }
            // pointer - pointer of compatible pointees
            (DataType::Pointer { pointee: pl, .. }, DataType::Pointer { pointee: pr, .. })
                if op == BinaryOperator::Sub =>
            {
                if !self.is_compatible(pl, pr, true) {
                    return Err(invalid);
                }
                let size = self.size_of(pl, span)?;
                let byte_diff = IrExpr::Binary {
                    op: IrBinaryOp::Sub,
                    lhs: Box::new(left.into_single()),
                    rhs: Box::new(right.into_single()),
                    ir_type: IrType::Ptr,
                };
                let widened = IrExpr::Convert {
                    from: IrType::I32,
                    to: IrType::I64,
                    operand: Box::new(byte_diff),
                };
                Ok(TypedExprs::scalar(
                    DataType::primary(PrimaryDataType::SignedLong),
                    IrExpr::Binary {
                        op: IrBinaryOp::Div,
                        lhs: Box::new(widened),
                        rhs: Box::new(IrExpr::IntConst {
                            value: size as i64,
                            ir_type: IrType::I64,
                        }),
                        ir_type: IrType::I64,
                    },
                ))
            }
            _ => Err(invalid),
        }
    }

    /// Convert an integer index to pointer width and scale it by the
    /// pointee size.
    pub(super) fn scale_index(
        &self,
        index: TypedExprs,
        pointee: &DataType,
        span: Span,
    ) -> Result<IrExpr, ProcessingError> {
        let size = self.size_of(pointee, span)?;
        let from = self.scalar_ir_type(&index.data_type);
        let widened = Self::convert_scalar_expr(index.into_single(), from, IrType::Ptr);
        Ok(IrExpr::Binary {
            op: IrBinaryOp::Mul,
            lhs: Box::new(widened),
            rhs: Box::new(IrExpr::IntConst {
                value: size as i64,
                ir_type: IrType::Ptr,
            }),
            ir_type: IrType::Ptr,
        })
    }

    /// Bring two arithmetic values to their common type, returning the
    /// common kind and both converted expressions.
    fn arithmetic_operands(
        &self,
        left: TypedExprs,
        right: TypedExprs,
    ) -> (PrimaryDataType, IrExpr, IrExpr) {
        let lk = left.data_type.primary_kind().expect("arithmetic operand");
        let rk = right.data_type.primary_kind().expect("arithmetic operand");
        let common = PrimaryDataType::usual_arithmetic_conversion(lk, rk);
        let l = Self::convert_scalar_expr(left.into_single(), lk.ir_type(), common.ir_type());
        let r = Self::convert_scalar_expr(right.into_single(), rk.ir_type(), common.ir_type());
        (common, l, r)
    }

    /// A `signed int` {0,1} test of a scalar value against zero.
    fn truth_test(&self, value: TypedExprs) -> Result<IrExpr, ProcessingError> {
        let ir_type = self.scalar_ir_type(&value.data_type);
        let zero = if ir_type.is_float() {
            IrExpr::FloatConst {
                value: 0.0,
                ir_type,
            }
        } else {
            IrExpr::IntConst { value: 0, ir_type }
        };
        Ok(IrExpr::Binary {
            op: IrBinaryOp::Ne,
            lhs: Box::new(value.into_single()),
            rhs: Box::new(zero),
            ir_type,
        })
    }

    /// A scalar condition for control flow; rejects non-scalar types with
    /// the canonical message.
    pub(super) fn process_condition(&mut self, expr: &Expr) -> Result<IrExpr, ProcessingError> {
        let value = self.process_value_expr(expr)?;
        if !value.data_type.is_scalar() {
            return Err(Self::error(
                format!("used '{}' where scalar is required", value.data_type),
                expr.span(),
            ));
        }
        self.truth_test(value)
    }

    // --- Conditional, cast, assignment ---

    /// `c ? a : b` lowers to a selection writing the chosen branch into a
    /// scratch frame slot, so only the taken branch evaluates and struct
    /// results unpack like any other value.
    fn process_conditional(
        &mut self,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let condition = self.process_condition(cond)?;
        let then_value = self.process_value_expr(then_expr)?;
        let else_value = self.process_value_expr(else_expr)?;

        let result_type = self.conditional_result_type(
            &then_value.data_type,
            &else_value.data_type,
            then_expr,
            else_expr,
            span,
        )?;

        let size = self.size_of(&result_type, span)?;
        let base = self.symbols.allocate_local(size);
        let scalars = self.unpack_type(&result_type, span)?;

        let then_body = self.stores_into_slot(&then_value, &result_type, base, span)?;
        let else_body = self.stores_into_slot(&else_value, &result_type, base, span)?;
        let selection = IrStatement::Selection {
            condition,
            then_body,
            else_body,
        };

        let mut exprs: Vec<IrExpr> = scalars
            .iter()
            .map(|s| IrExpr::MemoryLoad {
                address: Box::new(IrExpr::LocalAddress {
                    offset: base + s.offset as i32,
                }),
                ir_type: s.ir_type,
            })
            .collect();
        exprs[0] = IrExpr::PreStatements {
            statements: vec![selection],
            expr: Box::new(exprs[0].clone()),
        };
        Ok(TypedExprs {
            data_type: result_type,
            exprs,
        })
    }

    fn conditional_result_type(
        &self,
        then_ty: &DataType,
        else_ty: &DataType,
        then_expr: &Expr,
        else_expr: &Expr,
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        if then_ty.is_arithmetic() && else_ty.is_arithmetic() {
            let kind = PrimaryDataType::usual_arithmetic_conversion(
                then_ty.primary_kind().expect("arithmetic"),
                else_ty.primary_kind().expect("arithmetic"),
            );
            return Ok(DataType::primary(kind));
        }
        if let (DataType::Struct(_), DataType::Struct(_)) = (then_ty, else_ty) {
            if self.is_compatible(then_ty, else_ty, true) {
                return Ok(then_ty.clone());
            }
        }
        if let (DataType::Pointer { pointee: pa, .. }, DataType::Pointer { pointee: pb, .. }) =
            (then_ty, else_ty)
        {
            if self.is_compatible(pa, pb, true) {
                return Ok(then_ty.clone());
            }
            if pa.is_void() {
                return Ok(then_ty.clone());
            }
            if pb.is_void() {
                return Ok(else_ty.clone());
            }
        }
        if then_ty.is_pointer() && self.is_null_pointer_constant(else_expr) {
            return Ok(then_ty.clone());
        }
        if else_ty.is_pointer() && self.is_null_pointer_constant(then_expr) {
            return Ok(else_ty.clone());
        }
        Err(Self::error(
            format!(
                "type mismatch in conditional expression ('{}' and '{}')",
                then_ty, else_ty
            ),
            span,
        ))
    }

    /// Store a value's primaries into a scratch slot, converting scalars to
    /// the slot type.
    fn stores_into_slot(
        &self,
        value: &TypedExprs,
        slot_type: &DataType,
        base: i32,
        span: Span,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        let scalars = self.unpack_type(slot_type, span)?;
        let value_is_scalar = value.data_type.is_scalar();
        let mut stores = Vec::with_capacity(scalars.len());
        for (scalar, expr) in scalars.iter().zip(value.exprs.iter()) {
            let converted = if value_is_scalar {
                Self::convert_scalar_expr(
                    expr.clone(),
                    self.scalar_ir_type(&value.data_type),
                    scalar.ir_type,
                )
            } else {
                expr.clone()
            };
            stores.push(IrStatement::MemoryStore {
                address: IrExpr::LocalAddress {
                    offset: base + scalar.offset as i32,
                },
                value: converted,
                ir_type: scalar.ir_type,
            });
        }
        Ok(stores)
    }

    fn process_cast(
        &mut self,
        specifier: &TypeSpecifier,
        inner: &Expr,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let target = self.resolve_type_specifier(specifier, span)?;
        if !target.is_scalar() {
            return Err(Self::error("conversion to non-scalar type requested", span));
        }
        let value = self.process_value_expr(inner)?;
        if !value.data_type.is_scalar() {
            return Err(Self::error(
                format!("used '{}' where scalar is required", value.data_type),
                span,
            ));
        }
        let from = self.scalar_ir_type(&value.data_type);
        let to = self.scalar_ir_type(&target);
        let converted = Self::convert_scalar_expr(value.into_single(), from, to);
        Ok(TypedExprs::scalar(target, converted))
    }

    /// Assignment and compound assignment. Returns the store statements and
    /// a wrapper whose expressions re-load the assigned object (the value
    /// of the assignment expression).
    pub(super) fn process_assignment(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        compound_op: Option<BinaryOperator>,
        span: Span,
    ) -> Result<(Vec<IrStatement>, TypedExprs), ProcessingError> {
        let Some(place) = self.lvalue_place(lhs)? else {
            let wrapper = self.process_expr(lhs)?;
            return Err(Self::error(
                format!("assignment to expression with type '{}'", wrapper.data_type),
                span,
            ));
        };
        if !place.modifiable {
            return Err(Self::error(
                format!(
                    "assignment to non-modifiable lvalue with type '{}'",
                    place.data_type
                ),
                span,
            ));
        }

        let right = self.process_value_expr(rhs)?;
        let right = match compound_op {
            None => right,
            Some(op) => {
                // The compound form computes `lhs op rhs` with the plain
                // binary rules, then assigns.
                let current = self.place_value(&place, span)?;
                self.binary_operation(op, current, right, None, rhs, span)?
            }
        };

        if !self.can_assign(&place.data_type, &right.data_type, Some(rhs)) {
            return Err(Self::error(
                format!(
                    "incompatible types when assigning to type '{}' from type '{}'",
                    place.data_type, right.data_type
                ),
                span,
            ));
        }

        let scalars = self.unpack_type(&place.data_type, span)?;
        let right_is_scalar = right.data_type.is_scalar();
        let right_ir = self.scalar_ir_type(&right.data_type);
        let mut stores = Vec::with_capacity(scalars.len());
        for (scalar, expr) in scalars.iter().zip(right.exprs.into_iter()) {
            let converted = if right_is_scalar {
                Self::convert_scalar_expr(expr, right_ir, scalar.ir_type)
            } else {
                expr
            };
            stores.push(IrStatement::MemoryStore {
                address: offset_address(place.address.clone(), scalar.offset),
                value: converted,
                ir_type: scalar.ir_type,
            });
        }

        let result = self.loads_from_address(&place.address, &place.data_type, span)?;
        Ok((stores, result))
    }

    /// The current value of an lvalue (used by compound assignment).
    fn place_value(
        &self,
        place: &super::expr_access::LvaluePlace,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let mut wrapper = self.loads_from_address(&place.address, &place.data_type, span)?;
        wrapper.data_type = wrapper.data_type.decay();
        Ok(wrapper)
    }

    /// Loads of every primary of `ty` at `address + offset_i`.
    pub(super) fn loads_from_address(
        &self,
        address: &IrExpr,
        ty: &DataType,
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        if let DataType::Array { .. } = ty {
            // Arrays are values only through decay: the address itself.
            return Ok(TypedExprs::scalar(ty.clone(), address.clone()));
        }
        let scalars = self.unpack_type(ty, span)?;
        let exprs = scalars
            .iter()
            .map(|s| IrExpr::MemoryLoad {
                address: Box::new(offset_address_expr(address.clone(), s.offset)),
                ir_type: s.ir_type,
            })
            .collect();
        Ok(TypedExprs {
            data_type: ty.clone(),
            exprs,
        })
    }

    /// Wrap a value's first expression so `statements` run before it.
    pub(super) fn sequence_before(statements: Vec<IrStatement>, mut wrapper: TypedExprs) -> TypedExprs {
        if statements.is_empty() {
            return wrapper;
        }
        if wrapper.exprs.is_empty() {
            wrapper.exprs.push(IrExpr::PreStatements {
                statements,
                expr: Box::new(IrExpr::IntConst {
                    value: 0,
                    ir_type: IrType::I32,
                }),
            });
            return wrapper;
        }
        let first = wrapper.exprs[0].clone();
        wrapper.exprs[0] = IrExpr::PreStatements {
            statements,
            expr: Box::new(first),
        };
        wrapper
    }

    /// Insert an explicit conversion unless source and target scalar shapes
    /// already match.
    pub(super) fn convert_scalar_expr(expr: IrExpr, from: IrType, to: IrType) -> IrExpr {
        if from == to {
            expr
        } else {
            IrExpr::Convert {
                from,
                to,
                operand: Box::new(expr),
            }
        }
    }
}

/// `address + constant offset`, folding into the address node when it is
/// already a constant base.
pub(super) fn offset_address_expr(address: IrExpr, offset: u32) -> IrExpr {
    if offset == 0 {
        return address;
    }
    match address {
        IrExpr::LocalAddress { offset: base } => IrExpr::LocalAddress {
            offset: base + offset as i32,
        },
        IrExpr::DataSegmentAddress { offset: base } => IrExpr::DataSegmentAddress {
            offset: base + offset,
        },
        IrExpr::ReturnSlotAddress { offset: base } => IrExpr::ReturnSlotAddress {
            offset: base + offset,
        },
        other => IrExpr::Binary {
            op: IrBinaryOp::Add,
            lhs: Box::new(other),
            rhs: Box::new(IrExpr::IntConst {
                value: offset as i64,
                ir_type: IrType::Ptr,
            }),
            ir_type: IrType::Ptr,
        },
    }
}

fn offset_address(address: IrExpr, offset: u32) -> IrExpr {
    offset_address_expr(address, offset)
}

/// How a variable's storage is addressed.
enum VariableBase {
    Local(i32),
    DataSegment(u32),
}

impl VariableBase {
    fn address(&self, offset: u32) -> IrExpr {
        match self {
            VariableBase::Local(base) => IrExpr::LocalAddress {
                offset: base + offset as i32,
            },
            VariableBase::DataSegment(base) => IrExpr::DataSegmentAddress {
                offset: base + offset,
            },
        }
    }
}

fn ir_binary_op(op: BinaryOperator) -> IrBinaryOp {
    match op {
        BinaryOperator::Add => IrBinaryOp::Add,
        BinaryOperator::Sub => IrBinaryOp::Sub,
        BinaryOperator::Mul => IrBinaryOp::Mul,
        BinaryOperator::Div => IrBinaryOp::Div,
        BinaryOperator::Mod => IrBinaryOp::Rem,
        BinaryOperator::BitAnd => IrBinaryOp::And,
        BinaryOperator::BitOr => IrBinaryOp::Or,
        BinaryOperator::BitXor => IrBinaryOp::Xor,
        BinaryOperator::Shl => IrBinaryOp::Shl,
        BinaryOperator::Shr => IrBinaryOp::Shr,
        BinaryOperator::Eq => IrBinaryOp::Eq,
        BinaryOperator::Ne => IrBinaryOp::Ne,
        BinaryOperator::Lt => IrBinaryOp::Lt,
        BinaryOperator::Le => IrBinaryOp::Le,
        BinaryOperator::Gt => IrBinaryOp::Gt,
        BinaryOperator::Ge => IrBinaryOp::Ge,
        BinaryOperator::LogicalAnd => IrBinaryOp::LogicalAnd,
        BinaryOperator::LogicalOr => IrBinaryOp::LogicalOr,
    }
}
