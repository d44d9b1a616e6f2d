//! Function call processing.
//!
//! A call site resolves its callee to a defined function, a runtime import,
//! or a pointer-to-function value dispatched through the function table.
//! Arguments are checked against the prototype and concatenated as unpacked
//! primaries; return values travel through the return-slot area, which the
//! caller loads immediately after the call statement.

use std::rc::Rc;

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{DataType, FunctionType};
use crate::frontend::ast::Expr;
use crate::ir::ir::{Callee, FunctionCall, IrExpr, IrStatement, TypedExprs};
use super::lowering::Processor;

impl Processor {
    /// A call in value position: the call statement sequenced before loads
    /// of the return slots. A void call has no value, so using one as a
    /// value is rejected here.
    pub(super) fn process_call_value(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<TypedExprs, ProcessingError> {
        let (call, return_type) = self.build_call(callee, args, span)?;
        if return_type.is_void() {
            return Err(Self::error(
                "void value not ignored as it should be",
                span,
            ));
        }
        let slots = call.returns.clone();
        let mut exprs: Vec<IrExpr> = slots
            .iter()
            .map(|s| IrExpr::MemoryLoad {
                address: Box::new(IrExpr::ReturnSlotAddress { offset: s.offset }),
                ir_type: s.ir_type,
            })
            .collect();
        let first = exprs[0].clone();
        exprs[0] = IrExpr::PreStatements {
            statements: vec![IrStatement::Call(call)],
            expr: Box::new(first),
        };
        Ok(TypedExprs {
            data_type: return_type,
            exprs,
        })
    }

    /// Build a call: resolve the callee, validate arity and argument
    /// types, and concatenate the unpacked argument primaries.
    pub(super) fn build_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<(FunctionCall, DataType), ProcessingError> {
        let (callee, function_type) = self.resolve_callee(callee)?;

        if args.len() != function_type.parameters.len() {
            return Err(Self::error(
                "number of arguments provided to function call does not match \
                 number of parameters specfied in prototype",
                span,
            ));
        }

        let mut lowered_args = Vec::new();
        for (arg, param_type) in args.iter().zip(&function_type.parameters) {
            let value = self.process_value_expr(arg)?;
            if !self.can_assign(param_type, &value.data_type, Some(arg)) {
                return Err(Self::error(
                    "cannot assign function call argument to parameter",
                    arg.span(),
                ));
            }
            if value.data_type.is_scalar() {
                let from = self.scalar_ir_type(&value.data_type);
                let to = self.scalar_ir_type(param_type);
                lowered_args.push(Self::convert_scalar_expr(value.into_single(), from, to));
            } else {
                lowered_args.extend(value.exprs);
            }
        }

        let return_type = function_type.return_type.clone();
        let returns = if return_type.is_void() {
            Vec::new()
        } else {
            self.unpack_type(&return_type, span)?
        };

        Ok((
            FunctionCall {
                callee,
                args: lowered_args,
                returns,
            },
            return_type,
        ))
    }

    /// Resolve a callee expression: a named function becomes a direct or
    /// import call; anything else must decay to pointer-to-function and
    /// dispatches through the function table.
    fn resolve_callee(
        &mut self,
        callee: &Expr,
    ) -> Result<(Callee, Rc<FunctionType>), ProcessingError> {
        if let Expr::Identifier(name, span) = callee {
            match self.symbols.lookup(name) {
                Some(SymbolEntry::Function {
                    data_type: DataType::Function(ft),
                    external,
                    ..
                }) => {
                    let ft = Rc::clone(ft);
                    let callee = if *external {
                        Callee::External(name.clone())
                    } else {
                        Callee::Direct(name.clone())
                    };
                    return Ok((callee, ft));
                }
                None => {
                    return Err(Self::error(format!("'{}' undeclared", name), *span));
                }
                _ => {}
            }
        }
        let value = self.process_value_expr(callee)?;
        match &value.data_type {
            DataType::Pointer { pointee, .. } => match pointee.as_ref() {
                DataType::Function(ft) => {
                    let ft = Rc::clone(ft);
                    Ok((
                        Callee::Indirect {
                            index: Box::new(value.into_single()),
                            function_type: Rc::clone(&ft),
                        },
                        ft,
                    ))
                }
                _ => Err(Self::error(
                    "called object is not a function or function pointer",
                    callee.span(),
                )),
            },
            _ => Err(Self::error(
                "called object is not a function or function pointer",
                callee.span(),
            )),
        }
    }
}
