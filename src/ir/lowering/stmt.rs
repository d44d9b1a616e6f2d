//! Statement processing: blocks and scoping, selection, iteration, jumps,
//! and expression statements.
//!
//! Statements lower to trees, not blocks: `if`/`switch`/loops carry their
//! bodies directly, matching wasm's structured control flow. Jump
//! statements are validated against the enclosing loop/switch depth
//! counters on the function state.

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::types::IrType;
use crate::frontend::ast::{
    BlockItem, CompoundStatement, Expr, ForInit, Statement, SwitchStatement, UnaryOperator,
};
use crate::ir::ir::{IrExpr, IrStatement, SwitchArm};
use super::const_eval::{wrap_integer, Constant};
use super::lowering::Processor;

impl Processor {
    pub(super) fn process_statement(
        &mut self,
        stmt: &Statement,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        match stmt {
            Statement::Expr(None, _) => Ok(Vec::new()),
            Statement::Expr(Some(expr), _) => self.process_expression_statement(expr),
            Statement::Compound(block) => self.process_compound(block),
            Statement::If(cond, then_stmt, else_stmt, _) => {
                let condition = self.process_condition(cond)?;
                let then_body = self.process_statement(then_stmt)?;
                let else_body = match else_stmt {
                    Some(stmt) => self.process_statement(stmt)?,
                    None => Vec::new(),
                };
                Ok(vec![IrStatement::Selection {
                    condition,
                    then_body,
                    else_body,
                }])
            }
            Statement::Switch(switch) => self.process_switch(switch),
            Statement::While(cond, body, _) => self.process_loop(cond, None, body, true),
            Statement::DoWhile(body, cond, _) => self.process_loop(cond, None, body, false),
            Statement::For(init, cond, update, body, _) => {
                self.process_for(init.as_deref(), cond.as_ref(), update.as_ref(), body)
            }
            Statement::Break(span) => {
                let state = self.func();
                if state.loop_depth == 0 && state.switch_depth == 0 {
                    return Err(Self::error(
                        "break statement not within a switch or loop body",
                        *span,
                    ));
                }
                Ok(vec![IrStatement::Break])
            }
            Statement::Continue(span) => {
                if self.func().loop_depth == 0 {
                    return Err(Self::error(
                        "continue statement not within a loop body",
                        *span,
                    ));
                }
                Ok(vec![IrStatement::Continue])
            }
            Statement::Return(expr, span) => self.process_return(expr.as_ref(), *span),
        }
    }

    /// A block: its own scope, declarations expanding to stores in place.
    pub(super) fn process_compound(
        &mut self,
        block: &CompoundStatement,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        self.symbols.push_scope();
        let result = self.process_block_items(&block.items);
        self.symbols.pop_scope();
        result
    }

    pub(super) fn process_block_items(
        &mut self,
        items: &[BlockItem],
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        let mut out = Vec::new();
        for item in items {
            match item {
                BlockItem::Declaration(decl) => {
                    self.process_local_declaration(decl, &mut out)?;
                }
                BlockItem::Statement(stmt) => {
                    out.extend(self.process_statement(stmt)?);
                }
            }
        }
        Ok(out)
    }

    fn process_loop(
        &mut self,
        cond: &Expr,
        update: Option<&Expr>,
        body: &Statement,
        check_condition_first: bool,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        let condition = self.process_condition(cond)?;
        let update = match update {
            Some(expr) => self.process_expression_statement(expr)?,
            None => Vec::new(),
        };
        self.func_mut().loop_depth += 1;
        let body = self.process_statement(body);
        self.func_mut().loop_depth -= 1;
        Ok(vec![IrStatement::Loop {
            condition,
            body: body?,
            update,
            check_condition_first,
        }])
    }

    /// `for` gets its own scope for the init clause; a missing condition is
    /// always true.
    fn process_for(
        &mut self,
        init: Option<&ForInit>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &Statement,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        self.symbols.push_scope();
        let result = (|| {
            let mut out = Vec::new();
            match init {
                Some(ForInit::Declaration(decl)) => {
                    self.process_local_declaration(decl, &mut out)?;
                }
                Some(ForInit::Expr(expr)) => {
                    out.extend(self.process_expression_statement(expr)?);
                }
                None => {}
            }
            let condition = match cond {
                Some(expr) => self.process_condition(expr)?,
                None => IrExpr::IntConst {
                    value: 1,
                    ir_type: IrType::I32,
                },
            };
            let update = match update {
                Some(expr) => self.process_expression_statement(expr)?,
                None => Vec::new(),
            };
            self.func_mut().loop_depth += 1;
            let body = self.process_statement(body);
            self.func_mut().loop_depth -= 1;
            out.push(IrStatement::Loop {
                condition,
                body: body?,
                update,
                check_condition_first: true,
            });
            Ok(out)
        })();
        self.symbols.pop_scope();
        result
    }

    /// `switch`: the controlling expression is evaluated once into a
    /// scratch slot, then dispatched over integer constant cases with C
    /// fallthrough.
    fn process_switch(
        &mut self,
        switch: &SwitchStatement,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        let value = self.process_value_expr(&switch.controlling)?;
        if !value.data_type.is_integer() {
            return Err(Self::error(
                "switch quantity is not an integer",
                switch.span,
            ));
        }
        let kind = value
            .data_type
            .primary_kind()
            .expect("integer type")
            .integer_promoted();
        let from = self.scalar_ir_type(&value.data_type);
        let scrutinee_value = Self::convert_scalar_expr(value.into_single(), from, kind.ir_type());

        // Side effects of the controlling expression run exactly once.
        let slot = self.symbols.allocate_local(kind.size());
        let store = IrStatement::MemoryStore {
            address: IrExpr::LocalAddress { offset: slot },
            value: scrutinee_value,
            ir_type: kind.ir_type(),
        };
        let scrutinee = IrExpr::MemoryLoad {
            address: Box::new(IrExpr::LocalAddress { offset: slot }),
            ir_type: kind.ir_type(),
        };

        self.symbols.push_scope();
        self.func_mut().switch_depth += 1;
        let result = (|| {
            let mut arms: Vec<SwitchArm> = Vec::with_capacity(switch.cases.len());
            for case in &switch.cases {
                let case_value = match self.eval_const_expr(&case.value) {
                    Ok(Constant::Int { value, data_type }) if data_type.is_integer() => {
                        wrap_integer(value, kind) as i64
                    }
                    _ => {
                        return Err(Self::error(
                            "case value not an integer constant expression",
                            case.span,
                        ));
                    }
                };
                if arms.iter().any(|arm| arm.value == case_value) {
                    return Err(Self::error("duplicate case value", case.span));
                }
                let body = self.process_block_items(&case.body)?;
                arms.push(SwitchArm {
                    value: case_value,
                    body,
                });
            }
            let default_body = match &switch.default_body {
                Some(items) => self.process_block_items(items)?,
                None => Vec::new(),
            };
            Ok((arms, default_body))
        })();
        self.func_mut().switch_depth -= 1;
        self.symbols.pop_scope();
        let (cases, default_body) = result?;

        Ok(vec![
            store,
            IrStatement::Switch {
                scrutinee,
                cases,
                default_body,
            },
        ])
    }

    fn process_return(
        &mut self,
        expr: Option<&Expr>,
        span: Span,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        let return_type = self.func().return_type.clone();
        let Some(expr) = expr else {
            return Ok(vec![IrStatement::Return]);
        };

        if return_type.is_void() {
            // `return f();` in a void function sequences the call; nothing
            // else may produce a value here.
            if let Expr::FunctionCall(callee, args, _) = expr {
                let (call, callee_return) = self.build_call(callee, args, span)?;
                if callee_return.is_void() {
                    return Ok(vec![IrStatement::Call(call), IrStatement::Return]);
                }
            }
            return Err(Self::error(
                "'return' with a value, in function returning void",
                span,
            ));
        }

        let value = self.process_value_expr(expr)?;
        if !self.can_assign(&return_type, &value.data_type, Some(expr)) {
            return Err(Self::error(
                format!(
                    "incompatible types when returning type '{}' but '{}' was expected",
                    value.data_type, return_type
                ),
                span,
            ));
        }

        let slots = self.unpack_type(&return_type, span)?;
        let mut out = Vec::with_capacity(slots.len() + 1);
        let value_is_scalar = value.data_type.is_scalar();
        let value_ir = self.scalar_ir_type(&value.data_type);
        for (slot, expr) in slots.iter().zip(value.exprs.into_iter()) {
            let converted = if value_is_scalar {
                Self::convert_scalar_expr(expr, value_ir, slot.ir_type)
            } else {
                expr
            };
            out.push(IrStatement::MemoryStore {
                address: IrExpr::ReturnSlotAddress {
                    offset: slot.offset,
                },
                value: converted,
                ir_type: slot.ir_type,
            });
        }
        out.push(IrStatement::Return);
        Ok(out)
    }

    /// An expression in statement position: assignments, calls, and
    /// increments lower to their statements directly; anything else keeps
    /// only its side effects.
    pub(super) fn process_expression_statement(
        &mut self,
        expr: &Expr,
    ) -> Result<Vec<IrStatement>, ProcessingError> {
        match expr {
            Expr::Assign(lhs, rhs, span) => {
                let (stores, _) = self.process_assignment(lhs, rhs, None, *span)?;
                Ok(stores)
            }
            Expr::CompoundAssign(op, lhs, rhs, span) => {
                let (stores, _) = self.process_assignment(lhs, rhs, Some(*op), *span)?;
                Ok(stores)
            }
            Expr::FunctionCall(callee, args, span) => {
                let (call, _) = self.build_call(callee, args, *span)?;
                Ok(vec![IrStatement::Call(call)])
            }
            Expr::PostfixOp(_, _, _)
            | Expr::UnaryOp(UnaryOperator::PreIncrement, _, _)
            | Expr::UnaryOp(UnaryOperator::PreDecrement, _, _) => {
                let wrapper = self.process_expr(expr)?;
                let mut out = Vec::new();
                for e in &wrapper.exprs {
                    collect_side_effects(e, &mut out);
                }
                Ok(out)
            }
            Expr::Comma(lhs, rhs, _) => {
                let mut out = self.process_expression_statement(lhs)?;
                out.extend(self.process_expression_statement(rhs)?);
                Ok(out)
            }
            _ => {
                let wrapper = self.process_expr(expr)?;
                if !wrapper.exprs.iter().any(has_side_effects) {
                    return Ok(Vec::new());
                }
                // A scalar with embedded side effects is evaluated as a
                // dead condition, which preserves short-circuit sequencing
                // inside it; aggregates surrender their sequenced
                // statements directly.
                if wrapper.data_type.is_scalar() {
                    let ir_type = self.scalar_ir_type(&wrapper.data_type);
                    let zero = if ir_type.is_float() {
                        IrExpr::FloatConst {
                            value: 0.0,
                            ir_type,
                        }
                    } else {
                        IrExpr::IntConst { value: 0, ir_type }
                    };
                    let condition = IrExpr::Binary {
                        op: crate::ir::ir::IrBinaryOp::Ne,
                        lhs: Box::new(wrapper.into_single()),
                        rhs: Box::new(zero),
                        ir_type,
                    };
                    return Ok(vec![IrStatement::Selection {
                        condition,
                        then_body: Vec::new(),
                        else_body: Vec::new(),
                    }]);
                }
                let mut out = Vec::new();
                for e in &wrapper.exprs {
                    collect_side_effects(e, &mut out);
                }
                Ok(out)
            }
        }
    }
}

/// Whether an expression tree embeds sequenced statements.
fn has_side_effects(expr: &IrExpr) -> bool {
    match expr {
        IrExpr::PreStatements { .. } | IrExpr::PostStatements { .. } => true,
        IrExpr::Binary { lhs, rhs, .. } => has_side_effects(lhs) || has_side_effects(rhs),
        IrExpr::Unary { operand, .. } | IrExpr::Convert { operand, .. } => {
            has_side_effects(operand)
        }
        IrExpr::MemoryLoad { address, .. } => has_side_effects(address),
        IrExpr::IntConst { .. }
        | IrExpr::FloatConst { .. }
        | IrExpr::LocalAddress { .. }
        | IrExpr::DataSegmentAddress { .. }
        | IrExpr::FunctionTableIndex { .. }
        | IrExpr::ReturnSlotAddress { .. } => false,
    }
}

/// Pull the sequenced statements out of an expression tree in evaluation
/// order, discarding the pure value computations around them.
fn collect_side_effects(expr: &IrExpr, out: &mut Vec<IrStatement>) {
    match expr {
        IrExpr::PreStatements { statements, expr } => {
            out.extend(statements.iter().cloned());
            collect_side_effects(expr, out);
        }
        IrExpr::PostStatements { expr, statements } => {
            collect_side_effects(expr, out);
            out.extend(statements.iter().cloned());
        }
        IrExpr::Binary { lhs, rhs, .. } => {
            collect_side_effects(lhs, out);
            collect_side_effects(rhs, out);
        }
        IrExpr::Unary { operand, .. } | IrExpr::Convert { operand, .. } => {
            collect_side_effects(operand, out);
        }
        IrExpr::MemoryLoad { address, .. } => collect_side_effects(address, out),
        IrExpr::IntConst { .. }
        | IrExpr::FloatConst { .. }
        | IrExpr::LocalAddress { .. }
        | IrExpr::DataSegmentAddress { .. }
        | IrExpr::FunctionTableIndex { .. }
        | IrExpr::ReturnSlotAddress { .. } => {}
    }
}
