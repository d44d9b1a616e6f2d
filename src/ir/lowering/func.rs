//! Function definition processing and frame layout.
//!
//! Parameters are bound at non-negative frame offsets growing toward high
//! addresses from the frame pointer (callers push unpacked primaries in
//! reverse layout order); locals pack downward at negative offsets. The
//! function's `size_of_locals` is whatever the body allocated by the time
//! processing finishes, including declarations after an early `return`.

use std::rc::Rc;

use crate::common::error::ProcessingError;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{DataType, FunctionType, UnpackedScalar};
use crate::frontend::ast::FunctionDefinition;
use crate::ir::ir::{FunctionDetails, IrFunction};
use super::lowering::{FunctionState, Processor};

impl Processor {
    pub(super) fn process_function_definition(
        &mut self,
        def: &FunctionDefinition,
    ) -> Result<(), ProcessingError> {
        let name = def.name.as_str();
        log::trace!("processing function '{}'", name);

        let return_type = self.resolve_type_specifier(&def.return_specifier, def.span)?;
        let parameter_types = self.resolve_parameter_types(&def.parameters)?;
        let function_type = Rc::new(FunctionType {
            return_type: return_type.clone(),
            parameters: parameter_types.clone(),
        });
        let data_type = DataType::Function(Rc::clone(&function_type));

        // Definitions may follow a compatible prototype, but never another
        // definition or an incompatible declaration.
        match self.symbols.lookup_in_current(name) {
            None => {}
            Some(SymbolEntry::Function {
                data_type: existing,
                defined,
                external,
            }) => {
                if *defined || *external {
                    return Err(Self::error(format!("redefinition of '{}'", name), def.span));
                }
                if !self.is_compatible(&data_type, existing, false) {
                    return Err(Self::error(
                        format!("redeclaration of '{}'", name),
                        def.span,
                    ));
                }
            }
            Some(_) => {
                return Err(Self::error(
                    format!("redeclaration of '{}'", name),
                    def.span,
                ));
            }
        }
        self.symbols.rebind(
            name,
            SymbolEntry::Function {
                data_type,
                defined: true,
                external: false,
            },
        );

        let details = self.function_details(&function_type, def)?;

        self.func = Some(FunctionState {
            name: name.to_string(),
            return_type,
            loop_depth: 0,
            switch_depth: 0,
        });
        self.symbols.reset_local_allocation();
        self.symbols.push_scope();

        let body = (|| {
            self.bind_parameters(def, &parameter_types)?;
            // Body items share the parameter scope, so a top-level local
            // may not redeclare a parameter name.
            self.process_block_items(&def.body.items)
        })();

        let finished = self.func.take().expect("function state present");
        self.symbols.pop_scope();
        let body = body?;
        let size_of_locals = self.symbols.local_allocation_size();
        log::trace!(
            "function '{}': {} parameter bytes, {} local bytes",
            finished.name,
            details.size_of_parameters,
            size_of_locals
        );

        self.functions.push(IrFunction {
            name: name.to_string(),
            details,
            size_of_locals,
            body,
        });
        Ok(())
    }

    /// The unpacked parameter and return layout shared by the definition
    /// and its call sites.
    fn function_details(
        &self,
        function_type: &FunctionType,
        def: &FunctionDefinition,
    ) -> Result<FunctionDetails, ProcessingError> {
        let mut parameters: Vec<UnpackedScalar> = Vec::new();
        let mut offset = 0;
        for ty in &function_type.parameters {
            self.unpack(ty, offset, &mut parameters, def.span)?;
            offset += self.size_of(ty, def.span)?;
        }
        let size_of_parameters = offset;

        let (returns, size_of_return) = if function_type.return_type.is_void() {
            (Vec::new(), 0)
        } else {
            let returns = self.unpack_type(&function_type.return_type, def.span)?;
            let size = self.size_of(&function_type.return_type, def.span)?;
            (returns, size)
        };

        Ok(FunctionDetails {
            size_of_parameters,
            size_of_return,
            parameters,
            returns,
        })
    }

    /// Bind each named parameter as a local at its positive frame offset.
    fn bind_parameters(
        &mut self,
        def: &FunctionDefinition,
        parameter_types: &[DataType],
    ) -> Result<(), ProcessingError> {
        let mut offset: u32 = 0;
        for (param, ty) in def.parameters.iter().zip(parameter_types) {
            let size = self.size_of(ty, param.span)?;
            if let Some(param_name) = &param.name {
                if self.symbols.lookup_in_current(param_name).is_some() {
                    return Err(Self::error(
                        format!("redefinition of parameter '{}'", param_name),
                        param.span,
                    ));
                }
                self.symbols.declare(
                    param_name.clone(),
                    SymbolEntry::LocalVariable {
                        data_type: ty.clone(),
                        offset: offset as i32,
                    },
                );
            }
            offset += size;
        }
        Ok(())
    }
}
