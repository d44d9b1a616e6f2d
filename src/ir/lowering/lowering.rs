//! The Processor: semantic analysis and lowering in a single pass.
//!
//! Consumes a parsed translation unit plus the module repository and
//! produces the typed, memory-addressed IR. The walk is strictly
//! synchronous and single-threaded; the first error aborts processing with
//! no partial IR. All mutable state (symbol table, accumulating data
//! segment, per-function counters) lives on the Processor instance, which
//! is consumed by `process`; a second run needs a fresh instance.

use indexmap::IndexSet;

use crate::common::error::{ProcessingError, Warning};
use crate::common::modules::{ModuleFunction, ModuleRepository};
use crate::common::source::Span;
use crate::common::symbol_table::{SymbolEntry, SymbolTable};
use crate::common::types::DataType;
use crate::frontend::ast::{ExternalItem, TranslationUnit};
use crate::ir::ir::{IrFunction, IrModule};

/// The result of a successful processing run: the IR root plus every
/// non-fatal diagnostic collected along the way.
#[derive(Debug)]
pub struct ProcessorOutput {
    pub module: IrModule,
    pub warnings: Vec<Warning>,
}

/// Per-function processing state, created fresh for each function
/// definition and discarded afterward.
#[derive(Debug)]
pub(super) struct FunctionState {
    pub name: String,
    pub return_type: DataType,
    /// How many nested loops enclose the current statement (for
    /// `break`/`continue` validation).
    pub loop_depth: u32,
    /// How many nested switches enclose the current statement.
    pub switch_depth: u32,
}

/// Semantic analyzer and lowering pass over a parsed translation unit.
pub struct Processor {
    pub(super) symbols: SymbolTable,
    pub(super) warnings: Vec<Warning>,
    pub(super) functions: Vec<IrFunction>,
    pub(super) external_functions: Vec<ModuleFunction>,
    /// Functions referenced as values, in first-reference order; positions
    /// are the stable indirect-call indices.
    pub(super) function_table: IndexSet<String>,
    /// State of the function currently being processed (`None` at file
    /// scope).
    pub(super) func: Option<FunctionState>,
}

impl Processor {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            warnings: Vec::new(),
            functions: Vec::new(),
            external_functions: Vec::new(),
            function_table: IndexSet::new(),
            func: None,
        }
    }

    /// Process a translation unit into IR. Consumes the Processor: all
    /// accumulated state belongs to exactly one run.
    pub fn process(
        mut self,
        ast: &TranslationUnit,
        modules: &ModuleRepository,
    ) -> Result<ProcessorOutput, ProcessingError> {
        log::debug!(
            "processing translation unit: {} top-level items, {} included modules",
            ast.items.len(),
            ast.included_modules.len()
        );

        self.register_included_modules(ast, modules);

        for item in &ast.items {
            match item {
                ExternalItem::FunctionDefinition(def) => {
                    self.process_function_definition(def)?;
                }
                ExternalItem::Declaration(decl) => {
                    self.process_file_scope_declaration(decl)?;
                }
            }
        }

        self.check_main_defined()?;

        let module = IrModule {
            functions: std::mem::take(&mut self.functions),
            data_segment: self.symbols.take_data_segment(),
            external_functions: std::mem::take(&mut self.external_functions),
            function_table: self.function_table.iter().cloned().collect(),
        };
        log::debug!(
            "processed {} functions, {} data segment bytes, {} imports",
            module.functions.len(),
            module.data_segment.len(),
            module.external_functions.len()
        );

        Ok(ProcessorOutput {
            module,
            warnings: self.warnings,
        })
    }

    /// Copy the signatures of every included module into the IR imports and
    /// bind each as a callable external function. Unrecognized module names
    /// warn and are skipped.
    fn register_included_modules(&mut self, ast: &TranslationUnit, modules: &ModuleRepository) {
        for module_name in &ast.included_modules {
            let Some(functions) = modules.module_functions(module_name) else {
                self.warn(Warning::new(format!(
                    "included module '{}' is not provided by the module repository",
                    module_name
                )));
                continue;
            };
            for function in functions.values() {
                self.symbols.declare(
                    function.name.clone(),
                    SymbolEntry::Function {
                        data_type: DataType::Function(std::rc::Rc::clone(
                            &function.function_type,
                        )),
                        defined: true,
                        external: true,
                    },
                );
                self.external_functions.push(function.clone());
            }
            log::trace!(
                "registered module '{}' ({} functions)",
                module_name,
                functions.len()
            );
        }
    }

    /// The program must define `main`.
    fn check_main_defined(&self) -> Result<(), ProcessingError> {
        match self.symbols.lookup("main") {
            Some(SymbolEntry::Function {
                defined: true,
                external: false,
                ..
            }) => Ok(()),
            _ => Err(ProcessingError::new("main function not defined")),
        }
    }

    pub(super) fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// The stable function-table index for `name`, assigning one on first
    /// reference.
    pub(super) fn function_table_index(&mut self, name: &str) -> u32 {
        if let Some(index) = self.function_table.get_index_of(name) {
            return index as u32;
        }
        let (index, _) = self.function_table.insert_full(name.to_string());
        index as u32
    }

    /// The state of the function being processed. Only statement and
    /// expression processing runs inside a function, so the state is always
    /// present on these paths.
    pub(super) fn func(&self) -> &FunctionState {
        self.func.as_ref().expect("processing outside a function")
    }

    pub(super) fn func_mut(&mut self) -> &mut FunctionState {
        self.func.as_mut().expect("processing outside a function")
    }

    /// Shorthand for a spanned error.
    pub(super) fn error(message: impl Into<String>, span: Span) -> ProcessingError {
        ProcessingError::new(message).with_span(span)
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}
