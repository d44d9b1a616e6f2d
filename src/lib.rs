//! Semantic analysis and lowering core of a C-subset → WebAssembly
//! compiler.
//!
//! The crate consumes a parsed AST ([`frontend::ast::TranslationUnit`])
//! plus a repository of runtime import modules and produces a typed,
//! memory-addressed IR ([`ir::ir::IrModule`]) ready for direct emission of
//! WebAssembly text or binary. Tokenizing/parsing and code generation are
//! external collaborators; only their interfaces appear here.
//!
//! ```no_run
//! use wasmc::common::modules::ModuleRepository;
//! use wasmc::frontend::ast::TranslationUnit;
//! use wasmc::ir::lowering::Processor;
//!
//! # fn parsed() -> TranslationUnit { unimplemented!() }
//! let ast = parsed();
//! let modules = ModuleRepository::standard();
//! let output = Processor::new().process(&ast, &modules)?;
//! let wat_data = output.module.encoded_data_segment();
//! # Ok::<(), wasmc::common::error::ProcessingError>(())
//! ```

pub mod common;
pub mod frontend;
pub mod ir;
