//! Repository of runtime import modules.
//!
//! A module is a named catalog of external function signatures the emitted
//! WebAssembly can import. The AST lists which modules a translation unit
//! included; the driver copies every recognized signature into the IR root
//! so the code generator can emit the imports, and registers each as a
//! callable function symbol.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::common::types::{DataType, FunctionType, PrimaryDataType};

/// An external function signature provided by an import module.
#[derive(Debug, Clone)]
pub struct ModuleFunction {
    pub name: String,
    pub function_type: Rc<FunctionType>,
}

impl ModuleFunction {
    pub fn new(name: &str, parameters: Vec<DataType>, return_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            function_type: Rc::new(FunctionType {
                return_type,
                parameters,
            }),
        }
    }
}

/// Mapping from module name to its function catalog. Insertion order is
/// preserved so emitted imports are deterministic.
#[derive(Debug, Default)]
pub struct ModuleRepository {
    modules: IndexMap<String, IndexMap<String, ModuleFunction>>,
}

impl ModuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: &str, functions: Vec<ModuleFunction>) {
        let catalog = functions
            .into_iter()
            .map(|f| (f.name.clone(), f))
            .collect();
        self.modules.insert(name.to_string(), catalog);
    }

    pub fn module_functions(&self, name: &str) -> Option<&IndexMap<String, ModuleFunction>> {
        self.modules.get(name)
    }

    /// The standard library module with the printing imports used by the
    /// test corpus.
    pub fn standard() -> Self {
        use PrimaryDataType::*;
        let mut repo = Self::new();
        repo.add_module(
            "stdlib",
            vec![
                ModuleFunction::new(
                    "print_char",
                    vec![DataType::primary(SignedChar)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_int",
                    vec![DataType::primary(SignedInt)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_int_unsigned",
                    vec![DataType::primary(UnsignedInt)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_long",
                    vec![DataType::primary(SignedLong)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_long_unsigned",
                    vec![DataType::primary(UnsignedLong)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_float",
                    vec![DataType::primary(Float)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_double",
                    vec![DataType::primary(Double)],
                    DataType::Void,
                ),
                ModuleFunction::new(
                    "print_address",
                    vec![DataType::pointer_to(DataType::Void)],
                    DataType::Void,
                ),
            ],
        );
        repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_module_has_print_imports() {
        let repo = ModuleRepository::standard();
        let stdlib = repo.module_functions("stdlib").unwrap();
        assert!(stdlib.contains_key("print_int"));
        assert!(stdlib.contains_key("print_long_unsigned"));
        let print_int = &stdlib["print_int"];
        assert_eq!(print_int.function_type.parameters.len(), 1);
        assert!(print_int.function_type.return_type.is_void());
        assert!(repo.module_functions("nonexistent").is_none());
    }
}
