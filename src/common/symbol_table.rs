//! Lexically scoped symbol table.
//!
//! Scopes form a stack; lookup walks from the innermost scope outward. The
//! root scope belongs to the table itself and is never popped. Struct and
//! enum tags live in a separate namespace per scope, mirroring C's tag
//! namespace.
//!
//! The table also owns the data segment being accumulated for the current
//! compilation: an append-only byte buffer with monotonically increasing
//! offsets (no back-patching), plus the downward-packing offset counter for
//! the function currently being processed. All of this state is confined to
//! a single processing run; a new run starts from a fresh table.

use rustc_hash::FxHashMap;

use crate::common::types::DataType;

/// What an identifier is bound to.
#[derive(Debug, Clone)]
pub enum SymbolEntry {
    /// A function-local variable at a frame-pointer-relative offset.
    /// Locals pack downward (negative offsets); parameters are bound at
    /// non-negative offsets growing toward high addresses.
    LocalVariable { data_type: DataType, offset: i32 },
    /// A variable stored at an absolute offset in the data segment.
    DataSegmentVariable { data_type: DataType, offset: u32 },
    /// A function. `external` marks runtime imports from the module
    /// repository; `defined` marks user functions that have a body.
    Function {
        data_type: DataType,
        defined: bool,
        external: bool,
    },
    Typedef { data_type: DataType },
    /// An enumeration constant; its type is always `signed int`.
    Enumerator { value: i128 },
}

#[derive(Debug, Default)]
struct Scope {
    symbols: FxHashMap<String, SymbolEntry>,
    tags: FxHashMap<String, DataType>,
}

/// Scoped symbol table owning the data segment under construction.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    data_segment: Vec<u8>,
    /// Bytes of locals allocated so far in the current function.
    local_bytes: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            data_segment: Vec::new(),
            local_bytes: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "root scope is never popped");
        self.scopes.pop();
    }

    /// Bind `name` in the innermost scope, shadowing any outer binding.
    /// Redeclaration policy is enforced by the caller (it needs type
    /// compatibility, which requires constant folding).
    pub fn declare(&mut self, name: impl Into<String>, entry: SymbolEntry) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.into(), entry);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    /// Look up `name` in the innermost scope only (for redeclaration checks).
    pub fn lookup_in_current(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols.get(name))
    }

    /// Replace an existing binding wherever it is visible from the current
    /// scope (used to mark a previously declared function as defined).
    pub fn rebind(&mut self, name: &str, entry: SymbolEntry) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.symbols.contains_key(name) {
                scope.symbols.insert(name.to_string(), entry);
                return;
            }
        }
        self.declare(name, entry);
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Bind a struct/enum tag in the innermost scope's tag namespace.
    pub fn declare_tag(&mut self, tag: impl Into<String>, data_type: DataType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.tags.insert(tag.into(), data_type);
        }
    }

    pub fn lookup_tag(&self, tag: &str) -> Option<&DataType> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.tags.get(tag))
    }

    pub fn lookup_tag_in_current(&self, tag: &str) -> Option<&DataType> {
        self.scopes.last().and_then(|scope| scope.tags.get(tag))
    }

    // --- Frame allocation ---

    /// Reset the local-allocation counter at the start of a function body.
    pub fn reset_local_allocation(&mut self) {
        self.local_bytes = 0;
    }

    /// Make room for a local of `size` bytes below everything allocated so
    /// far and return its (negative) frame offset. Layout is packed:
    /// alignment is uniformly 1.
    pub fn allocate_local(&mut self, size: u32) -> i32 {
        self.local_bytes += size;
        -(self.local_bytes as i32)
    }

    /// Total bytes of locals allocated since the last reset; becomes the
    /// function's `size_of_locals`.
    pub fn local_allocation_size(&self) -> u32 {
        self.local_bytes
    }

    // --- Data segment ---

    /// Append an initializer byte string to the data segment and return the
    /// absolute offset where it begins.
    pub fn allocate_data_segment(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data_segment.len() as u32;
        self.data_segment.extend_from_slice(bytes);
        log::trace!(
            "data segment: {} bytes at offset {}",
            bytes.len(),
            offset
        );
        offset
    }

    pub fn data_segment_size(&self) -> u32 {
        self.data_segment.len() as u32
    }

    /// Hand the finished data segment to the IR root.
    pub fn take_data_segment(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data_segment)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_scopes() {
        let mut table = SymbolTable::new();
        table.declare("x", SymbolEntry::Enumerator { value: 1 });
        table.push_scope();
        table.declare("y", SymbolEntry::Enumerator { value: 2 });
        assert!(matches!(
            table.lookup("x"),
            Some(SymbolEntry::Enumerator { value: 1 })
        ));
        assert!(matches!(
            table.lookup("y"),
            Some(SymbolEntry::Enumerator { value: 2 })
        ));
        assert!(table.lookup_in_current("x").is_none());
        table.pop_scope();
        assert!(table.lookup("y").is_none());
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.declare("x", SymbolEntry::Enumerator { value: 1 });
        table.push_scope();
        table.declare("x", SymbolEntry::Enumerator { value: 9 });
        assert!(matches!(
            table.lookup("x"),
            Some(SymbolEntry::Enumerator { value: 9 })
        ));
        table.pop_scope();
        assert!(matches!(
            table.lookup("x"),
            Some(SymbolEntry::Enumerator { value: 1 })
        ));
    }

    #[test]
    fn tags_are_a_separate_namespace() {
        let mut table = SymbolTable::new();
        table.declare("x", SymbolEntry::Enumerator { value: 0 });
        assert!(table.lookup_tag("x").is_none());
        table.declare_tag("x", DataType::signed_int());
        assert!(table.lookup("x").is_some());
        assert!(table.lookup_tag("x").is_some());
    }

    #[test]
    fn locals_pack_downward() {
        let mut table = SymbolTable::new();
        table.reset_local_allocation();
        assert_eq!(table.allocate_local(4), -4);
        assert_eq!(table.allocate_local(8), -12);
        assert_eq!(table.allocate_local(1), -13);
        assert_eq!(table.local_allocation_size(), 13);
        table.reset_local_allocation();
        assert_eq!(table.allocate_local(2), -2);
    }

    #[test]
    fn data_segment_appends_monotonically() {
        let mut table = SymbolTable::new();
        assert_eq!(table.allocate_data_segment(&[1, 2, 3, 4]), 0);
        assert_eq!(table.allocate_data_segment(&[5, 6]), 4);
        assert_eq!(table.data_segment_size(), 6);
        assert_eq!(table.take_data_segment(), vec![1, 2, 3, 4, 5, 6]);
    }
}
