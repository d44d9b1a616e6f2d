//! The typed, memory-addressed IR produced by the Processor.
//!
//! Every aggregate has already been unpacked into primary scalars, every
//! implicit conversion has been materialized as an explicit `Convert` node,
//! and every variable reference has been resolved to a frame-relative or
//! absolute memory address. The WebAssembly emitter consumes this tree
//! without re-deriving any typing decision.
//!
//! The IR is a statement *tree* rather than a CFG: wasm's structured
//! control flow (block/loop/if) maps 1:1 onto nested statements, so no
//! basic-block form is needed.

use std::rc::Rc;

use crate::common::modules::ModuleFunction;
use crate::common::types::{DataType, FunctionType, IrType, UnpackedScalar};

/// The root of the IR: everything the code generator needs to emit a
/// complete WebAssembly module.
#[derive(Debug)]
pub struct IrModule {
    /// Defined functions, in source order.
    pub functions: Vec<IrFunction>,
    /// The initialized-global region, one concatenated little-endian blob.
    pub data_segment: Vec<u8>,
    /// Imported function signatures copied from the module repository.
    pub external_functions: Vec<ModuleFunction>,
    /// Functions whose address was taken or that were referenced by name as
    /// a value, in first-reference order. Positions are the stable indices
    /// used by indirect calls.
    pub function_table: Vec<String>,
}

impl IrModule {
    pub fn data_segment_size(&self) -> u32 {
        self.data_segment.len() as u32
    }

    /// The data segment rendered with each byte as `\XX` (two lowercase hex
    /// digits), the form the text-format emitter splices into `(data ...)`.
    pub fn encoded_data_segment(&self) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(self.data_segment.len() * 3);
        for byte in &self.data_segment {
            let _ = write!(out, "\\{:02x}", byte);
        }
        out
    }
}

/// A processed function definition.
#[derive(Debug)]
pub struct IrFunction {
    pub name: String,
    pub details: FunctionDetails,
    /// Total bytes of locals, counting every declaration in the body
    /// (including ones after an early `return`).
    pub size_of_locals: u32,
    pub body: Vec<IrStatement>,
}

/// The unpacked parameter/return layout of a function, shared between the
/// definition and its call sites.
#[derive(Debug, Clone)]
pub struct FunctionDetails {
    pub size_of_parameters: u32,
    pub size_of_return: u32,
    /// Parameter primaries in layout order at their non-negative frame
    /// offsets. Callers push these in reverse, so the highest-address
    /// primary is loaded first on the callee side.
    pub parameters: Vec<UnpackedScalar>,
    /// Return-value primaries at their offsets within the return area.
    pub returns: Vec<UnpackedScalar>,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum IrStatement {
    /// Store one scalar to memory.
    MemoryStore {
        address: IrExpr,
        value: IrExpr,
        ir_type: IrType,
    },
    /// `if`/`else`.
    Selection {
        condition: IrExpr,
        then_body: Vec<IrStatement>,
        else_body: Vec<IrStatement>,
    },
    /// A switch over integer constant cases. Case bodies run in source
    /// order with C fallthrough; `break` binds here as well as to loops.
    Switch {
        scrutinee: IrExpr,
        cases: Vec<SwitchArm>,
        default_body: Vec<IrStatement>,
    },
    /// `while`, `do-while`, and `for` after lowering. The `update`
    /// statements run after the body and before the next condition check;
    /// `continue` jumps to the update, not past it.
    Loop {
        condition: IrExpr,
        body: Vec<IrStatement>,
        update: Vec<IrStatement>,
        check_condition_first: bool,
    },
    Break,
    Continue,
    /// Return from the function; return values have already been stored to
    /// the return area by preceding `MemoryStore`s.
    Return,
    /// A function call in statement position (or sequenced from expression
    /// position via `PreStatements`).
    Call(FunctionCall),
}

/// One arm of a `Switch`.
#[derive(Debug, Clone)]
pub struct SwitchArm {
    pub value: i64,
    pub body: Vec<IrStatement>,
}

/// A function call. `args` is the concatenation of every argument's
/// unpacked primaries, already converted to the parameter scalar types.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub callee: Callee,
    pub args: Vec<IrExpr>,
    /// The callee's return layout; the caller loads these slots right after
    /// the call.
    pub returns: Vec<UnpackedScalar>,
}

/// How a call reaches its target.
#[derive(Debug, Clone)]
pub enum Callee {
    /// A function defined in this translation unit.
    Direct(String),
    /// A runtime import from the module repository.
    External(String),
    /// An indirect call through the function table; the expression yields
    /// the table index.
    Indirect {
        index: Box<IrExpr>,
        function_type: Rc<FunctionType>,
    },
}

/// Scalar expressions.
#[derive(Debug, Clone)]
pub enum IrExpr {
    /// Binary operation on two operands of `ir_type`. `LogicalAnd` and
    /// `LogicalOr` are short-circuit: the emitter expands them to control
    /// flow, and their result is `i32` in {0, 1}.
    Binary {
        op: IrBinaryOp,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
        ir_type: IrType,
    },
    Unary {
        op: IrUnaryOp,
        operand: Box<IrExpr>,
        ir_type: IrType,
    },
    IntConst {
        value: i64,
        ir_type: IrType,
    },
    FloatConst {
        value: f64,
        ir_type: IrType,
    },
    /// Address of a local: frame pointer plus a signed offset (negative for
    /// locals, non-negative for parameters).
    LocalAddress { offset: i32 },
    /// Absolute address within the data segment.
    DataSegmentAddress { offset: u32 },
    /// A function's stable index in the function table (the value form of a
    /// function reference).
    FunctionTableIndex { index: u32 },
    /// Address within the caller/callee return-value rendezvous area: the
    /// callee stores return primaries here before `Return`; the caller
    /// loads them immediately after the `Call` statement.
    ReturnSlotAddress { offset: u32 },
    /// Load one scalar from memory.
    MemoryLoad {
        address: Box<IrExpr>,
        ir_type: IrType,
    },
    /// An explicit scalar conversion; the emitter picks the wasm
    /// instruction from the (from, to) pair.
    Convert {
        from: IrType,
        to: IrType,
        operand: Box<IrExpr>,
    },
    /// Run statements, then evaluate to `expr` (assignment results, prefix
    /// increment, call results, sequenced comma sides).
    PreStatements {
        statements: Vec<IrStatement>,
        expr: Box<IrExpr>,
    },
    /// Evaluate to `expr`, then run statements (postfix increment).
    PostStatements {
        expr: Box<IrExpr>,
        statements: Vec<IrStatement>,
    },
}

impl IrExpr {
    /// Integer constant of pointer shape (addresses, null pointers).
    pub fn ptr_const(value: u32) -> IrExpr {
        IrExpr::IntConst {
            value: value as i64,
            ir_type: IrType::Ptr,
        }
    }
}

/// The public shape of every processed expression: the C type it originally
/// had, plus its value as a vector of scalar expressions. Scalars have one
/// element; struct values have one element per unpacked primary field, in
/// layout order, so every consumer (store emitter, argument passer, return
/// site) performs the same index-aligned walk.
#[derive(Debug, Clone)]
pub struct TypedExprs {
    pub data_type: DataType,
    pub exprs: Vec<IrExpr>,
}

impl TypedExprs {
    pub fn scalar(data_type: DataType, expr: IrExpr) -> Self {
        Self {
            data_type,
            exprs: vec![expr],
        }
    }

    /// The single expression of a scalar wrapper.
    pub fn single(&self) -> &IrExpr {
        debug_assert_eq!(self.exprs.len(), 1);
        &self.exprs[0]
    }

    pub fn into_single(mut self) -> IrExpr {
        debug_assert_eq!(self.exprs.len(), 1);
        self.exprs.pop().expect("scalar wrapper has one expression")
    }
}

/// Binary operators. Signedness comes from the operand `ir_type`, so one
/// `Div` covers `div_s`/`div_u` and likewise for `Rem`, `Shr`, and the
/// ordered comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

impl IrBinaryOp {
    /// Whether the result is `i32` in {0, 1} regardless of operand type.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            IrBinaryOp::Eq
                | IrBinaryOp::Ne
                | IrBinaryOp::Lt
                | IrBinaryOp::Le
                | IrBinaryOp::Gt
                | IrBinaryOp::Ge
                | IrBinaryOp::LogicalAnd
                | IrBinaryOp::LogicalOr
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnaryOp {
    /// Arithmetic negation (`0 - x` for integers, `neg` for floats).
    Neg,
    /// Bitwise complement.
    BitNot,
    /// Logical negation: `i32` 1 if the operand is zero, else 0.
    LogicalNot,
}
