//! The parsed-AST interface consumed by the Processor.
//!
//! The tokenizer and parser are external collaborators: they produce these
//! shapes with every node already classified (declarations, initializers,
//! operator forms, struct/enum/typedef specifiers, casts, sizeof, calls).
//! Every node carries a byte span for diagnostics. Type specifiers mirror
//! the type algebra *unresolved*: tag references and typedef names are
//! looked up by the Processor, which also folds array lengths.

use crate::common::source::Span;
use crate::common::types::PrimaryDataType;

/// A complete translation unit (one C source file after preprocessing).
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    /// Names of the import modules the source included, in order.
    pub included_modules: Vec<String>,
    pub items: Vec<ExternalItem>,
}

/// Top-level items in a translation unit.
#[derive(Debug, Clone)]
pub enum ExternalItem {
    FunctionDefinition(FunctionDefinition),
    Declaration(Declaration),
}

/// A function definition (prototype-style parameter list plus a body).
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub return_specifier: TypeSpecifier,
    pub name: String,
    pub parameters: Vec<ParameterDeclaration>,
    pub body: CompoundStatement,
    pub span: Span,
}

/// A parameter declaration. The name may be absent in prototypes.
#[derive(Debug, Clone)]
pub struct ParameterDeclaration {
    pub specifier: TypeSpecifier,
    pub derived: Vec<DerivedDeclarator>,
    pub name: Option<String>,
    pub span: Span,
}

/// A declaration: storage classes, one base type specifier, and a list of
/// declarators. The specifier may be absent (the Processor rejects that),
/// and the declarator list may be empty (tag declarations).
#[derive(Debug, Clone)]
pub struct Declaration {
    pub storage_classes: Vec<StorageClass>,
    pub specifier: Option<TypeSpecifier>,
    pub declarators: Vec<InitDeclarator>,
    pub span: Span,
}

/// Storage class specifiers. Only `typedef` carries semantics here; the
/// rest are validated (duplicates, empty declarations) and otherwise inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageClass::Typedef => "typedef",
            StorageClass::Extern => "extern",
            StorageClass::Static => "static",
            StorageClass::Auto => "auto",
            StorageClass::Register => "register",
        };
        f.write_str(name)
    }
}

/// A declarator with optional initializer.
#[derive(Debug, Clone)]
pub struct InitDeclarator {
    pub name: String,
    /// Applied outside-in: `int *a[3]` is `[Array(3), Pointer]` on base
    /// `int`, an array of pointers.
    pub derived: Vec<DerivedDeclarator>,
    pub init: Option<Initializer>,
    pub span: Span,
}

/// Derived parts of a declarator.
#[derive(Debug, Clone)]
pub enum DerivedDeclarator {
    Pointer { is_const: bool },
    /// Array; the length expression must fold to a constant when sized.
    Array(Box<Expr>),
    Function(Vec<ParameterDeclaration>),
}

/// An initializer: a single expression or a brace-enclosed list, nestable.
#[derive(Debug, Clone)]
pub enum Initializer {
    Single(Box<Expr>, Span),
    List(Vec<Initializer>, Span),
}

impl Initializer {
    pub fn span(&self) -> Span {
        match self {
            Initializer::Single(_, s) | Initializer::List(_, s) => *s,
        }
    }
}

/// Type specifiers, unresolved. Tag references (`struct S` without a field
/// list) and typedef names are resolved against the symbol table by the
/// Processor.
#[derive(Debug, Clone)]
pub enum TypeSpecifier {
    Void,
    Primary {
        kind: PrimaryDataType,
        is_const: bool,
    },
    Pointer {
        pointee: Box<TypeSpecifier>,
        is_const: bool,
    },
    Array {
        element: Box<TypeSpecifier>,
        length: Box<Expr>,
        is_const: bool,
    },
    /// A struct definition with its field list; defines the tag if named.
    StructDefinition {
        tag: Option<String>,
        fields: Vec<FieldDeclaration>,
    },
    /// A reference to a previously declared struct tag.
    StructReference { tag: String },
    /// An enum definition; member values default to previous + 1.
    EnumDefinition {
        tag: Option<String>,
        members: Vec<EnumMemberDeclaration>,
    },
    /// A reference to a previously declared enum tag.
    EnumReference { tag: String },
    TypedefName { name: String, is_const: bool },
}

/// A field inside a struct definition.
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    pub specifier: TypeSpecifier,
    pub derived: Vec<DerivedDeclarator>,
    pub name: String,
    pub span: Span,
}

/// One enumerator inside an enum definition.
#[derive(Debug, Clone)]
pub struct EnumMemberDeclaration {
    pub name: String,
    pub value: Option<Box<Expr>>,
    pub span: Span,
}

/// A compound statement (block).
#[derive(Debug, Clone)]
pub struct CompoundStatement {
    pub items: Vec<BlockItem>,
    pub span: Span,
}

/// Items within a block.
#[derive(Debug, Clone)]
pub enum BlockItem {
    Declaration(Declaration),
    Statement(Statement),
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Statement {
    /// An expression evaluated for its side effects; `None` is the empty
    /// statement `;`.
    Expr(Option<Expr>, Span),
    Compound(CompoundStatement),
    If(Expr, Box<Statement>, Option<Box<Statement>>, Span),
    Switch(SwitchStatement),
    While(Expr, Box<Statement>, Span),
    DoWhile(Box<Statement>, Expr, Span),
    For(
        Option<Box<ForInit>>,
        Option<Expr>,
        Option<Expr>,
        Box<Statement>,
        Span,
    ),
    Break(Span),
    Continue(Span),
    Return(Option<Expr>, Span),
}

/// A switch with its cases pre-split by the parser. Case bodies run in
/// source order with C fallthrough semantics.
#[derive(Debug, Clone)]
pub struct SwitchStatement {
    pub controlling: Expr,
    pub cases: Vec<SwitchCase>,
    pub default_body: Option<Vec<BlockItem>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Must fold to an integer constant.
    pub value: Expr,
    pub body: Vec<BlockItem>,
    pub span: Span,
}

/// For-loop initializer clause.
#[derive(Debug, Clone)]
pub enum ForInit {
    Declaration(Declaration),
    Expr(Expr),
}

/// Radix of an integer literal; hex and octal literals may type as unsigned
/// where decimal literals stay signed (C17 6.4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBase {
    Decimal,
    Octal,
    Hex,
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral(i128, IntBase, Span),
    /// Double literal (no suffix).
    FloatLiteral(f64, Span),
    /// Float literal (`f`/`F` suffix).
    FloatLiteralF32(f64, Span),
    /// Character constant; carries the character's numeric value.
    CharLiteral(u8, Span),
    /// String literal bytes (escapes already resolved, no terminator).
    StringLiteral(String, Span),
    Identifier(String, Span),
    BinaryOp(BinaryOperator, Box<Expr>, Box<Expr>, Span),
    UnaryOp(UnaryOperator, Box<Expr>, Span),
    PostfixOp(PostfixOperator, Box<Expr>, Span),
    Assign(Box<Expr>, Box<Expr>, Span),
    CompoundAssign(BinaryOperator, Box<Expr>, Box<Expr>, Span),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>, Span),
    FunctionCall(Box<Expr>, Vec<Expr>, Span),
    ArraySubscript(Box<Expr>, Box<Expr>, Span),
    MemberAccess(Box<Expr>, String, Span),
    PointerMemberAccess(Box<Expr>, String, Span),
    Cast(TypeSpecifier, Box<Expr>, Span),
    SizeofType(TypeSpecifier, Span),
    SizeofExpr(Box<Expr>, Span),
    Comma(Box<Expr>, Box<Expr>, Span),
    AddressOf(Box<Expr>, Span),
    Deref(Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral(_, _, s)
            | Expr::FloatLiteral(_, s)
            | Expr::FloatLiteralF32(_, s)
            | Expr::CharLiteral(_, s)
            | Expr::StringLiteral(_, s)
            | Expr::Identifier(_, s)
            | Expr::BinaryOp(_, _, _, s)
            | Expr::UnaryOp(_, _, s)
            | Expr::PostfixOp(_, _, s)
            | Expr::Assign(_, _, s)
            | Expr::CompoundAssign(_, _, _, s)
            | Expr::Conditional(_, _, _, s)
            | Expr::FunctionCall(_, _, s)
            | Expr::ArraySubscript(_, _, s)
            | Expr::MemberAccess(_, _, s)
            | Expr::PointerMemberAccess(_, _, s)
            | Expr::Cast(_, _, s)
            | Expr::SizeofType(_, s)
            | Expr::SizeofExpr(_, s)
            | Expr::Comma(_, _, s)
            | Expr::AddressOf(_, s)
            | Expr::Deref(_, s) => *s,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
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

impl BinaryOperator {
    /// Operators whose result is `signed int` in {0, 1}.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
                | BinaryOperator::LogicalAnd
                | BinaryOperator::LogicalOr
        )
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::LogicalOr => "||",
        };
        f.write_str(symbol)
    }
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Neg,
    BitNot,
    LogicalNot,
    PreIncrement,
    PreDecrement,
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Neg => "-",
            UnaryOperator::BitNot => "~",
            UnaryOperator::LogicalNot => "!",
            UnaryOperator::PreIncrement => "++",
            UnaryOperator::PreDecrement => "--",
        };
        f.write_str(symbol)
    }
}

/// Postfix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOperator {
    PostIncrement,
    PostDecrement,
}
