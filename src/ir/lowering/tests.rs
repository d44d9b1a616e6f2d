//! Processor-level tests: ASTs are built by hand (the parser is an
//! external collaborator) and the produced IR or error message is checked.

use std::rc::Rc;

use crate::common::modules::ModuleRepository;
use crate::common::source::Span;
use crate::common::types::{DataType, PrimaryDataType, StructField, StructType};
use crate::frontend::ast::*;
use crate::ir::ir::{Callee, IrStatement};
use super::lowering::{Processor, ProcessorOutput};
use crate::common::error::ProcessingError;

fn sp() -> Span {
    Span::dummy()
}

fn int(value: i128) -> Expr {
    Expr::IntLiteral(value, IntBase::Decimal, sp())
}

fn neg(value: i128) -> Expr {
    Expr::UnaryOp(UnaryOperator::Neg, Box::new(int(value)), sp())
}

fn ident(name: &str) -> Expr {
    Expr::Identifier(name.to_string(), sp())
}

fn primary_spec(kind: PrimaryDataType) -> TypeSpecifier {
    TypeSpecifier::Primary {
        kind,
        is_const: false,
    }
}

fn int_spec() -> TypeSpecifier {
    primary_spec(PrimaryDataType::SignedInt)
}

fn declare(
    specifier: TypeSpecifier,
    name: &str,
    derived: Vec<DerivedDeclarator>,
    init: Option<Initializer>,
) -> Declaration {
    Declaration {
        storage_classes: vec![],
        specifier: Some(specifier),
        declarators: vec![InitDeclarator {
            name: name.to_string(),
            derived,
            init,
            span: sp(),
        }],
        span: sp(),
    }
}

fn single(expr: Expr) -> Initializer {
    Initializer::Single(Box::new(expr), sp())
}

fn list(items: Vec<Initializer>) -> Initializer {
    Initializer::List(items, sp())
}

fn function(
    return_specifier: TypeSpecifier,
    name: &str,
    parameters: Vec<ParameterDeclaration>,
    items: Vec<BlockItem>,
) -> ExternalItem {
    ExternalItem::FunctionDefinition(FunctionDefinition {
        return_specifier,
        name: name.to_string(),
        parameters,
        body: CompoundStatement { items, span: sp() },
        span: sp(),
    })
}

fn main_with(items: Vec<BlockItem>) -> ExternalItem {
    function(int_spec(), "main", vec![], items)
}

fn expr_stmt(expr: Expr) -> BlockItem {
    BlockItem::Statement(Statement::Expr(Some(expr), sp()))
}

fn unit(items: Vec<ExternalItem>) -> TranslationUnit {
    TranslationUnit {
        included_modules: vec!["stdlib".to_string()],
        items,
    }
}

fn process(ast: &TranslationUnit) -> Result<ProcessorOutput, ProcessingError> {
    Processor::new().process(ast, &ModuleRepository::standard())
}

fn process_err(ast: &TranslationUnit) -> String {
    process(ast).expect_err("expected a processing error").message
}

// --- Type queries ---

fn pair_struct() -> DataType {
    DataType::Struct(Rc::new(StructType {
        tag: Some("pair".to_string()),
        fields: vec![
            StructField {
                name: "x".to_string(),
                data_type: DataType::signed_int(),
            },
            StructField {
                name: "c".to_string(),
                data_type: DataType::primary(PrimaryDataType::SignedChar),
            },
            StructField {
                name: "d".to_string(),
                data_type: DataType::primary(PrimaryDataType::Double),
            },
        ],
    }))
}

#[test]
fn size_is_sum_of_unpacked_primaries() {
    let p = Processor::new();
    let st = pair_struct();
    let size = p.size_of(&st, sp()).unwrap();
    let scalars = p.unpack_type(&st, sp()).unwrap();
    let sum: u32 = scalars.iter().map(|s| s.ir_type.size()).sum();
    assert_eq!(size, sum);
    assert_eq!(size, 13); // packed: 4 + 1 + 8, no padding
}

#[test]
fn unpacked_offsets_are_monotonic() {
    let p = Processor::new();
    let arr = DataType::Array {
        element: Box::new(pair_struct()),
        length: Box::new(int(3)),
        is_const: false,
    };
    let scalars = p.unpack_type(&arr, sp()).unwrap();
    assert_eq!(scalars.len(), 9);
    for pair in scalars.windows(2) {
        assert!(pair[0].offset < pair[1].offset);
    }
}

#[test]
fn compatibility_is_reflexive_and_symmetric() {
    let p = Processor::new();
    let types = [
        DataType::signed_int(),
        DataType::pointer_to(DataType::primary(PrimaryDataType::Double)),
        pair_struct(),
        DataType::Array {
            element: Box::new(DataType::signed_int()),
            length: Box::new(int(4)),
            is_const: false,
        },
    ];
    for a in &types {
        assert!(p.is_compatible(a, a, false), "{} not self-compatible", a);
        for b in &types {
            assert_eq!(
                p.is_compatible(a, b, false),
                p.is_compatible(b, a, false),
                "asymmetry between {} and {}",
                a,
                b
            );
        }
    }
}

#[test]
fn null_pointer_constant_assigns_to_any_pointer() {
    let p = Processor::new();
    let zero = int(0);
    for pointee in [
        DataType::Void,
        DataType::signed_int(),
        pair_struct(),
        DataType::pointer_to(DataType::primary(PrimaryDataType::Float)),
    ] {
        let ptr = DataType::pointer_to(pointee);
        assert!(p.can_assign(&ptr, &DataType::signed_int(), Some(&zero)));
    }
    // A non-zero constant is not a null pointer constant.
    let one = int(1);
    assert!(!p.can_assign(
        &DataType::pointer_to(DataType::Void),
        &DataType::signed_int(),
        Some(&one)
    ));
}

// --- Data segment ---

#[test]
fn global_ints_serialize_little_endian() {
    // int a = 10, b = 20;
    let decl = Declaration {
        storage_classes: vec![],
        specifier: Some(int_spec()),
        declarators: vec![
            InitDeclarator {
                name: "a".to_string(),
                derived: vec![],
                init: Some(single(int(10))),
                span: sp(),
            },
            InitDeclarator {
                name: "b".to_string(),
                derived: vec![],
                init: Some(single(int(20))),
                span: sp(),
            },
        ],
        span: sp(),
    };
    let ast = unit(vec![
        ExternalItem::Declaration(decl),
        main_with(vec![expr_stmt(Expr::FunctionCall(
            Box::new(ident("print_int")),
            vec![Expr::BinaryOp(
                BinaryOperator::Add,
                Box::new(ident("a")),
                Box::new(ident("b")),
                sp(),
            )],
            sp(),
        ))]),
    ]);
    let output = process(&ast).unwrap();
    let module = output.module;
    assert_eq!(
        module.data_segment,
        vec![0x0a, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00]
    );
    assert_eq!(module.data_segment_size(), 8);
    assert_eq!(
        module.encoded_data_segment(),
        "\\0a\\00\\00\\00\\14\\00\\00\\00"
    );

    // main contains exactly one call, to the print_int import.
    let main = &module.functions[0];
    let calls: Vec<_> = main
        .body
        .iter()
        .filter_map(|s| match s {
            IrStatement::Call(call) => Some(call),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0].callee, Callee::External(name) if name == "print_int"));
    assert!(module
        .external_functions
        .iter()
        .any(|f| f.name == "print_int"));
}

#[test]
fn negative_initializer_wraps_into_unsigned_global() {
    // unsigned int d = -10;  ->  f6 ff ff ff
    let ast = unit(vec![
        ExternalItem::Declaration(declare(
            primary_spec(PrimaryDataType::UnsignedInt),
            "d",
            vec![],
            Some(single(neg(10))),
        )),
        main_with(vec![]),
    ]);
    let module = process(&ast).unwrap().module;
    assert_eq!(module.data_segment, vec![0xf6, 0xff, 0xff, 0xff]);
}

#[test]
fn tentative_global_is_zero_filled() {
    // long arr[3];
    let ast = unit(vec![
        ExternalItem::Declaration(declare(
            primary_spec(PrimaryDataType::SignedLong),
            "arr",
            vec![DerivedDeclarator::Array(Box::new(int(3)))],
            None,
        )),
        main_with(vec![]),
    ]);
    let module = process(&ast).unwrap().module;
    assert_eq!(module.data_segment, vec![0u8; 24]);
}

#[test]
fn global_initializer_must_be_constant() {
    // int a = 10; int b = a;
    let ast = unit(vec![
        ExternalItem::Declaration(declare(int_spec(), "a", vec![], Some(single(int(10))))),
        ExternalItem::Declaration(declare(int_spec(), "b", vec![], Some(single(ident("a"))))),
        main_with(vec![]),
    ]);
    assert_eq!(process_err(&ast), "initializer element is not constant");
}

#[test]
fn string_literal_is_interned_nul_terminated() {
    // char *s = "hi"; (global)
    let ast = unit(vec![
        ExternalItem::Declaration(declare(
            primary_spec(PrimaryDataType::SignedChar),
            "s",
            vec![DerivedDeclarator::Pointer { is_const: false }],
            Some(single(Expr::StringLiteral("hi".to_string(), sp()))),
        )),
        main_with(vec![]),
    ]);
    let module = process(&ast).unwrap().module;
    // "hi\0" at offset 0, then the pointer (4 bytes) holding that offset.
    assert_eq!(module.data_segment[..3], [b'h', b'i', 0]);
    assert_eq!(module.data_segment[3..7], [0, 0, 0, 0]);
    assert_eq!(module.data_segment.len(), 7);
}

// --- Locals and initializer unpacking ---

#[test]
fn local_array_initializer_expands_to_stores() {
    // long arr[5] = {4294967296, -12, 123, 12, 32};
    let init = list(vec![
        single(int(4294967296)),
        single(neg(12)),
        single(int(123)),
        single(int(12)),
        single(int(32)),
    ]);
    let ast = unit(vec![main_with(vec![BlockItem::Declaration(declare(
        primary_spec(PrimaryDataType::SignedLong),
        "arr",
        vec![DerivedDeclarator::Array(Box::new(int(5)))],
        Some(init),
    ))])]);
    let module = process(&ast).unwrap().module;
    let main = &module.functions[0];
    assert_eq!(main.size_of_locals, 40);
    let stores: Vec<_> = main
        .body
        .iter()
        .filter(|s| matches!(s, IrStatement::MemoryStore { .. }))
        .collect();
    assert_eq!(stores.len(), 5);
}

#[test]
fn partial_brace_initializer_zero_fills() {
    // int v[4] = {1, 2};  -> four stores, the last two zero
    let ast = unit(vec![main_with(vec![BlockItem::Declaration(declare(
        int_spec(),
        "v",
        vec![DerivedDeclarator::Array(Box::new(int(4)))],
        Some(list(vec![single(int(1)), single(int(2))])),
    ))])]);
    let module = process(&ast).unwrap().module;
    let stores = module.functions[0].body.len();
    assert_eq!(stores, 4);
}

#[test]
fn excess_initializer_elements_are_rejected() {
    // int v[2] = {1, 2, 3};
    let ast = unit(vec![main_with(vec![BlockItem::Declaration(declare(
        int_spec(),
        "v",
        vec![DerivedDeclarator::Array(Box::new(int(2)))],
        Some(list(vec![single(int(1)), single(int(2)), single(int(3))])),
    ))])]);
    assert_eq!(process_err(&ast), "excess elements in initializer");
}

#[test]
fn locals_after_return_still_count() {
    // int main() { int a; return 0; long b; }
    let ast = unit(vec![main_with(vec![
        BlockItem::Declaration(declare(int_spec(), "a", vec![], None)),
        BlockItem::Statement(Statement::Return(Some(int(0)), sp())),
        BlockItem::Declaration(declare(
            primary_spec(PrimaryDataType::SignedLong),
            "b",
            vec![],
            None,
        )),
    ])]);
    let module = process(&ast).unwrap().module;
    assert_eq!(module.functions[0].size_of_locals, 12);
}

#[test]
fn variable_length_arrays_are_rejected() {
    // int main(int n?) -- modeled as: int v[x]; with x a local
    let ast = unit(vec![main_with(vec![
        BlockItem::Declaration(declare(int_spec(), "x", vec![], Some(single(int(3))))),
        BlockItem::Declaration(declare(
            int_spec(),
            "v",
            vec![DerivedDeclarator::Array(Box::new(ident("x")))],
            None,
        )),
    ])]);
    assert_eq!(process_err(&ast), "Variable Length Arrays not supported");
}

// --- Canonical errors ---

#[test]
fn missing_main_is_an_error() {
    let ast = unit(vec![function(int_spec(), "helper", vec![], vec![])]);
    assert_eq!(process_err(&ast), "main function not defined");
}

#[test]
fn enum_tag_redefinition() {
    // enum x { A = 1 }; enum x { B = 2 };
    let enum_decl = |member: &str, value: i128| {
        ExternalItem::Declaration(Declaration {
            storage_classes: vec![],
            specifier: Some(TypeSpecifier::EnumDefinition {
                tag: Some("x".to_string()),
                members: vec![EnumMemberDeclaration {
                    name: member.to_string(),
                    value: Some(Box::new(int(value))),
                    span: sp(),
                }],
            }),
            declarators: vec![],
            span: sp(),
        })
    };
    let ast = unit(vec![enum_decl("A", 1), enum_decl("B", 2), main_with(vec![])]);
    assert_eq!(process_err(&ast), "redefinition of 'enum x'");
}

#[test]
fn call_arity_mismatch_uses_canonical_phrasing() {
    // int f(int); int main() { return f(1, 2); }
    let prototype = declare(
        int_spec(),
        "f",
        vec![DerivedDeclarator::Function(vec![ParameterDeclaration {
            specifier: int_spec(),
            derived: vec![],
            name: None,
            span: sp(),
        }])],
        None,
    );
    let ast = unit(vec![
        ExternalItem::Declaration(prototype),
        main_with(vec![BlockItem::Statement(Statement::Return(
            Some(Expr::FunctionCall(
                Box::new(ident("f")),
                vec![int(1), int(2)],
                sp(),
            )),
            sp(),
        ))]),
    ]);
    assert_eq!(
        process_err(&ast),
        "number of arguments provided to function call does not match number of parameters specfied in prototype"
    );
}

#[test]
fn struct_comparison_reports_invalid_operands() {
    // struct A { int x; } a; a < 1;
    let ast = unit(vec![main_with(vec![
        BlockItem::Declaration(declare(
            TypeSpecifier::StructDefinition {
                tag: Some("A".to_string()),
                fields: vec![FieldDeclaration {
                    specifier: int_spec(),
                    derived: vec![],
                    name: "x".to_string(),
                    span: sp(),
                }],
            },
            "a",
            vec![],
            None,
        )),
        expr_stmt(Expr::BinaryOp(
            BinaryOperator::Lt,
            Box::new(ident("a")),
            Box::new(int(1)),
            sp(),
        )),
    ])]);
    assert_eq!(
        process_err(&ast),
        "invalid operands to binary '<' (have 'struct A' and 'signed int')"
    );
}

#[test]
fn undeclared_identifier() {
    let ast = unit(vec![main_with(vec![expr_stmt(Expr::Assign(
        Box::new(ident("nope")),
        Box::new(int(1)),
        sp(),
    ))])]);
    assert_eq!(process_err(&ast), "'nope' undeclared");
}

#[test]
fn jump_statements_require_enclosing_construct() {
    let break_ast = unit(vec![main_with(vec![BlockItem::Statement(
        Statement::Break(sp()),
    )])]);
    assert_eq!(
        process_err(&break_ast),
        "break statement not within a switch or loop body"
    );

    let continue_ast = unit(vec![main_with(vec![BlockItem::Statement(
        Statement::Continue(sp()),
    )])]);
    assert_eq!(
        process_err(&continue_ast),
        "continue statement not within a loop body"
    );
}

#[test]
fn duplicate_case_values_are_rejected() {
    let switch = Statement::Switch(SwitchStatement {
        controlling: int(1),
        cases: vec![
            SwitchCase {
                value: int(3),
                body: vec![],
                span: sp(),
            },
            SwitchCase {
                value: Expr::BinaryOp(
                    BinaryOperator::Add,
                    Box::new(int(1)),
                    Box::new(int(2)),
                    sp(),
                ),
                body: vec![],
                span: sp(),
            },
        ],
        default_body: None,
        span: sp(),
    });
    let ast = unit(vec![main_with(vec![BlockItem::Statement(switch)])]);
    assert_eq!(process_err(&ast), "duplicate case value");
}

#[test]
fn redeclaring_a_local_is_rejected() {
    let ast = unit(vec![main_with(vec![
        BlockItem::Declaration(declare(int_spec(), "a", vec![], None)),
        BlockItem::Declaration(declare(int_spec(), "a", vec![], None)),
    ])]);
    assert_eq!(process_err(&ast), "redeclaration of 'a'");
}

// --- Function table and enumerators ---

#[test]
fn referencing_a_function_as_a_value_populates_the_table() {
    // int f() { return 1; } int main() { &f; }
    let ast = unit(vec![
        function(
            int_spec(),
            "f",
            vec![],
            vec![BlockItem::Statement(Statement::Return(Some(int(1)), sp()))],
        ),
        main_with(vec![expr_stmt(Expr::AddressOf(
            Box::new(ident("f")),
            sp(),
        ))]),
    ]);
    let module = process(&ast).unwrap().module;
    assert_eq!(module.function_table, vec!["f".to_string()]);
}

#[test]
fn enumerators_fold_in_constant_expressions() {
    // enum e { A = 4 }; int arr[A];  -> 16 bytes of data segment
    let ast = unit(vec![
        ExternalItem::Declaration(Declaration {
            storage_classes: vec![],
            specifier: Some(TypeSpecifier::EnumDefinition {
                tag: Some("e".to_string()),
                members: vec![EnumMemberDeclaration {
                    name: "A".to_string(),
                    value: Some(Box::new(int(4))),
                    span: sp(),
                }],
            }),
            declarators: vec![],
            span: sp(),
        }),
        ExternalItem::Declaration(declare(
            int_spec(),
            "arr",
            vec![DerivedDeclarator::Array(Box::new(ident("A")))],
            None,
        )),
        main_with(vec![]),
    ]);
    let module = process(&ast).unwrap().module;
    assert_eq!(module.data_segment.len(), 16);
}

#[test]
fn unknown_included_module_warns_but_does_not_fail() {
    let ast = TranslationUnit {
        included_modules: vec!["no_such_module".to_string()],
        items: vec![main_with(vec![])],
    };
    let output = process(&ast).unwrap();
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].message.contains("no_such_module"));
}
