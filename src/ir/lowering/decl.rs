//! Declaration processing: type specifier resolution, tag and typedef
//! registration, and variable declarations at file and block scope.
//!
//! File-scope variables serialize their initializers into the data segment
//! (tentative definitions become zero bytes). Block-scope variables get a
//! downward-packed frame slot and their initializers become memory stores.
//! A struct's reference to its own tag through exactly one pointer level
//! becomes the `SelfPointer` marker, keeping the type algebra a tree.

use std::rc::Rc;

use crate::common::error::ProcessingError;
use crate::common::source::Span;
use crate::common::symbol_table::SymbolEntry;
use crate::common::types::{
    DataType, EnumType, FunctionType, PrimaryDataType, StructField, StructType,
};
use crate::frontend::ast::{
    Declaration, DerivedDeclarator, EnumMemberDeclaration, FieldDeclaration, ParameterDeclaration,
    TypeSpecifier,
};
use crate::ir::ir::IrStatement;
use super::const_eval::{wrap_integer, Constant};
use super::lowering::Processor;

impl Processor {
    pub(super) fn process_file_scope_declaration(
        &mut self,
        decl: &Declaration,
    ) -> Result<(), ProcessingError> {
        self.process_declaration(decl, None)
    }

    pub(super) fn process_local_declaration(
        &mut self,
        decl: &Declaration,
        stores: &mut Vec<IrStatement>,
    ) -> Result<(), ProcessingError> {
        self.process_declaration(decl, Some(stores))
    }

    fn process_declaration(
        &mut self,
        decl: &Declaration,
        mut local_stores: Option<&mut Vec<IrStatement>>,
    ) -> Result<(), ProcessingError> {
        let span = decl.span;
        if decl.storage_classes.len() > 1 {
            return Err(Self::error(
                format!(
                    "multiple storage class specifiers: '{}' and '{}'",
                    decl.storage_classes[0], decl.storage_classes[1]
                ),
                span,
            ));
        }

        if decl.declarators.is_empty() {
            return self.process_empty_declaration(decl, span);
        }

        let Some(specifier) = &decl.specifier else {
            return Err(Self::error(
                "at least 1 type specifier required in declaration",
                span,
            ));
        };
        // Resolved once for the whole declarator list, so a struct or enum
        // defined here registers its tag (and enumerators) exactly once.
        let base = self.resolve_type_specifier(specifier, span)?;

        let is_typedef = decl
            .storage_classes
            .contains(&crate::frontend::ast::StorageClass::Typedef);

        for declarator in &decl.declarators {
            let name = declarator.name.as_str();
            let ty = self.declarator_type(&base, &declarator.derived, name, declarator.span)?;

            if is_typedef {
                if declarator.init.is_some() {
                    return Err(Self::error(
                        format!("typedef '{}' is initialized", name),
                        declarator.span,
                    ));
                }
                if self.symbols.lookup_in_current(name).is_some() {
                    return Err(Self::error(
                        format!("redeclaration of '{}'", name),
                        declarator.span,
                    ));
                }
                self.symbols
                    .declare(name, SymbolEntry::Typedef { data_type: ty });
                continue;
            }

            if ty.is_function() {
                self.declare_function(name, ty, declarator.init.is_some(), declarator.span)?;
                continue;
            }

            if ty.is_void() {
                return Err(Self::error(
                    format!("variable '{}' declared void", name),
                    declarator.span,
                ));
            }
            if self.symbols.lookup_in_current(name).is_some() {
                return Err(Self::error(
                    format!("redeclaration of '{}'", name),
                    declarator.span,
                ));
            }

            match local_stores.as_deref_mut() {
                Some(stores) => {
                    let size = self.size_of(&ty, declarator.span)?;
                    let offset = self.symbols.allocate_local(size);
                    self.symbols.declare(
                        name,
                        SymbolEntry::LocalVariable {
                            data_type: ty.clone(),
                            offset,
                        },
                    );
                    self.unpack_local_initializer(
                        &ty,
                        declarator.init.as_ref(),
                        offset,
                        stores,
                        declarator.span,
                    )?;
                }
                None => {
                    let bytes = self.data_segment_initializer(
                        &ty,
                        declarator.init.as_ref(),
                        declarator.span,
                    )?;
                    let offset = self.symbols.allocate_data_segment(&bytes);
                    self.symbols.declare(
                        name,
                        SymbolEntry::DataSegmentVariable {
                            data_type: ty,
                            offset,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// A declaration with no declarators either defines a tag or is
    /// rejected.
    fn process_empty_declaration(
        &mut self,
        decl: &Declaration,
        span: Span,
    ) -> Result<(), ProcessingError> {
        match &decl.specifier {
            Some(
                specifier @ (TypeSpecifier::StructDefinition { .. }
                | TypeSpecifier::EnumDefinition { .. }),
            ) => {
                self.resolve_type_specifier(specifier, span)?;
                if !decl.storage_classes.is_empty() {
                    return Err(Self::error(
                        "useless storage class qualifier in empty declaration",
                        span,
                    ));
                }
                Ok(())
            }
            _ if !decl.storage_classes.is_empty() => Err(Self::error(
                "useless storage class qualifier in empty declaration",
                span,
            )),
            _ => Err(Self::error("empty declaration", span)),
        }
    }

    /// Bind or re-bind a function declaration. Compatible redeclarations of
    /// the same prototype are permitted; anything else is an error.
    pub(super) fn declare_function(
        &mut self,
        name: &str,
        ty: DataType,
        has_initializer: bool,
        span: Span,
    ) -> Result<(), ProcessingError> {
        if has_initializer {
            return Err(Self::error(
                format!("function '{}' is initialized like a variable", name),
                span,
            ));
        }
        match self.symbols.lookup_in_current(name) {
            None => {
                self.symbols.declare(
                    name,
                    SymbolEntry::Function {
                        data_type: ty,
                        defined: false,
                        external: false,
                    },
                );
                Ok(())
            }
            Some(SymbolEntry::Function { data_type, .. }) => {
                if self.is_compatible(&ty, data_type, false) {
                    Ok(())
                } else {
                    Err(Self::error(format!("redeclaration of '{}'", name), span))
                }
            }
            Some(_) => Err(Self::error(format!("redeclaration of '{}'", name), span)),
        }
    }

    // --- Type specifier resolution ---

    /// Resolve a type specifier to a data type, registering any struct or
    /// enum definition it contains.
    pub(super) fn resolve_type_specifier(
        &mut self,
        specifier: &TypeSpecifier,
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        match specifier {
            TypeSpecifier::Void => Ok(DataType::Void),
            TypeSpecifier::Primary { kind, is_const } => Ok(DataType::Primary {
                kind: *kind,
                is_const: *is_const,
            }),
            TypeSpecifier::Pointer { pointee, is_const } => Ok(DataType::Pointer {
                pointee: Box::new(self.resolve_type_specifier(pointee, span)?),
                is_const: *is_const,
            }),
            TypeSpecifier::Array {
                element,
                length,
                is_const,
            } => Ok(DataType::Array {
                element: Box::new(self.resolve_type_specifier(element, span)?),
                length: length.clone(),
                is_const: *is_const,
            }),
            TypeSpecifier::StructDefinition { tag, fields } => {
                self.resolve_struct_definition(tag.as_deref(), fields, span)
            }
            TypeSpecifier::StructReference { tag } => match self.symbols.lookup_tag(tag) {
                Some(ty @ DataType::Struct(_)) => Ok(ty.clone()),
                Some(_) => Err(Self::error(
                    format!("'{}' defined as wrong kind of tag", tag),
                    span,
                )),
                None => Err(Self::error(format!("'{}' is an incomplete type", tag), span)),
            },
            TypeSpecifier::EnumDefinition { tag, members } => {
                self.resolve_enum_definition(tag.as_deref(), members, span)
            }
            TypeSpecifier::EnumReference { tag } => match self.symbols.lookup_tag(tag) {
                Some(ty @ DataType::Enum(_)) => Ok(ty.clone()),
                Some(_) => Err(Self::error(
                    format!("'{}' defined as wrong kind of tag", tag),
                    span,
                )),
                None => Err(Self::error(format!("'{}' is an incomplete type", tag), span)),
            },
            TypeSpecifier::TypedefName { name, is_const } => match self.symbols.lookup(name) {
                Some(SymbolEntry::Typedef { data_type }) => {
                    let ty = data_type.clone();
                    Ok(if *is_const { ty.with_const(true) } else { ty })
                }
                _ => Err(Self::error(format!("unknown type name '{}'", name), span)),
            },
        }
    }

    /// Lookup-only specifier resolution for cast targets and `sizeof` type
    /// names in constant contexts: no tag definitions occur here.
    pub(super) fn resolve_scalar_specifier(
        &self,
        specifier: &TypeSpecifier,
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        match specifier {
            TypeSpecifier::Void => Ok(DataType::Void),
            TypeSpecifier::Primary { kind, is_const } => Ok(DataType::Primary {
                kind: *kind,
                is_const: *is_const,
            }),
            TypeSpecifier::Pointer { pointee, is_const } => Ok(DataType::Pointer {
                pointee: Box::new(self.resolve_scalar_specifier(pointee, span)?),
                is_const: *is_const,
            }),
            TypeSpecifier::Array {
                element,
                length,
                is_const,
            } => Ok(DataType::Array {
                element: Box::new(self.resolve_scalar_specifier(element, span)?),
                length: length.clone(),
                is_const: *is_const,
            }),
            TypeSpecifier::StructReference { tag } => match self.symbols.lookup_tag(tag) {
                Some(ty @ DataType::Struct(_)) => Ok(ty.clone()),
                _ => Err(Self::error(format!("'{}' is an incomplete type", tag), span)),
            },
            TypeSpecifier::EnumReference { tag } => match self.symbols.lookup_tag(tag) {
                Some(ty @ DataType::Enum(_)) => Ok(ty.clone()),
                _ => Err(Self::error(format!("'{}' is an incomplete type", tag), span)),
            },
            TypeSpecifier::TypedefName { name, is_const } => match self.symbols.lookup(name) {
                Some(SymbolEntry::Typedef { data_type }) => {
                    let ty = data_type.clone();
                    Ok(if *is_const { ty.with_const(true) } else { ty })
                }
                _ => Err(Self::error(format!("unknown type name '{}'", name), span)),
            },
            TypeSpecifier::StructDefinition { .. } | TypeSpecifier::EnumDefinition { .. } => {
                Err(Self::error(
                    "expression is not a compile-time constant",
                    span,
                ))
            }
        }
    }

    /// Build the full type of one declarator by folding its derived parts
    /// innermost-first onto the base type.
    pub(super) fn declarator_type(
        &mut self,
        base: &DataType,
        derived: &[DerivedDeclarator],
        name: &str,
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        let mut ty = base.clone();
        for part in derived.iter().rev() {
            match part {
                DerivedDeclarator::Pointer { is_const } => {
                    ty = DataType::Pointer {
                        pointee: Box::new(ty),
                        is_const: *is_const,
                    };
                }
                DerivedDeclarator::Array(length) => {
                    if ty.is_function() {
                        return Err(Self::error(
                            format!("declaration of '{}' as array of functions", name),
                            span,
                        ));
                    }
                    ty = DataType::Array {
                        element: Box::new(ty),
                        length: length.clone(),
                        is_const: false,
                    };
                }
                DerivedDeclarator::Function(params) => {
                    if matches!(ty, DataType::Array { .. }) {
                        return Err(Self::error(
                            format!("'{}' declared as function returning an array", name),
                            span,
                        ));
                    }
                    if ty.is_function() {
                        return Err(Self::error(
                            format!("'{}' declared as function returning a function", name),
                            span,
                        ));
                    }
                    let parameters = self.resolve_parameter_types(params)?;
                    ty = DataType::Function(Rc::new(FunctionType {
                        return_type: ty,
                        parameters,
                    }));
                }
            }
        }
        Ok(ty)
    }

    /// Resolve parameter declarations to their adjusted types: arrays decay
    /// to pointers and function types to function pointers (C17 6.7.6.3).
    pub(super) fn resolve_parameter_types(
        &mut self,
        params: &[ParameterDeclaration],
    ) -> Result<Vec<DataType>, ProcessingError> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let base = self.resolve_type_specifier(&param.specifier, param.span)?;
            let name = param.name.as_deref().unwrap_or("");
            let ty = self.declarator_type(&base, &param.derived, name, param.span)?;
            if ty.is_void() {
                return Err(Self::error(
                    format!("parameter '{}' declared void", name),
                    param.span,
                ));
            }
            out.push(ty.decay());
        }
        Ok(out)
    }

    // --- Struct and enum definitions ---

    fn resolve_struct_definition(
        &mut self,
        tag: Option<&str>,
        fields: &[FieldDeclaration],
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        if fields.is_empty() {
            return Err(Self::error("struct has no members", span));
        }

        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields {
            if resolved
                .iter()
                .any(|f: &StructField| f.name == field.name)
            {
                return Err(Self::error(
                    format!("duplicate member '{}'", field.name),
                    field.span,
                ));
            }
            let data_type = self.resolve_field_type(field, tag)?;
            resolved.push(StructField {
                name: field.name.clone(),
                data_type,
            });
        }

        let ty = DataType::Struct(Rc::new(StructType {
            tag: tag.map(|t| t.to_string()),
            fields: resolved,
        }));

        if let Some(tag_name) = tag {
            self.register_tag(tag_name, &ty, span)?;
        }
        Ok(ty)
    }

    /// Resolve one struct field, turning a reference to the enclosing tag
    /// through exactly one pointer level into the `SelfPointer` marker.
    fn resolve_field_type(
        &mut self,
        field: &FieldDeclaration,
        own_tag: Option<&str>,
    ) -> Result<DataType, ProcessingError> {
        if let TypeSpecifier::StructReference { tag } = &field.specifier {
            if Some(tag.as_str()) == own_tag {
                let pointer_levels = field
                    .derived
                    .iter()
                    .filter(|d| matches!(d, DerivedDeclarator::Pointer { .. }))
                    .count();
                return match (pointer_levels, field.derived.len()) {
                    (1, 1) => Ok(DataType::SelfPointer),
                    (0, _) => Err(Self::error(
                        format!("field '{}' has incomplete type", field.name),
                        field.span,
                    )),
                    _ => Err(Self::error(
                        format!("'{}' is an incomplete type", tag),
                        field.span,
                    )),
                };
            }
        }
        let base = self.resolve_type_specifier(&field.specifier, field.span)?;
        let ty = self.declarator_type(&base, &field.derived, &field.name, field.span)?;
        if ty.is_void() {
            return Err(Self::error(
                format!("variable '{}' declared void", field.name),
                field.span,
            ));
        }
        if ty.is_function() {
            return Err(Self::error(
                format!("field '{}' declared as a function", field.name),
                field.span,
            ));
        }
        Ok(ty)
    }

    fn resolve_enum_definition(
        &mut self,
        tag: Option<&str>,
        members: &[EnumMemberDeclaration],
        span: Span,
    ) -> Result<DataType, ProcessingError> {
        if members.is_empty() {
            return Err(Self::error("empty enum is invalid", span));
        }

        let mut resolved: Vec<(String, i128)> = Vec::with_capacity(members.len());
        let mut next_value: i128 = 0;
        for member in members {
            let value = match &member.value {
                Some(expr) => match self.eval_const_expr(expr)? {
                    Constant::Int { value, data_type } if data_type.is_integer() => value,
                    _ => {
                        return Err(Self::error(
                            format!(
                                "enumerator value for '{}' is not an integer constant",
                                member.name
                            ),
                            member.span,
                        ));
                    }
                },
                None => next_value,
            };
            let value = wrap_integer(value, PrimaryDataType::SignedInt);
            next_value = value + 1;

            if self.symbols.lookup_in_current(&member.name).is_some() {
                return Err(Self::error(
                    format!("redeclaration of '{}'", member.name),
                    member.span,
                ));
            }
            self.symbols
                .declare(member.name.clone(), SymbolEntry::Enumerator { value });
            resolved.push((member.name.clone(), value));
        }

        let ty = DataType::Enum(EnumType {
            tag: tag.map(|t| t.to_string()),
            members: resolved,
        });
        if let Some(tag_name) = tag {
            self.register_tag(tag_name, &ty, span)?;
        }
        Ok(ty)
    }

    /// Bind a struct/enum tag in the current scope, rejecting redefinition
    /// and cross-kind collisions.
    fn register_tag(
        &mut self,
        tag: &str,
        ty: &DataType,
        span: Span,
    ) -> Result<(), ProcessingError> {
        if let Some(existing) = self.symbols.lookup_tag_in_current(tag) {
            let same_kind = matches!(
                (existing, ty),
                (DataType::Struct(_), DataType::Struct(_)) | (DataType::Enum(_), DataType::Enum(_))
            );
            return Err(if same_kind {
                Self::error(format!("redefinition of '{}'", ty), span)
            } else {
                Self::error(
                    format!("redefinition of '{}' as wrong kind of tag", tag),
                    span,
                )
            });
        }
        self.symbols.declare_tag(tag, ty.clone());
        Ok(())
    }
}
