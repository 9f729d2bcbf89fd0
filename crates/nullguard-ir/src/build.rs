//! Programmatic construction of translation units.
//!
//! Frontends produce the IR as JSON; tests and fixtures assemble it directly
//! through `TuBuilder`, which keeps the id tables consistent.

use crate::ir::*;

/// Incrementally builds a `TranslationUnit` with consistent id tables.
#[derive(Default)]
pub struct TuBuilder {
    tu: TranslationUnit,
    next_line: u32,
}

impl TuBuilder {
    pub fn new() -> Self {
        Self {
            tu: TranslationUnit {
                main_file: "input.cc".into(),
                ..Default::default()
            },
            next_line: 1,
        }
    }

    fn add_type(&mut self, kind: TypeKind) -> TypeId {
        let id = self.tu.types.len() as TypeId;
        self.tu.types.push(Type { id, kind });
        id
    }

    /// Builtin scalar type, deduplicated by name.
    pub fn scalar(&mut self, name: &str) -> TypeId {
        for t in &self.tu.types {
            if let TypeKind::Scalar { name: n } = &t.kind {
                if n == name {
                    return t.id;
                }
            }
        }
        self.add_type(TypeKind::Scalar { name: name.into() })
    }

    pub fn void(&mut self) -> TypeId {
        self.scalar("void")
    }

    pub fn int(&mut self) -> TypeId {
        self.scalar("int")
    }

    pub fn bool_ty(&mut self) -> TypeId {
        self.scalar("bool")
    }

    pub fn nullptr_ty(&mut self) -> TypeId {
        for t in &self.tu.types {
            if matches!(t.kind, TypeKind::Nullptr) {
                return t.id;
            }
        }
        self.add_type(TypeKind::Nullptr)
    }

    pub fn pointer(&mut self, pointee: TypeId, annotation: Option<NullabilityKind>) -> TypeId {
        for t in &self.tu.types {
            if let TypeKind::Pointer {
                pointee: p,
                annotation: a,
                const_pointee: false,
            } = &t.kind
            {
                if *p == pointee && *a == annotation {
                    return t.id;
                }
            }
        }
        self.add_type(TypeKind::Pointer {
            pointee,
            annotation,
            const_pointee: false,
        })
    }

    pub fn const_pointer(&mut self, pointee: TypeId, annotation: Option<NullabilityKind>) -> TypeId {
        self.add_type(TypeKind::Pointer {
            pointee,
            annotation,
            const_pointee: true,
        })
    }

    pub fn reference(&mut self, referent: TypeId, rvalue: bool) -> TypeId {
        self.add_type(TypeKind::Reference {
            referent,
            rvalue,
            const_referent: false,
        })
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.add_type(TypeKind::Array { element })
    }

    pub fn record(&mut self, name: &str) -> TypeId {
        self.add_type(TypeKind::Record(RecordType {
            name: name.into(),
            fields: vec![],
            bases: vec![],
            template_args: vec![],
            smart_ptr_raw: None,
        }))
    }

    pub fn record_with_args(&mut self, name: &str, template_args: &[TypeId]) -> TypeId {
        self.add_type(TypeKind::Record(RecordType {
            name: name.into(),
            fields: vec![],
            bases: vec![],
            template_args: template_args.to_vec(),
            smart_ptr_raw: None,
        }))
    }

    /// `unique_ptr`/`shared_ptr`-like record wrapping `raw`.
    pub fn smart_ptr(&mut self, name: &str, raw: TypeId) -> TypeId {
        self.add_type(TypeKind::Record(RecordType {
            name: name.into(),
            fields: vec![],
            bases: vec![],
            template_args: vec![],
            smart_ptr_raw: Some(raw),
        }))
    }

    pub fn template_param(&mut self, index: u32) -> TypeId {
        self.add_type(TypeKind::TemplateParam { index })
    }

    pub fn fn_template_param(&mut self, index: u32) -> TypeId {
        self.add_type(TypeKind::FnTemplateParam { index })
    }

    pub fn function_type(&mut self, ret: TypeId, params: &[TypeId], variadic: bool) -> TypeId {
        self.add_type(TypeKind::Function(FunctionType {
            ret,
            params: params.to_vec(),
            variadic,
        }))
    }

    fn add_decl(&mut self, name: &str, kind: DeclKind) -> DeclId {
        let id = self.tu.decls.len() as DeclId;
        let span = self.next_span();
        self.tu.decls.push(Decl {
            id,
            usr: format!("c:@{name}#{id}"),
            name: name.into(),
            span: Some(span),
            kind,
        });
        id
    }

    pub fn var(&mut self, name: &str, ty: TypeId) -> DeclId {
        self.add_decl(name, DeclKind::Var(VarDecl { ty }))
    }

    /// Adds a field declaration and registers it on the parent record.
    pub fn field(&mut self, record: TypeId, name: &str, ty: TypeId) -> DeclId {
        let id = self.add_decl(
            name,
            DeclKind::Field(FieldDecl {
                ty,
                parent: record,
                default_init: None,
            }),
        );
        if let TypeKind::Record(r) = &mut self.tu.types[record as usize].kind {
            r.fields.push(id);
        }
        id
    }

    pub fn set_field_default_init(&mut self, field: DeclId, init: ExprId) {
        if let DeclKind::Field(f) = &mut self.tu.decls[field as usize].kind {
            f.default_init = Some(init);
        }
    }

    pub fn function(&mut self, name: &str, ret: TypeId, params: &[(&str, TypeId)]) -> DeclId {
        self.add_decl(
            name,
            DeclKind::Function(FunctionDecl {
                ret,
                params: params
                    .iter()
                    .map(|(n, t)| Param {
                        name: (*n).into(),
                        ty: *t,
                        default_arg: None,
                    })
                    .collect(),
                body: None,
                parent_record: None,
                is_const: false,
                is_virtual: false,
                is_constructor: false,
                is_templated: false,
                variadic: false,
                overrides: vec![],
                accessor_field: None,
            }),
        )
    }

    /// Mutable access to a function declaration for flags, overrides, body.
    pub fn function_mut(&mut self, id: DeclId) -> &mut FunctionDecl {
        match &mut self.tu.decls[id as usize].kind {
            DeclKind::Function(f) => f,
            _ => panic!("decl {id} is not a function"),
        }
    }

    pub fn set_body(&mut self, func: DeclId, body: Body) {
        self.function_mut(func).body = Some(body);
    }

    fn next_span(&mut self) -> Span {
        let line = self.next_line;
        self.next_line += 1;
        Span::new(self.tu.main_file.clone(), line, 1)
    }

    fn add_expr(&mut self, kind: ExprKind, ty: TypeId, glvalue: bool) -> ExprId {
        let id = self.tu.exprs.len() as ExprId;
        let span = self.next_span();
        self.tu.exprs.push(Expr {
            id,
            ty,
            glvalue,
            span: Some(span),
            kind,
        });
        id
    }

    /// A prvalue expression.
    pub fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.add_expr(kind, ty, false)
    }

    /// A glvalue expression.
    pub fn lvalue(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.add_expr(kind, ty, true)
    }

    pub fn null_lit(&mut self) -> ExprId {
        let ty = self.nullptr_ty();
        self.expr(ExprKind::NullLiteral, ty)
    }

    /// Glvalue reference to parameter `index` of `func`.
    pub fn param_ref(&mut self, func: DeclId, index: u32) -> ExprId {
        let ty = match &self.tu.decls[func as usize].kind {
            DeclKind::Function(f) => f.params[index as usize].ty,
            _ => panic!("decl {func} is not a function"),
        };
        self.lvalue(ExprKind::ParamRef { func, index }, ty)
    }

    /// Glvalue reference to a variable.
    pub fn var_ref(&mut self, var: DeclId) -> ExprId {
        let ty = match &self.tu.decls[var as usize].kind {
            DeclKind::Var(v) => v.ty,
            _ => panic!("decl {var} is not a var"),
        };
        self.lvalue(
            ExprKind::DeclRef {
                decl: var,
                template_args: vec![],
            },
            ty,
        )
    }

    /// Lvalue-to-rvalue load of a glvalue.
    pub fn load(&mut self, operand: ExprId) -> ExprId {
        let ty = self.tu.non_reference(self.tu.exprs[operand as usize].ty);
        self.expr(
            ExprKind::Cast {
                kind: CastKind::LValueToRValue,
                operand,
            },
            ty,
        )
    }

    /// `*p` — glvalue of the pointee type.
    pub fn deref(&mut self, operand: ExprId) -> ExprId {
        let pointee = match &self.tu.ty(self.tu.exprs[operand as usize].ty).kind {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => panic!("deref of non-pointer expr"),
        };
        self.lvalue(ExprKind::Unary { op: UnaryOp::Deref, operand }, pointee)
    }

    /// `nullptr` converted to pointer type `ty`.
    pub fn null_to(&mut self, ty: TypeId) -> ExprId {
        let lit = self.null_lit();
        self.expr(
            ExprKind::Cast {
                kind: CastKind::NullToPointer,
                operand: lit,
            },
            ty,
        )
    }

    /// File-scoped default nullability pragma.
    pub fn pragma(&mut self, file: &str, default: NullabilityKind) {
        self.tu.pragmas.push(Pragma {
            file: file.into(),
            default,
        });
    }

    pub fn block(&self, id: BlockId, stmts: Vec<Stmt>) -> BasicBlock {
        BasicBlock {
            id,
            stmts,
            condition: None,
        }
    }

    pub fn finish(self) -> TranslationUnit {
        self.tu
    }
}
