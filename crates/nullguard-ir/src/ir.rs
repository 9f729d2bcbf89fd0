//! Typed model of a frontend's export of one translation unit.
//!
//! These types mirror the JSON schema produced by the C++ frontend bridge:
//! id-indexed tables for types, declarations and expressions, plus one CFG
//! per function body. All analysis passes consume this representation.

use serde::{Deserialize, Serialize};

pub type TypeId = u32;
pub type DeclId = u32;
pub type ExprId = u32;
pub type BlockId = u32;

/// Nullability annotation written on a pointer type (or pragma default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullabilityKind {
    Nonnull,
    Nullable,
    Unspecified,
}

impl std::fmt::Display for NullabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nonnull => write!(f, "nonnull"),
            Self::Nullable => write!(f, "nullable"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Root type — complete export of one translation unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    #[serde(default)]
    pub main_file: String,
    pub types: Vec<Type>,
    pub decls: Vec<Decl>,
    pub exprs: Vec<Expr>,
    /// Per-file default nullability pragmas.
    #[serde(default)]
    pub pragmas: Vec<Pragma>,
}

impl TranslationUnit {
    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id as usize]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id as usize]
    }

    /// All function declarations, in TU order.
    pub fn functions(&self) -> impl Iterator<Item = &Decl> {
        self.decls
            .iter()
            .filter(|d| matches!(d.kind, DeclKind::Function(_)))
    }

    pub fn function(&self, id: DeclId) -> Option<&FunctionDecl> {
        match &self.decl(id).kind {
            DeclKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// File-scoped pragma default for unannotated pointers, if any.
    pub fn pragma_default(&self, file: &str) -> Option<NullabilityKind> {
        self.pragmas
            .iter()
            .find(|p| p.file == file)
            .map(|p| p.default)
    }
}

/// A file-scoped `#pragma nullability file_default` directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pragma {
    pub file: String,
    pub default: NullabilityKind,
}

/// Source location span.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub end_col: u32,
}

impl Span {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_col)
    }
}

/// Type table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    pub id: TypeId,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeKind {
    /// Builtin non-pointer type (`int`, `bool`, `void`, ...).
    Scalar { name: String },
    /// `std::nullptr_t`.
    Nullptr,
    Pointer {
        pointee: TypeId,
        /// Written `_Nonnull` / `_Nullable` annotation, if any.
        #[serde(default)]
        annotation: Option<NullabilityKind>,
        /// True when the pointee is const-qualified.
        #[serde(default)]
        const_pointee: bool,
    },
    Reference {
        referent: TypeId,
        #[serde(default)]
        rvalue: bool,
        /// True when the referent is const-qualified.
        #[serde(default)]
        const_referent: bool,
    },
    Array { element: TypeId },
    Record(RecordType),
    Function(FunctionType),
    /// Occurrence of a class template parameter inside a member's type.
    TemplateParam { index: u32 },
    /// Occurrence of a function template parameter inside a signature.
    FnTemplateParam { index: u32 },
}

/// A class or struct, possibly a template specialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<DeclId>,
    #[serde(default)]
    pub bases: Vec<TypeId>,
    /// Template arguments of the specialization, in declaration order.
    #[serde(default)]
    pub template_args: Vec<TypeId>,
    /// For `unique_ptr`/`shared_ptr`-like records: the underlying raw
    /// pointer type held in the synthetic pointer field.
    #[serde(default)]
    pub smart_ptr_raw: Option<TypeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionType {
    pub ret: TypeId,
    #[serde(default)]
    pub params: Vec<TypeId>,
    #[serde(default)]
    pub variadic: bool,
}

/// Declaration table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub id: DeclId,
    /// Universal symbol reference — stable, AST-independent identity.
    pub usr: String,
    pub name: String,
    #[serde(default)]
    pub span: Option<Span>,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclKind {
    Function(FunctionDecl),
    Var(VarDecl),
    Field(FieldDecl),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub ty: TypeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub ty: TypeId,
    pub parent: TypeId,
    /// Default member initializer (`int* p = nullptr;`), if any.
    #[serde(default)]
    pub default_init: Option<ExprId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub ret: TypeId,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub body: Option<Body>,
    /// Record this function is a member of, if it is a method.
    #[serde(default)]
    pub parent_record: Option<TypeId>,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_constructor: bool,
    /// Dependent-typed functions are skipped by all passes.
    #[serde(default)]
    pub is_templated: bool,
    #[serde(default)]
    pub variadic: bool,
    /// Methods this declaration overrides.
    #[serde(default)]
    pub overrides: Vec<DeclId>,
    /// Set when the body is literally `return this->field;`.
    #[serde(default)]
    pub accessor_field: Option<DeclId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    #[serde(default)]
    pub default_arg: Option<ExprId>,
}

/// A function body: basic blocks plus explicit CFG edges.
///
/// Block 0 is the entry block. Constructor member initializers appear as
/// `Stmt::MemberInit` at the start of the entry block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    pub blocks: Vec<BasicBlock>,
    #[serde(default)]
    pub edges: Vec<CfgEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    /// Branch condition feeding this block's `CondTrue`/`CondFalse` edges.
    #[serde(default)]
    pub condition: Option<ExprId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its effects.
    Expr(ExprId),
    /// Local variable declaration, with optional initializer.
    Decl {
        decl: DeclId,
        #[serde(default)]
        init: Option<ExprId>,
    },
    Return {
        #[serde(default)]
        value: Option<ExprId>,
    },
    /// Constructor member initializer `field(init)`.
    MemberInit { field: DeclId, init: ExprId },
    /// `CHECK`-style macro body: aborts when the operand is null.
    AbortIfNull { arg: ExprId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Unconditional,
    CondTrue,
    CondFalse,
}

/// Expression table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub ty: TypeId,
    /// True for glvalues; false for prvalues.
    #[serde(default)]
    pub glvalue: bool,
    #[serde(default)]
    pub span: Option<Span>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    DeclRef {
        decl: DeclId,
        /// Explicitly written function template arguments; `None` entries
        /// were deduced and carry no nullability sugar.
        #[serde(default)]
        template_args: Vec<Option<TypeId>>,
    },
    ParamRef { func: DeclId, index: u32 },
    This,
    NullLiteral,
    /// Value initialization (`T{}`); zero-initializes pointers.
    ValueInit,
    IntLiteral { value: i64 },
    BoolLiteral { value: bool },
    Member {
        base: ExprId,
        field: DeclId,
        #[serde(default)]
        arrow: bool,
    },
    Call { callee: ExprId, args: Vec<ExprId> },
    MemberCall {
        base: ExprId,
        method: DeclId,
        args: Vec<ExprId>,
    },
    /// Overloaded operator call; `args[0]` is the object argument.
    OperatorCall {
        method: DeclId,
        op: String,
        args: Vec<ExprId>,
    },
    Construct {
        ty: TypeId,
        #[serde(default)]
        ctor: Option<DeclId>,
        args: Vec<ExprId>,
    },
    Cast { kind: CastKind, operand: ExprId },
    Unary { op: UnaryOp, operand: ExprId },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    ArraySubscript { base: ExprId, index: ExprId },
    New {
        #[serde(default)]
        nothrow: bool,
    },
    MaterializeTemporary { operand: ExprId },
    BindTemporary { operand: ExprId },
    /// `__assert_nullability<K...>(arg)` testing hook.
    AssertNullability {
        expected: Vec<NullabilityKind>,
        arg: ExprId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    NullToPointer,
    LValueToRValue,
    NoOp,
    BitCast,
    LValueBitCast,
    BaseToDerived,
    DerivedToBase,
    Dynamic,
    ArrayToPointerDecay,
    FunctionToPointerDecay,
    PointerToBoolean,
    PointerToIntegral,
    IntegralCast,
    IntegralToBoolean,
    IntegralToPointer,
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Deref,
    AddrOf,
    Not,
    Plus,
    Minus,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Assign,
    Add,
    Sub,
}

impl TranslationUnit {
    /// Strip references: the type a glvalue of `id` refers to.
    pub fn non_reference(&self, id: TypeId) -> TypeId {
        match &self.ty(id).kind {
            TypeKind::Reference { referent, .. } => *referent,
            _ => id,
        }
    }

    pub fn is_raw_pointer(&self, id: TypeId) -> bool {
        matches!(self.ty(id).kind, TypeKind::Pointer { .. })
    }

    /// Record with a synthetic raw-pointer field (`unique_ptr`-like).
    pub fn is_smart_pointer(&self, id: TypeId) -> bool {
        matches!(
            &self.ty(id).kind,
            TypeKind::Record(r) if r.smart_ptr_raw.is_some()
        )
    }

    /// The raw pointer type underlying a smart pointer record.
    pub fn smart_ptr_raw(&self, id: TypeId) -> Option<TypeId> {
        match &self.ty(id).kind {
            TypeKind::Record(r) => r.smart_ptr_raw,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        let span = Span::new("box.cc", 18, 5);
        assert_eq!(span.to_string(), "box.cc:18:5");
    }

    #[test]
    fn test_nullability_kind_display() {
        assert_eq!(NullabilityKind::Nonnull.to_string(), "nonnull");
        assert_eq!(NullabilityKind::Unspecified.to_string(), "unspecified");
    }

    #[test]
    fn test_tu_json_roundtrip() {
        let tu = TranslationUnit {
            main_file: "a.cc".into(),
            types: vec![
                Type {
                    id: 0,
                    kind: TypeKind::Scalar { name: "int".into() },
                },
                Type {
                    id: 1,
                    kind: TypeKind::Pointer {
                        pointee: 0,
                        annotation: Some(NullabilityKind::Nullable),
                        const_pointee: false,
                    },
                },
            ],
            decls: vec![Decl {
                id: 0,
                usr: "c:@F@f#".into(),
                name: "f".into(),
                span: Some(Span::new("a.cc", 1, 1)),
                kind: DeclKind::Function(FunctionDecl {
                    ret: 0,
                    params: vec![Param {
                        name: "p".into(),
                        ty: 1,
                        default_arg: None,
                    }],
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
            }],
            exprs: vec![],
            pragmas: vec![Pragma {
                file: "a.cc".into(),
                default: NullabilityKind::Nonnull,
            }],
        };

        let json = serde_json::to_string_pretty(&tu).unwrap();
        let parsed: TranslationUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.decls[0].name, "f");
        assert_eq!(
            parsed.pragma_default("a.cc"),
            Some(NullabilityKind::Nonnull)
        );
        assert!(parsed.is_raw_pointer(1));
        assert!(!parsed.is_raw_pointer(0));
    }

    #[test]
    fn test_pragma_default_missing_file() {
        let tu = TranslationUnit::default();
        assert_eq!(tu.pragma_default("missing.cc"), None);
    }
}
