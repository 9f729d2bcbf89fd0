//! Type nullability vectors.
//!
//! A type's nullability is a vector with one entry per pointer occurring
//! anywhere in the type, in pre-order of the type tree: outer pointer first,
//! then pointers inside template arguments, pointee types, and so on.

use nullguard_ir::ir::{NullabilityKind, TranslationUnit, TypeId, TypeKind};
use nullguard_solver::FormulaId;

/// A single vector entry: a concrete kind or a pair of symbolic booleans
/// installed by inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicNullability {
    Concrete(NullabilityKind),
    Symbolic {
        nonnull: FormulaId,
        nullable: FormulaId,
    },
}

impl SymbolicNullability {
    /// The concrete projection; symbolic entries project to `Unspecified`.
    pub fn concrete(&self) -> NullabilityKind {
        match self {
            Self::Concrete(k) => *k,
            Self::Symbolic { .. } => NullabilityKind::Unspecified,
        }
    }
}

impl From<NullabilityKind> for SymbolicNullability {
    fn from(kind: NullabilityKind) -> Self {
        Self::Concrete(kind)
    }
}

pub type TypeNullability = Vec<SymbolicNullability>;

/// Number of vector entries required for `ty`.
pub fn count_pointers(tu: &TranslationUnit, ty: TypeId) -> usize {
    match &tu.ty(ty).kind {
        TypeKind::Pointer { pointee, .. } => 1 + count_pointers(tu, *pointee),
        TypeKind::Reference { referent, .. } => count_pointers(tu, *referent),
        TypeKind::Array { element } => count_pointers(tu, *element),
        TypeKind::Record(r) => {
            if let Some(raw) = r.smart_ptr_raw {
                // A smart pointer is a single pointer at its outer level.
                count_pointers(tu, raw)
            } else {
                r.template_args
                    .iter()
                    .map(|&a| count_pointers(tu, a))
                    .sum()
            }
        }
        TypeKind::Function(f) => {
            count_pointers(tu, f.ret)
                + f.params.iter().map(|&p| count_pointers(tu, p)).sum::<usize>()
        }
        TypeKind::Scalar { .. }
        | TypeKind::Nullptr
        | TypeKind::TemplateParam { .. }
        | TypeKind::FnTemplateParam { .. } => 0,
    }
}

/// All-`Unspecified` vector of the right length for `ty`.
pub fn unspecified_vector(tu: &TranslationUnit, ty: TypeId) -> TypeNullability {
    vec![
        SymbolicNullability::Concrete(NullabilityKind::Unspecified);
        count_pointers(tu, ty)
    ]
}

fn entry(annotation: Option<NullabilityKind>, default: Option<NullabilityKind>) -> SymbolicNullability {
    SymbolicNullability::Concrete(match annotation {
        Some(k) if k != NullabilityKind::Unspecified => k,
        _ => default.unwrap_or(NullabilityKind::Unspecified),
    })
}

/// Nullability vector of a fully-concrete type, applying the file's pragma
/// default to unannotated pointers.
pub fn nullability_from_type(
    tu: &TranslationUnit,
    ty: TypeId,
    default: Option<NullabilityKind>,
) -> TypeNullability {
    let mut out = Vec::with_capacity(count_pointers(tu, ty));
    push_type(tu, ty, default, &mut out);
    out
}

fn push_type(
    tu: &TranslationUnit,
    ty: TypeId,
    default: Option<NullabilityKind>,
    out: &mut TypeNullability,
) {
    match &tu.ty(ty).kind {
        TypeKind::Pointer {
            pointee,
            annotation,
            ..
        } => {
            out.push(entry(*annotation, default));
            push_type(tu, *pointee, default, out);
        }
        TypeKind::Reference { referent, .. } => push_type(tu, *referent, default, out),
        TypeKind::Array { element } => push_type(tu, *element, default, out),
        TypeKind::Record(r) => {
            if let Some(raw) = r.smart_ptr_raw {
                push_type(tu, raw, default, out);
            } else {
                for &a in &r.template_args {
                    push_type(tu, a, default, out);
                }
            }
        }
        TypeKind::Function(f) => {
            push_type(tu, f.ret, default, out);
            for &p in &f.params {
                push_type(tu, p, default, out);
            }
        }
        TypeKind::Scalar { .. }
        | TypeKind::Nullptr
        | TypeKind::TemplateParam { .. }
        | TypeKind::FnTemplateParam { .. } => {}
    }
}

/// Substitution context for template parameters encountered while walking a
/// declared type in parallel with its concrete instantiation.
pub struct Substitutions<'a> {
    /// Slices of the base expression's vector, one per class template
    /// argument of the base record.
    pub class: Option<ClassSubst<'a>>,
    /// Vectors for explicitly written function template arguments; `None`
    /// entries were deduced and carry no nullability sugar.
    pub func: Option<&'a [Option<TypeNullability>]>,
}

impl Substitutions<'_> {
    pub fn none() -> Self {
        Self {
            class: None,
            func: None,
        }
    }
}

pub struct ClassSubst<'a> {
    /// The base record specialization the member belongs to.
    pub record: TypeId,
    /// The base vector region covering the record's template arguments.
    pub base_vector: &'a [SymbolicNullability],
}

impl ClassSubst<'_> {
    /// The slice of the base vector corresponding to template argument
    /// `index`, or `None` when the record carries no substitutable argument.
    fn slice_for(&self, tu: &TranslationUnit, index: u32) -> Option<&[SymbolicNullability]> {
        let args = match &tu.ty(self.record).kind {
            TypeKind::Record(r) => &r.template_args,
            _ => return None,
        };
        let index = index as usize;
        if index >= args.len() {
            return None;
        }
        let offset: usize = args[..index]
            .iter()
            .map(|&a| count_pointers(tu, a))
            .sum();
        let len = count_pointers(tu, args[index]);
        self.base_vector.get(offset..offset + len)
    }
}

/// Nullability vector of `declared` (which may contain template parameter
/// occurrences), walked in parallel with the `concrete` instantiated type so
/// the result always has `count_pointers(concrete)` entries.
///
/// Where substitution has no answer (deduced arguments, partial
/// specializations), the affected region degrades to `Unspecified`.
pub fn nullability_from_declared(
    tu: &TranslationUnit,
    declared: TypeId,
    concrete: TypeId,
    default: Option<NullabilityKind>,
    subst: &Substitutions<'_>,
) -> TypeNullability {
    let mut out = Vec::with_capacity(count_pointers(tu, concrete));
    push_declared(tu, declared, concrete, default, subst, &mut out);
    out
}

fn push_declared(
    tu: &TranslationUnit,
    declared: TypeId,
    concrete: TypeId,
    default: Option<NullabilityKind>,
    subst: &Substitutions<'_>,
    out: &mut TypeNullability,
) {
    match (&tu.ty(declared).kind, &tu.ty(concrete).kind) {
        (TypeKind::TemplateParam { index }, _) => {
            let slice = subst
                .class
                .as_ref()
                .and_then(|c| c.slice_for(tu, *index))
                .filter(|s| s.len() == count_pointers(tu, concrete));
            match slice {
                Some(s) => out.extend_from_slice(s),
                None => out.extend(unspecified_vector(tu, concrete)),
            }
        }
        (TypeKind::FnTemplateParam { index }, _) => {
            let vector = subst
                .func
                .and_then(|args| args.get(*index as usize))
                .and_then(|v| v.as_ref())
                .filter(|v| v.len() == count_pointers(tu, concrete));
            match vector {
                Some(v) => out.extend_from_slice(v),
                None => out.extend(unspecified_vector(tu, concrete)),
            }
        }
        (
            TypeKind::Pointer {
                pointee: dp,
                annotation,
                ..
            },
            TypeKind::Pointer { pointee: cp, .. },
        ) => {
            out.push(entry(*annotation, default));
            push_declared(tu, *dp, *cp, default, subst, out);
        }
        (TypeKind::Reference { referent: dr, .. }, _) => {
            let concrete = tu.non_reference(concrete);
            push_declared(tu, *dr, concrete, default, subst, out);
        }
        (_, TypeKind::Reference { referent: cr, .. }) => {
            push_declared(tu, declared, *cr, default, subst, out);
        }
        (TypeKind::Array { element: de }, TypeKind::Array { element: ce }) => {
            push_declared(tu, *de, *ce, default, subst, out);
        }
        (TypeKind::Record(dr), TypeKind::Record(cr))
            if dr.template_args.len() == cr.template_args.len() =>
        {
            if let (Some(draw), Some(craw)) = (dr.smart_ptr_raw, cr.smart_ptr_raw) {
                push_declared(tu, draw, craw, default, subst, out);
            } else {
                for (&da, &ca) in dr.template_args.iter().zip(&cr.template_args) {
                    push_declared(tu, da, ca, default, subst, out);
                }
            }
        }
        (TypeKind::Function(df), TypeKind::Function(cf))
            if df.params.len() == cf.params.len() =>
        {
            push_declared(tu, df.ret, cf.ret, default, subst, out);
            for (&dp, &cp) in df.params.iter().zip(&cf.params) {
                push_declared(tu, dp, cp, default, subst, out);
            }
        }
        // Shapes disagree; fill from the concrete type so the length
        // invariant holds.
        _ => out.extend(unspecified_vector(tu, concrete)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullguard_ir::build::TuBuilder;

    #[test]
    fn test_count_pointers_nesting() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let p = b.pointer(int, None);
        let pp = b.pointer(p, None);
        let r = b.reference(pp, false);
        let tu = b.finish();
        assert_eq!(count_pointers(&tu, int), 0);
        assert_eq!(count_pointers(&tu, p), 1);
        assert_eq!(count_pointers(&tu, pp), 2);
        assert_eq!(count_pointers(&tu, r), 2);
    }

    #[test]
    fn test_count_pointers_smart_pointer_is_single() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let raw = b.pointer(int, None);
        let sp = b.smart_ptr("unique_ptr", raw);
        let tu = b.finish();
        assert_eq!(count_pointers(&tu, sp), 1);
    }

    #[test]
    fn test_count_pointers_record_template_args() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let p = b.pointer(int, None);
        let pp = b.pointer(p, None);
        let rec = b.record_with_args("pair", &[p, pp]);
        let tu = b.finish();
        assert_eq!(count_pointers(&tu, rec), 3);
    }

    #[test]
    fn test_vector_annotations_and_default() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let inner = b.pointer(int, Some(NullabilityKind::Nullable));
        let outer = b.pointer(inner, None);
        let tu = b.finish();

        let v = nullability_from_type(&tu, outer, None);
        assert_eq!(
            v.iter().map(|e| e.concrete()).collect::<Vec<_>>(),
            vec![NullabilityKind::Unspecified, NullabilityKind::Nullable]
        );

        // Pragma default fills the unannotated outer slot only.
        let v = nullability_from_type(&tu, outer, Some(NullabilityKind::Nonnull));
        assert_eq!(
            v.iter().map(|e| e.concrete()).collect::<Vec<_>>(),
            vec![NullabilityKind::Nonnull, NullabilityKind::Nullable]
        );
    }

    #[test]
    fn test_class_template_substitution() {
        // struct pair<F, S> { S second; };  with pair<int*, int* _Nonnull>
        let mut b = TuBuilder::new();
        let int = b.int();
        let f_arg = b.pointer(int, None);
        let s_arg = b.pointer(int, Some(NullabilityKind::Nonnull));
        let rec = b.record_with_args("pair", &[f_arg, s_arg]);
        let s_param = b.template_param(1);
        let tu = b.finish();

        let base_vector = nullability_from_type(&tu, rec, None);
        assert_eq!(base_vector.len(), 2);

        let subst = Substitutions {
            class: Some(ClassSubst {
                record: rec,
                base_vector: &base_vector,
            }),
            func: None,
        };
        // Member declared as `S`, concretely `int* _Nonnull`.
        let v = nullability_from_declared(&tu, s_param, s_arg, None, &subst);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].concrete(), NullabilityKind::Nonnull);
    }

    #[test]
    fn test_class_template_substitution_through_pointer() {
        // Member declared as `S* _Nullable`, S = int* _Nonnull.
        let mut b = TuBuilder::new();
        let int = b.int();
        let s_arg = b.pointer(int, Some(NullabilityKind::Nonnull));
        let rec = b.record_with_args("holder", &[s_arg]);
        let s_param = b.template_param(0);
        let declared = b.pointer(s_param, Some(NullabilityKind::Nullable));
        let concrete = b.pointer(s_arg, None);
        let tu = b.finish();

        let base_vector = nullability_from_type(&tu, rec, None);
        let subst = Substitutions {
            class: Some(ClassSubst {
                record: rec,
                base_vector: &base_vector,
            }),
            func: None,
        };
        let v = nullability_from_declared(&tu, declared, concrete, None, &subst);
        assert_eq!(
            v.iter().map(|e| e.concrete()).collect::<Vec<_>>(),
            vec![NullabilityKind::Nullable, NullabilityKind::Nonnull]
        );
    }

    #[test]
    fn test_deduced_function_template_arg_degrades_to_unspecified() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let concrete = b.pointer(int, Some(NullabilityKind::Nonnull));
        let t_param = b.fn_template_param(0);
        let tu = b.finish();

        let args: Vec<Option<TypeNullability>> = vec![None];
        let subst = Substitutions {
            class: None,
            func: Some(&args),
        };
        let v = nullability_from_declared(&tu, t_param, concrete, None, &subst);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].concrete(), NullabilityKind::Unspecified);
    }

    #[test]
    fn test_function_template_substitution() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let concrete = b.pointer(int, None);
        let t_param = b.fn_template_param(0);
        let tu = b.finish();

        let args: Vec<Option<TypeNullability>> = vec![Some(vec![SymbolicNullability::Concrete(
            NullabilityKind::Nullable,
        )])];
        let subst = Substitutions {
            class: None,
            func: Some(&args),
        };
        let v = nullability_from_declared(&tu, t_param, concrete, None, &subst);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].concrete(), NullabilityKind::Nullable);
    }

    #[test]
    fn test_shape_mismatch_fills_unspecified() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let ptr = b.pointer(int, Some(NullabilityKind::Nonnull));
        let tu = b.finish();
        // Declared scalar against concrete pointer: shapes disagree.
        let v = nullability_from_declared(&tu, int, ptr, None, &Substitutions::none());
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].concrete(), NullabilityKind::Unspecified);
    }
}
