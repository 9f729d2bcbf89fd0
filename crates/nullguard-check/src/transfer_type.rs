//! Non-flow-sensitive type transfer: the nullability vector of every
//! expression, computed bottom-up and memoized for the whole run.

use nullguard_ir::ir::*;

use crate::analysis::FunctionAnalysis;
use crate::tnv::{
    count_pointers, nullability_from_declared, nullability_from_type, unspecified_vector,
    ClassSubst, Substitutions, SymbolicNullability, TypeNullability,
};

impl<'tu> FunctionAnalysis<'tu> {
    /// Compute and memoize the nullability vector of `e`. Children are
    /// already memoized because transfer runs post-order.
    pub(crate) fn transfer_type(&mut self, e: ExprId) {
        if self.nfs.expr_nullability(e).is_some() {
            return;
        }
        let vector = self.compute_type_vector(e);
        let expected = count_pointers(self.tu, self.tu.expr(e).ty);
        self.nfs
            .insert_expr_nullability_if_absent(e, expected, move |_| vector);
    }

    /// The memoized vector of a subexpression. Always available bottom-up;
    /// degrade to `Unspecified` if a node was somehow skipped.
    fn child_tnv(&self, e: ExprId) -> TypeNullability {
        match self.nfs.expr_nullability(e) {
            Some(v) => v.clone(),
            None => {
                tracing::debug!(expr = e, "missing child nullability");
                unspecified_vector(self.tu, self.tu.expr(e).ty)
            }
        }
    }

    fn compute_type_vector(&self, e: ExprId) -> TypeNullability {
        let tu = self.tu;
        let expr = tu.expr(e);
        match &expr.kind {
            ExprKind::DeclRef {
                decl,
                template_args,
            } => match &tu.decl(*decl).kind {
                DeclKind::Var(v) => {
                    let mut vec = nullability_from_type(tu, v.ty, self.default_for_decl(*decl));
                    self.nfs.apply_slot_override((*decl, 0), &mut vec);
                    vec
                }
                DeclKind::Function(f) => self.function_ref_vector(e, *decl, f, template_args),
                DeclKind::Field(_) => unspecified_vector(tu, expr.ty),
            },
            ExprKind::ParamRef { func, index } => {
                let param_ty = tu
                    .function(*func)
                    .and_then(|f| f.params.get(*index as usize))
                    .map(|p| p.ty);
                match param_ty {
                    Some(ty) => {
                        let mut vec = nullability_from_type(tu, ty, self.default_for_decl(*func));
                        self.nfs.apply_slot_override((*func, index + 1), &mut vec);
                        vec
                    }
                    None => unspecified_vector(tu, expr.ty),
                }
            }
            ExprKind::This => {
                let mut vec = nullability_from_type(tu, expr.ty, None);
                if let Some(front) = vec.first_mut() {
                    *front = SymbolicNullability::Concrete(NullabilityKind::Nonnull);
                }
                vec
            }
            ExprKind::NullLiteral
            | ExprKind::IntLiteral { .. }
            | ExprKind::BoolLiteral { .. }
            | ExprKind::AssertNullability { .. } => vec![],
            ExprKind::ValueInit => nullability_from_type(tu, expr.ty, self.default_kind()),
            ExprKind::Member { base, field, .. } => self.member_vector(e, *base, *field),
            ExprKind::MemberCall { base, method, .. } => {
                self.member_return_vector(e, *base, *method)
            }
            ExprKind::OperatorCall { method, args, .. } => match args.first() {
                Some(&obj) => self.member_return_vector(e, obj, *method),
                None => unspecified_vector(tu, expr.ty),
            },
            ExprKind::Call { callee, .. } => match self.direct_callee(*callee) {
                Some((fd, targs)) => self.call_return_vector(e, fd, targs),
                None => nullability_from_type(tu, expr.ty, self.default_kind()),
            },
            ExprKind::Construct { .. } => nullability_from_type(tu, expr.ty, self.default_kind()),
            ExprKind::Cast { kind, operand } => self.cast_vector(e, *kind, *operand),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::AddrOf => prepend(
                    NullabilityKind::Nonnull,
                    self.child_tnv(*operand),
                ),
                UnaryOp::Deref => drop_front(self.child_tnv(*operand)),
                _ => self.child_tnv(*operand),
            },
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Eq | BinaryOp::Ne => vec![],
                BinaryOp::Assign => self.child_tnv(*rhs),
                BinaryOp::Add | BinaryOp::Sub => {
                    let expected = count_pointers(tu, expr.ty);
                    let l = self.child_tnv(*lhs);
                    if l.len() == expected {
                        l
                    } else {
                        let r = self.child_tnv(*rhs);
                        if r.len() == expected {
                            r
                        } else {
                            unspecified_vector(tu, expr.ty)
                        }
                    }
                }
            },
            ExprKind::ArraySubscript { base, .. } => {
                let base_ty = tu.non_reference(tu.expr(*base).ty);
                let child = self.child_tnv(*base);
                if tu.is_raw_pointer(base_ty) {
                    drop_front(child)
                } else {
                    child
                }
            }
            ExprKind::New { nothrow } => {
                let mut vec = nullability_from_type(tu, expr.ty, self.default_kind());
                if let Some(front) = vec.first_mut() {
                    *front = SymbolicNullability::Concrete(if *nothrow {
                        NullabilityKind::Nullable
                    } else {
                        NullabilityKind::Nonnull
                    });
                }
                vec
            }
            ExprKind::MaterializeTemporary { operand } | ExprKind::BindTemporary { operand } => {
                self.child_tnv(*operand)
            }
        }
    }

    /// Member access `base.m` / `base->m`: the member's declared type with
    /// class-template parameters substituted from the slice of the base
    /// vector covering the record's template arguments.
    fn member_vector(&self, e: ExprId, base: ExprId, field: DeclId) -> TypeNullability {
        let tu = self.tu;
        let DeclKind::Field(fd) = &tu.decl(field).kind else {
            return unspecified_vector(tu, tu.expr(e).ty);
        };
        let base_v = self.child_tnv(base);
        let (record, start) = self.base_record(base);
        let slice = base_v.get(start..).unwrap_or(&[]);
        let subst = Substitutions {
            class: Some(ClassSubst {
                record,
                base_vector: slice,
            }),
            func: None,
        };
        let mut vec = nullability_from_declared(
            tu,
            fd.ty,
            tu.expr(e).ty,
            self.default_for_decl(field),
            &subst,
        );
        self.nfs.apply_slot_override((field, 0), &mut vec);
        vec
    }

    /// A member call's vector is its return region: the method's declared
    /// return type, substituted against the base like a member access.
    fn member_return_vector(&self, e: ExprId, base: ExprId, method: DeclId) -> TypeNullability {
        let tu = self.tu;
        let Some(m) = tu.function(method) else {
            return unspecified_vector(tu, tu.expr(e).ty);
        };
        let base_v = self.child_tnv(base);
        let (record, start) = self.base_record(base);
        let slice = base_v.get(start..).unwrap_or(&[]);
        let subst = Substitutions {
            class: Some(ClassSubst {
                record,
                base_vector: slice,
            }),
            func: None,
        };
        let mut vec = nullability_from_declared(
            tu,
            m.ret,
            tu.expr(e).ty,
            self.default_for_decl(method),
            &subst,
        );
        self.nfs.apply_slot_override((method, 0), &mut vec);
        vec
    }

    /// The record a member belongs to, plus the offset of the record's
    /// template-argument region within the base expression's vector (one
    /// extra entry when the base is a pointer, as in arrow access).
    fn base_record(&self, base: ExprId) -> (TypeId, usize) {
        let tu = self.tu;
        let base_ty = tu.non_reference(tu.expr(base).ty);
        if let TypeKind::Pointer { pointee, .. } = &tu.ty(base_ty).kind {
            return (tu.non_reference(*pointee), 1);
        }
        (base_ty, 0)
    }

    /// Call through a direct callee: substitute the explicitly written
    /// function template arguments into the declared return type. Deduced
    /// arguments carry no sugar and degrade to `Unspecified`.
    fn call_return_vector(
        &self,
        e: ExprId,
        callee: DeclId,
        template_args: &[Option<TypeId>],
    ) -> TypeNullability {
        let tu = self.tu;
        let Some(f) = tu.function(callee) else {
            return unspecified_vector(tu, tu.expr(e).ty);
        };
        let resolved: Vec<Option<TypeNullability>> = template_args
            .iter()
            .map(|arg| arg.map(|t| nullability_from_type(tu, t, self.default_kind())))
            .collect();
        let subst = Substitutions {
            class: None,
            func: Some(&resolved),
        };
        let mut vec = nullability_from_declared(
            tu,
            f.ret,
            tu.expr(e).ty,
            self.default_for_decl(callee),
            &subst,
        );
        self.nfs.apply_slot_override((callee, 0), &mut vec);
        vec
    }

    /// A reference to a function: the full signature vector (return first,
    /// then parameters), with explicit template arguments substituted.
    fn function_ref_vector(
        &self,
        e: ExprId,
        decl: DeclId,
        f: &FunctionDecl,
        template_args: &[Option<TypeId>],
    ) -> TypeNullability {
        let tu = self.tu;
        let resolved: Vec<Option<TypeNullability>> = template_args
            .iter()
            .map(|arg| arg.map(|t| nullability_from_type(tu, t, self.default_kind())))
            .collect();
        let subst = Substitutions {
            class: None,
            func: Some(&resolved),
        };
        let default = self.default_for_decl(decl);
        match &tu.ty(tu.expr(e).ty).kind {
            TypeKind::Function(cf) if cf.params.len() == f.params.len() => {
                let mut vec = nullability_from_declared(tu, f.ret, cf.ret, default, &subst);
                for (p, &cp) in f.params.iter().zip(&cf.params) {
                    vec.extend(nullability_from_declared(tu, p.ty, cp, default, &subst));
                }
                self.nfs.apply_slot_override((decl, 0), &mut vec);
                vec
            }
            _ => nullability_from_type(tu, tu.expr(e).ty, default),
        }
    }

    /// Cast effects on nullability, by cast kind.
    fn cast_vector(&self, e: ExprId, kind: CastKind, operand: ExprId) -> TypeNullability {
        let tu = self.tu;
        let ty = tu.expr(e).ty;
        match kind {
            // Casts between equivalent types.
            CastKind::LValueToRValue | CastKind::NoOp => self.child_tnv(operand),

            // This can definitely be null.
            CastKind::NullToPointer => {
                let mut vec = nullability_from_type(tu, ty, self.default_kind());
                if tu.is_raw_pointer(ty) {
                    if let Some(front) = vec.first_mut() {
                        *front = SymbolicNullability::Concrete(NullabilityKind::Nullable);
                    }
                }
                vec
            }

            // Casts between unrelated types preserve only the chain of
            // top-level pointers, positionally.
            CastKind::BitCast
            | CastKind::LValueBitCast
            | CastKind::BaseToDerived
            | CastKind::DerivedToBase => self.preserve_top_level_pointers(e, operand),

            // A dynamic_cast to pointer is null when the runtime check fails.
            CastKind::Dynamic => {
                let mut vec = unspecified_vector(tu, ty);
                if tu.is_raw_pointer(ty) {
                    if let Some(front) = vec.first_mut() {
                        *front = SymbolicNullability::Concrete(NullabilityKind::Nullable);
                    }
                }
                vec
            }

            // Decayed objects are never null.
            CastKind::ArrayToPointerDecay | CastKind::FunctionToPointerDecay => {
                prepend(NullabilityKind::Nonnull, self.child_tnv(operand))
            }

            // Primitive values have no nullability.
            CastKind::PointerToBoolean
            | CastKind::PointerToIntegral
            | CastKind::IntegralCast
            | CastKind::IntegralToBoolean => vec![],

            // Pointers out of thin air.
            CastKind::IntegralToPointer | CastKind::UserDefined => unspecified_vector(tu, ty),
        }
    }

    fn preserve_top_level_pointers(&self, e: ExprId, operand: ExprId) -> TypeNullability {
        let tu = self.tu;
        let mut vec = unspecified_vector(tu, tu.expr(e).ty);
        let child = self.child_tnv(operand);
        let mut cast_ty = tu.expr(e).ty;
        let mut arg_ty = tu.expr(operand).ty;
        let mut i = 0;
        while let (
            TypeKind::Pointer { pointee: cp, .. },
            TypeKind::Pointer { pointee: ap, .. },
        ) = (&tu.ty(cast_ty).kind, &tu.ty(arg_ty).kind)
        {
            match (vec.get_mut(i), child.get(i)) {
                (Some(dst), Some(&src)) => *dst = src,
                _ => break,
            }
            cast_ty = *cp;
            arg_ty = *ap;
            i += 1;
        }
        vec
    }
}

fn prepend(head: NullabilityKind, tail: TypeNullability) -> TypeNullability {
    let mut vec = vec![SymbolicNullability::Concrete(head)];
    vec.extend(tail);
    vec
}

fn drop_front(vec: TypeNullability) -> TypeNullability {
    if vec.is_empty() {
        vec
    } else {
        vec[1..].to_vec()
    }
}
