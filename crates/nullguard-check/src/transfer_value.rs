//! Flow-sensitive value transfer: null states of pointer values at each
//! statement.

use nullguard_ir::ir::*;

use crate::analysis::{AnalysisError, FunctionAnalysis};
use crate::env::{BlockState, DeclKey, LocId, Slot, ValId, Value};
use crate::tnv::{nullability_from_type, SymbolicNullability};

impl<'tu> FunctionAnalysis<'tu> {
    /// Transfer one expression node. Children have already been transferred.
    pub(crate) fn transfer_value(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
    ) -> Result<(), AnalysisError> {
        let tu = self.tu;
        let expr = tu.expr(e);
        match &expr.kind {
            ExprKind::ParamRef { func, index } => {
                let key = DeclKey::Param(*func, *index);
                let loc = match state.env.decl_locs.get(&key) {
                    Some(&l) => l,
                    None => {
                        let l = self.decl_loc(key, tu.non_reference(expr.ty));
                        state.env.decl_locs.insert(key, l);
                        l
                    }
                };
                state.env.expr_locs.insert(e, loc);
            }
            ExprKind::DeclRef { decl, .. } => {
                if let DeclKind::Var(v) = &tu.decl(*decl).kind {
                    let key = DeclKey::Var(*decl);
                    let loc = match state.env.decl_locs.get(&key) {
                        Some(&l) => l,
                        None => {
                            let l = self.decl_loc(key, tu.non_reference(v.ty));
                            state.env.decl_locs.insert(key, l);
                            l
                        }
                    };
                    state.env.expr_locs.insert(e, loc);
                }
            }
            ExprKind::This => {
                let loc = match state.env.decl_locs.get(&DeclKey::This) {
                    Some(&l) => l,
                    None => {
                        let l = self.decl_loc(DeclKey::This, tu.non_reference(expr.ty));
                        state.env.decl_locs.insert(DeclKey::This, l);
                        l
                    }
                };
                let lit_false = self.solver.lit(false);
                let val = self.arena.new_val(Value::Pointer(crate::env::PointerValue {
                    pointee: loc,
                    null: crate::env::NullState {
                        from_nullable: Some(lit_false),
                        is_null: Some(lit_false),
                    },
                    origin: None,
                }));
                state.env.expr_vals.insert(e, val);
            }
            ExprKind::Member { base, field, arrow } => {
                let obj = if *arrow {
                    self.pointer_of(state, *base).map(|p| p.pointee)
                } else {
                    state.env.expr_locs.get(base).copied()
                };
                if let Some(obj) = obj {
                    if let DeclKind::Field(fd) = &tu.decl(*field).kind {
                        let fty = tu.non_reference(fd.ty);
                        let loc = self.arena.field_loc(obj, *field, fty);
                        state.env.expr_locs.insert(e, loc);
                    }
                }
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                if let Some(p) = self.pointer_of(state, *operand) {
                    state.env.expr_locs.insert(e, p.pointee);
                }
            }
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                operand,
            } => {
                let pointee = match state.env.expr_locs.get(operand) {
                    Some(&l) => l,
                    None => {
                        let l = self.result_loc(*operand, tu.non_reference(tu.expr(*operand).ty));
                        state.env.expr_locs.insert(*operand, l);
                        l
                    }
                };
                let lit_false = self.solver.lit(false);
                let val = self.arena.new_val(Value::Pointer(crate::env::PointerValue {
                    pointee,
                    null: crate::env::NullState {
                        from_nullable: Some(lit_false),
                        is_null: Some(lit_false),
                    },
                    origin: None,
                }));
                state.env.expr_vals.insert(e, val);
            }
            ExprKind::NullLiteral => {
                let val = self.null_pointer_val(expr.ty);
                state.env.expr_vals.insert(e, val);
            }
            // Value initialization zero-initializes a pointer.
            ExprKind::ValueInit => {
                if tu.is_raw_pointer(expr.ty) {
                    let val = self.null_pointer_val(expr.ty);
                    state.env.expr_vals.insert(e, val);
                }
            }
            ExprKind::BoolLiteral { value } => {
                let f = self.solver.lit(*value);
                let val = self.arena.new_val(Value::Bool(f));
                state.env.expr_vals.insert(e, val);
            }
            ExprKind::Cast { kind, operand } => {
                self.transfer_cast_value(state, e, *kind, *operand)?;
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Eq | BinaryOp::Ne => {
                    self.transfer_comparison(state, e, *op, *lhs, *rhs);
                }
                BinaryOp::Assign => {
                    if let Some(&loc) = state.env.expr_locs.get(lhs) {
                        if let Some(&v) = state.env.expr_vals.get(rhs) {
                            state.env.store.insert(loc, v);
                        }
                        state.env.expr_locs.insert(e, loc);
                    }
                }
                BinaryOp::Add | BinaryOp::Sub => {}
            },
            ExprKind::ArraySubscript { base, .. } => {
                if expr.glvalue {
                    if let Some(p) = self.pointer_of(state, *base) {
                        state.env.expr_locs.insert(e, p.pointee);
                    }
                }
            }
            ExprKind::MaterializeTemporary { operand } | ExprKind::BindTemporary { operand } => {
                if let Some(&l) = state.env.expr_locs.get(operand) {
                    state.env.expr_locs.insert(e, l);
                } else if let Some(&v) = state.env.expr_vals.get(operand) {
                    let loc = self.result_loc(e, tu.non_reference(tu.expr(*operand).ty));
                    state.env.store.insert(loc, v);
                    state.env.expr_locs.insert(e, loc);
                    state.env.expr_vals.insert(e, v);
                }
            }
            ExprKind::Construct { ty, ctor, args } => {
                if tu.is_smart_pointer(*ty) {
                    self.transfer_smart_construct(state, e, *ty, *ctor, args);
                } else {
                    self.result_object_loc(state, e);
                }
            }
            ExprKind::OperatorCall { method, op, args } => {
                self.transfer_operator_call(state, e, *method, op.clone(), args.clone())?;
            }
            ExprKind::MemberCall { base, method, args } => {
                self.transfer_member_call(state, e, *base, *method, args.clone())?;
            }
            ExprKind::Call { callee, args } => {
                self.transfer_call(state, e, *callee, args.clone())?;
            }
            ExprKind::IntLiteral { .. }
            | ExprKind::New { .. }
            | ExprKind::AssertNullability { .. }
            | ExprKind::Unary { .. } => {}
        }

        // Every raw-pointer prvalue has an associated pointer value; create
        // one from the type's nullability when nothing else produced it.
        if !expr.glvalue
            && tu.is_raw_pointer(expr.ty)
            && !state.env.expr_vals.contains_key(&e)
        {
            let outer = self.outer_sn(e);
            let val = self.fresh_pointer(expr.ty, outer, None);
            state.env.expr_vals.insert(e, val);
        }
        // Smart-pointer glvalues always have an object location.
        if expr.glvalue
            && tu.is_smart_pointer(tu.non_reference(expr.ty))
            && !state.env.expr_locs.contains_key(&e)
        {
            let loc = self.result_loc(e, tu.non_reference(expr.ty));
            state.env.expr_locs.insert(e, loc);
        }
        Ok(())
    }

    pub(crate) fn outer_sn(&self, e: ExprId) -> Option<SymbolicNullability> {
        self.nfs.expr_nullability(e).and_then(|v| v.first()).copied()
    }

    fn transfer_cast_value(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        kind: CastKind,
        operand: ExprId,
    ) -> Result<(), AnalysisError> {
        let tu = self.tu;
        match kind {
            CastKind::NullToPointer => {
                let val = self.null_pointer_val(tu.expr(e).ty);
                state.env.expr_vals.insert(e, val);
            }
            CastKind::LValueToRValue => {
                let Some(&loc) = state.env.expr_locs.get(&operand) else {
                    return Ok(());
                };
                if let Some(&v) = state.env.store.get(&loc) {
                    state.env.expr_vals.insert(e, v);
                    return Ok(());
                }
                // Lazy initialization from the lvalue's annotation, written
                // back so repeated loads observe one consistent value.
                let vty = self.arena.loc_ty(loc);
                if tu.is_raw_pointer(vty) {
                    let outer = self.outer_sn(operand);
                    let origin = self.origin_for_lvalue(operand);
                    let val = self.fresh_pointer(vty, outer, origin);
                    state.env.store.insert(loc, val);
                    state.env.expr_vals.insert(e, val);
                }
            }
            // Checking a pointer as a boolean.
            CastKind::PointerToBoolean => {
                let val = match self
                    .pointer_of(state, operand)
                    .and_then(|p| p.null.is_null)
                {
                    Some(f) => {
                        let nf = self.solver.mk_not(f);
                        self.arena.new_val(Value::Bool(nf))
                    }
                    None => self.arena.top_val(),
                };
                state.env.expr_vals.insert(e, val);
            }
            // Value-preserving casts propagate the operand's value.
            CastKind::NoOp
            | CastKind::BitCast
            | CastKind::LValueBitCast
            | CastKind::BaseToDerived
            | CastKind::DerivedToBase => {
                if let Some(&v) = state.env.expr_vals.get(&operand) {
                    state.env.expr_vals.insert(e, v);
                }
            }
            // Everything else falls through to type-based initialization.
            _ => {}
        }
        Ok(())
    }

    fn origin_for_lvalue(&self, e: ExprId) -> Option<Slot> {
        match &self.tu.expr(e).kind {
            ExprKind::ParamRef { func, index } => Some(Slot {
                decl: *func,
                index: index + 1,
            }),
            ExprKind::DeclRef { decl, .. } => Some(Slot {
                decl: *decl,
                index: 0,
            }),
            ExprKind::Member { field, .. } => Some(Slot {
                decl: *field,
                index: 0,
            }),
            _ => None,
        }
    }

    /// `==` / `!=` between two pointers: a memoized comparison atom plus the
    /// three null implications, with a short-circuit against null literals.
    fn transfer_comparison(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) {
        let (Some(lp), Some(rp)) = (self.pointer_of(state, lhs), self.pointer_of(state, rhs))
        else {
            return;
        };
        let (Some(ln), Some(rn)) = (lp.null.is_null, rp.null.is_null) else {
            let top = self.arena.top_val();
            state.env.expr_vals.insert(e, top);
            return;
        };
        let is_eq = op == BinaryOp::Eq;
        let lit_true = self.solver.lit(true);

        // Comparing against a literal null propagates the other side.
        let short = if ln == lit_true {
            Some(rn)
        } else if rn == lit_true {
            Some(ln)
        } else {
            None
        };
        if let Some(other) = short {
            let f = if is_eq {
                other
            } else {
                self.solver.mk_not(other)
            };
            let val = self.arena.new_val(Value::Bool(f));
            state.env.expr_vals.insert(e, val);
            return;
        }

        let (cmp, fresh) = match self.nfs.comparison_atoms.get(&e) {
            Some(&a) => (a, false),
            None => {
                let a = self.solver.mk_atom();
                self.nfs.comparison_atoms.insert(e, a);
                (a, true)
            }
        };
        if fresh {
            let ptr_eq = if is_eq { cmp } else { self.solver.mk_not(cmp) };
            let ptr_ne = self.solver.mk_not(ptr_eq);
            let nl = self.solver.mk_not(ln);
            let nr = self.solver.mk_not(rn);

            let both_null = self.solver.mk_and(ln, rn);
            let imp = self.solver.mk_implies(both_null, ptr_eq);
            self.solver.add_assumption(imp);

            let null_notnull = self.solver.mk_and(ln, nr);
            let imp = self.solver.mk_implies(null_notnull, ptr_ne);
            self.solver.add_assumption(imp);

            let notnull_null = self.solver.mk_and(nl, rn);
            let imp = self.solver.mk_implies(notnull_null, ptr_ne);
            self.solver.add_assumption(imp);
        }
        let val = self.arena.new_val(Value::Bool(cmp));
        state.env.expr_vals.insert(e, val);
    }

    // ── Calls ────────────────────────────────────────────────────────────

    fn transfer_call(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        callee: ExprId,
        args: Vec<ExprId>,
    ) -> Result<(), AnalysisError> {
        let tu = self.tu;
        if let Some((fd, _)) = self.direct_callee(callee) {
            let name = tu.decl(fd).name.clone();
            // Free `swap` of two smart pointers.
            if name == "swap" && args.len() == 2 {
                let a_ty = tu.non_reference(tu.expr(args[0]).ty);
                let b_ty = tu.non_reference(tu.expr(args[1]).ty);
                if tu.is_smart_pointer(a_ty) && tu.is_smart_pointer(b_ty) {
                    let la = state.env.expr_locs.get(&args[0]).copied();
                    let lb = state.env.expr_locs.get(&args[1]).copied();
                    if let (Some(la), Some(lb)) = (la, lb) {
                        self.swap_smart(state, la, lb);
                    }
                    return Ok(());
                }
            }
            // Factory calls produce a non-null smart pointer.
            if matches!(name.as_str(), "make_unique" | "make_shared" | "allocate_shared")
                && tu.is_smart_pointer(tu.non_reference(tu.expr(e).ty))
            {
                let obj = self.result_object_loc(state, e);
                if let Some(raw) = tu.smart_ptr_raw(tu.non_reference(tu.expr(e).ty)) {
                    let val = self.nonnull_pointer_val(raw);
                    self.set_smart_value(state, obj, val);
                }
                return Ok(());
            }
            self.generic_call(state, e, Some(fd), &args);
            return Ok(());
        }
        self.generic_call(state, e, None, &args);
        Ok(())
    }

    fn transfer_member_call(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        base: ExprId,
        method: DeclId,
        args: Vec<ExprId>,
    ) -> Result<(), AnalysisError> {
        let tu = self.tu;
        let base_ty = tu.non_reference(tu.expr(base).ty);

        if tu.is_smart_pointer(base_ty) {
            if self.transfer_smart_member_call(state, e, base, method, &args) {
                return Ok(());
            }
        }

        let obj = state.env.expr_locs.get(&base).copied();
        if let (Some(obj), Some(m)) = (obj, tu.function(method)) {
            // Accessor bodies (`return this->field;`) read the field value.
            if let Some(field) = m.accessor_field {
                if let DeclKind::Field(fd) = &tu.decl(field).kind {
                    let fty = tu.non_reference(fd.ty);
                    let floc = self.arena.field_loc(obj, field, fty);
                    let val = match state.env.store.get(&floc) {
                        Some(&v) => v,
                        None => {
                            let outer = self.outer_sn(e);
                            let v = self.fresh_pointer(
                                fty,
                                outer,
                                Some(Slot {
                                    decl: field,
                                    index: 0,
                                }),
                            );
                            state.env.store.insert(floc, v);
                            v
                        }
                    };
                    state.env.expr_vals.insert(e, val);
                    return Ok(());
                }
            }
            // Const methods returning a pointer: one stable value per
            // (object, method), until a non-const call invalidates it.
            if m.is_const
                && args.is_empty()
                && tu.is_raw_pointer(tu.expr(e).ty)
                && !tu.expr(e).glvalue
            {
                let key = (obj, method);
                let val = match state.const_returns.get(&key) {
                    Some(&v) => v,
                    None => {
                        let outer = self.outer_sn(e);
                        let v = self.fresh_pointer(
                            tu.expr(e).ty,
                            outer,
                            Some(Slot {
                                decl: method,
                                index: 0,
                            }),
                        );
                        state.const_returns.insert(key, v);
                        v
                    }
                };
                state.env.expr_vals.insert(e, val);
                return Ok(());
            }
            // A non-const call may overwrite any pointer field of the object.
            if !m.is_const {
                let rec_ty = self.arena.loc_ty(obj);
                if let TypeKind::Record(r) = &tu.ty(tu.non_reference(rec_ty)).kind {
                    for &fdecl in &r.fields {
                        if let DeclKind::Field(fd) = &tu.decl(fdecl).kind {
                            let fty = tu.non_reference(fd.ty);
                            if tu.is_raw_pointer(fty) {
                                let floc = self.arena.field_loc(obj, fdecl, fty);
                                let fresh = self.fresh_pointer(fty, None, None);
                                state.env.store.insert(floc, fresh);
                            }
                        }
                    }
                }
                state.const_returns.retain(|(loc, _), _| *loc != obj);
            }
        }
        self.generic_call(state, e, Some(method), &args);
        Ok(())
    }

    /// Smart-pointer member operations. Returns false when the method is not
    /// one of the modeled operations.
    fn transfer_smart_member_call(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        base: ExprId,
        method: DeclId,
        args: &[ExprId],
    ) -> bool {
        let tu = self.tu;
        let Some(obj) = state.env.expr_locs.get(&base).copied() else {
            return false;
        };
        let base_ty = tu.non_reference(tu.expr(base).ty);
        let Some(raw) = tu.smart_ptr_raw(base_ty) else {
            return false;
        };
        match tu.decl(method).name.as_str() {
            "release" => {
                if let Some(v) = self.smart_value(state, obj) {
                    state.env.expr_vals.insert(e, v);
                }
                let null = self.null_pointer_val(raw);
                self.set_smart_value(state, obj, null);
                true
            }
            "reset" => {
                let null_like = match args.first() {
                    None => true,
                    Some(&a) => matches!(tu.ty(tu.expr(a).ty).kind, TypeKind::Nullptr),
                };
                let val = if null_like {
                    self.null_pointer_val(raw)
                } else {
                    match state.env.expr_vals.get(&args[0]) {
                        Some(&v) => v,
                        None => return true,
                    }
                };
                self.set_smart_value(state, obj, val);
                true
            }
            "get" => {
                if let Some(v) = self.smart_value(state, obj) {
                    state.env.expr_vals.insert(e, v);
                }
                true
            }
            "swap" => {
                if let Some(&other_expr) = args.first() {
                    if let Some(other) = state.env.expr_locs.get(&other_expr).copied() {
                        self.swap_smart(state, obj, other);
                    }
                }
                true
            }
            _ => false,
        }
    }

    fn transfer_operator_call(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        method: DeclId,
        op: String,
        args: Vec<ExprId>,
    ) -> Result<(), AnalysisError> {
        let tu = self.tu;
        let obj_expr = args.first().copied();
        let obj_ty = obj_expr.map(|a| tu.non_reference(tu.expr(a).ty));
        let is_smart = obj_ty.map(|t| tu.is_smart_pointer(t)).unwrap_or(false);

        if is_smart {
            let obj = obj_expr.and_then(|a| state.env.expr_locs.get(&a).copied());
            match (op.as_str(), obj) {
                ("=", Some(obj)) => {
                    self.transfer_smart_assignment(state, e, obj, method, &args);
                    return Ok(());
                }
                ("*", Some(obj)) | ("[]", Some(obj)) => {
                    if let Some(v) = self.smart_value(state, obj) {
                        if let Value::Pointer(p) = self.arena.val(v) {
                            state.env.expr_locs.insert(e, p.pointee);
                        }
                    }
                    return Ok(());
                }
                ("->", Some(obj)) => {
                    if let Some(v) = self.smart_value(state, obj) {
                        state.env.expr_vals.insert(e, v);
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        let rest: Vec<ExprId> = args.iter().skip(1).copied().collect();
        self.generic_call(state, e, Some(method), &rest);
        Ok(())
    }

    fn transfer_smart_assignment(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        obj: LocId,
        method: DeclId,
        args: &[ExprId],
    ) {
        let tu = self.tu;
        let obj_ty = self.arena.loc_ty(obj);
        let Some(raw) = tu.smart_ptr_raw(tu.non_reference(obj_ty)) else {
            return;
        };
        let Some(&rhs) = args.get(1) else {
            return;
        };
        let rhs_ty = tu.non_reference(tu.expr(rhs).ty);

        if matches!(tu.ty(rhs_ty).kind, TypeKind::Nullptr) {
            let null = self.null_pointer_val(raw);
            self.set_smart_value(state, obj, null);
        } else if tu.is_smart_pointer(rhs_ty) {
            let src = state.env.expr_locs.get(&rhs).copied();
            if let Some(src) = src {
                if let Some(v) = self.smart_value(state, src) {
                    self.set_smart_value(state, obj, v);
                }
                // Move assignment nulls out the source.
                let is_move = tu
                    .function(method)
                    .and_then(|m| m.params.first())
                    .map(|p| matches!(tu.ty(p.ty).kind, TypeKind::Reference { rvalue: true, .. }))
                    .unwrap_or(false);
                if is_move {
                    let null = self.null_pointer_val(raw);
                    self.set_smart_value(state, src, null);
                }
            }
        }
        state.env.expr_locs.insert(e, obj);
    }

    fn transfer_smart_construct(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        ty: TypeId,
        ctor: Option<DeclId>,
        args: &[ExprId],
    ) {
        let tu = self.tu;
        let obj = self.result_object_loc(state, e);
        let Some(raw) = tu.smart_ptr_raw(ty) else {
            return;
        };

        let Some(&a0) = args.first() else {
            // Default constructor.
            let null = self.null_pointer_val(raw);
            self.set_smart_value(state, obj, null);
            return;
        };
        let a0_ty = tu.non_reference(tu.expr(a0).ty);

        if matches!(tu.ty(a0_ty).kind, TypeKind::Nullptr) {
            let null = self.null_pointer_val(raw);
            self.set_smart_value(state, obj, null);
        } else if tu.is_raw_pointer(a0_ty) {
            if let Some(&v) = state.env.expr_vals.get(&a0) {
                self.set_smart_value(state, obj, v);
            }
        } else if tu.is_smart_pointer(a0_ty) {
            let src = state.env.expr_locs.get(&a0).copied();
            let aliasing = args.len() == 2
                && tu.is_raw_pointer(tu.non_reference(tu.expr(args[1]).ty));
            if aliasing {
                if let Some(&v) = state.env.expr_vals.get(&args[1]) {
                    self.set_smart_value(state, obj, v);
                }
            } else if let Some(src) = src {
                if let Some(v) = self.smart_value(state, src) {
                    self.set_smart_value(state, obj, v);
                }
            }
            // Move construction nulls out the source.
            let is_move = ctor
                .and_then(|c| tu.function(c))
                .and_then(|m| m.params.first())
                .map(|p| matches!(tu.ty(p.ty).kind, TypeKind::Reference { rvalue: true, .. }))
                .unwrap_or(false);
            if is_move {
                if let Some(src) = src {
                    let null = self.null_pointer_val(raw);
                    self.set_smart_value(state, src, null);
                }
            }
        } else if is_weak_ptr(tu, a0_ty) {
            // Constructing from a weak_ptr throws on empty, so the result is
            // non-null whenever the constructor returns.
            let val = self.nonnull_pointer_val(raw);
            self.set_smart_value(state, obj, val);
        }
    }

    /// Shared handling for any call: values for pointer-returning calls and
    /// the output-parameter heuristic.
    fn generic_call(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        callee: Option<DeclId>,
        args: &[ExprId],
    ) {
        let tu = self.tu;
        let expr = tu.expr(e);
        let origin = callee.map(|d| Slot { decl: d, index: 0 });

        if expr.glvalue {
            // Reference-returning call: storage so that taking a pointer to
            // the result produces a value we can track.
            let vty = tu.non_reference(expr.ty);
            let loc = self.result_loc(e, vty);
            state.env.expr_locs.insert(e, loc);
            if tu.is_raw_pointer(vty) {
                let outer = self.outer_sn(e);
                let val = self.fresh_pointer(vty, outer, origin);
                state.env.store.insert(loc, val);
            }
        } else if tu.is_raw_pointer(expr.ty) {
            if !state.env.expr_vals.contains_key(&e) {
                let outer = self.outer_sn(e);
                let val = self.fresh_pointer(expr.ty, outer, origin);
                state.env.expr_vals.insert(e, val);
            }
        } else if tu.is_smart_pointer(expr.ty) {
            let obj = self.result_object_loc(state, e);
            if let Some(raw) = tu.smart_ptr_raw(expr.ty) {
                let outer = self.outer_sn(e);
                let val = self.fresh_pointer(raw, outer, origin);
                self.set_smart_value_if_absent(state, obj, val);
            }
        }

        // Output parameters with unknown inner nullability may be
        // overwritten by the callee.
        if let Some(fd) = callee.and_then(|d| tu.function(d)) {
            if fd.params.len() == args.len() {
                let param_tys: Vec<TypeId> = fd.params.iter().map(|p| p.ty).collect();
                for (i, &arg) in args.iter().enumerate() {
                    self.output_param(state, arg, param_tys[i]);
                }
            }
        }
    }

    /// A non-const pointer/reference to a pointer of unspecified nullability
    /// is assumed to be overwritten with a fresh unknown pointer.
    fn output_param(&mut self, state: &mut BlockState, arg: ExprId, param_ty: TypeId) {
        let tu = self.tu;
        let (inner, loc) = match &tu.ty(param_ty).kind {
            TypeKind::Pointer {
                pointee,
                const_pointee: false,
                ..
            } if tu.is_raw_pointer(*pointee) => {
                let Some(p) = self.pointer_of(state, arg) else {
                    return;
                };
                (*pointee, p.pointee)
            }
            TypeKind::Reference {
                referent,
                const_referent: false,
                ..
            } if tu.is_raw_pointer(*referent) => {
                let Some(&l) = state.env.expr_locs.get(&arg) else {
                    return;
                };
                (*referent, l)
            }
            _ => return,
        };
        let inner_outer = nullability_from_type(tu, inner, self.default_kind())
            .first()
            .map(|sn| sn.concrete())
            .unwrap_or(NullabilityKind::Unspecified);
        if inner_outer != NullabilityKind::Unspecified {
            return;
        }
        let fresh = self.fresh_pointer(inner, None, None);
        state.env.store.insert(loc, fresh);
    }

    // ── Smart pointer plumbing ───────────────────────────────────────────

    pub(crate) fn result_object_loc(&mut self, state: &mut BlockState, e: ExprId) -> LocId {
        if let Some(&l) = state.env.expr_locs.get(&e) {
            return l;
        }
        let l = self.result_loc(e, self.tu.non_reference(self.tu.expr(e).ty));
        state.env.expr_locs.insert(e, l);
        l
    }

    /// The value of a smart pointer object's synthetic raw-pointer field,
    /// lazily initialized from the object's type annotation.
    pub(crate) fn smart_value(&mut self, state: &mut BlockState, obj: LocId) -> Option<ValId> {
        let tu = self.tu;
        let obj_ty = tu.non_reference(self.arena.loc_ty(obj));
        let raw = tu.smart_ptr_raw(obj_ty)?;
        let synth = self.arena.synth_loc(obj, raw);
        if let Some(&v) = state.env.store.get(&synth) {
            return Some(v);
        }
        let outer = nullability_from_type(tu, obj_ty, self.default_kind())
            .first()
            .copied();
        let v = self.fresh_pointer(raw, outer, None);
        state.env.store.insert(synth, v);
        Some(v)
    }

    fn set_smart_value(&mut self, state: &mut BlockState, obj: LocId, val: ValId) {
        let tu = self.tu;
        let obj_ty = tu.non_reference(self.arena.loc_ty(obj));
        if let Some(raw) = tu.smart_ptr_raw(obj_ty) {
            let synth = self.arena.synth_loc(obj, raw);
            state.env.store.insert(synth, val);
        }
    }

    fn set_smart_value_if_absent(&mut self, state: &mut BlockState, obj: LocId, val: ValId) {
        let tu = self.tu;
        let obj_ty = tu.non_reference(self.arena.loc_ty(obj));
        if let Some(raw) = tu.smart_ptr_raw(obj_ty) {
            let synth = self.arena.synth_loc(obj, raw);
            state.env.store.entry(synth).or_insert(val);
        }
    }

    fn swap_smart(&mut self, state: &mut BlockState, a: LocId, b: LocId) {
        let va = self.smart_value(state, a);
        let vb = self.smart_value(state, b);
        if let Some(vb) = vb {
            self.set_smart_value(state, a, vb);
        }
        if let Some(va) = va {
            self.set_smart_value(state, b, va);
        }
    }

    /// A pointer value known to be null.
    pub(crate) fn null_pointer_val(&mut self, ty: TypeId) -> ValId {
        self.fresh_pointer(
            ty,
            Some(SymbolicNullability::Concrete(NullabilityKind::Nullable)),
            None,
        )
    }

    /// A pointer value known to be non-null.
    pub(crate) fn nonnull_pointer_val(&mut self, ty: TypeId) -> ValId {
        self.fresh_pointer(
            ty,
            Some(SymbolicNullability::Concrete(NullabilityKind::Nonnull)),
            None,
        )
    }

}

fn is_weak_ptr(tu: &TranslationUnit, ty: TypeId) -> bool {
    matches!(&tu.ty(ty).kind, TypeKind::Record(r) if r.name.contains("weak_ptr"))
}
