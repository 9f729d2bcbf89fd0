//! Evidence collection: the flow-sensitive analysis re-run in inference
//! mode, plus declaration-driven evidence.

use nullguard_check::analysis::{AnalysisError, FunctionAnalysis, Site};
use nullguard_check::env::{BlockState, Slot};
use nullguard_check::tnv::nullability_from_type;
use nullguard_ir::ir::*;

use crate::aggregate::Aggregator;
use crate::evidence::EvidenceKind;

/// Run the flow-sensitive analysis over one function and emit evidence at
/// every site the diagnoser would examine. The function's parameters carry
/// fresh symbolic nullability so the body's commitments are observable.
pub fn collect_function_evidence(
    fa: &mut FunctionAnalysis<'_>,
    agg: &mut Aggregator,
) -> Result<(), AnalysisError> {
    fa.assign_symbolic_params();
    let fix = fa.run()?;
    let rpo = fa.cfg.reverse_postorder();
    for bid in rpo {
        let Some(block) = fa.cfg.block(bid) else {
            continue;
        };
        let mut state = if bid == 0 {
            fix.entry.clone()
        } else {
            fa.merge_predecessors(bid, &fix.out_states)?
        };
        for stmt in &block.stmts {
            let sites = fa.walk_stmt(&mut state, stmt)?;
            collect_stmt(fa, &state, stmt, agg);
            for site in sites {
                collect_site(fa, &mut state, site, agg);
            }
        }
        if let Some(cond) = block.condition {
            let mut sites = Vec::new();
            fa.transfer_expr(&mut state, cond, &mut sites)?;
            for site in sites {
                collect_site(fa, &mut state, site, agg);
            }
        }
    }
    Ok(())
}

fn collect_stmt(
    fa: &FunctionAnalysis<'_>,
    _state: &BlockState,
    stmt: &Stmt,
    agg: &mut Aggregator,
) {
    if let Stmt::Decl {
        decl,
        init: Some(init),
    } = stmt
    {
        assigned_from(
            fa,
            Slot {
                decl: *decl,
                index: 0,
            },
            *init,
            agg,
        );
    }
}

fn collect_site(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    site: Site,
    agg: &mut Aggregator,
) {
    let tu = fa.tu;
    match site {
        Site::Expr(e) => match &tu.expr(e).kind {
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                if tu.is_raw_pointer(tu.non_reference(tu.expr(*operand).ty)) {
                    nonnull_use(fa, state, *operand, EvidenceKind::UncheckedDereference, agg);
                }
            }
            ExprKind::Member {
                base, arrow: true, ..
            } => {
                nonnull_use(fa, state, *base, EvidenceKind::UncheckedDereference, agg);
            }
            ExprKind::ArraySubscript { base, .. } => {
                if tu.is_raw_pointer(tu.non_reference(tu.expr(*base).ty)) {
                    nonnull_use(
                        fa,
                        state,
                        *base,
                        EvidenceKind::ArithmeticOrArraySubscript,
                        agg,
                    );
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Add | BinaryOp::Sub,
                lhs,
                rhs,
            } => {
                for &side in [lhs, rhs].iter() {
                    if tu.is_raw_pointer(tu.non_reference(tu.expr(*side).ty)) {
                        nonnull_use(
                            fa,
                            state,
                            *side,
                            EvidenceKind::ArithmeticOrArraySubscript,
                            agg,
                        );
                    }
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Assign,
                lhs,
                rhs,
            } => {
                if let Some(slot) = lvalue_slot(tu, *lhs) {
                    assigned_from(fa, slot, *rhs, agg);
                }
            }
            ExprKind::Call { callee, args } => {
                if let Some((fd, _)) = fa.direct_callee(*callee) {
                    collect_arguments(fa, state, fd, args.clone(), agg);
                }
            }
            ExprKind::MemberCall { method, args, .. } => {
                collect_arguments(fa, state, *method, args.clone(), agg);
            }
            ExprKind::OperatorCall { method, args, .. } => {
                let rest: Vec<ExprId> = args.iter().skip(1).copied().collect();
                collect_arguments(fa, state, *method, rest, agg);
            }
            ExprKind::Construct {
                ctor: Some(ctor),
                args,
                ..
            } => {
                collect_arguments(fa, state, *ctor, args.clone(), agg);
            }
            _ => {}
        },
        Site::Return { value } => {
            let slot = Slot {
                decl: fa.func,
                index: 0,
            };
            if tu.is_raw_pointer(tu.non_reference(tu.expr(value).ty)) {
                let kind = match fa.outer_kind(value) {
                    Some(NullabilityKind::Nullable) => EvidenceKind::NullableReturn,
                    Some(NullabilityKind::Nonnull) => EvidenceKind::NonnullReturn,
                    _ => {
                        if provably_nonnull(fa, state, value) {
                            EvidenceKind::NonnullReturn
                        } else {
                            EvidenceKind::UnknownReturn
                        }
                    }
                };
                agg.add(slot, kind, loc(tu, value));

                // A Nonnull-declared return constrains the returned value.
                let mut v = nullability_from_type(tu, fa.fdecl.ret, fa.default_kind());
                fa.nfs.apply_slot_override((fa.func, 0), &mut v);
                if v.first().map(|sn| sn.concrete()) == Some(NullabilityKind::Nonnull) {
                    nonnull_use(fa, state, value, EvidenceKind::UncheckedDereference, agg);
                }
            }
        }
        Site::MemberInit { field, init } => {
            assigned_from(
                fa,
                Slot {
                    decl: field,
                    index: 0,
                },
                init,
                agg,
            );
            if let DeclKind::Field(fd) = &tu.decl(field).kind {
                let v = nullability_from_type(tu, fd.ty, fa.default_for_decl(field));
                if v.first().map(|sn| sn.concrete()) == Some(NullabilityKind::Nonnull) {
                    nonnull_use(fa, state, init, EvidenceKind::UncheckedDereference, agg);
                }
            }
        }
        Site::Abort { arg } => {
            if let Some(ptr) = fa.pointer_of(state, arg) {
                if let Some(slot) = ptr.origin {
                    agg.add(slot, EvidenceKind::AbortIfNull, loc(tu, arg));
                }
            }
        }
    }
}

/// Argument evidence: one event about the callee's parameter slot, and one
/// about the argument's own slot when the parameter demands non-null.
fn collect_arguments(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    callee: DeclId,
    args: Vec<ExprId>,
    agg: &mut Aggregator,
) {
    let tu = fa.tu;
    let Some(f) = tu.function(callee) else {
        return;
    };
    let params: Vec<(TypeId, u32)> = f
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| (p.ty, i as u32 + 1))
        .collect();
    let n = params.len().min(args.len());
    for i in 0..n {
        let (pty, slot_index) = params[i];
        let arg = args[i];
        if !tu.is_raw_pointer(tu.non_reference(tu.expr(arg).ty)) {
            continue;
        }
        let slot = Slot {
            decl: callee,
            index: slot_index,
        };
        let kind = match fa.outer_kind(arg) {
            Some(NullabilityKind::Nullable) => EvidenceKind::NullableArgument,
            Some(NullabilityKind::Nonnull) => EvidenceKind::NonnullArgument,
            _ => {
                if provably_nonnull(fa, state, arg) {
                    EvidenceKind::NonnullArgument
                } else {
                    EvidenceKind::UnknownArgument
                }
            }
        };
        agg.add(slot, kind, loc(tu, arg));

        let mut v = nullability_from_type(tu, pty, fa.default_for_decl(callee));
        fa.nfs.apply_slot_override((callee, slot_index), &mut v);
        if v.first().map(|sn| sn.concrete()) == Some(NullabilityKind::Nonnull) {
            nonnull_use(fa, state, arg, EvidenceKind::UncheckedDereference, agg);
        }
    }
}

/// The value of `e` reached a position requiring non-null: evidence for the
/// slot it originated from, unless the flow condition already proves it.
fn nonnull_use(
    fa: &mut FunctionAnalysis<'_>,
    state: &BlockState,
    e: ExprId,
    kind: EvidenceKind,
    agg: &mut Aggregator,
) {
    let Some(ptr) = fa.pointer_of(state, e) else {
        return;
    };
    let Some(slot) = ptr.origin else {
        return;
    };
    if let Ok(true) = fa.may_be_null(state, &ptr) {
        agg.add(slot, kind, loc(fa.tu, e));
    }
}

fn provably_nonnull(fa: &mut FunctionAnalysis<'_>, state: &BlockState, e: ExprId) -> bool {
    match fa.pointer_of(state, e) {
        Some(ptr) => fa.provably_nonnull(state, &ptr).unwrap_or(false),
        None => false,
    }
}

/// Assignment-shaped evidence for a variable or field slot.
fn assigned_from(fa: &FunctionAnalysis<'_>, slot: Slot, rhs: ExprId, agg: &mut Aggregator) {
    let kind = match fa.outer_kind(rhs) {
        Some(NullabilityKind::Nullable) => EvidenceKind::AssignedFromNullable,
        Some(NullabilityKind::Nonnull) => EvidenceKind::AssignedFromNonnull,
        _ => return,
    };
    agg.add(slot, kind, loc(fa.tu, rhs));
}

fn lvalue_slot(tu: &TranslationUnit, e: ExprId) -> Option<Slot> {
    match &tu.expr(e).kind {
        ExprKind::Member { field, .. } => Some(Slot {
            decl: *field,
            index: 0,
        }),
        ExprKind::DeclRef { decl, .. } => match tu.decl(*decl).kind {
            DeclKind::Var(_) => Some(Slot {
                decl: *decl,
                index: 0,
            }),
            _ => None,
        },
        _ => None,
    }
}

fn loc(tu: &TranslationUnit, e: ExprId) -> String {
    match &tu.expr(e).span {
        Some(span) => span.to_string(),
        None => tu.main_file.clone(),
    }
}

/// Evidence that does not require running the flow analysis: existing
/// annotations and default member initializers.
pub fn collect_declaration_evidence(tu: &TranslationUnit, agg: &mut Aggregator) {
    for decl in &tu.decls {
        let default = decl
            .span
            .as_ref()
            .and_then(|s| tu.pragma_default(&s.file));
        let location = decl
            .span
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| tu.main_file.clone());
        match &decl.kind {
            DeclKind::Function(f) => {
                annotation_evidence(tu, agg, decl.id, 0, f.ret, default, &location);
                for (i, p) in f.params.iter().enumerate() {
                    annotation_evidence(tu, agg, decl.id, i as u32 + 1, p.ty, default, &location);
                }
            }
            DeclKind::Var(v) => {
                annotation_evidence(tu, agg, decl.id, 0, v.ty, default, &location);
            }
            DeclKind::Field(fd) => {
                annotation_evidence(tu, agg, decl.id, 0, fd.ty, default, &location);
                if let Some(init) = fd.default_init {
                    let null_constant = matches!(
                        tu.expr(init).kind,
                        ExprKind::NullLiteral
                            | ExprKind::Cast {
                                kind: CastKind::NullToPointer,
                                ..
                            }
                    );
                    if null_constant {
                        agg.add(
                            Slot {
                                decl: decl.id,
                                index: 0,
                            },
                            EvidenceKind::GcConstructorNullable,
                            location.clone(),
                        );
                    }
                }
            }
        }
    }
}

fn annotation_evidence(
    tu: &TranslationUnit,
    agg: &mut Aggregator,
    decl: DeclId,
    index: u32,
    ty: TypeId,
    default: Option<NullabilityKind>,
    location: &str,
) {
    if !tu.is_raw_pointer(tu.non_reference(ty)) && !tu.is_smart_pointer(tu.non_reference(ty)) {
        return;
    }
    let outer = nullability_from_type(tu, ty, default)
        .first()
        .map(|sn| sn.concrete());
    let kind = match outer {
        Some(NullabilityKind::Nonnull) => EvidenceKind::Nonnull,
        Some(NullabilityKind::Nullable) => EvidenceKind::Nullable,
        _ => return,
    };
    agg.add(Slot { decl, index }, kind, location.to_string());
}
