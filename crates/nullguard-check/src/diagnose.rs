//! Diagnoser: a second pass over the converged dataflow states.

use std::collections::HashMap;

use nullguard_diagnostics::{DiagContext, Diagnostic, DiagnosticBuilder, ErrorCode};
use nullguard_ir::ir::*;

use crate::analysis::{AnalysisConfig, AnalysisError, FunctionAnalysis, Site};
use crate::env::BlockState;
use crate::tnv::nullability_from_type;

/// Checker output for a whole translation unit.
#[derive(Debug, Default)]
pub struct TuReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Functions whose analysis was interrupted (budget exhausted, no CFG).
    pub interrupted: Vec<(String, AnalysisError)>,
    pub functions_analyzed: usize,
}

/// Check every function in the TU. Recoverable per-function failures are
/// recorded and the remaining functions still run.
pub fn diagnose_tu(tu: &TranslationUnit, config: AnalysisConfig) -> TuReport {
    let mut report = TuReport::default();
    let funcs: Vec<DeclId> = tu.functions().map(|d| d.id).collect();
    for func in funcs {
        let Some(f) = tu.function(func) else { continue };
        if f.is_templated {
            continue;
        }
        report.functions_analyzed += 1;
        match diagnose_function(tu, func, config) {
            Ok(diags) => report.diagnostics.extend(diags),
            Err(err) => {
                tracing::warn!(
                    function = %tu.decl(func).name,
                    error = %err,
                    "analysis interrupted"
                );
                report.interrupted.push((tu.decl(func).name.clone(), err));
            }
        }
    }
    report
}

/// Check a single function: default-argument declarations first (exactly
/// once per declaration), then the flow-sensitive body pass.
pub fn diagnose_function(
    tu: &TranslationUnit,
    func: DeclId,
    config: AnalysisConfig,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    let Some(f) = tu.function(func) else {
        return Ok(Vec::new());
    };
    if f.is_templated {
        return Ok(Vec::new());
    }
    let mut diags = default_arg_diagnostics(tu, func, f);
    if f.body.is_none() {
        return Ok(diags);
    }
    let mut fa = FunctionAnalysis::new(tu, func, config, HashMap::new())?;
    diags.extend(run_diagnoser(&mut fa)?);
    Ok(diags)
}

/// Replay the CFG against the fixed-point states, emitting diagnostics at
/// every matching site.
pub fn run_diagnoser(fa: &mut FunctionAnalysis<'_>) -> Result<Vec<Diagnostic>, AnalysisError> {
    let fix = fa.run()?;
    let mut diags = Vec::new();
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
            for site in sites {
                diagnose_site(fa, &mut state, site, &mut diags);
            }
        }
        if let Some(cond) = block.condition {
            let mut sites = Vec::new();
            fa.transfer_expr(&mut state, cond, &mut sites)?;
            for site in sites {
                diagnose_site(fa, &mut state, site, &mut diags);
            }
        }
    }
    Ok(diags)
}

fn diagnose_site(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    site: Site,
    out: &mut Vec<Diagnostic>,
) {
    let tu = fa.tu;
    match site {
        Site::Expr(e) => match &tu.expr(e).kind {
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                if tu.is_raw_pointer(tu.non_reference(tu.expr(*operand).ty)) {
                    out.extend(nonnull_expected(
                        fa,
                        state,
                        *operand,
                        DiagContext::NullableDereference,
                        None,
                    ));
                }
            }
            ExprKind::ArraySubscript { base, .. } => {
                if tu.is_raw_pointer(tu.non_reference(tu.expr(*base).ty)) {
                    out.extend(nonnull_expected(
                        fa,
                        state,
                        *base,
                        DiagContext::NullableDereference,
                        None,
                    ));
                }
            }
            ExprKind::Member {
                base, arrow: true, ..
            } => {
                out.extend(nonnull_expected(
                    fa,
                    state,
                    *base,
                    DiagContext::NullableDereference,
                    None,
                ));
            }
            ExprKind::OperatorCall { method, op, args }
                if matches!(op.as_str(), "*" | "[]" | "->") =>
            {
                let smart = args
                    .first()
                    .map(|&a| tu.is_smart_pointer(tu.non_reference(tu.expr(a).ty)))
                    .unwrap_or(false);
                if smart {
                    out.extend(smart_deref_expected(fa, state, args[0]));
                } else {
                    let rest: Vec<ExprId> = args.iter().skip(1).copied().collect();
                    diagnose_arguments(fa, state, *method, &rest, out);
                }
            }
            ExprKind::AssertNullability { expected, arg } => {
                out.extend(diagnose_assert(fa, e, expected, *arg));
            }
            ExprKind::Call { callee, args } => {
                // A call through a function pointer checks the callee first.
                if tu.is_raw_pointer(tu.non_reference(tu.expr(*callee).ty)) {
                    let callee_diags =
                        nonnull_expected(fa, state, *callee, DiagContext::Other, None);
                    if !callee_diags.is_empty() {
                        out.extend(callee_diags);
                        return;
                    }
                }
                if let Some((fd, _)) = fa.direct_callee(*callee) {
                    diagnose_arguments(fa, state, fd, args, out);
                }
            }
            ExprKind::MemberCall { method, args, .. } => {
                diagnose_arguments(fa, state, *method, args, out);
            }
            ExprKind::OperatorCall { method, args, .. } => {
                // The implicit object argument is not a parameter.
                let rest: Vec<ExprId> = args.iter().skip(1).copied().collect();
                diagnose_arguments(fa, state, *method, &rest, out);
            }
            ExprKind::Construct {
                ctor: Some(ctor),
                args,
                ..
            } => {
                diagnose_arguments(fa, state, *ctor, args, out);
            }
            _ => {}
        },
        Site::Return { value } => {
            let ret = fa.fdecl.ret;
            if !tu.is_raw_pointer(tu.non_reference(ret)) {
                return;
            }
            let mut v = nullability_from_type(tu, ret, fa.default_kind());
            fa.nfs.apply_slot_override((fa.func, 0), &mut v);
            if v.first().map(|sn| sn.concrete()) == Some(NullabilityKind::Nonnull) {
                out.extend(nonnull_expected(
                    fa,
                    state,
                    value,
                    DiagContext::ReturnValue,
                    None,
                ));
            }
        }
        Site::MemberInit { field, init } => {
            let DeclKind::Field(fd) = &tu.decl(field).kind else {
                return;
            };
            if !tu.is_raw_pointer(tu.non_reference(fd.ty)) {
                return;
            }
            let v = nullability_from_type(tu, fd.ty, fa.default_for_decl(field));
            if v.first().map(|sn| sn.concrete()) == Some(NullabilityKind::Nonnull) {
                out.extend(nonnull_expected(
                    fa,
                    state,
                    init,
                    DiagContext::Initializer,
                    None,
                ));
            }
        }
        Site::Abort { .. } => {}
    }
}

/// Does `e` violate the expectation that it is non-null?
fn nonnull_expected(
    fa: &mut FunctionAnalysis<'_>,
    state: &BlockState,
    e: ExprId,
    context: DiagContext,
    param_name: Option<&str>,
) -> Vec<Diagnostic> {
    let Some(ptr) = fa.pointer_of(state, e) else {
        return vec![build(fa, e, ErrorCode::Untracked, context, param_name)];
    };
    match fa.may_be_null(state, &ptr) {
        Ok(true) => vec![build(fa, e, ErrorCode::ExpectedNonnull, context, param_name)],
        Ok(false) => vec![],
        // A query past the solver budget is reported conservatively.
        Err(_) => vec![build(fa, e, ErrorCode::Untracked, context, param_name)],
    }
}

fn smart_deref_expected(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    obj_expr: ExprId,
) -> Vec<Diagnostic> {
    let obj = state.env.expr_locs.get(&obj_expr).copied();
    let val = obj.and_then(|o| fa.smart_value(state, o));
    let ptr = match val.map(|v| fa.arena.val(v)) {
        Some(crate::env::Value::Pointer(p)) => p,
        _ => {
            return vec![build(
                fa,
                obj_expr,
                ErrorCode::Untracked,
                DiagContext::NullableDereference,
                None,
            )]
        }
    };
    match fa.may_be_null(state, &ptr) {
        Ok(true) => vec![build(
            fa,
            obj_expr,
            ErrorCode::ExpectedNonnull,
            DiagContext::NullableDereference,
            None,
        )],
        Ok(false) => vec![],
        Err(_) => vec![build(
            fa,
            obj_expr,
            ErrorCode::Untracked,
            DiagContext::NullableDereference,
            None,
        )],
    }
}

/// Arguments against the callee's parameter nullability. Variadic tails are
/// unchecked; inner slots are not yet examined.
fn diagnose_arguments(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    callee: DeclId,
    args: &[ExprId],
    out: &mut Vec<Diagnostic>,
) {
    let tu = fa.tu;
    let Some(f) = tu.function(callee) else {
        return;
    };
    let n = f.params.len().min(args.len());
    for i in 0..n {
        let pty = f.params[i].ty;
        let vty = tu.non_reference(pty);
        let is_raw = tu.is_raw_pointer(vty);
        let is_smart = tu.is_smart_pointer(vty);
        if !is_raw && !is_smart {
            continue;
        }
        let mut v = nullability_from_type(tu, pty, fa.default_for_decl(callee));
        fa.nfs.apply_slot_override((callee, i as u32 + 1), &mut v);
        if v.first().map(|sn| sn.concrete()) != Some(NullabilityKind::Nonnull) {
            continue;
        }
        let name = f.params[i].name.clone();
        if is_smart {
            out.extend(smart_arg_expected(fa, state, args[i], &name));
        } else {
            out.extend(nonnull_expected(
                fa,
                state,
                args[i],
                DiagContext::FunctionArgument,
                Some(&name),
            ));
        }
    }
}

fn smart_arg_expected(
    fa: &mut FunctionAnalysis<'_>,
    state: &mut BlockState,
    arg: ExprId,
    param_name: &str,
) -> Vec<Diagnostic> {
    let obj = state.env.expr_locs.get(&arg).copied();
    let val = obj.and_then(|o| fa.smart_value(state, o));
    let ptr = match val.map(|v| fa.arena.val(v)) {
        Some(crate::env::Value::Pointer(p)) => p,
        _ => {
            return vec![build(
                fa,
                arg,
                ErrorCode::Untracked,
                DiagContext::FunctionArgument,
                Some(param_name),
            )]
        }
    };
    match fa.may_be_null(state, &ptr) {
        Ok(true) => vec![build(
            fa,
            arg,
            ErrorCode::ExpectedNonnull,
            DiagContext::FunctionArgument,
            Some(param_name),
        )],
        Ok(false) => vec![],
        Err(_) => vec![build(
            fa,
            arg,
            ErrorCode::Untracked,
            DiagContext::FunctionArgument,
            Some(param_name),
        )],
    }
}

/// `__assert_nullability<K...>(e)`: the computed vector must equal the
/// expected kinds exactly.
fn diagnose_assert(
    fa: &FunctionAnalysis<'_>,
    e: ExprId,
    expected: &[NullabilityKind],
    arg: ExprId,
) -> Vec<Diagnostic> {
    match fa.nfs.expr_nullability(arg) {
        None => vec![build(fa, e, ErrorCode::Untracked, DiagContext::Other, None)],
        Some(v) => {
            let got: Vec<NullabilityKind> = v.iter().map(|sn| sn.concrete()).collect();
            if got == expected {
                vec![]
            } else {
                tracing::debug!(?expected, ?got, "nullability assertion failed");
                vec![build(fa, e, ErrorCode::AssertFailed, DiagContext::Other, None)]
            }
        }
    }
}

/// Per-declaration check of default argument values against `Nonnull`
/// parameters. Default arguments never appear in the CFG at call sites, so
/// this runs exactly once per declaration.
pub fn default_arg_diagnostics(
    tu: &TranslationUnit,
    func: DeclId,
    f: &FunctionDecl,
) -> Vec<Diagnostic> {
    let default = tu
        .decl(func)
        .span
        .as_ref()
        .and_then(|s| tu.pragma_default(&s.file));
    let mut diags = Vec::new();
    for p in &f.params {
        if !tu.is_raw_pointer(tu.non_reference(p.ty)) {
            continue;
        }
        let v = nullability_from_type(tu, p.ty, default);
        if v.first().map(|sn| sn.concrete()) != Some(NullabilityKind::Nonnull) {
            continue;
        }
        let Some(d) = p.default_arg else { continue };
        let dexpr = tu.expr(d);
        let null_constant = matches!(
            dexpr.kind,
            ExprKind::NullLiteral
                | ExprKind::Cast {
                    kind: CastKind::NullToPointer,
                    ..
                }
        );
        let nullable_value = nullability_from_type(tu, dexpr.ty, default)
            .first()
            .map(|sn| sn.concrete())
            == Some(NullabilityKind::Nullable);
        if null_constant || nullable_value {
            let span = span_of(tu, d);
            diags.push(
                DiagnosticBuilder::new(ErrorCode::ExpectedNonnull, DiagContext::Initializer)
                    .location(span.file.clone(), span.start_line, span.start_col)
                    .end_location(span.end_line, span.end_col)
                    .param_name(&p.name)
                    .explanation(format!(
                        "default value of parameter `{}` may be null",
                        p.name
                    ))
                    .build(),
            );
        }
    }
    diags
}

fn span_of(tu: &TranslationUnit, e: ExprId) -> Span {
    tu.expr(e)
        .span
        .clone()
        .unwrap_or_else(|| Span::new(tu.main_file.clone(), 0, 0))
}

fn build(
    fa: &FunctionAnalysis<'_>,
    e: ExprId,
    code: ErrorCode,
    context: DiagContext,
    param_name: Option<&str>,
) -> Diagnostic {
    let span = span_of(fa.tu, e);
    let mut builder = DiagnosticBuilder::new(code, context)
        .location(span.file.clone(), span.start_line, span.start_col)
        .end_location(span.end_line, span.end_col)
        .explanation(match code {
            ErrorCode::ExpectedNonnull => {
                format!("value may be null where non-null is required ({context})")
            }
            ErrorCode::Untracked => "pointer value is not modeled by the analysis".to_string(),
            ErrorCode::AssertFailed => "nullability assertion failed".to_string(),
        });
    if let Some(name) = param_name {
        builder = builder.param_name(name);
    }
    builder.build()
}
