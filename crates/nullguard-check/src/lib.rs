//! nullguard check — flow-sensitive pointer nullability analysis.
//!
//! Tracks, for every pointer value at every program point, the pair of
//! symbolic properties `(from_nullable, is_null)` and discharges dereference
//! and assignment queries to the solver facade under the flow condition.

pub mod analysis;
pub mod diagnose;
pub mod env;
pub mod lattice;
pub mod tnv;
mod transfer_type;
mod transfer_value;

pub use analysis::{AnalysisConfig, AnalysisError, FixpointStates, FunctionAnalysis, Site};
pub use diagnose::{diagnose_function, diagnose_tu, TuReport};

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use nullguard_diagnostics::{DiagContext, ErrorCode};
    use nullguard_ir::build::TuBuilder;
    use nullguard_ir::ir::*;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    /// `void f(int* p) { *p; }` — unchecked dereference of an unannotated
    /// parameter.
    #[test]
    fn test_unchecked_deref_diagnoses() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr = b.pointer(int, None);
        let f = b.function("f", void, &[("p", ptr)]);
        let pr = b.param_ref(f, 0);
        let ld = b.load(pr);
        let d = b.deref(ld);
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(0, vec![Stmt::Expr(d)])],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        assert_eq!(diags[0].code, ErrorCode::ExpectedNonnull);
        assert_eq!(diags[0].context, DiagContext::NullableDereference);
    }

    /// `void f(int* p) { if (p) *p; }` — the checked branch is clean.
    #[test]
    fn test_checked_deref_is_clean() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let bool_ty = b.bool_ty();
        let ptr = b.pointer(int, None);
        let f = b.function("f", void, &[("p", ptr)]);

        let pr = b.param_ref(f, 0);
        let ld = b.load(pr);
        let cond = b.expr(
            ExprKind::Cast {
                kind: CastKind::PointerToBoolean,
                operand: ld,
            },
            bool_ty,
        );
        let pr2 = b.param_ref(f, 0);
        let ld2 = b.load(pr2);
        let d = b.deref(ld2);

        b.set_body(
            f,
            Body {
                blocks: vec![
                    BasicBlock {
                        id: 0,
                        stmts: vec![],
                        condition: Some(cond),
                    },
                    b.block(1, vec![Stmt::Expr(d)]),
                    b.block(2, vec![]),
                ],
                edges: vec![
                    CfgEdge {
                        from: 0,
                        to: 1,
                        kind: EdgeKind::CondTrue,
                    },
                    CfgEdge {
                        from: 0,
                        to: 2,
                        kind: EdgeKind::CondFalse,
                    },
                    CfgEdge {
                        from: 1,
                        to: 2,
                        kind: EdgeKind::Unconditional,
                    },
                ],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert!(diags.is_empty(), "got: {diags:?}");
    }

    /// A `_Nonnull` parameter dereferences cleanly; a `_Nullable` one does
    /// not.
    #[test]
    fn test_annotation_controls_deref() {
        for (annotation, expect_diag) in [
            (NullabilityKind::Nonnull, false),
            (NullabilityKind::Nullable, true),
        ] {
            let mut b = TuBuilder::new();
            let int = b.int();
            let void = b.void();
            let ptr = b.pointer(int, Some(annotation));
            let f = b.function("f", void, &[("p", ptr)]);
            let pr = b.param_ref(f, 0);
            let ld = b.load(pr);
            let d = b.deref(ld);
            b.set_body(
                f,
                Body {
                    blocks: vec![b.block(0, vec![Stmt::Expr(d)])],
                    edges: vec![],
                },
            );
            let tu = b.finish();

            let diags = diagnose_function(&tu, f, config()).unwrap();
            assert_eq!(!diags.is_empty(), expect_diag, "{annotation}: {diags:?}");
        }
    }

    /// `int* f() { return nullptr; }` is clean; with a `_Nonnull` return it
    /// diagnoses the return value.
    #[test]
    fn test_return_nullptr() {
        for (annotation, expect_diag) in [(None, false), (Some(NullabilityKind::Nonnull), true)] {
            let mut b = TuBuilder::new();
            let int = b.int();
            let ret = b.pointer(int, annotation);
            let f = b.function("f", ret, &[]);
            let nl = b.null_to(ret);
            b.set_body(
                f,
                Body {
                    blocks: vec![b.block(0, vec![Stmt::Return { value: Some(nl) }])],
                    edges: vec![],
                },
            );
            let tu = b.finish();

            let diags = diagnose_function(&tu, f, config()).unwrap();
            assert_eq!(!diags.is_empty(), expect_diag, "got: {diags:?}");
            if expect_diag {
                assert_eq!(diags[0].context, DiagContext::ReturnValue);
            }
        }
    }

    /// `p == nullptr` refines both arms: the else-arm dereference is clean,
    /// the then-arm one diagnoses.
    #[test]
    fn test_null_comparison_refinement() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let bool_ty = b.bool_ty();
        let ptr = b.pointer(int, Some(NullabilityKind::Nullable));
        let f = b.function("f", void, &[("p", ptr)]);

        let pr = b.param_ref(f, 0);
        let ld = b.load(pr);
        let null = b.null_to(ptr);
        let cmp = b.expr(
            ExprKind::Binary {
                op: BinaryOp::Eq,
                lhs: ld,
                rhs: null,
            },
            bool_ty,
        );
        let pr_then = b.param_ref(f, 0);
        let ld_then = b.load(pr_then);
        let d_then = b.deref(ld_then);
        let pr_else = b.param_ref(f, 0);
        let ld_else = b.load(pr_else);
        let d_else = b.deref(ld_else);

        b.set_body(
            f,
            Body {
                blocks: vec![
                    BasicBlock {
                        id: 0,
                        stmts: vec![],
                        condition: Some(cmp),
                    },
                    b.block(1, vec![Stmt::Expr(d_then)]),
                    b.block(2, vec![Stmt::Expr(d_else)]),
                    b.block(3, vec![]),
                ],
                edges: vec![
                    CfgEdge {
                        from: 0,
                        to: 1,
                        kind: EdgeKind::CondTrue,
                    },
                    CfgEdge {
                        from: 0,
                        to: 2,
                        kind: EdgeKind::CondFalse,
                    },
                    CfgEdge {
                        from: 1,
                        to: 3,
                        kind: EdgeKind::Unconditional,
                    },
                    CfgEdge {
                        from: 2,
                        to: 3,
                        kind: EdgeKind::Unconditional,
                    },
                ],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        // Only the then-arm dereference (line of d_then) is flagged.
        let flagged_line = diags[0].location.line;
        let then_line = tu.expr(ld_then).span.as_ref().unwrap().start_line;
        let else_line = tu.expr(ld_else).span.as_ref().unwrap().start_line;
        assert_eq!(flagged_line, then_line);
        assert_ne!(flagged_line, else_line);
    }

    /// Passing a null constant to a `_Nonnull` parameter flags the argument
    /// with the parameter's name.
    #[test]
    fn test_nonnull_argument() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr_nn = b.pointer(int, Some(NullabilityKind::Nonnull));
        let fn_ty = b.function_type(void, &[ptr_nn], false);
        let g = b.function("g", void, &[("dest", ptr_nn)]);
        let f = b.function("f", void, &[]);

        let gref = b.expr(
            ExprKind::DeclRef {
                decl: g,
                template_args: vec![],
            },
            fn_ty,
        );
        let arg = b.null_to(ptr_nn);
        let call = b.expr(
            ExprKind::Call {
                callee: gref,
                args: vec![arg],
            },
            void,
        );
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(0, vec![Stmt::Expr(call)])],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        assert_eq!(diags[0].context, DiagContext::FunctionArgument);
        assert_eq!(diags[0].param_name.as_deref(), Some("dest"));
    }

    /// A null default argument on a `_Nonnull` parameter is flagged once per
    /// declaration, body or not.
    #[test]
    fn test_default_argument() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr_nn = b.pointer(int, Some(NullabilityKind::Nonnull));
        let dflt = b.null_to(ptr_nn);
        let f = b.function("f", void, &[("p", ptr_nn)]);
        b.function_mut(f).params[0].default_arg = Some(dflt);
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        assert_eq!(diags[0].code, ErrorCode::ExpectedNonnull);
        assert_eq!(diags[0].context, DiagContext::Initializer);
        assert_eq!(diags[0].param_name.as_deref(), Some("p"));
    }

    /// `__assert_nullability` compares the computed vector.
    #[test]
    fn test_assert_nullability() {
        for (expected, fails) in [
            (NullabilityKind::Nullable, false),
            (NullabilityKind::Nonnull, true),
        ] {
            let mut b = TuBuilder::new();
            let int = b.int();
            let void = b.void();
            let ptr = b.pointer(int, Some(NullabilityKind::Nullable));
            let f = b.function("f", void, &[("p", ptr)]);
            let pr = b.param_ref(f, 0);
            let ld = b.load(pr);
            let assert_e = b.expr(
                ExprKind::AssertNullability {
                    expected: vec![expected],
                    arg: ld,
                },
                void,
            );
            b.set_body(
                f,
                Body {
                    blocks: vec![b.block(0, vec![Stmt::Expr(assert_e)])],
                    edges: vec![],
                },
            );
            let tu = b.finish();

            let diags = diagnose_function(&tu, f, config()).unwrap();
            if fails {
                assert_eq!(diags.len(), 1, "got: {diags:?}");
                assert_eq!(diags[0].code, ErrorCode::AssertFailed);
            } else {
                assert!(diags.is_empty(), "got: {diags:?}");
            }
        }
    }

    /// `unique_ptr` from a factory dereferences cleanly; after `reset()` it
    /// is null again.
    #[test]
    fn test_smart_pointer_factory_and_reset() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let raw = b.pointer(int, None);
        let up = b.smart_ptr("unique_ptr", raw);
        let star = b.function("operator*", int, &[]);
        let reset = b.function("reset", void, &[]);
        let mk = b.function("make_unique", up, &[]);
        let fn_ty = b.function_type(up, &[], false);
        let f = b.function("f", void, &[]);

        let mkref = b.expr(
            ExprKind::DeclRef {
                decl: mk,
                template_args: vec![],
            },
            fn_ty,
        );
        let call = b.expr(
            ExprKind::Call {
                callee: mkref,
                args: vec![],
            },
            up,
        );
        let u = b.var("u", up);
        let uref1 = b.var_ref(u);
        let d1 = b.lvalue(
            ExprKind::OperatorCall {
                method: star,
                op: "*".into(),
                args: vec![uref1],
            },
            int,
        );
        let uref2 = b.var_ref(u);
        let reset_call = b.expr(
            ExprKind::MemberCall {
                base: uref2,
                method: reset,
                args: vec![],
            },
            void,
        );
        let uref3 = b.var_ref(u);
        let d2 = b.lvalue(
            ExprKind::OperatorCall {
                method: star,
                op: "*".into(),
                args: vec![uref3],
            },
            int,
        );

        b.set_body(
            f,
            Body {
                blocks: vec![b.block(
                    0,
                    vec![
                        Stmt::Decl {
                            decl: u,
                            init: Some(call),
                        },
                        Stmt::Expr(d1),
                        Stmt::Expr(reset_call),
                        Stmt::Expr(d2),
                    ],
                )],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        assert_eq!(diags[0].code, ErrorCode::ExpectedNonnull);
        let flagged = diags[0].location.line;
        assert_eq!(flagged, tu.expr(uref3).span.as_ref().unwrap().start_line);
    }

    /// An abort-if-null check makes the rest of the function clean.
    #[test]
    fn test_abort_if_null_refines() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr = b.pointer(int, Some(NullabilityKind::Nullable));
        let f = b.function("f", void, &[("p", ptr)]);
        let pr = b.param_ref(f, 0);
        let ld = b.load(pr);
        let pr2 = b.param_ref(f, 0);
        let ld2 = b.load(pr2);
        let d = b.deref(ld2);
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(
                    0,
                    vec![Stmt::AbortIfNull { arg: ld }, Stmt::Expr(d)],
                )],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert!(diags.is_empty(), "got: {diags:?}");
    }

    /// A loop whose body reassigns the pointer converges via widening.
    #[test]
    fn test_loop_converges() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let bool_ty = b.bool_ty();
        let ptr = b.pointer(int, None);
        let fn_ty = b.function_type(ptr, &[], false);
        let g = b.function("g", ptr, &[]);
        let f = b.function("f", void, &[("p", ptr)]);

        let pr_cond = b.param_ref(f, 0);
        let ld_cond = b.load(pr_cond);
        let cond = b.expr(
            ExprKind::Cast {
                kind: CastKind::PointerToBoolean,
                operand: ld_cond,
            },
            bool_ty,
        );
        let gref = b.expr(
            ExprKind::DeclRef {
                decl: g,
                template_args: vec![],
            },
            fn_ty,
        );
        let call = b.expr(
            ExprKind::Call {
                callee: gref,
                args: vec![],
            },
            ptr,
        );
        let pr_body = b.param_ref(f, 0);
        let assign = b.lvalue(
            ExprKind::Binary {
                op: BinaryOp::Assign,
                lhs: pr_body,
                rhs: call,
            },
            ptr,
        );

        b.set_body(
            f,
            Body {
                blocks: vec![
                    b.block(0, vec![]),
                    BasicBlock {
                        id: 1,
                        stmts: vec![],
                        condition: Some(cond),
                    },
                    b.block(2, vec![Stmt::Expr(assign)]),
                    b.block(3, vec![]),
                ],
                edges: vec![
                    CfgEdge {
                        from: 0,
                        to: 1,
                        kind: EdgeKind::Unconditional,
                    },
                    CfgEdge {
                        from: 1,
                        to: 2,
                        kind: EdgeKind::CondTrue,
                    },
                    CfgEdge {
                        from: 1,
                        to: 3,
                        kind: EdgeKind::CondFalse,
                    },
                    CfgEdge {
                        from: 2,
                        to: 1,
                        kind: EdgeKind::Unconditional,
                    },
                ],
            },
        );
        let tu = b.finish();

        // The point is convergence within budget, not the diagnostics.
        let result = diagnose_function(&tu, f, config());
        assert!(result.is_ok(), "got: {result:?}");
    }

    /// Exhausting the block-visit budget is a recoverable error.
    #[test]
    fn test_block_budget_interrupts() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr = b.pointer(int, None);
        let f = b.function("f", void, &[("p", ptr)]);
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(0, vec![]), b.block(1, vec![]), b.block(2, vec![])],
                edges: vec![
                    CfgEdge {
                        from: 0,
                        to: 1,
                        kind: EdgeKind::Unconditional,
                    },
                    CfgEdge {
                        from: 1,
                        to: 2,
                        kind: EdgeKind::Unconditional,
                    },
                ],
            },
        );
        let tu = b.finish();

        let err = diagnose_function(
            &tu,
            f,
            AnalysisConfig {
                max_block_visits: 1,
                ..AnalysisConfig::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::BlockLimit));
    }

    /// A file-scoped pragma makes unannotated pointers default to Nonnull,
    /// so `return nullptr` diagnoses without an explicit annotation.
    #[test]
    fn test_pragma_default_applies_to_unannotated_returns() {
        let mut b = TuBuilder::new();
        b.pragma("input.cc", NullabilityKind::Nonnull);
        let int = b.int();
        let ret = b.pointer(int, None);
        let f = b.function("f", ret, &[]);
        let nl = b.null_to(ret);
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(0, vec![Stmt::Return { value: Some(nl) }])],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let diags = diagnose_function(&tu, f, config()).unwrap();
        assert_eq!(diags.len(), 1, "got: {diags:?}");
        assert_eq!(diags[0].context, DiagContext::ReturnValue);
    }

    /// Templated functions are skipped, and per-function failures do not
    /// stop the TU run.
    #[test]
    fn test_diagnose_tu_skips_templates_and_records_failures() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr = b.pointer(int, None);

        let templated = b.function("tmpl", void, &[("p", ptr)]);
        b.function_mut(templated).is_templated = true;

        let f = b.function("f", void, &[("p", ptr)]);
        let pr = b.param_ref(f, 0);
        let ld = b.load(pr);
        let d = b.deref(ld);
        b.set_body(
            f,
            Body {
                blocks: vec![b.block(0, vec![Stmt::Expr(d)])],
                edges: vec![],
            },
        );
        let tu = b.finish();

        let report = diagnose_tu(&tu, config());
        assert_eq!(report.functions_analyzed, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.interrupted.is_empty());
    }
}
