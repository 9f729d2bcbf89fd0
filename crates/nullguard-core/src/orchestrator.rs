//! Analysis orchestrator — loads a TU export and runs the passes.

use std::path::Path;

use nullguard_check::diagnose_tu;
use nullguard_diagnostics::{AnalysisSummary, Diagnostic};
use nullguard_infer::{infer_tu, InferReport};
use nullguard_ir::ir::TranslationUnit;

use crate::config::Config;

/// Complete output from a check run.
#[derive(Debug)]
pub struct CheckOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub summary: AnalysisSummary,
    /// Names of functions whose analysis was interrupted.
    pub interrupted: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Load(#[from] nullguard_ir::LoadError),
}

/// Run the checker over a TU export on disk.
pub fn check_path(path: &Path, config: &Config) -> Result<CheckOutput, OrchestratorError> {
    let tu = nullguard_ir::load_tu(path)?;
    Ok(check_tu(&tu, config))
}

/// Run the checker over an already-loaded TU.
/// Used by both the CLI and tests.
pub fn check_tu(tu: &TranslationUnit, config: &Config) -> CheckOutput {
    let report = diagnose_tu(tu, config.analysis_config());
    let summary = AnalysisSummary::from_diagnostics(
        &report.diagnostics,
        report.functions_analyzed,
        report.interrupted.len(),
    );
    CheckOutput {
        diagnostics: report.diagnostics,
        summary,
        interrupted: report.interrupted.into_iter().map(|(name, _)| name).collect(),
    }
}

/// Run whole-TU inference over a TU export on disk.
pub fn infer_path(path: &Path, config: &Config) -> Result<InferReport, OrchestratorError> {
    let tu = nullguard_ir::load_tu(path)?;
    Ok(infer_tu(&tu, &config.infer_config(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullguard_ir::build::TuBuilder;
    use nullguard_ir::ir::{Body, Stmt};

    fn deref_tu() -> (TranslationUnit, String) {
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
        let usr = tu.decl(f).usr.clone();
        (tu, usr)
    }

    #[test]
    fn test_check_tu_summarizes() {
        let (tu, _) = deref_tu();
        let output = check_tu(&tu, &Config::default());
        assert_eq!(output.summary.error, 1);
        assert_eq!(output.summary.functions_analyzed, 1);
        assert!(output.interrupted.is_empty());
    }

    #[test]
    fn test_check_path_round_trip() {
        let (tu, _) = deref_tu();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tu.json");
        std::fs::write(&path, serde_json::to_string(&tu).unwrap()).unwrap();

        let output = check_path(&path, &Config::default()).unwrap();
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn test_infer_path_round_trip() {
        let (tu, usr) = deref_tu();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tu.json");
        std::fs::write(&path, serde_json::to_string(&tu).unwrap()).unwrap();

        let report = infer_path(&path, &Config::default()).unwrap();
        let slot = report.results.get(&usr).and_then(|m| m.get(&1)).unwrap();
        assert_eq!(slot.nullability, nullguard_infer::InferredKind::Nonnull);
    }

    #[test]
    fn test_check_path_missing_file() {
        let err = check_path(Path::new("/nonexistent/tu.json"), &Config::default()).unwrap_err();
        assert!(matches!(err, OrchestratorError::Load(_)));
    }
}
