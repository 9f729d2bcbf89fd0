//! nullguard IR — translation-unit model shared by all analysis passes.

pub mod build;
pub mod cfg;
pub mod ir;

use std::path::Path;

/// Errors loading a frontend export from disk.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed translation unit: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a translation unit from the frontend's JSON export.
pub fn load_tu(path: &Path) -> Result<ir::TranslationUnit, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let tu = serde_json::from_str(&content)?;
    Ok(tu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::TuBuilder;

    #[test]
    fn test_load_tu_roundtrip() {
        let mut b = TuBuilder::new();
        let int = b.int();
        let void = b.void();
        let ptr = b.pointer(int, None);
        b.function("f", void, &[("p", ptr)]);
        let tu = b.finish();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tu.json");
        std::fs::write(&path, serde_json::to_string(&tu).unwrap()).unwrap();

        let loaded = load_tu(&path).unwrap();
        assert_eq!(loaded.decls.len(), 1);
        assert_eq!(loaded.decls[0].name, "f");
    }

    #[test]
    fn test_load_tu_missing_file() {
        let err = load_tu(Path::new("/nonexistent/tu.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_tu_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tu.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_tu(&path).unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }
}
