//! Configuration loading from nullguard.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use nullguard_check::AnalysisConfig;
use nullguard_infer::InferConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisSection,
    pub inference: InferenceSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// SAT solver step budget per function. Empirical.
    pub max_sat_steps: u64,
    /// Dataflow block-visit budget per function. Empirical.
    pub max_block_visits: u32,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            max_sat_steps: defaults.max_sat_steps,
            max_block_visits: defaults.max_block_visits,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    /// Whole-TU inference rounds.
    pub iterations: u32,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self { iterations: 1 }
    }
}

impl Config {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            max_sat_steps: self.analysis.max_sat_steps,
            max_block_visits: self.analysis.max_block_visits,
        }
    }

    pub fn infer_config(&self) -> InferConfig {
        InferConfig {
            analysis: self.analysis_config(),
            iterations: self.inference.iterations,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed nullguard.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Find and load nullguard.toml, walking up from `start_dir`. A missing file
/// yields the defaults; a malformed one is an error (invalid configuration).
pub fn load_config(start_dir: &Path) -> Result<Config, ConfigError> {
    match find_config_file(start_dir) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            Ok(toml::from_str(&content)?)
        }
        None => Ok(Config::default()),
    }
}

/// Walk up directories looking for nullguard.toml.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join("nullguard.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Default TOML content for `nullguard init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"[analysis]
# SAT solver step budget per function.
max_sat_steps = 2000000
# Dataflow block-visit budget per function.
max_block_visits = 20000

[inference]
iterations = 1
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.analysis.max_sat_steps, 2_000_000);
        assert_eq!(cfg.analysis.max_block_visits, 20_000);
        assert_eq!(cfg.inference.iterations, 1);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[analysis]
max_sat_steps = 1000
max_block_visits = 50

[inference]
iterations = 3
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.analysis.max_sat_steps, 1000);
        assert_eq!(cfg.analysis.max_block_visits, 50);
        assert_eq!(cfg.infer_config().iterations, 3);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[inference]
iterations = 2
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.inference.iterations, 2);
        assert_eq!(cfg.analysis.max_sat_steps, 2_000_000);
    }

    #[test]
    fn test_load_config_no_file() {
        let cfg = load_config(Path::new("/nonexistent/path")).unwrap();
        assert_eq!(cfg.inference.iterations, 1);
    }

    #[test]
    fn test_find_config_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nullguard.toml"), DEFAULT_CONFIG_TOML).unwrap();
        let subdir = dir.path().join("sub");
        std::fs::create_dir(&subdir).unwrap();
        let cfg = load_config(&subdir).unwrap();
        assert_eq!(cfg.analysis.max_block_visits, 20_000);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nullguard.toml"), "[analysis\nbroken").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_default_config_toml_parses() {
        let cfg: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(cfg.analysis.max_sat_steps, 2_000_000);
        assert_eq!(cfg.inference.iterations, 1);
    }
}
