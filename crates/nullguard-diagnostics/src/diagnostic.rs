//! Diagnostic records produced by the nullability passes.

use serde::{Deserialize, Serialize};

/// A diagnostic produced by the checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique ID: CODE-file:line (e.g., "expected-nonnull-box.cc:18").
    pub id: String,
    pub code: ErrorCode,
    /// Which construct the violation occurred in.
    pub context: DiagContext,
    pub severity: Severity,
    /// Where the issue manifests.
    pub location: Location,
    /// Parameter name, for argument and default-argument diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    /// One-line human explanation.
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// A value that may be null reached a position requiring non-null.
    ExpectedNonnull,
    /// The analysis does not model a pointer value for the operand.
    Untracked,
    /// `__assert_nullability` expectation did not match (testing hook).
    AssertFailed,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedNonnull => write!(f, "expected-nonnull"),
            Self::Untracked => write!(f, "untracked"),
            Self::AssertFailed => write!(f, "assert-failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagContext {
    NullableDereference,
    FunctionArgument,
    ReturnValue,
    Initializer,
    Other,
}

impl std::fmt::Display for DiagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullableDereference => write!(f, "nullable dereference"),
            Self::FunctionArgument => write!(f, "function argument"),
            Self::ReturnValue => write!(f, "return value"),
            Self::Initializer => write!(f, "initializer"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl Severity {
    pub fn is_at_least(&self, threshold: Severity) -> bool {
        *self >= threshold
    }
}

/// Source code location. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Builder for creating diagnostics conveniently.
pub struct DiagnosticBuilder {
    code: ErrorCode,
    context: DiagContext,
    severity: Severity,
    file: String,
    line: u32,
    column: u32,
    end_line: u32,
    end_column: u32,
    param_name: Option<String>,
    explanation: String,
}

impl DiagnosticBuilder {
    pub fn new(code: ErrorCode, context: DiagContext) -> Self {
        let severity = match code {
            ErrorCode::ExpectedNonnull => Severity::Error,
            ErrorCode::Untracked => Severity::Warning,
            ErrorCode::AssertFailed => Severity::Error,
        };
        Self {
            code,
            context,
            severity,
            file: String::new(),
            line: 0,
            column: 0,
            end_line: 0,
            end_column: 0,
            param_name: None,
            explanation: String::new(),
        }
    }

    pub fn location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self.column = column;
        self.end_line = line;
        self.end_column = column;
        self
    }

    pub fn end_location(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = end_line;
        self.end_column = end_column;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn param_name(mut self, name: impl Into<String>) -> Self {
        self.param_name = Some(name.into());
        self
    }

    pub fn explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn build(self) -> Diagnostic {
        let id = format!("{}-{}:{}", self.code, self.file, self.line);
        Diagnostic {
            id,
            code: self.code,
            context: self.context,
            severity: self.severity,
            location: Location {
                file: self.file,
                line: self.line,
                column: self.column,
                end_line: self.end_line,
                end_column: self.end_column,
            },
            param_name: self.param_name,
            explanation: self.explanation,
        }
    }
}

/// Summary of a check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub functions_analyzed: usize,
    pub functions_interrupted: usize,
}

impl AnalysisSummary {
    pub fn from_diagnostics(
        diagnostics: &[Diagnostic],
        functions_analyzed: usize,
        functions_interrupted: usize,
    ) -> Self {
        let mut summary = Self {
            error: 0,
            warning: 0,
            info: 0,
            functions_analyzed,
            functions_interrupted,
        };
        for diag in diagnostics {
            match diag.severity {
                Severity::Error => summary.error += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.error + self.warning + self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_builder() {
        let diag = DiagnosticBuilder::new(ErrorCode::ExpectedNonnull, DiagContext::NullableDereference)
            .location("box.cc", 18, 5)
            .explanation("dereference of `p` which may be null")
            .build();

        assert_eq!(diag.id, "expected-nonnull-box.cc:18");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.location.line, 18);
        assert!(diag.param_name.is_none());
    }

    #[test]
    fn test_untracked_defaults_to_warning() {
        let diag = DiagnosticBuilder::new(ErrorCode::Untracked, DiagContext::Other)
            .location("box.cc", 3, 1)
            .build();
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn test_param_name_round_trips() {
        let diag = DiagnosticBuilder::new(ErrorCode::ExpectedNonnull, DiagContext::FunctionArgument)
            .location("box.cc", 9, 2)
            .param_name("dest")
            .build();
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("param_name"));
        let parsed: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.param_name.as_deref(), Some("dest"));
    }

    #[test]
    fn test_param_name_omitted_from_json() {
        let diag = DiagnosticBuilder::new(ErrorCode::AssertFailed, DiagContext::Other)
            .location("box.cc", 4, 1)
            .build();
        let json = serde_json::to_string(&diag).unwrap();
        assert!(!json.contains("param_name"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Error.is_at_least(Severity::Warning));
        assert!(!Severity::Info.is_at_least(Severity::Warning));
    }

    #[test]
    fn test_location_display() {
        let loc = Location {
            file: "box.cc".into(),
            line: 18,
            column: 5,
            end_line: 18,
            end_column: 20,
        };
        assert_eq!(loc.to_string(), "box.cc:18:5");
    }

    #[test]
    fn test_summary_counts() {
        let diags = vec![
            DiagnosticBuilder::new(ErrorCode::ExpectedNonnull, DiagContext::ReturnValue)
                .location("a.cc", 1, 1)
                .build(),
            DiagnosticBuilder::new(ErrorCode::Untracked, DiagContext::Other)
                .location("a.cc", 2, 1)
                .build(),
        ];
        let summary = AnalysisSummary::from_diagnostics(&diags, 3, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.functions_interrupted, 1);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ExpectedNonnull.to_string(), "expected-nonnull");
        assert_eq!(ErrorCode::AssertFailed.to_string(), "assert-failed");
    }
}
