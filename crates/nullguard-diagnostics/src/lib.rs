//! Core diagnostic types for nullguard.
//!
//! The checker and the inference driver produce `Diagnostic` values; all
//! output formatters (human, JSON) consume them.

pub mod diagnostic;

pub use diagnostic::{
    AnalysisSummary, DiagContext, Diagnostic, DiagnosticBuilder, ErrorCode, Location, Severity,
};
