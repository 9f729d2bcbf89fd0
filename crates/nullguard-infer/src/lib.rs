//! nullguard infer — whole-TU nullability inference.
//!
//! Re-runs the flow-sensitive analysis in inference mode to collect evidence
//! events, aggregates them into per-slot verdicts with conflict detection,
//! and iterates to fixpoint so inferences on one function refine another.

pub mod aggregate;
pub mod collect;
pub mod evidence;
pub mod infer_tu;

pub use aggregate::Aggregator;
pub use evidence::{Evidence, EvidenceKind, InferenceResults, InferredKind, Slot, SlotInference};
pub use infer_tu::{infer_tu, InferConfig, InferReport};
