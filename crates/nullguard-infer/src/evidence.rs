//! Evidence events and their strength classes.

use serde::{Deserialize, Serialize};

pub use nullguard_check::env::Slot;

/// The closed set of facts the collector can attach to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceKind {
    /// The value reached a non-null-requiring use with `is_null` not
    /// provably false.
    UncheckedDereference,
    /// Existing `_Nullable` annotation.
    Nullable,
    /// Existing `_Nonnull` annotation.
    Nonnull,
    Unknown,
    NullableArgument,
    NonnullArgument,
    UnknownArgument,
    NullableReturn,
    NonnullReturn,
    UnknownReturn,
    AssignedFromNullable,
    AssignedFromNonnull,
    /// The value reached a `CHECK`-style abort-if-null.
    AbortIfNull,
    ArithmeticOrArraySubscript,
    /// Default member initializer to null (weak hint).
    GcConstructorNullable,
    /// Propagated along a virtual-method override chain.
    VirtualMethodConsistency,
}

impl EvidenceKind {
    /// Strong evidence that the slot must accept null.
    pub fn is_strong_nullable(self) -> bool {
        matches!(
            self,
            Self::NullableArgument
                | Self::NullableReturn
                | Self::AssignedFromNullable
                | Self::Nullable
        )
    }

    /// Strong evidence that the slot must be non-null.
    pub fn is_strong_nonnull(self) -> bool {
        matches!(
            self,
            Self::UncheckedDereference
                | Self::ArithmeticOrArraySubscript
                | Self::AbortIfNull
                | Self::Nonnull
        )
    }

    /// Sets a Nonnull verdict but never triggers a conflict: a function
    /// that returns both a non-null value and `nullptr` is Nullable, not
    /// conflicted.
    pub fn is_moderate_nonnull(self) -> bool {
        matches!(self, Self::NonnullReturn | Self::AssignedFromNonnull)
    }

    pub fn is_weak_nullable(self) -> bool {
        matches!(self, Self::GcConstructorNullable)
    }

    /// Conflict resolution rank; higher wins.
    pub fn rank(self) -> u8 {
        match self {
            Self::UncheckedDereference => 5,
            Self::NullableArgument | Self::NullableReturn | Self::AssignedFromNullable => 4,
            Self::Nullable | Self::Nonnull => 3,
            Self::AbortIfNull | Self::ArithmeticOrArraySubscript => 2,
            _ => 1,
        }
    }
}

/// A single evidence event: what fact, and where it was observed. Slot
/// identity is the aggregator's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub location: String,
}

/// An inference verdict for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferredKind {
    Unknown,
    Nullable,
    Nonnull,
}

/// Per-slot inference output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInference {
    pub nullability: InferredKind,
    pub conflict: bool,
    pub sample_evidence: Vec<Evidence>,
}

/// Final result: universal symbol reference → slot index → inference.
pub type InferenceResults = std::collections::BTreeMap<String, std::collections::BTreeMap<u32, SlotInference>>;
