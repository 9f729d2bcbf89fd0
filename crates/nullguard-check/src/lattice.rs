//! Non-flow-sensitive state shared by all lattice elements of one run.

use std::collections::HashMap;

use nullguard_ir::ir::{DeclId, ExprId, NullabilityKind};
use nullguard_solver::FormulaId;

use crate::tnv::{SymbolicNullability, TypeNullability};

/// State shared across every CFG element within one function analysis:
/// the expression nullability memo (flow-insensitive within a run), the
/// per-slot nullability overrides installed by inference, and the memoized
/// comparison atoms so block re-visits reuse the same propositions.
#[derive(Default)]
pub struct NonFlowSensitiveState {
    expr_tnv: HashMap<ExprId, TypeNullability>,
    pub slot_overrides: HashMap<(DeclId, u32), SymbolicNullability>,
    pub comparison_atoms: HashMap<ExprId, FormulaId>,
}

impl NonFlowSensitiveState {
    pub fn with_overrides(overrides: HashMap<(DeclId, u32), SymbolicNullability>) -> Self {
        Self {
            slot_overrides: overrides,
            ..Default::default()
        }
    }

    pub fn expr_nullability(&self, e: ExprId) -> Option<&TypeNullability> {
        self.expr_tnv.get(&e)
    }

    /// Memoize the nullability of `e`, validating the length invariant: a
    /// vector must have one entry per pointer in the expression's type. A
    /// mismatched vector cannot be interpreted and is replaced with
    /// `Unspecified` entries of the right length.
    pub fn insert_expr_nullability_if_absent(
        &mut self,
        e: ExprId,
        expected_len: usize,
        compute: impl FnOnce(&mut Self) -> TypeNullability,
    ) -> &TypeNullability {
        if !self.expr_tnv.contains_key(&e) {
            let mut vector = compute(self);
            if vector.len() != expected_len {
                tracing::debug!(
                    expr = e,
                    got = vector.len(),
                    expected = expected_len,
                    "nullability vector has wrong number of entries; discarding"
                );
                vector = vec![
                    SymbolicNullability::Concrete(NullabilityKind::Unspecified);
                    expected_len
                ];
            }
            self.expr_tnv.insert(e, vector);
        }
        &self.expr_tnv[&e]
    }

    /// Patch the top-level entry of `vector` with the override installed for
    /// the given slot, if any.
    pub fn apply_slot_override(&self, key: (DeclId, u32), vector: &mut TypeNullability) {
        if let Some(&sn) = self.slot_overrides.get(&key) {
            if let Some(front) = vector.first_mut() {
                *front = sn;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_computes_once() {
        let mut nfs = NonFlowSensitiveState::default();
        let mut calls = 0;
        nfs.insert_expr_nullability_if_absent(1, 1, |_| {
            calls += 1;
            vec![SymbolicNullability::Concrete(NullabilityKind::Nullable)]
        });
        let v = nfs
            .insert_expr_nullability_if_absent(1, 1, |_| {
                vec![SymbolicNullability::Concrete(NullabilityKind::Nonnull)]
            })
            .clone();
        assert_eq!(calls, 1);
        assert_eq!(v[0].concrete(), NullabilityKind::Nullable);
    }

    #[test]
    fn test_length_mismatch_discards_vector() {
        let mut nfs = NonFlowSensitiveState::default();
        let v = nfs
            .insert_expr_nullability_if_absent(2, 2, |_| {
                vec![SymbolicNullability::Concrete(NullabilityKind::Nonnull)]
            })
            .clone();
        assert_eq!(v.len(), 2);
        assert!(v
            .iter()
            .all(|e| e.concrete() == NullabilityKind::Unspecified));
    }

    #[test]
    fn test_slot_override_patches_front() {
        let mut nfs = NonFlowSensitiveState::default();
        nfs.slot_overrides.insert(
            (7, 1),
            SymbolicNullability::Concrete(NullabilityKind::Nonnull),
        );
        let mut v = vec![
            SymbolicNullability::Concrete(NullabilityKind::Unspecified),
            SymbolicNullability::Concrete(NullabilityKind::Nullable),
        ];
        nfs.apply_slot_override((7, 1), &mut v);
        assert_eq!(v[0].concrete(), NullabilityKind::Nonnull);
        assert_eq!(v[1].concrete(), NullabilityKind::Nullable);

        // No override installed: vector is untouched.
        nfs.apply_slot_override((8, 0), &mut v);
        assert_eq!(v[0].concrete(), NullabilityKind::Nonnull);
    }
}
