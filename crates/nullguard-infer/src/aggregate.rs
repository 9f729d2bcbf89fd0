//! Per-slot verdicts from evidence bags, with conflict detection and
//! virtual-method override chains.

use std::collections::{HashMap, HashSet};

use nullguard_ir::ir::{DeclId, DeclKind, TranslationUnit};

use crate::evidence::{Evidence, EvidenceKind, InferredKind, Slot, SlotInference};

const MAX_SAMPLE_EVIDENCE: usize = 3;

/// Accumulates evidence events for a whole translation unit.
#[derive(Default)]
pub struct Aggregator {
    bags: HashMap<Slot, Vec<Evidence>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, slot: Slot, kind: EvidenceKind, location: impl Into<String>) {
        self.bags.entry(slot).or_default().push(Evidence {
            kind,
            location: location.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    /// Collapse all bags into verdicts. Members of a virtual override chain
    /// share one merged bag per slot: parameter slots resolve
    /// nullable-leaning (contravariant meet), the return slot
    /// nonnull-leaning (covariant join); disagreements set the conflict
    /// flag on every member.
    pub fn finish(&self, tu: &TranslationUnit) -> HashMap<Slot, SlotInference> {
        let mut out: HashMap<Slot, SlotInference> = HashMap::new();

        for chain in override_chains(tu) {
            let max_params = chain
                .iter()
                .filter_map(|&d| tu.function(d))
                .map(|f| f.params.len())
                .max()
                .unwrap_or(0);
            for index in 0..=max_params as u32 {
                let mut merged: Vec<Evidence> = Vec::new();
                let mut contributors = 0;
                for &member in &chain {
                    if let Some(bag) = self.bags.get(&Slot {
                        decl: member,
                        index,
                    }) {
                        if !bag.is_empty() {
                            contributors += 1;
                        }
                        merged.extend(bag.iter().cloned());
                    }
                }
                if merged.is_empty() {
                    continue;
                }
                if contributors > 0 && chain.len() > 1 {
                    merged.push(Evidence {
                        kind: EvidenceKind::VirtualMethodConsistency,
                        location: String::new(),
                    });
                }
                let bias = if index == 0 {
                    InferredKind::Nonnull
                } else {
                    InferredKind::Nullable
                };
                let inference = aggregate_slot(&merged, Some(bias));
                for &member in &chain {
                    out.insert(
                        Slot {
                            decl: member,
                            index,
                        },
                        inference.clone(),
                    );
                }
            }
        }

        for (slot, bag) in &self.bags {
            if !out.contains_key(slot) {
                out.insert(*slot, aggregate_slot(bag, None));
            }
        }
        out
    }
}

/// Collapse one evidence bag. `bias` resolves strong-vs-strong conflicts for
/// override chains; otherwise the evidence ranking decides.
pub(crate) fn aggregate_slot(bag: &[Evidence], bias: Option<InferredKind>) -> SlotInference {
    let strong_nullable = bag.iter().any(|e| e.kind.is_strong_nullable());
    let strong_nonnull = bag.iter().any(|e| e.kind.is_strong_nonnull());

    let (nullability, conflict) = if strong_nullable && strong_nonnull {
        let verdict = bias.unwrap_or_else(|| {
            let best = |pred: fn(EvidenceKind) -> bool| {
                bag.iter()
                    .filter(|e| pred(e.kind))
                    .map(|e| e.kind.rank())
                    .max()
                    .unwrap_or(0)
            };
            if best(EvidenceKind::is_strong_nullable) > best(EvidenceKind::is_strong_nonnull) {
                InferredKind::Nullable
            } else {
                InferredKind::Nonnull
            }
        });
        (verdict, true)
    } else if strong_nullable {
        (InferredKind::Nullable, false)
    } else if strong_nonnull {
        (InferredKind::Nonnull, false)
    } else if bag.iter().any(|e| e.kind.is_moderate_nonnull()) {
        (InferredKind::Nonnull, false)
    } else if bag.iter().any(|e| e.kind.is_weak_nullable()) {
        (InferredKind::Nullable, false)
    } else {
        (InferredKind::Unknown, false)
    };

    SlotInference {
        nullability,
        conflict,
        sample_evidence: bag.iter().take(MAX_SAMPLE_EVIDENCE).cloned().collect(),
    }
}

/// Groups of function declarations connected by override edges.
fn override_chains(tu: &TranslationUnit) -> Vec<Vec<DeclId>> {
    let mut parent: HashMap<DeclId, DeclId> = HashMap::new();

    fn find(parent: &mut HashMap<DeclId, DeclId>, d: DeclId) -> DeclId {
        let p = *parent.entry(d).or_insert(d);
        if p == d {
            return d;
        }
        let root = find(parent, p);
        parent.insert(d, root);
        root
    }

    for decl in &tu.decls {
        if let DeclKind::Function(f) = &decl.kind {
            for &overridden in &f.overrides {
                let a = find(&mut parent, decl.id);
                let b = find(&mut parent, overridden);
                if a != b {
                    parent.insert(a, b);
                }
            }
        }
    }

    let mut groups: HashMap<DeclId, Vec<DeclId>> = HashMap::new();
    let members: HashSet<DeclId> = parent.keys().copied().collect();
    for d in members {
        let root = find(&mut parent, d);
        groups.entry(root).or_default().push(d);
    }
    let mut chains: Vec<Vec<DeclId>> = groups
        .into_values()
        .filter(|g| g.len() > 1)
        .collect();
    for chain in &mut chains {
        chain.sort_unstable();
    }
    chains.sort();
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EvidenceKind) -> Evidence {
        Evidence {
            kind,
            location: "a.cc:1:1".into(),
        }
    }

    #[test]
    fn test_no_evidence_is_unknown() {
        let inf = aggregate_slot(&[], None);
        assert_eq!(inf.nullability, InferredKind::Unknown);
        assert!(!inf.conflict);
    }

    #[test]
    fn test_strong_nonnull_wins_over_moderate() {
        let inf = aggregate_slot(&[ev(EvidenceKind::UncheckedDereference)], None);
        assert_eq!(inf.nullability, InferredKind::Nonnull);
        assert!(!inf.conflict);
    }

    #[test]
    fn test_nullable_return_beats_nonnull_return_without_conflict() {
        let inf = aggregate_slot(
            &[
                ev(EvidenceKind::NonnullReturn),
                ev(EvidenceKind::NullableReturn),
            ],
            None,
        );
        assert_eq!(inf.nullability, InferredKind::Nullable);
        assert!(!inf.conflict, "moderate evidence must not conflict");
    }

    #[test]
    fn test_strong_conflict_resolved_by_rank() {
        // Unchecked dereference outranks a Nullable annotation.
        let inf = aggregate_slot(
            &[
                ev(EvidenceKind::UncheckedDereference),
                ev(EvidenceKind::Nullable),
            ],
            None,
        );
        assert_eq!(inf.nullability, InferredKind::Nonnull);
        assert!(inf.conflict);

        // A nullable argument outranks an abort-if-null.
        let inf = aggregate_slot(
            &[
                ev(EvidenceKind::AbortIfNull),
                ev(EvidenceKind::NullableArgument),
            ],
            None,
        );
        assert_eq!(inf.nullability, InferredKind::Nullable);
        assert!(inf.conflict);
    }

    #[test]
    fn test_weak_hint_yields_nullable() {
        let inf = aggregate_slot(&[ev(EvidenceKind::GcConstructorNullable)], None);
        assert_eq!(inf.nullability, InferredKind::Nullable);
        assert!(!inf.conflict);
    }

    #[test]
    fn test_bias_overrides_rank_in_chains() {
        let bag = [
            ev(EvidenceKind::UncheckedDereference),
            ev(EvidenceKind::NullableArgument),
        ];
        let param = aggregate_slot(&bag, Some(InferredKind::Nullable));
        assert_eq!(param.nullability, InferredKind::Nullable);
        assert!(param.conflict);
        let ret = aggregate_slot(&bag, Some(InferredKind::Nonnull));
        assert_eq!(ret.nullability, InferredKind::Nonnull);
        assert!(ret.conflict);
    }
}
