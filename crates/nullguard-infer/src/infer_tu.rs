//! Iteration driver: run evidence collection over every function, install
//! the aggregated verdicts as overrides, and repeat so inferences on one
//! function refine another.

use std::collections::HashMap;

use nullguard_check::analysis::{AnalysisConfig, AnalysisError, FunctionAnalysis};
use nullguard_check::tnv::SymbolicNullability;
use nullguard_ir::ir::*;

use crate::aggregate::Aggregator;
use crate::collect::{collect_declaration_evidence, collect_function_evidence};
use crate::evidence::{InferenceResults, InferredKind, Slot, SlotInference};

#[derive(Debug, Clone, Copy)]
pub struct InferConfig {
    pub analysis: AnalysisConfig,
    pub iterations: u32,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            iterations: 1,
        }
    }
}

/// Inference output for a translation unit.
#[derive(Debug, Default)]
pub struct InferReport {
    pub results: InferenceResults,
    /// Functions whose analysis was interrupted in the final round.
    pub interrupted: Vec<(String, AnalysisError)>,
}

/// Infer nullability for every slot in the TU.
///
/// Round 1 sees only declared annotations (and pragma defaults). After each
/// round the aggregated verdicts are installed as overrides for slots
/// without an explicit annotation, so later rounds can propagate a callee's
/// inferred `Nonnull` into its callers. Verdicts only strengthen; they do
/// not oscillate, because overrides only remove ambiguity.
pub fn infer_tu(
    tu: &TranslationUnit,
    config: &InferConfig,
    filter: Option<&dyn Fn(&Decl) -> bool>,
) -> InferReport {
    let mut overrides: HashMap<(DeclId, u32), SymbolicNullability> = HashMap::new();
    let mut verdicts: HashMap<Slot, SlotInference> = HashMap::new();
    let mut interrupted: Vec<(String, AnalysisError)> = Vec::new();

    let rounds = config.iterations.max(1);
    for round in 0..rounds {
        let mut agg = Aggregator::new();
        collect_declaration_evidence(tu, &mut agg);
        interrupted.clear();

        for decl in tu.functions() {
            let Some(f) = tu.function(decl.id) else {
                continue;
            };
            if f.is_templated || f.body.is_none() {
                continue;
            }
            let outcome = FunctionAnalysis::new(tu, decl.id, config.analysis, overrides.clone())
                .and_then(|mut fa| collect_function_evidence(&mut fa, &mut agg));
            if let Err(err) = outcome {
                tracing::warn!(
                    function = %decl.name,
                    round,
                    error = %err,
                    "inference analysis interrupted"
                );
                interrupted.push((decl.name.clone(), err));
            }
        }

        verdicts = agg.finish(tu);

        overrides.clear();
        for (slot, inference) in &verdicts {
            let kind = match inference.nullability {
                InferredKind::Unknown => continue,
                InferredKind::Nullable => NullabilityKind::Nullable,
                InferredKind::Nonnull => NullabilityKind::Nonnull,
            };
            // Explicit user annotations are never overridden.
            if declared_annotation(tu, *slot) != NullabilityKind::Unspecified {
                continue;
            }
            overrides.insert(
                (slot.decl, slot.index),
                SymbolicNullability::Concrete(kind),
            );
        }
    }

    let mut results = InferenceResults::new();
    for (slot, inference) in verdicts {
        let decl = tu.decl(slot.decl);
        if let Some(f) = filter {
            if !f(decl) {
                continue;
            }
        }
        results
            .entry(decl.usr.clone())
            .or_default()
            .insert(slot.index, inference);
    }

    // Every pointer slot of an analyzed function gets at least an Unknown
    // entry, so the absence of evidence is visible in the output.
    for decl in tu.functions() {
        let Some(f) = tu.function(decl.id) else {
            continue;
        };
        if f.is_templated || f.body.is_none() {
            continue;
        }
        if let Some(flt) = filter {
            if !flt(decl) {
                continue;
            }
        }
        let entry = results.entry(decl.usr.clone()).or_default();
        if tu.is_raw_pointer(tu.non_reference(f.ret)) || tu.is_smart_pointer(tu.non_reference(f.ret))
        {
            entry.entry(0).or_insert_with(unknown_slot);
        }
        for (i, p) in f.params.iter().enumerate() {
            let vty = tu.non_reference(p.ty);
            if tu.is_raw_pointer(vty) || tu.is_smart_pointer(vty) {
                entry.entry(i as u32 + 1).or_insert_with(unknown_slot);
            }
        }
    }

    InferReport {
        results,
        interrupted,
    }
}

fn unknown_slot() -> SlotInference {
    SlotInference {
        nullability: InferredKind::Unknown,
        conflict: false,
        sample_evidence: Vec::new(),
    }
}

/// The explicitly written annotation at a slot, if any.
fn declared_annotation(tu: &TranslationUnit, slot: Slot) -> NullabilityKind {
    let ty = match &tu.decl(slot.decl).kind {
        DeclKind::Function(f) => {
            if slot.index == 0 {
                Some(f.ret)
            } else {
                f.params.get(slot.index as usize - 1).map(|p| p.ty)
            }
        }
        DeclKind::Var(v) => Some(v.ty),
        DeclKind::Field(fd) => Some(fd.ty),
    };
    let Some(ty) = ty else {
        return NullabilityKind::Unspecified;
    };
    match &tu.ty(tu.non_reference(ty)).kind {
        TypeKind::Pointer { annotation, .. } => annotation.unwrap_or(NullabilityKind::Unspecified),
        TypeKind::Record(r) => match r.smart_ptr_raw {
            Some(raw) => match &tu.ty(raw).kind {
                TypeKind::Pointer { annotation, .. } => {
                    annotation.unwrap_or(NullabilityKind::Unspecified)
                }
                _ => NullabilityKind::Unspecified,
            },
            None => NullabilityKind::Unspecified,
        },
        _ => NullabilityKind::Unspecified,
    }
}
