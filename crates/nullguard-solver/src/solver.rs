//! Budgeted satisfiability over arena formulas.

use std::collections::HashMap;

use crate::formula::{Arena, Atom, FormulaId, Node};

/// Budget for one solver instance; empirical, always configurable.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Maximum node-evaluation steps across all queries on this solver.
    pub max_steps: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_steps: 2_000_000,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver step budget exhausted")]
    BudgetExhausted,
}

/// Formula manager plus decision procedure.
///
/// One solver lives for one function analysis; formulas are never stored
/// across runs.
pub struct Solver {
    arena: Arena,
    assumptions: Vec<FormulaId>,
    steps: u64,
    max_steps: u64,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            arena: Arena::new(),
            assumptions: Vec::new(),
            steps: 0,
            max_steps: config.max_steps,
        }
    }

    pub fn lit(&self, value: bool) -> FormulaId {
        self.arena.lit(value)
    }

    pub fn mk_atom(&mut self) -> FormulaId {
        self.arena.atom()
    }

    pub fn mk_not(&mut self, f: FormulaId) -> FormulaId {
        self.arena.not(f)
    }

    pub fn mk_and(&mut self, a: FormulaId, b: FormulaId) -> FormulaId {
        self.arena.and(a, b)
    }

    pub fn mk_or(&mut self, a: FormulaId, b: FormulaId) -> FormulaId {
        self.arena.or(a, b)
    }

    pub fn mk_implies(&mut self, a: FormulaId, b: FormulaId) -> FormulaId {
        self.arena.implies(a, b)
    }

    pub fn mk_equals(&mut self, a: FormulaId, b: FormulaId) -> FormulaId {
        self.arena.equals(a, b)
    }

    /// Assert `f` for all subsequent queries.
    pub fn add_assumption(&mut self, f: FormulaId) {
        self.assumptions.push(f);
    }

    /// Is `f` satisfiable together with the assumptions?
    pub fn satisfiable(&mut self, f: FormulaId) -> Result<bool, SolverError> {
        let mut goals = self.assumptions.clone();
        goals.push(f);
        let mut assignment = HashMap::new();
        self.search(&goals, &mut assignment)
    }

    /// Does `f` hold in every model of the assumptions?
    pub fn prove(&mut self, f: FormulaId) -> Result<bool, SolverError> {
        let negated = self.arena.not(f);
        Ok(!self.satisfiable(negated)?)
    }

    fn tick(&mut self) -> Result<(), SolverError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(SolverError::BudgetExhausted);
        }
        Ok(())
    }

    /// Backtracking search: branch on an atom of the first undetermined goal.
    fn search(
        &mut self,
        goals: &[FormulaId],
        assignment: &mut HashMap<Atom, bool>,
    ) -> Result<bool, SolverError> {
        let mut branch_atom = None;
        for &goal in goals {
            match self.eval(goal, assignment)? {
                Some(false) => return Ok(false),
                Some(true) => continue,
                None => {
                    if branch_atom.is_none() {
                        branch_atom = self.find_unassigned_atom(goal, assignment);
                    }
                }
            }
        }
        let Some(atom) = branch_atom else {
            // Every goal evaluated true.
            return Ok(true);
        };

        for value in [true, false] {
            assignment.insert(atom, value);
            if self.search(goals, assignment)? {
                assignment.remove(&atom);
                return Ok(true);
            }
        }
        assignment.remove(&atom);
        Ok(false)
    }

    /// Three-valued evaluation under a partial assignment.
    fn eval(
        &mut self,
        f: FormulaId,
        assignment: &HashMap<Atom, bool>,
    ) -> Result<Option<bool>, SolverError> {
        self.tick()?;
        let result = match self.arena.node(f) {
            Node::True => Some(true),
            Node::False => Some(false),
            Node::Atom(a) => assignment.get(&a).copied(),
            Node::Not(inner) => self.eval(inner, assignment)?.map(|v| !v),
            Node::And(a, b) => match (self.eval(a, assignment)?, self.eval(b, assignment)?) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Node::Or(a, b) => match (self.eval(a, assignment)?, self.eval(b, assignment)?) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        };
        Ok(result)
    }

    fn find_unassigned_atom(
        &self,
        f: FormulaId,
        assignment: &HashMap<Atom, bool>,
    ) -> Option<Atom> {
        match self.arena.node(f) {
            Node::True | Node::False => None,
            Node::Atom(a) => (!assignment.contains_key(&a)).then_some(a),
            Node::Not(inner) => self.find_unassigned_atom(inner, assignment),
            Node::And(a, b) | Node::Or(a, b) => self
                .find_unassigned_atom(a, assignment)
                .or_else(|| self.find_unassigned_atom(b, assignment)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> Solver {
        Solver::new(SolverConfig::default())
    }

    #[test]
    fn test_constants() {
        let mut s = solver();
        let t = s.lit(true);
        let f = s.lit(false);
        assert_eq!(s.satisfiable(t), Ok(true));
        assert_eq!(s.satisfiable(f), Ok(false));
        assert_eq!(s.prove(t), Ok(true));
        assert_eq!(s.prove(f), Ok(false));
    }

    #[test]
    fn test_atom_is_satisfiable_but_not_valid() {
        let mut s = solver();
        let a = s.mk_atom();
        assert_eq!(s.satisfiable(a), Ok(true));
        assert_eq!(s.prove(a), Ok(false));
        let na = s.mk_not(a);
        assert_eq!(s.satisfiable(na), Ok(true));
    }

    #[test]
    fn test_contradiction() {
        let mut s = solver();
        let a = s.mk_atom();
        let na = s.mk_not(a);
        let both = s.mk_and(a, na);
        assert_eq!(s.satisfiable(both), Ok(false));
    }

    #[test]
    fn test_excluded_middle_is_valid() {
        let mut s = solver();
        let a = s.mk_atom();
        let na = s.mk_not(a);
        let lem = s.mk_or(a, na);
        assert_eq!(s.prove(lem), Ok(true));
    }

    #[test]
    fn test_modus_ponens_through_assumptions() {
        let mut s = solver();
        let a = s.mk_atom();
        let b = s.mk_atom();
        let imp = s.mk_implies(a, b);
        s.add_assumption(a);
        s.add_assumption(imp);
        assert_eq!(s.prove(b), Ok(true));
    }

    #[test]
    fn test_equals_constrains_both_ways() {
        let mut s = solver();
        let a = s.mk_atom();
        let b = s.mk_atom();
        let eq = s.mk_equals(a, b);
        s.add_assumption(eq);
        let na = s.mk_not(a);
        s.add_assumption(na);
        let nb = s.mk_not(b);
        assert_eq!(s.prove(nb), Ok(true));
    }

    #[test]
    fn test_hash_consing_dedups() {
        let mut s = solver();
        let a = s.mk_atom();
        let b = s.mk_atom();
        let ab = s.mk_and(a, b);
        let ba = s.mk_and(b, a);
        assert_eq!(ab, ba);
        let nn = s.mk_not(a);
        let back = s.mk_not(nn);
        assert_eq!(back, a);
    }

    #[test]
    fn test_constant_folding() {
        let mut s = solver();
        let a = s.mk_atom();
        let t = s.lit(true);
        let f = s.lit(false);
        assert_eq!(s.mk_and(a, t), a);
        assert_eq!(s.mk_and(a, f), f);
        assert_eq!(s.mk_or(a, f), a);
        assert_eq!(s.mk_or(a, t), t);
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut s = Solver::new(SolverConfig { max_steps: 8 });
        let mut f = s.mk_atom();
        for _ in 0..6 {
            let a = s.mk_atom();
            f = s.mk_and(f, a);
        }
        assert_eq!(s.satisfiable(f), Err(SolverError::BudgetExhausted));
    }

    #[test]
    fn test_unsat_assumption_makes_everything_provable() {
        let mut s = solver();
        let a = s.mk_atom();
        let na = s.mk_not(a);
        s.add_assumption(a);
        s.add_assumption(na);
        let b = s.mk_atom();
        assert_eq!(s.prove(b), Ok(true));
    }
}
