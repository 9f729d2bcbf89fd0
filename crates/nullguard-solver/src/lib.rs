//! Boolean formula arena and satisfiability facade.
//!
//! All formulas are built through the [`Solver`] manager, which hash-conses
//! nodes so structurally identical formulas share one id. The decision
//! procedure is a small backtracking search with a step budget; exhausting
//! the budget is an error, never a wrong answer.

pub mod formula;
pub mod solver;

pub use formula::{Atom, FormulaId};
pub use solver::{Solver, SolverConfig, SolverError};
