//! This module contains the feasibility-checking abstraction the executor
//! consults at every conditional branch, together with the built-in solver.
//!
//! The built-in [`FoldingSolver`] is deliberately lightweight: it decides
//! what concrete folding and simple equality reasoning can decide, and calls
//! everything else satisfiable. A real SMT backend can be slotted in by
//! implementing [`Solver`] and passing it to the executor, without any
//! change to the exploration itself.

use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use ethnum::U256;

use crate::symexec::{
    path::Constraint,
    value::{Op, SymbolicValue, Var},
};

/// The solver's answer for a set of path constraints.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The constraints can all hold at once; the path is worth exploring.
    Satisfiable,

    /// The constraints contradict each other; the path is pruned.
    Unsatisfiable,

    /// The solver could not decide within its time allowance. The executor
    /// treats this as a reason to abandon the path, never as feasibility.
    Unknown,
}

/// The interface to a constraint solver.
///
/// Implementations must be safe to share between exploration workers.
pub trait Solver: Debug + Send + Sync {
    /// Gets the human-readable name of the solver for logging.
    fn name(&self) -> &str;

    /// Decides whether the provided `constraints` can all hold at once,
    /// spending at most `timeout` doing so.
    fn check(&self, constraints: &[Constraint], timeout: Duration) -> Verdict;
}

/// A shareable solver handle.
pub type DynSolver = Arc<dyn Solver>;

/// The built-in solver.
///
/// It decides a path infeasible when a constraint's condition is concrete
/// and disagrees with the branch taken, or when two equality constraints
/// bind the same variable to different concrete words. Everything else is
/// satisfiable; it never answers [`Verdict::Unknown`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FoldingSolver;

impl FoldingSolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Wraps the solver in the shareable handle the executor takes.
    #[must_use]
    pub fn in_arc(self) -> DynSolver {
        Arc::new(self)
    }
}

impl Solver for FoldingSolver {
    fn name(&self) -> &str {
        "folding"
    }

    fn check(&self, constraints: &[Constraint], _timeout: Duration) -> Verdict {
        let mut bindings: HashMap<Var, U256> = HashMap::new();

        for constraint in constraints {
            if let Some(word) = constraint.condition.as_concrete() {
                let truth = word != U256::ZERO;
                if truth != constraint.holds {
                    return Verdict::Unsatisfiable;
                }
                continue;
            }

            if let Some((var, word)) = equality_binding(constraint) {
                match bindings.get(&var) {
                    Some(bound) if *bound != word => return Verdict::Unsatisfiable,
                    Some(_) => (),
                    None => {
                        bindings.insert(var, word);
                    }
                }
            }
        }

        Verdict::Satisfiable
    }
}

/// Extracts a `var == word` binding from a constraint, where it expresses
/// one.
///
/// `EQ(var, k)` taken true binds `var` to `k`, and so does `ISZERO(var)`
/// taken true (binding to zero). The negated forms are disequalities, which
/// this solver does not track.
fn equality_binding(constraint: &Constraint) -> Option<(Var, U256)> {
    if !constraint.holds {
        return None;
    }

    match &constraint.condition {
        SymbolicValue::Expr { op: Op::Eq, args } if args.len() == 2 => {
            match (&args[0], &args[1]) {
                (SymbolicValue::Symbolic(var), SymbolicValue::Concrete(word))
                | (SymbolicValue::Concrete(word), SymbolicValue::Symbolic(var)) => {
                    Some((*var, *word))
                }
                _ => None,
            }
        }
        SymbolicValue::Expr { op: Op::IsZero, args } if args.len() == 1 => match &args[0] {
            SymbolicValue::Symbolic(var) => Some((*var, U256::ZERO)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symexec::value::VarOrigin;

    fn taken(condition: SymbolicValue, holds: bool) -> Constraint {
        Constraint {
            condition,
            holds,
            origin_offset: 0,
        }
    }

    #[test]
    fn an_empty_constraint_set_is_satisfiable() {
        let verdict = FoldingSolver::new().check(&[], Duration::from_millis(1));
        assert_eq!(verdict, Verdict::Satisfiable);
    }

    #[test]
    fn a_concrete_false_condition_taken_true_is_unsatisfiable() {
        let constraints = [taken(SymbolicValue::concrete(0u8), true)];
        let verdict = FoldingSolver::new().check(&constraints, Duration::from_millis(1));
        assert_eq!(verdict, Verdict::Unsatisfiable);
    }

    #[test]
    fn conflicting_equality_bindings_are_unsatisfiable() {
        let var = SymbolicValue::var(VarOrigin::CallData, 0);
        let constraints = [
            taken(
                SymbolicValue::Expr {
                    op:   Op::Eq,
                    args: std::sync::Arc::from(vec![var.clone(), SymbolicValue::concrete(1u8)]),
                },
                true,
            ),
            taken(
                SymbolicValue::Expr {
                    op:   Op::Eq,
                    args: std::sync::Arc::from(vec![var, SymbolicValue::concrete(2u8)]),
                },
                true,
            ),
        ];
        let verdict = FoldingSolver::new().check(&constraints, Duration::from_millis(1));
        assert_eq!(verdict, Verdict::Unsatisfiable);
    }

    #[test]
    fn symbolic_conditions_default_to_satisfiable() {
        let constraints = [taken(SymbolicValue::var(VarOrigin::CallData, 0), true)];
        let verdict = FoldingSolver::new().check(&constraints, Duration::from_millis(1));
        assert_eq!(verdict, Verdict::Satisfiable);
    }
}
