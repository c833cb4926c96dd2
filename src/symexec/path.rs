//! This module contains the record of a single explored execution path: the
//! blocks it visited, the side effects it performed, and how it ended.

use crate::{
    cfg::FaultReason,
    symexec::value::SymbolicValue,
};

/// The identifier of a path within an exploration. Identifiers are assigned
/// in discovery order, which is deterministic for a fixed worker count.
pub type PathId = u32;

/// Why the executor gave up on a path before it reached a natural end.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AbandonReason {
    /// The path budget, depth budget, or wall-clock budget ran out.
    BudgetExceeded,

    /// The path re-entered a loop more times than the iteration cap allows.
    LoopBound,

    /// The solver could not decide the feasibility of the path's branch
    /// condition in time.
    SolverTimeout,
}

/// How an explored path ended.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PathOutcome {
    /// The path reached `STOP` or `RETURN`.
    Halt,

    /// The path reached `REVERT`.
    Revert,

    /// The path reached a modelled execution fault.
    Fault(FaultReason),

    /// The path reached `SELFDESTRUCT`.
    SelfDestruct,

    /// The executor stopped exploring the path without it ending.
    Abandoned(AbandonReason),
}

/// The kind of an external call instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// A side effect recorded while executing a path, in execution order.
///
/// Blocks are referred to by their start offset rather than their graph
/// identifier so that effects remain meaningful in serialised reports.
#[derive(Clone, Debug)]
pub enum Effect {
    /// An `SLOAD` of the given slot.
    StorageRead {
        slot:  SymbolicValue,
        block: u32,
    },

    /// An `SSTORE` to the given slot.
    StorageWrite {
        slot:  SymbolicValue,
        value: SymbolicValue,
        block: u32,
    },

    /// An external call.
    ExternalCall {
        kind:   CallKind,
        target: SymbolicValue,
        value:  Option<SymbolicValue>,

        /// The success word the call pushed. A later branch condition that
        /// references this marks the call as checked.
        result: SymbolicValue,

        /// Whether any subsequent branch condition on this path inspected
        /// the call's success word.
        checked: bool,

        /// The byte offset of the call instruction.
        offset: u32,
        block:  u32,
    },

    /// A `LOG0..=LOG4` event emission.
    Event {
        topic_count: u8,
        block:       u32,
    },

    /// A `SELFDESTRUCT` with its beneficiary address.
    SelfDestruct {
        beneficiary: SymbolicValue,

        /// The byte offset of the instruction.
        offset: u32,
        block:  u32,
    },
}

/// A branch condition accumulated along a path.
#[derive(Clone, Debug)]
pub struct Constraint {
    /// The symbolic word the branch tested.
    pub condition: SymbolicValue,

    /// Whether the path took the branch where the condition is non-zero.
    pub holds: bool,

    /// The byte offset of the `JUMPI` that contributed this constraint.
    pub origin_offset: u32,
}

/// A fully explored execution path.
#[derive(Clone, Debug)]
pub struct Path {
    /// The path's identifier within its exploration.
    pub id: PathId,

    /// The start offsets of the blocks the path visited, in order.
    pub block_sequence: Vec<u32>,

    /// How the path ended.
    pub outcome: PathOutcome,

    /// Whether the solver considered every branch along the path satisfiable.
    /// Paths sealed through an `Unknown` verdict are recorded as infeasible
    /// and abandoned rather than silently trusted.
    pub feasible: bool,

    /// The side effects the path performed, in execution order.
    pub effects: Vec<Effect>,

    /// The branch conditions accumulated along the path.
    pub constraints: Vec<Constraint>,

    /// The deepest the modelled stack got on this path.
    pub max_stack_depth: usize,
}

impl Path {
    /// Checks whether the path ended in a state whose effects would persist
    /// on chain. Reverted and faulted paths discard their effects.
    #[must_use]
    pub fn commits_state(&self) -> bool {
        matches!(self.outcome, PathOutcome::Halt | PathOutcome::SelfDestruct)
    }
}
