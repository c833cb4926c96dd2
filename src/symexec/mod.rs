//! This module contains the bounded symbolic executor: a work-list
//! exploration of the control-flow graph that carries a symbolic machine
//! state along every feasible path, consulting a constraint solver at each
//! conditional branch and sealing finished paths for the detectors to
//! consume.
//!
//! # Boundedness
//!
//! Exploration is bounded four ways: a cap on the number of paths, a cap on
//! the number of blocks any one path may visit, a per-path cap on loop
//! iterations, and a wall-clock allowance enforced through the watchdog.
//! Hitting any bound seals the affected paths as abandoned rather than
//! erroring; an incomplete exploration is still a useful one.

pub mod path;
pub mod solver;
pub mod state;
pub mod value;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use dashmap::DashSet;
use ethnum::U256;

use crate::{
    cfg::{analysis::CfgAnalysis, BlockId, Cfg, FaultReason},
    constant::{
        DEFAULT_EXPLORATION_WORKERS, DEFAULT_LOOP_ITERATION_CAP, DEFAULT_MAXIMUM_PATHS,
        DEFAULT_MAXIMUM_PATH_DEPTH, DEFAULT_MAXIMUM_TIME_MS, DEFAULT_SOLVER_TIMEOUT_MS,
    },
    disassembly::Instruction,
    opcode,
    symexec::{
        path::{AbandonReason, CallKind, Constraint, Effect, Path, PathId, PathOutcome},
        solver::{DynSolver, Verdict},
        state::ExecutionState,
        value::{Op, SymbolicValue, VarOrigin},
    },
    watchdog::DynWatchdog,
};

/// The resource limits under which an exploration runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Budget {
    /// The maximum number of paths to explore.
    pub maximum_paths: usize,

    /// The maximum number of blocks any one path may visit.
    pub maximum_depth: usize,

    /// The wall-clock allowance for the whole exploration, in milliseconds.
    pub maximum_time_ms: u64,

    /// How many times one path may re-enter the same loop header.
    pub loop_iteration_cap: usize,

    /// The per-query time allowance handed to the solver, in milliseconds.
    pub solver_timeout_ms: u64,

    /// The number of exploration workers. One worker gives a bit-for-bit
    /// deterministic exploration order.
    pub workers: usize,
}

impl Budget {
    /// Constructs the default budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of paths to explore.
    #[must_use]
    pub fn with_maximum_paths(mut self, paths: usize) -> Self {
        self.maximum_paths = paths;
        self
    }

    /// Sets the maximum number of blocks any one path may visit.
    #[must_use]
    pub fn with_maximum_depth(mut self, depth: usize) -> Self {
        self.maximum_depth = depth;
        self
    }

    /// Sets the wall-clock allowance for the exploration.
    #[must_use]
    pub fn with_maximum_time_ms(mut self, milliseconds: u64) -> Self {
        self.maximum_time_ms = milliseconds;
        self
    }

    /// Sets how many times one path may re-enter the same loop header.
    #[must_use]
    pub fn with_loop_iteration_cap(mut self, cap: usize) -> Self {
        self.loop_iteration_cap = cap;
        self
    }

    /// Sets the per-query time allowance handed to the solver.
    #[must_use]
    pub fn with_solver_timeout_ms(mut self, milliseconds: u64) -> Self {
        self.solver_timeout_ms = milliseconds;
        self
    }

    /// Sets the number of exploration workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            maximum_paths:      DEFAULT_MAXIMUM_PATHS,
            maximum_depth:      DEFAULT_MAXIMUM_PATH_DEPTH,
            maximum_time_ms:    DEFAULT_MAXIMUM_TIME_MS,
            loop_iteration_cap: DEFAULT_LOOP_ITERATION_CAP,
            solver_timeout_ms:  DEFAULT_SOLVER_TIMEOUT_MS,
            workers:            DEFAULT_EXPLORATION_WORKERS,
        }
    }
}

/// What an exploration produced.
#[derive(Clone, Debug)]
pub struct ExplorationResult {
    /// The sealed paths, in identifier order.
    pub paths: Vec<Path>,

    /// The start offsets of every block any path visited.
    pub visited: HashSet<u32>,

    /// The number of paths explored, equal to `paths.len()`.
    pub paths_explored: usize,

    /// How many paths were sealed by a budget or solver limit rather than by
    /// reaching a natural end.
    pub abandoned: usize,
}

/// A path mid-exploration, waiting on the work list.
struct WorkItem {
    id:    PathId,
    block: BlockId,
    state: ExecutionState,
}

/// The state shared between exploration workers.
struct Shared {
    worklist:  Mutex<Vec<WorkItem>>,
    in_flight: AtomicUsize,
    started:   AtomicUsize,
    next_id:   AtomicU32,
    sealed:    Mutex<Vec<Path>>,
    visited:   DashSet<u32>,
    abandoned: AtomicUsize,
}

/// Where a block hands control after symbolic execution of its instructions.
enum Control {
    /// The block ran to its end without an explicit transfer.
    Fallthrough,

    /// `JUMP` with the popped target word.
    Jump(SymbolicValue),

    /// `JUMPI` with the popped target and condition words.
    JumpI {
        target:    SymbolicValue,
        condition: SymbolicValue,
    },

    Halt,
    Revert,
    SelfDestruct,
}

/// The symbolic executor.
///
/// The executor borrows the graph and its analysis; it owns nothing but its
/// configuration, so constructing one is cheap.
pub struct Executor<'c> {
    cfg:      &'c Cfg,
    analysis: &'c CfgAnalysis,
    solver:   DynSolver,
    budget:   Budget,
    watchdog: DynWatchdog,
}

impl<'c> Executor<'c> {
    /// Constructs a new executor over the provided graph.
    pub fn new(
        cfg: &'c Cfg,
        analysis: &'c CfgAnalysis,
        solver: DynSolver,
        budget: Budget,
        watchdog: DynWatchdog,
    ) -> Self {
        Self {
            cfg,
            analysis,
            solver,
            budget,
            watchdog,
        }
    }

    /// Runs the exploration to completion and returns the sealed paths.
    #[must_use]
    pub fn execute(&self) -> ExplorationResult {
        let deadline = Instant::now() + Duration::from_millis(self.budget.maximum_time_ms);

        let initial = WorkItem {
            id:    0,
            block: self.cfg.entry(),
            state: ExecutionState::new(self.cfg.entry()),
        };
        let shared = Shared {
            worklist:  Mutex::new(vec![initial]),
            in_flight: AtomicUsize::new(0),
            started:   AtomicUsize::new(1),
            next_id:   AtomicU32::new(1),
            sealed:    Mutex::new(Vec::new()),
            visited:   DashSet::new(),
            abandoned: AtomicUsize::new(0),
        };

        if self.budget.workers <= 1 {
            self.worker(&shared, deadline);
        } else {
            thread::scope(|scope| {
                for _ in 0..self.budget.workers {
                    scope.spawn(|| self.worker(&shared, deadline));
                }
            });
        }

        let mut paths = shared
            .sealed
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        paths.sort_by_key(|path| path.id);

        let visited = shared.visited.into_iter().collect();
        let paths_explored = paths.len();
        let abandoned = shared.abandoned.load(Ordering::Relaxed);

        ExplorationResult {
            paths,
            visited,
            paths_explored,
            abandoned,
        }
    }

    /// One worker's loop: pop paths off the work list and drive each to a
    /// sealed outcome.
    fn worker(&self, shared: &Shared, deadline: Instant) {
        loop {
            let item = {
                let mut worklist = shared
                    .worklist
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let item = worklist.pop();
                if item.is_some() {
                    // Claimed under the lock so an idle worker cannot see an
                    // empty list and zero in-flight at once.
                    shared.in_flight.fetch_add(1, Ordering::SeqCst);
                }
                item
            };

            match item {
                Some(item) => {
                    self.drive(item, shared, deadline);
                    shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                None => {
                    if shared.in_flight.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
    }

    /// Drives one path from its current block to a sealed outcome.
    fn drive(&self, item: WorkItem, shared: &Shared, deadline: Instant) {
        let WorkItem {
            id,
            mut block,
            mut state,
        } = item;
        let mut instructions_since_poll: usize = 0;

        loop {
            let Some(basic_block) = self.cfg.block(block) else {
                self.seal(shared, id, state, PathOutcome::Fault(FaultReason::InvalidOpcode));
                return;
            };
            shared.visited.insert(basic_block.start_offset);
            let block_offset = basic_block.start_offset;

            if state.trail.len() > self.budget.maximum_depth {
                shared.abandoned.fetch_add(1, Ordering::Relaxed);
                self.seal(
                    shared,
                    id,
                    state,
                    PathOutcome::Abandoned(AbandonReason::BudgetExceeded),
                );
                return;
            }

            // Execute the block body.
            let mut control = Control::Fallthrough;
            let mut fault: Option<FaultReason> = None;
            for instruction in &basic_block.instructions {
                instructions_since_poll += 1;
                if instructions_since_poll >= self.watchdog.poll_every()
                    || instructions_since_poll >= 64
                {
                    instructions_since_poll = 0;
                    if self.watchdog.should_stop() || Instant::now() >= deadline {
                        shared.abandoned.fetch_add(1, Ordering::Relaxed);
                        self.seal(
                            shared,
                            id,
                            state,
                            PathOutcome::Abandoned(AbandonReason::BudgetExceeded),
                        );
                        return;
                    }
                }

                match step(&mut state, instruction, block_offset) {
                    Ok(Some(transfer)) => {
                        control = transfer;
                        break;
                    }
                    Ok(None) => (),
                    Err(reason) => {
                        fault = Some(reason);
                        break;
                    }
                }
            }

            if let Some(reason) = fault {
                self.seal(shared, id, state, PathOutcome::Fault(reason));
                return;
            }

            // Resolve the transfer into the next block, or seal the path.
            match control {
                Control::Halt => {
                    self.seal(shared, id, state, PathOutcome::Halt);
                    return;
                }
                Control::Revert => {
                    self.seal(shared, id, state, PathOutcome::Revert);
                    return;
                }
                Control::SelfDestruct => {
                    self.seal(shared, id, state, PathOutcome::SelfDestruct);
                    return;
                }
                Control::Fallthrough => {
                    let end = basic_block.end_offset;
                    match self.cfg.block_at(end) {
                        Some(next) => match self.enter(&mut state, next) {
                            Ok(()) => block = next,
                            Err(reason) => {
                                shared.abandoned.fetch_add(1, Ordering::Relaxed);
                                self.seal(shared, id, state, PathOutcome::Abandoned(reason));
                                return;
                            }
                        },
                        // Walking off the end of the code halts.
                        None => {
                            self.seal(shared, id, state, PathOutcome::Halt);
                            return;
                        }
                    }
                }
                Control::Jump(target) => match self.resolve_target(&target) {
                    Ok(next) => match self.enter(&mut state, next) {
                        Ok(()) => block = next,
                        Err(reason) => {
                            shared.abandoned.fetch_add(1, Ordering::Relaxed);
                            self.seal(shared, id, state, PathOutcome::Abandoned(reason));
                            return;
                        }
                    },
                    Err(reason) => {
                        self.seal(shared, id, state, PathOutcome::Fault(reason));
                        return;
                    }
                },
                Control::JumpI { target, condition } => {
                    match self.branch(id, block, basic_block.end_offset, target, condition, state, shared) {
                        Some((next, continued)) => {
                            state = continued;
                            block = next;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Handles a conditional branch: concrete conditions follow their one
    /// live edge, symbolic conditions fork the path under the solver's
    /// supervision.
    ///
    /// Returns the block and state to continue this worker's path with, or
    /// [`None`] when the path was sealed.
    #[allow(clippy::too_many_arguments)]
    fn branch(
        &self,
        id: PathId,
        block: BlockId,
        fall_offset: u32,
        target: SymbolicValue,
        condition: SymbolicValue,
        mut state: ExecutionState,
        shared: &Shared,
    ) -> Option<(BlockId, ExecutionState)> {
        let branch_offset = self
            .cfg
            .block(block)
            .and_then(|b| b.last_instruction().map(|i| i.offset))
            .unwrap_or(fall_offset);

        // A branch that inspects a call's success word marks that call as
        // checked, whichever way the branch goes.
        mark_checked_calls(&mut state, &condition);

        if let Some(word) = condition.as_concrete() {
            return if word == U256::ZERO {
                self.follow_fall(id, fall_offset, state, shared)
            } else {
                match self.resolve_target(&target) {
                    Ok(next) => self.follow(id, next, state, shared),
                    Err(reason) => {
                        self.seal(shared, id, state, PathOutcome::Fault(reason));
                        None
                    }
                }
            };
        }

        let timeout = Duration::from_millis(self.budget.solver_timeout_ms);

        let mut taken = state.clone();
        taken.constraints.push(Constraint {
            condition:     condition.clone(),
            holds:         true,
            origin_offset: branch_offset,
        });
        let taken_verdict = self.solver.check(&taken.constraints, timeout);

        state.constraints.push(Constraint {
            condition,
            holds: false,
            origin_offset: branch_offset,
        });
        let fall_verdict = self.solver.check(&state.constraints, timeout);

        if taken_verdict == Verdict::Unknown || fall_verdict == Verdict::Unknown {
            shared.abandoned.fetch_add(1, Ordering::Relaxed);
            let mut sealed_state = state;
            let outcome = PathOutcome::Abandoned(AbandonReason::SolverTimeout);
            sealed_state.constraints.pop();
            self.seal_infeasible(shared, id, sealed_state, outcome);
            return None;
        }

        // Enqueue the taken branch as a new path where both sides are live;
        // otherwise continue in place along whichever side is.
        if taken_verdict == Verdict::Satisfiable {
            match self.resolve_target(&target) {
                Ok(next) => {
                    if fall_verdict == Verdict::Satisfiable {
                        self.fork(next, taken, shared);
                        return self.follow_fall(id, fall_offset, state, shared);
                    }
                    return self.follow(id, next, taken, shared);
                }
                Err(reason) => {
                    if fall_verdict == Verdict::Satisfiable {
                        self.fork_fault(taken, reason, shared);
                        return self.follow_fall(id, fall_offset, state, shared);
                    }
                    self.seal(shared, id, taken, PathOutcome::Fault(reason));
                    return None;
                }
            }
        }

        if fall_verdict == Verdict::Satisfiable {
            return self.follow_fall(id, fall_offset, state, shared);
        }

        // Both sides contradict the path condition. The path cannot actually
        // reach past this branch; seal it where it stands.
        self.seal_infeasible(shared, id, state, PathOutcome::Revert);
        None
    }

    /// Continues the current path into `next`, enforcing the loop cap.
    fn follow(
        &self,
        id: PathId,
        next: BlockId,
        mut state: ExecutionState,
        shared: &Shared,
    ) -> Option<(BlockId, ExecutionState)> {
        match self.enter(&mut state, next) {
            Ok(()) => Some((next, state)),
            Err(reason) => {
                shared.abandoned.fetch_add(1, Ordering::Relaxed);
                self.seal(shared, id, state, PathOutcome::Abandoned(reason));
                None
            }
        }
    }

    /// Continues the current path into the fall-through block at
    /// `fall_offset`.
    fn follow_fall(
        &self,
        id: PathId,
        fall_offset: u32,
        state: ExecutionState,
        shared: &Shared,
    ) -> Option<(BlockId, ExecutionState)> {
        match self.cfg.block_at(fall_offset) {
            Some(next) => self.follow(id, next, state, shared),
            None => {
                self.seal(shared, id, state, PathOutcome::Halt);
                None
            }
        }
    }

    /// Enqueues the forked branch as a new path, if the path budget allows
    /// another.
    fn fork(&self, next: BlockId, mut state: ExecutionState, shared: &Shared) {
        let admitted = shared
            .started
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.budget.maximum_paths).then_some(count + 1)
            })
            .is_ok();
        if !admitted {
            shared.abandoned.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.enter(&mut state, next).is_err() {
            // The forked side immediately trips the loop cap.
            shared.abandoned.fetch_add(1, Ordering::Relaxed);
            let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
            self.seal(
                shared,
                id,
                state,
                PathOutcome::Abandoned(AbandonReason::LoopBound),
            );
            return;
        }

        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        shared
            .worklist
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WorkItem {
                id,
                block: next,
                state,
            });
    }

    /// Seals the forked branch immediately with a fault, for branches whose
    /// taken side jumps somewhere invalid.
    fn fork_fault(&self, state: ExecutionState, reason: FaultReason, shared: &Shared) {
        let admitted = shared
            .started
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.budget.maximum_paths).then_some(count + 1)
            })
            .is_ok();
        if !admitted {
            shared.abandoned.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.seal(shared, id, state, PathOutcome::Fault(reason));
    }

    /// Moves `state` into `next`, counting loop-header entries against the
    /// iteration cap.
    fn enter(&self, state: &mut ExecutionState, next: BlockId) -> Result<(), AbandonReason> {
        if let Some(loop_index) = self.analysis.loop_of.get(&next) {
            if self.analysis.loops[*loop_index].header == next {
                let count = state.loop_counts.entry(*loop_index).or_insert(0);
                *count += 1;
                if *count > self.budget.loop_iteration_cap {
                    return Err(AbandonReason::LoopBound);
                }
            }
        }
        state.trail.push(next);
        Ok(())
    }

    /// Resolves a popped jump-target word into a block, or the fault that
    /// jumping there raises.
    fn resolve_target(&self, target: &SymbolicValue) -> Result<BlockId, FaultReason> {
        let Some(word) = target.as_concrete() else {
            return Err(FaultReason::IndirectJump);
        };
        let offset = u32::try_from(word).map_err(|_| FaultReason::InvalidTarget(u32::MAX))?;
        match self.cfg.block_at(offset) {
            Some(next) if self.cfg.block(next).is_some_and(|b| b.is_jump_target()) => Ok(next),
            _ => Err(FaultReason::InvalidTarget(offset)),
        }
    }

    /// Seals a path with the provided outcome.
    fn seal(&self, shared: &Shared, id: PathId, state: ExecutionState, outcome: PathOutcome) {
        self.seal_with(shared, id, state, outcome, true);
    }

    /// Seals a path whose feasibility could not be established.
    fn seal_infeasible(
        &self,
        shared: &Shared,
        id: PathId,
        state: ExecutionState,
        outcome: PathOutcome,
    ) {
        self.seal_with(shared, id, state, outcome, false);
    }

    fn seal_with(
        &self,
        shared: &Shared,
        id: PathId,
        state: ExecutionState,
        outcome: PathOutcome,
        feasible: bool,
    ) {
        let block_sequence = state
            .trail
            .iter()
            .filter_map(|block| self.cfg.block(*block).map(|b| b.start_offset))
            .collect();

        let path = Path {
            id,
            block_sequence,
            outcome,
            feasible,
            effects: state.effects,
            constraints: state.constraints,
            max_stack_depth: state.max_stack_depth,
        };

        shared
            .sealed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }
}

/// Marks any external-call effect whose success word appears in `condition`
/// as checked.
fn mark_checked_calls(state: &mut ExecutionState, condition: &SymbolicValue) {
    for effect in &mut state.effects {
        if let Effect::ExternalCall {
            result, checked, ..
        } = effect
        {
            if *checked {
                continue;
            }
            if let SymbolicValue::Symbolic(result_var) = result {
                let result_var = *result_var;
                if condition.references(&|var| *var == result_var) {
                    *checked = true;
                }
            }
        }
    }
}

/// Executes one instruction against `state`.
///
/// Returns `Ok(Some(control))` when the instruction transfers control,
/// `Ok(None)` when execution continues with the next instruction, and a
/// fault when the machine state cannot support the instruction.
#[allow(clippy::too_many_lines)]
fn step(
    state: &mut ExecutionState,
    instruction: &Instruction,
    block: u32,
) -> Result<Option<Control>, FaultReason> {
    use opcode as op;

    let byte = instruction.opcode;

    // The push, dup and swap families are handled by range before the
    // one-byte dispatch.
    if op::is_push(byte) {
        let word = instruction.immediate_word().unwrap_or(U256::ZERO);
        state.stack.push(SymbolicValue::Concrete(word))?;
        state.note_stack_depth();
        return Ok(None);
    }
    if (op::DUP1..=op::DUP16).contains(&byte) {
        state.stack.dup((byte - op::DUP1 + 1) as usize)?;
        state.note_stack_depth();
        return Ok(None);
    }
    if (op::SWAP1..=op::SWAP16).contains(&byte) {
        state.stack.swap((byte - op::SWAP1 + 1) as usize)?;
        return Ok(None);
    }
    if (op::LOG0..=op::LOG4).contains(&byte) {
        let topic_count = byte - op::LOG0;
        for _ in 0..(2 + topic_count) {
            state.stack.pop()?;
        }
        state.effects.push(Effect::Event { topic_count, block });
        return Ok(None);
    }

    match byte {
        op::STOP => return Ok(Some(Control::Halt)),

        op::ADD => binary(state, Op::Add)?,
        op::MUL => binary(state, Op::Mul)?,
        op::SUB => binary(state, Op::Sub)?,
        op::DIV => binary(state, Op::Div)?,
        op::SDIV => binary(state, Op::SDiv)?,
        op::MOD => binary(state, Op::Mod)?,
        op::SMOD => binary(state, Op::SMod)?,
        op::ADDMOD => ternary(state, Op::AddMod)?,
        op::MULMOD => ternary(state, Op::MulMod)?,
        op::EXP => binary(state, Op::Exp)?,
        op::SIGNEXTEND => binary(state, Op::SignExtend)?,

        op::LT => binary(state, Op::Lt)?,
        op::GT => binary(state, Op::Gt)?,
        op::SLT => binary(state, Op::SLt)?,
        op::SGT => binary(state, Op::SGt)?,
        op::EQ => binary(state, Op::Eq)?,
        op::ISZERO => unary(state, Op::IsZero)?,
        op::AND => binary(state, Op::And)?,
        op::OR => binary(state, Op::Or)?,
        op::XOR => binary(state, Op::Xor)?,
        op::NOT => unary(state, Op::Not)?,
        op::BYTE => binary(state, Op::Byte)?,
        op::SHL => binary(state, Op::Shl)?,
        op::SHR => binary(state, Op::Shr)?,
        op::SAR => binary(state, Op::Sar)?,

        op::KECCAK256 => {
            let offset = state.stack.pop()?;
            let length = state.stack.pop()?;
            let hash = keccak_value(state, &offset, &length);
            state.stack.push(hash)?;
            state.note_stack_depth();
        }

        op::ADDRESS => push_environment(state, VarOrigin::AccountData)?,
        op::BALANCE => {
            state.stack.pop()?;
            let balance = state.fresh_var(VarOrigin::Balance);
            state.stack.push(balance)?;
            state.note_stack_depth();
        }
        op::ORIGIN => push_environment(state, VarOrigin::TxOrigin)?,
        op::CALLER => push_environment(state, VarOrigin::Caller)?,
        op::CALLVALUE => push_environment(state, VarOrigin::CallValue)?,
        op::CALLDATALOAD => {
            let offset = state.stack.pop()?;
            let word = state.calldata_word(&offset);
            state.stack.push(word)?;
            state.note_stack_depth();
        }
        op::CALLDATASIZE => push_environment(state, VarOrigin::CallDataSize)?,
        op::CALLDATACOPY | op::CODECOPY | op::RETURNDATACOPY => {
            for _ in 0..3 {
                state.stack.pop()?;
            }
            state.memory.poison();
        }
        op::CODESIZE => push_environment(state, VarOrigin::AccountData)?,
        op::GASPRICE => push_environment(state, VarOrigin::BlockEnvironment)?,
        op::EXTCODESIZE | op::EXTCODEHASH => {
            state.stack.pop()?;
            let value = state.fresh_var(VarOrigin::AccountData);
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::EXTCODECOPY => {
            for _ in 0..4 {
                state.stack.pop()?;
            }
            state.memory.poison();
        }
        op::RETURNDATASIZE => push_environment(state, VarOrigin::AccountData)?,
        op::BLOCKHASH => {
            state.stack.pop()?;
            let value = state.fresh_var(VarOrigin::BlockEnvironment);
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::COINBASE | op::PREVRANDAO | op::GASLIMIT | op::CHAINID | op::BASEFEE => {
            push_environment(state, VarOrigin::BlockEnvironment)?;
        }
        op::TIMESTAMP => push_environment(state, VarOrigin::Timestamp)?,
        op::NUMBER => push_environment(state, VarOrigin::BlockNumber)?,
        op::SELFBALANCE => push_environment(state, VarOrigin::Balance)?,

        op::POP => {
            state.stack.pop()?;
        }
        op::MLOAD => {
            let offset = state.stack.pop()?;
            // Minted ahead of the read because the miss closure cannot also
            // borrow the state.
            let fallback = state.fresh_var(VarOrigin::Memory);
            let value = state.memory.read_word(&offset, &mut || fallback.clone());
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::MSTORE | op::MSTORE8 => {
            let offset = state.stack.pop()?;
            let value = state.stack.pop()?;
            state.memory.write_word(&offset, value);
        }
        op::SLOAD => {
            let slot = state.stack.pop()?;
            let value = state.storage.read(&slot);
            state.effects.push(Effect::StorageRead {
                slot: slot.clone(),
                block,
            });
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::SSTORE => {
            let slot = state.stack.pop()?;
            let value = state.stack.pop()?;
            state.effects.push(Effect::StorageWrite {
                slot:  slot.clone(),
                value: value.clone(),
                block,
            });
            state.storage.write(slot, value);
        }
        op::JUMP => {
            let target = state.stack.pop()?;
            return Ok(Some(Control::Jump(target)));
        }
        op::JUMPI => {
            let target = state.stack.pop()?;
            let condition = state.stack.pop()?;
            return Ok(Some(Control::JumpI { target, condition }));
        }
        op::PC => {
            state
                .stack
                .push(SymbolicValue::Concrete(U256::from(instruction.offset)))?;
            state.note_stack_depth();
        }
        op::MSIZE => {
            let value = state.fresh_var(VarOrigin::Memory);
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::GAS => {
            let value = state.fresh_var(VarOrigin::Gas);
            state.stack.push(value)?;
            state.note_stack_depth();
        }
        op::JUMPDEST => (),

        op::CREATE | op::CREATE2 => {
            let argument_count = if byte == op::CREATE { 3 } else { 4 };
            for _ in 0..argument_count {
                state.stack.pop()?;
            }
            let address = state.fresh_var(VarOrigin::Create);
            state.stack.push(address)?;
            state.note_stack_depth();
        }
        op::CALL | op::CALLCODE => {
            state.stack.pop()?; // gas
            let target = state.stack.pop()?;
            let value = state.stack.pop()?;
            for _ in 0..4 {
                state.stack.pop()?;
            }
            external_call(
                state,
                if byte == op::CALL {
                    CallKind::Call
                } else {
                    CallKind::CallCode
                },
                target,
                Some(value),
                instruction.offset,
                block,
            )?;
        }
        op::DELEGATECALL | op::STATICCALL => {
            state.stack.pop()?; // gas
            let target = state.stack.pop()?;
            for _ in 0..4 {
                state.stack.pop()?;
            }
            external_call(
                state,
                if byte == op::DELEGATECALL {
                    CallKind::DelegateCall
                } else {
                    CallKind::StaticCall
                },
                target,
                None,
                instruction.offset,
                block,
            )?;
        }
        op::RETURN => {
            state.stack.pop()?;
            state.stack.pop()?;
            return Ok(Some(Control::Halt));
        }
        op::REVERT => {
            state.stack.pop()?;
            state.stack.pop()?;
            return Ok(Some(Control::Revert));
        }
        op::SELFDESTRUCT => {
            let beneficiary = state.stack.pop()?;
            state.effects.push(Effect::SelfDestruct {
                beneficiary,
                offset: instruction.offset,
                block,
            });
            return Ok(Some(Control::SelfDestruct));
        }

        // INVALID and every unassigned byte.
        _ => return Err(FaultReason::InvalidOpcode),
    }

    Ok(None)
}

/// Pops one operand and pushes `op` applied to it.
fn unary(state: &mut ExecutionState, op: Op) -> Result<(), FaultReason> {
    let a = state.stack.pop()?;
    state.stack.push(SymbolicValue::unary(op, a))?;
    state.note_stack_depth();
    Ok(())
}

/// Pops two operands and pushes `op` applied to them.
fn binary(state: &mut ExecutionState, op: Op) -> Result<(), FaultReason> {
    let a = state.stack.pop()?;
    let b = state.stack.pop()?;
    state.stack.push(SymbolicValue::binary(op, a, b))?;
    state.note_stack_depth();
    Ok(())
}

/// Pops three operands and pushes `op` applied to them.
fn ternary(state: &mut ExecutionState, op: Op) -> Result<(), FaultReason> {
    let a = state.stack.pop()?;
    let b = state.stack.pop()?;
    let c = state.stack.pop()?;
    state.stack.push(SymbolicValue::ternary(op, a, b, c))?;
    state.note_stack_depth();
    Ok(())
}

/// Pushes the cached environment word for `origin`.
fn push_environment(state: &mut ExecutionState, origin: VarOrigin) -> Result<(), FaultReason> {
    let value = state.environment_word(origin);
    state.stack.push(value)?;
    state.note_stack_depth();
    Ok(())
}

/// Builds the symbolic hash for `KECCAK256` over `[offset, offset + length)`.
///
/// When the extent is concrete and small, the hashed words are read out of
/// the memory model so mapping keys stay visible to the storage analyser.
/// Anything else hashes an opaque stand-in.
fn keccak_value(
    state: &mut ExecutionState,
    offset: &SymbolicValue,
    length: &SymbolicValue,
) -> SymbolicValue {
    const MAXIMUM_TRACKED_PREIMAGE_WORDS: usize = 4;

    let preimage = match (offset.as_concrete(), length.as_concrete()) {
        (Some(base), Some(len))
            if len <= U256::from((MAXIMUM_TRACKED_PREIMAGE_WORDS * 32) as u64) =>
        {
            let words = (len.as_usize() + 31) / 32;
            let fallback = state.fresh_var(VarOrigin::Memory);
            state.memory.read_words(base, words, &mut || fallback.clone())
        }
        _ => vec![state.fresh_var(VarOrigin::Memory)],
    };

    SymbolicValue::expr(Op::Keccak, preimage)
}

/// Records an external call effect and pushes its success word.
fn external_call(
    state: &mut ExecutionState,
    kind: CallKind,
    target: SymbolicValue,
    value: Option<SymbolicValue>,
    offset: u32,
    block: u32,
) -> Result<(), FaultReason> {
    let result = state.fresh_var(VarOrigin::CallResult);
    state.effects.push(Effect::ExternalCall {
        kind,
        target,
        value,
        result: result.clone(),
        checked: false,
        offset,
        block,
    });
    state.stack.push(result)?;
    state.note_stack_depth();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cfg,
        disassembly::InstructionStream,
        symexec::solver::FoldingSolver,
        watchdog::LazyWatchdog,
    };

    fn explore(bytes: &[u8]) -> ExplorationResult {
        let stream = InstructionStream::try_from(bytes).unwrap();
        let cfg = cfg::build(&stream);
        let analysis = cfg::analysis::analyze(&cfg);
        Executor::new(
            &cfg,
            &analysis,
            FoldingSolver::new().in_arc(),
            Budget::new(),
            LazyWatchdog.in_arc(),
        )
        .execute()
    }

    #[test]
    fn straight_line_code_is_one_halting_path() {
        // PUSH1 0x01; PUSH1 0x02; ADD; STOP
        let result = explore(&[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);

        assert_eq!(result.paths_explored, 1);
        let path = &result.paths[0];
        assert_eq!(path.outcome, PathOutcome::Halt);
        assert_eq!(path.max_stack_depth, 2);
        assert!(path.effects.is_empty());
    }

    #[test]
    fn a_symbolic_branch_forks_into_two_paths() {
        // CALLDATALOAD-conditioned branch:
        //   PUSH1 0x00; CALLDATALOAD; PUSH1 0x08; JUMPI; STOP; JUMPDEST; STOP
        let result = explore(&[0x60, 0x00, 0x35, 0x60, 0x08, 0x57, 0x00, 0x00, 0x5b, 0x00]);

        assert_eq!(result.paths_explored, 2);
        assert!(result
            .paths
            .iter()
            .all(|path| path.outcome == PathOutcome::Halt));
        assert!(result
            .paths
            .iter()
            .all(|path| path.constraints.len() == 1));
    }

    #[test]
    fn a_concrete_branch_takes_only_its_live_side() {
        // PUSH1 0x01; PUSH1 0x07; JUMPI; STOP; JUMPDEST; STOP
        let result = explore(&[0x60, 0x01, 0x60, 0x07, 0x57, 0x00, 0x00, 0x5b, 0x00]);

        assert_eq!(result.paths_explored, 1);
        assert_eq!(result.paths[0].block_sequence, vec![0, 7]);
    }

    #[test]
    fn storage_traffic_is_recorded_as_effects() {
        // PUSH1 0x2a; PUSH1 0x00; SSTORE; PUSH1 0x00; SLOAD; POP; STOP
        let result = explore(&[0x60, 0x2a, 0x60, 0x00, 0x55, 0x60, 0x00, 0x54, 0x50, 0x00]);

        let path = &result.paths[0];
        assert_eq!(path.effects.len(), 2);
        assert!(matches!(path.effects[0], Effect::StorageWrite { .. }));
        assert!(matches!(path.effects[1], Effect::StorageRead { .. }));
    }

    #[test]
    fn a_jump_to_an_invalid_target_seals_a_fault() {
        // PUSH1 0x03; JUMP; STOP
        let result = explore(&[0x60, 0x03, 0x56, 0x00]);

        assert_eq!(result.paths_explored, 1);
        assert_eq!(
            result.paths[0].outcome,
            PathOutcome::Fault(FaultReason::InvalidTarget(3))
        );
    }

    #[test]
    fn a_symbolic_jump_target_seals_an_indirect_fault() {
        // PUSH1 0x00; CALLDATALOAD; JUMP; JUMPDEST; STOP
        let result = explore(&[0x60, 0x00, 0x35, 0x56, 0x5b, 0x00]);

        assert_eq!(result.paths_explored, 1);
        assert_eq!(
            result.paths[0].outcome,
            PathOutcome::Fault(FaultReason::IndirectJump)
        );
    }

    #[test]
    fn the_loop_cap_seals_an_unbounded_loop() {
        // JUMPDEST; PUSH1 0x00; JUMP (an infinite loop back to offset 0)
        let result = explore(&[0x5b, 0x60, 0x00, 0x56]);

        assert_eq!(result.paths_explored, 1);
        assert_eq!(
            result.paths[0].outcome,
            PathOutcome::Abandoned(AbandonReason::LoopBound)
        );
        assert_eq!(result.abandoned, 1);
    }

    #[test]
    fn branches_on_a_call_result_mark_the_call_checked() {
        // A CALL whose success word feeds a branch:
        //   PUSH1 0x00 x5; CALLER; GAS; CALL; PUSH1 0x10; JUMPI;
        //   REVERT-ish STOP; JUMPDEST; STOP
        let bytes = [
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x33, 0x5a, 0xf1, 0x60,
            0x11, 0x57, 0x00, 0x5b, 0x00,
        ];
        let result = explore(&bytes);

        assert!(result.paths.iter().all(|path| {
            path.effects.iter().all(|effect| match effect {
                Effect::ExternalCall { checked, .. } => *checked,
                _ => true,
            })
        }));
    }

    #[test]
    fn an_unchecked_call_result_stays_unmarked() {
        // CALL; POP; STOP
        let bytes = [
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x33, 0x5a, 0xf1, 0x50,
            0x00,
        ];
        let result = explore(&bytes);

        let path = &result.paths[0];
        assert!(path.effects.iter().any(|effect| matches!(
            effect,
            Effect::ExternalCall { checked: false, .. }
        )));
    }

    #[test]
    fn the_path_budget_caps_exploration() {
        // Three stacked symbolic branches would give 2^3 paths; a budget of
        // two caps it.
        let bytes = [
            0x60, 0x00, 0x35, 0x60, 0x08, 0x57, 0x00, 0x00, 0x5b, 0x60, 0x04, 0x35, 0x60, 0x11,
            0x57, 0x00, 0x00, 0x5b, 0x60, 0x08, 0x35, 0x60, 0x1a, 0x57, 0x00, 0x00, 0x5b, 0x00,
        ];
        let stream = InstructionStream::try_from(&bytes[..]).unwrap();
        let cfg = cfg::build(&stream);
        let analysis = cfg::analysis::analyze(&cfg);
        let result = Executor::new(
            &cfg,
            &analysis,
            FoldingSolver::new().in_arc(),
            Budget::new().with_maximum_paths(2),
            LazyWatchdog.in_arc(),
        )
        .execute();

        assert!(result.paths_explored <= 2);
        assert!(result.abandoned >= 1);
    }
}
