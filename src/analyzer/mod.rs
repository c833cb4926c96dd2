//! This module contains the definition of the analyzer itself: the pipeline
//! that takes a contract from raw bytes to a finished vulnerability report,
//! one enforced state transition at a time.

pub mod state;

use crate::{
    aggregator,
    analyzer::state::State,
    cfg,
    contract::Contract,
    detector::{self, DetectorContext},
    disassembly::InstructionStream,
    error,
    report::AnalysisReport,
    storage::{self, SlotCollision},
    symexec::{solver::FoldingSolver, Budget, Executor},
    watchdog::{DynWatchdog, LazyWatchdog},
};

/// Creates a new analyzer wrapping the provided `contract`.
pub fn new(contract: Contract) -> Analyzer<state::HasContract> {
    let state = state::HasContract;
    Analyzer { contract, state }
}

/// Analyses `contract` under `budget` and produces its report.
///
/// This is the convenience entry point; use the [`Analyzer`] states directly
/// when intermediate results are of interest.
///
/// # Errors
///
/// When the bytecode cannot be disassembled.
pub fn analyze(contract: Contract, budget: Budget) -> error::Result<AnalysisReport> {
    let finished = new(contract)
        .disassemble()?
        .build_cfg()?
        .execute(budget, LazyWatchdog.in_arc())?;
    Ok(finished.report())
}

/// Analyses the creation bytecode attached to `contract`, when present,
/// under `budget`.
///
/// Constructor code runs once at deployment and its storage writes seed the
/// layout the runtime code operates on, so it goes through the same pipeline
/// as an independent contract with its own report.
///
/// # Errors
///
/// When the creation bytecode cannot be disassembled.
pub fn analyze_creation(
    contract: &Contract,
    budget: Budget,
) -> error::Result<Option<AnalysisReport>> {
    let Some(creation) = contract.creation_code() else {
        return Ok(None);
    };
    analyze(Contract::new(creation.to_vec()), budget).map(Some)
}

/// The result of analysing a contract against a proposed replacement.
#[derive(Clone, Debug)]
pub struct ComparisonReport {
    /// The report for the currently deployed contract, including any
    /// storage-collision findings against the replacement.
    pub current: AnalysisReport,

    /// The report for the replacement, analysed on its own.
    pub replacement: AnalysisReport,
}

/// Analyses `current` against `replacement` and reports collisions between
/// their storage layouts alongside each contract's own findings.
///
/// # Errors
///
/// When either bytecode cannot be disassembled.
pub fn compare(
    current: Contract,
    replacement: Contract,
    budget: Budget,
) -> error::Result<ComparisonReport> {
    let current_run = new(current)
        .disassemble()?
        .build_cfg()?
        .execute(budget, LazyWatchdog.in_arc())?;
    let replacement_run = new(replacement)
        .disassemble()?
        .build_cfg()?
        .execute(budget, LazyWatchdog.in_arc())?;

    let collisions = storage::compare(
        &current_run.state.storage,
        &replacement_run.state.storage,
    );

    let current_report = current_run.report_with_collisions(&collisions);
    let replacement_report = replacement_run.report();

    Ok(ComparisonReport {
        current:     current_report,
        replacement: replacement_report,
    })
}

/// The core of the analysis, the `Analyzer` is responsible for ingesting the
/// contract and driving it through the pipeline to a report.
///
/// # Enforcing Valid State Transitions
///
/// The analyzer enforces that only correct state transitions can occur
/// through use of structs that implement the exact state required by it at
/// any given point.
pub struct Analyzer<S: State> {
    /// The contract that is being analysed.
    contract: Contract,

    /// The internal state of the analyzer.
    state: S,
}

/// Safe operations available in all states.
impl<S: State> Analyzer<S> {
    /// Gets a reference to the contract being analysed.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Gets a reference to the current state of the analyzer.
    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Unsafe operations available in all states.
///
/// These operations are capable of **violating the state invariants** of the
/// analyzer, and must be used with the _utmost_ care.
impl<S: State> Analyzer<S> {
    /// Forces the analyzer into `new_state`, disregarding any safety with
    /// regards to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the analyzer unless you totally
    /// understand the state that the analyzer is in, and the implications of
    /// doing so.
    pub unsafe fn set_state<NS: State>(self, new_state: NS) -> Analyzer<NS> {
        Analyzer {
            contract: self.contract,
            state:    new_state,
        }
    }

    /// Forces the analyzer into the state `NS`, with the value of the state
    /// created by applying `transform` to the analyzer's current state and
    /// disregarding any safety with regard to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the analyzer unless you totally
    /// understand the state that the analyzer is in, and the implications of
    /// doing so.
    pub unsafe fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S) -> error::Result<NS>,
    ) -> error::Result<Analyzer<NS>> {
        let state = transform(self.state)?;
        let contract = self.contract;

        Ok(Analyzer { state, contract })
    }
}

/// Operations available on a newly-created analyzer.
impl Analyzer<state::HasContract> {
    /// Performs the disassembly process to turn the input contract code into
    /// an instruction stream.
    ///
    /// # Errors
    ///
    /// When the bytecode is empty or oversized.
    pub fn disassemble(self) -> error::Result<Analyzer<state::DisassemblyComplete>> {
        let bytecode = InstructionStream::try_from(self.contract.bytecode())?;
        let state = state::DisassemblyComplete { bytecode };
        Ok(unsafe { self.set_state(state) })
    }
}

/// Operations available on an analyzer that has completed the disassembly of
/// the bytecode.
impl Analyzer<state::DisassemblyComplete> {
    /// Partitions the instruction stream into basic blocks and analyses the
    /// resulting control-flow graph.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail; the signature leaves room for
    /// graph validation to become fallible.
    pub fn build_cfg(self) -> error::Result<Analyzer<state::CfgReady>> {
        unsafe {
            self.transform_state(|old_state| {
                let cfg = cfg::build(&old_state.bytecode);
                let analysis = cfg::analysis::analyze(&cfg);
                tracing::debug!(
                    blocks = cfg.block_count(),
                    loops = analysis.loops.len(),
                    functions = analysis.functions.len(),
                    "control-flow graph ready"
                );
                Ok(state::CfgReady { cfg, analysis })
            })
        }
    }
}

/// Operations available on an analyzer whose control-flow graph is ready.
impl Analyzer<state::CfgReady> {
    /// Symbolically executes the contract under `budget`, using the built-in
    /// solver.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail; budget exhaustion seals paths
    /// rather than erroring.
    pub fn execute(
        self,
        budget: Budget,
        watchdog: DynWatchdog,
    ) -> error::Result<Analyzer<state::ExecutionComplete>> {
        self.execute_with_solver(budget, FoldingSolver::new().in_arc(), watchdog)
    }

    /// Symbolically executes the contract under `budget` with a caller-chosen
    /// solver.
    ///
    /// # Errors
    ///
    /// This transition cannot currently fail.
    pub fn execute_with_solver(
        self,
        budget: Budget,
        solver: crate::symexec::solver::DynSolver,
        watchdog: DynWatchdog,
    ) -> error::Result<Analyzer<state::ExecutionComplete>> {
        unsafe {
            self.transform_state(|old_state| {
                let executor =
                    Executor::new(&old_state.cfg, &old_state.analysis, solver, budget, watchdog);
                let exploration = executor.execute();
                tracing::debug!(
                    paths = exploration.paths_explored,
                    abandoned = exploration.abandoned,
                    "exploration finished"
                );
                let storage = storage::analyze(&exploration.paths);

                Ok(state::ExecutionComplete {
                    cfg: old_state.cfg,
                    analysis: old_state.analysis,
                    exploration,
                    storage,
                })
            })
        }
    }
}

/// Operations available on an analyzer that has finished its exploration.
impl Analyzer<state::ExecutionComplete> {
    /// Runs the built-in detector set and assembles the report.
    #[must_use]
    pub fn report(&self) -> AnalysisReport {
        self.build_report(None)
    }

    /// Runs the built-in detector set with the provided layout collisions in
    /// scope and assembles the report.
    #[must_use]
    pub fn report_with_collisions(&self, collisions: &[SlotCollision]) -> AnalysisReport {
        self.build_report(Some(collisions))
    }

    fn build_report(&self, collisions: Option<&[SlotCollision]>) -> AnalysisReport {
        let context = DetectorContext {
            cfg: &self.state.cfg,
            analysis: &self.state.analysis,
            paths: &self.state.exploration.paths,
            storage: &self.state.storage,
            collisions,
        };

        let detectors = detector::default_detectors();
        let findings = aggregator::run(&detectors, &context);
        let risk_score = aggregator::risk_score(&findings);

        AnalysisReport::assemble(
            &self.state.cfg,
            &self.state.analysis,
            &self.state.storage,
            &self.state.exploration,
            &findings,
            risk_score,
        )
    }
}
