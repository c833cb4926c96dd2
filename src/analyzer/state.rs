//! This module contains the state tracking functionality for the analyzer.

use std::fmt::Debug;

use crate::{
    cfg::{analysis::CfgAnalysis, Cfg},
    disassembly::InstructionStream,
    storage::StorageAnalysis,
    symexec::ExplorationResult,
};

/// A marker trait that says that the type implementing it is an analyzer
/// state.
pub trait State
where
    Self: Clone + Debug + Sized,
{
}

/// The initial state for the analyzer.
#[derive(Clone, Debug)]
pub struct HasContract;
impl State for HasContract {}

/// The analyzer has successfully disassembled the bytecode.
#[derive(Clone, Debug)]
pub struct DisassemblyComplete {
    /// The disassembled bytecode for the contract being analysed.
    pub bytecode: InstructionStream,
}
impl State for DisassemblyComplete {}

/// The analyzer has partitioned the bytecode into basic blocks and analysed
/// the resulting control-flow graph.
#[derive(Clone, Debug)]
pub struct CfgReady {
    pub cfg:      Cfg,
    pub analysis: CfgAnalysis,
}
impl State for CfgReady {}

/// The analyzer has finished the bounded symbolic exploration and folded the
/// observed storage traffic.
#[derive(Clone, Debug)]
pub struct ExecutionComplete {
    pub cfg:         Cfg,
    pub analysis:    CfgAnalysis,
    pub exploration: ExplorationResult,
    pub storage:     StorageAnalysis,
}
impl State for ExecutionComplete {}
