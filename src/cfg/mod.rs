//! This module contains the control-flow graph representation of the
//! bytecode: the basic blocks, their terminators, and the directed graph that
//! connects them.

pub mod analysis;
mod builder;

use std::collections::HashMap;

pub use builder::build;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::EdgeRef,
    Direction,
};

use crate::disassembly::Instruction;

/// The identifier of a basic block within its [`Cfg`].
pub type BlockId = NodeIndex;

/// The reason that a block terminates in a modelled execution fault.
///
/// Faults are expected outcomes of analysing real bytecode, recorded in the
/// graph (and later in sealed paths) rather than raised as errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FaultReason {
    /// The block ends in an `INVALID` instruction or an unassigned opcode
    /// byte.
    InvalidOpcode,

    /// A statically-resolved jump targets an offset that is not the start of
    /// a `JUMPDEST` block.
    InvalidTarget(u32),

    /// The jump target could not be statically resolved from a preceding
    /// push; all `JUMPDEST`-headed blocks are conservative successors.
    IndirectJump,

    /// A stack read or pop was attempted with too few elements present.
    StackUnderflow,

    /// A stack write would have exceeded the 1024-element limit.
    StackOverflow,
}

/// How a basic block hands control onward.
///
/// The edges of the graph are derived data: they are recomputed from these
/// terminators by the builder and carry no information of their own beyond
/// the branch polarity.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Terminator {
    /// Execution continues at the next byte offset (the block was ended by a
    /// following `JUMPDEST`).
    Fallthrough,

    /// An unconditional jump to a statically-known `JUMPDEST` offset.
    Jump(u32),

    /// A conditional jump with a statically-known true target; the false
    /// target is the following byte offset.
    JumpI { true_target: u32, false_target: u32 },

    /// `STOP` or `RETURN`.
    Halt,

    /// `REVERT`.
    Revert,

    /// A modelled execution fault.
    Fault(FaultReason),

    /// `SELFDESTRUCT`.
    SelfDestruct,
}

/// The kind of a control edge between two blocks.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeKind {
    Fallthrough,
    Jump,
    BranchTrue,
    BranchFalse,

    /// A conservative successor added for an unresolvable (indirect) jump.
    /// Every `JUMPDEST`-headed block receives one of these from the jumping
    /// block.
    Conservative,
}

/// A maximal straight-line instruction sequence with one entry and one exit.
///
/// # Invariants
///
/// Every block's byte range `[start_offset, end_offset)` is disjoint from
/// every other block's, and the union of all ranges is the full byte range of
/// the bytecode. Invalid-opcode bytes are modelled as single-instruction
/// fault blocks rather than being skipped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicBlock {
    /// The byte offset at which this block starts.
    pub start_offset: u32,

    /// The byte offset one past the last instruction of this block.
    pub end_offset: u32,

    /// The instructions of the block, in bytecode order.
    pub instructions: Vec<Instruction>,

    /// How the block hands control onward.
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Checks whether this block starts with a `JUMPDEST` and is hence a
    /// valid jump target.
    #[must_use]
    pub fn is_jump_target(&self) -> bool {
        self.instructions
            .first()
            .is_some_and(|i| i.opcode == crate::opcode::JUMPDEST)
    }

    /// Gets the last instruction of the block.
    ///
    /// Blocks always contain at least one instruction, but the accessor is
    /// total to keep call sites honest.
    #[must_use]
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }
}

/// The control-flow graph of the bytecode.
///
/// The graph owns the block set; the single entry block is always the block
/// at byte offset 0. Edges are derived from the block terminators.
#[derive(Clone, Debug)]
pub struct Cfg {
    graph:     StableDiGraph<BasicBlock, EdgeKind>,
    entry:     BlockId,
    by_offset: HashMap<u32, BlockId>,
    byte_len:  u32,
}

impl Cfg {
    /// Constructs a CFG from its parts.
    ///
    /// This is only exposed to the builder; use [`build`] to construct a CFG
    /// from an instruction stream.
    pub(crate) fn from_parts(
        graph: StableDiGraph<BasicBlock, EdgeKind>,
        entry: BlockId,
        by_offset: HashMap<u32, BlockId>,
        byte_len: u32,
    ) -> Self {
        Self {
            graph,
            entry,
            by_offset,
            byte_len,
        }
    }

    /// Gets the identifier of the entry block (byte offset 0).
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Gets the underlying graph for traversal.
    #[must_use]
    pub fn graph(&self) -> &StableDiGraph<BasicBlock, EdgeKind> {
        &self.graph
    }

    /// Gets the block with the provided `id`, if it exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.graph.node_weight(id)
    }

    /// Gets the identifier of the block starting at the byte offset `offset`,
    /// if one starts there.
    #[must_use]
    pub fn block_at(&self, offset: u32) -> Option<BlockId> {
        self.by_offset.get(&offset).copied()
    }

    /// Gets the identifiers of all blocks, in ascending offset order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.graph.node_indices().collect();
        ids.sort_by_key(|id| self.graph[*id].start_offset);
        ids
    }

    /// Gets the successors of the block `id` along with the kind of each
    /// outgoing edge, in deterministic (offset) order.
    #[must_use]
    pub fn successors(&self, id: BlockId) -> Vec<(BlockId, EdgeKind)> {
        let mut successors: Vec<(BlockId, EdgeKind)> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| (edge.target(), *edge.weight()))
            .collect();
        successors.sort_by_key(|(target, _)| self.graph[*target].start_offset);
        successors
    }

    /// Gets the number of blocks in the graph.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Gets the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Gets the length of the originating bytecode in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u32 {
        self.byte_len
    }
}
