//! This module contains the basic-block partitioner and the construction of
//! the control-flow graph from an instruction stream.

use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::StableDiGraph;

use crate::{
    cfg::{BasicBlock, BlockId, Cfg, EdgeKind, FaultReason, Terminator},
    disassembly::{Instruction, InstructionStream},
    opcode,
};

/// Builds the control-flow graph for the provided instruction `stream`.
///
/// # Block Boundaries
///
/// A new block starts at offset 0, at every `JUMPDEST`, and immediately after
/// any terminator instruction (`JUMP`, `JUMPI`, `STOP`, `RETURN`, `REVERT`,
/// `SELFDESTRUCT`, `INVALID` and unassigned bytes).
///
/// # Jump Resolution
///
/// Jump targets are resolved only when statically known from a `PUSH`
/// immediately feeding the jump, which is the common compiler-generated
/// pattern. A resolved target that is not a `JUMPDEST` block start becomes a
/// [`FaultReason::InvalidTarget`] terminator rather than an edge. An
/// unresolvable target becomes [`FaultReason::IndirectJump`] and every
/// `JUMPDEST`-headed block is added as a conservative successor for the
/// arbitrary-jump rule to consume.
#[must_use]
pub fn build(stream: &InstructionStream) -> Cfg {
    let leaders = block_leaders(stream);
    let blocks = partition(stream, &leaders);

    let mut graph: StableDiGraph<BasicBlock, EdgeKind> = StableDiGraph::new();
    let mut by_offset: HashMap<u32, BlockId> = HashMap::new();

    let mut ids = Vec::with_capacity(blocks.len());
    for block in blocks {
        let start = block.start_offset;
        let id = graph.add_node(block);
        by_offset.insert(start, id);
        ids.push(id);
    }

    let jump_targets: Vec<BlockId> = ids
        .iter()
        .copied()
        .filter(|id| graph[*id].is_jump_target())
        .collect();

    // Terminators first, edges after, so the edges are derived purely from
    // the finished terminators.
    for id in &ids {
        let terminator = classify(&graph[*id], stream);
        graph[*id].terminator = terminator;
    }

    for id in &ids {
        let terminator = graph[*id].terminator;
        let end_offset = graph[*id].end_offset;
        let is_conditional = ends_with(&graph[*id], opcode::JUMPI);
        match terminator {
            Terminator::Fallthrough => {
                if let Some(next) = by_offset.get(&end_offset).copied() {
                    graph.add_edge(*id, next, EdgeKind::Fallthrough);
                }
            }
            Terminator::Jump(target) => {
                if let Some(next) = by_offset.get(&target).copied() {
                    graph.add_edge(*id, next, EdgeKind::Jump);
                }
            }
            Terminator::JumpI {
                true_target,
                false_target,
            } => {
                if let Some(next) = by_offset.get(&true_target).copied() {
                    graph.add_edge(*id, next, EdgeKind::BranchTrue);
                }
                if let Some(next) = by_offset.get(&false_target).copied() {
                    graph.add_edge(*id, next, EdgeKind::BranchFalse);
                }
            }
            Terminator::Fault(FaultReason::IndirectJump) => {
                for target in &jump_targets {
                    graph.add_edge(*id, *target, EdgeKind::Conservative);
                }
                // A conditional indirect jump can still fall through.
                if is_conditional {
                    if let Some(next) = by_offset.get(&end_offset).copied() {
                        graph.add_edge(*id, next, EdgeKind::BranchFalse);
                    }
                }
            }
            Terminator::Fault(FaultReason::InvalidTarget(_)) => {
                // An invalid conditional target keeps its legitimate false
                // branch so reachability past the fault is not lost.
                if is_conditional {
                    if let Some(next) = by_offset.get(&end_offset).copied() {
                        graph.add_edge(*id, next, EdgeKind::BranchFalse);
                    }
                }
            }
            Terminator::Halt
            | Terminator::Revert
            | Terminator::SelfDestruct
            | Terminator::Fault(_) => {}
        }
    }

    let entry = by_offset[&0];
    Cfg::from_parts(graph, entry, by_offset, stream.byte_len())
}

/// Computes the set of byte offsets at which a new basic block starts.
fn block_leaders(stream: &InstructionStream) -> BTreeSet<u32> {
    let mut leaders = BTreeSet::new();
    leaders.insert(0);

    for instruction in stream.instructions() {
        if instruction.opcode == opcode::JUMPDEST {
            leaders.insert(instruction.offset);
        }
        if opcode::is_block_terminator(instruction.opcode) {
            let next = instruction.end_offset();
            if next < stream.byte_len() {
                leaders.insert(next);
            }
        }
    }

    leaders
}

/// Splits the instruction stream into blocks at the provided `leaders`.
fn partition(stream: &InstructionStream, leaders: &BTreeSet<u32>) -> Vec<BasicBlock> {
    let mut blocks: Vec<BasicBlock> = Vec::with_capacity(leaders.len());

    for instruction in stream.instructions() {
        let starts_block = leaders.contains(&instruction.offset);
        if starts_block || blocks.is_empty() {
            blocks.push(BasicBlock {
                start_offset: instruction.offset,
                end_offset:   instruction.end_offset(),
                instructions: vec![instruction.clone()],
                terminator:   Terminator::Fallthrough,
            });
        } else if let Some(current) = blocks.last_mut() {
            current.instructions.push(instruction.clone());
            current.end_offset = instruction.end_offset();
        }
    }

    blocks
}

/// Determines how the provided `block` hands control onward.
fn classify(block: &BasicBlock, stream: &InstructionStream) -> Terminator {
    let Some(last) = block.last_instruction() else {
        return Terminator::Fallthrough;
    };

    match last.opcode {
        opcode::JUMP => match static_jump_target(block) {
            Some(target) if stream.is_jump_target(target) => Terminator::Jump(target),
            Some(target) => Terminator::Fault(FaultReason::InvalidTarget(target)),
            None => Terminator::Fault(FaultReason::IndirectJump),
        },
        opcode::JUMPI => {
            let false_target = last.end_offset();
            match static_jump_target(block) {
                Some(target) if stream.is_jump_target(target) => Terminator::JumpI {
                    true_target: target,
                    false_target,
                },
                Some(target) => Terminator::Fault(FaultReason::InvalidTarget(target)),
                None => Terminator::Fault(FaultReason::IndirectJump),
            }
        }
        opcode::STOP | opcode::RETURN => Terminator::Halt,
        opcode::REVERT => Terminator::Revert,
        opcode::SELFDESTRUCT => Terminator::SelfDestruct,
        op if opcode::is_block_terminator(op) => Terminator::Fault(FaultReason::InvalidOpcode),
        _ => Terminator::Fallthrough,
    }
}

/// Resolves the jump target of the block's terminating `JUMP`/`JUMPI` when it
/// is statically known from the `PUSH` immediately feeding the jump.
fn static_jump_target(block: &BasicBlock) -> Option<u32> {
    let count = block.instructions.len();
    if count < 2 {
        return None;
    }
    let feeder: &Instruction = &block.instructions[count - 2];
    if !opcode::is_push(feeder.opcode) {
        return None;
    }

    let word = feeder.immediate_word()?;
    // Targets beyond the code length are invalid anyway; saturating keeps the
    // reported offset meaningful.
    Some(u32::try_from(word).unwrap_or(u32::MAX))
}

/// Checks whether the final instruction of `block` is `opcode`.
fn ends_with(block: &BasicBlock, opcode: u8) -> bool {
    block.last_instruction().is_some_and(|i| i.opcode == opcode)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disassembly::InstructionStream;

    fn cfg_of(bytes: &[u8]) -> Cfg {
        let stream = InstructionStream::try_from(bytes).unwrap();
        build(&stream)
    }

    #[test]
    fn straight_line_code_is_a_single_block() {
        // PUSH1 0x01; PUSH1 0x02; ADD; STOP
        let cfg = cfg_of(&[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);
        assert_eq!(cfg.block_count(), 1);
        let entry = cfg.block(cfg.entry()).unwrap();
        assert_eq!(entry.terminator, Terminator::Halt);
        assert_eq!(entry.start_offset, 0);
        assert_eq!(entry.end_offset, 6);
    }

    #[test]
    fn resolves_a_direct_jump_to_a_jumpdest() {
        // PUSH1 0x04; JUMP; INVALID; JUMPDEST; STOP
        let cfg = cfg_of(&[0x60, 0x04, 0x56, 0xfe, 0x5b, 0x00]);
        let entry = cfg.block(cfg.entry()).unwrap();
        assert_eq!(entry.terminator, Terminator::Jump(4));

        let successors = cfg.successors(cfg.entry());
        assert_eq!(successors.len(), 1);
        assert_eq!(successors[0].1, EdgeKind::Jump);
        assert!(cfg.block(successors[0].0).unwrap().is_jump_target());
    }

    #[test]
    fn a_jump_to_a_non_jumpdest_becomes_an_invalid_target_fault() {
        // PUSH1 0x03; JUMP; STOP (offset 3 is STOP, not JUMPDEST)
        let cfg = cfg_of(&[0x60, 0x03, 0x56, 0x00]);
        let entry = cfg.block(cfg.entry()).unwrap();
        assert_eq!(
            entry.terminator,
            Terminator::Fault(FaultReason::InvalidTarget(3))
        );
        assert!(cfg.successors(cfg.entry()).is_empty());
    }

    #[test]
    fn an_unresolvable_jump_gets_conservative_successors() {
        // CALLDATALOAD-fed jump: PUSH1 0x00; CALLDATALOAD; JUMP; JUMPDEST;
        // STOP; JUMPDEST; STOP
        let cfg = cfg_of(&[0x60, 0x00, 0x35, 0x56, 0x5b, 0x00, 0x5b, 0x00]);
        let entry = cfg.block(cfg.entry()).unwrap();
        assert_eq!(entry.terminator, Terminator::Fault(FaultReason::IndirectJump));

        let successors = cfg.successors(cfg.entry());
        assert_eq!(successors.len(), 2);
        assert!(successors.iter().all(|(_, kind)| *kind == EdgeKind::Conservative));
    }

    #[test]
    fn conditional_jumps_get_both_edges() {
        // PUSH1 0x01; PUSH1 0x06; JUMPI; STOP; JUMPDEST; STOP
        let cfg = cfg_of(&[0x60, 0x01, 0x60, 0x06, 0x57, 0x00, 0x5b, 0x00]);
        let entry = cfg.block(cfg.entry()).unwrap();
        assert_eq!(
            entry.terminator,
            Terminator::JumpI {
                true_target:  6,
                false_target: 5,
            }
        );

        let kinds: Vec<EdgeKind> =
            cfg.successors(cfg.entry()).iter().map(|(_, k)| *k).collect();
        assert!(kinds.contains(&EdgeKind::BranchTrue));
        assert!(kinds.contains(&EdgeKind::BranchFalse));
    }

    #[test]
    fn block_ranges_cover_the_bytecode_exactly() {
        let bytes = [
            0x60, 0x01, 0x60, 0x06, 0x57, 0x00, 0x5b, 0x60, 0x2a, 0x60, 0x00, 0x55, 0x00, 0xfe,
            0xab,
        ];
        let cfg = cfg_of(&bytes);

        let mut covered = 0u32;
        for id in cfg.block_ids() {
            let block = cfg.block(id).unwrap();
            assert_eq!(block.start_offset, covered);
            covered = block.end_offset;
        }
        assert_eq!(covered, bytes.len() as u32);
    }
}
