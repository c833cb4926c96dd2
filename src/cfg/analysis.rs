//! This module contains the analyses that run over the finished control-flow
//! graph: loop detection via strongly connected components, unreachable-block
//! detection, and best-effort function-boundary recovery from the selector
//! dispatch pattern.

use std::collections::{HashMap, HashSet};

use petgraph::{algo::tarjan_scc, visit::Dfs};

use crate::{
    cfg::{BlockId, Cfg, Terminator},
    constant::SELECTOR_WIDTH_BYTES,
    opcode,
};

/// A loop discovered in the control-flow graph.
///
/// Any strongly connected component with more than one block, or a single
/// block with a self-edge, is a loop candidate.
#[derive(Clone, Debug)]
pub struct LoopInfo {
    /// The blocks that make up the loop's strongly connected component.
    pub blocks: Vec<BlockId>,

    /// The block with the lowest start offset in the component, used as the
    /// canonical location of the loop.
    pub header: BlockId,

    /// The block whose conditional jump exits the component, where one
    /// exists.
    pub exit_block: Option<BlockId>,

    /// The byte offset of the `JUMPI` that decides whether the loop exits.
    pub condition_offset: Option<u32>,
}

/// A function entry recovered from the selector dispatch pattern.
///
/// Recovery is best-effort and may under-approximate: only the common
/// compiler-generated `PUSHn selector; EQ; ...; JUMPI` shape is recognised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionEntry {
    /// The four-byte calldata selector the dispatcher compares against.
    pub selector: [u8; SELECTOR_WIDTH_BYTES],

    /// The byte offset of the function's entry block.
    pub entry_offset: u32,

    /// The function's entry block.
    pub entry_block: BlockId,
}

/// The result of analysing the control-flow graph.
#[derive(Clone, Debug)]
pub struct CfgAnalysis {
    /// The loops discovered in the graph.
    pub loops: Vec<LoopInfo>,

    /// The blocks reachable from the entry block by any path, including
    /// conservative indirect-jump successors.
    pub reachable: HashSet<BlockId>,

    /// The blocks not reachable from the entry block, in offset order.
    ///
    /// Unreachable blocks are a coverage signal, not a vulnerability.
    pub unreachable: Vec<BlockId>,

    /// The recovered function entries, in dispatch order.
    pub functions: Vec<FunctionEntry>,

    /// Maps each block that participates in a loop to the index of that loop
    /// in [`Self::loops`].
    pub loop_of: HashMap<BlockId, usize>,

    /// The number of conditional branches in the graph.
    pub branch_count: usize,
}

/// Analyses the provided control-flow graph.
#[must_use]
pub fn analyze(cfg: &Cfg) -> CfgAnalysis {
    let loops = find_loops(cfg);
    let mut loop_of = HashMap::new();
    for (index, info) in loops.iter().enumerate() {
        for block in &info.blocks {
            loop_of.insert(*block, index);
        }
    }

    let reachable = reachable_from_entry(cfg);
    let mut unreachable: Vec<BlockId> = cfg
        .block_ids()
        .into_iter()
        .filter(|id| !reachable.contains(id))
        .collect();
    unreachable.sort_by_key(|id| cfg.block(*id).map_or(u32::MAX, |b| b.start_offset));

    let functions = recover_functions(cfg, &reachable);

    let branch_count = cfg
        .block_ids()
        .iter()
        .filter(|id| {
            matches!(
                cfg.block(**id).map(|b| b.terminator),
                Some(Terminator::JumpI { .. })
            )
        })
        .count();

    CfgAnalysis {
        loops,
        reachable,
        unreachable,
        functions,
        loop_of,
        branch_count,
    }
}

/// Finds the loops of the graph via Tarjan's strongly-connected-components
/// algorithm.
fn find_loops(cfg: &Cfg) -> Vec<LoopInfo> {
    let graph = cfg.graph();
    let mut loops = Vec::new();

    for component in tarjan_scc(graph) {
        let is_loop = component.len() > 1
            || component
                .first()
                .is_some_and(|n| graph.find_edge(*n, *n).is_some());
        if !is_loop {
            continue;
        }

        let members: HashSet<BlockId> = component.iter().copied().collect();
        let mut blocks = component.clone();
        blocks.sort_by_key(|id| graph[*id].start_offset);
        let header = blocks[0];

        // The loop condition comes from the conditional jump of whichever
        // member block has a successor outside the component.
        let exit_block = blocks.iter().copied().find(|id| {
            matches!(graph[*id].terminator, Terminator::JumpI { .. })
                && cfg
                    .successors(*id)
                    .iter()
                    .any(|(target, _)| !members.contains(target))
        });
        let condition_offset = exit_block
            .and_then(|id| graph[id].last_instruction().map(|i| i.offset));

        loops.push(LoopInfo {
            blocks,
            header,
            exit_block,
            condition_offset,
        });
    }

    loops.sort_by_key(|info| cfg.block(info.header).map_or(u32::MAX, |b| b.start_offset));
    loops
}

/// Computes the set of blocks reachable from the entry block.
fn reachable_from_entry(cfg: &Cfg) -> HashSet<BlockId> {
    let mut reachable = HashSet::new();
    let mut dfs = Dfs::new(cfg.graph(), cfg.entry());
    while let Some(node) = dfs.next(cfg.graph()) {
        reachable.insert(node);
    }
    reachable
}

/// Recovers function entries from blocks matching the selector dispatch
/// pattern.
fn recover_functions(cfg: &Cfg, reachable: &HashSet<BlockId>) -> Vec<FunctionEntry> {
    let mut functions = Vec::new();

    for id in cfg.block_ids() {
        if !reachable.contains(&id) {
            continue;
        }
        let Some(block) = cfg.block(id) else { continue };
        let Terminator::JumpI { true_target, .. } = block.terminator else {
            continue;
        };

        let compares_selector = block
            .instructions
            .iter()
            .any(|i| i.opcode == opcode::EQ)
            && block.instructions.iter().any(|i| {
                opcode::is_push(i.opcode)
                    && i.immediate
                        .as_ref()
                        .is_some_and(|imm| imm.len() <= SELECTOR_WIDTH_BYTES)
            });
        if !compares_selector {
            continue;
        }

        let Some(selector) = dispatch_selector(block) else {
            continue;
        };
        let Some(entry_block) = cfg.block_at(true_target) else {
            continue;
        };

        functions.push(FunctionEntry {
            selector,
            entry_offset: true_target,
            entry_block,
        });
    }

    functions
}

/// Extracts the selector constant from a dispatch block.
fn dispatch_selector(block: &crate::cfg::BasicBlock) -> Option<[u8; SELECTOR_WIDTH_BYTES]> {
    // The selector constant is the push that feeds the EQ, which precedes the
    // push of the branch target; take the last qualifying push before the EQ.
    let eq_position = block
        .instructions
        .iter()
        .position(|i| i.opcode == opcode::EQ)?;

    block.instructions[..eq_position]
        .iter()
        .rev()
        .find(|i| {
            opcode::is_push(i.opcode)
                && i.immediate
                    .as_ref()
                    .is_some_and(|imm| !imm.is_empty() && imm.len() <= SELECTOR_WIDTH_BYTES)
        })
        .and_then(|i| {
            let immediate = i.immediate.as_ref()?;
            let mut selector = [0u8; SELECTOR_WIDTH_BYTES];
            selector[SELECTOR_WIDTH_BYTES - immediate.len()..].copy_from_slice(immediate);
            Some(selector)
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{cfg, disassembly::InstructionStream};

    fn analysis_of(bytes: &[u8]) -> (Cfg, CfgAnalysis) {
        let stream = InstructionStream::try_from(bytes).unwrap();
        let cfg = cfg::build(&stream);
        let analysis = analyze(&cfg);
        (cfg, analysis)
    }

    #[test]
    fn straight_line_code_has_no_loops() {
        let (_, analysis) = analysis_of(&[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);
        assert!(analysis.loops.is_empty());
        assert!(analysis.unreachable.is_empty());
    }

    #[test]
    fn detects_a_simple_counting_loop() {
        // A loop that counts down from calldata:
        //   0x00 PUSH1 0x00  CALLDATALOAD            (counter)
        //   0x03 JUMPDEST                            (loop head)
        //   0x04 PUSH1 0x01  SWAP1 SUB               (counter -= 1)
        //   0x08 DUP1
        //   0x09 PUSH1 0x03  JUMPI                   (loop while counter != 0)
        //   0x0c STOP
        let bytes = [
            0x60, 0x00, 0x35, 0x5b, 0x60, 0x01, 0x90, 0x03, 0x80, 0x60, 0x03, 0x57, 0x00,
        ];
        let (cfg, analysis) = analysis_of(&bytes);

        assert_eq!(analysis.loops.len(), 1);
        let info = &analysis.loops[0];
        assert_eq!(cfg.block(info.header).unwrap().start_offset, 3);
        assert!(info.exit_block.is_some());
        assert_eq!(info.condition_offset, Some(0x0b));
    }

    #[test]
    fn flags_blocks_unreachable_from_the_entry() {
        // PUSH1 0x04; JUMP; INVALID; JUMPDEST; STOP; STOP (trailing STOP at 6
        // is unreachable: the INVALID block at 3 is equally unreachable)
        let bytes = [0x60, 0x04, 0x56, 0xfe, 0x5b, 0x00, 0x00];
        let (cfg, analysis) = analysis_of(&bytes);

        let unreachable_offsets: Vec<u32> = analysis
            .unreachable
            .iter()
            .map(|id| cfg.block(*id).unwrap().start_offset)
            .collect();
        assert_eq!(unreachable_offsets, vec![3, 6]);
    }

    #[test]
    fn recovers_function_entries_from_selector_dispatch() {
        // A minimal dispatcher:
        //   0x00 PUSH1 0x00 CALLDATALOAD
        //   0x03 PUSH4 0xa9059cbb
        //   0x08 EQ
        //   0x09 PUSH1 0x0e
        //   0x0b JUMPI
        //   0x0c STOP
        //   0x0d STOP
        //   0x0e JUMPDEST
        //   0x0f STOP
        let bytes = [
            0x60, 0x00, 0x35, 0x63, 0xa9, 0x05, 0x9c, 0xbb, 0x14, 0x60, 0x0e, 0x57, 0x00, 0x00,
            0x5b, 0x00,
        ];
        let (_, analysis) = analysis_of(&bytes);

        assert_eq!(analysis.functions.len(), 1);
        let function = &analysis.functions[0];
        assert_eq!(function.selector, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(function.entry_offset, 0x0e);
    }
}
