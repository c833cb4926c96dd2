//! This module contains the loop-bounds rule: a loop whose counter shows no
//! constant-step progress towards its exit condition can be driven to
//! exhaust the gas of any caller.

use crate::{
    cfg::analysis::LoopInfo,
    detector::{
        Detector, DetectorContext, Evidence, Finding, FindingKind, Location,
        UNBOUNDED_LOOP_CONFIDENCE, UNBOUNDED_LOOP_OBSERVED_CONFIDENCE, UNBOUNDED_LOOP_SEVERITY,
    },
    opcode,
    symexec::path::{AbandonReason, PathOutcome},
};

pub struct LoopBounds;

impl Detector for LoopBounds {
    fn name(&self) -> &'static str {
        "loop-bounds"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for info in &context.analysis.loops {
            if has_counter_progress(context, info) {
                continue;
            }

            let Some(header) = context.cfg.block(info.header) else {
                continue;
            };

            // A path the executor actually had to cut off at the iteration
            // cap is direct evidence the loop spins.
            let observed = context.paths.iter().find(|path| {
                path.outcome == PathOutcome::Abandoned(AbandonReason::LoopBound)
                    && path.block_sequence.contains(&header.start_offset)
            });

            findings.push(Finding {
                kind:     FindingKind::UnboundedLoop,
                location: Location::Offset(header.start_offset),
                severity: UNBOUNDED_LOOP_SEVERITY,
                confidence: if observed.is_some() {
                    UNBOUNDED_LOOP_OBSERVED_CONFIDENCE
                } else {
                    UNBOUNDED_LOOP_CONFIDENCE
                },
                evidence: observed.map(|path| Evidence::Path(path.id)),
                description: format!(
                    "the loop headed at offset {} shows no constant-step progress towards \
                     its exit condition",
                    header.start_offset
                ),
            });
        }

        findings
    }
}

/// Checks whether any block of the loop steps a counter by a pushed
/// constant, the shape both `for` loops and bounded `while` loops compile
/// to. A loop without an exit branch cannot make progress by definition.
fn has_counter_progress(context: &DetectorContext, info: &LoopInfo) -> bool {
    if info.exit_block.is_none() {
        return false;
    }

    info.blocks.iter().any(|id| {
        let Some(block) = context.cfg.block(*id) else {
            return false;
        };
        block.instructions.windows(2).any(|pair| {
            opcode::is_push(pair[0].opcode)
                && matches!(pair[1].opcode, opcode::ADD | opcode::SUB)
        }) || block.instructions.windows(3).any(|triple| {
            opcode::is_push(triple[0].opcode)
                && (opcode::SWAP1..=opcode::SWAP16).contains(&triple[1].opcode)
                && matches!(triple[2].opcode, opcode::ADD | opcode::SUB)
        })
    })
}
