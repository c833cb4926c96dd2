//! This module contains the jump-integrity rule: statically invalid jump
//! targets and jumps whose target the analysis could not pin down at all.

use crate::{
    cfg::{FaultReason, Terminator},
    detector::{
        Detector, DetectorContext, Finding, FindingKind, Location, ARBITRARY_JUMP_CONFIDENCE,
        ARBITRARY_JUMP_SEVERITY, INVALID_JUMP_CONFIDENCE, INVALID_JUMP_SEVERITY,
    },
};

pub struct JumpIntegrity;

impl Detector for JumpIntegrity {
    fn name(&self) -> &'static str {
        "jump-integrity"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for id in context.cfg.block_ids() {
            // Unreachable fault blocks are dead metadata, not attack
            // surface.
            if !context.analysis.reachable.contains(&id) {
                continue;
            }
            let Some(block) = context.cfg.block(id) else {
                continue;
            };
            let Some(jump) = block.last_instruction() else {
                continue;
            };

            match block.terminator {
                Terminator::Fault(FaultReason::InvalidTarget(target)) => {
                    findings.push(Finding {
                        kind:     FindingKind::InvalidJumpTarget,
                        location: Location::Offset(jump.offset),
                        severity: INVALID_JUMP_SEVERITY,
                        confidence: INVALID_JUMP_CONFIDENCE,
                        evidence: None,
                        description: format!(
                            "the jump at offset {} targets offset {target}, which is not a \
                             JUMPDEST",
                            jump.offset
                        ),
                    });
                }
                Terminator::Fault(FaultReason::IndirectJump) => {
                    findings.push(Finding {
                        kind:     FindingKind::ArbitraryJump,
                        location: Location::Offset(jump.offset),
                        severity: ARBITRARY_JUMP_SEVERITY,
                        confidence: ARBITRARY_JUMP_CONFIDENCE,
                        evidence: None,
                        description: format!(
                            "the target of the jump at offset {} is not statically resolvable \
                             and may be influenceable",
                            jump.offset
                        ),
                    });
                }
                _ => (),
            }
        }

        findings
    }
}
