//! This module tests that jumps to targets that are not `JUMPDEST`
//! instructions surface as findings rather than silently truncating the
//! analysis.
#![cfg(test)]

use bytecode_risk_analyzer::{
    cfg::FaultReason,
    detector::FindingKind,
    symexec::path::PathOutcome,
};

mod common;

#[test]
fn a_jump_to_a_non_jumpdest_is_reported_at_the_jump() -> anyhow::Result<()> {
    // PUSH1 0x03; JUMP; STOP (offset 3 is the STOP, not a JUMPDEST)
    let bytecode = "0x60035600";

    let report = common::report_for(bytecode)?;

    let finding = report
        .vulnerabilities
        .iter()
        .find(|finding| finding.kind == FindingKind::InvalidJumpTarget)
        .ok_or_else(|| anyhow::anyhow!("no invalid-jump finding"))?;

    // The finding sits on the JUMP instruction, not on its bad target.
    assert_eq!(finding.location, "offset 2");

    // The block after the dead jump is never reached.
    assert_eq!(report.cfg_summary.unreachable_blocks, 1);
    assert!(report.coverage_ratio < 1.0);

    Ok(())
}

#[test]
fn the_faulting_path_is_sealed_not_errored() -> anyhow::Result<()> {
    let explored = common::explored("0x60035600")?;
    let paths = &explored.state().exploration.paths;

    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0].outcome,
        PathOutcome::Fault(FaultReason::InvalidTarget(3))
    );

    Ok(())
}

#[test]
fn a_calldata_fed_jump_is_an_arbitrary_jump() -> anyhow::Result<()> {
    // PUSH1 0x00; CALLDATALOAD; JUMP; JUMPDEST; STOP
    let report = common::report_for("0x600035565b00")?;

    assert!(report
        .vulnerabilities
        .iter()
        .any(|finding| finding.kind == FindingKind::ArbitraryJump));

    Ok(())
}
