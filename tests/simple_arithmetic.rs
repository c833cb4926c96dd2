//! This module tests the analysis of a minimal straight-line contract, which
//! must come back clean and fully covered.
#![cfg(test)]

use bytecode_risk_analyzer::symexec::path::PathOutcome;

mod common;

#[test]
fn a_straight_line_contract_comes_back_clean() -> anyhow::Result<()> {
    // PUSH1 0x01; PUSH1 0x02; ADD; STOP
    let bytecode = "0x600160020100";

    let report = common::report_for(bytecode)?;

    // One block, nothing to find, everything covered.
    assert_eq!(report.cfg_summary.block_count, 1);
    assert_eq!(report.cfg_summary.loop_count, 0);
    assert_eq!(report.cfg_summary.unreachable_blocks, 0);
    assert!(report.vulnerabilities.is_empty());
    assert_eq!(report.risk_score, 0.0);
    assert_eq!(report.coverage_ratio, 1.0);
    assert_eq!(report.paths_explored, 1);
    assert!(report.storage.is_empty());
    assert!(!report.cache_hit);

    // The two pushes are the deepest the stack ever gets on the one path.
    let explored = common::explored(bytecode)?;
    let path = &explored.state().exploration.paths[0];
    assert_eq!(path.outcome, PathOutcome::Halt);
    assert!(path.feasible);
    assert_eq!(path.max_stack_depth, 2);
    assert!(path.effects.is_empty());

    Ok(())
}
