//! This module tests the loop analysis: loops with no visible counter
//! progress are reported, loops that provably terminate are not.
#![cfg(test)]

use bytecode_risk_analyzer::detector::FindingKind;

mod common;

#[test]
fn a_loop_without_progress_is_reported_at_its_header() -> anyhow::Result<()> {
    // JUMPDEST; PUSH1 0x00; JUMP (spins on itself forever)
    let report = common::report_for("0x5b600056")?;

    assert_eq!(report.cfg_summary.loop_count, 1);

    let finding = report
        .vulnerabilities
        .iter()
        .find(|finding| finding.kind == FindingKind::UnboundedLoop)
        .ok_or_else(|| anyhow::anyhow!("no unbounded-loop finding"))?;

    assert_eq!(finding.location, "offset 0");

    // The exploration actually hit the iteration cap here, which raises the
    // confidence above the purely structural level and attaches the path.
    assert!(finding.confidence > 0.5);
    assert!(finding.evidence.is_some());

    Ok(())
}

#[test]
fn a_counting_loop_is_not_reported() -> anyhow::Result<()> {
    // A concrete three-iteration counter:
    //
    //   PUSH1 0x00                   i = 0
    //   JUMPDEST                     header
    //   PUSH1 0x01; ADD              i += 1
    //   DUP1; PUSH1 0x03; GT         3 > i
    //   PUSH1 0x02; JUMPI            loop while it holds
    //   STOP
    let report = common::report_for("0x60005b6001018060031160025700")?;

    assert_eq!(report.cfg_summary.loop_count, 1);
    assert!(report
        .vulnerabilities
        .iter()
        .all(|finding| finding.kind != FindingKind::UnboundedLoop));

    Ok(())
}
