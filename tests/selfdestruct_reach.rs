//! This module tests the self-destruct reachability rule end to end: a
//! feasible path ending in `SELFDESTRUCT` is reported at the instruction,
//! and harder when the caller chooses the beneficiary.
#![cfg(test)]

use bytecode_risk_analyzer::detector::FindingKind;

mod common;

#[test]
fn a_caller_chosen_beneficiary_raises_the_severity() -> anyhow::Result<()> {
    // CALLER; SELFDESTRUCT
    let report = common::report_for("0x33ff")?;

    let finding = report
        .vulnerabilities
        .iter()
        .find(|finding| finding.kind == FindingKind::SelfDestructReachable)
        .ok_or_else(|| anyhow::anyhow!("no self-destruct finding"))?;

    // The finding points at the SELFDESTRUCT instruction, not its block.
    assert_eq!(finding.location, "offset 1");
    assert!((finding.severity - 0.8).abs() < 1e-3);

    Ok(())
}

#[test]
fn a_fixed_beneficiary_keeps_the_base_severity() -> anyhow::Result<()> {
    // PUSH1 0x00; SELFDESTRUCT
    let report = common::report_for("0x6000ff")?;

    let finding = report
        .vulnerabilities
        .iter()
        .find(|finding| finding.kind == FindingKind::SelfDestructReachable)
        .ok_or_else(|| anyhow::anyhow!("no self-destruct finding"))?;

    assert_eq!(finding.location, "offset 2");
    assert!((finding.severity - 0.55).abs() < 1e-3);

    Ok(())
}
