//! This module tests the recovery of function entries from the standard
//! four-byte selector dispatcher pattern.
#![cfg(test)]

mod common;

#[test]
fn the_dispatcher_yields_the_selector_and_entry() -> anyhow::Result<()> {
    // The solc dispatch idiom for `transfer(address,uint256)`:
    //
    //   PUSH1 0x00; CALLDATALOAD; PUSH1 0xe0; SHR      load the selector
    //   DUP1; PUSH4 0xa9059cbb; EQ; PUSH1 0x11; JUMPI  compare and dispatch
    //   STOP                                           no-match fallthrough
    //   JUMPDEST; STOP                                 the function body
    let bytecode = "0x60003560e01c8063a9059cbb14601157005b00";

    let report = common::report_for(bytecode)?;

    assert_eq!(report.functions.len(), 1);
    assert_eq!(report.functions[0].selector, "0xa9059cbb");
    assert_eq!(report.functions[0].entry_offset, 17);

    // Both dispatch outcomes are explorable and neither is suspicious.
    assert_eq!(report.paths_explored, 2);
    assert!(report.vulnerabilities.is_empty());
    assert_eq!(report.coverage_ratio, 1.0);

    Ok(())
}
