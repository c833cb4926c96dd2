//! This module tests the analysis of constructor bytecode attached to a
//! contract: it runs through the same pipeline as the runtime code, as its
//! own report.
#![cfg(test)]

use bytecode_risk_analyzer::{analyze_creation, contract::Contract, Budget};

#[test]
fn attached_constructor_code_gets_its_own_report() -> anyhow::Result<()> {
    // PUSH1 0x2a; PUSH1 0x01; SSTORE; STOP
    let constructor = Contract::from_hex("0x602a60015500")?.bytecode().to_vec();
    let contract = Contract::from_hex("0x600160020100")?.with_creation_code(constructor);

    let report = analyze_creation(&contract, Budget::default())?
        .ok_or_else(|| anyhow::anyhow!("creation code was attached"))?;

    // The constructor's storage write shows up, separate from the runtime
    // code's (empty) layout.
    assert_eq!(report.storage.len(), 1);
    assert_eq!(report.storage[0].slot, "0x1");
    assert_eq!(report.storage[0].writes, 1);

    Ok(())
}

#[test]
fn a_contract_without_creation_code_has_no_creation_report() -> anyhow::Result<()> {
    let contract = Contract::from_hex("0x600160020100")?;

    assert!(analyze_creation(&contract, Budget::default())?.is_none());

    Ok(())
}
