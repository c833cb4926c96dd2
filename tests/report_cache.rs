//! This module tests the report cache end to end: repeated requests for the
//! same bytecode are served from the cache and marked as such.
#![cfg(test)]

use std::cell::Cell;

use bytecode_risk_analyzer as bra;
use bytecode_risk_analyzer::{cache::ReportCache, contract::Contract, symexec::Budget};

mod common;

#[test]
fn the_second_request_is_served_from_the_cache() -> anyhow::Result<()> {
    let cache = ReportCache::new();
    let contract = Contract::from_hex("0x602a60015500")?;

    let first = cache.get_or_compute(contract.bytecode(), || {
        bra::analyze(contract.clone(), Budget::default())
    })?;
    assert!(!first.cache_hit);

    let recomputed = Cell::new(false);
    let second = cache.get_or_compute(contract.bytecode(), || {
        recomputed.set(true);
        bra::analyze(contract.clone(), Budget::default())
    })?;

    assert!(!recomputed.get());
    assert!(second.cache_hit);

    // Apart from the hit flag, the cached report is the original.
    assert_eq!(second.risk_score, first.risk_score);
    assert_eq!(second.storage.len(), first.storage.len());
    assert_eq!(second.paths_explored, first.paths_explored);

    Ok(())
}

#[test]
fn different_bytecodes_never_share_a_report() -> anyhow::Result<()> {
    let cache = ReportCache::new();
    let clean = Contract::from_hex("0x600160020100")?;
    let writing = Contract::from_hex("0x602a60015500")?;

    cache.get_or_compute(clean.bytecode(), || {
        bra::analyze(clean.clone(), Budget::default())
    })?;
    let second = cache.get_or_compute(writing.bytecode(), || {
        bra::analyze(writing.clone(), Budget::default())
    })?;

    assert!(!second.cache_hit);
    assert_eq!(second.storage.len(), 1);
    assert_eq!(cache.len(), 2);

    Ok(())
}
