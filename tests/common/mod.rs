//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use bytecode_risk_analyzer as bra;
use bytecode_risk_analyzer::{
    analyzer::{self, state::ExecutionComplete, Analyzer},
    contract::Contract,
    report::AnalysisReport,
    symexec::Budget,
    watchdog::LazyWatchdog,
};

/// Analyses the hex-encoded (with or without the `0x` prefix) bytecode in
/// `code` under the default budget and returns the finished report.
#[allow(unused)] // It is actually
pub fn report_for(code: impl AsRef<str>) -> anyhow::Result<AnalysisReport> {
    let contract = Contract::from_hex(code)?;
    let report = bra::analyze(contract, Budget::default())?;
    Ok(report)
}

/// Runs the pipeline on the hex-encoded bytecode in `code` and stops after
/// the exploration, so that tests can inspect the intermediate products
/// rather than only the report.
#[allow(unused)] // It is actually
pub fn explored(code: impl AsRef<str>) -> anyhow::Result<Analyzer<ExecutionComplete>> {
    explored_under(code, Budget::default())
}

/// As [`explored`], but with a caller-chosen budget.
#[allow(unused)] // It is actually
pub fn explored_under(
    code: impl AsRef<str>,
    budget: Budget,
) -> anyhow::Result<Analyzer<ExecutionComplete>> {
    let contract = Contract::from_hex(code)?;
    let finished = analyzer::new(contract)
        .disassemble()?
        .build_cfg()?
        .execute(budget, LazyWatchdog.in_arc())?;
    Ok(finished)
}
