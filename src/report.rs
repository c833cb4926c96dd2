//! This module contains the externally visible analysis report: a flat,
//! serialisable summary that downstream consumers can use without ever
//! touching the internal graph or path structures.

use serde::Serialize;

use crate::{
    cfg::{analysis::CfgAnalysis, Cfg},
    constant::SELECTOR_WIDTH_BYTES,
    detector::{Evidence, Finding, FindingKind, Location},
    storage::{AccessKind, SlotShape, StorageAnalysis},
    symexec::{value::SymbolicValue, ExplorationResult},
};

/// A function entry recovered from the dispatcher, rendered for the report.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionInfo {
    /// The four-byte selector as a `0x`-prefixed hex string.
    pub selector: String,

    /// The byte offset of the function's entry block.
    pub entry_offset: u32,
}

/// The shape of the control-flow graph in numbers.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CfgSummary {
    pub block_count: usize,
    pub edge_count: usize,
    pub loop_count: usize,
    pub unreachable_blocks: usize,
}

/// One storage slot as the report presents it.
#[derive(Clone, Debug, Serialize)]
pub struct SlotSummary {
    /// The slot, rendered: a hex number for fixed slots, a shape sketch for
    /// derived ones.
    pub slot: String,

    pub shape: SlotShape,
    pub packing_offset: Option<u8>,
    pub reads: usize,
    pub writes: usize,
}

/// One vulnerability finding as the report presents it.
#[derive(Clone, Debug, Serialize)]
pub struct ReportedFinding {
    pub kind: FindingKind,
    pub location: String,
    pub severity: f32,
    pub confidence: f32,
    pub evidence: Option<String>,
    pub description: String,
}

/// The complete result of analysing one bytecode.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub functions: Vec<FunctionInfo>,
    pub cfg_summary: CfgSummary,
    pub storage: Vec<SlotSummary>,
    pub paths_explored: usize,
    pub vulnerabilities: Vec<ReportedFinding>,

    /// The saturating combination of per-kind finding weights, in `[0, 1]`.
    pub risk_score: f32,

    /// The share of basic blocks the exploration visited, in `[0, 1]`. Below
    /// one means a budget cut exploration short and findings may be missing.
    pub coverage_ratio: f32,

    /// Whether this report was served from the cache.
    pub cache_hit: bool,
}

impl AnalysisReport {
    /// Assembles the report from the pipeline's intermediate products.
    #[must_use]
    pub fn assemble(
        cfg: &Cfg,
        analysis: &CfgAnalysis,
        storage: &StorageAnalysis,
        exploration: &ExplorationResult,
        findings: &[Finding],
        risk_score: f32,
    ) -> Self {
        let functions = analysis
            .functions
            .iter()
            .map(|function| FunctionInfo {
                selector:     render_selector(&function.selector),
                entry_offset: function.entry_offset,
            })
            .collect();

        let cfg_summary = CfgSummary {
            block_count:        cfg.block_count(),
            edge_count:         cfg.edge_count(),
            loop_count:         analysis.loops.len(),
            unreachable_blocks: analysis.unreachable.len(),
        };

        let storage = storage
            .slots
            .iter()
            .map(|slot| SlotSummary {
                slot:           render_slot(&slot.slot),
                shape:          slot.shape,
                packing_offset: slot.packing_offset,
                reads:          slot
                    .accesses
                    .iter()
                    .filter(|access| access.kind == AccessKind::Read)
                    .count(),
                writes:         slot
                    .accesses
                    .iter()
                    .filter(|access| access.kind == AccessKind::Write)
                    .count(),
            })
            .collect();

        let vulnerabilities = findings.iter().map(ReportedFinding::from).collect();

        let coverage_ratio = if cfg.block_count() == 0 {
            1.0
        } else {
            exploration.visited.len() as f32 / cfg.block_count() as f32
        };

        Self {
            functions,
            cfg_summary,
            storage,
            paths_explored: exploration.paths_explored,
            vulnerabilities,
            risk_score,
            coverage_ratio: coverage_ratio.clamp(0.0, 1.0),
            cache_hit: false,
        }
    }
}

impl From<&Finding> for ReportedFinding {
    fn from(finding: &Finding) -> Self {
        Self {
            kind:        finding.kind,
            location:    render_location(&finding.location),
            severity:    finding.severity,
            confidence:  finding.confidence,
            evidence:    finding.evidence.as_ref().map(render_evidence),
            description: finding.description.clone(),
        }
    }
}

fn render_selector(selector: &[u8; SELECTOR_WIDTH_BYTES]) -> String {
    format!("0x{}", hex::encode(selector))
}

fn render_location(location: &Location) -> String {
    match location {
        Location::Offset(offset) => format!("offset {offset}"),
        Location::Slot(slot) => format!("slot {}", render_slot(slot)),
    }
}

fn render_evidence(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Path(id) => format!("path {id}"),
        Evidence::Slots(slots) => {
            let rendered: Vec<String> = slots.iter().map(render_slot).collect();
            format!("slots [{}]", rendered.join(", "))
        }
    }
}

/// Renders a slot expression compactly: fixed slots as hex, derived slots as
/// a structural sketch.
fn render_slot(slot: &SymbolicValue) -> String {
    match slot {
        SymbolicValue::Concrete(word) => format!("{word:#x}"),
        SymbolicValue::Symbolic(var) => format!("{:?}#{}", var.origin, var.index),
        SymbolicValue::Expr { op, args } => {
            let rendered: Vec<String> = args.iter().map(render_slot).collect();
            format!("{op:?}({})", rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symexec::value::{Op, VarOrigin};

    #[test]
    fn renders_fixed_slots_as_hex() {
        assert_eq!(render_slot(&SymbolicValue::concrete(0u8)), "0x0");
        assert_eq!(render_slot(&SymbolicValue::concrete(255u8)), "0xff");
    }

    #[test]
    fn renders_derived_slots_structurally() {
        let element = SymbolicValue::binary(
            Op::Add,
            SymbolicValue::expr(Op::Keccak, vec![SymbolicValue::concrete(3u8)]),
            SymbolicValue::var(VarOrigin::CallData, 0),
        );
        assert_eq!(render_slot(&element), "Add(Keccak(0x3), CallData#0)");
    }
}
