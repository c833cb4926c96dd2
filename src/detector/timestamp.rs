//! This module contains the timestamp-dependence rule: a branch whose
//! condition rests on block time or height hands that decision to whoever
//! orders the block.

use crate::detector::{
    Detector, DetectorContext, Evidence, Finding, FindingKind, Location, TIMESTAMP_CONFIDENCE,
    TIMESTAMP_SEVERITY,
};

pub struct TimestampDependence;

impl Detector for TimestampDependence {
    fn name(&self) -> &'static str {
        "timestamp-dependence"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for path in context.paths.iter().filter(|path| path.feasible) {
            for constraint in &path.constraints {
                if !constraint.condition.is_miner_influenced() {
                    continue;
                }

                findings.push(Finding {
                    kind:     FindingKind::TimestampDependency,
                    location: Location::Offset(constraint.origin_offset),
                    severity: TIMESTAMP_SEVERITY,
                    confidence: TIMESTAMP_CONFIDENCE,
                    evidence: Some(Evidence::Path(path.id)),
                    description: format!(
                        "the branch at offset {} conditions on block time or height",
                        constraint.origin_offset
                    ),
                });
            }
        }

        findings
    }
}
