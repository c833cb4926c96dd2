//! This module contains the self-destruct reachability rule: any feasible
//! path that ends in `SELFDESTRUCT` deserves a look, and one whose
//! beneficiary the caller influences deserves a hard one.

use crate::{
    detector::{
        Detector, DetectorContext, Evidence, Finding, FindingKind, Location,
        SELFDESTRUCT_CONFIDENCE, SELFDESTRUCT_INFLUENCED_BONUS, SELFDESTRUCT_SEVERITY,
    },
    symexec::path::Effect,
};

pub struct SelfDestructReach;

impl Detector for SelfDestructReach {
    fn name(&self) -> &'static str {
        "selfdestruct-reach"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for path in context.paths.iter().filter(|path| path.feasible) {
            for effect in &path.effects {
                let Effect::SelfDestruct {
                    beneficiary,
                    offset,
                    ..
                } = effect
                else {
                    continue;
                };

                let influenced = beneficiary.is_attacker_influenced();
                findings.push(Finding {
                    kind:     FindingKind::SelfDestructReachable,
                    location: Location::Offset(*offset),
                    severity: if influenced {
                        // Caller-chosen beneficiary makes this a drain.
                        (SELFDESTRUCT_SEVERITY + SELFDESTRUCT_INFLUENCED_BONUS).min(1.0)
                    } else {
                        SELFDESTRUCT_SEVERITY
                    },
                    confidence: SELFDESTRUCT_CONFIDENCE,
                    evidence: Some(Evidence::Path(path.id)),
                    description: format!(
                        "a feasible path reaches the SELFDESTRUCT at offset {offset}"
                    ),
                });
            }
        }

        findings
    }
}
