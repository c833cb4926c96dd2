//! This module contains the unchecked-call rule: an external call whose
//! success word no branch inspects before the path commits further effects
//! silently swallows its failure.

use crate::{
    detector::{
        Detector, DetectorContext, Evidence, Finding, FindingKind, Location,
        UNCHECKED_CALL_CONFIDENCE, UNCHECKED_CALL_SEVERITY,
    },
    symexec::path::{CallKind, Effect},
};

pub struct UncheckedCall;

impl Detector for UncheckedCall {
    fn name(&self) -> &'static str {
        "unchecked-call"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for path in context.paths.iter().filter(|path| path.feasible) {
            for (position, effect) in path.effects.iter().enumerate() {
                let Effect::ExternalCall {
                    kind,
                    checked,
                    offset,
                    ..
                } = effect
                else {
                    continue;
                };
                // Delegatecall result checks matter too, but a static call
                // that only reads is routinely left unchecked.
                if *checked || *kind == CallKind::StaticCall {
                    continue;
                }

                // Only calls followed by another state-committing effect
                // count; a trailing transfer has nothing left to corrupt.
                let acted_on = path.effects[position + 1..].iter().any(|later| {
                    matches!(
                        later,
                        Effect::StorageWrite { .. }
                            | Effect::ExternalCall { .. }
                            | Effect::Event { .. }
                            | Effect::SelfDestruct { .. }
                    )
                });
                if !acted_on {
                    continue;
                }

                findings.push(Finding {
                    kind:     FindingKind::UncheckedExternalCall,
                    location: Location::Offset(*offset),
                    severity: UNCHECKED_CALL_SEVERITY,
                    confidence: UNCHECKED_CALL_CONFIDENCE,
                    evidence: Some(Evidence::Path(path.id)),
                    description: format!(
                        "the success word of the external call at offset {offset} is never \
                         inspected before later effects on this path"
                    ),
                });
            }
        }

        findings
    }
}
