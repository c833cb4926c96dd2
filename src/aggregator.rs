//! This module contains the aggregator: it runs the detector set, merges
//! the findings by identity, and folds them into a single risk score.

use std::collections::HashMap;

use crate::detector::{Detector, DetectorContext, Finding, FindingKind, Location};

/// Runs the provided detectors and merges their findings.
#[must_use]
pub fn run(detectors: &[Box<dyn Detector>], context: &DetectorContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    for detector in detectors {
        let produced = detector.run(context);
        tracing::debug!(
            detector = detector.name(),
            count = produced.len(),
            "detector finished"
        );
        findings.extend(produced);
    }
    merge(findings)
}

/// Merges findings by their `(kind, location)` identity, keeping the
/// highest-confidence instance of each, and sorts the result
/// deterministically.
///
/// Merging is idempotent: merging a finding that is already present changes
/// nothing, which is what lets overlapping analysis runs share one report.
#[must_use]
pub fn merge(findings: Vec<Finding>) -> Vec<Finding> {
    let mut by_identity: HashMap<(FindingKind, Location), Finding> = HashMap::new();

    for finding in findings {
        let identity = finding.identity();
        match by_identity.get_mut(&identity) {
            Some(existing) => {
                if finding.confidence > existing.confidence
                    || (finding.confidence == existing.confidence
                        && finding.severity > existing.severity)
                {
                    *existing = finding;
                }
            }
            None => {
                by_identity.insert(identity, finding);
            }
        }
    }

    let mut merged: Vec<Finding> = by_identity.into_values().collect();
    merged.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| location_key(&a.location).cmp(&location_key(&b.location)))
    });
    merged
}

/// Computes the overall risk score for a finding set.
///
/// The score combines the strongest finding of each kind as independent
/// signals: no single kind can reach 1.0 alone, while several distinct kinds
/// compound towards (and saturate at) 1.0.
#[must_use]
pub fn risk_score(findings: &[Finding]) -> f32 {
    let mut strongest: HashMap<FindingKind, f32> = HashMap::new();
    for finding in findings {
        let weight = finding.severity * finding.confidence;
        let entry = strongest.entry(finding.kind).or_insert(0.0);
        *entry = entry.max(weight);
    }

    let mut survival = 1.0f32;
    for weight in strongest.values() {
        survival *= 1.0 - weight.clamp(0.0, 1.0);
    }

    (1.0 - survival).clamp(0.0, 1.0)
}

/// A totally ordered stand-in for a location, for deterministic output
/// ordering. Offsets sort before slots; slots sort by their rendering.
fn location_key(location: &Location) -> (u8, u32, String) {
    match location {
        Location::Offset(offset) => (0, *offset, String::new()),
        Location::Slot(slot) => (1, 0, format!("{slot:?}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detector::{Evidence, FindingKind};

    fn finding(kind: FindingKind, offset: u32, severity: f32, confidence: f32) -> Finding {
        Finding {
            kind,
            location: Location::Offset(offset),
            severity,
            confidence,
            evidence: Some(Evidence::Path(0)),
            description: String::new(),
        }
    }

    #[test]
    fn merging_is_idempotent() {
        let a = finding(FindingKind::Reentrancy, 10, 0.85, 0.8);
        let once = merge(vec![a.clone()]);
        let twice = merge(vec![a.clone(), a]);

        assert_eq!(once.len(), 1);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn merging_keeps_the_highest_confidence_instance() {
        let low = finding(FindingKind::Reentrancy, 10, 0.85, 0.6);
        let high = finding(FindingKind::Reentrancy, 10, 0.85, 0.9);
        let merged = merge(vec![low, high]);

        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn distinct_locations_are_distinct_findings() {
        let merged = merge(vec![
            finding(FindingKind::UncheckedExternalCall, 10, 0.6, 0.7),
            finding(FindingKind::UncheckedExternalCall, 20, 0.6, 0.7),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn no_single_kind_reaches_the_maximum_score() {
        let findings = [finding(FindingKind::Reentrancy, 10, 1.0, 0.99)];
        assert!(risk_score(&findings) < 1.0);
    }

    #[test]
    fn independent_kinds_compound_the_score() {
        let one = [finding(FindingKind::Reentrancy, 10, 0.85, 0.8)];
        let two = [
            finding(FindingKind::Reentrancy, 10, 0.85, 0.8),
            finding(FindingKind::ArbitraryJump, 20, 0.75, 0.6),
        ];
        assert!(risk_score(&two) > risk_score(&one));
        assert!(risk_score(&two) <= 1.0);
    }

    #[test]
    fn an_empty_finding_set_scores_zero() {
        assert!(risk_score(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn output_order_is_deterministic() {
        let forwards = merge(vec![
            finding(FindingKind::ArbitraryJump, 20, 0.75, 0.6),
            finding(FindingKind::Reentrancy, 10, 0.85, 0.8),
        ]);
        let backwards = merge(vec![
            finding(FindingKind::Reentrancy, 10, 0.85, 0.8),
            finding(FindingKind::ArbitraryJump, 20, 0.75, 0.6),
        ]);

        let order = |findings: &[Finding]| {
            findings.iter().map(|f| f.kind).collect::<Vec<_>>()
        };
        assert_eq!(order(&forwards), order(&backwards));
    }
}
