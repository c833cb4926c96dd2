//! This module contains the reentrancy rule: a path that reads a storage
//! slot, makes an external call, and then writes that same slot has left a
//! window in which a reentering callee observes stale state.

use crate::{
    detector::{
        Detector, DetectorContext, Evidence, Finding, FindingKind, Location,
        REENTRANCY_CONFIDENCE, REENTRANCY_GUARDED_SEVERITY, REENTRANCY_INFLUENCED_CONFIDENCE,
        REENTRANCY_SEVERITY,
    },
    symexec::{
        path::{CallKind, Effect, Path},
        value::SymbolicValue,
    },
};

pub struct Reentrancy;

impl Detector for Reentrancy {
    fn name(&self) -> &'static str {
        "reentrancy"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for path in context.paths.iter().filter(|path| path.feasible) {
            findings.extend(check_path(path));
        }

        findings
    }
}

/// Checks one path for the read-before-call, write-after-call pattern.
fn check_path(path: &Path) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (call_position, effect) in path.effects.iter().enumerate() {
        let Effect::ExternalCall {
            kind,
            target,
            value,
            offset,
            ..
        } = effect
        else {
            continue;
        };
        // A static call cannot reenter with state changes.
        if *kind == CallKind::StaticCall {
            continue;
        }

        let before = &path.effects[..call_position];
        let after = &path.effects[call_position + 1..];

        for written_slot in after.iter().filter_map(storage_write_slot) {
            let read_before_call = before
                .iter()
                .filter_map(storage_read_slot)
                .any(|slot| slot == written_slot);
            if !read_before_call {
                continue;
            }

            // The classic mutex guard writes a flag slot before the call and
            // restores it after; its presence dampens severity rather than
            // suppressing the finding.
            let guarded = before.iter().filter_map(storage_write_slot).any(|slot| {
                after
                    .iter()
                    .filter_map(storage_write_slot)
                    .any(|other| other == slot)
                    && slot != written_slot
            });

            let influenced = target.is_attacker_influenced()
                || value
                    .as_ref()
                    .is_some_and(SymbolicValue::is_attacker_influenced);

            findings.push(Finding {
                kind:     FindingKind::Reentrancy,
                location: Location::Offset(*offset),
                severity: if guarded {
                    REENTRANCY_GUARDED_SEVERITY
                } else {
                    REENTRANCY_SEVERITY
                },
                confidence: if influenced {
                    REENTRANCY_INFLUENCED_CONFIDENCE
                } else {
                    REENTRANCY_CONFIDENCE
                },
                evidence: Some(Evidence::Path(path.id)),
                description: format!(
                    "external call at offset {offset} happens between a read and a write of \
                     the same storage slot, leaving a reentrancy window"
                ),
            });
            // One finding per call is enough; further slots add no signal.
            break;
        }
    }

    findings
}

fn storage_read_slot(effect: &Effect) -> Option<&SymbolicValue> {
    match effect {
        Effect::StorageRead { slot, .. } => Some(slot),
        _ => None,
    }
}

fn storage_write_slot(effect: &Effect) -> Option<&SymbolicValue> {
    match effect {
        Effect::StorageWrite { slot, .. } => Some(slot),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symexec::{
        path::{PathId, PathOutcome},
        value::VarOrigin,
    };

    fn path(id: PathId, effects: Vec<Effect>) -> Path {
        Path {
            id,
            block_sequence: vec![0],
            outcome: PathOutcome::Halt,
            feasible: true,
            effects,
            constraints: Vec::new(),
            max_stack_depth: 0,
        }
    }

    fn call_to_caller() -> Effect {
        Effect::ExternalCall {
            kind:    CallKind::Call,
            target:  SymbolicValue::var(VarOrigin::Caller, 0),
            value:   Some(SymbolicValue::concrete(1u8)),
            result:  SymbolicValue::var(VarOrigin::CallResult, 1),
            checked: true,
            offset:  10,
            block:   0,
        }
    }

    fn read(slot: u8) -> Effect {
        Effect::StorageRead {
            slot:  SymbolicValue::concrete(slot),
            block: 0,
        }
    }

    fn write(slot: u8) -> Effect {
        Effect::StorageWrite {
            slot:  SymbolicValue::concrete(slot),
            value: SymbolicValue::concrete(0u8),
            block: 0,
        }
    }

    #[test]
    fn read_call_write_on_one_slot_is_reentrancy() {
        let p = path(0, vec![read(0), call_to_caller(), write(0)]);
        let findings = check_path(&p);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.kind, FindingKind::Reentrancy);
        assert_eq!(finding.location, Location::Offset(10));
        assert!(finding.severity >= 0.7);
        assert!(finding.confidence >= 0.8);
    }

    #[test]
    fn a_guard_slot_dampens_severity() {
        // Slot 1 is the guard: written before and after the call. Slot 0 is
        // the vulnerable state.
        let p = path(
            0,
            vec![read(0), write(1), call_to_caller(), write(0), write(1)],
        );
        let findings = check_path(&p);

        assert_eq!(findings.len(), 1);
        assert!(findings[0].severity < 0.5);
    }

    #[test]
    fn write_before_the_call_is_not_reentrancy() {
        let p = path(0, vec![read(0), write(0), call_to_caller()]);
        assert!(check_path(&p).is_empty());
    }

    #[test]
    fn static_calls_are_ignored() {
        let static_call = Effect::ExternalCall {
            kind:    CallKind::StaticCall,
            target:  SymbolicValue::var(VarOrigin::Caller, 0),
            value:   None,
            result:  SymbolicValue::var(VarOrigin::CallResult, 1),
            checked: true,
            offset:  10,
            block:   0,
        };
        let p = path(0, vec![read(0), static_call, write(0)]);
        assert!(check_path(&p).is_empty());
    }
}
