//! This module contains the storage analyser: it folds the storage traffic
//! of all sealed paths into a per-slot view, infers the shape of each slot
//! from the structure of its slot expression, detects sub-word packing, and
//! compares two layouts for collisions.

use ethnum::U256;
use itertools::Itertools;
use serde::Serialize;

use crate::symexec::{
    path::{Effect, Path, PathId},
    value::{Op, SymbolicValue},
};

/// The inferred shape of a storage slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum SlotShape {
    /// A plain word at a fixed slot.
    Scalar,

    /// An element of an array, recognised as an offset from a hashed or
    /// fixed base.
    Array,

    /// A mapping value, recognised as a direct Keccak-derived slot.
    Mapping,

    /// A slot whose expression matches no known layout pattern.
    Unknown,
}

/// The direction of a storage access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One access to a storage slot.
#[derive(Clone, Debug)]
pub struct SlotAccess {
    pub kind: AccessKind,

    /// The start offset of the block the access executed in.
    pub block: u32,

    /// The path the access was observed on.
    pub path: PathId,
}

/// Everything the analyser learned about one storage slot.
#[derive(Clone, Debug)]
pub struct StorageSlot {
    /// The slot expression, concrete for scalars and symbolic for derived
    /// slots.
    pub slot: SymbolicValue,

    /// All observed accesses, in path order.
    pub accesses: Vec<SlotAccess>,

    /// The inferred shape.
    pub shape: SlotShape,

    /// The byte offset of a packed sub-word field within the slot, where one
    /// was detected from a masked read-modify-write.
    pub packing_offset: Option<u8>,
}

impl StorageSlot {
    /// Gets the concrete slot number, if the slot is a fixed one.
    #[must_use]
    pub fn concrete_slot(&self) -> Option<U256> {
        self.slot.as_concrete()
    }

    /// Checks whether any access wrote the slot.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.accesses
            .iter()
            .any(|access| access.kind == AccessKind::Write)
    }
}

/// The per-slot view of all storage traffic in an exploration.
#[derive(Clone, Debug, Default)]
pub struct StorageAnalysis {
    /// The discovered slots, concrete slots first in ascending order,
    /// derived slots after in first-seen order.
    pub slots: Vec<StorageSlot>,
}

impl StorageAnalysis {
    /// Finds the entry for a concrete slot number.
    #[must_use]
    pub fn slot(&self, number: impl Into<U256>) -> Option<&StorageSlot> {
        let number = number.into();
        self.slots
            .iter()
            .find(|entry| entry.concrete_slot() == Some(number))
    }
}

/// A disagreement between two layouts about the same slot.
#[derive(Clone, Debug)]
pub struct SlotCollision {
    /// The slot both layouts use.
    pub slot: SymbolicValue,

    /// The shape on the left (usually the currently deployed contract).
    pub left: SlotShape,

    /// The shape on the right (usually the replacement implementation).
    pub right: SlotShape,
}

/// Folds the storage traffic of the provided paths into a per-slot analysis.
///
/// Effects on infeasible paths are ignored; they cannot occur on chain.
#[must_use]
pub fn analyze(paths: &[Path]) -> StorageAnalysis {
    let mut slots: Vec<StorageSlot> = Vec::new();

    for path in paths.iter().filter(|path| path.feasible) {
        for effect in &path.effects {
            let (slot, kind, block, written_value) = match effect {
                Effect::StorageRead { slot, block } => (slot, AccessKind::Read, *block, None),
                Effect::StorageWrite { slot, value, block } => {
                    (slot, AccessKind::Write, *block, Some(value))
                }
                _ => continue,
            };

            let index = match slots.iter().position(|entry| entry.slot == *slot) {
                Some(index) => index,
                None => {
                    slots.push(StorageSlot {
                        slot:           slot.clone(),
                        accesses:       Vec::new(),
                        shape:          infer_shape(slot),
                        packing_offset: None,
                    });
                    slots.len() - 1
                }
            };
            let entry = &mut slots[index];

            entry.accesses.push(SlotAccess {
                kind,
                block,
                path: path.id,
            });

            if let Some(value) = written_value {
                if entry.packing_offset.is_none() {
                    entry.packing_offset = packed_field_offset(slot, value);
                }
            }
        }
    }

    slots.sort_by(|a, b| match (a.concrete_slot(), b.concrete_slot()) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    StorageAnalysis { slots }
}

/// Compares two layouts and reports every slot the two use with
/// incompatible shapes or packing.
///
/// Derived slots are compared through their root slot number: a mapping
/// value at `keccak(key . n)` and a scalar at slot `n` occupy the same
/// declaration slot, which is exactly the collision an unsafe upgrade
/// introduces. Slots only one side touches are not collisions; an upgrade is
/// free to add or retire state.
#[must_use]
pub fn compare(left: &StorageAnalysis, right: &StorageAnalysis) -> Vec<SlotCollision> {
    let mut collisions = Vec::new();

    for left_slot in &left.slots {
        let Some(left_root) = root_slot(&left_slot.slot) else {
            continue;
        };
        let Some(right_slot) = right
            .slots
            .iter()
            .find(|candidate| root_slot(&candidate.slot) == Some(left_root))
        else {
            continue;
        };

        let shapes_disagree = left_slot.shape != right_slot.shape
            && left_slot.shape != SlotShape::Unknown
            && right_slot.shape != SlotShape::Unknown;
        let packing_disagrees = left_slot.packing_offset.is_some()
            && right_slot.packing_offset.is_some()
            && left_slot.packing_offset != right_slot.packing_offset;

        if shapes_disagree || packing_disagrees {
            collisions.push(SlotCollision {
                slot:  SymbolicValue::Concrete(left_root),
                left:  left_slot.shape,
                right: right_slot.shape,
            });
        }
    }

    // Two derived slots can share a root; one collision per root is enough.
    collisions.sort_by_key(|collision| collision.slot.as_concrete());
    collisions.dedup_by_key(|collision| collision.slot.clone());
    collisions
}

/// Derives the declaration slot number a slot expression is rooted at.
///
/// A fixed slot is its own root. A mapping value at `keccak(key . n)` is
/// rooted at `n` (the trailing preimage word), and an array element at
/// `keccak(n) + i` or `n + i` at `n`. Slots with no concrete root cannot be
/// compared across layouts and yield [`None`].
#[must_use]
pub fn root_slot(slot: &SymbolicValue) -> Option<U256> {
    match slot {
        SymbolicValue::Concrete(number) => Some(*number),
        SymbolicValue::Expr { op: Op::Keccak, args } => {
            args.last().and_then(SymbolicValue::as_concrete)
        }
        SymbolicValue::Expr { op: Op::Add, args } => args.iter().find_map(root_slot),
        _ => None,
    }
}

/// Infers the shape of a slot from the structure of its slot expression.
///
/// The patterns are the ones the Solidity storage layout produces: a mapping
/// value lives directly at a Keccak-derived slot, a dynamic array element at
/// a Keccak base plus an index, and a scalar at a fixed slot number.
fn infer_shape(slot: &SymbolicValue) -> SlotShape {
    match slot {
        SymbolicValue::Concrete(_) => SlotShape::Scalar,
        SymbolicValue::Expr { op: Op::Keccak, .. } => SlotShape::Mapping,
        SymbolicValue::Expr { op: Op::Add, args } => {
            let has_hashed_base = args.iter().any(SymbolicValue::contains_keccak);
            let has_concrete_base = args.iter().any(|arg| arg.as_concrete().is_some());
            if has_hashed_base || has_concrete_base {
                SlotShape::Array
            } else {
                SlotShape::Unknown
            }
        }
        _ => SlotShape::Unknown,
    }
}

/// Detects a packed sub-word field from a masked read-modify-write.
///
/// Solc compiles a packed store as a blend of the old slot word and the new
/// field: the written value combines an `AND`-masked `SLOAD` of the same
/// slot with the new field shifted into position. The field's byte offset
/// falls out of the shift amount.
fn packed_field_offset(slot: &SymbolicValue, written: &SymbolicValue) -> Option<u8> {
    if !contains_masked_sload_of(written, slot) {
        return None;
    }
    let shift_bits = smallest_blend_shift(written)?;
    u8::try_from(shift_bits / 8).ok()
}

/// Checks whether `value` contains an `AND`-masked `SLOAD` of exactly
/// `slot`. Requiring the mask keeps plain read-modify-writes, such as a
/// counter increment, from registering as packing.
fn contains_masked_sload_of(value: &SymbolicValue, slot: &SymbolicValue) -> bool {
    match value {
        SymbolicValue::Expr { op: Op::And, args } => {
            args.iter().any(|arg| references_sload_of(arg, slot))
                || args.iter().any(|arg| contains_masked_sload_of(arg, slot))
        }
        SymbolicValue::Expr { args, .. } => {
            args.iter().any(|arg| contains_masked_sload_of(arg, slot))
        }
        _ => false,
    }
}

/// Checks whether `value` contains an `SLOAD` of exactly `slot`.
fn references_sload_of(value: &SymbolicValue, slot: &SymbolicValue) -> bool {
    match value {
        SymbolicValue::Expr { op: Op::SLoad, args } => args.first() == Some(slot),
        SymbolicValue::Expr { args, .. } => {
            args.iter().any(|arg| references_sload_of(arg, slot))
        }
        _ => false,
    }
}

/// Finds the smallest concrete left-shift inside a blend expression, which
/// for a solc-style packed write is the field's bit offset. A write that
/// blends without shifting packs at offset zero.
fn smallest_blend_shift(value: &SymbolicValue) -> Option<u32> {
    collect_shifts(value)
        .into_iter()
        .sorted()
        .next()
        .or(Some(0))
}

fn collect_shifts(value: &SymbolicValue) -> Vec<u32> {
    let mut shifts = Vec::new();
    if let SymbolicValue::Expr { op, args } = value {
        if *op == Op::Shl && args.len() == 2 {
            if let Some(amount) = args[0].as_concrete() {
                if let Ok(bits) = u32::try_from(amount) {
                    if bits < 256 {
                        shifts.push(bits);
                    }
                }
            }
        }
        for arg in args.iter() {
            shifts.extend(collect_shifts(arg));
        }
    }
    shifts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symexec::{
        path::{PathOutcome, Path},
        value::VarOrigin,
    };

    fn path_with_effects(id: PathId, effects: Vec<Effect>) -> Path {
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

    fn write(slot: SymbolicValue, value: SymbolicValue) -> Effect {
        Effect::StorageWrite {
            slot,
            value,
            block: 0,
        }
    }

    #[test]
    fn concrete_slots_are_scalars() {
        let paths = [path_with_effects(
            0,
            vec![write(SymbolicValue::concrete(0u8), SymbolicValue::concrete(1u8))],
        )];
        let analysis = analyze(&paths);

        assert_eq!(analysis.slots.len(), 1);
        assert_eq!(analysis.slots[0].shape, SlotShape::Scalar);
        assert!(analysis.slots[0].is_written());
    }

    #[test]
    fn keccak_slots_are_mappings() {
        let hashed = SymbolicValue::expr(
            Op::Keccak,
            vec![
                SymbolicValue::var(VarOrigin::Caller, 0),
                SymbolicValue::concrete(2u8),
            ],
        );
        let paths = [path_with_effects(
            0,
            vec![write(hashed, SymbolicValue::concrete(1u8))],
        )];
        let analysis = analyze(&paths);

        assert_eq!(analysis.slots[0].shape, SlotShape::Mapping);
    }

    #[test]
    fn keccak_plus_index_slots_are_arrays() {
        let base = SymbolicValue::expr(Op::Keccak, vec![SymbolicValue::concrete(3u8)]);
        let element = SymbolicValue::binary(
            Op::Add,
            base,
            SymbolicValue::var(VarOrigin::CallData, 0),
        );
        let paths = [path_with_effects(
            0,
            vec![write(element, SymbolicValue::concrete(1u8))],
        )];
        let analysis = analyze(&paths);

        assert_eq!(analysis.slots[0].shape, SlotShape::Array);
    }

    #[test]
    fn infeasible_paths_contribute_nothing() {
        let mut path = path_with_effects(
            0,
            vec![write(SymbolicValue::concrete(0u8), SymbolicValue::concrete(1u8))],
        );
        path.feasible = false;
        let analysis = analyze(&[path]);

        assert!(analysis.slots.is_empty());
    }

    #[test]
    fn a_masked_blend_write_reveals_packing() {
        // Writing Or(And(SLoad(0), mask), Shl(16, field)) packs a field at
        // byte offset two.
        let slot = SymbolicValue::concrete(0u8);
        let old = SymbolicValue::unary(Op::SLoad, slot.clone());
        let masked = SymbolicValue::binary(
            Op::And,
            old,
            SymbolicValue::var(VarOrigin::Fresh, 0),
        );
        let shifted = SymbolicValue::binary(
            Op::Shl,
            SymbolicValue::concrete(16u8),
            SymbolicValue::var(VarOrigin::CallData, 0),
        );
        let blended = SymbolicValue::binary(Op::Or, masked, shifted);

        let paths = [path_with_effects(0, vec![write(slot, blended)])];
        let analysis = analyze(&paths);

        assert_eq!(analysis.slots[0].packing_offset, Some(2));
    }

    #[test]
    fn comparing_layouts_reports_shape_disagreements() {
        let scalar_write = vec![write(
            SymbolicValue::concrete(1u8),
            SymbolicValue::concrete(7u8),
        )];
        let mapping_write = vec![write(
            SymbolicValue::concrete(1u8),
            SymbolicValue::concrete(7u8),
        )];
        let left = analyze(&[path_with_effects(0, scalar_write)]);
        let mut right = analyze(&[path_with_effects(0, mapping_write)]);
        right.slots[0].shape = SlotShape::Mapping;

        let collisions = compare(&left, &right);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].left, SlotShape::Scalar);
        assert_eq!(collisions[0].right, SlotShape::Mapping);
    }

    #[test]
    fn a_mapping_collides_with_a_scalar_at_its_root_slot() {
        let left = analyze(&[path_with_effects(
            0,
            vec![write(SymbolicValue::concrete(1u8), SymbolicValue::concrete(7u8))],
        )]);
        let hashed = SymbolicValue::expr(
            Op::Keccak,
            vec![
                SymbolicValue::var(VarOrigin::Caller, 0),
                SymbolicValue::concrete(1u8),
            ],
        );
        let right = analyze(&[path_with_effects(
            0,
            vec![write(hashed, SymbolicValue::concrete(7u8))],
        )]);

        let collisions = compare(&left, &right);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].slot, SymbolicValue::concrete(1u8));
        assert_eq!(collisions[0].left, SlotShape::Scalar);
        assert_eq!(collisions[0].right, SlotShape::Mapping);
    }

    #[test]
    fn slots_touched_by_only_one_side_do_not_collide() {
        let left = analyze(&[path_with_effects(
            0,
            vec![write(SymbolicValue::concrete(1u8), SymbolicValue::concrete(7u8))],
        )]);
        let right = analyze(&[path_with_effects(
            0,
            vec![write(SymbolicValue::concrete(2u8), SymbolicValue::concrete(7u8))],
        )]);

        assert!(compare(&left, &right).is_empty());
    }
}
