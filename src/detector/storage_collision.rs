//! This module contains the storage-collision rule, which is only active in
//! comparison mode: it reports every slot the two compared layouts use with
//! incompatible shapes.

use crate::detector::{
    Detector, DetectorContext, Evidence, Finding, FindingKind, Location,
    STORAGE_COLLISION_CONFIDENCE, STORAGE_COLLISION_SEVERITY,
};

pub struct StorageCollisions;

impl Detector for StorageCollisions {
    fn name(&self) -> &'static str {
        "storage-collision"
    }

    fn run(&self, context: &DetectorContext) -> Vec<Finding> {
        let Some(collisions) = context.collisions else {
            return Vec::new();
        };

        collisions
            .iter()
            .map(|collision| Finding {
                kind:     FindingKind::StorageCollision,
                location: Location::Slot(collision.slot.clone()),
                severity: STORAGE_COLLISION_SEVERITY,
                confidence: STORAGE_COLLISION_CONFIDENCE,
                evidence: Some(Evidence::Slots(vec![collision.slot.clone()])),
                description: format!(
                    "the compared contracts use the same slot as {:?} and {:?}; upgrading \
                     between them corrupts state",
                    collision.left, collision.right
                ),
            })
            .collect()
    }
}
