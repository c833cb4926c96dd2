//! This module contains the vulnerability detectors: small, independent
//! rules that pattern-match over the sealed paths, the control-flow
//! analysis, and the storage analysis, each producing zero or more findings.
//!
//! Rules never fail; the absence of a pattern simply yields no finding. New
//! rules plug in by implementing [`Detector`] and joining the set handed to
//! the aggregator.

pub mod jumps;
pub mod loops;
pub mod reentrancy;
pub mod selfdestruct;
pub mod storage_collision;
pub mod timestamp;
pub mod unchecked_call;

use serde::Serialize;

use crate::{
    cfg::{analysis::CfgAnalysis, Cfg},
    storage::{SlotCollision, StorageAnalysis},
    symexec::{
        path::{Path, PathId},
        value::SymbolicValue,
    },
};

/// The closed set of vulnerability classes the analyser can report.
///
/// The enum is deliberately closed: a finding kind that does not exist
/// cannot be emitted, and exhaustive matches catch any report rendering that
/// forgets a class. Kinds without a built-in rule below are emitted only by
/// externally registered detectors.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum FindingKind {
    Reentrancy,
    UncheckedExternalCall,
    IntegerOverflow,
    AccessControlGap,
    UnboundedLoop,
    InvalidJumpTarget,
    StorageCollision,
    SelfDestructReachable,
    TimestampDependency,
    ArbitraryJump,
    DosViaGas,
    FrontRunnable,
}

/// Where in the contract a finding points.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Location {
    /// A byte offset into the bytecode.
    Offset(u32),

    /// A storage slot, for findings about the storage layout.
    Slot(SymbolicValue),
}

/// What a finding rests on.
#[derive(Clone, Debug)]
pub enum Evidence {
    /// The path the pattern was observed on.
    Path(PathId),

    /// The storage slots involved.
    Slots(Vec<SymbolicValue>),
}

/// A single vulnerability finding.
#[derive(Clone, Debug)]
pub struct Finding {
    pub kind: FindingKind,
    pub location: Location,

    /// How bad the issue is if real, in `[0, 1]`.
    pub severity: f32,

    /// How sure the rule is that the issue is real, in `[0, 1]`.
    pub confidence: f32,

    pub evidence: Option<Evidence>,
    pub description: String,
}

impl Finding {
    /// The identity findings are deduplicated by.
    #[must_use]
    pub fn identity(&self) -> (FindingKind, Location) {
        (self.kind, self.location.clone())
    }
}

/// Everything a detector may inspect.
#[derive(Clone, Copy)]
pub struct DetectorContext<'a> {
    pub cfg:      &'a Cfg,
    pub analysis: &'a CfgAnalysis,
    pub paths:    &'a [Path],
    pub storage:  &'a StorageAnalysis,

    /// The slot collisions from a comparison run, absent in single-contract
    /// mode.
    pub collisions: Option<&'a [SlotCollision]>,
}

/// The interface every vulnerability rule implements.
pub trait Detector {
    /// Gets the rule's name for logging.
    fn name(&self) -> &'static str;

    /// Runs the rule over the provided context.
    fn run(&self, context: &DetectorContext) -> Vec<Finding>;
}

/// Constructs the built-in rule set.
#[must_use]
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(reentrancy::Reentrancy),
        Box::new(unchecked_call::UncheckedCall),
        Box::new(jumps::JumpIntegrity),
        Box::new(loops::LoopBounds),
        Box::new(storage_collision::StorageCollisions),
        Box::new(selfdestruct::SelfDestructReach),
        Box::new(timestamp::TimestampDependence),
    ]
}

// The per-rule severity and confidence constants, kept together so they can
// be reviewed and tuned as one table.

pub const REENTRANCY_SEVERITY: f32 = 0.85;
pub const REENTRANCY_GUARDED_SEVERITY: f32 = 0.35;
pub const REENTRANCY_CONFIDENCE: f32 = 0.8;
pub const REENTRANCY_INFLUENCED_CONFIDENCE: f32 = 0.9;

pub const UNCHECKED_CALL_SEVERITY: f32 = 0.6;
pub const UNCHECKED_CALL_CONFIDENCE: f32 = 0.7;

pub const INVALID_JUMP_SEVERITY: f32 = 0.4;
pub const INVALID_JUMP_CONFIDENCE: f32 = 0.9;

pub const ARBITRARY_JUMP_SEVERITY: f32 = 0.75;
pub const ARBITRARY_JUMP_CONFIDENCE: f32 = 0.6;

pub const UNBOUNDED_LOOP_SEVERITY: f32 = 0.5;
pub const UNBOUNDED_LOOP_CONFIDENCE: f32 = 0.5;
pub const UNBOUNDED_LOOP_OBSERVED_CONFIDENCE: f32 = 0.65;

pub const STORAGE_COLLISION_SEVERITY: f32 = 0.8;
pub const STORAGE_COLLISION_CONFIDENCE: f32 = 0.75;

pub const SELFDESTRUCT_SEVERITY: f32 = 0.55;
pub const SELFDESTRUCT_INFLUENCED_BONUS: f32 = 0.25;
pub const SELFDESTRUCT_CONFIDENCE: f32 = 0.6;

pub const TIMESTAMP_SEVERITY: f32 = 0.3;
pub const TIMESTAMP_CONFIDENCE: f32 = 0.5;
