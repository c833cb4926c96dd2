//! This module contains the mutable machine state carried along one
//! execution path: the stack, the sparse memory and storage models, the
//! accumulated path condition, and the side-effect log.

use std::collections::HashMap;

use ethnum::U256;

use crate::{
    cfg::{BlockId, FaultReason},
    constant::MAXIMUM_STACK_DEPTH,
    symexec::{
        path::{Constraint, Effect},
        value::{Op, SymbolicValue, Var, VarOrigin},
    },
};

/// The symbolic operand stack.
///
/// All operations surface stack faults as values rather than panicking, so
/// malformed bytecode seals its path with a fault outcome instead of taking
/// the analyser down.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    items: Vec<SymbolicValue>,
}

impl Stack {
    /// Pushes `value`, faulting if the stack is at its 1024-element limit.
    pub fn push(&mut self, value: SymbolicValue) -> Result<(), FaultReason> {
        if self.items.len() >= MAXIMUM_STACK_DEPTH {
            return Err(FaultReason::StackOverflow);
        }
        self.items.push(value);
        Ok(())
    }

    /// Pops the top of the stack, faulting if it is empty.
    pub fn pop(&mut self) -> Result<SymbolicValue, FaultReason> {
        self.items.pop().ok_or(FaultReason::StackUnderflow)
    }

    /// Duplicates the `n`th element from the top (1-based, as in `DUPn`).
    pub fn dup(&mut self, n: usize) -> Result<(), FaultReason> {
        if self.items.len() < n {
            return Err(FaultReason::StackUnderflow);
        }
        let value = self.items[self.items.len() - n].clone();
        self.push(value)
    }

    /// Swaps the top with the `n`th element below it (1-based, as in
    /// `SWAPn`).
    pub fn swap(&mut self, n: usize) -> Result<(), FaultReason> {
        if self.items.len() < n + 1 {
            return Err(FaultReason::StackUnderflow);
        }
        let top = self.items.len() - 1;
        self.items.swap(top, top - n);
        Ok(())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.items.len()
    }
}

/// A sparse model of EVM memory.
///
/// Only concrete-offset writes are tracked. The first write through a
/// symbolic offset poisons the model: from then on, reads that miss return a
/// fresh opaque variable instead of zero, because any tracked word could
/// have been overwritten.
#[derive(Clone, Debug, Default)]
pub struct SparseMemory {
    words:    Vec<(U256, SymbolicValue)>,
    poisoned: bool,
}

impl SparseMemory {
    /// Writes a 32-byte word at `offset`.
    pub fn write_word(&mut self, offset: &SymbolicValue, value: SymbolicValue) {
        match offset.as_concrete() {
            Some(at) => {
                if let Some(entry) = self.words.iter_mut().find(|(o, _)| *o == at) {
                    entry.1 = value;
                } else {
                    self.words.push((at, value));
                }
            }
            None => self.poisoned = true,
        }
    }

    /// Reads the 32-byte word at `offset`, consulting `fresh` for an opaque
    /// replacement when the contents cannot be known.
    pub fn read_word(
        &self,
        offset: &SymbolicValue,
        fresh: &mut impl FnMut() -> SymbolicValue,
    ) -> SymbolicValue {
        let Some(at) = offset.as_concrete() else {
            return fresh();
        };
        if let Some((_, value)) = self.words.iter().find(|(o, _)| *o == at) {
            return value.clone();
        }
        if self.poisoned {
            fresh()
        } else {
            SymbolicValue::Concrete(U256::ZERO)
        }
    }

    /// Forgets everything tracked about memory contents. Bulk copies with
    /// untracked extents (`CALLDATACOPY` and friends) land here.
    pub fn poison(&mut self) {
        self.words.clear();
        self.poisoned = true;
    }

    /// Reads `count` consecutive words starting at the concrete offset
    /// `base`. Used to reconstruct the preimage of a hash.
    pub fn read_words(
        &self,
        base: U256,
        count: usize,
        fresh: &mut impl FnMut() -> SymbolicValue,
    ) -> Vec<SymbolicValue> {
        (0..count)
            .map(|i| {
                let offset =
                    SymbolicValue::Concrete(base.wrapping_add(U256::from((i * 32) as u64)));
                self.read_word(&offset, fresh)
            })
            .collect()
    }
}

/// A sparse model of contract storage for one path.
///
/// Slots are keyed by symbolic equality. A read of a slot that was never
/// written on this path produces an `SLoad` expression over the slot, which
/// is what the storage analyser and the detectors pattern-match on.
#[derive(Clone, Debug, Default)]
pub struct StorageMap {
    slots: Vec<(SymbolicValue, SymbolicValue)>,
}

impl StorageMap {
    pub fn write(&mut self, slot: SymbolicValue, value: SymbolicValue) {
        if let Some(entry) = self.slots.iter_mut().find(|(s, _)| *s == slot) {
            entry.1 = value;
        } else {
            self.slots.push((slot, value));
        }
    }

    #[must_use]
    pub fn read(&self, slot: &SymbolicValue) -> SymbolicValue {
        self.slots
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| SymbolicValue::unary(Op::SLoad, slot.clone()))
    }
}

/// The full machine state carried along one path. Branching clones it.
#[derive(Clone, Debug)]
pub struct ExecutionState {
    pub stack:   Stack,
    pub memory:  SparseMemory,
    pub storage: StorageMap,

    /// The branch conditions accumulated so far.
    pub constraints: Vec<Constraint>,

    /// The side effects performed so far, in execution order.
    pub effects: Vec<Effect>,

    /// The blocks visited so far, in order.
    pub trail: Vec<BlockId>,

    /// How many times each loop has been entered on this path, keyed by the
    /// loop's index in the control-flow analysis.
    pub loop_counts: HashMap<usize, usize>,

    /// Environment words that are stable within one execution, cached so
    /// repeated reads produce the same variable.
    environment: HashMap<VarOrigin, SymbolicValue>,

    /// Calldata words read through a concrete offset, cached per offset.
    calldata: HashMap<U256, SymbolicValue>,

    next_var: u32,

    /// The deepest the stack has been on this path.
    pub max_stack_depth: usize,
}

impl ExecutionState {
    #[must_use]
    pub fn new(entry: BlockId) -> Self {
        Self {
            stack: Stack::default(),
            memory: SparseMemory::default(),
            storage: StorageMap::default(),
            constraints: Vec::new(),
            effects: Vec::new(),
            trail: vec![entry],
            loop_counts: HashMap::new(),
            environment: HashMap::new(),
            calldata: HashMap::new(),
            next_var: 0,
            max_stack_depth: 0,
        }
    }

    /// Mints a new opaque variable with the provided origin.
    pub fn fresh_var(&mut self, origin: VarOrigin) -> SymbolicValue {
        let var = Var::new(origin, self.next_var);
        self.next_var += 1;
        SymbolicValue::Symbolic(var)
    }

    /// Gets the cached environment word for `origin`, minting it on first
    /// use. `CALLER`, `CALLVALUE` and friends read the same value no matter
    /// how often they execute.
    pub fn environment_word(&mut self, origin: VarOrigin) -> SymbolicValue {
        if let Some(value) = self.environment.get(&origin) {
            return value.clone();
        }
        let value = self.fresh_var(origin);
        self.environment.insert(origin, value.clone());
        value
    }

    /// Gets the calldata word at `offset`. Concrete offsets are cached so
    /// the same argument word is the same variable everywhere it is read.
    pub fn calldata_word(&mut self, offset: &SymbolicValue) -> SymbolicValue {
        let Some(at) = offset.as_concrete() else {
            return self.fresh_var(VarOrigin::CallData);
        };
        if let Some(value) = self.calldata.get(&at) {
            return value.clone();
        }
        let value = self.fresh_var(VarOrigin::CallData);
        self.calldata.insert(at, value.clone());
        value
    }

    /// Records that the stack reached its current depth.
    pub fn note_stack_depth(&mut self) {
        self.max_stack_depth = self.max_stack_depth.max(self.stack.depth());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn state() -> ExecutionState {
        ExecutionState::new(BlockId::new(0))
    }

    #[test]
    fn popping_an_empty_stack_is_an_underflow() {
        let mut s = state();
        assert_eq!(s.stack.pop(), Err(FaultReason::StackUnderflow));
    }

    #[test]
    fn pushing_past_the_limit_is_an_overflow() {
        let mut s = state();
        for _ in 0..MAXIMUM_STACK_DEPTH {
            s.stack.push(SymbolicValue::concrete(0u8)).unwrap();
        }
        assert_eq!(
            s.stack.push(SymbolicValue::concrete(0u8)),
            Err(FaultReason::StackOverflow)
        );
    }

    #[test]
    fn unwritten_memory_reads_as_zero() {
        let s = state();
        let read = s
            .memory
            .read_word(&SymbolicValue::concrete(0u8), &mut || {
                SymbolicValue::concrete(99u8)
            });
        assert_eq!(read.as_concrete(), Some(U256::ZERO));
    }

    #[test]
    fn a_symbolic_write_poisons_memory() {
        let mut s = state();
        let symbolic_offset = s.fresh_var(VarOrigin::CallData);
        s.memory
            .write_word(&symbolic_offset, SymbolicValue::concrete(1u8));

        let mut fresh_called = false;
        let read = s.memory.read_word(&SymbolicValue::concrete(0u8), &mut || {
            fresh_called = true;
            SymbolicValue::concrete(0u8)
        });
        assert!(fresh_called);
        let _ = read;
    }

    #[test]
    fn unwritten_storage_reads_as_an_sload_expression() {
        let s = state();
        let read = s.storage.read(&SymbolicValue::concrete(5u8));
        assert!(matches!(read, SymbolicValue::Expr { op: Op::SLoad, .. }));
    }

    #[test]
    fn written_storage_reads_back_the_written_value() {
        let mut s = state();
        let slot = SymbolicValue::concrete(5u8);
        s.storage.write(slot.clone(), SymbolicValue::concrete(42u8));
        assert_eq!(
            s.storage.read(&slot).as_concrete(),
            Some(U256::from(42u8))
        );
    }

    #[test]
    fn environment_words_are_stable_within_a_state() {
        let mut s = state();
        let first = s.environment_word(VarOrigin::Caller);
        let second = s.environment_word(VarOrigin::Caller);
        assert_eq!(first, second);
    }

    #[test]
    fn calldata_words_are_cached_per_concrete_offset() {
        let mut s = state();
        let at_zero = s.calldata_word(&SymbolicValue::concrete(0u8));
        let again = s.calldata_word(&SymbolicValue::concrete(0u8));
        let at_four = s.calldata_word(&SymbolicValue::concrete(4u8));
        assert_eq!(at_zero, again);
        assert_ne!(at_zero, at_four);
    }
}
