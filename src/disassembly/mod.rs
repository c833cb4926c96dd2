//! This module contains the representation of the decoded bytecode: the
//! [`Instruction`] and the [`InstructionStream`] it lives in.

mod disassembler;

pub use disassembler::disassemble;
use ethnum::U256;

use crate::{constant::WORD_SIZE_BYTES, error::disassembly, opcode};

/// A single decoded EVM instruction.
///
/// Instructions are immutable once decoded. They are owned by the
/// [`InstructionStream`] and referenced by byte offset from the basic blocks
/// that partition the stream.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Instruction {
    /// The byte offset at which this instruction starts in the bytecode.
    pub offset: u32,

    /// The opcode byte.
    pub opcode: u8,

    /// The immediate operand for the `PUSH1..=PUSH32` family.
    ///
    /// The immediate is always the declared width of the push. Where the
    /// bytecode ends inside the immediate (legal EVM behaviour), the missing
    /// bytes are zero-padded here while [`Self::size`] still reflects only the
    /// bytes actually present, keeping byte coverage exact.
    pub immediate: Option<Vec<u8>>,

    /// The number of bytecode bytes this instruction covers, including the
    /// opcode byte itself.
    pub size: u8,
}

impl Instruction {
    /// Gets the byte offset one past the end of this instruction.
    #[must_use]
    pub fn end_offset(&self) -> u32 {
        self.offset + u32::from(self.size)
    }

    /// Gets the immediate operand as a word, if one exists.
    #[must_use]
    pub fn immediate_word(&self) -> Option<U256> {
        self.immediate.as_ref().map(|bytes| {
            let mut padded = [0u8; WORD_SIZE_BYTES];
            padded[WORD_SIZE_BYTES - bytes.len()..].copy_from_slice(bytes);
            U256::from_be_bytes(padded)
        })
    }

    /// Gets the textual mnemonic of this instruction.
    #[must_use]
    pub fn mnemonic(&self) -> String {
        opcode::mnemonic(self.opcode)
    }
}

/// An ordered sequence of instructions that corresponds 1:1 with the bytes of
/// the input bytecode.
///
/// # Byte-Exact Coverage
///
/// The byte ranges of the contained instructions are disjoint and their union
/// is exactly `[0, byte_len)`. Invalid and unknown opcode bytes are
/// represented as single-byte `INVALID` instructions rather than being
/// skipped, so the correspondence holds for any input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    byte_len:     u32,
}

impl InstructionStream {
    /// Gets the number of decoded instructions in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks if the stream contains no instructions.
    ///
    /// This is always `false` for a successfully constructed stream, but is
    /// provided for API completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the length of the originating bytecode in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u32 {
        self.byte_len
    }

    /// Gets the decoded instructions in bytecode order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    /// Gets the instruction that starts at the byte offset `offset`, if one
    /// does.
    ///
    /// Returns [`None`] for offsets in the middle of an instruction (such as
    /// push immediates) and for offsets outside the bytecode.
    #[must_use]
    pub fn instruction_at(&self, offset: u32) -> Option<&Instruction> {
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
            .map(|index| &self.instructions[index])
    }

    /// Checks whether `offset` is the start of a `JUMPDEST` instruction, and
    /// hence a valid jump target.
    #[must_use]
    pub fn is_jump_target(&self, offset: u32) -> bool {
        self.instruction_at(offset)
            .is_some_and(|i| i.opcode == opcode::JUMPDEST)
    }
}

/// The canonical way to construct an instruction stream is from the raw bytes
/// of the contract.
impl TryFrom<&[u8]> for InstructionStream {
    type Error = disassembly::LocatedError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let instructions = disassemble(bytes)?;
        let byte_len = bytes.len() as u32;
        Ok(Self {
            instructions,
            byte_len,
        })
    }
}
