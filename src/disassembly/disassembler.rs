//! This module contains the parser that turns a stream of bytes into the
//! instructions of an [`super::InstructionStream`].

use crate::{
    disassembly::Instruction,
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode,
};

/// Disassembles the input `bytes` into an ordered vector of [`Instruction`]s
/// covering every input byte.
///
/// # Unknown Opcodes
///
/// Any byte that is not an assigned opcode (commonly CBOR metadata appended by
/// the compiler) is decoded as a single-byte `INVALID` instruction rather than
/// an error. Such bytes should only ever be reached deliberately to force a
/// revert, and decoding them keeps the byte-to-instruction correspondence
/// exact.
///
/// # Truncated Pushes
///
/// Solc has generated valid code that ends with an incomplete push, so a
/// `PUSH` whose immediate runs off the end of the code is decoded with its
/// immediate zero-padded to the declared width. The instruction's `size`
/// still covers only the bytes that are actually present.
///
/// # Errors
///
/// When `bytes` is empty or longer than [`u32::MAX`].
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if bytes.is_empty() {
        return Err(Error::EmptyBytecode.locate(0));
    }
    let byte_len =
        u32::try_from(bytes.len()).map_err(|_| Error::BytecodeTooLarge { max: u32::MAX }.locate(0))?;

    let mut instructions = Vec::with_capacity(bytes.len());
    let mut offset: u32 = 0;

    while offset < byte_len {
        let byte = bytes[offset as usize];
        let declared_immediate = opcode::immediate_size(byte);

        let instruction = if declared_immediate == 0 {
            Instruction {
                offset,
                opcode: byte,
                immediate: None,
                size: 1,
            }
        } else {
            let immediate_start = offset as usize + 1;
            let immediate_end =
                (immediate_start + declared_immediate as usize).min(bytes.len());
            let mut immediate = bytes[immediate_start..immediate_end].to_vec();

            // The consumed size reflects reality; the immediate is padded to
            // the declared width for value computations.
            let consumed = immediate.len() as u8;
            immediate.resize(declared_immediate as usize, 0);

            Instruction {
                offset,
                opcode: byte,
                immediate: Some(immediate),
                size: 1 + consumed,
            }
        };

        offset = instruction.end_offset();
        instructions.push(instruction);
    }

    Ok(instructions)
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use super::*;
    use crate::{disassembly::InstructionStream, opcode};

    #[test]
    fn errors_on_empty_bytecode() {
        let result = disassemble(&[]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.payload, Error::EmptyBytecode);
    }

    #[test]
    fn decodes_push_immediates() {
        // PUSH1 0x01; PUSH2 0x0203; ADD; STOP
        let bytes = [0x60, 0x01, 0x61, 0x02, 0x03, 0x01, 0x00];
        let instructions = disassemble(&bytes).unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].immediate_word(), Some(U256::from(1u8)));
        assert_eq!(instructions[1].immediate_word(), Some(U256::from(0x0203u16)));
        assert_eq!(instructions[2].opcode, opcode::ADD);
        assert_eq!(instructions[3].opcode, opcode::STOP);
    }

    #[test]
    fn zero_pads_a_truncated_trailing_push() {
        // PUSH4 with only two immediate bytes present.
        let bytes = [0x63, 0xde, 0xad];
        let instructions = disassemble(&bytes).unwrap();

        assert_eq!(instructions.len(), 1);
        let push = &instructions[0];
        assert_eq!(push.size, 3);
        assert_eq!(push.immediate.as_deref(), Some(&[0xde, 0xad, 0x00, 0x00][..]));
    }

    #[test]
    fn decodes_unknown_bytes_as_invalid() {
        let bytes = [0x0c, 0xef, 0x00];
        let instructions = disassemble(&bytes).unwrap();

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].mnemonic(), "INVALID");
        assert_eq!(instructions[1].mnemonic(), "INVALID");
        assert_eq!(instructions[2].mnemonic(), "STOP");
    }

    #[test]
    fn coverage_is_byte_exact_for_arbitrary_input() {
        // A blob mixing valid opcodes, pushes and garbage bytes.
        let bytes: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        let stream = InstructionStream::try_from(bytes.as_slice()).unwrap();

        let mut expected_start = 0u32;
        for instruction in stream.instructions() {
            assert_eq!(instruction.offset, expected_start);
            expected_start = instruction.end_offset();
        }
        assert_eq!(expected_start, stream.byte_len());
    }
}
