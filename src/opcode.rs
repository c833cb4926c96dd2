//! This module contains the byte values for the EVM's
//! [opcodes](https://ethereum.org/en/developers/docs/evm/opcodes/), along with
//! the classification queries used by the disassembler and the basic-block
//! partitioner.
//!
//! The instruction representation itself is a plain struct (see
//! [`crate::disassembly::Instruction`]) rather than one type per opcode; the
//! analysis here only ever needs the byte value, the immediate, and a handful
//! of structural predicates.

use crate::constant::{
    DUP_OPCODE_BASE_VALUE,
    LOG_OPCODE_BASE_VALUE,
    PUSH_OPCODE_BASE_VALUE,
    SWAP_OPCODE_BASE_VALUE,
};

pub const STOP: u8 = 0x00;
pub const ADD: u8 = 0x01;
pub const MUL: u8 = 0x02;
pub const SUB: u8 = 0x03;
pub const DIV: u8 = 0x04;
pub const SDIV: u8 = 0x05;
pub const MOD: u8 = 0x06;
pub const SMOD: u8 = 0x07;
pub const ADDMOD: u8 = 0x08;
pub const MULMOD: u8 = 0x09;
pub const EXP: u8 = 0x0a;
pub const SIGNEXTEND: u8 = 0x0b;
pub const LT: u8 = 0x10;
pub const GT: u8 = 0x11;
pub const SLT: u8 = 0x12;
pub const SGT: u8 = 0x13;
pub const EQ: u8 = 0x14;
pub const ISZERO: u8 = 0x15;
pub const AND: u8 = 0x16;
pub const OR: u8 = 0x17;
pub const XOR: u8 = 0x18;
pub const NOT: u8 = 0x19;
pub const BYTE: u8 = 0x1a;
pub const SHL: u8 = 0x1b;
pub const SHR: u8 = 0x1c;
pub const SAR: u8 = 0x1d;
pub const KECCAK256: u8 = 0x20;
pub const ADDRESS: u8 = 0x30;
pub const BALANCE: u8 = 0x31;
pub const ORIGIN: u8 = 0x32;
pub const CALLER: u8 = 0x33;
pub const CALLVALUE: u8 = 0x34;
pub const CALLDATALOAD: u8 = 0x35;
pub const CALLDATASIZE: u8 = 0x36;
pub const CALLDATACOPY: u8 = 0x37;
pub const CODESIZE: u8 = 0x38;
pub const CODECOPY: u8 = 0x39;
pub const GASPRICE: u8 = 0x3a;
pub const EXTCODESIZE: u8 = 0x3b;
pub const EXTCODECOPY: u8 = 0x3c;
pub const RETURNDATASIZE: u8 = 0x3d;
pub const RETURNDATACOPY: u8 = 0x3e;
pub const EXTCODEHASH: u8 = 0x3f;
pub const BLOCKHASH: u8 = 0x40;
pub const COINBASE: u8 = 0x41;
pub const TIMESTAMP: u8 = 0x42;
pub const NUMBER: u8 = 0x43;
pub const PREVRANDAO: u8 = 0x44;
pub const GASLIMIT: u8 = 0x45;
pub const CHAINID: u8 = 0x46;
pub const SELFBALANCE: u8 = 0x47;
pub const BASEFEE: u8 = 0x48;
pub const POP: u8 = 0x50;
pub const MLOAD: u8 = 0x51;
pub const MSTORE: u8 = 0x52;
pub const MSTORE8: u8 = 0x53;
pub const SLOAD: u8 = 0x54;
pub const SSTORE: u8 = 0x55;
pub const JUMP: u8 = 0x56;
pub const JUMPI: u8 = 0x57;
pub const PC: u8 = 0x58;
pub const MSIZE: u8 = 0x59;
pub const GAS: u8 = 0x5a;
pub const JUMPDEST: u8 = 0x5b;
pub const PUSH0: u8 = 0x5f;
pub const PUSH1: u8 = 0x60;
pub const PUSH4: u8 = 0x63;
pub const PUSH32: u8 = 0x7f;
pub const DUP1: u8 = 0x80;
pub const DUP16: u8 = 0x8f;
pub const SWAP1: u8 = 0x90;
pub const SWAP16: u8 = 0x9f;
pub const LOG0: u8 = 0xa0;
pub const LOG4: u8 = 0xa4;
pub const CREATE: u8 = 0xf0;
pub const CALL: u8 = 0xf1;
pub const CALLCODE: u8 = 0xf2;
pub const RETURN: u8 = 0xf3;
pub const DELEGATECALL: u8 = 0xf4;
pub const CREATE2: u8 = 0xf5;
pub const STATICCALL: u8 = 0xfa;
pub const REVERT: u8 = 0xfd;
pub const INVALID: u8 = 0xfe;
pub const SELFDESTRUCT: u8 = 0xff;

/// Gets the number of immediate bytes that follow `opcode` in the bytecode.
///
/// This is non-zero only for the `PUSH1..=PUSH32` family.
#[must_use]
pub fn immediate_size(opcode: u8) -> u8 {
    if (PUSH1..=PUSH32).contains(&opcode) {
        opcode - PUSH_OPCODE_BASE_VALUE
    } else {
        0
    }
}

/// Checks if `opcode` is a member of the `PUSH` family, including `PUSH0`.
#[must_use]
pub fn is_push(opcode: u8) -> bool {
    (PUSH0..=PUSH32).contains(&opcode)
}

/// Checks if `opcode` ends a basic block.
///
/// A new block begins immediately after any of these instructions.
#[must_use]
pub fn is_block_terminator(opcode: u8) -> bool {
    matches!(
        opcode,
        JUMP | JUMPI | STOP | RETURN | REVERT | SELFDESTRUCT | INVALID
    ) || !is_known(opcode)
}

/// Checks if `opcode` is one of the byte values assigned by the EVM.
///
/// Unassigned byte values are decoded as `INVALID` instructions rather than
/// as errors, as they are usually CBOR metadata or deliberate revert sinks.
#[must_use]
pub fn is_known(opcode: u8) -> bool {
    matches!(
        opcode,
        STOP..=SIGNEXTEND
            | LT..=SAR
            | KECCAK256
            | ADDRESS..=BASEFEE
            | POP..=GAS
            | JUMPDEST
            | PUSH0..=LOG4
            | CREATE..=CREATE2
            | STATICCALL
            | REVERT
            | INVALID
            | SELFDESTRUCT
    )
}

/// Gets the textual mnemonic for `opcode` to aid in debugging and report
/// rendering.
#[must_use]
pub fn mnemonic(opcode: u8) -> String {
    match opcode {
        STOP => "STOP".into(),
        ADD => "ADD".into(),
        MUL => "MUL".into(),
        SUB => "SUB".into(),
        DIV => "DIV".into(),
        SDIV => "SDIV".into(),
        MOD => "MOD".into(),
        SMOD => "SMOD".into(),
        ADDMOD => "ADDMOD".into(),
        MULMOD => "MULMOD".into(),
        EXP => "EXP".into(),
        SIGNEXTEND => "SIGNEXTEND".into(),
        LT => "LT".into(),
        GT => "GT".into(),
        SLT => "SLT".into(),
        SGT => "SGT".into(),
        EQ => "EQ".into(),
        ISZERO => "ISZERO".into(),
        AND => "AND".into(),
        OR => "OR".into(),
        XOR => "XOR".into(),
        NOT => "NOT".into(),
        BYTE => "BYTE".into(),
        SHL => "SHL".into(),
        SHR => "SHR".into(),
        SAR => "SAR".into(),
        KECCAK256 => "KECCAK256".into(),
        ADDRESS => "ADDRESS".into(),
        BALANCE => "BALANCE".into(),
        ORIGIN => "ORIGIN".into(),
        CALLER => "CALLER".into(),
        CALLVALUE => "CALLVALUE".into(),
        CALLDATALOAD => "CALLDATALOAD".into(),
        CALLDATASIZE => "CALLDATASIZE".into(),
        CALLDATACOPY => "CALLDATACOPY".into(),
        CODESIZE => "CODESIZE".into(),
        CODECOPY => "CODECOPY".into(),
        GASPRICE => "GASPRICE".into(),
        EXTCODESIZE => "EXTCODESIZE".into(),
        EXTCODECOPY => "EXTCODECOPY".into(),
        RETURNDATASIZE => "RETURNDATASIZE".into(),
        RETURNDATACOPY => "RETURNDATACOPY".into(),
        EXTCODEHASH => "EXTCODEHASH".into(),
        BLOCKHASH => "BLOCKHASH".into(),
        COINBASE => "COINBASE".into(),
        TIMESTAMP => "TIMESTAMP".into(),
        NUMBER => "NUMBER".into(),
        PREVRANDAO => "PREVRANDAO".into(),
        GASLIMIT => "GASLIMIT".into(),
        CHAINID => "CHAINID".into(),
        SELFBALANCE => "SELFBALANCE".into(),
        BASEFEE => "BASEFEE".into(),
        POP => "POP".into(),
        MLOAD => "MLOAD".into(),
        MSTORE => "MSTORE".into(),
        MSTORE8 => "MSTORE8".into(),
        SLOAD => "SLOAD".into(),
        SSTORE => "SSTORE".into(),
        JUMP => "JUMP".into(),
        JUMPI => "JUMPI".into(),
        PC => "PC".into(),
        MSIZE => "MSIZE".into(),
        GAS => "GAS".into(),
        JUMPDEST => "JUMPDEST".into(),
        PUSH0 => "PUSH0".into(),
        PUSH1..=PUSH32 => format!("PUSH{}", opcode - PUSH_OPCODE_BASE_VALUE),
        DUP1..=DUP16 => format!("DUP{}", opcode - DUP_OPCODE_BASE_VALUE),
        SWAP1..=SWAP16 => format!("SWAP{}", opcode - SWAP_OPCODE_BASE_VALUE),
        LOG0..=LOG4 => format!("LOG{}", opcode - LOG_OPCODE_BASE_VALUE),
        CREATE => "CREATE".into(),
        CALL => "CALL".into(),
        CALLCODE => "CALLCODE".into(),
        RETURN => "RETURN".into(),
        DELEGATECALL => "DELEGATECALL".into(),
        CREATE2 => "CREATE2".into(),
        STATICCALL => "STATICCALL".into(),
        REVERT => "REVERT".into(),
        SELFDESTRUCT => "SELFDESTRUCT".into(),
        _ => "INVALID".into(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn computes_push_immediate_sizes() {
        assert_eq!(immediate_size(PUSH0), 0);
        assert_eq!(immediate_size(PUSH1), 1);
        assert_eq!(immediate_size(PUSH32), 32);
        assert_eq!(immediate_size(ADD), 0);
    }

    #[test]
    fn classifies_block_terminators() {
        for opcode in [JUMP, JUMPI, STOP, RETURN, REVERT, SELFDESTRUCT, INVALID] {
            assert!(is_block_terminator(opcode));
        }
        assert!(!is_block_terminator(ADD));
        assert!(!is_block_terminator(JUMPDEST));

        // Unassigned bytes terminate blocks too, as they decode to INVALID.
        assert!(is_block_terminator(0x0c));
        assert!(is_block_terminator(0xef));
    }

    #[test]
    fn renders_parameterised_mnemonics() {
        assert_eq!(mnemonic(PUSH4), "PUSH4");
        assert_eq!(mnemonic(0x85), "DUP6");
        assert_eq!(mnemonic(0x91), "SWAP2");
        assert_eq!(mnemonic(0xa2), "LOG2");
        assert_eq!(mnemonic(0x0c), "INVALID");
    }
}
