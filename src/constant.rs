//! This module contains constants that are needed throughout the codebase.

/// The maximum size that a contract can have when being deployed on the
/// blockchain.
///
/// This is specified in [EIP-170](https://eips.ethereum.org/EIPS/eip-170).
pub const CONTRACT_MAXIMUM_SIZE_BYTES: usize = 24_576;

/// The maximum stack depth for the EVM.
///
/// Any symbolic state that would exceed this depth terminates its path with a
/// stack-overflow fault, exactly as a real EVM execution would.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of a word on the EVM in bits.
pub const WORD_SIZE_BITS: usize = 256;

/// The width of a byte on the EVM (and most other places) in bits.
pub const BYTE_SIZE_BITS: usize = 8;

/// The width of a word on the EVM in bytes.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE_BITS / BYTE_SIZE_BITS;

/// The bit-width of a selector type.
pub const SELECTOR_WIDTH_BITS: usize = 32;

/// The width of a function selector in bytes.
pub const SELECTOR_WIDTH_BYTES: usize = SELECTOR_WIDTH_BITS / BYTE_SIZE_BITS;

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The base byte value for the `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The default maximum number of paths that a single exploration will seal
/// before abandoning the remainder of the work-list.
pub const DEFAULT_MAXIMUM_PATHS: usize = 256;

/// The default maximum number of basic blocks a single path may traverse.
pub const DEFAULT_MAXIMUM_PATH_DEPTH: usize = 128;

/// The default wall-clock budget for a single exploration, in milliseconds.
pub const DEFAULT_MAXIMUM_TIME_MS: u64 = 5_000;

/// The default number of times a path may re-enter any one loop (strongly
/// connected component) before it is abandoned.
pub const DEFAULT_LOOP_ITERATION_CAP: usize = 3;

/// The default per-call timeout for the constraint solver, in milliseconds.
pub const DEFAULT_SOLVER_TIMEOUT_MS: u64 = 250;

/// The default number of exploration workers.
///
/// A single worker makes the default configuration bit-deterministic; the
/// finding set remains scheduling-independent for larger pools because
/// findings are merged by identity.
pub const DEFAULT_EXPLORATION_WORKERS: usize = 1;

/// The default number of work-list pops an exploration worker performs
/// between polls of the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 16;

/// The default number of analysis reports retained by the bounded LRU cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;
