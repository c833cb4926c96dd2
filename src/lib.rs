//! This library implements a security analysis of
//! [EVM](https://ethereum.org/en/developers/docs/evm/) bytecode: it looks
//! for the vulnerability patterns that matter when deciding whether a
//! contract, or an upgrade to one, is safe to interact with. It is a _best
//! effort_ analysis: it bounds its own exploration and reports how much of
//! the contract it actually covered.
//!
//! Note that this library is not intended to be nor expected to evolve into
//! a full decompiler for EVM bytecode.
//!
//! # How it Works
//!
//! From a very high level, the analysis is performed as follows:
//!
//! 1. Bytecode is ingested and turned into a
//!    [`disassembly::InstructionStream`]: a sequence of instructions whose
//!    byte ranges exactly cover the input.
//! 2. The stream is partitioned into basic blocks and connected into a
//!    [`cfg::Cfg`], whose analysis finds loops, unreachable code, and the
//!    function entries behind the selector dispatcher.
//! 3. A bounded [`symexec::Executor`] walks the graph symbolically,
//!    consulting a pluggable constraint solver at every branch and sealing
//!    one [`symexec::path::Path`] per explored execution.
//! 4. The [`storage`] analyser folds the paths' storage traffic into a
//!    per-slot layout view, and the [`detector`] rules pattern-match paths,
//!    graph and layout for vulnerabilities.
//! 5. The [`aggregator`] merges the findings and scores them, producing a
//!    [`report::AnalysisReport`] that can be cached in a [`cache::ReportCache`]
//!    keyed by the bytecode's content hash.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct a
//! [`contract::Contract`] and hand it to [`analyze`] with a [`Budget`].
//!
//! ```
//! use bytecode_risk_analyzer as bra;
//! use bra::{contract::Contract, symexec::Budget};
//!
//! // PUSH1 0x01; PUSH1 0x02; ADD; STOP
//! let contract = Contract::from_hex("0x600160020100").unwrap();
//! let report = bra::analyze(contract, Budget::default()).unwrap();
//!
//! assert_eq!(report.cfg_summary.block_count, 1);
//! assert!(report.vulnerabilities.is_empty());
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::cast_precision_loss)] // Ratios in reports are approximate by nature

pub mod aggregator;
pub mod analyzer;
pub mod cache;
pub mod cfg;
pub mod constant;
pub mod contract;
pub mod detector;
pub mod disassembly;
pub mod error;
pub mod opcode;
pub mod report;
pub mod storage;
pub mod symexec;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use analyzer::{analyze, analyze_creation, compare, new, ComparisonReport};
pub use report::AnalysisReport;
pub use symexec::Budget;
