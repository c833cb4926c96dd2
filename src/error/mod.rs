//! This module contains the primary error type for the analyzer's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.
//!
//! # Errors versus Outcomes
//!
//! Almost nothing that happens while analysing real bytecode is an error.
//! Stack underflows, invalid jumps, invalid opcodes and exhausted exploration
//! budgets are all *expected outcomes* of running hostile or optimiser-mangled
//! code and are modelled as path outcomes (see
//! [`crate::symexec::path::PathOutcome`]) that degrade the report's coverage,
//! never as members of these error types. Only a malformed input
//! ([`disassembly::Error`]) is fatal to a request; cache failures
//! ([`cache::Error`]) are logged and degrade to uncached computation.

pub mod cache;
pub mod container;
pub mod disassembly;

use thiserror::Error;

/// The interface result type for the library.
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors that come from the disassembly process.
    #[error(transparent)]
    Disassembly(#[from] disassembly::LocatedError),

    /// Errors from the analysis cache.
    #[error(transparent)]
    Cache(#[from] cache::Error),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
