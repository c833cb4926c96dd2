//! This module contains errors pertaining to the disassembly of the raw
//! bytecode.
//!
//! These are the only fatal errors in the taxonomy: if the input bytes cannot
//! be turned into an instruction stream there is nothing for the rest of the
//! pipeline to analyse, so no partial result is produced.

use thiserror::Error;

use crate::error::container;

/// Errors that occur when disassembling the raw bytecode into an instruction
/// stream.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The provided bytecode was empty")]
    EmptyBytecode,

    #[error("The bytecode exceeds the maximum supported length of {max:?} bytes")]
    BytecodeTooLarge { max: u32 },

    #[error("The provided bytecode was not valid hexadecimal: {message}")]
    InvalidHex { message: String },
}

/// A disassembly error with an associated location in the bytecode.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have disassembly errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, instruction_pointer: u32) -> Self::Located {
        container::Located {
            location: instruction_pointer,
            payload:  self,
        }
    }
}
