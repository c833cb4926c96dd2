//! This module contains types useful for dealing with concrete contracts
//! that you want to analyse.

use crate::{
    constant::CONTRACT_MAXIMUM_SIZE_BYTES,
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
};

/// A representation of a contract that is passed to the library.
///
/// The analysis operates on deployed (runtime) bytecode. The creation code,
/// where available, is analysed by [`crate::analyze_creation`] as its own
/// contract; the constructor's storage writes are part of the layout too.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contract {
    runtime:  Vec<u8>,
    creation: Option<Vec<u8>>,
}

impl Contract {
    /// Creates a new contract from the provided deployed `runtime` bytecode.
    #[must_use]
    pub fn new(runtime: Vec<u8>) -> Self {
        Self {
            runtime,
            creation: None,
        }
    }

    /// Attaches the creation (constructor) bytecode to the contract.
    #[must_use]
    pub fn with_creation_code(mut self, creation: Vec<u8>) -> Self {
        self.creation = Some(creation);
        self
    }

    /// Creates a new contract from a hex string, with or without the
    /// customary `0x` prefix.
    ///
    /// # Errors
    ///
    /// When the string is not valid hex.
    pub fn from_hex(hex_string: impl AsRef<str>) -> Result<Self> {
        let trimmed = hex_string.as_ref().trim();
        let without_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let runtime = hex::decode(without_prefix).map_err(|source| {
            Error::InvalidHex {
                message: source.to_string(),
            }
            .locate(0)
        })?;

        if runtime.len() > CONTRACT_MAXIMUM_SIZE_BYTES {
            tracing::warn!(
                size = runtime.len(),
                limit = CONTRACT_MAXIMUM_SIZE_BYTES,
                "bytecode exceeds the deployable size limit; analysing anyway"
            );
        }

        Ok(Self::new(runtime))
    }

    /// Gets a reference to the deployed bytecode of the contract.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.runtime
    }

    /// Gets a reference to the creation bytecode, if it was provided.
    #[must_use]
    pub fn creation_code(&self) -> Option<&[u8]> {
        self.creation.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_prefixed_and_bare_hex() {
        let prefixed = Contract::from_hex("0x6001600201").unwrap();
        let bare = Contract::from_hex("6001600201").unwrap();
        assert_eq!(prefixed, bare);
        assert_eq!(prefixed.bytecode(), &[0x60, 0x01, 0x60, 0x02, 0x01]);
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(Contract::from_hex("0xzz").is_err());
        assert!(Contract::from_hex("123").is_err());
    }
}
