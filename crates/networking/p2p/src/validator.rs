use bdp_primitives::BlockHeader;
use thiserror::Error;

/// Consensus / cryptographic validation of a single header, injected by the
/// embedding node. This crate has no opinion on proof-of-work, signatures,
/// or difficulty — it only needs a yes/no answer per header.
pub trait HeaderValidator: Send + Sync {
    fn validate(&self, header: &BlockHeader) -> Result<(), HeaderValidationError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("header at height {height} failed validation: {reason}")]
pub struct HeaderValidationError {
    pub height: u64,
    pub reason: String,
}

/// A validator that accepts everything. Useful for tests and for embedders
/// that perform consensus validation later in the import pipeline instead
/// of during download.
pub struct AcceptAllValidator;

impl HeaderValidator for AcceptAllValidator {
    fn validate(&self, _header: &BlockHeader) -> Result<(), HeaderValidationError> {
        Ok(())
    }
}
