//! Error types for package generation

use thiserror::Error;

/// Result type alias for sheetpack operations
pub type Result<T> = std::result::Result<T, XlsxError>;

/// Main error type for all package-generation operations
///
/// Generation is all-or-nothing: any variant raised in any phase aborts the
/// whole package. There is no partial-success mode.
#[derive(Error, Debug)]
pub enum XlsxError {
    /// I/O failure while writing the final archive
    #[error("Failed to write output file: {0}")]
    FileWrite(#[from] std::io::Error),

    /// A rendered part was not valid UTF-8 (defensive, unreachable for valid input)
    #[error("Part '{part}' produced invalid text encoding")]
    Encoding { part: String },

    /// An XML part rendered empty
    #[error("Part '{part}' rendered empty")]
    XmlGeneration { part: String },

    /// A rendered XML part is missing mandated structural markers
    #[error("Part '{part}' failed validation: {reason}")]
    XmlValidation { part: String, reason: String },

    /// A declared sheet never supplied its object sequence
    #[error("Sheet '{sheet}' has no data source")]
    MissingDataSource { sheet: String },

    /// A ZIP entry path is empty or contains parent-directory traversal
    #[error("Invalid archive entry path: '{path}'")]
    InvalidEntryPath { path: String },

    /// A ZIP entry payload exceeds the classic 32-bit size limit
    #[error("Entry '{path}' payload of {size} bytes exceeds the 4 GiB archive limit")]
    PayloadTooLarge { path: String, size: u64 },

    /// Failure while encoding archive data
    #[error("Failed to encode archive data for '{path}': {reason}")]
    DataWrite { path: String, reason: String },
}
