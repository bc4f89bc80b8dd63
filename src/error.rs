use thiserror::Error;

/// Failures of the envelope operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The password does not reproduce the stored verifier. Either the
    /// password is wrong or the key file does not belong to it.
    #[error("password verification failed")]
    PasswordVerification,

    /// Stored fields or caller input could not be decoded.
    #[error(transparent)]
    Malformed(#[from] MalformedInput),

    /// The OS random generator is unavailable.
    #[error("OS random generator unavailable: {0}")]
    RandomSource(String),
}

#[derive(Debug, Error)]
pub enum MalformedInput {
    #[error("{field} is not valid hex: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("{field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("decrypted bytes are not valid UTF-8")]
    InvalidUtf8,
}

impl CryptoError {
    pub fn is_password_verification(&self) -> bool {
        matches!(self, CryptoError::PasswordVerification)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CryptoError::Malformed(_))
    }
}
