//! Error types for the nearest-neighbor protocol.

use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a coordinator or a silo can observe.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or input, detected before any ciphertext work.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ciphertexts, keys or parameters from incompatible parameter sets.
    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    /// A peer or silo could not be reached, or hung up.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An operation was invoked in a state that does not allow it.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The encryption library rejected an operation.
    #[error("Encryption error: {0}")]
    Encryption(#[from] fhe::Error),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, found: usize) -> Self {
        Self::Configuration(format!(
            "Vector has dimension {found}, expected {expected}"
        ))
    }

    /// Create an out-of-range coordinate error.
    pub fn coordinate_out_of_range(value: i64, min: i64, max: i64) -> Self {
        Self::Configuration(format!(
            "Coordinate {value} is outside of [{min}, {max}]"
        ))
    }

    /// Create an empty dataset error.
    pub fn empty_dataset() -> Self {
        Self::Configuration("The dataset holds no records".to_string())
    }

    /// Create an unsafe parameters error.
    pub fn unsafe_parameters<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(format!("Unsafe parameters: {}", msg.into()))
    }

    /// Create a parameter fingerprint mismatch error.
    pub fn fingerprint_mismatch(found: u64, expected: u64) -> Self {
        Self::ParameterMismatch(format!(
            "Encoded under parameters {found:016x}, expected {expected:016x}"
        ))
    }

    /// Create an out-of-order operation error.
    pub fn unexpected_state<S: Into<String>>(operation: &str, state: S) -> Self {
        Self::ProtocolViolation(format!(
            "{operation} is not allowed in state {}",
            state.into()
        ))
    }

    /// Create a wrong-initiator error for initiator-only or responder-only calls.
    pub fn wrong_initiator(operation: &str, position: usize) -> Self {
        Self::ProtocolViolation(format!(
            "{operation} cannot be served at pairing position {position}"
        ))
    }

    /// Create an unreachable-peer error.
    pub fn unreachable<S: Into<String>>(address: &str, reason: S) -> Self {
        Self::Transport(format!("Cannot reach {address}: {}", reason.into()))
    }

    /// Create a malformed-message error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Transport(format!("Malformed message: {}", msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    #[test]
    fn error_helpers() {
        let error = Error::dimension_mismatch(8, 4);
        assert_eq!(
            error.to_string(),
            "Configuration error: Vector has dimension 4, expected 8"
        );

        let error = Error::coordinate_out_of_range(101, 0, 100);
        assert_eq!(
            error.to_string(),
            "Configuration error: Coordinate 101 is outside of [0, 100]"
        );

        let error = Error::empty_dataset();
        assert_eq!(
            error.to_string(),
            "Configuration error: The dataset holds no records"
        );

        let error = Error::fingerprint_mismatch(1, 2);
        assert_eq!(
            error.to_string(),
            "Parameter mismatch: Encoded under parameters 0000000000000001, expected 0000000000000002"
        );

        let error = Error::unexpected_state("ExchangePerturbedDistance", "Idle");
        assert_eq!(
            error.to_string(),
            "Protocol violation: ExchangePerturbedDistance is not allowed in state Idle"
        );

        let error = Error::wrong_initiator("ComparePerturbedDistance", 3);
        assert_eq!(
            error.to_string(),
            "Protocol violation: ComparePerturbedDistance cannot be served at pairing position 3"
        );

        let error = Error::unreachable("127.0.0.1:1", "refused");
        assert_eq!(
            error.to_string(),
            "Transport error: Cannot reach 127.0.0.1:1: refused"
        );
    }

    #[test]
    fn io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
