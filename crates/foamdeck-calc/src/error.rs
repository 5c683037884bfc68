//! Calculator errors

use thiserror::Error;

/// Result type for mesh layer calculations
pub type LayerResult<T> = Result<T, LayerError>;

/// Errors that abort a one-shot layer calculation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    /// Denominator is exactly zero
    #[error("Division by zero in {what}")]
    DivisionByZero { what: &'static str },

    /// Logarithm of a non-positive value
    #[error("Math domain error: ln({what}) with {what} = {value}")]
    Domain { what: &'static str, value: f64 },

    /// Result is NaN or infinite
    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LayerError::DivisionByZero { what: "ln(r)" };
        assert!(err.to_string().contains("ln(r)"));

        let err = LayerError::Domain {
            what: "r",
            value: -0.5,
        };
        assert!(err.to_string().contains("-0.5"));
    }
}
