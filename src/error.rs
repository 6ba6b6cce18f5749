// Boundary errors
// Raised where loosely typed data (DB rows, CLI args, JSON) becomes a typed record.
// The engines themselves never fail; they clamp and default instead.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DashboardError {
    #[error("unknown vesting frequency: {0:?}")]
    UnknownVestingFrequency(String),

    #[error("unknown pay frequency: {0:?}")]
    UnknownPayFrequency(String),

    #[error("unparseable date: {0:?}")]
    InvalidDate(String),

    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Accept only finite, non-negative amounts at a record boundary.
pub fn require_amount(field: &'static str, value: f64) -> Result<f64, DashboardError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DashboardError::InvalidAmount { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_amount() {
        assert_eq!(require_amount("total_tokens", 10.0), Ok(10.0));
        assert_eq!(require_amount("total_tokens", 0.0), Ok(0.0));
        assert!(require_amount("total_tokens", -1.0).is_err());
        assert!(require_amount("total_tokens", f64::NAN).is_err());
        assert!(require_amount("total_tokens", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = DashboardError::InvalidAmount { field: "vest_amount", value: -5.0 };
        assert_eq!(
            err.to_string(),
            "vest_amount must be a finite non-negative number, got -5"
        );

        let err = DashboardError::UnknownVestingFrequency("fortnight".to_string());
        assert_eq!(err.to_string(), "unknown vesting frequency: \"fortnight\"");

        println!("✅ Error message test passed");
    }
}
