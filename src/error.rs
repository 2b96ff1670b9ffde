// ⚠️ Engine Errors - typed failures for every admissibility check
//
// Every variant is recoverable: the engine reports it and leaves the
// previous ledger/vitality snapshot untouched.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Spend or deposit exceeds what is left of the allowance
    #[error("insufficient funds: requested {requested:.2}, remaining {remaining:.2}")]
    InsufficientFunds { requested: f64, remaining: f64 },

    /// Non-positive or non-finite money amount
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),

    /// Upstream parse produced nothing usable
    #[error("no items found in receipt")]
    NoItemsFound,

    /// A receipt line item that does not fit the item schema
    #[error("malformed receipt item: {0}")]
    MalformedReceipt(String),

    /// Upstream collaborator (parser, categorizer, storage) unreachable
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Persisted snapshot breaks the solvency or vitality range invariants
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),
}

impl EngineError {
    /// Short machine-readable code for API payloads and the audit trail
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientFunds { .. } => "insufficient_funds",
            EngineError::InvalidAmount(_) => "invalid_amount",
            EngineError::NoItemsFound => "no_items_found",
            EngineError::MalformedReceipt(_) => "malformed_receipt",
            EngineError::ServiceUnavailable(_) => "service_unavailable",
            EngineError::CorruptState(_) => "corrupt_state",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Largest gap between an amount and its nearest cent still read as that cent
const CENT_TOLERANCE: f64 = 1e-9;

/// Reject non-positive or non-finite money before it reaches any state
///
/// Money is a whole number of cents: 20.004 is rejected here rather than
/// being booked as 20.00.
pub fn ensure_positive_amount(amount: f64) -> EngineResult<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::InvalidAmount(amount));
    }

    let cents = (amount * 100.0).round();
    if (cents / 100.0 - amount).abs() > CENT_TOLERANCE {
        return Err(EngineError::InvalidAmount(amount));
    }

    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive_amount() {
        assert_eq!(ensure_positive_amount(12.5), Ok(12.5));
        assert_eq!(ensure_positive_amount(0.0), Err(EngineError::InvalidAmount(0.0)));
        assert_eq!(ensure_positive_amount(-3.0), Err(EngineError::InvalidAmount(-3.0)));
        assert!(ensure_positive_amount(f64::NAN).is_err());
        assert!(ensure_positive_amount(f64::INFINITY).is_err());
        assert_eq!(ensure_positive_amount(0.01), Ok(0.01));
        assert_eq!(ensure_positive_amount(20.01), Ok(20.01));
    }

    #[test]
    fn test_sub_cent_amounts_rejected() {
        assert_eq!(ensure_positive_amount(0.004), Err(EngineError::InvalidAmount(0.004)));
        assert_eq!(ensure_positive_amount(0.005), Err(EngineError::InvalidAmount(0.005)));
        assert_eq!(ensure_positive_amount(20.004), Err(EngineError::InvalidAmount(20.004)));
    }

    #[test]
    fn test_error_display_and_code() {
        let err = EngineError::InsufficientFunds {
            requested: 25.0,
            remaining: 20.0,
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: requested 25.00, remaining 20.00"
        );
        assert_eq!(err.code(), "insufficient_funds");
        assert_eq!(EngineError::NoItemsFound.code(), "no_items_found");
        assert_eq!(
            EngineError::MalformedReceipt("row 2".into()).code(),
            "malformed_receipt"
        );
    }
}
