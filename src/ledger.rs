// 💶 Allowance Ledger - fixed allowance, cumulative spend, piggy bank
//
// Solvency invariant: spent + piggy_bank <= total, so remaining() >= 0.
// Every mutation returns a new Allowance; the caller owns the single copy.
// Comparisons and sums run in whole cents so the invariant survives f64 drift.

use crate::error::{ensure_positive_amount, EngineError, EngineResult};
use serde::{Deserialize, Serialize};

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

// ============================================================================
// ALLOWANCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AllowanceSnapshot")]
pub struct Allowance {
    /// Fixed allowance for the period (configuration)
    total: f64,

    /// Cumulative spend on accepted receipts
    spent: f64,

    /// Savings sub-balance drawn from the same pool
    piggy_bank: f64,
}

/// Wire shape; only reaches an `Allowance` through `restore`
#[derive(Deserialize)]
struct AllowanceSnapshot {
    total: f64,
    spent: f64,
    piggy_bank: f64,
}

impl TryFrom<AllowanceSnapshot> for Allowance {
    type Error = EngineError;

    fn try_from(raw: AllowanceSnapshot) -> EngineResult<Self> {
        Allowance::restore(raw.total, raw.spent, raw.piggy_bank)
    }
}

impl Allowance {
    /// Fresh period: nothing spent, nothing saved
    pub fn new(total: f64) -> EngineResult<Self> {
        let total = ensure_positive_amount(total)?;
        Ok(Allowance {
            total: from_cents(to_cents(total)),
            spent: 0.0,
            piggy_bank: 0.0,
        })
    }

    /// Rebuild from persisted figures, rejecting anything that breaks solvency
    pub fn restore(total: f64, spent: f64, piggy_bank: f64) -> EngineResult<Self> {
        let total = ensure_positive_amount(total)?;

        if !spent.is_finite() || spent < 0.0 {
            return Err(EngineError::CorruptState(format!("spent is {}", spent)));
        }
        if !piggy_bank.is_finite() || piggy_bank < 0.0 {
            return Err(EngineError::CorruptState(format!("piggy bank is {}", piggy_bank)));
        }
        if to_cents(spent) + to_cents(piggy_bank) > to_cents(total) {
            return Err(EngineError::CorruptState(format!(
                "spent {:.2} + piggy bank {:.2} exceeds allowance {:.2}",
                spent, piggy_bank, total
            )));
        }

        Ok(Allowance {
            total: from_cents(to_cents(total)),
            spent: from_cents(to_cents(spent)),
            piggy_bank: from_cents(to_cents(piggy_bank)),
        })
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn piggy_bank(&self) -> f64 {
        self.piggy_bank
    }

    /// total - spent - piggy_bank
    pub fn remaining(&self) -> f64 {
        from_cents(self.remaining_cents())
    }

    fn remaining_cents(&self) -> i64 {
        to_cents(self.total) - to_cents(self.spent) - to_cents(self.piggy_bank)
    }

    /// Share of the allowance still free, in [0, 1]
    pub fn remaining_ratio(&self) -> f64 {
        self.remaining() / self.total
    }

    /// Share of the allowance sitting in the piggy bank
    pub fn savings_ratio(&self) -> f64 {
        self.piggy_bank / self.total
    }

    // ========================================================================
    // SPEND PATH
    // ========================================================================

    pub fn can_afford_spend(&self, amount: f64) -> bool {
        ensure_positive_amount(amount).is_ok() && to_cents(amount) <= self.remaining_cents()
    }

    pub fn record_spend(&self, amount: f64) -> EngineResult<Allowance> {
        let amount = ensure_positive_amount(amount)?;
        self.ensure_affordable(amount)?;

        Ok(Allowance {
            spent: from_cents(to_cents(self.spent) + to_cents(amount)),
            ..*self
        })
    }

    // ========================================================================
    // DEPOSIT PATH (same pool as spending)
    // ========================================================================

    pub fn can_afford_deposit(&self, amount: f64) -> bool {
        ensure_positive_amount(amount).is_ok() && to_cents(amount) <= self.remaining_cents()
    }

    pub fn record_deposit(&self, amount: f64) -> EngineResult<Allowance> {
        let amount = ensure_positive_amount(amount)?;
        self.ensure_affordable(amount)?;

        Ok(Allowance {
            piggy_bank: from_cents(to_cents(self.piggy_bank) + to_cents(amount)),
            ..*self
        })
    }

    fn ensure_affordable(&self, amount: f64) -> EngineResult<()> {
        let remaining = self.remaining_cents();
        if to_cents(amount) > remaining {
            return Err(EngineError::InsufficientFunds {
                requested: amount,
                remaining: from_cents(remaining),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_allowance_is_fully_available() {
        let allowance = Allowance::new(50.0).unwrap();

        assert_eq!(allowance.total(), 50.0);
        assert_eq!(allowance.spent(), 0.0);
        assert_eq!(allowance.piggy_bank(), 0.0);
        assert_eq!(allowance.remaining(), 50.0);
        assert_eq!(allowance.remaining_ratio(), 1.0);
    }

    #[test]
    fn test_new_rejects_bad_total() {
        assert!(matches!(Allowance::new(0.0), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(Allowance::new(-5.0), Err(EngineError::InvalidAmount(_))));
        assert!(Allowance::new(f64::NAN).is_err());
    }

    #[test]
    fn test_record_spend() {
        let allowance = Allowance::new(50.0).unwrap();
        let after = allowance.record_spend(10.0).unwrap();

        assert_eq!(after.spent(), 10.0);
        assert_eq!(after.remaining(), 40.0);
        // Original value untouched
        assert_eq!(allowance.spent(), 0.0);
    }

    #[test]
    fn test_spend_exact_remaining_is_allowed() {
        let allowance = Allowance::new(50.0).unwrap();
        let after = allowance.record_spend(50.0).unwrap();

        assert_eq!(after.remaining(), 0.0);
        assert!(!after.can_afford_spend(0.01));
    }

    #[test]
    fn test_spend_over_remaining_fails() {
        let allowance = Allowance::restore(50.0, 30.0, 0.0).unwrap();
        let result = allowance.record_spend(20.01);

        match result {
            Err(EngineError::InsufficientFunds { requested, remaining }) => {
                assert_eq!(requested, 20.01);
                assert_eq!(remaining, 20.0);
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_amounts_rejected_before_affordability() {
        let allowance = Allowance::new(50.0).unwrap();

        assert!(matches!(allowance.record_spend(0.0), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(allowance.record_spend(-1.0), Err(EngineError::InvalidAmount(_))));
        assert!(matches!(
            allowance.record_deposit(f64::INFINITY),
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(allowance.record_deposit(f64::NAN).is_err());
    }

    #[test]
    fn test_deposit_draws_from_same_pool() {
        let allowance = Allowance::restore(50.0, 10.0, 0.0).unwrap();
        let after = allowance.record_deposit(20.0).unwrap();

        assert_eq!(after.piggy_bank(), 20.0);
        assert_eq!(after.remaining(), 20.0);
        assert!(!after.can_afford_deposit(25.0));
        assert!(!after.can_afford_spend(25.0));
        assert!(matches!(
            after.record_deposit(25.0),
            Err(EngineError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_sub_cent_amount_over_remaining_is_never_booked() {
        let allowance = Allowance::restore(50.0, 30.0, 0.0).unwrap();

        assert!(!allowance.can_afford_spend(20.004));
        assert!(!allowance.can_afford_deposit(20.004));
        assert_eq!(
            allowance.record_spend(20.004),
            Err(EngineError::InvalidAmount(20.004))
        );
        assert_eq!(
            allowance.record_deposit(20.004),
            Err(EngineError::InvalidAmount(20.004))
        );
        assert!(matches!(
            Allowance::new(50.0).unwrap().record_spend(0.005),
            Err(EngineError::InvalidAmount(_))
        ));

        // What is checked is what is booked
        let after = allowance.record_spend(20.0).unwrap();
        assert_eq!(after.spent(), 50.0);
        assert_eq!(after.remaining(), 0.0);
    }

    #[test]
    fn test_small_spends_do_not_drift() {
        let mut allowance = Allowance::new(1.0).unwrap();
        for _ in 0..10 {
            allowance = allowance.record_spend(0.1).unwrap();
        }

        assert_eq!(allowance.spent(), 1.0);
        assert_eq!(allowance.remaining(), 0.0);
        assert!(Allowance::restore(1.0, allowance.spent(), 0.0).is_ok());
    }

    #[test]
    fn test_deserialize_goes_through_restore() {
        let ok: Allowance =
            serde_json::from_str(r#"{"total":50,"spent":12.5,"piggy_bank":7}"#).unwrap();
        assert_eq!(ok, Allowance::restore(50.0, 12.5, 7.0).unwrap());

        let insolvent =
            serde_json::from_str::<Allowance>(r#"{"total":50,"spent":80,"piggy_bank":10}"#);
        assert!(insolvent.is_err());

        let negative = serde_json::from_str::<Allowance>(r#"{"total":50,"spent":-1,"piggy_bank":0}"#);
        assert!(negative.is_err());
    }

    #[test]
    fn test_restore_rejects_insolvent_state() {
        assert!(matches!(
            Allowance::restore(50.0, 40.0, 20.0),
            Err(EngineError::CorruptState(_))
        ));
        assert!(matches!(
            Allowance::restore(50.0, -1.0, 0.0),
            Err(EngineError::CorruptState(_))
        ));
        assert!(Allowance::restore(50.0, 30.0, 20.0).is_ok());

        println!("✅ Ledger restore validation PASSED");
    }
}
