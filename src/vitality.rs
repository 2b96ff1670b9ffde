// ❤️ Vitality Model - health and happiness, both bounded to [0, 100]
//
// Spending costs one point of each metric per whole percent of the
// allowance, on top of the category deltas supplied by the categorizer.
// Saving adds a flat happiness bonus.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

pub const VITALITY_MIN: i32 = 0;
pub const VITALITY_MAX: i32 = 100;

/// Happiness granted per accepted deposit, independent of its size
pub const DEPOSIT_HAPPINESS_BONUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VitalitySnapshot")]
pub struct VitalityState {
    health: i32,
    happiness: i32,
}

/// Wire shape; only reaches a `VitalityState` through `restore`
#[derive(Deserialize)]
struct VitalitySnapshot {
    health: i32,
    happiness: i32,
}

impl TryFrom<VitalitySnapshot> for VitalityState {
    type Error = EngineError;

    fn try_from(raw: VitalitySnapshot) -> EngineResult<Self> {
        VitalityState::restore(raw.health, raw.happiness)
    }
}

impl Default for VitalityState {
    fn default() -> Self {
        VitalityState {
            health: VITALITY_MAX,
            happiness: VITALITY_MAX,
        }
    }
}

fn clamp_metric(value: i64) -> i32 {
    value.clamp(VITALITY_MIN as i64, VITALITY_MAX as i64) as i32
}

impl VitalityState {
    /// Build a state, clamping both metrics into range
    pub fn new(health: i32, happiness: i32) -> Self {
        VitalityState {
            health: clamp_metric(health as i64),
            happiness: clamp_metric(happiness as i64),
        }
    }

    /// Rebuild stored metrics; out-of-range values are corrupt, not clamped
    pub fn restore(health: i32, happiness: i32) -> EngineResult<Self> {
        let range = VITALITY_MIN..=VITALITY_MAX;
        if !range.contains(&health) || !range.contains(&happiness) {
            return Err(EngineError::CorruptState(format!(
                "vitality out of range: health {}, happiness {}",
                health, happiness
            )));
        }
        Ok(VitalityState { health, happiness })
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn happiness(&self) -> i32 {
        self.happiness
    }

    /// Apply raw deltas to both metrics and clamp
    pub fn adjusted(&self, health_delta: i64, happiness_delta: i64) -> VitalityState {
        VitalityState {
            health: clamp_metric(self.health as i64 + health_delta),
            happiness: clamp_metric(self.happiness as i64 + happiness_delta),
        }
    }
}

/// floor(100 * receipt_total / allowance_total)
///
/// Non-finite or non-positive inputs yield no penalty; the ledger rejects
/// those amounts before this is ever reached.
pub fn spend_penalty(receipt_total: f64, allowance_total: f64) -> i64 {
    if !(receipt_total.is_finite() && allowance_total.is_finite()) || allowance_total <= 0.0 {
        return 0;
    }
    let percent = (100.0 * receipt_total / allowance_total).floor();
    if percent <= 0.0 {
        0
    } else {
        // `as` saturates, so a runaway ratio still clamps both metrics to zero
        percent as i64
    }
}

/// Spend path: category deltas minus the whole-percent penalty, clamped
pub fn apply_spend_penalty(
    state: VitalityState,
    receipt_total: f64,
    allowance_total: f64,
    category_health_delta: i32,
    category_happiness_delta: i32,
) -> VitalityState {
    let penalty = spend_penalty(receipt_total, allowance_total);

    state.adjusted(
        category_health_delta as i64 - penalty,
        category_happiness_delta as i64 - penalty,
    )
}

/// Deposit path: flat happiness bonus, health unchanged
pub fn apply_deposit_bonus(state: VitalityState) -> VitalityState {
    state.adjusted(0, DEPOSIT_HAPPINESS_BONUS as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_full() {
        let state = VitalityState::default();
        assert_eq!(state.health(), 100);
        assert_eq!(state.happiness(), 100);
    }

    #[test]
    fn test_new_clamps() {
        let state = VitalityState::new(140, -20);
        assert_eq!(state.health(), 100);
        assert_eq!(state.happiness(), 0);
    }

    #[test]
    fn test_restore_and_deserialize_reject_out_of_range() {
        assert_eq!(VitalityState::restore(64, 71), Ok(VitalityState::new(64, 71)));
        assert!(matches!(VitalityState::restore(150, 50), Err(EngineError::CorruptState(_))));

        let ok: VitalityState = serde_json::from_str(r#"{"health":40,"happiness":90}"#).unwrap();
        assert_eq!(ok, VitalityState::new(40, 90));

        let bad = serde_json::from_str::<VitalityState>(r#"{"health":500,"happiness":-7}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_spend_penalty_floors_percentage() {
        assert_eq!(spend_penalty(10.0, 50.0), 20);
        assert_eq!(spend_penalty(0.99, 50.0), 1);
        assert_eq!(spend_penalty(0.49, 50.0), 0);
        assert_eq!(spend_penalty(12.34, 50.0), 24);
        assert_eq!(spend_penalty(10.0, 0.0), 0);
        assert_eq!(spend_penalty(f64::NAN, 50.0), 0);
    }

    #[test]
    fn test_apply_spend_penalty_additive() {
        let state = VitalityState::default();
        let after = apply_spend_penalty(state, 10.0, 50.0, 0, 0);

        assert_eq!(after.health(), 80);
        assert_eq!(after.happiness(), 80);
    }

    #[test]
    fn test_apply_spend_penalty_with_category_deltas() {
        let state = VitalityState::new(60, 60);
        // Healthy food: +10 health, +5 happiness, 5 EUR of 50 => penalty 10
        let after = apply_spend_penalty(state, 5.0, 50.0, 10, 5);

        assert_eq!(after.health(), 60);
        assert_eq!(after.happiness(), 55);
    }

    #[test]
    fn test_apply_spend_penalty_clamps_both_ends() {
        let low = apply_spend_penalty(VitalityState::new(5, 5), 25.0, 50.0, -20, -10);
        assert_eq!(low.health(), 0);
        assert_eq!(low.happiness(), 0);

        // Bonus larger than penalty cannot push above 100
        let high = apply_spend_penalty(VitalityState::default(), 0.4, 50.0, 10, 10);
        assert_eq!(high.health(), 100);
        assert_eq!(high.happiness(), 100);
    }

    #[test]
    fn test_deposit_bonus() {
        let after = apply_deposit_bonus(VitalityState::new(80, 80));
        assert_eq!(after.health(), 80);
        assert_eq!(after.happiness(), 85);

        let capped = apply_deposit_bonus(VitalityState::new(50, 98));
        assert_eq!(capped.happiness(), 100);
    }
}
