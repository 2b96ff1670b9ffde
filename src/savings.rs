// 🐷 Savings Advisor - coaching tier and achievement from the piggy bank
//
// Tiers are absolute balance thresholds; the super-saver achievement is a
// share of the allowance and is evaluated separately.

use crate::ledger::Allowance;
use serde::{Deserialize, Serialize};

/// Share of the allowance saved that earns the super-saver achievement
pub const SUPER_SAVER_RATIO: f64 = 0.80;

/// Preset amounts offered for a quick deposit
pub const QUICK_DEPOSIT_AMOUNTS: [f64; 4] = [5.0, 10.0, 20.0, 50.0];

/// Deposits at or above this get the "pro" feedback
pub const PRO_DEPOSIT_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavingsTier {
    StartSaving,
    GoodStart,
    DecentAmount,
    OverHalf,
    MasterSaver,
}

impl SavingsTier {
    pub fn from_balance(piggy_bank: f64) -> SavingsTier {
        if piggy_bank <= 0.0 {
            SavingsTier::StartSaving
        } else if piggy_bank < 10.0 {
            SavingsTier::GoodStart
        } else if piggy_bank < 25.0 {
            SavingsTier::DecentAmount
        } else if piggy_bank < 40.0 {
            SavingsTier::OverHalf
        } else {
            SavingsTier::MasterSaver
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SavingsTier::StartSaving => "start-saving",
            SavingsTier::GoodStart => "good-start",
            SavingsTier::DecentAmount => "decent-amount",
            SavingsTier::OverHalf => "over-half",
            SavingsTier::MasterSaver => "master-saver",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SavingsTier::StartSaving => "Start saving! Even a small amount is a good beginning.",
            SavingsTier::GoodStart => "Great start! Keep going!",
            SavingsTier::DecentAmount => "Well done! You already have a decent amount!",
            SavingsTier::OverHalf => "Wow! More than half of your allowance saved!",
            SavingsTier::MasterSaver => "Fantastic! You are a master saver! 🎉",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsAdvice {
    pub tier: SavingsTier,
    pub message: String,
    pub super_saver: bool,
    pub savings_percent: f64,
}

pub fn is_super_saver(allowance: &Allowance) -> bool {
    allowance.savings_ratio() >= SUPER_SAVER_RATIO
}

pub fn advise(allowance: &Allowance) -> SavingsAdvice {
    let tier = SavingsTier::from_balance(allowance.piggy_bank());
    SavingsAdvice {
        tier,
        message: tier.message().to_string(),
        super_saver: is_super_saver(allowance),
        savings_percent: allowance.savings_ratio() * 100.0,
    }
}

/// Encouragement shown after an accepted deposit
pub fn deposit_feedback(amount: f64) -> &'static str {
    if amount >= PRO_DEPOSIT_THRESHOLD {
        "🎉 Great! You save like a pro!"
    } else {
        "👍 Good job! Every coin counts!"
    }
}

/// Preset deposit amounts that still fit in what is left
pub fn quick_deposit_amounts(remaining: f64) -> Vec<f64> {
    QUICK_DEPOSIT_AMOUNTS
        .iter()
        .copied()
        .filter(|amount| *amount <= remaining)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SavingsTier::from_balance(0.0), SavingsTier::StartSaving);
        assert_eq!(SavingsTier::from_balance(0.01), SavingsTier::GoodStart);
        assert_eq!(SavingsTier::from_balance(9.99), SavingsTier::GoodStart);
        assert_eq!(SavingsTier::from_balance(10.0), SavingsTier::DecentAmount);
        assert_eq!(SavingsTier::from_balance(24.99), SavingsTier::DecentAmount);
        assert_eq!(SavingsTier::from_balance(25.0), SavingsTier::OverHalf);
        assert_eq!(SavingsTier::from_balance(39.99), SavingsTier::OverHalf);
        assert_eq!(SavingsTier::from_balance(40.0), SavingsTier::MasterSaver);
    }

    #[test]
    fn test_master_saver_with_achievement() {
        let allowance = Allowance::restore(50.0, 0.0, 45.0).unwrap();
        let advice = advise(&allowance);

        assert_eq!(advice.tier, SavingsTier::MasterSaver);
        assert_eq!(advice.tier.as_str(), "master-saver");
        assert!(advice.super_saver);
        assert!((advice.savings_percent - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_achievement_independent_of_tier() {
        // Small allowance: 8 of 10 saved is only "good-start" but still 80%
        let allowance = Allowance::restore(10.0, 0.0, 8.0).unwrap();
        let advice = advise(&allowance);

        assert_eq!(advice.tier, SavingsTier::GoodStart);
        assert!(advice.super_saver);

        let allowance = Allowance::restore(50.0, 0.0, 39.0).unwrap();
        assert!(!is_super_saver(&allowance));
    }

    #[test]
    fn test_advice_is_pure() {
        let allowance = Allowance::restore(50.0, 5.0, 12.0).unwrap();
        assert_eq!(advise(&allowance), advise(&allowance));
    }

    #[test]
    fn test_quick_amounts_and_feedback() {
        assert_eq!(quick_deposit_amounts(20.0), vec![5.0, 10.0, 20.0]);
        assert!(quick_deposit_amounts(4.99).is_empty());
        assert_eq!(quick_deposit_amounts(50.0).len(), 4);

        assert!(deposit_feedback(10.0).contains("pro"));
        assert!(deposit_feedback(9.5).contains("Every coin"));
    }

    #[test]
    fn test_tier_serializes_kebab_case() {
        let json = serde_json::to_string(&SavingsTier::DecentAmount).unwrap();
        assert_eq!(json, "\"decent-amount\"");
    }
}
