// 🐣 Pet State Selector - maps a ledger/vitality snapshot to a mood
//
// Rules are checked in order and the first match wins; the ranges overlap,
// so reordering them changes the result.

use crate::ingestion::EngineState;
use serde::{Deserialize, Serialize};

/// Either metric below this makes the pet cry
pub const CRYING_BELOW: i32 = 30;

/// Either metric below this makes the pet sad
pub const SAD_BELOW: i32 = 50;

/// Both metrics above this make the pet happy
pub const HAPPY_ABOVE: i32 = 80;

/// Share of allowance left under which the pet goes into spending mode
pub const SPENDING_ALERT_RATIO: f64 = 0.30;

/// Share of allowance left under which the low-funds warning shows
pub const LOW_FUNDS_RATIO: f64 = 0.20;

// ============================================================================
// PET MOOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetMood {
    Crying,
    Sad,
    Happy,
    SpendingAlert,
    Default,
}

impl PetMood {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetMood::Crying => "crying",
            PetMood::Sad => "sad",
            PetMood::Happy => "happy",
            PetMood::SpendingAlert => "spending_alert",
            PetMood::Default => "default",
        }
    }

    /// Sprite sheet the host renders for this mood
    pub fn sprite(&self) -> &'static str {
        match self {
            PetMood::Crying => "tamagotchi-crying.png",
            PetMood::Sad => "tamagotchi-sad.png",
            PetMood::Happy => "tamagotchi-happy.png",
            PetMood::SpendingAlert => "tamagotchi-eating.png",
            PetMood::Default => "tamagotchi-default.png",
        }
    }

    /// Animation frames in the sprite sheet
    pub fn frames(&self) -> u8 {
        match self {
            PetMood::Crying => 4,
            PetMood::Sad => 13,
            PetMood::Happy => 4,
            PetMood::SpendingAlert => 16,
            PetMood::Default => 10,
        }
    }
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Mood plus the independent low-funds signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PetView {
    pub mood: PetMood,
    pub low_funds_warning: bool,
    pub remaining_percent: f64,
}

pub fn select_mood(state: &EngineState) -> PetMood {
    let health = state.vitality.health();
    let happiness = state.vitality.happiness();

    if health < CRYING_BELOW || happiness < CRYING_BELOW {
        PetMood::Crying
    } else if health < SAD_BELOW || happiness < SAD_BELOW {
        PetMood::Sad
    } else if health > HAPPY_ABOVE && happiness > HAPPY_ABOVE {
        PetMood::Happy
    } else if state.allowance.remaining_ratio() < SPENDING_ALERT_RATIO {
        PetMood::SpendingAlert
    } else {
        PetMood::Default
    }
}

pub fn low_funds_warning(state: &EngineState) -> bool {
    state.allowance.remaining_ratio() < LOW_FUNDS_RATIO
}

pub fn pet_view(state: &EngineState) -> PetView {
    PetView {
        mood: select_mood(state),
        low_funds_warning: low_funds_warning(state),
        remaining_percent: state.allowance.remaining_ratio() * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Allowance;
    use crate::vitality::VitalityState;

    fn state(health: i32, happiness: i32, spent: f64, piggy_bank: f64) -> EngineState {
        EngineState::new(
            Allowance::restore(50.0, spent, piggy_bank).unwrap(),
            VitalityState::new(health, happiness),
        )
    }

    #[test]
    fn test_crying_wins_over_high_happiness() {
        assert_eq!(select_mood(&state(25, 90, 0.0, 0.0)), PetMood::Crying);
        assert_eq!(select_mood(&state(90, 29, 0.0, 0.0)), PetMood::Crying);
    }

    #[test]
    fn test_sad_band() {
        assert_eq!(select_mood(&state(30, 90, 0.0, 0.0)), PetMood::Sad);
        assert_eq!(select_mood(&state(70, 49, 0.0, 0.0)), PetMood::Sad);
    }

    #[test]
    fn test_happy_needs_both_above_80() {
        assert_eq!(select_mood(&state(81, 81, 0.0, 0.0)), PetMood::Happy);
        assert_eq!(select_mood(&state(80, 95, 0.0, 0.0)), PetMood::Default);
    }

    #[test]
    fn test_happy_beats_spending_alert() {
        // 10% left but both metrics high
        assert_eq!(select_mood(&state(90, 90, 45.0, 0.0)), PetMood::Happy);
    }

    #[test]
    fn test_spending_alert_and_default() {
        // 14 of 50 left = 28%
        assert_eq!(select_mood(&state(70, 70, 36.0, 0.0)), PetMood::SpendingAlert);
        // 15 of 50 left = exactly 30%
        assert_eq!(select_mood(&state(70, 70, 20.0, 15.0)), PetMood::Default);
    }

    #[test]
    fn test_low_funds_warning_is_independent() {
        let s = state(90, 90, 41.0, 0.0);
        let view = pet_view(&s);

        assert_eq!(view.mood, PetMood::Happy);
        assert!(view.low_funds_warning);

        // exactly 20% left is not low
        assert!(!low_funds_warning(&state(70, 70, 40.0, 0.0)));
    }

    #[test]
    fn test_selector_is_pure() {
        let s = state(45, 60, 12.0, 3.0);
        assert_eq!(pet_view(&s), pet_view(&s));
    }

    #[test]
    fn test_sprite_metadata() {
        assert_eq!(PetMood::SpendingAlert.sprite(), "tamagotchi-eating.png");
        assert_eq!(PetMood::SpendingAlert.frames(), 16);
        assert_eq!(PetMood::Default.frames(), 10);
        assert_eq!(PetMood::Sad.as_str(), "sad");
    }
}
