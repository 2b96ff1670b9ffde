// 📊 Dashboard - one serializable snapshot of everything a host displays

use crate::ingestion::EngineState;
use crate::pet::{pet_view, PetView};
use crate::savings::{advise, quick_deposit_amounts, SavingsAdvice};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub total: f64,
    pub spent: f64,
    pub piggy_bank: f64,
    pub remaining: f64,
    pub health: i32,
    pub happiness: i32,
    pub pet: PetView,
    pub sprite: String,
    pub frames: u8,
    pub savings: SavingsAdvice,
    pub quick_deposit_amounts: Vec<f64>,
}

impl Dashboard {
    pub fn from_state(state: &EngineState) -> Self {
        let allowance = &state.allowance;
        let pet = pet_view(state);

        Dashboard {
            total: allowance.total(),
            spent: allowance.spent(),
            piggy_bank: allowance.piggy_bank(),
            remaining: allowance.remaining(),
            health: state.vitality.health(),
            happiness: state.vitality.happiness(),
            sprite: pet.mood.sprite().to_string(),
            frames: pet.mood.frames(),
            pet,
            savings: advise(allowance),
            quick_deposit_amounts: quick_deposit_amounts(allowance.remaining()),
        }
    }
}
